// Wingmate — end-to-end coordinator scenarios.
// Exercises the public surface with scripted collaborators: a mutable
// observer, counting/gated inference doubles, and a recording executor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use wingmate::*;

// ── Test doubles ───────────────────────────────────────────────────────────

/// Observer whose snapshot the test can swap at any time.
struct MutableObserver {
    snapshot: Mutex<RawSnapshot>,
}

impl MutableObserver {
    fn new(snapshot: RawSnapshot) -> Arc<Self> {
        Arc::new(Self { snapshot: Mutex::new(snapshot) })
    }

    fn set(&self, snapshot: RawSnapshot) {
        *self.snapshot.lock() = snapshot;
    }
}

#[async_trait]
impl SurfaceObserver for MutableObserver {
    async fn read_snapshot(&self) -> RawSnapshot {
        self.snapshot.lock().clone()
    }
}

/// Executor that records every action it is asked to perform.
#[derive(Default)]
struct RecordingExecutor {
    actions: Mutex<Vec<SurfaceAction>>,
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, action: SurfaceAction) -> bool {
        self.actions.lock().push(action);
        true
    }
}

/// Instant inference double with per-capability call counters. Generation
/// optionally blocks on a gate so tests can hold a call in flight.
#[derive(Default)]
struct ScriptedInference {
    analyze_calls: AtomicUsize,
    style_calls: AtomicUsize,
    preference_calls: AtomicUsize,
    generate_calls: AtomicUsize,
    gate_generation: bool,
    gate: Notify,
}

impl ScriptedInference {
    fn counting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn gated() -> Arc<Self> {
        Arc::new(Self { gate_generation: true, ..Default::default() })
    }
}

#[async_trait]
impl InferenceService for ScriptedInference {
    async fn analyze_entity(&self, _entity: &Entity) -> EngineResult<AnalysisResult> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        Ok(AnalysisResult::default())
    }

    async fn decide(
        &self,
        _entity: &Entity,
        _analysis: &AnalysisResult,
        _preferences: &PreferenceProfile,
    ) -> EngineResult<Decision> {
        Ok(Decision { direction: Direction::Accept, confidence: 80, reasons: vec![] })
    }

    async fn analyze_preferences(
        &self,
        _liked: &[HistoryEntry],
        _disliked: &[HistoryEntry],
    ) -> EngineResult<PreferenceDelta> {
        self.preference_calls.fetch_add(1, Ordering::SeqCst);
        Ok(PreferenceDelta::default())
    }

    async fn analyze_style(&self, _samples: &[StyleSample]) -> EngineResult<StyleAnalysis> {
        self.style_calls.fetch_add(1, Ordering::SeqCst);
        Ok(StyleAnalysis::default())
    }

    async fn generate_message(
        &self,
        context: &Context,
        _style: &StyleProfile,
        _mode: GenerationMode,
    ) -> EngineResult<String> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.gate_generation {
            self.gate.notified().await;
        }
        Ok(format!("hey {}!", context.counterpart_name))
    }
}

// ── Fixtures ───────────────────────────────────────────────────────────────

fn profile_snapshot(name: &str, age: u8, bio: &str) -> RawSnapshot {
    RawSnapshot::discovery(RawProfile {
        name: Some(name.to_string()),
        age: Some(age),
        bio: Some(bio.to_string()),
        images: vec![format!("https://img/{name}.jpg")],
    })
}

fn conversation_snapshot(name: &str, messages: Vec<ChatMessage>) -> RawSnapshot {
    RawSnapshot::conversation(RawConversation {
        counterpart_name: Some(name.to_string()),
        counterpart_photo: None,
        messages,
    })
}

fn entity(name: &str) -> Entity {
    Entity {
        identity_hash: format!("fp-{name}"),
        name: name.to_string(),
        age: Some(25),
        bio: None,
        images: Vec::new(),
        primary_image: None,
        detected_at: chrono::Utc::now(),
    }
}

struct Harness {
    coordinator: Arc<Coordinator>,
    observer: Arc<MutableObserver>,
    executor: Arc<RecordingExecutor>,
    inference: Arc<ScriptedInference>,
    storage: Arc<Storage>,
}

fn harness(inference: Arc<ScriptedInference>, initial: RawSnapshot) -> Harness {
    let observer = MutableObserver::new(initial);
    let executor = Arc::new(RecordingExecutor::default());
    let storage = Arc::new(Storage::new(Box::new(MemoryStore::new())));
    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&observer) as Arc<dyn SurfaceObserver>,
        Arc::clone(&inference) as Arc<dyn InferenceService>,
        Arc::clone(&executor) as Arc<dyn ActionExecutor>,
        Arc::clone(&storage),
        CoordinatorConfig::immediate(),
    ));
    Harness { coordinator, observer, executor, inference, storage }
}

// ── Detection & dedup ──────────────────────────────────────────────────────

#[tokio::test]
async fn unchanged_fingerprint_runs_the_pipeline_once() {
    let h = harness(
        ScriptedInference::counting(),
        profile_snapshot("Alice", 25, "climbing, coffee, live music"),
    );

    // Event channel and poll tick feed the same idempotent check.
    for _ in 0..4 {
        h.coordinator.check_for_change().await.unwrap();
    }

    let (version, phase, _) = h.coordinator.snapshot_state();
    assert_eq!(version, 1, "one distinct identity, one swap");
    assert_eq!(phase, ContextPhase::Ready);
    assert_eq!(h.inference.analyze_calls.load(Ordering::SeqCst), 1);

    // A genuinely new identity runs the pipeline again.
    h.observer.set(profile_snapshot("Bea", 27, "museums and bad puns"));
    h.coordinator.check_for_change().await.unwrap();
    let (version, _, _) = h.coordinator.snapshot_state();
    assert_eq!(version, 2);
    assert_eq!(h.inference.analyze_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.coordinator.current_entity().unwrap().name, "Bea");
}

#[tokio::test]
async fn detection_loop_reacts_to_mutation_events() {
    let h = harness(
        ScriptedInference::counting(),
        profile_snapshot("Alice", 25, "weekend hikes and bad movies"),
    );
    let (feed, receiver) = Coordinator::mutation_feed();
    let task = tokio::spawn(Arc::clone(&h.coordinator).run(receiver));

    feed.notify();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let (version, phase, _) = h.coordinator.snapshot_state();
    assert_eq!((version, phase), (1, ContextPhase::Ready));

    // Closing the mutation feed shuts the loop down; polling stops with it.
    drop(feed);
    task.await.unwrap();
}

#[tokio::test]
async fn placeholder_entity_when_surface_never_resolves() {
    let h = harness(
        ScriptedInference::counting(),
        RawSnapshot::discovery(RawProfile {
            name: None,
            age: None,
            bio: Some("rendering...".into()),
            images: Vec::new(),
        }),
    );
    // The bio alone fingerprints the identity; the name never appears.
    h.coordinator.check_for_change().await.unwrap();

    let entity = h.coordinator.current_entity().unwrap();
    assert_eq!(entity.name, "Unknown");
    let (_, phase, _) = h.coordinator.snapshot_state();
    assert_eq!(phase, ContextPhase::Ready, "pipeline never blocks on extraction");
}

// ── Scenario A: credentials missing ────────────────────────────────────────

#[tokio::test]
async fn missing_credentials_surface_error_with_basic_profile() {
    // Real provider, no API key configured in settings.
    let observer = MutableObserver::new(profile_snapshot("Alice", 25, "books & barbells"));
    let executor = Arc::new(RecordingExecutor::default());
    let storage = Arc::new(Storage::new(Box::new(MemoryStore::new())));
    let inference = Arc::new(OpenAiInference::new(Arc::clone(&storage)));
    let coordinator = Coordinator::new(
        observer as Arc<dyn SurfaceObserver>,
        inference as Arc<dyn InferenceService>,
        executor as Arc<dyn ActionExecutor>,
        storage,
        CoordinatorConfig::immediate(),
    );

    let alice = Entity {
        bio: Some("books & barbells".into()), // length 15, above the floor
        ..entity("Alice")
    };
    let response = dispatch(
        &coordinator,
        CommandRequest::AnalyzeEntity { entity: alice },
    )
    .await;

    assert!(response.success, "no crash: raw entity data still served");
    let payload = response.payload.unwrap();
    assert_eq!(payload["entity"]["name"], "Alice");
    assert_eq!(payload["analysis"]["error"], "No API key configured");
}

// ── Scenario B: stale-context discard ──────────────────────────────────────

#[tokio::test]
async fn in_flight_generation_is_discarded_after_context_swap() {
    let h = harness(
        ScriptedInference::gated(),
        conversation_snapshot("Jane", vec![ChatMessage::new(Sender::Counterpart, "hi there!")]),
    );

    h.coordinator.open_conversation().await.unwrap();
    let (version, phase, _) = h.coordinator.snapshot_state();
    assert_eq!((version, phase), (1, ContextPhase::Ready));

    // Hold a generation for Jane in flight.
    let pending = {
        let coordinator = Arc::clone(&h.coordinator);
        tokio::spawn(async move { coordinator.generate_suggestion(false, false).await })
    };
    tokio::task::yield_now().await;
    assert_eq!(h.inference.generate_calls.load(Ordering::SeqCst), 1);

    // Before it resolves, the user switches to Sam.
    h.observer.set(conversation_snapshot(
        "Sam",
        vec![ChatMessage::new(Sender::Counterpart, "hello hello")],
    ));
    h.coordinator.check_for_change().await.unwrap();
    let (version, _, _) = h.coordinator.snapshot_state();
    assert_eq!(version, 2, "swap strictly increases the version");
    assert_eq!(h.coordinator.current_context().unwrap().counterpart_name, "Sam");

    // The Jane result lands late and is silently dropped.
    h.inference.gate.notify_one();
    let outcome = pending.await.unwrap().unwrap();
    assert!(matches!(outcome, SuggestionOutcome::Stale));

    // Nothing was drafted onto the surface for the dead conversation.
    assert!(h.executor.actions.lock().is_empty());

    // The slot is free again: a fresh request for Sam goes through.
    let next = {
        let coordinator = Arc::clone(&h.coordinator);
        tokio::spawn(async move { coordinator.generate_suggestion(false, false).await })
    };
    tokio::task::yield_now().await;
    h.inference.gate.notify_one();
    let outcome = next.await.unwrap().unwrap();
    match outcome {
        SuggestionOutcome::Completed(s) => assert_eq!(s.text, "hey Sam!"),
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_generation_requests_single_flight() {
    let h = harness(
        ScriptedInference::gated(),
        conversation_snapshot("Jane", vec![ChatMessage::new(Sender::Counterpart, "hey you")]),
    );
    h.coordinator.open_conversation().await.unwrap();

    let first = {
        let coordinator = Arc::clone(&h.coordinator);
        tokio::spawn(async move { coordinator.generate_suggestion(false, false).await })
    };
    tokio::task::yield_now().await;

    // Rapid re-trigger while the first call is suspended: rejected, not queued.
    let second = h.coordinator.generate_suggestion(false, false).await.unwrap();
    assert!(matches!(second, SuggestionOutcome::Ignored));
    assert_eq!(h.inference.generate_calls.load(Ordering::SeqCst), 1);

    h.inference.gate.notify_one();
    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, SuggestionOutcome::Completed(_)));
}

// ── Scenario C: style retraining cadence ───────────────────────────────────

#[tokio::test]
async fn style_retraining_fires_at_ten_then_every_five() {
    let h = harness(
        ScriptedInference::counting(),
        conversation_snapshot("Jane", vec![]),
    );

    for i in 0..9 {
        h.coordinator
            .on_message_sent(format!("message number {i} with some substance"))
            .await;
    }
    assert_eq!(h.inference.style_calls.load(Ordering::SeqCst), 0);

    // 10th sample: exactly one retraining call.
    h.coordinator.on_message_sent("the tenth message right here".into()).await;
    assert_eq!(h.inference.style_calls.load(Ordering::SeqCst), 1);

    // 11th: none.
    h.coordinator.on_message_sent("the eleventh message".into()).await;
    assert_eq!(h.inference.style_calls.load(Ordering::SeqCst), 1);

    // 12th through 15th: exactly one more, at the 15th.
    for i in 12..=15 {
        h.coordinator.on_message_sent(format!("message number {i}")).await;
    }
    assert_eq!(h.inference.style_calls.load(Ordering::SeqCst), 2);
}

// ── Scenario D: bounded history eviction ───────────────────────────────────

#[tokio::test]
async fn liked_history_evicts_oldest_at_cap() {
    let h = harness(ScriptedInference::counting(), RawSnapshot::empty());

    for i in 0..100 {
        h.coordinator
            .record_decision(Direction::Accept, entity(&format!("p{i}")))
            .await;
    }
    assert_eq!(h.coordinator.preferences.profile().liked_history.len(), 100);

    h.coordinator.record_decision(Direction::Accept, entity("p100")).await;
    let profile = h.coordinator.preferences.profile();
    assert_eq!(profile.liked_history.len(), 100, "cap holds");
    assert_eq!(profile.liked_history.front().unwrap().entity.name, "p1", "oldest evicted");
    assert_eq!(profile.liked_history.back().unwrap().entity.name, "p100");

    // Stats counted every decision regardless of eviction.
    assert_eq!(h.storage.stats().accepts, 101);
    assert_eq!(h.storage.stats().decisions, 101);
}

// ── Auto pipeline & suppression ────────────────────────────────────────────

#[tokio::test]
async fn auto_decide_emits_decision_and_learns() {
    let h = harness(
        ScriptedInference::counting(),
        profile_snapshot("Alice", 25, "long enough bio for analysis"),
    );
    h.coordinator.set_auto_decide(true).await.unwrap();

    let actions = h.executor.actions.lock();
    assert!(
        matches!(
            actions.first(),
            Some(SurfaceAction::Decision { direction: Direction::Accept, confidence: 80 })
        ),
        "decision emitted to the surface: {actions:?}"
    );
    drop(actions);

    // The accepted entity fed the preference accumulator.
    assert_eq!(h.coordinator.preferences.profile().liked_history.len(), 1);
    assert_eq!(h.storage.stats().accepts, 1);
}

#[tokio::test]
async fn chat_assist_drafts_replies_and_follow_ups() {
    let h = harness(
        ScriptedInference::counting(),
        conversation_snapshot("Jane", vec![ChatMessage::new(Sender::Counterpart, "hi there!")]),
    );
    h.coordinator.set_chat_assist(true).unwrap();
    h.coordinator.open_conversation().await.unwrap();

    // Opening with an unanswered message auto-drafted a reply.
    {
        let actions = h.executor.actions.lock();
        assert!(matches!(actions.as_slice(), [SurfaceAction::DraftMessage { .. }]));
    }

    // A counterpart message triggers another draft.
    let suggestion = h.coordinator.on_message_received("so what do you do?".into()).await;
    assert_eq!(suggestion.unwrap().mode, GenerationMode::Reply);

    // After our own message the classification flips to follow-up.
    let suggestion = h.coordinator.on_message_sent("I wrangle code for a living".into()).await;
    assert_eq!(suggestion.unwrap().mode, GenerationMode::FollowUp);
}

#[tokio::test]
async fn command_envelope_round_trip() {
    let h = harness(ScriptedInference::counting(), RawSnapshot::empty());

    let response = dispatch(
        h.coordinator.as_ref(),
        CommandRequest::ToggleChatAssist { enabled: true },
    )
    .await;
    assert!(response.success);

    let response = dispatch(h.coordinator.as_ref(), CommandRequest::GetSettings).await;
    let payload = response.payload.unwrap();
    assert_eq!(payload["chat_assist"], true);
    assert_eq!(payload["api_key_configured"], false);
    assert!(payload.get("api_key").is_none(), "secrets never cross the boundary");

    // Generation without a conversation is an error envelope, not a panic.
    let response = dispatch(
        h.coordinator.as_ref(),
        CommandRequest::GenerateSuggestion { is_opener: false, is_follow_up: false },
    )
    .await;
    assert!(!response.success);
    assert!(response.error.is_some());
}
