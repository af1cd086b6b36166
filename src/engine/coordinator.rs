// Wingmate Engine — Coordinator
// The façade wiring detector → extraction → orchestrator → emitter, with
// the learning accumulators feeding context back into the loop. One
// instance owns one `CoordinatorState`; there are no ambient globals, so
// tests run independent coordinators side by side.
//
// Scheduling is cooperative: the only suspension points are inference
// calls, extraction delays, and the settle delay after a context swap.
// The state mutex is never held across any of them.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{ActionExecutor, InferenceService, SurfaceObserver};
use crate::atoms::types::*;
use crate::engine::decision::DecisionEmitter;
use crate::engine::detector::{ChangeDetector, MutationFeed};
use crate::engine::extraction::{admit_message, extract_conversation, extract_entity};
use crate::engine::learning::{PreferenceLearner, StyleLearner};
use crate::engine::orchestrator::{CoordinatorState, Orchestrator};
use crate::engine::storage::Storage;

pub struct Coordinator {
    config: CoordinatorConfig,
    state: Arc<Mutex<CoordinatorState>>,
    detector: Mutex<ChangeDetector>,
    orchestrator: Orchestrator,
    emitter: DecisionEmitter,
    pub preferences: PreferenceLearner,
    pub style: StyleLearner,
    observer: Arc<dyn SurfaceObserver>,
    inference: Arc<dyn InferenceService>,
    storage: Arc<Storage>,
}

impl Coordinator {
    pub fn new(
        observer: Arc<dyn SurfaceObserver>,
        inference: Arc<dyn InferenceService>,
        executor: Arc<dyn ActionExecutor>,
        storage: Arc<Storage>,
        config: CoordinatorConfig,
    ) -> Self {
        let state = Arc::new(Mutex::new(CoordinatorState::default()));
        Coordinator {
            config,
            orchestrator: Orchestrator::new(Arc::clone(&state), Arc::clone(&inference)),
            emitter: DecisionEmitter::new(
                Arc::clone(&inference),
                executor,
                Arc::clone(&storage),
            ),
            preferences: PreferenceLearner::new(Arc::clone(&storage)),
            style: StyleLearner::new(Arc::clone(&storage)),
            detector: Mutex::new(ChangeDetector::new()),
            state,
            observer,
            inference,
            storage,
        }
    }

    // ── Detection ──────────────────────────────────────────────────────

    /// The single reconciliation path. Mutation events and poll ticks both
    /// land here; the fingerprint dedup makes repeat calls no-ops.
    pub async fn check_for_change(&self) -> EngineResult<()> {
        let snapshot = self.observer.read_snapshot().await;
        let changed = self.detector.lock().check(&snapshot);
        let Some(fingerprint) = changed else {
            return Ok(());
        };
        self.handle_identity_change(fingerprint, snapshot.view).await
    }

    /// Run the dual detection channels until the mutation feed closes.
    /// Both arms converge on `check_for_change`; the poll interval is the
    /// safety net for transitions the event channel misses.
    pub async fn run(self: Arc<Self>, mut mutations: mpsc::Receiver<()>) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!("[coordinator] detection loop started");
        loop {
            let result = tokio::select! {
                _ = ticker.tick() => self.check_for_change().await,
                event = mutations.recv() => match event {
                    Some(()) => self.check_for_change().await,
                    None => break,
                },
            };
            if let Err(e) = result {
                warn!("[coordinator] change check failed: {}", e);
            }
        }
        info!("[coordinator] detection loop stopped");
    }

    /// Convenience: build a mutation feed sized for bursty surfaces.
    pub fn mutation_feed() -> (MutationFeed, mpsc::Receiver<()>) {
        MutationFeed::channel(8)
    }

    /// A new identity fingerprint appeared: supersede the current
    /// entity/context and start extraction.
    async fn handle_identity_change(
        &self,
        fingerprint: String,
        view: SurfaceView,
    ) -> EngineResult<()> {
        let was_active = {
            let mut state = self.state.lock();
            if state.phase == ContextPhase::Idle {
                state.transition(ContextPhase::Loading);
            } else {
                state.transition(ContextPhase::Switching);
            }
            let version = state.begin_swap();
            debug!("[coordinator] identity change -> v{}", version);
            state.phase == ContextPhase::Switching
        };

        match view {
            SurfaceView::Discovery => self.load_entity(fingerprint).await,
            SurfaceView::Conversation => self.load_conversation(was_active).await,
        }
    }

    // ── Entity pipeline ────────────────────────────────────────────────

    async fn load_entity(&self, fingerprint: String) -> EngineResult<()> {
        {
            let mut state = self.state.lock();
            state.transition(ContextPhase::Loading);
        }
        let entity = extract_entity(self.observer.as_ref(), &self.config, &fingerprint).await;
        {
            let mut state = self.state.lock();
            state.entity = Some(entity.clone());
            state.transition(ContextPhase::Ready);
        }

        let settings = self.storage.settings();
        if !settings.learn_preferences && !settings.auto_decide {
            return Ok(());
        }

        let analysis = self.analyze_entity(&entity).await?;
        let Some(analysis) = analysis else {
            return Ok(());
        };

        let auto = settings.auto_decide && self.state.lock().auto_deciding;
        if auto && analysis.error.is_none() {
            let decision = self
                .emitter
                .decide(&entity, &analysis, &self.preferences.profile())
                .await;
            self.emitter.emit_decision(&decision).await;
            if settings.learn_preferences {
                let accepted = decision.direction != Direction::Reject;
                self.preferences
                    .record_and_retrain(entity, accepted, self.inference.as_ref())
                    .await;
            }
        }
        Ok(())
    }

    /// Analyze an entity, degrading to an error-carrying result so raw
    /// entity data is still served when inference is unavailable.
    /// `None` means the call was ignored (single-flight) or went stale.
    pub async fn analyze_entity(&self, entity: &Entity) -> EngineResult<Option<AnalysisResult>> {
        match self.orchestrator.analyze(entity).await {
            Ok(AnalysisOutcome::Completed(analysis)) => Ok(Some(analysis)),
            Ok(AnalysisOutcome::Ignored) | Ok(AnalysisOutcome::Stale) => Ok(None),
            Err(e @ EngineError::CredentialMissing) => {
                info!("[coordinator] analysis skipped: {}", e);
                Ok(Some(AnalysisResult::from_error(e.to_string())))
            }
            Err(e) => {
                warn!("[coordinator] analysis failed: {}", e);
                Ok(Some(AnalysisResult::from_error(e.to_string())))
            }
        }
    }

    // ── Conversation pipeline ──────────────────────────────────────────

    /// Open a conversation explicitly (surface event from the front-end
    /// rather than the detector). Supersedes any active context.
    pub async fn open_conversation(&self) -> EngineResult<()> {
        let was_active = {
            let mut state = self.state.lock();
            if state.phase == ContextPhase::Idle {
                state.transition(ContextPhase::Loading);
            } else {
                state.transition(ContextPhase::Switching);
            }
            state.begin_swap();
            state.phase == ContextPhase::Switching
        };
        self.load_conversation(was_active).await
    }

    async fn load_conversation(&self, settle_first: bool) -> EngineResult<()> {
        // The surface needs time to tear down the old conversation; an
        // immediate read would hand us the superseded one.
        if settle_first {
            sleep(Duration::from_millis(self.config.settle_delay_ms)).await;
        }
        let version = {
            let mut state = self.state.lock();
            state.transition(ContextPhase::Loading);
            state.version
        };
        let context =
            extract_conversation(self.observer.as_ref(), &self.config, version).await;
        let counterpart = context.counterpart_name.clone();
        {
            let mut state = self.state.lock();
            state.context = Some(context);
            state.transition(ContextPhase::Ready);
        }
        info!("[coordinator] conversation with '{}' ready (v{})", counterpart, version);

        if let Err(e) = self.storage.update_stats(|stats| stats.chats += 1) {
            warn!("[coordinator] failed to record chat stat: {}", e);
        }

        if self.storage.settings().chat_assist {
            self.auto_suggest().await;
        }
        Ok(())
    }

    /// Auto-triggered suggestion: suppressed while a swap is settling,
    /// ignored under single-flight, and failures never bubble out.
    pub async fn auto_suggest(&self) -> Option<Suggestion> {
        let style = self.style.profile();
        match self.orchestrator.generate(&style, None, Trigger::Auto).await {
            Ok(SuggestionOutcome::Completed(suggestion)) => {
                self.emitter.emit_draft(&suggestion).await;
                Some(suggestion)
            }
            Ok(outcome) => {
                debug!("[coordinator] auto suggestion not produced: {:?}", outcome);
                None
            }
            Err(e) => {
                warn!("[coordinator] auto suggestion failed: {}", e);
                None
            }
        }
    }

    /// Manual generation request from the command layer. The explicit
    /// opener/follow-up flags override last-sender classification.
    pub async fn generate_suggestion(
        &self,
        is_opener: bool,
        is_follow_up: bool,
    ) -> EngineResult<SuggestionOutcome> {
        let mode_hint = if is_opener {
            Some(GenerationMode::Opener)
        } else if is_follow_up {
            Some(GenerationMode::FollowUp)
        } else {
            None
        };
        let style = self.style.profile();
        let outcome = self
            .orchestrator
            .generate(&style, mode_hint, Trigger::Manual)
            .await?;
        if let SuggestionOutcome::Completed(suggestion) = &outcome {
            self.emitter.emit_draft(suggestion).await;
        }
        Ok(outcome)
    }

    /// A message from the counterpart arrived on the surface.
    pub async fn on_message_received(&self, text: String) -> Option<Suggestion> {
        let message = ChatMessage::new(Sender::Counterpart, text);
        if !admit_message(&message) {
            return None;
        }
        {
            let mut state = self.state.lock();
            let Some(context) = state.context.as_mut() else {
                debug!("[coordinator] message received with no active context, dropped");
                return None;
            };
            context.messages.push(message);
        }
        if self.storage.settings().chat_assist {
            self.auto_suggest().await
        } else {
            None
        }
    }

    /// The user sent a message: learn style from it, then line up a
    /// follow-up suggestion since we now spoke last.
    pub async fn on_message_sent(&self, text: String) -> Option<Suggestion> {
        {
            let mut state = self.state.lock();
            if let Some(context) = state.context.as_mut() {
                context.messages.push(ChatMessage::new(Sender::Own, text.clone()));
            }
        }
        self.style
            .record_and_retrain(text, self.inference.as_ref())
            .await;

        if self.storage.settings().chat_assist {
            self.auto_suggest().await
        } else {
            None
        }
    }

    // ── Decisions ──────────────────────────────────────────────────────

    /// The user (or the auto pipeline) took a decision on an entity:
    /// count it and feed the preference accumulator.
    pub async fn record_decision(&self, direction: Direction, entity: Entity) {
        self.emitter.record_stats(direction);
        if self.storage.settings().learn_preferences {
            let accepted = direction != Direction::Reject;
            self.preferences
                .record_and_retrain(entity, accepted, self.inference.as_ref())
                .await;
        }
    }

    // ── Toggles & state access ─────────────────────────────────────────

    pub async fn set_auto_decide(&self, enabled: bool) -> EngineResult<()> {
        self.storage.update_settings(|s| s.auto_decide = enabled)?;
        self.state.lock().auto_deciding = enabled;
        if enabled {
            info!("[coordinator] auto-decide enabled, re-checking current identity");
            // Force the current identity through the pipeline again.
            self.detector.lock().reset();
            self.check_for_change().await?;
        } else {
            info!("[coordinator] auto-decide disabled");
        }
        Ok(())
    }

    pub fn set_chat_assist(&self, enabled: bool) -> EngineResult<()> {
        self.storage.update_settings(|s| s.chat_assist = enabled)?;
        Ok(())
    }

    pub fn set_learn_preferences(&self, enabled: bool) -> EngineResult<()> {
        self.storage.update_settings(|s| s.learn_preferences = enabled)?;
        Ok(())
    }

    pub fn settings(&self) -> Settings {
        self.storage.settings()
    }

    pub fn stats(&self) -> Stats {
        self.storage.stats()
    }

    pub fn snapshot_state(&self) -> (u64, ContextPhase, bool) {
        let state = self.state.lock();
        (state.version, state.phase, state.in_flight)
    }

    pub fn current_entity(&self) -> Option<Entity> {
        self.state.lock().entity.clone()
    }

    pub fn current_context(&self) -> Option<Context> {
        self.state.lock().context.clone()
    }
}
