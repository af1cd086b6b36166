// Wingmate Engine — Extraction Retry Policy
// The surface renders progressively, so required fields may not exist on
// the first read. Extraction samples the snapshot repeatedly with short
// delays until the mandatory field stabilizes or the retry budget runs
// out, then degrades to a best-effort placeholder. It never fails: the
// pipeline must not block indefinitely on an unreliable source.

use std::time::Duration;

use chrono::Utc;
use log::{debug, info};
use tokio::time::sleep;

use crate::atoms::traits::SurfaceObserver;
use crate::atoms::types::{ChatMessage, Context, CoordinatorConfig, Entity, RawConversation, RawProfile};

// ── Entity extraction ──────────────────────────────────────────────────────

fn profile_name_resolved(profile: &Option<RawProfile>) -> bool {
    matches!(profile, Some(p) if p.name.as_deref().is_some_and(|n| !n.trim().is_empty()))
}

async fn read_profile(observer: &dyn SurfaceObserver) -> Option<RawProfile> {
    observer.read_snapshot().await.profile
}

/// Extract an entity for the given identity fingerprint.
///
/// Policy: wait for the initial render, then retry while the mandatory
/// field (name) is unresolved, up to `extract_max_retries` attempts with a
/// fixed short delay. Bio and images are optional and degrade gracefully.
pub async fn extract_entity(
    observer: &dyn SurfaceObserver,
    config: &CoordinatorConfig,
    identity_hash: &str,
) -> Entity {
    sleep(Duration::from_millis(config.extract_initial_delay_ms)).await;

    let mut profile = read_profile(observer).await;
    let mut retries = 0;
    while !profile_name_resolved(&profile) && retries < config.extract_max_retries {
        retries += 1;
        debug!(
            "[extraction] name unresolved, retry {}/{}",
            retries, config.extract_max_retries
        );
        sleep(Duration::from_millis(config.extract_retry_delay_ms)).await;
        profile = read_profile(observer).await;
    }

    let Some(profile) = profile else {
        info!("[extraction] surface exposed no profile, emitting placeholder");
        return Entity::placeholder(identity_hash);
    };

    let name = profile
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("Unknown")
        .to_string();

    let primary_image = profile.images.first().cloned();
    let entity = Entity {
        identity_hash: identity_hash.to_string(),
        name,
        age: profile.age,
        bio: profile.bio.filter(|b| !b.trim().is_empty()),
        images: profile.images,
        primary_image,
        detected_at: Utc::now(),
    };

    info!(
        "[extraction] extracted '{}' (resolved: {}, {} images)",
        entity.name,
        entity.name_resolved(),
        entity.images.len()
    );
    entity
}

// ── Conversation extraction ────────────────────────────────────────────────

/// Extract the open conversation into a fresh context carrying `version`.
///
/// Same policy as entities: the counterpart name is mandatory, messages are
/// retried while empty (an empty result after the budget is legitimate — a
/// brand-new match has no messages yet and gets an opener).
pub async fn extract_conversation(
    observer: &dyn SurfaceObserver,
    config: &CoordinatorConfig,
    version: u64,
) -> Context {
    let mut raw: Option<RawConversation> = None;
    let mut attempts = 0;
    while attempts < config.conversation_load_attempts {
        attempts += 1;
        raw = observer.read_snapshot().await.conversation;
        let loaded = raw
            .as_ref()
            .is_some_and(|c| c.counterpart_name.is_some() && !c.messages.is_empty());
        if loaded {
            break;
        }
        debug!(
            "[extraction] conversation incomplete, attempt {}/{}",
            attempts, config.conversation_load_attempts
        );
        sleep(Duration::from_millis(config.conversation_load_delay_ms)).await;
    }

    let raw = raw.unwrap_or_default();
    let counterpart_name = raw
        .counterpart_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("Unknown")
        .to_string();

    info!(
        "[extraction] loaded conversation with '{}' ({} messages, {} attempts)",
        counterpart_name,
        raw.messages.len(),
        attempts
    );

    Context {
        context_id: uuid::Uuid::new_v4(),
        counterpart_name,
        counterpart_photo: raw.counterpart_photo,
        messages: raw.messages,
        version,
    }
}

/// Append-only message admission: system banners and other non-message
/// text the observer could not classify are dropped before they reach the
/// context history.
pub fn admit_message(message: &ChatMessage) -> bool {
    message.text.trim().len() >= 3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{RawSnapshot, Sender};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Observer that replays a fixed sequence of snapshots, then repeats
    /// the last one — models a progressively rendering surface.
    struct ScriptedObserver {
        frames: Mutex<Vec<RawSnapshot>>,
    }

    impl ScriptedObserver {
        fn new(frames: Vec<RawSnapshot>) -> Self {
            Self { frames: Mutex::new(frames) }
        }
    }

    #[async_trait]
    impl SurfaceObserver for ScriptedObserver {
        async fn read_snapshot(&self) -> RawSnapshot {
            let mut frames = self.frames.lock();
            if frames.len() > 1 {
                frames.remove(0)
            } else {
                frames.first().cloned().unwrap_or_else(RawSnapshot::empty)
            }
        }
    }

    fn profile(name: Option<&str>, bio: Option<&str>) -> RawSnapshot {
        RawSnapshot::discovery(RawProfile {
            name: name.map(String::from),
            age: Some(25),
            bio: bio.map(String::from),
            images: vec!["https://img/1.jpg".into()],
        })
    }

    #[tokio::test]
    async fn retries_until_name_appears() {
        let observer = ScriptedObserver::new(vec![
            RawSnapshot::empty(),
            profile(None, None),
            profile(Some("Alice"), Some("climbing")),
        ]);
        let entity =
            extract_entity(&observer, &CoordinatorConfig::immediate(), "fp-alice").await;
        assert_eq!(entity.name, "Alice");
        assert_eq!(entity.bio.as_deref(), Some("climbing"));
        assert_eq!(entity.primary_image.as_deref(), Some("https://img/1.jpg"));
    }

    #[tokio::test]
    async fn budget_exhaustion_degrades_to_placeholder() {
        let observer = ScriptedObserver::new(vec![profile(None, None)]);
        let entity = extract_entity(&observer, &CoordinatorConfig::immediate(), "fp-x").await;
        assert_eq!(entity.name, "Unknown");
        assert!(!entity.name_resolved());
        assert_eq!(entity.identity_hash, "fp-x");
        // Optional fields still carried through best-effort.
        assert_eq!(entity.images.len(), 1);
    }

    #[tokio::test]
    async fn missing_surface_yields_placeholder() {
        let observer = ScriptedObserver::new(vec![RawSnapshot::empty()]);
        let entity = extract_entity(&observer, &CoordinatorConfig::immediate(), "fp-y").await;
        assert_eq!(entity.name, "Unknown");
        assert!(entity.images.is_empty());
    }

    #[tokio::test]
    async fn conversation_loads_once_messages_render() {
        let loaded = RawSnapshot::conversation(RawConversation {
            counterpart_name: Some("Jane".into()),
            counterpart_photo: None,
            messages: vec![ChatMessage::new(Sender::Counterpart, "hey there!")],
        });
        let observer = ScriptedObserver::new(vec![
            RawSnapshot::conversation(RawConversation::default()),
            loaded,
        ]);
        let ctx = extract_conversation(&observer, &CoordinatorConfig::immediate(), 7).await;
        assert_eq!(ctx.counterpart_name, "Jane");
        assert_eq!(ctx.messages.len(), 1);
        assert_eq!(ctx.version, 7);
    }

    #[tokio::test]
    async fn empty_conversation_is_legitimate_after_budget() {
        let observer = ScriptedObserver::new(vec![RawSnapshot::conversation(RawConversation {
            counterpart_name: Some("Sam".into()),
            counterpart_photo: None,
            messages: Vec::new(),
        })]);
        let ctx = extract_conversation(&observer, &CoordinatorConfig::immediate(), 2).await;
        assert_eq!(ctx.counterpart_name, "Sam");
        assert!(ctx.messages.is_empty());
    }

    #[test]
    fn short_fragments_are_not_admitted() {
        assert!(!admit_message(&ChatMessage::new(Sender::Own, "ok")));
        assert!(admit_message(&ChatMessage::new(Sender::Own, "see you tonight")));
    }
}
