// ── Wingmate Atoms: Collaborator Traits ────────────────────────────────────
// The seams between the coordinator and the outside world. Every external
// collaborator (the surface, the action mechanism, the inference backend,
// the persistent store) enters the engine only through these traits, so
// tests swap in scripted doubles.

use async_trait::async_trait;

use crate::atoms::error::EngineResult;
use crate::atoms::types::*;

// ── Surface Observer ───────────────────────────────────────────────────────

/// Read-only view of the externally mutating surface. The coordinator never
/// inspects structural details; it only receives snapshots of
/// already-identified fields. Mutation notifications arrive separately via
/// the channel handed to the detector task.
#[async_trait]
pub trait SurfaceObserver: Send + Sync {
    async fn read_snapshot(&self) -> RawSnapshot;
}

// ── Action Executor ────────────────────────────────────────────────────────

/// Performs an action on the surface. Fire-and-forget: a `false` return is
/// logged by the caller and never retried.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: SurfaceAction) -> bool;
}

// ── Inference Service ──────────────────────────────────────────────────────

/// The inference backend. Every call may fail with
/// `EngineError::CredentialMissing` (terminal, not retried) or a transient
/// request failure (surfaced per call; the pipeline continues).
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn analyze_entity(&self, entity: &Entity) -> EngineResult<AnalysisResult>;

    async fn decide(
        &self,
        entity: &Entity,
        analysis: &AnalysisResult,
        preferences: &PreferenceProfile,
    ) -> EngineResult<Decision>;

    async fn analyze_preferences(
        &self,
        liked: &[HistoryEntry],
        disliked: &[HistoryEntry],
    ) -> EngineResult<PreferenceDelta>;

    async fn analyze_style(&self, samples: &[StyleSample]) -> EngineResult<StyleAnalysis>;

    async fn generate_message(
        &self,
        context: &Context,
        style: &StyleProfile,
        mode: GenerationMode,
    ) -> EngineResult<String>;
}

// ── Persistent Store ───────────────────────────────────────────────────────

/// Raw bucket storage. Whole-object read-modify-write, last-writer-wins;
/// the typed `Storage` wrapper default-merges on every read.
pub trait StoreBackend: Send + Sync {
    fn get_raw(&self, bucket: &str) -> EngineResult<Option<String>>;
    fn set_raw(&self, bucket: &str, json: &str) -> EngineResult<()>;
}
