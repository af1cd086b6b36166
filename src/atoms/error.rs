// ── Wingmate Atoms: Error Types ────────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (Store, Network, Inference…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • `CredentialMissing` is terminal for the calling operation and is never
//     retried; `Inference` is transient and surfaced per call.
//   • Extraction never produces an error — it degrades to a placeholder
//     entity. Stale-result drops are typed outcomes, not errors.
//   • No variant carries secret material (API keys) in its message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer). Transient.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SQLite / rusqlite store failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The inference backend has no credentials. Terminal for the calling
    /// operation — a configuration problem, not a transient fault.
    #[error("No API key configured")]
    CredentialMissing,

    /// Inference backend request failure (non-secret detail only). Transient:
    /// surfaced to the immediate caller, the pipeline continues.
    #[error("Inference error: {capability}: {message}")]
    Inference { capability: String, message: String },

    /// Coordinator or collaborator configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    /// Prefer adding a specific variant over using this in new code.
    #[error("{0}")]
    Other(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl EngineError {
    /// Create an inference error with capability name and message.
    pub fn inference(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Inference { capability: capability.into(), message: message.into() }
    }

    /// Whether this error is terminal for the operation that raised it
    /// (retrying cannot help until the user changes configuration).
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineError::CredentialMissing | EngineError::Config(_))
    }
}

// ── Migration bridge: String → EngineError ─────────────────────────────────
// Allows `?` on helpers still returning `Result<T, String>` inside functions
// that return `EngineResult<T>`.

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All engine operations should return this type.
/// At UI-facing command boundaries, convert with `.to_string()`.
pub type EngineResult<T> = Result<T, EngineError>;

// ── Conversion: EngineError → String ───────────────────────────────────────
// Lets command-envelope code call `.map_err(EngineError::into)` directly.

impl From<EngineError> for String {
    fn from(e: EngineError) -> Self {
        e.to_string()
    }
}
