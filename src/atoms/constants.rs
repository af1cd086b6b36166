// ── Wingmate Atoms: Constants ──────────────────────────────────────────────
// All named constants for the crate live here.
// Rationale: collecting constants in one place eliminates magic numbers,
// makes auditing easier, and keeps every layer's code self-documenting.

// ── Learning history caps ──────────────────────────────────────────────────
// Bounded FIFO histories: insertion past the cap evicts oldest-first.
pub const LIKED_HISTORY_CAP: usize = 100;
pub const DISLIKED_HISTORY_CAP: usize = 100;
pub const STYLE_SAMPLE_CAP: usize = 200;

// ── Retraining schedule ────────────────────────────────────────────────────
// Preference retraining fires when the combined history length is a multiple
// of PREFERENCE_RETRAIN_INTERVAL, but only once the liked history exceeds
// PREFERENCE_MIN_LIKED — fewer accepted samples carry too little signal.
pub const PREFERENCE_RETRAIN_INTERVAL: usize = 10;
pub const PREFERENCE_MIN_LIKED: usize = 5;

// Style retraining needs a floor of STYLE_MIN_SAMPLES, then fires every
// STYLE_RETRAIN_INTERVAL additional samples.
pub const STYLE_MIN_SAMPLES: usize = 10;
pub const STYLE_RETRAIN_INTERVAL: usize = 5;

// Samples shorter than this are too short to be informative and are ignored.
pub const MIN_STYLE_SAMPLE_CHARS: usize = 2;

// ── Inference payload windows ──────────────────────────────────────────────
// Only the most recent entries are sent to the backend per retraining cycle.
pub const PREFERENCE_PROMPT_WINDOW: usize = 30;
pub const STYLE_PROMPT_WINDOW: usize = 20;

// Bios below this length are not worth an analysis call.
pub const MIN_BIO_CHARS_FOR_ANALYSIS: usize = 10;

// ── Change detection ───────────────────────────────────────────────────────
// Identity fingerprints are truncated raw-text digests; unbounded text would
// make every render jitter in a long bio look like a new identity.
pub const FINGERPRINT_MAX_CHARS: usize = 50;

// ── Decision fallback ──────────────────────────────────────────────────────
// Confidence reported when the inference backend is unavailable and the
// safe default (reject) is emitted instead.
pub const BASELINE_CONFIDENCE: u8 = 50;

// ── Default timings (CoordinatorConfig::default) ───────────────────────────
// The surface renders progressively; these budgets bound how long the
// pipeline waits for required fields before degrading.
pub(crate) const DEFAULT_EXTRACT_INITIAL_DELAY_MS: u64 = 800;
pub(crate) const DEFAULT_EXTRACT_RETRY_DELAY_MS: u64 = 600;
pub(crate) const DEFAULT_EXTRACT_MAX_RETRIES: u32 = 3;
pub(crate) const DEFAULT_CONVERSATION_LOAD_ATTEMPTS: u32 = 5;
pub(crate) const DEFAULT_CONVERSATION_LOAD_DELAY_MS: u64 = 500;
pub(crate) const DEFAULT_SETTLE_DELAY_MS: u64 = 1200;
pub(crate) const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
