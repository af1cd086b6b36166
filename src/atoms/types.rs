// ── Wingmate Atoms: Pure Data Types ────────────────────────────────────────
// All plain struct/enum definitions with no I/O.
// Atoms layer rule: no side effects, no imports from engine/.
//
// Wire names follow the command-protocol conventions: lowercase enum
// discriminants, snake_case fields, `#[serde(default)]` on every persisted
// bucket so reads default-merge missing keys (forward-compatible schema).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::atoms::constants::*;

// ── Entities ───────────────────────────────────────────────────────────────

/// A discovered profile. Immutable once extracted: a new identity fingerprint
/// always produces a new `Entity`, never a mutation of an old one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    /// Truncated raw-text digest identifying this profile on the surface.
    pub identity_hash: String,
    /// Mandatory extraction field; `"Unknown"` when the budget ran out.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_image: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl Entity {
    /// Placeholder entity emitted when extraction exhausted its budget.
    /// The pipeline must never block indefinitely on an unreliable surface.
    pub fn placeholder(identity_hash: impl Into<String>) -> Self {
        Entity {
            identity_hash: identity_hash.into(),
            name: "Unknown".to_string(),
            age: None,
            bio: None,
            images: Vec::new(),
            primary_image: None,
            detected_at: Utc::now(),
        }
    }

    /// Whether the mandatory extraction condition is met.
    pub fn name_resolved(&self) -> bool {
        !self.name.is_empty() && self.name != "Unknown"
    }
}

// ── Conversations ──────────────────────────────────────────────────────────

/// Message author, relative to the coordinator's user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Sender {
    #[serde(rename = "self")]
    Own,
    #[serde(rename = "other")]
    Counterpart,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        ChatMessage { sender, text: text.into(), received_at: Utc::now() }
    }
}

/// An active conversation. Exactly one is active at a time; creating a new
/// one supersedes the prior (messages are discarded, not merged — they
/// belong to the externally-tracked conversation, not to us).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub context_id: Uuid,
    pub counterpart_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterpart_photo: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Version active when this context was created. All inference results
    /// carry the version they were issued under and are void once it no
    /// longer matches the coordinator's current version.
    pub version: u64,
}

/// Per-context lifecycle. `Switching` is a transient guard state: while in
/// it (or while the new context is still loading), auto-suggestion triggers
/// are suppressed until the swap has settled.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContextPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Switching,
}

impl ContextPhase {
    /// Legal transitions of the context state machine.
    pub fn can_transition(self, to: ContextPhase) -> bool {
        use ContextPhase::*;
        matches!(
            (self, to),
            (Idle, Loading)
                | (Loading, Ready)
                | (Ready, Switching)
                | (Switching, Loading)
                // A fresh identity can land while the previous one is still
                // being extracted.
                | (Loading, Switching)
        )
    }
}

// ── Surface snapshots ──────────────────────────────────────────────────────
// The Surface Observer hands us already-identified fields. This crate never
// inspects structural details of the page.

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceView {
    /// Browsing profiles one at a time.
    Discovery,
    /// A conversation is open.
    Conversation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawProfile {
    pub name: Option<String>,
    pub age: Option<u8>,
    pub bio: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConversation {
    pub counterpart_name: Option<String>,
    pub counterpart_photo: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub view: SurfaceView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<RawProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<RawConversation>,
}

impl RawSnapshot {
    pub fn discovery(profile: RawProfile) -> Self {
        RawSnapshot { view: SurfaceView::Discovery, profile: Some(profile), conversation: None }
    }

    pub fn conversation(conversation: RawConversation) -> Self {
        RawSnapshot {
            view: SurfaceView::Conversation,
            profile: None,
            conversation: Some(conversation),
        }
    }

    /// An empty discovery snapshot — the surface exposed nothing usable.
    pub fn empty() -> Self {
        RawSnapshot { view: SurfaceView::Discovery, profile: None, conversation: None }
    }
}

// ── Analysis & decisions ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BioAnalysis {
    #[serde(default)]
    pub personality: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub looking_for: Option<String>,
    #[serde(default)]
    pub green_flags: Vec<String>,
    #[serde(default)]
    pub red_flags: Vec<String>,
    #[serde(default)]
    pub conversation_starters: Vec<String>,
}

/// Result of entity analysis. `error` carries a terminal or transient
/// backend failure verbatim; raw entity data is still displayed alongside.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<BioAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    pub fn from_error(message: impl Into<String>) -> Self {
        AnalysisResult { bio: None, error: Some(message.into()) }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Accept,
    Reject,
    Super,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub direction: Direction,
    /// 0–100.
    pub confidence: u8,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl Decision {
    /// Safe default used whenever the inference call fails: an ambiguous
    /// case must never silently produce an affirmative action.
    pub fn safe_default() -> Self {
        Decision {
            direction: Direction::Reject,
            confidence: BASELINE_CONFIDENCE,
            reasons: vec!["inference unavailable".to_string()],
        }
    }
}

// ── Generation ─────────────────────────────────────────────────────────────

/// Three-way classification of a generation request. Changes the instruction
/// given to the backend, not the concurrency contract.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// No messages yet.
    Opener,
    /// The counterpart sent the last message.
    Reply,
    /// We sent the last message and no reply has arrived.
    FollowUp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub mode: GenerationMode,
}

/// How a generation request was issued. Auto triggers are suppressed while
/// a context swap is settling; manual requests are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Auto,
    Manual,
}

// ── Typed operation outcomes ───────────────────────────────────────────────
// Single-flight rejection and stale-context discard are expected behaviors,
// not errors.

#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    Completed(AnalysisResult),
    /// Another inference call was in flight; this one was dropped.
    Ignored,
    /// The context moved on while the call was in flight; silently discarded.
    Stale,
}

#[derive(Debug, Clone)]
pub enum SuggestionOutcome {
    Completed(Suggestion),
    Ignored,
    Stale,
    /// An auto trigger arrived while a context swap was still settling.
    Suppressed,
}

// ── Surface actions ────────────────────────────────────────────────────────

/// Commands emitted back to the surface. Fire-and-forget: the coordinator
/// does not block on or retry executor failures, only logs them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SurfaceAction {
    Decision { direction: Direction, confidence: u8 },
    DraftMessage { text: String },
}

// ── Learning profiles ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub entity: Entity,
    pub recorded_at: DateTime<Utc>,
}

/// The user's learned preference profile. Derived fields (`traits`,
/// `interests`, `deal_breakers`, `must_haves`) are replaced wholesale by
/// each retraining cycle, never incrementally patched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferenceProfile {
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub deal_breakers: Vec<String>,
    #[serde(default)]
    pub must_haves: Vec<String>,
    #[serde(default)]
    pub type_summary: Option<String>,
    #[serde(default)]
    pub liked_history: VecDeque<HistoryEntry>,
    #[serde(default)]
    pub disliked_history: VecDeque<HistoryEntry>,
}

/// Derived preference fields as returned by one retraining cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferenceDelta {
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub deal_breakers: Vec<String>,
    #[serde(default)]
    pub must_haves: Vec<String>,
    #[serde(default)]
    pub type_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleSample {
    pub text: String,
    pub recorded_at: DateTime<Utc>,
}

/// The user's learned writing style. Derived fields are replaced wholesale
/// per retraining cycle; samples accumulate one at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleProfile {
    #[serde(default = "default_tone")]
    pub tone: String,
    #[serde(default = "default_emoji_usage")]
    pub emoji_usage: String,
    #[serde(default)]
    pub message_length: Option<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub vocabulary: Vec<String>,
    #[serde(default)]
    pub samples: VecDeque<StyleSample>,
}

fn default_tone() -> String {
    "casual".to_string()
}

fn default_emoji_usage() -> String {
    "moderate".to_string()
}

impl Default for StyleProfile {
    fn default() -> Self {
        StyleProfile {
            tone: default_tone(),
            emoji_usage: default_emoji_usage(),
            message_length: None,
            patterns: Vec::new(),
            vocabulary: Vec::new(),
            samples: VecDeque::new(),
        }
    }
}

/// Derived style fields as returned by one retraining cycle. `None` fields
/// keep their prior value (the backend declined to classify).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StyleAnalysis {
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub emoji_usage: Option<String>,
    #[serde(default)]
    pub message_length: Option<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub vocabulary: Vec<String>,
}

// ── Settings & stats buckets ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub auto_decide: bool,
    #[serde(default)]
    pub chat_assist: bool,
    #[serde(default = "default_true")]
    pub learn_preferences: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            auto_decide: false,
            chat_assist: false,
            learn_preferences: true,
            api_key: String::new(),
            api_base_url: None,
            model: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub decisions: u64,
    #[serde(default)]
    pub accepts: u64,
    #[serde(default)]
    pub rejects: u64,
    #[serde(default)]
    pub super_likes: u64,
    #[serde(default)]
    pub chats: u64,
    #[serde(default)]
    pub sessions_count: u64,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
}

// ── Coordinator configuration ──────────────────────────────────────────────

/// Timing budgets for the extraction/settle machinery. Defaults match the
/// cadence of a progressively rendering surface; tests zero them out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub extract_initial_delay_ms: u64,
    pub extract_retry_delay_ms: u64,
    pub extract_max_retries: u32,
    pub conversation_load_attempts: u32,
    pub conversation_load_delay_ms: u64,
    pub settle_delay_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            extract_initial_delay_ms: DEFAULT_EXTRACT_INITIAL_DELAY_MS,
            extract_retry_delay_ms: DEFAULT_EXTRACT_RETRY_DELAY_MS,
            extract_max_retries: DEFAULT_EXTRACT_MAX_RETRIES,
            conversation_load_attempts: DEFAULT_CONVERSATION_LOAD_ATTEMPTS,
            conversation_load_delay_ms: DEFAULT_CONVERSATION_LOAD_DELAY_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl CoordinatorConfig {
    /// All delays zeroed — used by tests to run the pipeline synchronously.
    pub fn immediate() -> Self {
        CoordinatorConfig {
            extract_initial_delay_ms: 0,
            extract_retry_delay_ms: 0,
            extract_max_retries: DEFAULT_EXTRACT_MAX_RETRIES,
            conversation_load_attempts: DEFAULT_CONVERSATION_LOAD_ATTEMPTS,
            conversation_load_delay_ms: 0,
            settle_delay_ms: 0,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}
