// Wingmate Engine — Learning Accumulators
// Bounded-history learners that periodically retrain on accumulated
// samples. Both follow the same shape: FIFO-evicting history with a hard
// cap, a retraining trigger evaluated synchronously with the append that
// causes it (so interleaving cannot skip the modulus check), and wholesale
// replacement of the derived fields from the backend's output. Retraining
// failures are caught and logged; prior derived state stays intact.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::atoms::constants::*;
use crate::atoms::traits::InferenceService;
use crate::atoms::types::{
    Entity, HistoryEntry, PreferenceProfile, StyleProfile, StyleSample,
};
use crate::engine::storage::Storage;

// ── Bounded push ───────────────────────────────────────────────────────────

/// Push onto a bounded FIFO history, evicting oldest-first past the cap.
fn bounded_push<T>(history: &mut VecDeque<T>, cap: usize, item: T) {
    history.push_back(item);
    while history.len() > cap {
        history.pop_front();
    }
}

// ── Preference learner ─────────────────────────────────────────────────────

/// Accumulates accepted/rejected entities and periodically re-derives the
/// user's preference profile.
pub struct PreferenceLearner {
    profile: Mutex<PreferenceProfile>,
    storage: Arc<Storage>,
}

impl PreferenceLearner {
    /// Load the persisted profile (default-merged) into a fresh learner.
    pub fn new(storage: Arc<Storage>) -> Self {
        let profile = storage.preferences();
        PreferenceLearner { profile: Mutex::new(profile), storage }
    }

    /// Append one decision to the bounded history. Returns `true` when a
    /// retraining cycle is due — the trigger is evaluated under the same
    /// lock as the append.
    pub fn record(&self, entity: Entity, accepted: bool) -> bool {
        let mut profile = self.profile.lock();
        let entry = HistoryEntry { entity, recorded_at: chrono::Utc::now() };
        if accepted {
            bounded_push(&mut profile.liked_history, LIKED_HISTORY_CAP, entry);
        } else {
            bounded_push(&mut profile.disliked_history, DISLIKED_HISTORY_CAP, entry);
        }
        self.persist(&profile);

        let liked = profile.liked_history.len();
        let total = liked + profile.disliked_history.len();
        let due = total % PREFERENCE_RETRAIN_INTERVAL == 0 && liked > PREFERENCE_MIN_LIKED;
        if total % PREFERENCE_RETRAIN_INTERVAL == 0 && !due {
            debug!(
                "[learning] preference retraining skipped: only {} liked entries",
                liked
            );
        }
        due
    }

    /// Re-derive traits/interests/deal-breakers/must-haves from the recent
    /// history windows. Derived fields are replaced wholesale; a failed
    /// call leaves the prior profile untouched.
    pub async fn retrain(&self, inference: &dyn InferenceService) {
        let (liked, disliked) = {
            let profile = self.profile.lock();
            (
                recent_window(&profile.liked_history, PREFERENCE_PROMPT_WINDOW),
                recent_window(&profile.disliked_history, PREFERENCE_PROMPT_WINDOW),
            )
        };

        info!(
            "[learning] retraining preferences on {} liked / {} disliked entries",
            liked.len(),
            disliked.len()
        );
        match inference.analyze_preferences(&liked, &disliked).await {
            Ok(delta) => {
                let mut profile = self.profile.lock();
                profile.traits = delta.traits;
                profile.interests = delta.interests;
                profile.deal_breakers = delta.deal_breakers;
                profile.must_haves = delta.must_haves;
                profile.type_summary = delta.type_summary;
                self.persist(&profile);
                info!("[learning] preference profile updated");
            }
            Err(e) => warn!("[learning] preference retraining failed: {}", e),
        }
    }

    /// Append and, when due, retrain in one call.
    pub async fn record_and_retrain(
        &self,
        entity: Entity,
        accepted: bool,
        inference: &dyn InferenceService,
    ) {
        if self.record(entity, accepted) {
            self.retrain(inference).await;
        }
    }

    pub fn profile(&self) -> PreferenceProfile {
        self.profile.lock().clone()
    }

    fn persist(&self, profile: &PreferenceProfile) {
        if let Err(e) = self.storage.set_preferences(profile) {
            warn!("[learning] failed to persist preferences: {}", e);
        }
    }
}

fn recent_window(history: &VecDeque<HistoryEntry>, window: usize) -> Vec<HistoryEntry> {
    let skip = history.len().saturating_sub(window);
    history.iter().skip(skip).cloned().collect()
}

// ── Style learner ──────────────────────────────────────────────────────────

/// Accumulates the user's own message samples and periodically re-derives
/// their writing style.
pub struct StyleLearner {
    profile: Mutex<StyleProfile>,
    storage: Arc<Storage>,
}

impl StyleLearner {
    pub fn new(storage: Arc<Storage>) -> Self {
        let profile = storage.chat_style();
        StyleLearner { profile: Mutex::new(profile), storage }
    }

    /// Append one sample. Samples below the minimum length are ignored.
    /// Returns `true` when a retraining cycle is due.
    pub fn record(&self, text: impl Into<String>) -> bool {
        let text = text.into();
        if text.trim().len() < MIN_STYLE_SAMPLE_CHARS {
            return false;
        }

        let mut profile = self.profile.lock();
        bounded_push(
            &mut profile.samples,
            STYLE_SAMPLE_CAP,
            StyleSample { text, recorded_at: chrono::Utc::now() },
        );
        self.persist(&profile);

        let count = profile.samples.len();
        count >= STYLE_MIN_SAMPLES && count % STYLE_RETRAIN_INTERVAL == 0
    }

    /// Re-derive tone/emoji/length/patterns/vocabulary from the recent
    /// sample window. `None` fields in the backend's answer keep their
    /// prior values; a failed call leaves everything untouched.
    pub async fn retrain(&self, inference: &dyn InferenceService) {
        let samples: Vec<StyleSample> = {
            let profile = self.profile.lock();
            let skip = profile.samples.len().saturating_sub(STYLE_PROMPT_WINDOW);
            profile.samples.iter().skip(skip).cloned().collect()
        };

        info!("[learning] re-analyzing style on {} samples", samples.len());
        match inference.analyze_style(&samples).await {
            Ok(analysis) => {
                let mut profile = self.profile.lock();
                if let Some(tone) = analysis.tone {
                    profile.tone = tone;
                }
                if let Some(emoji) = analysis.emoji_usage {
                    profile.emoji_usage = emoji;
                }
                profile.message_length = analysis.message_length;
                profile.patterns = analysis.patterns;
                profile.vocabulary = analysis.vocabulary;
                self.persist(&profile);
                info!(
                    "[learning] style updated: tone={}, emoji={}",
                    profile.tone, profile.emoji_usage
                );
            }
            Err(e) => warn!("[learning] style analysis failed: {}", e),
        }
    }

    pub async fn record_and_retrain(&self, text: impl Into<String>, inference: &dyn InferenceService) {
        if self.record(text) {
            self.retrain(inference).await;
        }
    }

    pub fn profile(&self) -> StyleProfile {
        self.profile.lock().clone()
    }

    fn persist(&self, profile: &StyleProfile) {
        if let Err(e) = self.storage.set_chat_style(profile) {
            warn!("[learning] failed to persist chat style: {}", e);
        }
    }
}
