// Wingmate Engine — Decision/Action Emitter
// Combines inference output and the learned preference profile into a
// concrete action. The decision itself is a pass-through: preferences are
// sent to the backend as context, never evaluated locally. Whenever the
// inference call fails the safe default (reject, baseline confidence) is
// used — an ambiguous case must never silently produce an affirmative
// action. Emission is fire-and-forget; executor failures are logged only.

use std::sync::Arc;

use log::{info, warn};

use crate::atoms::traits::{ActionExecutor, InferenceService};
use crate::atoms::types::*;
use crate::engine::storage::Storage;

pub struct DecisionEmitter {
    inference: Arc<dyn InferenceService>,
    executor: Arc<dyn ActionExecutor>,
    storage: Arc<Storage>,
}

impl DecisionEmitter {
    pub fn new(
        inference: Arc<dyn InferenceService>,
        executor: Arc<dyn ActionExecutor>,
        storage: Arc<Storage>,
    ) -> Self {
        DecisionEmitter { inference, executor, storage }
    }

    /// Decide on an entity via the backend, falling back to the safe
    /// default on any failure.
    pub async fn decide(
        &self,
        entity: &Entity,
        analysis: &AnalysisResult,
        preferences: &PreferenceProfile,
    ) -> Decision {
        match self.inference.decide(entity, analysis, preferences).await {
            Ok(decision) => {
                info!(
                    "[decision] '{}' -> {:?} ({}%)",
                    entity.name, decision.direction, decision.confidence
                );
                decision
            }
            Err(e) => {
                warn!("[decision] inference failed for '{}', using safe default: {}", entity.name, e);
                Decision::safe_default()
            }
        }
    }

    /// Emit a directional decision to the surface and record it in stats.
    pub async fn emit_decision(&self, decision: &Decision) {
        self.record_stats(decision.direction);
        let ok = self
            .executor
            .execute(SurfaceAction::Decision {
                direction: decision.direction,
                confidence: decision.confidence,
            })
            .await;
        if !ok {
            warn!("[decision] executor failed to perform {:?}", decision.direction);
        }
    }

    /// Push a suggested message onto the surface as an editable draft.
    pub async fn emit_draft(&self, suggestion: &Suggestion) {
        let ok = self
            .executor
            .execute(SurfaceAction::DraftMessage { text: suggestion.text.clone() })
            .await;
        if !ok {
            warn!("[decision] executor failed to draft {:?} suggestion", suggestion.mode);
        }
    }

    /// Count a decision, whoever made it (user or coordinator).
    pub fn record_stats(&self, direction: Direction) {
        let result = self.storage.update_stats(|stats| {
            stats.decisions += 1;
            match direction {
                Direction::Accept => stats.accepts += 1,
                Direction::Reject => stats.rejects += 1,
                Direction::Super => stats.super_likes += 1,
            }
        });
        if let Err(e) = result {
            warn!("[decision] failed to record stats: {}", e);
        }
    }
}
