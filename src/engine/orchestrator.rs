// Wingmate Engine — Analysis Orchestrator
// Issues inference calls for the active entity/context under a
// single-flight invariant and stamps every call with the version active at
// issue time. A completed result is applied only if its stamp still equals
// the current version; otherwise it is silently discarded. That discard is
// the sole ordering mechanism — completion order across versions is not
// otherwise guaranteed, and there is no true cancellation of an
// outstanding request.

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::InferenceService;
use crate::atoms::types::*;

// ── Shared coordinator state ───────────────────────────────────────────────

/// The single owned state block for one coordinator instance. No ambient
/// globals: tests instantiate independent coordinators.
///
/// Locking rule: the mutex is scoped to flag/version reads and writes and
/// is never held across an await.
#[derive(Default)]
pub struct CoordinatorState {
    /// Strictly increasing; incremented on every identity/context swap.
    /// No two contexts created in one coordinator lifetime share a version.
    pub version: u64,
    pub phase: ContextPhase,
    /// Single-flight flag: at most one inference call in flight per
    /// coordinator instance. Calls made while set are rejected immediately
    /// (ignored, not queued — stacking duplicate requests under rapid
    /// re-triggering wastes the inference budget and produces out-of-order
    /// updates).
    pub in_flight: bool,
    pub entity: Option<Entity>,
    pub context: Option<Context>,
    /// Runtime auto-decide switch (separate from the persisted setting).
    pub auto_deciding: bool,
}

impl CoordinatorState {
    /// Apply a phase transition, rejecting illegal ones.
    pub fn transition(&mut self, to: ContextPhase) -> bool {
        if self.phase == to {
            return true;
        }
        if !self.phase.can_transition(to) {
            warn!("[orchestrator] illegal phase transition {:?} -> {:?}", self.phase, to);
            return false;
        }
        debug!("[orchestrator] phase {:?} -> {:?}", self.phase, to);
        self.phase = to;
        true
    }

    /// Supersede whatever entity/context is active. The version bump
    /// happens here, at detection time, so results stamped under the old
    /// version are void before the new identity even finishes extracting.
    pub fn begin_swap(&mut self) -> u64 {
        self.version += 1;
        self.entity = None;
        // Messages belong to the externally-tracked conversation; they are
        // discarded wholesale, never merged.
        self.context = None;
        self.version
    }
}

// ── Orchestrator ───────────────────────────────────────────────────────────

pub struct Orchestrator {
    state: Arc<Mutex<CoordinatorState>>,
    inference: Arc<dyn InferenceService>,
}

impl Orchestrator {
    pub fn new(state: Arc<Mutex<CoordinatorState>>, inference: Arc<dyn InferenceService>) -> Self {
        Orchestrator { state, inference }
    }

    /// Claim the single-flight slot and record the version stamp.
    /// Returns `None` when another call is already in flight.
    fn claim_slot(&self) -> Option<u64> {
        let mut state = self.state.lock();
        if state.in_flight {
            debug!("[orchestrator] call rejected: another inference is in flight");
            return None;
        }
        state.in_flight = true;
        Some(state.version)
    }

    /// Release the slot and report whether the stamped version is still
    /// current. Always called exactly once per claimed slot.
    fn release_slot(&self, stamp: u64) -> bool {
        let mut state = self.state.lock();
        state.in_flight = false;
        state.version == stamp
    }

    /// Analyze an entity. Terminal credential errors propagate verbatim;
    /// the caller decides how to degrade (raw entity data is still shown).
    pub async fn analyze(&self, entity: &Entity) -> EngineResult<AnalysisOutcome> {
        let Some(stamp) = self.claim_slot() else {
            return Ok(AnalysisOutcome::Ignored);
        };

        info!("[orchestrator] analyzing '{}' (v{})", entity.name, stamp);
        let result = self.inference.analyze_entity(entity).await;
        let current = self.release_slot(stamp);

        match result {
            Ok(analysis) => {
                if !current {
                    debug!("[orchestrator] discarding stale analysis (stamped v{})", stamp);
                    return Ok(AnalysisOutcome::Stale);
                }
                Ok(AnalysisOutcome::Completed(analysis))
            }
            Err(e) => Err(e),
        }
    }

    /// Generate a suggestion for the active context.
    ///
    /// Auto triggers are suppressed unless the context is `Ready` — the
    /// switching guard bounds the window in which stale triggers could
    /// fire. Manual requests bypass the guard but not single-flight.
    pub async fn generate(
        &self,
        style: &StyleProfile,
        mode_hint: Option<GenerationMode>,
        trigger: Trigger,
    ) -> EngineResult<SuggestionOutcome> {
        let (stamp, context, mode) = {
            let mut state = self.state.lock();
            if trigger == Trigger::Auto && state.phase != ContextPhase::Ready {
                debug!("[orchestrator] auto trigger suppressed in phase {:?}", state.phase);
                return Ok(SuggestionOutcome::Suppressed);
            }
            if state.in_flight {
                debug!("[orchestrator] generate rejected: another inference is in flight");
                return Ok(SuggestionOutcome::Ignored);
            }
            let context = state
                .context
                .clone()
                .ok_or_else(|| EngineError::Config("no active conversation".to_string()))?;
            let mode = mode_hint.unwrap_or_else(|| classify_mode(&context));
            state.in_flight = true;
            (state.version, context, mode)
        };

        info!(
            "[orchestrator] generating {:?} for '{}' (v{})",
            mode, context.counterpart_name, stamp
        );
        let result = self.inference.generate_message(&context, style, mode).await;
        let current = self.release_slot(stamp);

        match result {
            Ok(text) => {
                if !current {
                    debug!("[orchestrator] discarding stale suggestion (stamped v{})", stamp);
                    return Ok(SuggestionOutcome::Stale);
                }
                Ok(SuggestionOutcome::Completed(Suggestion { text, mode }))
            }
            Err(e) => Err(e),
        }
    }
}

// ── Mode classification ────────────────────────────────────────────────────

/// Opener when nothing has been said; reply when the counterpart spoke
/// last; follow-up when we did and no answer has arrived.
pub fn classify_mode(context: &Context) -> GenerationMode {
    match context.messages.last() {
        None => GenerationMode::Opener,
        Some(last) if last.sender == Sender::Own => GenerationMode::FollowUp,
        Some(_) => GenerationMode::Reply,
    }
}
