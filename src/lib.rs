// Wingmate — Observation & Decision Coordinator
//
// The surface (a live page mutating outside our control) is observed
// through a pair of detection channels, reconciled into immutable entities
// and versioned conversation contexts, analyzed through a single-flight
// inference orchestrator that discards stale results, and acted on through
// an abstract executor. Bounded-history accumulators learn the user's
// preferences and writing style as decisions and messages flow through.
//
// Layering:
//   atoms/   — pure data types, errors, constants, collaborator traits
//   engine/  — detection, extraction, orchestration, learning, emission

pub mod atoms;
pub mod engine;

pub use atoms::error::{EngineError, EngineResult};
pub use atoms::traits::{ActionExecutor, InferenceService, StoreBackend, SurfaceObserver};
pub use atoms::types::*;
pub use engine::commands::{dispatch, CommandRequest, CommandResponse};
pub use engine::coordinator::Coordinator;
pub use engine::detector::MutationFeed;
pub use engine::orchestrator::CoordinatorState;
pub use engine::providers::OpenAiInference;
pub use engine::storage::{MemoryStore, SqliteStore, Storage};
