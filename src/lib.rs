// Auraluxe — recommendation and AI orchestration engine.
//
// Layering:
//   atoms/   pure types, constants, errors and trait seams (no I/O)
//   engine/  providers, cascade, pipelines, agent and the SQLite store
//
// `EngineState` is the usual entry point: it opens the store, builds the
// provider cascade from `EngineConfig` and hands out wired components.

pub mod atoms;
pub mod engine;

pub use atoms::error::{EngineError, EngineResult};
pub use engine::config::EngineConfig;
pub use engine::state::{CancelSignal, EngineState};
