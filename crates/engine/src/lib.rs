#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! In-process three-tier deadline scheduler for `triage` (submission routing,
//! tier loops, parallel dispatch, fault sink).

/// Public API types for the engine crate.
pub mod api;

mod dispatch;
mod engine;
mod sink;
mod tier;

pub use api::{
    EngineConfig, EngineError, EngineEvent, Fault, FaultStage, Statistics, TierKind, TierStats,
};
pub use engine::Engine;
