//! Neuroevolution of a four-segment planar walker.
//!
//! A generation spawns one [`walker::Walker`] per genome into a shared
//! [`world::PhysicsWorld`], drives each with its [`controller::Controller`]
//! through the sensor/actuator [`codec`], enforces joint ranges with the
//! [`limiter`] and accrues fitness until every walker has finished, fallen,
//! stalled or hit the tick ceiling.

pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod generation;
pub mod limiter;
pub mod neuro;
pub mod population;
pub mod server;
pub mod walker;
pub mod world;

pub use config::SimConfig;
pub use controller::Controller;
pub use error::{Result, SimError};
pub use generation::{
    Generation, GenerationObserver, GenerationReport, NoopObserver, SnapshotFrame,
};
pub use population::{GenomeId, WalkerGenome, evaluate_genomes};
pub use walker::TerminationReason;
