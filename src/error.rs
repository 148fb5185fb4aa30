//! Error types for the walker simulation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("controller output malformed: {0}")]
    MalformedOutput(String),

    #[error("walker {0} was already removed from the physics world")]
    AlreadyDespawned(usize),

    #[error("rigid body missing from the physics world: {0}")]
    MissingBody(String),

    #[error("joint missing from the physics world: {0}")]
    MissingJoint(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("population must not be empty")]
    EmptyPopulation,

    #[error("controller construction failed: {0}")]
    Controller(String),

    #[error("evolution worker failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
