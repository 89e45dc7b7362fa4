use thiserror::Error;

use super::config::ConfigError;
use super::job::Requests;
use crate::core::models::graph::GraphError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid calculator configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Bond graph error: {source}")]
    Graph {
        #[from]
        source: GraphError,
    },

    #[error("Calculator must be set up before it can be {action}")]
    NotSetUp { action: &'static str },

    #[error("Calculator has already been started")]
    AlreadyStarted,

    #[error("Calculator is not running")]
    NotRunning,

    #[error("Torsion basis misuse: {0}")]
    TorsionBasis(String),

    #[error("Sample point {index} is outside the sampler's {count} points")]
    SamplePoint { index: usize, count: usize },

    #[error("Requests {requests:?} need a map grid, but none is configured")]
    MissingMapGrid { requests: Requests },

    #[error("Failed to spawn worker thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
