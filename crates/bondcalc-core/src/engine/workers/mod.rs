//! Long-lived worker loops, one module per pipeline stage. Every loop exits when the queue
//! it drains is finished or the calculator's shutdown channel disconnects.

pub(crate) mod calculator;
pub(crate) mod extractor;
pub(crate) mod map_summer;
pub(crate) mod stage;

use super::error::EngineError;
use std::thread::{self, JoinHandle};

fn spawn_named<F>(name: String, body: F) -> Result<JoinHandle<()>, EngineError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(body)
        .map_err(|source| EngineError::Spawn { name, source })
}
