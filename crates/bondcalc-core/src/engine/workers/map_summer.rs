use super::spawn_named;
use crate::core::density::grid::DensityGrid;
use crate::engine::error::EngineError;
use crate::engine::map_sum::{MapSubJob, MapSumHandler};
use crate::engine::stages::Handoff;
use crossbeam_channel::{Receiver, select};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::trace;

/// Receives map jobs from the dispatcher and fans them out to the summers.
pub(crate) fn spawn_intake(
    handler: Arc<MapSumHandler>,
    arrivals: Receiver<Handoff>,
    shutdown: Receiver<()>,
) -> Result<JoinHandle<()>, EngineError> {
    spawn_named("bondcalc-maps-intake".to_string(), move || {
        loop {
            select! {
                recv(arrivals) -> msg => match msg {
                    Ok(handoff) => handler.submit(handoff),
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
            }
        }
        trace!("Map intake exiting");
    })
}

pub(crate) fn spawn(
    idx: usize,
    handler: Arc<MapSumHandler>,
    work: Receiver<MapSubJob>,
    shutdown: Receiver<()>,
) -> Result<JoinHandle<()>, EngineError> {
    spawn_named(format!("bondcalc-maps-{idx}"), move || {
        let mut scratch = DensityGrid::new(handler.config().grid);
        loop {
            select! {
                recv(work) -> msg => match msg {
                    Ok(sub_job) => handler.sum_sub_job(sub_job, &mut scratch),
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
            }
        }
        trace!(worker = idx, "Map summer exiting");
    })
}
