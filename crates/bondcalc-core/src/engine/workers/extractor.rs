use super::spawn_named;
use crate::engine::error::EngineError;
use crate::engine::job::Requests;
use crate::engine::sequence::{BondSequence, SequenceState};
use crate::engine::sequence_handler::BondSequenceHandler;
use crate::engine::stages::{Dispatcher, Handoff};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{trace, warn};

pub(crate) fn spawn(
    idx: usize,
    handler: Arc<BondSequenceHandler>,
    dispatcher: Dispatcher,
) -> Result<JoinHandle<()>, EngineError> {
    spawn_named(format!("bondcalc-extract-{idx}"), move || {
        while let Some(mut sequence) = handler.acquire_sequence(SequenceState::PositionsReady) {
            let handoff = extract(&mut sequence);
            handler.signal(sequence);
            if let Some(handoff) = handoff {
                dispatcher.forward(handoff, None);
            }
        }
        trace!("Extractor worker exiting");
    })
}

/// Copies the requested outputs out of a ready sequence and returns it to idle, yielding
/// the job for the dispatcher. Requests are served in a fixed order: deviation, positions,
/// vector, then the downstream stages.
pub(crate) fn extract(sequence: &mut BondSequence) -> Option<Handoff> {
    let Some(requests) = sequence.job().map(|job| job.requests()) else {
        warn!(sequence = sequence.id(), "Ready sequence carries no job");
        sequence.clean_up_to_idle();
        return None;
    };

    let deviation = requests
        .contains(Requests::CALCULATE_DEVIATIONS)
        .then(|| sequence.calculate_deviations());
    let needs_positions = requests.intersects(
        Requests::EXTRACT_POSITIONS
            .union(Requests::SURFACE_AREA)
            .union(Requests::SCORE_STRUCTURE),
    );
    let positions = needs_positions
        .then(|| sequence.extract_positions())
        .unwrap_or_default();
    let vector = requests
        .contains(Requests::POSITION_VECTOR)
        .then(|| sequence.extract_vector());
    let map_points = if requests.needs_maps() {
        sequence.extract_for_map()
    } else {
        Vec::new()
    };

    let mut job = sequence.clean_up_to_idle()?;
    let result = job.result_mut();
    result.deviation = deviation;
    result.vector = vector;
    if requests.contains(Requests::EXTRACT_POSITIONS) {
        result.positions = Some(positions.clone());
    }

    Some(Handoff {
        job,
        positions,
        map_points,
    })
}
