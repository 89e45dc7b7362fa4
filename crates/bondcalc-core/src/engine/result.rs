use super::job::{Requests, Ticket};
use crate::core::density::grid::DensityGrid;
use crate::core::density::solvent::SolventMask;
use crate::core::models::ids::AtomId;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use nalgebra::Point3;
use slotmap::SecondaryMap;
use std::time::Duration;

/// Calculated position of every extracted atom, keyed by atom.
pub type AtomPosMap = SecondaryMap<AtomId, Point3<f64>>;

/// Output of one job, accumulated across pipeline stages.
///
/// Only the fields implied by `requests` are ever populated. A result is move-only and is
/// handed to the caller exactly once through [`ResultStore`].
#[derive(Debug)]
pub struct JobResult {
    pub ticket: Ticket,
    pub requests: Requests,
    /// Sampler point the job was built from, if any.
    pub sample: Option<usize>,
    pub positions: Option<AtomPosMap>,
    /// Positions in bond-sequence order.
    pub vector: Option<Vec<Point3<f64>>>,
    /// RMSD against the reference coordinates; NaN when nothing was comparable.
    pub deviation: Option<f64>,
    pub score: Option<f64>,
    pub surface_area: Option<f64>,
    pub map: Option<DensityGrid>,
    pub correlation: Option<f64>,
    pub solvent_mask: Option<SolventMask>,
}

impl JobResult {
    pub fn new(ticket: Ticket, requests: Requests, sample: Option<usize>) -> Self {
        Self {
            ticket,
            requests,
            sample,
            positions: None,
            vector: None,
            deviation: None,
            score: None,
            surface_area: None,
            map: None,
            correlation: None,
            solvent_mask: None,
        }
    }

    /// The set of requests whose output field is present.
    pub fn populated(&self) -> Requests {
        let mut mask = Requests::NONE;
        let fields = [
            (self.positions.is_some(), Requests::EXTRACT_POSITIONS),
            (self.vector.is_some(), Requests::POSITION_VECTOR),
            (self.deviation.is_some(), Requests::CALCULATE_DEVIATIONS),
            (self.score.is_some(), Requests::SCORE_STRUCTURE),
            (self.surface_area.is_some(), Requests::SURFACE_AREA),
            (self.map.is_some(), Requests::MAP_SEGMENT),
            (self.correlation.is_some(), Requests::MAP_CORRELATION),
            (self.solvent_mask.is_some(), Requests::SOLVENT_MASK),
        ];
        for (present, request) in fields {
            if present {
                mask |= request;
            }
        }
        mask
    }
}

/// Completed results waiting to be collected, in completion order.
///
/// Any stage that finishes a job submits into the store; the caller drains it without ever
/// blocking a producer.
#[derive(Debug, Clone)]
pub struct ResultStore {
    sender: Sender<JobResult>,
    receiver: Receiver<JobResult>,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultStore {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn submit(&self, result: JobResult) {
        // The store owns a receiver, so the channel cannot be disconnected here.
        let _ = self.sender.send(result);
    }

    /// Next completed result, or `None` when nothing has completed yet.
    pub fn acquire(&self) -> Option<JobResult> {
        self.receiver.try_recv().ok()
    }

    /// Waits up to `timeout` for the next completed result.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<JobResult> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}
