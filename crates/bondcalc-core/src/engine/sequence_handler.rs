use super::job::Job;
use super::pool::ResourcePool;
use super::sequence::{BondSequence, SequenceState};
use tracing::{debug, warn};

/// Owns every bond sequence of a calculator and the queue of jobs waiting for one.
///
/// Sequences circulate between an idle queue and a ready queue; whoever holds a sequence
/// outside those queues is its only writer.
#[derive(Debug)]
pub struct BondSequenceHandler {
    idle: ResourcePool<BondSequence>,
    ready: ResourcePool<BondSequence>,
    jobs: ResourcePool<Job>,
    sequence_count: usize,
}

impl BondSequenceHandler {
    pub fn new(sequences: Vec<BondSequence>) -> Self {
        let sequence_count = sequences.len();
        Self {
            idle: ResourcePool::with_objects(sequences),
            ready: ResourcePool::new(),
            jobs: ResourcePool::new(),
            sequence_count,
        }
    }

    pub fn sequence_count(&self) -> usize {
        self.sequence_count
    }

    pub fn submit_job(&self, job: Job) {
        self.jobs.push_object(job);
    }

    /// Next queued job, blocking until one arrives. `None` after [`finish`](Self::finish).
    pub fn acquire_job(&self) -> Option<Job> {
        self.jobs.acquire_object()
    }

    pub fn queued_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Next sequence queued in `state`, blocking until one is available.
    ///
    /// Only idle and ready sequences are ever queued; asking for any other state returns
    /// `None` immediately.
    pub fn acquire_sequence(&self, state: SequenceState) -> Option<BondSequence> {
        match state {
            SequenceState::Idle => self.idle.acquire_object(),
            SequenceState::PositionsReady => self.ready.acquire_object(),
            other => {
                warn!(state = ?other, "No queue holds sequences in this state");
                None
            }
        }
    }

    /// Returns a sequence to the queue matching its state.
    pub fn signal(&self, mut sequence: BondSequence) {
        match sequence.state() {
            SequenceState::Idle => self.idle.push_object(sequence),
            SequenceState::PositionsReady => self.ready.push_object(sequence),
            other => {
                warn!(
                    sequence = sequence.id(),
                    state = ?other,
                    "Sequence signalled mid-job, discarding its job"
                );
                if let Some(job) = sequence.clean_up_to_idle() {
                    debug!(ticket = %job.ticket(), "Dropped job of a mid-job sequence");
                }
                self.idle.push_object(sequence);
            }
        }
    }

    /// Releases every worker blocked on a sequence or job queue and discards the jobs still
    /// waiting, returning how many were dropped.
    pub fn finish(&self) -> usize {
        self.jobs.finish();
        self.idle.finish();
        self.ready.finish();
        self.jobs.drain().len()
    }
}
