use super::spawn_named;
use crate::engine::calculator::CancelFlags;
use crate::engine::error::EngineError;
use crate::engine::sequence::{CalcOutcome, SequenceState};
use crate::engine::sequence_handler::BondSequenceHandler;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, trace};

pub(crate) fn spawn(
    idx: usize,
    handler: Arc<BondSequenceHandler>,
    flags: Arc<CancelFlags>,
) -> Result<JoinHandle<()>, EngineError> {
    spawn_named(format!("bondcalc-calc-{idx}"), move || run(&handler, &flags))
}

fn run(handler: &BondSequenceHandler, flags: &CancelFlags) {
    while let Some(job) = handler.acquire_job() {
        let ticket = job.ticket();
        let Some(mut sequence) = handler.acquire_sequence(SequenceState::Idle) else {
            debug!(%ticket, "Shut down while waiting for a sequence, dropping job");
            break;
        };

        sequence.begin_job(job);
        match sequence.calculate(flags) {
            CalcOutcome::Completed => trace!(%ticket, sequence = sequence.id(), "Positions ready"),
            CalcOutcome::Interrupted => {
                sequence.clean_up_to_idle();
                debug!(%ticket, "Calculation interrupted, job dropped");
            }
        }
        handler.signal(sequence);
    }
    trace!("Calculator worker exiting");
}
