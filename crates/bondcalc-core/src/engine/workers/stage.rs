use super::spawn_named;
use crate::engine::error::EngineError;
use crate::engine::stages::{Dispatcher, Handoff, StageHandler};
use crossbeam_channel::{Receiver, select};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::trace;

pub(crate) fn spawn<H>(
    idx: usize,
    handler: Arc<H>,
    queue: Receiver<Handoff>,
    shutdown: Receiver<()>,
    dispatcher: Dispatcher,
) -> Result<JoinHandle<()>, EngineError>
where
    H: StageHandler + 'static,
{
    let name = format!("bondcalc-{}-{idx}", handler.stage().name());
    spawn_named(name, move || {
        loop {
            select! {
                recv(queue) -> msg => match msg {
                    Ok(mut handoff) => {
                        handler.process(&mut handoff);
                        dispatcher.forward(handoff, Some(handler.stage()));
                    }
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
            }
        }
        trace!(stage = handler.stage().name(), "Stage worker exiting");
    })
}
