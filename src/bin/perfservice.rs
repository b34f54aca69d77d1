//! Standalone aggregator: owns the event queue and rebuilds the call
//! trees of every instrumented client process on this host.

use log::{error, warn};
use rdkperf::aggregator::{self, Aggregator, ServiceError};
use rdkperf::logging;
use rdkperf::queue::{self, MsgQueue, QUEUE_NAME};

fn main() {
    logging::init();
    warn!("enter perfservice");
    match run() {
        Ok(()) => warn!("exit perfservice"),
        Err(e) => {
            error!("{}", e);
            std::process::exit(-1);
        }
    }
}

fn run() -> Result<(), ServiceError> {
    if MsgQueue::exists(QUEUE_NAME) {
        return Err(ServiceError::QueueExists(QUEUE_NAME.into()));
    }

    let queue = queue::shared(true)?;

    // Ctrl+C unblocks the receive loop instead of killing the process,
    // so the queue still gets unlinked and the statistics logged.
    if let Err(e) = aggregator::exit_on_interrupt(&queue) {
        error!("could not install SIGINT handler: {}", e);
    }

    Aggregator::new().run(&queue);
    Ok(())
}
