use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{error, trace, warn};

use crate::ffi::syscall::getpid;
use crate::registry;

#[cfg(test)]
mod test;

/// Base timer tick.
pub const TICK_SECONDS: u64 = 10;

const DELAY_GROWTH: u32 = 5;
const MAX_DELAY_UNITS: u32 = 600;

/// Firing rule of the periodic report: each fired report widens the gap
/// to the next by five ticks, capped at 600 (10 s → ... → 6000 s). The
/// count is bumped after the comparison, so the very first report fires
/// on the second tick.
#[derive(Debug, Default)]
pub(crate) struct Backoff {
    delay_units: u32,
    tick_count: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// One timer tick; true when a report fires now.
    pub fn tick(&mut self) -> bool {
        let fire = self.tick_count > self.delay_units;
        if fire {
            self.tick_count = 0;
            if self.delay_units < MAX_DELAY_UNITS {
                self.delay_units += DELAY_GROWTH;
            }
        }
        self.tick_count += 1;
        fire
    }

    pub fn delay_units(&self) -> u32 {
        self.delay_units
    }

    pub fn tick_count(&self) -> u32 {
        self.tick_count
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Signal {
    Waiting,
    Timeout,
    Exit,
}

struct Shared {
    state: Mutex<Signal>,
    cond: Condvar,
}

impl Shared {
    fn signal(&self, value: Signal) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = value;
        self.cond.notify_one();
    }

    // Periodic tick and prompt cancellation through one primitive: the
    // condvar either times out or hands over a signalled state.
    fn wait(&self, seconds: u64) -> Signal {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let result = if *state == Signal::Waiting {
            let (guard, timeout) = self
                .cond
                .wait_timeout(state, Duration::from_secs(seconds))
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state = guard;
            if timeout.timed_out() {
                Signal::Timeout
            } else {
                *state
            }
        } else {
            // State changed before we got to wait.
            *state
        };
        *state = Signal::Waiting;
        result
    }
}

/// Background thread driving the periodic process reports.
pub struct Reporter {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Reporter {
    pub fn spawn() -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(Signal::Waiting),
            cond: Condvar::new(),
        });
        let task_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("perf-reporter".into())
            .spawn(move || task(&task_shared));
        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("could not spawn reporter thread: {}", e);
                None
            }
        };
        warn!("timer created");
        Self { shared, thread }
    }

    /// Signal the loop to exit and join the thread.
    pub fn stop(mut self) {
        warn!("stopping timer task");
        self.shared.signal(Signal::Exit);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn task(shared: &Shared) {
    warn!("task started");
    let mut backoff = Backoff::new();
    loop {
        if shared.wait(TICK_SECONDS) == Signal::Exit {
            warn!("exit task loop has been signaled");
            break;
        }
        tick(&mut backoff);
    }
    warn!("task completed");
}

fn tick(backoff: &mut Backoff) {
    trace!(
        "timer callback, tick count {} delay units {}",
        backoff.tick_count(),
        backoff.delay_units()
    );
    let pid = getpid();
    let mut reg = registry::lock();
    if reg.find(pid).is_some() {
        if backoff.tick() {
            reg.report_process(pid);
            warn!(
                "next performance log in {} seconds",
                backoff.delay_units() as u64 * TICK_SECONDS
            );
        }
    } else {
        trace!(
            "could not find process ID {:X} from map of size {} for reporting",
            pid,
            reg.len()
        );
    }
}
