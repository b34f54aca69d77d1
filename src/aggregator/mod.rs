use std::io;
use std::sync::atomic::{AtomicI32, Ordering};

use log::{error, trace, warn};
use thiserror::Error;

use crate::ffi::syscall;
use crate::queue::{name_text, Event, MessageType, MsgQueue, MSG_PRIORITY};
use crate::registry::Registry;


/// Per-receive timeout of the service run loop.
pub const RECEIVE_TIMEOUT_MS: u32 = 10_000;

/// Consecutive timeouts tolerated before the service shuts itself down.
pub const MAX_TIMEOUTS: u32 = 6;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("queue {0} already exists, service is a duplicate")]
    QueueExists(String),
    #[error("failed to open message queue: {0}")]
    Open(#[from] io::Error),
}

/// Rebuilds client call trees from received events.
///
/// Owns its own registry: entries appear lazily as events arrive and are
/// torn down by close events or inactivity reaping, never by the clients.
pub struct Aggregator {
    registry: Registry,
    timeouts: u32,
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            timeouts: 0,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Consume events until an exit condition: an `ExitQueue` event, an
    /// unreadable message, or the timeout budget running dry.
    pub fn run(&mut self, queue: &MsgQueue) {
        loop {
            let event = queue.receive(RECEIVE_TIMEOUT_MS);
            if !self.apply(&event) {
                break;
            }
        }
        warn!("run loop exiting");
    }

    /// Apply one event. Returns whether the run loop should continue.
    pub fn apply(&mut self, event: &Event) -> bool {
        match event.kind() {
            MessageType::ExitQueue | MessageType::MaxType => {
                warn!("exit loop");
                return false;
            }
            MessageType::NoMessage => {
                self.timeouts += 1;
                if self.timeouts > MAX_TIMEOUTS {
                    error!("max number of message timeouts reached, exiting");
                    return false;
                }
                warn!("no message, timeout {}", self.timeouts);
                return true;
            }
            _ => (),
        }

        self.timeouts = 0;
        match event.kind() {
            MessageType::Entry => self.on_entry(event),
            MessageType::Exit => self.on_exit(event),
            MessageType::Threshold => self.on_threshold(event),
            MessageType::ReportThread => {
                let msg = event.as_thread();
                warn!("reporting thread pid {:X} tid {:X}", msg.pid, msg.tid);
                self.registry.report_thread(msg.pid, msg.tid);
            }
            MessageType::ReportProcess => {
                let msg = event.as_process();
                warn!("reporting process pid {:X}", msg.pid);
                self.registry.report_process(msg.pid);
            }
            MessageType::CloseThread => {
                let msg = event.as_thread();
                warn!("closing thread pid {:X} tid {:X}", msg.pid, msg.tid);
                self.registry.close_thread(msg.pid, msg.tid);
            }
            MessageType::CloseProcess => {
                let msg = event.as_process();
                warn!("closing process pid {:X}", msg.pid);
                self.registry.remove(msg.pid);
            }
            _ => (),
        }
        true
    }

    fn on_entry(&mut self, event: &Event) {
        let msg = event.as_entry();
        let name = name_text(&msg.name);
        trace!(
            "creating node for element {} pid {:X} tid {:X}",
            name,
            msg.pid,
            msg.tid
        );
        let tree = self.registry.entry_or_new(msg.pid).tree_or_new(msg.tid);
        let node = tree.add(&name, msg.tid, &name_text(&msg.thread_name));
        if msg.threshold_us > 0 {
            tree.node_mut(node).set_threshold(msg.threshold_us as i64);
        }
    }

    fn on_threshold(&mut self, event: &Event) {
        let msg = event.as_threshold();
        let name = name_text(&msg.name);
        trace!(
            "setting threshold {} on element {} pid {:X} tid {:X}",
            msg.threshold_us,
            name,
            msg.pid,
            msg.tid
        );
        let Some(tree) = self.tree(msg.pid, msg.tid) else {
            return;
        };
        let Some(top) = tree.top() else {
            error!("threshold event with no active node");
            return;
        };
        if msg.threshold_us > 0 && tree.node(top).name() == name {
            tree.node_mut(top).set_threshold(msg.threshold_us as i64);
        }
    }

    // An exit whose name does not match the open node means a message
    // was lost; the event is dropped rather than skewing the stack.
    fn on_exit(&mut self, event: &Event) {
        let msg = event.as_exit();
        let name = name_text(&msg.name);
        trace!(
            "closing node for element {} pid {:X} tid {:X}",
            name,
            msg.pid,
            msg.tid
        );
        let Some(tree) = self.tree(msg.pid, msg.tid) else {
            return;
        };
        let Some(top) = tree.top() else {
            error!("exit event with no active node");
            return;
        };
        if tree.node(top).name() != name {
            error!(
                "exit event for {} does not match the active node {}, dropping",
                name,
                tree.node(top).name()
            );
            return;
        }
        #[cfg(feature = "cpu")]
        {
            let elapsed = msg.elapsed;
            tree.node_mut(top)
                .increment(elapsed.wall_us, elapsed.user_cpu_us, elapsed.system_cpu_us);
        }
        #[cfg(not(feature = "cpu"))]
        tree.node_mut(top).increment(msg.elapsed_us, 0, 0);
        tree.close(top);
    }

    fn tree(&mut self, pid: i32, tid: u64) -> Option<&mut crate::tree::CallTree> {
        let Some(process) = self.registry.find_mut(pid) else {
            error!("process {:X} not found", pid);
            return None;
        };
        let tree = process.tree(tid);
        if tree.is_none() {
            error!("tree not found for thread {:X}", tid);
        }
        tree
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

static SIGNAL_QUEUE: AtomicI32 = AtomicI32::new(-1);

// Only async-signal-safe calls here: one `mq_send` of a stack record.
unsafe extern "C" fn on_interrupt(_: i32, _: *mut libc::siginfo_t, _: *mut libc::c_void) {
    let mqd = SIGNAL_QUEUE.load(Ordering::Relaxed);
    if mqd != -1 {
        let event = Event::exit_queue();
        let bytes = event.as_bytes();
        libc::mq_send(mqd, bytes.as_ptr() as _, bytes.len(), MSG_PRIORITY);
    }
}

/// Unblock the run loop on Ctrl+C by enqueueing an `ExitQueue` event
/// into the service's own queue.
pub fn exit_on_interrupt(queue: &MsgQueue) -> io::Result<()> {
    SIGNAL_QUEUE.store(queue.descriptor(), Ordering::Relaxed);
    syscall::sigaction_siginfo(libc::SIGINT, on_interrupt)
}
