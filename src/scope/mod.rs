#[cfg(feature = "remote")]
use std::sync::Arc;
use std::sync::Once;
#[cfg(not(feature = "noop"))]
use std::sync::{LazyLock, Mutex};

#[cfg(not(feature = "noop"))]
use arrayvec::ArrayString;
#[cfg(not(any(feature = "noop", feature = "remote")))]
use log::error;
#[cfg(not(feature = "noop"))]
use log::warn;

#[cfg(not(any(feature = "noop", feature = "remote")))]
use crate::clock::{PerfClock, TimeUnit};
#[cfg(not(feature = "noop"))]
use crate::ffi::syscall::getpid;
#[cfg(not(any(feature = "noop", feature = "remote")))]
use crate::ffi::syscall::{pthread_getname, pthread_self};
#[cfg(not(feature = "noop"))]
use crate::logging;
#[cfg(feature = "remote")]
use crate::queue::{self, Event, MsgQueue, NAME_LEN};
#[cfg(not(any(feature = "noop", feature = "remote")))]
use crate::registry;
#[cfg(not(feature = "noop"))]
use crate::reporter::Reporter;
#[cfg(not(any(feature = "noop", feature = "remote")))]
use crate::tree::THREAD_NAME_LEN;

#[cfg(all(test, not(any(feature = "noop", feature = "remote"))))]
mod test;

#[cfg(all(feature = "noop", feature = "remote"))]
compile_error!("features `noop` and `remote` are mutually exclusive");

static INIT: Once = Once::new();

#[cfg(not(feature = "noop"))]
static REPORTER: LazyLock<Mutex<Option<Reporter>>> = LazyLock::new(|| Mutex::new(None));

#[cfg(feature = "remote")]
static CLIENT_QUEUE: LazyLock<Mutex<Option<Arc<MsgQueue>>>> = LazyLock::new(|| Mutex::new(None));

/// Initialize tracing for this process: install the log sink and spawn
/// the periodic reporter. Idempotent; the first scope start runs it
/// implicitly, so hosts only call this to front-load the setup.
pub fn init() {
    INIT.call_once(|| {
        #[cfg(not(feature = "noop"))]
        {
            logging::init();
            warn!("performance tracing initialize for process {:X}", getpid());
            // The periodic reporter would race the unit tests' counter
            // assertions; they drive reports explicitly instead.
            #[cfg(not(test))]
            {
                let mut slot = REPORTER
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                *slot = Some(Reporter::spawn());
            }
        }
    });
}

/// Tear tracing down: emit the final process report, drop this process
/// from the registry, stop the reporter thread and release the event
/// queue handle.
pub fn shutdown() {
    #[cfg(not(feature = "noop"))]
    {
        let pid = getpid();
        warn!("performance tracing terminate for process {:X}", pid);
        report_process(pid);
        #[cfg(not(feature = "remote"))]
        registry::lock().remove(pid);
        let reporter = REPORTER
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(reporter) = reporter {
            reporter.stop();
        }
        #[cfg(feature = "remote")]
        CLIENT_QUEUE
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

#[cfg(feature = "remote")]
fn client_queue() -> Option<Arc<MsgQueue>> {
    let mut slot = CLIENT_QUEUE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if slot.is_none() {
        match queue::shared(false) {
            Ok(queue) => *slot = Some(queue),
            Err(_) => {
                log::error!("could not get message queue to send perf events");
                return None;
            }
        }
    }
    slot.clone()
}

#[cfg(not(any(feature = "noop", feature = "remote")))]
struct ScopeRecord {
    name: ArrayString<128>,
    pid: i32,
    tid: u64,
    node: usize,
    start: PerfClock,
    threshold_us: i64,
}

#[cfg(not(any(feature = "noop", feature = "remote")))]
impl ScopeRecord {
    fn open(name: &str, threshold_us: i64) -> Self {
        init();
        let pid = getpid();
        let tid = pthread_self();
        let mut start = PerfClock::new();
        start.marker();

        let mut reg = registry::lock();
        let tree = reg.entry_or_new(pid).tree_or_new(tid);
        let node = tree.add(name, tid, &current_thread_name());
        if threshold_us > 0 {
            tree.node_mut(node).set_threshold(threshold_us);
        }

        Self {
            name: bounded(name),
            pid,
            tid,
            node,
            start,
            threshold_us,
        }
    }

    fn close(&mut self) {
        let mut elapsed = self.start;
        elapsed.elapsed();
        let delta_us = elapsed.wall(TimeUnit::Micros);

        let mut reg = registry::lock();
        let Some(tree) = reg.find_mut(self.pid).and_then(|p| p.tree(self.tid)) else {
            error!(
                "no tree for thread {:X} while closing scope {}",
                self.tid, self.name
            );
            return;
        };
        // The tree may have been torn down and rebuilt underneath an
        // open scope; a stale index must not be applied to it.
        if self.node >= tree.node_count() {
            error!("scope {} outlived its tree, dropping sample", self.name);
            return;
        }
        tree.node_mut(self.node).increment(
            delta_us,
            elapsed.user_cpu(TimeUnit::Micros),
            elapsed.system_cpu(TimeUnit::Micros),
        );
        tree.close(self.node);

        if self.threshold_us > 0 && delta_us > self.threshold_us as u64 {
            let stats = tree.node(self.node).stats();
            warn!(
                "{} Threshold {} exceeded, elapsed time {:.3} ms Avg time {:.3} (interval {:.3}) ms",
                self.name,
                self.threshold_us / 1000,
                delta_us as f64 / 1000.0,
                stats.total_avg_us / 1000.0,
                stats.interval_avg_us / 1000.0
            );
            tree.report_delta(self.node);
        }
    }
}

#[cfg(feature = "remote")]
struct RemoteScope {
    name: ArrayString<NAME_LEN>,
    #[cfg(feature = "cpu")]
    start: PerfClock,
    #[cfg(not(feature = "cpu"))]
    start_us: u64,
}

#[cfg(feature = "remote")]
impl RemoteScope {
    fn open(name: &str, threshold_us: u32) -> Self {
        init();

        #[cfg(feature = "cpu")]
        let start = {
            let mut clock = crate::clock::PerfClock::new();
            clock.marker();
            clock
        };
        #[cfg(not(feature = "cpu"))]
        let start_us = crate::clock::wall_clock_us();

        if let Some(queue) = client_queue() {
            #[cfg(feature = "cpu")]
            queue.send(&Event::entry(name, threshold_us as i32));
            #[cfg(not(feature = "cpu"))]
            queue.send(&Event::entry(name, start_us, threshold_us as i32));
        }

        Self {
            name: bounded(name),
            #[cfg(feature = "cpu")]
            start,
            #[cfg(not(feature = "cpu"))]
            start_us,
        }
    }

    fn set_threshold(&mut self, threshold_us: u32) {
        if let Some(queue) = client_queue() {
            queue.send(&Event::threshold(&self.name, threshold_us as i32));
        }
    }

    fn close(&mut self) {
        let Some(queue) = client_queue() else {
            return;
        };
        #[cfg(feature = "cpu")]
        {
            let mut elapsed = self.start;
            elapsed.elapsed();
            queue.send(&Event::exit(&self.name, elapsed.timestamp()));
        }
        #[cfg(not(feature = "cpu"))]
        {
            let end_us = crate::clock::wall_clock_us();
            queue.send(&Event::exit(&self.name, end_us.saturating_sub(self.start_us)));
        }
    }
}

/// Scoped measurement guard.
///
/// Construction enters the named scope on the calling thread, dropping
/// the guard exits it, so a local binding instruments exactly the
/// enclosing lexical region on every exit path. Guards on one thread
/// must nest strictly.
///
/// # Examples
///
/// ```no_run
/// use rdkperf::Perf;
///
/// fn decode_frame() {
///     let _perf = Perf::new("decode_frame");
///     // ... work measured as one visit of "decode_frame" ...
/// }
/// ```
pub struct Perf {
    #[cfg(not(any(feature = "noop", feature = "remote")))]
    record: ScopeRecord,
    #[cfg(feature = "remote")]
    record: RemoteScope,
}

impl Perf {
    pub fn new(name: &str) -> Self {
        #[cfg(feature = "noop")]
        {
            let _ = name;
            Self {}
        }
        #[cfg(feature = "remote")]
        {
            Self {
                record: RemoteScope::open(name, 0),
            }
        }
        #[cfg(not(any(feature = "noop", feature = "remote")))]
        {
            Self {
                record: ScopeRecord::open(name, -1),
            }
        }
    }

    /// Like [`Perf::new`] with a microsecond threshold: an exit slower
    /// than the threshold emits an immediate diagnostic.
    pub fn with_threshold(name: &str, threshold_us: u32) -> Self {
        #[cfg(feature = "noop")]
        {
            let _ = (name, threshold_us);
            Self {}
        }
        #[cfg(feature = "remote")]
        {
            Self {
                record: RemoteScope::open(name, threshold_us),
            }
        }
        #[cfg(not(any(feature = "noop", feature = "remote")))]
        {
            Self {
                record: ScopeRecord::open(name, threshold_us as i64),
            }
        }
    }

    pub fn set_threshold(&mut self, threshold_us: u32) {
        #[cfg(feature = "noop")]
        {
            let _ = threshold_us;
        }
        #[cfg(feature = "remote")]
        self.record.set_threshold(threshold_us);
        #[cfg(not(any(feature = "noop", feature = "remote")))]
        {
            self.record.threshold_us = threshold_us as i64;
            let mut reg = registry::lock();
            if let Some(tree) = reg
                .find_mut(self.record.pid)
                .and_then(|p| p.tree(self.record.tid))
            {
                if self.record.node < tree.node_count() {
                    tree.node_mut(self.record.node)
                        .set_threshold(threshold_us as i64);
                }
            }
        }
    }
}

impl Drop for Perf {
    fn drop(&mut self) {
        #[cfg(not(feature = "noop"))]
        self.record.close();
    }
}

/// Enter a named scope on the calling thread. The handle must be given
/// back to [`stop`] from the same thread to close the scope.
pub fn start(name: &str) -> Box<Perf> {
    Box::new(Perf::new(name))
}

/// Close a scope opened by [`start`] and record its elapsed time.
pub fn stop(perf: Box<Perf>) {
    drop(perf);
}

/// Immediate textual report of every thread in the process, reaping
/// inactive threads along the way.
pub fn report_process(pid: i32) {
    #[cfg(feature = "noop")]
    {
        let _ = pid;
    }
    #[cfg(feature = "remote")]
    {
        let _ = pid;
        if let Some(queue) = client_queue() {
            queue.send(&Event::report_process());
        }
    }
    #[cfg(not(any(feature = "noop", feature = "remote")))]
    {
        init();
        registry::lock().report_process(pid);
    }
}

/// Immediate textual report of a single thread.
pub fn report_thread(tid: u64) {
    #[cfg(feature = "noop")]
    {
        let _ = tid;
    }
    #[cfg(feature = "remote")]
    {
        let _ = tid;
        if let Some(queue) = client_queue() {
            queue.send(&Event::report_thread());
        }
    }
    #[cfg(not(any(feature = "noop", feature = "remote")))]
    {
        init();
        let pid = getpid();
        registry::lock().report_thread(pid, tid);
    }
}

/// Destroy a thread's call tree.
pub fn close_thread(tid: u64) {
    #[cfg(feature = "noop")]
    {
        let _ = tid;
    }
    #[cfg(feature = "remote")]
    {
        let _ = tid;
        if let Some(queue) = client_queue() {
            queue.send(&Event::close_thread());
        }
    }
    #[cfg(not(any(feature = "noop", feature = "remote")))]
    {
        let pid = getpid();
        registry::lock().close_thread(pid, tid);
    }
}

/// Destroy a process entry and all its trees.
pub fn close_process(pid: i32) {
    #[cfg(feature = "noop")]
    {
        let _ = pid;
    }
    #[cfg(feature = "remote")]
    {
        let _ = pid;
        if let Some(queue) = client_queue() {
            queue.send(&Event::close_process());
        }
    }
    #[cfg(not(any(feature = "noop", feature = "remote")))]
    {
        registry::lock().remove(pid);
    }
}

#[cfg(not(any(feature = "noop", feature = "remote")))]
fn current_thread_name() -> ArrayString<THREAD_NAME_LEN> {
    let mut buf = [0u8; THREAD_NAME_LEN];
    if let Err(e) = pthread_getname(&mut buf) {
        error!("could not read thread name: {}", e);
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = std::str::from_utf8(&buf[..end]).unwrap_or("");
    bounded(name)
}

#[cfg(not(feature = "noop"))]
fn bounded<const N: usize>(name: &str) -> ArrayString<N> {
    let mut out = ArrayString::new();
    for c in name.chars() {
        if out.try_push(c).is_err() {
            break;
        }
    }
    out
}
