use std::borrow::Cow;
use std::ffi::CString;
use std::fs;
use std::io::{Error, Result};
use std::mem::{size_of, zeroed};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, Weak};

use libc::mqd_t;
use log::{error, warn};

#[cfg(feature = "cpu")]
use crate::clock::TimeStamp;
use crate::ffi::syscall;
use crate::ffi::syscall::{getpid, pthread_getname, pthread_self};


/// Queue name shared between clients and the aggregator service.
pub const QUEUE_NAME: &str = "/RDKPerfServerQueue";

/// Name fields on the wire, NUL-terminated when shorter.
pub const NAME_LEN: usize = 128;

// Single priority class keeps per-queue FIFO ordering.
pub(crate) const MSG_PRIORITY: u32 = 5;
const FALLBACK_MAX_MESSAGES: i64 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum MessageType {
    NoMessage = -1,
    Entry = 1,
    Exit = 2,
    Threshold = 3,
    ReportThread = 4,
    ReportProcess = 5,
    CloseThread = 6,
    CloseProcess = 7,
    ExitQueue = 9998,
    MaxType = 9999,
}

impl From<i32> for MessageType {
    fn from(tag: i32) -> Self {
        match tag {
            -1 => Self::NoMessage,
            1 => Self::Entry,
            2 => Self::Exit,
            3 => Self::Threshold,
            4 => Self::ReportThread,
            5 => Self::ReportProcess,
            6 => Self::CloseThread,
            7 => Self::CloseProcess,
            9998 => Self::ExitQueue,
            _ => Self::MaxType,
        }
    }
}

#[derive(Clone, Copy)]
#[repr(C)]
pub struct EntryEvent {
    pub pid: i32,
    pub tid: u64,
    pub name: [u8; NAME_LEN],
    pub thread_name: [u8; NAME_LEN],
    #[cfg(not(feature = "cpu"))]
    pub timestamp_us: u64,
    pub threshold_us: i32,
}

#[derive(Clone, Copy)]
#[repr(C)]
pub struct ExitEvent {
    pub pid: i32,
    pub tid: u64,
    pub name: [u8; NAME_LEN],
    #[cfg(feature = "cpu")]
    pub elapsed: TimeStamp,
    #[cfg(not(feature = "cpu"))]
    pub elapsed_us: u64,
}

#[derive(Clone, Copy)]
#[repr(C)]
pub struct ThresholdEvent {
    pub pid: i32,
    pub tid: u64,
    pub name: [u8; NAME_LEN],
    pub threshold_us: i32,
}

#[derive(Clone, Copy)]
#[repr(C)]
pub struct ThreadEvent {
    pub pid: i32,
    pub tid: u64,
}

#[derive(Clone, Copy)]
#[repr(C)]
pub struct ProcessEvent {
    pub pid: i32,
}

#[derive(Clone, Copy)]
#[repr(C)]
union Payload {
    entry: EntryEvent,
    exit: ExitEvent,
    threshold: ThresholdEvent,
    thread: ThreadEvent,
    process: ProcessEvent,
}

/// One fixed-size wire record. The tag selects the live payload variant;
/// every variant is plain bytes, so decoding is a cast on the receive
/// buffer. Host-local only, no endianness conversion.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct Event {
    tag: i32,
    payload: Payload,
}

impl Event {
    fn new(kind: MessageType) -> Self {
        // All payload variants are valid as all-zeroes.
        let mut event: Event = unsafe { zeroed() };
        event.tag = kind as i32;
        event
    }

    pub fn kind(&self) -> MessageType {
        MessageType::from(self.tag)
    }

    #[cfg(not(feature = "cpu"))]
    pub fn entry(name: &str, timestamp_us: u64, threshold_us: i32) -> Self {
        let mut event = Self::new(MessageType::Entry);
        let entry = unsafe { &mut event.payload.entry };
        entry.pid = getpid();
        entry.tid = pthread_self();
        copy_name(&mut entry.name, name);
        fill_thread_name(&mut entry.thread_name);
        entry.timestamp_us = timestamp_us;
        entry.threshold_us = threshold_us;
        event
    }

    #[cfg(feature = "cpu")]
    pub fn entry(name: &str, threshold_us: i32) -> Self {
        let mut event = Self::new(MessageType::Entry);
        let entry = unsafe { &mut event.payload.entry };
        entry.pid = getpid();
        entry.tid = pthread_self();
        copy_name(&mut entry.name, name);
        fill_thread_name(&mut entry.thread_name);
        entry.threshold_us = threshold_us;
        event
    }

    #[cfg(not(feature = "cpu"))]
    pub fn exit(name: &str, elapsed_us: u64) -> Self {
        let mut event = Self::new(MessageType::Exit);
        let exit = unsafe { &mut event.payload.exit };
        exit.pid = getpid();
        exit.tid = pthread_self();
        copy_name(&mut exit.name, name);
        exit.elapsed_us = elapsed_us;
        event
    }

    #[cfg(feature = "cpu")]
    pub fn exit(name: &str, elapsed: TimeStamp) -> Self {
        let mut event = Self::new(MessageType::Exit);
        let exit = unsafe { &mut event.payload.exit };
        exit.pid = getpid();
        exit.tid = pthread_self();
        copy_name(&mut exit.name, name);
        exit.elapsed = elapsed;
        event
    }

    pub fn threshold(name: &str, threshold_us: i32) -> Self {
        let mut event = Self::new(MessageType::Threshold);
        let threshold = unsafe { &mut event.payload.threshold };
        threshold.pid = getpid();
        threshold.tid = pthread_self();
        copy_name(&mut threshold.name, name);
        threshold.threshold_us = threshold_us;
        event
    }

    pub fn report_thread() -> Self {
        Self::with_thread(MessageType::ReportThread)
    }

    pub fn close_thread() -> Self {
        Self::with_thread(MessageType::CloseThread)
    }

    pub fn report_process() -> Self {
        Self::with_process(MessageType::ReportProcess)
    }

    pub fn close_process() -> Self {
        Self::with_process(MessageType::CloseProcess)
    }

    pub fn exit_queue() -> Self {
        Self::new(MessageType::ExitQueue)
    }

    pub fn no_message() -> Self {
        Self::new(MessageType::NoMessage)
    }

    pub fn max_type() -> Self {
        Self::new(MessageType::MaxType)
    }

    fn with_thread(kind: MessageType) -> Self {
        let mut event = Self::new(kind);
        let thread = unsafe { &mut event.payload.thread };
        thread.pid = getpid();
        thread.tid = pthread_self();
        event
    }

    fn with_process(kind: MessageType) -> Self {
        let mut event = Self::new(kind);
        let process = unsafe { &mut event.payload.process };
        process.pid = getpid();
        event
    }

    pub fn as_entry(&self) -> &EntryEvent {
        debug_assert_eq!(self.kind(), MessageType::Entry);
        unsafe { &self.payload.entry }
    }

    pub fn as_exit(&self) -> &ExitEvent {
        debug_assert_eq!(self.kind(), MessageType::Exit);
        unsafe { &self.payload.exit }
    }

    pub fn as_threshold(&self) -> &ThresholdEvent {
        debug_assert_eq!(self.kind(), MessageType::Threshold);
        unsafe { &self.payload.threshold }
    }

    pub fn as_thread(&self) -> &ThreadEvent {
        debug_assert!(matches!(
            self.kind(),
            MessageType::ReportThread | MessageType::CloseThread
        ));
        unsafe { &self.payload.thread }
    }

    pub fn as_process(&self) -> &ProcessEvent {
        debug_assert!(matches!(
            self.kind(),
            MessageType::ReportProcess | MessageType::CloseProcess
        ));
        unsafe { &self.payload.process }
    }

    pub fn as_bytes(&self) -> &[u8] {
        let ptr = self as *const Self as *const u8;
        unsafe { std::slice::from_raw_parts(ptr, size_of::<Self>()) }
    }

    // The receive buffer always holds at least `size_of::<Event>()`
    // initialized bytes when this is called.
    fn from_bytes(buf: &[u8]) -> Self {
        unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const Self) }
    }
}

fn copy_name(dst: &mut [u8; NAME_LEN], src: &str) {
    let len = src.len().min(NAME_LEN - 1);
    dst[..len].copy_from_slice(&src.as_bytes()[..len]);
}

fn fill_thread_name(dst: &mut [u8; NAME_LEN]) {
    if let Err(e) = pthread_getname(dst) {
        error!("could not read thread name: {}", e);
    }
}

/// The text of a NUL-terminated wire name field.
pub fn name_text(field: &[u8]) -> Cow<'_, str> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end])
}

/// Bounded named message queue carrying [`Event`] records.
///
/// The aggregator service owns the queue: it unlinks any stale instance,
/// creates it read-only and unlinks it again on drop. Clients open it
/// write-only. Message size is exactly one event; all sends use one
/// priority so per-queue FIFO order holds.
pub struct MsgQueue {
    mqd: mqd_t,
    name: CString,
    service: bool,
    msg_size: usize,
    received: AtomicU64,
    sent: AtomicU64,
    entries: AtomicU64,
    exits: AtomicU64,
}

impl MsgQueue {
    pub fn open(name: &str, service: bool) -> Result<Self> {
        let cname = CString::new(name).map_err(Error::other)?;

        let mut attr: libc::mq_attr = unsafe { zeroed() };
        attr.mq_maxmsg = system_max_messages();
        attr.mq_msgsize = size_of::<Event>() as _;

        let flags = if service {
            // Stale queues from a crashed service would otherwise keep
            // their old attributes.
            let _ = syscall::mq_unlink(&cname);
            libc::O_RDONLY | libc::O_CREAT
        } else {
            libc::O_WRONLY
        };

        let mode = (libc::S_IRWXU | libc::S_IRWXG | libc::S_IRWXO) as u32;
        let mqd = match syscall::mq_open(&cname, flags, mode, Some(&mut attr)) {
            Ok(mqd) => mqd,
            Err(e) => {
                error!("mq_open failed for {} ({:#X}): {}", name, flags, e);
                return Err(e);
            }
        };

        let attr = syscall::mq_getattr(mqd)?;
        warn!(
            "message queue {} open, max messages {}, message size {}, current messages {}",
            name, attr.mq_maxmsg, attr.mq_msgsize, attr.mq_curmsgs
        );

        Ok(Self {
            mqd,
            name: cname,
            service,
            msg_size: attr.mq_msgsize as usize,
            received: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            entries: AtomicU64::new(0),
            exits: AtomicU64::new(0),
        })
    }

    pub(crate) fn descriptor(&self) -> mqd_t {
        self.mqd
    }

    /// Enqueue one event. Blocks while the queue is full; a failed send
    /// is logged and the event dropped.
    pub fn send(&self, event: &Event) -> bool {
        match event.kind() {
            MessageType::Entry => {
                self.entries.fetch_add(1, Ordering::Relaxed);
            }
            MessageType::Exit => {
                self.exits.fetch_add(1, Ordering::Relaxed);
            }
            MessageType::ExitQueue => warn!("sending exit queue message"),
            _ => (),
        }
        match syscall::mq_send(self.mqd, event.as_bytes(), MSG_PRIORITY) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                error!("unable to send message of type {:?}: {}", event.kind(), e);
                false
            }
        }
    }

    /// Dequeue one event, blocking forever when `timeout_ms` is zero.
    /// A timeout yields a `NoMessage` event, any other receive failure
    /// a `MaxType` event.
    pub fn receive(&self, timeout_ms: u32) -> Event {
        let mut buf = vec![0u8; self.msg_size.max(size_of::<Event>())];

        let result = if timeout_ms == 0 {
            syscall::mq_receive(self.mqd, &mut buf)
        } else {
            let mut deadline = match syscall::clock_realtime() {
                Ok(ts) => ts,
                Err(e) => {
                    error!("clock_gettime failed: {}", e);
                    return Event::max_type();
                }
            };
            deadline.tv_sec += timeout_ms as i64 / 1000;
            deadline.tv_nsec += (timeout_ms as i64 % 1000) * 1_000_000;
            if deadline.tv_nsec >= 1_000_000_000 {
                deadline.tv_sec += 1;
                deadline.tv_nsec -= 1_000_000_000;
            }
            syscall::mq_timedreceive(self.mqd, &mut buf, &deadline)
        };

        match result {
            Ok(bytes) if bytes >= size_of::<Event>() => {
                self.received.fetch_add(1, Ordering::Relaxed);
                Event::from_bytes(&buf)
            }
            Ok(bytes) => {
                error!(
                    "did not read a complete message, size {}, received {}",
                    size_of::<Event>(),
                    bytes
                );
                Event::max_type()
            }
            Err(e) if e.raw_os_error() == Some(libc::ETIMEDOUT) => Event::no_message(),
            Err(e) => {
                error!("message receive failed: {}", e);
                Event::max_type()
            }
        }
    }

    /// Whether a queue with this name exists (i.e. a service owns it).
    pub fn exists(name: &str) -> bool {
        let Ok(cname) = CString::new(name) else {
            return false;
        };
        match syscall::mq_open(&cname, libc::O_RDONLY, 0, None) {
            Ok(mqd) => {
                let _ = syscall::mq_close(mqd);
                true
            }
            Err(_) => false,
        }
    }
}

impl Drop for MsgQueue {
    fn drop(&mut self) {
        let _ = syscall::mq_close(self.mqd);
        if self.service {
            let _ = syscall::mq_unlink(&self.name);
        }
        warn!(
            "message statistics: received {}, sent {}, entry {}, exit {}",
            self.received.load(Ordering::Relaxed),
            self.sent.load(Ordering::Relaxed),
            self.entries.load(Ordering::Relaxed),
            self.exits.load(Ordering::Relaxed)
        );
    }
}

static SHARED: LazyLock<Mutex<Weak<MsgQueue>>> = LazyLock::new(|| Mutex::new(Weak::new()));

/// The per-process queue handle. All clients of one process share a
/// single handle; the queue is closed (and unlinked, for the service
/// owner) when the last clone is dropped.
pub fn shared(service: bool) -> Result<Arc<MsgQueue>> {
    let mut slot = SHARED
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(queue) = slot.upgrade() {
        return Ok(queue);
    }
    let queue = Arc::new(MsgQueue::open(QUEUE_NAME, service)?);
    *slot = Arc::downgrade(&queue);
    Ok(queue)
}

fn system_max_messages() -> i64 {
    let path = "/proc/sys/fs/mqueue/msg_max";
    match fs::read_to_string(path) {
        Ok(content) => match content.trim().parse() {
            Ok(max) => max,
            Err(_) => {
                error!("cannot parse content of {}", path);
                FALLBACK_MAX_MESSAGES
            }
        },
        Err(e) => {
            error!("cannot open {}: {}", path, e);
            FALLBACK_MAX_MESSAGES
        }
    }
}
