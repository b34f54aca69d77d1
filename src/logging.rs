use std::io::Write;
use std::sync::Once;

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::ffi::syscall::{getpid, pthread_self};

static SINK: Sink = Sink;
static INIT: Once = Once::new();

/// Install the process-wide log sink.
///
/// Idempotent. Records at Warn and above are always emitted; setting the
/// `RDKPER_EXTENDED_LOGGING` environment variable to `true` raises the
/// level to Trace.
pub fn init() {
    INIT.call_once(|| {
        let extended = std::env::var("RDKPER_EXTENDED_LOGGING")
            .map(|value| value.to_ascii_lowercase().starts_with("true"))
            .unwrap_or(false);
        let level = if extended {
            LevelFilter::Trace
        } else {
            LevelFilter::Warn
        };
        // Fails only if the host installed another logger first, in
        // which case records flow through that one instead.
        if log::set_logger(&SINK).is_ok() {
            log::set_max_level(level);
        }
        log::warn!("performance logging initialized, extended logging {}", extended);
    });
}

// One line per record:
// `Process ID <pid> : Thread ID <tid> : <module>(<line>) : <message>`
// Errors go to stderr, everything else to stdout.
struct Sink;

impl Log for Sink {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "Process ID {:X} : Thread ID {:X} : {}({}) : {}",
            getpid(),
            pthread_self(),
            record.module_path().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        );
        if record.level() == Level::Error {
            let mut out = std::io::stderr().lock();
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        } else {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}
