//! Scoped performance tracing with per-thread call trees.
//!
//! ## Example
//!
//! Wrap named regions of code in [`Perf`] guards; nested guards build a
//! per-thread call tree that aggregates count, min, max and average time
//! for every nesting path. Reports are printed periodically in the
//! background and on demand.
//!
//! ```no_run
//! use rdkperf::Perf;
//!
//! fn handle_request() {
//!     let _perf = Perf::new("handle_request");
//!     parse();
//!     respond();
//! }
//!
//! fn parse() {
//!     // Diagnose any call slower than 5 ms right away.
//!     let _perf = Perf::with_threshold("parse", 5_000);
//!     // ...
//! }
//!
//! fn respond() {
//!     let _perf = Perf::new("respond");
//!     // ...
//! }
//!
//! for _ in 0..16 {
//!     handle_request();
//! }
//! rdkperf::report_process(std::process::id() as i32);
//! rdkperf::shutdown();
//! ```
//!
//! ## Modes
//!
//! The default build aggregates in process. With the `remote` feature
//! every scope event is forwarded over a host-local message queue to the
//! `perfservice` aggregator, which rebuilds the same trees for any number
//! of client processes. The `noop` feature compiles all instrumentation
//! to nothing; `cpu` adds per-thread user/system CPU time to samples,
//! events and reports.

pub mod aggregator;
mod capi;
pub mod clock;
mod ffi;
pub mod logging;
pub mod queue;
pub mod registry;
pub mod reporter;
pub mod scope;
pub mod stats;
pub mod tree;

pub use scope::{
    close_process, close_thread, init, report_process, report_thread, shutdown, start, stop, Perf,
};
