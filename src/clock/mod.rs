use log::error;

use crate::ffi::syscall::{getrusage_thread, gettimeofday};
use crate::ffi::to_micros;


/// Division factor applied to stored microseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeUnit {
    Micros = 1,
    Millis = 1000,
}

/// One clock sample: wall clock plus the calling thread's accumulated
/// user and system CPU, all in microseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TimeStamp {
    pub wall_us: u64,
    pub user_cpu_us: u64,
    pub system_cpu_us: u64,
}

/// Wall-clock and per-thread CPU sampler.
///
/// `marker` stores the current sample; a later `elapsed` replaces the
/// stored sample with the componentwise interval since that marker.
#[derive(Clone, Copy, Debug, Default)]
pub struct PerfClock {
    ts: TimeStamp,
}

impl PerfClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_timestamp(ts: TimeStamp) -> Self {
        Self { ts }
    }

    pub fn timestamp(&self) -> TimeStamp {
        self.ts
    }

    /// Overwrite the stored sample with the current instant.
    pub fn marker(&mut self) {
        self.ts = sample();
    }

    /// Overwrite the stored sample with (now − marker), componentwise.
    /// Each field is a non-negative interval afterwards.
    pub fn elapsed(&mut self) {
        let now = sample();
        self.ts.wall_us = now.wall_us.saturating_sub(self.ts.wall_us);
        self.ts.user_cpu_us = now.user_cpu_us.saturating_sub(self.ts.user_cpu_us);
        self.ts.system_cpu_us = now.system_cpu_us.saturating_sub(self.ts.system_cpu_us);
    }

    pub fn wall(&self, unit: TimeUnit) -> u64 {
        self.ts.wall_us / unit as u64
    }

    pub fn user_cpu(&self, unit: TimeUnit) -> u64 {
        self.ts.user_cpu_us / unit as u64
    }

    pub fn system_cpu(&self, unit: TimeUnit) -> u64 {
        self.ts.system_cpu_us / unit as u64
    }
}

/// Current wall clock in microseconds since the epoch.
pub fn wall_clock_us() -> u64 {
    match gettimeofday() {
        Ok(tv) => to_micros(tv.tv_sec as _, tv.tv_usec as _),
        Err(e) => {
            error!("gettimeofday failed: {}", e);
            0
        }
    }
}

fn sample() -> TimeStamp {
    let wall_us = wall_clock_us();
    // CPU accounting degrades to zero when the OS refuses to report it,
    // wall clock stays usable either way.
    let (user_cpu_us, system_cpu_us) = match getrusage_thread() {
        Ok(usage) => (
            to_micros(usage.ru_utime.tv_sec as _, usage.ru_utime.tv_usec as _),
            to_micros(usage.ru_stime.tv_sec as _, usage.ru_stime.tv_usec as _),
        ),
        Err(e) => {
            error!("getrusage failed: {}", e);
            (0, 0)
        }
    };
    TimeStamp {
        wall_us,
        user_cpu_us,
        system_cpu_us,
    }
}
