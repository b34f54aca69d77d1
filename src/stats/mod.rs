use std::collections::HashMap;

#[cfg(test)]
mod test;

/// Preset for the min fields so the first sample always replaces them.
pub const INITIAL_MIN_US: u64 = 1_000_000_000;

const ROOT_NAME: &str = "root_node";

/// Aggregated counters for all visits to one call path.
///
/// `total_*` accumulates since node creation, `interval_*` since the last
/// full report. Times are microseconds, averages recomputed on every bump.
#[derive(Clone, Debug)]
pub struct TimingStats {
    pub total_time_us: u64,
    pub total_count: u64,
    pub total_min_us: u64,
    pub total_max_us: u64,
    pub total_avg_us: f64,
    pub interval_time_us: u64,
    pub interval_count: u64,
    pub interval_min_us: u64,
    pub interval_max_us: u64,
    pub interval_avg_us: f64,
    pub last_delta_us: u64,
    pub user_cpu_us: u64,
    pub system_cpu_us: u64,
    pub total_user_cpu_us: u64,
    pub total_system_cpu_us: u64,
}

impl Default for TimingStats {
    fn default() -> Self {
        Self {
            total_time_us: 0,
            total_count: 0,
            total_min_us: INITIAL_MIN_US,
            total_max_us: 0,
            total_avg_us: 0.0,
            interval_time_us: 0,
            interval_count: 0,
            interval_min_us: INITIAL_MIN_US,
            interval_max_us: 0,
            interval_avg_us: 0.0,
            last_delta_us: 0,
            user_cpu_us: 0,
            system_cpu_us: 0,
            total_user_cpu_us: 0,
            total_system_cpu_us: 0,
        }
    }
}

/// One node of a call tree: the stats for a nesting path plus the links
/// to its children. Children are arena indices owned by the tree, keyed
/// by element name (unique per parent).
#[derive(Clone, Debug)]
pub struct StatsNode {
    name: String,
    stats: TimingStats,
    threshold_us: i64,
    children: HashMap<String, usize>,
}

impl StatsNode {
    /// The synthetic node at the bottom of every tree. Carries a count of
    /// one so a report of an otherwise untouched tree stays well formed.
    pub fn root() -> Self {
        let mut node = Self::new(ROOT_NAME);
        node.stats.total_count = 1;
        node.stats.interval_count = 1;
        node
    }

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            stats: TimingStats::default(),
            threshold_us: -1,
            children: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &TimingStats {
        &self.stats
    }

    /// Microsecond limit for the threshold diagnostic, negative when disabled.
    pub fn threshold_us(&self) -> i64 {
        self.threshold_us
    }

    pub fn set_threshold(&mut self, us: i64) {
        self.threshold_us = us;
    }

    pub fn child(&self, name: &str) -> Option<usize> {
        self.children.get(name).copied()
    }

    pub fn link_child(&mut self, name: &str, index: usize) {
        self.children.insert(name.to_owned(), index);
    }

    pub fn children(&self) -> impl Iterator<Item = usize> + '_ {
        self.children.values().copied()
    }

    /// Record one completed visit.
    pub fn increment(&mut self, delta_us: u64, user_cpu_us: u64, system_cpu_us: u64) {
        let stats = &mut self.stats;
        stats.last_delta_us = delta_us;

        stats.total_time_us += delta_us;
        stats.total_count += 1;
        if stats.total_min_us > delta_us {
            stats.total_min_us = delta_us;
        }
        if stats.total_max_us < delta_us {
            stats.total_max_us = delta_us;
        }
        stats.total_avg_us = stats.total_time_us as f64 / stats.total_count as f64;

        stats.interval_time_us += delta_us;
        stats.interval_count += 1;
        if stats.interval_min_us > delta_us {
            stats.interval_min_us = delta_us;
        }
        if stats.interval_max_us < delta_us {
            stats.interval_max_us = delta_us;
        }
        stats.interval_avg_us = stats.interval_time_us as f64 / stats.interval_count as f64;

        stats.user_cpu_us = user_cpu_us;
        stats.system_cpu_us = system_cpu_us;
        stats.total_user_cpu_us += user_cpu_us;
        stats.total_system_cpu_us += system_cpu_us;
    }

    /// Zero the interval window; totals are untouched.
    pub fn reset_interval(&mut self) {
        let stats = &mut self.stats;
        stats.interval_time_us = 0;
        stats.interval_avg_us = 0.0;
        stats.interval_max_us = 0;
        stats.interval_min_us = INITIAL_MIN_US;
        stats.interval_count = 0;
    }

    /// One report line, indented two dashes per nesting level. Times are
    /// printed in milliseconds with three decimals; an untouched interval
    /// min still shows the raw preset.
    pub fn report_line(&self, level: u32, delta_only: bool) -> String {
        let mut line = "--".repeat(level as usize);
        let stats = &self.stats;
        if delta_only {
            line.push_str(&format!(
                "| {} elapsed time {:.3}",
                self.name,
                stats.last_delta_us as f64 / 1000.0
            ));
            #[cfg(feature = "cpu")]
            line.push_str(&format!(
                " CPU User {:.3}, System {:.3}",
                stats.user_cpu_us as f64 / 1000.0,
                stats.system_cpu_us as f64 / 1000.0
            ));
        } else {
            line.push_str(&format!("| {}", self.name));
            #[cfg(feature = "cpu")]
            {
                let calls = stats.total_count.max(1) as f64;
                line.push_str(&format!(
                    " CPU User {:.3}, System {:.3}",
                    stats.total_user_cpu_us as f64 / 1000.0 / calls,
                    stats.total_system_cpu_us as f64 / 1000.0 / calls
                ));
            }
            line.push_str(&format!(
                " (Count, Max, Min, Avg) Total {}, {:.3}, {:.3}, {:.3} Interval {}, {:.3}, {:.3}, {:.3}",
                stats.total_count,
                stats.total_max_us as f64 / 1000.0,
                stats.total_min_us as f64 / 1000.0,
                stats.total_avg_us / 1000.0,
                stats.interval_count,
                stats.interval_max_us as f64 / 1000.0,
                stats.interval_min_us as f64 / 1000.0,
                stats.interval_avg_us / 1000.0,
            ));
        }
        line
    }
}
