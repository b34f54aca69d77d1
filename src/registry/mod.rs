use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::sync::{LazyLock, Mutex};

use log::{error, warn};

use crate::clock::{PerfClock, TimeUnit};
use crate::tree::CallTree;

#[cfg(test)]
mod test;

/// All call trees of one observed process, keyed by thread id, plus the
/// clock marking the start of the current reporting interval.
pub struct ProcessEntry {
    pid: i32,
    name: String,
    threads: HashMap<u64, CallTree>,
    clock: PerfClock,
}

impl ProcessEntry {
    pub fn new(pid: i32) -> Self {
        let name = read_process_name(pid);
        warn!("creating new process entry {:X} named <{}>", pid, name);
        Self {
            pid,
            name,
            threads: HashMap::new(),
            clock: PerfClock::new(),
        }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tree(&mut self, thread_id: u64) -> Option<&mut CallTree> {
        self.threads.get_mut(&thread_id)
    }

    /// Existing tree for the thread, or a fresh one. Creating a tree also
    /// restarts the process's interval clock.
    pub fn tree_or_new(&mut self, thread_id: u64) -> &mut CallTree {
        match self.threads.entry(thread_id) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                self.clock.marker();
                vacant.insert(CallTree::new())
            }
        }
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn trees(&self) -> impl Iterator<Item = &CallTree> {
        self.threads.values()
    }

    pub fn show_trees(&self) {
        warn!(
            "displaying {} threads in thread map for process <{}>",
            self.threads.len(),
            self.name
        );
        for tree in self.threads.values() {
            match tree.top() {
                Some(top) => warn!(
                    "found thread {:X} named {} with stack depth {}, top node {}",
                    tree.thread_id(),
                    tree.thread_name(),
                    tree.depth(),
                    tree.node(top).name()
                ),
                None => warn!(
                    "found thread {:X} named {} with empty stack",
                    tree.thread_id(),
                    tree.thread_name()
                ),
            }
        }
    }

    /// Interval CPU summary followed by every tree's report. Restarts the
    /// interval clock.
    pub fn report(&mut self) {
        warn!(
            "found {} threads in this process {:X} named <{}>",
            self.threads.len(),
            self.pid,
            self.name
        );
        if self.threads.is_empty() {
            return;
        }

        self.clock.elapsed();
        let interval_ms = self.clock.wall(TimeUnit::Millis);
        let user_ms = self.clock.user_cpu(TimeUnit::Millis);
        let system_ms = self.clock.system_cpu(TimeUnit::Millis);
        let share = |cpu_ms: u64| {
            if interval_ms == 0 {
                0.0
            } else {
                cpu_ms as f64 * 100.0 / interval_ms as f64
            }
        };
        warn!(
            "CPU user: {} ms ({:.1}%) CPU system: {} ms ({:.1}%)",
            user_ms,
            share(user_ms),
            system_ms,
            share(system_ms)
        );
        self.clock.marker();

        for tree in self.threads.values_mut() {
            tree.report();
        }
    }

    /// Reap every tree that saw no pushes since its last report and has
    /// nothing open. Returns whether any tree was removed.
    pub fn close_inactive_threads(&mut self) -> bool {
        let mut removed = false;
        let name = self.name.clone();
        self.threads.retain(|_, tree| {
            if tree.is_inactive() {
                warn!(
                    "thread {} is inactive, removing from process <{}>",
                    tree.thread_name(),
                    name
                );
                removed = true;
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn remove_tree(&mut self, thread_id: u64) -> bool {
        self.threads.remove(&thread_id).is_some()
    }
}

fn read_process_name(pid: i32) -> String {
    match fs::read(format!("/proc/{}/cmdline", pid)) {
        Ok(bytes) => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
        Err(e) => {
            error!("could not read process name: {}", e);
            String::new()
        }
    }
}

/// Mapping process id → process entry. The in-process library holds
/// exactly one entry behind [`global`]; the aggregator owns its own
/// registry and fills it as events arrive.
#[derive(Default)]
pub struct Registry {
    processes: HashMap<i32, ProcessEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, pid: i32) -> Option<&ProcessEntry> {
        self.processes.get(&pid)
    }

    pub fn find_mut(&mut self, pid: i32) -> Option<&mut ProcessEntry> {
        self.processes.get_mut(&pid)
    }

    pub fn entry_or_new(&mut self, pid: i32) -> &mut ProcessEntry {
        match self.processes.entry(pid) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => vacant.insert(ProcessEntry::new(pid)),
        }
    }

    pub fn remove(&mut self, pid: i32) -> bool {
        match self.processes.remove(&pid) {
            Some(_) => true,
            None => {
                error!("could not find process ID {:X} for removal", pid);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Show, reap, then report one process.
    pub fn report_process(&mut self, pid: i32) {
        match self.processes.get_mut(&pid) {
            Some(process) => {
                process.show_trees();
                process.close_inactive_threads();
                warn!("printing process report for process ID {:X}", pid);
                process.report();
            }
            None => error!("could not find process ID {:X} for reporting", pid),
        }
    }

    pub fn report_thread(&mut self, pid: i32, thread_id: u64) {
        let Some(process) = self.processes.get_mut(&pid) else {
            error!("could not find process ID {:X} for reporting", pid);
            return;
        };
        match process.tree(thread_id) {
            Some(tree) => {
                warn!("printing tree report for thread ID {:X}", thread_id);
                tree.report();
            }
            None => error!("could not find thread {:X} in process {:X}", thread_id, pid),
        }
    }

    pub fn close_thread(&mut self, pid: i32, thread_id: u64) -> bool {
        match self.processes.get_mut(&pid) {
            Some(process) => process.remove_tree(thread_id),
            None => false,
        }
    }
}

static REGISTRY: LazyLock<Mutex<Registry>> = LazyLock::new(|| Mutex::new(Registry::new()));

/// The process-wide registry. The one lock serializing every mutation of
/// the registry, its trees and their stats.
pub fn global() -> &'static Mutex<Registry> {
    &REGISTRY
}

/// Take the registry lock, recovering it from a panicked holder.
pub fn lock() -> std::sync::MutexGuard<'static, Registry> {
    REGISTRY
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
