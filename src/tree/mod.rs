use arrayvec::ArrayString;
use log::{error, warn};

use crate::stats::StatsNode;

#[cfg(test)]
mod test;

/// Same bound `pthread_setname_np` enforces: 15 bytes plus the NUL.
pub const THREAD_NAME_LEN: usize = 16;

/// Per-thread tree of stats nodes keyed by nesting path.
///
/// Nodes live in an arena; the active stack holds the indices of the
/// currently open nodes, bottom always the synthetic root. A node is
/// created once per (parent, name) pair and lives until the tree is
/// dropped, so repeated visits to the same path aggregate in place.
pub struct CallTree {
    thread_id: u64,
    thread_name: ArrayString<THREAD_NAME_LEN>,
    nodes: Vec<StatsNode>,
    active: Vec<usize>,
    activity_count: u64,
    count_at_last_report: u64,
}

impl CallTree {
    pub fn new() -> Self {
        Self {
            thread_id: 0,
            thread_name: ArrayString::new(),
            nodes: Vec::new(),
            active: Vec::new(),
            activity_count: 0,
            count_at_last_report: 0,
        }
    }

    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    pub fn node(&self, index: usize) -> &StatsNode {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut StatsNode {
        &mut self.nodes[index]
    }

    /// Index of the innermost open node, if any scope was ever entered.
    pub fn top(&self) -> Option<usize> {
        self.active.last().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        self.active.len()
    }

    pub fn activity_count(&self) -> u64 {
        self.activity_count
    }

    /// Open a scope: find or create the child of the current top by name,
    /// push it and return its index. The first add on a thread builds the
    /// root and records the thread identity.
    pub fn add(&mut self, name: &str, thread_id: u64, thread_name: &str) -> usize {
        if self.active.is_empty() {
            self.nodes.push(StatsNode::root());
            self.active.push(0);
            self.thread_id = thread_id;
            self.thread_name = truncate_name(thread_name);
            warn!(
                "creating new tree, stack size {} for node {}, thread name {}",
                self.active.len(),
                name,
                self.thread_name
            );
        }
        let top = self.active[self.active.len() - 1];
        let child = match self.nodes[top].child(name) {
            Some(index) => index,
            None => {
                let index = self.nodes.len();
                self.nodes.push(StatsNode::new(name));
                self.nodes[top].link_child(name, index);
                index
            }
        };
        self.active.push(child);
        self.activity_count += 1;
        child
    }

    /// Close a scope. Closing anything but the innermost open node is a
    /// nesting violation: it is reported and the stack is left untouched.
    pub fn close(&mut self, node: usize) {
        match self.active.last() {
            Some(&top) if top == node => {
                self.active.pop();
            }
            Some(&top) => error!(
                "not closing the active node ({} != {})",
                self.nodes[top].name(),
                self.nodes[node].name()
            ),
            None => error!("close with no active node"),
        }
    }

    /// No pushes since the last report and nothing open beyond the root.
    pub fn is_inactive(&self) -> bool {
        self.activity_count == self.count_at_last_report && self.active.len() <= 1
    }

    /// Full report of the tree, post-order interval reset, then update the
    /// activity marker for the reaper.
    pub fn report(&mut self) {
        warn!(
            "printing report on {:X} thread named {}",
            self.thread_id, self.thread_name
        );
        if !self.nodes.is_empty() {
            self.report_node(0, 0, false);
        }
        self.count_at_last_report = self.activity_count;
    }

    /// Report the subtree under `node`. With `delta_only` the lines carry
    /// only the last delta; otherwise the interval window of each node is
    /// reset after its children are printed.
    pub fn report_node(&mut self, node: usize, level: u32, delta_only: bool) {
        warn!("{}", self.nodes[node].report_line(level, delta_only));
        let children: Vec<usize> = self.nodes[node].children().collect();
        for child in children {
            self.report_node(child, level + 1, delta_only);
        }
        if !delta_only {
            self.nodes[node].reset_interval();
        }
    }

    /// The extra diagnostic for an exceeded threshold: the node's delta
    /// line plus a single level of its children.
    pub fn report_delta(&self, node: usize) {
        warn!("{}", self.nodes[node].report_line(0, true));
        for child in self.nodes[node].children() {
            warn!("{}", self.nodes[child].report_line(1, true));
        }
    }
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_name(name: &str) -> ArrayString<THREAD_NAME_LEN> {
    let mut out = ArrayString::new();
    for c in name.chars() {
        if out.try_push(c).is_err() {
            break;
        }
    }
    out
}
