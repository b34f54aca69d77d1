use super::{ProcessEntry, Registry};
use crate::ffi::syscall::getpid;

#[test]
fn test_tree_or_new_reuses_existing() {
    let mut process = ProcessEntry::new(getpid());
    process.tree_or_new(1).add("a", 1, "one");
    assert_eq!(process.thread_count(), 1);
    process.tree_or_new(1);
    assert_eq!(process.thread_count(), 1);
    process.tree_or_new(2);
    assert_eq!(process.thread_count(), 2);
}

#[test]
fn test_process_name_comes_from_proc() {
    let process = ProcessEntry::new(getpid());
    // The test binary always has a cmdline.
    assert!(!process.name().is_empty());
}

#[test]
fn test_close_inactive_threads_reaps_only_quiescent_trees() {
    let mut process = ProcessEntry::new(getpid());

    // Reported and quiescent: inactive.
    let tree = process.tree_or_new(1);
    let node = tree.add("done", 1, "one");
    tree.close(node);
    tree.report();

    // Open scope: active.
    process.tree_or_new(2).add("busy", 2, "two");

    assert!(process.close_inactive_threads());
    assert_eq!(process.thread_count(), 1);
    assert!(process.trees().all(|tree| !tree.is_inactive()));

    // Nothing left to reap.
    assert!(!process.close_inactive_threads());
}

#[test]
fn test_remove_tree() {
    let mut process = ProcessEntry::new(getpid());
    process.tree_or_new(9);
    assert!(process.remove_tree(9));
    assert!(!process.remove_tree(9));
}

#[test]
fn test_registry_find_insert_remove() {
    let mut registry = Registry::new();
    assert!(registry.is_empty());
    assert!(registry.find(1234).is_none());

    registry.entry_or_new(getpid());
    assert_eq!(registry.len(), 1);
    assert!(registry.find(getpid()).is_some());

    assert!(registry.remove(getpid()));
    assert!(!registry.remove(getpid()));
    assert!(registry.is_empty());
}

#[test]
fn test_report_process_reaps_reported_trees() {
    let mut registry = Registry::new();
    let pid = getpid();
    {
        let tree = registry.entry_or_new(pid).tree_or_new(1);
        let node = tree.add("work", 1, "one");
        tree.node_mut(node).increment(500, 0, 0);
        tree.close(node);
    }

    // First report marks the tree, the second finds it inactive.
    registry.report_process(pid);
    assert_eq!(registry.find(pid).map(|p| p.thread_count()), Some(1));
    registry.report_process(pid);
    assert_eq!(registry.find(pid).map(|p| p.thread_count()), Some(0));
}

#[test]
fn test_report_thread_unknown_ids_are_harmless() {
    let mut registry = Registry::new();
    registry.report_thread(987_654, 42);
    registry.entry_or_new(getpid());
    registry.report_thread(getpid(), 42);
    assert!(!registry.close_thread(getpid(), 42));
}
