use super::CallTree;

#[test]
fn test_first_add_builds_root() {
    let mut tree = CallTree::new();
    let node = tree.add("first", 7, "worker");
    assert_eq!(tree.thread_id(), 7);
    assert_eq!(tree.thread_name(), "worker");
    assert_eq!(tree.depth(), 2);
    assert_eq!(tree.top(), Some(node));
    assert_eq!(tree.node(node).name(), "first");
    assert_eq!(tree.node(0).name(), "root_node");
    assert_eq!(tree.node(0).child("first"), Some(node));
}

#[test]
fn test_enter_exit_leaves_stack_unchanged() {
    let mut tree = CallTree::new();
    let node = tree.add("scope", 1, "t");
    tree.node_mut(node).increment(10, 0, 0);
    tree.close(node);
    assert_eq!(tree.depth(), 1);
    assert_eq!(tree.top(), Some(0));
    assert_eq!(tree.node(node).stats().total_count, 1);
}

#[test]
fn test_nested_scopes_aggregate_by_path() {
    // outer { inner; inner; }
    let mut tree = CallTree::new();
    let outer = tree.add("outer", 1, "t");
    let first = tree.add("inner", 1, "t");
    tree.node_mut(first).increment(10, 0, 0);
    tree.close(first);
    let second = tree.add("inner", 1, "t");
    assert_eq!(first, second);
    tree.node_mut(second).increment(20, 0, 0);
    tree.close(second);
    tree.node_mut(outer).increment(50, 0, 0);
    tree.close(outer);

    assert_eq!(tree.depth(), 1);
    assert_eq!(tree.node(outer).stats().total_count, 1);
    assert_eq!(tree.node(first).stats().total_count, 2);
    assert_eq!(tree.node(outer).child("inner"), Some(first));
    let inner_avg = tree.node(first).stats().total_avg_us;
    assert!(tree.node(outer).stats().total_time_us as f64 >= 2.0 * inner_avg);
}

#[test]
fn test_same_name_under_different_parents_is_distinct() {
    let mut tree = CallTree::new();
    let a = tree.add("a", 1, "t");
    let leaf_under_a = tree.add("leaf", 1, "t");
    tree.close(leaf_under_a);
    tree.close(a);
    let b = tree.add("b", 1, "t");
    let leaf_under_b = tree.add("leaf", 1, "t");
    assert_ne!(leaf_under_a, leaf_under_b);
    tree.close(leaf_under_b);
    tree.close(b);
}

#[test]
fn test_close_mismatch_leaves_stack_untouched() {
    let mut tree = CallTree::new();
    let outer = tree.add("outer", 1, "t");
    let inner = tree.add("inner", 1, "t");
    tree.close(outer);
    assert_eq!(tree.depth(), 3);
    assert_eq!(tree.top(), Some(inner));
    tree.close(inner);
    assert_eq!(tree.top(), Some(outer));
}

#[test]
fn test_activity_counter_tracks_pushes() {
    let mut tree = CallTree::new();
    assert_eq!(tree.activity_count(), 0);
    let a = tree.add("a", 1, "t");
    let b = tree.add("b", 1, "t");
    assert_eq!(tree.activity_count(), 2);
    tree.close(b);
    tree.close(a);
    assert_eq!(tree.activity_count(), 2);
}

#[test]
fn test_inactive_needs_report_and_quiescence() {
    let mut tree = CallTree::new();
    let a = tree.add("a", 1, "t");
    // New pushes since the last report.
    assert!(!tree.is_inactive());
    tree.close(a);
    assert!(!tree.is_inactive());

    tree.report();
    assert!(tree.is_inactive());

    // Open scope keeps the tree active even after a report.
    let a = tree.add("a", 1, "t");
    tree.report();
    assert!(!tree.is_inactive());
    tree.close(a);
    tree.report();
    assert!(tree.is_inactive());
}

#[test]
fn test_report_resets_intervals_keeps_totals() {
    let mut tree = CallTree::new();
    let a = tree.add("a", 1, "t");
    tree.node_mut(a).increment(100, 0, 0);
    tree.close(a);

    tree.report();
    let stats = tree.node(a).stats();
    assert_eq!(stats.total_count, 1);
    assert_eq!(stats.total_time_us, 100);
    assert_eq!(stats.interval_count, 0);
    assert_eq!(stats.interval_time_us, 0);

    // Totals are untouched by reporting again.
    tree.report();
    assert_eq!(tree.node(a).stats().total_count, 1);
}

#[test]
fn test_thread_name_truncated() {
    let mut tree = CallTree::new();
    tree.add("a", 1, "a-name-longer-than-the-pthread-limit");
    assert_eq!(tree.thread_name().len(), super::THREAD_NAME_LEN);
}
