use super::{StatsNode, INITIAL_MIN_US};

#[test]
fn test_first_sample_replaces_min_preset() {
    let mut node = StatsNode::new("sample");
    assert_eq!(node.stats().total_min_us, INITIAL_MIN_US);
    assert_eq!(node.stats().interval_min_us, INITIAL_MIN_US);

    node.increment(100, 0, 0);
    let stats = node.stats();
    assert_eq!(stats.total_count, 1);
    assert_eq!(stats.total_min_us, 100);
    assert_eq!(stats.total_max_us, 100);
    assert_eq!(stats.last_delta_us, 100);
}

#[test]
fn test_min_avg_max_ordering() {
    let mut node = StatsNode::new("sample");
    for delta in [300, 100, 200] {
        node.increment(delta, 0, 0);
    }
    let stats = node.stats();
    assert_eq!(stats.total_min_us, 100);
    assert_eq!(stats.total_max_us, 300);
    assert_eq!(stats.total_avg_us, 200.0);
    assert!(stats.total_min_us as f64 <= stats.total_avg_us);
    assert!(stats.total_avg_us <= stats.total_max_us as f64);
}

#[test]
fn test_total_time_is_sum_of_deltas() {
    let mut node = StatsNode::new("sample");
    let deltas = [17, 4, 1000, 3, 250];
    for delta in deltas {
        node.increment(delta, 0, 0);
    }
    let stats = node.stats();
    assert_eq!(stats.total_time_us, deltas.iter().sum::<u64>());
    assert_eq!(stats.total_count, deltas.len() as u64);
    assert_eq!(stats.last_delta_us, 250);
}

#[test]
fn test_reset_interval_keeps_totals() {
    let mut node = StatsNode::new("sample");
    node.increment(40, 0, 0);
    node.increment(60, 0, 0);

    node.reset_interval();
    let stats = node.stats();
    assert_eq!(stats.interval_count, 0);
    assert_eq!(stats.interval_time_us, 0);
    assert_eq!(stats.interval_max_us, 0);
    assert_eq!(stats.interval_min_us, INITIAL_MIN_US);
    assert_eq!(stats.interval_avg_us, 0.0);
    assert_eq!(stats.total_count, 2);
    assert_eq!(stats.total_time_us, 100);
    assert_eq!(stats.total_avg_us, 50.0);

    // The next sample restarts the interval window.
    node.increment(10, 0, 0);
    let stats = node.stats();
    assert_eq!(stats.interval_count, 1);
    assert_eq!(stats.interval_min_us, 10);
    assert_eq!(stats.total_count, 3);
}

#[test]
fn test_million_iterations_accumulate() {
    let mut node = StatsNode::new("sample");
    for _ in 0..1_000_000 {
        node.increment(1000, 0, 0);
    }
    let stats = node.stats();
    assert_eq!(stats.total_count, 1_000_000);
    assert_eq!(stats.total_time_us, 1_000_000_000);
    assert_eq!(stats.total_avg_us, 1000.0);
    assert_eq!(stats.total_min_us, 1000);
    assert_eq!(stats.total_max_us, 1000);
}

#[test]
fn test_cpu_counters() {
    let mut node = StatsNode::new("sample");
    node.increment(10, 4, 2);
    node.increment(10, 6, 1);
    let stats = node.stats();
    assert_eq!(stats.user_cpu_us, 6);
    assert_eq!(stats.system_cpu_us, 1);
    assert_eq!(stats.total_user_cpu_us, 10);
    assert_eq!(stats.total_system_cpu_us, 3);
}

#[test]
fn test_threshold_disabled_by_default() {
    let mut node = StatsNode::new("sample");
    assert!(node.threshold_us() < 0);
    node.set_threshold(5000);
    assert_eq!(node.threshold_us(), 5000);
}

#[test]
fn test_root_carries_one_count() {
    let root = StatsNode::root();
    assert_eq!(root.name(), "root_node");
    assert_eq!(root.stats().total_count, 1);
    assert_eq!(root.stats().interval_count, 1);
}

#[test]
fn test_report_line_full() {
    let mut node = StatsNode::new("sample");
    node.increment(1500, 0, 0);
    let line = node.report_line(2, false);
    assert!(line.starts_with("----| sample"));
    assert!(line.contains("(Count, Max, Min, Avg) Total 1, 1.500, 1.500, 1.500"));
    assert!(line.contains("Interval 1, 1.500, 1.500, 1.500"));
}

#[test]
fn test_report_line_delta() {
    let mut node = StatsNode::new("sample");
    node.increment(2500, 0, 0);
    let line = node.report_line(0, true);
    assert!(line.starts_with("| sample elapsed time 2.500"));
}
