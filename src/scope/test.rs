use std::thread;
use std::time::Duration;

use super::{report_thread, start, stop, Perf};
use crate::ffi::syscall::{getpid, pthread_self};
use crate::registry;
use crate::stats::TimingStats;

// Each test runs on its own harness thread, so every test owns its call
// tree and the shared process entry stays uncontended across them.
fn own_node_stats(name: &str) -> Option<TimingStats> {
    let mut reg = registry::lock();
    let tree = reg.find_mut(getpid())?.tree(pthread_self())?;
    let node = tree.node(0).child(name)?;
    Some(tree.node(node).stats().clone())
}

fn own_node_threshold(name: &str) -> Option<i64> {
    let mut reg = registry::lock();
    let tree = reg.find_mut(getpid())?.tree(pthread_self())?;
    let node = tree.node(0).child(name)?;
    Some(tree.node(node).threshold_us())
}

#[test]
fn test_single_scope_records_one_visit() {
    {
        let _perf = Perf::new("single_visit");
        thread::sleep(Duration::from_millis(100));
    }
    let stats = own_node_stats("single_visit").unwrap();
    assert_eq!(stats.total_count, 1);
    assert_eq!(stats.interval_count, 1);
    assert!(stats.total_min_us >= 100_000);
    assert!(stats.total_max_us < 10_000_000);
    assert!(stats.total_min_us as f64 <= stats.total_avg_us);
    assert!(stats.total_avg_us <= stats.total_max_us as f64);
}

#[test]
fn test_nested_scopes_build_one_path() {
    {
        let _outer = Perf::new("nest_outer");
        for _ in 0..2 {
            let _inner = Perf::new("nest_inner");
            thread::sleep(Duration::from_millis(5));
        }
    }

    let mut reg = registry::lock();
    let tree = reg.find_mut(getpid()).unwrap().tree(pthread_self()).unwrap();
    assert_eq!(tree.depth(), 1);
    let outer = tree.node(0).child("nest_outer").unwrap();
    let inner = tree.node(outer).child("nest_inner").unwrap();
    assert_eq!(tree.node(outer).stats().total_count, 1);
    assert_eq!(tree.node(inner).stats().total_count, 2);
    assert!(
        tree.node(outer).stats().total_time_us as f64
            >= 2.0 * tree.node(inner).stats().total_avg_us
    );
    // The inner node hangs off the outer one, not the root.
    assert!(tree.node(0).child("nest_inner").is_none());
}

#[test]
fn test_same_scope_name_on_two_threads_keeps_trees_apart() {
    let spawn_worker = |label: &'static str| {
        thread::Builder::new()
            .name(label.into())
            .spawn(|| {
                for _ in 0..10 {
                    let _perf = Perf::new("shared_worker");
                    thread::sleep(Duration::from_millis(2));
                }
                pthread_self()
            })
            .unwrap()
    };

    let first = spawn_worker("worker-one");
    let second = spawn_worker("worker-two");
    let tids = [first.join().unwrap(), second.join().unwrap()];
    assert_ne!(tids[0], tids[1]);

    let mut reg = registry::lock();
    let process = reg.find_mut(getpid()).unwrap();
    let mut names = Vec::new();
    for tid in tids {
        let tree = process.tree(tid).unwrap();
        let node = tree.node(0).child("shared_worker").unwrap();
        assert_eq!(tree.node(node).stats().total_count, 10);
        names.push(tree.thread_name().to_owned());
    }
    names.sort();
    assert_eq!(names, ["worker-one", "worker-two"]);
}

#[test]
fn test_threshold_diagnostic_path() {
    {
        let _perf = Perf::with_threshold("threshold_hit", 1_000);
        thread::sleep(Duration::from_millis(50));
    }
    let stats = own_node_stats("threshold_hit").unwrap();
    assert_eq!(stats.total_count, 1);
    assert!(stats.last_delta_us > 1_000);
    assert_eq!(own_node_threshold("threshold_hit"), Some(1_000));
}

#[test]
fn test_set_threshold_on_active_scope() {
    {
        let mut perf = Perf::new("threshold_late");
        perf.set_threshold(2_000);
    }
    assert_eq!(own_node_threshold("threshold_late"), Some(2_000));
}

#[test]
fn test_start_stop_handle_api() {
    let handle = start("handle_api");
    stop(handle);
    let stats = own_node_stats("handle_api").unwrap();
    assert_eq!(stats.total_count, 1);
}

// Reports only this thread's tree: a process-wide report would reset
// the interval counters the parallel tests assert on.
#[test]
fn test_report_thread_resets_intervals_keeps_totals() {
    {
        let _perf = Perf::new("report_target");
        thread::sleep(Duration::from_millis(5));
    }
    let before = own_node_stats("report_target").unwrap();
    assert_eq!(before.interval_count, 1);

    report_thread(pthread_self());

    let after = own_node_stats("report_target").unwrap();
    assert_eq!(after.total_count, before.total_count);
    assert_eq!(after.total_time_us, before.total_time_us);
    assert_eq!(after.interval_count, 0);
}

#[test]
fn test_scope_survives_foreign_close_thread() {
    // Closing another thread's tree must not disturb this one.
    let _perf = Perf::new("survivor");
    super::close_thread(0xDEAD_BEEF);
    drop(_perf);
    assert_eq!(own_node_stats("survivor").unwrap().total_count, 1);
}
