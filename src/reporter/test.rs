use super::{Backoff, Reporter};

#[test]
fn test_first_fire_on_second_tick() {
    let mut backoff = Backoff::new();
    assert!(!backoff.tick());
    assert!(backoff.tick());
    assert_eq!(backoff.delay_units(), 5);
}

#[test]
fn test_spacing_grows_five_units_per_report() {
    let mut backoff = Backoff::new();
    let mut fires = Vec::new();
    for tick in 0u32..2000 {
        if backoff.tick() {
            fires.push(tick);
        }
    }
    assert_eq!(fires[0], 1);
    let spacing: Vec<u32> = fires.windows(2).map(|w| w[1] - w[0]).collect();
    // One more tick than the delay: the count is compared before it is
    // bumped.
    assert_eq!(&spacing[..4], &[6, 11, 16, 21]);
}

#[test]
fn test_delay_caps_at_six_hundred_units() {
    let mut backoff = Backoff::new();
    let mut fires = Vec::new();
    for tick in 0u32..80_000 {
        if backoff.tick() {
            fires.push(tick);
        }
    }
    assert_eq!(backoff.delay_units(), 600);
    let spacing: Vec<u32> = fires.windows(2).map(|w| w[1] - w[0]).collect();
    let tail = &spacing[spacing.len() - 3..];
    assert_eq!(tail, &[601, 601, 601]);
}

#[test]
fn test_stop_joins_promptly() {
    let reporter = Reporter::spawn();
    let started = std::time::Instant::now();
    reporter.stop();
    // Signalled exit, not a full tick wait.
    assert!(started.elapsed() < std::time::Duration::from_secs(super::TICK_SECONDS));
}
