pub mod syscall;

// Microsecond conversion for the second/microsecond pairs returned
// by `gettimeofday` and `getrusage`.
pub fn to_micros(sec: i64, usec: i64) -> u64 {
    (sec as u64) * 1_000_000 + usec as u64
}
