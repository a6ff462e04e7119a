#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples in workspace packages.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Runs a test body on a separate thread and panics if it does not finish
/// in time.
///
/// The packages in this workspace are built around threads that deliberately
/// block, so a bug tends to manifest as a hang rather than a failed
/// assertion. Wrapping each blocking test keeps one hang from stalling the
/// entire test run.
///
/// The limit is 10 seconds, extended under Miri where thread synchronization
/// is dramatically slower.
///
/// # Panics
///
/// Panics if the test body exceeds the time limit.
pub fn with_watchdog<F, R>(body: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let limit = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    with_watchdog_limit(limit, body)
}

/// [`with_watchdog`] with an explicit time limit.
///
/// # Panics
///
/// Panics if the test body exceeds `limit`.
pub fn with_watchdog_limit<F, R>(limit: Duration, body: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = mpsc::channel();

    let worker = thread::spawn(move || {
        // If this send fails, the watchdog has already given up on us.
        drop(tx.send(body()));
    });

    match rx.recv_timeout(limit) {
        Ok(result) => {
            worker
                .join()
                .expect("test body should not panic after reporting its result");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test body exceeded the {limit:?} watchdog limit")
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match worker.join() {
            Ok(()) => panic!("test body dropped its result channel without reporting"),
            Err(payload) => std::panic::resume_unwind(payload),
        },
    }
}

/// Runs a closure and returns its result together with the elapsed wall-clock
/// time.
///
/// Deadline-oriented tests assert on elapsed time with generous margins;
/// funneling them through one helper keeps the measurement pattern uniform.
pub fn measure<F, R>(body: F) -> (R, Duration)
where
    F: FnOnce() -> R,
{
    let started = Instant::now();
    let result = body();
    (result, started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watchdog_passes_through_result() {
        let result = with_watchdog(|| 42);
        assert_eq!(result, 42);
    }

    #[test]
    #[should_panic(expected = "watchdog limit")]
    fn watchdog_panics_on_hang() {
        with_watchdog_limit(Duration::from_millis(10), || {
            thread::sleep(Duration::from_secs(5));
        });
    }

    #[test]
    fn measure_reports_elapsed_time() {
        let ((), elapsed) = measure(|| thread::sleep(Duration::from_millis(20)));
        assert!(elapsed >= Duration::from_millis(20));
    }
}
