//! Time source used by every blocking wait of the client.

use std::time::{Duration, Instant};

/// Source of "now" and of blocking sleeps.
///
/// All polling loops go through this trait, so tests can swap the wall clock for a fake one and
/// exercise timeouts without actually sleeping.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Repeatedly evaluates `probe` every `interval` until it yields a value or `budget` elapses.
///
/// The probe gets one last chance after the budget is spent, so a value that shows up during
/// the final sleep is not lost.
pub fn poll_until<C, T, F>(clock: &C, budget: Duration, interval: Duration, mut probe: F) -> Option<T>
where
    C: Clock + ?Sized,
    F: FnMut() -> Option<T>,
{
    let start = clock.now();
    loop {
        let elapsed = clock.now().saturating_duration_since(start);
        if elapsed >= budget {
            break;
        }
        if let Some(value) = probe() {
            return Some(value);
        }
        // never sleep past the budget
        clock.sleep(interval.min(budget - elapsed));
    }

    probe()
}
