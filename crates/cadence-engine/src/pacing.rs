//! Tick pacing and rolling tick-duration averages.

use std::thread;
use std::time::{Duration, Instant};

use crate::backplane::ShutdownSignal;

/// Longest single sleep while pacing, so a raised shutdown is noticed.
const PACE_SLICE: Duration = Duration::from_millis(10);

/// Sleeps away whatever is left of the target tick duration.
#[derive(Clone, Debug)]
pub struct TickPacer {
    target: Duration,
}

impl TickPacer {
    /// Pace towards `target`. `Duration::ZERO` disables pacing.
    pub fn new(target: Duration) -> Self {
        Self { target }
    }

    /// Time left after a tick that took `elapsed`.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.target.saturating_sub(elapsed)
    }

    /// Sleep until `target` has passed since `started`, or until `shutdown`
    /// is raised. Returns how long it slept.
    pub fn pace(&self, started: Instant, shutdown: &ShutdownSignal) -> Duration {
        let deadline = started + self.target;
        let slept_from = Instant::now();
        while !shutdown.is_raised() {
            let Some(left) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };
            if left.is_zero() {
                break;
            }
            thread::sleep(left.min(PACE_SLICE));
        }
        slept_from.elapsed()
    }
}

/// Rolling average of the last `window` tick durations.
#[derive(Clone, Debug)]
pub struct AveragingTimer {
    samples: Vec<u64>,
    pos: usize,
    filled: usize,
    sum: u64,
}

impl AveragingTimer {
    /// Average over the last `window` samples (at least one).
    pub fn new(window: usize) -> Self {
        Self {
            samples: vec![0; window.max(1)],
            pos: 0,
            filled: 0,
            sum: 0,
        }
    }

    /// Record one duration, in microseconds.
    pub fn record(&mut self, us: u64) {
        self.sum -= self.samples[self.pos];
        self.samples[self.pos] = us;
        self.sum += us;
        self.pos = (self.pos + 1) % self.samples.len();
        self.filled = (self.filled + 1).min(self.samples.len());
    }

    /// Mean of the recorded window, in microseconds. Zero when empty.
    pub fn average_us(&self) -> u64 {
        if self.filled == 0 {
            0
        } else {
            self.sum / self.filled as u64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn remaining_saturates() {
        let pacer = TickPacer::new(Duration::from_millis(100));
        assert_eq!(
            pacer.remaining(Duration::from_millis(30)),
            Duration::from_millis(70)
        );
        assert_eq!(pacer.remaining(Duration::from_millis(300)), Duration::ZERO);
    }

    #[test]
    fn zero_target_never_sleeps() {
        let pacer = TickPacer::new(Duration::ZERO);
        let slept = pacer.pace(Instant::now(), &ShutdownSignal::new());
        assert!(slept < Duration::from_millis(5));
    }

    #[test]
    fn pace_sleeps_out_the_tick() {
        let pacer = TickPacer::new(Duration::from_millis(30));
        let started = Instant::now();
        pacer.pace(started, &ShutdownSignal::new());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn raised_shutdown_cuts_pacing_short() {
        let pacer = TickPacer::new(Duration::from_secs(10));
        let signal = ShutdownSignal::new();
        signal.raise();
        let slept = pacer.pace(Instant::now(), &signal);
        assert!(slept < Duration::from_secs(1));
    }

    #[test]
    fn average_rolls_over_window() {
        let mut timer = AveragingTimer::new(2);
        assert_eq!(timer.average_us(), 0);
        timer.record(100);
        assert_eq!(timer.average_us(), 100);
        timer.record(300);
        assert_eq!(timer.average_us(), 200);
        timer.record(500);
        assert_eq!(timer.average_us(), 400);
    }

    proptest! {
        #[test]
        fn average_stays_within_recent_window(
            window in 1usize..16,
            samples in proptest::collection::vec(0u64..1_000_000_000, 1..64),
        ) {
            let mut timer = AveragingTimer::new(window);
            for &s in &samples {
                timer.record(s);
            }
            let recent = &samples[samples.len().saturating_sub(window)..];
            let lo = *recent.iter().min().unwrap();
            let hi = *recent.iter().max().unwrap();
            let avg = timer.average_us();
            prop_assert!(lo <= avg && avg <= hi, "{lo} <= {avg} <= {hi}");
        }
    }
}
