//! Time management utilities
//!
//! Frame timing is driven by a [`Clock`] so the frame loop can be tested with a
//! manually advanced clock instead of wall time.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic time source in seconds
pub trait Clock {
    /// Seconds since an arbitrary fixed origin. Never decreases.
    fn now(&self) -> f64;
}

/// Wall clock backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose origin is the current instant
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually advanced clock for deterministic tests and replays
///
/// Clones share the same time value.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time: Rc<Cell<f64>>,
}

impl ManualClock {
    /// Create a clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by `seconds`; negative steps are ignored
    pub fn advance(&self, seconds: f64) {
        if seconds > 0.0 {
            self.time.set(self.time.get() + seconds);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.time.get()
    }
}

/// Last/current sample pair of a frame timer
///
/// Each call to [`FrameTiming::sample`] moves `current` into `last` and records the
/// new time. `current` never moves backwards, so `delta` is never negative.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTiming {
    last: f64,
    current: f64,
}

impl FrameTiming {
    /// Create a timing pair with both samples at `time`
    pub const fn starting_at(time: f64) -> Self {
        Self { last: time, current: time }
    }

    /// Reset both samples to `time`
    pub fn reset(&mut self, time: f64) {
        *self = Self::starting_at(time);
    }

    /// Record a new sample from `clock` and return the resulting delta
    pub fn sample(&mut self, clock: &dyn Clock) -> f64 {
        self.record(clock.now())
    }

    /// Record `now` as the new current sample and return the resulting delta
    pub fn record(&mut self, now: f64) -> f64 {
        self.last = self.current;
        self.current = now.max(self.current);
        self.delta()
    }

    /// Previous sample in seconds
    pub const fn last(&self) -> f64 {
        self.last
    }

    /// Most recent sample in seconds
    pub const fn current(&self) -> f64 {
        self.current
    }

    /// Seconds between the last two samples
    pub fn delta(&self) -> f64 {
        self.current - self.last
    }
}

/// Simple stopwatch for measuring elapsed time
pub struct Stopwatch {
    start_time: Option<Instant>,
    elapsed: Duration,
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopwatch {
    /// Create a new stopped stopwatch
    pub const fn new() -> Self {
        Self {
            start_time: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Create a new stopwatch and start it immediately
    pub fn start_new() -> Self {
        let mut stopwatch = Self::new();
        stopwatch.start();
        stopwatch
    }

    /// Start the stopwatch
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Stop the stopwatch and accumulate elapsed time
    pub fn stop(&mut self) {
        if let Some(start) = self.start_time.take() {
            self.elapsed += start.elapsed();
        }
    }

    /// Reset the stopwatch to zero
    pub fn reset(&mut self) {
        self.start_time = None;
        self.elapsed = Duration::ZERO;
    }

    /// Get the elapsed time
    pub fn elapsed(&self) -> Duration {
        self.elapsed + self.start_time.map_or(Duration::ZERO, |start| start.elapsed())
    }

    /// Get the elapsed time in milliseconds
    pub fn elapsed_millis(&self) -> f32 {
        self.elapsed().as_secs_f32() * 1000.0
    }

    /// Check if the stopwatch is currently running
    pub const fn is_running(&self) -> bool {
        self.start_time.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consecutive_samples_chain() {
        let clock = ManualClock::new();
        let mut timing = FrameTiming::default();

        let mut previous_current = timing.current();
        for step in [0.016, 0.0, 0.033, 0.5] {
            clock.advance(step);
            timing.sample(&clock);
            assert_eq!(timing.last(), previous_current);
            assert!(timing.current() >= timing.last());
            assert!(timing.delta() >= 0.0);
            previous_current = timing.current();
        }
    }

    #[test]
    fn test_backwards_sample_is_clamped() {
        let mut timing = FrameTiming::starting_at(10.0);
        let delta = timing.record(4.0);
        assert_eq!(delta, 0.0);
        assert_eq!(timing.current(), 10.0);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let view = clock.clone();
        clock.advance(1.5);
        clock.advance(-3.0);
        assert_eq!(view.now(), 1.5);
    }

    #[test]
    fn test_stopwatch_accumulates() {
        let mut stopwatch = Stopwatch::start_new();
        assert!(stopwatch.is_running());
        stopwatch.stop();
        let first = stopwatch.elapsed();
        assert!(!stopwatch.is_running());
        assert_eq!(stopwatch.elapsed(), first);
        stopwatch.reset();
        assert_eq!(stopwatch.elapsed(), Duration::ZERO);
    }
}
