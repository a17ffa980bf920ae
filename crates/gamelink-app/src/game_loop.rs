//! Fixed-timestep loop that feeds the network client its ticks.
//!
//! Wall-clock frame time goes into an accumulator which is drained in fixed
//! steps, so the client always sees the same `dt` regardless of how irregular
//! the frames are.

use std::time::{Duration, Instant};

use tracing::warn;

/// Fixed step: 60 Hz.
pub const FIXED_DT: f64 = 1.0 / 60.0;

/// Longest frame accounted for. Anything slower is clamped so a stall does not
/// turn into a burst of catch-up steps.
pub const MAX_FRAME_TIME: f64 = 0.25;

/// [`FIXED_DT`] as a `Duration`.
pub fn fixed_step() -> Duration {
    Duration::from_secs_f64(FIXED_DT)
}

/// Fixed-timestep loop state.
pub struct GameLoop {
    previous_time: Instant,
    accumulator: f64,
    total_sim_time: f64,
    frame_count: u64,
    update_count: u64,
}

impl GameLoop {
    /// Creates a new `GameLoop` starting from the current instant.
    pub fn new() -> Self {
        Self {
            previous_time: Instant::now(),
            accumulator: 0.0,
            total_sim_time: 0.0,
            frame_count: 0,
            update_count: 0,
        }
    }

    /// Measure the time since the previous frame and run `update_fn` once per
    /// whole fixed step it covers. Returns the number of steps run.
    pub fn tick(&mut self, update_fn: impl FnMut(Duration)) -> u32 {
        let now = Instant::now();
        let frame_time = now.duration_since(self.previous_time).as_secs_f64();
        self.previous_time = now;
        self.advance(frame_time, update_fn)
    }

    /// Run the steps covered by an explicit `frame_time` in seconds.
    pub fn advance(&mut self, frame_time: f64, mut update_fn: impl FnMut(Duration)) -> u32 {
        let mut frame_time = frame_time.max(0.0);
        if frame_time > MAX_FRAME_TIME {
            warn!(
                "Frame time {:.1}ms exceeds maximum, clamping to {:.1}ms",
                frame_time * 1000.0,
                MAX_FRAME_TIME * 1000.0
            );
            frame_time = MAX_FRAME_TIME;
        }

        self.accumulator += frame_time;

        let step = fixed_step();
        let mut steps = 0;
        while self.accumulator >= FIXED_DT {
            update_fn(step);
            self.total_sim_time += FIXED_DT;
            self.accumulator -= FIXED_DT;
            self.update_count += 1;
            steps += 1;
        }

        self.frame_count += 1;
        steps
    }

    /// Time until the next step is due.
    pub fn until_next_step(&self) -> Duration {
        Duration::from_secs_f64((FIXED_DT - self.accumulator).max(0.0))
    }

    /// Returns the total number of frames processed.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Returns the total number of fixed steps executed.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Returns the total simulated time in seconds.
    pub fn total_sim_time(&self) -> f64 {
        self.total_sim_time
    }
}

impl Default for GameLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_dt_value() {
        assert!(
            (FIXED_DT - 1.0 / 60.0).abs() < f64::EPSILON * 10.0,
            "FIXED_DT should equal 1/60"
        );
        assert_eq!(fixed_step(), Duration::from_secs_f64(1.0 / 60.0));
    }

    #[test]
    fn test_single_step() {
        let mut loop_ = GameLoop::new();
        let mut dts = Vec::new();
        assert_eq!(loop_.advance(FIXED_DT, |dt| dts.push(dt)), 1);
        assert_eq!(dts, vec![fixed_step()]);
        assert!(loop_.accumulator.abs() < 1e-12);
    }

    #[test]
    fn test_multiple_steps() {
        let mut loop_ = GameLoop::new();
        assert_eq!(loop_.advance(3.0 * FIXED_DT + 1e-9, |_| {}), 3);
        assert!((loop_.total_sim_time() - 3.0 * FIXED_DT).abs() < 1e-12);
    }

    #[test]
    fn test_partial_frame_carries_over() {
        let mut loop_ = GameLoop::new();
        assert_eq!(loop_.advance(0.5 * FIXED_DT, |_| {}), 0);
        assert!((loop_.accumulator - 0.5 * FIXED_DT).abs() < 1e-12);
        assert!(loop_.until_next_step() <= Duration::from_secs_f64(0.5 * FIXED_DT + 1e-9));

        assert_eq!(loop_.advance(0.5 * FIXED_DT + 1e-9, |_| {}), 1);
    }

    #[test]
    fn test_max_frame_time_clamp() {
        let mut loop_ = GameLoop::new();
        let steps = loop_.advance(1.0, |_| {});
        let max_steps = (MAX_FRAME_TIME / FIXED_DT).ceil() as u32;
        assert!(steps <= max_steps, "Expected at most {max_steps} steps, got {steps}");
        assert!(steps > 0);
    }

    #[test]
    fn test_negative_frame_time_ignored() {
        let mut loop_ = GameLoop::new();
        assert_eq!(loop_.advance(-1.0, |_| {}), 0);
        assert_eq!(loop_.frame_count(), 1);
    }

    #[test]
    fn test_deterministic_sequence() {
        let frame_times = [0.017, 0.015, 0.020, 0.016, 0.033, 0.008, 0.018];

        let mut loop_a = GameLoop::new();
        let mut loop_b = GameLoop::new();
        for &ft in &frame_times {
            assert_eq!(loop_a.advance(ft, |_| {}), loop_b.advance(ft, |_| {}));
        }

        assert_eq!(loop_a.update_count(), loop_b.update_count());
        assert_eq!(loop_a.frame_count(), frame_times.len() as u64);
    }

    #[test]
    fn test_game_loop_default() {
        let loop_ = GameLoop::default();
        assert_eq!(loop_.frame_count(), 0);
        assert_eq!(loop_.update_count(), 0);
        assert!((loop_.total_sim_time() - 0.0).abs() < f64::EPSILON);
    }
}
