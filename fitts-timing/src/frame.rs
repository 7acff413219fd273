use crate::timer::Timer;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationStats {
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
}

/// Fixed-rate frame clock.
///
/// `tick` is called once per presented frame. It sleeps away whatever is
/// left of the frame budget and records the resulting frame duration.
#[derive(Debug, Clone)]
pub struct FrameLimiter {
    frame_budget: Duration,
    last_tick_ns: Option<u64>,
    pub frame_times: VecDeque<Duration>,
    pub max_samples: usize,
}

impl FrameLimiter {
    pub fn new(frame_rate: u32) -> Self {
        Self {
            frame_budget: Duration::from_nanos(1_000_000_000 / frame_rate.max(1) as u64),
            last_tick_ns: None,
            frame_times: VecDeque::with_capacity(1000),
            max_samples: 1000,
        }
    }

    pub fn frame_budget(&self) -> Duration {
        self.frame_budget
    }

    /// Waits out the rest of the current frame and returns its full duration.
    pub fn tick<T: Timer>(&mut self, timer: &T) -> Duration {
        let Some(last) = self.last_tick_ns else {
            self.last_tick_ns = Some(timer.now());
            return Duration::ZERO;
        };

        let spent = timer.elapsed(last);
        if spent < self.frame_budget {
            timer.sleep(self.frame_budget - spent);
        }

        let now = timer.now();
        let frame = Duration::from_nanos(now.saturating_sub(last));
        self.last_tick_ns = Some(now);
        self.record_frame(frame);
        frame
    }

    pub fn record_frame(&mut self, d: Duration) {
        if self.frame_times.len() >= self.max_samples {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(d);
    }

    pub fn frame_count(&self) -> usize {
        self.frame_times.len()
    }

    pub fn calibration_stats(&self) -> CalibrationStats {
        let times: Vec<f64> = self
            .frame_times
            .iter()
            .map(|d| d.as_nanos() as f64)
            .collect();
        if times.is_empty() {
            return CalibrationStats {
                average_frame_time_ns: 0.0,
                jitter_ns: 0.0,
                min_frame_time_ns: 0.0,
                max_frame_time_ns: 0.0,
                effective_fps: 0.0,
            };
        }
        let sum: f64 = times.iter().sum();
        let avg = sum / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        let jitter = var.sqrt();
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        CalibrationStats {
            average_frame_time_ns: avg,
            jitter_ns: jitter,
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualTimer;

    #[test]
    fn tick_pads_short_frames_to_budget() {
        let timer = ManualTimer::new();
        let mut limiter = FrameLimiter::new(50);
        assert_eq!(limiter.tick(&timer), Duration::ZERO);

        timer.advance_ms(5);
        assert_eq!(limiter.tick(&timer), Duration::from_millis(20));
        assert_eq!(timer.ticks_ms(), 20);
    }

    #[test]
    fn long_frames_are_not_padded() {
        let timer = ManualTimer::new();
        let mut limiter = FrameLimiter::new(50);
        limiter.tick(&timer);
        timer.advance_ms(35);
        assert_eq!(limiter.tick(&timer), Duration::from_millis(35));
    }

    #[test]
    fn stats_over_recorded_frames() {
        let mut limiter = FrameLimiter::new(60);
        limiter.record_frame(Duration::from_millis(10));
        limiter.record_frame(Duration::from_millis(30));
        let stats = limiter.calibration_stats();
        assert_eq!(stats.average_frame_time_ns, 20_000_000.0);
        assert_eq!(stats.jitter_ns, 10_000_000.0);
        assert_eq!(stats.min_frame_time_ns, 10_000_000.0);
        assert_eq!(stats.max_frame_time_ns, 30_000_000.0);
        assert_eq!(stats.effective_fps, 50.0);
    }

    #[test]
    fn sample_window_is_bounded() {
        let mut limiter = FrameLimiter::new(60);
        limiter.max_samples = 3;
        for ms in 1..=5 {
            limiter.record_frame(Duration::from_millis(ms));
        }
        assert_eq!(limiter.frame_count(), 3);
        assert_eq!(limiter.frame_times.front(), Some(&Duration::from_millis(3)));
    }
}
