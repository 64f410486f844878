use std::time::{Duration, Instant};

const EWMA_ALPHA: f32 = 0.1;
const WINDOW: Duration = Duration::from_secs(1);

/// Per-connection frame rate over one-second windows, plus a smoothed frame
/// time for the debug log.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window_start: Instant,
    window_frames: u32,
    fps: f32,
    average_frame_time_us: f32,
    total_frames: u64,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            window_start: now,
            window_frames: 0,
            fps: 0.0,
            average_frame_time_us: 0.0,
            total_frames: 0,
        }
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn average_frame_time_us(&self) -> f32 {
        self.average_frame_time_us
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn record(&mut self, frame_time: Duration) -> f32 {
        self.record_at(Instant::now(), frame_time)
    }

    fn record_at(&mut self, now: Instant, frame_time: Duration) -> f32 {
        self.total_frames += 1;
        self.window_frames += 1;
        self.average_frame_time_us = if self.total_frames == 1 {
            frame_time.as_micros() as f32
        } else {
            self.average_frame_time_us * (1.0 - EWMA_ALPHA)
                + frame_time.as_micros() as f32 * EWMA_ALPHA
        };
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= WINDOW {
            self.fps = ((self.window_frames as f32 / elapsed.as_secs_f32()) * 10.0).round() / 10.0;
            self.window_frames = 0;
            self.window_start = now;
        }
        self.fps
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_updates_once_per_window() {
        let start = Instant::now();
        let mut counter = FpsCounter::starting_at(start);
        for i in 1..30 {
            let at = start + Duration::from_millis(i * 33);
            assert_eq!(counter.record_at(at, Duration::from_millis(5)), 0.0);
        }
        let fps = counter.record_at(start + Duration::from_secs(1), Duration::from_millis(5));
        assert_eq!(fps, 30.0);
        assert_eq!(counter.total_frames(), 30);
    }

    #[test]
    fn frame_time_is_smoothed() {
        let start = Instant::now();
        let mut counter = FpsCounter::starting_at(start);
        counter.record_at(start, Duration::from_micros(1000));
        counter.record_at(start, Duration::from_micros(2000));
        assert!((counter.average_frame_time_us() - 1100.0).abs() < 0.01);
    }
}
