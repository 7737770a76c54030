use std::time::Duration;

/// Averages frame times over a reporting window.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameReport {
    pub frames: u32,
    pub ms_per_frame: f64,
    pub fps: f64,
}

/// Accumulates frame durations and yields a [`FrameReport`] once per interval.
#[derive(Debug, Clone)]
pub struct FrameStats {
    interval: Duration,
    accumulated: Duration,
    frames: u32,
}

impl FrameStats {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            accumulated: Duration::ZERO,
            frames: 0,
        }
    }

    /// Records one frame; returns a report when the interval has elapsed.
    pub fn record(&mut self, elapsed: Duration) -> Option<FrameReport> {
        self.accumulated += elapsed;
        self.frames += 1;

        if self.accumulated < self.interval {
            return None;
        }

        let secs = self.accumulated.as_secs_f64();
        let report = FrameReport {
            frames: self.frames,
            ms_per_frame: secs * 1000.0 / f64::from(self.frames),
            fps: f64::from(self.frames) / secs,
        };
        self.accumulated = Duration::ZERO;
        self.frames = 0;
        Some(report)
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_once_per_interval() {
        let mut stats = FrameStats::new(Duration::from_millis(100));
        let frame = Duration::from_millis(10);

        for _ in 0..9 {
            assert!(stats.record(frame).is_none());
        }
        let report = stats.record(frame).unwrap();
        assert_eq!(report.frames, 10);
        assert!((report.ms_per_frame - 10.0).abs() < 1e-9);
        assert!((report.fps - 100.0).abs() < 1e-9);

        assert!(stats.record(frame).is_none());
    }
}
