//! Wall-clock timing utilities
//!
//! Registration phases run for minutes to hours, so durations are formatted
//! at second granularity and up.

use std::time::{Duration, Instant};

/// Phase timer for the registration pipeline
///
/// Tracks both the total elapsed time and the time since the last phase
/// boundary.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
    last_lap: Instant,
}

impl Stopwatch {
    /// Start a new stopwatch
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_lap: now,
        }
    }

    /// Time since the last lap (or since start), and begin a new lap
    pub fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let lap = now.duration_since(self.last_lap);
        self.last_lap = now;
        lap
    }

    /// Total time since the stopwatch was started
    pub fn total(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::start()
    }
}

/// Format a duration in human-readable form
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use regflock::util::time::format_duration;
///
/// assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
/// assert_eq!(format_duration(Duration::from_secs(5)), "5.0s");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
/// assert_eq!(format_duration(Duration::from_secs(7500)), "2h05m");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_stopwatch_laps_accumulate() {
        let mut watch = Stopwatch::start();
        thread::sleep(Duration::from_millis(10));
        let first = watch.lap();
        thread::sleep(Duration::from_millis(10));
        let second = watch.lap();

        assert!(first >= Duration::from_millis(10));
        assert!(second >= Duration::from_millis(10));
        assert!(watch.total() >= first + second);
    }

    #[test]
    fn test_lap_resets_boundary() {
        let mut watch = Stopwatch::start();
        thread::sleep(Duration::from_millis(20));
        watch.lap();
        let next = watch.lap();
        // Fresh lap right after the previous one is near zero
        assert!(next < Duration::from_millis(20));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(0)), "0ms");
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(59)), "59.0s");
        assert_eq!(format_duration(Duration::from_secs(60)), "1m00s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h00m");
        assert_eq!(format_duration(Duration::from_secs(7500)), "2h05m");
    }
}
