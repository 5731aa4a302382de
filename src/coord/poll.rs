//! Bounded polling
//!
//! There is no notification channel between workers, only files, so every
//! wait in the protocol is a poll loop. All of them (lock acquisition, the
//! rendezvous barrier, state and dispatch waits) go through [`poll_until`] so
//! they share one timeout discipline and one failure shape instead of each
//! inlining its own sleep/retry.

use std::time::{Duration, Instant};

/// How a wait point polls: probe interval, optional random jitter added to
/// each sleep, and the overall bound.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub jitter: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            jitter: Duration::ZERO,
            timeout,
        }
    }

    /// Add up to `jitter` of random extra sleep per probe, so contending
    /// workers drift apart instead of probing in lock-step.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn pause(&self) {
        let mut sleep = self.interval;
        if !self.jitter.is_zero() {
            sleep += self.jitter.mul_f64(rand::random::<f64>());
        }
        std::thread::sleep(sleep);
    }
}

/// Run `probe` until it yields a value or the policy's timeout passes.
///
/// `probe` returns `Ok(Some(v))` when the awaited condition holds and
/// `Ok(None)` to keep waiting. A timeout surfaces as `Ok(None)` from this
/// function so each call site raises its own error naming the resource it
/// waited on. Probe errors end the wait immediately.
pub fn poll_until<T, E, F>(policy: &PollPolicy, mut probe: F) -> Result<Option<T>, E>
where
    F: FnMut() -> Result<Option<T>, E>,
{
    let deadline = Instant::now() + policy.timeout;
    loop {
        if let Some(value) = probe()? {
            return Ok(Some(value));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        policy.pause();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick(timeout_ms: u64) -> PollPolicy {
        PollPolicy::new(Duration::from_millis(2), Duration::from_millis(timeout_ms))
    }

    #[test]
    fn test_immediate_success_probes_once() {
        let mut probes = 0;
        let result: Result<Option<u32>, ()> = poll_until(&quick(100), || {
            probes += 1;
            Ok(Some(7))
        });
        assert_eq!(result, Ok(Some(7)));
        assert_eq!(probes, 1);
    }

    #[test]
    fn test_success_after_several_probes() {
        let mut probes = 0;
        let result: Result<Option<&str>, ()> = poll_until(&quick(500), || {
            probes += 1;
            if probes < 4 {
                Ok(None)
            } else {
                Ok(Some("ready"))
            }
        });
        assert_eq!(result, Ok(Some("ready")));
        assert_eq!(probes, 4);
    }

    #[test]
    fn test_timeout_yields_none() {
        let start = Instant::now();
        let result: Result<Option<()>, ()> = poll_until(&quick(20), || Ok(None));
        assert_eq!(result, Ok(None));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_probe_error_ends_wait() {
        let mut probes = 0;
        let result: Result<Option<()>, &str> = poll_until(&quick(500), || {
            probes += 1;
            if probes == 2 {
                Err("record vanished")
            } else {
                Ok(None)
            }
        });
        assert_eq!(result, Err("record vanished"));
        assert_eq!(probes, 2);
    }

    #[test]
    fn test_jitter_still_bounded() {
        let policy = quick(30).with_jitter(Duration::from_millis(3));
        let start = Instant::now();
        let result: Result<Option<()>, ()> = poll_until(&policy, || Ok(None));
        assert_eq!(result, Ok(None));
        // One interval+jitter may overshoot the deadline, but not by much.
        assert!(start.elapsed() < Duration::from_millis(300));
    }
}
