use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Accept,
    /// Too close to the last accepted frame.
    Stale,
    /// A decode is still running.
    Busy,
}

/// Minimum spacing between accepted frames plus the single decode slot.
///
/// Spacing is measured on frame capture timestamps, not wall time at arrival.
#[derive(Debug)]
pub struct FrameThrottle {
    min_interval: Duration,
    last_accepted: Option<Instant>,
    decoding: bool,
}

impl FrameThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: None,
            decoding: false,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn is_decoding(&self) -> bool {
        self.decoding
    }

    /// Claims the decode slot for a frame captured at `captured_at`.
    pub fn admit(&mut self, captured_at: Instant) -> ThrottleDecision {
        if self.decoding {
            return ThrottleDecision::Busy;
        }
        if let Some(last) = self.last_accepted
            && captured_at.saturating_duration_since(last) < self.min_interval
        {
            return ThrottleDecision::Stale;
        }
        self.last_accepted = Some(captured_at);
        self.decoding = true;
        ThrottleDecision::Accept
    }

    /// Frees the decode slot.
    pub fn finish(&mut self) {
        self.decoding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spacing_is_measured_from_last_accepted() {
        let start = Instant::now();
        let mut throttle = FrameThrottle::new(Duration::from_millis(2000));

        assert_eq!(throttle.admit(start), ThrottleDecision::Accept);
        throttle.finish();
        assert_eq!(
            throttle.admit(start + Duration::from_millis(100)),
            ThrottleDecision::Stale
        );
        // Rejected frames do not move the window.
        assert_eq!(
            throttle.admit(start + Duration::from_millis(1999)),
            ThrottleDecision::Stale
        );
        assert_eq!(
            throttle.admit(start + Duration::from_millis(2000)),
            ThrottleDecision::Accept
        );
    }

    #[test]
    fn single_decode_slot() {
        let start = Instant::now();
        let mut throttle = FrameThrottle::new(Duration::from_millis(200));
        assert_eq!(throttle.admit(start), ThrottleDecision::Accept);
        assert_eq!(
            throttle.admit(start + Duration::from_secs(5)),
            ThrottleDecision::Busy
        );
        throttle.finish();
        assert_eq!(
            throttle.admit(start + Duration::from_secs(5)),
            ThrottleDecision::Accept
        );
    }
}
