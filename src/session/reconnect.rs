//! Reconnection policy
//!
//! Flat delay, unbounded attempts. A sign-out is the only reason that
//! stops the loop; everything else retries after `delay`.

use std::time::Duration;

use crate::transport::DisconnectReason;

/// Default pause before re-dialing the transport
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry { after: Duration },
    Stop,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn decide(&self, reason: &DisconnectReason) -> ReconnectDecision {
        if reason.is_logout() {
            ReconnectDecision::Stop
        } else {
            ReconnectDecision::Retry { after: self.delay }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logout_stops() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.decide(&DisconnectReason::LoggedOut), ReconnectDecision::Stop);
    }

    #[test]
    fn test_everything_else_retries_after_flat_delay() {
        let policy = ReconnectPolicy::new(Duration::from_millis(1500));
        for reason in [
            DisconnectReason::Network,
            DisconnectReason::ConnectionLost,
            DisconnectReason::Replaced,
            DisconnectReason::Other("restart required".into()),
        ] {
            assert_eq!(
                policy.decide(&reason),
                ReconnectDecision::Retry { after: Duration::from_millis(1500) }
            );
        }
    }
}
