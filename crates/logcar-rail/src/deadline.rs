//! Per-request deadlines for search operations

use std::time::{Duration, Instant};

use crate::error::{RailError, Result};

/// Absolute point in time after which a request must give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    /// Creates a deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            expires_at: Instant::now() + timeout,
        }
    }

    /// Remaining time, `None` once expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at.checked_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.remaining().is_none()
    }

    /// Fails with [`RailError::Timeout`] once expired.
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            Err(RailError::Timeout)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_deadline_has_time_remaining() {
        let deadline = Deadline::after(Duration::from_secs(5));
        assert!(!deadline.is_expired());
        assert!(deadline.remaining().unwrap() > Duration::from_secs(4));
        assert!(deadline.check().is_ok());
    }

    #[test]
    fn zero_timeout_expires_immediately() {
        let deadline = Deadline::after(Duration::from_millis(0));
        assert!(deadline.is_expired());
        assert!(matches!(deadline.check(), Err(RailError::Timeout)));
    }

    #[tokio::test]
    async fn remaining_shrinks_over_time() {
        let deadline = Deadline::after(Duration::from_millis(200));
        let first = deadline.remaining().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = deadline.remaining().unwrap();
        assert!(second < first);
    }
}
