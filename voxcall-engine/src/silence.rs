//! Silence timeout policy
//!
//! A restartable deadline timer for the user's turn. Arming starts a full
//! interval; any speech activity restarts the full interval (never a
//! remainder); firing disarms until the next arm, so one arm produces at
//! most one timeout.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct SilenceTimeoutPolicy {
    interval: Duration,
    deadline: Option<Instant>,
}

impl SilenceTimeoutPolicy {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Start a full interval from now
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.interval);
    }

    /// Postpone by a full interval; no-op when disarmed
    pub fn reset(&mut self) {
        if self.deadline.is_some() {
            self.deadline = Some(Instant::now() + self.interval);
        }
    }

    /// Disarm without firing
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Mark the pending deadline as consumed
    pub fn fire(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, Duration};

    #[tokio::test(start_paused = true)]
    async fn test_arm_sets_full_interval() {
        let mut policy = SilenceTimeoutPolicy::new(Duration::from_secs(5));
        assert!(!policy.is_armed());

        policy.arm();
        let deadline = policy.deadline().unwrap();
        assert_eq!(deadline - Instant::now(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_postpones_full_interval() {
        let mut policy = SilenceTimeoutPolicy::new(Duration::from_secs(5));
        policy.arm();

        advance(Duration::from_secs(3)).await;
        policy.reset();

        // 3s in, the deadline is again a full 5s away
        let deadline = policy.deadline().unwrap();
        assert_eq!(deadline - Instant::now(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_when_disarmed_is_noop() {
        let mut policy = SilenceTimeoutPolicy::new(Duration::from_secs(5));
        policy.reset();
        assert!(!policy.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_disarms_until_rearmed() {
        let mut policy = SilenceTimeoutPolicy::new(Duration::from_secs(5));
        policy.arm();
        policy.fire();
        assert!(!policy.is_armed());

        policy.arm();
        assert!(policy.is_armed());
    }
}
