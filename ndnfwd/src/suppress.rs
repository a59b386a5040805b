use std::time::{Duration, Instant};

use crate::config::SuppressConfig;

/// Exponential backoff applied to repeated upstream forwarding of one
/// PIT entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuppressPolicy {
    pub min: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl Default for SuppressPolicy {
    fn default() -> Self {
        Self::from(&SuppressConfig::default())
    }
}

impl From<&SuppressConfig> for SuppressPolicy {
    fn from(config: &SuppressConfig) -> Self {
        Self {
            min: Duration::from_millis(config.min_ms),
            multiplier: config.multiplier,
            max: Duration::from_millis(config.max_ms),
        }
    }
}

impl SuppressPolicy {
    /// Suppression interval after `retransmits` re-forwards
    pub fn interval(&self, retransmits: u32) -> Duration {
        let max = self.max.as_nanos() as f64;
        let exponent = i32::try_from(retransmits).unwrap_or(i32::MAX);
        let nanos = (self.min.as_nanos() as f64 * self.multiplier.powi(exponent)).min(max);
        Duration::from_nanos(nanos.round() as u64)
    }
}

/// Suppression state of one upstream record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuppressState {
    pub last_tx: Option<Instant>,
    pub retransmits: u32,
}

impl SuppressState {
    pub fn should_forward(&self, policy: &SuppressPolicy, now: Instant) -> bool {
        match self.last_tx {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= policy.interval(self.retransmits),
        }
    }

    pub fn record_tx(&mut self, now: Instant) {
        if self.last_tx.is_some() {
            self.retransmits = self.retransmits.saturating_add(1);
        }
        self.last_tx = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_growth() {
        let policy = SuppressPolicy::default();
        let intervals: Vec<u64> = (0..6).map(|n| policy.interval(n).as_millis() as u64).collect();
        assert_eq!(intervals, vec![10, 20, 40, 80, 100, 100]);
        assert_eq!(policy.interval(u32::MAX), Duration::from_millis(100));
    }

    #[test]
    fn test_forward_schedule() {
        let policy = SuppressPolicy::default();
        let t0 = Instant::now();
        let mut state = SuppressState::default();
        let mut forwarded = Vec::new();

        for ms in 0..400 {
            let now = t0 + Duration::from_millis(ms);
            if state.should_forward(&policy, now) {
                state.record_tx(now);
                forwarded.push(ms);
            }
        }

        assert_eq!(forwarded, vec![0, 10, 30, 70, 150, 250, 350]);
        assert_eq!(state.retransmits, 6);
    }

    #[test]
    fn test_flat_policy() {
        let policy = SuppressPolicy {
            min: Duration::from_millis(5),
            multiplier: 1.0,
            max: Duration::from_millis(5),
        };
        assert_eq!(policy.interval(0), policy.interval(7));
    }
}
