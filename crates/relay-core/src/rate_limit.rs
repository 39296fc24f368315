use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

use crate::domain::UserId;

// ============== Rate Limiter (Sliding Window) ==============

/// Per-user sliding-window admission control.
///
/// Each user owns a queue of admission timestamps. Timestamps older than the
/// window are dropped lazily when that user's window is consulted; rejected
/// attempts are never recorded, so a saturated window always drains.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    windows: HashMap<UserId, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: HashMap::new(),
        }
    }

    pub fn admit_at(&mut self, user_id: UserId, now: Instant) -> bool {
        let window = self.window;
        let timestamps = self.windows.entry(user_id).or_default();
        prune(timestamps, now, window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Time until the oldest admission in the user's window expires.
    ///
    /// `None` when the user would be admitted right now.
    pub fn retry_after_at(&self, user_id: UserId, now: Instant) -> Option<Duration> {
        let timestamps = self.windows.get(&user_id)?;
        let live: Vec<&Instant> = timestamps
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < self.window)
            .collect();
        if live.len() < self.max_requests {
            return None;
        }
        let oldest = live.first()?;
        Some(self.window.saturating_sub(now.saturating_duration_since(**oldest)))
    }

    /// Number of admissions currently counted against the user.
    #[cfg(test)]
    pub fn in_window_at(&self, user_id: UserId, now: Instant) -> usize {
        self.windows
            .get(&user_id)
            .map(|ts| {
                ts.iter()
                    .filter(|t| now.saturating_duration_since(**t) < self.window)
                    .count()
            })
            .unwrap_or(0)
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if now.saturating_duration_since(*oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}
