use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);
const MAX_REQUESTS_PER_WINDOW: usize = 60;

/// Per-token sliding window. Each check prunes entries older than `WINDOW`
/// before testing admission, so the map never grows past one deque entry per
/// request actually made in the trailing minute.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self { windows: Mutex::new(HashMap::new()) }
    }

    pub fn check(&self, token_hash: &str) -> bool {
        let now = Instant::now();
        let mut guard = self.windows.lock();
        let entries = guard.entry(token_hash.to_string()).or_insert_with(VecDeque::new);
        while let Some(&oldest) = entries.front() {
            if now.duration_since(oldest) >= WINDOW {
                entries.pop_front();
            } else {
                break;
            }
        }
        if entries.len() >= MAX_REQUESTS_PER_WINDOW {
            return false;
        }
        entries.push_back(now);
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_window_maximum() {
        let limiter = RateLimiter::new();
        for _ in 0..MAX_REQUESTS_PER_WINDOW {
            assert!(limiter.check("token-a"));
        }
        assert!(!limiter.check("token-a"));
    }

    #[test]
    fn tokens_are_tracked_independently() {
        let limiter = RateLimiter::new();
        for _ in 0..MAX_REQUESTS_PER_WINDOW {
            limiter.check("token-a");
        }
        assert!(!limiter.check("token-a"));
        assert!(limiter.check("token-b"));
    }
}
