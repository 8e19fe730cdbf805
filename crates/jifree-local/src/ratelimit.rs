use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default per-user cooldown between accepted requests.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

/// Map size at which the first sweep of expired keys runs.
const SWEEP_MIN: usize = 1024;

/// In-memory, per-key cooldown limiter.
///
/// A key is allowed when it has no unexpired entry; allowing records `now + ttl`.
/// Rejected calls do not extend the window. Check and update happen under one lock,
/// so two concurrent calls for the same key cannot both be allowed.
///
/// Expired keys are swept whenever the map reaches twice the size it had after the
/// previous sweep (at least [`SWEEP_MIN`]), so it stays within `max(SWEEP_MIN, 2 * live)`.
#[derive(Debug)]
pub struct Limiter {
    ttl: Duration,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    expires: HashMap<String, Instant>,
    next_sweep: usize,
}

impl State {
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.expires.len();
        self.expires.retain(|_, at| now < *at);
        self.next_sweep = SWEEP_MIN.max(self.expires.len() * 2);
        before - self.expires.len()
    }
}

impl Limiter {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(State {
                expires: HashMap::new(),
                next_sweep: SWEEP_MIN,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(at) = state.expires.get(key) {
            if now < *at {
                return false;
            }
        }
        state.expires.insert(key.to_string(), now + self.ttl);
        if state.expires.len() >= state.next_sweep {
            let removed = state.sweep(now);
            tracing::debug!(removed, kept = state.expires.len(), "rate limiter sweep");
        }
        true
    }

    /// Drop entries whose window has passed. Returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sweep(now)
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .expires
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `JIFREE_RATE_LIMIT_TTL_S`, or [`DEFAULT_TTL`] when unset or unparsable.
pub fn ttl_from_env() -> Duration {
    std::env::var("JIFREE_RATE_LIMIT_TTL_S")
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TTL)
}

impl Default for Limiter {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn second_call_inside_window_is_rejected() {
        let l = Limiter::new(Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(l.allow_at("u1", t0));
        assert!(!l.allow_at("u1", t0 + Duration::from_secs(9)));
        assert!(l.allow_at("u1", t0 + Duration::from_secs(10)));
    }

    #[test]
    fn rejection_does_not_extend_window() {
        let l = Limiter::new(Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(l.allow_at("u1", t0));
        assert!(!l.allow_at("u1", t0 + Duration::from_secs(5)));
        assert!(l.allow_at("u1", t0 + Duration::from_secs(11)));
    }

    #[test]
    fn keys_are_independent() {
        let l = Limiter::new(Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(l.allow_at("u1", t0));
        assert!(l.allow_at("u2", t0));
        assert!(!l.allow_at("u1", t0));
    }

    #[test]
    fn purge_drops_only_expired_keys() {
        let l = Limiter::new(Duration::from_secs(10));
        let t0 = Instant::now();
        l.allow_at("old", t0);
        l.allow_at("new", t0 + Duration::from_secs(8));
        assert_eq!(l.purge_expired(t0 + Duration::from_secs(12)), 1);
        assert_eq!(l.len(), 1);
        assert!(!l.allow_at("new", t0 + Duration::from_secs(12)));
    }

    #[test]
    fn expired_keys_are_swept_without_explicit_purge() {
        let l = Limiter::new(Duration::from_millis(1));
        let t0 = Instant::now();
        for i in 0..10_000 {
            assert!(l.allow_at(&format!("early-{i}"), t0));
        }
        let later = t0 + Duration::from_secs(60);
        for i in 0..10_000 {
            assert!(l.allow_at(&format!("late-{i}"), later));
        }
        assert!(l.len() <= 10_000, "len={}", l.len());
    }

    #[test]
    fn churn_of_distinct_keys_stays_bounded() {
        let l = Limiter::new(Duration::from_secs(1));
        let t0 = Instant::now();
        for round in 0..100u64 {
            let now = t0 + Duration::from_secs(round * 2);
            for i in 0..1_000 {
                assert!(l.allow_at(&format!("r{round}-u{i}"), now));
            }
            assert!(l.len() <= 2 * SWEEP_MIN, "round={round} len={}", l.len());
        }
    }

    #[test]
    fn sweep_keeps_live_windows() {
        let l = Limiter::new(Duration::from_secs(60));
        let t0 = Instant::now();
        for i in 0..(SWEEP_MIN * 3) {
            assert!(l.allow_at(&format!("u{i}"), t0));
        }
        assert_eq!(l.len(), SWEEP_MIN * 3);
        assert!(!l.allow_at("u0", t0 + Duration::from_secs(1)));
    }

    #[test]
    fn concurrent_callers_get_exactly_one_admission() {
        let l = Arc::new(Limiter::new(Duration::from_secs(60)));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let l = Arc::clone(&l);
                std::thread::spawn(move || l.allow("shared"))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }
}
