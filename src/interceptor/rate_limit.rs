//! Fixed-window rate limiting keyed by session.
//!
//! Each admission drops timestamps older than the window, then admits
//! the call only if the remaining count is below the limit.  Idle
//! sessions are evicted least-recently-seen-first once the session map
//! reaches its cap, so the map never grows without bound.

use rustc_hash::FxHashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Default cap on tracked sessions before LRU eviction kicks in.
const DEFAULT_MAX_SESSIONS: usize = 10_000;

#[derive(Debug)]
struct SessionWindow {
    timestamps: Vec<Instant>,
    last_seen: Instant,
}

/// Per-session fixed-window counter.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    max_sessions: usize,
    sessions: Mutex<FxHashMap<String, SessionWindow>>,
}

impl RateLimiter {
    /// Create a limiter admitting `limit` calls per `window` per
    /// session.
    #[must_use]
    pub fn new(limit: usize, window: Duration) -> Self {
        Self::with_session_cap(limit, window, DEFAULT_MAX_SESSIONS)
    }

    /// Create a limiter with an explicit session cap.
    #[must_use]
    pub fn with_session_cap(limit: usize, window: Duration, max_sessions: usize) -> Self {
        Self {
            limit,
            window,
            max_sessions: max_sessions.max(1),
            sessions: Mutex::new(FxHashMap::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<String, SessionWindow>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to admit one call for `session_id`.
    ///
    /// Expired timestamps are dropped as part of the admission decision;
    /// an admitted call records its own timestamp.
    #[must_use]
    pub fn try_admit(&self, session_id: &str) -> bool {
        let now = Instant::now();
        let mut sessions = self.lock();

        if !sessions.contains_key(session_id) && sessions.len() >= self.max_sessions {
            Self::evict_least_recent(&mut sessions);
        }

        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionWindow {
                timestamps: Vec::new(),
                last_seen: now,
            });
        entry.last_seen = now;

        let window = self.window;
        entry
            .timestamps
            .retain(|ts| now.duration_since(*ts) < window);

        if entry.timestamps.len() >= self.limit {
            return false;
        }

        entry.timestamps.push(now);
        true
    }

    fn evict_least_recent(sessions: &mut FxHashMap<String, SessionWindow>) {
        if let Some(oldest) = sessions
            .iter()
            .min_by_key(|(_, w)| w.last_seen)
            .map(|(k, _)| k.clone())
        {
            sessions.remove(&oldest);
        }
    }

    /// Number of sessions currently tracked.
    #[must_use]
    pub fn tracked_sessions(&self) -> usize {
        self.lock().len()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
