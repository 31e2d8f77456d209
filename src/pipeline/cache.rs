//! Content-addressed guardrail result cache.
//!
//! [`CachingRuntime`] wraps a [`GuardrailsRuntime`] and memoizes
//! input-phase verdicts.  The key is
//! `SHA-256(SHA-256(content) ‖ sorted enabled checkpoint names)` so that
//! a configuration change naturally invalidates prior entries.  Caching
//! applies only to the input phase — output content is model-derived and
//! rarely repeats.
//!
//! Entries expire after a TTL.  When the cache reaches capacity, the
//! oldest decile (by insertion timestamp) is evicted in one sweep.
//! Readers may observe spurious misses while an eviction sweep races a
//! lookup; correctness is unaffected.

use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::checkpoint::{CheckContext, GuardrailReport};
use super::runtime::{GuardrailsRuntime, Phase};

// ── CachingRuntime ─────────────────────────────────────────────────────

struct CacheEntry {
    report: GuardrailReport,
    inserted_at: Instant,
}

/// A [`GuardrailsRuntime`] with a TTL-bounded input-phase result cache.
pub struct CachingRuntime {
    inner: GuardrailsRuntime,
    ttl: Duration,
    max_entries: usize,
    cache: Mutex<FxHashMap<[u8; 32], CacheEntry>>,
}

impl CachingRuntime {
    /// Wrap a runtime with the given TTL and capacity.
    #[must_use]
    pub fn new(inner: GuardrailsRuntime, ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner,
            ttl,
            max_entries: max_entries.max(1),
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<[u8; 32], CacheEntry>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache_key(&self, content: &str) -> [u8; 32] {
        let content_hash = Sha256::digest(content.as_bytes());

        let mut names = self.inner.enabled_checkpoint_names(Phase::Input);
        names.sort();

        let mut hasher = Sha256::new();
        hasher.update(content_hash);
        for name in &names {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
        }
        hasher.finalize().into()
    }

    /// Run the input phase, consulting the cache first.
    pub async fn check_input(&self, content: &str, ctx: &CheckContext) -> GuardrailReport {
        let key = self.cache_key(content);

        {
            let cache = self.lock();
            if let Some(entry) = cache.get(&key)
                && entry.inserted_at.elapsed() < self.ttl
            {
                tracing::debug!("guardrail cache hit");
                return entry.report.clone();
            }
        }

        let report = self.inner.check_input(content, ctx).await;

        let mut cache = self.lock();
        cache.remove(&key);
        if cache.len() >= self.max_entries {
            Self::evict_oldest_decile(&mut cache);
        }
        cache.insert(
            key,
            CacheEntry {
                report: report.clone(),
                inserted_at: Instant::now(),
            },
        );

        report
    }

    /// Run the output phase.  Never cached.
    pub async fn check_output(&self, content: &str, ctx: &CheckContext) -> GuardrailReport {
        self.inner.check_output(content, ctx).await
    }

    /// Evict the oldest tenth of the cache (at least one entry).
    fn evict_oldest_decile(cache: &mut FxHashMap<[u8; 32], CacheEntry>) {
        let evict_count = (cache.len() / 10).max(1);
        let mut by_age: Vec<([u8; 32], Instant)> = cache
            .iter()
            .map(|(k, v)| (*k, v.inserted_at))
            .collect();
        by_age.sort_by_key(|(_, inserted_at)| *inserted_at);
        for (key, _) in by_age.into_iter().take(evict_count) {
            cache.remove(&key);
        }
    }

    /// Drop every cached entry.
    pub fn clear_cache(&self) {
        self.lock().clear();
    }

    /// Current number of cached entries (expired entries included until
    /// they are replaced or evicted).
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.lock().len()
    }

    /// Access to the wrapped runtime.
    #[must_use]
    pub fn inner(&self) -> &GuardrailsRuntime {
        &self.inner
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::checkpoint::{FnCheckpoint, Position};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_runtime(counter: Arc<AtomicUsize>) -> GuardrailsRuntime {
        let cp = FnCheckpoint::new("counter", Position::Input, move |content, _| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(GuardrailReport::allow("counter", &content))
            }
        });
        GuardrailsRuntime::builder().add_checkpoint(cp).build()
    }

    #[tokio::test]
    async fn identical_content_served_from_cache() {
        let counter = Arc::new(AtomicUsize::new(0));
        let runtime = CachingRuntime::new(
            counting_runtime(Arc::clone(&counter)),
            Duration::from_secs(300),
            100,
        );
        let ctx = CheckContext::default();

        let first = runtime.check_input("hello", &ctx).await;
        let second = runtime.check_input("hello", &ctx).await;

        assert!(first.passed && second.passed);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_content_misses() {
        let counter = Arc::new(AtomicUsize::new(0));
        let runtime = CachingRuntime::new(
            counting_runtime(Arc::clone(&counter)),
            Duration::from_secs(300),
            100,
        );
        let ctx = CheckContext::default();

        runtime.check_input("one", &ctx).await;
        runtime.check_input("two", &ctx).await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(runtime.cache_len(), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_recomputed() {
        let counter = Arc::new(AtomicUsize::new(0));
        let runtime = CachingRuntime::new(
            counting_runtime(Arc::clone(&counter)),
            Duration::from_millis(0),
            100,
        );
        let ctx = CheckContext::default();

        runtime.check_input("hello", &ctx).await;
        runtime.check_input("hello", &ctx).await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_decile() {
        let counter = Arc::new(AtomicUsize::new(0));
        let runtime = CachingRuntime::new(
            counting_runtime(counter),
            Duration::from_secs(300),
            20,
        );
        let ctx = CheckContext::default();

        for i in 0..25 {
            runtime.check_input(&format!("content-{i}"), &ctx).await;
        }

        // Capacity is 20; each insert beyond it evicts ceil(len/10) >= 1.
        assert!(runtime.cache_len() <= 20);
    }

    #[tokio::test]
    async fn clear_cache_forces_recompute() {
        let counter = Arc::new(AtomicUsize::new(0));
        let runtime = CachingRuntime::new(
            counting_runtime(Arc::clone(&counter)),
            Duration::from_secs(300),
            100,
        );
        let ctx = CheckContext::default();

        runtime.check_input("hello", &ctx).await;
        runtime.clear_cache();
        runtime.check_input("hello", &ctx).await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
