//! Core sliding window rate limiter.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::identity::{Caller, IdentitySource};
use super::manager::RecordManager;
use super::record::CounterRecord;
use super::rules::{LimitResolver, LimitRules};
use crate::clock::{Clock, SystemClock};
use crate::config::LimiterSettings;
use crate::error::Result;
use crate::storage::Storage;

/// Default hits allowed per window.
pub const DEFAULT_MAX: u64 = 5;
/// Default window length in seconds.
pub const DEFAULT_WINDOW_SECS: u32 = 60;

/// The result of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Allowed {
        limit: u64,
        remaining: u64,
        /// Seconds until the current window ends
        reset_secs: u32,
    },
    /// The quota is exhausted.
    Denied {
        limit: u64,
        /// Seconds until the current window ends
        retry_after_secs: u32,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    pub fn limit(&self) -> u64 {
        match self {
            Decision::Allowed { limit, .. } | Decision::Denied { limit, .. } => *limit,
        }
    }
}

/// Values a transport renders into rate limit response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct Metadata {
    pub limit: u64,
    pub remaining: Option<u64>,
    pub reset_seconds: Option<u32>,
    pub retry_after_seconds: Option<u32>,
}

/// How a request admitted earlier finished, for [`RateLimiter::settle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Sliding window rate limiter over a pluggable counter store.
///
/// Each identity gets two counters: hits in the current window and hits in
/// the window before it. The admitted rate is the current count plus the
/// previous count weighted by how much of the current window is still
/// ahead. One lock per limiter serializes the read-modify-write against the
/// store; limiters in different processes sharing a store may race.
pub struct RateLimiter {
    manager: RecordManager,
    max: u64,
    window_secs: u32,
    limits: Option<Arc<dyn LimitResolver>>,
    identity: IdentitySource,
    clock: Arc<dyn Clock>,
    headers: bool,
    skip_failed: bool,
    skip_successful: bool,
    lock: Mutex<()>,
}

impl RateLimiter {
    /// Create a limiter with default settings: 5 hits per 60 seconds, keyed
    /// by remote address.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_manager(RecordManager::new(storage))
    }

    fn with_manager(manager: RecordManager) -> Self {
        Self {
            manager,
            max: DEFAULT_MAX,
            window_secs: DEFAULT_WINDOW_SECS,
            limits: None,
            identity: IdentitySource::default(),
            clock: Arc::new(SystemClock),
            headers: true,
            skip_failed: false,
            skip_successful: false,
            lock: Mutex::new(()),
        }
    }

    /// Create a limiter from loaded configuration.
    pub fn from_settings(storage: Arc<dyn Storage>, settings: &LimiterSettings) -> Result<Self> {
        let manager = RecordManager::new(storage)
            .with_redaction(settings.redact_keys)
            .with_timeout(settings.store_timeout_ms.map(Duration::from_millis));

        let mut limiter = Self::with_manager(manager)
            .with_max(settings.max)
            .with_window(Duration::from_secs(settings.window_secs))
            .with_identity(settings.identity.clone().into())
            .with_headers(!settings.disable_headers)
            .skip_failed_requests(settings.skip_failed_requests)
            .skip_successful_requests(settings.skip_successful_requests);

        if let Some(path) = &settings.rules_path {
            limiter = limiter.with_limits(Arc::new(LimitRules::from_file(path)?));
        }
        Ok(limiter)
    }

    pub fn with_max(mut self, max: u64) -> Self {
        if max > 0 {
            self.max = max;
        }
        self
    }

    /// Set the window length. Sub-second windows round up to one second.
    pub fn with_window(mut self, window: Duration) -> Self {
        let secs = u32::try_from(window.as_secs()).unwrap_or(u32::MAX);
        if secs > 0 {
            self.window_secs = secs;
        } else if !window.is_zero() {
            self.window_secs = 1;
        }
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_identity(mut self, identity: IdentitySource) -> Self {
        self.identity = identity;
        self
    }

    /// Resolve limit and window per identity, falling back to the static values.
    pub fn with_limits(mut self, limits: Arc<dyn LimitResolver>) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn with_headers(mut self, enabled: bool) -> Self {
        self.headers = enabled;
        self
    }

    pub fn with_redaction(mut self, redact_keys: bool) -> Self {
        self.manager = self.manager.with_redaction(redact_keys);
        self
    }

    pub fn skip_failed_requests(mut self, skip: bool) -> Self {
        self.skip_failed = skip;
        self
    }

    pub fn skip_successful_requests(mut self, skip: bool) -> Self {
        self.skip_successful = skip;
        self
    }

    pub fn manager(&self) -> &RecordManager {
        &self.manager
    }

    /// Identify `caller` and admit or reject one hit.
    pub async fn check(&self, caller: &Caller) -> Result<Decision> {
        let key = self.identity.extract(caller)?;
        self.check_key(&key).await
    }

    /// Admit or reject one hit for an already resolved identity key.
    pub async fn check_key(&self, key: &str) -> Result<Decision> {
        let (max, window) = self.resolve_limits(key);

        trace!(
            key = %self.manager.display_key(key),
            limit = max,
            window_secs = window,
            "Checking rate limit"
        );

        let (rate, reset_in) = {
            let _guard = self.lock.lock().await;

            let mut record = self.manager.get(key).await?;
            let now = self.clock.now_secs();

            roll_window(&mut record, now, window);
            record.current_hits = record.current_hits.saturating_add(1);

            let reset_in = record.expiry.saturating_sub(now);
            let rate = sliding_rate(&record, reset_in, window);

            // Keep the record one extra window so the next rollover can see it.
            let ttl = Duration::from_secs(u64::from(reset_in) + u64::from(window));
            self.manager.set(key, record, ttl).await?;

            (rate, reset_in)
        };

        if rate > max {
            debug!(
                key = %self.manager.display_key(key),
                rate = rate,
                limit = max,
                "Rate limit exceeded"
            );
            return Ok(Decision::Denied {
                limit: max,
                retry_after_secs: reset_in,
            });
        }

        Ok(Decision::Allowed {
            limit: max,
            remaining: max - rate,
            reset_secs: reset_in,
        })
    }

    /// Undo the hit of an admitted request when its outcome is configured to
    /// be skipped. Returns whether a hit was given back.
    pub async fn settle(&self, key: &str, outcome: Outcome) -> Result<bool> {
        let skip = match outcome {
            Outcome::Success => self.skip_successful,
            Outcome::Failure => self.skip_failed,
        };
        if !skip {
            return Ok(false);
        }

        let (_, window) = self.resolve_limits(key);
        let _guard = self.lock.lock().await;

        let mut record = self.manager.get(key).await?;
        if record.is_new() || record.current_hits == 0 {
            return Ok(false);
        }

        let now = self.clock.now_secs();
        record.current_hits -= 1;
        let ttl = Duration::from_secs(
            u64::from(record.expiry.saturating_sub(now)) + u64::from(window),
        );
        self.manager.set(key, record, ttl).await?;

        trace!(key = %self.manager.display_key(key), outcome = ?outcome, "Hit refunded");
        Ok(true)
    }

    /// Header values for `decision`, or `None` when headers are disabled.
    pub fn metadata(&self, decision: &Decision) -> Option<Metadata> {
        if !self.headers {
            return None;
        }
        Some(match *decision {
            Decision::Allowed {
                limit,
                remaining,
                reset_secs,
            } => Metadata {
                limit,
                remaining: Some(remaining),
                reset_seconds: Some(reset_secs),
                retry_after_seconds: None,
            },
            Decision::Denied {
                limit,
                retry_after_secs,
            } => Metadata {
                limit,
                remaining: None,
                reset_seconds: None,
                retry_after_seconds: Some(retry_after_secs),
            },
        })
    }

    /// The limit and window (seconds) that apply to `key`.
    pub fn resolve_limits(&self, key: &str) -> (u64, u32) {
        let mut max = self.max;
        let mut window = self.window_secs;

        if let Some(limits) = &self.limits {
            let dynamic_max = limits.max(key);
            if dynamic_max > 0 {
                max = dynamic_max as u64;
            }
            let dynamic_window = limits.window_secs(key);
            if dynamic_window > 0 {
                window = u32::try_from(dynamic_window).unwrap_or(u32::MAX);
            }
        }
        (max, window)
    }

    /// Read the stored counters for `key` without counting a hit.
    pub async fn snapshot(&self, key: &str) -> Result<CounterRecord> {
        let _guard = self.lock.lock().await;
        let record = self.manager.get(key).await?;
        Ok(*record)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max", &self.max)
            .field("window_secs", &self.window_secs)
            .field("identity", &self.identity)
            .field("headers", &self.headers)
            .field("manager", &self.manager)
            .finish()
    }
}

/// Start a window for a new record, or roll an elapsed one forward.
fn roll_window(record: &mut CounterRecord, now: u32, window: u32) {
    if record.is_new() {
        record.expiry = now.saturating_add(window);
        return;
    }
    if now < record.expiry {
        return;
    }

    record.previous_hits = record.current_hits;
    record.current_hits = 0;

    let elapsed = now - record.expiry;
    if elapsed >= window {
        // Idle for a whole window: nothing was admitted in the window before now.
        record.previous_hits = 0;
        record.expiry = now.saturating_add(window);
    } else {
        // Stay aligned to the original window boundaries.
        record.expiry = now.saturating_add(window - elapsed);
    }
}

/// Current hits plus previous hits weighted by the share of the window left.
fn sliding_rate(record: &CounterRecord, reset_in: u32, window: u32) -> u64 {
    let weight = (f64::from(reset_in) / f64::from(window)).clamp(0.0, 1.0);
    let weighted_previous = (record.previous_hits as f64 * weight) as u64;
    weighted_previous.saturating_add(record.current_hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::identity::REDACTED;
    use crate::ratelimit::rules::FnLimits;
    use crate::storage::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use futures::future::join_all;
    use tokio_test::assert_err;

    const T0: u32 = 1_700_000_000;

    fn test_limiter(max: u64, window_secs: u64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let store = MemoryStore::with_clock(Duration::from_secs(3600), clock.clone());
        let limiter = RateLimiter::new(Arc::new(store))
            .with_max(max)
            .with_window(Duration::from_secs(window_secs))
            .with_clock(clock.clone());
        (limiter, clock)
    }

    fn remaining(decision: &Decision) -> u64 {
        match decision {
            Decision::Allowed { remaining, .. } => *remaining,
            Decision::Denied { .. } => panic!("expected allowed, got {:?}", decision),
        }
    }

    #[tokio::test]
    async fn test_defaults() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
        assert_eq!(limiter.resolve_limits("any"), (DEFAULT_MAX, DEFAULT_WINDOW_SECS));
    }

    #[tokio::test]
    async fn test_remaining_decreases_by_one() {
        let (limiter, _clock) = test_limiter(5, 60);

        for expected in (0..5).rev() {
            let decision = limiter.check_key("client").await.unwrap();
            assert_eq!(remaining(&decision), expected);
        }
    }

    #[tokio::test]
    async fn test_over_limit_is_denied_with_retry_after() {
        let (limiter, clock) = test_limiter(5, 60);

        for _ in 0..5 {
            assert!(limiter.check_key("client").await.unwrap().is_allowed());
        }

        clock.advance(10);
        let decision = limiter.check_key("client").await.unwrap();
        assert_eq!(
            decision,
            Decision::Denied {
                limit: 5,
                retry_after_secs: 50,
            }
        );
    }

    #[tokio::test]
    async fn test_two_hits_per_two_seconds() {
        let (limiter, clock) = test_limiter(2, 2);

        assert_eq!(remaining(&limiter.check_key("a").await.unwrap()), 1);
        assert_eq!(remaining(&limiter.check_key("a").await.unwrap()), 0);
        assert_eq!(
            limiter.check_key("a").await.unwrap(),
            Decision::Denied {
                limit: 2,
                retry_after_secs: 2,
            }
        );

        // Right at the boundary the previous window still weighs fully.
        clock.advance(2);
        assert!(!limiter.check_key("a").await.unwrap().is_allowed());

        // Halfway through: floor(3 * 0.5) plus two hits in this window.
        clock.advance(1);
        let decision = limiter.check_key("a").await.unwrap();
        assert_eq!(
            decision,
            Decision::Denied {
                limit: 2,
                retry_after_secs: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_weighted_blend_after_rollover() {
        let (limiter, clock) = test_limiter(2, 2);

        limiter.check_key("a").await.unwrap();
        limiter.check_key("a").await.unwrap();
        assert!(!limiter.check_key("a").await.unwrap().is_allowed());

        // Halfway into the next window: floor(3 * 0.5) + 1 = 2.
        clock.advance(3);
        let decision = limiter.check_key("a").await.unwrap();
        assert_eq!(
            decision,
            Decision::Allowed {
                limit: 2,
                remaining: 0,
                reset_secs: 1,
            }
        );

        let record = limiter.snapshot("a").await.unwrap();
        assert_eq!(record.previous_hits, 3);
        assert_eq!(record.current_hits, 1);
        assert_eq!(record.expiry, T0 + 4);
    }

    #[tokio::test]
    async fn test_previous_hits_carry_into_next_window() {
        let (limiter, clock) = test_limiter(2, 2);

        limiter.check_key("a").await.unwrap();
        limiter.check_key("a").await.unwrap();

        clock.advance(3);
        assert!(limiter.check_key("a").await.unwrap().is_allowed());

        let record = limiter.snapshot("a").await.unwrap();
        assert_eq!(record.previous_hits, 2);
        assert_eq!(record.current_hits, 1);
    }

    #[tokio::test]
    async fn test_idle_longer_than_window_starts_clean() {
        let (limiter, clock) = test_limiter(2, 2);

        for _ in 0..3 {
            limiter.check_key("a").await.unwrap();
        }

        clock.advance(10);
        let decision = limiter.check_key("a").await.unwrap();
        assert_eq!(
            decision,
            Decision::Allowed {
                limit: 2,
                remaining: 1,
                reset_secs: 2,
            }
        );
        let record = limiter.snapshot("a").await.unwrap();
        assert_eq!(record.previous_hits, 0);
        assert_eq!(record.expiry, T0 + 12);
    }

    #[tokio::test]
    async fn test_rollover_keeps_window_alignment() {
        let (limiter, clock) = test_limiter(10, 10);

        for _ in 0..5 {
            limiter.check_key("a").await.unwrap();
        }
        // Window ends at T0 + 10; arrive 3 seconds late.
        clock.advance(13);
        let decision = limiter.check_key("a").await.unwrap();
        // floor(5 * 0.7) + 1 = 4
        assert_eq!(
            decision,
            Decision::Allowed {
                limit: 10,
                remaining: 6,
                reset_secs: 7,
            }
        );
        assert_eq!(limiter.snapshot("a").await.unwrap().expiry, T0 + 20);
    }

    #[tokio::test]
    async fn test_identities_do_not_share_quota() {
        let (limiter, _clock) = test_limiter(2, 60);

        limiter.check_key("A").await.unwrap();
        limiter.check_key("A").await.unwrap();
        assert!(!limiter.check_key("A").await.unwrap().is_allowed());

        assert_eq!(remaining(&limiter.check_key("B").await.unwrap()), 1);
        assert_eq!(limiter.snapshot("B").await.unwrap().current_hits, 1);
    }

    #[tokio::test]
    async fn test_check_extracts_identity() {
        let (limiter, _clock) = test_limiter(1, 60);
        let caller = Caller::from_addr("192.0.2.1".parse().unwrap());

        assert!(limiter.check(&caller).await.unwrap().is_allowed());
        assert!(!limiter.check(&caller).await.unwrap().is_allowed());
        assert_eq!(limiter.snapshot("192.0.2.1").await.unwrap().current_hits, 2);
    }

    #[tokio::test]
    async fn test_identity_failure_is_not_a_decision() {
        let (limiter, _clock) = test_limiter(1, 60);
        let limiter = limiter.with_identity(IdentitySource::Header("x-api-key".to_string()));

        let err = assert_err!(limiter.check(&Caller::new()).await);
        assert!(err.is_identity());
    }

    #[tokio::test]
    async fn test_dynamic_limits_fall_back_to_defaults() {
        let (limiter, _clock) = test_limiter(2, 60);
        let limits = FnLimits::new()
            .max(|key| if key == "vip" { 4 } else { 0 })
            .window_secs(|key| if key == "vip" { 10 } else { -5 });
        let limiter = limiter.with_limits(Arc::new(limits));

        assert_eq!(limiter.resolve_limits("vip"), (4, 10));
        assert_eq!(limiter.resolve_limits("guest"), (2, 60));

        let decision = limiter.check_key("vip").await.unwrap();
        assert_eq!(
            decision,
            Decision::Allowed {
                limit: 4,
                remaining: 3,
                reset_secs: 10,
            }
        );
    }

    #[tokio::test]
    async fn test_metadata() {
        let (limiter, _clock) = test_limiter(1, 30);

        let allowed = limiter.check_key("a").await.unwrap();
        assert_eq!(
            limiter.metadata(&allowed),
            Some(Metadata {
                limit: 1,
                remaining: Some(0),
                reset_seconds: Some(30),
                retry_after_seconds: None,
            })
        );

        let denied = limiter.check_key("a").await.unwrap();
        assert_eq!(
            limiter.metadata(&denied),
            Some(Metadata {
                limit: 1,
                remaining: None,
                reset_seconds: None,
                retry_after_seconds: Some(30),
            })
        );

        let limiter = limiter.with_headers(false);
        assert_eq!(limiter.metadata(&denied), None);
    }

    #[tokio::test]
    async fn test_settle_refunds_only_configured_outcomes() {
        let (limiter, _clock) = test_limiter(2, 60);
        let limiter = limiter.skip_failed_requests(true);

        limiter.check_key("a").await.unwrap();
        limiter.check_key("a").await.unwrap();

        assert!(!limiter.settle("a", Outcome::Success).await.unwrap());
        assert_eq!(limiter.snapshot("a").await.unwrap().current_hits, 2);

        assert!(limiter.settle("a", Outcome::Failure).await.unwrap());
        assert_eq!(limiter.snapshot("a").await.unwrap().current_hits, 1);

        assert_eq!(remaining(&limiter.check_key("a").await.unwrap()), 0);
    }

    #[tokio::test]
    async fn test_settle_unknown_key_is_noop() {
        let (limiter, _clock) = test_limiter(2, 60);
        let limiter = limiter.skip_successful_requests(true);

        assert!(!limiter.settle("nobody", Outcome::Success).await.unwrap());
        assert!(limiter.snapshot("nobody").await.unwrap().is_new());
    }

    #[tokio::test]
    async fn test_record_ttl_spans_an_extra_window() {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(MemoryStore::with_clock(Duration::from_secs(3600), clock.clone()));
        let limiter = RateLimiter::new(store.clone())
            .with_max(5)
            .with_window(Duration::from_secs(10))
            .with_clock(clock.clone());

        limiter.check_key("a").await.unwrap();

        // Window ends at T0 + 10, record lives until T0 + 20.
        clock.set(T0 + 19);
        assert!(store.get("a").await.unwrap().is_some());
        clock.set(T0 + 20);
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_checks_never_exceed_limit() {
        let (limiter, _clock) = test_limiter(10, 60);

        let results = join_all((0..25).map(|_| limiter.check_key("burst"))).await;
        let allowed = results
            .iter()
            .filter(|r| r.as_ref().unwrap().is_allowed())
            .count();

        assert_eq!(allowed, 10);
        assert_eq!(limiter.snapshot("burst").await.unwrap().current_hits, 25);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_tasks_never_exceed_limit() {
        let (limiter, _clock) = test_limiter(50, 60);
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.check_key("shared").await.unwrap().is_allowed() })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 50);
    }

    /// Answers reads but never finishes a write.
    struct StuckWrites;

    #[async_trait]
    impl Storage for StuckWrites {
        async fn get(&self, _key: &str) -> std::result::Result<Option<Vec<u8>>, StoreError> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> std::result::Result<(), StoreError> {
            std::future::pending().await
        }
    }

    /// Fails every operation.
    struct Unavailable;

    #[async_trait]
    impl Storage for Unavailable {
        async fn get(&self, _key: &str) -> std::result::Result<Option<Vec<u8>>, StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> std::result::Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_cancelled_check_releases_lock_and_record() {
        let limiter = RateLimiter::new(Arc::new(StuckWrites));

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), limiter.check_key("a")).await;
        assert!(cancelled.is_err());

        assert!(limiter.lock.try_lock().is_ok());
        assert_eq!(limiter.manager().pool().idle(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let limiter = RateLimiter::new(Arc::new(Unavailable)).with_redaction(true);

        let err = assert_err!(limiter.check_key("10.0.0.1").await);
        assert!(err.is_unavailable());
        assert!(!err.to_string().contains("10.0.0.1"));
        assert!(!err.is_identity());
    }

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_redaction_covers_store_log_events() {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (limiter, _clock) = test_limiter(5, 60);
        let limiter = limiter.with_redaction(true);
        limiter.check_key("203.0.113.77").await.unwrap();
        limiter.check_key("203.0.113.77").await.unwrap();

        let output = String::from_utf8(buffer.0.lock().clone()).unwrap();
        assert!(output.contains("Memory store miss"));
        assert!(output.contains(REDACTED));
        assert!(!output.contains("203.0.113.77"));
    }

    #[test]
    fn test_sliding_rate_weights_previous_window() {
        let record = CounterRecord {
            current_hits: 1,
            previous_hits: 10,
            expiry: 0,
        };
        assert_eq!(sliding_rate(&record, 60, 60), 11);
        assert_eq!(sliding_rate(&record, 30, 60), 6);
        assert_eq!(sliding_rate(&record, 0, 60), 1);
        // Clamped when the window shrank below the stored expiry.
        assert_eq!(sliding_rate(&record, 120, 60), 11);
    }
}
