use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use sitevault_core::constants::RATE_LIMIT_VIOLATION_THRESHOLD;
use sitevault_core::{OperationType, RateLimitConfig};

/// Per-key window state. `blocked == true` implies `block_until` is set; once
/// it passes, the next check resumes with a fresh window and zero violations.
#[derive(Clone)]
struct RateLimitRecord {
    count: u32,
    reset_at: Instant,
    blocked: bool,
    block_until: Option<Instant>,
    violation_count: u32,
}

impl RateLimitRecord {
    fn new(window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: Instant::now() + window,
            blocked: false,
            block_until: None,
            violation_count: 0,
        }
    }

    /// Clear an expired block, resetting violations and the window.
    fn refresh_block(&mut self, now: Instant, window: Duration) {
        if self.blocked {
            match self.block_until {
                Some(until) if now >= until => {
                    self.blocked = false;
                    self.block_until = None;
                    self.violation_count = 0;
                    self.count = 0;
                    self.reset_at = now + window;
                }
                _ => {}
            }
        }
    }

    /// Reset the window if it expired. Independent of the blocked state.
    fn refresh_window(&mut self, now: Instant, window: Duration) {
        if now >= self.reset_at {
            self.count = 0;
            self.reset_at = now + window;
        }
    }

    fn block_remaining(&self, now: Instant) -> Option<Duration> {
        match (self.blocked, self.block_until) {
            (true, Some(until)) if until > now => Some(until - now),
            _ => None,
        }
    }
}

/// Outcome of a rate-limit check. `allowed == false` is a decision, not an
/// error; `retry_after` is set on every rejection.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_in: Duration,
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    /// Render the HTTP rate-limit header contract for this decision:
    /// `X-RateLimit-Limit`, `X-RateLimit-Remaining`, `X-RateLimit-Reset`
    /// (epoch seconds), plus `Retry-After` on rejection. The web layer
    /// attaches these to its response.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let reset_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            + self.reset_in.as_secs();

        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", reset_epoch.to_string()),
        ];

        if !self.allowed {
            let retry_secs = self
                .retry_after
                .unwrap_or(self.reset_in)
                .as_secs()
                .max(1);
            headers.push(("Retry-After", retry_secs.to_string()));
        }

        headers
    }
}

/// Administrative view of one key's state.
#[derive(Debug, Clone)]
pub struct KeyStatus {
    pub count: u32,
    pub violation_count: u32,
    pub blocked: bool,
    pub block_remaining: Option<Duration>,
}

/// Sharded in-memory rate limiter.
///
/// Keys are hashed across shards, each a HashMap behind its own mutex, so
/// concurrent checks for different keys rarely contend and the sweep never
/// holds a global lock. Per-key updates are atomic with respect to concurrent
/// callers sharing the key.
#[derive(Clone)]
pub struct RateLimiter {
    shards: Vec<Arc<Mutex<HashMap<String, RateLimitRecord>>>>,
    shard_count: usize,
    max_records_per_shard: usize,
}

impl RateLimiter {
    /// Create a rate limiter with the default shard count (16 shards).
    pub fn new() -> Self {
        Self::with_shards(16)
    }

    /// Create a rate limiter with a custom shard count (a power of 2 gives the
    /// best distribution).
    pub fn with_shards(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Arc::new(Mutex::new(HashMap::new())))
            .collect();
        Self {
            shards,
            shard_count: shard_count.max(1),
            max_records_per_shard: 10_000,
        }
    }

    fn shard_for(&self, key: &str) -> &Arc<Mutex<HashMap<String, RateLimitRecord>>> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shard_count]
    }

    fn key(operation: OperationType, identifier: &str) -> String {
        format!("{}:{}", operation.as_str(), identifier)
    }

    /// Check and count one request for `(operation, identifier)`.
    ///
    /// A successful check increments the window counter as a side effect. A
    /// rejected check records a violation; crossing the violation threshold
    /// blocks the key for the configured block duration, during which every
    /// check is rejected regardless of window state.
    pub async fn check(
        &self,
        operation: OperationType,
        identifier: &str,
        config: Option<&RateLimitConfig>,
    ) -> RateLimitDecision {
        let defaults;
        let config = match config {
            Some(c) => c,
            None => {
                defaults = RateLimitConfig::for_operation(operation);
                &defaults
            }
        };

        let key = Self::key(operation, identifier);
        let shard = self.shard_for(&key);
        let mut records = shard.lock().await;

        if records.len() >= self.max_records_per_shard {
            Self::evict_for_capacity(&mut records, self.max_records_per_shard);
        }

        let now = Instant::now();
        let record = records
            .entry(key.clone())
            .or_insert_with(|| RateLimitRecord::new(config.window));

        record.refresh_block(now, config.window);

        if let Some(block_remaining) = record.block_remaining(now) {
            return RateLimitDecision {
                allowed: false,
                limit: config.max_requests,
                remaining: 0,
                reset_in: record.reset_at.saturating_duration_since(now),
                retry_after: Some(block_remaining),
            };
        }

        record.refresh_window(now, config.window);

        if record.count < config.max_requests {
            record.count += 1;
            return RateLimitDecision {
                allowed: true,
                limit: config.max_requests,
                remaining: config.max_requests - record.count,
                reset_in: record.reset_at.saturating_duration_since(now),
                retry_after: None,
            };
        }

        record.violation_count += 1;
        let retry_after = if record.violation_count >= RATE_LIMIT_VIOLATION_THRESHOLD {
            record.blocked = true;
            record.block_until = Some(now + config.block_duration);
            tracing::warn!(
                key = %key,
                violations = record.violation_count,
                block_secs = config.block_duration.as_secs(),
                "Rate limit violations escalated to temporary block"
            );
            config.block_duration
        } else {
            record.reset_at.saturating_duration_since(now)
        };

        RateLimitDecision {
            allowed: false,
            limit: config.max_requests,
            remaining: 0,
            reset_in: record.reset_at.saturating_duration_since(now),
            retry_after: Some(retry_after),
        }
    }

    /// Conditional counting entry point: skips the counter for outcomes the
    /// config says not to record, otherwise defers to `check`.
    pub async fn record_request(
        &self,
        operation: OperationType,
        identifier: &str,
        success: bool,
        config: Option<&RateLimitConfig>,
    ) -> RateLimitDecision {
        let defaults;
        let config = match config {
            Some(c) => c,
            None => {
                defaults = RateLimitConfig::for_operation(operation);
                &defaults
            }
        };

        if (success && config.skip_successful) || (!success && config.skip_failed) {
            return self.peek(operation, identifier, config).await;
        }

        self.check(operation, identifier, Some(config)).await
    }

    /// Current decision for a key without counting the request.
    async fn peek(
        &self,
        operation: OperationType,
        identifier: &str,
        config: &RateLimitConfig,
    ) -> RateLimitDecision {
        let key = Self::key(operation, identifier);
        let shard = self.shard_for(&key);
        let records = shard.lock().await;
        let now = Instant::now();

        match records.get(&key) {
            Some(record) => {
                if let Some(block_remaining) = record.block_remaining(now) {
                    return RateLimitDecision {
                        allowed: false,
                        limit: config.max_requests,
                        remaining: 0,
                        reset_in: record.reset_at.saturating_duration_since(now),
                        retry_after: Some(block_remaining),
                    };
                }
                let count = if now >= record.reset_at { 0 } else { record.count };
                RateLimitDecision {
                    allowed: count < config.max_requests,
                    limit: config.max_requests,
                    remaining: config.max_requests.saturating_sub(count),
                    reset_in: record.reset_at.saturating_duration_since(now),
                    retry_after: None,
                }
            }
            None => RateLimitDecision {
                allowed: true,
                limit: config.max_requests,
                remaining: config.max_requests,
                reset_in: config.window,
                retry_after: None,
            },
        }
    }

    /// Drop a key's state entirely, window and block included.
    pub async fn reset(&self, operation: OperationType, identifier: &str) {
        let key = Self::key(operation, identifier);
        self.shard_for(&key).lock().await.remove(&key);
    }

    /// Administratively block a key for `duration`, bypassing window logic.
    pub async fn block(&self, operation: OperationType, identifier: &str, duration: Duration) {
        let key = Self::key(operation, identifier);
        let shard = self.shard_for(&key);
        let mut records = shard.lock().await;
        let record = records
            .entry(key.clone())
            .or_insert_with(|| RateLimitRecord::new(duration));
        record.blocked = true;
        record.block_until = Some(Instant::now() + duration);
        tracing::info!(key = %key, block_secs = duration.as_secs(), "Key manually blocked");
    }

    /// Lift a block and clear accumulated violations.
    pub async fn unblock(&self, operation: OperationType, identifier: &str) {
        let key = Self::key(operation, identifier);
        let shard = self.shard_for(&key);
        let mut records = shard.lock().await;
        if let Some(record) = records.get_mut(&key) {
            record.blocked = false;
            record.block_until = None;
            record.violation_count = 0;
            tracing::info!(key = %key, "Key unblocked");
        }
    }

    /// Administrative view of one key, `None` when untracked.
    pub async fn status(&self, operation: OperationType, identifier: &str) -> Option<KeyStatus> {
        let key = Self::key(operation, identifier);
        let records = self.shard_for(&key).lock().await;
        let now = Instant::now();
        records.get(&key).map(|record| KeyStatus {
            count: record.count,
            violation_count: record.violation_count,
            blocked: record.block_remaining(now).is_some(),
            block_remaining: record.block_remaining(now),
        })
    }

    /// All keys currently under an active block.
    pub async fn list_blocked(&self) -> Vec<String> {
        let now = Instant::now();
        let mut blocked = Vec::new();
        for shard in &self.shards {
            let records = shard.lock().await;
            blocked.extend(
                records
                    .iter()
                    .filter(|(_, record)| record.block_remaining(now).is_some())
                    .map(|(key, _)| key.clone()),
            );
        }
        blocked
    }

    /// Evict expired, unblocked records and drop records whose block has
    /// expired. Active blocks are never evicted. Locks one shard at a time.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut total_evicted = 0usize;

        for shard in &self.shards {
            let mut records = shard.lock().await;
            let before = records.len();
            records.retain(|_, record| {
                if record.blocked {
                    // Keep active blocks; an expired block leaves with its record
                    return record
                        .block_until
                        .map(|until| until > now)
                        .unwrap_or(false);
                }
                now < record.reset_at
            });
            total_evicted += before - records.len();
        }

        if total_evicted > 0 {
            tracing::debug!(
                records_evicted = total_evicted,
                "Swept expired rate limit records"
            );
        }
    }

    /// Spawn the periodic sweep. Returns the task handle; cancel the token at
    /// shutdown to stop it.
    pub fn start_sweeper(
        &self,
        sweep_interval: Duration,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let limiter = self.clone();
        let mut ticker = interval(sweep_interval);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        tracing::debug!("Rate limit sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        limiter.sweep().await;
                    }
                }
            }
        })
    }

    /// Capacity guard for a single shard: clear expired records first, then
    /// fall back to dropping the oldest unblocked record.
    fn evict_for_capacity(records: &mut HashMap<String, RateLimitRecord>, max_records: usize) {
        let now = Instant::now();
        records.retain(|_, record| {
            if record.blocked {
                return record
                    .block_until
                    .map(|until| until > now)
                    .unwrap_or(false);
            }
            now < record.reset_at
        });

        if records.len() >= max_records {
            let oldest = records
                .iter()
                .filter(|(_, record)| !record.blocked)
                .min_by_key(|(_, record)| record.reset_at)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                records.remove(&key);
                tracing::debug!(removed_key = %key, "Evicted oldest rate limit record at capacity");
            }
        }
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
    use tokio::time::sleep;

    fn fast_config(max_requests: u32) -> RateLimitConfig {
        RateLimitConfig::new(
            max_requests,
            Duration::from_millis(80),
            Duration::from_millis(160),
        )
    }

    #[tokio::test]
    async fn test_requests_allowed_up_to_limit() {
        let limiter = RateLimiter::new();
        let config = fast_config(3);

        for i in 0..3 {
            let decision = limiter
                .check(OperationType::Upload, "user-1", Some(&config))
                .await;
            assert!(decision.allowed, "request {} should be allowed", i);
            assert_eq!(decision.remaining, 2 - i);
        }

        let decision = limiter
            .check(OperationType::Upload, "user-1", Some(&config))
            .await;
        assert!(!decision.allowed, "request over the limit must be rejected");
        assert_eq!(decision.remaining, 0);
        assert!(decision.retry_after.is_some());
    }

    #[tokio::test]
    async fn test_window_expiry_resets_count() {
        let limiter = RateLimiter::new();
        let config = fast_config(1);

        assert!(limiter
            .check(OperationType::Api, "user-1", Some(&config))
            .await
            .allowed);
        assert!(!limiter
            .check(OperationType::Api, "user-1", Some(&config))
            .await
            .allowed);

        sleep(Duration::from_millis(100)).await;

        let decision = limiter
            .check(OperationType::Api, "user-1", Some(&config))
            .await;
        assert!(decision.allowed, "fresh window should admit again");
    }

    #[tokio::test]
    async fn test_three_violations_escalate_to_block_then_recover() {
        let limiter = RateLimiter::new();
        let config = fast_config(1);

        // Fill the window
        assert!(limiter
            .check(OperationType::Auth, "attacker", Some(&config))
            .await
            .allowed);

        // Three violations within the window escalate to a block
        for _ in 0..3 {
            let decision = limiter
                .check(OperationType::Auth, "attacker", Some(&config))
                .await;
            assert!(!decision.allowed);
        }

        let status = limiter
            .status(OperationType::Auth, "attacker")
            .await
            .unwrap();
        assert!(status.blocked);
        assert_eq!(status.violation_count, 3);

        // Even after the window expires, the block holds
        sleep(Duration::from_millis(100)).await;
        let decision = limiter
            .check(OperationType::Auth, "attacker", Some(&config))
            .await;
        assert!(!decision.allowed, "active block must reject regardless of window");
        assert!(decision.retry_after.is_some());

        // Once the block expires, the very next call gets a fresh window
        sleep(Duration::from_millis(120)).await;
        let decision = limiter
            .check(OperationType::Auth, "attacker", Some(&config))
            .await;
        assert!(decision.allowed, "expired block must admit with a fresh window");

        let status = limiter
            .status(OperationType::Auth, "attacker")
            .await
            .unwrap();
        assert!(!status.blocked);
        assert_eq!(status.violation_count, 0);
    }

    #[tokio::test]
    async fn test_operation_types_are_isolated() {
        let limiter = RateLimiter::new();
        let config = fast_config(1);

        assert!(limiter
            .check(OperationType::Upload, "user-1", Some(&config))
            .await
            .allowed);
        assert!(!limiter
            .check(OperationType::Upload, "user-1", Some(&config))
            .await
            .allowed);

        // Same identifier, different operation: independent window
        assert!(limiter
            .check(OperationType::Download, "user-1", Some(&config))
            .await
            .allowed);
    }

    #[tokio::test]
    async fn test_record_request_skips_configured_outcomes() {
        let limiter = RateLimiter::new();
        let mut config = fast_config(2);
        config.skip_successful = true;

        // Successful requests are not counted
        for _ in 0..5 {
            let decision = limiter
                .record_request(OperationType::Search, "user-1", true, Some(&config))
                .await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, 2);
        }

        // Failed requests are
        assert!(limiter
            .record_request(OperationType::Search, "user-1", false, Some(&config))
            .await
            .allowed);
        assert!(limiter
            .record_request(OperationType::Search, "user-1", false, Some(&config))
            .await
            .allowed);
        assert!(!limiter
            .record_request(OperationType::Search, "user-1", false, Some(&config))
            .await
            .allowed);
    }

    #[tokio::test]
    async fn test_manual_block_and_unblock() {
        let limiter = RateLimiter::new();
        let config = fast_config(10);

        limiter
            .block(OperationType::Api, "banned", Duration::from_secs(60))
            .await;

        let decision = limiter
            .check(OperationType::Api, "banned", Some(&config))
            .await;
        assert!(!decision.allowed);

        let blocked = limiter.list_blocked().await;
        assert_eq!(blocked, vec!["api:banned".to_string()]);

        limiter.unblock(OperationType::Api, "banned").await;
        let decision = limiter
            .check(OperationType::Api, "banned", Some(&config))
            .await;
        assert!(decision.allowed);
        assert!(limiter.list_blocked().await.is_empty());
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let limiter = RateLimiter::new();
        let config = fast_config(1);

        assert!(limiter
            .check(OperationType::Batch, "user-1", Some(&config))
            .await
            .allowed);
        assert!(!limiter
            .check(OperationType::Batch, "user-1", Some(&config))
            .await
            .allowed);

        limiter.reset(OperationType::Batch, "user-1").await;
        assert!(limiter.status(OperationType::Batch, "user-1").await.is_none());
        assert!(limiter
            .check(OperationType::Batch, "user-1", Some(&config))
            .await
            .allowed);
    }

    #[tokio::test]
    async fn test_sweep_evicts_expired_but_keeps_active_blocks() {
        let limiter = RateLimiter::new();
        let config = RateLimitConfig::new(
            1,
            Duration::from_millis(30),
            Duration::from_secs(60),
        );

        limiter
            .check(OperationType::Api, "idle-user", Some(&config))
            .await;
        limiter
            .block(OperationType::Api, "blocked-user", Duration::from_secs(60))
            .await;

        sleep(Duration::from_millis(50)).await;
        limiter.sweep().await;

        assert!(
            limiter.status(OperationType::Api, "idle-user").await.is_none(),
            "expired unblocked record must be evicted"
        );
        assert!(
            limiter
                .status(OperationType::Api, "blocked-user")
                .await
                .is_some(),
            "active block must survive the sweep"
        );
    }

    #[tokio::test]
    async fn test_sweeper_task_runs_and_stops() {
        let limiter = RateLimiter::new();
        let config = RateLimitConfig::new(
            1,
            Duration::from_millis(10),
            Duration::from_secs(60),
        );
        limiter
            .check(OperationType::Api, "user-1", Some(&config))
            .await;

        let cancel = CancellationToken::new();
        let handle = limiter.start_sweeper(Duration::from_millis(20), cancel.clone());

        sleep(Duration::from_millis(60)).await;
        assert!(limiter.status(OperationType::Api, "user-1").await.is_none());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_decision_headers_contract() {
        let limiter = RateLimiter::new();
        let config = fast_config(1);

        let allowed = limiter
            .check(OperationType::Download, "user-1", Some(&config))
            .await;
        let headers = allowed.headers();
        assert!(headers.iter().any(|(name, v)| *name == "X-RateLimit-Limit" && v == "1"));
        assert!(headers
            .iter()
            .any(|(name, v)| *name == "X-RateLimit-Remaining" && v == "0"));
        assert!(headers.iter().any(|(name, _)| *name == "X-RateLimit-Reset"));
        assert!(!headers.iter().any(|(name, _)| *name == "Retry-After"));

        let rejected = limiter
            .check(OperationType::Download, "user-1", Some(&config))
            .await;
        let headers = rejected.headers();
        let retry_after = headers
            .iter()
            .find(|(name, _)| *name == "Retry-After")
            .expect("Retry-After must be present on rejection");
        assert!(retry_after.1.parse::<u64>().unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_default_config_used_when_none_given() {
        let limiter = RateLimiter::new();
        let decision = limiter.check(OperationType::Upload, "user-1", None).await;
        assert!(decision.allowed);
        assert_eq!(
            decision.limit,
            RateLimitConfig::for_operation(OperationType::Upload).max_requests
        );
    }
}
