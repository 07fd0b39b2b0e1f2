//! End-to-end decision-flow tests against in-process doubles.
//!
//! `MemoryScoreStore` mirrors the semantics of the three Lua scripts in
//! memory, keyed by script name, so the full decide path (whitelist →
//! snapshot → limiter → store → verdict decode) runs without a live
//! Redis or Consul.

use async_trait::async_trait;
use limitgate::error::{LimitError, LimitResult};
use limitgate::limiter::{
    FixedWindowLimiter, Limiter, LimiterRegistry, SlidingWindowLimiter, TokenBucketLimiter,
};
use limitgate::policy::Policy;
use limitgate::provider::{ChangeCallback, ConfigProvider, ErrorCallback};
use limitgate::resilience::CircuitState;
use limitgate::service::{ConfigService, LimiterService};
use limitgate::snapshot::{PolicySnapshot, FIXED_WINDOW, SLIDING_WINDOW, TOKEN_BUCKET};
use limitgate::store::{ResilientScoreStore, ScoreStore, ScriptArg, ScriptHandle};
use redis::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

struct FixedEntry {
    count: i64,
    expires_at: Instant,
}

struct BucketEntry {
    tokens: i64,
    last_refill: i64,
}

/// In-memory stand-in for the score store running the decision scripts.
#[derive(Default)]
struct MemoryScoreStore {
    fixed: Mutex<HashMap<String, FixedEntry>>,
    sliding: Mutex<HashMap<String, Vec<i64>>>,
    buckets: Mutex<HashMap<String, BucketEntry>>,
    failing: AtomicBool,
    eval_calls: AtomicU32,
}

impl MemoryScoreStore {
    fn int_arg(args: &[ScriptArg], index: usize) -> i64 {
        match &args[index] {
            ScriptArg::Int(n) => *n,
            ScriptArg::Str(_) => panic!("argument {index} should be an integer"),
        }
    }

    fn eval_fixed_window(&self, key: &str, args: &[ScriptArg]) -> Value {
        let window = Self::int_arg(args, 0);
        let limit = Self::int_arg(args, 1);
        let now = Instant::now();

        let mut entries = self.fixed.lock().unwrap();
        let entry = entries.entry(key.to_string()).or_insert(FixedEntry {
            count: 0,
            expires_at: now + Duration::from_secs(window as u64),
        });
        if entry.expires_at <= now {
            entry.count = 0;
            entry.expires_at = now + Duration::from_secs(window as u64);
        }
        entry.count += 1;

        let allowed = i64::from(entry.count <= limit);
        let remaining = (limit - entry.count).max(0);
        let ttl = entry.expires_at.duration_since(now).as_secs().max(1) as i64;
        Value::Array(vec![
            Value::Int(allowed),
            Value::Int(limit),
            Value::Int(remaining),
            Value::Int(ttl),
        ])
    }

    fn eval_sliding_window(&self, key: &str, args: &[ScriptArg]) -> Value {
        let window_ms = Self::int_arg(args, 0);
        let limit = Self::int_arg(args, 1);
        let now_ms = Self::int_arg(args, 2);

        let mut entries = self.sliding.lock().unwrap();
        let timestamps = entries.entry(key.to_string()).or_default();
        timestamps.retain(|&ts| ts > now_ms - window_ms);

        let mut count = timestamps.len() as i64;
        let allowed = count < limit;
        if allowed {
            timestamps.push(now_ms);
            count += 1;
        }

        let remaining = (limit - count).max(0);
        let reset_time = timestamps
            .iter()
            .min()
            .map_or(0, |oldest| (oldest + window_ms) / 1000);
        Value::Array(vec![
            Value::Int(i64::from(allowed)),
            Value::Int(limit),
            Value::Int(remaining),
            Value::Int(reset_time),
        ])
    }

    fn eval_token_bucket(&self, key: &str, args: &[ScriptArg]) -> Value {
        let capacity = Self::int_arg(args, 0);
        let refill_rate = Self::int_arg(args, 1);
        let requested = Self::int_arg(args, 2);
        let now = Self::int_arg(args, 3);

        let mut entries = self.buckets.lock().unwrap();
        let entry = entries.entry(key.to_string()).or_insert(BucketEntry {
            tokens: capacity,
            last_refill: now,
        });

        let delta = (now - entry.last_refill).max(0);
        entry.tokens = capacity.min(entry.tokens + delta * refill_rate);
        entry.last_refill = now;

        let allowed = entry.tokens >= requested;
        if allowed {
            entry.tokens -= requested;
        }

        let reset_time = if entry.tokens < capacity {
            now + (capacity - entry.tokens + refill_rate - 1) / refill_rate
        } else {
            now
        };
        Value::Array(vec![
            Value::Int(i64::from(allowed)),
            Value::Int(capacity),
            Value::Int(entry.tokens),
            Value::Int(reset_time),
        ])
    }
}

#[async_trait]
impl ScoreStore for MemoryScoreStore {
    async fn eval(
        &self,
        script: &ScriptHandle,
        keys: &[&str],
        args: &[ScriptArg],
    ) -> LimitResult<Value> {
        self.eval_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(LimitError::Store("connection refused".into()));
        }

        let key = keys[0];
        match script.name() {
            "fixed_window" => Ok(self.eval_fixed_window(key, args)),
            "sliding_window" => Ok(self.eval_sliding_window(key, args)),
            "token_bucket" => Ok(self.eval_token_bucket(key, args)),
            other => panic!("unexpected script '{other}'"),
        }
    }

    async fn get(&self, _key: &str) -> LimitResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_seconds: u64) -> LimitResult<()> {
        Ok(())
    }

    async fn incr(&self, _key: &str) -> LimitResult<i64> {
        Ok(0)
    }

    async fn ping(&self) -> LimitResult<()> {
        Ok(())
    }
}

/// Provider whose `get` returns a fixed snapshot; `watch` optionally emits
/// one delayed update and then parks until cancelled.
struct StaticProvider {
    initial: PolicySnapshot,
    update: Option<(Duration, PolicySnapshot)>,
}

impl StaticProvider {
    fn empty() -> Self {
        Self {
            initial: PolicySnapshot::default(),
            update: None,
        }
    }
}

#[async_trait]
impl ConfigProvider for StaticProvider {
    async fn get(&self, _key: &str) -> LimitResult<PolicySnapshot> {
        Ok(self.initial.clone())
    }

    async fn watch(
        &self,
        _key: &str,
        _poll_interval: Duration,
        cancel: CancellationToken,
        on_change: ChangeCallback,
        _on_error: ErrorCallback,
    ) {
        if let Some((delay, snapshot)) = &self.update {
            tokio::time::sleep(*delay).await;
            on_change(snapshot.clone());
        }
        cancel.cancelled().await;
    }
}

fn parse_snapshot(doc: &str) -> PolicySnapshot {
    PolicySnapshot::from_json(doc.as_bytes()).unwrap()
}

struct Harness {
    service: LimiterService,
    store: Arc<MemoryScoreStore>,
}

/// Wire a full service over the in-memory store, optionally behind a
/// circuit breaker.
fn build_service(
    snapshot: PolicySnapshot,
    whitelist: &[&str],
    breaker: Option<(u32, Duration)>,
) -> Harness {
    let memory = Arc::new(MemoryScoreStore::default());
    let store: Arc<dyn ScoreStore> = match breaker {
        Some((max_failures, timeout)) => Arc::new(ResilientScoreStore::new(
            SharedStore(Arc::clone(&memory)),
            max_failures,
            timeout,
        )),
        None => Arc::new(SharedStore(Arc::clone(&memory))),
    };

    let registry = LimiterRegistry::new();
    registry
        .register(FIXED_WINDOW, FixedWindowLimiter::factory)
        .unwrap();
    registry
        .register(TOKEN_BUCKET, TokenBucketLimiter::factory)
        .unwrap();
    registry
        .register(SLIDING_WINDOW, SlidingWindowLimiter::factory)
        .unwrap();

    let mut limiters: HashMap<String, Arc<dyn Limiter>> = HashMap::new();
    for name in [FIXED_WINDOW, TOKEN_BUCKET, SLIDING_WINDOW] {
        let limiter = registry
            .create(name, Arc::clone(&store), ScriptHandle::new(name, "-- test"))
            .unwrap();
        limiters.insert(name.to_string(), limiter);
    }

    let config = Arc::new(ConfigService::new(
        Arc::new(StaticProvider::empty()),
        Duration::from_millis(50),
    ));
    config.publish(snapshot);

    let service = LimiterService::new(config, limiters, Policy::new(whitelist).unwrap());
    Harness {
        service,
        store: memory,
    }
}

/// Arc wrapper so the test can keep a handle to the memory store while the
/// service owns the `dyn ScoreStore`.
struct SharedStore(Arc<MemoryScoreStore>);

#[async_trait]
impl ScoreStore for SharedStore {
    async fn eval(
        &self,
        script: &ScriptHandle,
        keys: &[&str],
        args: &[ScriptArg],
    ) -> LimitResult<Value> {
        self.0.eval(script, keys, args).await
    }

    async fn get(&self, key: &str) -> LimitResult<Option<String>> {
        self.0.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> LimitResult<()> {
        self.0.set(key, value, ttl_seconds).await
    }

    async fn incr(&self, key: &str) -> LimitResult<i64> {
        self.0.incr(key).await
    }

    async fn ping(&self) -> LimitResult<()> {
        self.0.ping().await
    }
}

#[tokio::test]
async fn test_fixed_window_basic() {
    let snapshot = parse_snapshot(
        r#"{"routes": {"api": {"algorithm": "fixed_window", "limit": 3, "window": 60}}}"#,
    );
    let harness = build_service(snapshot, &[], None);

    let mut allowed = Vec::new();
    let mut remaining = Vec::new();
    for _ in 0..5 {
        let info = harness.service.decide("10.0.0.1", "api").await.unwrap();
        allowed.push(info.allowed);
        remaining.push(info.remaining);
        assert_eq!(info.limit, 3);
    }

    assert_eq!(allowed, [true, true, true, false, false]);
    assert_eq!(remaining, [2, 1, 0, 0, 0]);
}

#[tokio::test]
async fn test_fixed_window_reset_time_is_absolute() {
    let snapshot = parse_snapshot(
        r#"{"routes": {"api": {"algorithm": "fixed_window", "limit": 3, "window": 60}}}"#,
    );
    let harness = build_service(snapshot, &[], None);

    let info = harness.service.decide("10.0.0.1", "api").await.unwrap();
    let now = epoch_secs();
    assert!(info.reset_time > now);
    assert!(info.reset_time <= now + 61);
}

#[tokio::test]
async fn test_whitelist_bypass() {
    let snapshot = parse_snapshot(
        r#"{"routes": {"api": {"algorithm": "fixed_window", "limit": 3, "window": 60}}}"#,
    );
    let harness = build_service(snapshot, &["10.0.0.2"], None);

    for _ in 0..10 {
        let info = harness.service.decide("10.0.0.2", "api").await.unwrap();
        assert!(info.allowed);
        assert_eq!(info.limit, -1);
    }
    // The store is never consulted for whitelisted traffic.
    assert_eq!(harness.store.eval_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_route_is_unlimited() {
    let harness = build_service(PolicySnapshot::default(), &[], None);

    for ip in ["10.0.0.1", "172.16.0.9", "2001:db8::1"] {
        let info = harness.service.decide(ip, "nonexistent").await.unwrap();
        assert!(info.allowed);
        assert_eq!(info.limit, -1);
        assert_eq!(info.remaining, -1);
        assert_eq!(info.reset_time, 0);
    }
    assert_eq!(harness.store.eval_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_token_bucket_refill() {
    let snapshot = parse_snapshot(
        r#"{"routes": {"api": {"algorithm": "token_bucket", "capacity": 5, "refill_rate": 1, "bucket_ttl": 60}}}"#,
    );
    let harness = build_service(snapshot, &[], None);

    for i in 0..5 {
        let info = harness.service.decide("10.0.0.1", "api").await.unwrap();
        assert!(info.allowed, "request {i} should drain the bucket");
        assert_eq!(info.limit, 5);
    }
    let info = harness.service.decide("10.0.0.1", "api").await.unwrap();
    assert!(!info.allowed, "bucket should be empty");
    assert_eq!(info.remaining, 0);

    // Roughly two tokens refill over two seconds; a rapid burst afterwards
    // must drain back to empty within a few calls.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let first = harness.service.decide("10.0.0.1", "api").await.unwrap();
    assert!(first.allowed, "refilled bucket should admit again");

    let mut denied = false;
    for _ in 0..4 {
        if !harness.service.decide("10.0.0.1", "api").await.unwrap().allowed {
            denied = true;
            break;
        }
    }
    assert!(denied, "burst faster than the refill rate must be denied");
}

#[tokio::test]
async fn test_sliding_window_counts_within_window() {
    let snapshot = parse_snapshot(
        r#"{"routes": {"api": {"algorithm": "sliding_window", "limit": 2, "window": 30}}}"#,
    );
    let harness = build_service(snapshot, &[], None);

    let first = harness.service.decide("10.0.0.1", "api").await.unwrap();
    let second = harness.service.decide("10.0.0.1", "api").await.unwrap();
    let third = harness.service.decide("10.0.0.1", "api").await.unwrap();

    assert!(first.allowed);
    assert!(second.allowed);
    assert!(!third.allowed, "both prior calls count against the limit");
}

#[tokio::test]
async fn test_sliding_window_expired_calls_do_not_interact() {
    let snapshot = parse_snapshot(
        r#"{"routes": {"api": {"algorithm": "sliding_window", "limit": 1, "window": 1}}}"#,
    );
    let harness = build_service(snapshot, &[], None);

    assert!(harness.service.decide("10.0.0.1", "api").await.unwrap().allowed);
    assert!(!harness.service.decide("10.0.0.1", "api").await.unwrap().allowed);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(
        harness.service.decide("10.0.0.1", "api").await.unwrap().allowed,
        "calls separated by more than the window never interact"
    );
}

#[tokio::test]
async fn test_independent_ips_do_not_share_counters() {
    let snapshot = parse_snapshot(
        r#"{"routes": {"api": {"algorithm": "fixed_window", "limit": 1, "window": 60}}}"#,
    );
    let harness = build_service(snapshot, &[], None);

    assert!(harness.service.decide("10.0.0.1", "api").await.unwrap().allowed);
    assert!(!harness.service.decide("10.0.0.1", "api").await.unwrap().allowed);
    assert!(harness.service.decide("10.0.0.2", "api").await.unwrap().allowed);
}

#[tokio::test]
async fn test_circuit_opens_and_recovers() {
    let snapshot = parse_snapshot(
        r#"{"routes": {"api": {"algorithm": "fixed_window", "limit": 3, "window": 60}}}"#,
    );
    let harness = build_service(snapshot, &[], Some((2, Duration::from_secs(1))));
    harness.store.failing.store(true, Ordering::SeqCst);

    // First two failures hit the store and count against the breaker.
    for _ in 0..2 {
        let err = harness.service.decide("10.0.0.1", "api").await.unwrap_err();
        assert_eq!(err.code(), "REDIS_ERROR");
    }
    assert_eq!(harness.store.eval_calls.load(Ordering::SeqCst), 2);

    // Open: rejected without a store call.
    for _ in 0..3 {
        let err = harness.service.decide("10.0.0.1", "api").await.unwrap_err();
        assert_eq!(err.code(), "CIRCUIT_OPEN");
    }
    assert_eq!(harness.store.eval_calls.load(Ordering::SeqCst), 2);

    // Whitelisted traffic still bypasses while the breaker is open.
    let harness_whitelisted = build_service(
        parse_snapshot(
            r#"{"routes": {"api": {"algorithm": "fixed_window", "limit": 3, "window": 60}}}"#,
        ),
        &["10.0.0.2"],
        Some((2, Duration::from_secs(1))),
    );
    harness_whitelisted.store.failing.store(true, Ordering::SeqCst);
    assert!(harness_whitelisted
        .service
        .decide("10.0.0.2", "api")
        .await
        .unwrap()
        .allowed);

    // After the recovery timeout the store is healthy again; the probe
    // passes through and closes the breaker.
    harness.store.failing.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let info = harness.service.decide("10.0.0.1", "api").await.unwrap();
    assert!(info.allowed);
    assert_eq!(harness.store.eval_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_circuit_breaker_unit_recovery_state() {
    use limitgate::resilience::CircuitBreaker;

    let breaker = CircuitBreaker::new(2, Duration::from_millis(50));
    for _ in 0..2 {
        let _ = breaker
            .execute(|| async { Err::<(), _>(LimitError::Store("down".into())) })
            .await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(60)).await;
    breaker.execute(|| async { Ok(()) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_hot_config_reload() {
    let update = parse_snapshot(
        r#"{"routes": {"api": {"algorithm": "fixed_window", "limit": 1, "window": 60}}}"#,
    );
    let provider = StaticProvider {
        initial: PolicySnapshot::default(),
        update: Some((Duration::from_millis(50), update)),
    };

    let config = Arc::new(ConfigService::new(
        Arc::new(provider),
        Duration::from_millis(50),
    ));
    config.load_once("rates").await.unwrap();

    let memory = Arc::new(MemoryScoreStore::default());
    let store: Arc<dyn ScoreStore> = Arc::new(SharedStore(Arc::clone(&memory)));
    let registry = LimiterRegistry::new();
    registry
        .register(FIXED_WINDOW, FixedWindowLimiter::factory)
        .unwrap();
    let mut limiters: HashMap<String, Arc<dyn Limiter>> = HashMap::new();
    limiters.insert(
        FIXED_WINDOW.to_string(),
        registry
            .create(FIXED_WINDOW, store, ScriptHandle::new(FIXED_WINDOW, "-- test"))
            .unwrap(),
    );
    let service = LimiterService::new(
        Arc::clone(&config),
        limiters,
        Policy::new(Vec::<String>::new()).unwrap(),
    );

    // Before the update lands the route is unlimited.
    let info = service.decide("1.1.1.1", "api").await.unwrap();
    assert!(info.allowed);
    assert_eq!(info.limit, -1);

    let cancel = CancellationToken::new();
    let handle = config.start_watch("rates", cancel.clone());

    // Within bounded time the new policy takes effect: one allowed, then
    // limited.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        assert!(Instant::now() < deadline, "policy update never applied");
        if !config.snapshot().routes.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let first = service.decide("1.1.1.1", "api").await.unwrap();
    assert!(first.allowed);
    assert_eq!(first.limit, 1);
    let second = service.decide("1.1.1.1", "api").await.unwrap();
    assert!(!second.allowed);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("watch should stop on cancel")
        .unwrap();
}
