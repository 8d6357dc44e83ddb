//! Heartbeat Beacon Tests
//!
//! Timelines run on paused tokio time with a 100ms interval, so the first
//! refresh lands at t=100ms and one more every 100ms after that.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use latchkey_common::HeartbeatSettings;
use latchkey_coordination::{
    BeaconError, BeaconState, HeartbeatBeacon, HeartbeatError, HeartbeatOptions,
};
use latchkey_store::{
    MemoryStore, PrefixedStore, Script, ScriptReply, Store, StoreError, StoreResult,
};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};

const KEY: &str = "svc::heartbeat";

fn setup() -> (Arc<MemoryStore>, Arc<HeartbeatBeacon>) {
    let memory = Arc::new(MemoryStore::new());
    let options = HeartbeatOptions {
        interval: Duration::from_millis(100),
        key: KEY.to_string(),
    };
    let beacon = Arc::new(HeartbeatBeacon::new(memory.clone(), options));
    (memory, beacon)
}

/// Memory store whose writes park until the test lets them through
struct GatedStore {
    inner: Arc<MemoryStore>,
    entered: Notify,
    proceed: Notify,
}

impl GatedStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            proceed: Notify::new(),
        }
    }
}

#[async_trait]
impl Store for GatedStore {
    async fn eval_script(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptReply> {
        self.inner.eval_script(script, keys, args).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.entered.notify_one();
        self.proceed.notified().await;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn delete_key(&self, key: &str) -> StoreResult<u64> {
        self.inner.delete_key(key).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        self.inner.ttl(key).await
    }
}

// ============== Refresh ==============

#[tokio::test(start_paused = true)]
async fn test_key_written_with_interval_ttl() {
    let (memory, beacon) = setup();
    let handle = beacon.spawn(|_| {});

    sleep(Duration::from_millis(50)).await;
    assert_eq!(beacon.state(), BeaconState::Running);
    assert_eq!(memory.get(KEY).await.unwrap(), None);

    sleep(Duration::from_millis(60)).await;
    assert_eq!(memory.get(KEY).await.unwrap().as_deref(), Some("ok"));
    let ttl = memory.ttl(KEY).await.unwrap().unwrap();
    assert!(ttl <= Duration::from_millis(100));

    beacon.stop().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_key_expires_after_loop_dies() {
    let (memory, beacon) = setup();
    let handle = beacon.spawn(|_| {});

    sleep(Duration::from_millis(150)).await;
    assert!(memory.get(KEY).await.unwrap().is_some());

    handle.abort();
    let _ = handle.await;

    sleep(Duration::from_millis(60)).await;
    assert_eq!(memory.get(KEY).await.unwrap(), None);
    assert_eq!(beacon.state(), BeaconState::Idle);
}

// ============== Failure Reporting ==============

#[tokio::test(start_paused = true)]
async fn test_failures_counted_and_reset() {
    let (memory, beacon) = setup();
    let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));

    memory.inject_failures(3);
    let sink = seen.clone();
    let handle = beacon.spawn(move |err: &HeartbeatError| {
        assert!(matches!(err.error, StoreError::Connection(_)));
        sink.lock().push(err.count);
    });

    // Ticks at 100, 200 and 300 fail; 400 succeeds
    sleep(Duration::from_millis(450)).await;
    assert_eq!(*seen.lock(), vec![1, 2, 3]);
    assert_eq!(beacon.consecutive_failures(), 0);
    assert_eq!(memory.get(KEY).await.unwrap().as_deref(), Some("ok"));

    // The count starts over after a success
    memory.inject_failures(1);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(*seen.lock(), vec![1, 2, 3, 1]);
    assert_eq!(beacon.consecutive_failures(), 1);

    beacon.stop().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_panicking_callback_does_not_stop_loop() {
    let (memory, beacon) = setup();
    let calls = Arc::new(AtomicU64::new(0));

    memory.inject_failures(2);
    let counter = calls.clone();
    let handle = beacon.spawn(move |_: &HeartbeatError| {
        counter.fetch_add(1, Ordering::SeqCst);
        panic!("callback exploded");
    });

    sleep(Duration::from_millis(250)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(beacon.is_running());

    sleep(Duration::from_millis(100)).await;
    assert_eq!(memory.get(KEY).await.unwrap().as_deref(), Some("ok"));
    assert_eq!(memory.set_count(), 1);

    beacon.stop().await.unwrap();
    handle.await.unwrap().unwrap();
}

// ============== Lifecycle ==============

#[tokio::test(start_paused = true)]
async fn test_stop_removes_key_and_halts_refresh() {
    let (memory, beacon) = setup();
    let handle = beacon.spawn(|_| {});

    sleep(Duration::from_millis(250)).await;
    assert_eq!(memory.set_count(), 2);

    beacon.stop().await.unwrap();
    assert_eq!(beacon.state(), BeaconState::Idle);
    assert_eq!(memory.get(KEY).await.unwrap(), None);
    handle.await.unwrap().unwrap();

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(memory.set_count(), 2);
    assert!(memory.is_empty());

    // A second stop has nothing left to do
    beacon.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop() {
    let (memory, beacon) = setup();

    let first = beacon.spawn(|_| {});
    sleep(Duration::from_millis(150)).await;
    beacon.stop().await.unwrap();
    first.await.unwrap().unwrap();

    let second = beacon.spawn(|_| {});
    sleep(Duration::from_millis(150)).await;
    assert!(beacon.is_running());
    assert_eq!(memory.get(KEY).await.unwrap().as_deref(), Some("ok"));
    assert_eq!(memory.set_count(), 2);

    beacon.stop().await.unwrap();
    second.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_while_running_is_rejected() {
    let (_, beacon) = setup();
    let handle = beacon.spawn(|_| {});
    sleep(Duration::from_millis(10)).await;

    let second = beacon.spawn(|_| {});
    assert_eq!(second.await.unwrap(), Err(BeaconError::AlreadyRunning));
    assert!(beacon.is_running());

    beacon.stop().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_reports_delete_failure() {
    let (memory, beacon) = setup();
    let handle = beacon.spawn(|_| {});
    sleep(Duration::from_millis(150)).await;

    memory.inject_failures(1);
    let err = beacon.stop().await.unwrap_err();
    assert!(matches!(err, BeaconError::Store(StoreError::Connection(_))));
    assert_eq!(beacon.state(), BeaconState::Idle);
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_stop_still_completes() {
    let (memory, beacon) = setup();
    let handle = beacon.spawn(|_| {});
    sleep(Duration::from_millis(150)).await;
    assert!(memory.get(KEY).await.unwrap().is_some());

    // The stop request is delivered before the caller gives up waiting
    assert!(timeout(Duration::ZERO, beacon.stop()).await.is_err());
    handle.await.unwrap().unwrap();

    assert_eq!(beacon.state(), BeaconState::Idle);
    assert_eq!(memory.get(KEY).await.unwrap(), None);

    let restarted = beacon.spawn(|_| {});
    sleep(Duration::from_millis(150)).await;
    assert!(beacon.is_running());
    beacon.stop().await.unwrap();
    restarted.await.unwrap().unwrap();
    assert_eq!(memory.get(KEY).await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_stop_waits_for_in_flight_refresh_and_beats_ready_tick() {
    let memory = Arc::new(MemoryStore::new());
    let gated = Arc::new(GatedStore::new(memory.clone()));
    let options = HeartbeatOptions {
        interval: Duration::from_millis(100),
        key: KEY.to_string(),
    };
    let beacon = Arc::new(HeartbeatBeacon::new(gated.clone(), options));
    let handle = beacon.spawn(|_| {});

    // First refresh is parked inside the store
    gated.entered.notified().await;

    let stopper = {
        let beacon = beacon.clone();
        tokio::spawn(async move { beacon.stop().await })
    };

    // Let the next tick fall due while the refresh is still parked
    sleep(Duration::from_millis(250)).await;
    assert!(!stopper.is_finished());
    assert_eq!(beacon.state(), BeaconState::Stopping);
    assert_eq!(memory.set_count(), 0);

    gated.proceed.notify_one();
    stopper.await.unwrap().unwrap();
    handle.await.unwrap().unwrap();

    // The parked refresh landed, then the key was removed and nothing followed
    assert_eq!(memory.set_count(), 1);
    assert_eq!(memory.get(KEY).await.unwrap(), None);
    sleep(Duration::from_millis(500)).await;
    assert_eq!(memory.set_count(), 1);
    assert!(memory.is_empty());
}

#[tokio::test]
async fn test_stop_before_start_is_noop() {
    let (memory, beacon) = setup();
    beacon.stop().await.unwrap();
    assert_eq!(beacon.state(), BeaconState::Idle);
    assert_eq!(memory.set_count(), 0);
}

// ============== Configuration ==============

#[tokio::test(start_paused = true)]
async fn test_beacon_from_settings_through_prefix() {
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn Store> = Arc::new(PrefixedStore::new(memory.clone(), "app:"));
    let settings = HeartbeatSettings {
        interval_ms: 200,
        key: "alive".to_string(),
    };
    let beacon = Arc::new(HeartbeatBeacon::new(store, HeartbeatOptions::from(&settings)));
    assert_eq!(beacon.options().interval, Duration::from_millis(200));

    let handle = beacon.spawn(|_| {});
    sleep(Duration::from_millis(250)).await;
    assert_eq!(memory.get("app:alive").await.unwrap().as_deref(), Some("ok"));

    beacon.stop().await.unwrap();
    assert!(memory.is_empty());
    handle.await.unwrap().unwrap();
}
