//! Liveness heartbeat beacon
//!
//! While running, the beacon rewrites its liveness key every interval with a
//! TTL equal to that interval, so the key vanishes within one interval of the
//! last successful refresh if the process dies.
//!
//! Lifecycle: `Idle -> Running -> Stopping -> Idle`.
//! - [`HeartbeatBeacon::start`] runs the refresh loop on the calling task and
//!   only returns once the beacon is stopped (or the future is dropped).
//! - [`HeartbeatBeacon::stop`] hands the loop an acknowledgement channel. The
//!   loop leaves its select, deletes the liveness key, returns to `Idle` and
//!   answers with the outcome of the delete.
//!
//! Refresh failures never end the loop. They are counted and reported to the
//! caller's callback, and the next tick retries.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use latchkey_common::{DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_HEARTBEAT_KEY, HeartbeatSettings};
use latchkey_store::{Store, StoreError};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{error, info, warn};

use crate::error::{BeaconError, HeartbeatError};

/// Value written to the liveness key
pub const HEARTBEAT_VALUE: &str = "ok";

/// Beacon configuration, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatOptions {
    /// Refresh period, also used as the liveness key's TTL
    pub interval: Duration,
    /// Liveness key
    pub key: String,
}

impl Default for HeartbeatOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            key: DEFAULT_HEARTBEAT_KEY.to_string(),
        }
    }
}

impl From<&HeartbeatSettings> for HeartbeatOptions {
    fn from(settings: &HeartbeatSettings) -> Self {
        Self {
            interval: settings.interval(),
            key: settings.key.clone(),
        }
    }
}

/// Beacon lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BeaconState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
}

impl BeaconState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => BeaconState::Running,
            2 => BeaconState::Stopping,
            _ => BeaconState::Idle,
        }
    }
}

/// Smallest interval the store can express as a whole-millisecond TTL
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Stop request: the loop answers with the outcome of the key delete once it
/// has left the refresh loop
type StopRequest = oneshot::Sender<Result<(), StoreError>>;

/// Periodic liveness key refresher
pub struct HeartbeatBeacon {
    store: Arc<dyn Store>,
    options: HeartbeatOptions,
    /// Present only while a loop is running. Its lock also serializes every
    /// state transition.
    stop_tx: Mutex<Option<mpsc::Sender<StopRequest>>>,
    state: AtomicU8,
    /// Mirror of the loop's failure counter; written only by the loop
    failures: AtomicU64,
}

/// Owns the return to `Idle`, whether the loop exits on a stop request or its
/// future is dropped mid-flight.
struct RunGuard<'a> {
    beacon: &'a HeartbeatBeacon,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.beacon.stop_tx.lock();
        slot.take();
        self.beacon
            .state
            .store(BeaconState::Idle as u8, Ordering::SeqCst);
    }
}

impl HeartbeatBeacon {
    pub fn new(store: Arc<dyn Store>, options: HeartbeatOptions) -> Self {
        Self {
            store,
            options,
            stop_tx: Mutex::new(None),
            state: AtomicU8::new(BeaconState::Idle as u8),
            failures: AtomicU64::new(0),
        }
    }

    /// Beacon with a one second interval on the default liveness key.
    pub fn with_defaults(store: Arc<dyn Store>) -> Self {
        Self::new(store, HeartbeatOptions::default())
    }

    pub fn options(&self) -> &HeartbeatOptions {
        &self.options
    }

    pub fn state(&self) -> BeaconState {
        BeaconState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == BeaconState::Running
    }

    /// Failed refreshes since the last successful one.
    pub fn consecutive_failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Run the refresh loop on the current task until [`stop`](Self::stop) is
    /// called.
    ///
    /// `on_error` is invoked after every failed refresh with the error and the
    /// consecutive failure count. A panic inside it is caught and logged.
    ///
    /// Returns [`BeaconError::InvalidInterval`] for an interval under one
    /// millisecond and [`BeaconError::AlreadyRunning`] unless the beacon is
    /// idle.
    pub async fn start<F>(&self, on_error: F) -> Result<(), BeaconError>
    where
        F: Fn(&HeartbeatError) + Send + Sync,
    {
        let period = self.options.interval;
        if period < MIN_INTERVAL {
            return Err(BeaconError::InvalidInterval(period));
        }

        let (stop_tx, mut stop_rx) = mpsc::channel::<StopRequest>(1);
        {
            let mut slot = self.stop_tx.lock();
            if self.state() != BeaconState::Idle {
                return Err(BeaconError::AlreadyRunning);
            }
            *slot = Some(stop_tx);
            self.state
                .store(BeaconState::Running as u8, Ordering::SeqCst);
        }
        let guard = RunGuard { beacon: self };

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut failures: u64 = 0;
        self.failures.store(0, Ordering::SeqCst);

        info!(
            "Heartbeat started, key={}, interval={:?}",
            self.options.key, period
        );

        // A closed channel means the stopper went away after taking the sender
        let ack = loop {
            tokio::select! {
                biased;

                request = stop_rx.recv() => break request,
                _ = ticker.tick() => {}
            }

            match self.refresh().await {
                Ok(()) => {
                    failures = 0;
                    self.failures.store(0, Ordering::SeqCst);
                }
                Err(e) => {
                    failures += 1;
                    self.failures.store(failures, Ordering::SeqCst);
                    warn!(
                        "Heartbeat refresh failed for {} ({} in a row): {}",
                        self.options.key, failures, e
                    );

                    let failure = HeartbeatError {
                        error: e,
                        count: failures,
                    };
                    invoke_callback(&on_error, &failure);
                }
            }
        };

        // No refresh runs past this point, so the delete cannot be undone
        let removed = self.remove_key().await;

        // Guard must be gone before the ack: a restart may begin once stop returns
        drop(guard);
        if let Some(ack) = ack {
            let _ = ack.send(removed);
        }
        Ok(())
    }

    /// Run the refresh loop without an error callback. Failures are still
    /// counted and logged.
    pub async fn start_unobserved(&self) -> Result<(), BeaconError> {
        self.start(|_: &HeartbeatError| {}).await
    }

    /// Spawn the refresh loop on a background task.
    pub fn spawn<F>(self: &Arc<Self>, on_error: F) -> JoinHandle<Result<(), BeaconError>>
    where
        F: Fn(&HeartbeatError) + Send + Sync + 'static,
    {
        let beacon = Arc::clone(self);
        tokio::spawn(async move { beacon.start(on_error).await })
    }

    /// Stop the loop, wait for it to exit and for the liveness key to be
    /// deleted.
    ///
    /// A no-op when the beacon is not running. Not meant to be called from
    /// several tasks at once. Dropping the returned future does not abandon
    /// the stop: the loop still exits, deletes the key and returns to `Idle`.
    pub async fn stop(&self) -> Result<(), BeaconError> {
        let stop_tx = {
            let mut slot = self.stop_tx.lock();
            let Some(stop_tx) = slot.take() else {
                return Ok(());
            };
            self.state
                .store(BeaconState::Stopping as u8, Ordering::SeqCst);
            stop_tx
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if stop_tx.send(ack_tx).await.is_err() {
            return Ok(());
        }

        match ack_rx.await {
            Ok(removed) => removed.map_err(BeaconError::Store),
            // The loop future was dropped before it could answer; the key
            // lapses by TTL
            Err(_) => Ok(()),
        }
    }

    async fn refresh(&self) -> Result<(), StoreError> {
        self.store
            .set_with_ttl(&self.options.key, HEARTBEAT_VALUE, self.options.interval)
            .await
    }

    async fn remove_key(&self) -> Result<(), StoreError> {
        match self.store.delete_key(&self.options.key).await {
            Ok(_) => {
                info!("Heartbeat stopped, key={} removed", self.options.key);
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Heartbeat stopped but key {} could not be removed: {}",
                    self.options.key, e
                );
                Err(e)
            }
        }
    }
}

fn invoke_callback<F>(on_error: &F, failure: &HeartbeatError)
where
    F: Fn(&HeartbeatError),
{
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| on_error(failure))) {
        error!(
            "Heartbeat error callback panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
