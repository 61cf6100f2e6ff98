use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::CoreError;
use crate::models::geo::GeoPoint;
use super::traits::{PositionCallback, PositionSource, WatchHandle};

/// In-process position source driven by the host.
///
/// The host pushes fixes as they arrive (from a GPS daemon, a serial
/// receiver, a replayed track) and every active watcher receives them in
/// registration order. `current_position` answers with the last fix, or
/// the last error, pushed through `set_current` / `push_fix` /
/// `push_error`.
pub struct ManualPositionSource {
    available: AtomicBool,
    next_handle: AtomicU64,
    watchers: Mutex<BTreeMap<u64, PositionCallback>>,
    current: Mutex<Option<Result<GeoPoint, String>>>,
}

impl ManualPositionSource {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            next_handle: AtomicU64::new(1),
            watchers: Mutex::new(BTreeMap::new()),
            current: Mutex::new(None),
        }
    }

    /// A source on a host without positioning hardware.
    pub fn unavailable() -> Self {
        let source = Self::new();
        source.set_available(false);
        source
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Set what the next `current_position` read returns, without notifying watchers.
    pub fn set_current(&self, point: GeoPoint) {
        *lock(&self.current) = Some(Ok(point));
    }

    /// Make the next `current_position` read fail with `reason`.
    pub fn fail_current(&self, reason: impl Into<String>) {
        *lock(&self.current) = Some(Err(reason.into()));
    }

    /// Deliver a new fix to every watcher and make it the current position.
    pub fn push_fix(&self, point: GeoPoint) {
        self.set_current(point);
        for callback in self.snapshot() {
            callback(Ok(point));
        }
    }

    /// Deliver a read error to every watcher. The current position is kept.
    pub fn push_error(&self, reason: impl Into<String>) {
        let reason = reason.into();
        for callback in self.snapshot() {
            callback(Err(CoreError::PositionRead(reason.clone())));
        }
    }

    /// Number of live watches.
    pub fn watcher_count(&self) -> usize {
        lock(&self.watchers).len()
    }

    // Callbacks run outside the lock so they may call back into the source.
    fn snapshot(&self) -> Vec<PositionCallback> {
        lock(&self.watchers).values().cloned().collect()
    }
}

impl Default for ManualPositionSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl PositionSource for ManualPositionSource {
    fn name(&self) -> &str {
        "Manual"
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn watch(&self, callback: PositionCallback) -> Result<WatchHandle, CoreError> {
        if !self.is_available() {
            return Err(CoreError::CapabilityUnavailable(
                "Manual source is switched off".into(),
            ));
        }
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        lock(&self.watchers).insert(id, callback);
        debug!(watch_id = id, "Position watch registered");
        Ok(WatchHandle::new(id))
    }

    fn clear_watch(&self, handle: WatchHandle) {
        if lock(&self.watchers).remove(&handle.id()).is_some() {
            debug!(watch_id = handle.id(), "Position watch cleared");
        }
    }

    async fn current_position(&self) -> Result<GeoPoint, CoreError> {
        if !self.is_available() {
            return Err(CoreError::CapabilityUnavailable(
                "Manual source is switched off".into(),
            ));
        }
        match lock(&self.current).clone() {
            Some(Ok(point)) => Ok(point),
            Some(Err(reason)) => Err(CoreError::PositionRead(reason)),
            None => Err(CoreError::PositionRead("No position fix yet".into())),
        }
    }
}

// A poisoned lock only means a watcher callback panicked; the data is still usable.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
