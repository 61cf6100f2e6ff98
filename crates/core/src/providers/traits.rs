use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::CoreError;
use crate::models::emission::MonthlyCarbonData;
use crate::models::geo::GeoPoint;
use crate::models::trip::TripLogPayload;

/// One update delivered to a position watcher.
pub type PositionUpdate = Result<GeoPoint, CoreError>;

/// Callback invoked for every position update of a watch.
pub type PositionCallback = Arc<dyn Fn(PositionUpdate) + Send + Sync>;

/// Registration handle returned by [`PositionSource::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(u64);

impl WatchHandle {
    pub fn new(id: u64) -> Self {
        WatchHandle(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Anything that can report where the device is: a GPS receiver, a
/// platform location service, a replayed log.
///
/// Failures carry a human-readable reason (timeout, permission denied).
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait PositionSource: Send + Sync {
    /// Human-readable name of this source (for logs/errors).
    fn name(&self) -> &str;

    /// Whether the host has any positioning capability at all.
    fn is_available(&self) -> bool;

    /// Subscribe to position updates. The callback runs for each new fix
    /// (or read error) until the handle is cleared.
    fn watch(&self, callback: PositionCallback) -> Result<WatchHandle, CoreError>;

    /// Unsubscribe. Clearing an unknown handle is a no-op.
    fn clear_watch(&self, handle: WatchHandle);

    /// One-shot read of the current position.
    async fn current_position(&self) -> Result<GeoPoint, CoreError>;
}

/// The slice of the GreenFlow REST API the core talks to.
///
/// Implemented over HTTP by `GreenFlowApiClient`; tests substitute mocks.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait CarbonBackend: Send + Sync {
    /// Human-readable name of this backend (for logs/errors).
    fn name(&self) -> &str;

    /// Monthly vehicle and electronic emission totals for the signed-in user.
    async fn fetch_monthly_carbon(&self) -> Result<MonthlyCarbonData, CoreError>;

    /// Record a finished trip.
    async fn submit_trip(&self, payload: &TripLogPayload) -> Result<(), CoreError>;
}
