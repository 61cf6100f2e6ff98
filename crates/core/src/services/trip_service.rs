use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::errors::CoreError;
use crate::models::geo::GeoPoint;
use crate::models::trip::{Trip, VehicleId};
use crate::providers::traits::{PositionCallback, PositionSource, PositionUpdate, WatchHandle};

/// Observer notified of everything the accumulator does.
pub type TripListener = Arc<dyn Fn(TripEvent) + Send + Sync>;

/// Notifications delivered to a [`TripListener`].
#[derive(Debug, Clone, PartialEq)]
pub enum TripEvent {
    /// Tracking started for a vehicle
    Activated { vehicle_id: VehicleId },

    /// A position sample was accepted. `first` marks the trip's start point.
    Sampled {
        vehicle_id: VehicleId,
        point: GeoPoint,
        first: bool,
    },

    /// Tracking stopped without a trip (another vehicle was activated)
    Deactivated { vehicle_id: VehicleId },

    /// Tracking stopped and the trip was finalized
    Completed(Trip),

    /// The position source reported a failure
    Failed { vehicle_id: VehicleId, reason: String },
}

/// One vehicle's tracking session.
struct Session {
    vehicle_id: VehicleId,
    /// Distinguishes this session from earlier ones for the same vehicle, so a
    /// late callback from an old watch never touches a newer session.
    generation: u64,
    watch: Option<WatchHandle>,
    /// False once deactivation has begun; samples are ignored from then on.
    polling: bool,
    start: Option<GeoPoint>,
    latest: Option<GeoPoint>,
    started_at: DateTime<Utc>,
}

#[derive(Default)]
struct TrackerState {
    session: Option<Session>,
    next_generation: u64,
}

/// Turns a stream of position samples into a single trip distance.
///
/// At most one vehicle is tracked at a time. The first sample after
/// activation becomes the start point; on deactivation the watch is
/// cleared, one final position is read, and the haversine distance from the
/// start to that reading becomes the trip distance. Intermediate samples
/// only update the latest known point.
///
/// The accumulator holds no storage: persisting the returned [`Trip`] is
/// the caller's job.
pub struct TripAccumulator {
    source: Arc<dyn PositionSource>,
    state: Arc<Mutex<TrackerState>>,
    listener: Option<TripListener>,
}

impl TripAccumulator {
    pub fn new(source: Arc<dyn PositionSource>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(TrackerState::default())),
            listener: None,
        }
    }

    /// Attach an observer for [`TripEvent`]s.
    pub fn with_listener(mut self, listener: TripListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Start tracking `vehicle_id`.
    ///
    /// Any other tracked vehicle is deactivated first, without producing a
    /// trip. Fails with [`CoreError::CapabilityUnavailable`] when the host has
    /// no positioning support; nothing changes in that case.
    pub fn activate(&self, vehicle_id: VehicleId) -> Result<(), CoreError> {
        if !self.source.is_available() {
            warn!(vehicle_id, source = self.source.name(), "Positioning unavailable");
            return Err(CoreError::CapabilityUnavailable(format!(
                "{} reports no positioning support",
                self.source.name()
            )));
        }

        let (previous, generation) = {
            let mut state = lock(&self.state);
            if let Some(session) = &state.session {
                if session.vehicle_id == vehicle_id && session.polling {
                    return Ok(());
                }
            }
            let previous = state.session.take();
            let generation = state.next_generation;
            state.next_generation += 1;
            state.session = Some(Session {
                vehicle_id,
                generation,
                watch: None,
                polling: true,
                start: None,
                latest: None,
                started_at: Utc::now(),
            });
            (previous, generation)
        };

        if let Some(previous) = previous {
            if let Some(handle) = previous.watch {
                self.source.clear_watch(handle);
            }
            info!(vehicle_id = previous.vehicle_id, "Tracking stopped, another vehicle activated");
            self.emit(TripEvent::Deactivated {
                vehicle_id: previous.vehicle_id,
            });
        }

        let handle = match self.source.watch(self.watch_callback(vehicle_id, generation)) {
            Ok(handle) => handle,
            Err(e) => {
                let mut state = lock(&self.state);
                if state.session.as_ref().is_some_and(|s| s.generation == generation) {
                    state.session = None;
                }
                warn!(vehicle_id, error = %e, "Could not start position watch");
                return Err(e);
            }
        };

        let superseded = {
            let mut state = lock(&self.state);
            match state.session.as_mut() {
                Some(session) if session.generation == generation => {
                    session.watch = Some(handle);
                    false
                }
                _ => true,
            }
        };
        if superseded {
            self.source.clear_watch(handle);
            return Ok(());
        }

        info!(vehicle_id, watch_id = handle.id(), "Tracking activated");
        self.emit(TripEvent::Activated { vehicle_id });
        Ok(())
    }

    /// Feed one position sample for `vehicle_id`.
    ///
    /// The first sample since activation becomes the start point; every
    /// sample replaces the latest point. Samples for a vehicle that is not
    /// being tracked are ignored. Returns whether the sample was accepted.
    pub fn on_sample(&self, vehicle_id: VehicleId, point: GeoPoint) -> bool {
        record_sample(&self.state, self.listener.as_ref(), vehicle_id, None, point)
    }

    /// Stop tracking `vehicle_id` and finalize its trip.
    ///
    /// The watch is cleared before the final position is read, so no late
    /// sample can change the result. If the final read fails the error is
    /// returned, no trip is produced, and the start point is kept: calling
    /// `deactivate` again retries the read.
    pub async fn deactivate(&self, vehicle_id: VehicleId) -> Result<Trip, CoreError> {
        let (watch, start, started_at, generation) = {
            let mut state = lock(&self.state);
            let session = state
                .session
                .as_mut()
                .filter(|s| s.vehicle_id == vehicle_id)
                .ok_or(CoreError::TrackerNotActive(vehicle_id))?;
            session.polling = false;
            (
                session.watch.take(),
                session.start,
                session.started_at,
                session.generation,
            )
        };

        if let Some(handle) = watch {
            self.source.clear_watch(handle);
            debug!(vehicle_id, watch_id = handle.id(), "Position watch cleared");
        }

        let end = match self.source.current_position().await {
            Ok(point) => point,
            Err(e) => {
                warn!(vehicle_id, error = %e, "Final position read failed, trip not finalized");
                self.emit(TripEvent::Failed {
                    vehicle_id,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        {
            let mut state = lock(&self.state);
            if state.session.as_ref().is_some_and(|s| s.generation == generation) {
                state.session = None;
            }
        }

        let trip = Trip::new(vehicle_id, start, end, started_at, Utc::now());
        info!(
            vehicle_id,
            distance_m = trip.distance_meters,
            has_start = trip.start.is_some(),
            "Trip finalized"
        );
        self.emit(TripEvent::Completed(trip.clone()));
        Ok(trip)
    }

    /// The vehicle currently being polled, if any.
    pub fn active_vehicle(&self) -> Option<VehicleId> {
        lock(&self.state)
            .session
            .as_ref()
            .filter(|s| s.polling)
            .map(|s| s.vehicle_id)
    }

    pub fn is_active(&self, vehicle_id: VehicleId) -> bool {
        self.active_vehicle() == Some(vehicle_id)
    }

    /// Start point of the vehicle's session, if one was recorded.
    pub fn start_point(&self, vehicle_id: VehicleId) -> Option<GeoPoint> {
        self.with_session(vehicle_id, |s| s.start)
    }

    /// Most recent sample of the vehicle's session.
    pub fn latest_point(&self, vehicle_id: VehicleId) -> Option<GeoPoint> {
        self.with_session(vehicle_id, |s| s.latest)
    }

    fn with_session<T>(&self, vehicle_id: VehicleId, f: impl Fn(&Session) -> Option<T>) -> Option<T> {
        lock(&self.state)
            .session
            .as_ref()
            .filter(|s| s.vehicle_id == vehicle_id)
            .and_then(f)
    }

    fn watch_callback(&self, vehicle_id: VehicleId, generation: u64) -> PositionCallback {
        let state = Arc::clone(&self.state);
        let listener = self.listener.clone();
        Arc::new(move |update: PositionUpdate| match update {
            Ok(point) => {
                record_sample(&state, listener.as_ref(), vehicle_id, Some(generation), point);
            }
            Err(e) => {
                let current = lock(&state)
                    .session
                    .as_ref()
                    .is_some_and(|s| s.generation == generation && s.polling);
                if current {
                    warn!(vehicle_id, error = %e, "Position watch reported an error");
                    if let Some(listener) = &listener {
                        listener(TripEvent::Failed {
                            vehicle_id,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        })
    }

    fn emit(&self, event: TripEvent) {
        if let Some(listener) = &self.listener {
            listener(event);
        }
    }
}

/// Apply a sample to the tracked session. The lock is released before the
/// listener runs so listeners may query the accumulator.
fn record_sample(
    state: &Mutex<TrackerState>,
    listener: Option<&TripListener>,
    vehicle_id: VehicleId,
    generation: Option<u64>,
    point: GeoPoint,
) -> bool {
    let first = {
        let mut state = lock(state);
        let Some(session) = state.session.as_mut() else {
            return false;
        };
        let matches = session.vehicle_id == vehicle_id
            && session.polling
            && generation.map_or(true, |g| g == session.generation);
        if !matches {
            return false;
        }
        let first = session.start.is_none();
        if first {
            session.start = Some(point);
        }
        session.latest = Some(point);
        first
    };

    if first {
        debug!(vehicle_id, %point, "Trip start recorded");
    }
    if let Some(listener) = listener {
        listener(TripEvent::Sampled {
            vehicle_id,
            point,
            first,
        });
    }
    true
}

fn lock(state: &Mutex<TrackerState>) -> MutexGuard<'_, TrackerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
