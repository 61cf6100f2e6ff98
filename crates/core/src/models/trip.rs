use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geo::GeoPoint;

/// Backend identifier of a tracked vehicle.
pub type VehicleId = i64;

/// A finished trip for one vehicle.
///
/// `distance_meters` is the straight-line distance between `start` and
/// `end`, not the length of the path driven between them. When no sample
/// arrived before the trip was stopped, `start` is `None` and the distance
/// is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Unique identifier
    pub id: Uuid,

    /// The vehicle this trip was recorded for
    pub vehicle_id: VehicleId,

    /// First position observed after tracking was activated
    pub start: Option<GeoPoint>,

    /// Final position read when tracking was deactivated
    pub end: GeoPoint,

    /// Haversine distance from `start` to `end`, in meters
    pub distance_meters: f64,

    /// When tracking was activated
    pub started_at: DateTime<Utc>,

    /// When the final position was read
    pub ended_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(
        vehicle_id: VehicleId,
        start: Option<GeoPoint>,
        end: GeoPoint,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        let distance_meters = start.map(|s| s.distance_to(&end)).unwrap_or(0.0);
        Self {
            id: Uuid::new_v4(),
            vehicle_id,
            start,
            end,
            distance_meters,
            started_at,
            ended_at,
        }
    }

    /// Distance in kilometers, unrounded.
    pub fn distance_km(&self) -> f64 {
        self.distance_meters / 1000.0
    }

    /// Whole minutes between activation and the final read.
    pub fn duration_minutes(&self) -> i64 {
        (self.ended_at - self.started_at).num_minutes().max(0)
    }
}

/// Body of `POST /api/carbon/vehicle-log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripLogPayload {
    pub vehicle_id: VehicleId,

    /// Kilometers rounded to 2 decimals
    pub distance_km: f64,

    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,

    /// Always at least 1; the backend rejects zero-length durations
    pub duration_minutes: i64,
}

impl TripLogPayload {
    pub fn from_trip(trip: &Trip) -> Self {
        let start = trip.start.unwrap_or(GeoPoint {
            latitude: 0.0,
            longitude: 0.0,
        });
        Self {
            vehicle_id: trip.vehicle_id,
            distance_km: round_to_cents(trip.distance_km()),
            start_lat: start.latitude,
            start_lon: start.longitude,
            end_lat: trip.end.latitude,
            end_lon: trip.end.longitude,
            duration_minutes: trip.duration_minutes().max(1),
        }
    }
}

impl From<&Trip> for TripLogPayload {
    fn from(trip: &Trip) -> Self {
        Self::from_trip(trip)
    }
}

/// Round to 2 decimal places. Presentation only.
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
