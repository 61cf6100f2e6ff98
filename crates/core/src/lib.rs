pub mod errors;
pub mod models;
pub mod providers;
pub mod services;

use chrono::{NaiveDate, Utc};
use models::{
    chart::{CarbonSummary, MonthlySeries},
    geo::GeoPoint,
    settings::Settings,
    trip::{Trip, TripLogPayload, VehicleId},
    vehicle::FuelType,
};
use providers::traits::{CarbonBackend, PositionSource};
use serde::{Deserialize, Serialize};
use services::{
    chart_service::MonthlyCarbonAggregator,
    emission_service::CarbonEstimator,
    trip_service::{TripAccumulator, TripListener},
};
use std::sync::Arc;
use tracing::info;

use errors::CoreError;

/// Everything known about a trip after it was submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripReport {
    /// The finalized trip
    pub trip: Trip,

    /// The body that was sent to the backend
    pub payload: TripLogPayload,

    /// Emission estimate for the rounded distance and the vehicle's fuel
    pub estimated_emission: f64,
}

/// Main entry point for the GreenFlow core library.
/// Wires trip tracking, chart aggregation and the backend together.
#[must_use]
pub struct GreenFlowTracker {
    settings: Settings,
    accumulator: TripAccumulator,
    aggregator: MonthlyCarbonAggregator,
    estimator: CarbonEstimator,
    backend: Arc<dyn CarbonBackend>,
}

impl std::fmt::Debug for GreenFlowTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GreenFlowTracker")
            .field("api_base_url", &self.settings.api_base_url)
            .field("backend", &self.backend.name())
            .field("active_vehicle", &self.accumulator.active_vehicle())
            .field("chart_window_months", &self.aggregator.window())
            .finish()
    }
}

impl GreenFlowTracker {
    /// Create a tracker over the given position source and backend.
    pub fn new(
        settings: Settings,
        source: Arc<dyn PositionSource>,
        backend: Arc<dyn CarbonBackend>,
    ) -> Result<Self, CoreError> {
        Self::build(settings, TripAccumulator::new(source), backend)
    }

    /// Like [`GreenFlowTracker::new`], with an observer for trip events.
    pub fn with_listener(
        settings: Settings,
        source: Arc<dyn PositionSource>,
        backend: Arc<dyn CarbonBackend>,
        listener: TripListener,
    ) -> Result<Self, CoreError> {
        Self::build(
            settings,
            TripAccumulator::new(source).with_listener(listener),
            backend,
        )
    }

    fn build(
        settings: Settings,
        accumulator: TripAccumulator,
        backend: Arc<dyn CarbonBackend>,
    ) -> Result<Self, CoreError> {
        settings.validate()?;
        let aggregator = MonthlyCarbonAggregator::with_window(settings.chart_window_months);
        Ok(Self {
            settings,
            accumulator,
            aggregator,
            estimator: CarbonEstimator::new(),
            backend,
        })
    }

    // ── Settings ────────────────────────────────────────────────────

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // ── Trip Tracking ───────────────────────────────────────────────

    /// Start tracking a vehicle. Any other tracked vehicle is stopped first.
    pub fn activate_vehicle(&self, vehicle_id: VehicleId) -> Result<(), CoreError> {
        self.accumulator.activate(vehicle_id)
    }

    /// Feed a position sample for the tracked vehicle.
    /// Returns `false` when the vehicle is not being tracked.
    pub fn record_sample(&self, vehicle_id: VehicleId, point: GeoPoint) -> bool {
        self.accumulator.on_sample(vehicle_id, point)
    }

    /// Stop tracking and return the finalized trip without submitting it.
    pub async fn deactivate_vehicle(&self, vehicle_id: VehicleId) -> Result<Trip, CoreError> {
        self.accumulator.deactivate(vehicle_id).await
    }

    /// The vehicle currently being tracked, if any.
    #[must_use]
    pub fn active_vehicle(&self) -> Option<VehicleId> {
        self.accumulator.active_vehicle()
    }

    /// Start point recorded for the vehicle's current session.
    #[must_use]
    pub fn start_point(&self, vehicle_id: VehicleId) -> Option<GeoPoint> {
        self.accumulator.start_point(vehicle_id)
    }

    /// Latest sample of the vehicle's current session.
    #[must_use]
    pub fn latest_point(&self, vehicle_id: VehicleId) -> Option<GeoPoint> {
        self.accumulator.latest_point(vehicle_id)
    }

    /// Send a finished trip to the backend.
    pub async fn submit_trip(&self, trip: &Trip) -> Result<TripLogPayload, CoreError> {
        let payload = TripLogPayload::from_trip(trip);
        self.backend.submit_trip(&payload).await?;
        Ok(payload)
    }

    /// Stop tracking, submit the trip, and estimate its emission.
    ///
    /// If the final position read fails nothing is submitted and the
    /// session is kept for a retry. If submission fails the trip is lost
    /// to this call; use [`deactivate_vehicle`](Self::deactivate_vehicle)
    /// and [`submit_trip`](Self::submit_trip) to retry submissions.
    pub async fn finish_trip(
        &self,
        vehicle_id: VehicleId,
        fuel: FuelType,
    ) -> Result<TripReport, CoreError> {
        let trip = self.accumulator.deactivate(vehicle_id).await?;
        let payload = self.submit_trip(&trip).await?;
        let estimated_emission = self.estimator.estimate_trip(payload.distance_km, fuel)?;

        info!(
            vehicle_id,
            distance_km = payload.distance_km,
            estimated_emission,
            "Trip recorded"
        );

        Ok(TripReport {
            trip,
            payload,
            estimated_emission,
        })
    }

    // ── Emission Estimates ──────────────────────────────────────────

    /// Emission estimate for a trip, before it is submitted.
    pub fn estimate_trip(&self, trip: &Trip, fuel: FuelType) -> Result<f64, CoreError> {
        self.estimator.estimate_trip(trip.distance_km(), fuel)
    }

    /// Emission estimate for running a device.
    pub fn estimate_device(&self, power_watts: f64, duration_hours: f64) -> Result<f64, CoreError> {
        self.estimator.estimate_device(power_watts, duration_hours)
    }

    // ── Charts ──────────────────────────────────────────────────────

    /// Fetch the monthly series from the backend and build the chart for
    /// the current month.
    pub async fn monthly_chart(&self) -> Result<MonthlySeries, CoreError> {
        self.monthly_chart_at(Utc::now().date_naive()).await
    }

    /// Fetch the monthly series and build the chart ending at `today`'s month.
    pub async fn monthly_chart_at(&self, today: NaiveDate) -> Result<MonthlySeries, CoreError> {
        let data = self.backend.fetch_monthly_carbon().await?;
        Ok(self.aggregator.aggregate_records(
            &data.monthly_vehicle_carbon,
            &data.monthly_electronic_carbon,
            today,
        ))
    }

    /// Chart plus the summary card numbers.
    pub async fn monthly_summary_at(
        &self,
        today: NaiveDate,
    ) -> Result<(MonthlySeries, CarbonSummary), CoreError> {
        let series = self.monthly_chart_at(today).await?;
        let summary = self.aggregator.summarize(&series);
        Ok((series, summary))
    }
}
