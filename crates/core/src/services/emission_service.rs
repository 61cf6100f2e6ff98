use crate::errors::CoreError;
use crate::models::vehicle::FuelType;

/// Grid emission factor applied per kWh of device usage.
pub const GRID_FACTOR_PER_KWH: f64 = 0.475;

/// Emission factors the backend applies when it records a log.
///
/// Pure business logic, no I/O. Lets a client show what a trip or a
/// device session will cost before it is submitted.
pub struct CarbonEstimator;

impl CarbonEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Per-kilometer emission factor for a fuel type.
    pub fn vehicle_factor(&self, fuel: FuelType) -> f64 {
        match fuel {
            FuelType::Petrol => 0.161,
            FuelType::Diesel => 0.162,
            FuelType::Electric => 0.095,
            FuelType::None => 0.0,
        }
    }

    /// Emission of a trip of `distance_km` kilometers.
    pub fn estimate_trip(&self, distance_km: f64, fuel: FuelType) -> Result<f64, CoreError> {
        validate_non_negative("Distance", distance_km)?;
        Ok(distance_km * self.vehicle_factor(fuel))
    }

    /// Emission of running a `power_watts` device for `duration_hours`.
    pub fn estimate_device(&self, power_watts: f64, duration_hours: f64) -> Result<f64, CoreError> {
        validate_non_negative("Power", power_watts)?;
        validate_non_negative("Duration", duration_hours)?;
        Ok(power_watts / 1000.0 * duration_hours * GRID_FACTOR_PER_KWH)
    }
}

impl Default for CarbonEstimator {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_non_negative(what: &str, value: f64) -> Result<(), CoreError> {
    if !value.is_finite() || value < 0.0 {
        return Err(CoreError::ValidationError(format!(
            "{what} must be a finite, non-negative number, got {value}"
        )));
    }
    Ok(())
}
