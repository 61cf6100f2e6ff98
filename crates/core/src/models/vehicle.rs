use serde::{Deserialize, Serialize};

/// Fuel a vehicle runs on. Determines the per-kilometer emission factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelType {
    Petrol,
    Diesel,
    Electric,
    /// Human-powered (bicycle, walking)
    None,
}

impl std::fmt::Display for FuelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FuelType::Petrol => write!(f, "petrol"),
            FuelType::Diesel => write!(f, "diesel"),
            FuelType::Electric => write!(f, "electric"),
            FuelType::None => write!(f, "none"),
        }
    }
}
