use serde::{Deserialize, Serialize};

use super::emission::MonthKey;

/// A single data point of the monthly carbon chart.
///
/// The frontend renders these as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPoint {
    /// The calendar month this point covers
    pub month: MonthKey,

    /// Short month name for the x-axis ("Jan", "Feb", ...)
    pub label: String,

    /// Summed emission of every source for this month (0 for gap months)
    pub value: f64,
}

impl MonthlyPoint {
    pub fn new(month: MonthKey, value: f64) -> Self {
        Self {
            month,
            label: month.label().to_string(),
            value,
        }
    }
}

/// Chart-ready monthly series: chronological, contiguous, no duplicate
/// months, at most six entries.
pub type MonthlySeries = Vec<MonthlyPoint>;

/// Headline numbers shown next to the monthly chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarbonSummary {
    /// Sum over every month in the series
    pub total: f64,

    /// `total / months`, or 0 for an empty series
    pub average_per_month: f64,

    /// The month with the highest value (earliest wins on ties)
    pub peak: Option<MonthlyPoint>,

    /// Number of months covered
    pub months: usize,
}
