use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::models::chart::{CarbonSummary, MonthlyPoint, MonthlySeries};
use crate::models::emission::{EmissionSample, MonthKey, MonthlyCarbonRecord};
use crate::models::settings::DEFAULT_CHART_MONTHS;

/// Builds the monthly carbon chart from the vehicle and electronics series.
///
/// The frontend only renders what this returns.
/// Output is contiguous from the earliest observed month through the
/// current month, gap months are zero, and only the trailing window
/// (six months by default) is kept.
pub struct MonthlyCarbonAggregator {
    window: usize,
}

impl MonthlyCarbonAggregator {
    pub fn new() -> Self {
        Self {
            window: DEFAULT_CHART_MONTHS,
        }
    }

    /// Use a narrower window. Clamped to `1..=6`.
    pub fn with_window(months: usize) -> Self {
        Self {
            window: months.clamp(1, DEFAULT_CHART_MONTHS),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Aggregate against today's UTC date.
    pub fn aggregate(&self, series_a: &[EmissionSample], series_b: &[EmissionSample]) -> MonthlySeries {
        self.aggregate_at(series_a, series_b, Utc::now().date_naive())
    }

    /// Aggregate with an explicit "today", which fixes the last month of the range.
    pub fn aggregate_at(
        &self,
        series_a: &[EmissionSample],
        series_b: &[EmissionSample],
        today: NaiveDate,
    ) -> MonthlySeries {
        // 1–2. Concatenate and sum per calendar month
        let mut totals: BTreeMap<MonthKey, f64> = BTreeMap::new();
        for sample in series_a.iter().chain(series_b) {
            *totals.entry(sample.month).or_insert(0.0) += sample.value_grams;
        }

        // 3. Range: earliest observed month → current month
        let Some(first) = totals.keys().next().copied() else {
            return Vec::new();
        };
        let current = MonthKey::from_date(today);

        if let Some(last) = totals.keys().next_back() {
            if *last > current {
                debug!(latest = %last, current = %current, "Samples after the current month are not charted");
            }
        }

        // 4–5. Walk month by month, zero-filling gaps. Months older than the
        // trailing window would be truncated anyway, so the walk starts there.
        let window_start = MonthKey::from_ordinal(current.ordinal() - (self.window as i64 - 1));
        let mut month = first.max(window_start);
        let mut series = Vec::with_capacity(self.window);
        while month <= current {
            let value = totals.get(&month).copied().unwrap_or(0.0);
            series.push(MonthlyPoint::new(month, value));
            month = month.succ();
        }
        series
    }

    /// Convert backend records leniently and aggregate them.
    ///
    /// A record with an unparseable month or a non-finite value is dropped
    /// (and logged); the rest of the chart is still produced.
    pub fn aggregate_records(
        &self,
        vehicle: &[MonthlyCarbonRecord],
        electronic: &[MonthlyCarbonRecord],
        today: NaiveDate,
    ) -> MonthlySeries {
        let vehicle = Self::to_samples("vehicle", vehicle);
        let electronic = Self::to_samples("electronic", electronic);
        self.aggregate_at(&vehicle, &electronic, today)
    }

    /// Totals for the summary cards shown next to the chart.
    pub fn summarize(&self, series: &[MonthlyPoint]) -> CarbonSummary {
        let total: f64 = series.iter().map(|p| p.value).sum();
        let months = series.len();
        let average_per_month = if months > 0 {
            total / months as f64
        } else {
            0.0
        };

        let mut peak: Option<&MonthlyPoint> = None;
        for point in series {
            let higher = match peak {
                Some(p) => point.value > p.value,
                None => true,
            };
            if higher {
                peak = Some(point);
            }
        }

        CarbonSummary {
            total,
            average_per_month,
            peak: peak.cloned(),
            months,
        }
    }

    fn to_samples(source: &str, records: &[MonthlyCarbonRecord]) -> Vec<EmissionSample> {
        records
            .iter()
            .filter_map(|record| match EmissionSample::try_from(record) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    warn!(source, error = %e, "Dropping malformed emission record");
                    None
                }
            })
            .collect()
    }
}

impl Default for MonthlyCarbonAggregator {
    fn default() -> Self {
        Self::new()
    }
}
