use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::CoreError;

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A calendar month (year + month). Day and time-of-day are discarded.
///
/// Ordering is chronological: field order (year, then month) drives the
/// derived `Ord`. Every constructor, deserialization included, goes
/// through [`MonthKey::new`], so `month` is always in `1..=12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawMonthKey")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

#[derive(Deserialize)]
struct RawMonthKey {
    year: i32,
    month: u32,
}

impl TryFrom<RawMonthKey> for MonthKey {
    type Error = CoreError;

    fn try_from(raw: RawMonthKey) -> Result<Self, Self::Error> {
        MonthKey::new(raw.year, raw.month)
    }
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self, CoreError> {
        if !(1..=12).contains(&month) {
            return Err(CoreError::ValidationError(format!(
                "Month must be in 1..=12, got {month}"
            )));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// 1..=12
    pub fn month(&self) -> u32 {
        self.month
    }

    /// The month containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The following calendar month.
    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Months since year 0, for month arithmetic.
    pub fn ordinal(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    /// Inverse of [`MonthKey::ordinal`].
    pub fn from_ordinal(ordinal: i64) -> Self {
        Self {
            year: ordinal.div_euclid(12) as i32,
            month: ordinal.rem_euclid(12) as u32 + 1,
        }
    }

    /// Short English month name ("Jan" .. "Dec").
    pub fn label(&self) -> &'static str {
        MONTH_LABELS[self.month as usize - 1]
    }

    /// Parse the `month` field sent by the backend.
    ///
    /// Accepts RFC 3339 timestamps, naive `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD`
    /// and `YYYY-MM`. Timestamps are bucketed by the date as written, in
    /// their own offset, never converted to another zone first.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let raw = raw.trim();

        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Self::from_date(ts.date_naive()));
        }
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(Self::from_date(ts.date()));
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(Self::from_date(date));
        }
        if let Ok(date) = NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d") {
            return Ok(Self::from_date(date));
        }

        Err(CoreError::MalformedSample(format!(
            "Unparseable month '{raw}'"
        )))
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// One emission value attributed to a calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmissionSample {
    pub month: MonthKey,
    pub value_grams: f64,
}

impl EmissionSample {
    pub fn new(month: MonthKey, value_grams: f64) -> Self {
        Self { month, value_grams }
    }
}

impl TryFrom<&MonthlyCarbonRecord> for EmissionSample {
    type Error = CoreError;

    fn try_from(record: &MonthlyCarbonRecord) -> Result<Self, Self::Error> {
        let month = MonthKey::parse(&record.month)?;
        if !record.total_carbon_emission_g.is_finite() {
            return Err(CoreError::MalformedSample(format!(
                "Non-finite emission value for {}",
                record.month
            )));
        }
        Ok(Self::new(month, record.total_carbon_emission_g))
    }
}

/// Monthly total as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCarbonRecord {
    /// Timestamp of the month bucket (usually the first instant of the month)
    pub month: String,

    pub total_carbon_emission_g: f64,
}

/// The two monthly series the dashboard chart is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCarbonData {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub monthly_vehicle_carbon: Vec<MonthlyCarbonRecord>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub monthly_electronic_carbon: Vec<MonthlyCarbonRecord>,
}

// The backend sends `null` instead of `[]` for users with no logs.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<MonthlyCarbonRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<MonthlyCarbonRecord>>::deserialize(deserializer)?.unwrap_or_default())
}
