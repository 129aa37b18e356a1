use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub const UNKNOWN_CLINIC: &str = "Unknown Clinic";

/// Billing category a service code rolls up into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    Direct,
    Supervision,
}

/// Service code lists used to classify billing entries and certification hours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCodes {
    pub direct: Vec<String>,
    pub supervision: Vec<String>,
    pub certification: Vec<String>,
}

impl ServiceCodes {
    pub fn standard() -> Self {
        Self {
            direct: vec!["97153".to_string()],
            supervision: vec![
                "97155".to_string(),
                "Non-billable: PM Admin".to_string(),
                "PDS | BCBA".to_string(),
            ],
            certification: vec!["BACB Supervision".to_string()],
        }
    }

    pub fn classify(&self, code: &str) -> Option<ServiceCategory> {
        let code = code.trim();
        if self.direct.iter().any(|candidate| candidate == code) {
            Some(ServiceCategory::Direct)
        } else if self.supervision.iter().any(|candidate| candidate == code) {
            Some(ServiceCategory::Supervision)
        } else {
            None
        }
    }
}

impl Default for ServiceCodes {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateRangeError {
    #[error("date range {start}..{end} is empty")]
    Empty { start: NaiveDate, end: NaiveDate },
}

/// Half-open day range `[start, end)` bound into the warehouse queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if end <= start {
            return Err(DateRangeError::Empty { start, end });
        }
        Ok(Self { start, end })
    }

    /// First of the month through yesterday. On the first of a month this
    /// covers the whole previous month instead of an empty window.
    pub fn month_to_date(today: NaiveDate) -> Self {
        let end = today;
        let anchor = if today.day() == 1 {
            today - Duration::days(1)
        } else {
            today
        };
        let start = anchor.with_day(1).unwrap_or(anchor);
        Self { start, end }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn last_day(&self) -> NaiveDate {
        self.end - Duration::days(1)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {} (exclusive)", self.start, self.end)
    }
}

/// Raw billing entry as pulled from the warehouse. Every column is nullable
/// here; the transformer decides which rows are usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingRecord {
    #[serde(rename = "ClientContactId", default, deserialize_with = "empty_string_as_none")]
    pub client_id: Option<String>,
    #[serde(rename = "ClientFullName", default, deserialize_with = "empty_string_as_none")]
    pub client_name: Option<String>,
    #[serde(rename = "ProviderContactId", default, deserialize_with = "empty_string_as_none")]
    pub provider_id: Option<String>,
    #[serde(rename = "ProviderName", default, deserialize_with = "empty_string_as_none")]
    pub provider_name: Option<String>,
    #[serde(rename = "ServiceLocationName", default, deserialize_with = "empty_string_as_none")]
    pub service_location: Option<String>,
    #[serde(rename = "ServiceCode", default, deserialize_with = "empty_string_as_none")]
    pub service_code: Option<String>,
    #[serde(rename = "ServiceDate", default, deserialize_with = "lenient_date")]
    pub service_date: Option<NaiveDate>,
    #[serde(rename = "BilledHours", default, deserialize_with = "lenient_hours")]
    pub billed_hours: Option<f64>,
    /// Direct provider whose session this supervision row overlapped. When
    /// set, `billed_hours` is the overlap only.
    #[serde(rename = "SupervisedProviderId", default, deserialize_with = "empty_string_as_none")]
    pub supervised_provider_id: Option<String>,
    /// Location of the overlapped direct session.
    #[serde(
        rename = "SupervisedServiceLocation",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    pub supervised_service_location: Option<String>,
}

/// Certification-body supervision hours for one provider and period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificationRecord {
    #[serde(rename = "ProviderContactId", default, deserialize_with = "empty_string_as_none")]
    pub provider_id: Option<String>,
    #[serde(rename = "ProviderName", default, deserialize_with = "empty_string_as_none")]
    pub provider_name: Option<String>,
    #[serde(rename = "CertificationHours", default, deserialize_with = "lenient_hours")]
    pub certification_hours: Option<f64>,
    #[serde(rename = "PeriodStart", default, deserialize_with = "lenient_date")]
    pub period_start: Option<NaiveDate>,
    #[serde(rename = "PeriodEnd", default, deserialize_with = "lenient_date")]
    pub period_end: Option<NaiveDate>,
}

/// One row of the transformed artifact, keyed by provider and service location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderLocationGroup {
    #[serde(rename = "Clinic")]
    pub clinic: String,
    #[serde(rename = "DirectProviderId")]
    pub provider_id: String,
    #[serde(rename = "DirectProviderName")]
    pub provider_name: String,
    #[serde(rename = "ServiceLocationName")]
    pub service_location: String,
    #[serde(rename = "DirectHours")]
    pub direct_hours: f64,
    #[serde(rename = "SupervisionHours")]
    pub supervision_hours: f64,
    #[serde(rename = "SupervisionPct")]
    pub supervision_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    WithinRange,
    BelowMinimum,
    AboveMaximum,
}

impl ComplianceStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::WithinRange => "OK",
            Self::BelowMinimum => "Below minimum",
            Self::AboveMaximum => "Above maximum",
        }
    }
}

/// Expected band for the combined supervision percentage (fractions, not
/// whole percents).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComplianceRange {
    pub minimum: f64,
    pub maximum: Option<f64>,
}

impl ComplianceRange {
    pub fn assess(&self, pct: f64) -> ComplianceStatus {
        if pct < self.minimum {
            ComplianceStatus::BelowMinimum
        } else if self.maximum.is_some_and(|maximum| pct > maximum) {
            ComplianceStatus::AboveMaximum
        } else {
            ComplianceStatus::WithinRange
        }
    }
}

impl Default for ComplianceRange {
    fn default() -> Self {
        Self {
            minimum: 0.05,
            maximum: None,
        }
    }
}

/// Final report row: the transformed group plus certification-body hours.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub group: ProviderLocationGroup,
    pub certification_hours: f64,
    pub certification_matched: bool,
    pub combined_supervised_hours: f64,
    pub combined_pct: f64,
    pub compliance: ComplianceStatus,
}

/// `part / whole`, clamped to `[0, 1]`; zero when the whole is empty.
pub fn supervision_ratio(part: f64, whole: f64) -> f64 {
    if !part.is_finite() || !whole.is_finite() || whole <= 0.0 || part <= 0.0 {
        return 0.0;
    }
    (part / whole).clamp(0.0, 1.0)
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty()))
}

fn lenient_hours<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = empty_string_as_none(deserializer)?;
    Ok(opt
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|hours| hours.is_finite()))
}

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = empty_string_as_none(deserializer)?;
    Ok(opt.and_then(|value| {
        let date_part = value.get(..10).unwrap_or(&value);
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
    }))
}
