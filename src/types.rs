use crate::config::AreaConfig;
use crate::error::ExtractError;
use crate::util::parse_iso_date;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tabled::Tabled;

/// Top level of an API response. Only `data` is used; `length`,
/// `maxPageLimit` and `pagination` are ignored.
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub data: Vec<Record>,
}

/// One dated row of an API response.
///
/// Every metric requested in `structure` shows up as a key, but the value
/// may be `null` or `[]` on dates the source has not computed it for yet.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Record {
    pub date: String,
    #[serde(flatten)]
    pub metrics: Map<String, Value>,
}

impl Record {
    pub fn get(&self, metric: &str) -> Option<&Value> {
        self.metrics.get(metric)
    }

    pub fn date(&self) -> Result<NaiveDate, ExtractError> {
        parse_iso_date(&self.date)
    }

    /// A numeric metric that must be set on this record.
    pub fn number(&self, metric: &str) -> Result<f64, ExtractError> {
        match self.get(metric) {
            None | Some(Value::Null) => Err(ExtractError::MissingMetric {
                metric: metric.to_string(),
                date: self.date.clone(),
            }),
            Some(value) => value.as_f64().ok_or_else(|| ExtractError::InvalidValue {
                metric: metric.to_string(),
                date: self.date.clone(),
                expected: "a number",
            }),
        }
    }

    /// The per-age-group breakdown stored under `metric`.
    ///
    /// Absent and `null` both read as an empty breakdown.
    pub fn age_groups(&self, metric: &str) -> Result<Vec<AgeGroupEntry>, ExtractError> {
        match self.get(metric) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => {
                serde_json::from_value(value.clone()).map_err(|_| ExtractError::InvalidValue {
                    metric: metric.to_string(),
                    date: self.date.clone(),
                    expected: "a list of age groups",
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AgeGroupEntry {
    #[serde(default)]
    pub age: Option<String>,
    #[serde(rename = "rollingRate", default)]
    pub rolling_rate: Option<f64>,
}

/// The records fetched for one area, most recent first.
#[derive(Debug, Clone)]
pub struct AreaRecords {
    pub area: AreaConfig,
    pub records: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContextValue {
    Number(f64),
    Integer(i64),
    Text(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Null,
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Number(n) => write!(f, "{}", n),
            ContextValue::Integer(n) => write!(f, "{}", n),
            ContextValue::Text(s) => f.write_str(s),
            ContextValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            ContextValue::Timestamp(t) => f.write_str(&t.to_rfc3339()),
            ContextValue::Null => f.write_str("null"),
        }
    }
}

impl From<f64> for ContextValue {
    fn from(n: f64) -> Self {
        ContextValue::Number(n)
    }
}

impl From<i64> for ContextValue {
    fn from(n: i64) -> Self {
        ContextValue::Integer(n)
    }
}

impl From<NaiveDate> for ContextValue {
    fn from(d: NaiveDate) -> Self {
        ContextValue::Date(d)
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::Text(s.to_string())
    }
}

impl From<DateTime<Utc>> for ContextValue {
    fn from(t: DateTime<Utc>) -> Self {
        ContextValue::Timestamp(t)
    }
}

impl<T: Into<ContextValue>> From<Option<T>> for ContextValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ContextValue::Null, Into::into)
    }
}

/// Flat field-name to value mapping handed to the template.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RenderContext(BTreeMap<String, ContextValue>);

impl RenderContext {
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<ContextValue>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&ContextValue> {
        self.0.get(field)
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn rows(&self) -> Vec<ContextRow> {
        self.0
            .iter()
            .map(|(field, value)| ContextRow {
                field: field.clone(),
                value: value.to_string(),
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ContextRow {
    #[serde(rename = "Field")]
    #[tabled(rename = "Field")]
    pub field: String,
    #[serde(rename = "Value")]
    #[tabled(rename = "Value")]
    pub value: String,
}
