// Report configuration.
//
// Everything that used to be hard-wired in the page script: the API
// endpoint, which areas to query, the metric names per category, the age
// groups to break out, the look-back window and where files go. Defaults
// reproduce the Lewisham / London / England page; a JSON file can override
// any subset of fields.
use crate::error::ReportError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Pause between consecutive area requests.
    pub request_delay_ms: u64,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub template: PathBuf,
    pub primary: AreaConfig,
    pub comparisons: Vec<AreaConfig>,
    pub metrics: MetricNames,
    pub age_groups: Vec<AgeGroupField>,
    /// Length of the rolling window, in records (one record per day).
    pub window_days: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.coronavirus.data.gov.uk/v1/data".to_string(),
            timeout_secs: 10,
            request_delay_ms: 1000,
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            template: PathBuf::from("templates/report.html.hbs"),
            primary: AreaConfig::new("lewisham", "ltla", "Lewisham"),
            comparisons: vec![
                AreaConfig::new("london", "region", "London"),
                AreaConfig::new("england", "nation", "England"),
            ],
            metrics: MetricNames::default(),
            age_groups: vec![
                AgeGroupField::new("00_59", "00_59"),
                AgeGroupField::new("60+", "60s"),
            ],
            window_days: 7,
        }
    }
}

impl ReportConfig {
    /// Defaults, overlaid with the JSON file at `path` if one is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ReportError> {
        let config = match path {
            Some(path) => {
                let text =
                    std::fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
                serde_json::from_str(&text)
                    .map_err(|e| ReportError::json(path.display().to_string(), e))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReportError> {
        if self.window_days == 0 {
            return Err(ReportError::Config("window_days must be at least 1".into()));
        }
        if self.metrics.vaccination_doses.is_empty() {
            return Err(ReportError::Config(
                "at least one vaccination dose metric is required".into(),
            ));
        }
        let mut keys = HashSet::new();
        for area in std::iter::once(&self.primary).chain(&self.comparisons) {
            if area.key.is_empty() {
                return Err(ReportError::Config(format!(
                    "area `{}` needs a non-empty key",
                    area.name
                )));
            }
            if !keys.insert(area.key.as_str()) {
                return Err(ReportError::Config(format!(
                    "area key `{}` is used twice",
                    area.key
                )));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn cache_path(&self, area: &AreaConfig) -> PathBuf {
        self.data_dir.join(format!("{}.json", area.key))
    }

    pub fn report_dir(&self) -> PathBuf {
        self.output_dir.join("text")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AreaConfig {
    /// Used for cache file names and as the context field suffix.
    pub key: String,
    /// API `areaType`, e.g. `ltla`, `region`, `nation`.
    pub area_type: String,
    /// API `areaName`.
    pub name: String,
}

impl AreaConfig {
    pub fn new(key: &str, area_type: &str, name: &str) -> Self {
        Self {
            key: key.to_string(),
            area_type: area_type.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricNames {
    pub case_rolling_sum: String,
    pub case_rolling_rate: String,
    pub case_change_percentage: String,
    pub case_age_demographics: String,
    /// Uptake percentages, first dose first.
    pub vaccination_doses: Vec<String>,
}

impl Default for MetricNames {
    fn default() -> Self {
        Self {
            case_rolling_sum: "newCasesBySpecimenDateRollingSum".to_string(),
            case_rolling_rate: "newCasesBySpecimenDateRollingRate".to_string(),
            case_change_percentage: "newCasesBySpecimenDateChangePercentage".to_string(),
            case_age_demographics: "newCasesBySpecimenDateAgeDemographics".to_string(),
            vaccination_doses: vec![
                "cumVaccinationFirstDoseUptakeByPublishDatePercentage".to_string(),
                "cumVaccinationSecondDoseUptakeByPublishDatePercentage".to_string(),
                "cumVaccinationThirdInjectionUptakeByPublishDatePercentage".to_string(),
            ],
        }
    }
}

impl MetricNames {
    /// Metrics that must line up for an area's case figures, age breakdown
    /// included.
    pub fn cases(&self) -> Vec<String> {
        vec![
            self.case_rolling_sum.clone(),
            self.case_rolling_rate.clone(),
            self.case_change_percentage.clone(),
            self.case_age_demographics.clone(),
        ]
    }

    pub fn vaccinations(&self) -> Vec<String> {
        self.vaccination_doses.clone()
    }

    /// Every metric to request, in `structure` order.
    pub fn all(&self) -> Vec<String> {
        let mut all = self.cases();
        all.extend(self.vaccinations());
        all
    }
}

/// An age band to break out of the case demographics.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AgeGroupField {
    /// Label as published, e.g. `60+`.
    pub label: String,
    /// Suffix of the `case_rate_*` field, e.g. `60s`.
    pub field: String,
}

impl AgeGroupField {
    pub fn new(label: &str, field: &str) -> Self {
        Self {
            label: label.to_string(),
            field: field.to_string(),
        }
    }
}
