// Assembles the template context from the fetched record sets.
//
// Field names are fixed, templates depend on them. Primary-area fields carry
// no suffix; comparison fields end in `_<area key>`, e.g. `case_rate_london`.
// Every area goes through the same resolution, so a comparison area has
// exactly the fields the primary area has.
use crate::config::ReportConfig;
use crate::error::ExtractError;
use crate::extract::{find_age_group, require_joint};
use crate::types::{AreaRecords, ContextValue, Record, RenderContext};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Build the full context, or fail on the first value that cannot be
/// resolved.
pub fn build_context(
    config: &ReportConfig,
    primary: &AreaRecords,
    comparisons: &[AreaRecords],
    generated_at: DateTime<Utc>,
) -> Result<RenderContext, ExtractError> {
    let mut builder = ContextBuilder::new(config)?;
    builder.area(primary, None)?;
    for area in comparisons {
        builder.area(area, Some(area.area.key.as_str()))?;
    }
    Ok(builder.finish(generated_at))
}

/// Record offsets, relative to the joint cases record, of the two windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    days: usize,
    start: usize,
    previous_end: usize,
    previous_start: usize,
}

impl Window {
    fn new(days: usize) -> Result<Self, ExtractError> {
        let start = days.checked_sub(1);
        let previous_start = days.checked_mul(2).and_then(|d| d.checked_sub(1));
        match (start, previous_start) {
            (Some(start), Some(previous_start)) => Ok(Self {
                days,
                start,
                previous_end: days,
                previous_start,
            }),
            _ => Err(ExtractError::InvalidWindow { days }),
        }
    }
}

pub struct ContextBuilder<'a> {
    config: &'a ReportConfig,
    window: Window,
    ctx: RenderContext,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(config: &'a ReportConfig) -> Result<Self, ExtractError> {
        let window = Window::new(config.window_days)?;
        let days = i64::try_from(window.days)
            .map_err(|_| ExtractError::InvalidWindow { days: window.days })?;
        let mut ctx = RenderContext::default();
        ctx.insert("window_days", days);
        Ok(Self {
            config,
            window,
            ctx,
        })
    }

    /// Add one area's fields, suffixed with `key` unless it is the primary.
    pub fn area(&mut self, area: &AreaRecords, key: Option<&str>) -> Result<(), ExtractError> {
        self.ctx
            .insert(field("area_name", key), area.area.name.as_str());
        self.cases(&area.records, key)?;
        self.vaccinations(&area.records, key)?;
        debug!(area = %area.area.name, fields = self.ctx.len(), "resolved area");
        Ok(())
    }

    pub fn finish(mut self, generated_at: DateTime<Utc>) -> RenderContext {
        self.ctx.insert("generated_at", generated_at);
        self.ctx
    }

    fn cases(&mut self, records: &[Record], key: Option<&str>) -> Result<(), ExtractError> {
        let config = self.config;
        let metrics = &config.metrics;
        let group = metrics.cases();
        let window = self.window;

        // Current window ends on the joint record and spans `window.days`
        // records; the previous window is the same length, just before it.
        let current = require_joint(records, &group, 0)?;
        let window_start = require_joint(records, &group, window.start)?;
        let previous = require_joint(records, &group, window.previous_end)?;
        let previous_start = require_joint(records, &group, window.previous_start)?;

        let cases = current.number(&metrics.case_rolling_sum)?;
        let cases_previous = previous.number(&metrics.case_rolling_sum)?;

        self.put("cases_end_date", key, current.date()?);
        self.put("cases_start_date", key, window_start.date()?);
        self.put("cases", key, cases);
        self.put("case_rate", key, current.number(&metrics.case_rolling_rate)?);
        self.put(
            "case_change_percentage",
            key,
            current.number(&metrics.case_change_percentage)?,
        );
        self.put("cases_previous_end_date", key, previous.date()?);
        self.put("cases_previous_start_date", key, previous_start.date()?);
        self.put("cases_previous", key, cases_previous);
        self.put(
            "case_rate_previous",
            key,
            previous.number(&metrics.case_rolling_rate)?,
        );
        self.put("cases_change", key, cases - cases_previous);

        // The breakdown is in the joint group, so `current` carries a
        // non-empty one; a missing band is still an error.
        let entries = current.age_groups(&metrics.case_age_demographics)?;
        for band in &config.age_groups {
            let entry =
                find_age_group(&entries, &band.label).ok_or_else(|| ExtractError::NoAgeGroup {
                    label: band.label.clone(),
                    metric: metrics.case_age_demographics.clone(),
                    date: current.date.clone(),
                })?;
            let rate = entry.rolling_rate.ok_or_else(|| ExtractError::MissingMetric {
                metric: format!("{}[{}].rollingRate", metrics.case_age_demographics, band.label),
                date: current.date.clone(),
            })?;
            self.ctx
                .insert(field(&format!("case_rate_{}", band.field), key), rate);
        }
        Ok(())
    }

    fn vaccinations(&mut self, records: &[Record], key: Option<&str>) -> Result<(), ExtractError> {
        let doses = self.config.metrics.vaccinations();
        let current = require_joint(records, &doses, 0)?;

        self.put("vaccinations_date", key, current.date()?);
        for (n, metric) in doses.iter().enumerate() {
            self.ctx.insert(
                field(&format!("vaccinations_dose_{}", n + 1), key),
                current.number(metric)?,
            );
        }
        Ok(())
    }

    fn put(&mut self, base: &str, key: Option<&str>, value: impl Into<ContextValue>) {
        self.ctx.insert(field(base, key), value);
    }
}

fn field(base: &str, key: Option<&str>) -> String {
    match key {
        Some(key) => format!("{}_{}", base, key),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AreaConfig;
    use chrono::{NaiveDate, TimeZone};
    use serde_json::{json, Value};

    const DEMOGRAPHICS: &str = "newCasesBySpecimenDateAgeDemographics";
    const CHANGE: &str = "newCasesBySpecimenDateChangePercentage";

    fn date(s: &str) -> ContextValue {
        ContextValue::Date(NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap())
    }

    fn number_at(ctx: &RenderContext, field: &str) -> f64 {
        match ctx.get(field) {
            Some(ContextValue::Number(n)) => *n,
            other => panic!("{} is {:?}", field, other),
        }
    }

    fn generated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 6, 16, 9, 30, 0).unwrap()
    }

    /// `days` records, newest first from 2021-06-15, every metric set. The
    /// rate drops by one per day back from `rate`; the rolling sum is ten
    /// times the rate, the under-60 rate 20 above it, the 60+ rate half of it.
    fn series(days: usize, rate: f64) -> Vec<Record> {
        let start = NaiveDate::from_ymd_opt(2021, 6, 15).unwrap();
        (0..days)
            .map(|i| {
                let day = start - chrono::Duration::days(i as i64);
                let r = rate - i as f64;
                serde_json::from_value(json!({
                    "date": day.format("%Y-%m-%d").to_string(),
                    "newCasesBySpecimenDateRollingSum": r * 10.0,
                    "newCasesBySpecimenDateRollingRate": r,
                    "newCasesBySpecimenDateChangePercentage": 5.0,
                    "newCasesBySpecimenDateAgeDemographics": [
                        {"age": "00_59", "rollingRate": r + 20.0, "rollingSum": 800},
                        {"age": "60+", "rollingRate": r * 0.5, "rollingSum": 200},
                    ],
                    "cumVaccinationFirstDoseUptakeByPublishDatePercentage": 60.1,
                    "cumVaccinationSecondDoseUptakeByPublishDatePercentage": 45.2,
                    "cumVaccinationThirdInjectionUptakeByPublishDatePercentage": 10.3,
                }))
                .unwrap()
            })
            .collect()
    }

    fn set(records: &mut [Record], index: usize, metric: &str, value: Value) {
        records[index].metrics.insert(metric.to_string(), value);
    }

    /// Lewisham: age breakdown a day late, third dose two days late.
    /// London: change percentage a day late.
    /// England: age breakdown a day late.
    fn areas() -> (AreaRecords, Vec<AreaRecords>) {
        let config = ReportConfig::default();

        let mut lewisham = series(16, 100.0);
        set(&mut lewisham, 0, DEMOGRAPHICS, json!([]));
        for i in 0..2 {
            set(
                &mut lewisham,
                i,
                "cumVaccinationThirdInjectionUptakeByPublishDatePercentage",
                Value::Null,
            );
        }

        let mut london = series(16, 80.0);
        set(&mut london, 0, CHANGE, Value::Null);

        let mut england = series(16, 60.0);
        set(&mut england, 0, DEMOGRAPHICS, json!([]));

        let primary = AreaRecords {
            area: config.primary.clone(),
            records: lewisham,
        };
        let comparisons = vec![
            AreaRecords {
                area: config.comparisons[0].clone(),
                records: london,
            },
            AreaRecords {
                area: config.comparisons[1].clone(),
                records: england,
            },
        ];
        (primary, comparisons)
    }

    fn build(
        config: &ReportConfig,
        primary: &AreaRecords,
        comparisons: &[AreaRecords],
    ) -> Result<RenderContext, ExtractError> {
        build_context(config, primary, comparisons, generated_at())
    }

    #[test]
    fn builds_primary_fields() {
        let config = ReportConfig::default();
        let (primary, comparisons) = areas();
        let ctx = build(&config, &primary, &comparisons).unwrap();

        assert_eq!(
            ctx.get("area_name"),
            Some(&ContextValue::Text("Lewisham".into()))
        );
        assert_eq!(ctx.get("window_days"), Some(&ContextValue::Integer(7)));
        // Joint cases record is index 1 (2021-06-14).
        assert_eq!(ctx.get("cases_end_date"), Some(&date("2021-06-14")));
        assert_eq!(ctx.get("cases_start_date"), Some(&date("2021-06-08")));
        assert_eq!(number_at(&ctx, "cases"), 990.0);
        assert_eq!(number_at(&ctx, "case_rate"), 99.0);
        assert_eq!(number_at(&ctx, "case_change_percentage"), 5.0);
        assert_eq!(ctx.get("cases_previous_end_date"), Some(&date("2021-06-07")));
        assert_eq!(
            ctx.get("cases_previous_start_date"),
            Some(&date("2021-06-01"))
        );
        assert_eq!(number_at(&ctx, "cases_previous"), 920.0);
        assert_eq!(number_at(&ctx, "case_rate_previous"), 92.0);
        assert_eq!(number_at(&ctx, "cases_change"), 70.0);
        assert_eq!(number_at(&ctx, "case_rate_60s"), 49.5);
        assert_eq!(number_at(&ctx, "case_rate_00_59"), 119.0);
        assert_eq!(ctx.get("vaccinations_date"), Some(&date("2021-06-13")));
        assert_eq!(number_at(&ctx, "vaccinations_dose_3"), 10.3);
        assert_eq!(
            ctx.get("generated_at"),
            Some(&ContextValue::Timestamp(generated_at()))
        );
    }

    #[test]
    fn comparison_areas_get_the_same_windows() {
        let config = ReportConfig::default();
        let (primary, comparisons) = areas();
        let ctx = build(&config, &primary, &comparisons).unwrap();

        assert_eq!(
            ctx.get("area_name_london"),
            Some(&ContextValue::Text("London".into()))
        );
        assert_eq!(ctx.get("cases_end_date_london"), Some(&date("2021-06-14")));
        assert_eq!(ctx.get("cases_start_date_london"), Some(&date("2021-06-08")));
        assert_eq!(number_at(&ctx, "case_rate_london"), 79.0);
        assert_eq!(
            ctx.get("cases_previous_end_date_london"),
            Some(&date("2021-06-07"))
        );
        assert_eq!(
            ctx.get("cases_previous_start_date_london"),
            Some(&date("2021-06-01"))
        );
        assert_eq!(number_at(&ctx, "case_rate_previous_london"), 72.0);
        assert_eq!(number_at(&ctx, "cases_change_london"), 70.0);
        assert_eq!(number_at(&ctx, "case_rate_60s_london"), 39.5);
        assert_eq!(ctx.get("vaccinations_date_england"), Some(&date("2021-06-15")));
        assert_eq!(number_at(&ctx, "vaccinations_dose_1_england"), 60.1);
    }

    #[test]
    fn late_comparison_breakdown_is_read_from_the_older_record() {
        let config = ReportConfig::default();
        let (primary, comparisons) = areas();
        let ctx = build(&config, &primary, &comparisons).unwrap();

        // England's newest record has `[]` for the breakdown, so the whole
        // case group resolves one day back.
        assert_eq!(ctx.get("cases_end_date_england"), Some(&date("2021-06-14")));
        assert_eq!(number_at(&ctx, "case_rate_england"), 59.0);
        assert_eq!(number_at(&ctx, "case_rate_60s_england"), 29.5);
        assert_eq!(number_at(&ctx, "case_rate_00_59_england"), 79.0);
    }

    #[test]
    fn comparison_without_breakdown_fails_the_build() {
        let config = ReportConfig::default();
        let (primary, mut comparisons) = areas();
        for i in 0..16 {
            set(&mut comparisons[1].records, i, DEMOGRAPHICS, json!([]));
        }
        let err = build(&config, &primary, &comparisons).unwrap_err();
        assert!(matches!(err, ExtractError::NoJointRecord { ref metrics } if metrics.len() == 4));
    }

    #[test]
    fn comparison_missing_age_band_fails_the_build() {
        let config = ReportConfig::default();
        let (primary, mut comparisons) = areas();
        set(
            &mut comparisons[0].records,
            1,
            DEMOGRAPHICS,
            json!([{"age": "00_59", "rollingRate": 1.0}]),
        );
        let err = build(&config, &primary, &comparisons).unwrap_err();
        assert!(matches!(err, ExtractError::NoAgeGroup { ref label, .. } if label == "60+"));
    }

    #[test]
    fn same_inputs_give_same_context() {
        let config = ReportConfig::default();
        let (primary, comparisons) = areas();
        let a = build(&config, &primary, &comparisons).unwrap();
        let b = build(&config, &primary, &comparisons).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn short_history_is_out_of_range() {
        let config = ReportConfig::default();
        let (mut primary, comparisons) = areas();
        // Joint index 1 needs 2 * 7 - 1 more records behind it.
        primary.records.truncate(14);
        let err = build(&config, &primary, &comparisons).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::OutOfRange {
                index: 1,
                offset: 13,
                len: 14
            }
        ));
    }

    #[test]
    fn short_comparison_history_is_out_of_range() {
        let config = ReportConfig::default();
        let (primary, mut comparisons) = areas();
        comparisons[0].records.truncate(9);
        let err = build(&config, &primary, &comparisons).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::OutOfRange {
                index: 1,
                offset: 13,
                len: 9
            }
        ));
    }

    #[test]
    fn unusable_windows_are_rejected() {
        let (primary, comparisons) = areas();
        for days in [0, usize::MAX] {
            let config = ReportConfig {
                window_days: days,
                ..ReportConfig::default()
            };
            let err = build(&config, &primary, &comparisons).unwrap_err();
            assert!(matches!(err, ExtractError::InvalidWindow { days: d } if d == days));
        }
    }

    #[test]
    fn one_day_window_uses_adjacent_records() {
        let config = ReportConfig {
            window_days: 1,
            ..ReportConfig::default()
        };
        let (primary, comparisons) = areas();
        let ctx = build(&config, &primary, &comparisons).unwrap();
        assert_eq!(ctx.get("cases_start_date"), Some(&date("2021-06-14")));
        assert_eq!(ctx.get("cases_previous_end_date"), Some(&date("2021-06-13")));
        assert_eq!(number_at(&ctx, "cases_change"), 10.0);
    }

    #[test]
    fn missing_metric_group_fails_the_build() {
        let config = ReportConfig::default();
        let (primary, mut comparisons) = areas();
        for i in 0..16 {
            set(
                &mut comparisons[1].records,
                i,
                "cumVaccinationSecondDoseUptakeByPublishDatePercentage",
                Value::Null,
            );
        }
        let err = build(&config, &primary, &comparisons).unwrap_err();
        assert!(matches!(err, ExtractError::NoJointRecord { ref metrics } if metrics.len() == 3));
    }

    #[test]
    fn missing_primary_age_group_fails_the_build() {
        let mut config = ReportConfig::default();
        config
            .age_groups
            .push(crate::config::AgeGroupField::new("80+", "80s"));
        let (primary, comparisons) = areas();
        let err = build(&config, &primary, &comparisons).unwrap_err();
        assert!(matches!(err, ExtractError::NoAgeGroup { ref label, .. } if label == "80+"));
    }

    #[test]
    fn malformed_date_fails_the_build() {
        let config = ReportConfig::default();
        let (mut primary, comparisons) = areas();
        primary.records[1].date = "14/06/2021".to_string();
        let err = build(&config, &primary, &comparisons).unwrap_err();
        assert!(matches!(err, ExtractError::Format { .. }));
    }

    #[test]
    fn extra_comparison_area_gets_its_own_suffix() {
        let config = ReportConfig::default();
        let (primary, mut comparisons) = areas();
        comparisons.push(AreaRecords {
            area: AreaConfig::new("wales", "nation", "Wales"),
            records: series(16, 50.0),
        });
        let ctx = build(&config, &primary, &comparisons).unwrap();
        assert_eq!(number_at(&ctx, "case_rate_wales"), 50.0);
        assert_eq!(ctx.get("cases_start_date_wales"), Some(&date("2021-06-09")));
    }

    #[test]
    fn field_suffixes() {
        assert_eq!(field("case_rate", None), "case_rate");
        assert_eq!(field("case_rate", Some("london")), "case_rate_london");
    }
}
