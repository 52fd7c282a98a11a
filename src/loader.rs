use crate::config::{AreaConfig, ReportConfig};
use crate::error::ReportError;
use crate::types::{ApiResponse, AreaRecords, Record};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Fetched,
    Cached,
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub area: String,
    pub source: Source,
    pub records: usize,
    pub latest_date: Option<String>,
}

/// Load the primary area followed by each comparison area, either from the
/// API (writing each body through to the cache) or from the cache alone.
pub fn load_all(
    config: &ReportConfig,
    cached: bool,
) -> Result<(Vec<AreaRecords>, Vec<LoadReport>), ReportError> {
    let areas: Vec<&AreaConfig> = std::iter::once(&config.primary)
        .chain(&config.comparisons)
        .collect();
    let mut loaded = Vec::with_capacity(areas.len());
    let mut reports = Vec::with_capacity(areas.len());

    for (i, area) in areas.into_iter().enumerate() {
        let (body, source) = if cached {
            (read_cache(config, area)?, Source::Cached)
        } else {
            if i > 0 {
                std::thread::sleep(config.request_delay());
            }
            let body = fetch_area(config, area)?;
            write_cache(config, area, &body)?;
            (body, Source::Fetched)
        };

        let records = parse_records(&body, &area.name)?;
        if !is_newest_first(&records) {
            warn!(area = %area.name, "records are not in descending date order");
        }
        reports.push(LoadReport {
            area: area.name.clone(),
            source,
            records: records.len(),
            latest_date: records.first().map(|r| r.date.clone()),
        });
        loaded.push(AreaRecords {
            area: area.clone(),
            records,
        });
    }
    Ok((loaded, reports))
}

/// Query string parameters for one area, in request order.
pub fn query_params(area: &AreaConfig, metrics: &[String]) -> Vec<(&'static str, String)> {
    let columns: Vec<String> = std::iter::once("date")
        .chain(metrics.iter().map(String::as_str))
        .map(|c| format!("\"{}\"", c))
        .collect();
    vec![
        ("format", "json".to_string()),
        (
            "filters",
            format!("areaType={};areaName={}", area.area_type, area.name),
        ),
        ("structure", format!("[{}]", columns.join(","))),
    ]
}

pub fn fetch_area(config: &ReportConfig, area: &AreaConfig) -> Result<String, ReportError> {
    let mut request = ureq::get(&config.endpoint).timeout(config.timeout());
    for (key, value) in query_params(area, &config.metrics.all()) {
        request = request.query(key, &value);
    }
    info!(area = %area.name, url = %request.url(), "fetching");

    let response = match request.call() {
        Ok(response) => response,
        Err(ureq::Error::Status(status, response)) => {
            return Err(ReportError::Status {
                area: area.name.clone(),
                status,
                body: response.into_string().unwrap_or_default(),
            })
        }
        Err(e) => {
            return Err(ReportError::Transport {
                area: area.name.clone(),
                source: Box::new(e),
            })
        }
    };
    let body = response
        .into_string()
        .map_err(|e| ReportError::io(config.endpoint.as_str(), e))?;
    debug!(area = %area.name, "{}...", body.chars().take(256).collect::<String>());
    Ok(body)
}

pub fn write_cache(config: &ReportConfig, area: &AreaConfig, body: &str) -> Result<(), ReportError> {
    fs::create_dir_all(&config.data_dir).map_err(|e| ReportError::io(&config.data_dir, e))?;
    let path = config.cache_path(area);
    fs::write(&path, body).map_err(|e| ReportError::io(&path, e))?;
    debug!(path = %path.display(), "cached response");
    Ok(())
}

pub fn read_cache(config: &ReportConfig, area: &AreaConfig) -> Result<String, ReportError> {
    let path = config.cache_path(area);
    read_text(&path)
}

fn read_text(path: &Path) -> Result<String, ReportError> {
    fs::read_to_string(path).map_err(|e| ReportError::io(path, e))
}

pub fn parse_records(body: &str, area: &str) -> Result<Vec<Record>, ReportError> {
    let response: ApiResponse = serde_json::from_str(body)
        .map_err(|e| ReportError::json(format!("response for {}", area), e))?;
    Ok(response.data)
}

/// Dates compare correctly as strings in `YYYY-MM-DD` form.
pub fn is_newest_first(records: &[Record]) -> bool {
    records.windows(2).all(|pair| pair[0].date >= pair[1].date)
}
