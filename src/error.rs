use std::path::PathBuf;
use thiserror::Error;

/// Failures while pulling values out of a record set.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("could not parse date `{text}` with format `{format}`: {source}")]
    Format {
        text: String,
        format: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("no record has all of [{}] available", .metrics.join(", "))]
    NoJointRecord { metrics: Vec<String> },
    #[error("no `{label}` age group in `{metric}` on {date}")]
    NoAgeGroup {
        label: String,
        metric: String,
        date: String,
    },
    #[error("`{metric}` is missing on {date}")]
    MissingMetric { metric: String, date: String },
    #[error("`{metric}` on {date} is not {expected}")]
    InvalidValue {
        metric: String,
        date: String,
        expected: &'static str,
    },
    #[error("a look-back window of {days} records cannot be used")]
    InvalidWindow { days: usize },
    #[error("looking back {offset} records from record {index} runs past the {len} available")]
    OutOfRange {
        index: usize,
        offset: usize,
        len: usize,
    },
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("could not access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {what}: {source}")]
    Json {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("request for {area} failed with status {status}: {body}")]
    Status {
        area: String,
        status: u16,
        body: String,
    },
    #[error("request for {area} failed: {source}")]
    Transport {
        area: String,
        #[source]
        source: Box<ureq::Error>,
    },
    #[error(transparent)]
    Template(#[from] handlebars::RenderError),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl ReportError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(what: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            what: what.into(),
            source,
        }
    }
}
