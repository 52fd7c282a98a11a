// Finding the latest usable values in a sparse, newest-first record set.
//
// Metrics in one API response go live on different dates: a change
// percentage needs two earlier data points, an age breakdown is published
// days after the headline count. Until then the key is still there but holds
// `null` or `[]`. Everything here works on "present" values only.
use crate::error::ExtractError;
use crate::types::{AgeGroupEntry, Record};
use serde_json::Value;

/// `null` and `[]` are placeholders, anything else counts.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

/// Index of the most recent record where `metric` is present.
pub fn first_index_with(records: &[Record], metric: &str) -> Option<usize> {
    records
        .iter()
        .position(|record| record.get(metric).is_some_and(is_present))
}

/// Index of the most recent record where every metric in `metrics` is
/// present at once.
///
/// That is the largest of the per-metric indices. If any metric is never
/// present there is no such record, and an empty set has no record either.
pub fn first_joint_index<S: AsRef<str>>(records: &[Record], metrics: &[S]) -> Option<usize> {
    let mut joint: Option<usize> = None;
    for metric in metrics {
        let index = first_index_with(records, metric.as_ref())?;
        joint = Some(joint.map_or(index, |j| j.max(index)));
    }
    joint
}

/// The record `offset` positions older than the joint index of `metrics`.
///
/// `Ok(None)` when the metrics never line up; `OutOfRange` when they do but
/// the set does not reach back far enough.
pub fn record_at_joint<'a, S: AsRef<str>>(
    records: &'a [Record],
    metrics: &[S],
    offset: usize,
) -> Result<Option<&'a Record>, ExtractError> {
    let Some(index) = first_joint_index(records, metrics) else {
        return Ok(None);
    };
    index
        .checked_add(offset)
        .and_then(|position| records.get(position))
        .map(Some)
        .ok_or(ExtractError::OutOfRange {
            index,
            offset,
            len: records.len(),
        })
}

/// Like [`record_at_joint`], but a missing joint record is an error.
pub fn require_joint<'a, S: AsRef<str>>(
    records: &'a [Record],
    metrics: &[S],
    offset: usize,
) -> Result<&'a Record, ExtractError> {
    record_at_joint(records, metrics, offset)?.ok_or_else(|| ExtractError::NoJointRecord {
        metrics: metrics.iter().map(|m| m.as_ref().to_string()).collect(),
    })
}

pub fn find_age_group<'a>(entries: &'a [AgeGroupEntry], label: &str) -> Option<&'a AgeGroupEntry> {
    entries
        .iter()
        .find(|entry| entry.age.as_deref() == Some(label))
}
