//! Validator: inbound JSON to validated raw samples
//!
//! The batch is rejected wholesale on the first failure; no bucketing starts
//! until every entry has a parseable timestamp and an integer reading.

use crate::error::IngestError;
use crate::schema::payload::*;
use crate::types::{RawSample, SeriesKind};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Adapter for converting inbound payloads to raw samples
pub struct PayloadAdapter;

impl PayloadAdapter {
    /// Parse a JSON request body into validated samples
    pub fn parse(body: &str, kind: SeriesKind) -> Result<Vec<RawSample>, IngestError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| IngestError::MalformedPayload(e.to_string()))?;
        Ok(Self::from_value(&value, kind)?)
    }

    /// Parse NDJSON where every non-blank line is one array-form entry
    pub fn parse_ndjson(ndjson: &str, kind: SeriesKind) -> Result<Vec<RawSample>, IngestError> {
        let value = Self::ndjson_to_value(ndjson)?;
        Ok(Self::from_value(&value, kind)?)
    }

    /// Collect NDJSON lines into a JSON array
    pub fn ndjson_to_value(ndjson: &str) -> Result<Value, IngestError> {
        let mut items = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let item = serde_json::from_str::<Value>(trimmed).map_err(|e| {
                IngestError::MalformedPayload(format!("Failed to parse line {}: {}", line_num + 1, e))
            })?;
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    /// Validate an already parsed payload
    pub fn from_value(value: &Value, kind: SeriesKind) -> Result<Vec<RawSample>, ValidationError> {
        match IncomingPayload::from_value(value, kind)? {
            IncomingPayload::Parallel(payload) => Self::from_parallel(&payload, kind),
            IncomingPayload::Items(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| Self::from_item(item, kind, index))
                .collect(),
        }
    }

    fn from_parallel(payload: &ParallelPayload, kind: SeriesKind) -> Result<Vec<RawSample>, ValidationError> {
        let username = checked_username(&payload.username, None)?;

        let timestamps: Vec<&str> = payload
            .timestamps
            .split(LIST_SEPARATOR)
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let values = payload.values.entries();

        if timestamps.len() != values.len() {
            return Err(ValidationError::LengthMismatch {
                label: kind.label().to_string(),
                timestamps: timestamps.len(),
                values: values.len(),
            });
        }

        timestamps
            .iter()
            .zip(values.iter())
            .enumerate()
            .map(|(position, (timestamp, value))| {
                Ok(RawSample {
                    username: username.clone(),
                    timestamp: parse_timestamp(timestamp, position)?,
                    value: parse_reading(value, kind, position)?,
                })
            })
            .collect()
    }

    fn from_item(item: &SampleItem, kind: SeriesKind, index: usize) -> Result<RawSample, ValidationError> {
        Ok(RawSample {
            username: checked_username(&item.username, Some(index))?,
            timestamp: parse_timestamp(item.timestamp.trim(), index)?,
            value: parse_reading(&item.value, kind, index)?,
        })
    }

    /// Validate every entry independently and report the failing ones
    pub fn validate_entries(value: &Value, kind: SeriesKind) -> Vec<EntryValidation> {
        match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .filter_map(|(index, item)| {
                    let result = SampleItem::from_value(item, kind, index)
                        .and_then(|decoded| Self::from_item(&decoded, kind, index));
                    result.err().map(|error| EntryValidation { index, error })
                })
                .collect(),
            other => Self::from_value(other, kind)
                .err()
                .map(|error| vec![EntryValidation { index: 0, error }])
                .unwrap_or_default(),
        }
    }

    /// Number of entries a payload carries, for validation reports
    pub fn entry_count(value: &Value, kind: SeriesKind) -> usize {
        match value {
            Value::Array(items) => items.len(),
            other => match IncomingPayload::from_value(other, kind) {
                Ok(IncomingPayload::Parallel(payload)) => payload.values.entries().len(),
                _ => 1,
            },
        }
    }
}

/// Validation failure of a single entry
#[derive(Debug)]
pub struct EntryValidation {
    pub index: usize,
    pub error: ValidationError,
}

fn checked_username(username: &str, index: Option<usize>) -> Result<String, ValidationError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyUsername { index });
    }
    Ok(trimmed.to_string())
}

/// Parse an ISO-8601 instant that carries an offset (`Z` or `±hh:mm`)
pub fn parse_timestamp(raw: &str, position: usize) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ValidationError::InvalidTimestamp {
            position,
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a reading into an integer and apply the per-series sign rule
pub fn parse_reading(
    field: &NumericField,
    kind: SeriesKind,
    position: usize,
) -> Result<i64, ValidationError> {
    let not_an_integer = || ValidationError::NotAnInteger {
        position,
        field: kind.value_field().to_string(),
        value: field.display(),
    };

    let value = match field {
        NumericField::Integer(i) => *i,
        NumericField::Float(f) => integral(*f).ok_or_else(not_an_integer)?,
        NumericField::Text(text) => {
            let trimmed = text.trim();
            match trimmed.parse::<i64>() {
                Ok(i) => i,
                Err(_) => {
                    let parsed = trimmed.parse::<f64>().map_err(|_| ValidationError::NonNumericValue {
                        position,
                        field: kind.value_field().to_string(),
                        value: trimmed.to_string(),
                    })?;
                    if !parsed.is_finite() {
                        return Err(ValidationError::NonNumericValue {
                            position,
                            field: kind.value_field().to_string(),
                            value: trimmed.to_string(),
                        });
                    }
                    integral(parsed).ok_or_else(not_an_integer)?
                }
            }
        }
    };

    if kind == SeriesKind::Steps && value < 0 {
        return Err(ValidationError::NegativeSteps { position, value });
    }

    Ok(value)
}

fn integral(value: f64) -> Option<i64> {
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;
    (value.is_finite() && value.fract() == 0.0 && in_range).then_some(value as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_parallel_steps() {
        let body = r#"{
            "username": "testuser_new",
            "timestamp": "2025-12-01T11:00:00Z\n2025-12-01T12:00:00Z",
            "steps": "5000\n6000"
        }"#;

        let samples = PayloadAdapter::parse(body, SeriesKind::Steps).unwrap();
        assert_eq!(
            samples,
            vec![
                RawSample {
                    username: "testuser_new".to_string(),
                    timestamp: Utc.with_ymd_and_hms(2025, 12, 1, 11, 0, 0).unwrap(),
                    value: 5000,
                },
                RawSample {
                    username: "testuser_new".to_string(),
                    timestamp: Utc.with_ymd_and_hms(2025, 12, 1, 12, 0, 0).unwrap(),
                    value: 6000,
                },
            ]
        );
    }

    #[test]
    fn test_parse_single_heart_rate_with_offset() {
        let body = r#"{ "username": "testuser_jest", "timestamp": "2025-12-01T12:00:30+02:00", "bpm": "160" }"#;

        let samples = PayloadAdapter::parse(body, SeriesKind::HeartRate).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 160);
        assert_eq!(
            samples[0].timestamp,
            Utc.with_ymd_and_hms(2025, 12, 1, 10, 0, 30).unwrap()
        );
    }

    #[test]
    fn test_parse_item_array() {
        let body = r#"[
            { "username": "a", "timestamp": "2025-12-01T10:00:00Z", "bpm": 120 },
            { "username": "b", "timestamp": "2025-12-01T10:00:10.250Z", "bpm": 99.0 }
        ]"#;

        let samples = PayloadAdapter::parse(body, SeriesKind::HeartRate).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].username, "b");
        assert_eq!(samples[1].value, 99);
    }

    #[test]
    fn test_malformed_json_is_distinct_from_validation() {
        let err = PayloadAdapter::parse("not valid json", SeriesKind::Steps).unwrap_err();
        assert!(matches!(err, IngestError::MalformedPayload(_)));

        let err = PayloadAdapter::parse(r#"{"username": "u"}"#, SeriesKind::Steps).unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[test]
    fn test_length_mismatch() {
        let body = r#"{
            "username": "testuser_mismatch",
            "timestamp": "2025-12-01T11:00:00Z\n2025-12-01T12:00:00Z",
            "steps": "1000"
        }"#;

        let err = PayloadAdapter::parse(body, SeriesKind::Steps).unwrap_err();
        assert!(err
            .to_string()
            .contains("Timestamp and Steps arrays must have the same length after parsing."));
    }

    #[test]
    fn test_non_numeric_value() {
        let body = r#"{
            "username": "testuser_invalid_steps",
            "timestamp": "2025-12-01T11:00:00Z\n2025-12-01T12:00:00Z",
            "steps": "1000\nabc"
        }"#;

        let err = PayloadAdapter::parse(body, SeriesKind::Steps).unwrap_err();
        match err {
            IngestError::Validation(ValidationError::NonNumericValue { position, value, .. }) => {
                assert_eq!(position, 1);
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_negative_steps_rejected() {
        let body = r#"[{ "username": "u", "timestamp": "2025-12-01T11:00:00Z", "steps": -5 }]"#;
        let err = PayloadAdapter::parse(body, SeriesKind::Steps).unwrap_err();
        assert!(matches!(
            err,
            IngestError::Validation(ValidationError::NegativeSteps { value: -5, .. })
        ));
    }

    #[test]
    fn test_out_of_range_bpm_flows_through() {
        let body = r#"[
            { "username": "u", "timestamp": "2025-12-01T11:00:00Z", "bpm": 0 },
            { "username": "u", "timestamp": "2025-12-01T11:01:00Z", "bpm": -12 },
            { "username": "u", "timestamp": "2025-12-01T11:02:00Z", "bpm": 400 }
        ]"#;

        let samples = PayloadAdapter::parse(body, SeriesKind::HeartRate).unwrap();
        let values: Vec<i64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![0, -12, 400]);
    }

    #[test]
    fn test_fractional_bpm_rejected() {
        let body = r#"[{ "username": "u", "timestamp": "2025-12-01T11:00:00Z", "bpm": "72.5" }]"#;
        let err = PayloadAdapter::parse(body, SeriesKind::HeartRate).unwrap_err();
        assert!(matches!(
            err,
            IngestError::Validation(ValidationError::NotAnInteger { .. })
        ));
    }

    #[test]
    fn test_timestamp_without_offset_rejected() {
        let body = r#"[{ "username": "u", "timestamp": "2025-12-01T11:00:00", "bpm": 80 }]"#;
        let err = PayloadAdapter::parse(body, SeriesKind::HeartRate).unwrap_err();
        assert!(matches!(
            err,
            IngestError::Validation(ValidationError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_empty_username_rejected() {
        let body = r#"{ "username": "  ", "timestamp": "2025-12-01T11:00:00Z", "bpm": 80 }"#;
        let err = PayloadAdapter::parse(body, SeriesKind::HeartRate).unwrap_err();
        assert!(matches!(
            err,
            IngestError::Validation(ValidationError::EmptyUsername { index: None })
        ));
    }

    #[test]
    fn test_parse_ndjson() {
        let ndjson = r#"{ "username": "a", "timestamp": "2025-12-01T10:00:00Z", "steps": 100 }

{ "username": "b", "timestamp": "2025-12-01T10:30:00Z", "steps": "250" }
"#;
        let samples = PayloadAdapter::parse_ndjson(ndjson, SeriesKind::Steps).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].value, 250);

        let err = PayloadAdapter::parse_ndjson("{ broken", SeriesKind::Steps).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_validate_entries_reports_each_failure() {
        let value: Value = serde_json::from_str(
            r#"[
                { "username": "a", "timestamp": "2025-12-01T10:00:00Z", "steps": 100 },
                { "username": "b", "timestamp": "yesterday", "steps": 100 },
                { "timestamp": "2025-12-01T10:00:00Z", "steps": 100 }
            ]"#,
        )
        .unwrap();

        let failures = PayloadAdapter::validate_entries(&value, SeriesKind::Steps);
        let indices: Vec<usize> = failures.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(PayloadAdapter::entry_count(&value, SeriesKind::Steps), 3);
    }
}
