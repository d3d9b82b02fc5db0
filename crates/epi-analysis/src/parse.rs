//! Decoding of the end-of-run statistics block the simulation prints on exit.
//!
//! The block looks like this (the trailing `Quit` is optional and ignored):
//!
//! ```text
//! ==============================================================================
//! End-of-run statistics:
//! {"step":[0,1],"numAgentsAlive":[20,19],"numAgentsInfected":[2,3]}
//! Quit
//! ```
//!
//! Older simulation builds print `numAgentsAlive=<n>` and
//! `numAgentsInfected=<n>` on two lines instead of the JSON object, or a JSON
//! object holding plain numbers.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::AnalysisError;
use crate::result::{ScalarCounts, SeriesCounts, TrialResult, ALIVE_KEY, INFECTED_KEY, STEP_KEY};

/// Shortest run of `=` accepted as the end-of-run marker.
pub const MIN_MARKER_LEN: usize = 5;

fn is_marker(line: &str) -> bool {
    let line = line.trim_end();
    line.len() >= MIN_MARKER_LEN && line.bytes().all(|b| b == b'=')
}

/// Decodes the end-of-run statistics embedded in a captured trial log.
///
/// Pure: the same text always yields the same result and nothing is read or
/// written besides `text`.
pub fn parse_log(text: &str) -> Result<TrialResult, AnalysisError> {
    let mut lines = text.lines();
    lines
        .by_ref()
        .find(|line| is_marker(line))
        .ok_or(AnalysisError::MissingMarker)?;

    // Exactly one framing line ("End-of-run statistics:") follows the marker.
    lines.next().ok_or(AnalysisError::Truncated {
        expected: "the framing line after the marker",
    })?;

    let first = lines.next().ok_or(AnalysisError::Truncated {
        expected: "the end-of-run payload",
    })?;
    let trimmed = first.trim();
    if trimmed.is_empty() {
        return Err(AnalysisError::EmptyPayload);
    }
    if trimmed.starts_with('{') || !trimmed.contains('=') {
        parse_json_payload(trimmed)
    } else {
        parse_key_value_payload(trimmed, lines.next())
    }
}

/// Reads a log artifact from disk and decodes it with [`parse_log`].
pub fn parse_log_file(path: &Path) -> Result<TrialResult, AnalysisError> {
    let bytes = fs::read(path).map_err(|e| AnalysisError::io(path, e))?;
    parse_log(&String::from_utf8_lossy(&bytes))
}

fn parse_key_value_payload(
    first: &str,
    second: Option<&str>,
) -> Result<TrialResult, AnalysisError> {
    let alive = parse_key_value(first, ALIVE_KEY)?;
    let second = second.ok_or(AnalysisError::Truncated {
        expected: "the numAgentsInfected line",
    })?;
    let infected = parse_key_value(second, INFECTED_KEY)?;
    Ok(TrialResult::Scalar(ScalarCounts { alive, infected }))
}

fn parse_key_value(line: &str, expected: &'static str) -> Result<i64, AnalysisError> {
    let (key, value) = line
        .split_once('=')
        .ok_or_else(|| AnalysisError::UnexpectedKey {
            expected,
            found: line.trim().to_string(),
        })?;
    let key = key.trim();
    if key != expected {
        return Err(AnalysisError::UnexpectedKey {
            expected,
            found: key.to_string(),
        });
    }
    let value = value.trim();
    value
        .parse::<i64>()
        .map_err(|_| AnalysisError::MalformedValue {
            key: expected.to_string(),
            value: value.to_string(),
        })
}

fn parse_json_payload(line: &str) -> Result<TrialResult, AnalysisError> {
    let value: Value = serde_json::from_str(line)?;
    let object = match value {
        Value::Object(map) if !map.is_empty() => map,
        Value::Object(_) | Value::Null | Value::Bool(false) => {
            return Err(AnalysisError::EmptyPayload)
        }
        Value::Array(ref items) if items.is_empty() => return Err(AnalysisError::EmptyPayload),
        other => {
            return Err(AnalysisError::ShapeMismatch(format!(
                "expected a JSON object, found {}",
                json_type_name(&other)
            )))
        }
    };

    if object.contains_key(STEP_KEY) || object.values().any(Value::is_array) {
        let step = int_array(&object, STEP_KEY)?;
        let alive = int_array(&object, ALIVE_KEY)?;
        let infected = int_array(&object, INFECTED_KEY)?;
        let series = SeriesCounts {
            step,
            alive,
            infected,
        };
        series.validate()?;
        Ok(TrialResult::Series(series))
    } else {
        Ok(TrialResult::Scalar(ScalarCounts {
            alive: int_field(&object, ALIVE_KEY)?,
            infected: int_field(&object, INFECTED_KEY)?,
        }))
    }
}

fn int_field(object: &Map<String, Value>, key: &str) -> Result<i64, AnalysisError> {
    let value = object
        .get(key)
        .ok_or_else(|| AnalysisError::ShapeMismatch(format!("missing field '{}'", key)))?;
    value.as_i64().ok_or_else(|| AnalysisError::MalformedValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn int_array(object: &Map<String, Value>, key: &str) -> Result<Vec<i64>, AnalysisError> {
    let items = object
        .get(key)
        .ok_or_else(|| AnalysisError::ShapeMismatch(format!("missing array field '{}'", key)))?
        .as_array()
        .ok_or_else(|| AnalysisError::ShapeMismatch(format!("field '{}' is not an array", key)))?;
    items
        .iter()
        .map(|item| {
            item.as_i64().ok_or_else(|| AnalysisError::MalformedValue {
                key: key.to_string(),
                value: item.to_string(),
            })
        })
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str =
        "==============================================================================";

    fn log_with_payload(payload: &str) -> String {
        format!(
            "DiseaseSpread: seed=1 numAgentsInitial=20 disease=cold\n\
             Agent 3 ate\n\
             {}\n\
             End-of-run statistics:\n\
             {}\n\
             Quit\n",
            MARKER, payload
        )
    }

    #[test]
    fn parses_key_value_payload() {
        let text = "=====\nEnd-of-run statistics:\nnumAgentsAlive=15\nnumAgentsInfected=0\n";
        let result = parse_log(text).expect("parse");
        assert_eq!(
            result,
            TrialResult::Scalar(ScalarCounts {
                alive: 15,
                infected: 0
            })
        );
    }

    #[test]
    fn parses_scalar_json_payload() {
        let text = log_with_payload(r#"{"numAgentsAlive":12,"numAgentsInfected":4}"#);
        let result = parse_log(&text).expect("parse");
        assert_eq!(
            result,
            TrialResult::Scalar(ScalarCounts {
                alive: 12,
                infected: 4
            })
        );
    }

    #[test]
    fn parses_series_json_payload() {
        let text = log_with_payload(
            r#"{"step":[0,1,2],"numAgentsAlive":[20,19,19],"numAgentsInfected":[2,3,1]}"#,
        );
        match parse_log(&text).expect("parse") {
            TrialResult::Series(series) => {
                assert_eq!(series.step, vec![0, 1, 2]);
                assert_eq!(series.alive, vec![20, 19, 19]);
                assert_eq!(series.infected, vec![2, 3, 1]);
            }
            other => panic!("expected series, got {:?}", other),
        }
    }

    #[test]
    fn parse_is_repeatable() {
        let text = log_with_payload(r#"{"step":[0],"numAgentsAlive":[5],"numAgentsInfected":[1]}"#);
        assert_eq!(
            parse_log(&text).expect("first"),
            parse_log(&text).expect("second")
        );
    }

    #[test]
    fn missing_marker_is_reported() {
        let err = parse_log("Agent 1 ate\nnumAgentsAlive=3\n").expect_err("should fail");
        assert!(matches!(err, AnalysisError::MissingMarker));
    }

    #[test]
    fn short_runs_of_equals_are_not_markers() {
        let err = parse_log("===\nheader\nnumAgentsAlive=3\nnumAgentsInfected=1\n")
            .expect_err("should fail");
        assert!(matches!(err, AnalysisError::MissingMarker));
    }

    #[test]
    fn framing_line_is_skipped_even_when_it_looks_like_data() {
        let text = "=====\nnumAgentsAlive=99\nnumAgentsAlive=7\nnumAgentsInfected=2\n";
        assert_eq!(
            parse_log(text).expect("parse"),
            TrialResult::Scalar(ScalarCounts {
                alive: 7,
                infected: 2
            })
        );
    }

    #[test]
    fn handles_crlf_line_endings() {
        let text = "=====\r\nEnd-of-run statistics:\r\nnumAgentsAlive=8\r\nnumAgentsInfected=1\r\n";
        assert_eq!(
            parse_log(text).expect("parse"),
            TrialResult::Scalar(ScalarCounts {
                alive: 8,
                infected: 1
            })
        );
    }

    #[test]
    fn swapped_keys_are_rejected() {
        let text = "=====\nheader\nnumAgentsInfected=0\nnumAgentsAlive=15\n";
        match parse_log(text).expect_err("should fail") {
            AnalysisError::UnexpectedKey { expected, found } => {
                assert_eq!(expected, ALIVE_KEY);
                assert_eq!(found, INFECTED_KEY);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn non_integer_value_is_rejected() {
        let text = "=====\nheader\nnumAgentsAlive=fifteen\nnumAgentsInfected=0\n";
        assert!(matches!(
            parse_log(text).expect_err("should fail"),
            AnalysisError::MalformedValue { .. }
        ));
    }

    #[test]
    fn missing_second_key_value_line_is_truncated() {
        let text = "=====\nheader\nnumAgentsAlive=15\n";
        assert!(matches!(
            parse_log(text).expect_err("should fail"),
            AnalysisError::Truncated { .. }
        ));
    }

    #[test]
    fn log_ending_at_marker_is_truncated() {
        assert!(matches!(
            parse_log("noise\n=====\n").expect_err("should fail"),
            AnalysisError::Truncated { .. }
        ));
    }

    #[test]
    fn empty_payloads_are_rejected() {
        for payload in ["{}", "null", "false", ""] {
            let err = parse_log(&log_with_payload(payload)).expect_err(payload);
            assert!(
                matches!(err, AnalysisError::EmptyPayload),
                "{}: {:?}",
                payload,
                err
            );
        }
    }

    #[test]
    fn zero_length_series_is_empty() {
        let text = log_with_payload(r#"{"step":[],"numAgentsAlive":[],"numAgentsInfected":[]}"#);
        assert!(matches!(
            parse_log(&text).expect_err("should fail"),
            AnalysisError::EmptyPayload
        ));
    }

    #[test]
    fn ragged_series_is_a_shape_mismatch() {
        let text =
            log_with_payload(r#"{"step":[0,1],"numAgentsAlive":[15,14],"numAgentsInfected":[0]}"#);
        let err = parse_log(&text).expect_err("should fail");
        assert!(matches!(err, AnalysisError::ShapeMismatch(_)));
        assert!(err.to_string().contains("numAgentsInfected=1"), "{}", err);
    }

    #[test]
    fn series_missing_a_field_is_a_shape_mismatch() {
        let text = log_with_payload(r#"{"step":[0,1],"numAgentsAlive":[15,14]}"#);
        let err = parse_log(&text).expect_err("should fail");
        assert!(err.to_string().contains("numAgentsInfected"), "{}", err);
    }

    #[test]
    fn invalid_json_is_reported() {
        let text = log_with_payload(r#"{"numAgentsAlive":12,"#);
        assert!(matches!(
            parse_log(&text).expect_err("should fail"),
            AnalysisError::InvalidJson(_)
        ));
    }

    #[test]
    fn fractional_counts_are_malformed() {
        let text = log_with_payload(r#"{"numAgentsAlive":12.5,"numAgentsInfected":4}"#);
        assert!(matches!(
            parse_log(&text).expect_err("should fail"),
            AnalysisError::MalformedValue { .. }
        ));
    }

    #[test]
    fn parse_log_file_reads_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run00.log");
        fs::write(&path, log_with_payload(r#"{"numAgentsAlive":1,"numAgentsInfected":1}"#))
            .expect("write log");
        assert_eq!(
            parse_log_file(&path).expect("parse"),
            TrialResult::Scalar(ScalarCounts {
                alive: 1,
                infected: 1
            })
        );
        assert!(matches!(
            parse_log_file(&dir.path().join("missing.log")).expect_err("missing"),
            AnalysisError::Io { .. }
        ));
    }
}
