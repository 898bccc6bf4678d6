// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;
use telemetry_relay::{Fields, LogLevel, LogSource};

/// One newline-delimited JSON event read from stdin:
///
/// `{"source":"FRIDA","level":"info","message":"attached","fields":{"pid":4312}}`
///
/// `source` accepts member or wire names; `level` defaults to INFO.
#[derive(Debug, Deserialize)]
struct RawEvent {
    source: String,
    #[serde(default)]
    level: Option<String>,
    message: String,
    #[serde(default)]
    fields: Fields,
}

#[derive(Debug, PartialEq)]
pub struct InputEvent {
    pub source: LogSource,
    pub level: LogLevel,
    pub message: String,
    pub fields: Fields,
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Field(String),
}

pub fn parse_line(line: &str) -> Result<InputEvent, EventError> {
    let raw: RawEvent = serde_json::from_str(line)?;
    let source = raw.source.parse::<LogSource>().map_err(EventError::Field)?;
    let level = raw
        .level
        .map(|level| level.parse::<LogLevel>())
        .transpose()
        .map_err(EventError::Field)?
        .unwrap_or_default();
    Ok(InputEvent {
        source,
        level,
        message: raw.message,
        fields: raw.fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_event() {
        let event = parse_line(
            r#"{"source":"FRIDA","level":"error","message":"attach failed","fields":{"pid":4312}}"#,
        )
        .unwrap();
        assert_eq!(event.source, LogSource::Frida);
        assert_eq!(event.level, LogLevel::Error);
        assert_eq!(event.message, "attach failed");
        assert_eq!(event.fields["pid"], json!(4312));
    }

    #[test]
    fn test_defaults() {
        let event = parse_line(r#"{"source":"th_system","message":"hello"}"#).unwrap();
        assert_eq!(event.level, LogLevel::Info);
        assert!(event.fields.is_empty());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(parse_line("not json"), Err(EventError::Json(_))));
        assert!(matches!(
            parse_line(r#"{"source":"nowhere","message":"x"}"#),
            Err(EventError::Field(_))
        ));
        assert!(matches!(
            parse_line(r#"{"source":"SYSTEM","level":"loud","message":"x"}"#),
            Err(EventError::Field(_))
        ));
    }
}
