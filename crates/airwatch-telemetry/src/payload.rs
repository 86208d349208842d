//! ---
//! awm_section: "02-telemetry-acquisition"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Telemetry acquisition pipeline and job scheduling."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper bound on raw text carried inside an `Unknown` payload.
const MAX_RAW_LEN: usize = 1000;

/// One raw reading as emitted by the metering reader. Every field is kept
/// loose here; coercion and validation happen per record in
/// [`crate::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub device_gid: Option<Value>,
    #[serde(default)]
    pub channel_num: Option<Value>,
    #[serde(default)]
    pub channel_name: Option<Value>,
    #[serde(default, rename = "usage_kWh")]
    pub usage_kwh: Option<Value>,
    #[serde(default, rename = "usage_W")]
    pub usage_w: Option<Value>,
    #[serde(default)]
    pub percentage: Option<Value>,
}

/// The reader's discriminated document, decoded into one variant per
/// upstream `status` value. Anything unrecognised lands in `Unknown` with
/// the raw text preserved for diagnosis; decoding itself never fails.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderPayload {
    Success {
        execution_time: Option<f64>,
        data: Vec<RawReading>,
    },
    ApiError {
        message: String,
        execution_time: Option<f64>,
        timestamp: Option<String>,
    },
    NoInternet {
        message: String,
        timestamp: Option<String>,
    },
    DeviceDisconnected {
        message: String,
        suggestion: Option<String>,
        timestamp: Option<String>,
    },
    Unknown {
        raw: String,
    },
}

#[derive(Deserialize)]
struct SuccessDoc {
    #[serde(default)]
    execution_time: Option<f64>,
    #[serde(default)]
    data: Vec<RawReading>,
}

#[derive(Deserialize)]
struct ErrorDoc {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    execution_time: Option<f64>,
    #[serde(default)]
    suggestion: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

impl ReaderPayload {
    /// Decode the reader's stdout. Strict JSON parsing is tried first; on
    /// failure all control characters are stripped and parsing retried once
    /// (readers have been seen emitting stray terminal escapes). Text that
    /// still does not parse is preserved as `Unknown`.
    pub fn decode(text: &str) -> Self {
        let value = match serde_json::from_str::<Value>(text) {
            Ok(value) => value,
            Err(first_err) => {
                let sanitized: String = text.chars().filter(|c| !c.is_control()).collect();
                match serde_json::from_str::<Value>(&sanitized) {
                    Ok(value) => {
                        tracing::debug!(error = %first_err, "payload parsed after control-character sanitize");
                        value
                    }
                    Err(_) => return Self::unknown(text),
                }
            }
        };
        Self::from_value(value, text)
    }

    fn from_value(value: Value, raw: &str) -> Self {
        let status = value
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        match status.as_str() {
            "success" => match serde_json::from_value::<SuccessDoc>(value) {
                Ok(doc) => ReaderPayload::Success {
                    execution_time: doc.execution_time,
                    data: doc.data,
                },
                Err(_) => Self::unknown(raw),
            },
            "api_error" => match serde_json::from_value::<ErrorDoc>(value) {
                Ok(doc) => ReaderPayload::ApiError {
                    message: doc.message.unwrap_or_default(),
                    execution_time: doc.execution_time,
                    timestamp: doc.timestamp,
                },
                Err(_) => Self::unknown(raw),
            },
            "no_internet" => match serde_json::from_value::<ErrorDoc>(value) {
                Ok(doc) => ReaderPayload::NoInternet {
                    message: doc.message.unwrap_or_default(),
                    timestamp: doc.timestamp,
                },
                Err(_) => Self::unknown(raw),
            },
            "dispositivo_desconectado" => match serde_json::from_value::<ErrorDoc>(value) {
                Ok(doc) => ReaderPayload::DeviceDisconnected {
                    message: doc.message.unwrap_or_default(),
                    suggestion: doc.suggestion,
                    timestamp: doc.timestamp,
                },
                Err(_) => Self::unknown(raw),
            },
            _ => Self::unknown(raw),
        }
    }

    fn unknown(raw: &str) -> Self {
        let mut truncated = raw.trim().to_owned();
        if truncated.len() > MAX_RAW_LEN {
            let mut end = MAX_RAW_LEN;
            while !truncated.is_char_boundary(end) {
                end -= 1;
            }
            truncated.truncate(end);
        }
        ReaderPayload::Unknown { raw: truncated }
    }
}
