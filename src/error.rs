use serde::Serialize;
use thiserror::Error;

use crate::models::AdminId;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("unknown formula '{0}' (expected raw-lambda or normalized-weighted)")]
    UnknownFormula(String),

    #[error("unknown activity mode '{0}' (expected at-least or exactly)")]
    UnknownActivityMode(String),

    #[error("an activity mode was given without a minimum call threshold")]
    ModeWithoutThreshold,
}

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("invalid log level/filter '{value}': unable to build EnvFilter")]
    EnvFilter {
        value: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("telemetry error: {0}")]
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

/// A record-level problem found while ingesting a snapshot.
///
/// These never abort a run: the offending record is repaired or the gap is
/// filled, and the issue is carried into the report.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataIssue {
    #[error("admin {admin_id}: {field} value {original} replaced with {replacement:?}")]
    InvalidEventData {
        admin_id: AdminId,
        field: &'static str,
        original: String,
        replacement: Option<f64>,
    },

    #[error("admin {admin_id} has no display name; using the identifier instead")]
    UnknownAdmin { admin_id: AdminId },
}
