use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ConfigError;
use crate::models::MetricWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityMode {
    AtLeast,
    Exactly,
}

impl FromStr for ActivityMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "at-least" | "at_least" | "atleast" => Ok(Self::AtLeast),
            "exactly" | "exact" => Ok(Self::Exactly),
            other => Err(ConfigError::UnknownActivityMode(other.to_string())),
        }
    }
}

impl fmt::Display for ActivityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtLeast => f.write_str("at-least"),
            Self::Exactly => f.write_str("exactly"),
        }
    }
}

/// Minimum-activity requirement on an admin's raw call count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActivityThreshold {
    pub threshold: usize,
    pub mode: ActivityMode,
}

impl ActivityThreshold {
    pub fn admits(&self, call_count: usize) -> bool {
        match self.mode {
            ActivityMode::AtLeast => call_count >= self.threshold,
            ActivityMode::Exactly => call_count == self.threshold,
        }
    }
}

impl fmt::Display for ActivityThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} calls", self.mode, self.threshold)
    }
}

/// Keeps the windows whose raw call count satisfies `threshold`.
///
/// Counts come from `total_calls`, not the capped window, so an admin with
/// 120 calls passes an "exactly 50" filter only if they had exactly 50.
pub fn filter(windows: Vec<MetricWindow>, threshold: ActivityThreshold) -> Vec<MetricWindow> {
    windows
        .into_iter()
        .filter(|window| threshold.admits(window.total_calls))
        .collect()
}
