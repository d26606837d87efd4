use std::env;
use std::path::PathBuf;

use crate::activity::{ActivityMode, ActivityThreshold};
use crate::error::ConfigError;
use crate::formula::{self, FormulaKind, NormalizedWeights, ScoreFormula, DEFAULT_MAX_DELIVERY_TIME};
use crate::window::{WindowAggregator, DEFAULT_LEAVE_WINDOW_DAYS, DEFAULT_WINDOW_SIZE, MAX_LEAVE_WINDOW_DAYS};

/// Top-level configuration for the tool.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub output_dir: PathBuf,
    pub ranking: RankingConfig,
}

impl AppConfig {
    /// Reads `.env` (if any) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let log_level = lookup("ADMIN_RANKING_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let output_dir = lookup("ADMIN_RANKING_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut ranking = RankingConfig::default();
        if let Some(value) = lookup("ADMIN_RANKING_FORMULA") {
            ranking.formula = value.parse()?;
        }
        if let Some(value) = lookup("ADMIN_RANKING_WINDOW_SIZE") {
            ranking.window_size = parse_number("ADMIN_RANKING_WINDOW_SIZE", "a positive integer", &value)?;
        }
        if let Some(value) = lookup("ADMIN_RANKING_LEAVE_WINDOW_DAYS") {
            ranking.leave_window_days =
                parse_number("ADMIN_RANKING_LEAVE_WINDOW_DAYS", "a positive number of days", &value)?;
        }
        if let Some(value) = lookup("ADMIN_RANKING_WEIGHTS") {
            ranking.weights = value.parse()?;
        }
        if let Some(value) = lookup("ADMIN_RANKING_MAX_DELIVERY_TIME") {
            ranking.max_delivery_time =
                parse_number("ADMIN_RANKING_MAX_DELIVERY_TIME", "a positive number of minutes", &value)?;
        }

        let min_calls = lookup("ADMIN_RANKING_MIN_CALLS")
            .map(|value| parse_number("ADMIN_RANKING_MIN_CALLS", "a non-negative integer", &value))
            .transpose()?;
        let mode = lookup("ADMIN_RANKING_MIN_CALLS_MODE")
            .map(|value| value.parse::<ActivityMode>())
            .transpose()?;
        ranking.min_activity = activity_threshold(min_calls, mode)?;

        ranking.validate()?;

        Ok(Self {
            log_level,
            output_dir,
            ranking,
        })
    }
}

/// The knobs that shape a single ranking run.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingConfig {
    pub formula: FormulaKind,
    pub min_activity: Option<ActivityThreshold>,
    pub window_size: usize,
    pub leave_window_days: i64,
    pub weights: NormalizedWeights,
    pub max_delivery_time: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            formula: FormulaKind::RawLambda,
            min_activity: None,
            window_size: DEFAULT_WINDOW_SIZE,
            leave_window_days: DEFAULT_LEAVE_WINDOW_DAYS,
            weights: NormalizedWeights::default(),
            max_delivery_time: DEFAULT_MAX_DELIVERY_TIME,
        }
    }
}

impl RankingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "window size",
                expected: "at least 1",
                value: self.window_size.to_string(),
            });
        }
        if !(1..=MAX_LEAVE_WINDOW_DAYS).contains(&self.leave_window_days) {
            return Err(ConfigError::InvalidValue {
                name: "leave window",
                expected: "between 1 and 36500 days",
                value: self.leave_window_days.to_string(),
            });
        }
        if !(self.max_delivery_time.is_finite() && self.max_delivery_time > 0.0) {
            return Err(ConfigError::InvalidValue {
                name: "max delivery time",
                expected: "a finite number above 0",
                value: self.max_delivery_time.to_string(),
            });
        }
        let w = &self.weights;
        if [w.call_rating, w.chat_rating, w.delivery, w.leave]
            .iter()
            .any(|weight| !weight.is_finite() || *weight < 0.0)
        {
            return Err(ConfigError::InvalidValue {
                name: "weights",
                expected: "finite and non-negative",
                value: format!("{},{},{},{}", w.call_rating, w.chat_rating, w.delivery, w.leave),
            });
        }
        Ok(())
    }

    pub fn aggregator(&self) -> WindowAggregator {
        WindowAggregator::new(self.window_size, self.leave_window_days)
    }

    pub fn formula(&self) -> Box<dyn ScoreFormula> {
        formula::build(self.formula, self.weights, self.max_delivery_time, self.min_activity)
    }
}

/// Combines a threshold and a mode; a mode on its own is meaningless.
pub fn activity_threshold(
    min_calls: Option<usize>,
    mode: Option<ActivityMode>,
) -> Result<Option<ActivityThreshold>, ConfigError> {
    match (min_calls, mode) {
        (Some(threshold), mode) => Ok(Some(ActivityThreshold {
            threshold,
            mode: mode.unwrap_or(ActivityMode::AtLeast),
        })),
        (None, Some(_)) => Err(ConfigError::ModeWithoutThreshold),
        (None, None) => Ok(None),
    }
}

fn parse_number<T: std::str::FromStr>(
    name: &'static str,
    expected: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        name,
        expected,
        value: value.to_string(),
    })
}
