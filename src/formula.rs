//! Scoring formulas.
//!
//! Every formula maps a [`MetricWindow`] to four additive [`ScoreTerms`];
//! the score is their sum and higher is always better.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::activity::ActivityThreshold;
use crate::error::ConfigError;
use crate::ingest::MAX_RATING;
use crate::models::{MetricWindow, NormalizedMetrics, ScoreTerms};

pub const DEFAULT_MAX_DELIVERY_TIME: f64 = 60.0;

pub trait ScoreFormula {
    fn name(&self) -> &'static str;

    /// Human-readable expression, written into report metadata.
    fn expression(&self) -> String;

    fn terms(&self, window: &MetricWindow) -> ScoreTerms;

    fn score(&self, window: &MetricWindow) -> f64 {
        self.terms(window).total()
    }

    fn normalize(&self, _window: &MetricWindow) -> Option<NormalizedMetrics> {
        None
    }

    /// Admins failing this threshold are removed before scoring.
    fn activity_threshold(&self) -> Option<ActivityThreshold> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormulaKind {
    RawLambda,
    NormalizedWeighted,
}

impl FromStr for FormulaKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "raw-lambda" | "raw" | "lambda" => Ok(Self::RawLambda),
            "normalized-weighted" | "normalized" | "experiment" => Ok(Self::NormalizedWeighted),
            other => Err(ConfigError::UnknownFormula(other.to_string())),
        }
    }
}

impl fmt::Display for FormulaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RawLambda => f.write_str("raw-lambda"),
            Self::NormalizedWeighted => f.write_str("normalized-weighted"),
        }
    }
}

/// No delivery data contributes nothing, and neither does a delivery time
/// too small for its inverse to be finite.
pub fn delivery_inverse(cdt50: f64) -> f64 {
    let inverse = 1.0 / cdt50;
    if cdt50 > 0.0 && inverse.is_finite() {
        inverse
    } else {
        0.0
    }
}

/// Zero leave requests is the best possible value.
pub fn leave_inverse(lr1m: u32) -> f64 {
    if lr1m > 0 {
        1.0 / f64::from(lr1m)
    } else {
        1.0
    }
}

/// `lambda = cr50 + 1/cdt50 + r50 + 1/lr1m`
#[derive(Debug, Clone, Copy, Default)]
pub struct RawLambdaFormula;

impl ScoreFormula for RawLambdaFormula {
    fn name(&self) -> &'static str {
        "raw-lambda"
    }

    fn expression(&self) -> String {
        "lambda = cr50 + 1/cdt50 + r50 + 1/lr1m".to_string()
    }

    fn terms(&self, window: &MetricWindow) -> ScoreTerms {
        ScoreTerms {
            call_rating: window.cr50,
            delivery: delivery_inverse(window.cdt50),
            chat_rating: window.r50,
            leave: leave_inverse(window.lr1m),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedWeights {
    pub call_rating: f64,
    pub chat_rating: f64,
    pub delivery: f64,
    pub leave: f64,
}

impl Default for NormalizedWeights {
    fn default() -> Self {
        Self {
            call_rating: 2.0,
            chat_rating: 2.0,
            delivery: 1.0,
            leave: 1.0,
        }
    }
}

impl FromStr for NormalizedWeights {
    type Err = ConfigError;

    // call_rating,chat_rating,delivery,leave
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidValue {
            name: "weights",
            expected: "four finite non-negative numbers separated by commas",
            value: value.to_string(),
        };

        let parsed = value
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|_| invalid())?;

        match parsed.as_slice() {
            [call_rating, chat_rating, delivery, leave]
                if parsed.iter().all(|w| w.is_finite() && *w >= 0.0) =>
            {
                Ok(Self {
                    call_rating: *call_rating,
                    chat_rating: *chat_rating,
                    delivery: *delivery,
                    leave: *leave,
                })
            }
            _ => Err(invalid()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NormalizedWeightedFormula {
    pub weights: NormalizedWeights,
    /// Delivery time (minutes) at or below which the delivery term saturates.
    pub max_delivery_time: f64,
}

impl Default for NormalizedWeightedFormula {
    fn default() -> Self {
        Self {
            weights: NormalizedWeights::default(),
            max_delivery_time: DEFAULT_MAX_DELIVERY_TIME,
        }
    }
}

impl NormalizedWeightedFormula {
    fn normalized(&self, window: &MetricWindow) -> NormalizedMetrics {
        let cdt_norm = if window.cdt50 > 0.0 {
            (self.max_delivery_time / window.cdt50).min(1.0)
        } else {
            1.0
        };

        NormalizedMetrics {
            cr_norm: (window.cr50 / MAX_RATING).clamp(0.0, 1.0),
            r_norm: (window.r50 / MAX_RATING).clamp(0.0, 1.0),
            cdt_norm,
            lr_norm: 1.0 / (f64::from(window.lr1m) + 1.0),
        }
    }
}

impl ScoreFormula for NormalizedWeightedFormula {
    fn name(&self) -> &'static str {
        "normalized-weighted"
    }

    fn expression(&self) -> String {
        let w = &self.weights;
        format!(
            "exp_lambda = {}*cr50/5 + {}*r50/5 + {}*min({}/cdt50, 1) + {}*1/(lr1m + 1)",
            w.call_rating, w.chat_rating, w.delivery, self.max_delivery_time, w.leave
        )
    }

    fn terms(&self, window: &MetricWindow) -> ScoreTerms {
        let n = self.normalized(window);
        ScoreTerms {
            call_rating: self.weights.call_rating * n.cr_norm,
            delivery: self.weights.delivery * n.cdt_norm,
            chat_rating: self.weights.chat_rating * n.r_norm,
            leave: self.weights.leave * n.lr_norm,
        }
    }

    fn normalize(&self, window: &MetricWindow) -> Option<NormalizedMetrics> {
        Some(self.normalized(window))
    }
}

pub struct MinActivityFormula {
    inner: Box<dyn ScoreFormula>,
    threshold: ActivityThreshold,
}

impl MinActivityFormula {
    pub fn new(inner: Box<dyn ScoreFormula>, threshold: ActivityThreshold) -> Self {
        Self { inner, threshold }
    }
}

impl ScoreFormula for MinActivityFormula {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn expression(&self) -> String {
        format!("{} (admins with {})", self.inner.expression(), self.threshold)
    }

    fn terms(&self, window: &MetricWindow) -> ScoreTerms {
        self.inner.terms(window)
    }

    fn normalize(&self, window: &MetricWindow) -> Option<NormalizedMetrics> {
        self.inner.normalize(window)
    }

    fn activity_threshold(&self) -> Option<ActivityThreshold> {
        Some(self.threshold)
    }
}

pub fn build(
    kind: FormulaKind,
    weights: NormalizedWeights,
    max_delivery_time: f64,
    min_activity: Option<ActivityThreshold>,
) -> Box<dyn ScoreFormula> {
    let base: Box<dyn ScoreFormula> = match kind {
        FormulaKind::RawLambda => Box::new(RawLambdaFormula),
        FormulaKind::NormalizedWeighted => Box::new(NormalizedWeightedFormula {
            weights,
            max_delivery_time,
        }),
    };

    match min_activity {
        Some(threshold) => Box::new(MinActivityFormula::new(base, threshold)),
        None => base,
    }
}
