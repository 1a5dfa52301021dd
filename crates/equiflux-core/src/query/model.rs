use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

static DURATION_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+(ns|u|µ|ms|s|m|h|d|w))+$").expect("duration pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Mean,
    Min,
    Max,
    Count,
    Median,
    Sum,
    Spread,
    Stddev,
    First,
    Last,
}

impl Aggregation {
    pub const ALL: [Aggregation; 10] = [
        Aggregation::Mean,
        Aggregation::Min,
        Aggregation::Max,
        Aggregation::Count,
        Aggregation::Median,
        Aggregation::Sum,
        Aggregation::Spread,
        Aggregation::Stddev,
        Aggregation::First,
        Aggregation::Last,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Mean => "mean",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Count => "count",
            Aggregation::Median => "median",
            Aggregation::Sum => "sum",
            Aggregation::Spread => "spread",
            Aggregation::Stddev => "stddev",
            Aggregation::First => "first",
            Aggregation::Last => "last",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self> {
        let wanted = value.trim();
        Aggregation::ALL
            .into_iter()
            .find(|aggregation| aggregation.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ServiceError::InvalidAggregation(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MathFunction {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl MathFunction {
    pub const ALL: [MathFunction; 4] = [
        MathFunction::Add,
        MathFunction::Subtract,
        MathFunction::Multiply,
        MathFunction::Divide,
    ];

    pub fn operator(&self) -> &'static str {
        match self {
            MathFunction::Add => "+",
            MathFunction::Subtract => "-",
            MathFunction::Multiply => "*",
            MathFunction::Divide => "/",
        }
    }

    /// Name used in the result alias, e.g. `AirPressure_Divide_DischargeRate`.
    pub fn name(&self) -> &'static str {
        match self {
            MathFunction::Add => "Add",
            MathFunction::Subtract => "Subtract",
            MathFunction::Multiply => "Multiply",
            MathFunction::Divide => "Divide",
        }
    }
}

impl fmt::Display for MathFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MathFunction {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self> {
        let wanted = value.trim();
        MathFunction::ALL
            .into_iter()
            .find(|function| {
                function.name().eq_ignore_ascii_case(wanted) || function.operator() == wanted
            })
            .ok_or_else(|| ServiceError::InvalidMathFunction(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum FillPolicy {
    #[default]
    Null,
    None,
    Previous,
    Linear,
    Value(f64),
}

impl FillPolicy {
    /// Blank means `null`; keywords are case-insensitive; anything else must
    /// be a finite number.
    pub fn parse(token: &str) -> Result<Self> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Ok(FillPolicy::Null);
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "null" => Ok(FillPolicy::Null),
            "none" => Ok(FillPolicy::None),
            "previous" => Ok(FillPolicy::Previous),
            "linear" => Ok(FillPolicy::Linear),
            _ => trimmed
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(FillPolicy::Value)
                .ok_or_else(|| ServiceError::InvalidFillPolicy(token.to_string())),
        }
    }

    pub fn token(&self) -> String {
        match self {
            FillPolicy::Null => "null".to_string(),
            FillPolicy::None => "none".to_string(),
            FillPolicy::Previous => "previous".to_string(),
            FillPolicy::Linear => "linear".to_string(),
            FillPolicy::Value(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBy {
    interval: String,
    fill: FillPolicy,
}

impl GroupBy {
    pub fn new(interval: impl Into<String>, fill: FillPolicy) -> Result<Self> {
        let interval = interval.into();
        let trimmed = interval.trim();
        if !DURATION_LITERAL.is_match(trimmed) {
            return Err(ServiceError::InvalidGroupInterval(interval));
        }
        Ok(Self {
            interval: trimmed.to_string(),
            fill,
        })
    }

    /// Interval plus an optional raw fill token (`None` means `null`).
    pub fn parse(interval: &str, fill: Option<&str>) -> Result<Self> {
        let fill = fill.map(FillPolicy::parse).transpose()?.unwrap_or_default();
        Self::new(interval, fill)
    }

    pub fn interval(&self) -> &str {
        &self.interval
    }

    pub fn fill(&self) -> FillPolicy {
        self.fill
    }
}

/// Episode mode. `Any` only adds the `Episode` tag to the selection; `Id`
/// also filters on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeFilter {
    Any,
    Id(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Selection {
    Field(String),
    Fields(Vec<String>),
    AllFields,
    Math {
        left: String,
        function: MathFunction,
        right: String,
    },
}
