//! Geotech Q&A calculators
//!
//! Deterministic engineering formulas behind one contract: validated
//! parameters in, a `ComputationResult` out. Inputs are validated before any
//! arithmetic runs; an invalid parameter never reaches a formula.
//!
//! Calculators hold no state and may be called concurrently.

pub mod bearing_capacity;
pub mod settlement;

pub use bearing_capacity::{BearingCapacity, BearingCapacityParams};
pub use settlement::{Settlement, SettlementParams};

use geoqa_common::errors::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Parameter rejected before computation
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("invalid {parameter}: {message}")]
pub struct ValidationError {
    pub parameter: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            message: message.into(),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        let message = e.to_string();
        AppError::Validation {
            message,
            field: Some(e.parameter),
        }
    }
}

/// Which calculator produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculatorKind {
    BearingCapacity,
    Settlement,
}

impl CalculatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculatorKind::BearingCapacity => "bearing_capacity",
            CalculatorKind::Settlement => "settlement",
        }
    }

    /// Human-readable calculator name
    pub fn display_name(&self) -> &'static str {
        match self {
            CalculatorKind::BearingCapacity => "Terzaghi bearing capacity",
            CalculatorKind::Settlement => "Elastic settlement",
        }
    }
}

impl fmt::Display for CalculatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named value with its unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub name: String,
    pub symbol: String,
    pub value: f64,
    pub unit: String,
}

impl Quantity {
    pub fn new(name: &str, symbol: &str, value: f64, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            value,
            unit: unit.to_string(),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_empty() {
            write!(f, "{} = {}", self.symbol, self.value)
        } else {
            write!(f, "{} = {} {}", self.symbol, self.value, self.unit)
        }
    }
}

/// Output of a successful calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationResult {
    pub calculator: CalculatorKind,
    /// Validated inputs, in formula order
    pub inputs: Vec<Quantity>,
    /// Outputs; the first entry is the headline value
    pub outputs: Vec<Quantity>,
    pub formula: String,
    pub steps: Vec<String>,
    pub notes: Vec<String>,
}

impl ComputationResult {
    /// The headline output value
    pub fn primary(&self) -> Option<&Quantity> {
        self.outputs.first()
    }

    /// One-line statement of the headline result
    pub fn summary(&self) -> String {
        match self.primary() {
            Some(q) => format!("{} {} = {:.2} {}", q.name, q.symbol, q.value, q.unit),
            None => format!("{} produced no output", self.calculator.display_name()),
        }
    }
}

/// A deterministic formula over typed parameters
pub trait Calculator {
    type Params;

    fn kind(&self) -> CalculatorKind;

    /// Validate `params`, then evaluate the formula
    fn compute(&self, params: &Self::Params) -> Result<ComputationResult, ValidationError>;
}

/// A calculator selection together with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "calculator", rename_all = "snake_case")]
pub enum CalculationRequest {
    BearingCapacity(BearingCapacityParams),
    Settlement(SettlementParams),
}

impl CalculationRequest {
    pub fn kind(&self) -> CalculatorKind {
        match self {
            CalculationRequest::BearingCapacity(_) => CalculatorKind::BearingCapacity,
            CalculationRequest::Settlement(_) => CalculatorKind::Settlement,
        }
    }

    /// Check the parameters without evaluating the formula
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            CalculationRequest::BearingCapacity(params) => params.validate(),
            CalculationRequest::Settlement(params) => params.validate(),
        }
    }

    /// Dispatch to the matching calculator
    pub fn compute(&self) -> Result<ComputationResult, ValidationError> {
        match self {
            CalculationRequest::BearingCapacity(params) => BearingCapacity.compute(params),
            CalculationRequest::Settlement(params) => Settlement.compute(params),
        }
    }
}

/// Reject non-finite values; `parameter` names the offending input
pub(crate) fn require_finite(parameter: &str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::new(parameter, "must be a finite number"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoqa_common::errors::ErrorKind;

    #[test]
    fn test_validation_error_converts_to_client_error() {
        let err: AppError = ValidationError::new("B", "must be greater than 0").into();
        assert_eq!(err.kind(), ErrorKind::ClientError);
        match err {
            AppError::Validation { field, message } => {
                assert_eq!(field.as_deref(), Some("B"));
                assert!(message.contains("B"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_request_dispatch() {
        let request = CalculationRequest::Settlement(SettlementParams {
            load: 100.0,
            modulus: 10_000.0,
            width: None,
        });
        assert_eq!(request.kind(), CalculatorKind::Settlement);
        let result = request.compute().unwrap();
        assert_eq!(result.calculator, CalculatorKind::Settlement);
    }

    #[test]
    fn test_validate_without_computing() {
        let request = CalculationRequest::BearingCapacity(BearingCapacityParams {
            width: 2.0,
            unit_weight: 18.0,
            depth: 1.5,
            friction_angle: 50.0,
        });
        assert_eq!(request.validate().unwrap_err().parameter, "phi");
        assert_eq!(request.validate().unwrap_err(), request.compute().unwrap_err());
    }

    #[test]
    fn test_quantity_display() {
        assert_eq!(Quantity::new("width", "B", 2.0, "m").to_string(), "B = 2 m");
        assert_eq!(Quantity::new("factor", "Nq", 22.5, "").to_string(), "Nq = 22.5");
    }
}
