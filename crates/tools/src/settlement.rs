//! Simplified elastic settlement
//!
//! `s = load / (E · B) × 1000` in millimetres, with `B = 1 m` when no width
//! is supplied.

use crate::{require_finite, Calculator, CalculatorKind, ComputationResult, Quantity, ValidationError};
use serde::{Deserialize, Serialize};

pub const MAX_LOAD_KN: f64 = 1e6;
pub const MAX_MODULUS_KPA: f64 = 1e9;
/// Smaller inputs are almost always a unit mistake (N for kN, MPa for kPa)
pub const MIN_LOAD_KN: f64 = 0.1;
pub const MIN_MODULUS_KPA: f64 = 100.0;
pub const MAX_WIDTH_M: f64 = 100.0;
pub const DEFAULT_WIDTH_M: f64 = 1.0;

/// Inputs for the settlement calculator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SettlementParams {
    /// Applied load (kN)
    pub load: f64,
    /// Young's modulus E (kPa)
    pub modulus: f64,
    /// Foundation width B (m)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
}

impl SettlementParams {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let load = require_finite("load", self.load)?;
        if load <= 0.0 {
            return Err(ValidationError::new("load", format!("applied load must be greater than 0 kN, got {}", load)));
        }
        if load < MIN_LOAD_KN {
            return Err(ValidationError::new("load", format!("applied load below {} kN looks like a unit error, got {}", MIN_LOAD_KN, load)));
        }
        if load > MAX_LOAD_KN {
            return Err(ValidationError::new("load", format!("applied load must not exceed {} kN, got {}", MAX_LOAD_KN, load)));
        }

        let e = require_finite("E", self.modulus)?;
        if e <= 0.0 {
            return Err(ValidationError::new("E", format!("Young's modulus must be greater than 0 kPa, got {}", e)));
        }
        if e < MIN_MODULUS_KPA {
            return Err(ValidationError::new("E", format!("Young's modulus below {} kPa looks like a unit error, got {}", MIN_MODULUS_KPA, e)));
        }
        if e > MAX_MODULUS_KPA {
            return Err(ValidationError::new("E", format!("Young's modulus must not exceed {} kPa, got {}", MAX_MODULUS_KPA, e)));
        }

        if let Some(width) = self.width {
            let b = require_finite("B", width)?;
            if b <= 0.0 {
                return Err(ValidationError::new("B", format!("foundation width must be greater than 0 m, got {}", b)));
            }
            if b > MAX_WIDTH_M {
                return Err(ValidationError::new("B", format!("foundation width must not exceed {} m, got {}", MAX_WIDTH_M, b)));
            }
        }

        Ok(())
    }
}

/// Elastic settlement calculator
#[derive(Debug, Clone, Copy, Default)]
pub struct Settlement;

impl Calculator for Settlement {
    type Params = SettlementParams;

    fn kind(&self) -> CalculatorKind {
        CalculatorKind::Settlement
    }

    fn compute(&self, params: &SettlementParams) -> Result<ComputationResult, ValidationError> {
        params.validate()?;

        let load = params.load;
        let e = params.modulus;
        let b = params.width.unwrap_or(DEFAULT_WIDTH_M);
        let settlement_mm = load / (e * b) * 1000.0;

        tracing::debug!(load, e, b, settlement_mm, "Settlement computed");

        let mut inputs = vec![
            Quantity::new("applied load", "P", load, "kN"),
            Quantity::new("Young's modulus", "E", e, "kPa"),
        ];
        let mut notes = vec![
            "Simplified elastic estimate; ignores layering, stress distribution and consolidation".to_string(),
        ];
        match params.width {
            Some(_) => inputs.push(Quantity::new("foundation width", "B", b, "m")),
            None => notes.push(format!("No foundation width given; B = {} m assumed", DEFAULT_WIDTH_M)),
        }

        Ok(ComputationResult {
            calculator: CalculatorKind::Settlement,
            inputs,
            outputs: vec![Quantity::new("elastic settlement", "s", settlement_mm, "mm")],
            formula: "s = P / (E · B) × 1000".to_string(),
            steps: vec![
                format!("Given: P = {} kN, E = {} kPa, B = {} m", load, e, b),
                format!("s = {} / ({} × {}) × 1000", load, e, b),
                format!("s = {:.3} mm", settlement_mm),
            ],
            notes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(load: f64, modulus: f64, width: Option<f64>) -> Result<ComputationResult, ValidationError> {
        Settlement.compute(&SettlementParams { load, modulus, width })
    }

    #[test]
    fn test_default_width() {
        let result = settle(100.0, 10_000.0, None).unwrap();
        let s = result.primary().unwrap();
        assert!((s.value - 10.0).abs() < 1e-12);
        assert_eq!(s.unit, "mm");
        assert!(result.notes.iter().any(|n| n.contains("assumed")));
    }

    #[test]
    fn test_width_scales_result() {
        let narrow = settle(500.0, 20_000.0, Some(1.0)).unwrap().primary().unwrap().value;
        let wide = settle(500.0, 20_000.0, Some(2.0)).unwrap().primary().unwrap().value;
        assert!((narrow - 25.0).abs() < 1e-12);
        assert!((wide - 12.5).abs() < 1e-12);
    }

    #[test]
    fn test_non_positive_inputs_rejected() {
        assert_eq!(settle(0.0, 10_000.0, None).unwrap_err().parameter, "load");
        assert_eq!(settle(100.0, -5.0, None).unwrap_err().parameter, "E");
        assert_eq!(settle(100.0, 10_000.0, Some(0.0)).unwrap_err().parameter, "B");
        assert_eq!(settle(2e6, 10_000.0, None).unwrap_err().parameter, "load");
        assert_eq!(settle(100.0, f64::INFINITY, None).unwrap_err().parameter, "E");
    }

    #[test]
    fn test_implausibly_small_inputs_rejected() {
        let err = settle(0.05, 10_000.0, None).unwrap_err();
        assert_eq!(err.parameter, "load");
        assert!(err.message.contains("unit error"));
        assert_eq!(settle(100.0, 25.0, None).unwrap_err().parameter, "E");
        assert!(settle(MIN_LOAD_KN, MIN_MODULUS_KPA, None).is_ok());
    }

    #[test]
    fn test_idempotent() {
        let a = settle(123.4, 5678.9, Some(1.3)).unwrap();
        let b = settle(123.4, 5678.9, Some(1.3)).unwrap();
        assert_eq!(a, b);
    }
}
