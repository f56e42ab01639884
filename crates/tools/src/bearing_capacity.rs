//! Terzaghi ultimate bearing capacity for cohesionless soil
//!
//! `q_ult = γ·Df·Nq + 0.5·γ·B·Nγ` with `c = 0`. The factors come from a
//! breakpoint table keyed by friction angle and are linearly interpolated
//! between neighbouring rows.

use crate::{require_finite, Calculator, CalculatorKind, ComputationResult, Quantity, ValidationError};
use serde::{Deserialize, Serialize};

/// Dimensionless bearing capacity factors at one friction angle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BearingFactors {
    pub phi: f64,
    pub nc: f64,
    pub nq: f64,
    pub ngamma: f64,
}

const fn row(phi: f64, nc: f64, nq: f64, ngamma: f64) -> BearingFactors {
    BearingFactors { phi, nc, nq, ngamma }
}

/// Terzaghi factors, ascending in φ
pub const FACTOR_TABLE: [BearingFactors; 9] = [
    row(0.0, 5.7, 1.0, 0.0),
    row(5.0, 7.3, 1.6, 0.5),
    row(10.0, 9.6, 2.7, 1.2),
    row(15.0, 12.9, 4.4, 2.5),
    row(20.0, 17.7, 7.4, 5.0),
    row(25.0, 25.1, 12.7, 9.7),
    row(30.0, 37.2, 22.5, 19.7),
    row(35.0, 57.8, 41.4, 42.4),
    row(40.0, 95.7, 81.3, 100.4),
];

/// Accepted friction angle range in degrees; values above the last table
/// row use that row's factors
pub const PHI_RANGE: (f64, f64) = (0.0, 45.0);

pub const MAX_WIDTH_M: f64 = 100.0;
pub const MAX_UNIT_WEIGHT: f64 = 30.0;
pub const MAX_DEPTH_M: f64 = 50.0;

/// Factors for `phi`: exact rows at breakpoints, linear interpolation
/// between them, clamped outside the table
pub fn factors(phi: f64) -> BearingFactors {
    let first = FACTOR_TABLE[0];
    let last = FACTOR_TABLE[FACTOR_TABLE.len() - 1];

    if phi <= first.phi {
        return BearingFactors { phi, ..first };
    }
    if phi >= last.phi {
        return BearingFactors { phi, ..last };
    }
    if let Some(exact) = FACTOR_TABLE.iter().find(|r| r.phi == phi) {
        return *exact;
    }

    for pair in FACTOR_TABLE.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if lo.phi < phi && phi < hi.phi {
            let t = (phi - lo.phi) / (hi.phi - lo.phi);
            let lerp = |a: f64, b: f64| a + t * (b - a);
            return BearingFactors {
                phi,
                nc: lerp(lo.nc, hi.nc),
                nq: lerp(lo.nq, hi.nq),
                ngamma: lerp(lo.ngamma, hi.ngamma),
            };
        }
    }

    // Unreachable for finite phi inside the table
    BearingFactors { phi, ..first }
}

/// Inputs for the bearing capacity calculator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BearingCapacityParams {
    /// Foundation width B (m)
    pub width: f64,
    /// Soil unit weight γ (kN/m³)
    pub unit_weight: f64,
    /// Foundation depth Df (m)
    pub depth: f64,
    /// Friction angle φ (degrees)
    pub friction_angle: f64,
}

impl BearingCapacityParams {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let b = require_finite("B", self.width)?;
        if b <= 0.0 {
            return Err(ValidationError::new("B", format!("foundation width must be greater than 0 m, got {}", b)));
        }
        if b > MAX_WIDTH_M {
            return Err(ValidationError::new("B", format!("foundation width must not exceed {} m, got {}", MAX_WIDTH_M, b)));
        }

        let gamma = require_finite("gamma", self.unit_weight)?;
        if gamma <= 0.0 {
            return Err(ValidationError::new("gamma", format!("unit weight must be greater than 0 kN/m³, got {}", gamma)));
        }
        if gamma > MAX_UNIT_WEIGHT {
            return Err(ValidationError::new("gamma", format!("unit weight must not exceed {} kN/m³, got {}", MAX_UNIT_WEIGHT, gamma)));
        }

        let df = require_finite("Df", self.depth)?;
        if df < 0.0 {
            return Err(ValidationError::new("Df", format!("foundation depth cannot be negative, got {}", df)));
        }
        if df > MAX_DEPTH_M {
            return Err(ValidationError::new("Df", format!("foundation depth must not exceed {} m, got {}", MAX_DEPTH_M, df)));
        }

        let phi = require_finite("phi", self.friction_angle)?;
        let (min, max) = PHI_RANGE;
        if !(min..=max).contains(&phi) {
            return Err(ValidationError::new(
                "phi",
                format!("friction angle must be between {} and {} degrees, got {}", min, max, phi),
            ));
        }

        Ok(())
    }
}

/// Terzaghi bearing capacity calculator
#[derive(Debug, Clone, Copy, Default)]
pub struct BearingCapacity;

impl Calculator for BearingCapacity {
    type Params = BearingCapacityParams;

    fn kind(&self) -> CalculatorKind {
        CalculatorKind::BearingCapacity
    }

    fn compute(&self, params: &BearingCapacityParams) -> Result<ComputationResult, ValidationError> {
        params.validate()?;

        let BearingCapacityParams {
            width: b,
            unit_weight: gamma,
            depth: df,
            friction_angle: phi,
        } = *params;
        let f = factors(phi);

        let surcharge_term = gamma * df * f.nq;
        let width_term = 0.5 * gamma * b * f.ngamma;
        let q_ult = surcharge_term + width_term;

        tracing::debug!(b, gamma, df, phi, nq = f.nq, ngamma = f.ngamma, q_ult, "Bearing capacity computed");

        let mut notes = vec![
            "Terzaghi's formula for cohesionless soil (c = 0), strip footing, general shear failure".to_string(),
            "Apply an appropriate factor of safety to obtain the allowable bearing pressure".to_string(),
        ];
        if phi > FACTOR_TABLE[FACTOR_TABLE.len() - 1].phi {
            notes.push(format!(
                "φ = {}° lies above the factor table; factors for φ = 40° were used",
                phi
            ));
        } else if !FACTOR_TABLE.iter().any(|r| r.phi == phi) {
            notes.push(format!("Factors linearly interpolated for φ = {}°", phi));
        }

        Ok(ComputationResult {
            calculator: CalculatorKind::BearingCapacity,
            inputs: vec![
                Quantity::new("foundation width", "B", b, "m"),
                Quantity::new("unit weight", "γ", gamma, "kN/m³"),
                Quantity::new("foundation depth", "Df", df, "m"),
                Quantity::new("friction angle", "φ", phi, "°"),
            ],
            outputs: vec![
                Quantity::new("ultimate bearing capacity", "q_ult", q_ult, "kPa"),
                Quantity::new("bearing capacity factor", "Nq", f.nq, ""),
                Quantity::new("bearing capacity factor", "Nγ", f.ngamma, ""),
                Quantity::new("bearing capacity factor", "Nc", f.nc, ""),
            ],
            formula: "q_ult = γ·Df·Nq + 0.5·γ·B·Nγ".to_string(),
            steps: vec![
                format!("Given: B = {} m, γ = {} kN/m³, Df = {} m, φ = {}°", b, gamma, df, phi),
                format!("Lookup: Nq = {:.2}, Nγ = {:.2}", f.nq, f.ngamma),
                format!("γ·Df·Nq = {} × {} × {:.2} = {:.2} kPa", gamma, df, f.nq, surcharge_term),
                format!("0.5·γ·B·Nγ = 0.5 × {} × {} × {:.2} = {:.2} kPa", gamma, b, f.ngamma, width_term),
                format!("q_ult = {:.2} + {:.2} = {:.2} kPa", surcharge_term, width_term, q_ult),
            ],
            notes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(width: f64, unit_weight: f64, depth: f64, friction_angle: f64) -> BearingCapacityParams {
        BearingCapacityParams {
            width,
            unit_weight,
            depth,
            friction_angle,
        }
    }

    fn q_ult(p: BearingCapacityParams) -> f64 {
        BearingCapacity.compute(&p).unwrap().primary().unwrap().value
    }

    #[test]
    fn test_reference_value() {
        let result = BearingCapacity.compute(&params(2.0, 18.0, 1.5, 30.0)).unwrap();
        let q = result.primary().unwrap();
        assert_eq!(q.symbol, "q_ult");
        assert_eq!(q.unit, "kPa");
        assert!((q.value - 962.1).abs() < 1e-9);
        assert!(result.steps.last().unwrap().contains("962.10"));
    }

    #[test]
    fn test_breakpoints_return_table_rows() {
        for row in FACTOR_TABLE {
            assert_eq!(factors(row.phi), row);
        }
    }

    #[test]
    fn test_interpolation_between_rows() {
        let f = factors(32.5);
        assert!((f.nq - (22.5 + 41.4) / 2.0).abs() < 1e-12);
        assert!((f.ngamma - (19.7 + 42.4) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_clamped_above_table() {
        let f = factors(43.0);
        assert_eq!(f.nq, 81.3);
        assert_eq!(f.ngamma, 100.4);
        let result = BearingCapacity.compute(&params(2.0, 18.0, 1.5, 43.0)).unwrap();
        assert!(result.notes.iter().any(|n| n.contains("above the factor table")));
    }

    #[test]
    fn test_monotonic_in_phi() {
        let mut previous = 0.0;
        let mut phi = 0.0;
        while phi <= 45.0 {
            let q = q_ult(params(2.0, 18.0, 1.5, phi));
            assert!(q >= previous, "q_ult decreased at phi = {}", phi);
            previous = q;
            phi += 0.25;
        }
    }

    #[test]
    fn test_invalid_inputs_name_parameter() {
        let cases = [
            (params(0.0, 18.0, 1.5, 30.0), "B"),
            (params(2.0, -1.0, 1.5, 30.0), "gamma"),
            (params(2.0, 18.0, 1.5, 50.0), "phi"),
            (params(2.0, 18.0, -0.5, 30.0), "Df"),
            (params(f64::NAN, 18.0, 1.5, 30.0), "B"),
            (params(101.0, 18.0, 1.5, 30.0), "B"),
            (params(2.0, 31.0, 1.5, 30.0), "gamma"),
        ];
        for (p, parameter) in cases {
            let err = BearingCapacity.compute(&p).unwrap_err();
            assert_eq!(err.parameter, parameter);
            assert!(err.to_string().contains(parameter));
        }
    }

    #[test]
    fn test_zero_depth_allowed() {
        let q = q_ult(params(2.0, 18.0, 0.0, 30.0));
        assert!((q - 354.6).abs() < 1e-9);
    }

    #[test]
    fn test_idempotent() {
        let p = params(1.7, 19.2, 2.3, 27.3);
        let a = BearingCapacity.compute(&p).unwrap();
        let b = BearingCapacity.compute(&p).unwrap();
        assert_eq!(a.primary().unwrap().value.to_bits(), b.primary().unwrap().value.to_bits());
        assert_eq!(a, b);
    }
}
