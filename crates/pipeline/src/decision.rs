//! Decision component
//!
//! Classifies a question into an action plan (retrieve / compute / both) and
//! extracts calculator parameters from free text with a small set of
//! patterns. Classification never fails: anything ambiguous, or a
//! calculation request with missing or out-of-range parameters, becomes a
//! plain retrieval.

use geoqa_common::errors::{AppError, Result};
use geoqa_tools::{BearingCapacityParams, CalculationRequest, SettlementParams, ValidationError};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the pipeline will do for a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Retrieve,
    Compute,
    Both,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Retrieve => "retrieve",
            Action::Compute => "compute",
            Action::Both => "both",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action plus the calculation it needs, fixed once per question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "calculation", rename_all = "snake_case")]
pub enum ActionPlan {
    Retrieve,
    Compute(CalculationRequest),
    Both(CalculationRequest),
}

impl ActionPlan {
    pub fn action(&self) -> Action {
        match self {
            ActionPlan::Retrieve => Action::Retrieve,
            ActionPlan::Compute(_) => Action::Compute,
            ActionPlan::Both(_) => Action::Both,
        }
    }

    pub fn calculation(&self) -> Option<&CalculationRequest> {
        match self {
            ActionPlan::Retrieve => None,
            ActionPlan::Compute(request) | ActionPlan::Both(request) => Some(request),
        }
    }

    pub fn needs_retrieval(&self) -> bool {
        !matches!(self, ActionPlan::Compute(_))
    }
}

/// Numeric parameters found in question or context text
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedParameters {
    pub width: Option<f64>,
    pub unit_weight: Option<f64>,
    pub depth: Option<f64>,
    pub friction_angle: Option<f64>,
    pub load: Option<f64>,
    pub modulus: Option<f64>,
}

impl ExtractedParameters {
    /// Fill parameters still missing from `other`
    pub fn or(self, other: ExtractedParameters) -> Self {
        Self {
            width: self.width.or(other.width),
            unit_weight: self.unit_weight.or(other.unit_weight),
            depth: self.depth.or(other.depth),
            friction_angle: self.friction_angle.or(other.friction_angle),
            load: self.load.or(other.load),
            modulus: self.modulus.or(other.modulus),
        }
    }

    /// Pick a calculator whose full parameter set is present; bearing
    /// capacity wins when both are complete
    pub fn select_calculation(&self) -> Option<CalculationRequest> {
        if let (Some(width), Some(unit_weight), Some(depth), Some(friction_angle)) =
            (self.width, self.unit_weight, self.depth, self.friction_angle)
        {
            return Some(CalculationRequest::BearingCapacity(BearingCapacityParams {
                width,
                unit_weight,
                depth,
                friction_angle,
            }));
        }

        if let (Some(load), Some(modulus)) = (self.load, self.modulus) {
            return Some(CalculationRequest::Settlement(SettlementParams {
                load,
                modulus,
                width: self.width,
            }));
        }

        None
    }
}

/// A complete parameter set that failed calculator validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedCalculation {
    pub request: CalculationRequest,
    pub error: ValidationError,
}

/// Classification result; `reasoning` is for logs only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub plan: ActionPlan,
    pub parameters: ExtractedParameters,
    pub reasoning: String,
    /// Set when the plan degraded to retrieval because a value was out of range
    pub rejected: Option<RejectedCalculation>,
}

const NUMBER: &str = r"(-?\d+(?:,\d{3})*(?:\.\d+)?)";

/// Extraction pattern whose first group is the value; `scale` converts
/// the matched unit to the calculator's unit
struct ValuePattern {
    regex: Regex,
    scale: fn(&str) -> f64,
}

fn unit_scale(_: &str) -> f64 {
    1.0
}

fn modulus_scale(unit: &str) -> f64 {
    match unit.to_ascii_lowercase().as_str() {
        "mpa" => 1_000.0,
        "gpa" => 1_000_000.0,
        _ => 1.0,
    }
}

fn load_scale(unit: &str) -> f64 {
    if unit.eq_ignore_ascii_case("mn") {
        1_000.0
    } else {
        1.0
    }
}

/// Pattern-driven question classifier
pub struct DecisionEngine {
    calculation_verbs: Regex,
    numeric_units: Regex,
    symbol_assignments: Regex,
    explanatory: Regex,
    width: Vec<ValuePattern>,
    unit_weight: Vec<ValuePattern>,
    depth: Vec<ValuePattern>,
    friction_angle: Vec<ValuePattern>,
    load: Vec<ValuePattern>,
    modulus: Vec<ValuePattern>,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| AppError::Internal {
        message: format!("invalid decision pattern {:?}: {}", pattern, e),
    })
}

fn value_patterns(patterns: &[&str], scale: fn(&str) -> f64) -> Result<Vec<ValuePattern>> {
    patterns
        .iter()
        .map(|p| {
            Ok(ValuePattern {
                regex: compile(&p.replace("{NUM}", NUMBER))?,
                scale,
            })
        })
        .collect()
}

impl DecisionEngine {
    pub fn new() -> Result<Self> {
        Ok(Self {
            calculation_verbs: compile(
                r"(?i)\b(calculate|compute|determine|estimate|evaluate|find)\b",
            )?,
            numeric_units: compile(
                r"(?i)\d\s*(?:(?:kPa|MPa|kN|mm|cm|m|degrees?|deg)\b|kN/m(?:²|³|2\b|3\b)|°)",
            )?,
            symbol_assignments: compile(
                r"(?:\b(?:B|Df|E|P|gamma|phi|load)|γ|φ)\s*=\s*-?\d",
            )?,
            explanatory: compile(
                r"(?i)\b(what\s+is|what\s+are|explain|why|how\s+does|how\s+do|describe|define|meaning\s+of)\b",
            )?,
            width: value_patterns(
                &[
                    r"(?i){NUM}\s*-?\s*m(?:eters?|etres?)?\s*(?:-\s*)?wide",
                    r"(?i)\bwidth\s*(?:of|=|:|is)?\s*(?:B\s*=?\s*)?{NUM}",
                    r"\bB\s*=\s*{NUM}",
                ],
                unit_scale,
            )?,
            unit_weight: value_patterns(
                &[
                    r"(?i)unit\s+weight\s*(?:of|=|:|is)?\s*(?:(?:γ|gamma)\s*=?\s*)?{NUM}",
                    r"(?i)(?:\bgamma|γ)\s*=\s*{NUM}",
                    r"(?i){NUM}\s*kN/m(?:³|3|\^3)",
                ],
                unit_scale,
            )?,
            depth: value_patterns(
                &[
                    r"(?i)\bdepth\s*(?:of|=|:|is)?\s*(?:Df\s*=?\s*)?{NUM}",
                    r"(?i)\bDf\s*=\s*{NUM}",
                    r"(?i){NUM}\s*m(?:eters?|etres?)?\s+deep",
                ],
                unit_scale,
            )?,
            friction_angle: value_patterns(
                &[
                    r"(?i)friction\s+angle\s*(?:of|=|:|is)?\s*(?:(?:φ|phi)\s*=?\s*)?{NUM}",
                    r"(?i)(?:\bphi|φ)\s*=\s*{NUM}",
                    r"(?i){NUM}\s*(?:°|degrees?\b)",
                ],
                unit_scale,
            )?,
            load: value_patterns(
                &[
                    r"(?i)\bload\s*(?:of|=|:|is)?\s*{NUM}\s*(MN|kN)?",
                    r"(?i){NUM}\s*(MN|kN)\s+(?:[a-z]+\s+)?load",
                    r"\bP\s*=\s*{NUM}\s*(MN|kN)?",
                ],
                load_scale,
            )?,
            modulus: value_patterns(
                &[
                    r"(?i)modulus\s*(?:of\s+elasticity\s*)?(?:of|=|:|is)?\s*(?:E\s*=?\s*)?{NUM}\s*(GPa|MPa|kPa)?",
                    r"\bE(?:s|_s)?\s*=\s*{NUM}\s*(GPa|MPa|kPa)?",
                ],
                modulus_scale,
            )?,
        })
    }

    /// Classify `question`, reading missing parameters from `context`
    pub fn classify(&self, question: &str, context: Option<&str>) -> Decision {
        let has_verb = self.calculation_verbs.is_match(question);
        let has_numeric =
            self.numeric_units.is_match(question) || self.symbol_assignments.is_match(question);

        if !has_verb && !has_numeric {
            return Decision {
                plan: ActionPlan::Retrieve,
                parameters: ExtractedParameters::default(),
                reasoning: "no calculation intent; knowledge retrieval only".to_string(),
                rejected: None,
            };
        }

        let mut parameters = self.extract(question);
        if let Some(context) = context {
            parameters = parameters.or(self.extract(context));
        }

        let Some(calculation) = parameters.select_calculation() else {
            return Decision {
                plan: ActionPlan::Retrieve,
                parameters,
                reasoning: "calculation intent but incomplete parameters; falling back to retrieval"
                    .to_string(),
                rejected: None,
            };
        };

        let calculator = calculation.kind();
        if let Err(error) = calculation.validate() {
            return Decision {
                plan: ActionPlan::Retrieve,
                parameters,
                reasoning: format!(
                    "{} parameters out of range ({}); falling back to retrieval",
                    calculator, error
                ),
                rejected: Some(RejectedCalculation {
                    request: calculation,
                    error,
                }),
            };
        }

        let explanatory = self.explanatory.is_match(question);
        let (plan, reasoning) = if has_verb && !explanatory {
            (
                ActionPlan::Compute(calculation),
                format!("calculation request with full {} parameters", calculator),
            )
        } else if has_verb {
            (
                ActionPlan::Both(calculation),
                format!("explanation plus {} calculation", calculator),
            )
        } else {
            (
                ActionPlan::Both(calculation),
                format!("numeric {} parameters without explicit calculation verb", calculator),
            )
        };

        Decision {
            plan,
            parameters,
            reasoning,
            rejected: None,
        }
    }

    /// Extract every recognised parameter from `text`
    pub fn extract(&self, text: &str) -> ExtractedParameters {
        ExtractedParameters {
            width: first_value(&self.width, text),
            unit_weight: first_value(&self.unit_weight, text),
            depth: first_value(&self.depth, text),
            friction_angle: first_value(&self.friction_angle, text),
            load: first_value(&self.load, text),
            modulus: first_value(&self.modulus, text),
        }
    }
}

fn first_value(patterns: &[ValuePattern], text: &str) -> Option<f64> {
    patterns.iter().find_map(|pattern| {
        let captures = pattern.regex.captures(text)?;
        let value: f64 = captures.get(1)?.as_str().replace(',', "").parse().ok()?;
        let unit = captures.get(2).map(|m| m.as_str()).unwrap_or("");
        let value = value * (pattern.scale)(unit);
        value.is_finite().then_some(value)
    })
}
