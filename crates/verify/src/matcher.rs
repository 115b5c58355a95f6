//! Value Matcher: classify one claimed value against one actual value.
//!
//! Tiers are tried in order, first applicable wins:
//! 1. exact (after coercion: numeric strings as numbers, sequences, codes)
//! 2. numeric tolerance (confidence 1.0 at 0% error down to 0.7 at the bound)
//! 3. unit equivalence (0.9), or a surfaced unit mismatch
//! 4. case/whitespace-insensitive (0.85)
//! 5. fuzzy similarity (confidence = similarity, when >= threshold)
//! 6. mismatch (0.0)
//!
//! Codes stop after tier 1: anything but an exact code is a mismatch.
//! Numeric sequences are compared element by element with the field's
//! tolerance and never reach the text tiers.

use std::collections::BTreeMap;

use crate::config::{FieldKind, VerifyConfig};
use crate::model::{MatchType, ValidationResult, ValidationStatus};
use crate::value::{format_number, normalize_sequence, parse_sequence, ClaimValue};

/// Denominator floor for relative error when the actual value is ~0.
pub const RELATIVE_EPSILON: f64 = 1e-12;

/// Confidence at the tolerance boundary.
const BOUNDARY_CONFIDENCE: f64 = 0.7;
const UNIT_EQUIVALENT_CONFIDENCE: f64 = 0.9;
const CASE_INSENSITIVE_CONFIDENCE: f64 = 0.85;

/// Absolute slack on the relative error for float rounding in
/// `v * (1 + t)` style claims.
const BOUNDARY_SLACK: f64 = 8.0 * f64::EPSILON;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOutcome {
    pub match_type: MatchType,
    pub confidence: f64,
    pub status: ValidationStatus,
    /// Relative error in percent, for numeric comparisons.
    pub percent_error: Option<f64>,
}

impl MatchOutcome {
    fn new(match_type: MatchType, confidence: f64, status: ValidationStatus) -> Self {
        Self {
            match_type,
            confidence,
            status,
            percent_error: None,
        }
    }

    fn with_error(mut self, relative: f64) -> Self {
        self.percent_error = Some(relative * 100.0);
        self
    }
}

/// Classify `claimed` against `actual`.
pub fn match_values(
    claimed: &ClaimValue,
    actual: &ClaimValue,
    kind: FieldKind,
    config: &VerifyConfig,
    tolerance: f64,
) -> MatchOutcome {
    // Tier 1: exact after coercion
    if exactly_equal(claimed, actual, kind) {
        let outcome = MatchOutcome::new(MatchType::Exact, 1.0, ValidationStatus::Pass);
        return match numeric(claimed, kind) {
            Some(_) => outcome.with_error(0.0),
            None => outcome,
        };
    }

    if kind == FieldKind::Code {
        return MatchOutcome::new(MatchType::Mismatch, 0.0, ValidationStatus::Fail);
    }

    if let (Some(c), Some(a)) = (
        parse_sequence(&claimed.as_text()),
        parse_sequence(&actual.as_text()),
    ) {
        return match_sequences(&c, &a, tolerance);
    }

    // Tier 2: numeric tolerance
    if let (Some(c), Some(a)) = (numeric(claimed, kind), numeric(actual, kind)) {
        let relative = relative_error(c, a);
        return match tolerance_confidence(relative, tolerance) {
            Some(confidence) => {
                MatchOutcome::new(MatchType::NumericTolerance, confidence, ValidationStatus::Pass)
                    .with_error(relative)
            }
            None => MatchOutcome::new(MatchType::Mismatch, 0.0, ValidationStatus::Fail)
                .with_error(relative),
        };
    }

    if kind == FieldKind::Numeric {
        return MatchOutcome::new(MatchType::TypeMismatch, 0.0, ValidationStatus::Fail);
    }

    let claimed_text = claimed.as_text();
    let actual_text = actual.as_text();

    // Tier 3: unit classes
    if matches!(kind, FieldKind::Auto | FieldKind::Unit) {
        match (config.unit_class(&claimed_text), config.unit_class(&actual_text)) {
            (Some(c), Some(a)) if c == a => {
                return MatchOutcome::new(
                    MatchType::UnitEquivalent,
                    UNIT_EQUIVALENT_CONFIDENCE,
                    ValidationStatus::Partial,
                );
            }
            (Some(_), Some(_)) => {
                return MatchOutcome::new(MatchType::UnitMismatch, 0.0, ValidationStatus::Fail);
            }
            _ => {}
        }
    }

    // Tier 4: case / whitespace
    let c = fold(&claimed_text);
    let a = fold(&actual_text);
    if c == a {
        return MatchOutcome::new(
            MatchType::CaseInsensitive,
            CASE_INSENSITIVE_CONFIDENCE,
            ValidationStatus::Partial,
        );
    }

    // Tier 5: fuzzy
    let similarity = strsim::normalized_levenshtein(&c, &a);
    if similarity >= config.matching.fuzzy_threshold {
        return MatchOutcome::new(MatchType::Fuzzy, similarity, ValidationStatus::Partial);
    }

    MatchOutcome::new(MatchType::Mismatch, 0.0, ValidationStatus::Fail)
}

/// Run the matcher and build the full per-claim result with message.
pub fn validate_claim(
    field: &str,
    claimed: &ClaimValue,
    actual: &ClaimValue,
    kind: FieldKind,
    config: &VerifyConfig,
    tolerance: f64,
) -> ValidationResult {
    let outcome = match_values(claimed, actual, kind, config, tolerance);
    let message = describe(field, claimed, actual, &outcome, config, tolerance);
    ValidationResult {
        status: outcome.status,
        claimed: Some(claimed.clone()),
        actual: Some(actual.clone()),
        confidence: outcome.confidence,
        match_type: outcome.match_type,
        message,
        percent_error: outcome.percent_error,
        source_path: None,
        suggestions: Vec::new(),
        alternatives: BTreeMap::new(),
    }
}

/// `|claimed - actual| / max(|actual|, ε)`.
pub fn relative_error(claimed: f64, actual: f64) -> f64 {
    (claimed - actual).abs() / actual.abs().max(RELATIVE_EPSILON)
}

/// Linear decay from 1.0 at zero error to 0.7 at the tolerance bound;
/// `None` beyond it.
pub fn tolerance_confidence(relative: f64, tolerance: f64) -> Option<f64> {
    if relative == 0.0 {
        return Some(1.0);
    }
    if tolerance <= 0.0 || relative > tolerance + BOUNDARY_SLACK {
        return None;
    }
    let ratio = (relative / tolerance).min(1.0);
    Some(1.0 - (1.0 - BOUNDARY_CONFIDENCE) * ratio)
}

/// Same length, and every element within tolerance of its counterpart. The
/// worst element sets the error.
fn match_sequences(claimed: &[f64], actual: &[f64], tolerance: f64) -> MatchOutcome {
    if claimed.len() != actual.len() {
        return MatchOutcome::new(MatchType::Mismatch, 0.0, ValidationStatus::Fail);
    }
    let relative = claimed
        .iter()
        .zip(actual)
        .map(|(c, a)| relative_error(*c, *a))
        .fold(0.0, f64::max);
    match tolerance_confidence(relative, tolerance) {
        Some(confidence) => {
            MatchOutcome::new(MatchType::NumericTolerance, confidence, ValidationStatus::Pass)
                .with_error(relative)
        }
        None => MatchOutcome::new(MatchType::Mismatch, 0.0, ValidationStatus::Fail)
            .with_error(relative),
    }
}

fn numeric(value: &ClaimValue, kind: FieldKind) -> Option<f64> {
    match (kind, value) {
        (FieldKind::Code, ClaimValue::Text(s)) => normalize_code(s).parse::<f64>().ok(),
        _ => value.as_number(),
    }
}

fn exactly_equal(claimed: &ClaimValue, actual: &ClaimValue, kind: FieldKind) -> bool {
    if let (Some(c), Some(a)) = (numeric(claimed, kind), numeric(actual, kind)) {
        return c == a;
    }
    if matches!(claimed, ClaimValue::Boolean(_)) || matches!(actual, ClaimValue::Boolean(_)) {
        return matches!((claimed.as_bool(), actual.as_bool()), (Some(c), Some(a)) if c == a);
    }
    let c = claimed.as_text();
    let a = actual.as_text();
    if c == a {
        return true;
    }
    if kind == FieldKind::Code && normalize_code(&c).eq_ignore_ascii_case(&normalize_code(&a)) {
        return true;
    }
    let c_seq = normalize_sequence(&c);
    let a_seq = normalize_sequence(&a);
    c_seq.is_some() && c_seq.unwrap_or(c) == a_seq.unwrap_or(a)
}

/// `EPSG:32631` -> `32631`, `urn:ogc:def:crs:EPSG::4326` -> `4326`.
pub fn normalize_code(code: &str) -> String {
    let tail = code.rsplit(':').next().unwrap_or(code).trim();
    if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
        let stripped = tail.trim_start_matches('0');
        return if stripped.is_empty() { "0".into() } else { stripped.into() };
    }
    tail.to_string()
}

/// Lowercase with whitespace runs collapsed to one space.
fn fold(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn describe(
    field: &str,
    claimed: &ClaimValue,
    actual: &ClaimValue,
    outcome: &MatchOutcome,
    config: &VerifyConfig,
    tolerance: f64,
) -> String {
    let pe = outcome.percent_error.unwrap_or(0.0);
    match outcome.match_type {
        MatchType::Exact => format!("{field}: claimed {claimed} matches actual value"),
        MatchType::NumericTolerance => format!(
            "{field}: claimed {claimed} is within {}% of actual {actual} ({pe:.2}% error)",
            format_number(tolerance * 100.0)
        ),
        MatchType::Mismatch if outcome.percent_error.is_some() => format!(
            "{field}: claimed {claimed} but actual value is {actual} ({pe:.1}% error, tolerance {}%)",
            format_number(tolerance * 100.0)
        ),
        MatchType::UnitEquivalent => format!(
            "{field}: '{claimed}' and '{actual}' are the same unit ({})",
            config.unit_class(&actual.as_text()).unwrap_or("?")
        ),
        MatchType::UnitMismatch => format!(
            "{field}: claimed unit '{claimed}' ({}) but actual unit is '{actual}' ({})",
            config.unit_class(&claimed.as_text()).unwrap_or("?"),
            config.unit_class(&actual.as_text()).unwrap_or("?")
        ),
        MatchType::CaseInsensitive => format!(
            "{field}: claimed '{claimed}' differs only in case or spacing from actual '{actual}'"
        ),
        MatchType::Fuzzy => format!(
            "{field}: claimed '{claimed}' is similar to actual '{actual}' (similarity {:.2})",
            outcome.confidence
        ),
        MatchType::TypeMismatch => format!(
            "{field}: expected a numeric value, got {} '{claimed}'; actual value is {actual}",
            claimed.kind()
        ),
        _ => format!("{field}: claimed '{claimed}' but actual value is '{actual}'"),
    }
}
