//! Coordinate Auditor: claimed spatial indices against valid index ranges.

use std::collections::BTreeMap;

use crate::error::{Result, VerifyError};
use crate::model::{MatchType, ValidRanges, ValidationResult, ValidationStatus};
use crate::resolver::near_miss;
use crate::value::{format_number, ClaimValue};

/// Reject inverted or non-finite ranges before auditing anything.
pub fn check_ranges(ranges: &ValidRanges) -> Result<()> {
    for (axis, [min, max]) in &ranges.0 {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(VerifyError::InvalidRange {
                axis: axis.clone(),
                min: *min,
                max: *max,
            });
        }
    }
    Ok(())
}

/// One result per claimed axis. Bounds are inclusive; an axis without a
/// known range is `NOT_FOUND`, never a pass.
pub fn audit_coordinates(
    ranges: &ValidRanges,
    claimed_location: &BTreeMap<String, ClaimValue>,
) -> Result<BTreeMap<String, ValidationResult>> {
    check_ranges(ranges)?;
    Ok(claimed_location
        .iter()
        .map(|(axis, claim)| (axis.clone(), audit_axis(ranges, axis, claim)))
        .collect())
}

pub(crate) fn audit_axis(ranges: &ValidRanges, axis: &str, claim: &ClaimValue) -> ValidationResult {
    let Some([min, max]) = ranges.get(axis) else {
        let known: Vec<&str> = ranges.axes().collect();
        let mut result = ValidationResult::not_found(
            Some(claim.clone()),
            format!("no valid range known for axis '{axis}' (known axes: {})", known.join(", ")),
        );
        result.suggestions = rank_axes(axis, &known);
        return result;
    };

    let range_text = format!("[{}, {}]", format_number(min), format_number(max));
    let source = Some(format!("valid_ranges.{axis}"));

    let Some(value) = claim.as_number() else {
        return ValidationResult {
            status: ValidationStatus::Fail,
            claimed: Some(claim.clone()),
            actual: Some(ClaimValue::Text(range_text.clone())),
            confidence: 0.0,
            match_type: MatchType::TypeMismatch,
            message: format!("{axis}: claimed '{claim}' is not a numeric index (valid range {range_text})"),
            percent_error: None,
            source_path: source,
            suggestions: Vec::new(),
            alternatives: BTreeMap::new(),
        };
    };

    if (min..=max).contains(&value) {
        ValidationResult {
            status: ValidationStatus::Pass,
            claimed: Some(claim.clone()),
            actual: Some(ClaimValue::Text(range_text.clone())),
            confidence: 1.0,
            match_type: MatchType::InRange,
            message: format!("{axis} {} is within valid range {range_text}", format_number(value)),
            percent_error: None,
            source_path: source,
            suggestions: Vec::new(),
            alternatives: BTreeMap::new(),
        }
    } else {
        let mut alternatives = BTreeMap::new();
        alternatives.insert("nearest_valid".to_string(), ClaimValue::Number(value.clamp(min, max)));
        alternatives.insert("valid_min".to_string(), ClaimValue::Number(min));
        alternatives.insert("valid_max".to_string(), ClaimValue::Number(max));
        ValidationResult {
            status: ValidationStatus::Fail,
            claimed: Some(claim.clone()),
            actual: Some(ClaimValue::Text(range_text.clone())),
            confidence: 0.0,
            match_type: MatchType::OutOfRange,
            message: format!("{axis} {} is outside valid range {range_text}", format_number(value)),
            percent_error: None,
            source_path: source,
            suggestions: Vec::new(),
            alternatives,
        }
    }
}

/// Known axes, closest spelling first.
fn rank_axes(axis: &str, known: &[&str]) -> Vec<String> {
    let mut ranked: Vec<(f64, &str)> = known
        .iter()
        .map(|k| (near_miss(axis, k, usize::MAX).unwrap_or(0.0), *k))
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    ranked.into_iter().map(|(_, k)| k.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges() -> ValidRanges {
        let mut m = BTreeMap::new();
        m.insert("inline".to_string(), [100.0, 750.0]);
        m.insert("crossline".to_string(), [300.0, 1250.0]);
        ValidRanges(m)
    }

    fn location(pairs: &[(&str, f64)]) -> BTreeMap<String, ClaimValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), ClaimValue::from(*v))).collect()
    }

    #[test]
    fn bounds_are_inclusive() {
        let results =
            audit_coordinates(&ranges(), &location(&[("inline", 100.0), ("crossline", 1250.0)]))
                .unwrap();
        assert!(results.values().all(|r| r.status == ValidationStatus::Pass));
        assert_eq!(results["inline"].confidence, 1.0);
        assert_eq!(results["inline"].match_type, MatchType::InRange);
    }

    #[test]
    fn out_of_range_names_range_and_nearest() {
        let results = audit_coordinates(&ranges(), &location(&[("inline", 800.0)])).unwrap();
        let r = &results["inline"];
        assert_eq!(r.status, ValidationStatus::Fail);
        assert_eq!(r.match_type, MatchType::OutOfRange);
        assert!(r.message.contains("[100, 750]"));
        assert_eq!(r.alternatives["nearest_valid"], ClaimValue::from(750.0));
    }

    #[test]
    fn unknown_axis_is_not_found() {
        let results = audit_coordinates(&ranges(), &location(&[("inlin", 200.0)])).unwrap();
        let r = &results["inlin"];
        assert_eq!(r.status, ValidationStatus::NotFound);
        assert!(r.actual.is_none());
        assert_eq!(r.suggestions, vec!["inline".to_string(), "crossline".to_string()]);
    }

    #[test]
    fn axis_lookup_ignores_case() {
        let results = audit_coordinates(&ranges(), &location(&[("Inline", 425.0)])).unwrap();
        assert_eq!(results["Inline"].status, ValidationStatus::Pass);
    }

    #[test]
    fn non_numeric_claim() {
        let mut c = BTreeMap::new();
        c.insert("inline".to_string(), ClaimValue::from("middle"));
        let results = audit_coordinates(&ranges(), &c).unwrap();
        assert_eq!(results["inline"].match_type, MatchType::TypeMismatch);
    }

    #[test]
    fn inverted_range_is_an_error() {
        let mut bad = ranges();
        bad.0.insert("sample".to_string(), [500.0, 0.0]);
        let err = audit_coordinates(&bad, &location(&[("inline", 200.0)])).unwrap_err();
        assert_eq!(
            err,
            VerifyError::InvalidRange { axis: "sample".into(), min: 500.0, max: 0.0 }
        );
    }
}
