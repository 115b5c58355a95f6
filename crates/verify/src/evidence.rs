use std::collections::BTreeMap;

use crate::model::{BatchReport, OverallStatus, StatusCounts, ValidationResult, ValidationStatus};

/// Weighted score at or above which a batch is `MOSTLY_VALID`.
pub const MOSTLY_VALID_THRESHOLD: f64 = 0.85;
/// Weighted score at or above which a batch is `PARTIALLY_VALID`.
pub const PARTIALLY_VALID_THRESHOLD: f64 = 0.5;

/// Aggregate per-field results into one scored report.
///
/// `weight_of` receives the result key and returns its importance.
pub fn compute_report(
    details: BTreeMap<String, ValidationResult>,
    weight_of: impl Fn(&str) -> f64,
) -> BatchReport {
    let counts = count_statuses(&details);
    let validation_score = mean_confidence(&details);
    let weighted_score = weighted_confidence(&details, weight_of);
    let overall_status = overall_status(&details, weighted_score);

    BatchReport {
        overall_status,
        validation_score,
        weighted_score,
        counts,
        details,
    }
}

pub fn count_statuses(details: &BTreeMap<String, ValidationResult>) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for r in details.values() {
        match r.status {
            ValidationStatus::Pass => counts.passed += 1,
            ValidationStatus::Partial => counts.partial += 1,
            ValidationStatus::Fail => counts.failed += 1,
            ValidationStatus::NotFound => counts.not_found += 1,
        }
    }
    counts
}

/// Unweighted mean of confidences; 0.0 for no results.
pub fn mean_confidence(details: &BTreeMap<String, ValidationResult>) -> f64 {
    if details.is_empty() {
        return 0.0;
    }
    let sum: f64 = details.values().map(|r| r.confidence).sum();
    (sum / details.len() as f64).clamp(0.0, 1.0)
}

/// Σ(confidence × weight) / Σ(weight) over the fields present. Falls back to
/// the unweighted mean when every present field weighs zero.
pub fn weighted_confidence(
    details: &BTreeMap<String, ValidationResult>,
    weight_of: impl Fn(&str) -> f64,
) -> f64 {
    let mut total_weight = 0.0;
    let mut weighted = 0.0;
    for (field, r) in details {
        let w = weight_of(field).max(0.0);
        total_weight += w;
        weighted += r.confidence * w;
    }
    if total_weight <= 0.0 {
        return mean_confidence(details);
    }
    (weighted / total_weight).clamp(0.0, 1.0)
}

pub fn overall_status(details: &BTreeMap<String, ValidationResult>, weighted_score: f64) -> OverallStatus {
    if !details.is_empty() && details.values().all(|r| r.confidence == 1.0) {
        OverallStatus::Pass
    } else if weighted_score >= MOSTLY_VALID_THRESHOLD {
        OverallStatus::MostlyValid
    } else if weighted_score >= PARTIALLY_VALID_THRESHOLD {
        OverallStatus::PartiallyValid
    } else {
        OverallStatus::Fail
    }
}
