//! Statistics Auditor: recompute descriptive statistics from raw samples and
//! check claimed statistics against them and against each other.

use std::collections::BTreeMap;

use crate::config::{FieldKind, VerifyConfig};
use crate::error::{Result, VerifyError};
use crate::matcher::{relative_error, tolerance_confidence, validate_claim};
use crate::model::{
    MatchType, Percentiles, StatisticalSnapshot, ValidationResult, ValidationStatus,
};
use crate::resolver::near_miss;
use crate::value::{format_number, ClaimValue};

/// Canonical statistic names, in report order.
pub const STAT_FIELDS: &[&str] = &[
    "min", "max", "mean", "median", "std", "rms", "p10", "p25", "p50", "p75", "p90",
];

/// Synthetic result key for contradictions among the claimed values.
pub const CONSISTENCY_KEY: &str = "_consistency";
/// Synthetic result key for contradictions inside the recomputed snapshot.
pub const SNAPSHOT_KEY: &str = "_snapshot";

const ORDER_SLACK: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

/// Map a claimed statistic name onto a canonical one.
///
/// Accepts the usual spellings: `minimum`, `Average`, `std_dev`,
/// `percentile_90`, `P90`, `q1`.
pub fn canonical_stat(name: &str) -> Option<&'static str> {
    let key: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect();
    let stat = match key.as_str() {
        "min" | "minimum" | "minvalue" | "lowest" => "min",
        "max" | "maximum" | "maxvalue" | "highest" => "max",
        "mean" | "average" | "avg" | "meanvalue" | "arithmeticmean" => "mean",
        "median" | "med" => "median",
        "std" | "stdev" | "stddev" | "standarddeviation" | "sd" | "sigma" => "std",
        "rms" | "rootmeansquare" => "rms",
        "q1" | "firstquartile" => "p25",
        "q3" | "thirdquartile" => "p75",
        other => {
            let digits = ["percentile", "perc", "pct", "p"]
                .iter()
                .find_map(|prefix| other.strip_prefix(prefix))?;
            match digits {
                "10" => "p10",
                "25" => "p25",
                "50" => "p50",
                "75" => "p75",
                "90" => "p90",
                _ => return None,
            }
        }
    };
    Some(stat)
}

pub fn is_statistic(name: &str) -> bool {
    canonical_stat(name).is_some()
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Recompute statistics from raw samples. Non-finite samples are excluded
/// and counted.
pub fn compute_snapshot(samples: &[f64]) -> Result<StatisticalSnapshot> {
    if samples.is_empty() {
        return Err(VerifyError::EmptySamples);
    }
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return Err(VerifyError::NoFiniteSamples { count: samples.len() });
    }
    sorted.sort_by(f64::total_cmp);

    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    let (mean, std, rms) = moments(&sorted);

    let p = |q: f64| percentile(&sorted, q);
    let percentiles = Percentiles {
        p10: p(0.10),
        p25: p(0.25),
        p50: p(0.50),
        p75: p(0.75),
        p90: p(0.90),
    };

    Ok(StatisticalSnapshot {
        count: sorted.len(),
        non_finite: samples.len() - sorted.len(),
        min,
        max,
        mean,
        median: percentiles.p50,
        std,
        rms,
        percentiles,
    })
}

/// Population `(mean, std, rms)`. When the plain sums overflow, the moments
/// are taken over values scaled by the largest magnitude.
fn moments(values: &[f64]) -> (f64, f64, f64) {
    let direct = scaled_moments(values, 1.0);
    if direct.0.is_finite() && direct.1.is_finite() && direct.2.is_finite() {
        return direct;
    }
    let scale = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let (mean, std, rms) = scaled_moments(values, scale);
    (mean * scale, std * scale, rms * scale)
}

fn scaled_moments(values: &[f64], scale: f64) -> (f64, f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().map(|v| v / scale).sum::<f64>() / n;
    let variance = values.iter().map(|v| (v / scale - mean).powi(2)).sum::<f64>() / n;
    let square = values.iter().map(|v| (v / scale).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt(), square.sqrt())
}

/// Linear interpolation between closest ranks. `sorted` must be non-empty.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let (a, b, w) = (sorted[lo], sorted[hi], pos - lo as f64);
    let span = b - a;
    if span.is_finite() {
        a + span * w
    } else {
        a * (1.0 - w) + b * w
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Validate claimed statistics against samples with one tolerance.
pub fn audit_statistics(
    samples: &[f64],
    claimed: &BTreeMap<String, ClaimValue>,
    tolerance: f64,
    config: &VerifyConfig,
) -> Result<BTreeMap<String, ValidationResult>> {
    audit_statistics_with(samples, claimed, config, |_| tolerance)
}

/// Validate claimed statistics with a per-statistic tolerance.
///
/// Result keys are the claimed names as given, plus `_consistency` when the
/// claims contradict each other and `_snapshot` when the recomputed values
/// do.
pub fn audit_statistics_with(
    samples: &[f64],
    claimed: &BTreeMap<String, ClaimValue>,
    config: &VerifyConfig,
    tolerance_of: impl Fn(&str) -> f64,
) -> Result<BTreeMap<String, ValidationResult>> {
    let snapshot = compute_snapshot(samples)?;
    log::debug!(
        "snapshot over {} samples ({} non-finite excluded)",
        snapshot.count,
        snapshot.non_finite
    );
    let mut results = BTreeMap::new();

    for (name, claim) in claimed {
        let Some(stat) = canonical_stat(name) else {
            let mut result = ValidationResult::not_found(
                Some(claim.clone()),
                format!("'{name}' is not a recognised statistic"),
            );
            result.suggestions = suggest_stats(name, config);
            results.insert(name.clone(), result);
            continue;
        };
        let actual = snapshot.value(stat).unwrap_or(f64::NAN);
        let tolerance = tolerance_of(stat);
        let mut result = validate_claim(
            name,
            claim,
            &ClaimValue::Number(actual),
            FieldKind::Numeric,
            config,
            tolerance,
        )
        .with_source(Some(format!("samples.{stat}")));

        if result.status == ValidationStatus::Fail {
            if let Some(c) = claim.as_number() {
                result.alternatives = matching_stats(c, stat, &snapshot, tolerance);
            }
        }
        results.insert(name.clone(), result);
    }

    if let Some(finding) = claimed_consistency(claimed, config.matching.tolerance, Some(&snapshot)) {
        results.insert(CONSISTENCY_KEY.to_string(), finding);
    }

    let computed: BTreeMap<&'static str, f64> = STAT_FIELDS
        .iter()
        .filter_map(|stat| Some((*stat, snapshot.value(stat)?)))
        .collect();
    let violations = consistency_violations(&computed, config.matching.tolerance);
    if !violations.is_empty() {
        log::warn!("recomputed statistics violate invariants: {}", violations.join("; "));
        results.insert(
            SNAPSHOT_KEY.to_string(),
            finding(
                format!("recomputed statistics are inconsistent: {}", violations.join("; ")),
                BTreeMap::new(),
            ),
        );
    }

    Ok(results)
}

/// Check the claimed statistics against each other, independent of any
/// ground truth. With a snapshot, the finding lists the real values of the
/// statistics involved.
pub fn claimed_consistency(
    claimed: &BTreeMap<String, ClaimValue>,
    tolerance: f64,
    snapshot: Option<&StatisticalSnapshot>,
) -> Option<ValidationResult> {
    let claimed_values: BTreeMap<&'static str, f64> = claimed
        .iter()
        .filter_map(|(name, v)| Some((canonical_stat(name)?, v.as_number()?)))
        .collect();
    let violations = consistency_violations(&claimed_values, tolerance);
    if violations.is_empty() {
        return None;
    }
    let alternatives = match snapshot {
        Some(s) => claimed_values
            .keys()
            .filter_map(|stat| Some((stat.to_string(), ClaimValue::Number(s.value(stat)?))))
            .collect(),
        None => BTreeMap::new(),
    };
    Some(finding(
        format!("claimed statistics are inconsistent: {}", violations.join("; ")),
        alternatives,
    ))
}

fn finding(message: String, alternatives: BTreeMap<String, ClaimValue>) -> ValidationResult {
    ValidationResult {
        status: ValidationStatus::Fail,
        claimed: None,
        actual: None,
        confidence: 0.0,
        match_type: MatchType::Consistency,
        message,
        percent_error: None,
        source_path: None,
        suggestions: Vec::new(),
        alternatives,
    }
}

/// Other statistics the claimed value would have matched, e.g. a "max"
/// that is really the p90.
fn matching_stats(
    claimed: f64,
    stat: &str,
    snapshot: &StatisticalSnapshot,
    tolerance: f64,
) -> BTreeMap<String, ClaimValue> {
    STAT_FIELDS
        .iter()
        .filter(|other| **other != stat)
        .filter_map(|other| {
            let v = snapshot.value(other)?;
            tolerance_confidence(relative_error(claimed, v), tolerance)
                .map(|_| (other.to_string(), ClaimValue::Number(v)))
        })
        .collect()
}

fn suggest_stats(name: &str, config: &VerifyConfig) -> Vec<String> {
    let mut ranked: Vec<(f64, &str)> = STAT_FIELDS
        .iter()
        .filter_map(|stat| {
            near_miss(name, stat, config.matching.suggestion_max_distance).map(|s| (s, *stat))
        })
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    ranked
        .into_iter()
        .take(config.matching.max_suggestions)
        .map(|(_, stat)| stat.to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Consistency rules
// ---------------------------------------------------------------------------

/// Cross-field invariants over whichever statistics are present.
pub fn consistency_violations(values: &BTreeMap<&str, f64>, tolerance: f64) -> Vec<String> {
    let get = |k: &str| values.get(k).copied();
    let le = |a: f64, b: f64| a <= b + ORDER_SLACK * a.abs().max(b.abs()).max(1.0);
    let f = format_number;
    let mut out = Vec::new();

    let (min, max) = (get("min"), get("max"));
    if let (Some(lo), Some(hi)) = (min, max) {
        if !le(lo, hi) {
            out.push(format!("min ({}) is greater than max ({})", f(lo), f(hi)));
        }
    }

    for stat in ["mean", "median", "p10", "p25", "p50", "p75", "p90"] {
        let Some(v) = get(stat) else { continue };
        if let Some(lo) = min {
            if !le(lo, v) {
                out.push(format!("{stat} ({}) is below min ({})", f(v), f(lo)));
            }
        }
        if let Some(hi) = max {
            if !le(v, hi) {
                out.push(format!("{stat} ({}) is above max ({})", f(v), f(hi)));
            }
        }
    }

    let ladder: Vec<(&str, f64)> = ["p10", "p25", "p50", "p75", "p90"]
        .iter()
        .filter_map(|k| get(k).map(|v| (*k, v)))
        .collect();
    for pair in ladder.windows(2) {
        let ((a, va), (b, vb)) = (pair[0], pair[1]);
        if !le(va, vb) {
            out.push(format!("{a} ({}) is greater than {b} ({})", f(va), f(vb)));
        }
    }

    if let (Some(median), Some(p50)) = (get("median"), get("p50")) {
        if tolerance_confidence(relative_error(median, p50), tolerance).is_none() {
            out.push(format!("median ({}) differs from p50 ({})", f(median), f(p50)));
        }
    }

    if let Some(std) = get("std") {
        if std < 0.0 {
            out.push(format!("std ({}) is negative", f(std)));
        }
        if let (Some(lo), Some(hi)) = (min, max) {
            let bound = (hi - lo) / 2.0;
            if lo <= hi && !le(std, bound) {
                out.push(format!(
                    "std ({}) exceeds half the range ({})",
                    f(std),
                    f(bound)
                ));
            }
        }
    }

    if let (Some(rms), Some(mean)) = (get("rms"), get("mean")) {
        if !le(mean.abs(), rms) {
            out.push(format!("rms ({}) is below |mean| ({})", f(rms), f(mean.abs())));
        }
    }

    out
}
