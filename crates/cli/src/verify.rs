//! `vcheck` subcommands: run the engine on file inputs, print one JSON value
//! to stdout (`--json`) or a human summary to stderr, and map the verdict to
//! an exit code.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use voxcheck_verify::engine::strip_location;
use voxcheck_verify::model::{ProvenanceCheck, ProvenanceSubject};
use voxcheck_verify::value::format_number;
use voxcheck_verify::{
    BatchReport, ClaimValue, Claims, FieldResolution, GroundTruth, MetadataDocument,
    StatisticalSnapshot, ValidationStatus, Verifier, VerifyConfig, VerifyError,
};

use crate::exit_codes::{verdict_exit_code, EXIT_PROVENANCE_MISMATCH, EXIT_SUCCESS};
use crate::input::{
    parse_params, read_claims, read_metadata, read_ranges, read_record, read_samples,
};
use crate::CliError;

// ============================================================================
// Output
// ============================================================================

fn emit_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::general(format!("cannot serialize output: {e}")))?;
    println!("{text}");
    Ok(())
}

fn verdict(report: &BatchReport) -> Result<(), CliError> {
    match verdict_exit_code(report.overall_status) {
        EXIT_SUCCESS => Ok(()),
        code => Err(CliError::exit(code)),
    }
}

fn status_label(status: ValidationStatus) -> &'static str {
    match status {
        ValidationStatus::Pass => "PASS",
        ValidationStatus::Partial => "PARTIAL",
        ValidationStatus::Fail => "FAIL",
        ValidationStatus::NotFound => "NOT_FOUND",
    }
}

fn print_report(report: &BatchReport) {
    let width = report.details.keys().map(String::len).max().unwrap_or(0).min(32);
    for (field, r) in &report.details {
        eprintln!(
            "  {:<9}  {:<width$}  {:.2}  {}",
            status_label(r.status),
            field,
            r.confidence,
            r.message
        );
        for (name, alt) in &r.alternatives {
            eprintln!("  {:<9}  {:<width$}        {name} = {alt}", "", "");
        }
    }
    let c = &report.counts;
    eprintln!();
    eprintln!(
        "{}: {} passed, {} partial, {} failed, {} not found",
        report.overall_status, c.passed, c.partial, c.failed, c.not_found
    );
    eprintln!(
        "score: {:.3} (weighted {:.3})",
        report.validation_score, report.weighted_score
    );
}

// ============================================================================
// reconcile
// ============================================================================

pub fn cmd_reconcile(
    config: VerifyConfig,
    metadata: &Path,
    claims: &Path,
    samples: Option<&Path>,
    column: Option<&str>,
    ranges: Option<&Path>,
    json: bool,
) -> Result<(), CliError> {
    let document = read_metadata(metadata)?;
    let claims = read_claims(claims)?;
    let samples = samples.map(|p| read_samples(p, column)).transpose()?;
    let ranges = ranges.map(read_ranges).transpose()?;

    let mut truth = GroundTruth::document(&document);
    if let Some(samples) = &samples {
        truth = truth.with_samples(samples);
    }
    if let Some(ranges) = &ranges {
        truth = truth.with_ranges(ranges);
    }

    let verifier = Verifier::new(config);
    let report = verifier.reconcile(truth, &claims).map_err(CliError::verify)?;

    if json {
        emit_json(&report)?;
    } else {
        print_report(&report);
    }
    verdict(&report)
}

// ============================================================================
// discover / resolve
// ============================================================================

pub fn cmd_discover(config: VerifyConfig, metadata: &Path, json: bool) -> Result<(), CliError> {
    let document = read_metadata(metadata)?;
    let report = Verifier::new(config).discover(&document);

    if json {
        return emit_json(&report);
    }

    eprintln!("{} fields", report.fields.len());
    for (path, value) in &report.fields {
        eprintln!("  {path} = {}", preview(value));
    }
    if !report.parsed.is_empty() {
        eprintln!("{} parsed from structured text", report.parsed.len());
        for (path, value) in &report.parsed {
            eprintln!("  {path} = {value}");
        }
    }
    if !report.resolved.is_empty() {
        eprintln!("{} known fields resolved", report.resolved.len());
        for (canonical, r) in &report.resolved {
            eprintln!("  {canonical} <- {}", r.source_path.as_deref().unwrap_or("?"));
        }
    }
    for path in &report.unparseable {
        eprintln!("warning: {path} looks like structured text but could not be parsed");
    }
    Ok(())
}

#[derive(Serialize)]
struct ResolveOutput<'a> {
    field: &'a str,
    #[serde(flatten)]
    resolution: FieldResolution,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    suggestions: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    alternatives: BTreeMap<String, ClaimValue>,
}

/// Exit 0 whether or not the field resolves; `found` carries the answer.
pub fn cmd_resolve(
    config: VerifyConfig,
    field: &str,
    metadata: &Path,
    json: bool,
) -> Result<(), CliError> {
    let document = read_metadata(metadata)?;
    let verifier = Verifier::new(config);
    let resolution = verifier.resolve(&document, field);
    let (suggestions, alternatives) = if resolution.found {
        (Vec::new(), BTreeMap::new())
    } else {
        verifier.suggest(&document, field)
    };

    if !json {
        match (&resolution.value, &resolution.source_path, resolution.strategy) {
            (Some(value), Some(path), Some(strategy)) => {
                eprintln!("{field} = {}", preview(value));
                eprintln!("  at {path} ({strategy})");
            }
            _ => {
                eprintln!("{field}: not found");
                for s in &suggestions {
                    match alternatives.get(s) {
                        Some(v) => eprintln!("  did you mean {s} = {v}"),
                        None => eprintln!("  did you mean {s}"),
                    }
                }
            }
        }
        return Ok(());
    }

    emit_json(&ResolveOutput { field, resolution, suggestions, alternatives })
}

fn preview(value: &Value) -> String {
    const MAX: usize = 72;
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > MAX {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}...")
    } else {
        text
    }
}

// ============================================================================
// stats / coords
// ============================================================================

pub fn cmd_stats(
    config: VerifyConfig,
    samples: &Path,
    column: Option<&str>,
    claims: Option<&Path>,
    tolerance: Option<f64>,
    json: bool,
) -> Result<(), CliError> {
    if let Some(t) = tolerance {
        if !(t > 0.0 && t <= 1.0) {
            return Err(CliError::args(format!("--tolerance must be in (0, 1], got {t}")));
        }
    }
    let samples = read_samples(samples, column)?;
    let verifier = Verifier::new(config);

    let Some(claims) = claims else {
        let snapshot = verifier.snapshot(&samples).map_err(CliError::verify)?;
        if json {
            return emit_json(&snapshot);
        }
        print_snapshot(&snapshot);
        return Ok(());
    };

    let claims = read_claims(claims)?;
    if claims.is_empty() {
        return Err(CliError::verify(VerifyError::EmptyClaims));
    }
    let details = verifier
        .audit_statistics(&samples, &claims, tolerance)
        .map_err(CliError::verify)?;
    let report = verifier.score(details);

    if json {
        emit_json(&report)?;
    } else {
        print_report(&report);
    }
    verdict(&report)
}

fn print_snapshot(s: &StatisticalSnapshot) {
    eprintln!("{} samples ({} non-finite excluded)", s.count, s.non_finite);
    for (name, value) in s.to_map() {
        eprintln!("  {name:<7} {}", format_number(value));
    }
}

pub fn cmd_coords(
    config: VerifyConfig,
    ranges: &Path,
    claims: &Path,
    json: bool,
) -> Result<(), CliError> {
    let ranges = read_ranges(ranges)?;
    let claims = read_claims(claims)?;
    if claims.is_empty() {
        return Err(CliError::verify(VerifyError::EmptyClaims));
    }
    // Accept both `inline` and `location.inline`
    let location: Claims = claims
        .into_iter()
        .map(|(k, v)| (strip_location(&k).map(str::to_string).unwrap_or(k), v))
        .collect();

    let verifier = Verifier::new(config);
    let details = verifier.audit_coordinates(&ranges, &location).map_err(CliError::verify)?;
    let report = verifier.score(details);

    if json {
        emit_json(&report)?;
    } else {
        print_report(&report);
    }
    verdict(&report)
}

// ============================================================================
// provenance
// ============================================================================

pub fn cmd_provenance_record(
    config: VerifyConfig,
    samples: Option<&Path>,
    metadata: Option<&Path>,
    column: Option<&str>,
    params: &[String],
    output: Option<&Path>,
    json: bool,
) -> Result<(), CliError> {
    let mut params = parse_params(params)?;
    let verifier = Verifier::new(config);

    let record = match (samples, metadata) {
        (Some(path), _) => {
            params
                .entry("source".to_string())
                .or_insert_with(|| Value::String(path.display().to_string()));
            let samples = read_samples(path, column)?;
            verifier.record_samples(&samples, params).map_err(CliError::verify)?
        }
        (None, Some(path)) => {
            params
                .entry("source".to_string())
                .or_insert_with(|| Value::String(path.display().to_string()));
            let document = read_metadata(path)?;
            verifier.record_document(&document, params)
        }
        (None, None) => return Err(CliError::args("pass --samples or --metadata")),
    };

    match output {
        Some(path) => {
            let text = serde_json::to_string_pretty(&record)
                .map_err(|e| CliError::general(format!("cannot serialize record: {e}")))?;
            std::fs::write(path, text + "\n")
                .map_err(|e| CliError::args(format!("cannot write {}: {e}", path.display())))?;
            if json {
                emit_json(&record)?;
            }
            eprintln!("recorded {} -> {}", record.content_hash, path.display());
            Ok(())
        }
        None => emit_json(&record),
    }
}

pub fn cmd_provenance_verify(
    config: VerifyConfig,
    record: &Path,
    samples: Option<&Path>,
    metadata: Option<&Path>,
    column: Option<&str>,
    json: bool,
) -> Result<(), CliError> {
    let stored = read_record(record)?;
    let verifier = Verifier::new(config);

    let check: ProvenanceCheck = match (&stored.subject, samples, metadata) {
        (ProvenanceSubject::Samples { .. }, Some(path), _) => {
            let samples = read_samples(path, column)?;
            verifier.verify_samples(&stored, &samples)
        }
        (ProvenanceSubject::Document, None, Some(path)) => {
            let document: MetadataDocument = read_metadata(path)?;
            verifier.verify_document(&stored, &document)
        }
        (ProvenanceSubject::Samples { .. }, ..) => {
            return Err(CliError::args("record fingerprints samples; pass --samples"));
        }
        (ProvenanceSubject::Document, ..) => {
            return Err(CliError::args("record fingerprints a metadata document; pass --metadata"));
        }
    };

    if json {
        emit_json(&check)?;
    } else if check.matches {
        eprintln!("ok: {} (recorded {})", check.actual_hash, stored.created_at);
    } else {
        eprintln!("MISMATCH");
        eprintln!("  expected {}", check.expected_hash);
        eprintln!("  actual   {}", check.actual_hash);
    }

    if check.matches {
        Ok(())
    } else {
        Err(CliError::exit(EXIT_PROVENANCE_MISMATCH))
    }
}

// ============================================================================
// config
// ============================================================================

#[derive(Serialize)]
struct ConfigSummary<'a> {
    valid: bool,
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Validate a tables file given on the command line.
pub fn cmd_config_validate(path: &Path, json: bool) -> Result<(), CliError> {
    let source = path.display().to_string();
    match VerifyConfig::load(path) {
        Ok(config) => cmd_config_report(&config, &source, json),
        Err(err) => {
            if json {
                emit_json(&ConfigSummary {
                    valid: false,
                    source: &source,
                    name: None,
                    error: Some(err.to_string()),
                })?;
            }
            // An unreadable file is a usage error; anything else is a bad config
            Err(CliError::verify(err))
        }
    }
}

/// Report on tables that already loaded (and therefore validated).
pub fn cmd_config_report(config: &VerifyConfig, source: &str, json: bool) -> Result<(), CliError> {
    if json {
        return emit_json(&ConfigSummary {
            valid: true,
            source,
            name: Some(&config.name),
            error: None,
        });
    }
    eprintln!(
        "ok: '{}' from {} ({} aliased fields, {} unit classes, tolerance {})",
        config.name,
        source,
        config.aliases.len(),
        config.units.len(),
        config.matching.tolerance
    );
    Ok(())
}

pub fn cmd_config_show(config: &VerifyConfig, source: &str, json: bool) -> Result<(), CliError> {
    if json {
        #[derive(Serialize)]
        struct Shown<'a> {
            source: &'a str,
            config: &'a VerifyConfig,
        }
        return emit_json(&Shown { source, config });
    }
    let text = toml::to_string_pretty(config)
        .map_err(|e| CliError::general(format!("cannot render config: {e}")))?;
    eprintln!("# source: {source}");
    print!("{text}");
    Ok(())
}
