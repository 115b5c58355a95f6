use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use crate::cache::{ParseCache, SharedParseCache};
use crate::config::{FieldKind, VerifyConfig};
use crate::coords;
use crate::error::{Result, VerifyError};
use crate::evidence::compute_report;
use crate::matcher::{match_values, validate_claim, MatchOutcome};
use crate::model::{
    BatchReport, Claims, DiscoveryReport, FieldResolution, GroundTruth, MetadataDocument,
    ProvenanceCheck, ProvenanceRecord, StatisticalSnapshot, ValidRanges, ValidationResult,
};
use crate::provenance;
use crate::resolver::Resolver;
use crate::stats;
use crate::value::ClaimValue;

/// Claim names with this prefix are coordinate claims (`location.inline`).
pub const LOCATION_PREFIX: &str = "location.";

/// The verification engine.
///
/// Holds the static tables and the structured-text parse cache; everything
/// else is supplied per call. Safe to share across threads.
pub struct Verifier {
    config: RwLock<Arc<VerifyConfig>>,
    cache: Arc<dyn ParseCache>,
}

impl Verifier {
    pub fn new(config: VerifyConfig) -> Self {
        Self::with_cache(config, Arc::new(SharedParseCache::new()))
    }

    /// Use an externally owned cache (shared between engines, or a fresh one
    /// per test).
    pub fn with_cache(mut config: VerifyConfig, cache: Arc<dyn ParseCache>) -> Self {
        config.reindex();
        Self {
            config: RwLock::new(Arc::new(config)),
            cache,
        }
    }

    /// Current tables. Calls in flight keep the snapshot they started with.
    pub fn config(&self) -> Arc<VerifyConfig> {
        self.config.read().clone()
    }

    pub fn cache(&self) -> &Arc<dyn ParseCache> {
        &self.cache
    }

    /// Swap in new tables atomically.
    pub fn reload(&self, config: VerifyConfig) -> Result<()> {
        let config = config.prepare()?;
        log::info!("verification tables reloaded: {}", config.name);
        *self.config.write() = Arc::new(config);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Single-field operations
    // -----------------------------------------------------------------------

    pub fn resolve(&self, document: &MetadataDocument, field: &str) -> FieldResolution {
        let config = self.config();
        Resolver::new(&config, self.cache.as_ref()).resolve(document, field)
    }

    /// Classify one claimed value against one actual value with the global
    /// tolerance.
    pub fn match_value(&self, claimed: &ClaimValue, actual: &ClaimValue, kind: FieldKind) -> MatchOutcome {
        let config = self.config();
        match_values(claimed, actual, kind, &config, config.matching.tolerance)
    }

    /// Resolve a metadata field and validate one claim against it.
    pub fn validate_field(
        &self,
        document: &MetadataDocument,
        field: &str,
        claimed: &ClaimValue,
    ) -> ValidationResult {
        let config = self.config();
        validate_field(&config, self.cache.as_ref(), document, field, claimed)
    }

    pub fn snapshot(&self, samples: &[f64]) -> Result<StatisticalSnapshot> {
        stats::compute_snapshot(samples)
    }

    /// Validate claimed statistics against raw samples. Without an explicit
    /// `tolerance` each statistic uses its configured one.
    pub fn audit_statistics(
        &self,
        samples: &[f64],
        claimed: &BTreeMap<String, ClaimValue>,
        tolerance: Option<f64>,
    ) -> Result<BTreeMap<String, ValidationResult>> {
        let config = self.config();
        match tolerance {
            Some(tolerance) => stats::audit_statistics(samples, claimed, tolerance, &config),
            None => stats::audit_statistics_with(samples, claimed, &config, |stat| {
                config.tolerance_for(stat)
            }),
        }
    }

    pub fn audit_coordinates(
        &self,
        ranges: &ValidRanges,
        claimed_location: &BTreeMap<String, ClaimValue>,
    ) -> Result<BTreeMap<String, ValidationResult>> {
        coords::audit_coordinates(ranges, claimed_location)
    }

    // -----------------------------------------------------------------------
    // Batch
    // -----------------------------------------------------------------------

    /// Validate every claim and score the batch.
    ///
    /// Dispatch per claim:
    /// - `location.<axis>` or a configured coordinate axis: Coordinate Auditor
    /// - a statistic name, when samples were supplied: Statistics Auditor
    /// - anything else: Field Resolver + Value Matcher
    pub fn reconcile(&self, truth: GroundTruth<'_>, claims: &Claims) -> Result<BatchReport> {
        if claims.is_empty() {
            return Err(VerifyError::EmptyClaims);
        }
        let config = self.config();

        let mut coordinate_claims: Vec<(&String, &str, &ClaimValue)> = Vec::new();
        let mut stat_claims: BTreeMap<String, ClaimValue> = BTreeMap::new();
        let mut field_claims: Vec<(&String, &ClaimValue)> = Vec::new();
        for (name, value) in claims {
            if let Some(axis) = strip_location(name) {
                coordinate_claims.push((name, axis, value));
            } else if config.is_coordinate_axis(name) {
                coordinate_claims.push((name, name.as_str(), value));
            } else if truth.samples.is_some() && stats::is_statistic(name) {
                stat_claims.insert(name.clone(), value.clone());
            } else {
                field_claims.push((name, value));
            }
        }
        log::debug!(
            "reconcile: {} field, {} statistic, {} coordinate claims",
            field_claims.len(),
            stat_claims.len(),
            coordinate_claims.len()
        );

        let mut details = BTreeMap::new();

        if !coordinate_claims.is_empty() {
            let ranges = truth.valid_ranges.ok_or_else(|| VerifyError::MissingValidRanges {
                axes: coordinate_claims.iter().map(|(_, axis, _)| axis.to_string()).collect(),
            })?;
            coords::check_ranges(ranges)?;
            for (name, axis, value) in coordinate_claims {
                details.insert(name.clone(), coords::audit_axis(ranges, axis, value));
            }
        }

        if let Some(samples) = truth.samples {
            if !stat_claims.is_empty() {
                let results = stats::audit_statistics_with(samples, &stat_claims, &config, |stat| {
                    config.tolerance_for(stat)
                })?;
                details.extend(results);
            }
        }

        for (name, value) in &field_claims {
            details.insert(
                (*name).clone(),
                validate_field(&config, self.cache.as_ref(), truth.document, name, value),
            );
        }

        // Claimed statistics checked against each other even without samples
        if truth.samples.is_none() {
            if let Some(finding) = stats::claimed_consistency(claims, config.matching.tolerance, None) {
                details.insert(stats::CONSISTENCY_KEY.to_string(), finding);
            }
        }

        let report = score_with(&config, details);
        log::debug!(
            "reconcile: {} (weighted {:.3}, unweighted {:.3})",
            report.overall_status,
            report.weighted_score,
            report.validation_score
        );
        Ok(report)
    }

    /// Score results produced by the individual auditors, weighing each key
    /// the way `reconcile` does.
    pub fn score(&self, details: BTreeMap<String, ValidationResult>) -> BatchReport {
        score_with(&self.config(), details)
    }

    /// Near-miss paths (and their values) for a field that did not resolve.
    pub fn suggest(
        &self,
        document: &MetadataDocument,
        field: &str,
    ) -> (Vec<String>, BTreeMap<String, ClaimValue>) {
        let config = self.config();
        Resolver::new(&config, self.cache.as_ref()).suggest(document, field)
    }

    /// Every field reachable in a document, for callers to inspect before
    /// asserting anything.
    pub fn discover(&self, document: &MetadataDocument) -> DiscoveryReport {
        let config = self.config();
        Resolver::new(&config, self.cache.as_ref()).discover(document)
    }

    // -----------------------------------------------------------------------
    // Provenance
    // -----------------------------------------------------------------------

    pub fn record_samples(
        &self,
        samples: &[f64],
        params: BTreeMap<String, Value>,
    ) -> Result<ProvenanceRecord> {
        provenance::record_samples(samples, params)
    }

    pub fn record_samples_at(
        &self,
        samples: &[f64],
        params: BTreeMap<String, Value>,
        at: DateTime<Utc>,
    ) -> Result<ProvenanceRecord> {
        provenance::record_samples_at(samples, params, at)
    }

    pub fn record_document(
        &self,
        document: &MetadataDocument,
        params: BTreeMap<String, Value>,
    ) -> ProvenanceRecord {
        provenance::record_document(document, params)
    }

    pub fn verify_samples(&self, record: &ProvenanceRecord, samples: &[f64]) -> ProvenanceCheck {
        provenance::verify_samples(record, samples)
    }

    pub fn verify_document(
        &self,
        record: &ProvenanceRecord,
        document: &MetadataDocument,
    ) -> ProvenanceCheck {
        provenance::verify_document(record, document)
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(VerifyConfig::builtin())
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("config", &self.config().name)
            .field("cache", &self.cache)
            .finish()
    }
}

fn validate_field(
    config: &VerifyConfig,
    cache: &dyn ParseCache,
    document: &MetadataDocument,
    field: &str,
    claimed: &ClaimValue,
) -> ValidationResult {
    let resolver = Resolver::new(config, cache);
    let resolution = resolver.resolve(document, field);
    let actual = resolution.value.as_ref().and_then(ClaimValue::from_json);

    let (Some(actual), Some(source)) = (actual, resolution.source_path) else {
        let (suggestions, alternatives) = resolver.suggest(document, field);
        let mut message = format!("'{field}' not found in metadata");
        if !suggestions.is_empty() {
            message.push_str(&format!(" (did you mean: {})", suggestions.join(", ")));
        }
        let mut result = ValidationResult::not_found(Some(claimed.clone()), message);
        result.suggestions = suggestions;
        result.alternatives = alternatives;
        return result;
    };

    let canonical = resolution.canonical.as_deref().unwrap_or(field);
    validate_claim(
        field,
        claimed,
        &actual,
        config.kind(canonical),
        config,
        config.tolerance_for(canonical),
    )
    .with_source(Some(source))
}

/// Axis name of a `location.<axis>` claim, prefix matched without case.
pub fn strip_location(name: &str) -> Option<&str> {
    let prefix = name.get(..LOCATION_PREFIX.len())?;
    if prefix.eq_ignore_ascii_case(LOCATION_PREFIX) {
        Some(&name[LOCATION_PREFIX.len()..])
    } else {
        None
    }
}

fn score_with(config: &VerifyConfig, details: BTreeMap<String, ValidationResult>) -> BatchReport {
    compute_report(details, |key| config.weight(&weight_key(config, key)))
}

/// Name a result is weighed under.
fn weight_key(config: &VerifyConfig, key: &str) -> String {
    if key.starts_with('_') {
        return key.to_string();
    }
    if let Some(axis) = strip_location(key) {
        return axis.to_lowercase();
    }
    if let Some(stat) = stats::canonical_stat(key) {
        return stat.to_string();
    }
    if config.is_coordinate_axis(key) {
        return key.to_lowercase();
    }
    config.canonical_or_self(key).to_string()
}
