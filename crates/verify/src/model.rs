use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::ClaimValue;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Read-only metadata for one dataset, as supplied by the ground-truth
/// provider. Arbitrarily nested; may hold opaque structured-text blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataDocument(Value);

impl MetadataDocument {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn root(&self) -> Option<&serde_json::Map<String, Value>> {
        self.0.as_object()
    }

    /// Dotted-path lookup (`crs_info.epsg`, `axes.0.name`).
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.0, path)
    }
}

impl From<Value> for MetadataDocument {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

pub(crate) fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Claimed field name -> claimed value. Ordered so reports are stable.
pub type Claims = BTreeMap<String, ClaimValue>;

/// `{axis: [min, max]}` descriptor of valid spatial index ranges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidRanges(pub BTreeMap<String, [f64; 2]>);

impl ValidRanges {
    pub fn get(&self, axis: &str) -> Option<[f64; 2]> {
        self.0.get(axis).copied().or_else(|| {
            self.0
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(axis))
                .map(|(_, r)| *r)
        })
    }

    pub fn axes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Everything the ground-truth provider supplied for one reconciliation.
#[derive(Debug, Clone, Copy)]
pub struct GroundTruth<'a> {
    pub document: &'a MetadataDocument,
    pub samples: Option<&'a [f64]>,
    pub valid_ranges: Option<&'a ValidRanges>,
}

impl<'a> GroundTruth<'a> {
    pub fn document(document: &'a MetadataDocument) -> Self {
        Self {
            document,
            samples: None,
            valid_ranges: None,
        }
    }

    pub fn with_samples(mut self, samples: &'a [f64]) -> Self {
        self.samples = Some(samples);
        self
    }

    pub fn with_ranges(mut self, ranges: &'a ValidRanges) -> Self {
        self.valid_ranges = Some(ranges);
        self
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// How a field value was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    RootKey,
    KnownLocation,
    ParsedText,
    KeyScan,
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RootKey => write!(f, "root_key"),
            Self::KnownLocation => write!(f, "known_location"),
            Self::ParsedText => write!(f, "parsed_text"),
            Self::KeyScan => write!(f, "key_scan"),
        }
    }
}

/// Where (and whether) a field was found. `source_path` is always set when
/// `found` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResolution {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ResolutionStrategy>,
}

impl FieldResolution {
    pub fn found(
        canonical: Option<String>,
        value: Value,
        source_path: String,
        strategy: ResolutionStrategy,
    ) -> Self {
        Self {
            found: true,
            canonical,
            value: Some(value),
            source_path: Some(source_path),
            strategy: Some(strategy),
        }
    }

    pub fn not_found(canonical: Option<String>) -> Self {
        Self {
            found: false,
            canonical,
            value: None,
            source_path: None,
            strategy: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Pass,
    Partial,
    Fail,
    NotFound,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Partial => write!(f, "PARTIAL"),
            Self::Fail => write!(f, "FAIL"),
            Self::NotFound => write!(f, "NOT_FOUND"),
        }
    }
}

/// Which matcher tier (or auditor rule) produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    NumericTolerance,
    UnitEquivalent,
    CaseInsensitive,
    Fuzzy,
    UnitMismatch,
    TypeMismatch,
    Mismatch,
    InRange,
    OutOfRange,
    Consistency,
    NotFound,
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Exact => "exact",
            Self::NumericTolerance => "numeric_tolerance",
            Self::UnitEquivalent => "unit_equivalent",
            Self::CaseInsensitive => "case_insensitive",
            Self::Fuzzy => "fuzzy",
            Self::UnitMismatch => "unit_mismatch",
            Self::TypeMismatch => "type_mismatch",
            Self::Mismatch => "mismatch",
            Self::InRange => "in_range",
            Self::OutOfRange => "out_of_range",
            Self::Consistency => "consistency",
            Self::NotFound => "not_found",
        };
        f.write_str(s)
    }
}

/// Per-claim verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed: Option<ClaimValue>,
    /// Absent when `status` is `NOT_FOUND`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<ClaimValue>,
    pub confidence: f64,
    pub match_type: MatchType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_error: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub alternatives: BTreeMap<String, ClaimValue>,
}

impl ValidationResult {
    pub fn not_found(claimed: Option<ClaimValue>, message: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::NotFound,
            claimed,
            actual: None,
            confidence: 0.0,
            match_type: MatchType::NotFound,
            message: message.into(),
            percent_error: None,
            source_path: None,
            suggestions: Vec::new(),
            alternatives: BTreeMap::new(),
        }
    }

    pub fn with_source(mut self, path: Option<String>) -> Self {
        self.source_path = path;
        self
    }
}

// ---------------------------------------------------------------------------
// Batch report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Pass,
    MostlyValid,
    PartiallyValid,
    Fail,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::MostlyValid => write!(f, "MOSTLY_VALID"),
            Self::PartiallyValid => write!(f, "PARTIALLY_VALID"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub passed: usize,
    pub partial: usize,
    pub failed: usize,
    pub not_found: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub overall_status: OverallStatus,
    /// Unweighted mean of per-field confidences.
    pub validation_score: f64,
    /// Confidence weighted by field importance, normalized over present fields.
    pub weighted_score: f64,
    pub counts: StatusCounts,
    pub details: BTreeMap<String, ValidationResult>,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

/// Descriptive statistics recomputed from raw samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticalSnapshot {
    /// Finite samples used.
    pub count: usize,
    /// NaN / infinite samples excluded.
    pub non_finite: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub rms: f64,
    pub percentiles: Percentiles,
}

impl StatisticalSnapshot {
    /// Value of a canonical statistic name (`min`, `p90`, ...).
    pub fn value(&self, name: &str) -> Option<f64> {
        let v = match name {
            "min" => self.min,
            "max" => self.max,
            "mean" => self.mean,
            "median" => self.median,
            "std" => self.std,
            "rms" => self.rms,
            "p10" => self.percentiles.p10,
            "p25" => self.percentiles.p25,
            "p50" => self.percentiles.p50,
            "p75" => self.percentiles.p75,
            "p90" => self.percentiles.p90,
            _ => return None,
        };
        Some(v)
    }

    /// All canonical statistics as a name -> value map.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        crate::stats::STAT_FIELDS
            .iter()
            .filter_map(|name| self.value(name).map(|v| (name.to_string(), v)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Everything the resolver can reach in one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Dotted path -> leaf value.
    pub fields: BTreeMap<String, Value>,
    /// `<path> (parsed: <sub-field>)` -> value extracted from structured text.
    pub parsed: BTreeMap<String, String>,
    /// Canonical field -> resolution, for every configured field that resolves.
    pub resolved: BTreeMap<String, FieldResolution>,
    /// Paths of structured-text blocks that could not be parsed.
    pub unparseable: Vec<String>,
}

// ---------------------------------------------------------------------------
// Provenance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProvenanceSubject {
    Samples { count: usize },
    Document,
}

/// Fingerprint and extraction context of data shown to a client.
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// BLAKE3 hex digest of the canonical byte form of the data.
    pub content_hash: String,
    pub subject: ProvenanceSubject,
    pub extraction_params: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<StatisticalSnapshot>,
    /// RFC 3339, UTC.
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceCheck {
    pub matches: bool,
    pub expected_hash: String,
    pub actual_hash: String,
}
