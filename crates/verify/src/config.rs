use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VerifyError;

const BUILTIN_TABLES: &str = include_str!("../defaults.toml");

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Static verification tables: aliases, well-known locations, unit classes,
/// importance weights. Loaded once, swapped whole on reload.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Canonical field -> accepted spellings, in search order.
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
    /// Canonical field -> dotted paths where the value commonly lives.
    #[serde(default)]
    pub locations: BTreeMap<String, Vec<String>>,
    /// Canonical unit -> textual variants considered identical.
    #[serde(default)]
    pub units: BTreeMap<String, Vec<String>>,
    /// Per-field relative tolerance overriding `matching.tolerance`.
    #[serde(default)]
    pub tolerances: BTreeMap<String, f64>,
    #[serde(default)]
    pub field_kinds: BTreeMap<String, FieldKind>,
    /// Claim names treated as spatial indices during reconciliation.
    #[serde(default)]
    pub coordinate_axes: Vec<String>,

    #[serde(skip)]
    index: LookupIndex,
}

fn default_name() -> String {
    "custom".into()
}

// ---------------------------------------------------------------------------
// Matching + scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingConfig {
    /// Relative numeric tolerance (0.05 = 5%).
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Minimum normalized similarity for a fuzzy string match.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    /// Maximum edit distance for "did you mean" suggestions.
    #[serde(default = "default_suggestion_distance")]
    pub suggestion_max_distance: usize,
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
}

fn default_tolerance() -> f64 {
    0.05
}

fn default_fuzzy_threshold() -> f64 {
    0.85
}

fn default_suggestion_distance() -> usize {
    3
}

fn default_max_suggestions() -> usize {
    5
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            fuzzy_threshold: default_fuzzy_threshold(),
            suggestion_max_distance: default_suggestion_distance(),
            max_suggestions: default_max_suggestions(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    /// Weight for fields absent from `weights`.
    #[serde(default = "default_weight")]
    pub default_weight: f64,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

fn default_weight() -> f64 {
    0.5
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            default_weight: default_weight(),
            weights: BTreeMap::new(),
        }
    }
}

/// Type hint steering which matcher tiers apply to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Auto,
    Numeric,
    Text,
    Unit,
    /// Authority codes: `EPSG:32631` compares equal to `32631`.
    Code,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Numeric => write!(f, "numeric"),
            Self::Text => write!(f, "text"),
            Self::Unit => write!(f, "unit"),
            Self::Code => write!(f, "code"),
        }
    }
}

// ---------------------------------------------------------------------------
// Lookup index (derived, never serialized)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct LookupIndex {
    /// lowercase spelling -> canonical field
    alias: HashMap<String, String>,
    /// lowercase variant -> canonical unit
    unit: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl VerifyConfig {
    /// The tables shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_toml(BUILTIN_TABLES).expect("built-in verification tables are valid")
    }

    pub fn from_toml(input: &str) -> Result<Self, VerifyError> {
        let config: VerifyConfig =
            toml::from_str(input).map_err(|e| VerifyError::ConfigParse(e.to_string()))?;
        config.prepare()
    }

    /// Validate the tables and rebuild the lookup index from them. Needed
    /// after editing the public tables, or after deserializing directly.
    pub fn prepare(mut self) -> Result<Self, VerifyError> {
        self.validate()?;
        self.reindex();
        Ok(self)
    }

    pub(crate) fn reindex(&mut self) {
        self.index = self.build_index();
    }

    pub fn load(path: &Path) -> Result<Self, VerifyError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| VerifyError::Io(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&input)
    }

    pub fn validate(&self) -> Result<(), VerifyError> {
        let m = &self.matching;
        if !(m.tolerance > 0.0 && m.tolerance <= 1.0) {
            return Err(VerifyError::ConfigValidation(format!(
                "matching.tolerance must be in (0, 1], got {}",
                m.tolerance
            )));
        }
        if !(m.fuzzy_threshold > 0.0 && m.fuzzy_threshold <= 1.0) {
            return Err(VerifyError::ConfigValidation(format!(
                "matching.fuzzy_threshold must be in (0, 1], got {}",
                m.fuzzy_threshold
            )));
        }

        let s = &self.scoring;
        if !s.default_weight.is_finite() || s.default_weight < 0.0 {
            return Err(VerifyError::ConfigValidation(format!(
                "scoring.default_weight must be a non-negative number, got {}",
                s.default_weight
            )));
        }
        for (field, w) in &s.weights {
            if !w.is_finite() || *w < 0.0 {
                return Err(VerifyError::ConfigValidation(format!(
                    "weight for '{field}' must be a non-negative number, got {w}"
                )));
            }
        }

        for (field, t) in &self.tolerances {
            if !(*t >= 0.0 && *t <= 1.0) {
                return Err(VerifyError::ConfigValidation(format!(
                    "tolerance for '{field}' must be in [0, 1], got {t}"
                )));
            }
        }

        // A spelling may belong to one canonical field only
        let mut seen: HashMap<String, &str> = HashMap::new();
        for (canonical, spellings) in &self.aliases {
            for spelling in std::iter::once(canonical).chain(spellings) {
                let key = normalize_key(spelling);
                match seen.get(&key) {
                    Some(owner) if *owner != canonical.as_str() => {
                        return Err(VerifyError::ConfigValidation(format!(
                            "alias '{spelling}' is listed under both '{owner}' and '{canonical}'"
                        )));
                    }
                    _ => {
                        seen.insert(key, canonical);
                    }
                }
            }
        }

        let mut seen_units: HashMap<String, &str> = HashMap::new();
        for (canonical, variants) in &self.units {
            for variant in std::iter::once(canonical).chain(variants) {
                let key = variant.trim().to_lowercase();
                match seen_units.get(&key) {
                    Some(owner) if *owner != canonical.as_str() => {
                        return Err(VerifyError::ConfigValidation(format!(
                            "unit '{variant}' is listed under both '{owner}' and '{canonical}'"
                        )));
                    }
                    _ => {
                        seen_units.insert(key, canonical);
                    }
                }
            }
        }

        Ok(())
    }

    fn build_index(&self) -> LookupIndex {
        let mut index = LookupIndex::default();
        for (canonical, spellings) in &self.aliases {
            for spelling in std::iter::once(canonical).chain(spellings) {
                index.alias.insert(normalize_key(spelling), canonical.clone());
            }
        }
        for (canonical, variants) in &self.units {
            for variant in std::iter::once(canonical).chain(variants) {
                index.unit.insert(variant.trim().to_lowercase(), canonical.clone());
            }
        }
        index
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// Canonical field for a requested name, if it belongs to an alias group.
    pub fn canonical(&self, name: &str) -> Option<&str> {
        self.index.alias.get(&normalize_key(name)).map(String::as_str)
    }

    /// Canonical name when known, otherwise the name as given.
    pub fn canonical_or_self<'a>(&'a self, name: &'a str) -> &'a str {
        self.canonical(name).unwrap_or(name)
    }

    /// Spellings to search for a requested name.
    ///
    /// For an alias group the order is the group's own (canonical first, then
    /// aliases as configured), independent of which spelling was requested.
    pub fn candidates(&self, name: &str) -> Vec<String> {
        let Some(canonical) = self.canonical(name) else {
            return vec![name.to_string()];
        };
        let mut out = vec![canonical.to_string()];
        if let Some(spellings) = self.aliases.get(canonical) {
            for s in spellings {
                if !out.contains(s) {
                    out.push(s.clone());
                }
            }
        }
        out
    }

    pub fn locations(&self, canonical: &str) -> &[String] {
        self.locations.get(canonical).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Canonical unit class of a textual unit.
    pub fn unit_class(&self, unit: &str) -> Option<&str> {
        self.index.unit.get(&unit.trim().to_lowercase()).map(String::as_str)
    }

    pub fn weight(&self, canonical: &str) -> f64 {
        self.scoring
            .weights
            .get(canonical)
            .copied()
            .unwrap_or(self.scoring.default_weight)
    }

    pub fn tolerance_for(&self, canonical: &str) -> f64 {
        self.tolerances
            .get(canonical)
            .copied()
            .unwrap_or(self.matching.tolerance)
    }

    pub fn kind(&self, canonical: &str) -> FieldKind {
        self.field_kinds.get(canonical).copied().unwrap_or_default()
    }

    pub fn is_coordinate_axis(&self, name: &str) -> bool {
        self.coordinate_axes.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Case- and whitespace-insensitive key form.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables_parse() {
        let config = VerifyConfig::builtin();
        assert_eq!(config.name, "builtin");
        assert_eq!(config.matching.tolerance, 0.05);
        assert_eq!(config.matching.fuzzy_threshold, 0.85);
        assert!(config.aliases.contains_key("epsg_code"));
        assert!(config.is_coordinate_axis("Inline"));
    }

    #[test]
    fn alias_lookup_is_case_insensitive() {
        let config = VerifyConfig::builtin();
        assert_eq!(config.canonical("EPSG"), Some("epsg_code"));
        assert_eq!(config.canonical("srs_code"), Some("epsg_code"));
        assert_eq!(config.canonical("Epsg_Code"), Some("epsg_code"));
        assert_eq!(config.canonical("nonexistent"), None);
    }

    #[test]
    fn candidates_do_not_depend_on_requested_spelling() {
        let config = VerifyConfig::builtin();
        let a = config.candidates("epsg");
        let b = config.candidates("srs_code");
        assert_eq!(a, b);
        assert_eq!(a[0], "epsg_code");
        assert_eq!(config.candidates("custom_field"), vec!["custom_field".to_string()]);
    }

    #[test]
    fn unit_classes() {
        let config = VerifyConfig::builtin();
        assert_eq!(config.unit_class("Milliseconds"), Some("ms"));
        assert_eq!(config.unit_class("msec"), Some("ms"));
        assert_eq!(config.unit_class("metre"), Some("m"));
        assert_eq!(config.unit_class("furlong"), None);
    }

    #[test]
    fn weights_fall_back_to_default() {
        let config = VerifyConfig::builtin();
        assert_eq!(config.weight("shape"), 1.0);
        assert_eq!(config.weight("name"), 0.2);
        assert_eq!(config.weight("unlisted"), 0.5);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = VerifyConfig::from_toml("name = \"tiny\"").unwrap();
        assert_eq!(config.name, "tiny");
        assert_eq!(config.matching.tolerance, 0.05);
        assert_eq!(config.scoring.default_weight, 0.5);
        assert!(config.aliases.is_empty());
    }

    #[test]
    fn reject_bad_tolerance() {
        let err = VerifyConfig::from_toml("[matching]\ntolerance = 0.0").unwrap_err();
        assert!(err.to_string().contains("matching.tolerance"));
    }

    #[test]
    fn reject_negative_weight() {
        let err = VerifyConfig::from_toml("[scoring.weights]\nshape = -1.0").unwrap_err();
        assert!(err.to_string().contains("'shape'"));
    }

    #[test]
    fn reject_alias_in_two_groups() {
        let input = r#"
[aliases]
epsg_code = ["code"]
zone = ["Code"]
"#;
        let err = VerifyConfig::from_toml(input).unwrap_err();
        assert!(matches!(err, VerifyError::ConfigValidation(_)));
        assert!(err.to_string().contains("listed under both"));
    }

    #[test]
    fn reject_unit_in_two_classes() {
        let input = r#"
[units]
m = ["meter"]
mi = ["Meter"]
"#;
        assert!(VerifyConfig::from_toml(input).is_err());
    }

    #[test]
    fn reject_unknown_section() {
        let err = VerifyConfig::from_toml("[weightz]\nshape = 1.0");
        assert!(err.is_err(), "typo in section name should fail deserialization");
    }

    #[test]
    fn field_kinds_parse() {
        let config = VerifyConfig::from_toml("[field_kinds]\nepsg_code = \"code\"").unwrap();
        assert_eq!(config.kind("epsg_code"), FieldKind::Code);
        assert_eq!(config.kind("other"), FieldKind::Auto);
    }

    #[test]
    fn prepare_picks_up_edited_tables() {
        let mut config = VerifyConfig::builtin();
        config.aliases.insert("inline_count".into(), vec!["n_inlines".into()]);
        assert_eq!(config.canonical("n_inlines"), None);

        let config = config.prepare().unwrap();
        assert_eq!(config.canonical("n_inlines"), Some("inline_count"));

        let mut clash = config.clone();
        clash.aliases.insert("zone".into(), vec!["n_inlines".into()]);
        assert!(matches!(clash.prepare(), Err(VerifyError::ConfigValidation(_))));
    }

    #[test]
    fn deserialized_config_needs_prepare() {
        let config: VerifyConfig =
            toml::from_str("[units]\nm = [\"metre\"]").unwrap();
        assert_eq!(config.unit_class("metre"), None);
        assert_eq!(config.prepare().unwrap().unit_class("metre"), Some("m"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verify.toml");
        std::fs::write(&path, "name = \"on-disk\"\n[matching]\ntolerance = 0.1\n").unwrap();
        let config = VerifyConfig::load(&path).unwrap();
        assert_eq!(config.name, "on-disk");
        assert_eq!(config.tolerance_for("anything"), 0.1);

        let missing = VerifyConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, VerifyError::Io(_)));
    }
}
