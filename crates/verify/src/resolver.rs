//! Field Resolver: locate a claimed field's actual value in a metadata
//! document.
//!
//! Search order, first hit wins:
//! 1. exact key at the document root
//! 2. well-known dotted locations for the canonical field
//! 3. the same two steps for every alias, in the group's configured order
//! 4. sub-fields parsed out of structured-text blocks (cached)
//! 5. case/whitespace-insensitive scan of root and one-level-nested keys
//!
//! Only scalars and arrays of scalars count as a field's value. A key that
//! holds an object (`"crs": {"wkt": ...}`) is a container, and the search
//! moves on.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::cache::ParseCache;
use crate::config::{normalize_key, VerifyConfig};
use crate::model::{
    lookup_path, DiscoveryReport, FieldResolution, MetadataDocument, ResolutionStrategy,
};
use crate::value::ClaimValue;
use crate::wkt::{self, ParsedBlock};

/// Structured-text blocks deeper than this many path segments are ignored.
pub const MAX_TEXT_DEPTH: usize = 4;

/// Leaves deeper than this are reported whole during discovery.
const MAX_LEAF_DEPTH: usize = 8;

/// Similarity at or above which a key is suggested regardless of distance.
const SUGGESTION_SIMILARITY: f64 = 0.6;

pub struct Resolver<'a> {
    config: &'a VerifyConfig,
    cache: &'a dyn ParseCache,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a VerifyConfig, cache: &'a dyn ParseCache) -> Self {
        Self { config, cache }
    }

    pub fn resolve(&self, document: &MetadataDocument, field: &str) -> FieldResolution {
        let canonical = self.config.canonical(field).map(str::to_string);
        let candidates = self.config.candidates(field);
        let root = document.as_value();
        let location_key = canonical.as_deref().unwrap_or(field);

        // Steps 1-3
        for (i, candidate) in candidates.iter().enumerate() {
            log::debug!("resolve '{field}': root key '{candidate}'");
            if let Some(value) = present(root.get(candidate.as_str())) {
                return self.hit(value, candidate.clone(), ResolutionStrategy::RootKey, &candidates, &canonical);
            }
            if i == 0 {
                for path in self.config.locations(location_key) {
                    log::debug!("resolve '{field}': known location '{path}'");
                    if let Some(value) = present(lookup_path(root, path)) {
                        return self.hit(value, path.clone(), ResolutionStrategy::KnownLocation, &candidates, &canonical);
                    }
                }
            }
        }

        // Step 4
        for (path, text) in structured_blocks(root) {
            log::debug!("resolve '{field}': structured text at '{path}'");
            match self.cache.get_or_parse(text) {
                Ok(parsed) => {
                    if let Some((sub, value)) = self.parsed_lookup(&parsed, &candidates, &canonical) {
                        return FieldResolution::found(
                            canonical,
                            Value::String(value.to_string()),
                            parsed_path(&path, sub),
                            ResolutionStrategy::ParsedText,
                        );
                    }
                }
                Err(e) => log::debug!("resolve '{field}': skipping '{path}': {e}"),
            }
        }

        // Step 5
        let wanted: Vec<String> = candidates.iter().map(|c| normalize_key(c)).collect();
        if let Some(map) = root.as_object() {
            let nested = map.iter().filter_map(|(parent, v)| {
                v.as_object().map(|inner| (parent, inner))
            });
            let scan = map
                .iter()
                .map(|(k, v)| (k.clone(), v))
                .chain(nested.flat_map(|(parent, inner)| {
                    inner.iter().map(move |(k, v)| (format!("{parent}.{k}"), v))
                }));
            for (path, value) in scan {
                let leaf = path.rsplit('.').next().unwrap_or(&path);
                if wanted.contains(&normalize_key(leaf)) && is_field_value(value) {
                    log::debug!("resolve '{field}': key scan matched '{path}'");
                    return self.hit(value, path, ResolutionStrategy::KeyScan, &candidates, &canonical);
                }
            }
        }

        log::debug!("resolve '{field}': not found");
        FieldResolution::not_found(canonical)
    }

    /// A hit on a raw structured-text block resolves to the requested
    /// sub-field when the block carries one.
    fn hit(
        &self,
        value: &Value,
        path: String,
        strategy: ResolutionStrategy,
        candidates: &[String],
        canonical: &Option<String>,
    ) -> FieldResolution {
        if let Some(text) = value.as_str().filter(|t| wkt::looks_structured(t)) {
            if let Ok(parsed) = self.cache.get_or_parse(text) {
                if let Some((sub, sub_value)) = self.parsed_lookup(&parsed, candidates, canonical) {
                    return FieldResolution::found(
                        canonical.clone(),
                        Value::String(sub_value.to_string()),
                        parsed_path(&path, sub),
                        ResolutionStrategy::ParsedText,
                    );
                }
            }
        }
        FieldResolution::found(canonical.clone(), value.clone(), path, strategy)
    }

    fn parsed_lookup<'p>(
        &self,
        parsed: &'p ParsedBlock,
        candidates: &[String],
        canonical: &Option<String>,
    ) -> Option<(&'p str, &'p str)> {
        for candidate in candidates {
            let wanted = normalize_key(candidate);
            if let Some((k, v)) = parsed.fields.iter().find(|(k, _)| normalize_key(k) == wanted) {
                return Some((k.as_str(), v.as_str()));
            }
        }
        let canonical = canonical.as_deref()?;
        parsed
            .fields
            .iter()
            .find(|(k, _)| self.config.canonical(k) == Some(canonical))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Near-miss keys for a field that was not found, ranked by similarity,
    /// plus the values at those keys.
    pub fn suggest(
        &self,
        document: &MetadataDocument,
        field: &str,
    ) -> (Vec<String>, BTreeMap<String, ClaimValue>) {
        let mut pool: Vec<(String, String, Value)> = leaves(document.as_value())
            .into_iter()
            .map(|(path, value)| {
                let leaf = path.rsplit('.').next().unwrap_or(&path).to_string();
                (path, leaf, value)
            })
            .collect();
        for (path, text) in structured_blocks(document.as_value()) {
            if let Ok(parsed) = self.cache.get_or_parse(text) {
                for (sub, v) in &parsed.fields {
                    pool.push((parsed_path(&path, sub), sub.clone(), Value::String(v.clone())));
                }
            }
        }

        let mut ranked: Vec<(f64, String, Value)> = pool
            .into_iter()
            .filter_map(|(path, leaf, value)| {
                near_miss(field, &leaf, self.config.matching.suggestion_max_distance)
                    .map(|score| (score, path, value))
            })
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        ranked.truncate(self.config.matching.max_suggestions);

        let mut suggestions = Vec::with_capacity(ranked.len());
        let mut alternatives = BTreeMap::new();
        for (_, path, value) in ranked {
            if let Some(v) = ClaimValue::from_json(&value) {
                alternatives.insert(path.clone(), v);
            }
            suggestions.push(path);
        }
        (suggestions, alternatives)
    }

    /// Everything reachable in a document.
    pub fn discover(&self, document: &MetadataDocument) -> DiscoveryReport {
        let root = document.as_value();
        let fields = leaves(root);

        let mut parsed = BTreeMap::new();
        let mut unparseable = Vec::new();
        for (path, text) in structured_blocks(root) {
            match self.cache.get_or_parse(text) {
                Ok(block) => {
                    for (sub, v) in &block.fields {
                        parsed.insert(parsed_path(&path, sub), v.clone());
                    }
                }
                Err(_) => unparseable.push(path),
            }
        }

        let names: BTreeSet<&String> = self
            .config
            .aliases
            .keys()
            .chain(self.config.locations.keys())
            .collect();
        let resolved = names
            .into_iter()
            .map(|name| (name.clone(), self.resolve(document, name)))
            .filter(|(_, r)| r.found)
            .collect();

        DiscoveryReport {
            fields,
            parsed,
            resolved,
            unparseable,
        }
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| is_field_value(v))
}

fn is_field_value(value: &Value) -> bool {
    match value {
        Value::Null | Value::Object(_) => false,
        Value::Array(items) => !items.iter().any(|i| i.is_object() || i.is_array()),
        _ => true,
    }
}

fn parsed_path(path: &str, sub: &str) -> String {
    format!("{path} (parsed: {sub})")
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// `(dotted path, text)` for every structured-text string within
/// `MAX_TEXT_DEPTH` segments of the root, in document order.
pub fn structured_blocks(root: &Value) -> Vec<(String, &str)> {
    fn walk<'v>(value: &'v Value, prefix: String, depth: usize, out: &mut Vec<(String, &'v str)>) {
        if depth > MAX_TEXT_DEPTH {
            return;
        }
        match value {
            Value::String(s) if depth > 0 && wkt::looks_structured(s) => out.push((prefix, s)),
            Value::Object(map) => {
                for (k, v) in map {
                    walk(v, join(&prefix, k), depth + 1, out);
                }
            }
            Value::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    walk(v, join(&prefix, &i.to_string()), depth + 1, out);
                }
            }
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(root, String::new(), 0, &mut out);
    out
}

/// Dotted path -> leaf value. Arrays of scalars are one leaf.
pub fn leaves(root: &Value) -> BTreeMap<String, Value> {
    fn walk(value: &Value, prefix: &str, depth: usize, out: &mut BTreeMap<String, Value>) {
        match value {
            Value::Null => {}
            Value::Object(map) if depth < MAX_LEAF_DEPTH => {
                for (k, v) in map {
                    walk(v, &join(prefix, k), depth + 1, out);
                }
            }
            Value::Array(items)
                if depth < MAX_LEAF_DEPTH && items.iter().any(|i| i.is_object() || i.is_array()) =>
            {
                for (i, v) in items.iter().enumerate() {
                    walk(v, &join(prefix, &i.to_string()), depth + 1, out);
                }
            }
            _ if !prefix.is_empty() => {
                out.insert(prefix.to_string(), value.clone());
            }
            _ => {}
        }
    }
    let mut out = BTreeMap::new();
    walk(root, "", 0, &mut out);
    out
}

/// Similarity of a near-miss key, or `None` when it is not close enough.
pub(crate) fn near_miss(query: &str, key: &str, max_distance: usize) -> Option<f64> {
    let q = normalize_key(query);
    let k = normalize_key(key);
    if q.is_empty() || k.is_empty() {
        return None;
    }
    let distance = strsim::levenshtein(&q, &k);
    let similarity = strsim::normalized_levenshtein(&q, &k);
    let close = distance <= max_distance && distance < k.chars().count();
    let contains = (q.len() >= 3 && k.contains(&q)) || (k.len() >= 3 && q.contains(&k));
    (close || similarity >= SUGGESTION_SIMILARITY || contains).then_some(similarity)
}
