//! Provenance Recorder: fingerprint data shown to a client so a later
//! re-check can prove it ran on byte-identical input.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::error::{Result, VerifyError};
use crate::model::{MetadataDocument, ProvenanceCheck, ProvenanceRecord, ProvenanceSubject};
use crate::stats::compute_snapshot;
use crate::value::canonical_json;

const SAMPLES_DOMAIN: &[u8] = b"voxcheck/samples/v1";
const DOCUMENT_DOMAIN: &[u8] = b"voxcheck/document/v1";

/// BLAKE3 over the domain tag, the element count, then each element's
/// little-endian bytes. NaN payloads and signed zeros are preserved.
pub fn hash_samples(samples: &[f64]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(SAMPLES_DOMAIN);
    hasher.update(&(samples.len() as u64).to_le_bytes());
    for v in samples {
        hasher.update(&v.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// BLAKE3 over the key-sorted compact JSON of the document.
pub fn hash_document(document: &MetadataDocument) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DOCUMENT_DOMAIN);
    hasher.update(canonical_json(document.as_value()).as_bytes());
    hasher.finalize().to_hex().to_string()
}

pub fn record_samples(samples: &[f64], params: BTreeMap<String, Value>) -> Result<ProvenanceRecord> {
    record_samples_at(samples, params, Utc::now())
}

/// Like `record_samples`, with an explicit timestamp.
pub fn record_samples_at(
    samples: &[f64],
    params: BTreeMap<String, Value>,
    at: DateTime<Utc>,
) -> Result<ProvenanceRecord> {
    if samples.is_empty() {
        return Err(VerifyError::EmptySamples);
    }
    // An all-NaN window is still worth fingerprinting; it just has no stats
    let statistics = compute_snapshot(samples).ok();
    Ok(ProvenanceRecord {
        content_hash: hash_samples(samples),
        subject: ProvenanceSubject::Samples { count: samples.len() },
        extraction_params: params,
        statistics,
        created_at: timestamp(at),
    })
}

pub fn record_document(document: &MetadataDocument, params: BTreeMap<String, Value>) -> ProvenanceRecord {
    record_document_at(document, params, Utc::now())
}

pub fn record_document_at(
    document: &MetadataDocument,
    params: BTreeMap<String, Value>,
    at: DateTime<Utc>,
) -> ProvenanceRecord {
    ProvenanceRecord {
        content_hash: hash_document(document),
        subject: ProvenanceSubject::Document,
        extraction_params: params,
        statistics: None,
        created_at: timestamp(at),
    }
}

pub fn verify_samples(record: &ProvenanceRecord, samples: &[f64]) -> ProvenanceCheck {
    check(record, hash_samples(samples))
}

pub fn verify_document(record: &ProvenanceRecord, document: &MetadataDocument) -> ProvenanceCheck {
    check(record, hash_document(document))
}

fn check(record: &ProvenanceRecord, actual_hash: String) -> ProvenanceCheck {
    let matches = record.content_hash == actual_hash;
    if !matches {
        log::warn!(
            "provenance mismatch: expected {}, got {}",
            record.content_hash,
            actual_hash
        );
    }
    ProvenanceCheck {
        matches,
        expected_hash: record.content_hash.clone(),
        actual_hash,
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn params() -> BTreeMap<String, Value> {
        let mut p = BTreeMap::new();
        p.insert("dataset".into(), json!("f3_block"));
        p.insert("inline".into(), json!(425));
        p
    }

    #[test]
    fn sample_record_round_trips() {
        let samples = [1.0, 2.5, -3.0, f64::NAN];
        let record = record_samples_at(&samples, params(), fixed_time()).unwrap();
        assert_eq!(record.created_at, "2024-03-01T12:00:00.000Z");
        assert_eq!(record.subject, ProvenanceSubject::Samples { count: 4 });
        assert_eq!(record.statistics.unwrap().non_finite, 1);
        assert!(verify_samples(&record, &samples).matches);

        let check = verify_samples(&record, &[1.0, 2.5, -3.0, 0.0]);
        assert!(!check.matches);
        assert_eq!(check.expected_hash, record.content_hash);
        assert_ne!(check.actual_hash, record.content_hash);
    }

    #[test]
    fn hash_depends_on_order_and_sign() {
        assert_ne!(hash_samples(&[1.0, 2.0]), hash_samples(&[2.0, 1.0]));
        assert_ne!(hash_samples(&[0.0]), hash_samples(&[-0.0]));
        assert_eq!(hash_samples(&[1.0, 2.0]), hash_samples(&[1.0, 2.0]));
    }

    #[test]
    fn identical_inputs_identical_records() {
        let a = record_samples_at(&[4.0, 5.0], params(), fixed_time()).unwrap();
        let b = record_samples_at(&[4.0, 5.0], params(), fixed_time()).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn empty_samples_rejected() {
        assert_eq!(
            record_samples_at(&[], params(), fixed_time()).unwrap_err(),
            VerifyError::EmptySamples
        );
    }

    #[test]
    fn document_hash_ignores_key_order() {
        let a = MetadataDocument::new(json!({"a": 1, "b": {"c": [1, 2], "d": "x"}}));
        let b: MetadataDocument =
            serde_json::from_str(r#"{"b": {"d": "x", "c": [1, 2]}, "a": 1}"#).unwrap();
        let record = record_document_at(&a, params(), fixed_time());
        assert_eq!(record.subject, ProvenanceSubject::Document);
        assert!(verify_document(&record, &b).matches);

        let c = MetadataDocument::new(json!({"a": 2, "b": {"c": [1, 2], "d": "x"}}));
        assert!(!verify_document(&record, &c).matches);
    }

    #[test]
    fn record_serializes_subject_kind() {
        let record = record_samples_at(&[1.0], BTreeMap::new(), fixed_time()).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["subject"], json!({"kind": "samples", "count": 1}));
        let back: ProvenanceRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.content_hash, record.content_hash);
    }
}
