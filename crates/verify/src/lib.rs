//! `voxcheck-verify`: Claim verification and metadata reconciliation engine.
//!
//! Pure engine crate: receives already-fetched ground truth (a metadata
//! document, raw samples, valid index ranges) plus claimed values, returns
//! scored validation reports. No network or CLI dependencies.

pub mod cache;
pub mod config;
pub mod coords;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod matcher;
pub mod model;
pub mod provenance;
pub mod resolver;
pub mod stats;
pub mod value;
pub mod wkt;

pub use cache::{ParseCache, SharedParseCache};
pub use config::{FieldKind, VerifyConfig};
pub use engine::Verifier;
pub use error::VerifyError;
pub use model::{
    BatchReport, Claims, DiscoveryReport, FieldResolution, GroundTruth, MatchType,
    MetadataDocument, OverallStatus, ProvenanceRecord, StatisticalSnapshot, ValidRanges,
    ValidationResult, ValidationStatus,
};
pub use value::ClaimValue;
