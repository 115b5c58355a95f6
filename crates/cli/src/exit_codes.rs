//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! | Code | Meaning                                                  |
//! |------|----------------------------------------------------------|
//! | 0    | Success (claims PASS or MOSTLY_VALID)                    |
//! | 1    | General error (unspecified)                              |
//! | 2    | CLI usage error (bad args, missing file)                 |
//! | 3    | Claims PARTIALLY_VALID                                   |
//! | 4    | Claims FAIL                                              |
//! | 5    | Input parse error (metadata, claims, samples, ranges)    |
//! | 6    | Invalid verification config                              |
//! | 7    | Engine precondition (empty claims, bad ranges, ...)      |
//! | 8    | Provenance fingerprint mismatch                          |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use voxcheck_verify::{OverallStatus, VerifyError};

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unreadable input file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Verdicts (3-4)
// =============================================================================

/// Batch scored PARTIALLY_VALID.
pub const EXIT_PARTIALLY_VALID: u8 = 3;

/// Batch scored FAIL.
pub const EXIT_CLAIMS_FAILED: u8 = 4;

// =============================================================================
// Inputs and engine (5-8)
// =============================================================================

/// Metadata, claims, samples or ranges could not be parsed.
pub const EXIT_INPUT_PARSE: u8 = 5;

/// Verification config failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 6;

/// Engine refused the request (no claims, missing or inverted ranges,
/// empty samples).
pub const EXIT_PRECONDITION: u8 = 7;

/// Recorded content hash does not match the data supplied now.
pub const EXIT_PROVENANCE_MISMATCH: u8 = 8;

/// Map a batch verdict to its exit code.
pub fn verdict_exit_code(status: OverallStatus) -> u8 {
    match status {
        OverallStatus::Pass | OverallStatus::MostlyValid => EXIT_SUCCESS,
        OverallStatus::PartiallyValid => EXIT_PARTIALLY_VALID,
        OverallStatus::Fail => EXIT_CLAIMS_FAILED,
    }
}

/// Map an engine error to its exit code.
pub fn verify_exit_code(err: &VerifyError) -> u8 {
    match err {
        VerifyError::ConfigParse(_) | VerifyError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        VerifyError::EmptySamples
        | VerifyError::NoFiniteSamples { .. }
        | VerifyError::EmptyClaims
        | VerifyError::MissingValidRanges { .. }
        | VerifyError::InvalidRange { .. } => EXIT_PRECONDITION,
        VerifyError::StructuredText { .. } => EXIT_INPUT_PARSE,
        VerifyError::Io(_) => EXIT_USAGE,
    }
}
