use thiserror::Error;

/// Errors for malformed inputs. A claim that is simply wrong is never an
/// error; it is a `FAIL` or `NOT_FOUND` result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerifyError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Config validation error (bad tolerance, duplicate alias, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),

    /// A raw sample array with no elements.
    #[error("sample array is empty")]
    EmptySamples,

    /// A raw sample array where every element is NaN or infinite.
    #[error("sample array has no finite values ({count} non-finite)")]
    NoFiniteSamples { count: usize },

    /// Reconciliation was requested with no claims.
    #[error("no claims supplied (use discovery to inspect available fields)")]
    EmptyClaims,

    /// Coordinate claims were made but no valid-range descriptor was supplied.
    #[error("coordinate claims {axes:?} require a valid-range descriptor")]
    MissingValidRanges { axes: Vec<String> },

    /// A valid-range entry that is inverted or non-finite.
    #[error("axis '{axis}': invalid range [{min}, {max}]")]
    InvalidRange { axis: String, min: f64, max: f64 },

    /// Embedded structured text that cannot be parsed at all.
    #[error("structured text parse error at offset {offset}: {message}")]
    StructuredText { offset: usize, message: String },

    /// IO error (config file read).
    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, VerifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_axis() {
        let err = VerifyError::InvalidRange { axis: "inline".into(), min: 10.0, max: 1.0 };
        assert_eq!(err.to_string(), "axis 'inline': invalid range [10, 1]");
    }

    #[test]
    fn missing_ranges_lists_axes() {
        let err = VerifyError::MissingValidRanges { axes: vec!["inline".into()] };
        assert!(err.to_string().contains("\"inline\""));
    }
}
