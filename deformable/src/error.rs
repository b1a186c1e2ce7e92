use thiserror::Error;

/// The error type for deformable convolution construction and evaluation.
///
/// Every variant is structural: it describes a shape or configuration the caller got
/// wrong, so nothing here is worth retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeformError {
    /// A tensor dimension disagrees with what the pipeline stage expects.
    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Which shape expectation failed.
        what: String,
        /// The expected dimensions.
        expected: String,
        /// The dimensions actually supplied.
        actual: String,
    },

    /// A feature map has a rank the spatial layers cannot interpret.
    #[error("Unsupported feature map rank {rank}: expected 3 ([H, W, C]) or 4 ([N, H, W, C])")]
    UnsupportedRank {
        /// The rank that was supplied.
        rank: usize,
    },

    /// A layer configuration is logically inconsistent.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Why the configuration was rejected.
        reason: String,
    },
}

impl DeformError {
    pub(crate) fn shape_mismatch(
        what: impl Into<String>,
        expected: impl core::fmt::Debug,
        actual: impl core::fmt::Debug,
    ) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }
}

/// A specialized `Result` type for deformable convolution operations.
pub type DeformResult<T> = Result<T, DeformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_mismatch_message_names_expected_and_actual() {
        let err = DeformError::shape_mismatch("offset channels", 18, 16);

        assert_eq!(
            err.to_string(),
            "Shape mismatch for offset channels: expected 18, got 16"
        );
    }

    #[test]
    fn unsupported_rank_message_lists_supported_ranks() {
        let err = DeformError::UnsupportedRank { rank: 5 };

        assert!(err.to_string().contains("rank 5"));
        assert!(err.to_string().contains("expected 3"));
    }
}
