//! Status taxonomy shared by every stage of a degraded read.

use thiserror::Error;

/// `RaidError` is the failure status returned by planning, binding and reconstruction.
///
/// Media and consistency problems found while reconstructing are not errors: they
/// land in the [`crate::degraded::report::ReconstructReport`] instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RaidError {
    /// A parameter or internal invariant was violated.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Descriptor chains disagree with the sizing plan.
    #[error("descriptor validation failed: {0}")]
    Validation(String),

    /// Scatter-gather buckets, buffer pages or byte arithmetic ran out of room.
    #[error("insufficient resources: {0}")]
    InsufficientResources(String),

    /// A member device could not service a read or write.
    #[error("media error on position {position} at lba {lba}: {reason}")]
    Media {
        position: usize,
        lba: u64,
        reason: String,
    },
}

pub type RaidResult<T> = Result<T, RaidError>;

impl RaidError {
    /// `is_generic_failure` reports whether the status is a non-retryable defect.
    #[must_use]
    pub const fn is_generic_failure(&self) -> bool {
        matches!(self, Self::InvalidParameter(_) | Self::Validation(_))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(%msg, "parameter check failed");
        Self::InvalidParameter(msg)
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(%msg, "descriptor validation failed");
        Self::Validation(msg)
    }

    pub(crate) fn exhausted(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!(%msg, "out of resources");
        Self::InsufficientResources(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_failure_covers_parameter_and_validation_only() {
        assert!(RaidError::InvalidParameter("x".into()).is_generic_failure());
        assert!(RaidError::Validation("x".into()).is_generic_failure());
        assert!(!RaidError::InsufficientResources("x".into()).is_generic_failure());
        assert!(
            !RaidError::Media {
                position: 1,
                lba: 7,
                reason: "gone".into()
            }
            .is_generic_failure()
        );
    }

    #[test]
    fn display_includes_context() {
        let err = RaidError::Media {
            position: 3,
            lba: 0x40,
            reason: "short read".into(),
        };
        assert_eq!(
            err.to_string(),
            "media error on position 3 at lba 64: short read"
        );
    }
}
