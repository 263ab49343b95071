// tandem_core/src/error.rs

use thiserror::Error;

/// Errors surfaced by trajectory, feature and cost operations.
///
/// All of these are programmer or configuration errors: they are not
/// retried internally and must never degrade into silently wrong numbers.
/// Numeric edge cases (e.g. the goal-distance regularizer) are handled
/// locally in the features and are not errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlannerError {
    /// A feature registry was asked for a type name it does not know.
    #[error("unknown feature type: `{0}`")]
    UnknownFeatureType(String),

    /// A feature was constructed with fewer parameters than it requires.
    #[error("feature `{feature}` expects {expected} parameter(s), got {got}")]
    InvalidFeatureParameters {
        feature: String,
        expected: usize,
        got: usize,
    },

    /// A cost composition was given weight and feature lists of different
    /// lengths.
    #[error("weight/feature length mismatch: {weights} weights vs {features} features")]
    DimensionMismatch { weights: usize, features: usize },

    /// A Hessian was requested from a feature that does not support one.
    #[error("feature `{feature}` does not support Hessian computation")]
    UnsupportedOperation { feature: String },

    /// A trajectory's predicted states or sensitivity matrix were read
    /// before being computed, or after a mutation invalidated them.
    #[error("trajectory `{what}` read before it was computed (or after invalidation)")]
    StaleTrajectory { what: &'static str },

    /// A problem or scenario configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PlannerError {
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            feature: feature.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
