use thiserror::Error;

/// Domain-level errors for clock operations.
///
/// Soft failures (unbounded divergence, "no such time exists") are
/// represented as `Ok(f64::INFINITY)`/`Ok(f64::NAN)` sentinels rather
/// than through this enum.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    /// Requested a parent-relative conversion on a clock with no parent.
    #[error("clock has no parent")]
    NoParent,

    /// Attempted to mutate a field a root or offset clock does not allow.
    #[error("immutable: {0}")]
    Immutable(&'static str),

    /// A supplied argument violates an invariant (e.g. tickRate <= 0).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Cross-clock conversion attempted between disjoint hierarchies.
    #[error("clocks share no common ancestor")]
    NoCommonAncestor,
}

pub type ClockResult<T> = std::result::Result<T, ClockError>;
