//! Mediaclock Core Domain
//!
//! Pure domain types for hierarchical software clocks. This crate
//! contains no I/O and no interior mutability: it is 100% unit
//! testable in isolation from any host time source.

mod correlation;
mod id;
mod precision;

pub use correlation::{Correlation, CorrelationOverrides};
pub use id::ClockId;
pub use precision::measure_precision_seconds;

/// Event kinds emitted by a clock node. Every event carries exactly
/// one payload: the emitting clock (see `mediaclock::ClockNode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A timing-altering mutation occurred at this node or an ancestor.
    Change,
    /// The clock's effective availability flipped to available.
    Available,
    /// The clock's effective availability flipped to unavailable.
    Unavailable,
}
