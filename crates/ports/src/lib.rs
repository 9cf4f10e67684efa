//! Mediaclock Ports
//!
//! Port definitions (traits) marking the boundary between the clock
//! algebra and its infrastructure: the host's real-time primitives,
//! and the error type that boundary's fallible operations return.

mod error;
mod host;

pub use error::{ClockError, ClockResult};
pub use host::{Host, HostTimerHandle};
