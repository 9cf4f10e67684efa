//! Mediaclock
//!
//! Hierarchical software clocks for real-time media synchronization
//! (DVB CSS / HbbTV companion-screen style correlation). A clock tree
//! is a chain of [`ClockNode`]s rooted at a [`RootClock`] that reads
//! host wall-clock time; each non-root node maps its own ticks to its
//! parent's via a piecewise-linear correlation ([`CorrelatedClock`]) or
//! a fixed offset ([`OffsetClock`]). Nodes propagate `change`,
//! `available` and `unavailable` events up and down the tree and
//! re-arm pending timers whenever an ancestor's mapping changes.
//!
//! Single-threaded and cooperative by design: nodes are `Rc`-shared
//! trait objects over `Cell`/`RefCell` state, with no internal locking
//! and no async runtime. Callers that need a clock tree shared across
//! threads must build their own synchronization around it.

mod correlated;
mod events;
mod node;
mod offset;
mod root;
mod timer;

pub mod testing;

pub use correlated::{CorrelatedClock, CorrelatedClockOptions};
pub use events::{EventBus, ListenerId};
pub use node::{ClockNode, ClockRef};
pub use offset::{OffsetClock, OffsetClockOptions};
pub use root::{RootClock, RootClockOptions};
pub use timer::{TimerHandle, TimerRegistry};

pub use mediaclock_core::{measure_precision_seconds, ClockId, Correlation, CorrelationOverrides, EventKind};
pub use mediaclock_ports::{ClockError, ClockResult, Host, HostTimerHandle};
