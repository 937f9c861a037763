//! Concurrency primitives the gesture engine is built from.
//!
//! Everything here is a small one-shot building block: a value slot that
//! settles once ([`single::SingleAssignment`]), a cancelable delayed callback
//! ([`CancelableTimer`]), a set of resources released together
//! ([`disposable::DisposableGroup`]), listener fan-out ([`EventSource`]) and the
//! composition of slot and group ([`Operation`]).
//!
//! Locks in this module are never held while user callbacks run, so a
//! callback may freely settle, track or dispose other primitives.

pub mod disposable;
pub mod events;
pub mod operation;
pub mod single;
pub mod timer;

pub use events::EventSource;
pub use operation::Operation;
pub use timer::CancelableTimer;
