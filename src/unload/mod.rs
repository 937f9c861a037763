//! Unload execution: deactivate-then-discard, guarded against racing
//! activations.

pub mod closest;
pub mod coordinator;
pub mod progress;

pub use coordinator::{UnloadCoordinator, UnloadOptions, UnloadReport, UnloadTiming};
