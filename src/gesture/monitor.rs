//! Monitors: the individual timing rules that vote on an unload.
//!
//! Every monitor is an [`Operation<bool>`] that resolves to `true` (permit
//! the unload) or `false` (veto it). Timers and event subscriptions are
//! tracked by the operation, so they are released the moment it resolves.
//! A rule whose duration is `<= 0` is disabled and votes `true` at once.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::GateSignals;
use super::combo::{DoubleClickConfig, DragConfig};
use crate::sync::{CancelableTimer, Operation};

/// Convert a configured duration, `None` when the rule is disabled.
fn enabled_bound(millis: i64) -> Option<Duration> {
    u64::try_from(millis)
        .ok()
        .filter(|&ms| ms > 0)
        .map(Duration::from_millis)
}

fn conclude(op: &Operation<bool>, monitor: &'static str, verdict: bool) {
    if op.resolve(verdict) {
        tracing::trace!(monitor, verdict, "monitor resolved");
    }
}

#[derive(Debug, Default)]
struct DurationState {
    min_reached: bool,
    max_reached: bool,
    released: bool,
}

/// Click-duration gate: the press must last at least `min` and at most
/// `max`.
pub struct DurationMonitor;

impl DurationMonitor {
    /// Start watching a press. Bounds `<= 0` are disabled.
    pub fn spawn(min_timeout_ms: i64, max_timeout_ms: i64, signals: &GateSignals) -> Operation<bool> {
        let op = Operation::new();
        let min = enabled_bound(min_timeout_ms);
        let max = enabled_bound(max_timeout_ms);
        if min.is_none() && max.is_none() {
            conclude(&op, "duration", true);
            return op;
        }

        let state = Arc::new(Mutex::new(DurationState::default()));

        if let Some(max) = max {
            let op_ = op.clone();
            let state = Arc::clone(&state);
            op.track(Arc::new(CancelableTimer::start(max, move || {
                let released = {
                    let mut s = state.lock();
                    s.max_reached = true;
                    s.released
                };
                if !released {
                    // Held too long; no need to wait for the release.
                    conclude(&op_, "duration", false);
                }
            })));
        }

        if let Some(min) = min {
            let op_ = op.clone();
            let state = Arc::clone(&state);
            let has_max = max.is_some();
            op.track(Arc::new(CancelableTimer::start(min, move || {
                let released = {
                    let mut s = state.lock();
                    s.min_reached = true;
                    s.released
                };
                if !released && !has_max {
                    conclude(&op_, "duration", true);
                }
            })));
        }

        let op_ = op.clone();
        let (has_min, has_max) = (min.is_some(), max.is_some());
        let sub = signals.ups.subscribe(move |_| {
            if op_.done() {
                return Ok(());
            }
            let verdict = {
                let mut s = state.lock();
                s.released = true;
                if has_max && s.max_reached {
                    false
                } else {
                    !(has_min && !s.min_reached)
                }
            };
            conclude(&op_, "duration", verdict);
            Ok(())
        });
        op.track(Arc::new(sub));

        op
    }
}

/// Double-click rule: waits for a second press of the same combo.
pub struct DoubleClickMonitor;

impl DoubleClickMonitor {
    /// Start watching for a second press of the same combo.
    pub fn spawn(config: &DoubleClickConfig, signals: &GateSignals) -> Operation<bool> {
        let op = Operation::new();
        let Some(timeout) = enabled_bound(config.timeout_ms).filter(|_| config.enabled) else {
            conclude(&op, "double_click", true);
            return op;
        };
        let only_counts = config.only_double_click_counts;

        let op_ = op.clone();
        op.track(Arc::new(CancelableTimer::start(timeout, move || {
            conclude(&op_, "double_click", !only_counts);
        })));

        let op_ = op.clone();
        let sub = signals.downs.subscribe(move |_| {
            conclude(&op_, "double_click", only_counts);
            Ok(())
        });
        op.track(Arc::new(sub));

        op
    }
}

/// Drag rule: watches for a drag starting shortly after the press.
///
/// Only meaningful for the primary button; the gate does not spawn it for
/// other buttons.
pub struct DragMonitor;

impl DragMonitor {
    /// Start watching for a drag. `press_time` is the press timestamp
    /// reported by the extension, in milliseconds.
    pub fn spawn(config: &DragConfig, press_time: u64, signals: &GateSignals) -> Operation<bool> {
        let op = Operation::new();
        let Some(timeout) = enabled_bound(config.timeout_ms).filter(|_| config.enabled) else {
            conclude(&op, "drag", true);
            return op;
        };

        let dragged = !config.cancels_unload;
        let not_dragged = config.cancels_unload;

        let op_ = op.clone();
        op.track(Arc::new(CancelableTimer::start(timeout, move || {
            conclude(&op_, "drag", not_dragged);
        })));

        let op_ = op.clone();
        let limit = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let sub = signals.drags.subscribe(move |event| {
            let elapsed = event.time.saturating_sub(press_time);
            if elapsed <= limit {
                conclude(&op_, "drag", dragged);
            } else {
                tracing::trace!(elapsed, "drag started too late");
            }
            Ok(())
        });
        op.track(Arc::new(sub));

        let op_ = op.clone();
        let up_verdict = if config.mouse_up_counts_as_drag {
            dragged
        } else {
            not_dragged
        };
        let sub = signals.ups.subscribe(move |_| {
            conclude(&op_, "drag", up_verdict);
            Ok(())
        });
        op.track(Arc::new(sub));

        op
    }
}
