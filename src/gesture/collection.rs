//! Combined verdict over the monitors of one interaction.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::sync::Operation;

/// Aggregates sibling monitors: the first veto (a member resolving `false`
/// or being rejected) decides the interaction at once; otherwise the
/// verdict is `true` once every member has resolved `true`.
///
/// Settling the combined verdict disposes every member, releasing timers
/// and listeners of monitors that never concluded.
#[derive(Debug)]
pub struct MonitorCollection {
    combined: Operation<bool>,
    members: usize,
}

impl MonitorCollection {
    pub fn new(members: Vec<Operation<bool>>) -> Self {
        let combined = Operation::new();
        let count = members.len();
        if members.is_empty() {
            combined.resolve(true);
            return Self {
                combined,
                members: 0,
            };
        }

        let remaining = Arc::new(AtomicUsize::new(count));
        for member in members {
            combined.track(Arc::new(member.clone()));
            let combined = combined.clone();
            let remaining = Arc::clone(&remaining);
            member.on_settle(move |outcome| match outcome {
                Ok(true) => {
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        combined.resolve(true);
                    }
                }
                Ok(false) | Err(_) => {
                    combined.resolve(false);
                }
            });
        }

        Self {
            combined,
            members: count,
        }
    }

    /// The combined verdict.
    pub fn verdict(&self) -> &Operation<bool> {
        &self.combined
    }

    /// Whether the verdict is already known.
    pub fn concluded(&self) -> bool {
        self.combined.done()
    }

    /// Number of member monitors.
    pub fn len(&self) -> usize {
        self.members
    }
}
