//! Update phases and their component access declarations.
//!
//! A frame runs through the phases of [`UpdatePhase::ALL`] in order. Each
//! phase declares the component types it may read and the ones it may write;
//! while a phase runs, subsystems only see the
//! [`PhaseComponents`](crate::engine::manager::PhaseComponents) view, which
//! refuses any typed access outside those sets. Conflicts between phases are computed with
//! [`AccessSets::conflicts_with`], so a scheduler can tell which phases could
//! overlap.

use serde::{Deserialize, Serialize};

use crate::engine::types::{AccessMode, AccessSets, ComponentID};


/// Ordered stages of one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePhase {
    /// Bookkeeping before gameplay (quest re-arm, entity requests).
    Pre,
    /// Input sampling.
    Input,
    /// Game logic.
    Logic,
    /// Physics simulation.
    Physics,
    /// Render preparation (culling, draw list building).
    Render,
    /// End-of-frame work.
    Post,
}

impl UpdatePhase {
    /// Every phase in execution order.
    pub const ALL: [UpdatePhase; 6] = [
        UpdatePhase::Pre,
        UpdatePhase::Input,
        UpdatePhase::Logic,
        UpdatePhase::Physics,
        UpdatePhase::Render,
        UpdatePhase::Post,
    ];

    /// Position in [`ALL`](Self::ALL).
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Read and write sets of every phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhasePermissions {
    sets: [AccessSets; UpdatePhase::ALL.len()],
}

impl PhasePermissions {
    /// Creates a table in which no phase may access anything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets `phase` read `component_id`.
    pub fn allow_read(&mut self, phase: UpdatePhase, component_id: ComponentID) {
        self.sets[phase.index()].read.set(component_id);
    }

    /// Lets `phase` read and write `component_id`.
    pub fn allow_write(&mut self, phase: UpdatePhase, component_id: ComponentID) {
        self.sets[phase.index()].write.set(component_id);
    }

    /// Withdraws every permission of `phase` on `component_id`.
    pub fn revoke(&mut self, phase: UpdatePhase, component_id: ComponentID) {
        let sets = &mut self.sets[phase.index()];
        sets.read.clear(component_id);
        sets.write.clear(component_id);
    }

    /// Returns `true` if `phase` may access `component_id` with `mode`.
    #[inline]
    pub fn allows(&self, phase: UpdatePhase, component_id: ComponentID, mode: AccessMode) -> bool {
        self.sets[phase.index()].allows(component_id, mode)
    }

    /// Declared access of `phase`.
    #[inline]
    pub fn access(&self, phase: UpdatePhase) -> &AccessSets {
        &self.sets[phase.index()]
    }

    /// Returns `true` if `a` and `b` touch a common component and one of them
    /// writes it.
    pub fn conflicts(&self, a: UpdatePhase, b: UpdatePhase) -> bool {
        self.access(a).conflicts_with(self.access(b))
    }
}
