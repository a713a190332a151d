//! Core identifiers, constants and bit-level access sets.
//!
//! This module defines the small, copyable types shared by every engine
//! subsystem: component and entity-kind identifiers, the components index used
//! to address dense component columns, and the [`Signature`] / [`AccessSets`]
//! bitsets used to declare which component types an update phase may touch.
//!
//! ## Design Philosophy
//!
//! - **Dense storage**: entities address their components through a plain
//!   integer offset ([`ComponentsIndex`]) into per-kind parallel columns.
//! - **Bitset-based access**: component sets are fixed-size bit arrays so that
//!   permission checks and conflict detection are a handful of word operations.
//! - **No hidden state**: nothing in this module is global; identifiers are
//!   handed out by registries owned by the engine context.

use serde::{Deserialize, Serialize};


/// Identifier for a registered component type.
pub type ComponentID = u16;

/// Offset into the parallel component columns of one entity kind.
pub type ComponentsIndex = usize;

/// Slot index of an entity inside the entity allocator.
pub type IndexID = u32;

/// Generation counter used to detect stale entity handles.
pub type VersionID = u32;

/// Maximum number of component types a single component registry can hold.
pub const COMPONENT_CAP: usize = 256;

/// Number of `u64` words required to represent a full component signature.
pub const SIGNATURE_SIZE: usize = (COMPONENT_CAP + 63) / 64;

/// Number of entity kinds one component manager can number.
pub const ENTITY_KIND_CAP: usize = u16::MAX as usize + 1;

/// Hardware thread count assumed when the platform cannot report one.
pub const FALLBACK_HARDWARE_THREADS: usize = 8;

/// Task queue slots reserved for the engine's own recurring work, on top of
/// one slot per executor and whatever the game configures.
pub const ENGINE_RESERVED_TASK_SLOTS: usize = 64;

/// Identifier of an entity kind (one component table per kind).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKindId(pub u16);

impl EntityKindId {
    /// Returns the kind identifier as a table index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Stable identifier of a daily quest.
///
/// Subsystems usually declare their quest identifiers as constants:
///
/// ```
/// use hearth_engine::QuestId;
///
/// const UPDATE_CULLING: QuestId = QuestId(1);
/// assert_eq!(UPDATE_CULLING.0, 1);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuestId(pub u32);

/// Bitset representing a set of component types.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Packed component bitset.
    pub components: [u64; SIGNATURE_SIZE],
}

impl Signature {
    /// Sets the bit corresponding to `component_id`.
    #[inline]
    pub fn set(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] |= 1u64 << bits;
    }

    /// Clears the bit corresponding to `component_id`.
    #[inline]
    pub fn clear(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] &= !(1u64 << bits);
    }

    /// Returns `true` if `component_id` is present in this signature.
    #[inline]
    pub fn has(&self, component_id: ComponentID) -> bool {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        (self.components[index] >> bits) & 1 == 1
    }

    /// Returns `true` if the two signatures share at least one component.
    #[inline]
    pub fn intersects(&self, other: &Signature) -> bool {
        self.components
            .iter()
            .zip(other.components.iter())
            .any(|(a, b)| (a & b) != 0)
    }
}

/// Access mode for a component column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only access.
    Read,
    /// Exclusive write access.
    Write,
}

/// Declares the component read and write sets of an update phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessSets {
    /// Components that may be read.
    pub read: Signature,
    /// Components that may be written (and therefore also read).
    pub write: Signature,
}

impl AccessSets {
    /// Returns `true` if this access set conflicts with another.
    ///
    /// Two sets conflict when either writes a component the other reads or
    /// writes.
    #[inline]
    pub fn conflicts_with(&self, other: &AccessSets) -> bool {
        self.write.intersects(&other.write)
            || self.write.intersects(&other.read)
            || self.read.intersects(&other.write)
    }

    /// Returns `true` if this set permits `mode` access to `component_id`.
    #[inline]
    pub fn allows(&self, component_id: ComponentID, mode: AccessMode) -> bool {
        match mode {
            AccessMode::Read => self.read.has(component_id) || self.write.has(component_id),
            AccessMode::Write => self.write.has(component_id),
        }
    }
}
