//! # Component Manager
//!
//! Owns every entity kind's [`ComponentTable`], the [`ComponentRegistry`] that
//! numbers component types, and the [`PhasePermissions`] enforced during a
//! frame.
//!
//! ## Purpose
//! Gives subsystems typed, whole-column access to component data
//! (`components::<Transform>(kind)`) and gives the entity layer the two
//! structural operations it needs: allocate a components index and return
//! one.
//!
//! ## Access checking
//! [`enter_phase`](ComponentManager::enter_phase) mutably borrows the manager
//! and hands out a [`PhaseComponents`] view. The view is the only way to reach
//! component data while the phase runs, and every typed access through it is
//! checked against the phase's read/write sets. Structural operations,
//! permission edits and unchecked column access stay on the manager itself,
//! which the borrow makes unreachable until the view is dropped. Outside a
//! phase (setup, teardown, entity processing) access is unrestricted.
//!
//! ## Invariants
//! - Entity kinds are numbered densely in registration order.
//! - Kind names are unique.

use std::any::type_name;
use std::collections::HashMap;

use bytemuck::Pod;

use crate::engine::component::{Component, ComponentRegistry};
use crate::engine::entity::EntityId;
use crate::engine::error::ComponentError;
use crate::engine::phase::{PhasePermissions, UpdatePhase};
use crate::engine::table::{ComponentTable, TableBuilder};
use crate::engine::types::{AccessMode, ComponentID, ComponentsIndex, EntityKindId, ENTITY_KIND_CAP};


/// Component storage for every entity kind.
#[derive(Debug, Default)]
pub struct ComponentManager {
    registry: ComponentRegistry,
    tables: Vec<ComponentTable>,
    kinds_by_name: HashMap<String, EntityKindId>,
    permissions: PhasePermissions,
}

impl ComponentManager {
    /// Creates a manager with no entity kinds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity kind and allocates its table.
    pub fn register_entity_kind(&mut self, builder: TableBuilder) -> Result<EntityKindId, ComponentError> {
        if self.kinds_by_name.contains_key(builder.name()) {
            return Err(ComponentError::DuplicateKind(builder.name().to_owned()));
        }

        let kind = u16::try_from(self.tables.len())
            .map(EntityKindId)
            .map_err(|_| ComponentError::KindLimit { cap: ENTITY_KIND_CAP })?;
        let table = builder.build(kind, &mut self.registry)?;
        log::debug!("registered entity kind `{}` as {kind:?}: {table:?}", table.name());

        self.kinds_by_name.insert(table.name().to_owned(), kind);
        self.tables.push(table);
        Ok(kind)
    }

    /// Looks up an entity kind by name.
    pub fn kind_by_name(&self, name: &str) -> Option<EntityKindId> {
        self.kinds_by_name.get(name).copied()
    }

    /// Number of registered entity kinds.
    pub fn number_of_kinds(&self) -> usize {
        self.tables.len()
    }

    /// Registers component type `T` without adding it to any kind.
    ///
    /// Useful for declaring phase permissions ahead of kind registration.
    pub fn register_component<T: Component>(&mut self) -> Result<ComponentID, ComponentError> {
        self.registry.register::<T>()
    }

    /// Component type registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Table of `kind`.
    pub fn table(&self, kind: EntityKindId) -> Result<&ComponentTable, ComponentError> {
        self.tables
            .get(kind.index())
            .ok_or(ComponentError::UnknownKind(kind))
    }

    fn table_mut(&mut self, kind: EntityKindId) -> Result<&mut ComponentTable, ComponentError> {
        self.tables
            .get_mut(kind.index())
            .ok_or(ComponentError::UnknownKind(kind))
    }

    /// Allocates a default-initialized slot for `owner` in `kind`'s columns.
    pub fn new_components_index(
        &mut self,
        kind: EntityKindId,
        owner: EntityId,
    ) -> Result<ComponentsIndex, ComponentError> {
        Ok(self.table_mut(kind)?.new_components_index(owner))
    }

    /// Releases `index` of `kind` by swap-and-pop.
    ///
    /// Returns the entity whose components moved into `index`, if any.
    pub fn return_components_index(
        &mut self,
        kind: EntityKindId,
        index: ComponentsIndex,
    ) -> Result<Option<EntityId>, ComponentError> {
        self.table_mut(kind)?.return_components_index(index)
    }

    /// Number of occupied indices of `kind`.
    pub fn number_of_components(&self, kind: EntityKindId) -> Result<usize, ComponentError> {
        Ok(self.table(kind)?.len())
    }

    /// All `T` components of `kind` in index order.
    pub fn components<T: Component>(&self, kind: EntityKindId) -> Result<&[T], ComponentError> {
        self.table(kind)?.column::<T>()
    }

    /// All `T` components of `kind`, mutably.
    pub fn components_mut<T: Component>(&mut self, kind: EntityKindId) -> Result<&mut [T], ComponentError> {
        self.table_mut(kind)?.column_mut::<T>()
    }

    /// The `A` and `B` columns of `kind`, both mutably.
    pub fn components_pair_mut<A: Component, B: Component>(
        &mut self,
        kind: EntityKindId,
    ) -> Result<(&mut [A], &mut [B]), ComponentError> {
        self.table_mut(kind)?.column_pair_mut::<A, B>()
    }

    /// The `T` column of `kind` as raw bytes, e.g. for a GPU upload.
    pub fn component_bytes<T: Component + Pod>(&self, kind: EntityKindId) -> Result<&[u8], ComponentError> {
        self.components::<T>(kind).map(bytemuck::cast_slice)
    }

    /// Phase permission table.
    pub fn permissions(&self) -> &PhasePermissions {
        &self.permissions
    }

    /// Mutable phase permission table.
    pub fn permissions_mut(&mut self) -> &mut PhasePermissions {
        &mut self.permissions
    }

    /// Lets `phase` read `T`, registering `T` if needed.
    pub fn allow_read<T: Component>(&mut self, phase: UpdatePhase) -> Result<(), ComponentError> {
        let id = self.registry.register::<T>()?;
        self.permissions.allow_read(phase, id);
        Ok(())
    }

    /// Lets `phase` read and write `T`, registering `T` if needed.
    pub fn allow_write<T: Component>(&mut self, phase: UpdatePhase) -> Result<(), ComponentError> {
        let id = self.registry.register::<T>()?;
        self.permissions.allow_write(phase, id);
        Ok(())
    }

    /// Restricts component access to what `phase` declared until the returned
    /// view is dropped.
    pub fn enter_phase(&mut self, phase: UpdatePhase) -> PhaseComponents<'_> {
        PhaseComponents {
            manager: self,
            phase,
        }
    }

    /// Checks every table for misaligned columns.
    pub fn validate(&self) -> Result<(), ComponentError> {
        self.tables.iter().try_for_each(ComponentTable::validate)
    }

    /// Drops every component of every kind; kinds stay registered.
    pub fn clear(&mut self) {
        for table in &mut self.tables {
            table.clear();
        }
    }
}

/// Access-checked view of a [`ComponentManager`] for the duration of one
/// update phase.
///
/// Tables are reachable for metadata only; component data goes through the
/// typed accessors, which check the phase's declared sets.
///
/// ```compile_fail
/// use hearth_engine::{ComponentManager, ComponentTable, UpdatePhase};
///
/// #[derive(Default)]
/// struct Secret(u32);
///
/// let mut components = ComponentManager::new();
/// let kind = components
///     .register_entity_kind(ComponentTable::builder("Vault").with::<Secret>())
///     .unwrap();
/// let view = components.enter_phase(UpdatePhase::Render);
/// let _ = view.table(kind).unwrap().column::<Secret>();
/// ```
pub struct PhaseComponents<'a> {
    manager: &'a mut ComponentManager,
    phase: UpdatePhase,
}

impl PhaseComponents<'_> {
    /// Phase whose restrictions apply.
    #[inline]
    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    fn check_access<T: 'static>(&self, mode: AccessMode) -> Result<(), ComponentError> {
        match self.manager.registry.id_of::<T>() {
            Some(id) if self.manager.permissions.allows(self.phase, id, mode) => Ok(()),
            _ => Err(ComponentError::AccessDenied {
                component: type_name::<T>(),
                phase: self.phase,
                mode,
            }),
        }
    }

    /// All `T` components of `kind`, if the phase may read `T`.
    pub fn components<T: Component>(&self, kind: EntityKindId) -> Result<&[T], ComponentError> {
        self.check_access::<T>(AccessMode::Read)?;
        self.manager.components::<T>(kind)
    }

    /// All `T` components of `kind` mutably, if the phase may write `T`.
    pub fn components_mut<T: Component>(&mut self, kind: EntityKindId) -> Result<&mut [T], ComponentError> {
        self.check_access::<T>(AccessMode::Write)?;
        self.manager.components_mut::<T>(kind)
    }

    /// The `A` and `B` columns of `kind`, if the phase may write both.
    pub fn components_pair_mut<A: Component, B: Component>(
        &mut self,
        kind: EntityKindId,
    ) -> Result<(&mut [A], &mut [B]), ComponentError> {
        self.check_access::<A>(AccessMode::Write)?;
        self.check_access::<B>(AccessMode::Write)?;
        self.manager.components_pair_mut::<A, B>(kind)
    }

    /// The `T` column of `kind` as raw bytes, if the phase may read `T`.
    pub fn component_bytes<T: Component + Pod>(&self, kind: EntityKindId) -> Result<&[u8], ComponentError> {
        self.check_access::<T>(AccessMode::Read)?;
        self.manager.component_bytes::<T>(kind)
    }

    /// Number of occupied indices of `kind`.
    pub fn number_of_components(&self, kind: EntityKindId) -> Result<usize, ComponentError> {
        self.manager.number_of_components(kind)
    }

    /// Table metadata of `kind`.
    pub fn table(&self, kind: EntityKindId) -> Result<&ComponentTable, ComponentError> {
        self.manager.table(kind)
    }

    /// Looks up an entity kind by name.
    pub fn kind_by_name(&self, name: &str) -> Option<EntityKindId> {
        self.manager.kind_by_name(name)
    }

    /// Phase permission table, read-only.
    pub fn permissions(&self) -> &PhasePermissions {
        &self.manager.permissions
    }
}

impl std::fmt::Debug for PhaseComponents<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseComponents")
            .field("phase", &self.phase)
            .field("kinds", &self.manager.number_of_kinds())
            .finish()
    }
}
