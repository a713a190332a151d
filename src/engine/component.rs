//! # Component Registry
//!
//! Assigns compact `ComponentID` values to Rust component types and records
//! their layout for diagnostics and phase permission tables.
//!
//! ## Purpose
//! Update phases declare their read and write sets as bitsets over component
//! identifiers. The registry provides those identifiers, one per type, and the
//! type-erased column factories used when an entity kind's table is built.
//!
//! ## Design
//! - One registry per [`ComponentManager`](crate::engine::manager::ComponentManager);
//!   there is no process-wide state, so several engines can coexist (tests do).
//! - Identifiers are handed out sequentially in `[0, COMPONENT_CAP)`.
//!
//! ## Invariants
//! - Every entry in `by_type` has a matching `by_id[id]`.
//! - Registering a type twice returns the same identifier.

use std::{
    any::{type_name, TypeId},
    collections::HashMap,
    mem::{align_of, size_of},
};

use crate::engine::error::ComponentError;
use crate::engine::types::{ComponentID, COMPONENT_CAP};


/// Bounds every component type satisfies.
///
/// Components are default-constructed when an entity receives a components
/// index and may be accessed from executor threads.
pub trait Component: Default + Send + Sync + 'static {}

impl<T: Default + Send + Sync + 'static> Component for T {}

/// Runtime metadata describing a registered component type.
#[derive(Clone, Copy, Debug)]
pub struct ComponentDesc {
    /// Assigned identifier.
    pub component_id: ComponentID,
    /// Fully-qualified Rust type name.
    pub name: &'static str,
    /// Rust `TypeId`.
    pub type_id: TypeId,
    /// Size of one value in bytes.
    pub size: usize,
    /// Alignment of one value in bytes.
    pub align: usize,
}

impl ComponentDesc {
    /// Describes `T` with a placeholder identifier.
    pub fn of<T: 'static>() -> Self {
        Self {
            component_id: 0,
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            size: size_of::<T>(),
            align: align_of::<T>(),
        }
    }

    /// Returns this descriptor with `component_id` filled in.
    pub fn with_id(mut self, component_id: ComponentID) -> Self {
        self.component_id = component_id;
        self
    }
}

/// Mapping between Rust component types and compact `ComponentID` values.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentID>,
    by_id: Vec<ComponentDesc>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` and returns its identifier.
    ///
    /// ## Behavior
    /// - If `T` is already registered, returns the existing ID.
    /// - Otherwise allocates the next ID, failing once `COMPONENT_CAP` types
    ///   are registered.
    pub fn register<T: Component>(&mut self) -> Result<ComponentID, ComponentError> {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            return Ok(existing);
        }

        if self.by_id.len() >= COMPONENT_CAP {
            return Err(ComponentError::RegistryFull { cap: COMPONENT_CAP });
        }

        let id = self.by_id.len() as ComponentID;
        self.by_type.insert(type_id, id);
        self.by_id.push(ComponentDesc::of::<T>().with_id(id));
        log::debug!("registered component `{}` as {id}", type_name::<T>());
        Ok(id)
    }

    /// Returns the identifier of `T`, if registered.
    pub fn id_of<T: 'static>(&self) -> Option<ComponentID> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Number of registered component types.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
