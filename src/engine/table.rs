//! Structure-of-Arrays component tables.
//!
//! Every entity kind owns one [`ComponentTable`]: a set of parallel, dense
//! columns (one `Vec<T>` per component type) plus an owner column recording
//! which [`EntityId`] occupies each slot. An entity's components live at the
//! same [`ComponentsIndex`] in every column.
//!
//! # Storage model
//!
//! ```text
//! index:      0        1        2
//! owners:   [ e7     | e2     | e9     ]
//! Transform:[ t7     | t2     | t9     ]
//! Mesh:     [ m7     | m2     | m9     ]
//! ```
//!
//! # Core operations
//!
//! - **Allocate**: `new_components_index` appends a default value to every
//!   column in lock step and returns the new last index.
//! - **Return**: `return_components_index` removes an index by moving the
//!   last slot into it (swap-and-pop) in every column, then reports the owner
//!   of the moved slot so its components index can be remapped.
//!
//! Both are `O(columns)` and keep the columns dense; element order is not
//! preserved.
//!
//! # Type erasure
//!
//! Columns are stored behind the [`Column`] trait so one table can hold any
//! mix of component types. Typed access downcasts to [`ColumnStorage<T>`] and
//! fails with [`ComponentError::MissingColumn`] on a type the kind does not
//! carry. Typed column access is crate-private; outside callers reach columns
//! through [`ComponentManager`](crate::ComponentManager) so phase permissions
//! cannot be sidestepped.
//!
//! # Invariants
//!
//! - Every column has exactly `owners.len()` elements.
//! - `owners[i]` is the entity whose components are stored at index `i`.

use std::any::{type_name, Any, TypeId};

use crate::engine::component::{Component, ComponentRegistry};
use crate::engine::entity::EntityId;
use crate::engine::error::ComponentError;
use crate::engine::types::{ComponentID, ComponentsIndex, EntityKindId, Signature};


/// Type-erased interface to one component column.
pub trait Column: Any + Send + Sync {
    /// Number of stored values.
    fn len(&self) -> usize;

    /// Returns `true` if the column is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a default-constructed value.
    fn push_default(&mut self);

    /// Removes `index` by moving the last value into it.
    fn swap_remove(&mut self, index: usize);

    /// Reserves room for `additional` more values.
    fn reserve(&mut self, additional: usize);

    /// Drops every value.
    fn clear(&mut self);

    /// `TypeId` of the element type.
    fn element_type_id(&self) -> TypeId;

    /// Name of the element type.
    fn element_type_name(&self) -> &'static str;

    /// Upcast for downcasting to [`ColumnStorage<T>`].
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to [`ColumnStorage<T>`].
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Dense storage for one component type.
#[derive(Debug, Default)]
pub struct ColumnStorage<T> {
    values: Vec<T>,
}

impl<T> ColumnStorage<T> {
    /// Values in index order.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    /// Mutable values in index order.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }
}

impl<T: Component> Column for ColumnStorage<T> {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn push_default(&mut self) {
        self.values.push(T::default());
    }

    fn swap_remove(&mut self, index: usize) {
        self.values.swap_remove(index);
    }

    fn reserve(&mut self, additional: usize) {
        self.values.reserve(additional);
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    fn element_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn element_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn register_column<T: Component>(registry: &mut ComponentRegistry) -> Result<ComponentID, ComponentError> {
    registry.register::<T>()
}

fn new_column<T: Component>() -> Box<dyn Column> {
    Box::new(ColumnStorage::<T>::default())
}

struct ColumnFactory {
    name: &'static str,
    type_id: TypeId,
    register: fn(&mut ComponentRegistry) -> Result<ComponentID, ComponentError>,
    create: fn() -> Box<dyn Column>,
}

/// Declares the component types of an entity kind.
///
/// ```
/// use hearth_engine::{ComponentManager, ComponentTable};
///
/// #[derive(Default)]
/// struct Position([f32; 3]);
/// #[derive(Default)]
/// struct Health(u32);
///
/// let mut components = ComponentManager::new();
/// let kind = components
///     .register_entity_kind(ComponentTable::builder("Creature").with::<Position>().with::<Health>())
///     .unwrap();
/// assert_eq!(components.number_of_components(kind).unwrap(), 0);
/// ```
pub struct TableBuilder {
    name: String,
    columns: Vec<ColumnFactory>,
    capacity: usize,
}

impl TableBuilder {
    /// Adds a column for component type `T`.
    pub fn with<T: Component>(mut self) -> Self {
        self.columns.push(ColumnFactory {
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            register: register_column::<T>,
            create: new_column::<T>,
        });
        self
    }

    /// Pre-allocates room for `capacity` entities.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Kind name the table is being built for.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn build(
        self,
        kind: EntityKindId,
        registry: &mut ComponentRegistry,
    ) -> Result<ComponentTable, ComponentError> {
        let mut signature = Signature::default();
        let mut column_ids = Vec::with_capacity(self.columns.len());
        let mut columns = Vec::with_capacity(self.columns.len());

        for (position, factory) in self.columns.iter().enumerate() {
            if self.columns[..position]
                .iter()
                .any(|earlier| earlier.type_id == factory.type_id)
            {
                return Err(ComponentError::DuplicateColumn {
                    kind: self.name.clone(),
                    component: factory.name,
                });
            }

            let id = (factory.register)(registry)?;
            signature.set(id);
            column_ids.push(id);

            let mut column = (factory.create)();
            column.reserve(self.capacity);
            columns.push(column);
        }

        Ok(ComponentTable {
            kind,
            name: self.name,
            owners: Vec::with_capacity(self.capacity),
            columns,
            column_ids,
            signature,
        })
    }
}

/// Parallel component columns of one entity kind.
pub struct ComponentTable {
    kind: EntityKindId,
    name: String,
    owners: Vec<EntityId>,
    columns: Vec<Box<dyn Column>>,
    column_ids: Vec<ComponentID>,
    signature: Signature,
}

impl ComponentTable {
    /// Starts declaring an entity kind called `name`.
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder {
            name: name.into(),
            columns: Vec::new(),
            capacity: 0,
        }
    }

    /// Kind identifier.
    #[inline]
    pub fn kind(&self) -> EntityKindId {
        self.kind
    }

    /// Kind name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of occupied indices.
    #[inline]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Returns `true` if no index is occupied.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Owners in index order.
    #[inline]
    pub fn owners(&self) -> &[EntityId] {
        &self.owners
    }

    /// Owner of `index`.
    pub fn owner(&self, index: ComponentsIndex) -> Option<EntityId> {
        self.owners.get(index).copied()
    }

    /// Component types stored by this kind.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Component identifiers in column order.
    #[inline]
    pub fn column_ids(&self) -> &[ComponentID] {
        &self.column_ids
    }

    /// Returns `true` if this kind stores `T`.
    pub fn has<T: 'static>(&self) -> bool {
        self.column_position::<T>().is_some()
    }

    /// Appends a default slot for `owner` in every column; returns its index.
    pub fn new_components_index(&mut self, owner: EntityId) -> ComponentsIndex {
        for column in &mut self.columns {
            column.push_default();
        }
        self.owners.push(owner);
        self.debug_assert_aligned();
        self.owners.len() - 1
    }

    /// Releases `index` by swap-and-pop.
    ///
    /// Returns the entity whose slot moved into `index`, or `None` when
    /// `index` was the last slot.
    pub fn return_components_index(
        &mut self,
        index: ComponentsIndex,
    ) -> Result<Option<EntityId>, ComponentError> {
        let len = self.owners.len();
        if index >= len {
            return Err(ComponentError::IndexOutOfBounds { index, len });
        }

        for column in &mut self.columns {
            column.swap_remove(index);
        }
        self.owners.swap_remove(index);
        self.debug_assert_aligned();

        Ok(self.owners.get(index).copied())
    }

    /// Pre-allocates room for `additional` more entities.
    pub fn reserve(&mut self, additional: usize) {
        self.owners.reserve(additional);
        for column in &mut self.columns {
            column.reserve(additional);
        }
    }

    /// Drops every slot.
    pub fn clear(&mut self) {
        self.owners.clear();
        for column in &mut self.columns {
            column.clear();
        }
    }

    fn column_position<T: 'static>(&self) -> Option<usize> {
        let type_id = TypeId::of::<T>();
        self.columns
            .iter()
            .position(|column| column.element_type_id() == type_id)
    }

    fn missing<T: 'static>(&self) -> ComponentError {
        ComponentError::MissingColumn {
            kind: self.name.clone(),
            component: type_name::<T>(),
        }
    }

    /// Column of `T` values in index order.
    pub(crate) fn column<T: Component>(&self) -> Result<&[T], ComponentError> {
        let position = self.column_position::<T>().ok_or_else(|| self.missing::<T>())?;
        self.columns[position]
            .as_any()
            .downcast_ref::<ColumnStorage<T>>()
            .map(ColumnStorage::as_slice)
            .ok_or_else(|| self.missing::<T>())
    }

    /// Mutable column of `T` values in index order.
    pub(crate) fn column_mut<T: Component>(&mut self) -> Result<&mut [T], ComponentError> {
        let position = self.column_position::<T>().ok_or_else(|| self.missing::<T>())?;
        let missing = self.missing::<T>();
        self.columns[position]
            .as_any_mut()
            .downcast_mut::<ColumnStorage<T>>()
            .map(ColumnStorage::as_mut_slice)
            .ok_or(missing)
    }

    /// Two distinct mutable columns at once.
    pub(crate) fn column_pair_mut<A: Component, B: Component>(
        &mut self,
    ) -> Result<(&mut [A], &mut [B]), ComponentError> {
        let a = self.column_position::<A>().ok_or_else(|| self.missing::<A>())?;
        let b = self.column_position::<B>().ok_or_else(|| self.missing::<B>())?;
        if a == b {
            return Err(ComponentError::AliasedColumns {
                component: type_name::<A>(),
            });
        }

        let (missing_a, missing_b) = (self.missing::<A>(), self.missing::<B>());
        let (first, second) = if a < b {
            let (left, right) = self.columns.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.columns.split_at_mut(a);
            (&mut right[0], &mut left[b])
        };

        let column_a = first
            .as_any_mut()
            .downcast_mut::<ColumnStorage<A>>()
            .ok_or(missing_a)?;
        let column_b = second
            .as_any_mut()
            .downcast_mut::<ColumnStorage<B>>()
            .ok_or(missing_b)?;
        Ok((column_a.as_mut_slice(), column_b.as_mut_slice()))
    }

    /// Verifies that every column has one value per owner.
    pub fn validate(&self) -> Result<(), ComponentError> {
        let expected = self.owners.len();
        for column in &self.columns {
            if column.len() != expected {
                return Err(ComponentError::MisalignedColumns {
                    kind: self.name.clone(),
                    column: column.element_type_name(),
                    expected,
                    actual: column.len(),
                });
            }
        }
        Ok(())
    }

    #[inline]
    fn debug_assert_aligned(&self) {
        debug_assert!(
            self.columns.iter().all(|column| column.len() == self.owners.len()),
            "component columns of `{}` diverged in length",
            self.name
        );
    }
}

impl std::fmt::Debug for ComponentTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentTable")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("len", &self.owners.len())
            .field(
                "columns",
                &self
                    .columns
                    .iter()
                    .map(|column| column.element_type_name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
