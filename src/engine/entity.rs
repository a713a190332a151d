//! Entities and their deferred lifecycle requests.
//!
//! An entity is a generational [`EntityId`] plus the [`EntityKindId`] naming
//! the component table that will hold its data. Creating an entity only
//! allocates the id; it receives a components index when its initialization
//! request is processed in [`EntitySystem::pre_update`], and gives it back
//! when terminated.
//!
//! Requests can be filed from any thread at any time. Each `pre_update`
//! processes, per queue (initialization, then termination, then destruction):
//!
//! * every request filed with `force = true`, newest first, or
//! * when none is forced, only the newest request.
//!
//! Unforced requests therefore trickle in at one per frame and queue, which
//! spreads expensive initialization over several frames.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::engine::component::Component;
use crate::engine::error::{ComponentError, EntityError};
use crate::engine::manager::ComponentManager;
use crate::engine::types::{ComponentsIndex, EntityKindId, IndexID, VersionID};


const INDEX_BITS: u32 = 32;
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;

/// Generational entity handle: version in the high half, slot in the low half.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct EntityId(pub u64);

#[inline]
const fn make_id(index: IndexID, version: VersionID) -> EntityId {
    EntityId(((version as u64) << INDEX_BITS) | (index as u64))
}

#[inline]
const fn split_id(entity: EntityId) -> (IndexID, VersionID) {
    ((entity.0 & INDEX_MASK) as IndexID, (entity.0 >> INDEX_BITS) as VersionID)
}

impl EntityId {
    /// Allocator slot.
    #[inline] pub fn index(self) -> IndexID { split_id(self).0 }
    /// Generation of the slot when the handle was issued.
    #[inline] pub fn version(self) -> VersionID { split_id(self).1 }
}

/// Writes the initial component values of a freshly indexed entity.
pub type EntityInitializer =
    Box<dyn FnOnce(&mut InitializationContext<'_>) -> Result<(), ComponentError> + Send>;

/// Handed to an [`EntityInitializer`] once the entity has a components index.
pub struct InitializationContext<'a> {
    components: &'a mut ComponentManager,
    entity: EntityId,
    kind: EntityKindId,
    index: ComponentsIndex,
}

impl InitializationContext<'_> {
    /// Entity being initialized.
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Kind of the entity.
    pub fn kind(&self) -> EntityKindId {
        self.kind
    }

    /// Components index just assigned.
    pub fn index(&self) -> ComponentsIndex {
        self.index
    }

    /// Overwrites the entity's `T` component.
    pub fn set<T: Component>(&mut self, value: T) -> Result<(), ComponentError> {
        *self.get_mut::<T>()? = value;
        Ok(())
    }

    /// The entity's `T` component.
    pub fn get_mut<T: Component>(&mut self) -> Result<&mut T, ComponentError> {
        let index = self.index;
        let column = self.components.components_mut::<T>(self.kind)?;
        let len = column.len();
        column
            .get_mut(index)
            .ok_or(ComponentError::IndexOutOfBounds { index, len })
    }

    /// The whole component manager.
    pub fn components(&mut self) -> &mut ComponentManager {
        self.components
    }
}

/// What one [`EntitySystem::pre_update`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityUpdateReport {
    /// Entities that received a components index.
    pub initialized: usize,
    /// Entities that returned their components index.
    pub terminated: usize,
    /// Entities whose id was freed.
    pub destroyed: usize,
    /// Requests dropped because the entity was stale, already in the
    /// requested state, or component work failed.
    pub rejected: usize,
}

#[derive(Clone, Copy, Debug)]
struct EntityRecord {
    kind: EntityKindId,
    components_index: Option<ComponentsIndex>,
}

#[derive(Default)]
struct Entities {
    versions: Vec<VersionID>,
    free_store: Vec<IndexID>,
    alive: Vec<bool>,
    records: Vec<Option<EntityRecord>>,
    live: usize,
}

impl Entities {
    fn allocate(&mut self, kind: EntityKindId) -> EntityId {
        let index = match self.free_store.pop() {
            Some(index) => index,
            None => {
                let index = self.versions.len() as IndexID;
                self.versions.push(0);
                self.alive.push(false);
                self.records.push(None);
                index
            }
        };

        let slot = index as usize;
        self.alive[slot] = true;
        self.records[slot] = Some(EntityRecord {
            kind,
            components_index: None,
        });
        self.live += 1;
        make_id(index, self.versions[slot])
    }

    fn free(&mut self, entity: EntityId) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let (index, _) = split_id(entity);
        let slot = index as usize;
        self.versions[slot] = self.versions[slot].wrapping_add(1);
        self.alive[slot] = false;
        self.records[slot] = None;
        self.free_store.push(index);
        self.live -= 1;
        true
    }

    fn is_alive(&self, entity: EntityId) -> bool {
        let (index, version) = split_id(entity);
        let slot = index as usize;
        slot < self.versions.len() && self.alive[slot] && self.versions[slot] == version
    }

    fn record(&self, entity: EntityId) -> Option<EntityRecord> {
        if !self.is_alive(entity) {
            return None;
        }
        self.records[entity.index() as usize]
    }

    fn set_components_index(&mut self, entity: EntityId, components_index: Option<ComponentsIndex>) {
        debug_assert!(self.is_alive(entity), "remapping stale entity {entity:?}");
        if let Some(Some(record)) = self.records.get_mut(entity.index() as usize) {
            record.components_index = components_index;
        }
    }

    fn live_entities(&self) -> Vec<EntityId> {
        (0..self.versions.len())
            .filter(|&slot| self.alive[slot])
            .map(|slot| make_id(slot as IndexID, self.versions[slot]))
            .collect()
    }
}

struct InitializationRequest {
    entity: EntityId,
    initializer: Option<EntityInitializer>,
    force: bool,
}

#[derive(Clone, Copy)]
struct Request {
    entity: EntityId,
    force: bool,
}

#[derive(Default)]
struct RequestQueues {
    initialization: Vec<InitializationRequest>,
    termination: Vec<Request>,
    destruction: Vec<Request>,
}

/// Takes the requests due this frame: every forced one, else the newest.
fn take_due<R>(queue: &mut Vec<R>, is_forced: fn(&R) -> bool) -> Vec<R> {
    if !queue.iter().any(is_forced) {
        return queue.pop().into_iter().collect();
    }
    let (forced, kept): (Vec<R>, Vec<R>) = std::mem::take(queue).into_iter().partition(is_forced);
    *queue = kept;
    forced.into_iter().rev().collect()
}

/// Allocates entity ids and routes their components index requests.
#[derive(Default)]
pub struct EntitySystem {
    entities: Mutex<Entities>,
    requests: Mutex<RequestQueues>,
}

impl EntitySystem {
    /// Creates an empty entity system.
    pub fn new() -> Self {
        Self::default()
    }

    fn entities(&self) -> MutexGuard<'_, Entities> {
        self.entities.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn requests(&self) -> MutexGuard<'_, RequestQueues> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates an uninitialized entity of `kind`.
    pub fn create_entity(&self, kind: EntityKindId) -> EntityId {
        self.entities().allocate(kind)
    }

    /// Returns `true` if `entity` was created and not yet destroyed.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities().is_alive(entity)
    }

    /// Returns `true` if the entity currently holds a components index.
    pub fn is_initialized(&self, entity: EntityId) -> bool {
        self.components_index(entity).is_some()
    }

    /// Components index of a live, initialized entity.
    pub fn components_index(&self, entity: EntityId) -> Option<ComponentsIndex> {
        self.entities()
            .record(entity)
            .and_then(|record| record.components_index)
    }

    /// Kind a live entity was created with.
    pub fn kind_of(&self, entity: EntityId) -> Option<EntityKindId> {
        self.entities().record(entity).map(|record| record.kind)
    }

    /// Number of live entities.
    pub fn number_of_entities(&self) -> usize {
        self.entities().live
    }

    /// Pending (initialization, termination, destruction) request counts.
    pub fn pending_requests(&self) -> (usize, usize, usize) {
        let requests = self.requests();
        (
            requests.initialization.len(),
            requests.termination.len(),
            requests.destruction.len(),
        )
    }

    fn ensure_alive(&self, entity: EntityId) -> Result<(), EntityError> {
        if self.is_alive(entity) {
            Ok(())
        } else {
            Err(EntityError::Stale(entity))
        }
    }

    /// Asks for `entity` to receive default-valued components.
    pub fn request_initialization(&self, entity: EntityId, force: bool) -> Result<(), EntityError> {
        self.push_initialization(entity, None, force)
    }

    /// Asks for `entity` to receive components, then runs `initializer` on them.
    ///
    /// If `initializer` fails, the components index is returned and the entity
    /// stays alive but uninitialized.
    pub fn request_initialization_with<F>(
        &self,
        entity: EntityId,
        force: bool,
        initializer: F,
    ) -> Result<(), EntityError>
    where
        F: FnOnce(&mut InitializationContext<'_>) -> Result<(), ComponentError> + Send + 'static,
    {
        self.push_initialization(entity, Some(Box::new(initializer)), force)
    }

    fn push_initialization(
        &self,
        entity: EntityId,
        initializer: Option<EntityInitializer>,
        force: bool,
    ) -> Result<(), EntityError> {
        self.ensure_alive(entity)?;
        self.requests().initialization.push(InitializationRequest {
            entity,
            initializer,
            force,
        });
        Ok(())
    }

    /// Asks for `entity` to give back its components index.
    pub fn request_termination(&self, entity: EntityId, force: bool) -> Result<(), EntityError> {
        self.ensure_alive(entity)?;
        self.requests().termination.push(Request { entity, force });
        Ok(())
    }

    /// Asks for `entity` to be terminated if needed and its id freed.
    pub fn request_destruction(&self, entity: EntityId, force: bool) -> Result<(), EntityError> {
        self.ensure_alive(entity)?;
        self.requests().destruction.push(Request { entity, force });
        Ok(())
    }

    /// Processes the requests due this frame.
    pub fn pre_update(&self, components: &mut ComponentManager) -> EntityUpdateReport {
        let (initialization, termination, destruction) = {
            let mut requests = self.requests();
            (
                take_due(&mut requests.initialization, |request| request.force),
                take_due(&mut requests.termination, |request| request.force),
                take_due(&mut requests.destruction, |request| request.force),
            )
        };

        let mut report = EntityUpdateReport::default();

        for request in initialization {
            match self.initialize(components, request) {
                Ok(true) => report.initialized += 1,
                Ok(false) => report.rejected += 1,
                Err(error) => {
                    log::error!("entity initialization failed: {error}");
                    report.rejected += 1;
                }
            }
        }

        for request in termination {
            let mut entities = self.entities();
            match Self::terminate(&mut entities, components, request.entity) {
                Ok(true) => report.terminated += 1,
                Ok(false) => report.rejected += 1,
                Err(error) => {
                    log::error!("terminating {:?} failed: {error}", request.entity);
                    report.rejected += 1;
                }
            }
        }

        for request in destruction {
            match self.destroy(components, request.entity) {
                Ok(true) => report.destroyed += 1,
                Ok(false) => report.rejected += 1,
                Err(error) => {
                    log::error!("destroying {:?} failed: {error}", request.entity);
                    report.rejected += 1;
                }
            }
        }

        if report != EntityUpdateReport::default() {
            log::trace!("entity pre-update: {report:?}");
        }
        report
    }

    fn initialize(
        &self,
        components: &mut ComponentManager,
        request: InitializationRequest,
    ) -> Result<bool, EntityError> {
        let entity = request.entity;
        let (kind, index) = {
            let mut entities = self.entities();
            let Some(record) = entities.record(entity) else {
                log::warn!("dropping initialization of stale entity {entity:?}");
                return Ok(false);
            };
            if record.components_index.is_some() {
                log::warn!("entity {entity:?} is already initialized");
                return Ok(false);
            }
            let index = components.new_components_index(record.kind, entity)?;
            entities.set_components_index(entity, Some(index));
            (record.kind, index)
        };

        if let Some(initializer) = request.initializer {
            let mut context = InitializationContext {
                components,
                entity,
                kind,
                index,
            };
            if let Err(error) = initializer(&mut context) {
                let mut entities = self.entities();
                if let Err(rollback) = Self::terminate(&mut entities, components, entity) {
                    log::error!("rolling back initialization of {entity:?} failed: {rollback}");
                }
                return Err(error.into());
            }
        }
        Ok(true)
    }

    fn terminate(
        entities: &mut Entities,
        components: &mut ComponentManager,
        entity: EntityId,
    ) -> Result<bool, EntityError> {
        let Some(record) = entities.record(entity) else {
            log::warn!("dropping termination of stale entity {entity:?}");
            return Ok(false);
        };
        let Some(index) = record.components_index else {
            return Ok(false);
        };

        let moved = components.return_components_index(record.kind, index)?;
        entities.set_components_index(entity, None);
        if let Some(moved) = moved {
            entities.set_components_index(moved, Some(index));
        }
        Ok(true)
    }

    fn destroy(&self, components: &mut ComponentManager, entity: EntityId) -> Result<bool, EntityError> {
        let mut entities = self.entities();
        if !entities.is_alive(entity) {
            log::warn!("dropping destruction of stale entity {entity:?}");
            return Ok(false);
        }
        Self::terminate(&mut entities, components, entity)?;
        Ok(entities.free(entity))
    }

    /// Drops every pending request, terminates and frees every live entity.
    ///
    /// Returns the number of entities destroyed.
    pub fn release(&self, components: &mut ComponentManager) -> usize {
        {
            let mut requests = self.requests();
            *requests = RequestQueues::default();
        }

        let mut entities = self.entities();
        let mut destroyed = 0;
        for entity in entities.live_entities() {
            if let Err(error) = Self::terminate(&mut entities, components, entity) {
                log::error!("terminating {entity:?} during release failed: {error}");
            }
            if entities.free(entity) {
                destroyed += 1;
            }
        }
        log::info!("entity system released: {destroyed} entities destroyed");
        destroyed
    }
}

impl std::fmt::Debug for EntitySystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (initialization, termination, destruction) = self.pending_requests();
        f.debug_struct("EntitySystem")
            .field("entities", &self.number_of_entities())
            .field("pending_initialization", &initialization)
            .field("pending_termination", &termination)
            .field("pending_destruction", &destruction)
            .finish()
    }
}
