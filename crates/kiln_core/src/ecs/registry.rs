//! # Registry
//!
//! The central container for all archetypes, entities and listeners.
//!
//! Archetypes are declared up front with a [`RegistryBuilder`] and never
//! change afterwards. Every pool reserves `pool_capacity` slots at build
//! time, so entity churn below that size never allocates.
//!
//! Lifecycle changes are requested with [`Registry::queue`] and applied in
//! request order by [`Registry::update`], or applied right away with
//! [`Registry::execute`].

use std::any::{Any, TypeId};
use std::collections::HashMap;

use super::archetype::{ArchetypeStorage, Record, Schema, SchemaId};
use super::component::{Component, ComponentMask};
use super::entity::{EntityDirectory, EntityId, EntityInfo, EntityState, EntityTask};
use super::events::{
    ArchetypeChanged, ComponentChanged, EntityCreated, EntityStateChanged, EventBus, Listener,
};
use super::fetch::Fetch;
use super::iter::PoolIter;
use super::query::{Filter, Query, QueryPlan};
use super::storage::{ColumnSpec, PoolKind};
use crate::config::RegistryConfig;
use crate::error::{EcsError, EcsResult};

/// Declares the archetypes and singletons of a [`Registry`].
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = RegistryBuilder::new()
///     .archetype::<(Health, Position)>()?
///     .archetype::<(Position,)>()?
///     .singleton(Clock::default())
///     .build()?;
/// ```
pub struct RegistryBuilder {
    config: RegistryConfig,
    schemas: Vec<Schema>,
    singletons: HashMap<TypeId, Box<dyn Any>>,
}

impl RegistryBuilder {
    /// Starts with the default configuration and no archetypes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RegistryConfig::default(),
            schemas: Vec::new(),
            singletons: HashMap::new(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers the archetype declared by record type `R`.
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateArchetype`] if an archetype with the same
    /// component set exists, [`EcsError::ComponentIdConflict`] if one of the
    /// record's component ids already belongs to another type, or the
    /// record's own configuration errors.
    pub fn archetype<R: Record>(mut self) -> EcsResult<Self> {
        let raw = u16::try_from(self.schemas.len())
            .map_err(|_| EcsError::InvalidConfig("too many archetypes".to_string()))?;
        let schema = Schema::of::<R>(SchemaId::new(raw))?;

        if let Some(existing) = self.schemas.iter().find(|s| s.mask() == schema.mask()) {
            return Err(EcsError::DuplicateArchetype(existing.id()));
        }
        for column in schema.columns() {
            let known = self
                .schemas
                .iter()
                .flat_map(Schema::columns)
                .find(|other| other.id() == column.id() && ColumnSpec::type_id(other) != column.type_id());
            if let Some(known) = known {
                return Err(EcsError::ComponentIdConflict {
                    id: column.id(),
                    first: known.name(),
                    second: column.name(),
                });
            }
        }
        self.schemas.push(schema);
        Ok(self)
    }

    /// Stores a single global value, retrievable by type.
    ///
    /// Registering the same type twice keeps the last value.
    #[must_use]
    pub fn singleton<S: 'static>(mut self, value: S) -> Self {
        self.singletons.insert(TypeId::of::<S>(), Box::new(value));
        self
    }

    /// Allocates every pool and builds the registry.
    ///
    /// # Errors
    ///
    /// Configuration errors from pool construction.
    pub fn build(self) -> EcsResult<Registry> {
        let capacity = self.config.pool_capacity;
        let mut by_mask = HashMap::with_capacity(self.schemas.len());
        let mut storages = Vec::with_capacity(self.schemas.len());
        for schema in self.schemas {
            by_mask.insert(schema.mask(), schema.id());
            storages.push(ArchetypeStorage::new(schema, capacity)?);
        }

        tracing::debug!(
            "Registry built: {} archetypes, {} singletons, pool capacity {}",
            storages.len(),
            self.singletons.len(),
            capacity
        );

        Ok(Registry {
            directory: EntityDirectory::new(self.config.queue_capacity),
            events: EventBus::new(storages.len()),
            callbacks: self.config.callbacks,
            config: self.config,
            storages,
            by_mask,
            singletons: self.singletons,
        })
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Storage for every entity of a fixed set of archetypes.
///
/// # Borrowing
///
/// Lookups, iterators and queries borrow the registry mutably. They must be
/// dropped (and re-acquired) before the registry is changed again.
pub struct Registry {
    config: RegistryConfig,
    directory: EntityDirectory,
    /// Indexed by `SchemaId`.
    storages: Vec<ArchetypeStorage>,
    by_mask: HashMap<ComponentMask, SchemaId>,
    events: EventBus<Registry>,
    singletons: HashMap<TypeId, Box<dyn Any>>,
    /// Built-in event delivery switch.
    callbacks: bool,
}

impl Registry {
    /// Shorthand for [`RegistryBuilder::new`].
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// The configuration the registry was built with.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // =========================================================================
    // Archetypes
    // =========================================================================

    /// The archetype declared by record type `R`.
    ///
    /// Records with the same components in another order resolve to the same
    /// archetype.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownArchetype`] if no archetype stores exactly these
    /// components.
    pub fn schema_id<R: Record>(&self) -> EcsResult<SchemaId> {
        let mask = R::mask()?;
        self.by_mask
            .get(&mask)
            .copied()
            .ok_or(EcsError::UnknownArchetype(R::name()))
    }

    /// Description of an archetype.
    #[must_use]
    pub fn schema(&self, schema: SchemaId) -> Option<&Schema> {
        self.storages.get(schema.index()).map(ArchetypeStorage::schema)
    }

    /// All archetypes, in registration order.
    pub fn schemas(&self) -> impl Iterator<Item = &Schema> {
        self.storages.iter().map(ArchetypeStorage::schema)
    }

    fn storage<R: Record>(&self) -> EcsResult<&ArchetypeStorage> {
        let schema = self.schema_id::<R>()?;
        Ok(&self.storages[schema.index()])
    }

    fn storage_mut<R: Record>(&mut self) -> EcsResult<&mut ArchetypeStorage> {
        let schema = self.schema_id::<R>()?;
        Ok(&mut self.storages[schema.index()])
    }

    /// Number of live slots in one pool of archetype `R`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownArchetype`] if `R` is not registered.
    pub fn pool_count<R: Record>(&self, pool: PoolKind) -> EcsResult<usize> {
        Ok(self.storage::<R>()?.pool(pool).count())
    }

    /// Number of allocated slots in one pool of archetype `R`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownArchetype`] if `R` is not registered.
    pub fn pool_capacity<R: Record>(&self, pool: PoolKind) -> EcsResult<usize> {
        Ok(self.storage::<R>()?.pool(pool).capacity())
    }

    /// Owners of the live slots of one pool of archetype `R`, in slot order.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownArchetype`] if `R` is not registered.
    pub fn ids<R: Record>(&self, pool: PoolKind) -> EcsResult<&[EntityId]> {
        Ok(self.storage::<R>()?.pool(pool).ids())
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Writes a new LIVE entity into the active pool of its archetype.
    ///
    /// A `locked` entity's id is never handed out again after it dies.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownArchetype`] if the record's archetype is not
    /// registered, [`EcsError::EntityIdsExhausted`] if no id is left.
    pub fn create<R: Record>(&mut self, record: R, locked: bool) -> EcsResult<EntityId> {
        let schema = self.schema_id::<R>()?;
        let id = self.directory.next_id()?;
        let index = self.storages[schema.index()]
            .pool_mut(PoolKind::Active)
            .append(id, record)?;
        let id = self.directory.allocate(schema, index, locked)?;

        tracing::trace!("Created entity {} in archetype {} at slot {}", id, schema, index);

        if self.callbacks {
            self.emit(&EntityCreated { id, schema });
            self.emit_data_changed(schema);
        }
        Ok(id)
    }

    /// Creates `count` unlocked copies of `record`.
    ///
    /// # Errors
    ///
    /// See [`Registry::create`].
    pub fn populate<R: Record>(&mut self, record: R, count: usize) -> EcsResult<()> {
        for _ in 0..count {
            self.create(record, false)?;
        }
        Ok(())
    }

    /// Requests a lifecycle transition, applied by the next [`Registry::update`].
    ///
    /// Returns `false` without changing anything if the entity is not in the
    /// state the task starts from (which includes a transition already being
    /// pending).
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityOutOfRange`] if the id was never allocated.
    pub fn queue(&mut self, id: EntityId, task: EntityTask) -> EcsResult<bool> {
        if !self.request(id, task)? {
            return Ok(false);
        }
        self.directory.enqueue(id);
        Ok(true)
    }

    /// Applies every queued transition in request order.
    ///
    /// Transitions queued by callbacks while this runs are kept for the next
    /// call.
    ///
    /// # Errors
    ///
    /// Invalid-argument errors if the directory and the pools disagree.
    pub fn update(&mut self) -> EcsResult<()> {
        let queue = self.directory.drain();
        let outcome = queue.iter().try_for_each(|&id| self.apply(id, None));
        let applied = queue.len();
        self.directory.recycle(queue);
        outcome?;

        if applied > 0 {
            tracing::debug!(
                "Applied {} transitions, {} queued for the next update",
                applied,
                self.directory.queued()
            );
        }
        Ok(())
    }

    /// Requests and applies a lifecycle transition immediately.
    ///
    /// Returns `false` without changing anything if the entity is not in the
    /// state the task starts from. Only the completed transition is reported,
    /// as a single [`EntityStateChanged`] from the starting state (for example
    /// LIVE to SLEEPING).
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityOutOfRange`] if the id was never allocated.
    pub fn execute(&mut self, id: EntityId, task: EntityTask) -> EcsResult<bool> {
        let Some((origin, _)) = self.directory.request(id, task)? else {
            tracing::trace!("Rejected {:?} for entity {}", task, id);
            return Ok(false);
        };
        self.apply(id, Some(origin))?;
        Ok(true)
    }

    fn request(&mut self, id: EntityId, task: EntityTask) -> EcsResult<bool> {
        let Some((previous, current)) = self.directory.request(id, task)? else {
            tracing::trace!("Rejected {:?} for entity {}", task, id);
            return Ok(false);
        };
        tracing::trace!("Entity {}: {} -> {}", id, previous, current);

        if self.callbacks {
            self.emit(&EntityStateChanged {
                id,
                previous,
                current,
            });
        }
        Ok(true)
    }

    /// Moves a pending entity's row and settles its state.
    ///
    /// `origin` overrides the reported previous state.
    fn apply(&mut self, id: EntityId, origin: Option<EntityState>) -> EcsResult<()> {
        let info = *self.directory.info(id)?;
        let storage = &mut self.storages[info.schema.index()];

        let (swapped, index) = match info.state {
            EntityState::Killed => (storage.apply_kill(info.index)?, None),
            EntityState::Snoozed => {
                let swapped = storage.apply_snooze(info.index)?;
                (swapped, Some(storage.pool(PoolKind::Dormant).count() - 1))
            }
            EntityState::Awake => {
                let swapped = storage.apply_wake(info.index)?;
                (swapped, Some(storage.pool(PoolKind::Active).count() - 1))
            }
            EntityState::Live | EntityState::Dead | EntityState::Sleeping => return Ok(()),
        };

        self.directory.relocate(swapped, info.index)?;
        let Some((settled_from, current)) = self.directory.settle(id, index)? else {
            return Ok(());
        };
        let previous = origin.unwrap_or(settled_from);
        tracing::trace!("Entity {}: {} -> {}", id, previous, current);

        if self.callbacks {
            self.emit(&EntityStateChanged {
                id,
                previous,
                current,
            });
            self.emit_data_changed(info.schema);
        }
        Ok(())
    }

    /// Location and lifecycle data of an entity.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityOutOfRange`] if the id was never allocated.
    pub fn info(&self, id: EntityId) -> EcsResult<EntityInfo> {
        self.directory.info(id).copied()
    }

    /// Number of ids ever allocated.
    #[must_use]
    pub fn total(&self) -> usize {
        self.directory.total()
    }

    /// Number of entities in `state`.
    #[must_use]
    pub fn count(&self, state: EntityState) -> usize {
        self.directory.count(state)
    }

    /// Number of transitions waiting for the next update.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.directory.queued()
    }

    /// Checks an entity's lifecycle state.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityOutOfRange`] if the id was never allocated.
    pub fn is_state(&self, id: EntityId, state: EntityState) -> EcsResult<bool> {
        Ok(self.directory.info(id)?.state == state)
    }

    /// Checks whether an entity belongs to archetype `R`.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityOutOfRange`] for unknown ids,
    /// [`EcsError::UnknownArchetype`] if `R` is not registered.
    pub fn is_type<R: Record>(&self, id: EntityId) -> EcsResult<bool> {
        let schema = self.schema_id::<R>()?;
        Ok(self.directory.info(id)?.schema == schema)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Borrows components of an entity known to belong to archetype `R`.
    ///
    /// Returns `None` if the entity is dead or belongs to another archetype.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityOutOfRange`] for unknown ids,
    /// [`EcsError::UnknownArchetype`] if `R` is not registered,
    /// [`EcsError::MissingComponent`] if `R` lacks a fetched component.
    pub fn view<R: Record, F: Fetch>(&mut self, id: EntityId) -> EcsResult<Option<F::Item<'_>>> {
        let schema = self.schema_id::<R>()?;
        let info = *self.directory.info(id)?;
        match info.state.pool() {
            Some(pool) if info.schema == schema => self.storages[schema.index()]
                .pool_mut(pool)
                .get::<F>(info.index)
                .map(Some),
            _ => Ok(None),
        }
    }

    /// Borrows components of an entity that must be alive and belong to
    /// archetype `R`.
    ///
    /// # Errors
    ///
    /// [`EcsError::DeadEntity`] or [`EcsError::WrongArchetype`] on a
    /// mismatch, plus the errors of [`Registry::view`].
    pub fn get<R: Record, F: Fetch>(&mut self, id: EntityId) -> EcsResult<F::Item<'_>> {
        let schema = self.schema_id::<R>()?;
        let info = *self.directory.info(id)?;
        let Some(pool) = info.state.pool() else {
            return Err(EcsError::DeadEntity(id));
        };
        if info.schema != schema {
            return Err(EcsError::WrongArchetype {
                id,
                expected: schema,
                actual: info.schema,
            });
        }
        self.storages[schema.index()].pool_mut(pool).get::<F>(info.index)
    }

    /// Borrows components of an entity of any archetype.
    ///
    /// Returns `None` if the entity is dead or its archetype lacks a fetched
    /// component.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityOutOfRange`] for unknown ids,
    /// [`EcsError::DuplicateComponent`] if the fetch repeats a component.
    pub fn find<F: Fetch>(&mut self, id: EntityId) -> EcsResult<Option<F::Item<'_>>> {
        let wanted = F::mask()?;
        let info = *self.directory.info(id)?;
        let Some(pool) = info.state.pool() else {
            return Ok(None);
        };
        let storage = &mut self.storages[info.schema.index()];
        if !storage.schema().mask().contains_all(wanted) {
            return Ok(None);
        }
        storage.pool_mut(pool).get::<F>(info.index).map(Some)
    }

    /// A singleton registered with [`RegistryBuilder::singleton`].
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownSingleton`] if no value of type `S` was registered.
    pub fn singleton<S: 'static>(&self) -> EcsResult<&S> {
        self.singletons
            .get(&TypeId::of::<S>())
            .and_then(|value| value.downcast_ref::<S>())
            .ok_or(EcsError::UnknownSingleton(std::any::type_name::<S>()))
    }

    /// A singleton, mutably.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownSingleton`] if no value of type `S` was registered.
    pub fn singleton_mut<S: 'static>(&mut self) -> EcsResult<&mut S> {
        self.singletons
            .get_mut(&TypeId::of::<S>())
            .and_then(|value| value.downcast_mut::<S>())
            .ok_or(EcsError::UnknownSingleton(std::any::type_name::<S>()))
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Iterates one pool of archetype `R`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownArchetype`] if `R` is not registered,
    /// [`EcsError::MissingComponent`] if `R` lacks a fetched component.
    pub fn iter<R: Record, F: Fetch>(&mut self, pool: PoolKind) -> EcsResult<PoolIter<'_, F>> {
        self.storage_mut::<R>()?.pool_mut(pool).iter::<F>()
    }

    /// Resolves a fetch and filter to the archetypes it covers.
    ///
    /// # Errors
    ///
    /// [`EcsError::NoMatchingArchetype`] if nothing matches,
    /// [`EcsError::DuplicateComponent`] if the fetch repeats a component.
    pub fn prepare<F: Fetch>(&self, filter: &Filter) -> EcsResult<QueryPlan<F>> {
        QueryPlan::resolve(self.schemas(), filter)
    }

    /// Borrows one pool of every archetype covered by `plan`.
    ///
    /// # Errors
    ///
    /// [`EcsError::MissingComponent`] if the plan was prepared by a registry
    /// with other archetypes.
    pub fn bind<F: Fetch>(&mut self, plan: &QueryPlan<F>, pool: PoolKind) -> EcsResult<Query<'_, F>> {
        let mut chunks = Vec::with_capacity(plan.schemas().len());
        for storage in &mut self.storages {
            if plan.matches(storage.schema().id()) {
                chunks.push(storage.pool_mut(pool).iter::<F>()?);
            }
        }
        Ok(Query::new(chunks))
    }

    /// Prepares and binds a query in one step.
    ///
    /// # Errors
    ///
    /// See [`Registry::prepare`].
    pub fn query<F: Fetch>(&mut self, filter: &Filter, pool: PoolKind) -> EcsResult<Query<'_, F>> {
        let plan = self.prepare::<F>(filter)?;
        self.bind(&plan, pool)
    }

    /// Calls `f` on every entity of one pool whose archetype stores the
    /// fetched components. Visits nothing if no archetype does.
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateComponent`] if the fetch repeats a component.
    pub fn for_each<F: Fetch>(
        &mut self,
        pool: PoolKind,
        mut f: impl FnMut(EntityId, F::Item<'_>),
    ) -> EcsResult<()> {
        let wanted = F::mask()?;
        for storage in &mut self.storages {
            if storage.schema().mask().contains_all(wanted) {
                storage.pool_mut(pool).iter::<F>()?.for_each(&mut f);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Memory
    // =========================================================================

    /// Releases the scratch slots of both pools of archetype `R`.
    ///
    /// Returns the number of slots released.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownArchetype`] if `R` is not registered.
    pub fn trim<R: Record>(&mut self) -> EcsResult<usize> {
        let schema = self.schema_id::<R>()?;
        self.trim_schema(schema)
    }

    /// Releases the scratch slots of both pools of one archetype.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownArchetype`] if the schema id is out of range.
    pub fn trim_schema(&mut self, schema: SchemaId) -> EcsResult<usize> {
        let storage = self
            .storages
            .get_mut(schema.index())
            .ok_or(EcsError::UnknownArchetype("<unregistered schema id>"))?;
        let released = storage.trim();
        tracing::debug!("Trimmed archetype {}: {} slots released", schema, released);
        Ok(released)
    }

    /// Releases the scratch slots of every pool.
    pub fn trim_all(&mut self) -> usize {
        let released: usize = self.storages.iter_mut().map(ArchetypeStorage::trim).sum();
        tracing::debug!("Trimmed all archetypes: {} slots released", released);
        released
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Turns delivery of the built-in events on or off.
    pub fn set_callbacks(&mut self, enabled: bool) {
        self.callbacks = enabled;
    }

    /// Checks if built-in events are delivered.
    #[must_use]
    pub const fn callbacks(&self) -> bool {
        self.callbacks
    }

    /// Subscribes to every event of type `E`, replacing the previous
    /// callback.
    pub fn subscribe<E: 'static>(&mut self, callback: impl FnMut(&mut Self, &E) + 'static) {
        self.events.subscribe(callback);
    }

    /// Pauses delivery of `E`.
    pub fn close<E: 'static>(&mut self) {
        if let Some(listener) = self.events.listener::<E>() {
            listener.close();
        }
    }

    /// Resumes delivery of `E`.
    pub fn open<E: 'static>(&mut self) {
        if let Some(listener) = self.events.listener::<E>() {
            listener.open();
        }
    }

    /// Removes the callback of `E` and closes its listener.
    pub fn unsubscribe<E: 'static>(&mut self) {
        if let Some(listener) = self.events.listener::<E>() {
            listener.unsubscribe();
        }
    }

    /// Delivers an event to its subscriber, if open.
    ///
    /// Not affected by [`Registry::set_callbacks`]. An event raised from the
    /// subscriber of the same type is delivered after the running call
    /// returns.
    pub fn call<E: Clone + 'static>(&mut self, event: &E) {
        self.emit(event);
    }

    /// Subscribes to data changes of archetype `R` only.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownArchetype`] if `R` is not registered.
    pub fn subscribe_archetype<R: Record>(
        &mut self,
        callback: impl FnMut(&mut Self, &ArchetypeChanged) + 'static,
    ) -> EcsResult<()> {
        let schema = self.schema_id::<R>()?;
        if let Some(listener) = self.events.archetype(schema) {
            listener.subscribe(callback);
        }
        Ok(())
    }

    /// Pauses per-archetype delivery for `R`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownArchetype`] if `R` is not registered.
    pub fn close_archetype<R: Record>(&mut self) -> EcsResult<()> {
        let schema = self.schema_id::<R>()?;
        if let Some(listener) = self.events.archetype(schema) {
            listener.close();
        }
        Ok(())
    }

    /// Resumes per-archetype delivery for `R`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownArchetype`] if `R` is not registered.
    pub fn open_archetype<R: Record>(&mut self) -> EcsResult<()> {
        let schema = self.schema_id::<R>()?;
        if let Some(listener) = self.events.archetype(schema) {
            listener.open();
        }
        Ok(())
    }

    /// Subscribes to data changes of rows storing component `C`.
    pub fn subscribe_component<C: Component>(
        &mut self,
        callback: impl FnMut(&mut Self, &ComponentChanged) + 'static,
    ) {
        self.events.component(C::ID).subscribe(callback);
    }

    /// Pauses per-component delivery for `C`.
    pub fn close_component<C: Component>(&mut self) {
        self.events.component(C::ID).close();
    }

    /// Resumes per-component delivery for `C`.
    pub fn open_component<C: Component>(&mut self) {
        self.events.component(C::ID).open();
    }

    /// Runs the typed listener of `E`, lending it the registry.
    fn emit<E: Clone + 'static>(&mut self, event: &E) {
        self.dispatch(event, EventBus::listener::<E>);
    }

    /// Delivers `event` through the listener picked by `slot`, then every
    /// same-type event its callback raised, in order.
    fn dispatch<E: Clone + 'static>(
        &mut self,
        event: &E,
        slot: impl Fn(&mut EventBus<Self>) -> Option<&mut Listener<Self, E>>,
    ) {
        let mut next = slot(&mut self.events)
            .and_then(|listener| listener.begin(event))
            .map(|callback| (callback, event.clone()));
        while let Some((mut callback, event)) = next {
            callback(self, &event);
            next = slot(&mut self.events).and_then(|listener| listener.finish(callback));
        }
    }

    /// Fires the archetype event, then one component event per stored
    /// component in ascending id order.
    fn emit_data_changed(&mut self, schema: SchemaId) {
        let event = ArchetypeChanged { schema };
        self.dispatch(&event, |events| events.archetype(schema));
        self.emit(&event);

        let mask = self.storages[schema.index()].schema().mask();
        for component in mask.iter() {
            let event = ComponentChanged { component };
            self.dispatch(&event, |events| events.existing_component(component));
            self.emit(&event);
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("archetypes", &self.storages.len())
            .field("total", &self.directory.total())
            .field("pending", &self.directory.queued())
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use bytemuck::{Pod, Zeroable};

    use super::*;
    use crate::ecs::ComponentId;

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Health {
        value: i32,
    }

    impl Component for Health {
        const ID: ComponentId = 0;
    }

    #[allow(dead_code)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Position {
        x: f32,
        y: f32,
    }

    impl Component for Position {
        const ID: ComponentId = 1;
    }

    type Unit = (Health, Position);
    type Marker = (Position,);

    fn unit(value: i32) -> Unit {
        (Health { value }, Position::default())
    }

    fn registry() -> Registry {
        RegistryBuilder::new()
            .archetype::<Unit>()
            .unwrap()
            .archetype::<Marker>()
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_duplicate_archetype_rejected() {
        let err = RegistryBuilder::new()
            .archetype::<(Health, Position)>()
            .unwrap()
            .archetype::<(Position, Health)>()
            .err()
            .unwrap();
        assert_eq!(err, EcsError::DuplicateArchetype(SchemaId::new(0)));
    }

    #[test]
    fn test_component_id_shared_by_two_types_rejected() {
        #[allow(dead_code)]
        #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
        #[repr(C)]
        struct Armor {
            rating: u32,
        }

        impl Component for Armor {
            const ID: ComponentId = Health::ID;
        }

        let err = RegistryBuilder::new()
            .archetype::<Unit>()
            .unwrap()
            .archetype::<(Armor,)>()
            .err()
            .unwrap();
        assert!(matches!(err, EcsError::ComponentIdConflict { id: 0, .. }));
        assert!(err.is_configuration());

        let builder = RegistryBuilder::new()
            .archetype::<Unit>()
            .unwrap()
            .archetype::<(Health,)>()
            .unwrap();
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_record_order_does_not_matter() {
        let mut registry = registry();
        let id = registry
            .create((Position { x: 1.0, y: 2.0 }, Health { value: 5 }), false)
            .unwrap();
        assert!(registry.is_type::<Unit>(id).unwrap());
        let (health,) = registry.get::<Unit, (Health,)>(id).unwrap();
        assert_eq!(health.value, 5);
    }

    #[test]
    fn test_unknown_archetype() {
        let mut registry = RegistryBuilder::new().archetype::<Marker>().unwrap().build().unwrap();
        let err = registry.create(unit(1), false).unwrap_err();
        assert!(matches!(err, EcsError::UnknownArchetype(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_kill_relocates_swapped_entity() {
        let mut registry = registry();
        let a = registry.create(unit(1), false).unwrap();
        let b = registry.create(unit(2), false).unwrap();
        let c = registry.create(unit(3), false).unwrap();

        assert!(registry.execute(a, EntityTask::Kill).unwrap());
        assert_eq!(registry.info(c).unwrap().index, 0);
        assert_eq!(registry.info(b).unwrap().index, 1);
        assert_eq!(registry.ids::<Unit>(PoolKind::Active).unwrap(), &[c, b]);
        assert!(registry.is_state(a, EntityState::Dead).unwrap());
    }

    #[test]
    fn test_view_and_get_on_dead_entity() {
        let mut registry = registry();
        let id = registry.create(unit(1), false).unwrap();
        registry.execute(id, EntityTask::Kill).unwrap();

        assert!(registry.view::<Unit, (Health,)>(id).unwrap().is_none());
        assert_eq!(
            registry.get::<Unit, (Health,)>(id).err(),
            Some(EcsError::DeadEntity(id))
        );
        assert!(registry.find::<(Health,)>(id).unwrap().is_none());
    }

    #[test]
    fn test_get_wrong_archetype() {
        let mut registry = registry();
        let id = registry.create((Position::default(),), false).unwrap();
        assert!(registry.view::<Unit, (Position,)>(id).unwrap().is_none());
        assert_eq!(
            registry.get::<Unit, (Position,)>(id).err(),
            Some(EcsError::WrongArchetype {
                id,
                expected: SchemaId::new(0),
                actual: SchemaId::new(1),
            })
        );
    }

    #[test]
    fn test_snoozed_entity_is_still_active_until_update() {
        let mut registry = registry();
        let id = registry.create(unit(4), false).unwrap();
        assert!(registry.queue(id, EntityTask::Snooze).unwrap());
        assert_eq!(registry.pool_count::<Unit>(PoolKind::Active).unwrap(), 1);

        registry.update().unwrap();
        assert_eq!(registry.pool_count::<Unit>(PoolKind::Active).unwrap(), 0);
        assert_eq!(registry.pool_count::<Unit>(PoolKind::Dormant).unwrap(), 1);
        let (health,) = registry.view::<Unit, (Health,)>(id).unwrap().unwrap();
        assert_eq!(health.value, 4);
    }

    #[test]
    fn test_singletons() {
        #[derive(Debug, Default, PartialEq)]
        struct Clock(u64);

        let mut registry = RegistryBuilder::new().singleton(Clock(3)).build().unwrap();
        registry.singleton_mut::<Clock>().unwrap().0 += 1;
        assert_eq!(registry.singleton::<Clock>().unwrap(), &Clock(4));
        assert!(matches!(
            registry.singleton::<u32>(),
            Err(EcsError::UnknownSingleton(_))
        ));
    }

    #[test]
    fn test_events_fire_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = registry();

        let sink = Rc::clone(&log);
        registry.subscribe::<EntityCreated>(move |_, _| sink.borrow_mut().push("created"));
        let sink = Rc::clone(&log);
        registry
            .subscribe_archetype::<Unit>(move |_, _| sink.borrow_mut().push("archetype"))
            .unwrap();
        let sink = Rc::clone(&log);
        registry.subscribe_component::<Position>(move |_, _| sink.borrow_mut().push("position"));
        let sink = Rc::clone(&log);
        registry.subscribe::<EntityStateChanged>(move |_, event| {
            sink.borrow_mut().push(if event.current == EntityState::Dead { "dead" } else { "state" });
        });

        let id = registry.create(unit(1), false).unwrap();
        registry.queue(id, EntityTask::Kill).unwrap();
        registry.update().unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["created", "archetype", "position", "state", "dead", "archetype", "position"]
        );
    }

    #[test]
    fn test_callbacks_switch() {
        let hits = Rc::new(RefCell::new(0));
        let mut registry = registry();
        let sink = Rc::clone(&hits);
        registry.subscribe::<EntityCreated>(move |_, _| *sink.borrow_mut() += 1);

        registry.set_callbacks(false);
        registry.create(unit(1), false).unwrap();
        registry.set_callbacks(true);
        registry.close::<EntityCreated>();
        registry.create(unit(1), false).unwrap();
        registry.open::<EntityCreated>();
        registry.create(unit(1), false).unwrap();

        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn test_callback_reenters_registry() {
        let mut registry = registry();
        registry.subscribe::<EntityCreated>(|registry, event| {
            if event.schema == SchemaId::new(0) {
                registry.queue(event.id, EntityTask::Kill).unwrap();
            }
        });

        let id = registry.create(unit(1), false).unwrap();
        assert!(registry.is_state(id, EntityState::Killed).unwrap());
        assert_eq!(registry.pending(), 1);
        registry.update().unwrap();
        assert!(registry.is_state(id, EntityState::Dead).unwrap());
    }

    #[test]
    fn test_user_events() {
        #[derive(Clone)]
        struct Tick(u32);

        let mut registry = registry();
        registry.subscribe::<Tick>(|registry, tick| {
            for _ in 0..tick.0 {
                registry.create((Position::default(),), false).unwrap();
            }
        });
        registry.set_callbacks(false);
        registry.call(&Tick(3));
        assert_eq!(registry.pool_count::<Marker>(PoolKind::Active).unwrap(), 3);
    }

    #[test]
    fn test_trim_reports_released_slots() {
        let mut registry = RegistryBuilder::new()
            .with_config(RegistryConfig {
                pool_capacity: 0,
                ..RegistryConfig::default()
            })
            .archetype::<Unit>()
            .unwrap()
            .build()
            .unwrap();
        registry.populate(unit(0), 4).unwrap();
        for id in registry.ids::<Unit>(PoolKind::Active).unwrap().to_vec().into_iter().take(3) {
            registry.queue(id, EntityTask::Kill).unwrap();
        }
        registry.update().unwrap();

        assert_eq!(registry.pool_capacity::<Unit>(PoolKind::Active).unwrap(), 4);
        assert_eq!(registry.trim::<Unit>().unwrap(), 3);
        assert_eq!(registry.pool_capacity::<Unit>(PoolKind::Active).unwrap(), 1);
        assert_eq!(registry.trim_all(), 0);
    }
}
