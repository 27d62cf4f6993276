//! # Entity Management
//!
//! Entities are lightweight identifiers. The directory maps every id ever
//! handed out to its archetype, lifecycle state and current pool slot.
//!
//! ```text
//! LIVE --kill--> KILLED --apply--> DEAD
//! LIVE --snooze--> SNOOZED --apply--> SLEEPING
//! SLEEPING --wake--> AWAKE --apply--> LIVE
//! ```

use std::fmt;

use super::archetype::SchemaId;
use super::storage::PoolKind;
use crate::error::{EcsError, EcsResult};

/// Unique identifier for an entity.
///
/// Ids are indices into the entity directory. An id is reused only after its
/// previous owner is dead and was not locked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u32);

impl EntityId {
    /// Creates an entity id from a directory index.
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the directory index of this id.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of an entity.
///
/// `Killed`, `Snoozed` and `Awake` are pending: the entity is waiting for the
/// next apply step and accepts no other request until then.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// Stored in the active pool; can be killed or snoozed.
    Live,
    /// Marked for death, still in the active pool.
    Killed,
    /// Removed from storage. Terminal.
    Dead,
    /// Marked for the dormant pool, still in the active pool.
    Snoozed,
    /// Stored in the dormant pool; can be woken.
    Sleeping,
    /// Marked for the active pool, still in the dormant pool.
    Awake,
}

impl EntityState {
    /// Number of states.
    pub const COUNT: usize = 6;

    /// All states, in declaration order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Live,
        Self::Killed,
        Self::Dead,
        Self::Snoozed,
        Self::Sleeping,
        Self::Awake,
    ];

    #[inline]
    const fn slot(self) -> usize {
        self as usize
    }

    /// Whether a transition has been requested but not yet applied.
    #[inline]
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Killed | Self::Snoozed | Self::Awake)
    }

    /// The pool that physically holds an entity in this state.
    #[must_use]
    pub const fn pool(self) -> Option<PoolKind> {
        match self {
            Self::Live | Self::Killed | Self::Snoozed => Some(PoolKind::Active),
            Self::Sleeping | Self::Awake => Some(PoolKind::Dormant),
            Self::Dead => None,
        }
    }

    /// The state a pending state settles into when applied.
    #[must_use]
    pub const fn settled(self) -> Option<Self> {
        match self {
            Self::Killed => Some(Self::Dead),
            Self::Snoozed => Some(Self::Sleeping),
            Self::Awake => Some(Self::Live),
            Self::Live | Self::Dead | Self::Sleeping => None,
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Live => "LIVE",
            Self::Killed => "KILLED",
            Self::Dead => "DEAD",
            Self::Snoozed => "SNOOZED",
            Self::Sleeping => "SLEEPING",
            Self::Awake => "AWAKE",
        };
        f.write_str(name)
    }
}

/// A lifecycle transition request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityTask {
    /// LIVE -> KILLED, then DEAD on apply.
    Kill,
    /// LIVE -> SNOOZED, then SLEEPING on apply.
    Snooze,
    /// SLEEPING -> AWAKE, then LIVE on apply.
    Wake,
}

impl EntityTask {
    /// The state an entity must be in for this task to be accepted.
    #[must_use]
    pub const fn required_state(self) -> EntityState {
        match self {
            Self::Kill | Self::Snooze => EntityState::Live,
            Self::Wake => EntityState::Sleeping,
        }
    }

    /// The pending state an accepted request moves the entity into.
    #[must_use]
    pub const fn pending_state(self) -> EntityState {
        match self {
            Self::Kill => EntityState::Killed,
            Self::Snooze => EntityState::Snoozed,
            Self::Wake => EntityState::Awake,
        }
    }
}

/// Location and lifecycle data of one entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityInfo {
    /// Archetype the entity belongs to.
    pub schema: SchemaId,
    /// Current lifecycle state.
    pub state: EntityState,
    /// Slot inside the pool selected by `state`. Changes on every swap-remove
    /// that relocates the entity; meaningless once `Dead`.
    pub index: usize,
    /// Locked ids are never handed out again after death.
    pub locked: bool,
}

/// Allocates entity ids and tracks where every entity lives.
///
/// The directory never touches pool memory; the registry performs pool
/// mutations and reports the resulting slots back here.
#[derive(Debug, Default)]
pub struct EntityDirectory {
    /// One entry per id ever allocated.
    entries: Vec<EntityInfo>,
    /// Released ids, reused last-in first-out.
    reusable: Vec<EntityId>,
    /// Ids with a queued transition, in request order.
    pending: Vec<EntityId>,
    /// Number of entities per state.
    counts: [usize; EntityState::COUNT],
}

impl EntityDirectory {
    /// Creates an empty directory with room for `queue_capacity` queued
    /// transitions.
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            pending: Vec::with_capacity(queue_capacity),
            ..Self::default()
        }
    }

    /// The id the next [`EntityDirectory::allocate`] call will return.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityIdsExhausted`] if no id is free and every 32-bit
    /// id has been handed out.
    pub fn next_id(&self) -> EcsResult<EntityId> {
        match self.reusable.last() {
            Some(&id) => Ok(id),
            None => fresh_id(self.entries.len()),
        }
    }

    /// Allocates an id for a new LIVE entity at `index` of `schema`'s active
    /// pool, reusing the most recently released id when one exists.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityIdsExhausted`] if a new id is needed and none is left.
    pub fn allocate(&mut self, schema: SchemaId, index: usize, locked: bool) -> EcsResult<EntityId> {
        let info = EntityInfo {
            schema,
            state: EntityState::Live,
            index,
            locked,
        };

        let id = if let Some(id) = self.reusable.pop() {
            self.counts[EntityState::Dead.slot()] -= 1;
            self.entries[id.index()] = info;
            id
        } else {
            let id = fresh_id(self.entries.len())?;
            self.entries.push(info);
            id
        };
        self.counts[EntityState::Live.slot()] += 1;
        Ok(id)
    }

    /// Makes a dead id available for reuse unless it is locked.
    ///
    /// Returns `true` if the id was pushed onto the reuse stack.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityOutOfRange`] if the id was never allocated.
    pub fn release(&mut self, id: EntityId) -> EcsResult<bool> {
        if self.info(id)?.locked {
            return Ok(false);
        }
        self.reusable.push(id);
        Ok(true)
    }

    /// Returns the directory entry of an id.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityOutOfRange`] if the id was never allocated.
    pub fn info(&self, id: EntityId) -> EcsResult<&EntityInfo> {
        self.entries.get(id.index()).ok_or(EcsError::EntityOutOfRange {
            id,
            total: self.entries.len(),
        })
    }

    fn info_mut(&mut self, id: EntityId) -> EcsResult<&mut EntityInfo> {
        let total = self.entries.len();
        self.entries
            .get_mut(id.index())
            .ok_or(EcsError::EntityOutOfRange { id, total })
    }

    /// Number of ids ever allocated (dead ones included).
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// Number of entities currently in `state`.
    #[inline]
    #[must_use]
    pub fn count(&self, state: EntityState) -> usize {
        self.counts[state.slot()]
    }

    /// Applies the state guard of `task`.
    ///
    /// If the entity is in the task's required state it moves to the pending
    /// state and `(previous, pending)` is returned; otherwise nothing changes.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityOutOfRange`] if the id was never allocated.
    pub fn request(
        &mut self,
        id: EntityId,
        task: EntityTask,
    ) -> EcsResult<Option<(EntityState, EntityState)>> {
        let required = task.required_state();
        let pending = task.pending_state();
        let info = self.info_mut(id)?;
        if info.state != required {
            return Ok(None);
        }
        info.state = pending;
        self.counts[required.slot()] -= 1;
        self.counts[pending.slot()] += 1;
        Ok(Some((required, pending)))
    }

    /// Appends an id to the transition queue.
    pub fn enqueue(&mut self, id: EntityId) {
        self.pending.push(id);
    }

    /// Number of queued transitions.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    /// Takes the queue, leaving an empty one behind.
    pub fn drain(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.pending)
    }

    /// Hands a drained queue buffer back after processing.
    ///
    /// Ids queued while the buffer was out keep their order and stay queued.
    pub fn recycle(&mut self, mut buffer: Vec<EntityId>) {
        buffer.clear();
        buffer.append(&mut self.pending);
        self.pending = buffer;
    }

    /// Records that `id` now lives at `index` of its current pool.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityOutOfRange`] if the id was never allocated.
    pub fn relocate(&mut self, id: EntityId, index: usize) -> EcsResult<()> {
        self.info_mut(id)?.index = index;
        Ok(())
    }

    /// Moves a pending entity into its settled state.
    ///
    /// `index` is the entity's slot in its new pool (`None` keeps the old
    /// value, used for deaths). Dead ids are released for reuse unless locked.
    /// Returns `(previous, current)`, or `None` if the entity was not pending.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityOutOfRange`] if the id was never allocated.
    pub fn settle(
        &mut self,
        id: EntityId,
        index: Option<usize>,
    ) -> EcsResult<Option<(EntityState, EntityState)>> {
        let info = self.info_mut(id)?;
        let previous = info.state;
        let Some(current) = previous.settled() else {
            return Ok(None);
        };
        info.state = current;
        if let Some(index) = index {
            info.index = index;
        }
        self.counts[previous.slot()] -= 1;
        self.counts[current.slot()] += 1;

        if current == EntityState::Dead {
            self.release(id)?;
        }
        Ok(Some((previous, current)))
    }
}

/// The id of the entry appended after `len` existing ones.
fn fresh_id(len: usize) -> EcsResult<EntityId> {
    u32::try_from(len)
        .map(EntityId::new)
        .map_err(|_| EcsError::EntityIdsExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> SchemaId {
        SchemaId::new(0)
    }

    #[test]
    fn test_allocate_increments_ids() {
        let mut directory = EntityDirectory::new(4);
        let a = directory.allocate(schema(), 0, false).unwrap();
        let b = directory.allocate(schema(), 1, false).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(directory.total(), 2);
        assert_eq!(directory.count(EntityState::Live), 2);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_ids_run_out_instead_of_wrapping() {
        let last = usize::try_from(u32::MAX).unwrap();
        assert_eq!(fresh_id(last), Ok(EntityId::new(u32::MAX)));
        assert_eq!(fresh_id(last + 1), Err(EcsError::EntityIdsExhausted));
    }

    #[test]
    fn test_info_out_of_range() {
        let directory = EntityDirectory::new(0);
        assert_eq!(
            directory.info(EntityId::new(0)),
            Err(EcsError::EntityOutOfRange {
                id: EntityId::new(0),
                total: 0
            })
        );
    }

    #[test]
    fn test_request_guards_state() {
        let mut directory = EntityDirectory::new(4);
        let id = directory.allocate(schema(), 0, false).unwrap();

        let first = directory.request(id, EntityTask::Snooze).unwrap();
        assert_eq!(first, Some((EntityState::Live, EntityState::Snoozed)));

        // Already pending: every further request is refused.
        assert_eq!(directory.request(id, EntityTask::Snooze).unwrap(), None);
        assert_eq!(directory.request(id, EntityTask::Kill).unwrap(), None);
        assert_eq!(directory.request(id, EntityTask::Wake).unwrap(), None);
        assert_eq!(directory.count(EntityState::Snoozed), 1);
        assert_eq!(directory.count(EntityState::Live), 0);
    }

    #[test]
    fn test_settle_releases_dead_ids_lifo() {
        let mut directory = EntityDirectory::new(4);
        let a = directory.allocate(schema(), 0, false).unwrap();
        let b = directory.allocate(schema(), 1, false).unwrap();

        for id in [a, b] {
            directory.request(id, EntityTask::Kill).unwrap();
            directory.settle(id, None).unwrap();
        }
        assert_eq!(directory.count(EntityState::Dead), 2);

        // Last released is first reused.
        assert_eq!(directory.allocate(schema(), 0, false).unwrap(), b);
        assert_eq!(directory.allocate(schema(), 1, false).unwrap(), a);
        assert_eq!(directory.count(EntityState::Dead), 0);
        assert_eq!(directory.total(), 2);
    }

    #[test]
    fn test_locked_ids_are_retired() {
        let mut directory = EntityDirectory::new(4);
        let locked = directory.allocate(schema(), 0, true).unwrap();
        directory.request(locked, EntityTask::Kill).unwrap();
        directory.settle(locked, None).unwrap();

        let fresh = directory.allocate(schema(), 0, false).unwrap();
        assert_ne!(fresh, locked);
        assert_eq!(directory.info(locked).unwrap().state, EntityState::Dead);
    }

    #[test]
    fn test_settle_ignores_stable_states() {
        let mut directory = EntityDirectory::new(4);
        let id = directory.allocate(schema(), 0, false).unwrap();
        assert_eq!(directory.settle(id, Some(3)).unwrap(), None);
        assert_eq!(directory.info(id).unwrap().index, 0);
    }

    #[test]
    fn test_recycle_keeps_late_requests() {
        let mut directory = EntityDirectory::new(4);
        let a = directory.allocate(schema(), 0, false).unwrap();
        let b = directory.allocate(schema(), 1, false).unwrap();
        directory.enqueue(a);

        let drained = directory.drain();
        assert_eq!(drained, vec![a]);
        directory.enqueue(b);
        directory.recycle(drained);

        assert_eq!(directory.drain(), vec![b]);
    }

    #[test]
    fn test_state_helpers() {
        assert_eq!(EntityState::Snoozed.pool(), Some(PoolKind::Active));
        assert_eq!(EntityState::Awake.pool(), Some(PoolKind::Dormant));
        assert_eq!(EntityState::Dead.pool(), None);
        assert!(EntityState::ALL.iter().filter(|s| s.is_pending()).count() == 3);
        assert_eq!(EntityState::Awake.settled(), Some(EntityState::Live));
        assert_eq!(EntityTask::Wake.required_state(), EntityState::Sleeping);
    }
}
