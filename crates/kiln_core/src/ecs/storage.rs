//! # Column Storage
//!
//! Dense, per-field component storage for one archetype.
//!
//! A [`ColumnPool`] keeps one contiguous array per component plus a parallel
//! array of owning entity ids:
//!
//! ```text
//! ids:      [e4, e1, e7 | e2, e9]
//! Health:   [h4, h1, h7 | ..  ..]
//! Position: [p4, p1, p7 | ..  ..]
//!            ^ count=3   ^ scratch slots up to capacity=5
//! ```
//!
//! Slots in `[0, count)` are live. Slots in `[count, capacity)` are scratch
//! space kept around so the next appends overwrite instead of allocating.

use std::any::{Any, TypeId};
use std::fmt;

use super::archetype::Record;
use super::component::{Component, ComponentId, ComponentMask, MAX_COMPONENTS};
use super::entity::EntityId;
use super::fetch::Fetch;
use super::iter::PoolIter;
use crate::error::{EcsError, EcsResult};

/// The two physical partitions of an archetype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// LIVE, KILLED and SNOOZED entities.
    Active,
    /// SLEEPING and AWAKE entities.
    Dormant,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Dormant => "dormant",
        })
    }
}

/// Type-erased operations on one component array.
///
/// Every per-field operation of a pool is a loop over its columns calling
/// these methods with a shared slot index.
pub(crate) trait Column: Any {
    fn component_id(&self) -> ComponentId;
    fn swap(&mut self, a: usize, b: usize);
    fn truncate(&mut self, len: usize);
    /// Copies `src[src_index]` into `slot`, pushing when `slot == len()`.
    /// Returns `false` if `src` stores a different component type.
    fn copy_from(&mut self, src: &dyn Column, src_index: usize, slot: usize) -> bool;
    /// Memory held by the allocated slots, in bytes.
    fn byte_len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A single component array.
pub(crate) struct TypedColumn<C: Component> {
    data: Vec<C>,
}

impl<C: Component> TypedColumn<C> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Writes `value` into `slot`, pushing when `slot == len`.
    fn put(&mut self, slot: usize, value: C) {
        if slot == self.data.len() {
            self.data.push(value);
        } else {
            self.data[slot] = value;
        }
    }

    /// The first `count` slots.
    pub(crate) fn live(&self, count: usize) -> &[C] {
        &self.data[..count]
    }

    /// The first `count` slots, mutably.
    pub(crate) fn live_mut(&mut self, count: usize) -> &mut [C] {
        &mut self.data[..count]
    }
}

impl<C: Component> Column for TypedColumn<C> {
    fn component_id(&self) -> ComponentId {
        C::ID
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.data.swap(a, b);
    }

    fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
        self.data.shrink_to_fit();
    }

    fn copy_from(&mut self, src: &dyn Column, src_index: usize, slot: usize) -> bool {
        let Some(src) = src.as_any().downcast_ref::<Self>() else {
            return false;
        };
        let value = src.data[src_index];
        self.put(slot, value);
        true
    }

    fn byte_len(&self) -> usize {
        bytemuck::cast_slice::<C, u8>(&self.data).len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Describes one column of an archetype so pools can be built from it.
#[derive(Clone, Copy)]
pub struct ColumnSpec {
    id: ComponentId,
    name: &'static str,
    type_id: TypeId,
    build: fn(usize) -> Box<dyn Column>,
}

impl ColumnSpec {
    /// Spec for a column of `C`.
    #[must_use]
    pub fn of<C: Component>() -> Self {
        fn build<C: Component>(capacity: usize) -> Box<dyn Column> {
            Box::new(TypedColumn::<C>::with_capacity(capacity))
        }
        Self {
            id: C::ID,
            name: C::name(),
            type_id: TypeId::of::<C>(),
            build: build::<C>,
        }
    }

    /// Component id stored by the column.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// Component type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Rust type stored by the column.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }
}

impl fmt::Debug for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnSpec")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Mutable access to the live part of a pool's columns.
///
/// Handed to [`Fetch::borrow`], which splits it into one slice per fetched
/// component.
pub struct ColumnsMut<'a> {
    columns: &'a mut [Box<dyn Column>],
    count: usize,
}

impl<'a> ColumnsMut<'a> {
    /// Number of live slots in each column.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn into_columns(self) -> std::slice::IterMut<'a, Box<dyn Column>> {
        self.columns.iter_mut()
    }
}

/// Marks an unused entry in the component lookup table.
const NO_COLUMN: u8 = u8::MAX;

/// Dense storage for one archetype in one pool.
///
/// # Capacity
///
/// `capacity()` is the number of allocated slots and is identical for the id
/// array and every column. It only grows on append and only shrinks on
/// [`ColumnPool::truncate`].
pub struct ColumnPool {
    kind: PoolKind,
    mask: ComponentMask,
    /// Owning entity of every allocated slot.
    ids: Vec<EntityId>,
    /// One array per component, in archetype order.
    columns: Vec<Box<dyn Column>>,
    /// Component id -> position in `columns`.
    lookup: [u8; MAX_COMPONENTS],
    /// Number of live slots.
    count: usize,
}

impl ColumnPool {
    /// Creates an empty pool with room for `capacity` entities reserved.
    ///
    /// # Errors
    ///
    /// Configuration errors if the specs repeat a component or use an id
    /// outside the mask range.
    pub fn new(kind: PoolKind, specs: &[ColumnSpec], capacity: usize) -> EcsResult<Self> {
        let ids: Vec<ComponentId> = specs.iter().map(ColumnSpec::id).collect();
        let mask = ComponentMask::from_unique(&ids)?;

        let mut lookup = [NO_COLUMN; MAX_COMPONENTS];
        for (position, spec) in specs.iter().enumerate() {
            // at most 64 unique specs, so the position fits
            lookup[usize::from(spec.id)] = position as u8;
        }

        Ok(Self {
            kind,
            mask,
            ids: Vec::with_capacity(capacity),
            columns: specs.iter().map(|spec| (spec.build)(capacity)).collect(),
            lookup,
            count: 0,
        })
    }

    /// Which partition this pool is.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> PoolKind {
        self.kind
    }

    /// Components stored by this pool.
    #[inline]
    #[must_use]
    pub const fn mask(&self) -> ComponentMask {
        self.mask
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Number of allocated slots, live and scratch.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ids.len()
    }

    /// Checks if there are no live entities.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Owning ids of the live slots, in slot order.
    #[must_use]
    pub fn ids(&self) -> &[EntityId] {
        &self.ids[..self.count]
    }

    /// Bytes held by all component arrays (scratch slots included).
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.columns.iter().map(|column| column.byte_len()).sum()
    }

    fn check_index(&self, index: usize) -> EcsResult<()> {
        if index < self.count {
            Ok(())
        } else {
            Err(EcsError::out_of_bounds(self.kind, index, self.count))
        }
    }

    fn column_position(&self, id: ComponentId) -> Option<usize> {
        let position = *self.lookup.get(usize::from(id))?;
        (position != NO_COLUMN).then_some(usize::from(position))
    }

    /// Writes one component value into `slot`. Used by record writers.
    pub(crate) fn put<C: Component>(&mut self, slot: usize, value: C) -> EcsResult<()> {
        let position = self
            .column_position(C::ID)
            .ok_or(EcsError::MissingComponent(C::ID))?;
        let column = self.columns[position]
            .as_any_mut()
            .downcast_mut::<TypedColumn<C>>()
            .ok_or(EcsError::ColumnMismatch(C::ID))?;
        column.put(slot, value);
        Ok(())
    }

    /// Splits the pool into its live ids and its columns.
    pub(crate) fn split_mut(&mut self) -> (&[EntityId], ColumnsMut<'_>) {
        (
            &self.ids[..self.count],
            ColumnsMut {
                columns: &mut self.columns,
                count: self.count,
            },
        )
    }

    /// Writes `id` into the id array at `slot`, pushing when `slot == capacity`.
    fn put_id(&mut self, slot: usize, id: EntityId) {
        if slot == self.ids.len() {
            self.ids.push(id);
        } else {
            self.ids[slot] = id;
        }
    }

    /// Appends a record owned by `id` and returns its slot.
    ///
    /// Reuses the scratch slot at `count` when one exists, otherwise grows
    /// every array by one.
    ///
    /// # Errors
    ///
    /// [`EcsError::RecordMismatch`] if the record's components differ from
    /// the pool's.
    pub fn append<R: Record>(&mut self, id: EntityId, record: R) -> EcsResult<usize> {
        if R::mask()? != self.mask {
            return Err(EcsError::RecordMismatch);
        }
        let slot = self.count;
        record.write(self, slot)?;
        self.put_id(slot, id);
        self.count += 1;
        Ok(slot)
    }

    /// Replaces the record and owner stored at a live slot.
    ///
    /// # Errors
    ///
    /// [`EcsError::RecordMismatch`] for a foreign record,
    /// [`EcsError::IndexOutOfBounds`] if `index >= count`.
    pub fn overwrite_at<R: Record>(
        &mut self,
        index: usize,
        id: EntityId,
        record: R,
    ) -> EcsResult<()> {
        if R::mask()? != self.mask {
            return Err(EcsError::RecordMismatch);
        }
        self.check_index(index)?;
        record.write(self, index)?;
        self.put_id(index, id);
        Ok(())
    }

    /// Removes the live slot `index` by swapping it with the last live slot.
    ///
    /// Returns the id that now occupies `index`. When `index` was the last
    /// live slot this is the removed entity itself.
    ///
    /// # Errors
    ///
    /// [`EcsError::IndexOutOfBounds`] if `index >= count`.
    pub fn swap_remove(&mut self, index: usize) -> EcsResult<EntityId> {
        self.check_index(index)?;
        let last = self.count - 1;
        for column in &mut self.columns {
            column.swap(index, last);
        }
        self.ids.swap(index, last);
        self.count = last;
        Ok(self.ids[index])
    }

    /// Discards scratch slots so that `capacity() == count()`.
    ///
    /// Returns the number of slots released.
    pub fn truncate(&mut self) -> usize {
        let released = self.ids.len() - self.count;
        if released > 0 {
            for column in &mut self.columns {
                column.truncate(self.count);
            }
            self.ids.truncate(self.count);
            self.ids.shrink_to_fit();
        }
        released
    }

    /// Copies the record at `index` into `destination` (appended there with
    /// the same owner) and returns the destination slot.
    ///
    /// # Errors
    ///
    /// [`EcsError::IndexOutOfBounds`] if `index >= count`,
    /// [`EcsError::RecordMismatch`] if `destination` stores another archetype.
    pub fn clone_into(&self, index: usize, destination: &mut Self) -> EcsResult<usize> {
        self.check_index(index)?;
        if destination.mask != self.mask {
            return Err(EcsError::RecordMismatch);
        }
        let slot = destination.count;
        for source in &self.columns {
            let id = source.component_id();
            let position = destination
                .column_position(id)
                .ok_or(EcsError::MissingComponent(id))?;
            if !destination.columns[position].copy_from(source.as_ref(), index, slot) {
                return Err(EcsError::ColumnMismatch(id));
            }
        }
        destination.put_id(slot, self.ids[index]);
        destination.count += 1;
        Ok(slot)
    }

    /// Live values of one component, in slot order.
    #[must_use]
    pub fn column<C: Component>(&self) -> Option<&[C]> {
        let position = self.column_position(C::ID)?;
        self.columns[position]
            .as_any()
            .downcast_ref::<TypedColumn<C>>()
            .map(|column| column.live(self.count))
    }

    /// Live values of one component, mutably.
    pub fn column_mut<C: Component>(&mut self) -> Option<&mut [C]> {
        let position = self.column_position(C::ID)?;
        let count = self.count;
        self.columns[position]
            .as_any_mut()
            .downcast_mut::<TypedColumn<C>>()
            .map(|column| column.live_mut(count))
    }

    /// Borrows the fetched components of one live slot.
    ///
    /// # Errors
    ///
    /// [`EcsError::IndexOutOfBounds`] if `index >= count`,
    /// [`EcsError::MissingComponent`] if the pool lacks a fetched component.
    pub fn get<F: Fetch>(&mut self, index: usize) -> EcsResult<F::Item<'_>> {
        self.check_index(index)?;
        self.require::<F>()?;
        F::fetch(self, index).ok_or(EcsError::RecordMismatch)
    }

    /// Creates a lazy iterator over the live slots for a component subset.
    ///
    /// # Errors
    ///
    /// [`EcsError::MissingComponent`] if the pool lacks a fetched component,
    /// [`EcsError::DuplicateComponent`] if the fetch repeats a component.
    pub fn iter<F: Fetch>(&mut self) -> EcsResult<PoolIter<'_, F>> {
        self.require::<F>()?;
        let (ids, columns) = self.split_mut();
        let columns = F::borrow(columns).ok_or(EcsError::RecordMismatch)?;
        Ok(PoolIter::new(ids, columns))
    }

    /// Verifies that every fetched component is stored here.
    fn require<F: Fetch>(&self) -> EcsResult<()> {
        let wanted = F::mask()?;
        match wanted.iter().find(|&id| !self.mask.contains(id)) {
            Some(missing) => Err(EcsError::MissingComponent(missing)),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ColumnPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnPool")
            .field("kind", &self.kind)
            .field("mask", &self.mask)
            .field("count", &self.count)
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
