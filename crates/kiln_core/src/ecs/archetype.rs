//! # Archetype Storage
//!
//! Entities with the same component set are stored together.
//!
//! ```text
//! Archetype "Unit" (Health + Position):
//!
//!   active   ids: [e0, e3, e5]   Health: [..]   Position: [..]
//!   dormant  ids: [e2]           Health: [..]   Position: [..]
//! ```
//!
//! An archetype is declared once by registering a record tuple such as
//! `(Health, Position)`. Its [`Schema`] never changes afterwards. The
//! [`ArchetypeStorage`] pairs the two pools and moves rows between them when
//! entities are snoozed or woken.

use std::fmt;

use super::component::{Component, ComponentId, ComponentMask};
use super::entity::EntityId;
use super::storage::{ColumnPool, ColumnSpec, PoolKind};
use crate::error::EcsResult;

/// Index of an archetype, in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SchemaId(u16);

impl SchemaId {
    /// Creates a schema id from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Position of the archetype in the registry's storage list.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

mod sealed {
    /// Keeps implementations inside this crate.
    pub trait Sealed {}
}

/// A full set of component values for one entity, written as a tuple.
///
/// Implemented for tuples of 1 to 8 [`Component`]s. The tuple order is the
/// column order of the archetype it declares.
pub trait Record: sealed::Sealed + Copy + 'static {
    /// Component ids in tuple order.
    fn component_ids() -> Vec<ComponentId>;

    /// Column descriptions in tuple order.
    fn columns() -> Vec<ColumnSpec>;

    /// Writes every field into `slot` of `pool`.
    ///
    /// # Errors
    ///
    /// [`crate::EcsError::MissingComponent`] if the pool lacks a field.
    fn write(self, pool: &mut ColumnPool, slot: usize) -> EcsResult<()>;

    /// The component set of the record.
    ///
    /// # Errors
    ///
    /// Configuration errors for repeated or out-of-range component ids.
    fn mask() -> EcsResult<ComponentMask> {
        ComponentMask::from_unique(&Self::component_ids())
    }

    /// Human-readable name, used in logs and error messages.
    #[must_use]
    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

macro_rules! impl_record {
    ($($name:ident),+) => {
        impl<$($name: Component),+> sealed::Sealed for ($($name,)+) {}

        impl<$($name: Component),+> Record for ($($name,)+) {
            fn component_ids() -> Vec<ComponentId> {
                vec![$($name::ID),+]
            }

            fn mask() -> EcsResult<ComponentMask> {
                ComponentMask::from_unique(&[$($name::ID),+])
            }

            fn columns() -> Vec<ColumnSpec> {
                vec![$(ColumnSpec::of::<$name>()),+]
            }

            #[allow(non_snake_case)]
            fn write(self, pool: &mut ColumnPool, slot: usize) -> EcsResult<()> {
                let ($($name,)+) = self;
                $(pool.put(slot, $name)?;)+
                Ok(())
            }
        }
    };
}

impl_record!(A);
impl_record!(A, B);
impl_record!(A, B, C);
impl_record!(A, B, C, D);
impl_record!(A, B, C, D, E);
impl_record!(A, B, C, D, E, F);
impl_record!(A, B, C, D, E, F, G);
impl_record!(A, B, C, D, E, F, G, H);

/// Immutable description of one archetype.
#[derive(Clone, Debug)]
pub struct Schema {
    id: SchemaId,
    name: &'static str,
    mask: ComponentMask,
    columns: Vec<ColumnSpec>,
}

impl Schema {
    /// Describes the archetype declared by record type `R`.
    ///
    /// # Errors
    ///
    /// Configuration errors for repeated or out-of-range component ids.
    pub fn of<R: Record>(id: SchemaId) -> EcsResult<Self> {
        Ok(Self {
            id,
            name: R::name(),
            mask: R::mask()?,
            columns: R::columns(),
        })
    }

    /// Registration index.
    #[must_use]
    pub const fn id(&self) -> SchemaId {
        self.id
    }

    /// Name of the record type that declared the archetype.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Component set.
    #[must_use]
    pub const fn mask(&self) -> ComponentMask {
        self.mask
    }

    /// Columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Component ids in declaration order.
    pub fn components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.columns.iter().map(ColumnSpec::id)
    }
}

/// The active and dormant pools of one archetype.
#[derive(Debug)]
pub struct ArchetypeStorage {
    schema: Schema,
    active: ColumnPool,
    dormant: ColumnPool,
}

impl ArchetypeStorage {
    /// Creates both pools with `capacity` slots reserved in each.
    ///
    /// # Errors
    ///
    /// Configuration errors if the schema's columns are inconsistent.
    pub fn new(schema: Schema, capacity: usize) -> EcsResult<Self> {
        let active = ColumnPool::new(PoolKind::Active, schema.columns(), capacity)?;
        let dormant = ColumnPool::new(PoolKind::Dormant, schema.columns(), capacity)?;
        Ok(Self {
            schema,
            active,
            dormant,
        })
    }

    /// The archetype description.
    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// One of the two pools.
    #[must_use]
    pub const fn pool(&self, kind: PoolKind) -> &ColumnPool {
        match kind {
            PoolKind::Active => &self.active,
            PoolKind::Dormant => &self.dormant,
        }
    }

    /// One of the two pools, mutably.
    pub fn pool_mut(&mut self, kind: PoolKind) -> &mut ColumnPool {
        match kind {
            PoolKind::Active => &mut self.active,
            PoolKind::Dormant => &mut self.dormant,
        }
    }

    /// Removes a killed row from the active pool.
    ///
    /// Returns the id now stored at `index`.
    ///
    /// # Errors
    ///
    /// [`crate::EcsError::IndexOutOfBounds`] if `index` is not live.
    pub fn apply_kill(&mut self, index: usize) -> EcsResult<EntityId> {
        self.active.swap_remove(index)
    }

    /// Moves a snoozed row from the active pool to the end of the dormant pool.
    ///
    /// Returns the id now stored at `index` in the active pool.
    ///
    /// # Errors
    ///
    /// [`crate::EcsError::IndexOutOfBounds`] if `index` is not live.
    pub fn apply_snooze(&mut self, index: usize) -> EcsResult<EntityId> {
        self.active.clone_into(index, &mut self.dormant)?;
        self.active.swap_remove(index)
    }

    /// Moves a woken row from the dormant pool to the end of the active pool.
    ///
    /// Returns the id now stored at `index` in the dormant pool.
    ///
    /// # Errors
    ///
    /// [`crate::EcsError::IndexOutOfBounds`] if `index` is not live.
    pub fn apply_wake(&mut self, index: usize) -> EcsResult<EntityId> {
        self.dormant.clone_into(index, &mut self.active)?;
        self.dormant.swap_remove(index)
    }

    /// Releases scratch slots in both pools. Returns the number released.
    pub fn trim(&mut self) -> usize {
        self.active.truncate() + self.dormant.truncate()
    }
}
