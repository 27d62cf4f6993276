//! # Component Fetches
//!
//! A fetch names the subset of an archetype's components that a lookup,
//! iterator or query wants to touch, e.g. `(Position,)` or
//! `(Health, Position)`. Every fetched component is borrowed mutably.

use super::component::{Component, ComponentId, ComponentMask};
use super::storage::{ColumnPool, ColumnsMut, TypedColumn};
use crate::error::EcsResult;

mod sealed {
    /// Keeps implementations inside this crate.
    pub trait Sealed {}
}

/// A tuple of component types to borrow from a pool.
///
/// Implemented for tuples of 1 to 8 [`Component`]s.
pub trait Fetch: sealed::Sealed + 'static {
    /// One live slice per fetched component.
    type Columns<'a>;

    /// One reference per fetched component.
    type Item<'a>;

    /// Component ids in tuple order.
    fn component_ids() -> Vec<ComponentId>;

    /// Splits a pool's columns into one slice per fetched component.
    ///
    /// Returns `None` if a fetched component is not stored.
    fn borrow(columns: ColumnsMut<'_>) -> Option<Self::Columns<'_>>;

    /// References to the fetched components at `index` of borrowed columns.
    ///
    /// # Panics
    ///
    /// If `index` is past the live length of the columns.
    fn item<'r>(columns: &'r mut Self::Columns<'_>, index: usize) -> Self::Item<'r>;

    /// The component set of the fetch.
    ///
    /// # Errors
    ///
    /// [`crate::EcsError::DuplicateComponent`] if a component is named twice.
    fn mask() -> EcsResult<ComponentMask> {
        ComponentMask::from_unique(&Self::component_ids())
    }

    /// References to the fetched components of one live slot.
    ///
    /// Returns `None` if `index` is not live or a component is not stored.
    fn fetch(pool: &mut ColumnPool, index: usize) -> Option<Self::Item<'_>>;
}

macro_rules! impl_fetch {
    ($($name:ident),+) => {
        impl<$($name: Component),+> sealed::Sealed for ($($name,)+) {}

        impl<$($name: Component),+> Fetch for ($($name,)+) {
            type Columns<'a> = ($(&'a mut [$name],)+);
            type Item<'a> = ($(&'a mut $name,)+);

            fn component_ids() -> Vec<ComponentId> {
                vec![$($name::ID),+]
            }

            fn mask() -> EcsResult<ComponentMask> {
                ComponentMask::from_unique(&[$($name::ID),+])
            }

            #[allow(non_snake_case)]
            fn borrow(columns: ColumnsMut<'_>) -> Option<Self::Columns<'_>> {
                let count = columns.count();
                $(let mut $name = None;)+
                for column in columns.into_columns() {
                    let id = column.component_id();
                    let mut any = Some(column.as_any_mut());
                    $(
                        if id == $name::ID && $name.is_none() {
                            $name = any
                                .take()
                                .and_then(|any| any.downcast_mut::<TypedColumn<$name>>())
                                .map(|typed| typed.live_mut(count));
                        }
                    )+
                }
                Some(($($name?,)+))
            }

            #[allow(non_snake_case)]
            fn item<'r>(columns: &'r mut Self::Columns<'_>, index: usize) -> Self::Item<'r> {
                let ($($name,)+) = columns;
                ($(&mut $name[index],)+)
            }

            #[allow(non_snake_case)]
            fn fetch(pool: &mut ColumnPool, index: usize) -> Option<Self::Item<'_>> {
                let (ids, columns) = pool.split_mut();
                if index >= ids.len() {
                    return None;
                }
                let ($($name,)+) = Self::borrow(columns)?;
                Some(($(&mut $name[index],)+))
            }
        }
    };
}

impl_fetch!(A);
impl_fetch!(A, B);
impl_fetch!(A, B, C);
impl_fetch!(A, B, C, D);
impl_fetch!(A, B, C, D, E);
impl_fetch!(A, B, C, D, E, F);
impl_fetch!(A, B, C, D, E, F, G);
impl_fetch!(A, B, C, D, E, F, G, H);
