//! # Component System
//!
//! Components are pure data containers with no behavior.
//! They must be Copy and have a fixed size so columns can be grown, swapped
//! and cloned by plain value copies.

use bytemuck::{Pod, Zeroable};

use crate::error::{EcsError, EcsResult};

/// Identifier of a component type, unique within one registry.
pub type ComponentId = u8;

/// Maximum number of distinct component ids (one bit each in a [`ComponentMask`]).
pub const MAX_COMPONENTS: usize = 64;

/// Marker trait for components.
///
/// Components must be:
/// - `Copy`: No heap allocations, bitwise copyable
/// - `Pod`: Plain old data, safe to reinterpret as bytes
/// - `Zeroable`: Can be safely zeroed
/// - `Default`: Must have a default value for pre-allocation
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Health {
///     value: i32,
/// }
///
/// impl Component for Health {
///     const ID: ComponentId = 0;
/// }
/// ```
pub trait Component: Copy + Pod + Zeroable + Default + Send + Sync + 'static {
    /// Unique identifier for this component type (0-63).
    const ID: ComponentId;

    /// Human-readable name, used in logs and error messages.
    #[must_use]
    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A set of component ids, stored as a 64-bit mask.
///
/// Every archetype and every query filter is reduced to masks so that
/// matching is a couple of bit operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ComponentMask(u64);

impl ComponentMask {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Builds a mask from a list of ids that must not repeat.
    ///
    /// # Errors
    ///
    /// [`EcsError::ComponentIdOutOfRange`] if an id is 64 or above,
    /// [`EcsError::DuplicateComponent`] if an id appears twice.
    pub fn from_unique(ids: &[ComponentId]) -> EcsResult<Self> {
        let mut mask = Self::EMPTY;
        for &id in ids {
            let bit = Self::bit(id)?;
            if mask.0 & bit != 0 {
                return Err(EcsError::DuplicateComponent(id));
            }
            mask.0 |= bit;
        }
        Ok(mask)
    }

    /// Builds a mask from a list of ids, ignoring repeats.
    ///
    /// # Errors
    ///
    /// [`EcsError::ComponentIdOutOfRange`] if an id is 64 or above.
    pub fn from_ids(ids: &[ComponentId]) -> EcsResult<Self> {
        ids.iter()
            .try_fold(Self::EMPTY, |mask, &id| Ok(Self(mask.0 | Self::bit(id)?)))
    }

    fn bit(id: ComponentId) -> EcsResult<u64> {
        if usize::from(id) < MAX_COMPONENTS {
            Ok(1 << id)
        } else {
            Err(EcsError::ComponentIdOutOfRange(id))
        }
    }

    /// Checks whether the set contains a component id.
    #[inline]
    #[must_use]
    pub const fn contains(self, id: ComponentId) -> bool {
        (id as usize) < MAX_COMPONENTS && (self.0 >> id) & 1 == 1
    }

    /// Checks whether every id of `other` is in this set.
    #[inline]
    #[must_use]
    pub const fn contains_all(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Checks whether the two sets share no id.
    #[inline]
    #[must_use]
    pub const fn is_disjoint(self, other: Self) -> bool {
        self.0 & other.0 == 0
    }

    /// Set union.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Number of ids in the set.
    #[inline]
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Checks if empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates over the ids in ascending order.
    pub fn iter(self) -> impl Iterator<Item = ComponentId> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            // trailing_zeros of a non-zero u64 is at most 63
            let id = bits.trailing_zeros() as ComponentId;
            bits &= bits - 1;
            Some(id)
        })
    }

    /// Returns the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_unique_rejects_duplicates() {
        assert_eq!(
            ComponentMask::from_unique(&[1, 4, 1]),
            Err(EcsError::DuplicateComponent(1))
        );
        assert_eq!(
            ComponentMask::from_unique(&[64]),
            Err(EcsError::ComponentIdOutOfRange(64))
        );
    }

    #[test]
    fn test_from_ids_allows_repeats() {
        let mask = ComponentMask::from_ids(&[3, 3, 7]).unwrap();
        assert_eq!(mask.len(), 2);
        assert!(mask.contains(3));
        assert!(mask.contains(7));
        assert!(!mask.contains(4));
    }

    #[test]
    fn test_set_relations() {
        let big = ComponentMask::from_unique(&[0, 1, 2]).unwrap();
        let small = ComponentMask::from_unique(&[0, 2]).unwrap();
        let other = ComponentMask::from_unique(&[5]).unwrap();

        assert!(big.contains_all(small));
        assert!(!small.contains_all(big));
        assert!(big.is_disjoint(other));
        assert!(!big.is_disjoint(small));
        assert_eq!(small.union(other).len(), 3);
        assert!(big.contains_all(ComponentMask::EMPTY));
    }

    #[test]
    fn test_iter_ascending() {
        let mask = ComponentMask::from_unique(&[63, 0, 9]).unwrap();
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 9, 63]);
        assert!(!mask.contains(200));
    }
}
