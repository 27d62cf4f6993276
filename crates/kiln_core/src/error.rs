//! # Error Types
//!
//! All errors that can occur in the storage engine.
//!
//! Two families exist. **Invalid-argument** errors mean the caller broke a
//! precondition (stale id, out-of-bounds slot, wrong archetype). **Configuration**
//! errors are raised once while the registry or a query plan is being set up.
//! Expected misses (`view`, `find`, state-guarded transitions) are never errors.

use thiserror::Error;

use crate::ecs::{ComponentId, EntityId, PoolKind, SchemaId};

/// Broad classification of an [`EcsError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The caller violated a precondition of the operation.
    InvalidArgument,
    /// The registry or a query was configured inconsistently.
    Configuration,
}

/// Errors that can occur in the storage engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Entity id was never allocated by this registry.
    #[error("entity {id} out of range: only {total} entities were ever allocated")]
    EntityOutOfRange {
        /// The offending id.
        id: EntityId,
        /// Number of ids allocated so far.
        total: usize,
    },

    /// Strict lookup on an entity that has already been destroyed.
    #[error("entity {0} is dead; use view or find for soft lookups")]
    DeadEntity(EntityId),

    /// Strict lookup with an archetype the entity does not belong to.
    #[error("entity {id} belongs to archetype {actual}, not {expected}")]
    WrongArchetype {
        /// The entity that was looked up.
        id: EntityId,
        /// Archetype requested by the caller.
        expected: SchemaId,
        /// Archetype the entity actually belongs to.
        actual: SchemaId,
    },

    /// Pool slot access past the occupied range (this includes any access to
    /// an empty pool).
    #[error("slot {index} out of bounds in {pool} pool holding {count} entities")]
    IndexOutOfBounds {
        /// Which pool was accessed.
        pool: PoolKind,
        /// The requested slot.
        index: usize,
        /// Occupied length of the pool.
        count: usize,
    },

    /// Every 32-bit entity id is in use or retired.
    #[error("no entity ids left")]
    EntityIdsExhausted,

    /// A record's component set does not match the pool it is written into.
    #[error("record components do not match the pool's archetype")]
    RecordMismatch,

    /// A fetch asked for a component the archetype does not store.
    #[error("component {0} is not stored by this archetype")]
    MissingComponent(ComponentId),

    /// Two pools that should share a layout disagree on a column.
    #[error("column layout mismatch for component {0}")]
    ColumnMismatch(ComponentId),

    /// A query filter matched no registered archetype.
    #[error("query matches no archetype; the query is redundant")]
    NoMatchingArchetype,

    /// A component appears twice in an archetype or a fetch.
    #[error("component {0} listed more than once")]
    DuplicateComponent(ComponentId),

    /// A component id does not fit the 64-bit component mask.
    #[error("component id {0} exceeds the maximum of 63")]
    ComponentIdOutOfRange(ComponentId),

    /// Two different component types share one component id.
    #[error("component id {id} is used by both `{first}` and `{second}`")]
    ComponentIdConflict {
        /// The shared id.
        id: ComponentId,
        /// Type registered first.
        first: &'static str,
        /// Type registered later.
        second: &'static str,
    },

    /// Two archetypes were registered with the same component set.
    #[error("archetype {0} is already registered with the same components")]
    DuplicateArchetype(SchemaId),

    /// A record type was used that was never registered.
    #[error("archetype `{0}` is not registered")]
    UnknownArchetype(&'static str),

    /// A singleton type was requested that was never registered.
    #[error("singleton `{0}` is not registered")]
    UnknownSingleton(&'static str),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EcsError {
    /// Returns the category this error belongs to.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::EntityOutOfRange { .. }
            | Self::DeadEntity(_)
            | Self::WrongArchetype { .. }
            | Self::IndexOutOfBounds { .. }
            | Self::RecordMismatch
            | Self::MissingComponent(_)
            | Self::ColumnMismatch(_) => ErrorCategory::InvalidArgument,
            Self::NoMatchingArchetype
            | Self::DuplicateComponent(_)
            | Self::ComponentIdOutOfRange(_)
            | Self::ComponentIdConflict { .. }
            | Self::DuplicateArchetype(_)
            | Self::UnknownArchetype(_)
            | Self::UnknownSingleton(_)
            | Self::EntityIdsExhausted
            | Self::InvalidConfig(_) => ErrorCategory::Configuration,
        }
    }

    /// Convenience for `self.category() == ErrorCategory::Configuration`.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self.category(), ErrorCategory::Configuration)
    }

    pub(crate) const fn out_of_bounds(pool: PoolKind, index: usize, count: usize) -> Self {
        Self::IndexOutOfBounds { pool, index, count }
    }
}

/// Result type for storage engine operations.
pub type EcsResult<T> = Result<T, EcsError>;
