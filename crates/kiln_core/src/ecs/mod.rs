//! # Entity Component System
//!
//! Archetype storage with deferred lifecycle transitions.
//!
//! ## Design Philosophy
//!
//! - Archetypes are fixed when the registry is built
//! - Components are stored in dense per-field arrays for cache efficiency
//! - Every archetype has an active and a dormant pool
//! - Entity IDs are directory indices, reused only after death

mod archetype;
mod component;
mod entity;
mod events;
mod fetch;
mod iter;
mod query;
mod registry;
mod storage;

pub use archetype::{ArchetypeStorage, Record, Schema, SchemaId};
pub use component::{Component, ComponentId, ComponentMask, MAX_COMPONENTS};
pub use entity::{EntityDirectory, EntityId, EntityInfo, EntityState, EntityTask};
pub use events::{
    ArchetypeChanged, Callback, ComponentChanged, EntityCreated, EntityStateChanged, EventBus,
    Listener,
};
pub use fetch::Fetch;
pub use iter::PoolIter;
pub use query::{Filter, Query, QueryPlan};
pub use registry::{Registry, RegistryBuilder};
pub use storage::{ColumnPool, ColumnSpec, ColumnsMut, PoolKind};
