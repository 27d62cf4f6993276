//! # Kiln Core
//!
//! Archetype-based Entity Component System (ECS) designed for:
//! - Dense, cache-friendly component columns
//! - Deferred lifecycle transitions applied in request order
//! - Zero allocations for entity churn within reserved capacity
//!
//! ## Architecture Rules
//!
//! 1. **Archetypes are declared once** - The component set of every entity
//!    kind is fixed when the registry is built
//! 2. **Data-oriented design** - Components are stored in contiguous arrays
//! 3. **Two pools per archetype** - Sleeping entities are moved out of the
//!    active pool so iteration never has to skip them
//!
//! ## Example
//!
//! ```rust,ignore
//! use kiln_core::{EntityTask, Filter, PoolKind, RegistryBuilder};
//!
//! let mut registry = RegistryBuilder::new()
//!     .archetype::<(Health, Position)>()?
//!     .build()?;
//!
//! let id = registry.create((Health { value: 10 }, Position::default()), false)?;
//! registry.queue(id, EntityTask::Snooze)?;
//! registry.update()?;
//!
//! let mut query = registry.query::<(Health,)>(&Filter::new(), PoolKind::Dormant)?;
//! while let Some((id, (health,))) = query.next() {
//!     health.value += 1;
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;

pub use config::RegistryConfig;
pub use ecs::{
    ArchetypeChanged, Component, ComponentChanged, ComponentId, ComponentMask, EntityCreated,
    EntityId, EntityInfo, EntityState, EntityStateChanged, EntityTask, Fetch, Filter, PoolIter,
    PoolKind, Query, QueryPlan, Record, Registry, RegistryBuilder, Schema, SchemaId,
};
pub use error::{EcsError, EcsResult, ErrorCategory};
