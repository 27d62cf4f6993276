//! # Query Engine
//!
//! Queries iterate one component subset across every archetype that has it.
//!
//! Matching happens once, when a [`QueryPlan`] is prepared: the plan caches
//! the ids of the matching archetypes. Binding the plan to a pool then only
//! borrows columns.
//!
//! ```rust,ignore
//! let plan = registry.prepare::<(Position,)>(&Filter::new().without::<Frozen>())?;
//! let mut query = registry.bind(&plan, PoolKind::Active)?;
//! while let Some((id, (position,))) = query.next() {
//!     position.y -= 9.8;
//! }
//! ```

use std::fmt;
use std::marker::PhantomData;

use super::archetype::{Schema, SchemaId};
use super::component::{Component, ComponentId, ComponentMask};
use super::entity::EntityId;
use super::fetch::Fetch;
use super::iter::PoolIter;
use crate::error::{EcsError, EcsResult};

/// Extra inclusion and exclusion constraints on top of a fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    with: Vec<ComponentId>,
    without: Vec<ComponentId>,
}

impl Filter {
    /// A filter that adds no constraints.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            with: Vec::new(),
            without: Vec::new(),
        }
    }

    /// Requires archetypes to also store `C`, without fetching it.
    #[must_use]
    pub fn with<C: Component>(mut self) -> Self {
        self.with.push(C::ID);
        self
    }

    /// Excludes archetypes that store `C`.
    #[must_use]
    pub fn without<C: Component>(mut self) -> Self {
        self.without.push(C::ID);
        self
    }

    fn masks(&self) -> EcsResult<(ComponentMask, ComponentMask)> {
        Ok((
            ComponentMask::from_ids(&self.with)?,
            ComponentMask::from_ids(&self.without)?,
        ))
    }
}

/// The archetypes a fetch and filter resolved to.
pub struct QueryPlan<F: Fetch> {
    required: ComponentMask,
    excluded: ComponentMask,
    schemas: Vec<SchemaId>,
    _fetch: PhantomData<fn() -> F>,
}

impl<F: Fetch> QueryPlan<F> {
    /// Resolves `filter` against registered schemas.
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateComponent`] if the fetch names a component twice,
    /// [`EcsError::NoMatchingArchetype`] if nothing matches.
    pub(crate) fn resolve<'s>(
        schemas: impl IntoIterator<Item = &'s Schema>,
        filter: &Filter,
    ) -> EcsResult<Self> {
        let (with, excluded) = filter.masks()?;
        let required = F::mask()?.union(with);

        let schemas: Vec<SchemaId> = schemas
            .into_iter()
            .filter(|schema| {
                schema.mask().contains_all(required) && schema.mask().is_disjoint(excluded)
            })
            .map(Schema::id)
            .collect();

        if schemas.is_empty() {
            tracing::warn!(
                "Query {} matches no archetype (required {:#x}, excluded {:#x})",
                std::any::type_name::<F>(),
                required.bits(),
                excluded.bits()
            );
            return Err(EcsError::NoMatchingArchetype);
        }

        tracing::debug!(
            "Query {} prepared over {} archetypes",
            std::any::type_name::<F>(),
            schemas.len()
        );

        Ok(Self {
            required,
            excluded,
            schemas,
            _fetch: PhantomData,
        })
    }

    /// Matched archetypes, in registration order.
    #[must_use]
    pub fn schemas(&self) -> &[SchemaId] {
        &self.schemas
    }

    /// Checks if the plan covers an archetype.
    #[must_use]
    pub fn matches(&self, schema: SchemaId) -> bool {
        self.schemas.binary_search(&schema).is_ok()
    }

    /// Components an archetype must store to match.
    #[must_use]
    pub const fn required(&self) -> ComponentMask {
        self.required
    }

    /// Components an archetype must not store to match.
    #[must_use]
    pub const fn excluded(&self) -> ComponentMask {
        self.excluded
    }
}

impl<F: Fetch> Clone for QueryPlan<F> {
    fn clone(&self) -> Self {
        Self {
            required: self.required,
            excluded: self.excluded,
            schemas: self.schemas.clone(),
            _fetch: PhantomData,
        }
    }
}

impl<F: Fetch> fmt::Debug for QueryPlan<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPlan")
            .field("fetch", &std::any::type_name::<F>())
            .field("schemas", &self.schemas)
            .finish()
    }
}

/// Chained iteration over one pool of every matched archetype.
///
/// Like [`PoolIter`], this is a lending iterator.
pub struct Query<'a, F: Fetch> {
    chunks: Vec<PoolIter<'a, F>>,
    current: usize,
}

impl<F: Fetch> fmt::Debug for Query<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("chunks", &self.chunks)
            .field("current", &self.current)
            .finish()
    }
}

impl<'a, F: Fetch> Query<'a, F> {
    pub(crate) fn new(chunks: Vec<PoolIter<'a, F>>) -> Self {
        Self { chunks, current: 0 }
    }

    /// Yields the next entity, moving on to the next archetype when the
    /// current one is exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<(EntityId, F::Item<'_>)> {
        while self.chunks.get(self.current)?.is_done() {
            self.current += 1;
        }
        self.chunks.get_mut(self.current)?.next()
    }

    /// Number of entities not yet visited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.iter().map(PoolIter::len).sum()
    }

    /// Checks if there is nothing left to visit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(PoolIter::is_empty)
    }

    /// Rewinds every archetype to its first slot.
    pub fn reset(&mut self) {
        self.chunks.iter_mut().for_each(PoolIter::reset);
        self.current = 0;
    }

    /// Number of matched archetypes.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// The iterator of one matched archetype, for splitting work by chunk.
    pub fn chunk(&mut self, index: usize) -> Option<&mut PoolIter<'a, F>> {
        self.chunks.get_mut(index)
    }

    /// Calls `f` on every remaining entity.
    pub fn for_each(&mut self, mut f: impl FnMut(EntityId, F::Item<'_>)) {
        while let Some((id, item)) = self.next() {
            f(id, item);
        }
    }
}

#[cfg(test)]
mod tests {
    use bytemuck::{Pod, Zeroable};

    use super::*;

    macro_rules! marker {
        ($name:ident, $id:expr) => {
            #[allow(dead_code)]
            #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
            #[repr(C)]
            struct $name {
                value: u32,
            }

            impl Component for $name {
                const ID: ComponentId = $id;
            }
        };
    }

    marker!(Health, 0);
    marker!(Position, 1);
    marker!(Frozen, 2);

    fn schemas() -> Vec<Schema> {
        vec![
            Schema::of::<(Health, Position)>(SchemaId::new(0)).unwrap(),
            Schema::of::<(Position,)>(SchemaId::new(1)).unwrap(),
            Schema::of::<(Position, Frozen)>(SchemaId::new(2)).unwrap(),
        ]
    }

    #[test]
    fn test_plan_matches_supersets() {
        let schemas = schemas();
        let plan = QueryPlan::<(Position,)>::resolve(&schemas, &Filter::new()).unwrap();
        assert_eq!(plan.schemas(), &[SchemaId::new(0), SchemaId::new(1), SchemaId::new(2)]);

        let plan = QueryPlan::<(Position,)>::resolve(&schemas, &Filter::new().with::<Health>())
            .unwrap();
        assert_eq!(plan.schemas(), &[SchemaId::new(0)]);
        assert!(plan.matches(SchemaId::new(0)));
        assert!(!plan.matches(SchemaId::new(1)));
    }

    #[test]
    fn test_plan_exclusion() {
        let schemas = schemas();
        let filter = Filter::new().without::<Frozen>();
        let plan = QueryPlan::<(Position,)>::resolve(&schemas, &filter).unwrap();
        assert_eq!(plan.schemas(), &[SchemaId::new(0), SchemaId::new(1)]);
    }

    #[test]
    fn test_plan_without_matches_is_error() {
        let schemas = schemas();
        let filter = Filter::new().without::<Position>();
        let err = QueryPlan::<(Position,)>::resolve(&schemas, &filter).unwrap_err();
        assert_eq!(err, EcsError::NoMatchingArchetype);
        assert!(err.is_configuration());

        let err = QueryPlan::<(Health, Frozen)>::resolve(&schemas, &Filter::new()).unwrap_err();
        assert_eq!(err, EcsError::NoMatchingArchetype);
    }

    #[test]
    fn test_query_debug_reports_progress() {
        let query = Query::<(Position,)>::new(Vec::new());
        let text = format!("{query:?}");
        assert!(text.starts_with("Query"));
        assert!(text.contains("current: 0"));
        assert!(query.is_empty());
    }

    #[test]
    fn test_plan_rejects_duplicate_fetch() {
        let schemas = schemas();
        let err = QueryPlan::<(Position, Position)>::resolve(&schemas, &Filter::new()).unwrap_err();
        assert_eq!(err, EcsError::DuplicateComponent(1));
    }
}
