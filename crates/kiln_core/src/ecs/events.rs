//! # Event Bus
//!
//! Single-subscriber listeners keyed by event type.
//!
//! Every event type has at most one callback. Subscribing again replaces it.
//! A listener can be closed and reopened without losing its callback.
//!
//! Callbacks receive a mutable context (the registry) alongside the event so
//! they can act on it. To allow that, a callback is taken out of its listener
//! for the duration of the call and put back afterwards. Events of the same
//! kind raised while it runs are buffered and delivered, in order, once it
//! returns.

use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::fmt;

use super::archetype::SchemaId;
use super::component::ComponentId;
use super::entity::{EntityId, EntityState};

/// Boxed event callback receiving the context and the event.
pub type Callback<C, E> = Box<dyn FnMut(&mut C, &E)>;

/// An entity was written into its archetype's active pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityCreated {
    /// The new entity.
    pub id: EntityId,
    /// Its archetype.
    pub schema: SchemaId,
}

/// An entity changed lifecycle state, either when a transition was requested
/// or when it was applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityStateChanged {
    /// The entity.
    pub id: EntityId,
    /// State before the change.
    pub previous: EntityState,
    /// State after the change.
    pub current: EntityState,
}

/// Rows of an archetype were added, moved or removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchetypeChanged {
    /// The archetype.
    pub schema: SchemaId,
}

/// Rows storing a component were added, moved or removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentChanged {
    /// The component.
    pub component: ComponentId,
}

/// Holder of at most one callback for one event type.
pub struct Listener<C, E> {
    callback: Option<Callback<C, E>>,
    open: bool,
    /// The callback is out for a call.
    running: bool,
    /// The callback was replaced or removed while it was out.
    replaced: bool,
    /// Events raised while the callback was out.
    pending: VecDeque<E>,
}

impl<C, E> Listener<C, E> {
    /// A closed listener with no callback.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            callback: None,
            open: false,
            running: false,
            replaced: false,
            pending: VecDeque::new(),
        }
    }

    /// Installs `callback`, replacing any previous one, and opens the listener.
    pub fn subscribe(&mut self, callback: impl FnMut(&mut C, &E) + 'static) {
        self.callback = Some(Box::new(callback));
        self.open = true;
        self.replaced = self.running;
    }

    /// Removes the callback and closes the listener.
    pub fn unsubscribe(&mut self) {
        self.callback = None;
        self.open = false;
        self.replaced = self.running;
    }

    /// Stops delivery, keeping the callback.
    pub fn close(&mut self) {
        self.open = false;
    }

    /// Resumes delivery.
    pub fn open(&mut self) {
        self.open = true;
    }

    /// Checks if events would be delivered.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open && self.callback.is_some()
    }

    /// Checks if a callback is installed.
    #[must_use]
    pub const fn is_subscribed(&self) -> bool {
        self.callback.is_some()
    }

    /// Invokes the callback if the listener is open.
    ///
    /// Returns whether the callback ran.
    pub fn call(&mut self, context: &mut C, event: &E) -> bool {
        match (&mut self.callback, self.open) {
            (Some(callback), true) => {
                callback(context, event);
                true
            }
            _ => false,
        }
    }
}

impl<C, E: Clone> Listener<C, E> {
    /// Takes the callback out to deliver `event` with a re-entrant context.
    ///
    /// While the callback is out, `event` is buffered instead and `None` is
    /// returned. Returns `None` as well if the listener is closed.
    pub(crate) fn begin(&mut self, event: &E) -> Option<Callback<C, E>> {
        if self.running {
            self.pending.push_back(event.clone());
            return None;
        }
        if !self.open {
            return None;
        }
        let callback = self.callback.take()?;
        self.running = true;
        Some(callback)
    }

    /// Hands back a callback taken by [`Listener::begin`].
    ///
    /// Keeps a callback installed during the call instead of the returned
    /// one. If events were buffered meanwhile and the listener is still open,
    /// takes the callback out again together with the oldest of them.
    pub(crate) fn finish(&mut self, callback: Callback<C, E>) -> Option<(Callback<C, E>, E)> {
        if !self.replaced {
            self.callback = Some(callback);
        }
        self.replaced = false;

        if self.open {
            if let Some(event) = self.pending.pop_front() {
                if let Some(callback) = self.callback.take() {
                    return Some((callback, event));
                }
            }
        }
        self.running = false;
        self.pending.clear();
        None
    }
}

impl<C, E> Default for Listener<C, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, E> fmt::Debug for Listener<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("event", &std::any::type_name::<E>())
            .field("subscribed", &self.callback.is_some())
            .field("open", &self.open)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// All listeners of one registry.
pub struct EventBus<C: 'static> {
    /// Listener<C, E> per event type E.
    typed: HashMap<TypeId, Box<dyn Any>>,
    /// One ArchetypeChanged listener per schema.
    archetypes: Vec<Listener<C, ArchetypeChanged>>,
    components: HashMap<ComponentId, Listener<C, ComponentChanged>>,
}

impl<C: 'static> EventBus<C> {
    /// Creates a bus with per-archetype listeners for `schemas` archetypes.
    #[must_use]
    pub fn new(schemas: usize) -> Self {
        Self {
            typed: HashMap::new(),
            archetypes: std::iter::repeat_with(Listener::new).take(schemas).collect(),
            components: HashMap::new(),
        }
    }

    /// The listener of event type `E`, if one was ever subscribed.
    pub fn listener<E: 'static>(&mut self) -> Option<&mut Listener<C, E>> {
        self.typed.get_mut(&TypeId::of::<E>())?.downcast_mut()
    }

    /// Subscribes to every event of type `E`.
    pub fn subscribe<E: 'static>(&mut self, callback: impl FnMut(&mut C, &E) + 'static) {
        match self.listener::<E>() {
            Some(listener) => listener.subscribe(callback),
            None => {
                let mut listener = Listener::<C, E>::new();
                listener.subscribe(callback);
                self.typed.insert(TypeId::of::<E>(), Box::new(listener));
            }
        }
    }

    /// The per-archetype listener of `schema`.
    pub fn archetype(&mut self, schema: SchemaId) -> Option<&mut Listener<C, ArchetypeChanged>> {
        self.archetypes.get_mut(schema.index())
    }

    /// The per-component listener of `component`, created on first use.
    pub fn component(&mut self, component: ComponentId) -> &mut Listener<C, ComponentChanged> {
        self.components.entry(component).or_default()
    }

    /// The per-component listener of `component`, if one was ever used.
    pub(crate) fn existing_component(
        &mut self,
        component: ComponentId,
    ) -> Option<&mut Listener<C, ComponentChanged>> {
        self.components.get_mut(&component)
    }
}

impl<C: 'static> fmt::Debug for EventBus<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("typed", &self.typed.len())
            .field("archetypes", &self.archetypes.len())
            .field("components", &self.components.len())
            .finish()
    }
}
