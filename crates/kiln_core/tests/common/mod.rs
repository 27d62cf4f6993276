//! Shared components and registry fixtures for integration tests.

#![allow(dead_code)]

use bytemuck::{Pod, Zeroable};
use kiln_core::{Component, ComponentId, Registry, RegistryBuilder, RegistryConfig};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Health {
    pub value: i32,
}

impl Component for Health {
    const ID: ComponentId = 0;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Component for Position {
    const ID: ComponentId = 1;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

impl Component for Velocity {
    const ID: ComponentId = 2;
}

/// Tag component with no meaningful data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Frozen {
    pub since: u32,
}

impl Component for Frozen {
    const ID: ComponentId = 3;
}

pub type Unit = (Health, Position);
pub type Mover = (Position, Velocity);
pub type Statue = (Position, Frozen);

pub fn unit(value: i32) -> Unit {
    (Health { value }, Position::default())
}

pub fn mover(dx: f32) -> Mover {
    (Position::default(), Velocity { dx, dy: 0.0 })
}

pub fn statue() -> Statue {
    (Position::default(), Frozen::default())
}

/// Registry with the three test archetypes and a small pool capacity.
pub fn registry() -> Registry {
    let _ = tracing_subscriber::fmt::try_init();

    RegistryBuilder::new()
        .with_config(RegistryConfig {
            pool_capacity: 4,
            ..RegistryConfig::default()
        })
        .archetype::<Unit>()
        .and_then(|builder| builder.archetype::<Mover>())
        .and_then(|builder| builder.archetype::<Statue>())
        .and_then(RegistryBuilder::build)
        .unwrap()
}
