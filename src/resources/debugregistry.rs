//! Optional debug-string capability.
//!
//! Components that can describe themselves implement [`ComponentDebug`]. The
//! [`DebugRegistry`] resource records one probe per registered type, so
//! [`debug_strings`] can ask an entity for every description it supports
//! without knowing its components up front.

use bevy_ecs::prelude::*;

/// Human-readable one-line description of a component.
pub trait ComponentDebug {
    fn debug_string(&self) -> String;
}

type DebugProbe = fn(&World, Entity) -> Option<String>;

fn probe<T: Component + ComponentDebug>(world: &World, entity: Entity) -> Option<String> {
    world.get::<T>(entity).map(ComponentDebug::debug_string)
}

#[derive(Resource, Default)]
pub struct DebugRegistry {
    probes: Vec<(&'static str, DebugProbe)>,
}

impl DebugRegistry {
    /// Register `T` under `name`. Registering the same name twice keeps the first.
    pub fn register<T: Component + ComponentDebug>(&mut self, name: &'static str) {
        if self.probes.iter().any(|(existing, _)| *existing == name) {
            return;
        }
        self.probes.push((name, probe::<T>));
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

/// Descriptions of every registered component present on `entity`.
pub fn debug_strings(world: &World, entity: Entity) -> Vec<(&'static str, String)> {
    let Some(registry) = world.get_resource::<DebugRegistry>() else {
        return Vec::new();
    };
    registry
        .probes
        .iter()
        .filter_map(|(name, probe)| probe(world, entity).map(|text| (*name, text)))
        .collect()
}
