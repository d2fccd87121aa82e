use std::collections::HashMap;

use super::entity::{Entity, EntityId, Owner};

/// Live entities keyed by their network ID.
#[derive(Debug)]
pub struct Registry {
    entities: HashMap<EntityId, Entity>,
    next_id: u64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            next_id: 1,
        }
    }

    /// Hands out a fresh ID. IDs only move forward, so a value is never
    /// issued twice within a session.
    pub fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn spawn_with<F>(&mut self, build: F) -> EntityId
    where
        F: FnOnce(EntityId) -> Entity,
    {
        let id = self.allocate_id();
        let mut entity = build(id);
        entity.id = id;
        self.entities.insert(id, entity);
        id
    }

    /// Inserts an entity under an ID chosen elsewhere (the authoritative side).
    /// Returns false and leaves the registry untouched if the ID is already live.
    pub fn insert(&mut self, entity: Entity) -> bool {
        if self.entities.contains_key(&entity.id) {
            return false;
        }

        if entity.id.0 >= self.next_id {
            self.next_id = entity.id.0 + 1;
        }
        self.entities.insert(entity.id, entity);
        true
    }

    pub fn despawn(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    /// Removes every entity flagged with `Entity::mark_destroyed`.
    pub fn sweep_destroyed(&mut self) -> Vec<Entity> {
        let mut ids: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| e.is_destroyed())
            .map(|e| e.id)
            .collect();
        ids.sort();

        ids.into_iter().filter_map(|id| self.despawn(id)).collect()
    }

    /// Hands every entity claimed by `owner` back to `Owner::NEUTRAL`.
    pub fn release_owner(&mut self, owner: Owner) -> usize {
        let mut released = 0;
        for entity in self.entities.values_mut().filter(|e| e.owner == owner) {
            entity.owner = Owner::NEUTRAL;
            released += 1;
        }
        released
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    /// IDs in ascending order, for deterministic iteration.
    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.entities.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
