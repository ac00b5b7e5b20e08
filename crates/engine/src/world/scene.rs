use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::registry::{EntityRegistry, Role, TagSpace};

/// Linear and angular speed below which a body counts as asleep.
pub const MOTION_REST_EPSILON: f32 = 1.0e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityId(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

/// Planar pose. Rotation is in degrees about the axis out of the plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Transform {
    pub position: Vec2,
    pub rotation_degrees: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    #[default]
    None,
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BodyMotion {
    pub velocity: Vec2,
    pub angular_velocity: f32,
}

impl BodyMotion {
    pub fn at_rest() -> Self {
        Self::default()
    }

    pub fn is_at_rest(&self) -> bool {
        self.velocity.length() <= MOTION_REST_EPSILON
            && self.angular_velocity.abs() <= MOTION_REST_EPSILON
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhysicalBody {
    pub kind: BodyKind,
    pub motion: BodyMotion,
}

impl PhysicalBody {
    pub fn is_at_rest(&self) -> bool {
        match self.kind {
            BodyKind::Dynamic => self.motion.is_at_rest(),
            BodyKind::Static | BodyKind::None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayEntity {
    pub id: EntityId,
    pub name: String,
    pub template_key: String,
    pub transform: Transform,
    pub body: Option<PhysicalBody>,
    record_touching: bool,
    touching: BTreeSet<EntityId>,
    applied_spawn_order: u64,
}

impl ReplayEntity {
    pub fn applied_spawn_order(&self) -> u64 {
        self.applied_spawn_order
    }

    pub fn records_touching(&self) -> bool {
        self.record_touching
    }

    pub fn touching(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.touching.iter().copied()
    }

    pub fn is_at_rest(&self) -> bool {
        self.body.map_or(true, |body| body.is_at_rest())
    }
}

/// Everything needed to place one entity. Tags are indexed in the registry as
/// soon as the spawn call returns.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySpawn {
    pub name: String,
    pub template_key: String,
    /// Indexed in the `Template` space; may differ from `template_key`.
    pub template_tag: String,
    pub world_tag: String,
    pub extra_tags: Vec<String>,
    pub transform: Transform,
    pub body: Option<PhysicalBody>,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactEvent {
    Enter { a: EntityId, b: EntityId },
    Stay { a: EntityId, b: EntityId },
    Exit { a: EntityId, b: EntityId },
}

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

/// The reconstructed scene: entities, their tags and roles, and contact sets.
/// Spawns are visible at once; despawns are queued until `apply_pending`.
#[derive(Debug)]
pub struct ReplayWorld {
    allocator: EntityIdAllocator,
    entities: Vec<ReplayEntity>,
    pending_despawns: Vec<EntityId>,
    next_applied_spawn_order: u64,
    registry: EntityRegistry,
    record_touching_default: bool,
}

impl Default for ReplayWorld {
    fn default() -> Self {
        Self {
            allocator: EntityIdAllocator::default(),
            entities: Vec::new(),
            pending_despawns: Vec::new(),
            next_applied_spawn_order: 0,
            registry: EntityRegistry::new(),
            record_touching_default: true,
        }
    }
}

impl ReplayWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_record_touching_default(&mut self, enabled: bool) {
        self.record_touching_default = enabled;
    }

    pub fn spawn(&mut self, spawn: EntitySpawn) -> EntityId {
        let id = self.allocator.allocate();
        self.registry
            .index_by_tag(TagSpace::Template, &spawn.template_tag, id);
        self.registry.index_by_tag(TagSpace::World, &spawn.world_tag, id);
        for tag in &spawn.extra_tags {
            self.registry.index_by_tag(TagSpace::Extra, tag, id);
        }
        self.registry.set_role(id, spawn.role);
        let record_touching = self.record_touching_default && spawn.role != Role::PreExisting;
        self.entities.push(ReplayEntity {
            id,
            name: spawn.name,
            template_key: spawn.template_key,
            transform: spawn.transform,
            body: spawn.body,
            record_touching,
            touching: BTreeSet::new(),
            applied_spawn_order: self.next_applied_spawn_order,
        });
        self.next_applied_spawn_order = self.next_applied_spawn_order.saturating_add(1);
        id
    }

    /// Queues removal. The entity leaves every registry bucket now so the
    /// role it held is immediately free for replacements.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        if !self.entities.iter().any(|entity| entity.id == id) {
            return false;
        }
        self.registry.remove_entity(id);
        self.pending_despawns.push(id);
        true
    }

    /// Despawns every entity holding `role`. Returns how many were queued.
    pub fn clear_role(&mut self, role: Role) -> usize {
        let doomed = self.registry.entities_with_role(role);
        doomed.into_iter().filter(|id| self.despawn(*id)).count()
    }

    pub fn apply_pending(&mut self) {
        if self.pending_despawns.is_empty() {
            return;
        }
        self.pending_despawns.sort_unstable();
        self.pending_despawns.dedup();
        let pending = &self.pending_despawns;
        self.entities
            .retain(|entity| pending.binary_search(&entity.id).is_err());
        for entity in &mut self.entities {
            entity
                .touching
                .retain(|other| pending.binary_search(other).is_err());
        }
        self.pending_despawns.clear();
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_despawns.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.pending_despawns.clear();
        self.registry.clear();
        self.next_applied_spawn_order = 0;
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn set_role(&mut self, id: EntityId, role: Role) -> bool {
        if !self.registry.contains(id) {
            return false;
        }
        self.registry.set_role(id, role);
        true
    }

    pub fn set_world_tag(&mut self, id: EntityId, tag: &str) -> bool {
        if !self.registry.contains(id) {
            return false;
        }
        self.registry.index_by_tag(TagSpace::World, tag, id);
        true
    }

    pub fn add_extra_tag(&mut self, id: EntityId, tag: &str) -> bool {
        if !self.registry.contains(id) {
            return false;
        }
        self.registry.index_by_tag(TagSpace::Extra, tag, id);
        true
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> &[ReplayEntity] {
        &self.entities
    }

    pub fn find_entity(&self, id: EntityId) -> Option<&ReplayEntity> {
        self.entities.iter().find(|entity| entity.id == id)
    }

    pub fn find_entity_mut(&mut self, id: EntityId) -> Option<&mut ReplayEntity> {
        self.entities.iter_mut().find(|entity| entity.id == id)
    }

    /// First live entity with the given display name, if any.
    pub fn find_by_name(&self, name: &str) -> Option<&ReplayEntity> {
        self.entities
            .iter()
            .find(|entity| entity.name == name && self.registry.contains(entity.id))
    }

    pub fn ids_with_role(&self, role: Role) -> Vec<EntityId> {
        self.registry.entities_with_role(role)
    }

    pub fn set_body_motion(&mut self, id: EntityId, motion: BodyMotion) -> bool {
        match self
            .find_entity_mut(id)
            .and_then(|entity| entity.body.as_mut())
        {
            Some(body) => {
                body.motion = motion;
                true
            }
            None => false,
        }
    }

    pub fn set_record_touching(&mut self, id: EntityId, enabled: bool) -> bool {
        let Some(entity) = self.find_entity_mut(id) else {
            return false;
        };
        entity.record_touching = enabled;
        if !enabled {
            entity.touching.clear();
        }
        true
    }

    /// Applies a contact to both participants, each subject to its own
    /// recording flag.
    pub fn apply_contact(&mut self, event: ContactEvent) {
        let (a, b, touching) = match event {
            ContactEvent::Enter { a, b } | ContactEvent::Stay { a, b } => (a, b, true),
            ContactEvent::Exit { a, b } => (a, b, false),
        };
        if a == b {
            return;
        }
        for (subject, other) in [(a, b), (b, a)] {
            if let Some(entity) = self.find_entity_mut(subject) {
                if !entity.record_touching {
                    continue;
                }
                if touching {
                    entity.touching.insert(other);
                } else {
                    entity.touching.remove(&other);
                }
            }
        }
    }

    pub fn touching(&self, id: EntityId) -> Vec<EntityId> {
        self.find_entity(id)
            .map(|entity| entity.touching().collect())
            .unwrap_or_default()
    }

    /// True when every listed entity that still exists and has a body is at
    /// rest. Missing entities are ignored.
    pub fn all_at_rest(&self, ids: &[EntityId]) -> bool {
        ids.iter()
            .filter_map(|id| self.find_entity(*id))
            .all(ReplayEntity::is_at_rest)
    }
}
