use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::scene::EntityId;

/// Tag spaces indexed by string. `Template` and `World` are single-valued per
/// entity; `Extra` holds an ordered set of free-form tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TagSpace {
    Template,
    World,
    Extra,
}

/// Which part of a record an entity was rebuilt from. `None` is the absence
/// of a role and has no bucket: `entities_with_role(Role::None)` is always
/// empty, so untagged entities are found through `role_of` instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    #[default]
    None,
    State,
    Action,
    StartState,
    PreExisting,
}

#[derive(Debug, Default, Clone)]
struct Membership {
    template: Option<String>,
    world: Option<String>,
    extra: Vec<String>,
    role: Role,
}

#[derive(Debug, Default)]
pub struct EntityRegistry {
    template_buckets: HashMap<String, HashSet<EntityId>>,
    world_buckets: HashMap<String, HashSet<EntityId>>,
    extra_buckets: HashMap<String, HashSet<EntityId>>,
    role_buckets: HashMap<Role, HashSet<EntityId>>,
    memberships: HashMap<EntityId, Membership>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `entity` under `tag`. For single-valued spaces an existing tag
    /// is replaced, so the entity never sits in two buckets of one space.
    pub fn index_by_tag(&mut self, space: TagSpace, tag: &str, entity: EntityId) {
        let membership = self.memberships.entry(entity).or_default();
        match space {
            TagSpace::Template | TagSpace::World => {
                let slot = match space {
                    TagSpace::Template => &mut membership.template,
                    _ => &mut membership.world,
                };
                let previous = slot.replace(tag.to_string());
                let buckets = match space {
                    TagSpace::Template => &mut self.template_buckets,
                    _ => &mut self.world_buckets,
                };
                if let Some(previous) = previous {
                    if previous == tag {
                        return;
                    }
                    remove_from_bucket(buckets, &previous, entity);
                }
                buckets.entry(tag.to_string()).or_default().insert(entity);
            }
            TagSpace::Extra => {
                if membership.extra.iter().any(|existing| existing == tag) {
                    return;
                }
                membership.extra.push(tag.to_string());
                self.extra_buckets
                    .entry(tag.to_string())
                    .or_default()
                    .insert(entity);
            }
        }
    }

    /// Moves `entity` from `old_tag` to `new_tag`. Returns false when the
    /// entity was not in `old_tag`; a move onto the same tag is a no-op.
    pub fn move_tag(
        &mut self,
        space: TagSpace,
        entity: EntityId,
        old_tag: &str,
        new_tag: &str,
    ) -> bool {
        if old_tag == new_tag {
            return self.has_tag(space, old_tag, entity);
        }
        let Some(membership) = self.memberships.get_mut(&entity) else {
            return false;
        };
        match space {
            TagSpace::Template | TagSpace::World => {
                let (slot, buckets) = match space {
                    TagSpace::Template => (&mut membership.template, &mut self.template_buckets),
                    _ => (&mut membership.world, &mut self.world_buckets),
                };
                if slot.as_deref() != Some(old_tag) {
                    return false;
                }
                remove_from_bucket(buckets, old_tag, entity);
                *slot = Some(new_tag.to_string());
                buckets.entry(new_tag.to_string()).or_default().insert(entity);
            }
            TagSpace::Extra => {
                let Some(index) = membership.extra.iter().position(|tag| tag == old_tag) else {
                    return false;
                };
                remove_from_bucket(&mut self.extra_buckets, old_tag, entity);
                if membership.extra.iter().any(|tag| tag == new_tag) {
                    membership.extra.remove(index);
                } else {
                    membership.extra[index] = new_tag.to_string();
                    self.extra_buckets
                        .entry(new_tag.to_string())
                        .or_default()
                        .insert(entity);
                }
            }
        }
        true
    }

    pub fn has_tag(&self, space: TagSpace, tag: &str, entity: EntityId) -> bool {
        self.buckets(space)
            .get(tag)
            .is_some_and(|bucket| bucket.contains(&entity))
    }

    /// Snapshot of the bucket, sorted by id. Safe to hold while mutating the
    /// registry.
    pub fn entities_with_tag(&self, space: TagSpace, tag: &str) -> Vec<EntityId> {
        sorted_snapshot(self.buckets(space).get(tag))
    }

    pub fn count_with_tag(&self, space: TagSpace, tag: &str) -> usize {
        self.buckets(space).get(tag).map_or(0, HashSet::len)
    }

    /// Sets the role tag. Leaving the previous role bucket and joining the new
    /// one happen in the same call. Setting `Role::None` only leaves.
    pub fn set_role(&mut self, entity: EntityId, role: Role) {
        let membership = self.memberships.entry(entity).or_default();
        let previous = membership.role;
        if previous == role {
            return;
        }
        membership.role = role;
        if previous != Role::None {
            remove_from_bucket(&mut self.role_buckets, &previous, entity);
        }
        if role != Role::None {
            self.role_buckets.entry(role).or_default().insert(entity);
        }
    }

    pub fn role_of(&self, entity: EntityId) -> Role {
        self.memberships
            .get(&entity)
            .map_or(Role::None, |membership| membership.role)
    }

    pub fn has_role(&self, entity: EntityId, role: Role) -> bool {
        self.role_buckets
            .get(&role)
            .is_some_and(|bucket| bucket.contains(&entity))
    }

    pub fn entities_with_role(&self, role: Role) -> Vec<EntityId> {
        sorted_snapshot(self.role_buckets.get(&role))
    }

    pub fn count_with_role(&self, role: Role) -> usize {
        self.role_buckets.get(&role).map_or(0, HashSet::len)
    }

    pub fn template_tag(&self, entity: EntityId) -> Option<&str> {
        self.memberships
            .get(&entity)
            .and_then(|membership| membership.template.as_deref())
    }

    pub fn world_tag(&self, entity: EntityId) -> Option<&str> {
        self.memberships
            .get(&entity)
            .and_then(|membership| membership.world.as_deref())
    }

    pub fn extra_tags(&self, entity: EntityId) -> &[String] {
        self.memberships
            .get(&entity)
            .map(|membership| membership.extra.as_slice())
            .unwrap_or(&[])
    }

    /// Purges the entity from every tag space. Returns false if it was unknown.
    pub fn remove_entity(&mut self, entity: EntityId) -> bool {
        let Some(membership) = self.memberships.remove(&entity) else {
            return false;
        };
        if let Some(tag) = membership.template {
            remove_from_bucket(&mut self.template_buckets, &tag, entity);
        }
        if let Some(tag) = membership.world {
            remove_from_bucket(&mut self.world_buckets, &tag, entity);
        }
        for tag in membership.extra {
            remove_from_bucket(&mut self.extra_buckets, &tag, entity);
        }
        if membership.role != Role::None {
            remove_from_bucket(&mut self.role_buckets, &membership.role, entity);
        }
        true
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.memberships.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.memberships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memberships.is_empty()
    }

    pub fn clear(&mut self) {
        self.template_buckets.clear();
        self.world_buckets.clear();
        self.extra_buckets.clear();
        self.role_buckets.clear();
        self.memberships.clear();
    }

    fn buckets(&self, space: TagSpace) -> &HashMap<String, HashSet<EntityId>> {
        match space {
            TagSpace::Template => &self.template_buckets,
            TagSpace::World => &self.world_buckets,
            TagSpace::Extra => &self.extra_buckets,
        }
    }
}

fn remove_from_bucket<K, Q>(buckets: &mut HashMap<K, HashSet<EntityId>>, key: &Q, entity: EntityId)
where
    K: std::borrow::Borrow<Q> + std::hash::Hash + Eq,
    Q: std::hash::Hash + Eq + ?Sized,
{
    let now_empty = match buckets.get_mut(key) {
        Some(bucket) => {
            bucket.remove(&entity);
            bucket.is_empty()
        }
        None => false,
    };
    if now_empty {
        buckets.remove(key);
    }
}

fn sorted_snapshot(bucket: Option<&HashSet<EntityId>>) -> Vec<EntityId> {
    let mut ids = bucket
        .map(|bucket| bucket.iter().copied().collect::<Vec<_>>())
        .unwrap_or_default();
    ids.sort_unstable();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket_count_for(registry: &EntityRegistry, space: TagSpace, entity: EntityId) -> usize {
        registry
            .buckets(space)
            .values()
            .filter(|bucket| bucket.contains(&entity))
            .count()
    }

    #[test]
    fn index_replaces_single_valued_tag() {
        let mut registry = EntityRegistry::new();
        let id = EntityId(1);
        registry.index_by_tag(TagSpace::Template, "Box", id);
        registry.index_by_tag(TagSpace::Template, "Ball", id);

        assert!(registry.entities_with_tag(TagSpace::Template, "Box").is_empty());
        assert_eq!(registry.entities_with_tag(TagSpace::Template, "Ball"), vec![id]);
        assert_eq!(registry.template_tag(id), Some("Ball"));
    }

    #[test]
    fn move_tag_to_same_tag_is_idempotent() {
        let mut registry = EntityRegistry::new();
        let id = EntityId(4);
        registry.index_by_tag(TagSpace::World, "Ground", id);

        assert!(registry.move_tag(TagSpace::World, id, "Ground", "Ground"));
        assert!(registry.move_tag(TagSpace::World, id, "Ground", "Ground"));
        assert_eq!(registry.entities_with_tag(TagSpace::World, "Ground"), vec![id]);
        assert_eq!(bucket_count_for(&registry, TagSpace::World, id), 1);
    }

    #[test]
    fn move_tag_requires_membership_in_old_tag() {
        let mut registry = EntityRegistry::new();
        let id = EntityId(2);
        registry.index_by_tag(TagSpace::World, "A", id);

        assert!(!registry.move_tag(TagSpace::World, id, "B", "C"));
        assert_eq!(registry.world_tag(id), Some("A"));
        assert!(!registry.move_tag(TagSpace::World, EntityId(99), "A", "C"));
    }

    #[test]
    fn each_entity_sits_in_exactly_one_bucket_after_move_sequence() {
        let mut registry = EntityRegistry::new();
        let ids = [EntityId(0), EntityId(1), EntityId(2)];
        for id in ids {
            registry.index_by_tag(TagSpace::Template, "t0", id);
            registry.index_by_tag(TagSpace::World, "w0", id);
        }

        let tags = ["t0", "t1", "t2", "t1", "t1", "t0", "t3"];
        for (step, pair) in tags.windows(2).enumerate() {
            let id = ids[step % ids.len()];
            let current = registry.template_tag(id).expect("tag").to_string();
            registry.move_tag(TagSpace::Template, id, &current, pair[1]);
            registry.move_tag(TagSpace::World, id, "w0", "w1");
        }

        for id in ids {
            assert_eq!(bucket_count_for(&registry, TagSpace::Template, id), 1);
            assert_eq!(bucket_count_for(&registry, TagSpace::World, id), 1);
        }
    }

    #[test]
    fn extra_tags_are_an_ordered_set() {
        let mut registry = EntityRegistry::new();
        let id = EntityId(3);
        registry.index_by_tag(TagSpace::Extra, "red", id);
        registry.index_by_tag(TagSpace::Extra, "heavy", id);
        registry.index_by_tag(TagSpace::Extra, "red", id);

        assert_eq!(registry.extra_tags(id), ["red".to_string(), "heavy".to_string()]);
        assert!(registry.move_tag(TagSpace::Extra, id, "red", "blue"));
        assert_eq!(registry.extra_tags(id), ["blue".to_string(), "heavy".to_string()]);
        assert!(registry.entities_with_tag(TagSpace::Extra, "red").is_empty());
        assert!(registry.has_tag(TagSpace::Extra, "blue", id));
    }

    #[test]
    fn set_role_is_mutually_exclusive() {
        let mut registry = EntityRegistry::new();
        let id = EntityId(10);
        registry.set_role(id, Role::State);
        registry.set_role(id, Role::Action);

        assert!(registry.entities_with_role(Role::State).is_empty());
        assert_eq!(registry.entities_with_role(Role::Action), vec![id]);
        assert_eq!(registry.role_of(id), Role::Action);

        registry.set_role(id, Role::None);
        assert_eq!(registry.count_with_role(Role::Action), 0);
        assert_eq!(registry.role_of(id), Role::None);
    }

    #[test]
    fn role_none_has_no_bucket() {
        let mut registry = EntityRegistry::new();
        let untagged = EntityId(1);
        registry.index_by_tag(TagSpace::World, "Table", untagged);
        registry.set_role(EntityId(2), Role::None);

        assert!(registry.contains(untagged));
        assert_eq!(registry.role_of(untagged), Role::None);
        assert!(!registry.has_role(untagged, Role::None));
        assert!(registry.entities_with_role(Role::None).is_empty());
        assert_eq!(registry.count_with_role(Role::None), 0);
    }

    #[test]
    fn remove_entity_purges_every_space() {
        let mut registry = EntityRegistry::new();
        let id = EntityId(7);
        let other = EntityId(8);
        registry.index_by_tag(TagSpace::Template, "Box", id);
        registry.index_by_tag(TagSpace::World, "Crate", id);
        registry.index_by_tag(TagSpace::Extra, "stackable", id);
        registry.set_role(id, Role::State);
        registry.index_by_tag(TagSpace::Template, "Box", other);

        assert!(registry.remove_entity(id));
        assert!(!registry.remove_entity(id));
        assert_eq!(registry.entities_with_tag(TagSpace::Template, "Box"), vec![other]);
        assert_eq!(registry.count_with_tag(TagSpace::World, "Crate"), 0);
        assert_eq!(registry.count_with_tag(TagSpace::Extra, "stackable"), 0);
        assert_eq!(registry.count_with_role(Role::State), 0);
        assert!(!registry.contains(id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn snapshots_are_sorted_by_id() {
        let mut registry = EntityRegistry::new();
        for raw in [5, 1, 3] {
            registry.set_role(EntityId(raw), Role::State);
        }
        assert_eq!(
            registry.entities_with_role(Role::State),
            vec![EntityId(1), EntityId(3), EntityId(5)]
        );
    }
}
