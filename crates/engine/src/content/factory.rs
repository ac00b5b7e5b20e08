use thiserror::Error;
use tracing::debug;

use super::catalogue::TemplateCatalogue;
use crate::record::{ActionRecord, DescriptorError, EntityDescriptor, SnapshotNode};
use crate::world::{
    BodyKind, BodyMotion, EntityId, EntitySpawn, PhysicalBody, ReplayWorld, Role, Vec2,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpawnError {
    #[error("no template key could be resolved for object '{name}'")]
    UnresolvedTemplateKey { name: String },
    #[error("template '{key}' is not in the catalogue")]
    TemplateNotFound { key: String },
    #[error(transparent)]
    MalformedDescriptor(#[from] DescriptorError),
}

/// The recorded element and action an entity is being rebuilt from.
#[derive(Debug, Clone, Copy)]
pub struct SpawnContext<'a> {
    pub node: &'a SnapshotNode,
    pub record: &'a ActionRecord,
}

/// Lets a host map recorded objects to template keys before the default
/// template-then-name rule applies.
pub trait TemplateKeyResolver {
    fn resolve(&self, context: &SpawnContext<'_>) -> Option<String>;
}

impl<F> TemplateKeyResolver for F
where
    F: Fn(&SpawnContext<'_>) -> Option<String>,
{
    fn resolve(&self, context: &SpawnContext<'_>) -> Option<String> {
        self(context)
    }
}

pub trait EntityFactory {
    fn resolve_template_key(
        &self,
        descriptor: &EntityDescriptor,
        context: &SpawnContext<'_>,
    ) -> Option<String>;

    /// Places the entity at its logged pose and registers its tags and role.
    fn instantiate(
        &mut self,
        world: &mut ReplayWorld,
        descriptor: &EntityDescriptor,
        key: &str,
        role: Role,
    ) -> Result<EntityId, SpawnError>;

    fn spawn(
        &mut self,
        world: &mut ReplayWorld,
        descriptor: &EntityDescriptor,
        context: &SpawnContext<'_>,
        role: Role,
    ) -> Result<EntityId, SpawnError> {
        let key = self
            .resolve_template_key(descriptor, context)
            .ok_or_else(|| SpawnError::UnresolvedTemplateKey {
                name: descriptor.name.clone(),
            })?;
        self.instantiate(world, descriptor, &key, role)
    }
}

/// Factory backed by a template catalogue.
pub struct CatalogueFactory {
    catalogue: TemplateCatalogue,
    resolver: Option<Box<dyn TemplateKeyResolver>>,
}

impl CatalogueFactory {
    pub fn new(catalogue: TemplateCatalogue) -> Self {
        Self {
            catalogue,
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: impl TemplateKeyResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    pub fn catalogue(&self) -> &TemplateCatalogue {
        &self.catalogue
    }
}

impl EntityFactory for CatalogueFactory {
    fn resolve_template_key(
        &self,
        descriptor: &EntityDescriptor,
        context: &SpawnContext<'_>,
    ) -> Option<String> {
        self.resolver
            .as_ref()
            .and_then(|resolver| resolver.resolve(context))
            .filter(|key| !key.is_empty())
            .or_else(|| {
                let key = descriptor.default_template_key();
                (!key.is_empty()).then(|| key.to_string())
            })
    }

    fn instantiate(
        &mut self,
        world: &mut ReplayWorld,
        descriptor: &EntityDescriptor,
        key: &str,
        role: Role,
    ) -> Result<EntityId, SpawnError> {
        let template = self
            .catalogue
            .template_by_key(key)
            .ok_or_else(|| SpawnError::TemplateNotFound {
                key: key.to_string(),
            })?;

        let body = match template.body {
            BodyKind::None => None,
            kind => Some(PhysicalBody {
                kind,
                motion: BodyMotion {
                    velocity: descriptor.pose.velocity.unwrap_or(Vec2::ZERO),
                    angular_velocity: descriptor.pose.angular_velocity.unwrap_or(0.0),
                },
            }),
        };
        let mut extra_tags = template.tags.clone();
        for tag in &descriptor.extra_tags {
            if !extra_tags.contains(tag) {
                extra_tags.push(tag.clone());
            }
        }

        let id = world.spawn(EntitySpawn {
            name: descriptor.name.clone(),
            template_key: template.key.clone(),
            template_tag: descriptor.template_tag().to_string(),
            world_tag: descriptor.world_tag().to_string(),
            extra_tags,
            transform: descriptor.pose.transform,
            body,
            role,
        });
        debug!(
            entity_id = id.0,
            template = %template.key,
            role = ?role,
            "entity_instantiated"
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::EntityTemplate;
    use crate::record::{Pose, RawActionFields, NO_TEMPLATE_TAG, NO_WORLD_TAG};
    use crate::world::{TagSpace, Transform};

    fn catalogue() -> TemplateCatalogue {
        TemplateCatalogue::from_templates(vec![
            EntityTemplate::new("Box", BodyKind::Dynamic).with_tags(["physics"]),
            EntityTemplate::new("Crate", BodyKind::Static),
            EntityTemplate::new("Label", BodyKind::None),
        ])
    }

    fn descriptor(name: &str, template: Option<&str>) -> EntityDescriptor {
        EntityDescriptor {
            name: name.to_string(),
            template: template.map(str::to_string),
            world_tag: None,
            extra_tags: vec!["logged".to_string()],
            pose: Pose {
                transform: Transform {
                    position: Vec2::new(1.0, 2.0),
                    rotation_degrees: 30.0,
                },
                velocity: Some(Vec2::new(0.0, -2.0)),
                angular_velocity: None,
            },
        }
    }

    #[test]
    fn template_key_prefers_resolver_then_template_then_name() {
        let node = SnapshotNode::new("Object");
        let record = ActionRecord::from_fields(RawActionFields::default());
        let context = SpawnContext {
            node: &node,
            record: &record,
        };

        let plain = CatalogueFactory::new(catalogue());
        assert_eq!(
            plain.resolve_template_key(&descriptor("Box", None), &context),
            Some("Box".to_string())
        );
        assert_eq!(
            plain.resolve_template_key(&descriptor("Box", Some("Crate")), &context),
            Some("Crate".to_string())
        );

        let overridden = CatalogueFactory::new(catalogue())
            .with_resolver(|_: &SpawnContext<'_>| Some("Label".to_string()));
        assert_eq!(
            overridden.resolve_template_key(&descriptor("Box", Some("Crate")), &context),
            Some("Label".to_string())
        );

        let declines =
            CatalogueFactory::new(catalogue()).with_resolver(|_: &SpawnContext<'_>| None);
        assert_eq!(
            declines.resolve_template_key(&descriptor("Box", None), &context),
            Some("Box".to_string())
        );
    }

    #[test]
    fn instantiate_places_entity_with_pose_tags_and_role() {
        let mut world = ReplayWorld::new();
        let mut factory = CatalogueFactory::new(catalogue());
        let id = factory
            .instantiate(&mut world, &descriptor("Box", None), "Box", Role::State)
            .expect("spawn");

        let entity = world.find_entity(id).expect("entity");
        assert_eq!(entity.transform.position, Vec2::new(1.0, 2.0));
        assert_eq!(entity.transform.rotation_degrees, 30.0);
        let body = entity.body.expect("body");
        assert_eq!(body.kind, BodyKind::Dynamic);
        assert_eq!(body.motion.velocity, Vec2::new(0.0, -2.0));

        assert_eq!(world.find_entity(id).expect("entity").template_key, "Box");
        let registry = world.registry();
        assert_eq!(registry.entities_with_tag(TagSpace::Template, NO_TEMPLATE_TAG), vec![id]);
        assert!(registry.entities_with_tag(TagSpace::Template, "Box").is_empty());
        assert_eq!(registry.world_tag(id), Some(NO_WORLD_TAG));
        assert_eq!(registry.extra_tags(id), ["physics".to_string(), "logged".to_string()]);
        assert_eq!(registry.role_of(id), Role::State);
    }

    #[test]
    fn logged_prefab_is_the_template_tag() {
        let mut world = ReplayWorld::new();
        let mut factory = CatalogueFactory::new(catalogue());
        let id = factory
            .instantiate(&mut world, &descriptor("Crate1", Some("Crate")), "Crate", Role::State)
            .expect("spawn");

        assert_eq!(world.registry().template_tag(id), Some("Crate"));
        assert_eq!(world.find_entity(id).expect("entity").template_key, "Crate");
    }

    #[test]
    fn bodiless_templates_spawn_without_body() {
        let mut world = ReplayWorld::new();
        let mut factory = CatalogueFactory::new(catalogue());
        let id = factory
            .instantiate(&mut world, &descriptor("Hint", None), "Label", Role::Action)
            .expect("spawn");
        assert!(world.find_entity(id).expect("entity").body.is_none());
    }

    #[test]
    fn unknown_template_is_an_error_and_spawns_nothing() {
        let mut world = ReplayWorld::new();
        let mut factory = CatalogueFactory::new(catalogue());
        let err = factory
            .instantiate(&mut world, &descriptor("Ramp", None), "Ramp", Role::State)
            .expect_err("missing template");
        assert_eq!(
            err,
            SpawnError::TemplateNotFound {
                key: "Ramp".to_string()
            }
        );
        assert_eq!(world.entity_count(), 0);
    }
}
