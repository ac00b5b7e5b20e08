use thiserror::Error;

use super::action::NAME_ELEMENT;
use super::snapshot::SnapshotNode;
use crate::world::{Transform, Vec2};

pub const NO_TEMPLATE_TAG: &str = "NoPrefabTag";
pub const NO_WORLD_TAG: &str = "NoWorldTag";

pub(crate) const TRANSFORM_ELEMENT: &str = "Transform";
pub(crate) const POSITION_ELEMENT: &str = "Position";
pub(crate) const ROTATION_ELEMENT: &str = "Rotation";
pub(crate) const VELOCITY_ELEMENT: &str = "Velocity";
pub(crate) const ANGULAR_VELOCITY_ELEMENT: &str = "AngularVelocity";
pub(crate) const X_ELEMENT: &str = "X";
pub(crate) const Y_ELEMENT: &str = "Y";
pub(crate) const TEMPLATE_ELEMENT: &str = "Prefab";
pub(crate) const WORLD_TAG_ELEMENT: &str = "WorldTag";
pub(crate) const EXTRA_TAGS_ELEMENT: &str = "ExtraTags";
pub(crate) const TAG_ELEMENT: &str = "Tag";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("object is missing required element <{0}>")]
    MissingField(&'static str),
    #[error("element <{field}> value '{value}' is not a number")]
    InvalidNumber { field: &'static str, value: String },
}

/// Logged pose plus any motion recorded alongside it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    pub transform: Transform,
    pub velocity: Option<Vec2>,
    pub angular_velocity: Option<f32>,
}

/// A recorded object, ready to be handed to a factory.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    pub name: String,
    pub template: Option<String>,
    pub world_tag: Option<String>,
    pub extra_tags: Vec<String>,
    pub pose: Pose,
}

impl EntityDescriptor {
    /// Reads an `<Object>` element. `fallback_name` stands in for a missing
    /// `<Name>`, which is how bare action inputs identify their subject.
    pub fn from_node(
        node: &SnapshotNode,
        fallback_name: Option<&str>,
    ) -> Result<Self, DescriptorError> {
        let name = non_empty(node.child_text(NAME_ELEMENT))
            .or(fallback_name.filter(|name| !name.is_empty()))
            .ok_or(DescriptorError::MissingField(NAME_ELEMENT))?
            .to_string();

        let transform = node
            .child(TRANSFORM_ELEMENT)
            .ok_or(DescriptorError::MissingField(TRANSFORM_ELEMENT))?;
        let position = transform
            .child(POSITION_ELEMENT)
            .ok_or(DescriptorError::MissingField(POSITION_ELEMENT))?;
        let position = read_vec2(position)?;
        let rotation_degrees = read_number(transform, ROTATION_ELEMENT)?;

        let velocity = match transform.child(VELOCITY_ELEMENT) {
            Some(velocity) => Some(read_vec2(velocity)?),
            None => None,
        };
        let angular_velocity = match transform.child(ANGULAR_VELOCITY_ELEMENT) {
            Some(_) => Some(read_number(transform, ANGULAR_VELOCITY_ELEMENT)?),
            None => None,
        };

        let mut extra_tags: Vec<String> = Vec::new();
        if let Some(tags) = node.child(EXTRA_TAGS_ELEMENT) {
            for tag in tags.children_named(TAG_ELEMENT) {
                let tag = tag.text();
                if !tag.is_empty() && !extra_tags.iter().any(|existing| existing == tag) {
                    extra_tags.push(tag.to_string());
                }
            }
        }

        Ok(Self {
            name,
            template: non_empty(node.child_text(TEMPLATE_ELEMENT)).map(str::to_string),
            world_tag: non_empty(node.child_text(WORLD_TAG_ELEMENT)).map(str::to_string),
            extra_tags,
            pose: Pose {
                transform: Transform {
                    position,
                    rotation_degrees,
                },
                velocity,
                angular_velocity,
            },
        })
    }

    /// Key used when no override resolver answers: the explicit template,
    /// otherwise the display name.
    pub fn default_template_key(&self) -> &str {
        self.template.as_deref().unwrap_or(&self.name)
    }

    pub fn template_tag(&self) -> &str {
        self.template.as_deref().unwrap_or(NO_TEMPLATE_TAG)
    }

    pub fn world_tag(&self) -> &str {
        self.world_tag.as_deref().unwrap_or(NO_WORLD_TAG)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

fn read_vec2(node: &SnapshotNode) -> Result<Vec2, DescriptorError> {
    Ok(Vec2 {
        x: read_number(node, X_ELEMENT)?,
        y: read_number(node, Y_ELEMENT)?,
    })
}

fn read_number(node: &SnapshotNode, field: &'static str) -> Result<f32, DescriptorError> {
    let raw = node
        .child_text(field)
        .ok_or(DescriptorError::MissingField(field))?;
    raw.parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| DescriptorError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
}
