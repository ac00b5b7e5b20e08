use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::record::ActionRecord;
use crate::world::{ReplayWorld, Role, Vec2};

/// Computes per-step metrics. The engine resets it before each step and asks
/// for scores once the world has settled.
pub trait Scorer {
    fn is_ready(&self) -> bool {
        true
    }

    fn header_line(&self) -> String;

    fn footer_line(&self) -> String;

    fn reset_scores(&mut self);

    fn calculate_scores(&mut self, record: &ActionRecord, world: &ReplayWorld);

    fn current_line(&self) -> String;

    /// File stem for the step capture, when captures are enabled.
    fn capture_name(&self) -> String;
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open output {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write output {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode capture '{name}': {source}")]
    EncodeCapture {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

pub trait Sink {
    fn open(&mut self, header: &str) -> Result<(), SinkError>;

    fn is_opened(&self) -> bool;

    fn write(&mut self, line: &str) -> Result<(), SinkError>;

    fn close(&mut self, footer: &str) -> Result<(), SinkError>;

    fn capture_auxiliary(&mut self, name: &str, capture: &SceneCapture) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedEntity {
    pub id: u64,
    pub name: String,
    pub template_key: String,
    pub role: Role,
    pub position: Vec2,
    pub rotation_degrees: f32,
    pub at_rest: bool,
    pub world_tag: Option<String>,
    pub extra_tags: Vec<String>,
    pub touching: Vec<u64>,
}

/// Serializable picture of the world after a step settled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneCapture {
    pub transaction_id: String,
    pub user_id: String,
    pub selection: String,
    pub action: String,
    pub entities: Vec<CapturedEntity>,
}

impl SceneCapture {
    pub fn from_world(world: &ReplayWorld, record: &ActionRecord) -> Self {
        let registry = world.registry();
        let entities = world
            .entities()
            .iter()
            .filter(|entity| registry.contains(entity.id))
            .map(|entity| CapturedEntity {
                id: entity.id.0,
                name: entity.name.clone(),
                template_key: entity.template_key.clone(),
                role: registry.role_of(entity.id),
                position: entity.transform.position,
                rotation_degrees: entity.transform.rotation_degrees,
                at_rest: entity.is_at_rest(),
                world_tag: registry.world_tag(entity.id).map(str::to_string),
                extra_tags: registry.extra_tags(entity.id).to_vec(),
                touching: entity.touching().map(|id| id.0).collect(),
            })
            .collect();
        Self {
            transaction_id: record.transaction_id().to_string(),
            user_id: record.user_id().to_string(),
            selection: record.selection().to_string(),
            action: record.action().to_string(),
            entities,
        }
    }
}
