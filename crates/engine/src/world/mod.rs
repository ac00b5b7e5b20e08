mod registry;
mod scene;

pub use registry::{EntityRegistry, Role, TagSpace};
pub use scene::{
    BodyKind, BodyMotion, ContactEvent, EntityId, EntityIdAllocator, EntitySpawn, PhysicalBody,
    ReplayEntity, ReplayWorld, Transform, Vec2, MOTION_REST_EPSILON,
};
