pub mod content;
pub mod record;
pub mod replay;
pub mod source;
pub mod world;

pub use content::{
    compile_template_catalogue, parse_template_catalogue, CatalogueCompileError,
    CatalogueErrorCode, CatalogueFactory, EntityFactory, EntityTemplate, SourceLocation,
    SpawnContext, SpawnError, TemplateCatalogue, TemplateId, TemplateKeyResolver,
};
pub use record::{
    format_event, format_log, format_object, format_time, ActionRecord, AttemptKey,
    DescriptorError, EntityDescriptor, Pose, RawActionFields, SnapshotNode, SnapshotParseError,
    NO_TEMPLATE_TAG, NO_WORLD_TAG, START_STATE_ACTION, STATE_ACTION, TIME_FORMAT,
};
pub use replay::{
    ActionFilter, CapturedEntity, EnginePhase, IterationMode, NoopHooks, ReplayComponents,
    ReplayConfig, ReplayEngine, ReplayError, ReplayHooks, ReplaySummary, SceneCapture, Scorer,
    SettlePoll, SettleReason, SettleWait, Sink, SinkError, SpawnCounts, StepReport,
    StoppingConfig, StoppingPolicy, TextFileSink, DEFAULT_SETTLE_TIMEOUT, MAX_TIME_ACCELERATION,
};
pub use source::{
    parse_log_events, LogSource, LogSourceError, RecordWindow, VecLogSource, XmlLogSource,
};
pub use world::{
    BodyKind, BodyMotion, ContactEvent, EntityId, EntityRegistry, EntitySpawn, PhysicalBody,
    ReplayEntity, ReplayWorld, Role, TagSpace, Transform, Vec2,
};
