mod atomic_io;
mod config;
mod engine;
mod hooks;
mod output;
mod sink;
mod stopping;


pub use config::{
    IterationMode, ReplayConfig, StoppingConfig, DEFAULT_SETTLE_TIMEOUT, MAX_TIME_ACCELERATION,
};
pub use engine::{
    EnginePhase, ReplayComponents, ReplayEngine, ReplayError, ReplaySummary, SpawnCounts,
    StepReport,
};
pub use hooks::{ActionFilter, NoopHooks, ReplayHooks};
pub use output::{CapturedEntity, SceneCapture, Scorer, Sink, SinkError};
pub use sink::TextFileSink;
pub use stopping::{SettlePoll, SettleReason, SettleWait, StoppingPolicy};
