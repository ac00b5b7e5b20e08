use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::{IterationMode, ReplayConfig};
use super::hooks::{ActionFilter, NoopHooks, ReplayHooks};
use super::output::{SceneCapture, Scorer, Sink, SinkError};
use super::stopping::{SettlePoll, SettleReason, StoppingPolicy};
use crate::content::{EntityFactory, SpawnContext};
use crate::record::{ActionRecord, EntityDescriptor, SnapshotNode, NAME_ELEMENT, OBJECT_ELEMENT};
use crate::source::{LogSource, LogSourceError};
use crate::world::{BodyMotion, ContactEvent, EntityId, EntitySpawn, ReplayWorld, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Uninitialized,
    Preparing,
    Idle,
    Reconstructing,
    Settling,
    Scored,
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to load log source: {0}")]
    Source(#[from] LogSourceError),
    #[error("output sink failed: {0}")]
    Sink(#[from] SinkError),
    #[error(
        "gave up preparing after {waited_ms} ms (sink_opened={sink_opened}, \
         source_loaded={source_loaded}, scorer_ready={scorer_ready}, hooks_ready={hooks_ready})"
    )]
    PrepareGaveUp {
        waited_ms: u128,
        sink_opened: bool,
        source_loaded: bool,
        scorer_ready: bool,
        hooks_ready: bool,
    },
}

/// The collaborators an engine drives.
pub struct ReplayComponents {
    pub source: Box<dyn LogSource>,
    pub factory: Box<dyn EntityFactory>,
    pub scorer: Box<dyn Scorer>,
    pub sink: Box<dyn Sink>,
    pub hooks: Box<dyn ReplayHooks>,
}

impl ReplayComponents {
    pub fn new(
        source: Box<dyn LogSource>,
        factory: Box<dyn EntityFactory>,
        scorer: Box<dyn Scorer>,
        sink: Box<dyn Sink>,
    ) -> Self {
        Self {
            source,
            factory,
            scorer,
            sink,
            hooks: Box::new(NoopHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Box<dyn ReplayHooks>) -> Self {
        self.hooks = hooks;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnCounts {
    pub state: usize,
    pub action: usize,
    pub start_state: usize,
    pub skipped: usize,
}

/// Outcome of one scored step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub transaction_id: String,
    pub selection: String,
    pub action: String,
    pub spawned: SpawnCounts,
    pub settle_reason: SettleReason,
    pub settle_elapsed: Duration,
    pub line: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub records_visited: u64,
    pub records_skipped: u64,
    pub steps_scored: u64,
    pub entities_spawned: u64,
    pub entities_skipped: u64,
}

#[derive(Debug)]
struct SettleState {
    record: Arc<ActionRecord>,
    tracked: Vec<EntityId>,
    elapsed: Duration,
    spawned: SpawnCounts,
}

/// Drives a log source through reconstruct, settle and score, one record at
/// a time.
pub struct ReplayEngine {
    source: Box<dyn LogSource>,
    factory: Box<dyn EntityFactory>,
    scorer: Box<dyn Scorer>,
    sink: Box<dyn Sink>,
    hooks: Box<dyn ReplayHooks>,
    stopping: StoppingPolicy,
    config: ReplayConfig,
    filter: ActionFilter,
    world: ReplayWorld,
    phase: EnginePhase,
    running: bool,
    steps_since_run: u64,
    preparing_elapsed: Duration,
    sink_opened: bool,
    settle: Option<SettleState>,
    spawned_start_state: Option<Arc<ActionRecord>>,
    last_visited: Arc<ActionRecord>,
    summary: ReplaySummary,
}

impl ReplayEngine {
    pub fn new(components: ReplayComponents, config: ReplayConfig) -> Self {
        let mut world = ReplayWorld::new();
        world.set_record_touching_default(config.record_touching);
        Self {
            source: components.source,
            factory: components.factory,
            scorer: components.scorer,
            sink: components.sink,
            hooks: components.hooks,
            stopping: StoppingPolicy::from(config.stopping),
            filter: ActionFilter::new(config.skip_actions.iter().cloned()),
            config,
            world,
            phase: EnginePhase::Uninitialized,
            running: false,
            steps_since_run: 0,
            preparing_elapsed: Duration::ZERO,
            sink_opened: false,
            settle: None,
            spawned_start_state: None,
            last_visited: ActionRecord::null(),
            summary: ReplaySummary::default(),
        }
    }

    /// Replaces the policy built from the config, e.g. with a custom wait.
    pub fn with_stopping_policy(mut self, policy: StoppingPolicy) -> Self {
        self.stopping = policy;
        self
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_prepared(&self) -> bool {
        !matches!(self.phase, EnginePhase::Uninitialized | EnginePhase::Preparing)
    }

    /// Whether a step can be started now or later: the log still has
    /// records or a step is in flight.
    pub fn has_work(&self) -> bool {
        self.settle.is_some() || (self.source.is_loaded() && self.source.has_next())
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub fn stopping_policy(&self) -> &StoppingPolicy {
        &self.stopping
    }

    pub fn world(&self) -> &ReplayWorld {
        &self.world
    }

    pub fn source(&self) -> &dyn LogSource {
        self.source.as_ref()
    }

    pub fn filter(&self) -> &ActionFilter {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut ActionFilter {
        &mut self.filter
    }

    pub fn summary(&self) -> ReplaySummary {
        self.summary
    }

    /// Simulation speed the host should run at: the acceleration while
    /// settling, paused while idle.
    pub fn time_scale(&self) -> f32 {
        match self.phase {
            EnginePhase::Settling => self.config.effective_time_acceleration(),
            EnginePhase::Reconstructing | EnginePhase::Scored => 1.0,
            EnginePhase::Uninitialized | EnginePhase::Preparing | EnginePhase::Idle => 0.0,
        }
    }

    /// Loads the source and opens the sink. A failure leaves the engine
    /// uninitialized so the call can be retried.
    pub fn prepare(&mut self) -> Result<(), ReplayError> {
        if self.phase != EnginePhase::Uninitialized {
            return Ok(());
        }
        if let Err(error) = self.source.load() {
            warn!(error = %error, "prepare_source_failed");
            return Err(error.into());
        }
        let header = self.scorer.header_line();
        if let Err(error) = self.sink.open(&header) {
            warn!(error = %error, "prepare_sink_failed");
            return Err(error.into());
        }
        self.sink_opened = true;
        self.phase = EnginePhase::Preparing;
        self.preparing_elapsed = Duration::ZERO;
        info!(has_records = self.source.has_next(), "replay_preparing");
        self.poll_prepared(Duration::ZERO)
    }

    fn poll_prepared(&mut self, dt: Duration) -> Result<(), ReplayError> {
        let sink_opened = self.sink.is_opened();
        let source_loaded = self.source.is_loaded();
        let scorer_ready = self.scorer.is_ready();
        let hooks_ready = self.hooks.is_ready();
        if sink_opened && source_loaded && scorer_ready && hooks_ready {
            self.phase = EnginePhase::Idle;
            info!(
                waited_ms = self.preparing_elapsed.as_millis() as u64,
                "replay_ready"
            );
            return Ok(());
        }

        self.preparing_elapsed += dt;
        let Some(limit) = self.config.prepare_give_up_after() else {
            return Ok(());
        };
        if self.preparing_elapsed < limit {
            return Ok(());
        }
        let error = ReplayError::PrepareGaveUp {
            waited_ms: self.preparing_elapsed.as_millis(),
            sink_opened,
            source_loaded,
            scorer_ready,
            hooks_ready,
        };
        warn!(error = %error, "prepare_gave_up");
        self.close_sink("")?;
        self.phase = EnginePhase::Uninitialized;
        self.running = false;
        Err(error)
    }

    /// Starts continuous stepping, preparing first if needed.
    pub fn run(&mut self) -> Result<(), ReplayError> {
        if self.running {
            return Ok(());
        }
        if self.phase == EnginePhase::Uninitialized {
            self.prepare()?;
        }
        self.steps_since_run = 0;
        self.running = self.source.has_next();
        info!(running = self.running, "replay_run");
        Ok(())
    }

    /// Stops continuous stepping. A step already settling still completes.
    pub fn pause(&mut self) {
        if self.running {
            info!("replay_paused");
        }
        self.running = false;
    }

    /// Replays the next record by hand. Only acts while idle; before
    /// preparation it prepares instead.
    pub fn run_step(&mut self) -> Result<Option<StepReport>, ReplayError> {
        match self.phase {
            EnginePhase::Uninitialized => {
                self.prepare()?;
                return Ok(None);
            }
            EnginePhase::Idle => {}
            _ => {
                debug!(phase = ?self.phase, "run_step_rejected");
                return Ok(None);
            }
        }
        if !self.source.has_next() {
            return Ok(None);
        }
        self.advance_source();
        self.visit_current()
    }

    /// Advances the engine by one host frame. Returns a report when a step
    /// was scored during this frame.
    pub fn tick(&mut self, dt: Duration) -> Result<Option<StepReport>, ReplayError> {
        match self.phase {
            EnginePhase::Preparing => {
                self.poll_prepared(dt)?;
                Ok(None)
            }
            EnginePhase::Settling => self.poll_settle(dt),
            EnginePhase::Idle if self.running => self.auto_step(),
            _ => Ok(None),
        }
    }

    fn auto_step(&mut self) -> Result<Option<StepReport>, ReplayError> {
        if !self.source.has_next() {
            self.running = false;
            info!(steps_scored = self.summary.steps_scored, "replay_exhausted");
            return Ok(None);
        }
        self.advance_source();
        let report = self.visit_current();

        self.steps_since_run += 1;
        if let Some(limit) = self.config.effective_pause_every() {
            if self.steps_since_run >= limit {
                self.running = false;
                info!(steps = self.steps_since_run, "replay_pause_checkpoint");
            }
        }
        if !self.source.has_next() {
            self.running = false;
        }
        report
    }

    fn advance_source(&mut self) {
        self.source.advance();
        if self.config.iteration_mode == IterationMode::FinalStatesOnly {
            while self.source.has_next()
                && self.source.peek_next().is_same_attempt(self.source.current())
            {
                self.source.advance();
            }
        }
    }

    fn visit_current(&mut self) -> Result<Option<StepReport>, ReplayError> {
        let record = Arc::clone(self.source.current());
        if record.is_null() {
            return Ok(None);
        }
        self.summary.records_visited += 1;

        if !record.is_same_attempt(&self.last_visited) {
            let start_state = Arc::clone(self.source.last_start_state());
            debug!(
                user_id = %record.user_id(),
                attempt = record.attempt_number(),
                "attempt_started"
            );
            self.hooks.on_new_attempt(&start_state);
        }
        self.last_visited = Arc::clone(&record);

        let filtered = self.filter.should_skip(&record);
        if filtered || self.hooks.should_skip(&record) {
            self.summary.records_skipped += 1;
            debug!(
                action = %record.action(),
                transaction_id = %record.transaction_id(),
                "record_skipped"
            );
            return Ok(None);
        }
        self.begin_step(record)
    }

    fn begin_step(&mut self, record: Arc<ActionRecord>) -> Result<Option<StepReport>, ReplayError> {
        self.phase = EnginePhase::Reconstructing;
        self.scorer.reset_scores();
        self.hooks.on_step_pre(&record);

        self.hooks.before_clear_state(&self.world);
        self.world.clear_role(Role::State);
        self.hooks.before_clear_action(&self.world);
        self.world.clear_role(Role::Action);

        let mut spawned = SpawnCounts::default();
        self.reconstruct_start_state(&mut spawned);
        self.reconstruct_state(&record, &mut spawned);
        if self.config.replay_action_entities {
            self.reconstruct_action(&record, &mut spawned);
        }
        self.world.apply_pending();
        self.hooks.on_step_post(&record, &self.world);

        let mut tracked = self.world.ids_with_role(Role::State);
        tracked.extend(self.world.ids_with_role(Role::Action));
        debug!(
            transaction_id = %record.transaction_id(),
            state_entities = spawned.state,
            action_entities = spawned.action,
            start_state_entities = spawned.start_state,
            skipped_entities = spawned.skipped,
            "step_reconstructed"
        );

        self.stopping.begin(&record);
        self.settle = Some(SettleState {
            record,
            tracked,
            elapsed: Duration::ZERO,
            spawned,
        });
        self.phase = EnginePhase::Settling;
        self.poll_settle(Duration::ZERO)
    }

    fn reconstruct_start_state(&mut self, spawned: &mut SpawnCounts) {
        let start_state = Arc::clone(self.source.last_start_state());
        if start_state.is_null() {
            return;
        }
        if let Some(current) = &self.spawned_start_state {
            if Arc::ptr_eq(current, &start_state) {
                return;
            }
        }
        self.hooks.before_clear_start_state(&self.world);
        self.world.clear_role(Role::StartState);
        if let Some(snapshot) = start_state.state_snapshot() {
            for node in snapshot.children_named(OBJECT_ELEMENT) {
                let placed = self.spawn_from_node(node, &start_state, Role::StartState, None);
                count_spawn(spawned, placed, |counts| &mut counts.start_state);
            }
        }
        self.spawned_start_state = Some(start_state);
    }

    /// The acting entity is left out: it is matched by display name against
    /// the record's selection. A start-state record's objects are already
    /// placed under the start-state role.
    fn reconstruct_state(&mut self, record: &ActionRecord, spawned: &mut SpawnCounts) {
        if record.is_start_state() {
            return;
        }
        let Some(snapshot) = record.state_snapshot() else {
            return;
        };
        for node in snapshot.children_named(OBJECT_ELEMENT) {
            if node.child_text(NAME_ELEMENT) == Some(record.selection()) {
                continue;
            }
            let placed = self.spawn_from_node(node, record, Role::State, None);
            count_spawn(spawned, placed, |counts| &mut counts.state);
        }
    }

    fn reconstruct_action(&mut self, record: &ActionRecord, spawned: &mut SpawnCounts) {
        let Some(snapshot) = record.input_snapshot() else {
            return;
        };
        for node in snapshot.children_named(OBJECT_ELEMENT) {
            let placed = self.spawn_from_node(node, record, Role::Action, Some(record.selection()));
            count_spawn(spawned, placed, |counts| &mut counts.action);
        }
    }

    fn spawn_from_node(
        &mut self,
        node: &SnapshotNode,
        record: &ActionRecord,
        role: Role,
        fallback_name: Option<&str>,
    ) -> Option<EntityId> {
        let descriptor = match EntityDescriptor::from_node(node, fallback_name) {
            Ok(descriptor) => descriptor,
            Err(error) => {
                warn!(
                    role = ?role,
                    transaction_id = %record.transaction_id(),
                    error = %error,
                    "entity_spawn_skipped"
                );
                self.summary.entities_skipped += 1;
                return None;
            }
        };
        let context = SpawnContext { node, record };
        match self
            .factory
            .spawn(&mut self.world, &descriptor, &context, role)
        {
            Ok(id) => {
                self.hooks
                    .specialize_new_entity(&mut self.world, id, node, record);
                self.summary.entities_spawned += 1;
                Some(id)
            }
            Err(error) => {
                warn!(
                    role = ?role,
                    name = %descriptor.name,
                    transaction_id = %record.transaction_id(),
                    error = %error,
                    "entity_spawn_skipped"
                );
                self.summary.entities_skipped += 1;
                None
            }
        }
    }

    fn poll_settle(&mut self, dt: Duration) -> Result<Option<StepReport>, ReplayError> {
        let Some(settle) = self.settle.as_mut() else {
            return Ok(None);
        };
        let scaled = dt.as_secs_f32() * self.config.effective_time_acceleration();
        let advanced = Duration::try_from_secs_f32(scaled).unwrap_or(Duration::MAX);
        settle.elapsed = settle.elapsed.saturating_add(advanced);
        let poll = self
            .stopping
            .poll(settle.elapsed, &self.world, &settle.tracked);
        match poll {
            SettlePoll::Pending => Ok(None),
            SettlePoll::Settled(reason) => match self.settle.take() {
                Some(settle) => self.finish_step(settle, reason).map(Some),
                None => Ok(None),
            },
        }
    }

    fn finish_step(
        &mut self,
        settle: SettleState,
        reason: SettleReason,
    ) -> Result<StepReport, ReplayError> {
        self.phase = EnginePhase::Scored;
        let record = settle.record;
        self.hooks.on_settled(&record, &self.world);
        self.scorer.calculate_scores(&record, &self.world);

        if self.config.capture_steps {
            let capture = SceneCapture::from_world(&self.world, &record);
            let name = self.scorer.capture_name();
            if let Err(error) = self.sink.capture_auxiliary(&name, &capture) {
                warn!(name = %name, error = %error, "step_capture_failed");
            }
        }

        let line = self.scorer.current_line();
        let written = self.sink.write(&line);
        self.phase = EnginePhase::Idle;
        written?;

        self.summary.steps_scored += 1;
        info!(
            transaction_id = %record.transaction_id(),
            action = %record.action(),
            settle_reason = ?reason,
            settle_ms = settle.elapsed.as_millis() as u64,
            "step_scored"
        );
        Ok(StepReport {
            transaction_id: record.transaction_id().to_string(),
            selection: record.selection().to_string(),
            action: record.action().to_string(),
            spawned: settle.spawned,
            settle_reason: reason,
            settle_elapsed: settle.elapsed,
            line,
        })
    }

    /// Removes every replayed entity. Refused while a step is in flight.
    pub fn clear(&mut self) -> bool {
        if matches!(
            self.phase,
            EnginePhase::Reconstructing | EnginePhase::Settling | EnginePhase::Scored
        ) {
            return false;
        }
        self.hooks.before_clear_state(&self.world);
        self.world.clear_role(Role::State);
        self.hooks.before_clear_action(&self.world);
        self.world.clear_role(Role::Action);
        self.hooks.before_clear_start_state(&self.world);
        self.world.clear_role(Role::StartState);
        self.world.apply_pending();
        self.spawned_start_state = None;
        true
    }

    /// Registers an entity that exists in the scene independently of the
    /// log. It is never cleared between steps.
    pub fn adopt_pre_existing(&mut self, mut spawn: EntitySpawn) -> EntityId {
        spawn.role = Role::PreExisting;
        let id = self.world.spawn(spawn);
        debug!(entity_id = id.0, "pre_existing_adopted");
        id
    }

    /// Feeds observed body motion from the host's physics.
    pub fn update_body(&mut self, id: EntityId, motion: BodyMotion) -> bool {
        self.world.set_body_motion(id, motion)
    }

    pub fn record_contact(&mut self, event: ContactEvent) {
        self.world.apply_contact(event);
    }

    /// Closes the sink with the scorer's footer if this engine opened it.
    pub fn shutdown(&mut self) -> Result<(), ReplayError> {
        self.running = false;
        self.settle = None;
        if self.phase != EnginePhase::Uninitialized {
            info!(
                records_visited = self.summary.records_visited,
                records_skipped = self.summary.records_skipped,
                steps_scored = self.summary.steps_scored,
                entities_spawned = self.summary.entities_spawned,
                entities_skipped = self.summary.entities_skipped,
                "replay_shutdown"
            );
        }
        self.phase = EnginePhase::Uninitialized;
        let footer = self.scorer.footer_line();
        self.close_sink(&footer)
    }

    fn close_sink(&mut self, footer: &str) -> Result<(), ReplayError> {
        if !self.sink_opened {
            return Ok(());
        }
        self.sink_opened = false;
        self.sink.close(footer)?;
        Ok(())
    }
}

impl Drop for ReplayEngine {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown() {
            warn!(error = %error, "replay_shutdown_failed");
        }
    }
}

fn count_spawn(
    spawned: &mut SpawnCounts,
    placed: Option<EntityId>,
    bucket: impl FnOnce(&mut SpawnCounts) -> &mut usize,
) {
    match placed {
        Some(_) => *bucket(spawned) += 1,
        None => spawned.skipped += 1,
    }
}
