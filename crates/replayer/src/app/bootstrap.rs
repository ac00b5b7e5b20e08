use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use replay_engine::{
    compile_template_catalogue, CatalogueCompileError, CatalogueFactory, IterationMode,
    ReplayComponents, ReplayConfig, ReplayEngine, StoppingConfig, TextFileSink, XmlLogSource,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::cli::CliOptions;
use super::scoring::TallyScorer;

const CONFIG_ENV_VAR: &str = "REPLAYER_CONFIG";
pub(crate) const DEFAULT_TICK_MS: u64 = 16;

/// File-level configuration: engine settings plus how the host drives them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ReplayerConfig {
    pub(crate) replay: ReplayConfig,
    pub(crate) host: HostConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct HostConfig {
    pub(crate) tick_ms: u64,
    pub(crate) realtime: bool,
    /// Hard stop for a replay that never drains, e.g. a settle wait that
    /// never completes.
    pub(crate) max_ticks: Option<u64>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            realtime: false,
            max_ticks: None,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error("failed to read config {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {path}: {message}")]
    InvalidConfig { path: PathBuf, message: String },
    #[error("no template catalogue given (use --templates <file>)")]
    MissingTemplates,
    #[error(transparent)]
    Catalogue(#[from] CatalogueCompileError),
}

pub(crate) struct ReplayWiring {
    pub(crate) engine: ReplayEngine,
    pub(crate) host: HostConfig,
    pub(crate) out_path: PathBuf,
}

pub(crate) fn build_app(options: &CliOptions) -> Result<ReplayWiring, BootstrapError> {
    init_tracing();
    info!("=== Replayer Startup ===");
    wire_replay(options)
}

pub(crate) fn wire_replay(options: &CliOptions) -> Result<ReplayWiring, BootstrapError> {
    let config_path = options
        .config_path
        .clone()
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
    let mut config = match &config_path {
        Some(path) => load_config(path)?,
        None => ReplayerConfig::default(),
    };
    apply_cli_overrides(&mut config, options);

    let templates_path = options
        .templates_path
        .as_deref()
        .ok_or(BootstrapError::MissingTemplates)?;
    let catalogue = compile_template_catalogue(templates_path)?;

    let out_path = options
        .out_path
        .clone()
        .unwrap_or_else(|| default_output_path(&options.log_path));
    let mut sink = TextFileSink::new(&out_path);
    if let Some(capture_dir) = &options.capture_dir {
        sink = sink.with_capture_dir(capture_dir);
    }

    let config_label = config_path
        .as_deref()
        .map(|path| path.display().to_string())
        .unwrap_or_default();
    info!(
        log = %options.log_path.display(),
        templates = %templates_path.display(),
        out = %out_path.display(),
        config = config_label.as_str(),
        iteration_mode = ?config.replay.iteration_mode,
        stopping = ?config.replay.stopping,
        tick_ms = config.host.tick_ms,
        "replay_wired"
    );

    let components = ReplayComponents::new(
        Box::new(XmlLogSource::from_path(&options.log_path)),
        Box::new(CatalogueFactory::new(catalogue)),
        Box::new(TallyScorer::new()),
        Box::new(sink),
    );
    Ok(ReplayWiring {
        engine: ReplayEngine::new(components, config.replay),
        host: config.host,
        out_path,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

pub(crate) fn load_config(path: &Path) -> Result<ReplayerConfig, BootstrapError> {
    let raw = fs::read_to_string(path).map_err(|source| BootstrapError::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(path, &raw)
}

fn parse_config(path: &Path, raw: &str) -> Result<ReplayerConfig, BootstrapError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, ReplayerConfig>(&mut deserializer).map_err(|error| {
        let field_path = error.path().to_string();
        let inner = error.into_inner();
        let message = if field_path.is_empty() || field_path == "." {
            inner.to_string()
        } else {
            format!("at {field_path}: {inner}")
        };
        BootstrapError::InvalidConfig {
            path: path.to_path_buf(),
            message,
        }
    })
}

/// Flags given on the command line win over the config file.
fn apply_cli_overrides(config: &mut ReplayerConfig, options: &CliOptions) {
    let replay = &mut config.replay;
    if options.final_states {
        replay.iteration_mode = IterationMode::FinalStatesOnly;
    }
    if options.with_actions {
        replay.replay_action_entities = true;
    }
    if options.capture {
        replay.capture_steps = true;
    }
    if let Some(timeout_ms) = options.wait_at_rest_ms {
        replay.stopping = StoppingConfig::WaitUntilAtRest { timeout_ms };
    }
    if let Some(delay_ms) = options.fixed_delay_ms {
        replay.stopping = StoppingConfig::FixedDelay { delay_ms };
    }
    if let Some(acceleration) = options.acceleration {
        replay.time_acceleration = acceleration;
    }
    if let Some(pause_every) = options.pause_every {
        replay.pause_every = Some(pause_every);
    }
    for action in &options.skip_actions {
        if !replay.skip_actions.contains(action) {
            replay.skip_actions.push(action.clone());
        }
    }

    if let Some(tick_ms) = options.tick_ms {
        config.host.tick_ms = tick_ms;
    }
    if options.realtime {
        config.host.realtime = true;
    }
}

/// `<log stem>.scores.csv` next to the log.
pub(crate) fn default_output_path(log_path: &Path) -> PathBuf {
    log_path.with_extension("scores.csv")
}
