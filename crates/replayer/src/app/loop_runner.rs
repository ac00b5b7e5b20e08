use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use replay_engine::{EnginePhase, ReplayEngine, ReplayError};
use thiserror::Error;
use tracing::{debug, error, info};

use super::bootstrap::{HostConfig, ReplayWiring, DEFAULT_TICK_MS};

#[derive(Debug, Error)]
pub(crate) enum LoopError {
    #[error(transparent)]
    Replay(#[from] ReplayError),
    #[error("replay still had work after {ticks} ticks")]
    TickLimit { ticks: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LoopOutcome {
    pub(crate) ticks: u64,
    pub(crate) steps: u64,
    pub(crate) checkpoints: u64,
}

pub(crate) fn run(wiring: ReplayWiring) -> ExitCode {
    let ReplayWiring {
        mut engine,
        host,
        out_path,
    } = wiring;

    let outcome = match drive(&mut engine, &host) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(error = %err, "replay_failed");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = engine.shutdown() {
        error!(error = %err, "replay_shutdown_failed");
        return ExitCode::FAILURE;
    }

    let summary = engine.summary();
    info!(
        out = %out_path.display(),
        ticks = outcome.ticks,
        steps = outcome.steps,
        checkpoints = outcome.checkpoints,
        records_skipped = summary.records_skipped,
        entities_skipped = summary.entities_skipped,
        "replay_complete"
    );
    ExitCode::SUCCESS
}

/// Ticks the engine with a fixed frame length until the log is drained.
/// A pause checkpoint is logged and the run resumed, so every record gets
/// visited in one invocation.
pub(crate) fn drive(
    engine: &mut ReplayEngine,
    host: &HostConfig,
) -> Result<LoopOutcome, LoopError> {
    let fixed_dt = normalize_non_zero_duration(
        Duration::from_millis(host.tick_ms),
        Duration::from_millis(DEFAULT_TICK_MS),
    );
    let max_ticks = host.max_ticks.unwrap_or(u64::MAX);
    let mut outcome = LoopOutcome::default();

    engine.run()?;
    loop {
        if engine.phase() == EnginePhase::Idle && !engine.is_running() {
            if !engine.has_work() {
                break;
            }
            outcome.checkpoints += 1;
            info!(
                steps_scored = engine.summary().steps_scored,
                checkpoint = outcome.checkpoints,
                "replay_checkpoint_resumed"
            );
            engine.run()?;
        }
        if outcome.ticks >= max_ticks {
            return Err(LoopError::TickLimit {
                ticks: outcome.ticks,
            });
        }

        let frame_start = Instant::now();
        if let Some(report) = engine.tick(fixed_dt)? {
            outcome.steps += 1;
            debug!(
                transaction_id = report.transaction_id.as_str(),
                action = report.action.as_str(),
                settle_reason = ?report.settle_reason,
                settle_ms = report.settle_elapsed.as_millis() as u64,
                spawned_state = report.spawned.state,
                spawned_action = report.spawned.action,
                skipped = report.spawned.skipped,
                "step_scored"
            );
        }
        outcome.ticks += 1;

        if host.realtime {
            let sleep_for = compute_frame_sleep(frame_start.elapsed(), fixed_dt);
            if !sleep_for.is_zero() {
                thread::sleep(sleep_for);
            }
        }
    }

    Ok(outcome)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn compute_frame_sleep(elapsed: Duration, target: Duration) -> Duration {
    target.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use replay_engine::{
        format_log, format_object, EntityDescriptor, Pose, RawActionFields, Transform, Vec2,
    };
    use tempfile::TempDir;

    use super::*;
    use crate::app::bootstrap::wire_replay;
    use crate::app::cli::CliOptions;

    const TEMPLATES: &str = r#"<Templates>
  <Template><key>Box</key><body>Dynamic</body></Template>
  <Template><key>Ball</key><body>Dynamic</body></Template>
  <Template><key>Crate</key><body>Dynamic</body></Template>
</Templates>"#;

    fn object(name: &str, x: f32) -> String {
        format_object(&EntityDescriptor {
            name: name.to_string(),
            template: None,
            world_tag: None,
            extra_tags: Vec::new(),
            pose: Pose {
                transform: Transform {
                    position: Vec2::new(x, 0.0),
                    rotation_degrees: 0.0,
                },
                velocity: None,
                angular_velocity: None,
            },
        })
    }

    fn row(transaction: &str, attempt: u32, action: &str, state: String) -> RawActionFields {
        RawActionFields {
            selection: "Ball".to_string(),
            action: action.to_string(),
            input: String::new(),
            state,
            time: "2019-09-09 09:09:09.009".to_string(),
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            transaction_id: transaction.to_string(),
            level_name: "L1".to_string(),
            attempt_number: attempt.to_string(),
        }
    }

    fn write_fixture(temp: &TempDir, rows: &[RawActionFields]) -> CliOptions {
        let log_path = temp.path().join("session.xml");
        fs::write(&log_path, format_log(rows)).expect("write log");
        let templates_path = temp.path().join("templates.xml");
        fs::write(&templates_path, TEMPLATES).expect("write templates");
        CliOptions {
            log_path,
            templates_path: Some(templates_path),
            ..CliOptions::default()
        }
    }

    fn three_steps() -> Vec<RawActionFields> {
        vec![
            row("t1", 1, "Drop", object("Box", 1.0)),
            row("t2", 1, "Drop", object("Box", 2.0) + &object("Crate", 3.0)),
            row("t3", 2, "Drop", object("Box", 4.0)),
        ]
    }

    fn data_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .expect("read scores")
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn drives_log_to_completion_and_writes_scores() {
        let temp = TempDir::new().expect("temp");
        let options = write_fixture(&temp, &three_steps());
        let ReplayWiring {
            mut engine,
            host,
            out_path,
        } = wire_replay(&options).expect("wiring");

        let outcome = drive(&mut engine, &host).expect("drive");
        engine.shutdown().expect("shutdown");

        assert_eq!(outcome.steps, 3);
        assert_eq!(outcome.checkpoints, 0);
        let lines = data_lines(&out_path);
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("transaction_id,"));
        assert!(lines[1].starts_with("t1,u1,s1,L1,1,2019-09-09 09:09:09.009,Ball,Drop,1,0,0,"));
        assert!(lines[2].starts_with("t2,u1,s1,L1,1,"));
        assert!(lines[2].contains(",Drop,2,0,0,"));
        assert!(lines[3].starts_with("t3,u1,s1,L1,2,"));
        assert_eq!(lines[4], "# steps=3");
    }

    #[test]
    fn resumes_after_pause_checkpoints() {
        let temp = TempDir::new().expect("temp");
        let options = CliOptions {
            pause_every: Some(1),
            ..write_fixture(&temp, &three_steps())
        };
        let mut wiring = wire_replay(&options).expect("wiring");

        let outcome = drive(&mut wiring.engine, &wiring.host).expect("drive");

        assert_eq!(outcome.steps, 3);
        assert_eq!(outcome.checkpoints, 2);
    }

    #[test]
    fn final_states_only_scores_last_record_per_attempt() {
        let temp = TempDir::new().expect("temp");
        let options = CliOptions {
            final_states: true,
            ..write_fixture(&temp, &three_steps())
        };
        let mut wiring = wire_replay(&options).expect("wiring");

        let outcome = drive(&mut wiring.engine, &wiring.host).expect("drive");
        wiring.engine.shutdown().expect("shutdown");

        assert_eq!(outcome.steps, 2);
        let lines = data_lines(&wiring.out_path);
        assert!(lines[1].starts_with("t2,"));
        assert!(lines[2].starts_with("t3,"));
    }

    #[test]
    fn skipped_actions_are_not_scored() {
        let temp = TempDir::new().expect("temp");
        let mut rows = three_steps();
        rows[1].action = "Hover".to_string();
        let options = CliOptions {
            skip_actions: vec!["Hover".to_string()],
            ..write_fixture(&temp, &rows)
        };
        let mut wiring = wire_replay(&options).expect("wiring");

        let outcome = drive(&mut wiring.engine, &wiring.host).expect("drive");

        assert_eq!(outcome.steps, 2);
        assert_eq!(wiring.engine.summary().records_skipped, 1);
    }

    #[test]
    fn missing_log_fails_before_ticking() {
        let temp = TempDir::new().expect("temp");
        let mut options = write_fixture(&temp, &three_steps());
        options.log_path = temp.path().join("absent.xml");
        let mut wiring = wire_replay(&options).expect("wiring");

        let err = drive(&mut wiring.engine, &wiring.host).expect_err("missing log");
        assert!(matches!(err, LoopError::Replay(ReplayError::Source(_))));
        assert_eq!(wiring.engine.phase(), EnginePhase::Uninitialized);
    }

    #[test]
    fn tick_limit_stops_a_replay_that_never_drains() {
        let temp = TempDir::new().expect("temp");
        let options = CliOptions {
            fixed_delay_ms: Some(60_000),
            ..write_fixture(&temp, &three_steps())
        };
        let mut wiring = wire_replay(&options).expect("wiring");
        let host = HostConfig {
            max_ticks: Some(10),
            ..wiring.host
        };

        let err = drive(&mut wiring.engine, &host).expect_err("limit");
        assert!(matches!(err, LoopError::TickLimit { ticks: 10 }));
    }

    #[test]
    fn frame_sleep_covers_remaining_budget_only() {
        let target = Duration::from_millis(16);
        assert_eq!(
            compute_frame_sleep(Duration::from_millis(10), target),
            Duration::from_millis(6)
        );
        assert_eq!(
            compute_frame_sleep(Duration::from_millis(20), target),
            Duration::ZERO
        );
    }

    #[test]
    fn zero_tick_length_falls_back_to_default() {
        let fallback = Duration::from_millis(DEFAULT_TICK_MS);
        assert_eq!(normalize_non_zero_duration(Duration::ZERO, fallback), fallback);
        assert_eq!(
            normalize_non_zero_duration(Duration::from_millis(5), fallback),
            Duration::from_millis(5)
        );
    }
}
