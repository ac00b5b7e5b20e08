use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(20);
pub const MAX_TIME_ACCELERATION: f32 = 1_000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationMode {
    #[default]
    ActionByAction,
    FinalStatesOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoppingConfig {
    #[default]
    Instant,
    WaitUntilAtRest {
        #[serde(default = "default_settle_timeout_ms")]
        timeout_ms: u64,
    },
    FixedDelay {
        delay_ms: u64,
    },
}

fn default_settle_timeout_ms() -> u64 {
    DEFAULT_SETTLE_TIMEOUT.as_millis() as u64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplayConfig {
    pub iteration_mode: IterationMode,
    pub stopping: StoppingConfig,
    pub time_acceleration: f32,
    pub pause_every: Option<u64>,
    pub replay_action_entities: bool,
    pub capture_steps: bool,
    pub record_touching: bool,
    pub prepare_give_up_after_ms: Option<u64>,
    pub skip_actions: Vec<String>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            iteration_mode: IterationMode::ActionByAction,
            stopping: StoppingConfig::Instant,
            time_acceleration: 1.0,
            pause_every: None,
            replay_action_entities: false,
            capture_steps: false,
            record_touching: true,
            prepare_give_up_after_ms: None,
            skip_actions: Vec::new(),
        }
    }
}

impl ReplayConfig {
    /// Simulated-time multiplier while settling, within
    /// `1..=MAX_TIME_ACCELERATION`.
    pub fn effective_time_acceleration(&self) -> f32 {
        if self.time_acceleration.is_finite() && self.time_acceleration > 1.0 {
            self.time_acceleration.min(MAX_TIME_ACCELERATION)
        } else {
            1.0
        }
    }

    pub fn effective_pause_every(&self) -> Option<u64> {
        self.pause_every.filter(|steps| *steps > 0)
    }

    pub fn prepare_give_up_after(&self) -> Option<Duration> {
        self.prepare_give_up_after_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config: ReplayConfig = serde_json::from_str("{}").expect("config");
        assert_eq!(config, ReplayConfig::default());
    }

    #[test]
    fn reads_tagged_stopping_policy() {
        let config: ReplayConfig = serde_json::from_str(
            r#"{
                "iteration_mode": "final_states_only",
                "stopping": { "kind": "wait_until_at_rest" },
                "time_acceleration": 4.0,
                "pause_every": 10,
                "skip_actions": ["Hover"]
            }"#,
        )
        .expect("config");

        assert_eq!(config.iteration_mode, IterationMode::FinalStatesOnly);
        assert_eq!(
            config.stopping,
            StoppingConfig::WaitUntilAtRest { timeout_ms: 20_000 }
        );
        assert_eq!(config.effective_time_acceleration(), 4.0);
        assert_eq!(config.effective_pause_every(), Some(10));
        assert_eq!(config.skip_actions, vec!["Hover".to_string()]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_str::<ReplayConfig>(r#"{ "speed": 2 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn acceleration_and_pause_are_clamped() {
        let config = ReplayConfig {
            time_acceleration: 0.25,
            pause_every: Some(0),
            ..ReplayConfig::default()
        };
        assert_eq!(config.effective_time_acceleration(), 1.0);
        assert_eq!(config.effective_pause_every(), None);

        let config = ReplayConfig {
            time_acceleration: f32::NAN,
            ..ReplayConfig::default()
        };
        assert_eq!(config.effective_time_acceleration(), 1.0);

        let config = ReplayConfig {
            time_acceleration: 1.0e30,
            ..ReplayConfig::default()
        };
        assert_eq!(config.effective_time_acceleration(), MAX_TIME_ACCELERATION);
    }
}
