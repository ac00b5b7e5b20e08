use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::config::StoppingConfig;
use crate::record::ActionRecord;
use crate::world::{EntityId, ReplayWorld};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettleReason {
    Instant,
    AtRest,
    TimedOut,
    DelayElapsed,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePoll {
    Pending,
    Settled(SettleReason),
}

/// Host-defined completion rule for the settling phase.
pub trait SettleWait {
    fn begin(&mut self, _record: &ActionRecord) {}

    /// `elapsed` is simulated time since reconstruction finished, already
    /// scaled by the time acceleration.
    fn poll(&mut self, elapsed: Duration, world: &ReplayWorld, tracked: &[EntityId]) -> SettlePoll;
}

pub enum StoppingPolicy {
    Instant,
    WaitUntilAtRest { timeout: Duration },
    FixedDelay(Duration),
    Custom(Box<dyn SettleWait>),
}

impl fmt::Debug for StoppingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instant => f.write_str("Instant"),
            Self::WaitUntilAtRest { timeout } => f
                .debug_struct("WaitUntilAtRest")
                .field("timeout", timeout)
                .finish(),
            Self::FixedDelay(delay) => f.debug_tuple("FixedDelay").field(delay).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Default for StoppingPolicy {
    fn default() -> Self {
        Self::Instant
    }
}

impl From<StoppingConfig> for StoppingPolicy {
    fn from(config: StoppingConfig) -> Self {
        match config {
            StoppingConfig::Instant => Self::Instant,
            StoppingConfig::WaitUntilAtRest { timeout_ms } => Self::WaitUntilAtRest {
                timeout: Duration::from_millis(timeout_ms),
            },
            StoppingConfig::FixedDelay { delay_ms } => {
                Self::FixedDelay(Duration::from_millis(delay_ms))
            }
        }
    }
}

impl StoppingPolicy {
    pub(crate) fn begin(&mut self, record: &ActionRecord) {
        if let Self::Custom(wait) = self {
            wait.begin(record);
        }
    }

    /// Entities in `tracked` that no longer exist are ignored.
    pub(crate) fn poll(
        &mut self,
        elapsed: Duration,
        world: &ReplayWorld,
        tracked: &[EntityId],
    ) -> SettlePoll {
        match self {
            Self::Instant => SettlePoll::Settled(SettleReason::Instant),
            Self::WaitUntilAtRest { timeout } => {
                if world.all_at_rest(tracked) {
                    SettlePoll::Settled(SettleReason::AtRest)
                } else if elapsed >= *timeout {
                    SettlePoll::Settled(SettleReason::TimedOut)
                } else {
                    SettlePoll::Pending
                }
            }
            Self::FixedDelay(delay) => {
                if elapsed >= *delay {
                    SettlePoll::Settled(SettleReason::DelayElapsed)
                } else {
                    SettlePoll::Pending
                }
            }
            Self::Custom(wait) => wait.poll(elapsed, world, tracked),
        }
    }
}
