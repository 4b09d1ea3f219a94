//! What the client does when the chat socket drops.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Reconnect policy for an unexpectedly closed socket.
///
/// `Never` leaves the socket closed until the caller reconnects explicitly.
/// `Backoff` retries with exponential delays, capped, and gives up after
/// `max_attempts`. A close the client asked for is never retried.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    #[default]
    Never,
    Backoff {
        max_attempts: u32,
        #[serde(default = "default_initial_delay_ms")]
        initial_delay_ms: u64,
        #[serde(default = "default_max_delay_ms")]
        max_delay_ms: u64,
    },
}

impl ReconnectPolicy {
    pub fn backoff(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self::Backoff {
            max_attempts,
            initial_delay_ms: initial_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, ReconnectPolicy::Never)
    }

    /// Base delay before reconnect attempt `attempt` (1-based).
    ///
    /// Returns `None` once attempts are exhausted, and always for `Never`.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match *self {
            ReconnectPolicy::Never => None,
            ReconnectPolicy::Backoff {
                max_attempts,
                initial_delay_ms,
                max_delay_ms,
            } => {
                if attempt == 0 || attempt > max_attempts {
                    return None;
                }
                let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
                let delay = initial_delay_ms.saturating_mul(factor).min(max_delay_ms);
                Some(Duration::from_millis(delay))
            }
        }
    }

    /// Like [`delay_for`](Self::delay_for) with up to 20% random jitter,
    /// still capped at the maximum delay.
    pub fn jittered_delay(&self, attempt: u32) -> Option<Duration> {
        let base = self.delay_for(attempt)?;
        let ReconnectPolicy::Backoff { max_delay_ms, .. } = *self else {
            return Some(base);
        };
        let base_ms = base.as_millis() as u64;
        let jitter = rand::thread_rng().gen_range(0..=base_ms / 5);
        Some(Duration::from_millis(
            base_ms.saturating_add(jitter).min(max_delay_ms),
        ))
    }
}
