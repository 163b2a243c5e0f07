//! Client reconnect state machine.
//!
//! ```text
//! Disconnected ──begin_attempt──▶ Connecting ──on_connected──▶ Connected
//!      ▲                              │                            │
//!      └────────on_disconnected───────┴────────────────────────────┘
//!                                     │ (attempts exhausted)
//!                                     ▼
//!                                 Exhausted ──resume──▶ Disconnected
//! ```
//!
//! A successful connect resets the attempt counter. Each consecutive
//! failure waits longer, up to `max_delay`, and after `max_attempts`
//! retries the machine stops until [`ReconnectMachine::resume`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::domain::foundation::{StateMachine, ValidationError};

use super::clock::Clock;

/// How the retry delay grows with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// `base * 2^(attempt - 1)`
    #[default]
    Exponential,
    /// `base * attempt`
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Retries after a disconnect before giving up.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
            backoff: Backoff::Exponential,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.backoff {
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
            Backoff::Linear => self.base_delay.saturating_mul(attempt),
        };
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectState {
    Disconnected,
    Connecting,
    Connected,
    /// Automatic retries stopped.
    Exhausted,
}

impl StateMachine for ReconnectState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ReconnectState::*;
        matches!(
            (self, target),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connecting, Exhausted)
                | (Connected, Disconnected)
                | (Connected, Exhausted)
                | (Exhausted, Disconnected)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ReconnectState::*;
        match self {
            Disconnected => vec![Connecting],
            Connecting => vec![Connected, Disconnected, Exhausted],
            Connected => vec![Disconnected, Exhausted],
            Exhausted => vec![Disconnected],
        }
    }
}

/// What to do after a connection was lost or an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    RetryIn(Duration),
    GiveUp { attempts: u32 },
}

pub struct ReconnectMachine<C: Clock> {
    policy: ReconnectPolicy,
    clock: Arc<C>,
    state: ReconnectState,
    attempts: u32,
    has_connected: bool,
    retry_at: Option<Instant>,
}

impl<C: Clock> ReconnectMachine<C> {
    pub fn new(policy: ReconnectPolicy, clock: Arc<C>) -> Self {
        Self {
            policy,
            clock,
            state: ReconnectState::Disconnected,
            attempts: 0,
            has_connected: false,
            retry_at: None,
        }
    }

    pub fn state(&self) -> ReconnectState {
        self.state
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Consecutive failed attempts since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the scheduled retry time has been reached.
    pub fn ready(&self) -> bool {
        self.retry_at.map_or(true, |at| self.clock.now() >= at)
    }

    /// Time left until the next attempt may start.
    pub fn remaining_delay(&self) -> Duration {
        self.retry_at
            .map(|at| at.saturating_duration_since(self.clock.now()))
            .unwrap_or_default()
    }

    pub fn begin_attempt(&mut self) -> Result<(), ValidationError> {
        self.state = self.state.transition_to(ReconnectState::Connecting)?;
        self.retry_at = None;
        Ok(())
    }

    /// Record a successful connect. Returns `true` when this follows an
    /// earlier connection, i.e. events may have been missed.
    pub fn on_connected(&mut self) -> Result<bool, ValidationError> {
        self.state = self.state.transition_to(ReconnectState::Connected)?;
        self.attempts = 0;
        let reconnected = self.has_connected;
        self.has_connected = true;
        Ok(reconnected)
    }

    /// Record a lost connection or a failed attempt.
    pub fn on_disconnected(&mut self) -> NextStep {
        match self.state {
            ReconnectState::Exhausted => {
                return NextStep::GiveUp {
                    attempts: self.attempts,
                }
            }
            ReconnectState::Disconnected => return NextStep::RetryIn(self.remaining_delay()),
            ReconnectState::Connecting | ReconnectState::Connected => {}
        }

        if self.attempts >= self.policy.max_attempts {
            self.state = ReconnectState::Exhausted;
            self.retry_at = None;
            return NextStep::GiveUp {
                attempts: self.attempts,
            };
        }

        self.attempts += 1;
        let delay = self.policy.delay_for(self.attempts);
        self.state = ReconnectState::Disconnected;
        self.retry_at = Some(self.clock.now() + delay);
        NextStep::RetryIn(delay)
    }

    /// Explicit user action after exhaustion: start over with a fresh
    /// attempt budget.
    pub fn resume(&mut self) {
        if self.state == ReconnectState::Exhausted {
            self.state = ReconnectState::Disconnected;
        }
        self.attempts = 0;
        self.retry_at = None;
    }
}
