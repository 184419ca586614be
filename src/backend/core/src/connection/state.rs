//! Connection state machine.
//!
//! Transitions are a pure function of `(state, event)`; anything not in the
//! table is rejected. [`ConnectionMachine`] adds the reconnect-attempt
//! counter and the linear backoff policy on top.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Never connected
    Disconnected,
    /// Transport open in progress
    Connecting,
    /// Link up, heartbeat running
    Connected,
    /// Waiting out a backoff delay
    Reconnecting,
    /// Terminal; no further reconnects
    Closed,
}

impl ConnectionState {
    /// Numeric code for the state gauge.
    pub const fn code(&self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Reconnecting => 3,
            Self::Closed => 4,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Inputs that drive the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Caller asked to connect
    Connect,
    /// Transport open succeeded
    Opened,
    /// Open failed, or the socket errored or closed
    Failed,
    /// Backoff delay ran out
    BackoffElapsed,
    /// Attempt budget exhausted
    GiveUp,
    /// Caller asked to disconnect
    Disconnect,
}

/// The transition table. `None` means the event is not valid in `state`.
pub fn transition(state: ConnectionState, event: ConnectionEvent) -> Option<ConnectionState> {
    use ConnectionEvent as E;
    use ConnectionState as S;

    match (state, event) {
        (S::Closed, _) => None,
        (_, E::Disconnect) => Some(S::Closed),
        (S::Disconnected, E::Connect) => Some(S::Connecting),
        (S::Connecting, E::Opened) => Some(S::Connected),
        (S::Connecting | S::Connected, E::Failed) => Some(S::Reconnecting),
        (S::Connecting | S::Connected, E::GiveUp) => Some(S::Closed),
        (S::Reconnecting, E::BackoffElapsed) => Some(S::Connecting),
        _ => None,
    }
}

/// Linear reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based): `base * attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

/// What to do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Wait `delay`, then try again
    Retry { attempt: u32, delay: Duration },
    /// Budget exhausted; the machine is now closed
    GiveUp,
    /// Failure arrived in a state that cannot fail (already closed)
    Ignored,
}

/// State plus reconnect bookkeeping.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    attempts: u32,
    policy: ReconnectPolicy,
}

impl ConnectionMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failures since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Apply `event`, returning the new state if the edge exists.
    ///
    /// A successful open resets the attempt counter.
    pub fn apply(&mut self, event: ConnectionEvent) -> Option<ConnectionState> {
        let next = transition(self.state, event)?;
        if event == ConnectionEvent::Opened {
            self.attempts = 0;
        }
        self.state = next;
        Some(next)
    }

    /// Count a failure and move to `Reconnecting` or `Closed`.
    pub fn on_failure(&mut self) -> Recovery {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return Recovery::Ignored;
        }

        self.attempts = self.attempts.saturating_add(1);
        if self.attempts >= self.policy.max_attempts {
            self.apply(ConnectionEvent::GiveUp);
            Recovery::GiveUp
        } else {
            self.apply(ConnectionEvent::Failed);
            Recovery::Retry {
                attempt: self.attempts,
                delay: self.policy.delay_for(self.attempts),
            }
        }
    }
}
