//! Session state machine
//!
//! Pure and synchronous: `apply` never suspends and never touches the
//! transport. It returns the effects the driver must carry out, or `None`
//! when the input does not match an edge from the current state. Real
//! transports re-emit events (a second `open`, a `close` after logout),
//! so unmatched inputs are dropped rather than treated as errors.
//!
//! ```text
//! UNINITIALIZED ──challenge──▶ AWAITING_PAIRING ──authenticated──▶ AUTHENTICATED
//!       │                        │      ▲ (newer challenge)               │
//!       │                        └──────┘                                 │
//!       └──────────── open ──────────────┴──────────── open ──────────────┴──▶ READY
//!
//! any live state ──closed──▶ DISCONNECTED ──(delay)──▶ UNINITIALIZED
//! any live state ──closed(logout)──▶ LOGGED_OUT
//! any state ──logout──▶ LOGGED_OUT ──initialize──▶ UNINITIALIZED
//! ```

use std::time::Duration;

use super::reconnect::{ReconnectDecision, ReconnectPolicy};
use super::state::SessionState;
use crate::transport::{DisconnectReason, Identity};

/// Input to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// Transport issued a pairing challenge
    ChallengeIssued(String),
    /// Transport accepted credentials
    Authenticated,
    /// Transport link is live
    Open(Identity),
    /// Transport link dropped
    Closed(DisconnectReason),
    /// `connect()` itself failed
    ConnectFailed(String),
    /// The reconnect delay elapsed
    ReconnectDue,
    /// Explicit (re)initialize from an operator or at startup
    Initialize,
    /// Explicit sign-out
    Logout,
}

/// Work the driver performs after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Dial the transport
    Connect,
    /// Render and publish a challenge, replacing any previous one
    PublishChallenge(String),
    ClearChallenge,
    /// Fail every outstanding send with NOT_READY
    RejectInFlight,
    ScheduleReconnect(Duration),
    CancelReconnect,
    /// Sign out and release the transport
    Teardown,
}

/// Outcome of a matched input
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    pub effects: Vec<Effect>,
    /// Set for transitions into DISCONNECTED or LOGGED_OUT
    pub reason: Option<DisconnectReason>,
}

impl Transition {
    fn new(from: SessionState, to: SessionState) -> Self {
        Self {
            from,
            to,
            effects: Vec::new(),
            reason: None,
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    fn because(mut self, reason: DisconnectReason) -> Self {
        self.reason = Some(reason);
        self
    }

    /// Whether the driver will dial again on its own
    pub fn reconnect_scheduled(&self) -> bool {
        self.effects
            .iter()
            .any(|e| matches!(e, Effect::ScheduleReconnect(_)))
    }
}

/// Owner of `SessionState` and `Identity`
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    identity: Option<Identity>,
    /// A connect has been issued for the current UNINITIALIZED period
    dialing: bool,
    policy: ReconnectPolicy,
}

impl SessionMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: SessionState::Uninitialized,
            identity: None,
            dialing: false,
            policy,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn apply(&mut self, input: SessionInput) -> Option<Transition> {
        use SessionState::*;

        let from = self.state;
        let transition = match (from, input) {
            (Uninitialized | AwaitingPairing, SessionInput::ChallengeIssued(raw)) => {
                Transition::new(from, AwaitingPairing).with(Effect::PublishChallenge(raw))
            }

            // Resumed credentials skip the challenge entirely
            (Uninitialized | AwaitingPairing, SessionInput::Authenticated) => {
                Transition::new(from, Authenticated).with(Effect::ClearChallenge)
            }

            (Uninitialized | AwaitingPairing | Authenticated, SessionInput::Open(identity)) => {
                self.identity = Some(identity);
                Transition::new(from, Ready).with(Effect::ClearChallenge)
            }

            (Uninitialized | AwaitingPairing | Authenticated | Ready, SessionInput::Closed(reason)) => {
                self.close(from, reason)
            }

            (Uninitialized, SessionInput::ConnectFailed(detail)) if self.dialing => {
                self.close(from, DisconnectReason::Other(detail))
            }

            (Disconnected, SessionInput::ReconnectDue) => self.dial(from),

            (Disconnected | LoggedOut, SessionInput::Initialize) => {
                self.dial(from).with(Effect::CancelReconnect)
            }
            (Uninitialized, SessionInput::Initialize) if !self.dialing => self.dial(from),

            (LoggedOut, SessionInput::Logout) => return None,
            (_, SessionInput::Logout) => {
                self.identity = None;
                self.dialing = false;
                Transition::new(from, LoggedOut)
                    .with(Effect::CancelReconnect)
                    .with(Effect::ClearChallenge)
                    .with(Effect::RejectInFlight)
                    .with(Effect::Teardown)
                    .because(DisconnectReason::LoggedOut)
            }

            _ => return None,
        };

        self.state = transition.to;
        Some(transition)
    }

    fn dial(&mut self, from: SessionState) -> Transition {
        self.dialing = true;
        Transition::new(from, SessionState::Uninitialized).with(Effect::Connect)
    }

    fn close(&mut self, from: SessionState, reason: DisconnectReason) -> Transition {
        self.identity = None;
        self.dialing = false;

        match self.policy.decide(&reason) {
            ReconnectDecision::Stop => Transition::new(from, SessionState::LoggedOut)
                .with(Effect::ClearChallenge)
                .with(Effect::RejectInFlight)
                .with(Effect::Teardown)
                .because(reason),
            ReconnectDecision::Retry { after } => Transition::new(from, SessionState::Disconnected)
                .with(Effect::ClearChallenge)
                .with(Effect::RejectInFlight)
                .with(Effect::ScheduleReconnect(after))
                .because(reason),
        }
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}
