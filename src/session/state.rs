//! Session lifecycle values

use serde::Serialize;
use std::sync::Arc;

use crate::pairing::PairingChallenge;
use crate::transport::Identity;

/// Lifecycle of the single WhatsApp link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Uninitialized,
    /// A challenge was issued and not yet consumed
    AwaitingPairing,
    /// Credentials accepted, link not fully live
    Authenticated,
    /// Can send and receive
    Ready,
    /// Link dropped, a reconnect may be pending
    Disconnected,
    /// User-initiated sign-out; only an explicit initialize leaves it
    LoggedOut,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::AwaitingPairing => "AWAITING_PAIRING",
            Self::Authenticated => "AUTHENTICATED",
            Self::Ready => "READY",
            Self::Disconnected => "DISCONNECTED",
            Self::LoggedOut => "LOGGED_OUT",
        }
    }

    /// States in which a transport link is (or is being) held
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            Self::Uninitialized | Self::AwaitingPairing | Self::Authenticated | Self::Ready
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a poller may read, published after every transition
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub identity: Option<Identity>,
    pub challenge: Option<Arc<PairingChallenge>>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Uninitialized,
            identity: None,
            challenge: None,
        }
    }
}

impl SessionSnapshot {
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }
}

/// `GET /status` body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub ready: bool,
    #[serde(rename = "hasQR")]
    pub has_pending_challenge: bool,
    #[serde(rename = "info")]
    pub identity: Option<Identity>,
    pub state: SessionState,
}

impl From<&SessionSnapshot> for SessionStatus {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            ready: snapshot.is_ready(),
            has_pending_challenge: snapshot.challenge.is_some(),
            identity: snapshot.identity.clone(),
            state: snapshot.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization_matches_ui_contract() {
        let status = SessionStatus::from(&SessionSnapshot::default());
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["ready"], false);
        assert_eq!(json["hasQR"], false);
        assert!(json["info"].is_null());
        assert_eq!(json["state"], "UNINITIALIZED");
    }

    #[test]
    fn test_live_states() {
        assert!(SessionState::Ready.is_live());
        assert!(SessionState::Uninitialized.is_live());
        assert!(!SessionState::Disconnected.is_live());
        assert!(!SessionState::LoggedOut.is_live());
    }
}
