//! Status facade
//!
//! Read-only view for pollers (UI, health probes). Every read samples the
//! snapshot the driver last published; nothing here reaches the transport
//! or waits on the driver.

use std::sync::Arc;
use tokio::sync::watch;

use super::state::{SessionSnapshot, SessionState, SessionStatus};
use crate::pairing::PairingChallenge;
use crate::transport::Identity;

#[derive(Clone)]
pub struct StatusFacade {
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl StatusFacade {
    pub fn new(snapshot: watch::Receiver<SessionSnapshot>) -> Self {
        Self { snapshot }
    }

    /// `{ready, hasQR, info, state}`
    pub fn status(&self) -> SessionStatus {
        SessionStatus::from(&*self.snapshot.borrow())
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot.borrow().is_ready()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.snapshot.borrow().identity.clone()
    }

    /// Current pairing challenge, if one is pending
    pub fn challenge(&self) -> Option<Arc<PairingChallenge>> {
        self.snapshot.borrow().challenge.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that resolves on every published change
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_latest_published_snapshot() {
        let (tx, rx) = watch::channel(SessionSnapshot::default());
        let facade = StatusFacade::new(rx);
        assert!(!facade.is_ready());

        tx.send_replace(SessionSnapshot {
            state: SessionState::Ready,
            identity: Some(Identity {
                display_name: "Clinica".into(),
                address: "1@s.whatsapp.net".into(),
            }),
            challenge: None,
        });

        let status = facade.status();
        assert!(status.ready);
        assert!(!status.has_pending_challenge);
        assert_eq!(status.identity.unwrap().display_name, "Clinica");
    }
}
