//! Session driver
//!
//! One tokio task owns the [`SessionMachine`], the transport event stream,
//! the pairing publisher, the pending reconnect and every in-flight send.
//! Transport events are applied strictly in arrival order; HTTP handlers
//! talk to the task through a [`SessionHandle`] and read state from the
//! published snapshot, so nothing else ever mutates the session.

use std::collections::HashMap;
use std::future::pending;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::machine::{Effect, SessionInput, SessionMachine, Transition};
use super::reconnect::ReconnectPolicy;
use super::state::{SessionSnapshot, SessionState, SessionStatus};
use super::status::StatusFacade;
use crate::hub::{EventHub, SessionEvent};
use crate::pairing::{PairingChallenge, PairingPublisher};
use crate::relay::{
    normalize_address, InboundRelay, InboundSink, OutboundSendRequest, RelayError, SendReceipt,
};
use crate::transport::{
    ChatMessage, ChatSummary, DisconnectReason, EventStream, Transport, TransportError,
    TransportEvent,
};
use crate::types::GatewayError;

/// Queued commands before callers wait
const COMMAND_QUEUE: usize = 64;

type SendReply = oneshot::Sender<Result<SendReceipt, RelayError>>;

/// Requests from handlers to the driver task
enum Command {
    Send {
        request: OutboundSendRequest,
        reply: SendReply,
    },
    Logout {
        reply: oneshot::Sender<()>,
    },
    Initialize {
        reply: oneshot::Sender<SessionState>,
    },
}

/// A send handed to the transport and not yet answered
struct InFlight {
    to: String,
    reply: SendReply,
    abort: AbortHandle,
}

pub struct SessionDriver {
    machine: SessionMachine,
    transport: Arc<dyn Transport>,
    publisher: PairingPublisher,
    relay: InboundRelay,
    hub: Arc<EventHub>,
    snapshot: watch::Sender<SessionSnapshot>,
    commands: mpsc::Receiver<Command>,
    events: Option<EventStream>,
    reconnect_at: Option<Instant>,
    in_flight: HashMap<u64, InFlight>,
    next_send_id: u64,
    send_done_tx: mpsc::UnboundedSender<(u64, Result<(), TransportError>)>,
    send_done_rx: mpsc::UnboundedReceiver<(u64, Result<(), TransportError>)>,
}

impl SessionDriver {
    /// Start the driver task; the session initializes immediately
    pub fn spawn(
        transport: Arc<dyn Transport>,
        sink: Arc<dyn InboundSink>,
        hub: Arc<EventHub>,
        policy: ReconnectPolicy,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let (send_done_tx, send_done_rx) = mpsc::unbounded_channel();

        let driver = Self {
            machine: SessionMachine::new(policy),
            transport: Arc::clone(&transport),
            publisher: PairingPublisher::new(Arc::clone(&hub)),
            relay: InboundRelay::new(sink, Arc::clone(&hub)),
            hub: Arc::clone(&hub),
            snapshot: snapshot_tx,
            commands: command_rx,
            events: None,
            reconnect_at: None,
            in_flight: HashMap::new(),
            next_send_id: 0,
            send_done_tx,
            send_done_rx,
        };

        let handle = SessionHandle {
            commands: command_tx,
            status: StatusFacade::new(snapshot_rx),
            hub,
            transport,
        };

        (handle, tokio::spawn(driver.run()))
    }

    async fn run(mut self) {
        info!("Session driver started");
        self.apply(SessionInput::Initialize).await;

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    // Every handle is gone
                    None => break,
                },

                event = next_event(&mut self.events) => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        debug!("Transport event stream ended");
                        self.events = None;
                        self.apply(SessionInput::Closed(DisconnectReason::ConnectionLost)).await;
                    }
                },

                () = reconnect_due(self.reconnect_at) => {
                    self.reconnect_at = None;
                    info!("Reconnecting");
                    self.apply(SessionInput::ReconnectDue).await;
                }

                Some((id, result)) = self.send_done_rx.recv() => self.complete_send(id, result),
            }
        }

        self.reject_in_flight();
        info!("Session driver stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send { request, reply } => self.start_send(request, reply),
            Command::Logout { reply } => {
                info!("Logout requested");
                self.apply(SessionInput::Logout).await;
                let _ = reply.send(());
            }
            Command::Initialize { reply } => {
                info!("Initialize requested");
                self.apply(SessionInput::Initialize).await;
                let _ = reply.send(self.machine.state());
            }
        }
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        debug!(event = event.kind(), state = %self.machine.state(), "Transport event");
        let input = match event {
            TransportEvent::Message(raw) => {
                // Messages only flow on a live link
                if self.machine.state().is_live() {
                    self.relay.handle_inbound(raw);
                }
                return;
            }
            TransportEvent::ChallengeIssued(raw) => SessionInput::ChallengeIssued(raw),
            TransportEvent::Authenticated => SessionInput::Authenticated,
            TransportEvent::Open(identity) => SessionInput::Open(identity),
            TransportEvent::Closed(reason) => SessionInput::Closed(reason),
        };
        self.apply(input).await;
    }

    /// Apply an input and carry out its effects, including any follow-up
    /// input an effect produces (a failed dial)
    async fn apply(&mut self, input: SessionInput) {
        let mut next = Some(input);
        while let Some(input) = next.take() {
            let Some(transition) = self.machine.apply(input) else {
                continue;
            };

            info!(
                from = %transition.from,
                to = %transition.to,
                reason = transition.reason.as_ref().map(|r| r.as_str()).unwrap_or(""),
                "Session transition"
            );

            for effect in transition.effects.iter().cloned() {
                if let Some(follow_up) = self.run_effect(effect).await {
                    next = Some(follow_up);
                }
            }

            self.publish(&transition);
        }
    }

    async fn run_effect(&mut self, effect: Effect) -> Option<SessionInput> {
        match effect {
            Effect::Connect => match self.transport.connect().await {
                Ok(events) => {
                    self.events = Some(events);
                }
                Err(e) => {
                    warn!(error = %e, "Transport connect failed");
                    return Some(SessionInput::ConnectFailed(e.to_string()));
                }
            },
            Effect::PublishChallenge(raw) => {
                if let Err(e) = self.publisher.on_challenge_issued(&raw) {
                    warn!(error = %e, "Pairing challenge could not be rendered, waiting for the next one");
                }
            }
            Effect::ClearChallenge => self.publisher.clear(),
            Effect::RejectInFlight => self.reject_in_flight(),
            Effect::ScheduleReconnect(after) => {
                // Whatever the old link still says is no longer ours
                self.events = None;
                info!(delay_ms = after.as_millis() as u64, "Reconnect scheduled");
                self.reconnect_at = Some(Instant::now() + after);
            }
            Effect::CancelReconnect => {
                if self.reconnect_at.take().is_some() {
                    debug!("Pending reconnect cancelled");
                }
            }
            Effect::Teardown => {
                self.events = None;
                if let Err(e) = self.transport.teardown().await {
                    warn!(error = %e, "Transport teardown failed");
                }
            }
        }
        None
    }

    /// Push the transition to subscribers and pollers
    fn publish(&self, transition: &Transition) {
        match transition.to {
            SessionState::Authenticated => self.hub.broadcast(SessionEvent::Authenticated),
            SessionState::Ready => {
                if let Some(identity) = self.machine.identity() {
                    info!(account = %identity.address, name = %identity.display_name, "Session ready");
                    self.hub.broadcast(SessionEvent::Ready {
                        info: identity.clone(),
                    });
                }
            }
            SessionState::Disconnected | SessionState::LoggedOut => {
                self.hub.broadcast(SessionEvent::Disconnected {
                    reason: transition
                        .reason
                        .as_ref()
                        .map(|r| r.to_string())
                        .unwrap_or_default(),
                    reconnecting: transition.reconnect_scheduled(),
                });
            }
            SessionState::Uninitialized | SessionState::AwaitingPairing => {}
        }

        self.snapshot.send_replace(SessionSnapshot {
            state: self.machine.state(),
            identity: self.machine.identity().cloned(),
            challenge: self.publisher.current(),
        });
    }

    fn start_send(&mut self, request: OutboundSendRequest, reply: SendReply) {
        if self.machine.state() != SessionState::Ready {
            let _ = reply.send(Err(RelayError::NotReady));
            return;
        }

        let to = normalize_address(&request.destination_address, self.transport.address_suffix());
        let id = self.next_send_id;
        self.next_send_id += 1;

        let transport = Arc::clone(&self.transport);
        let done = self.send_done_tx.clone();
        let address = to.clone();
        let task = tokio::spawn(async move {
            let result = transport.send(&address, &request.body_text).await;
            let _ = done.send((id, result));
        });

        debug!(to = %to, id, "Send dispatched");
        self.in_flight.insert(
            id,
            InFlight {
                to,
                reply,
                abort: task.abort_handle(),
            },
        );
    }

    fn complete_send(&mut self, id: u64, result: Result<(), TransportError>) {
        // Already rejected by a disconnect
        let Some(send) = self.in_flight.remove(&id) else {
            return;
        };

        let outcome = match result {
            Ok(()) => {
                info!(to = %send.to, "Message sent");
                Ok(SendReceipt { to: send.to })
            }
            Err(TransportError::NotConnected) => Err(RelayError::NotReady),
            Err(e) => {
                warn!(to = %send.to, error = %e, "Send failed");
                Err(RelayError::SendFailed(e.to_string()))
            }
        };
        let _ = send.reply.send(outcome);
    }

    fn reject_in_flight(&mut self) {
        if self.in_flight.is_empty() {
            return;
        }
        warn!(count = self.in_flight.len(), "Rejecting in-flight sends");
        for (_, send) in self.in_flight.drain() {
            send.abort.abort();
            let _ = send.reply.send(Err(RelayError::NotReady));
        }
    }
}

async fn next_event(events: &mut Option<EventStream>) -> Option<TransportEvent> {
    match events {
        Some(events) => events.recv().await,
        None => pending().await,
    }
}

async fn reconnect_due(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}

/// Cloneable entry point to the session
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    status: StatusFacade,
    hub: Arc<EventHub>,
    transport: Arc<dyn Transport>,
}

impl SessionHandle {
    /// Send a text message
    ///
    /// Invalid requests are rejected before the session is consulted.
    pub async fn send(&self, request: OutboundSendRequest) -> Result<SendReceipt, RelayError> {
        request.validate()?;

        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Send { request, reply })
            .await
            .map_err(|_| RelayError::NotReady)?;
        response.await.unwrap_or(Err(RelayError::NotReady))
    }

    /// Sign out; idempotent
    pub async fn logout(&self) -> Result<(), GatewayError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Logout { reply })
            .await
            .map_err(|_| GatewayError::Internal("session driver stopped".into()))?;
        response
            .await
            .map_err(|_| GatewayError::Internal("session driver stopped".into()))
    }

    /// Re-initialize after a logout or disconnect; returns the resulting state
    pub async fn initialize(&self) -> Result<SessionState, GatewayError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Initialize { reply })
            .await
            .map_err(|_| GatewayError::Internal("session driver stopped".into()))?;
        response
            .await
            .map_err(|_| GatewayError::Internal("session driver stopped".into()))
    }

    pub fn status(&self) -> SessionStatus {
        self.status.status()
    }

    pub fn state(&self) -> SessionState {
        self.status.state()
    }

    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    pub fn current_challenge(&self) -> Option<Arc<PairingChallenge>> {
        self.status.challenge()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.status.snapshot()
    }

    pub fn facade(&self) -> &StatusFacade {
        &self.status
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.hub.subscribe()
    }

    /// Recent chats, best-effort from the transport
    pub async fn list_chats(&self) -> Result<Vec<ChatSummary>, GatewayError> {
        if !self.is_ready() {
            return Err(GatewayError::NotReady);
        }
        Ok(self.transport.list_chats().await?)
    }

    /// Messages of one chat, best-effort from the transport
    pub async fn list_messages(&self, chat_id: &str) -> Result<Vec<ChatMessage>, GatewayError> {
        if !self.is_ready() {
            return Err(GatewayError::NotReady);
        }
        Ok(self.transport.list_messages(chat_id).await?)
    }
}
