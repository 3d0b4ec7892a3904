//! The signaling controller: one negotiation at a time, one task per controller
//!
//! Every request from the UI, every inbound message and every connection
//! callback becomes a [`Command`] on a single queue. The controller task
//! handles them strictly in order and finishes (or cancels) one before it
//! reads the next, so a message that arrives while an offer is still being
//! built waits for it instead of interleaving with it.

use crate::channel::{SignalChannel, SignalStream};
use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::events::{CallEvent, EndReason, EndpointEvent, EventEmitter};
use crate::peer::{ConnectionEvent, EventHandler, MediaEndpoint, PeerConnection};
use crate::session::{Epoch, Session, SessionSnapshot, SessionToken};
use crate::signaling::{Inbound, Message};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Reply<T> = oneshot::Sender<Result<T>>;

pub(crate) enum Command<E: MediaEndpoint> {
    AcquireMedia(Reply<E::Media>),
    ReleaseMedia(Reply<()>),
    InitiateCall(Reply<()>),
    Deliver(String, Reply<()>),
    Hangup(Reply<()>),
    Snapshot(oneshot::Sender<Option<SessionSnapshot>>),
    Connection {
        session: u64,
        event: ConnectionEvent<E::Remote>,
    },
}

pub struct SignalingController<E: MediaEndpoint> {
    pub(crate) endpoint: E,
    pub(crate) channel: Arc<dyn SignalChannel>,
    pub(crate) config: ControllerConfig,
    pub(crate) local_media: Option<E::Media>,
    pub(crate) session: Option<Session<E::Connection>>,
    pub(crate) epoch: Arc<Epoch>,
    pub(crate) events: Arc<EventEmitter<E::Media, E::Remote>>,
    /// Weak, so connection hooks never keep the controller alive
    pub(crate) hooks: mpsc::WeakUnboundedSender<Command<E>>,
}

impl<E: MediaEndpoint> SignalingController<E> {
    /// Start a controller task. It runs until every handle is dropped.
    pub fn spawn(
        endpoint: E,
        channel: Arc<dyn SignalChannel>,
        config: ControllerConfig,
    ) -> (ControllerHandle<E>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let epoch = Arc::new(Epoch::new());
        let events = Arc::new(EventEmitter::default());

        let controller = Self {
            endpoint,
            channel,
            config,
            local_media: None,
            session: None,
            epoch: Arc::clone(&epoch),
            events: Arc::clone(&events),
            hooks: tx.downgrade(),
        };
        let task = tokio::spawn(controller.run(rx));

        let handle = ControllerHandle {
            commands: tx,
            epoch,
            events,
        };
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command<E>>) {
        debug!("signaling controller started");
        while let Some(command) = commands.recv().await {
            self.dispatch(command).await;
        }
        self.teardown(EndReason::Shutdown).await;
        debug!("signaling controller stopped");
    }

    async fn dispatch(&mut self, command: Command<E>) {
        match command {
            Command::AcquireMedia(reply) => {
                let _ = reply.send(self.acquire_media().await);
            }
            Command::ReleaseMedia(reply) => {
                let _ = reply.send(self.release_media());
            }
            Command::InitiateCall(reply) => {
                let _ = reply.send(self.initiate_call().await);
            }
            Command::Deliver(text, reply) => {
                let _ = reply.send(self.on_text(&text).await);
            }
            Command::Hangup(reply) => {
                let _ = reply.send(self.hangup().await);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.session.as_ref().map(Session::snapshot));
            }
            Command::Connection { session, event } => {
                self.on_connection_event(session, event).await;
            }
        }
    }

    /// Decode one inbound frame and route it
    pub(crate) async fn on_text(&mut self, text: &str) -> Result<()> {
        let message = match Message::decode(text) {
            Ok(Inbound::Message(message)) => message,
            Ok(Inbound::Unknown(kind)) => {
                debug!(kind = %kind, "ignoring message of unknown type");
                return Ok(());
            }
            Err(e) => {
                warn!("Error parsing signaling message: {}", e);
                return Err(e);
            }
        };

        debug!(kind = message.kind(), "inbound message");
        match message {
            Message::Offer(sdp) => self.on_offer(sdp).await,
            Message::Answer(sdp) => self.on_answer(sdp).await,
            Message::Candidate(candidate) => self.on_candidate(candidate).await,
            Message::Reject { reason } => self.on_reject(reason).await,
        }
    }

    async fn on_connection_event(&mut self, session: u64, event: ConnectionEvent<E::Remote>) {
        match event {
            ConnectionEvent::LocalCandidate(candidate) => {
                self.on_local_candidate(session, candidate).await
            }
            ConnectionEvent::RemoteTrack(remote) => {
                let Some(current) = self.live_session(session) else {
                    debug!("remote track for a finished session dropped");
                    return;
                };
                info!(session = %current.id, "remote track arrived: {:?}", remote);
                self.events.emit(CallEvent::RemoteStream(remote));
            }
            ConnectionEvent::StateChanged(state) => self.on_connection_state(session, state).await,
        }
    }

    /// The session a connection event belongs to, if it is still the live one
    pub(crate) fn live_session(&mut self, session: u64) -> Option<&mut Session<E::Connection>> {
        self.session
            .as_mut()
            .filter(|current| current.token.id() == session && current.token.is_current())
    }

    /// Handler registered on a connection; tags every event with the session
    pub(crate) fn hook_for(&self, token: &SessionToken) -> EventHandler<E::Remote> {
        let commands = self.hooks.clone();
        let session = token.id();
        Arc::new(move |event: ConnectionEvent<E::Remote>| {
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::Connection { session, event });
            }
        })
    }

    pub(crate) async fn send(&self, message: &Message) -> Result<()> {
        let text = message.encode()?;
        self.channel.send(text).await.inspect_err(|e| {
            warn!(kind = message.kind(), "signaling send failed: {}", e);
        })
    }

    /// Abort a failed setup step: log it and drop the session it created
    pub(crate) async fn settle(&mut self, token: &SessionToken, result: Result<()>) -> Result<()> {
        if let Err(e) = &result {
            let reason = match e {
                Error::Cancelled => {
                    info!("session cancelled before setup finished");
                    EndReason::Hangup
                }
                e => {
                    warn!("call setup aborted: {}", e);
                    EndReason::NegotiationFailed(e.to_string())
                }
            };
            let owns_session = self
                .session
                .as_ref()
                .is_some_and(|session| session.token.id() == token.id());
            if owns_session {
                self.teardown(reason).await;
            }
        }
        result
    }

    /// Destroy the live session, if any. The epoch moves first, so every
    /// continuation still holding the old token turns into a no-op.
    pub(crate) async fn teardown(&mut self, reason: EndReason) {
        self.epoch.invalidate();
        let Some(session) = self.session.take() else {
            return;
        };

        info!(session = %session.id, ?reason, "tearing down session");
        if !session.pending.is_empty() {
            debug!(
                session = %session.id,
                dropped = session.pending.len(),
                "dropping remote candidates that were never applied"
            );
        }
        if let Err(e) = session.connection.close().await {
            warn!(session = %session.id, "close failed: {}", e);
        }
        self.events.emit(CallEvent::Ended {
            session: session.id,
            reason,
        });
    }
}

/// Cloneable front end of a running controller
pub struct ControllerHandle<E: MediaEndpoint> {
    commands: mpsc::UnboundedSender<Command<E>>,
    epoch: Arc<Epoch>,
    events: Arc<EventEmitter<E::Media, E::Remote>>,
}

impl<E: MediaEndpoint> Clone for ControllerHandle<E> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            epoch: Arc::clone(&self.epoch),
            events: Arc::clone(&self.events),
        }
    }
}

impl<E: MediaEndpoint> ControllerHandle<E> {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command<E>) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| Error::Cancelled)?;
        rx.await.map_err(|_| Error::Cancelled)?
    }

    /// Place a call: acquire media, create a connection, send the offer
    pub async fn initiate_call(&self) -> Result<()> {
        self.request(Command::InitiateCall).await
    }

    /// Open local media ahead of time so inbound offers can be answered
    pub async fn acquire_media(&self) -> Result<E::Media> {
        self.request(Command::AcquireMedia).await
    }

    pub async fn release_media(&self) -> Result<()> {
        self.request(Command::ReleaseMedia).await
    }

    /// Hand one inbound signaling frame to the controller
    pub async fn deliver(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.request(|reply| Command::Deliver(text, reply)).await
    }

    /// End the current session. Operations of that session still in
    /// flight are cancelled before this returns control to the caller.
    pub async fn hangup(&self) -> Result<()> {
        self.epoch.invalidate();
        self.request(Command::Hangup).await
    }

    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::Snapshot(tx)).ok()?;
        rx.await.ok().flatten()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EndpointEvent<E>> {
        self.events.subscribe()
    }

    /// Feed every frame of `inbound` to the controller until it ends.
    /// Outcomes are already logged by the controller.
    pub fn attach(&self, mut inbound: SignalStream) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            while let Some(text) = inbound.recv().await {
                match handle.deliver(text).await {
                    Ok(()) => {}
                    Err(_) if handle.commands.is_closed() => break,
                    Err(e) if e.is_protocol_error() => debug!("inbound message discarded: {}", e),
                    Err(e) => debug!("inbound message failed: {}", e),
                }
            }
            debug!("signal stream ended");
        })
    }
}
