//! Notifications for the UI layer

use crate::peer::MediaEndpoint;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    Hangup,
    Disconnected,
    ConnectionFailed,
    ConnectionClosed,
    /// The callee answered with `{"type":"reject"}`
    Rejected(String),
    /// Setup was aborted part-way
    NegotiationFailed(String),
    /// The controller itself went away
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum CallEvent<M, R> {
    /// Local capture is open and can be previewed
    LocalPreview(M),
    /// The remote side is sending media
    RemoteStream(R),
    Connected { session: String },
    Ended { session: String, reason: EndReason },
}

pub type EndpointEvent<E> = CallEvent<<E as MediaEndpoint>::Media, <E as MediaEndpoint>::Remote>;

const EVENT_CAPACITY: usize = 64;

/// Fan-out of call events; sending with nobody listening is fine
pub struct EventEmitter<M, R> {
    tx: broadcast::Sender<CallEvent<M, R>>,
}

impl<M: Clone, R: Clone> Default for EventEmitter<M, R> {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }
}

impl<M: Clone, R: Clone> EventEmitter<M, R> {
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent<M, R>> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: CallEvent<M, R>) {
        match &event {
            CallEvent::LocalPreview(_) => debug!("emit local preview"),
            CallEvent::RemoteStream(_) => debug!("emit remote stream"),
            CallEvent::Connected { session } => debug!(session = %session, "emit connected"),
            CallEvent::Ended { session, reason } => {
                debug!(session = %session, ?reason, "emit ended")
            }
        }
        if self.tx.send(event).is_err() {
            trace!("no event subscribers");
        }
    }
}
