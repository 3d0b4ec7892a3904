use crate::error::{Error, Result};
use crate::peer::ice::{CandidateBuffer, CandidateKind};
use crate::peer::state::SignalingState;
use crate::peer::PeerConnection;
use crate::utils::random_id;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Caller,
    Callee,
}

/// Monotonic session counter. Advancing it invalidates every token issued
/// before, including the one held by an operation that is still suspended.
#[derive(Debug)]
pub struct Epoch {
    tx: watch::Sender<u64>,
}

impl Default for Epoch {
    fn default() -> Self {
        Self::new()
    }
}

impl Epoch {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    /// Invalidate the current token and issue the next one
    pub fn advance(&self) -> SessionToken {
        let mut id = 0;
        self.tx.send_modify(|current| {
            *current += 1;
            id = *current;
        });
        SessionToken {
            id,
            epoch: self.tx.subscribe(),
        }
    }

    pub fn invalidate(&self) {
        self.tx.send_modify(|current| *current += 1);
    }
}

/// Proof that a continuation still belongs to the live session
#[derive(Debug, Clone)]
pub struct SessionToken {
    id: u64,
    epoch: watch::Receiver<u64>,
}

impl SessionToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        *self.epoch.borrow() == self.id
    }

    /// Resolves once the token has been invalidated
    pub async fn invalidated(&self) {
        let mut epoch = self.epoch.clone();
        loop {
            if *epoch.borrow_and_update() != self.id {
                return;
            }
            // Sender gone means the controller is gone
            if epoch.changed().await.is_err() {
                return;
            }
        }
    }

    /// Run one suspension point of a session operation.
    ///
    /// Fails with `Cancelled` if the session is torn down while `fut` is
    /// pending or by the time it completes.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.invalidated() => Err(Error::Cancelled),
            result = fut => {
                if self.is_current() {
                    result
                } else {
                    Err(Error::Cancelled)
                }
            }
        }
    }
}

/// The single in-progress negotiation of a controller
pub struct Session<C> {
    pub id: String,
    pub role: Role,
    pub token: SessionToken,
    pub connection: Arc<C>,
    pub started_at: DateTime<Utc>,
    /// Remote candidates waiting for the remote description
    pub pending: CandidateBuffer,
    /// Kinds of the local candidates trickled so far
    pub local_kinds: Vec<CandidateKind>,
}

impl<C: PeerConnection> Session<C> {
    pub fn new(role: Role, connection: Arc<C>, token: SessionToken) -> Self {
        Self {
            id: random_id(),
            role,
            token,
            connection,
            started_at: Utc::now(),
            pending: CandidateBuffer::default(),
            local_kinds: Vec::new(),
        }
    }

    pub fn signaling_state(&self) -> SignalingState {
        self.connection.signaling_state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            role: self.role,
            signaling_state: self.signaling_state(),
            pending_candidates: self.pending.len(),
            started_at: self.started_at,
        }
    }
}

/// Point-in-time view of a session, for status displays and tests
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub role: Role,
    pub signaling_state: SignalingState,
    pub pending_candidates: usize,
    pub started_at: DateTime<Utc>,
}
