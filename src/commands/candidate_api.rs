use crate::controller::SignalingController;
use crate::error::{Error, Result};
use crate::logger::{analyze_candidates, dump_candidate};
use crate::peer::ice::CandidateKind;
use crate::peer::{IceCandidate, MediaEndpoint, PeerConnection};
use crate::session::SessionToken;
use crate::signaling::Message;
use std::sync::Arc;
use tracing::{debug, warn};

impl<E: MediaEndpoint> SignalingController<E> {
    /// Apply a trickled remote candidate, or hold it until the remote
    /// description is known
    pub(crate) async fn on_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            warn!("candidate received with no peer connection");
            return Err(Error::NoActiveSession);
        };
        dump_candidate("remote", &candidate);

        let connection = Arc::clone(&session.connection);
        if !connection.has_remote_description().await {
            if let Err(dropped) = session.pending.push(candidate) {
                warn!(
                    session = %session.id,
                    queued = session.pending.len(),
                    "too many candidates before the remote description, dropping {:?}",
                    dropped.candidate_line()
                );
                return Ok(());
            }
            debug!(
                session = %session.id,
                queued = session.pending.len(),
                "remote description not set yet, candidate queued"
            );
            return Ok(());
        }

        let token = session.token.clone();
        let session_id = session.id.clone();
        Self::apply_candidate(&connection, &token, &session_id, candidate).await;
        Ok(())
    }

    /// Apply every candidate queued for the session of `token`, oldest first
    pub(crate) async fn flush_pending(&mut self, token: &SessionToken) {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|session| session.token.id() == token.id())
        else {
            return;
        };

        let pending = session.pending.take();
        if pending.is_empty() {
            return;
        }
        debug!(
            session = %session.id,
            count = pending.len(),
            "applying queued remote candidates"
        );

        let connection = Arc::clone(&session.connection);
        let session_id = session.id.clone();
        for candidate in pending {
            Self::apply_candidate(&connection, token, &session_id, candidate).await;
        }
    }

    /// A candidate the stack refuses is logged and dropped; ICE can still
    /// succeed through the others.
    async fn apply_candidate(
        connection: &E::Connection,
        token: &SessionToken,
        session_id: &str,
        candidate: IceCandidate,
    ) {
        match token.guard(connection.add_ice_candidate(candidate)).await {
            Ok(()) => debug!(session = %session_id, "remote candidate applied"),
            Err(Error::Cancelled) => debug!(session = %session_id, "session ended before candidate was applied"),
            Err(e) => warn!(session = %session_id, "Error adding ice candidate: {}", e),
        }
    }

    /// Trickle a locally gathered candidate to the remote peer. The
    /// end-of-gathering marker is not forwarded.
    pub(crate) async fn on_local_candidate(&mut self, session: u64, candidate: Option<IceCandidate>) {
        let Some(current) = self.live_session(session) else {
            debug!("local candidate for a finished session dropped");
            return;
        };

        let Some(candidate) = candidate else {
            debug!(session = %current.id, "ICE candidate gathering complete");
            analyze_candidates(&current.local_kinds);
            return;
        };

        current.local_kinds.push(CandidateKind::of(&candidate));
        // A lost candidate is not fatal; the remaining ones may still connect
        if let Err(e) = self.send(&Message::Candidate(candidate)).await {
            warn!("candidate not sent: {}", e);
        }
    }
}
