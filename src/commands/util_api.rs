use crate::controller::SignalingController;
use crate::error::{Error, Result};
use crate::events::{CallEvent, EndReason};
use crate::peer::{ConnectionState, MediaEndpoint, SignalingState};
use crate::session::Role;
use crate::signaling::Message;
use tracing::{debug, error, info, warn};

impl<E: MediaEndpoint> SignalingController<E> {
    /// Open local capture once; later calls hand back the same media
    pub(crate) async fn acquire_media(&mut self) -> Result<E::Media> {
        if let Some(media) = &self.local_media {
            return Ok(media.clone());
        }

        match self.endpoint.acquire_media().await {
            Ok(media) => {
                info!("local media acquired");
                self.local_media = Some(media.clone());
                self.events.emit(CallEvent::LocalPreview(media.clone()));
                Ok(media)
            }
            Err(e) => {
                error!("Failed to access media devices: {}", e);
                Err(e)
            }
        }
    }

    /// Drop local media. Refused while a session is sending it.
    pub(crate) fn release_media(&mut self) -> Result<()> {
        if let Some(session) = &self.session {
            warn!(session = %session.id, "cannot release media during a session");
            return Err(Error::Busy);
        }
        if self.local_media.take().is_some() {
            info!("local media released");
        }
        Ok(())
    }

    /// Tear down the current session. Hanging up with nothing active is a no-op.
    pub(crate) async fn hangup(&mut self) -> Result<()> {
        if self.session.is_none() {
            debug!("hangup with no active session");
            return Ok(());
        }
        self.teardown(EndReason::Hangup).await;
        Ok(())
    }

    /// The callee declined our offer
    pub(crate) async fn on_reject(&mut self, reason: String) -> Result<()> {
        let Some(session) = &self.session else {
            warn!(%reason, "reject received with no peer connection");
            return Err(Error::NoActiveSession);
        };
        if session.role != Role::Caller || session.signaling_state() != SignalingState::HaveLocalOffer {
            warn!(session = %session.id, %reason, "reject does not match an outstanding offer");
            return Err(Error::NegotiationConflict(
                "reject received without an outstanding offer".into(),
            ));
        }

        info!(session = %session.id, "call rejected by remote: {}", reason);
        self.teardown(EndReason::Rejected(reason)).await;
        Ok(())
    }

    /// Tell the caller why its offer was dropped, when enabled
    pub(crate) async fn announce_rejection(&self, cause: &Error) {
        if !self.config.announce_rejections {
            return;
        }
        let Some(reason) = cause.reject_reason() else {
            return;
        };
        let reject = Message::Reject {
            reason: reason.to_string(),
        };
        if let Err(e) = self.send(&reject).await {
            warn!("reject not sent: {}", e);
        }
    }

    pub(crate) async fn on_connection_state(&mut self, session: u64, state: ConnectionState) {
        let Some(current) = self.live_session(session) else {
            debug!(?state, "state change for a finished session dropped");
            return;
        };
        info!(session = %current.id, ?state, "Connection state changed");

        match state {
            ConnectionState::Connected => {
                let session = current.id.clone();
                self.events.emit(CallEvent::Connected { session });
            }
            state if state.is_terminal() => {
                let reason = match state {
                    ConnectionState::Disconnected => EndReason::Disconnected,
                    ConnectionState::Failed => EndReason::ConnectionFailed,
                    _ => EndReason::ConnectionClosed,
                };
                self.teardown(reason).await
            }
            _ => {}
        }
    }
}
