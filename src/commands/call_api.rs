use crate::controller::SignalingController;
use crate::error::{Error, Result};
use crate::peer::{MediaEndpoint, PeerConnection, SessionDescription, SignalingState};
use crate::session::{Role, Session, SessionToken};
use crate::signaling::Message;
use std::sync::Arc;
use tracing::{error, info, warn};

impl<E: MediaEndpoint> SignalingController<E> {
    /// Caller side: open media, create the connection and send an offer
    pub(crate) async fn initiate_call(&mut self) -> Result<()> {
        if let Some(session) = &self.session {
            warn!(session = %session.id, "call requested while a session is active");
            return Err(Error::Busy);
        }

        let token = self.epoch.advance();
        let media = match token.guard(self.acquire_media()).await {
            Ok(media) => media,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(Error::MediaUnavailable(reason)) => return Err(Error::MediaUnavailable(reason)),
            Err(e) => return Err(Error::MediaUnavailable(e.to_string())),
        };

        let result = self.send_offer(&token, &media).await;
        self.settle(&token, result).await
    }

    async fn send_offer(&mut self, token: &SessionToken, media: &E::Media) -> Result<()> {
        let connection = self.open_session(Role::Caller, token, media).await?;

        info!("Creating offer...");
        let offer = token.guard(connection.create_offer()).await?;
        token
            .guard(connection.set_local_description(offer.clone()))
            .await?;
        self.send(&Message::Offer(offer)).await?;
        info!("offer sent, waiting for answer");
        Ok(())
    }

    /// Callee side: answer an inbound offer with the media acquired earlier
    pub(crate) async fn on_offer(&mut self, offer: SessionDescription) -> Result<()> {
        let Some(media) = self.local_media.clone() else {
            error!("Local stream not available, dropping offer");
            let err = Error::MediaUnavailable("local media was not acquired before the offer".into());
            self.announce_rejection(&err).await;
            return Err(err);
        };
        if let Some(session) = &self.session {
            warn!(
                session = %session.id,
                state = %session.signaling_state(),
                "offer received while a session is active, dropping it"
            );
            self.announce_rejection(&Error::Busy).await;
            return Err(Error::Busy);
        }

        let token = self.epoch.advance();
        let result = self.send_answer(&token, &media, offer).await;
        self.settle(&token, result).await
    }

    async fn send_answer(
        &mut self,
        token: &SessionToken,
        media: &E::Media,
        offer: SessionDescription,
    ) -> Result<()> {
        let connection = self.open_session(Role::Callee, token, media).await?;

        token.guard(connection.set_remote_description(offer)).await?;
        self.flush_pending(token).await;

        let answer = token.guard(connection.create_answer()).await?;
        token
            .guard(connection.set_local_description(answer.clone()))
            .await?;
        self.send(&Message::Answer(answer)).await?;
        info!("answer sent");
        Ok(())
    }

    /// Caller side: complete negotiation with the callee's answer
    pub(crate) async fn on_answer(&mut self, answer: SessionDescription) -> Result<()> {
        let Some(session) = &self.session else {
            warn!("answer received with no peer connection");
            return Err(Error::NoActiveSession);
        };

        match session.signaling_state() {
            SignalingState::HaveLocalOffer => {}
            SignalingState::Stable => {
                info!(session = %session.id, "Connection already stable, ignoring answer");
                return Ok(());
            }
            state => {
                warn!(session = %session.id, %state, "answer does not fit the signaling state");
                return Err(Error::NegotiationConflict(format!(
                    "answer received in state {}",
                    state
                )));
            }
        }

        let token = session.token.clone();
        let connection = Arc::clone(&session.connection);
        match token.guard(connection.set_remote_description(answer)).await {
            Ok(()) => {
                info!("Remote description set successfully");
                self.flush_pending(&token).await;
                Ok(())
            }
            Err(e) => self.settle(&token, Err(e)).await,
        }
    }

    /// Create the connection for a new session and make it the live one.
    /// From here on a failure is cleaned up by `settle`.
    async fn open_session(
        &mut self,
        role: Role,
        token: &SessionToken,
        media: &E::Media,
    ) -> Result<Arc<E::Connection>> {
        let connection = token
            .guard(self.endpoint.create_connection(&self.config.ice))
            .await?;
        let connection = Arc::new(connection);

        let session = Session::new(role, Arc::clone(&connection), token.clone());
        info!(session = %session.id, ?role, "session created");
        self.session = Some(session);

        token.guard(connection.add_tracks(media)).await?;
        connection.on_event(self.hook_for(token));
        Ok(connection)
    }
}
