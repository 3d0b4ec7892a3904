//! Seams between the signaling controller and the real-time media stack
//!
//! The controller drives negotiation only through these traits. The
//! webrtc-rs implementation lives in [`crate::peer::connection`]; tests
//! plug in fakes.

use crate::config::IceServerConfig;
use crate::error::Result;
use crate::peer::state::{ConnectionState, SignalingState};
use crate::peer::types::{IceCandidate, SessionDescription};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Something a connection reports on its own
#[derive(Debug, Clone)]
pub enum ConnectionEvent<R> {
    /// A local candidate was gathered; `None` marks the end of gathering
    LocalCandidate(Option<IceCandidate>),
    /// The remote side started sending media
    RemoteTrack(R),
    StateChanged(ConnectionState),
}

/// Callback registered on a connection. Must not block.
pub type EventHandler<R> = Arc<dyn Fn(ConnectionEvent<R>) + Send + Sync>;

/// Capability that captures local media and builds negotiable connections
#[async_trait]
pub trait MediaEndpoint: Send + Sync + 'static {
    /// Shared handle to the local capture source
    type Media: Clone + Debug + Send + Sync + 'static;

    /// What a connection surfaces when a remote track arrives
    type Remote: Clone + Debug + Send + Sync + 'static;

    type Connection: PeerConnection<Media = Self::Media, Remote = Self::Remote>;

    /// Open the local capture source; `MediaUnavailable` when denied or absent
    async fn acquire_media(&self) -> Result<Self::Media>;

    async fn create_connection(&self, ice: &IceServerConfig) -> Result<Self::Connection>;
}

/// A negotiable real-time connection
#[async_trait]
pub trait PeerConnection: Send + Sync + 'static {
    type Media;
    type Remote;

    /// Attach every track of the local source
    async fn add_tracks(&self, media: &Self::Media) -> Result<()>;

    /// Register the handler for candidate, track and state events
    fn on_event(&self, handler: EventHandler<Self::Remote>);

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, sdp: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, sdp: SessionDescription) -> Result<()>;

    async fn has_remote_description(&self) -> bool;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    fn signaling_state(&self) -> SignalingState;

    async fn close(&self) -> Result<()>;
}
