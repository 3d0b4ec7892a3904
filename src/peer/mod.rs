pub mod connection;
pub mod endpoint;
pub mod ice;
pub mod state;
pub mod types;

pub use connection::{RtcConnection, RtcEndpoint, RtcLocalMedia, RtcRemoteTrack, TrackKind};
pub use endpoint::{ConnectionEvent, EventHandler, MediaEndpoint, PeerConnection};
pub use state::{ConnectionState, SignalingState};
pub use types::{IceCandidate, SessionDescription};
