//! webrtc-rs implementation of the media endpoint

use crate::config::{IceServerConfig, MediaConstraints};
use crate::error::{Error, Result};
use crate::logger::dump_candidate;
use crate::peer::endpoint::{ConnectionEvent, EventHandler, MediaEndpoint, PeerConnection};
use crate::peer::state::{ConnectionState, SignalingState};
use crate::peer::types::{IceCandidate, SessionDescription};
use crate::utils::random_id;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Local capture source: one sample track per enabled kind.
///
/// Clones share the same tracks, so the preview and every connection of
/// the call see the same samples.
#[derive(Clone)]
pub struct RtcLocalMedia {
    stream_id: String,
    audio: Option<Arc<TrackLocalStaticSample>>,
    video: Option<Arc<TrackLocalStaticSample>>,
}

impl RtcLocalMedia {
    fn open(constraints: MediaConstraints) -> Self {
        let stream_id = format!("peercall-{}", random_id());
        let track = |mime_type: &str, clock_rate: u32, channels: u16, kind: &str| {
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: mime_type.to_owned(),
                    clock_rate,
                    channels,
                    ..Default::default()
                },
                format!("{}-{}", kind, stream_id),
                stream_id.clone(),
            ))
        };

        Self {
            audio: constraints
                .audio
                .then(|| track(MIME_TYPE_OPUS, 48000, 2, "audio")),
            video: constraints
                .video
                .then(|| track(MIME_TYPE_VP8, 90000, 0, "video")),
            stream_id,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    fn tracks(&self) -> impl Iterator<Item = &Arc<TrackLocalStaticSample>> {
        self.audio.iter().chain(self.video.iter())
    }

    /// Push one encoded sample (Opus for audio, VP8 for video)
    pub async fn write_sample(&self, kind: TrackKind, data: Bytes, duration: Duration) -> Result<()> {
        let track = match kind {
            TrackKind::Audio => self.audio.as_ref(),
            TrackKind::Video => self.video.as_ref(),
        }
        .ok_or_else(|| Error::MediaUnavailable(format!("{:?} is not being captured", kind)))?;

        track
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Connection(format!("Failed to write sample: {}", e)))
    }
}

impl fmt::Debug for RtcLocalMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtcLocalMedia")
            .field("stream_id", &self.stream_id)
            .field("audio", &self.audio.is_some())
            .field("video", &self.video.is_some())
            .finish()
    }
}

/// A track the remote peer is sending
#[derive(Clone)]
pub struct RtcRemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: &'static str,
    pub track: Arc<TrackRemote>,
}

impl fmt::Debug for RtcRemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtcRemoteTrack")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Builds webrtc-rs peer connections with the default codecs and interceptors
pub struct RtcEndpoint {
    api: API,
    constraints: MediaConstraints,
}

impl RtcEndpoint {
    pub fn new(constraints: MediaConstraints) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::Connection(format!("Failed to register codecs: {}", e)))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| Error::Connection(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api, constraints })
    }
}

#[async_trait]
impl MediaEndpoint for RtcEndpoint {
    type Media = RtcLocalMedia;
    type Remote = RtcRemoteTrack;
    type Connection = RtcConnection;

    async fn acquire_media(&self) -> Result<RtcLocalMedia> {
        if self.constraints.is_empty() {
            return Err(Error::MediaUnavailable(
                "neither audio nor video capture is enabled".into(),
            ));
        }
        let media = RtcLocalMedia::open(self.constraints);
        info!(stream_id = %media.stream_id, "local media opened");
        Ok(media)
    }

    async fn create_connection(&self, ice: &IceServerConfig) -> Result<RtcConnection> {
        let pc = self
            .api
            .new_peer_connection(rtc_config(ice))
            .await
            .map_err(|e| Error::Connection(format!("Failed to create peer connection: {}", e)))?;

        let connection = RtcConnection {
            id: random_id(),
            pc: Arc::new(pc),
        };
        debug!(connection = %connection.id, "peer connection created");
        Ok(connection)
    }
}

/// Configuration for a new peer connection
fn rtc_config(ice: &IceServerConfig) -> RTCConfiguration {
    let ice_servers = ice
        .ice_servers
        .iter()
        .map(|server| RTCIceServer {
            urls: server.normalized_urls(),
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
        })
        .collect();

    RTCConfiguration {
        ice_servers,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

fn signaling_state(state: RTCSignalingState) -> SignalingState {
    match state {
        RTCSignalingState::HaveLocalOffer | RTCSignalingState::HaveRemotePranswer => {
            SignalingState::HaveLocalOffer
        }
        RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveLocalPranswer => {
            SignalingState::HaveRemoteOffer
        }
        RTCSignalingState::Closed => SignalingState::Closed,
        _ => SignalingState::Stable,
    }
}

fn connection_state(state: RTCPeerConnectionState) -> Option<ConnectionState> {
    Some(match state {
        RTCPeerConnectionState::New => ConnectionState::New,
        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
        RTCPeerConnectionState::Connected => ConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => ConnectionState::Failed,
        RTCPeerConnectionState::Closed => ConnectionState::Closed,
        _ => return None,
    })
}

/// One webrtc-rs peer connection
pub struct RtcConnection {
    id: String,
    pc: Arc<RTCPeerConnection>,
}

impl RtcConnection {
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }
}

#[async_trait]
impl PeerConnection for RtcConnection {
    type Media = RtcLocalMedia;
    type Remote = RtcRemoteTrack;

    async fn add_tracks(&self, media: &RtcLocalMedia) -> Result<()> {
        for track in media.tracks() {
            let sender = self
                .pc
                .add_track(Arc::clone(track) as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(|e| Error::Connection(format!("Failed to add track: {}", e)))?;

            // RTCP has to be drained for the interceptors to work
            tokio::spawn(async move {
                let mut rtcp_buf = vec![0u8; 1500];
                while sender.read(&mut rtcp_buf).await.is_ok() {}
            });
        }
        Ok(())
    }

    fn on_event(&self, handler: EventHandler<RtcRemoteTrack>) {
        let on_candidate = Arc::clone(&handler);
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let event = match candidate.map(|c| c.to_json()) {
                    None => Some(None),
                    Some(Ok(init)) => match IceCandidate::from_value(&init) {
                        Ok(candidate) => {
                            dump_candidate("LOCAL", &candidate);
                            Some(Some(candidate))
                        }
                        Err(e) => {
                            warn!("cannot encode local candidate: {}", e);
                            None
                        }
                    },
                    Some(Err(e)) => {
                        warn!("cannot serialize local candidate: {}", e);
                        None
                    }
                };
                if let Some(candidate) = event {
                    on_candidate(ConnectionEvent::LocalCandidate(candidate));
                }
                Box::pin(async {})
            }));

        let on_track = Arc::clone(&handler);
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let kind = match track.kind() {
                    RTPCodecType::Audio => "audio",
                    RTPCodecType::Video => "video",
                    _ => "unknown",
                };
                let remote = RtcRemoteTrack {
                    id: track.id(),
                    stream_id: track.stream_id(),
                    kind,
                    track,
                };
                on_track(ConnectionEvent::RemoteTrack(remote));
                Box::pin(async {})
            },
        ));

        let on_state = handler;
        let id = self.id.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                debug!(connection = %id, "peer connection state changed to: {:?}", state);
                if let Some(state) = connection_state(state) {
                    on_state(ConnectionEvent::StateChanged(state));
                }
                Box::pin(async {})
            }));
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| Error::Connection(format!("Failed to create offer: {}", e)))?;
        SessionDescription::from_value(&offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::Connection(format!("Failed to create answer: {}", e)))?;
        SessionDescription::from_value(&answer)
    }

    async fn set_local_description(&self, sdp: SessionDescription) -> Result<()> {
        let description: RTCSessionDescription = sdp.to_value()?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(|e| Error::Connection(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, sdp: SessionDescription) -> Result<()> {
        let description: RTCSessionDescription = sdp.to_value()?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|e| Error::Connection(format!("Failed to set remote description: {}", e)))
    }

    async fn has_remote_description(&self) -> bool {
        self.pc.remote_description().await.is_some()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init: RTCIceCandidateInit = candidate.to_value()?;
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::Connection(format!("Failed to add ICE candidate: {}", e)))
    }

    fn signaling_state(&self) -> SignalingState {
        signaling_state(self.pc.signaling_state())
    }

    async fn close(&self) -> Result<()> {
        info!(connection = %self.id, "closing peer connection");
        self.pc
            .close()
            .await
            .map_err(|e| Error::Connection(format!("Failed to close connection: {}", e)))
    }
}
