//! In-memory endpoint and channel for driving the controller in tests

#![allow(dead_code)]

use async_trait::async_trait;
use peercall_lib::config::IceServerConfig;
use peercall_lib::peer::{
    ConnectionEvent, ConnectionState, EventHandler, IceCandidate, MediaEndpoint, PeerConnection,
    SessionDescription, SignalingState,
};
use peercall_lib::{Error, Result, SignalChannel};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeMedia(pub usize);

/// Endpoint whose connections follow the offer/answer state machine
/// without touching the network
#[derive(Clone, Default)]
pub struct FakeEndpoint {
    inner: Arc<EndpointInner>,
}

#[derive(Default)]
struct EndpointInner {
    deny_media: AtomicBool,
    media_opened: AtomicUsize,
    fail_remote_description: AtomicBool,
    offer_delay: Mutex<Option<Duration>>,
    connections: Mutex<Vec<Arc<ConnectionInner>>>,
}

impl FakeEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_media(&self) {
        self.inner.deny_media.store(true, Ordering::SeqCst);
    }

    pub fn fail_remote_description(&self) {
        self.inner.fail_remote_description.store(true, Ordering::SeqCst);
    }

    /// Make `create_offer` suspend for `delay`
    pub fn slow_offer(&self, delay: Duration) {
        *self.inner.offer_delay.lock().unwrap() = Some(delay);
    }

    pub fn media_opened(&self) -> usize {
        self.inner.media_opened.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> Vec<FakeConnection> {
        self.inner
            .connections
            .lock()
            .unwrap()
            .iter()
            .map(|inner| FakeConnection {
                inner: Arc::clone(inner),
            })
            .collect()
    }

    pub fn last_connection(&self) -> FakeConnection {
        self.connections()
            .pop()
            .expect("no connection was created")
    }
}

#[async_trait]
impl MediaEndpoint for FakeEndpoint {
    type Media = FakeMedia;
    type Remote = String;
    type Connection = FakeConnection;

    async fn acquire_media(&self) -> Result<FakeMedia> {
        if self.inner.deny_media.load(Ordering::SeqCst) {
            return Err(Error::MediaUnavailable("permission denied".into()));
        }
        let id = self.inner.media_opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeMedia(id))
    }

    async fn create_connection(&self, _ice: &IceServerConfig) -> Result<FakeConnection> {
        let mut connections = self.inner.connections.lock().unwrap();
        let inner = Arc::new(ConnectionInner {
            id: connections.len(),
            offer_delay: *self.inner.offer_delay.lock().unwrap(),
            fail_remote_description: self.inner.fail_remote_description.load(Ordering::SeqCst),
            state: Mutex::new(ConnectionData {
                signaling: SignalingState::Stable,
                remote: None,
                local: None,
                applied: Vec::new(),
                tracks: Vec::new(),
                handler: None,
                closed: false,
            }),
        });
        connections.push(Arc::clone(&inner));
        Ok(FakeConnection { inner })
    }
}

struct ConnectionInner {
    id: usize,
    offer_delay: Option<Duration>,
    fail_remote_description: bool,
    state: Mutex<ConnectionData>,
}

struct ConnectionData {
    signaling: SignalingState,
    remote: Option<SessionDescription>,
    local: Option<SessionDescription>,
    applied: Vec<IceCandidate>,
    tracks: Vec<FakeMedia>,
    handler: Option<EventHandler<String>>,
    closed: bool,
}

#[derive(Clone)]
pub struct FakeConnection {
    inner: Arc<ConnectionInner>,
}

pub fn sdp(kind: &str, body: &str) -> SessionDescription {
    SessionDescription::from_value(&json!({ "type": kind, "sdp": body })).unwrap()
}

pub fn host_candidate(port: u16) -> IceCandidate {
    IceCandidate::from_value(&json!({
        "candidate": format!("candidate:1 1 udp 2122260223 10.0.0.1 {} typ host", port),
        "sdpMid": "0",
        "sdpMLineIndex": 0,
    }))
    .unwrap()
}

fn sdp_type(sdp: &SessionDescription) -> Option<String> {
    let value: Value = sdp.to_value().ok()?;
    value.get("type")?.as_str().map(str::to_owned)
}

impl FakeConnection {
    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.inner.state.lock().unwrap().applied.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.inner.state.lock().unwrap().remote.clone()
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.inner.state.lock().unwrap().local.clone()
    }

    pub fn tracks(&self) -> Vec<FakeMedia> {
        self.inner.state.lock().unwrap().tracks.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().unwrap().closed
    }

    /// Report something from the "media stack" side
    pub fn emit(&self, event: ConnectionEvent<String>) {
        let handler = self.inner.state.lock().unwrap().handler.clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    pub fn emit_state(&self, state: ConnectionState) {
        self.emit(ConnectionEvent::StateChanged(state));
    }

    fn check_open(&self) -> Result<()> {
        if self.inner.state.lock().unwrap().closed {
            return Err(Error::Connection("connection is closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PeerConnection for FakeConnection {
    type Media = FakeMedia;
    type Remote = String;

    async fn add_tracks(&self, media: &FakeMedia) -> Result<()> {
        self.check_open()?;
        self.inner.state.lock().unwrap().tracks.push(media.clone());
        Ok(())
    }

    fn on_event(&self, handler: EventHandler<String>) {
        self.inner.state.lock().unwrap().handler = Some(handler);
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        if let Some(delay) = self.inner.offer_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_open()?;
        Ok(sdp("offer", &format!("offer-{}", self.inner.id)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.check_open()?;
        if self.inner.state.lock().unwrap().signaling != SignalingState::HaveRemoteOffer {
            return Err(Error::Connection("no remote offer to answer".into()));
        }
        Ok(sdp("answer", &format!("answer-{}", self.inner.id)))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.check_open()?;
        {
            let mut state = self.inner.state.lock().unwrap();
            state.signaling = match (sdp_type(&desc).as_deref(), state.signaling) {
                (Some("offer"), SignalingState::Stable) => SignalingState::HaveLocalOffer,
                (Some("answer"), SignalingState::HaveRemoteOffer) => SignalingState::Stable,
                (kind, current) => {
                    return Err(Error::Connection(format!(
                        "cannot apply local {:?} in {}",
                        kind, current
                    )))
                }
            };
            state.local = Some(desc);
        }

        // Gathering starts once a local description is in place
        let port = 50000 + self.inner.id as u16 * 10;
        self.emit(ConnectionEvent::LocalCandidate(Some(host_candidate(port))));
        self.emit(ConnectionEvent::LocalCandidate(Some(host_candidate(port + 1))));
        self.emit(ConnectionEvent::LocalCandidate(None));
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.check_open()?;
        if self.inner.fail_remote_description {
            return Err(Error::Connection("remote description refused".into()));
        }
        let mut state = self.inner.state.lock().unwrap();
        state.signaling = match (sdp_type(&desc).as_deref(), state.signaling) {
            (Some("offer"), SignalingState::Stable) => SignalingState::HaveRemoteOffer,
            (Some("answer"), SignalingState::HaveLocalOffer) => SignalingState::Stable,
            (kind, current) => {
                return Err(Error::Connection(format!(
                    "cannot apply remote {:?} in {}",
                    kind, current
                )))
            }
        };
        state.remote = Some(desc);
        Ok(())
    }

    async fn has_remote_description(&self) -> bool {
        self.inner.state.lock().unwrap().remote.is_some()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.check_open()?;
        let mut state = self.inner.state.lock().unwrap();
        if state.remote.is_none() {
            return Err(Error::Connection("remote description not set".into()));
        }
        state.applied.push(candidate);
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        let state = self.inner.state.lock().unwrap();
        if state.closed {
            SignalingState::Closed
        } else {
            state.signaling
        }
    }

    async fn close(&self) -> Result<()> {
        self.inner.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Channel that records every outbound frame
#[derive(Clone, Default)]
pub struct RecordingChannel {
    sent: Arc<Mutex<Vec<String>>>,
    broken: Arc<AtomicBool>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later send fail
    pub fn break_link(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    pub fn sent_types(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|message| message["type"].as_str().unwrap_or_default().to_owned())
            .collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.sent_types().iter().filter(|sent| *sent == kind).count()
    }
}

#[async_trait]
impl SignalChannel for RecordingChannel {
    async fn send(&self, text: String) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(Error::TransportError("link down".into()));
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }
}

pub fn offer_message(body: &str) -> String {
    json!({ "type": "offer", "sdp": { "type": "offer", "sdp": body } }).to_string()
}

pub fn answer_message(body: &str) -> String {
    json!({ "type": "answer", "sdp": { "type": "answer", "sdp": body } }).to_string()
}

pub fn candidate_message(port: u16) -> String {
    json!({
        "type": "candidate",
        "candidate": {
            "candidate": format!("candidate:1 1 udp 2122260223 10.0.0.1 {} typ host", port),
            "sdpMid": "0",
            "sdpMLineIndex": 0,
        }
    })
    .to_string()
}
