use crate::config::IceServer;
use crate::error::{Error, Result};
use crate::peer::state::MAX_PENDING_CANDIDATES;
use crate::peer::types::IceCandidate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use webrtc::{
    api::APIBuilder,
    ice_transport::{
        ice_candidate::RTCIceCandidate, ice_gatherer_state::RTCIceGathererState,
        ice_server::RTCIceServer,
    },
    peer_connection::{configuration::RTCConfiguration, RTCPeerConnection},
};

/// Candidate type, read from the `typ` token of the candidate line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Host,
    ServerReflexive,
    PeerReflexive,
    Relay,
    Unknown,
}

impl CandidateKind {
    pub fn from_line(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if token == "typ" {
                return match tokens.next() {
                    Some("host") => CandidateKind::Host,
                    Some("srflx") => CandidateKind::ServerReflexive,
                    Some("prflx") => CandidateKind::PeerReflexive,
                    Some("relay") => CandidateKind::Relay,
                    _ => CandidateKind::Unknown,
                };
            }
        }
        CandidateKind::Unknown
    }

    pub fn of(candidate: &IceCandidate) -> Self {
        candidate
            .candidate_line()
            .map(|line| Self::from_line(&line))
            .unwrap_or(CandidateKind::Unknown)
    }
}

/// Remote candidates that arrived before the remote description was set.
/// Drained in arrival order once it is.
#[derive(Debug)]
pub struct CandidateBuffer {
    pending: Vec<IceCandidate>,
    limit: usize,
}

impl Default for CandidateBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_PENDING_CANDIDATES)
    }
}

impl CandidateBuffer {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            limit,
        }
    }

    /// Queue a candidate. A full buffer keeps the oldest ones and hands
    /// the new candidate back.
    pub fn push(&mut self, candidate: IceCandidate) -> std::result::Result<(), IceCandidate> {
        if self.pending.len() >= self.limit {
            return Err(candidate);
        }
        self.pending.push(candidate);
        Ok(())
    }

    pub fn take(&mut self) -> Vec<IceCandidate> {
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Outcome of probing one STUN/TURN server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A candidate of the expected kind was gathered through the server
    Reachable,
    /// Gathering completed without one
    Unreachable,
    TimedOut,
}

/// Candidate kind a working server of this URL scheme produces
pub fn expected_kind(url: &str) -> CandidateKind {
    if url.starts_with("turn:") || url.starts_with("turns:") {
        CandidateKind::Relay
    } else {
        CandidateKind::ServerReflexive
    }
}

/// Check that an ICE server answers, by gathering candidates through it alone
pub async fn probe_ice_server(server: &IceServer, wait: Duration) -> Result<ProbeOutcome> {
    let urls = server.normalized_urls();
    let Some(first) = urls.first() else {
        return Err(Error::InvalidConfig("ICE server has no URLs".into()));
    };
    let expected = expected_kind(first);
    info!(urls = ?urls, ?expected, "probing ICE server");

    let rtc_config = RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls: urls.clone(),
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
        }],
        ..Default::default()
    };

    let api = APIBuilder::new().build();
    let peer_connection = Arc::new(
        api.new_peer_connection(rtc_config)
            .await
            .map_err(|e| Error::Connection(format!("Failed to create peer connection: {}", e)))?,
    );

    let outcome = gather_through(&peer_connection, expected, wait).await;
    if let Err(e) = peer_connection.close().await {
        debug!("probe connection close failed: {}", e);
    }
    outcome
}

async fn gather_through(
    peer_connection: &Arc<RTCPeerConnection>,
    expected: CandidateKind,
    wait: Duration,
) -> Result<ProbeOutcome> {
    let (state_tx, mut state_rx) = mpsc::unbounded_channel();
    peer_connection.on_ice_gathering_state_change(Box::new(move |state| {
        debug!("probe gathering state: {:?}", state);
        let _ = state_tx.send(state);
        Box::pin(async {})
    }));

    let (found_tx, mut found_rx) = mpsc::unbounded_channel();
    peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        if let Some(line) = candidate
            .and_then(|c| c.to_json().ok())
            .map(|init| init.candidate)
        {
            let kind = CandidateKind::from_line(&line);
            debug!(?kind, "probe candidate: {}", line);
            if kind == expected {
                let _ = found_tx.send(());
            }
        }
        Box::pin(async {})
    }));

    // Gathering only starts once there is something to negotiate
    peer_connection
        .create_data_channel("probe", None)
        .await
        .map_err(|e| Error::Connection(format!("Failed to create data channel: {}", e)))?;
    let offer = peer_connection
        .create_offer(None)
        .await
        .map_err(|e| Error::Connection(format!("Failed to create offer: {}", e)))?;
    peer_connection
        .set_local_description(offer)
        .await
        .map_err(|e| Error::Connection(format!("Failed to set local description: {}", e)))?;

    let gathering_done = async {
        while let Some(state) = state_rx.recv().await {
            if state == RTCIceGathererState::Complete {
                break;
            }
        }
    };

    let outcome = timeout(wait, async {
        tokio::select! {
            Some(()) = found_rx.recv() => ProbeOutcome::Reachable,
            _ = gathering_done => {
                // The matching candidate may have been queued right before completion
                if found_rx.try_recv().is_ok() {
                    ProbeOutcome::Reachable
                } else {
                    ProbeOutcome::Unreachable
                }
            }
        }
    })
    .await
    .unwrap_or(ProbeOutcome::TimedOut);

    if outcome != ProbeOutcome::Reachable {
        warn!(?expected, ?outcome, "ICE server probe found no matching candidate");
    }
    Ok(outcome)
}
