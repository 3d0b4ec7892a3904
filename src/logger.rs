use crate::config::default_log_filter;
use crate::peer::ice::CandidateKind;
use crate::peer::types::IceCandidate;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the fmt subscriber. `RUST_LOG` wins over `filter`, which wins
/// over the build-profile default.
pub fn init(filter: Option<&str>) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter.unwrap_or(default_log_filter())))
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()));

    // A subscriber may already be installed (tests, embedding apps)
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Log a trickled ICE candidate as it appears
pub fn dump_candidate(label: &str, candidate: &IceCandidate) {
    debug!(
        "Trickle {label}: kind={:?} {}",
        CandidateKind::of(candidate),
        candidate.as_json()
    );
}

/// Tally of gathered candidate kinds
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateSummary {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
    pub other: usize,
}

pub fn analyze_candidates(kinds: &[CandidateKind]) -> CandidateSummary {
    let mut summary = CandidateSummary::default();
    for kind in kinds {
        match kind {
            CandidateKind::Host => summary.host += 1,
            CandidateKind::ServerReflexive => summary.srflx += 1,
            CandidateKind::Relay => summary.relay += 1,
            CandidateKind::PeerReflexive | CandidateKind::Unknown => summary.other += 1,
        }
    }

    info!(
        "Candidate analysis: {} host, {} srflx, {} relay",
        summary.host, summary.srflx, summary.relay
    );
    if summary.relay == 0 {
        warn!("No TURN relay candidates found! Connection through NAT may fail.");
    }
    summary
}
