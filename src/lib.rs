pub mod channel;
mod commands;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod logger;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod utils;

pub use channel::{MemoryChannel, SignalChannel, SignalStream, WebSocketChannel};
pub use config::{AppConfig, ControllerConfig, IceServer, IceServerConfig, MediaConstraints};
pub use controller::{ControllerHandle, SignalingController};
pub use error::{Error, Result};
pub use events::{CallEvent, EndReason, EndpointEvent};
pub use session::{Role, SessionSnapshot};
pub use signaling::Message;

use bytes::Bytes;
use peer::ice::{probe_ice_server, ProbeOutcome};
use peer::state::PROBE_TIMEOUT;
use peer::{RtcEndpoint, RtcLocalMedia, RtcRemoteTrack, TrackKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One Opus frame of silence
const SILENT_OPUS_FRAME: [u8; 3] = [0xf8, 0xff, 0xfe];
const SILENT_FRAME_DURATION: Duration = Duration::from_millis(20);

/// Run one endpoint against a WebSocket relay until interrupted or the
/// relay goes away.
pub async fn run(config: AppConfig) -> Result<()> {
    config.validate()?;

    let endpoint = RtcEndpoint::new(config.media)?;
    let (channel, inbound) = WebSocketChannel::connect(&config.signaling_url).await?;
    let (controller, task) =
        SignalingController::spawn(endpoint, Arc::new(channel), config.controller.clone());
    let mut events = controller.subscribe();

    // Media up front, so an inbound offer can be answered
    let media = controller.acquire_media().await?;
    let feeder = config.media.audio.then(|| feed_silence(media));
    let mut pump = controller.attach(inbound);

    if config.start_call {
        controller.initiate_call().await?;
    } else {
        info!("waiting for an incoming call on {}", config.signaling_url);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, hanging up");
                controller.hangup().await?;
                break;
            }
            _ = &mut pump => {
                warn!("signaling relay closed");
                break;
            }
            event = events.recv() => match event {
                Ok(CallEvent::LocalPreview(media)) => info!("local preview ready: {:?}", media),
                Ok(CallEvent::RemoteStream(track)) => {
                    info!("remote {} track {} on stream {}", track.kind, track.id, track.stream_id);
                    drain_remote(track);
                }
                Ok(CallEvent::Connected { session }) => info!(%session, "call connected"),
                Ok(CallEvent::Ended { session, reason }) => {
                    info!(%session, ?reason, "call ended");
                    if config.start_call {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "event subscriber lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Some(feeder) = feeder {
        feeder.abort();
    }
    pump.abort();
    drop(controller);
    if let Err(e) = task.await {
        error!("controller task failed: {}", e);
    }
    Ok(())
}

/// Probe every configured ICE server; true when all of them answered
pub async fn probe(servers: &IceServerConfig) -> Result<bool> {
    servers.validate()?;

    let mut all_reachable = true;
    for server in &servers.ice_servers {
        let outcome = probe_ice_server(server, PROBE_TIMEOUT).await?;
        let urls = server.normalized_urls().join(", ");
        match outcome {
            ProbeOutcome::Reachable => info!("ICE server reachable: {}", urls),
            ProbeOutcome::Unreachable => warn!("ICE server unreachable: {}", urls),
            ProbeOutcome::TimedOut => warn!("ICE server timed out: {}", urls),
        }
        all_reachable &= outcome == ProbeOutcome::Reachable;
    }
    Ok(all_reachable)
}

/// Keep the audio track ticking so the remote side receives RTP
fn feed_silence(media: RtcLocalMedia) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SILENT_FRAME_DURATION);
        loop {
            ticker.tick().await;
            let frame = Bytes::from_static(&SILENT_OPUS_FRAME);
            if let Err(e) = media
                .write_sample(TrackKind::Audio, frame, SILENT_FRAME_DURATION)
                .await
            {
                warn!("audio feed stopped: {}", e);
                break;
            }
        }
    })
}

/// Read a remote track to the end, logging what arrives
fn drain_remote(remote: RtcRemoteTrack) {
    tokio::spawn(async move {
        let mut packets: u64 = 0;
        while remote.track.read_rtp().await.is_ok() {
            packets += 1;
            if packets % 500 == 0 {
                debug!(track = %remote.id, packets, "remote media flowing");
            }
        }
        info!(track = %remote.id, packets, "remote track ended");
    });
}
