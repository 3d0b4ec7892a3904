mod common;

use common::*;
use peercall_lib::config::IceServerConfig;
use peercall_lib::peer::{RtcEndpoint, SignalingState};
use peercall_lib::{
    CallEvent, ControllerConfig, MediaConstraints, MemoryChannel, Role, SignalingController,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out: {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_call_between_two_controllers() {
    let ((caller_channel, caller_inbox), (callee_channel, callee_inbox)) = MemoryChannel::pair();
    let caller_endpoint = FakeEndpoint::new();
    let callee_endpoint = FakeEndpoint::new();

    let (caller, _) = SignalingController::spawn(
        caller_endpoint.clone(),
        Arc::new(caller_channel),
        ControllerConfig::default(),
    );
    let (callee, _) = SignalingController::spawn(
        callee_endpoint.clone(),
        Arc::new(callee_channel),
        ControllerConfig::default(),
    );
    caller.attach(caller_inbox);
    callee.attach(callee_inbox);

    callee.acquire_media().await.unwrap();
    caller.initiate_call().await.unwrap();

    let (caller_ref, callee_ref) = (&caller, &callee);
    eventually("both sides stable", || async move {
        let caller_state = caller_ref.snapshot().await.map(|s| s.signaling_state);
        let callee_state = callee_ref.snapshot().await.map(|s| s.signaling_state);
        caller_state == Some(SignalingState::Stable) && callee_state == Some(SignalingState::Stable)
    })
    .await;

    // Every trickled candidate reaches the other side, whichever way it raced
    let (caller_fake, callee_fake) = (&caller_endpoint, &callee_endpoint);
    eventually("candidates applied", || async move {
        caller_fake.last_connection().applied_candidates().len() == 2
            && callee_fake.last_connection().applied_candidates().len() == 2
    })
    .await;

    assert_eq!(caller.snapshot().await.unwrap().role, Role::Caller);
    assert_eq!(callee.snapshot().await.unwrap().role, Role::Callee);
    assert_eq!(
        callee_endpoint.last_connection().remote_description(),
        caller_endpoint.last_connection().local_description()
    );
    assert_eq!(
        caller_endpoint.last_connection().remote_description(),
        callee_endpoint.last_connection().local_description()
    );
}

#[tokio::test]
async fn test_refused_caller_hears_reason() {
    let ((a_channel, a_inbox), (b_channel, b_inbox)) = MemoryChannel::pair();
    let announce = ControllerConfig {
        announce_rejections: true,
        ..Default::default()
    };

    let (caller, _) =
        SignalingController::spawn(FakeEndpoint::new(), Arc::new(a_channel), announce.clone());
    let (callee, _) = SignalingController::spawn(FakeEndpoint::new(), Arc::new(b_channel), announce);
    let mut caller_events = caller.subscribe();
    caller.attach(a_inbox);
    callee.attach(b_inbox);

    // No media on the callee: the offer is refused and the caller hears why
    caller.initiate_call().await.unwrap();
    let ended = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let CallEvent::Ended { reason, .. } = caller_events.recv().await.unwrap() {
                return reason;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(
        ended,
        peercall_lib::EndReason::Rejected("media-unavailable".into())
    );
    assert!(callee.snapshot().await.is_none());
}

#[tokio::test]
#[ignore = "needs a usable network interface for ICE"]
async fn test_webrtc_peers_connect() {
    let ((caller_channel, caller_inbox), (callee_channel, callee_inbox)) = MemoryChannel::pair();
    let local_only = ControllerConfig {
        ice: IceServerConfig {
            ice_servers: Vec::new(),
        },
        ..Default::default()
    };
    let audio_only = MediaConstraints {
        audio: true,
        video: false,
    };

    let (caller, _) = SignalingController::spawn(
        RtcEndpoint::new(audio_only).unwrap(),
        Arc::new(caller_channel),
        local_only.clone(),
    );
    let (callee, _) = SignalingController::spawn(
        RtcEndpoint::new(audio_only).unwrap(),
        Arc::new(callee_channel),
        local_only,
    );
    let mut caller_events = caller.subscribe();
    caller.attach(caller_inbox);
    callee.attach(callee_inbox);

    callee.acquire_media().await.unwrap();
    caller.initiate_call().await.unwrap();

    tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            if let CallEvent::Connected { .. } = caller_events.recv().await.unwrap() {
                break;
            }
        }
    })
    .await
    .expect("peers never connected");

    caller.hangup().await.unwrap();
}
