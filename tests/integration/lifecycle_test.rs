//! Integration Test: engine lifecycle and partial-build safety
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use rms_config::MediaServerConfig;
use rms_media::{
    bridge, create_call_leg_media, engine, initialize_engine, play_file,
    release_call_leg_media, shutdown_engine, stop_bridge, CallId, CallLegMedia, FilterKind,
    MediaError, PayloadType, SharedMemoryPool, TeardownOutcome,
};
use rms_tests::{manual_engine, provisioned_leg, write_wav, Peer, LOCALHOST};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

#[test]
fn test_process_engine_install_and_shutdown() {
    // Only test in this binary touching the global engine
    let pool = Arc::new(SharedMemoryPool::new());
    let installed = initialize_engine(MediaServerConfig::default(), pool.clone()).unwrap();
    assert!(matches!(
        initialize_engine(MediaServerConfig::default(), pool.clone()),
        Err(MediaError::EngineAlreadyInitialized)
    ));

    let peer = Peer::bind();
    let mut leg = CallLegMedia::new(
        SocketAddr::new(LOCALHOST, 0),
        peer.addr(),
        PayloadType::pcmu(),
    );
    create_call_leg_media(&engine().unwrap(), &mut leg, CallId::from("global")).unwrap();
    release_call_leg_media(&mut leg).unwrap();

    assert!(shutdown_engine());
    assert!(!shutdown_engine());
    assert!(matches!(engine(), Err(MediaError::EngineNotInitialized)));

    let mut late = CallLegMedia::new(
        SocketAddr::new(LOCALHOST, 0),
        peer.addr(),
        PayloadType::pcmu(),
    );
    assert!(matches!(
        create_call_leg_media(&installed, &mut late, CallId::from("late")),
        Err(MediaError::EngineShutDown)
    ));
    assert_eq!(pool.snapshot().live_buffers(), 0);
}

#[test]
fn test_failed_provisioning_holds_nothing() {
    let test = manual_engine();
    let peer = Peer::bind();

    // Port in use
    let squatter = UdpSocket::bind((LOCALHOST, 0)).unwrap();
    let taken = squatter.local_addr().unwrap();
    let mut leg = CallLegMedia::new(taken, peer.addr(), PayloadType::pcmu());
    assert!(matches!(
        create_call_leg_media(&test.engine, &mut leg, CallId::from("busy")),
        Err(MediaError::Network(_))
    ));
    assert!(!leg.is_provisioned());
    assert!(leg.session().is_none());
    assert!(leg.filter_handles().is_empty());

    // Codec without an encoder
    let mut leg = CallLegMedia::new(
        SocketAddr::new(LOCALHOST, 0),
        peer.addr(),
        PayloadType::new(9, "G722", 8000),
    );
    assert!(matches!(
        create_call_leg_media(&test.engine, &mut leg, CallId::from("g722")),
        Err(MediaError::UnsupportedCodec(_))
    ));
    assert!(!leg.is_provisioned());
    assert!(leg.filter_handles().is_empty());

    // Releasing a leg that never got resources is harmless
    release_call_leg_media(&mut leg).unwrap();
}

#[test]
fn test_failed_bridge_and_playback_leave_legs_reusable() {
    let test = manual_engine();
    let peer = Peer::bind();
    let mut leg_a = provisioned_leg(&test.engine, "a", peer.addr(), PayloadType::pcmu());
    let mut leg_b = provisioned_leg(&test.engine, "b", peer.addr(), PayloadType::pcma());

    assert!(matches!(
        bridge(&mut leg_a, &mut leg_b),
        Err(MediaError::CodecMismatch { .. })
    ));
    assert!(leg_a.ticker().is_none());
    for filter in leg_a.filter_handles().into_iter().chain(leg_b.filter_handles()) {
        assert_eq!(filter.link_count(), 0);
        assert!(!filter.is_attached());
    }

    assert!(play_file(&mut leg_a, "/nonexistent/prompt.wav").is_err());
    let players = leg_a
        .factory()
        .unwrap()
        .statistics()
        .into_iter()
        .find(|(kind, _)| *kind == FilterKind::FilePlayer)
        .map(|(_, stats)| stats)
        .unwrap();
    assert_eq!(players.created, 1);
    assert_eq!(players.alive(), 0);

    let dir = tempfile::tempdir().unwrap();
    let file = write_wav(dir.path(), "prompt.wav", 8000, 800);
    play_file(&mut leg_a, &file).unwrap();
    assert!(matches!(
        stop_bridge(&mut leg_a, &mut leg_b),
        Err(MediaError::InvalidLegState(_))
    ));

    release_call_leg_media(&mut leg_a).unwrap();
    release_call_leg_media(&mut leg_b).unwrap();
    assert_eq!(stop_bridge(&mut leg_a, &mut leg_b).unwrap(), TeardownOutcome::NotActive);
    assert_eq!(test.pool.snapshot().live_buffers(), 0);
}
