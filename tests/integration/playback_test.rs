//! Integration Test: file playback into a call leg
//!
//! Plays a short WAV file to a loopback peer on a threaded ticker. End of
//! file must reach call control as exactly one hangup, delivered on the
//! tokio runtime while the ticker keeps running.
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


use rms_media::{
    play_file, release_call_leg_media, stop_media, CallId, HangupDispatcher, LegActivity,
    LifecycleOp, MediaError, PayloadType, TeardownOutcome, PIPELINE_RECEIVE, PIPELINE_SEND,
};
use rms_tests::{
    provisioned_leg, threaded_engine, wait_for, write_wav, Peer, RecordingCallControl,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_playback_hangs_up_once_at_end_of_file() {
    let test = threaded_engine();
    let events = test.engine.take_event_receiver().unwrap();
    let control = Arc::new(RecordingCallControl::default());
    let dispatcher = HangupDispatcher::spawn(events, control.clone());

    let dir = tempfile::tempdir().unwrap();
    // 200 ms at 16 kHz, resampled to the 8 kHz codec clock
    let file = write_wav(dir.path(), "prompt.wav", 16000, 3200);

    let mut peer = Peer::bind();
    let mut leg = provisioned_leg(&test.engine, "C1", peer.addr(), PayloadType::pcmu());
    let leg_addr = leg.local_rtp_addr().unwrap();

    play_file(&mut leg, &file).unwrap();
    assert_eq!(leg.activity(), LegActivity::Playback);
    let names = leg
        .ticker()
        .unwrap()
        .with_graph(|g| g.pipeline_names().iter().map(|n| n.to_string()).collect::<Vec<_>>());
    assert_eq!(names, vec![PIPELINE_SEND, PIPELINE_RECEIVE]);

    // Inbound audio goes to the void sink
    for i in 0..3u8 {
        peer.send(leg_addr, 0, &[i; 160]);
    }

    tokio::time::timeout(Duration::from_secs(5), control.notify.notified())
        .await
        .expect("hangup after end of file");
    assert_eq!(control.hangups(), vec![CallId::from("C1")]);
    println!("Hangup received for C1");

    // The ticker was not blocked by the notification and keeps running
    let ticks_at_eof = leg.ticker().unwrap().tick_count();
    let ticker = leg.ticker().unwrap();
    assert!(wait_for(Duration::from_secs(2), || ticker.tick_count() > ticks_at_eof + 3));

    // Still exactly one hangup
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(control.hangups().len(), 1);

    let player = leg.player().cloned().unwrap();
    let void_sink = leg.void_sink().cloned().unwrap();
    let outcome = stop_media(&mut leg).unwrap();
    let report = outcome.report().unwrap();

    // 1600 samples at 8 kHz in 20 ms frames
    let stats = report.session("playback").unwrap();
    assert_eq!(stats.packets_sent, 10);
    assert_eq!(stats.packets_received, 3);
    assert_eq!(report.unlinked, 3);
    assert_eq!(report.destroyed, 6);

    let received = peer.drain();
    assert_eq!(received.len(), 10);
    assert!(received.iter().all(|(h, p)| h.payload_type == 0 && p.len() == 160));
    assert!(received[0].0.marker);
    for pair in received.windows(2) {
        assert_eq!(pair[1].0.sequence_number, pair[0].0.sequence_number.wrapping_add(1));
        assert_eq!(pair[1].0.timestamp, pair[0].0.timestamp.wrapping_add(160));
    }

    let lifecycle = vec![
        LifecycleOp::Created,
        LifecycleOp::Linked,
        LifecycleOp::Attached,
        LifecycleOp::Detached,
        LifecycleOp::Unlinked,
        LifecycleOp::Destroyed,
    ];
    assert_eq!(player.history(), lifecycle);
    assert_eq!(void_sink.history(), lifecycle);
    assert_eq!(
        leg.decoder().map(|d| d.history()),
        None,
        "provisioned filters are cleared from the leg"
    );

    assert_eq!(stop_media(&mut leg).unwrap(), TeardownOutcome::NotActive);
    release_call_leg_media(&mut leg).unwrap();
    assert_eq!(test.pool.snapshot().live_buffers(), 0);

    drop(test);
    dispatcher.abort();
}

#[test]
fn test_stop_media_on_idle_leg_is_not_active() {
    let test = threaded_engine();
    let peer = Peer::bind();
    let mut leg = provisioned_leg(&test.engine, "idle", peer.addr(), PayloadType::pcma());

    assert_eq!(stop_media(&mut leg).unwrap(), TeardownOutcome::NotActive);
    assert_eq!(leg.rtp_send().unwrap().history(), vec![LifecycleOp::Created]);
}

#[test]
fn test_play_unreadable_file_leaves_leg_idle() {
    let test = threaded_engine();
    let peer = Peer::bind();
    let mut leg = provisioned_leg(&test.engine, "bad-file", peer.addr(), PayloadType::pcmu());

    let dir = tempfile::tempdir().unwrap();
    let not_wav = dir.path().join("notes.txt");
    std::fs::write(&not_wav, b"not audio").unwrap();

    assert!(matches!(play_file(&mut leg, &not_wav), Err(MediaError::Playback(_))));
    assert_eq!(leg.activity(), LegActivity::Idle);
    assert!(leg.ticker().is_none());
    assert!(leg.player().is_none());
    assert_eq!(leg.encoder().unwrap().history(), vec![LifecycleOp::Created]);

    // The leg is still usable
    let file = write_wav(dir.path(), "ok.wav", 8000, 160);
    play_file(&mut leg, &file).unwrap();
    assert!(stop_media(&mut leg).unwrap().is_stopped());
}
