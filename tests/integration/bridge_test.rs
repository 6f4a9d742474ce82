//! Integration Test: bidirectional bridge between two call legs
//!
//! Two loopback peers play the remote endpoints. Packets sent by the peer
//! of leg A must come out of leg B towards the peer of leg B, and the other
//! way round, until the bridge is stopped.
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
    bridge, release_call_leg_media, stop_bridge, FilterHandle, LegActivity, LifecycleOp,
    PayloadType, TeardownOutcome, PIPELINE_A_TO_B, PIPELINE_B_TO_A,
};
use rms_tests::{manual_engine, provisioned_leg, Peer};
use std::time::{Duration, Instant};

const FULL_LIFECYCLE: [LifecycleOp; 6] = [
    LifecycleOp::Created,
    LifecycleOp::Linked,
    LifecycleOp::Attached,
    LifecycleOp::Detached,
    LifecycleOp::Unlinked,
    LifecycleOp::Destroyed,
];

fn handles(leg: &rms_media::CallLegMedia) -> [FilterHandle; 4] {
    [
        leg.rtp_recv().cloned().unwrap(),
        leg.rtp_send().cloned().unwrap(),
        leg.encoder().cloned().unwrap(),
        leg.decoder().cloned().unwrap(),
    ]
}

#[test]
fn test_bridge_relays_both_directions() {
    let test = manual_engine();
    let mut peer_a = Peer::bind();
    let mut peer_b = Peer::bind();

    let mut leg_a = provisioned_leg(&test.engine, "call-a", peer_a.addr(), PayloadType::pcmu());
    let mut leg_b = provisioned_leg(&test.engine, "call-b", peer_b.addr(), PayloadType::pcmu());
    let leg_a_addr = leg_a.local_rtp_addr().unwrap();
    let leg_b_addr = leg_b.local_rtp_addr().unwrap();
    let [a_recv, a_send, a_encoder, a_decoder] = handles(&leg_a);
    let [b_recv, b_send, b_encoder, b_decoder] = handles(&leg_b);

    bridge(&mut leg_a, &mut leg_b).unwrap();
    println!("Legs bridged: {} <-> {}", leg_a_addr, leg_b_addr);

    // Symmetric topology on a single ticker owned by leg A
    let ticker = leg_a.ticker().unwrap();
    assert!(leg_b.ticker().is_none());
    assert_eq!(
        ticker.with_graph(|g| g.pipeline_names().len()),
        2
    );
    assert_eq!(ticker.entry_points(), vec![a_recv.id(), b_recv.id()]);

    for i in 0..5u8 {
        peer_a.send(leg_a_addr, 0, &[i; 160]);
        peer_b.send(leg_b_addr, 0, &[0x80 | i; 160]);
    }

    let mut at_b = Vec::new();
    let mut at_a = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(3);
    while (at_b.len() < 5 || at_a.len() < 5) && Instant::now() < deadline {
        ticker.tick();
        at_b.extend(peer_b.drain());
        at_a.extend(peer_a.drain());
        std::thread::sleep(Duration::from_millis(2));
    }

    // A's caller is heard on B and B's caller on A, unchanged and in order
    let payloads_b: Vec<u8> = at_b.iter().map(|(_, p)| p[0]).collect();
    let payloads_a: Vec<u8> = at_a.iter().map(|(_, p)| p[0]).collect();
    assert_eq!(payloads_b, vec![0, 1, 2, 3, 4]);
    assert_eq!(payloads_a, vec![0x80, 0x81, 0x82, 0x83, 0x84]);
    assert!(at_b.iter().all(|(h, p)| h.payload_type == 0 && p.len() == 160));

    // No transcoding: codec filters never join the bridge
    assert!(!a_encoder.is_attached());
    assert!(!b_decoder.is_attached());

    let outcome = stop_bridge(&mut leg_a, &mut leg_b).unwrap();
    let report = outcome.report().unwrap();
    println!("Bridge stopped after {} ticks", report.ticks);

    assert_eq!(report.session("offer").unwrap().packets_received, 5);
    assert_eq!(report.session("offer").unwrap().packets_sent, 5);
    assert_eq!(report.session("answer").unwrap().packets_received, 5);
    assert_eq!(report.session("answer").unwrap().packets_sent, 5);
    assert_eq!(report.unlinked, 2);
    assert_eq!(report.destroyed, 8);

    // Detach before unlink before destroy, for every linked filter
    for filter in [&a_recv, &a_send, &b_recv, &b_send] {
        assert_eq!(filter.history(), FULL_LIFECYCLE.to_vec(), "{}", filter.label());
    }
    // Never-linked codec filters are still destroyed
    for filter in [&a_encoder, &a_decoder, &b_encoder, &b_decoder] {
        assert_eq!(
            filter.history(),
            vec![LifecycleOp::Created, LifecycleOp::Destroyed],
            "{}",
            filter.label()
        );
    }

    assert_eq!(leg_a.activity(), LegActivity::Idle);
    assert_eq!(leg_b.activity(), LegActivity::Idle);
    assert!(leg_a.ticker().is_none());

    // Second stop is benign and touches nothing
    assert_eq!(
        stop_bridge(&mut leg_a, &mut leg_b).unwrap(),
        TeardownOutcome::NotActive
    );

    release_call_leg_media(&mut leg_a).unwrap();
    release_call_leg_media(&mut leg_b).unwrap();
    assert_eq!(test.pool.snapshot().live_buffers(), 0);
}

#[test]
fn test_bridge_pipeline_names_in_construction_order() {
    let test = manual_engine();
    let peer = Peer::bind();
    let mut leg_a = provisioned_leg(&test.engine, "a", peer.addr(), PayloadType::pcma());
    let mut leg_b = provisioned_leg(&test.engine, "b", peer.addr(), PayloadType::pcma());

    bridge(&mut leg_a, &mut leg_b).unwrap();
    let names = leg_a
        .ticker()
        .unwrap()
        .with_graph(|g| g.pipeline_names().iter().map(|n| n.to_string()).collect::<Vec<_>>());
    assert_eq!(names, vec![PIPELINE_A_TO_B, PIPELINE_B_TO_A]);

    assert!(stop_bridge(&mut leg_a, &mut leg_b).unwrap().is_stopped());
}

#[test]
fn test_stop_without_bridge_is_not_active() {
    let test = manual_engine();
    let peer = Peer::bind();
    let mut leg_a = provisioned_leg(&test.engine, "a", peer.addr(), PayloadType::pcmu());
    let mut leg_b = provisioned_leg(&test.engine, "b", peer.addr(), PayloadType::pcmu());

    assert_eq!(
        stop_bridge(&mut leg_a, &mut leg_b).unwrap(),
        TeardownOutcome::NotActive
    );
    // Nothing was touched: the leg can still be bridged
    assert_eq!(leg_a.rtp_recv().unwrap().history(), vec![LifecycleOp::Created]);
    bridge(&mut leg_a, &mut leg_b).unwrap();
    stop_bridge(&mut leg_a, &mut leg_b).unwrap();
}
