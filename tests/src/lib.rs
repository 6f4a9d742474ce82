//! Shared fixtures for the integration tests
//!
//! Loopback UDP peers stand in for the remote RTP endpoints of a call.
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


use async_trait::async_trait;
use bytes::BytesMut;
use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;
use rms_config::{MediaServerConfig, TickerMode};
use rms_media::rtp::write_packet;
use rms_media::{
    create_call_leg_media, CallControl, CallId, CallLegMedia, MediaEngine, PayloadType,
    RtpHeader, SharedMemoryPool,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Engine plus the pool it allocates from
pub struct TestEngine {
    pub engine: MediaEngine,
    pub pool: Arc<SharedMemoryPool>,
}

/// Engine whose tickers run only when the test calls `tick()`
pub fn manual_engine() -> TestEngine {
    let mut config = MediaServerConfig::default();
    config.ticker.mode = TickerMode::Manual;
    engine_with(config)
}

/// Engine whose tickers run on their own threads
pub fn threaded_engine() -> TestEngine {
    engine_with(MediaServerConfig::default())
}

fn engine_with(config: MediaServerConfig) -> TestEngine {
    rms_logging::init_test_logging();
    let pool = Arc::new(SharedMemoryPool::new());
    let engine = MediaEngine::new(config, pool.clone()).expect("engine");
    TestEngine { engine, pool }
}

/// A remote RTP endpoint on loopback
pub struct Peer {
    pub socket: UdpSocket,
    ssrc: u32,
    sequence: u16,
}

impl Peer {
    pub fn bind() -> Self {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind peer");
        socket.set_nonblocking(true).expect("nonblocking");
        Peer {
            socket,
            ssrc: 0x1234_5678,
            sequence: 100,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.socket.local_addr().expect("peer addr")
    }

    /// Send one RTP packet to `to`
    pub fn send(&mut self, to: SocketAddr, payload_type: u8, payload: &[u8]) {
        let header = RtpHeader {
            marker: false,
            payload_type,
            sequence_number: self.sequence,
            timestamp: u32::from(self.sequence) * 160,
            ssrc: self.ssrc,
        };
        self.sequence = self.sequence.wrapping_add(1);
        let mut buf = BytesMut::new();
        write_packet(&mut buf, &header, payload);
        self.socket.send_to(&buf, to).expect("peer send");
    }

    /// Every RTP packet waiting on the socket
    pub fn drain(&self) -> Vec<(RtpHeader, Vec<u8>)> {
        let mut packets = Vec::new();
        let mut buf = [0u8; 1500];
        while let Ok((len, _)) = self.socket.recv_from(&mut buf) {
            if let Ok((header, payload)) = RtpHeader::parse(&buf[..len]) {
                packets.push((header, payload.to_vec()));
            }
        }
        packets
    }
}

/// Leg on an ephemeral loopback port talking to `remote`
pub fn provisioned_leg(
    engine: &MediaEngine,
    call_id: &str,
    remote: SocketAddr,
    payload: PayloadType,
) -> CallLegMedia {
    let mut leg = CallLegMedia::new(SocketAddr::new(LOCALHOST, 0), remote, payload);
    create_call_leg_media(engine, &mut leg, CallId::from(call_id)).expect("provision leg");
    leg
}

/// Write a mono 16-bit WAV file of a slow ramp
pub fn write_wav(dir: &Path, name: &str, sample_rate: u32, samples: usize) -> PathBuf {
    let path = dir.join(name);
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec).expect("create wav");
    for i in 0..samples {
        writer
            .write_sample(((i % 200) as i16 - 100) * 50)
            .expect("write sample");
    }
    writer.finalize().expect("finalize wav");
    path
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Call control that records hangups
#[derive(Default)]
pub struct RecordingCallControl {
    hangups: Mutex<Vec<CallId>>,
    pub notify: Notify,
}

impl RecordingCallControl {
    pub fn hangups(&self) -> Vec<CallId> {
        self.hangups.lock().clone()
    }
}

#[async_trait]
impl CallControl for RecordingCallControl {
    async fn hangup(&self, call_id: &CallId) {
        self.hangups.lock().push(call_id.clone());
        self.notify.notify_one();
    }
}
