//! Duplex RTP sessions over UDP
//!
//! One session per call leg. Sockets are non-blocking: all socket I/O happens
//! inside ticker ticks, which must never wait on the network.
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


use crate::error::{MediaError, MediaResult};
use crate::rtp::{write_packet, RtpHeader};
use bytes::BytesMut;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use tracing::{debug, info, trace};

/// Session statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RtpStats {
    /// Packets sent
    pub packets_sent: u64,
    /// Payload bytes sent
    pub bytes_sent: u64,
    /// Packets received and accepted
    pub packets_received: u64,
    /// Payload bytes received
    pub bytes_received: u64,
    /// Packets missing from the sequence number space
    pub packets_lost: u64,
    /// Packets arriving with a sequence number at or before the highest seen
    pub out_of_order: u64,
    /// Packets dropped because of an unexpected payload type
    pub discarded: u64,
    /// Datagrams that failed RTP parsing
    pub bad_packets: u64,
    /// Send attempts that failed (no remote, socket error, buffer full)
    pub send_errors: u64,
    /// RTCP datagrams drained while RTCP is enabled
    pub rtcp_packets_received: u64,
}

impl RtpStats {
    /// Emit the statistics to the log
    pub fn display(&self, label: &str) {
        info!(
            session = label,
            packets_sent = self.packets_sent,
            bytes_sent = self.bytes_sent,
            packets_received = self.packets_received,
            bytes_received = self.bytes_received,
            packets_lost = self.packets_lost,
            out_of_order = self.out_of_order,
            discarded = self.discarded,
            bad_packets = self.bad_packets,
            send_errors = self.send_errors,
            rtcp_packets_received = self.rtcp_packets_received,
            "RTP statistics"
        );
    }
}

struct SessionState {
    remote_rtp: Option<SocketAddr>,
    remote_rtcp: Option<SocketAddr>,
    payload_type: u8,
    rtcp_enabled: bool,
    ssrc: u32,
    next_sequence: u16,
    remote_ssrc: Option<u32>,
    highest_sequence: Option<u16>,
    send_buf: BytesMut,
    recv_buf: Vec<u8>,
    stats: RtpStats,
}

/// RTP session bound to a local RTP port and its RTCP companion port
pub struct RtpSession {
    rtp_socket: UdpSocket,
    rtcp_socket: UdpSocket,
    local_rtp: SocketAddr,
    local_rtcp: SocketAddr,
    mtu: usize,
    state: Mutex<SessionState>,
}

fn bind(addr: SocketAddr, what: &str) -> MediaResult<UdpSocket> {
    let socket = UdpSocket::bind(addr)
        .map_err(|e| MediaError::Network(format!("Failed to bind {} on {}: {}", what, addr, e)))?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

impl RtpSession {
    /// Bind a duplex session
    ///
    /// Port 0 asks the OS for an ephemeral port; pass 0 for both ports in that case.
    pub fn create_duplex(
        local_ip: IpAddr,
        rtp_port: u16,
        rtcp_port: u16,
        mtu: usize,
    ) -> MediaResult<Self> {
        let rtp_socket = bind(SocketAddr::new(local_ip, rtp_port), "RTP")?;
        let rtcp_socket = bind(SocketAddr::new(local_ip, rtcp_port), "RTCP")?;
        let local_rtp = rtp_socket.local_addr()?;
        let local_rtcp = rtcp_socket.local_addr()?;

        debug!(rtp = %local_rtp, rtcp = %local_rtcp, mtu, "RTP session bound");

        Ok(RtpSession {
            rtp_socket,
            rtcp_socket,
            local_rtp,
            local_rtcp,
            mtu,
            state: Mutex::new(SessionState {
                remote_rtp: None,
                remote_rtcp: None,
                payload_type: 0,
                rtcp_enabled: true,
                ssrc: rand::random(),
                next_sequence: rand::random(),
                remote_ssrc: None,
                highest_sequence: None,
                send_buf: BytesMut::with_capacity(mtu),
                recv_buf: vec![0u8; mtu],
                stats: RtpStats::default(),
            }),
        })
    }

    /// Set where RTP and RTCP are sent
    pub fn set_remote_addr_full(&self, rtp: SocketAddr, rtcp: SocketAddr) {
        let mut state = self.state.lock();
        state.remote_rtp = Some(rtp);
        state.remote_rtcp = Some(rtcp);
    }

    /// Payload type stamped on outgoing packets and expected on incoming ones
    pub fn set_payload_type(&self, payload_type: u8) {
        self.state.lock().payload_type = payload_type & 0x7F;
    }

    pub fn payload_type(&self) -> u8 {
        self.state.lock().payload_type
    }

    /// Enable or disable RTCP processing
    pub fn enable_rtcp(&self, enabled: bool) {
        self.state.lock().rtcp_enabled = enabled;
    }

    pub fn rtcp_enabled(&self) -> bool {
        self.state.lock().rtcp_enabled
    }

    /// Bound RTP address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_rtp
    }

    /// Bound RTCP address
    pub fn local_rtcp_addr(&self) -> SocketAddr {
        self.local_rtcp
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.state.lock().remote_rtp
    }

    pub fn ssrc(&self) -> u32 {
        self.state.lock().ssrc
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Send one payload as an RTP packet
    ///
    /// Returns whether the packet left the socket. Failures are counted in
    /// the statistics rather than reported, the tick goes on either way.
    pub fn send(&self, payload: &[u8], timestamp: u32, marker: bool) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(remote) = state.remote_rtp else {
            state.stats.send_errors += 1;
            return false;
        };
        if RtpHeader::SIZE + payload.len() > self.mtu {
            trace!(len = payload.len(), mtu = self.mtu, "Payload exceeds MTU");
            state.stats.send_errors += 1;
            return false;
        }

        let header = RtpHeader {
            marker,
            payload_type: state.payload_type,
            sequence_number: state.next_sequence,
            timestamp,
            ssrc: state.ssrc,
        };
        state.send_buf.clear();
        write_packet(&mut state.send_buf, &header, payload);

        match self.rtp_socket.send_to(&state.send_buf, remote) {
            Ok(_) => {
                state.next_sequence = state.next_sequence.wrapping_add(1);
                state.stats.packets_sent += 1;
                state.stats.bytes_sent += payload.len() as u64;
                true
            }
            Err(e) => {
                trace!(error = %e, remote = %remote, "RTP send failed");
                state.stats.send_errors += 1;
                false
            }
        }
    }

    /// Drain up to `max_packets` pending datagrams, handing each accepted
    /// packet to `on_packet`
    pub fn recv_packets<F>(&self, max_packets: usize, mut on_packet: F) -> MediaResult<usize>
    where
        F: FnMut(&RtpHeader, &[u8]),
    {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut accepted = 0;

        for _ in 0..max_packets {
            let len = match self.rtp_socket.recv_from(&mut state.recv_buf) {
                Ok((len, _from)) => len,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e.into()),
            };

            let (header, payload) = match RtpHeader::parse(&state.recv_buf[..len]) {
                Ok(parsed) => parsed,
                Err(e) => {
                    trace!(error = %e, "Dropping malformed RTP datagram");
                    state.stats.bad_packets += 1;
                    continue;
                }
            };

            if header.payload_type != state.payload_type {
                state.stats.discarded += 1;
                continue;
            }

            if state.remote_ssrc != Some(header.ssrc) {
                state.remote_ssrc = Some(header.ssrc);
                state.highest_sequence = None;
            }
            match state.highest_sequence {
                Some(highest) => {
                    let delta = header.sequence_number.wrapping_sub(highest);
                    if delta == 0 || delta >= 0x8000 {
                        state.stats.out_of_order += 1;
                    } else {
                        state.stats.packets_lost += u64::from(delta - 1);
                        state.highest_sequence = Some(header.sequence_number);
                    }
                }
                None => state.highest_sequence = Some(header.sequence_number),
            }

            state.stats.packets_received += 1;
            state.stats.bytes_received += payload.len() as u64;
            accepted += 1;
            on_packet(&header, payload);
        }

        if state.rtcp_enabled {
            let mut scratch = [0u8; 1500];
            while let Ok((_, _)) = self.rtcp_socket.recv_from(&mut scratch) {
                state.stats.rtcp_packets_received += 1;
            }
        }

        Ok(accepted)
    }

    /// Statistics snapshot
    pub fn stats(&self) -> RtpStats {
        self.state.lock().stats
    }

    pub fn reset_stats(&self) {
        self.state.lock().stats = RtpStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::{Duration, Instant};

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn session() -> RtpSession {
        RtpSession::create_duplex(LOCALHOST, 0, 0, 1440).unwrap()
    }

    fn packet(seq: u16, pt: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        let header = RtpHeader {
            marker: false,
            payload_type: pt,
            sequence_number: seq,
            timestamp: seq as u32 * 160,
            ssrc: 7,
        };
        write_packet(&mut buf, &header, payload);
        buf.to_vec()
    }

    fn recv_until(session: &RtpSession, want: usize) -> Vec<(u16, Vec<u8>)> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut got = Vec::new();
        while got.len() < want && Instant::now() < deadline {
            session
                .recv_packets(64, |h, p| got.push((h.sequence_number, p.to_vec())))
                .unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }
        got
    }

    #[test]
    fn test_send_between_sessions() {
        let a = session();
        let b = session();
        a.set_remote_addr_full(b.local_addr(), b.local_rtcp_addr());
        a.set_payload_type(0);
        b.set_payload_type(0);

        assert!(a.send(&[1, 2, 3], 160, true));
        assert!(a.send(&[4, 5, 6], 320, false));

        let got = recv_until(&b, 2);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].1, vec![1, 2, 3]);
        assert_eq!(got[1].0, got[0].0.wrapping_add(1));

        assert_eq!(a.stats().packets_sent, 2);
        assert_eq!(a.stats().bytes_sent, 6);
        assert_eq!(b.stats().packets_received, 2);
    }

    #[test]
    fn test_send_without_remote_counts_error() {
        let a = session();
        assert!(!a.send(&[0; 160], 0, false));
        assert_eq!(a.stats().send_errors, 1);
    }

    #[test]
    fn test_loss_and_payload_type_accounting() {
        let b = session();
        b.set_payload_type(8);
        let peer = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();

        peer.send_to(&packet(10, 8, &[1]), b.local_addr()).unwrap();
        peer.send_to(&packet(13, 8, &[2]), b.local_addr()).unwrap();
        peer.send_to(&packet(14, 0, &[3]), b.local_addr()).unwrap();
        peer.send_to(&[0u8; 4], b.local_addr()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            b.recv_packets(64, |_, _| {}).unwrap();
            let stats = b.stats();
            if stats.packets_received + stats.discarded + stats.bad_packets == 4 {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }

        let stats = b.stats();
        assert_eq!(stats.packets_received, 2);
        assert_eq!(stats.packets_lost, 2);
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.bad_packets, 1);

        b.reset_stats();
        assert_eq!(b.stats(), RtpStats::default());
    }
}
