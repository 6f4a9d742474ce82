//! RTP packet handling (RFC 3550)
//!
//! Only what the media sessions need: parse incoming packets (CSRC list,
//! header extension and padding are skipped) and build outgoing packets with
//! a fixed 12-byte header.
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
use bytes::{BufMut, BytesMut};

/// RTP protocol version
pub const RTP_VERSION: u8 = 2;

/// Fixed RTP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Marker bit
    pub marker: bool,
    /// Payload type (7 bits)
    pub payload_type: u8,
    /// Sequence number (16 bits)
    pub sequence_number: u16,
    /// Timestamp (32 bits)
    pub timestamp: u32,
    /// Synchronization source identifier
    pub ssrc: u32,
}

impl RtpHeader {
    /// Size of the fixed header in bytes
    pub const SIZE: usize = 12;

    /// Parse a packet, returning the header and the payload slice
    pub fn parse(data: &[u8]) -> MediaResult<(Self, &[u8])> {
        if data.len() < Self::SIZE {
            return Err(MediaError::RtpParse(format!(
                "RTP header too short: {} bytes",
                data.len()
            )));
        }

        // First byte: V(2) P(1) X(1) CC(4)
        let version = data[0] >> 6;
        if version != RTP_VERSION {
            return Err(MediaError::RtpParse(format!(
                "Invalid RTP version: {}",
                version
            )));
        }
        let padding = data[0] & 0x20 != 0;
        let extension = data[0] & 0x10 != 0;
        let csrc_count = (data[0] & 0x0F) as usize;

        // Second byte: M(1) PT(7)
        let header = RtpHeader {
            marker: data[1] & 0x80 != 0,
            payload_type: data[1] & 0x7F,
            sequence_number: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        };

        let mut offset = Self::SIZE + csrc_count * 4;
        if data.len() < offset {
            return Err(MediaError::RtpParse("Incomplete CSRC list".to_string()));
        }

        if extension {
            if data.len() < offset + 4 {
                return Err(MediaError::RtpParse(
                    "Incomplete extension header".to_string(),
                ));
            }
            // Length is in 32-bit words, not counting the 4-byte extension header
            let words = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            offset += 4 + words * 4;
            if data.len() < offset {
                return Err(MediaError::RtpParse("Incomplete extension data".to_string()));
            }
        }

        let mut end = data.len();
        if padding {
            let padding_len = data[end - 1] as usize;
            if padding_len == 0 || offset + padding_len > end {
                return Err(MediaError::RtpParse(format!(
                    "Invalid padding length: {}",
                    padding_len
                )));
            }
            end -= padding_len;
        }

        Ok((header, &data[offset..end]))
    }

    /// Append the header to `buf`
    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_u8(RTP_VERSION << 6);
        let mut second_byte = self.payload_type & 0x7F;
        if self.marker {
            second_byte |= 0x80;
        }
        buf.put_u8(second_byte);
        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
    }
}

/// Build a complete packet into `buf`
pub fn write_packet(buf: &mut BytesMut, header: &RtpHeader, payload: &[u8]) {
    buf.reserve(RtpHeader::SIZE + payload.len());
    header.write(buf);
    buf.put_slice(payload);
}
