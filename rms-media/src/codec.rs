//! Payload descriptors and G.711 companding
//!
//! Codec negotiation happens in the signalling layer; what arrives here is a
//! `PayloadType` describing the result. The engine ships encoders and
//! decoders for PCMU and PCMA only.
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
use std::fmt;

/// Negotiated payload descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadType {
    /// RTP payload type number
    pub number: u8,
    /// MIME subtype, e.g. "PCMU"
    pub mime_type: String,
    /// RTP clock rate in Hz
    pub clock_rate: u32,
}

impl PayloadType {
    /// Build a payload descriptor
    pub fn new(number: u8, mime_type: impl Into<String>, clock_rate: u32) -> Self {
        PayloadType {
            number,
            mime_type: mime_type.into(),
            clock_rate,
        }
    }

    /// Static payload type 0
    pub fn pcmu() -> Self {
        Self::new(0, "PCMU", 8000)
    }

    /// Static payload type 8
    pub fn pcma() -> Self {
        Self::new(8, "PCMA", 8000)
    }

    /// Whether packets of `self` can be forwarded unchanged to a leg using `other`
    pub fn is_compatible(&self, other: &PayloadType) -> bool {
        self.mime_type.eq_ignore_ascii_case(&other.mime_type)
            && self.clock_rate == other.clock_rate
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} (pt {})", self.mime_type, self.clock_rate, self.number)
    }
}

/// Codecs the engine can encode and decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// G.711 mu-law
    Pcmu,
    /// G.711 A-law
    Pcma,
}

impl Codec {
    /// Resolve the codec for a negotiated payload type
    pub fn for_payload(payload: &PayloadType) -> MediaResult<Self> {
        let codec = if payload.mime_type.eq_ignore_ascii_case("PCMU") {
            Codec::Pcmu
        } else if payload.mime_type.eq_ignore_ascii_case("PCMA") {
            Codec::Pcma
        } else {
            return Err(MediaError::UnsupportedCodec(payload.to_string()));
        };

        if payload.clock_rate != codec.clock_rate() {
            return Err(MediaError::UnsupportedCodec(payload.to_string()));
        }
        Ok(codec)
    }

    /// MIME subtype
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Pcmu => "PCMU",
            Codec::Pcma => "PCMA",
        }
    }

    /// Sampling rate, equal to the RTP clock rate for G.711
    pub fn clock_rate(&self) -> u32 {
        8000
    }

    /// Encode one linear sample
    pub fn encode_sample(&self, sample: i16) -> u8 {
        match self {
            Codec::Pcmu => linear_to_ulaw(sample),
            Codec::Pcma => linear_to_alaw(sample),
        }
    }

    /// Decode one companded sample
    pub fn decode_sample(&self, byte: u8) -> i16 {
        match self {
            Codec::Pcmu => ulaw_to_linear(byte),
            Codec::Pcma => alaw_to_linear(byte),
        }
    }
}

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32635;

/// Linear PCM to mu-law
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };
    pcm = pcm.min(ULAW_CLIP) + ULAW_BIAS;

    let exponent = segment(pcm >> 7);
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;
    !((sign | (exponent << 4) | mantissa) as u8)
}

/// Mu-law to linear PCM
pub fn ulaw_to_linear(byte: u8) -> i16 {
    let byte = !byte as i32;
    let sign = byte & 0x80;
    let exponent = (byte >> 4) & 0x07;
    let mantissa = byte & 0x0F;

    let magnitude = (((mantissa << 3) + ULAW_BIAS) << exponent) - ULAW_BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Linear PCM to A-law
pub fn linear_to_alaw(sample: i16) -> u8 {
    // A-law works on 13-bit magnitudes
    let mut pcm = (sample as i32) >> 3;
    let sign = if pcm >= 0 {
        0x80
    } else {
        pcm = -pcm - 1;
        0x00
    };

    let code = if pcm < 32 {
        (pcm >> 1) & 0x0F
    } else {
        let exponent = segment(pcm >> 5) + 1;
        if exponent > 7 {
            0x7F
        } else {
            (exponent << 4) | ((pcm >> exponent) & 0x0F)
        }
    };

    ((sign | code) as u8) ^ 0x55
}

/// A-law to linear PCM
pub fn alaw_to_linear(byte: u8) -> i16 {
    let byte = (byte ^ 0x55) as i32;
    let exponent = (byte >> 4) & 0x07;
    let mantissa = byte & 0x0F;

    let magnitude = match exponent {
        0 => (mantissa << 4) + 8,
        _ => ((mantissa << 4) + 0x108) << (exponent - 1),
    };

    if byte & 0x80 != 0 {
        magnitude as i16
    } else {
        -magnitude as i16
    }
}

/// Position of the highest set bit in `value`, capped at 7
fn segment(value: i32) -> i32 {
    let mut segment = 0;
    let mut v = value;
    while v > 1 && segment < 7 {
        v >>= 1;
        segment += 1;
    }
    segment
}
