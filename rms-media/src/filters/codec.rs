//! G.711 encoder and decoder filters
//!
//! Decoded audio travels between filters as 16-bit little-endian mono PCM at
//! the codec clock rate.
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


use crate::block::MediaBlock;
use crate::codec::Codec;
use crate::error::MediaResult;
use crate::filter::{Filter, FilterIo, FilterKind};
use crate::memory::MemoryHooks;
use std::sync::Arc;

/// PCM in, one packet-sized G.711 frame out per packetization time
pub struct EncoderFilter {
    codec: Codec,
    memory: Arc<dyn MemoryHooks>,
    frame_samples: usize,
    pending: Option<MediaBlock>,
    timestamp: u32,
    first_frame: bool,
    scratch: Vec<u8>,
}

impl EncoderFilter {
    pub fn new(codec: Codec, memory: Arc<dyn MemoryHooks>, ptime_ms: u32) -> Self {
        let frame_samples = (codec.clock_rate() as usize * ptime_ms as usize / 1000).max(1);
        EncoderFilter {
            codec,
            memory,
            frame_samples,
            pending: None,
            timestamp: rand::random(),
            first_frame: true,
            scratch: Vec::with_capacity(frame_samples),
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Samples per emitted frame
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }
}

impl Filter for EncoderFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Encoder
    }

    fn process(&mut self, io: &mut FilterIo) -> MediaResult<()> {
        let input = io.take_input(0);
        let starved = input.is_empty();
        for block in input {
            match self.pending.as_mut() {
                Some(pending) => pending.append(block.payload()),
                None => self.pending = Some(block),
            }
        }

        let frame_bytes = self.frame_samples * 2;
        // Source went quiet: pad the tail to a full frame of silence
        if starved {
            if let Some(pending) = self.pending.as_mut() {
                if pending.len() < frame_bytes {
                    pending.append(&vec![0u8; frame_bytes - pending.len()]);
                }
            }
        }
        while let Some(pending) = self.pending.as_mut() {
            if pending.len() < frame_bytes {
                break;
            }
            let frame = pending.take_front(frame_bytes);
            if pending.is_empty() {
                self.pending = None;
            }

            self.scratch.clear();
            self.scratch
                .extend(frame.samples().map(|s| self.codec.encode_sample(s)));
            let mut out = MediaBlock::from_slice(&self.memory, &self.scratch, self.timestamp);
            out.marker = self.first_frame;
            self.first_frame = false;
            self.timestamp = self.timestamp.wrapping_add(self.frame_samples as u32);
            io.push_output(0, out);
        }
        Ok(())
    }
}

/// G.711 in, PCM out, one block per packet
pub struct DecoderFilter {
    codec: Codec,
    memory: Arc<dyn MemoryHooks>,
    scratch: Vec<i16>,
}

impl DecoderFilter {
    pub fn new(codec: Codec, memory: Arc<dyn MemoryHooks>) -> Self {
        DecoderFilter {
            codec,
            memory,
            scratch: Vec::new(),
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }
}

impl Filter for DecoderFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Decoder
    }

    fn process(&mut self, io: &mut FilterIo) -> MediaResult<()> {
        for block in io.take_input(0) {
            self.scratch.clear();
            self.scratch
                .extend(block.payload().iter().map(|b| self.codec.decode_sample(*b)));
            let mut out = MediaBlock::from_samples(&self.memory, &self.scratch, block.timestamp);
            out.marker = block.marker;
            io.push_output(0, out);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::TickContext;
    use crate::memory::SystemMemory;

    fn memory() -> Arc<dyn MemoryHooks> {
        Arc::new(SystemMemory)
    }

    #[test]
    fn test_encoder_frames_by_ptime() {
        let memory = memory();
        let mut encoder = EncoderFilter::new(Codec::Pcmu, memory.clone(), 20);
        assert_eq!(encoder.frame_samples(), 160);

        // 100 samples: not enough for a frame yet
        let mut io = FilterIo::new(FilterKind::Encoder, TickContext::default());
        io.inputs[0].push_back(MediaBlock::from_samples(&memory, &[0; 100], 0));
        encoder.process(&mut io).unwrap();
        assert!(io.outputs[0].is_empty());

        // 100 + 300 samples: two frames, 80 samples left over
        io.inputs[0].push_back(MediaBlock::from_samples(&memory, &[0; 300], 0));
        encoder.process(&mut io).unwrap();
        assert_eq!(io.outputs[0].len(), 2);

        let first = io.outputs[0].pop_front().unwrap();
        let second = io.outputs[0].pop_front().unwrap();
        assert_eq!(first.len(), 160);
        assert!(first.payload().iter().all(|b| *b == 0xFF));
        assert!(first.marker);
        assert!(!second.marker);
        assert_eq!(second.timestamp, first.timestamp.wrapping_add(160));
    }

    #[test]
    fn test_encoder_flushes_tail_when_input_stops() {
        let memory = memory();
        let mut encoder = EncoderFilter::new(Codec::Pcmu, memory.clone(), 20);

        let mut io = FilterIo::new(FilterKind::Encoder, TickContext::default());
        io.inputs[0].push_back(MediaBlock::from_samples(&memory, &[1000; 240], 0));
        encoder.process(&mut io).unwrap();
        let head = io.outputs[0].pop_front().unwrap();
        assert!(io.outputs[0].is_empty());

        // Nothing new arrives: the 80 leftover samples go out padded to a full frame
        encoder.process(&mut io).unwrap();
        let tail = io.outputs[0].pop_front().unwrap();
        assert_eq!(tail.len(), 160);
        assert_eq!(tail.timestamp, head.timestamp.wrapping_add(160));
        let silence = Codec::Pcmu.encode_sample(0);
        assert!(tail.payload()[..80].iter().all(|b| *b != silence));
        assert!(tail.payload()[80..].iter().all(|b| *b == silence));

        encoder.process(&mut io).unwrap();
        assert!(io.outputs[0].is_empty());
    }

    #[test]
    fn test_decoder_expands_to_pcm() {
        let memory = memory();
        let mut decoder = DecoderFilter::new(Codec::Pcma, memory.clone());
        let mut io = FilterIo::new(FilterKind::Decoder, TickContext::default());
        io.inputs[0].push_back(MediaBlock::from_slice(&memory, &[0xD5; 160], 480));
        decoder.process(&mut io).unwrap();

        let out = io.outputs[0].pop_front().unwrap();
        assert_eq!(out.len(), 320);
        assert_eq!(out.timestamp, 480);
        assert!(out.samples().all(|s| s == 8));
    }
}
