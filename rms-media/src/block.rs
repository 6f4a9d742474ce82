//! Media blocks: the unit of data moving along graph edges
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


use crate::memory::MemoryHooks;
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::sync::Arc;

/// A buffer of audio data plus its RTP timing
///
/// The buffer comes from the engine's memory hooks and goes back to them when
/// the block is dropped, wherever that happens (sink filter, unlinked edge
/// queue, torn down ticker).
pub struct MediaBlock {
    data: BytesMut,
    memory: Arc<dyn MemoryHooks>,
    /// RTP timestamp of the first sample
    pub timestamp: u32,
    /// RTP marker bit
    pub marker: bool,
}

impl MediaBlock {
    /// Allocate an empty block with room for `capacity` bytes
    pub fn with_capacity(memory: &Arc<dyn MemoryHooks>, capacity: usize) -> Self {
        MediaBlock {
            data: memory.allocate(capacity),
            memory: Arc::clone(memory),
            timestamp: 0,
            marker: false,
        }
    }

    /// Allocate a block holding a copy of `payload`
    pub fn from_slice(memory: &Arc<dyn MemoryHooks>, payload: &[u8], timestamp: u32) -> Self {
        let mut block = Self::with_capacity(memory, payload.len());
        block.append(payload);
        block.timestamp = timestamp;
        block
    }

    /// Allocate a block of 16-bit little-endian PCM
    pub fn from_samples(memory: &Arc<dyn MemoryHooks>, samples: &[i16], timestamp: u32) -> Self {
        let mut block = Self::with_capacity(memory, samples.len() * 2);
        for sample in samples {
            block.data.put_i16_le(*sample);
        }
        block.timestamp = timestamp;
        block
    }

    fn ensure_capacity(&mut self, needed: usize) {
        if self.data.capacity() < needed {
            let data = std::mem::take(&mut self.data);
            self.data = self.memory.reallocate(data, needed);
        }
    }

    /// Append bytes, growing through the memory hooks when needed
    pub fn append(&mut self, bytes: &[u8]) {
        self.ensure_capacity(self.data.len() + bytes.len());
        self.data.put_slice(bytes);
    }

    /// Remove and return the first `len` bytes as a new block
    ///
    /// The split-off part is copied into a fresh allocation so that both
    /// blocks keep an independent, accountable buffer.
    pub fn take_front(&mut self, len: usize) -> MediaBlock {
        let len = len.min(self.data.len());
        let front = MediaBlock::from_slice(&self.memory, &self.data[..len], self.timestamp);
        let rest = self.data[len..].to_vec();
        self.data.clear();
        self.data.put_slice(&rest);
        front
    }

    /// Payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the block carries no data
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Interpret the payload as 16-bit little-endian PCM
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }

    /// The memory hooks this block was allocated from
    pub fn memory(&self) -> &Arc<dyn MemoryHooks> {
        &self.memory
    }
}

impl Drop for MediaBlock {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.memory.release(data);
    }
}

impl fmt::Debug for MediaBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaBlock")
            .field("len", &self.data.len())
            .field("timestamp", &self.timestamp)
            .field("marker", &self.marker)
            .finish()
    }
}
