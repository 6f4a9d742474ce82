//! Memory hooks for engine allocations
//!
//! Every media buffer the engine creates is obtained from a `MemoryHooks`
//! implementation installed at engine initialization, so the host process can
//! route and account media memory the same way for every leg and thread.
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


use bytes::BytesMut;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Allocation capability installed into the media engine
pub trait MemoryHooks: Send + Sync {
    /// Allocate a buffer able to hold at least `size` bytes
    fn allocate(&self, size: usize) -> BytesMut;

    /// Grow `buf` so that it can hold at least `size` bytes, keeping its contents
    fn reallocate(&self, buf: BytesMut, size: usize) -> BytesMut;

    /// Give a buffer back
    fn release(&self, buf: BytesMut);

    /// Accounting snapshot, if the implementation keeps one
    fn stats(&self) -> Option<MemoryStats> {
        None
    }
}

/// Memory accounting snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Bytes currently held by live buffers
    pub bytes_in_use: usize,
    /// Highest value `bytes_in_use` has reached
    pub peak_bytes: usize,
    /// Number of `allocate` calls
    pub allocations: u64,
    /// Number of `reallocate` calls
    pub reallocations: u64,
    /// Number of `release` calls
    pub releases: u64,
}

impl MemoryStats {
    /// Buffers allocated and not yet released
    pub fn live_buffers(&self) -> u64 {
        self.allocations.saturating_sub(self.releases)
    }
}

/// Plain heap allocation, no accounting
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemory;

impl MemoryHooks for SystemMemory {
    fn allocate(&self, size: usize) -> BytesMut {
        BytesMut::with_capacity(size)
    }

    fn reallocate(&self, mut buf: BytesMut, size: usize) -> BytesMut {
        if size > buf.capacity() {
            buf.reserve(size - buf.len());
        }
        buf
    }

    fn release(&self, buf: BytesMut) {
        drop(buf);
    }
}

/// Heap allocation with process-wide accounting
///
/// All counters are atomics, so one pool can be shared by every leg, ticker
/// thread and the control thread, and inspected from any of them.
#[derive(Debug, Default)]
pub struct SharedMemoryPool {
    bytes_in_use: AtomicUsize,
    peak_bytes: AtomicUsize,
    allocations: AtomicU64,
    reallocations: AtomicU64,
    releases: AtomicU64,
}

impl SharedMemoryPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    fn grow(&self, bytes: usize) {
        let now = self.bytes_in_use.fetch_add(bytes, Ordering::AcqRel) + bytes;
        self.peak_bytes.fetch_max(now, Ordering::AcqRel);
    }

    fn shrink(&self, bytes: usize) {
        let _ = self
            .bytes_in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    /// Current accounting snapshot
    pub fn snapshot(&self) -> MemoryStats {
        MemoryStats {
            bytes_in_use: self.bytes_in_use.load(Ordering::Acquire),
            peak_bytes: self.peak_bytes.load(Ordering::Acquire),
            allocations: self.allocations.load(Ordering::Acquire),
            reallocations: self.reallocations.load(Ordering::Acquire),
            releases: self.releases.load(Ordering::Acquire),
        }
    }
}

impl MemoryHooks for SharedMemoryPool {
    fn allocate(&self, size: usize) -> BytesMut {
        let buf = BytesMut::with_capacity(size);
        self.allocations.fetch_add(1, Ordering::AcqRel);
        self.grow(buf.capacity());
        buf
    }

    fn reallocate(&self, mut buf: BytesMut, size: usize) -> BytesMut {
        let before = buf.capacity();
        if size > before {
            buf.reserve(size - buf.len());
        }
        let after = buf.capacity();
        self.reallocations.fetch_add(1, Ordering::AcqRel);
        if after > before {
            self.grow(after - before);
        } else {
            self.shrink(before - after);
        }
        buf
    }

    fn release(&self, buf: BytesMut) {
        self.releases.fetch_add(1, Ordering::AcqRel);
        self.shrink(buf.capacity());
    }

    fn stats(&self) -> Option<MemoryStats> {
        Some(self.snapshot())
    }
}
