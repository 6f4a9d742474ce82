//! Filter contract and lifecycle-tracked filter handles
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
use crate::error::{MediaError, MediaResult};
use crate::events::EofNotification;
use crate::factory::FactoryStats;
use crate::session::RtpSession;
use crate::ticker::TickerId;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

static NEXT_FILTER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique filter identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(u64);

impl FilterId {
    fn next() -> Self {
        FilterId(NEXT_FILTER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Filter types the engine can instantiate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterKind {
    RtpRecv,
    RtpSend,
    Encoder,
    Decoder,
    FilePlayer,
    VoidSink,
}

impl FilterKind {
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::RtpRecv => "rtp-recv",
            FilterKind::RtpSend => "rtp-send",
            FilterKind::Encoder => "encoder",
            FilterKind::Decoder => "decoder",
            FilterKind::FilePlayer => "file-player",
            FilterKind::VoidSink => "void-sink",
        }
    }

    /// Number of input ports
    pub fn input_count(&self) -> usize {
        match self {
            FilterKind::RtpRecv | FilterKind::FilePlayer => 0,
            _ => 1,
        }
    }

    /// Number of output ports
    pub fn output_count(&self) -> usize {
        match self {
            FilterKind::RtpSend | FilterKind::VoidSink => 0,
            _ => 1,
        }
    }

    /// A filter with no inputs, usable as a ticker entry point
    pub fn is_source(&self) -> bool {
        self.input_count() == 0
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Control messages a filter may accept
pub enum FilterMethod {
    /// Bind an RTP filter to its session
    SetSession(Arc<RtpSession>),
    /// Open an audio file
    Open(PathBuf),
    /// Channel count produced by a player
    SetOutputChannels(u8),
    /// Sample rate produced by a player
    SetSampleRate(u32),
    /// Begin playing
    Start,
    /// Stop and release the open file
    Close,
    /// Where to report the end of the file
    NotifyOnEof(EofNotification),
}

impl FilterMethod {
    pub fn name(&self) -> &'static str {
        match self {
            FilterMethod::SetSession(_) => "set-session",
            FilterMethod::Open(_) => "open",
            FilterMethod::SetOutputChannels(_) => "set-output-channels",
            FilterMethod::SetSampleRate(_) => "set-sample-rate",
            FilterMethod::Start => "start",
            FilterMethod::Close => "close",
            FilterMethod::NotifyOnEof(_) => "notify-on-eof",
        }
    }
}

impl fmt::Debug for FilterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Timing of the tick a filter runs in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickContext {
    /// Tick number, starting at 1
    pub count: u64,
    /// Nominal time since the ticker started
    pub time_ms: u64,
    /// Tick interval
    pub interval_ms: u64,
}

/// Input and output queues handed to a filter for one tick
#[derive(Debug)]
pub struct FilterIo {
    pub inputs: Vec<VecDeque<MediaBlock>>,
    pub outputs: Vec<VecDeque<MediaBlock>>,
    pub tick: TickContext,
}

impl FilterIo {
    pub fn new(kind: FilterKind, tick: TickContext) -> Self {
        FilterIo {
            inputs: (0..kind.input_count()).map(|_| VecDeque::new()).collect(),
            outputs: (0..kind.output_count()).map(|_| VecDeque::new()).collect(),
            tick,
        }
    }

    /// Take everything queued on an input port
    pub fn take_input(&mut self, port: usize) -> VecDeque<MediaBlock> {
        self.inputs
            .get_mut(port)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Queue a block on an output port; blocks for a missing port are dropped
    pub fn push_output(&mut self, port: usize, block: MediaBlock) {
        if let Some(queue) = self.outputs.get_mut(port) {
            queue.push_back(block);
        }
    }
}

/// A media processing unit
pub trait Filter: Send {
    fn kind(&self) -> FilterKind;

    /// Consume inputs and produce outputs for one tick
    fn process(&mut self, io: &mut FilterIo) -> MediaResult<()>;

    /// Handle a control message
    fn call_method(&mut self, method: FilterMethod) -> MediaResult<()> {
        Err(MediaError::UnsupportedMethod {
            filter: self.kind().name().to_string(),
            method: method.name().to_string(),
        })
    }
}

/// Lifecycle operations recorded on every handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOp {
    Created,
    Linked,
    Attached,
    Detached,
    Unlinked,
    Destroyed,
}

struct FilterCore {
    imp: Option<Box<dyn Filter>>,
    links: usize,
    attached_to: Option<TickerId>,
    history: Vec<LifecycleOp>,
}

struct FilterShared {
    id: FilterId,
    kind: FilterKind,
    stats: Arc<FactoryStats>,
    core: Mutex<FilterCore>,
}

/// Shared handle to a filter instance
///
/// Handles track links, ticker attachment and destruction, and refuse the
/// operations that would break the lifecycle order (destroying a linked or
/// attached filter, unlinking an attached one, reusing a destroyed one).
#[derive(Clone)]
pub struct FilterHandle {
    shared: Arc<FilterShared>,
}

impl FilterHandle {
    pub(crate) fn new(imp: Box<dyn Filter>, stats: Arc<FactoryStats>) -> Self {
        let kind = imp.kind();
        stats.record_created(kind);
        FilterHandle {
            shared: Arc::new(FilterShared {
                id: FilterId::next(),
                kind,
                stats,
                core: Mutex::new(FilterCore {
                    imp: Some(imp),
                    links: 0,
                    attached_to: None,
                    history: vec![LifecycleOp::Created],
                }),
            }),
        }
    }

    pub fn id(&self) -> FilterId {
        self.shared.id
    }

    pub fn kind(&self) -> FilterKind {
        self.shared.kind
    }

    /// Short human readable name, e.g. `rtp-recv#4`
    pub fn label(&self) -> String {
        format!("{}{}", self.shared.kind.name(), self.shared.id)
    }

    fn violation(&self, reason: &str) -> MediaError {
        MediaError::LifecycleViolation {
            filter: self.label(),
            reason: reason.to_string(),
        }
    }

    /// Forward a control message to the filter
    pub fn call_method(&self, method: FilterMethod) -> MediaResult<()> {
        let mut core = self.shared.core.lock();
        match core.imp.as_mut() {
            Some(imp) => imp.call_method(method),
            None => Err(self.violation("method call on a destroyed filter")),
        }
    }

    pub(crate) fn process(&self, io: &mut FilterIo) -> MediaResult<()> {
        let mut core = self.shared.core.lock();
        let Some(imp) = core.imp.as_mut() else {
            return Ok(());
        };
        let started = Instant::now();
        let result = imp.process(io);
        self.shared
            .stats
            .record_process(self.shared.kind, started.elapsed());
        result
    }

    pub(crate) fn mark_linked(&self) -> MediaResult<()> {
        let mut core = self.shared.core.lock();
        if core.imp.is_none() {
            return Err(self.violation("link on a destroyed filter"));
        }
        core.links += 1;
        core.history.push(LifecycleOp::Linked);
        Ok(())
    }

    pub(crate) fn mark_unlinked(&self) -> MediaResult<()> {
        let mut core = self.shared.core.lock();
        if core.attached_to.is_some() {
            return Err(self.violation("unlink while attached to a ticker"));
        }
        if core.links == 0 {
            return Err(self.violation("unlink without a link"));
        }
        core.links -= 1;
        core.history.push(LifecycleOp::Unlinked);
        Ok(())
    }

    /// Returns false when the filter was already attached to this ticker
    pub(crate) fn mark_attached(&self, ticker: TickerId) -> MediaResult<bool> {
        let mut core = self.shared.core.lock();
        if core.imp.is_none() {
            return Err(self.violation("attach of a destroyed filter"));
        }
        match core.attached_to {
            Some(current) if current == ticker => Ok(false),
            Some(_) => Err(self.violation("already attached to another ticker")),
            None => {
                core.attached_to = Some(ticker);
                core.history.push(LifecycleOp::Attached);
                Ok(true)
            }
        }
    }

    /// Returns false when the filter was not attached to this ticker
    pub(crate) fn mark_detached(&self, ticker: TickerId) -> bool {
        let mut core = self.shared.core.lock();
        if core.attached_to != Some(ticker) {
            return false;
        }
        core.attached_to = None;
        core.history.push(LifecycleOp::Detached);
        true
    }

    /// Destroy the filter instance
    ///
    /// Fails unless the filter is detached and fully unlinked.
    pub fn destroy(&self) -> MediaResult<()> {
        let imp = {
            let mut core = self.shared.core.lock();
            if core.imp.is_none() {
                return Err(self.violation("already destroyed"));
            }
            if core.attached_to.is_some() {
                return Err(self.violation("destroy while attached to a ticker"));
            }
            if core.links > 0 {
                return Err(self.violation("destroy while still linked"));
            }
            core.history.push(LifecycleOp::Destroyed);
            core.imp.take()
        };
        drop(imp);
        self.shared.stats.record_destroyed(self.shared.kind);
        Ok(())
    }

    /// Every lifecycle operation applied so far, in order
    pub fn history(&self) -> Vec<LifecycleOp> {
        self.shared.core.lock().history.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.core.lock().imp.is_none()
    }

    pub fn is_attached(&self) -> bool {
        self.shared.core.lock().attached_to.is_some()
    }

    pub(crate) fn is_attached_to(&self, ticker: TickerId) -> bool {
        self.shared.core.lock().attached_to == Some(ticker)
    }

    pub fn link_count(&self) -> usize {
        self.shared.core.lock().links
    }
}

impl fmt::Debug for FilterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterHandle")
            .field("id", &self.shared.id)
            .field("kind", &self.shared.kind)
            .finish()
    }
}
