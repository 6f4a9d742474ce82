//! Periodic scheduler driving a media graph
//!
//! A ticker owns one [`MediaGraph`]. Each tick runs every filter reachable
//! from the attached entry points once, producers before consumers, under
//! the ticker lock; attach, detach and graph edits take the same lock, so
//! they never interleave with a running tick.
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
use crate::filter::{FilterHandle, FilterId, TickContext};
use crate::graph::MediaGraph;
use parking_lot::Mutex;
use rms_config::{TickerConfig, TickerMode, TickerPriority};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static NEXT_TICKER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickerId(u64);

impl TickerId {
    pub(crate) fn next() -> Self {
        TickerId(NEXT_TICKER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TickerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ticker-{}", self.0)
    }
}

/// Ticker construction parameters
#[derive(Debug, Clone)]
pub struct TickerParams {
    pub name: String,
    pub interval: Duration,
    pub priority: TickerPriority,
    pub mode: TickerMode,
}

impl TickerParams {
    pub fn from_config(name: impl Into<String>, config: &TickerConfig) -> Self {
        TickerParams {
            name: name.into(),
            interval: Duration::from_millis(config.interval_ms),
            priority: config.priority,
            mode: config.mode,
        }
    }

    /// How long before each deadline the thread stops sleeping and spins
    fn spin_window(&self) -> Duration {
        match self.priority {
            TickerPriority::Normal => Duration::ZERO,
            TickerPriority::High => Duration::from_millis(1),
            TickerPriority::Realtime => Duration::from_millis(2),
        }
    }
}

struct TickerCore {
    graph: MediaGraph,
    entries: Vec<FilterHandle>,
    schedule: Vec<FilterId>,
    ticks: u64,
    late_ticks: u64,
    filter_errors: u64,
}

struct TickerShared {
    id: TickerId,
    name: String,
    interval_ms: u64,
    running: AtomicBool,
    core: Mutex<TickerCore>,
}

impl TickerShared {
    fn tick_once(&self) -> usize {
        let mut guard = self.core.lock();
        let core = &mut *guard;
        core.ticks += 1;
        let tick = TickContext {
            count: core.ticks,
            time_ms: core.ticks * self.interval_ms,
            interval_ms: self.interval_ms,
        };
        let outcome = core.graph.run_tick(&core.schedule, tick);
        core.filter_errors += outcome.errors as u64;
        outcome.processed
    }
}

/// Periodic driver of a media graph
pub struct Ticker {
    shared: Arc<TickerShared>,
    thread: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Create a ticker; in threaded mode its thread starts immediately
    pub fn new(params: TickerParams) -> MediaResult<Self> {
        if params.interval.is_zero() {
            return Err(MediaError::Ticker("tick interval must be non-zero".to_string()));
        }

        let shared = Arc::new(TickerShared {
            id: TickerId::next(),
            name: params.name.clone(),
            interval_ms: params.interval.as_millis() as u64,
            running: AtomicBool::new(true),
            core: Mutex::new(TickerCore {
                graph: MediaGraph::new(),
                entries: Vec::new(),
                schedule: Vec::new(),
                ticks: 0,
                late_ticks: 0,
                filter_errors: 0,
            }),
        });

        let thread = match params.mode {
            TickerMode::Manual => None,
            TickerMode::Threaded => {
                let worker = Arc::clone(&shared);
                let handle = thread::Builder::new()
                    .name(params.name.clone())
                    .spawn(move || run(worker, params))
                    .map_err(|e| MediaError::Ticker(format!("failed to spawn thread: {}", e)))?;
                Some(handle)
            }
        };

        debug!(ticker = %shared.id, name = %shared.name, threaded = thread.is_some(), "Ticker created");
        Ok(Ticker { shared, thread })
    }

    pub fn id(&self) -> TickerId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Run `f` on the graph under the ticker lock
    pub fn with_graph<R>(&self, f: impl FnOnce(&mut MediaGraph) -> R) -> R {
        f(&mut self.shared.core.lock().graph)
    }

    pub fn attach(&self, entry: &FilterHandle) -> MediaResult<()> {
        self.attach_multiple(&[entry])
    }

    /// Attach several entry points at once
    ///
    /// The resulting graph is validated first; on any failure nothing is
    /// attached.
    pub fn attach_multiple(&self, entries: &[&FilterHandle]) -> MediaResult<()> {
        let mut guard = self.shared.core.lock();
        let core = &mut *guard;
        let ticker = self.shared.id;

        let mut ids: Vec<FilterId> = core.entries.iter().map(FilterHandle::id).collect();
        for entry in entries {
            if !ids.contains(&entry.id()) {
                ids.push(entry.id());
            }
        }
        core.graph.validate(&ids)?;
        let schedule = core.graph.schedule(&ids)?;

        let mut newly_attached: Vec<FilterHandle> = Vec::new();
        for id in &schedule {
            let Some(handle) = core.graph.node(*id) else {
                continue;
            };
            match handle.mark_attached(ticker) {
                Ok(true) => newly_attached.push(handle.clone()),
                Ok(false) => {}
                Err(e) => {
                    for handle in &newly_attached {
                        handle.mark_detached(ticker);
                    }
                    return Err(e);
                }
            }
        }

        for entry in entries {
            if !core.entries.iter().any(|h| h.id() == entry.id()) {
                core.entries.push((*entry).clone());
            }
        }
        core.schedule = schedule;
        debug!(
            ticker = %ticker,
            entries = core.entries.len(),
            filters = core.schedule.len(),
            "Filters attached"
        );
        Ok(())
    }

    /// Detach the connected part of the graph that contains `filter`
    ///
    /// Returns false when `filter` was not attached here.
    pub fn detach(&self, filter: &FilterHandle) -> bool {
        let mut guard = self.shared.core.lock();
        let core = &mut *guard;
        let ticker = self.shared.id;

        if !filter.is_attached_to(ticker) {
            return false;
        }

        let component = core.graph.component(filter.id());
        for id in &component {
            if let Some(handle) = core.graph.node(*id) {
                handle.mark_detached(ticker);
            }
        }
        filter.mark_detached(ticker);
        core.entries.retain(|h| !component.contains(&h.id()));

        let ids: Vec<FilterId> = core.entries.iter().map(FilterHandle::id).collect();
        core.schedule = match core.graph.schedule(&ids) {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Schedule rebuild failed after detach");
                Vec::new()
            }
        };
        debug!(ticker = %ticker, filter = %filter.label(), detached = component.len(), "Filters detached");
        true
    }

    /// Run a single tick on the calling thread; returns the number of filters run
    pub fn tick(&self) -> usize {
        self.shared.tick_once()
    }

    pub fn tick_count(&self) -> u64 {
        self.shared.core.lock().ticks
    }

    /// Ticks that started after their deadline
    pub fn late_ticks(&self) -> u64 {
        self.shared.core.lock().late_ticks
    }

    /// Filter process failures seen so far
    pub fn filter_errors(&self) -> u64 {
        self.shared.core.lock().filter_errors
    }

    pub fn entry_points(&self) -> Vec<FilterId> {
        self.shared.core.lock().entries.iter().map(FilterHandle::id).collect()
    }

    pub fn is_threaded(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop and join the ticker thread
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!(ticker = %self.shared.id, "Ticker thread panicked");
            }
            info!(
                ticker = %self.shared.id,
                name = %self.shared.name,
                ticks = self.tick_count(),
                late_ticks = self.late_ticks(),
                "Ticker stopped"
            );
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: Arc<TickerShared>, params: TickerParams) {
    let interval = params.interval;
    let spin = params.spin_window();
    let mut deadline = Instant::now() + interval;

    while shared.running.load(Ordering::Acquire) {
        shared.tick_once();

        let now = Instant::now();
        if now >= deadline {
            shared.core.lock().late_ticks += 1;
            deadline = now + interval;
            continue;
        }
        wait_until(deadline, spin);
        deadline += interval;
    }
}

fn wait_until(deadline: Instant, spin: Duration) {
    let now = Instant::now();
    if deadline > now + spin {
        thread::sleep(deadline - now - spin);
    }
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}
