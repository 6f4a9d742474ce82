//! Process-wide media engine
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
use crate::events::{MediaEventReceiver, MediaEventSender};
use crate::factory::EngineFactory;
use crate::memory::{MemoryHooks, MemoryStats};
use parking_lot::{Mutex, RwLock};
use rms_config::MediaServerConfig;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

static ENGINE: RwLock<Option<Arc<MediaEngine>>> = parking_lot::const_rwlock(None);

/// Shared media engine state: configuration, memory hooks and the event
/// channel every factory posts to
pub struct MediaEngine {
    config: MediaServerConfig,
    memory: Arc<dyn MemoryHooks>,
    events_tx: MediaEventSender,
    events_rx: Mutex<Option<MediaEventReceiver>>,
    shut_down: AtomicBool,
    factories_created: AtomicU64,
}

impl MediaEngine {
    /// Build an engine without installing it globally
    pub fn new(config: MediaServerConfig, memory: Arc<dyn MemoryHooks>) -> MediaResult<Self> {
        config
            .validate()
            .map_err(|e| MediaError::Config(e.to_string()))?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(MediaEngine {
            config,
            memory,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            shut_down: AtomicBool::new(false),
            factories_created: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &MediaServerConfig {
        &self.config
    }

    pub fn memory(&self) -> &Arc<dyn MemoryHooks> {
        &self.memory
    }

    pub fn memory_stats(&self) -> Option<MemoryStats> {
        self.memory.stats()
    }

    /// The receiving end of the media event channel; `None` once taken
    pub fn take_event_receiver(&self) -> Option<MediaEventReceiver> {
        self.events_rx.lock().take()
    }

    /// Create a factory for one call leg
    pub fn create_factory(&self) -> MediaResult<EngineFactory> {
        if self.is_shut_down() {
            return Err(MediaError::EngineShutDown);
        }
        self.factories_created.fetch_add(1, Ordering::Relaxed);
        Ok(EngineFactory::new(
            self.config.engine.clone(),
            self.config.ticker.clone(),
            Arc::clone(&self.memory),
            self.events_tx.clone(),
        ))
    }

    pub fn factories_created(&self) -> u64 {
        self.factories_created.load(Ordering::Relaxed)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Refuse further factories; returns false if already shut down
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        match self.memory.stats() {
            Some(stats) if stats.live_buffers() > 0 => warn!(
                live_buffers = stats.live_buffers(),
                bytes_in_use = stats.bytes_in_use,
                "Media engine shut down with buffers outstanding"
            ),
            Some(stats) => info!(
                peak_bytes = stats.peak_bytes,
                allocations = stats.allocations,
                factories = self.factories_created(),
                "Media engine shut down"
            ),
            None => info!(factories = self.factories_created(), "Media engine shut down"),
        }
        true
    }
}

/// Initialize the process-wide engine with the given memory hooks
///
/// Fails if an engine is already installed.
pub fn initialize_engine(
    config: MediaServerConfig,
    memory: Arc<dyn MemoryHooks>,
) -> MediaResult<Arc<MediaEngine>> {
    let mut slot = ENGINE.write();
    if slot.is_some() {
        return Err(MediaError::EngineAlreadyInitialized);
    }
    let engine = Arc::new(MediaEngine::new(config, memory)?);
    *slot = Some(Arc::clone(&engine));
    info!(
        mtu = engine.config.engine.mtu,
        tick_interval_ms = engine.config.ticker.interval_ms,
        statistics = engine.config.engine.statistics_enabled,
        "Media engine initialized"
    );
    Ok(engine)
}

/// The installed engine
pub fn engine() -> MediaResult<Arc<MediaEngine>> {
    ENGINE
        .read()
        .as_ref()
        .cloned()
        .ok_or(MediaError::EngineNotInitialized)
}

/// Shut down and uninstall the engine; returns false if none was installed
pub fn shutdown_engine() -> bool {
    let engine = ENGINE.write().take();
    match engine {
        Some(engine) => {
            engine.shutdown();
            true
        }
        None => false,
    }
}
