//! Per-leg engine factory
//!
//! A factory creates filters and tickers for one call leg and keeps
//! per-filter-kind statistics for them.
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


use crate::codec::{Codec, PayloadType};
use crate::error::{MediaError, MediaResult};
use crate::events::MediaEventSender;
use crate::filter::{Filter, FilterHandle, FilterKind};
use crate::filters::{
    DecoderFilter, EncoderFilter, FilePlayerFilter, RtpRecvFilter, RtpSendFilter, VoidSinkFilter,
};
use crate::memory::MemoryHooks;
use crate::ticker::{Ticker, TickerParams};
use parking_lot::Mutex;
use rms_config::{EngineConfig, TickerConfig};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Statistics for one filter kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterKindStats {
    pub created: u64,
    pub destroyed: u64,
    pub process_calls: u64,
    pub process_time: Duration,
}

impl FilterKindStats {
    /// Instances not yet destroyed
    pub fn alive(&self) -> u64 {
        self.created.saturating_sub(self.destroyed)
    }
}

/// Counters shared by a factory and every filter it created
#[derive(Debug)]
pub struct FactoryStats {
    enabled: AtomicBool,
    kinds: Mutex<BTreeMap<FilterKind, FilterKindStats>>,
}

impl FactoryStats {
    pub fn new(enabled: bool) -> Self {
        FactoryStats {
            enabled: AtomicBool::new(enabled),
            kinds: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn record_created(&self, kind: FilterKind) {
        self.kinds.lock().entry(kind).or_default().created += 1;
    }

    pub(crate) fn record_destroyed(&self, kind: FilterKind) {
        self.kinds.lock().entry(kind).or_default().destroyed += 1;
    }

    pub(crate) fn record_process(&self, kind: FilterKind, elapsed: Duration) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        let mut kinds = self.kinds.lock();
        let entry = kinds.entry(kind).or_default();
        entry.process_calls += 1;
        entry.process_time += elapsed;
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Clear processing counters; instance counts are kept
    pub fn reset(&self) {
        for stats in self.kinds.lock().values_mut() {
            stats.process_calls = 0;
            stats.process_time = Duration::ZERO;
        }
    }

    pub fn snapshot(&self) -> Vec<(FilterKind, FilterKindStats)> {
        self.kinds.lock().iter().map(|(k, v)| (*k, *v)).collect()
    }
}

/// Factory for one call leg's filters and tickers
pub struct EngineFactory {
    id: Uuid,
    config: EngineConfig,
    ticker_config: TickerConfig,
    memory: Arc<dyn MemoryHooks>,
    events: MediaEventSender,
    stats: Arc<FactoryStats>,
}

impl EngineFactory {
    pub fn new(
        config: EngineConfig,
        ticker_config: TickerConfig,
        memory: Arc<dyn MemoryHooks>,
        events: MediaEventSender,
    ) -> Self {
        let stats = Arc::new(FactoryStats::new(config.statistics_enabled));
        let factory = EngineFactory {
            id: Uuid::new_v4(),
            config,
            ticker_config,
            memory,
            events,
            stats,
        };
        debug!(factory_id = %factory.id, "Engine factory created");
        factory
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// MTU applied to sessions created for this factory's leg
    pub fn mtu(&self) -> usize {
        self.config.mtu
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn memory(&self) -> &Arc<dyn MemoryHooks> {
        &self.memory
    }

    pub(crate) fn events(&self) -> &MediaEventSender {
        &self.events
    }

    /// Create a filter that needs no codec parameters
    pub fn create_filter(&self, kind: FilterKind) -> MediaResult<FilterHandle> {
        let imp: Box<dyn Filter> = match kind {
            FilterKind::RtpRecv => Box::new(RtpRecvFilter::new(
                Arc::clone(&self.memory),
                self.config.max_packets_per_tick,
            )),
            FilterKind::RtpSend => Box::new(RtpSendFilter::new()),
            FilterKind::FilePlayer => Box::new(FilePlayerFilter::new(Arc::clone(&self.memory))),
            FilterKind::VoidSink => Box::new(VoidSinkFilter::new()),
            FilterKind::Encoder | FilterKind::Decoder => {
                return Err(MediaError::Filter {
                    filter: kind.name().to_string(),
                    reason: "codec filters are created from a payload type".to_string(),
                })
            }
        };
        Ok(self.wrap(imp))
    }

    /// Create an encoder for `payload`
    pub fn create_encoder(&self, payload: &PayloadType) -> MediaResult<FilterHandle> {
        let codec = Codec::for_payload(payload)?;
        Ok(self.wrap(Box::new(EncoderFilter::new(
            codec,
            Arc::clone(&self.memory),
            self.config.ptime_ms,
        ))))
    }

    /// Create a decoder for `payload`
    pub fn create_decoder(&self, payload: &PayloadType) -> MediaResult<FilterHandle> {
        let codec = Codec::for_payload(payload)?;
        Ok(self.wrap(Box::new(DecoderFilter::new(codec, Arc::clone(&self.memory)))))
    }

    fn wrap(&self, imp: Box<dyn Filter>) -> FilterHandle {
        let handle = FilterHandle::new(imp, Arc::clone(&self.stats));
        debug!(factory_id = %self.id, filter = %handle.label(), "Filter created");
        handle
    }

    /// Create a ticker with the configured interval, priority and mode
    pub fn create_ticker(&self, name: &str) -> MediaResult<Ticker> {
        Ticker::new(TickerParams::from_config(name, &self.ticker_config))
    }

    pub fn enable_statistics(&self, enabled: bool) {
        self.stats.set_enabled(enabled);
    }

    pub fn reset_statistics(&self) {
        self.stats.reset();
    }

    pub fn statistics(&self) -> Vec<(FilterKind, FilterKindStats)> {
        self.stats.snapshot()
    }

    /// Emit per-kind statistics to the log
    pub fn log_statistics(&self) {
        for (kind, stats) in self.stats.snapshot() {
            info!(
                factory_id = %self.id,
                filter = kind.name(),
                created = stats.created,
                destroyed = stats.destroyed,
                process_calls = stats.process_calls,
                process_time_us = stats.process_time.as_micros() as u64,
                "Filter statistics"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SystemMemory;
    use rms_config::TickerMode;
    use tokio::sync::mpsc;

    fn factory() -> EngineFactory {
        let (tx, _rx) = mpsc::unbounded_channel();
        let ticker = TickerConfig {
            mode: TickerMode::Manual,
            ..TickerConfig::default()
        };
        EngineFactory::new(EngineConfig::default(), ticker, Arc::new(SystemMemory), tx)
    }

    #[test]
    fn test_create_filters_and_count() {
        let factory = factory();
        let recv = factory.create_filter(FilterKind::RtpRecv).unwrap();
        let encoder = factory.create_encoder(&PayloadType::pcmu()).unwrap();
        assert_eq!(recv.kind(), FilterKind::RtpRecv);
        assert_eq!(encoder.kind(), FilterKind::Encoder);

        recv.destroy().unwrap();
        let stats: BTreeMap<_, _> = factory.statistics().into_iter().collect();
        assert_eq!(stats[&FilterKind::RtpRecv].created, 1);
        assert_eq!(stats[&FilterKind::RtpRecv].alive(), 0);
        assert_eq!(stats[&FilterKind::Encoder].alive(), 1);
    }

    #[test]
    fn test_codec_filters_need_payload() {
        let factory = factory();
        assert!(factory.create_filter(FilterKind::Encoder).is_err());
        let opus = PayloadType::new(111, "opus", 48000);
        assert!(matches!(
            factory.create_decoder(&opus),
            Err(MediaError::UnsupportedCodec(_))
        ));
    }

    #[test]
    fn test_reset_keeps_instance_counts() {
        let stats = FactoryStats::new(true);
        stats.record_created(FilterKind::VoidSink);
        stats.record_process(FilterKind::VoidSink, Duration::from_micros(5));
        stats.reset();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot[0].1.created, 1);
        assert_eq!(snapshot[0].1.process_calls, 0);

        stats.set_enabled(false);
        stats.record_process(FilterKind::VoidSink, Duration::from_micros(5));
        assert_eq!(stats.snapshot()[0].1.process_calls, 0);
    }

    #[test]
    fn test_ticker_from_config() {
        let ticker = factory().create_ticker("leg").unwrap();
        assert!(!ticker.is_threaded());
        assert_eq!(ticker.name(), "leg");
    }
}
