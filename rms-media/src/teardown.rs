//! Ordered teardown shared by bridges and playback
//!
//! Detach, capture statistics, unlink, destroy, stop the ticker. Each step
//! only starts once the previous one is complete for every leg involved.
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


use crate::call_leg::{CallId, CallLegMedia, LegActivity};
use crate::error::MediaResult;
use crate::factory::FilterKindStats;
use crate::filter::{FilterHandle, FilterKind};
use crate::session::RtpStats;
use crate::ticker::Ticker;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a stop request
#[derive(Debug, Clone, PartialEq)]
pub enum TeardownOutcome {
    /// Nothing was running on the leg
    NotActive,
    /// Media was running and has been dismantled
    Stopped(TeardownReport),
}

impl TeardownOutcome {
    pub fn is_stopped(&self) -> bool {
        matches!(self, TeardownOutcome::Stopped(_))
    }

    pub fn report(&self) -> Option<&TeardownReport> {
        match self {
            TeardownOutcome::Stopped(report) => Some(report),
            TeardownOutcome::NotActive => None,
        }
    }
}

/// RTP statistics of one session at teardown
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub label: String,
    pub call_id: Option<CallId>,
    pub stats: RtpStats,
}

/// Factory statistics of one leg at teardown
#[derive(Debug, Clone, PartialEq)]
pub struct FactoryReport {
    pub factory_id: Uuid,
    pub filters: Vec<(FilterKind, FilterKindStats)>,
}

/// Statistics captured while dismantling
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeardownReport {
    pub sessions: Vec<SessionReport>,
    pub factories: Vec<FactoryReport>,
    pub detached: usize,
    pub unlinked: usize,
    pub destroyed: usize,
    pub ticks: u64,
}

impl TeardownReport {
    /// Session statistics by label
    pub fn session(&self, label: &str) -> Option<&RtpStats> {
        self.sessions
            .iter()
            .find(|s| s.label == label)
            .map(|s| &s.stats)
    }
}

/// Dismantle everything driven by `ticker` across `legs`
///
/// Each leg comes with the label its session statistics are reported under.
pub(crate) fn dismantle(
    mut ticker: Ticker,
    legs: &mut [(&'static str, &mut CallLegMedia)],
) -> MediaResult<TeardownReport> {
    let mut report = TeardownReport::default();

    // 1. detach
    for (_, leg) in legs.iter() {
        let present: Vec<&FilterHandle> = leg.filters.present().collect();
        for filter in present {
            if ticker.detach(filter) {
                report.detached += 1;
            }
        }
    }

    // 2. statistics
    for (label, leg) in legs.iter() {
        if let Some(session) = leg.session() {
            let stats = session.stats();
            stats.display(label);
            report.sessions.push(SessionReport {
                label: label.to_string(),
                call_id: leg.call_id().cloned(),
                stats,
            });
        }
        if let Some(factory) = leg.factory() {
            factory.log_statistics();
            report.factories.push(FactoryReport {
                factory_id: factory.id(),
                filters: factory.statistics(),
            });
        }
    }

    // 3. unlink, 4. destroy
    let dismantled = ticker
        .with_graph(|graph| graph.dismantle())
        .and_then(|unlinked| {
            report.unlinked = unlinked;
            for (_, leg) in legs.iter_mut() {
                report.destroyed += leg.filters.destroy_all()?;
            }
            Ok(())
        });

    // 5. stop
    report.ticks = ticker.tick_count();
    ticker.stop();
    drop(ticker);

    // Legs never stay busy without a ticker
    for (_, leg) in legs.iter_mut() {
        leg.activity = LegActivity::Idle;
    }

    if let Err(e) = dismantled {
        warn!(
            error = %e,
            unlinked = report.unlinked,
            destroyed = report.destroyed,
            "Media graph dismantle incomplete"
        );
        return Err(e);
    }

    debug!(
        detached = report.detached,
        unlinked = report.unlinked,
        destroyed = report.destroyed,
        "Media graph dismantled"
    );
    info!(
        legs = legs.len(),
        ticks = report.ticks,
        "Media stopped"
    );
    Ok(report)
}
