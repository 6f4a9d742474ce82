//! Bidirectional RTP bridge between two call legs
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


use crate::call_leg::{CallLegMedia, LegActivity};
use crate::error::{MediaError, MediaResult};
use crate::filter::FilterHandle;
use crate::teardown::{self, TeardownOutcome};
use tracing::{info, warn};

/// Pipeline carrying leg A's inbound audio out through leg B
pub const PIPELINE_A_TO_B: &str = "a-to-b";
/// Pipeline carrying leg B's inbound audio out through leg A
pub const PIPELINE_B_TO_A: &str = "b-to-a";

fn handle(slot: &Option<FilterHandle>, leg: &CallLegMedia) -> MediaResult<FilterHandle> {
    slot.clone()
        .ok_or_else(|| MediaError::LegNotProvisioned(leg.label()))
}

/// Bridge two provisioned, idle legs
///
/// Packets flow A.recv -> B.send and B.recv -> A.send without transcoding,
/// driven by a ticker owned by leg A. On failure both legs are left as they
/// were.
pub fn bridge(leg_a: &mut CallLegMedia, leg_b: &mut CallLegMedia) -> MediaResult<()> {
    let factory = leg_a.require_provisioned()?;
    leg_b.require_provisioned()?;
    leg_a.require_idle()?;
    leg_b.require_idle()?;

    if !leg_a.payload.is_compatible(&leg_b.payload) {
        return Err(MediaError::CodecMismatch {
            a: leg_a.payload.to_string(),
            b: leg_b.payload.to_string(),
        });
    }

    let a_recv = handle(&leg_a.filters.rtp_recv, leg_a)?;
    let a_send = handle(&leg_a.filters.rtp_send, leg_a)?;
    let b_recv = handle(&leg_b.filters.rtp_recv, leg_b)?;
    let b_send = handle(&leg_b.filters.rtp_send, leg_b)?;

    let ticker = factory.create_ticker(&format!("bridge-{}", leg_a.label()))?;

    let built = ticker
        .with_graph(|graph| {
            graph.link_pipeline(PIPELINE_A_TO_B, &[&a_recv, &b_send])?;
            graph.link_pipeline(PIPELINE_B_TO_A, &[&b_recv, &a_send])
        })
        .and_then(|_| ticker.attach_multiple(&[&a_recv, &b_recv]));

    if let Err(e) = built {
        if let Err(unlink) = ticker.with_graph(|graph| graph.dismantle()) {
            warn!(error = %unlink, "Bridge rollback could not unlink");
        }
        return Err(e);
    }

    info!(
        call_a = %leg_a.label(),
        call_b = %leg_b.label(),
        codec = %leg_a.payload,
        ticker = %ticker.id(),
        "Call legs bridged"
    );

    leg_a.ticker = Some(ticker);
    leg_a.activity = LegActivity::BridgeOwner;
    leg_b.activity = LegActivity::BridgePeer;
    Ok(())
}

/// Tear down a bridge made by [`bridge`] with the same leg order
///
/// Returns [`TeardownOutcome::NotActive`] when leg A runs no ticker.
pub fn stop_bridge(leg_a: &mut CallLegMedia, leg_b: &mut CallLegMedia) -> MediaResult<TeardownOutcome> {
    if leg_a.ticker.is_none() {
        return Ok(TeardownOutcome::NotActive);
    }
    if leg_a.activity != LegActivity::BridgeOwner {
        return Err(MediaError::InvalidLegState(format!(
            "{} does not own a bridge ({:?})",
            leg_a.label(),
            leg_a.activity
        )));
    }
    if leg_b.activity != LegActivity::BridgePeer {
        return Err(MediaError::InvalidLegState(format!(
            "{} is not the bridged peer ({:?})",
            leg_b.label(),
            leg_b.activity
        )));
    }
    let peer_attached = match (leg_a.ticker.as_ref(), leg_b.filters.rtp_recv.as_ref()) {
        (Some(ticker), Some(b_recv)) => ticker.entry_points().contains(&b_recv.id()),
        _ => false,
    };
    if !peer_attached {
        return Err(MediaError::InvalidLegState(format!(
            "{} is not bridged with {}",
            leg_b.label(),
            leg_a.label()
        )));
    }
    let Some(ticker) = leg_a.ticker.take() else {
        return Ok(TeardownOutcome::NotActive);
    };

    info!(call_a = %leg_a.label(), call_b = %leg_b.label(), "Stopping bridge");
    let report = teardown::dismantle(ticker, &mut [("offer", leg_a), ("answer", leg_b)])?;
    Ok(TeardownOutcome::Stopped(report))
}
