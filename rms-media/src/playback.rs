//! File playback into a call leg
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
use crate::events::EofNotification;
use crate::filter::{FilterKind, FilterMethod};
use crate::teardown::{self, TeardownOutcome};
use std::path::Path;
use tracing::{info, warn};

/// Player -> encoder -> RTP send
pub const PIPELINE_SEND: &str = "send";
/// RTP receive -> void sink
pub const PIPELINE_RECEIVE: &str = "receive";

/// Play a WAV file into the leg, discarding its inbound audio
///
/// When the file is exhausted a [`crate::MediaEvent::PlaybackFinished`] is
/// posted for the leg's call id; the media keeps running until
/// [`stop_media`] is called.
pub fn play_file(leg: &mut CallLegMedia, file_path: impl AsRef<Path>) -> MediaResult<()> {
    let path = file_path.as_ref();
    let factory = leg.require_provisioned()?;
    leg.require_idle()?;

    let missing = || MediaError::LegNotProvisioned(leg.label());
    let rtp_recv = leg.filters.rtp_recv.clone().ok_or_else(missing)?;
    let rtp_send = leg.filters.rtp_send.clone().ok_or_else(missing)?;
    let encoder = leg.filters.encoder.clone().ok_or_else(missing)?;
    let call_id = leg.call_id().cloned().ok_or_else(missing)?;

    let ticker = factory.create_ticker(&format!("play-{}", call_id))?;
    let player = factory.create_filter(FilterKind::FilePlayer)?;
    let void_sink = factory.create_filter(FilterKind::VoidSink)?;

    let built = (|| -> MediaResult<()> {
        player.call_method(FilterMethod::NotifyOnEof(EofNotification::new(
            call_id.clone(),
            factory.events().clone(),
        )))?;
        player.call_method(FilterMethod::Open(path.to_path_buf()))?;
        player.call_method(FilterMethod::SetOutputChannels(1))?;
        player.call_method(FilterMethod::SetSampleRate(leg.payload.clock_rate))?;
        player.call_method(FilterMethod::Start)?;

        ticker.with_graph(|graph| {
            graph.link_pipeline(PIPELINE_SEND, &[&player, &encoder, &rtp_send])?;
            graph.link_pipeline(PIPELINE_RECEIVE, &[&rtp_recv, &void_sink])
        })?;
        ticker.attach_multiple(&[&player, &rtp_recv])
    })();

    if let Err(e) = built {
        if let Err(unlink) = ticker.with_graph(|graph| graph.dismantle()) {
            warn!(error = %unlink, "Playback rollback could not unlink");
        }
        for filter in [&player, &void_sink] {
            if let Err(destroy) = filter.destroy() {
                warn!(filter = %filter.label(), error = %destroy, "Playback rollback could not destroy");
            }
        }
        return Err(e);
    }

    info!(
        call_id = %call_id,
        path = %path.display(),
        codec = %leg.payload,
        ticker = %ticker.id(),
        "Playback started"
    );

    leg.filters.player = Some(player);
    leg.filters.void_sink = Some(void_sink);
    leg.ticker = Some(ticker);
    leg.activity = LegActivity::Playback;
    Ok(())
}

/// Tear down the leg's playback
///
/// Returns [`TeardownOutcome::NotActive`] when nothing is running.
pub fn stop_media(leg: &mut CallLegMedia) -> MediaResult<TeardownOutcome> {
    if leg.ticker.is_none() {
        return Ok(TeardownOutcome::NotActive);
    }
    if leg.activity != LegActivity::Playback {
        return Err(MediaError::InvalidLegState(format!(
            "{} is not playing ({:?})",
            leg.label(),
            leg.activity
        )));
    }
    let Some(ticker) = leg.ticker.take() else {
        return Ok(TeardownOutcome::NotActive);
    };

    // Stop the file before the graph goes away
    if let Some(player) = leg.player() {
        if let Err(e) = player.call_method(FilterMethod::Close) {
            warn!(call_id = %leg.label(), error = %e, "Player close failed");
        }
    }

    info!(call_id = %leg.label(), "Stopping playback");
    let report = teardown::dismantle(ticker, &mut [("playback", leg)])?;
    Ok(TeardownOutcome::Stopped(report))
}
