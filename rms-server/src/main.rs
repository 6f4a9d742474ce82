//! RTP media server
//!
//! Drives the media core from the command line: plays a WAV file to a remote
//! RTP endpoint, or bridges two RTP endpoints, until end of file or Ctrl+C.
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


use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use rms_config::MediaServerConfig;
use rms_logging::{init_logging, LogFormat};
use rms_media::{
    bridge, create_call_leg_media, initialize_engine, play_file, release_call_leg_media,
    shutdown_engine, stop_bridge, stop_media, CallControl, CallId, CallLegMedia,
    HangupDispatcher, MediaEngine, PayloadType, SharedMemoryPool, TeardownOutcome,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "rms-server", version, about = "RTP media server")]
struct Cli {
    /// Log output format (json or console)
    #[arg(long, default_value = "console")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a WAV file to a remote RTP endpoint and hang up at end of file
    Play {
        /// WAV file to play
        file: PathBuf,
        /// Local RTP address (port 0 picks a free port)
        #[arg(long, default_value = "0.0.0.0:0")]
        local: SocketAddr,
        /// Remote RTP address
        #[arg(long)]
        remote: SocketAddr,
        /// Codec: pcmu or pcma
        #[arg(long, default_value = "pcmu")]
        codec: String,
        /// Call identifier used in logs and the hangup signal
        #[arg(long, default_value = "cli-call")]
        call_id: String,
    },
    /// Bridge two RTP endpoints until Ctrl+C
    Bridge {
        #[arg(long)]
        local_a: SocketAddr,
        #[arg(long)]
        remote_a: SocketAddr,
        #[arg(long)]
        local_b: SocketAddr,
        #[arg(long)]
        remote_b: SocketAddr,
        /// Codec for both legs: pcmu or pcma
        #[arg(long, default_value = "pcmu")]
        codec: String,
    },
}

fn payload_type(codec: &str) -> Result<PayloadType> {
    match codec.to_ascii_lowercase().as_str() {
        "pcmu" | "ulaw" => Ok(PayloadType::pcmu()),
        "pcma" | "alaw" => Ok(PayloadType::pcma()),
        other => bail!("unsupported codec: {}", other),
    }
}

/// Call control for a process that handles a single call
#[derive(Default)]
struct ProcessCallControl {
    hangup: Notify,
}

#[async_trait]
impl CallControl for ProcessCallControl {
    async fn hangup(&self, call_id: &CallId) {
        info!(call_id = %call_id, "Hangup requested");
        self.hangup.notify_one();
    }
}

fn log_outcome(outcome: &TeardownOutcome) {
    match outcome {
        TeardownOutcome::NotActive => info!("No media was running"),
        TeardownOutcome::Stopped(report) => info!(
            sessions = report.sessions.len(),
            destroyed = report.destroyed,
            ticks = report.ticks,
            "Media torn down"
        ),
    }
}

async fn run_play(
    engine: &MediaEngine,
    control: &ProcessCallControl,
    file: PathBuf,
    local: SocketAddr,
    remote: SocketAddr,
    codec: &str,
    call_id: String,
) -> Result<()> {
    let mut leg = CallLegMedia::new(local, remote, payload_type(codec)?);
    create_call_leg_media(engine, &mut leg, CallId::from(call_id))
        .context("Failed to provision call leg")?;

    if let Err(e) = play_file(&mut leg, &file) {
        release_call_leg_media(&mut leg)?;
        return Err(e).with_context(|| format!("Failed to play {}", file.display()));
    }
    info!(local = ?leg.local_rtp_addr(), remote = %remote, "Playing. Press Ctrl+C to stop.");

    tokio::select! {
        _ = control.hangup.notified() => {}
        result = signal::ctrl_c() => {
            if let Err(err) = result {
                error!(error = %err, "Unable to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        }
    }

    log_outcome(&stop_media(&mut leg)?);
    release_call_leg_media(&mut leg)?;
    Ok(())
}

async fn run_bridge(
    engine: &MediaEngine,
    local_a: SocketAddr,
    remote_a: SocketAddr,
    local_b: SocketAddr,
    remote_b: SocketAddr,
    codec: &str,
) -> Result<()> {
    let payload = payload_type(codec)?;
    let mut leg_a = CallLegMedia::new(local_a, remote_a, payload.clone());
    let mut leg_b = CallLegMedia::new(local_b, remote_b, payload);
    create_call_leg_media(engine, &mut leg_a, CallId::from("leg-a"))
        .context("Failed to provision leg A")?;
    create_call_leg_media(engine, &mut leg_b, CallId::from("leg-b"))
        .context("Failed to provision leg B")?;

    if let Err(e) = bridge(&mut leg_a, &mut leg_b) {
        release_call_leg_media(&mut leg_a)?;
        release_call_leg_media(&mut leg_b)?;
        return Err(e).context("Failed to bridge legs");
    }
    info!(
        leg_a = ?leg_a.local_rtp_addr(),
        leg_b = ?leg_b.local_rtp_addr(),
        "Bridging. Press Ctrl+C to stop."
    );

    if let Err(err) = signal::ctrl_c().await {
        error!(error = %err, "Unable to listen for shutdown signal");
    }
    info!("Shutdown signal received");

    log_outcome(&stop_bridge(&mut leg_a, &mut leg_b)?);
    release_call_leg_media(&mut leg_a)?;
    release_call_leg_media(&mut leg_b)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = MediaServerConfig::from_env().context("Failed to load configuration")?;

    // Initialize logging
    init_logging("rms-server", config.log_level(), cli.log_format);

    let pool = Arc::new(SharedMemoryPool::new());
    let engine =
        initialize_engine(config, pool.clone()).context("Failed to initialize media engine")?;
    let events = engine
        .take_event_receiver()
        .context("Media event receiver already taken")?;

    let control = Arc::new(ProcessCallControl::default());
    let dispatcher = HangupDispatcher::spawn(events, control.clone());

    let result = match cli.command {
        Command::Play {
            file,
            local,
            remote,
            codec,
            call_id,
        } => run_play(&engine, &control, file, local, remote, &codec, call_id).await,
        Command::Bridge {
            local_a,
            remote_a,
            local_b,
            remote_b,
            codec,
        } => run_bridge(&engine, local_a, remote_a, local_b, remote_b, &codec).await,
    };

    dispatcher.abort();
    shutdown_engine();

    let memory = pool.snapshot();
    info!(
        peak_bytes = memory.peak_bytes,
        live_buffers = memory.live_buffers(),
        "RTP media server stopped"
    );

    result
}
