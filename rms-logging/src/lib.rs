//! Structured logging setup for the RTP media server
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


use std::str::FromStr;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Output format of the log stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line (production)
    Json,
    /// Human-readable lines (development)
    Console,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "console" | "text" | "pretty" => Ok(LogFormat::Console),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize structured logging for a media server process
///
/// `RUST_LOG` wins over `default_level` when it is set. Media statistics are
/// emitted at `info`, per-tick diagnostics at `trace`.
pub fn init_logging(service_name: &str, default_level: &str, format: LogFormat) {
    let registry = tracing_subscriber::registry().with(env_filter(default_level));

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(false)
                    .with_span_list(false),
            )
            .init(),
        LogFormat::Console => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_line_number(true),
            )
            .init(),
    }

    tracing::info!(
        service = service_name,
        format = ?format,
        "Logging initialized"
    );
}

/// Install a subscriber that writes through the test harness
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("debug"))
        .with_test_writer()
        .with_thread_names(true)
        .try_init();
}
