//! Error types for the media core
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


use thiserror::Error;

/// Result type for media core operations
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while building, running or tearing down media graphs
#[derive(Error, Debug)]
pub enum MediaError {
    /// No engine has been installed for this process
    #[error("Media engine not initialized")]
    EngineNotInitialized,

    /// `initialize_engine` called while an engine is installed
    #[error("Media engine already initialized")]
    EngineAlreadyInitialized,

    /// The engine was shut down and refuses new work
    #[error("Media engine has been shut down")]
    EngineShutDown,

    /// Configuration rejected by the engine
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload type has no encoder/decoder in this engine
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Bridged legs negotiated different codecs
    #[error("Codec mismatch: {a} cannot be bridged to {b} without transcoding")]
    CodecMismatch { a: String, b: String },

    /// Socket or address error
    #[error("Network error: {0}")]
    Network(String),

    /// RTP packet parsing error
    #[error("RTP packet parse error: {0}")]
    RtpParse(String),

    /// Filter rejected a method call
    #[error("Filter {filter} does not support method {method}")]
    UnsupportedMethod { filter: String, method: String },

    /// Filter failed while configuring or processing
    #[error("Filter {filter} error: {reason}")]
    Filter { filter: String, reason: String },

    /// Link/detach/unlink/destroy called out of order
    #[error("Lifecycle violation on {filter}: {reason}")]
    LifecycleViolation { filter: String, reason: String },

    /// Connection between two filters could not be made or removed
    #[error("Link error: {0}")]
    Link(String),

    /// Graph failed validation
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// Ticker could not be created or driven
    #[error("Ticker error: {0}")]
    Ticker(String),

    /// Leg has no media resources yet
    #[error("Call leg not provisioned: {0}")]
    LegNotProvisioned(String),

    /// Leg already has media resources
    #[error("Call leg already provisioned: {0}")]
    LegAlreadyProvisioned(String),

    /// Leg is not in the state the operation needs
    #[error("Invalid call leg state: {0}")]
    InvalidLegState(String),

    /// Audio file could not be opened or decoded
    #[error("Playback error: {0}")]
    Playback(String),
}

impl From<std::io::Error> for MediaError {
    fn from(err: std::io::Error) -> Self {
        MediaError::Network(err.to_string())
    }
}

impl From<hound::Error> for MediaError {
    fn from(err: hound::Error) -> Self {
        MediaError::Playback(err.to_string())
    }
}
