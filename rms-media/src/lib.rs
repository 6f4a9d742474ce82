//! Media graph lifecycle core for a SIP media relay
//!
//! This crate builds and tears down the real-time audio graph behind a call:
//! - Per-leg provisioning of an RTP session and its filters
//! - Bidirectional RTP bridging between two legs
//! - WAV playback into a leg with a hangup signal at end of file
//! - Ordered teardown with statistics capture
//!
//! Filters are linked into a [`MediaGraph`] owned by a [`Ticker`], attached,
//! and on teardown detached, unlinked and destroyed in that order.
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


pub mod block;
pub mod bridge;
pub mod call_leg;
pub mod codec;
pub mod engine;
pub mod error;
pub mod events;
pub mod factory;
pub mod filter;
pub mod filters;
pub mod graph;
pub mod memory;
pub mod playback;
pub mod rtp;
pub mod session;
pub mod teardown;
pub mod ticker;

// Re-export main types
pub use block::MediaBlock;
pub use bridge::{bridge, stop_bridge, PIPELINE_A_TO_B, PIPELINE_B_TO_A};
pub use call_leg::{
    create_call_leg_media, release_call_leg_media, CallId, CallLegMedia, LegActivity,
};
pub use codec::{Codec, PayloadType};
pub use engine::{engine, initialize_engine, shutdown_engine, MediaEngine};
pub use error::{MediaError, MediaResult};
pub use events::{
    CallControl, EofNotification, HangupDispatcher, MediaEvent, MediaEventReceiver,
    MediaEventSender,
};
pub use factory::{EngineFactory, FactoryStats, FilterKindStats};
pub use filter::{
    Filter, FilterHandle, FilterId, FilterIo, FilterKind, FilterMethod, LifecycleOp, TickContext,
};
pub use graph::{MediaGraph, TickOutcome};
pub use memory::{MemoryHooks, MemoryStats, SharedMemoryPool, SystemMemory};
pub use playback::{play_file, stop_media, PIPELINE_RECEIVE, PIPELINE_SEND};
pub use rtp::RtpHeader;
pub use session::{RtpSession, RtpStats};
pub use teardown::{FactoryReport, SessionReport, TeardownOutcome, TeardownReport};
pub use ticker::{Ticker, TickerId, TickerParams};
