//! Built-in filters
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


mod codec;
mod file_player;
mod rtp_recv;
mod rtp_send;
mod void_sink;

pub use codec::{DecoderFilter, EncoderFilter};
pub use file_player::FilePlayerFilter;
pub use rtp_recv::RtpRecvFilter;
pub use rtp_send::RtpSendFilter;
pub use void_sink::VoidSinkFilter;

use crate::error::MediaError;
use crate::filter::FilterKind;

pub(crate) fn filter_error(kind: FilterKind, reason: impl Into<String>) -> MediaError {
    MediaError::Filter {
        filter: kind.name().to_string(),
        reason: reason.into(),
    }
}
