//! RTP sender: payload blocks in, session packets out
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


use super::filter_error;
use crate::error::MediaResult;
use crate::filter::{Filter, FilterIo, FilterKind, FilterMethod};
use crate::session::RtpSession;
use std::sync::Arc;
use tracing::trace;

#[derive(Default)]
pub struct RtpSendFilter {
    session: Option<Arc<RtpSession>>,
}

impl RtpSendFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filter for RtpSendFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::RtpSend
    }

    fn process(&mut self, io: &mut FilterIo) -> MediaResult<()> {
        let blocks = io.take_input(0);
        let Some(session) = &self.session else {
            // Nothing to send through yet
            return Ok(());
        };
        for block in blocks {
            if !session.send(block.payload(), block.timestamp, block.marker) {
                trace!(len = block.len(), "RTP block not sent");
            }
        }
        Ok(())
    }

    fn call_method(&mut self, method: FilterMethod) -> MediaResult<()> {
        match method {
            FilterMethod::SetSession(session) => {
                self.session = Some(session);
                Ok(())
            }
            other => Err(filter_error(
                self.kind(),
                format!("unsupported method {}", other.name()),
            )),
        }
    }
}
