//! RTP receiver: session packets in, payload blocks out
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
use crate::block::MediaBlock;
use crate::error::MediaResult;
use crate::filter::{Filter, FilterIo, FilterKind, FilterMethod};
use crate::memory::MemoryHooks;
use crate::session::RtpSession;
use std::sync::Arc;

pub struct RtpRecvFilter {
    session: Option<Arc<RtpSession>>,
    memory: Arc<dyn MemoryHooks>,
    max_packets: usize,
}

impl RtpRecvFilter {
    pub fn new(memory: Arc<dyn MemoryHooks>, max_packets: usize) -> Self {
        RtpRecvFilter {
            session: None,
            memory,
            max_packets,
        }
    }
}

impl Filter for RtpRecvFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::RtpRecv
    }

    fn process(&mut self, io: &mut FilterIo) -> MediaResult<()> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        let memory = &self.memory;
        session.recv_packets(self.max_packets, |header, payload| {
            let mut block = MediaBlock::from_slice(memory, payload, header.timestamp);
            block.marker = header.marker;
            io.push_output(0, block);
        })?;
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
