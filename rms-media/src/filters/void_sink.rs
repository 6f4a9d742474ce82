//! Sink that drops everything it receives
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


use crate::error::MediaResult;
use crate::filter::{Filter, FilterIo, FilterKind};

#[derive(Debug, Default)]
pub struct VoidSinkFilter {
    dropped: u64,
}

impl VoidSinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks discarded so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Filter for VoidSinkFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::VoidSink
    }

    fn process(&mut self, io: &mut FilterIo) -> MediaResult<()> {
        self.dropped += io.take_input(0).len() as u64;
        Ok(())
    }
}
