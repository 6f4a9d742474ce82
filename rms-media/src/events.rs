//! Asynchronous media events and the hangup bridge to call control
//!
//! Filters run on ticker threads and must not call back into signaling. They
//! post a [`MediaEvent`] on an unbounded channel instead; the
//! [`HangupDispatcher`] task drains it on the tokio runtime and invokes
//! [`CallControl::hangup`].
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


use crate::call_leg::CallId;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Event posted from a ticker thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// A file player reached the end of its file
    PlaybackFinished { call_id: CallId },
}

pub type MediaEventSender = mpsc::UnboundedSender<MediaEvent>;
pub type MediaEventReceiver = mpsc::UnboundedReceiver<MediaEvent>;

/// End-of-file subscription handed to a file player
#[derive(Debug, Clone)]
pub struct EofNotification {
    call_id: CallId,
    sender: MediaEventSender,
}

impl EofNotification {
    pub fn new(call_id: CallId, sender: MediaEventSender) -> Self {
        EofNotification { call_id, sender }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    /// Post the event; never blocks
    pub(crate) fn notify(&self) -> bool {
        let delivered = self
            .sender
            .send(MediaEvent::PlaybackFinished {
                call_id: self.call_id.clone(),
            })
            .is_ok();
        if !delivered {
            warn!(call_id = %self.call_id, "End-of-file event dropped, receiver gone");
        }
        delivered
    }
}

/// Signaling side of the server
#[async_trait]
pub trait CallControl: Send + Sync {
    /// Terminate the call
    async fn hangup(&self, call_id: &CallId);
}

/// Drains media events and turns them into call control actions
pub struct HangupDispatcher;

impl HangupDispatcher {
    /// Run until every sender is gone, returning the number of hangups issued
    pub async fn run(mut events: MediaEventReceiver, control: Arc<dyn CallControl>) -> u64 {
        let mut hangups = 0;
        while let Some(event) = events.recv().await {
            match event {
                MediaEvent::PlaybackFinished { call_id } => {
                    info!(call_id = %call_id, "Playback finished, hanging up");
                    control.hangup(&call_id).await;
                    hangups += 1;
                }
            }
        }
        debug!(hangups, "Media event channel closed");
        hangups
    }

    /// Spawn `run` on the current tokio runtime
    pub fn spawn(events: MediaEventReceiver, control: Arc<dyn CallControl>) -> JoinHandle<u64> {
        tokio::spawn(Self::run(events, control))
    }
}
