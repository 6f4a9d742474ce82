//! Per-leg media resources
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


use crate::codec::{Codec, PayloadType};
use crate::engine::MediaEngine;
use crate::error::{MediaError, MediaResult};
use crate::factory::EngineFactory;
use crate::filter::{FilterHandle, FilterKind, FilterMethod};
use crate::playback::stop_media;
use crate::session::RtpSession;
use crate::ticker::Ticker;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Call identifier owned by the signalling layer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallId(Arc<str>);

impl CallId {
    pub fn new(id: impl AsRef<str>) -> Self {
        CallId(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(id: &str) -> Self {
        CallId::new(id)
    }
}

impl From<String> for CallId {
    fn from(id: String) -> Self {
        CallId(Arc::from(id))
    }
}

/// What a leg's media is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegActivity {
    Idle,
    /// Bridged, and the bridge ticker lives on this leg
    BridgeOwner,
    /// Bridged through the other leg's ticker
    BridgePeer,
    /// Playing a file
    Playback,
}

/// Filter handles held by a leg; absent ones are `None`
#[derive(Debug, Default)]
pub(crate) struct LegFilters {
    pub rtp_recv: Option<FilterHandle>,
    pub rtp_send: Option<FilterHandle>,
    pub encoder: Option<FilterHandle>,
    pub decoder: Option<FilterHandle>,
    pub player: Option<FilterHandle>,
    pub void_sink: Option<FilterHandle>,
}

impl LegFilters {
    /// Present handles, sources and senders first
    pub fn present(&self) -> impl Iterator<Item = &FilterHandle> {
        [
            &self.player,
            &self.encoder,
            &self.rtp_send,
            &self.rtp_recv,
            &self.void_sink,
            &self.decoder,
        ]
        .into_iter()
        .flatten()
    }

    /// Destroy and clear every present handle; returns how many were destroyed
    pub fn destroy_all(&mut self) -> MediaResult<usize> {
        let mut destroyed = 0;
        for slot in [
            &mut self.player,
            &mut self.encoder,
            &mut self.rtp_send,
            &mut self.rtp_recv,
            &mut self.void_sink,
            &mut self.decoder,
        ] {
            if let Some(handle) = slot.as_ref() {
                if !handle.is_destroyed() {
                    handle.destroy()?;
                    destroyed += 1;
                }
            }
            *slot = None;
        }
        Ok(destroyed)
    }

    fn is_empty(&self) -> bool {
        self.present().next().is_none()
    }
}

/// Media state of one call leg
///
/// Addresses and payload type come from SDP negotiation; everything else is
/// filled in by [`create_call_leg_media`] and the bridge/playback operations.
pub struct CallLegMedia {
    pub local_ip: IpAddr,
    pub local_port: u16,
    pub remote_ip: IpAddr,
    pub remote_port: u16,
    pub payload: PayloadType,
    call_id: Option<CallId>,
    factory: Option<EngineFactory>,
    session: Option<Arc<RtpSession>>,
    pub(crate) filters: LegFilters,
    pub(crate) ticker: Option<Ticker>,
    pub(crate) activity: LegActivity,
}

impl CallLegMedia {
    pub fn new(local: SocketAddr, remote: SocketAddr, payload: PayloadType) -> Self {
        CallLegMedia {
            local_ip: local.ip(),
            local_port: local.port(),
            remote_ip: remote.ip(),
            remote_port: remote.port(),
            payload,
            call_id: None,
            factory: None,
            session: None,
            filters: LegFilters::default(),
            ticker: None,
            activity: LegActivity::Idle,
        }
    }

    pub fn call_id(&self) -> Option<&CallId> {
        self.call_id.as_ref()
    }

    /// Call id for log fields
    pub(crate) fn label(&self) -> String {
        self.call_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unprovisioned".to_string())
    }

    pub fn factory(&self) -> Option<&EngineFactory> {
        self.factory.as_ref()
    }

    pub fn session(&self) -> Option<&Arc<RtpSession>> {
        self.session.as_ref()
    }

    /// Bound local RTP address, once provisioned
    pub fn local_rtp_addr(&self) -> Option<SocketAddr> {
        self.session.as_ref().map(|s| s.local_addr())
    }

    pub fn is_provisioned(&self) -> bool {
        self.factory.is_some()
    }

    pub fn activity(&self) -> LegActivity {
        self.activity
    }

    /// Whether this leg owns a running ticker
    pub fn is_active(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn ticker(&self) -> Option<&Ticker> {
        self.ticker.as_ref()
    }

    pub fn rtp_recv(&self) -> Option<&FilterHandle> {
        self.filters.rtp_recv.as_ref()
    }

    pub fn rtp_send(&self) -> Option<&FilterHandle> {
        self.filters.rtp_send.as_ref()
    }

    pub fn encoder(&self) -> Option<&FilterHandle> {
        self.filters.encoder.as_ref()
    }

    pub fn decoder(&self) -> Option<&FilterHandle> {
        self.filters.decoder.as_ref()
    }

    pub fn player(&self) -> Option<&FilterHandle> {
        self.filters.player.as_ref()
    }

    pub fn void_sink(&self) -> Option<&FilterHandle> {
        self.filters.void_sink.as_ref()
    }

    /// Every filter handle the leg currently holds
    pub fn filter_handles(&self) -> Vec<&FilterHandle> {
        self.filters.present().collect()
    }

    pub(crate) fn require_provisioned(&self) -> MediaResult<&EngineFactory> {
        self.factory
            .as_ref()
            .ok_or_else(|| MediaError::LegNotProvisioned(self.label()))
    }

    pub(crate) fn require_idle(&self) -> MediaResult<()> {
        if self.activity != LegActivity::Idle || self.ticker.is_some() {
            return Err(MediaError::InvalidLegState(format!(
                "{} is busy ({:?})",
                self.label(),
                self.activity
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for CallLegMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallLegMedia")
            .field("call_id", &self.call_id)
            .field("local", &SocketAddr::new(self.local_ip, self.local_port))
            .field("remote", &SocketAddr::new(self.remote_ip, self.remote_port))
            .field("payload", &self.payload)
            .field("activity", &self.activity)
            .finish()
    }
}

fn rtcp_port(port: u16, side: &str) -> MediaResult<u16> {
    if port == 0 {
        return Ok(0);
    }
    port.checked_add(1).ok_or_else(|| {
        MediaError::Network(format!("{} RTP port {} leaves no room for RTCP", side, port))
    })
}

/// Filters created during provisioning, destroyed again if provisioning
/// does not complete
struct Provisioned {
    filters: Vec<FilterHandle>,
}

impl Provisioned {
    fn keep(&mut self, handle: FilterHandle) -> FilterHandle {
        self.filters.push(handle.clone());
        handle
    }

    fn abandon(self) {
        for handle in self.filters {
            if let Err(e) = handle.destroy() {
                warn!(filter = %handle.label(), error = %e, "Failed to destroy abandoned filter");
            }
        }
    }
}

/// Allocate the leg's factory, RTP session and filters
///
/// All or nothing: on failure the leg keeps no factory, session or filter.
pub fn create_call_leg_media(
    engine: &MediaEngine,
    leg: &mut CallLegMedia,
    call_id: CallId,
) -> MediaResult<()> {
    if leg.is_provisioned() {
        return Err(MediaError::LegAlreadyProvisioned(leg.label()));
    }
    // Refuse unsupported payloads before binding any socket
    let codec = Codec::for_payload(&leg.payload)?;

    let factory = engine.create_factory()?;
    factory.enable_statistics(factory.config().statistics_enabled);
    factory.reset_statistics();

    let session = RtpSession::create_duplex(
        leg.local_ip,
        leg.local_port,
        rtcp_port(leg.local_port, "local")?,
        factory.mtu(),
    )?;
    let remote_rtp = SocketAddr::new(leg.remote_ip, leg.remote_port);
    let remote_rtcp = SocketAddr::new(leg.remote_ip, rtcp_port(leg.remote_port, "remote")?);
    session.set_remote_addr_full(remote_rtp, remote_rtcp);
    session.set_payload_type(leg.payload.number);
    session.enable_rtcp(factory.config().rtcp_enabled);
    let session = Arc::new(session);

    let mut created = Provisioned {
        filters: Vec::with_capacity(4),
    };
    let filters = (|| -> MediaResult<LegFilters> {
        let rtp_recv = created.keep(factory.create_filter(FilterKind::RtpRecv)?);
        let rtp_send = created.keep(factory.create_filter(FilterKind::RtpSend)?);
        let encoder = created.keep(factory.create_encoder(&leg.payload)?);
        let decoder = created.keep(factory.create_decoder(&leg.payload)?);
        rtp_send.call_method(FilterMethod::SetSession(Arc::clone(&session)))?;
        rtp_recv.call_method(FilterMethod::SetSession(Arc::clone(&session)))?;
        Ok(LegFilters {
            rtp_recv: Some(rtp_recv),
            rtp_send: Some(rtp_send),
            encoder: Some(encoder),
            decoder: Some(decoder),
            player: None,
            void_sink: None,
        })
    })();

    let filters = match filters {
        Ok(filters) => filters,
        Err(e) => {
            created.abandon();
            return Err(e);
        }
    };

    info!(
        call_id = %call_id,
        local = %session.local_addr(),
        remote = %remote_rtp,
        codec = codec.name(),
        payload_type = leg.payload.number,
        factory_id = %factory.id(),
        "Call leg media provisioned"
    );

    leg.call_id = Some(call_id);
    leg.factory = Some(factory);
    leg.session = Some(session);
    leg.filters = filters;
    leg.activity = LegActivity::Idle;
    Ok(())
}

/// Release everything the leg holds
///
/// Stops an active playback first. A leg still in a bridge is refused.
pub fn release_call_leg_media(leg: &mut CallLegMedia) -> MediaResult<()> {
    match leg.activity {
        LegActivity::BridgeOwner | LegActivity::BridgePeer => {
            return Err(MediaError::InvalidLegState(format!(
                "{} is bridged, stop the bridge first",
                leg.label()
            )));
        }
        LegActivity::Playback => {
            stop_media(leg)?;
        }
        LegActivity::Idle => {}
    }

    if !leg.filters.is_empty() {
        let destroyed = leg.filters.destroy_all()?;
        debug!(call_id = %leg.label(), destroyed, "Leg filters destroyed");
    }
    if leg.factory.is_some() {
        info!(call_id = %leg.label(), "Call leg media released");
    }
    leg.session = None;
    leg.factory = None;
    leg.call_id = None;
    Ok(())
}
