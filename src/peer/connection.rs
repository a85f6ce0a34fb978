//! `webrtc` backed [`PeerConnector`].

use crate::capture::LocalTrack;
use crate::config::{HostConfig, ServerConfig};
use crate::error::{HostError, Result};
use crate::logger::{dump_candidate, dump_selected_pair};
use crate::peer::data_channel::{attach_control_channel, CONTROL_CHANNEL_LABEL};
use crate::peer::link::{PeerConnector, PeerLink};
use crate::peer::types::{Connectivity, IceCandidate, PeerEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::{data_channel_init::RTCDataChannelInit, RTCDataChannel};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

/// Peer connection configuration: the fixed STUN list plus an optional
/// TURN entry.
pub fn rtc_config(stun_urls: &[String], turn: Option<&ServerConfig>) -> RTCConfiguration {
    let mut ice_servers = vec![RTCIceServer {
        urls: stun_urls.to_vec(),
        ..Default::default()
    }];

    if let Some(turn) = turn {
        ice_servers.push(RTCIceServer {
            urls: vec![turn.normalized_url()],
            username: turn.username.clone().unwrap_or_default(),
            credential: turn.credential.clone().unwrap_or_default(),
            ..Default::default()
        });
    }

    RTCConfiguration {
        ice_servers,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

impl From<RTCPeerConnectionState> for Connectivity {
    fn from(st: RTCPeerConnectionState) -> Self {
        match st {
            RTCPeerConnectionState::Connecting => Self::Connecting,
            RTCPeerConnectionState::Connected => Self::Connected,
            RTCPeerConnectionState::Disconnected => Self::Disconnected,
            RTCPeerConnectionState::Failed => Self::Failed,
            RTCPeerConnectionState::Closed => Self::Closed,
            _ => Self::New,
        }
    }
}

pub struct RtcPeerConnector {
    api: API,
    config: RTCConfiguration,
}

impl RtcPeerConnector {
    pub fn new(host: &HostConfig) -> Result<Self> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();
        Ok(Self {
            api,
            config: rtc_config(&host.stun_urls, host.turn.as_ref()),
        })
    }
}

#[async_trait]
impl PeerConnector for RtcPeerConnector {
    async fn connect(
        &self,
        viewer_id: &str,
        tracks: Vec<LocalTrack>,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerLink>> {
        let pc = Arc::new(self.api.new_peer_connection(self.config.clone()).await?);

        pc.on_ice_candidate(Box::new({
            let events = events.clone();
            let viewer_id = viewer_id.to_string();
            move |cand: Option<RTCIceCandidate>| {
                // None marks the end of gathering
                if let Some(c) = cand {
                    dump_candidate("LOCAL", &viewer_id, &c);
                    if let Ok(init) = c.to_json() {
                        let _ = events.send(PeerEvent::LocalCandidate(init.into()));
                    }
                }
                Box::pin(async {})
            }
        }));

        let pc_stats = Arc::downgrade(&pc);
        pc.on_peer_connection_state_change(Box::new({
            let events = events.clone();
            let viewer_id = viewer_id.to_string();
            move |st: RTCPeerConnectionState| {
                info!(viewer_id = %viewer_id, state = %st, "Peer connection state changed");
                if st == RTCPeerConnectionState::Failed {
                    if let Some(pc) = pc_stats.upgrade() {
                        let viewer_id = viewer_id.clone();
                        tokio::spawn(async move {
                            dump_selected_pair(&pc, &viewer_id, "BEFORE-FAIL").await;
                        });
                    }
                }
                let _ = events.send(PeerEvent::Connectivity(st.into()));
                Box::pin(async {})
            }
        }));

        for track in tracks {
            let sender = pc.add_track(track).await?;
            // Drain RTCP so interceptors keep running.
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                while sender.read(&mut buf).await.is_ok() {}
            });
        }

        let dc = pc
            .create_data_channel(CONTROL_CHANNEL_LABEL, Some(RTCDataChannelInit::default()))
            .await?;
        attach_control_channel(viewer_id, &dc, events);

        debug!(viewer_id, "Peer connection created");
        Ok(Arc::new(RtcPeerLink { pc, dc }))
    }
}

pub struct RtcPeerLink {
    pc: Arc<RTCPeerConnection>,
    dc: Arc<RTCDataChannel>,
}

#[async_trait]
impl PeerLink for RtcPeerLink {
    async fn create_offer(&self, ice_restart: bool) -> Result<String> {
        let options = ice_restart.then_some(RTCOfferOptions {
            ice_restart: true,
            voice_activity_detection: false,
        });
        let offer = self.pc.create_offer(options).await?;
        self.pc.set_local_description(offer).await?;
        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| HostError::Peer("local description missing after offer".into()))?;
        Ok(local.sdp)
    }

    async fn apply_answer(&self, sdp: String) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp)?;
        self.pc.set_remote_description(answer).await?;
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc.add_ice_candidate(candidate.into()).await?;
        Ok(())
    }

    async fn close_control_channel(&self) -> Result<()> {
        self.dc.close().await?;
        Ok(())
    }

    async fn stop_tracks(&self) -> Result<()> {
        let mut first_err = None;
        for sender in self.pc.get_senders().await {
            if let Err(e) = sender.stop().await {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}
