//! Registers TCPCLv3 with [`crate::registry::ClaRegistry`]: connects a TCP
//! socket to the configured next hop, runs the contact-header handshake,
//! and hands the session off to [`super::Engine`] on its own task.

use super::contact::ContactHeader;
use super::{handshake, Config, Engine};
use crate::controller::ConnectionController;
use crate::error::{ClaError, Result};
use crate::events::EventSender;
use crate::registry::{Cla, Contact};
use dtn6_bpv6::{BlockFramework, PayloadStore};
use dtn6_eid::Eid;
use dtn6_route::LinkId;
use std::sync::Arc;
use tokio::net::TcpStream;

pub struct TcpclV3Cla {
    local_eid: Eid,
    config: Config,
    events: EventSender,
    payload_store: Arc<PayloadStore>,
    framework: Arc<BlockFramework>,
}

impl TcpclV3Cla {
    pub fn new(
        local_eid: Eid,
        config: Config,
        events: EventSender,
        payload_store: Arc<PayloadStore>,
        framework: Arc<BlockFramework>,
    ) -> Self {
        TcpclV3Cla {
            local_eid,
            config,
            events,
            payload_store,
            framework,
        }
    }

    fn our_contact_header(&self) -> ContactHeader {
        ContactHeader {
            version: 3,
            segment_ack_enabled: true,
            reactive_frag_enabled: true,
            negative_ack_enabled: true,
            keepalive_interval: self.config.keepalive_interval.as_secs().min(u16::MAX as u64) as u16,
            local_eid: self.local_eid.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Cla for TcpclV3Cla {
    fn name(&self) -> &'static str {
        "tcpclv3"
    }

    async fn open_contact(&self, link: LinkId, nexthop: &str) -> Result<Contact> {
        let mut stream = TcpStream::connect(nexthop).await.map_err(ClaError::Io)?;
        stream.set_nodelay(true).map_err(ClaError::Io)?;

        let ours = self.our_contact_header();
        let (session, peer_eid) = handshake(&mut stream, &ours).await?;
        tracing::info!(%link, %peer_eid, "tcpclv3 contact established");

        let controller = ConnectionController::new(
            link.clone(),
            true,
            session.reactive_frag_enabled,
            self.payload_store.clone(),
        );
        let (commands_tx, commands_rx) = tokio::sync::mpsc::channel(16);
        let (outbound_tx, outbound_rx) = tokio::sync::mpsc::channel(16);

        let engine = Engine::new(
            stream,
            controller,
            commands_rx,
            outbound_rx,
            self.events.clone(),
            session,
            Config {
                segment_mtu: self.config.segment_mtu,
                keepalive_interval: self.config.keepalive_interval,
            },
            self.framework.clone(),
        );

        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = engine.run().await;
            tracing::debug!(
                link = %link,
                requeued = outcome.requeue.len(),
                "tcpclv3 contact closed"
            );
            for ev in outcome.events {
                let _ = events.send(ev);
            }
        });

        Ok(Contact {
            commands: commands_tx,
            outbound: outbound_tx,
        })
    }
}
