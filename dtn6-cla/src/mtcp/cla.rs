//! Registers MTCP with [`crate::registry::ClaRegistry`]. Structurally
//! identical to [`crate::stcp::cla`]; see that module for the rationale.

use crate::error::{ClaError, Result};
use crate::events::EventSender;
use crate::registry::{Cla, Contact};
use dtn6_bpv6::{BlockFramework, PayloadStore};
use dtn6_route::LinkId;
use std::sync::Arc;
use tokio::net::TcpStream;

pub struct MtcpCla {
    config: super::Config,
    events: EventSender,
    payload_store: Arc<PayloadStore>,
    framework: Arc<BlockFramework>,
}

impl MtcpCla {
    pub fn new(
        config: super::Config,
        events: EventSender,
        payload_store: Arc<PayloadStore>,
        framework: Arc<BlockFramework>,
    ) -> Self {
        MtcpCla {
            config,
            events,
            payload_store,
            framework,
        }
    }
}

#[async_trait::async_trait]
impl Cla for MtcpCla {
    fn name(&self) -> &'static str {
        "mtcp"
    }

    async fn open_contact(&self, link: LinkId, nexthop: &str) -> Result<Contact> {
        let stream = TcpStream::connect(nexthop).await.map_err(ClaError::Io)?;
        stream.set_nodelay(true).map_err(ClaError::Io)?;

        let (commands_tx, commands_rx) = tokio::sync::mpsc::channel(16);
        let (outbound_tx, outbound_rx) = tokio::sync::mpsc::channel(16);
        let events = self.events.clone();
        let config = super::Config {
            keepalive_interval: self.config.keepalive_interval,
        };

        let payload_store = self.payload_store.clone();
        let framework = self.framework.clone();
        tokio::spawn(async move {
            let outcome = super::run(
                stream,
                link,
                commands_rx,
                outbound_rx,
                events,
                config,
                payload_store,
                framework,
            )
            .await;
            tracing::debug!(link = %outcome.link, reason = %outcome.reason, "mtcp contact closed");
        });

        Ok(Contact {
            commands: commands_tx,
            outbound: outbound_tx,
        })
    }
}
