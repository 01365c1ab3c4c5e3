//! Registers TCPCLv4 with [`crate::registry::ClaRegistry`]. Connects a TCP
//! socket, negotiates the session in [`super::handshake`], upgrades to TLS
//! when both sides advertised `CAN_TLS`, and hands the result off to
//! [`super::Engine`] on its own task.

use super::stream::MaybeTlsStream;
use super::{handshake, Config, Engine};
use crate::controller::ConnectionController;
use crate::error::{ClaError, Result};
use crate::events::EventSender;
use crate::registry::{Cla, Contact};
use dtn6_bpv6::{BlockFramework, PayloadStore};
use dtn6_route::LinkId;
use std::sync::Arc;
use tokio::net::TcpStream;

pub struct TcpclV4Cla {
    config: Config,
    events: EventSender,
    payload_store: Arc<PayloadStore>,
    framework: Arc<BlockFramework>,
    #[cfg(feature = "tls")]
    tls: Option<Arc<super::tls::TlsConfig>>,
}

impl TcpclV4Cla {
    pub fn new(
        config: Config,
        events: EventSender,
        payload_store: Arc<PayloadStore>,
        framework: Arc<BlockFramework>,
    ) -> Self {
        TcpclV4Cla {
            config,
            events,
            payload_store,
            framework,
            #[cfg(feature = "tls")]
            tls: None,
        }
    }

    #[cfg(feature = "tls")]
    pub fn with_tls(mut self, tls: Arc<super::tls::TlsConfig>) -> Self {
        self.tls = Some(tls);
        self
    }

    #[cfg(feature = "tls")]
    async fn upgrade_if_needed(
        &self,
        stream: TcpStream,
        nexthop: &str,
        use_tls: bool,
    ) -> Result<MaybeTlsStream<TcpStream>> {
        let Some(tls) = (if use_tls { self.tls.as_ref() } else { None }) else {
            return Ok(MaybeTlsStream::Plain(stream));
        };
        let host = nexthop.rsplit_once(':').map_or(nexthop, |(h, _)| h);
        let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| ClaError::TlsSetup(format!("invalid TLS server name {host:?}: {e}")))?;
        let connector = tokio_rustls::TlsConnector::from(tls.client_config.clone());
        let tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(ClaError::Io)?;
        Ok(MaybeTlsStream::Client(Box::new(tls_stream)))
    }

    #[cfg(not(feature = "tls"))]
    async fn upgrade_if_needed(
        &self,
        stream: TcpStream,
        _nexthop: &str,
        _use_tls: bool,
    ) -> Result<MaybeTlsStream<TcpStream>> {
        Ok(MaybeTlsStream::Plain(stream))
    }
}

#[async_trait::async_trait]
impl Cla for TcpclV4Cla {
    fn name(&self) -> &'static str {
        "tcpclv4"
    }

    async fn open_contact(&self, link: LinkId, nexthop: &str) -> Result<Contact> {
        let stream = TcpStream::connect(nexthop).await.map_err(ClaError::Io)?;
        stream.set_nodelay(true).map_err(ClaError::Io)?;

        let (stream, session, peer_node_id) = handshake(stream, &self.config).await?;
        tracing::info!(%link, peer_node_id, "tcpclv4 session established");

        let stream = self.upgrade_if_needed(stream, nexthop, session.use_tls).await?;

        let controller =
            ConnectionController::new(link.clone(), true, false, self.payload_store.clone());
        let (commands_tx, commands_rx) = tokio::sync::mpsc::channel(16);
        let (outbound_tx, outbound_rx) = tokio::sync::mpsc::channel(16);

        let engine = Engine::new(
            stream,
            controller,
            commands_rx,
            outbound_rx,
            self.events.clone(),
            session,
            self.config.segment_mtu,
            self.framework.clone(),
        );

        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = engine.run().await;
            tracing::debug!(
                link = %link,
                requeued = outcome.requeue.len(),
                "tcpclv4 contact closed"
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
