//! TCPCLv4 convergence-layer engine, per §4.9: the shared contact-header
//! preamble, a `SESS_INIT` parameter exchange, an optional TLS upgrade, and
//! a transfer-id-tagged segment/ack/refuse state machine built on the same
//! [`crate::controller::ConnectionController`] bookkeeping TCPCLv3 uses.

pub mod cla;
pub mod codec;
pub mod contact;
pub mod stream;
#[cfg(feature = "tls")]
pub mod tls;

use crate::controller::{
    BreakOutcome, Command, CommandReceiver, ConnectionController, IncomingBundle, InFlightBundle,
};
use crate::error::{BreakReason, ClaError, Result};
use crate::events::{ClEvent, EventSender};
use crate::outbound::{OutboundReceiver, OutboundRequest};
use codec::{Message, RefuseReason, RejectReason, SessTermReason, Tcpclv4Codec};
use contact::ContactHeader;
use dtn6_bpv6::BlockFramework;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use stream::MaybeTlsStream;
use tokio::time::Instant;
use tokio_util::codec::Framed;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_support::duration_secs"))]
    pub keepalive_interval: Duration,
    pub segment_mru: u64,
    pub transfer_mru: u64,
    pub segment_mtu: usize,
    pub node_id: String,
    pub can_tls: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            keepalive_interval: Duration::from_secs(60),
            segment_mru: 16384,
            transfer_mru: 0x2_0000_0000_0000,
            segment_mtu: 0x10000,
            node_id: String::new(),
            can_tls: cfg!(feature = "tls"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NegotiatedSessionV4 {
    pub keepalive_interval: Duration,
    pub session_mtu: u64,
    pub use_tls: bool,
}

/// Performs the contact-header + `SESS_INIT` exchange, returning the
/// underlying stream back to the caller (so it can be wrapped in TLS if
/// both sides advertised `CAN_TLS` — see [`stream::MaybeTlsStream`]),
/// alongside the negotiated parameters and the peer's declared node id.
pub async fn handshake<T>(mut stream: T, config: &Config) -> Result<(T, NegotiatedSessionV4, String)>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let ours = ContactHeader {
        version: 4,
        can_tls: config.can_tls,
    };
    ours.write(&mut stream).await?;
    let theirs = ContactHeader::read(&mut stream).await?;
    if theirs.version != 4 {
        return Err(ClaError::UnsupportedVersion(theirs.version));
    }

    let mut framed = Framed::new(stream, Tcpclv4Codec);
    framed
        .send(Message::SessInit {
            keepalive_interval: config.keepalive_interval.as_secs() as u16,
            segment_mru: config.segment_mru,
            transfer_mru: config.transfer_mru,
            node_id: config.node_id.clone(),
        })
        .await?;

    let Some(msg) = framed.next().await else {
        return Err(ClaError::Protocol("peer closed before SESS_INIT"));
    };
    let Message::SessInit {
        keepalive_interval: their_keepalive,
        segment_mru: their_segment_mru,
        transfer_mru: their_transfer_mru,
        node_id,
    } = msg?
    else {
        return Err(ClaError::Protocol("expected SESS_INIT as first message"));
    };

    let keepalive = Duration::from_secs(config.keepalive_interval.as_secs().min(their_keepalive.max(1) as u64));
    let session_mtu = config.segment_mtu as u64;
    let _ = their_segment_mru;
    let session = NegotiatedSessionV4 {
        keepalive_interval: keepalive,
        session_mtu: session_mtu.min(their_transfer_mru.max(1)),
        use_tls: config.can_tls && theirs.can_tls,
    };
    Ok((framed.into_inner(), session, node_id))
}

struct CurrentOutbound {
    request: OutboundRequest,
    offset: usize,
    transfer_id: u64,
}

pub struct Engine<T> {
    transport: Framed<MaybeTlsStream<T>, Tcpclv4Codec>,
    controller: ConnectionController,
    commands: CommandReceiver,
    outbound: OutboundReceiver,
    events: EventSender,
    session: NegotiatedSessionV4,
    segment_mtu: usize,
    framework: Arc<BlockFramework>,
    next_transfer_id: u64,
    last_sent: Instant,
    current_outbound: Option<CurrentOutbound>,
}

impl<T> Engine<T>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    pub fn new(
        stream: MaybeTlsStream<T>,
        controller: ConnectionController,
        commands: CommandReceiver,
        outbound: OutboundReceiver,
        events: EventSender,
        session: NegotiatedSessionV4,
        segment_mtu: usize,
        framework: Arc<BlockFramework>,
    ) -> Self {
        Engine {
            transport: Framed::new(stream, Tcpclv4Codec),
            controller,
            commands,
            outbound,
            events,
            session,
            segment_mtu,
            framework,
            next_transfer_id: 0,
            last_sent: Instant::now(),
            current_outbound: None,
        }
    }

    fn post(&self, event: ClEvent) {
        let _ = self.events.send(event);
    }

    async fn send_msg(&mut self, msg: Message) -> Result<()> {
        self.transport.send(msg).await?;
        self.last_sent = Instant::now();
        Ok(())
    }

    async fn send_next_segment(&mut self) -> Result<()> {
        let Some(cur) = &mut self.current_outbound else {
            return Ok(());
        };
        let total = cur.request.data.len();
        let start = cur.offset == 0;
        let end_offset = (cur.offset + self.segment_mtu).min(total);
        let end = end_offset == total;
        let chunk = cur.request.data.slice(cur.offset..end_offset);
        let extensions = if start {
            vec![Message::transfer_length_extension(total as u64)]
        } else {
            vec![]
        };
        let transfer_id = cur.transfer_id;
        cur.offset = end_offset;

        self.send_msg(Message::XferSegment {
            transfer_id,
            start,
            end,
            extensions,
            data: chunk,
        })
        .await?;

        if let Some(b) = self.controller.inflight.back_mut() {
            b.sent.advance_to(end_offset as u64).ok();
        }
        Ok(())
    }

    async fn on_xfer_ack(&mut self, transfer_id: u64, acked_length: u64, end: bool) -> Result<()> {
        let Some(cur) = &self.current_outbound else {
            return Err(ClaError::Protocol("XFER_ACK with no transfer in flight"));
        };
        if cur.transfer_id != transfer_id {
            return Err(ClaError::Protocol("XFER_ACK for unknown transfer id"));
        }
        let Some(b) = self.controller.inflight.back_mut() else {
            return Err(ClaError::Protocol("XFER_ACK with no bundle bookkeeping"));
        };
        b.acked
            .advance_to(acked_length)
            .map_err(|_| ClaError::Protocol("XFER_ACK regressed acked length"))?;

        if end && b.fully_acked() {
            let b = self.controller.inflight.pop_back().unwrap();
            self.post(ClEvent::BundleTransmitted {
                link: self.controller.link.clone(),
                bundle: b.bundle,
                sent: b.sent.num_contiguous(),
                acked: b.acked.num_contiguous(),
            });
            if let Some(cur) = self.current_outbound.take() {
                let _ = cur.request.result.send(Ok(()));
            }
        } else if !end {
            self.send_next_segment().await?;
        }
        Ok(())
    }

    async fn on_xfer_refuse(&mut self, transfer_id: u64, reason: RefuseReason) -> Result<()> {
        if let Some(cur) = &self.current_outbound {
            if cur.transfer_id == transfer_id {
                tracing::info!(?reason, transfer_id, "peer refused transfer");
                self.controller.inflight.pop_back();
                if let Some(cur) = self.current_outbound.take() {
                    let _ = cur.request.result.send(Err(cur.request.data));
                }
            }
        }
        Ok(())
    }

    async fn on_xfer_segment(
        &mut self,
        transfer_id: u64,
        start: bool,
        end: bool,
        extensions: Vec<codec::ExtensionItem>,
        data: bytes::Bytes,
    ) -> Result<()> {
        if start {
            let total_length = Message::transfer_length(&extensions);
            let Some(total_length) = total_length else {
                self.send_msg(Message::MsgReject {
                    reason: RejectReason::Unsupported,
                    rejected_message_header: codec::MSG_XFER_SEGMENT,
                })
                .await?;
                self.send_msg(Message::XferRefuse {
                    transfer_id,
                    reason: RefuseReason::ExtensionFailure,
                })
                .await?;
                return Ok(());
            };
            // Unlike TCPCLv3, the `TRANSFER_LENGTH` extension reveals the
            // whole bundle's size up front, so §5's quota is reserved once
            // for the entire transfer rather than per segment.
            if !self.controller.reserve_incoming(total_length).await {
                return Err(ClaError::ResourceExhaustion);
            }
            let mut incoming = IncomingBundle::new();
            incoming.total_length = total_length;
            incoming.payload_bytes_reserved = total_length;
            self.controller.incoming.push_back(incoming);
        }

        let Some(incoming) = self.controller.incoming.back_mut() else {
            return self
                .send_msg(Message::XferRefuse {
                    transfer_id,
                    reason: RefuseReason::NotAcceptable,
                })
                .await;
        };
        let new_total = incoming.rcvd.num_contiguous() + data.len() as u64;
        incoming
            .rcvd
            .advance_to(new_total)
            .map_err(|_| ClaError::Protocol("incoming segment overflowed progress"))?;
        incoming.data.extend_from_slice(&data);

        self.send_msg(Message::XferAck {
            transfer_id,
            start,
            end,
            acked_length: new_total,
        })
        .await?;

        if end {
            let incoming = self.controller.incoming.pop_back().unwrap();
            self.controller.release(incoming.payload_bytes_reserved);
            if let Some(bundle) = crate::controller::decode_bundle(&self.framework, &incoming.data) {
                self.post(ClEvent::BundleReceived {
                    link: self.controller.link.clone(),
                    rcvd_len: incoming.rcvd.num_contiguous(),
                    bundle: Some(Box::new(bundle)),
                });
            }
        }
        Ok(())
    }

    fn idle_timeout(&self) -> Duration {
        self.session.keepalive_interval.saturating_mul(2)
    }

    pub async fn run(mut self) -> BreakOutcome {
        if let Some(ev) = self.controller.on_contact_up() {
            self.post(ev);
        }

        let reason = loop {
            let keepalive_due = self
                .session
                .keepalive_interval
                .saturating_sub(self.last_sent.elapsed());

            tokio::select! {
                biased;

                cmd = self.commands.recv() => match cmd {
                    Some(Command::BreakContact) | None => break BreakReason::Shutdown,
                    Some(Command::CancelBundle(id)) => {
                        self.controller.try_cancel(&id);
                        continue;
                    }
                    Some(Command::BundlesQueued) => continue,
                },

                req = self.outbound.recv(), if self.current_outbound.is_none() => {
                    if let Some(req) = req {
                        let transfer_id = self.next_transfer_id;
                        self.next_transfer_id += 1;
                        self.controller
                            .inflight
                            .push_back(InFlightBundle::new(req.id.clone(), req.data.len() as u64));
                        self.current_outbound = Some(CurrentOutbound { request: req, offset: 0, transfer_id });
                        if let Err(e) = self.send_next_segment().await {
                            tracing::warn!(error = %e, "failed sending first segment");
                            break BreakReason::ClError;
                        }
                    }
                    continue;
                }

                result = tokio::time::timeout(self.idle_timeout(), self.transport.next()) => {
                    match result {
                        Err(_) => break BreakReason::IdleTimeout,
                        Ok(None) => break BreakReason::Broken,
                        Ok(Some(Err(e))) => {
                            tracing::warn!(error = %e, "codec error from peer");
                            break BreakReason::ClError;
                        }
                        Ok(Some(Ok(msg))) => {
                            let outcome = match msg {
                                Message::Keepalive => Ok(()),
                                Message::XferSegment { transfer_id, start, end, extensions, data } => {
                                    self.on_xfer_segment(transfer_id, start, end, extensions, data).await
                                }
                                Message::XferAck { transfer_id, end, acked_length, .. } => {
                                    self.on_xfer_ack(transfer_id, acked_length, end).await
                                }
                                Message::XferRefuse { transfer_id, reason } => {
                                    self.on_xfer_refuse(transfer_id, reason).await
                                }
                                Message::MsgReject { reason, rejected_message_header } => {
                                    tracing::warn!(?reason, rejected_message_header, "peer rejected a message");
                                    Ok(())
                                }
                                Message::SessTerm { reason, is_reply } => {
                                    tracing::info!(?reason, is_reply, "peer requested session termination");
                                    break break_reason_for_sess_term(reason);
                                }
                                Message::SessInit { .. } => {
                                    let reject = self
                                        .send_msg(Message::MsgReject {
                                            reason: RejectReason::Unexpected,
                                            rejected_message_header: codec::MSG_SESS_INIT,
                                        })
                                        .await;
                                    reject.and(Err(ClaError::Protocol(
                                        "unexpected SESS_INIT after handshake",
                                    )))
                                }
                            };
                            if let Err(e) = outcome {
                                tracing::warn!(error = %e, "error handling peer message");
                                break break_reason_for_error(&e);
                            }
                        }
                    }
                }

                _ = tokio::time::sleep(keepalive_due) => {
                    if let Err(e) = self.send_msg(Message::Keepalive).await {
                        tracing::warn!(error = %e, "failed sending keepalive");
                        break BreakReason::ClError;
                    }
                }
            }
        };

        if let Some(cur) = self.current_outbound.take() {
            let _ = cur.request.result.send(Err(cur.request.data));
        }
        while let Ok(req) = self.outbound.try_recv() {
            let _ = req.result.send(Err(req.data));
        }

        self.controller.break_contact(reason)
    }
}

fn break_reason_for_error(e: &ClaError) -> BreakReason {
    match e {
        ClaError::ResourceExhaustion => BreakReason::ResourceExhaustion,
        _ => BreakReason::ClError,
    }
}

fn break_reason_for_sess_term(r: SessTermReason) -> BreakReason {
    match r {
        SessTermReason::IdleTimeout => BreakReason::IdleTimeout,
        SessTermReason::ResourceExhaustion => BreakReason::ResourceExhaustion,
        _ => BreakReason::Broken,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sess_term_idle_timeout_maps_to_idle_timeout_reason() {
        assert_eq!(
            break_reason_for_sess_term(SessTermReason::IdleTimeout),
            BreakReason::IdleTimeout
        );
    }

    #[test]
    fn resource_exhaustion_error_maps_to_resource_exhaustion_reason() {
        assert_eq!(
            break_reason_for_error(&ClaError::ResourceExhaustion),
            BreakReason::ResourceExhaustion
        );
        assert_eq!(
            break_reason_for_error(&ClaError::Protocol("x")),
            BreakReason::ClError
        );
    }
}
