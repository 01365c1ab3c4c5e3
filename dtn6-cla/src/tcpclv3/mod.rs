//! TCPCLv3 convergence-layer engine: contact-header negotiation followed by
//! a strictly sequential segment/ack exchange over a single `TcpStream`, per
//! §4.8. Unlike TCPCLv4, a v3 connection carries at most one bundle transfer
//! in each direction at a time — there is no transfer id to multiplex on —
//! so the outbound side of the engine processes one [`OutboundRequest`]
//! fully (including its acks) before starting the next.

pub mod codec;
pub mod contact;

pub mod cla;

use crate::controller::{
    BreakOutcome, Command, CommandReceiver, ConnectionController, IncomingBundle, InFlightBundle,
};
use crate::error::{BreakReason, ClaError, Result};
use crate::events::{ClEvent, EventSender};
use crate::outbound::{OutboundReceiver, OutboundRequest};
use codec::{Message, ShutdownReason, Tcpclv3Codec};
use contact::{ContactHeader, NegotiatedSession};
use dtn6_bpv6::BlockFramework;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::codec::Framed;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    pub segment_mtu: usize,
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_support::duration_secs"))]
    pub keepalive_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            segment_mtu: 0x10000,
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

/// Performs the contact-header exchange over a freshly connected (or
/// accepted) stream, returning the negotiated session parameters alongside
/// the peer's advertised EID.
pub async fn handshake(
    stream: &mut (impl tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin),
    ours: &ContactHeader,
) -> Result<(NegotiatedSession, dtn6_eid::Eid)> {
    ours.write(stream).await?;
    let theirs = ContactHeader::read(stream).await?;
    if theirs.version != ours.version {
        return Err(ClaError::UnsupportedVersion(theirs.version));
    }
    Ok((ContactHeader::negotiate(ours, &theirs), theirs.local_eid))
}

/// Drives one TCPCLv3 connection end-to-end: contact negotiation has
/// already happened (see [`handshake`]); this owns the post-handshake
/// segment/ack state machine until the contact breaks.
pub struct Engine<T> {
    transport: Framed<T, Tcpclv3Codec>,
    controller: ConnectionController,
    commands: CommandReceiver,
    outbound: OutboundReceiver,
    events: EventSender,
    session: NegotiatedSession,
    config: Config,
    framework: Arc<BlockFramework>,
    last_sent: Instant,
    current_outbound: Option<CurrentOutbound>,
}

struct CurrentOutbound {
    request: OutboundRequest,
    offset: usize,
}

impl<T> Engine<T>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    pub fn new(
        stream: T,
        controller: ConnectionController,
        commands: CommandReceiver,
        outbound: OutboundReceiver,
        events: EventSender,
        session: NegotiatedSession,
        config: Config,
        framework: Arc<BlockFramework>,
    ) -> Self {
        Engine {
            transport: Framed::new(stream, Tcpclv3Codec::default()),
            controller,
            commands,
            outbound,
            events,
            session,
            config,
            framework,
            last_sent: Instant::now(),
            current_outbound: None,
        }
    }

    fn post(&self, event: ClEvent) {
        // The receiving end may have gone away if the daemon-facing glue
        // shut down first; there is nothing further to do in that case.
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
        let end_offset = (cur.offset + self.config.segment_mtu).min(total);
        let end = end_offset == total;
        let chunk = cur.request.data.slice(cur.offset..end_offset);
        cur.offset = end_offset;

        self.send_msg(Message::DataSegment { start, end, data: chunk })
            .await?;

        if let Some(b) = self.controller.inflight.back_mut() {
            b.sent.advance_to(end_offset as u64).ok();
        }
        Ok(())
    }

    async fn on_ack(&mut self, acked_length: u64) -> Result<()> {
        let Some(b) = self.controller.inflight.back_mut() else {
            return Err(ClaError::Protocol("ACK_SEGMENT with no bundle in flight"));
        };
        b.acked
            .advance_to(acked_length)
            .map_err(|_| ClaError::Protocol("ACK_SEGMENT regressed acked length"))?;

        if b.fully_acked() {
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
        } else {
            self.send_next_segment().await?;
        }
        Ok(())
    }

    async fn on_data_segment(&mut self, start: bool, end: bool, data: bytes::Bytes) -> Result<()> {
        if start || self.controller.incoming.is_empty() {
            self.controller.incoming.push_back(IncomingBundle::new());
        }
        let len = data.len() as u64;
        // §5: reserve payload-storage quota before accepting the segment's
        // bytes. TCPCLv3 has no advance knowledge of the bundle's total
        // length (only `BUNDLE_END` reveals it), so reservation is
        // necessarily incremental, one segment at a time.
        if !self.controller.reserve_incoming(len).await {
            return Err(ClaError::ResourceExhaustion);
        }
        let incoming = self.controller.incoming.back_mut().expect("just pushed");
        incoming.payload_bytes_reserved += len;
        let new_total = incoming.rcvd.num_contiguous() + len;
        incoming
            .rcvd
            .advance_to(new_total)
            .map_err(|_| ClaError::Protocol("incoming segment overflowed progress"))?;
        incoming.data.extend_from_slice(&data);

        self.send_msg(Message::AckSegment {
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

    fn negotiated_keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.session.keepalive_interval as u64)
    }

    fn idle_timeout(&self) -> Duration {
        self.negotiated_keepalive_interval().saturating_mul(2)
    }

    /// Runs until the contact breaks, returning the outcome so the caller
    /// can requeue abandoned bundles and finish posting daemon-facing
    /// events (mirrors [`ConnectionController::break_contact`]).
    pub async fn run(mut self) -> BreakOutcome {
        if let Some(ev) = self.controller.on_contact_up() {
            self.post(ev);
        }

        let reason = loop {
            let keepalive_due = self
                .negotiated_keepalive_interval()
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
                        self.controller
                            .inflight
                            .push_back(InFlightBundle::new(req.id.clone(), req.data.len() as u64));
                        self.current_outbound = Some(CurrentOutbound { request: req, offset: 0 });
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
                                Message::DataSegment { start, end, data } => {
                                    self.on_data_segment(start, end, data).await
                                }
                                Message::AckSegment { acked_length } => self.on_ack(acked_length).await,
                                Message::RefuseBundle => {
                                    if let Some(cur) = self.current_outbound.take() {
                                        self.controller.inflight.pop_back();
                                        let _ = cur.request.result.send(Err(cur.request.data));
                                    }
                                    Ok(())
                                }
                                Message::Shutdown { reason, .. } => {
                                    tracing::info!(?reason, "peer requested shutdown");
                                    break reason
                                        .map(break_reason_for_shutdown)
                                        .unwrap_or(BreakReason::Broken);
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

fn break_reason_for_shutdown(r: ShutdownReason) -> BreakReason {
    match r {
        ShutdownReason::IdleTimeout => BreakReason::IdleTimeout,
        ShutdownReason::VersionMismatch | ShutdownReason::Busy | ShutdownReason::Unknown(_) => {
            BreakReason::Broken
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_segment_mtu() {
        let c = Config::default();
        assert!(c.segment_mtu > 0);
        assert!(c.keepalive_interval.as_secs() > 0);
    }

    #[test]
    fn shutdown_idle_timeout_maps_to_idle_timeout_reason() {
        assert_eq!(
            break_reason_for_shutdown(ShutdownReason::IdleTimeout),
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
