//! MTCP: like [`crate::stcp`], but each frame is a single CBOR byte-string
//! (RFC 8949 major type 2) header followed by the raw bytes, per §4.10. Only
//! the byte-string length header is interpreted; no other CBOR item type is
//! valid at the top level of this stream.

use crate::controller::reserve_with_retry;
use crate::error::{BreakReason, ClaError, Result};
use crate::events::{ClEvent, EventSender};
use crate::outbound::OutboundReceiver;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use dtn6_bpv6::{BlockFramework, PayloadStore};
use dtn6_route::LinkId;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::codec::{Decoder, Encoder, Framed};

pub mod cla;

const MAJOR_BYTE_STRING: u8 = 2 << 5;

fn encode_length_header(dst: &mut BytesMut, len: usize) {
    match len {
        0..=23 => dst.put_u8(MAJOR_BYTE_STRING | len as u8),
        24..=0xff => {
            dst.put_u8(MAJOR_BYTE_STRING | 24);
            dst.put_u8(len as u8);
        }
        0x100..=0xffff => {
            dst.put_u8(MAJOR_BYTE_STRING | 25);
            dst.put_u16(len as u16);
        }
        0x1_0000..=0xffff_ffff => {
            dst.put_u8(MAJOR_BYTE_STRING | 26);
            dst.put_u32(len as u32);
        }
        _ => {
            dst.put_u8(MAJOR_BYTE_STRING | 27);
            dst.put_u64(len as u64);
        }
    }
}

/// Parses a byte-string length header from the front of `buf`, returning
/// `(length, header_bytes)`. Returns `Ok(None)` if `buf` does not yet
/// contain the whole header.
fn try_decode_length_header(buf: &[u8]) -> Result<Option<(usize, usize)>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    if first & 0xe0 != MAJOR_BYTE_STRING {
        return Err(ClaError::Protocol("MTCP frame was not a CBOR byte string"));
    }
    let info = first & 0x1f;
    match info {
        0..=23 => Ok(Some((info as usize, 1))),
        24 => {
            if buf.len() < 2 {
                return Ok(None);
            }
            Ok(Some((buf[1] as usize, 2)))
        }
        25 => {
            if buf.len() < 3 {
                return Ok(None);
            }
            Ok(Some((u16::from_be_bytes([buf[1], buf[2]]) as usize, 3)))
        }
        26 => {
            if buf.len() < 5 {
                return Ok(None);
            }
            Ok(Some((
                u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize,
                5,
            )))
        }
        27 => {
            if buf.len() < 9 {
                return Ok(None);
            }
            let len = u64::from_be_bytes(buf[1..9].try_into().unwrap());
            Ok(Some((len as usize, 9)))
        }
        _ => Err(ClaError::Protocol("indefinite-length CBOR byte string unsupported")),
    }
}

#[derive(Default)]
pub struct MtcpCodec;

impl Encoder<Bytes> for MtcpCodec {
    type Error = ClaError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        encode_length_header(dst, item.len());
        dst.extend_from_slice(&item);
        Ok(())
    }
}

impl Decoder for MtcpCodec {
    type Item = Bytes;
    type Error = ClaError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let Some((len, header_len)) = try_decode_length_header(src)? else {
            return Ok(None);
        };
        if src.len() < header_len + len {
            return Ok(None);
        }
        src.advance(header_len);
        Ok(Some(src.split_to(len).freeze()))
    }
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_support::duration_secs_opt"))]
    pub keepalive_interval: Option<Duration>,
}

pub struct BreakOutcome {
    pub reason: BreakReason,
    pub link: LinkId,
}

/// Drives one MTCP connection. Structurally identical to [`crate::stcp::run`]
/// save for the framing codec — see that module for the rationale behind
/// treating every flushed frame as implicitly acked.
pub async fn run<T>(
    stream: T,
    link: LinkId,
    mut commands: crate::controller::CommandReceiver,
    mut outbound: OutboundReceiver,
    events: EventSender,
    config: Config,
    payload_store: Arc<PayloadStore>,
    framework: Arc<BlockFramework>,
) -> BreakOutcome
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut transport = Framed::new(stream, MtcpCodec);
    let _ = events.send(ClEvent::ContactUp { link: link.clone() });

    let reason = loop {
        let keepalive_due = config
            .keepalive_interval
            .unwrap_or(Duration::from_secs(u32::MAX as u64));

        tokio::select! {
            biased;

            cmd = commands.recv() => match cmd {
                Some(crate::controller::Command::BreakContact) | None => break BreakReason::Shutdown,
                Some(crate::controller::Command::CancelBundle(_)) => continue,
                Some(crate::controller::Command::BundlesQueued) => continue,
            },

            req = outbound.recv() => {
                let Some(req) = req else { break BreakReason::Shutdown };
                match transport.send(req.data.clone()).await {
                    Ok(()) => {
                        let _ = events.send(ClEvent::BundleTransmitted {
                            link: link.clone(),
                            bundle: req.id,
                            sent: req.data.len() as u64,
                            acked: req.data.len() as u64,
                        });
                        let _ = req.result.send(Ok(()));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to send MTCP frame");
                        let _ = req.result.send(Err(req.data));
                        break BreakReason::ClError;
                    }
                }
            }

            frame = transport.next() => match frame {
                None => break BreakReason::Broken,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "MTCP framing error");
                    break BreakReason::ClError;
                }
                Some(Ok(data)) => {
                    if !data.is_empty() {
                        let len = data.len() as u64;
                        if !reserve_with_retry(&payload_store, len).await {
                            break BreakReason::ResourceExhaustion;
                        }
                        payload_store.release_payload_space(len);
                        if let Some(bundle) = crate::controller::decode_bundle(&framework, &data) {
                            let _ = events.send(ClEvent::BundleReceived {
                                link: link.clone(),
                                rcvd_len: len,
                                bundle: Some(Box::new(bundle)),
                            });
                        }
                    }
                }
            },

            _ = tokio::time::sleep(keepalive_due), if config.keepalive_interval.is_some() => {
                if let Err(e) = transport.send(Bytes::new()).await {
                    tracing::warn!(error = %e, "failed to send MTCP keepalive");
                    break BreakReason::ClError;
                }
            }
        }
    };

    while let Ok(req) = outbound.try_recv() {
        let _ = req.result.send(Err(req.data));
    }
    let _ = events.send(ClEvent::ContactDown {
        link: link.clone(),
        reason,
    });
    BreakOutcome { reason, link }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(data: &[u8]) {
        let mut codec = MtcpCodec;
        let mut buf = BytesMut::new();
        codec.encode(Bytes::copy_from_slice(data), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&decoded[..], data);
    }

    #[test]
    fn round_trips_small_and_boundary_lengths() {
        round_trip(b"");
        round_trip(&vec![0xabu8; 23]);
        round_trip(&vec![0xcdu8; 24]);
        round_trip(&vec![0xefu8; 300]);
    }

    #[test]
    fn rejects_non_byte_string_major_type() {
        let mut codec = MtcpCodec;
        let mut buf = BytesMut::from(&[0x01u8][..]); // major type 0 (uint)
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn waits_for_full_header_before_deciding_length() {
        let mut codec = MtcpCodec;
        // info=26 (4-byte length) but only 2 bytes available after the head.
        let mut buf = BytesMut::from(&[MAJOR_BYTE_STRING | 26, 0x00, 0x00][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }
}
