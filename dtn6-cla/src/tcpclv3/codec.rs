use crate::error::ClaError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

pub const TYPE_DATA_SEGMENT: u8 = 0x1;
pub const TYPE_ACK_SEGMENT: u8 = 0x2;
pub const TYPE_REFUSE_BUNDLE: u8 = 0x3;
pub const TYPE_KEEPALIVE: u8 = 0x4;
pub const TYPE_SHUTDOWN: u8 = 0x5;

pub const FLAG_BUNDLE_START: u8 = 0x02;
pub const FLAG_BUNDLE_END: u8 = 0x01;
pub const FLAG_SHUTDOWN_HAS_REASON: u8 = 0x02;
pub const FLAG_SHUTDOWN_HAS_DELAY: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    IdleTimeout,
    VersionMismatch,
    Busy,
    Unknown(u8),
}

impl From<u8> for ShutdownReason {
    fn from(v: u8) -> Self {
        match v {
            0 => ShutdownReason::IdleTimeout,
            1 => ShutdownReason::VersionMismatch,
            2 => ShutdownReason::Busy,
            n => ShutdownReason::Unknown(n),
        }
    }
}

impl From<ShutdownReason> for u8 {
    fn from(r: ShutdownReason) -> u8 {
        match r {
            ShutdownReason::IdleTimeout => 0,
            ShutdownReason::VersionMismatch => 1,
            ShutdownReason::Busy => 2,
            ShutdownReason::Unknown(n) => n,
        }
    }
}

/// A single TCPCLv3 message, per §4.8's framing: a type+flags byte
/// followed by type-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    DataSegment {
        start: bool,
        end: bool,
        data: Bytes,
    },
    AckSegment {
        /// Cumulative bytes of the current bundle received so far.
        acked_length: u64,
    },
    RefuseBundle,
    Keepalive,
    Shutdown {
        reason: Option<ShutdownReason>,
        reconnection_delay: Option<u64>,
    },
}

#[derive(Default)]
pub struct Tcpclv3Codec {
    /// When mid-way through a `DATA_SEGMENT`, the flags byte and declared
    /// length of the segment currently being assembled, so `decode` can
    /// resume across multiple `poll_read`s without losing the header.
    partial_segment: Option<(u8, u64)>,
}

impl Encoder<Message> for Tcpclv3Codec {
    type Error = ClaError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::DataSegment { start, end, data } => {
                let mut flags = 0u8;
                if start {
                    flags |= FLAG_BUNDLE_START;
                }
                if end {
                    flags |= FLAG_BUNDLE_END;
                }
                dst.put_u8((TYPE_DATA_SEGMENT << 4) | flags);
                push_sdnv(dst, data.len() as u64);
                dst.extend_from_slice(&data);
            }
            Message::AckSegment { acked_length } => {
                dst.put_u8(TYPE_ACK_SEGMENT << 4);
                push_sdnv(dst, acked_length);
            }
            Message::RefuseBundle => {
                dst.put_u8(TYPE_REFUSE_BUNDLE << 4);
            }
            Message::Keepalive => {
                dst.put_u8(TYPE_KEEPALIVE << 4);
            }
            Message::Shutdown {
                reason,
                reconnection_delay,
            } => {
                let mut flags = 0u8;
                if reason.is_some() {
                    flags |= FLAG_SHUTDOWN_HAS_REASON;
                }
                if reconnection_delay.is_some() {
                    flags |= FLAG_SHUTDOWN_HAS_DELAY;
                }
                dst.put_u8((TYPE_SHUTDOWN << 4) | flags);
                if let Some(r) = reason {
                    dst.put_u8(r.into());
                }
                if let Some(d) = reconnection_delay {
                    push_sdnv(dst, d);
                }
            }
        }
        Ok(())
    }
}

impl Decoder for Tcpclv3Codec {
    type Item = Message;
    type Error = ClaError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, Self::Error> {
        if let Some((flags, declared_len)) = self.partial_segment {
            let declared_len = declared_len as usize;
            if src.len() < declared_len {
                return Ok(None);
            }
            let data = src.split_to(declared_len).freeze();
            self.partial_segment = None;
            return Ok(Some(Message::DataSegment {
                start: flags & FLAG_BUNDLE_START != 0,
                end: flags & FLAG_BUNDLE_END != 0,
                data,
            }));
        }

        if src.is_empty() {
            return Ok(None);
        }
        let header = src[0];
        let msg_type = header >> 4;
        let flags = header & 0x0f;

        match msg_type {
            t if t == TYPE_DATA_SEGMENT => {
                let Some((len, consumed)) = try_decode_sdnv(&src[1..])? else {
                    return Ok(None);
                };
                if src.len() < 1 + consumed + len as usize {
                    // Remember the header so a future call doesn't need to
                    // re-parse the length SDNV once more bytes arrive.
                    src.advance(1 + consumed);
                    self.partial_segment = Some((flags, len));
                    return Ok(None);
                }
                src.advance(1 + consumed);
                let data = src.split_to(len as usize).freeze();
                Ok(Some(Message::DataSegment {
                    start: flags & FLAG_BUNDLE_START != 0,
                    end: flags & FLAG_BUNDLE_END != 0,
                    data,
                }))
            }
            t if t == TYPE_ACK_SEGMENT => {
                let Some((acked_length, consumed)) = try_decode_sdnv(&src[1..])? else {
                    return Ok(None);
                };
                src.advance(1 + consumed);
                Ok(Some(Message::AckSegment { acked_length }))
            }
            t if t == TYPE_REFUSE_BUNDLE => {
                src.advance(1);
                Ok(Some(Message::RefuseBundle))
            }
            t if t == TYPE_KEEPALIVE => {
                src.advance(1);
                Ok(Some(Message::Keepalive))
            }
            t if t == TYPE_SHUTDOWN => {
                let has_reason = flags & FLAG_SHUTDOWN_HAS_REASON != 0;
                let has_delay = flags & FLAG_SHUTDOWN_HAS_DELAY != 0;
                let mut pos = 1usize;
                let reason = if has_reason {
                    if src.len() < pos + 1 {
                        return Ok(None);
                    }
                    let r = ShutdownReason::from(src[pos]);
                    pos += 1;
                    Some(r)
                } else {
                    None
                };
                let reconnection_delay = if has_delay {
                    let Some((d, consumed)) = try_decode_sdnv(&src[pos..])? else {
                        return Ok(None);
                    };
                    pos += consumed;
                    Some(d)
                } else {
                    None
                };
                src.advance(pos);
                Ok(Some(Message::Shutdown {
                    reason,
                    reconnection_delay,
                }))
            }
            other => Err(ClaError::ProtocolOwned(format!(
                "unknown TCPCLv3 message type {other:#x}"
            ))),
        }
    }
}

fn push_sdnv(dst: &mut BytesMut, value: u64) {
    let mut buf = [0u8; 10];
    let n = dtn6_sdnv::encode(value, &mut buf).expect("10 bytes always holds a u64 SDNV");
    dst.extend_from_slice(&buf[..n]);
}

/// Attempts to decode a trailing SDNV without consuming `buf` (the caller
/// advances the underlying `BytesMut` itself once it knows the whole
/// message is available). Returns `Ok(None)` on a short buffer rather than
/// treating it as `Error::Truncated`, since more bytes may simply not have
/// arrived yet.
fn try_decode_sdnv(buf: &[u8]) -> Result<Option<(u64, usize)>, ClaError> {
    match dtn6_sdnv::decode(buf) {
        Ok(v) => Ok(Some(v)),
        Err(dtn6_sdnv::Error::Truncated) | Err(dtn6_sdnv::Error::Empty) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: Message) {
        let mut codec = Tcpclv3Codec::default();
        let mut buf = BytesMut::new();
        codec.encode(msg.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, msg);
        assert!(buf.is_empty());
    }

    #[test]
    fn round_trips_every_message_kind() {
        round_trip(Message::DataSegment {
            start: true,
            end: false,
            data: Bytes::from_static(b"hello world"),
        });
        round_trip(Message::AckSegment { acked_length: 4096 });
        round_trip(Message::RefuseBundle);
        round_trip(Message::Keepalive);
        round_trip(Message::Shutdown {
            reason: Some(ShutdownReason::IdleTimeout),
            reconnection_delay: Some(30),
        });
        round_trip(Message::Shutdown {
            reason: None,
            reconnection_delay: None,
        });
    }

    #[test]
    fn data_segment_split_across_reads() {
        let mut codec = Tcpclv3Codec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(
                Message::DataSegment {
                    start: true,
                    end: true,
                    data: Bytes::from_static(b"0123456789"),
                },
                &mut buf,
            )
            .unwrap();

        // Feed one byte at a time; decode must return None until complete.
        let mut feed = BytesMut::new();
        let mut result = None;
        for &b in buf.iter() {
            feed.extend_from_slice(&[b]);
            result = codec.decode(&mut feed).unwrap();
            if result.is_some() {
                break;
            }
        }
        assert_eq!(
            result,
            Some(Message::DataSegment {
                start: true,
                end: true,
                data: Bytes::from_static(b"0123456789"),
            })
        );
    }

    #[test]
    fn two_messages_in_one_buffer_decode_in_order() {
        let mut codec = Tcpclv3Codec::default();
        let mut buf = BytesMut::new();
        codec.encode(Message::Keepalive, &mut buf).unwrap();
        codec
            .encode(Message::AckSegment { acked_length: 1 }, &mut buf)
            .unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Message::Keepalive));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Message::AckSegment { acked_length: 1 })
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }
}
