use crate::error::ClaError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

pub const MSG_XFER_SEGMENT: u8 = 1;
pub const MSG_XFER_ACK: u8 = 2;
pub const MSG_XFER_REFUSE: u8 = 3;
pub const MSG_KEEPALIVE: u8 = 4;
pub const MSG_SESS_TERM: u8 = 5;
pub const MSG_MSG_REJECT: u8 = 6;
pub const MSG_SESS_INIT: u8 = 7;

pub const XFER_FLAG_END: u8 = 0x01;
pub const XFER_FLAG_START: u8 = 0x02;

pub const EXT_ITEM_TRANSFER_LENGTH: u16 = 0x0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefuseReason {
    Unknown,
    Completed,
    NoResources,
    Retransmit,
    NotAcceptable,
    ExtensionFailure,
    Other(u8),
}

impl From<u8> for RefuseReason {
    fn from(v: u8) -> Self {
        match v {
            0 => RefuseReason::Unknown,
            1 => RefuseReason::Completed,
            2 => RefuseReason::NoResources,
            3 => RefuseReason::Retransmit,
            4 => RefuseReason::NotAcceptable,
            5 => RefuseReason::ExtensionFailure,
            n => RefuseReason::Other(n),
        }
    }
}

impl From<RefuseReason> for u8 {
    fn from(r: RefuseReason) -> u8 {
        match r {
            RefuseReason::Unknown => 0,
            RefuseReason::Completed => 1,
            RefuseReason::NoResources => 2,
            RefuseReason::Retransmit => 3,
            RefuseReason::NotAcceptable => 4,
            RefuseReason::ExtensionFailure => 5,
            RefuseReason::Other(n) => n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Unknown,
    Unsupported,
    Unexpected,
    Other(u8),
}

impl From<u8> for RejectReason {
    fn from(v: u8) -> Self {
        match v {
            0 => RejectReason::Unknown,
            1 => RejectReason::Unsupported,
            2 => RejectReason::Unexpected,
            n => RejectReason::Other(n),
        }
    }
}

impl From<RejectReason> for u8 {
    fn from(r: RejectReason) -> u8 {
        match r {
            RejectReason::Unknown => 0,
            RejectReason::Unsupported => 1,
            RejectReason::Unexpected => 2,
            RejectReason::Other(n) => n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessTermReason {
    Unknown,
    IdleTimeout,
    VersionMismatch,
    Busy,
    ContactFailure,
    ResourceExhaustion,
    Other(u8),
}

impl From<u8> for SessTermReason {
    fn from(v: u8) -> Self {
        match v {
            0 => SessTermReason::Unknown,
            1 => SessTermReason::IdleTimeout,
            2 => SessTermReason::VersionMismatch,
            3 => SessTermReason::Busy,
            4 => SessTermReason::ContactFailure,
            5 => SessTermReason::ResourceExhaustion,
            n => SessTermReason::Other(n),
        }
    }
}

impl From<SessTermReason> for u8 {
    fn from(r: SessTermReason) -> u8 {
        match r {
            SessTermReason::Unknown => 0,
            SessTermReason::IdleTimeout => 1,
            SessTermReason::VersionMismatch => 2,
            SessTermReason::Busy => 3,
            SessTermReason::ContactFailure => 4,
            SessTermReason::ResourceExhaustion => 5,
            SessTermReason::Other(n) => n,
        }
    }
}

/// A single transfer extension item: `{type, critical, value}`. Only
/// `TRANSFER_LENGTH` is interpreted by this codec; anything else round
/// trips as an opaque blob so unrecognised non-critical items survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionItem {
    pub item_type: u16,
    pub critical: bool,
    pub value: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    SessInit {
        keepalive_interval: u16,
        segment_mru: u64,
        transfer_mru: u64,
        node_id: String,
    },
    SessTerm {
        reason: SessTermReason,
        is_reply: bool,
    },
    XferSegment {
        transfer_id: u64,
        start: bool,
        end: bool,
        extensions: Vec<ExtensionItem>,
        data: Bytes,
    },
    XferAck {
        transfer_id: u64,
        start: bool,
        end: bool,
        acked_length: u64,
    },
    XferRefuse {
        transfer_id: u64,
        reason: RefuseReason,
    },
    Keepalive,
    MsgReject {
        reason: RejectReason,
        rejected_message_header: u8,
    },
}

impl Message {
    /// `TRANSFER_LENGTH` extracted from `extensions`, if present.
    pub fn transfer_length(extensions: &[ExtensionItem]) -> Option<u64> {
        extensions.iter().find_map(|e| {
            if e.item_type == EXT_ITEM_TRANSFER_LENGTH {
                dtn6_sdnv::decode(&e.value).ok().map(|(v, _)| v)
            } else {
                None
            }
        })
    }

    pub fn transfer_length_extension(len: u64) -> ExtensionItem {
        let mut buf = [0u8; 10];
        let n = dtn6_sdnv::encode(len, &mut buf).expect("u64 fits in 10 bytes");
        ExtensionItem {
            item_type: EXT_ITEM_TRANSFER_LENGTH,
            critical: true,
            value: Bytes::copy_from_slice(&buf[..n]),
        }
    }
}

#[derive(Default)]
pub struct Tcpclv4Codec;

fn push_sdnv(dst: &mut BytesMut, value: u64) {
    let mut buf = [0u8; 10];
    let n = dtn6_sdnv::encode(value, &mut buf).expect("u64 fits in 10 bytes");
    dst.extend_from_slice(&buf[..n]);
}

fn encode_extensions(dst: &mut BytesMut, items: &[ExtensionItem]) {
    dst.put_u16(items.len() as u16);
    for item in items {
        dst.put_u8(if item.critical { 1 } else { 0 });
        dst.put_u16(item.item_type);
        dst.put_u16(item.value.len() as u16);
        dst.extend_from_slice(&item.value);
    }
}

fn decode_extensions(buf: &mut Bytes) -> Result<Vec<ExtensionItem>, ClaError> {
    if buf.len() < 2 {
        return Err(ClaError::Protocol("truncated extension item count"));
    }
    let count = buf.get_u16();
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if buf.len() < 5 {
            return Err(ClaError::Protocol("truncated extension item header"));
        }
        let critical = buf.get_u8() != 0;
        let item_type = buf.get_u16();
        let len = buf.get_u16() as usize;
        if buf.len() < len {
            return Err(ClaError::Protocol("truncated extension item value"));
        }
        let value = buf.split_to(len);
        items.push(ExtensionItem {
            item_type,
            critical,
            value,
        });
    }
    Ok(items)
}

impl Encoder<Message> for Tcpclv4Codec {
    type Error = ClaError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::SessInit {
                keepalive_interval,
                segment_mru,
                transfer_mru,
                node_id,
            } => {
                dst.put_u8(MSG_SESS_INIT);
                dst.put_u16(keepalive_interval);
                dst.put_u64(segment_mru);
                dst.put_u64(transfer_mru);
                dst.put_u16(node_id.len() as u16);
                dst.extend_from_slice(node_id.as_bytes());
                encode_extensions(dst, &[]);
            }
            Message::SessTerm { reason, is_reply } => {
                dst.put_u8(MSG_SESS_TERM);
                dst.put_u8(if is_reply { 0x01 } else { 0x00 });
                dst.put_u8(reason.into());
            }
            Message::XferSegment {
                transfer_id,
                start,
                end,
                extensions,
                data,
            } => {
                dst.put_u8(MSG_XFER_SEGMENT);
                let mut flags = 0u8;
                if start {
                    flags |= XFER_FLAG_START;
                }
                if end {
                    flags |= XFER_FLAG_END;
                }
                dst.put_u8(flags);
                dst.put_u64(transfer_id);
                if start {
                    encode_extensions(dst, &extensions);
                }
                push_sdnv(dst, data.len() as u64);
                dst.extend_from_slice(&data);
            }
            Message::XferAck {
                transfer_id,
                start,
                end,
                acked_length,
            } => {
                dst.put_u8(MSG_XFER_ACK);
                let mut flags = 0u8;
                if start {
                    flags |= XFER_FLAG_START;
                }
                if end {
                    flags |= XFER_FLAG_END;
                }
                dst.put_u8(flags);
                dst.put_u64(transfer_id);
                push_sdnv(dst, acked_length);
            }
            Message::XferRefuse { transfer_id, reason } => {
                dst.put_u8(MSG_XFER_REFUSE);
                dst.put_u8(reason.into());
                dst.put_u64(transfer_id);
            }
            Message::Keepalive => {
                dst.put_u8(MSG_KEEPALIVE);
            }
            Message::MsgReject {
                reason,
                rejected_message_header,
            } => {
                dst.put_u8(MSG_MSG_REJECT);
                dst.put_u8(reason.into());
                dst.put_u8(rejected_message_header);
            }
        }
        Ok(())
    }
}

impl Decoder for Tcpclv4Codec {
    type Item = Message;
    type Error = ClaError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let msg_type = src[0];

        match msg_type {
            MSG_SESS_INIT => {
                if src.len() < 1 + 2 + 8 + 8 + 2 {
                    return Ok(None);
                }
                let node_id_len = u16::from_be_bytes([src[19], src[20]]) as usize;
                let fixed_len = 1 + 2 + 8 + 8 + 2 + node_id_len;
                if src.len() < fixed_len + 2 {
                    return Ok(None);
                }
                let ext_count_pos = fixed_len;
                let ext_count = u16::from_be_bytes([src[ext_count_pos], src[ext_count_pos + 1]]);
                // SESS_INIT never carries extension items in this rendition.
                if ext_count != 0 {
                    return Err(ClaError::Protocol("SESS_INIT session extensions unsupported"));
                }
                let mut buf = src.split_to(fixed_len + 2).freeze();
                buf.advance(1);
                let keepalive_interval = buf.get_u16();
                let segment_mru = buf.get_u64();
                let transfer_mru = buf.get_u64();
                let node_id_len = buf.get_u16() as usize;
                let node_id_bytes = buf.split_to(node_id_len);
                let node_id = String::from_utf8(node_id_bytes.to_vec())
                    .map_err(|_| ClaError::Protocol("SESS_INIT node id was not valid UTF-8"))?;
                Ok(Some(Message::SessInit {
                    keepalive_interval,
                    segment_mru,
                    transfer_mru,
                    node_id,
                }))
            }
            MSG_SESS_TERM => {
                if src.len() < 3 {
                    return Ok(None);
                }
                let is_reply = src[1] & 0x01 != 0;
                let reason = SessTermReason::from(src[2]);
                src.advance(3);
                Ok(Some(Message::SessTerm { reason, is_reply }))
            }
            MSG_XFER_SEGMENT => {
                if src.len() < 10 {
                    return Ok(None);
                }
                let flags = src[1];
                let start = flags & XFER_FLAG_START != 0;
                let end = flags & XFER_FLAG_END != 0;
                let transfer_id = u64::from_be_bytes(src[2..10].try_into().unwrap());

                let mut cursor = 10usize;
                let mut extensions = Vec::new();
                if start {
                    if src.len() < cursor + 2 {
                        return Ok(None);
                    }
                    let mut probe = Bytes::copy_from_slice(&src[cursor..]);
                    let before = probe.len();
                    extensions = match decode_extensions(&mut probe) {
                        Ok(items) => items,
                        Err(_) => return Ok(None),
                    };
                    cursor += before - probe.len();
                }

                if src.len() < cursor + 1 {
                    return Ok(None);
                }
                let (len, consumed) = match dtn6_sdnv::decode(&src[cursor..]) {
                    Ok(r) => r,
                    Err(dtn6_sdnv::Error::Truncated) | Err(dtn6_sdnv::Error::Empty) => {
                        return Ok(None)
                    }
                    Err(e) => return Err(e.into()),
                };
                cursor += consumed;
                if src.len() < cursor + len as usize {
                    return Ok(None);
                }
                src.advance(cursor);
                let data = src.split_to(len as usize).freeze();
                Ok(Some(Message::XferSegment {
                    transfer_id,
                    start,
                    end,
                    extensions,
                    data,
                }))
            }
            MSG_XFER_ACK => {
                if src.len() < 11 {
                    return Ok(None);
                }
                let flags = src[1];
                let transfer_id = u64::from_be_bytes(src[2..10].try_into().unwrap());
                let (acked_length, consumed) = match dtn6_sdnv::decode(&src[10..]) {
                    Ok(r) => r,
                    Err(dtn6_sdnv::Error::Truncated) | Err(dtn6_sdnv::Error::Empty) => {
                        return Ok(None)
                    }
                    Err(e) => return Err(e.into()),
                };
                src.advance(10 + consumed);
                Ok(Some(Message::XferAck {
                    transfer_id,
                    start: flags & XFER_FLAG_START != 0,
                    end: flags & XFER_FLAG_END != 0,
                    acked_length,
                }))
            }
            MSG_XFER_REFUSE => {
                if src.len() < 10 {
                    return Ok(None);
                }
                let reason = RefuseReason::from(src[1]);
                let transfer_id = u64::from_be_bytes(src[2..10].try_into().unwrap());
                src.advance(10);
                Ok(Some(Message::XferRefuse { transfer_id, reason }))
            }
            MSG_KEEPALIVE => {
                src.advance(1);
                Ok(Some(Message::Keepalive))
            }
            MSG_MSG_REJECT => {
                if src.len() < 3 {
                    return Ok(None);
                }
                let reason = RejectReason::from(src[1]);
                let rejected_message_header = src[2];
                src.advance(3);
                Ok(Some(Message::MsgReject {
                    reason,
                    rejected_message_header,
                }))
            }
            other => Err(ClaError::ProtocolOwned(format!(
                "unknown TCPCLv4 message type {other:#x}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: Message) {
        let mut codec = Tcpclv4Codec;
        let mut buf = BytesMut::new();
        codec.encode(msg.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn round_trips_sess_init() {
        round_trip(Message::SessInit {
            keepalive_interval: 30,
            segment_mru: 65536,
            transfer_mru: 1 << 20,
            node_id: "dtn://node-a".to_string(),
        });
    }

    #[test]
    fn round_trips_xfer_segment_with_transfer_length_extension() {
        round_trip(Message::XferSegment {
            transfer_id: 7,
            start: true,
            end: true,
            extensions: vec![Message::transfer_length_extension(11)],
            data: Bytes::from_static(b"hello world"),
        });
    }

    #[test]
    fn round_trips_xfer_ack_xfer_refuse_and_control_messages() {
        round_trip(Message::XferAck {
            transfer_id: 3,
            start: true,
            end: false,
            acked_length: 4096,
        });
        round_trip(Message::XferRefuse {
            transfer_id: 3,
            reason: RefuseReason::NotAcceptable,
        });
        round_trip(Message::Keepalive);
        round_trip(Message::SessTerm {
            reason: SessTermReason::IdleTimeout,
            is_reply: true,
        });
        round_trip(Message::MsgReject {
            reason: RejectReason::Unsupported,
            rejected_message_header: 0x22,
        });
    }

    #[test]
    fn transfer_length_roundtrips_through_extension_helpers() {
        let ext = Message::transfer_length_extension(123456);
        assert_eq!(Message::transfer_length(&[ext]), Some(123456));
    }

    #[test]
    fn partial_xfer_segment_waits_for_more_bytes() {
        let mut codec = Tcpclv4Codec;
        let mut full = BytesMut::new();
        codec
            .encode(
                Message::XferSegment {
                    transfer_id: 1,
                    start: true,
                    end: true,
                    extensions: vec![],
                    data: Bytes::from_static(b"0123456789"),
                },
                &mut full,
            )
            .unwrap();

        let mut partial = full.split_to(full.len() - 3);
        assert_eq!(codec.decode(&mut partial).unwrap(), None);
    }
}
