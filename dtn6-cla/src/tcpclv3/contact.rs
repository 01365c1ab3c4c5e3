use crate::error::{ClaError, Result};
use dtn6_eid::Eid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Bytes `0x64 0x74 0x6E 0x21` ("dtn!"), per §6: begins every TCPCL
/// connection, v3 or v4 alike.
pub const MAGIC: [u8; 4] = *b"dtn!";

pub const SEGMENT_ACK_ENABLED: u8 = 0x01;
pub const REACTIVE_FRAG_ENABLED: u8 = 0x02;
pub const NEGATIVE_ACK_ENABLED: u8 = 0x04;

/// The four-byte-magic + version + flags + keepalive + SDNV-prefixed-EID
/// handshake both sides exchange immediately after TCP connect/accept, per
/// §4.8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactHeader {
    pub version: u8,
    pub segment_ack_enabled: bool,
    pub reactive_frag_enabled: bool,
    pub negative_ack_enabled: bool,
    pub keepalive_interval: u16,
    pub local_eid: Eid,
}

impl ContactHeader {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.local_eid.to_string().len());
        out.extend_from_slice(&MAGIC);
        out.push(self.version);

        let mut flags = 0u8;
        if self.segment_ack_enabled {
            flags |= SEGMENT_ACK_ENABLED;
        }
        if self.reactive_frag_enabled {
            flags |= REACTIVE_FRAG_ENABLED;
        }
        if self.negative_ack_enabled {
            flags |= NEGATIVE_ACK_ENABLED;
        }
        out.push(flags);
        out.extend_from_slice(&self.keepalive_interval.to_be_bytes());

        let eid = self.local_eid.to_string();
        let mut sdnv_buf = [0u8; 10];
        let n = dtn6_sdnv::encode(eid.len() as u64, &mut sdnv_buf).expect("eid length fits u64");
        out.extend_from_slice(&sdnv_buf[..n]);
        out.extend_from_slice(eid.as_bytes());
        out
    }

    pub async fn write(&self, stream: &mut (impl tokio::io::AsyncWrite + Unpin)) -> Result<()> {
        stream.write_all(&self.to_bytes()).await?;
        Ok(())
    }

    pub async fn read(stream: &mut (impl tokio::io::AsyncRead + Unpin)) -> Result<Self> {
        let mut magic = [0u8; 4];
        stream.read_exact(&mut magic).await?;
        if magic != MAGIC {
            return Err(ClaError::BadMagic);
        }

        let version = stream.read_u8().await?;
        let flags = stream.read_u8().await?;
        let keepalive_interval = stream.read_u16().await?;

        // SDNV-prefixed EID length: read one byte at a time, as SDNVs are
        // self-delimiting and arbitrarily long in principle but bounded in
        // practice by the EID itself being short.
        let mut sdnv_bytes = Vec::with_capacity(2);
        loop {
            let b = stream.read_u8().await?;
            sdnv_bytes.push(b);
            if b & 0x80 == 0 {
                break;
            }
            if sdnv_bytes.len() > 10 {
                return Err(ClaError::Protocol("contact header EID length SDNV too long"));
            }
        }
        let (eid_len, _) = dtn6_sdnv::decode(&sdnv_bytes)?;
        let mut eid_bytes = vec![0u8; eid_len as usize];
        stream.read_exact(&mut eid_bytes).await?;
        let eid_str = std::str::from_utf8(&eid_bytes)
            .map_err(|_| ClaError::BadPeerEid(String::from_utf8_lossy(&eid_bytes).into_owned()))?;
        let local_eid = eid_str
            .parse::<Eid>()
            .map_err(|_| ClaError::BadPeerEid(eid_str.to_string()))?;

        Ok(ContactHeader {
            version,
            segment_ack_enabled: flags & SEGMENT_ACK_ENABLED != 0,
            reactive_frag_enabled: flags & REACTIVE_FRAG_ENABLED != 0,
            negative_ack_enabled: flags & NEGATIVE_ACK_ENABLED != 0,
            keepalive_interval,
            local_eid,
        })
    }

    /// Negotiates the feature set two contact headers agree to use: the
    /// intersection of advertised flags and the minimum of advertised
    /// keepalive intervals, per §4.8.
    pub fn negotiate(ours: &ContactHeader, theirs: &ContactHeader) -> NegotiatedSession {
        NegotiatedSession {
            segment_ack_enabled: ours.segment_ack_enabled && theirs.segment_ack_enabled,
            reactive_frag_enabled: ours.reactive_frag_enabled && theirs.reactive_frag_enabled,
            negative_ack_enabled: ours.negative_ack_enabled && theirs.negative_ack_enabled,
            keepalive_interval: match (ours.keepalive_interval, theirs.keepalive_interval) {
                (0, x) | (x, 0) => x,
                (a, b) => a.min(b),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedSession {
    pub segment_ack_enabled: bool,
    pub reactive_frag_enabled: bool,
    pub negative_ack_enabled: bool,
    pub keepalive_interval: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_over_a_pipe() {
        let header = ContactHeader {
            version: 3,
            segment_ack_enabled: true,
            reactive_frag_enabled: false,
            negative_ack_enabled: false,
            keepalive_interval: 15,
            local_eid: "dtn://node1".parse().unwrap(),
        };
        let bytes = header.to_bytes();
        let mut cursor = std::io::Cursor::new(bytes);
        let parsed = ContactHeader::read(&mut cursor).await.unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn negotiate_takes_minimum_keepalive_and_intersection_of_flags() {
        let ours = ContactHeader {
            version: 3,
            segment_ack_enabled: true,
            reactive_frag_enabled: true,
            negative_ack_enabled: false,
            keepalive_interval: 30,
            local_eid: "dtn://a".parse().unwrap(),
        };
        let theirs = ContactHeader {
            version: 3,
            segment_ack_enabled: true,
            reactive_frag_enabled: false,
            negative_ack_enabled: false,
            keepalive_interval: 15,
            local_eid: "dtn://b".parse().unwrap(),
        };
        let n = ContactHeader::negotiate(&ours, &theirs);
        assert!(n.segment_ack_enabled);
        assert!(!n.reactive_frag_enabled);
        assert_eq!(n.keepalive_interval, 15);
    }
}
