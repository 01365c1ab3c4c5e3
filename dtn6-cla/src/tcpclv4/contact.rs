use crate::error::{ClaError, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const MAGIC: [u8; 4] = *b"dtn!";
pub const FLAG_CAN_TLS: u8 = 0x01;

/// The four-byte magic, version, and a single reserved-flags byte, per
/// §4.9: unlike TCPCLv3 the keepalive interval and node id move into
/// `SESS_INIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactHeader {
    pub version: u8,
    pub can_tls: bool,
}

impl ContactHeader {
    pub fn to_bytes(&self) -> [u8; 6] {
        let mut out = [0u8; 6];
        out[..4].copy_from_slice(&MAGIC);
        out[4] = self.version;
        out[5] = if self.can_tls { FLAG_CAN_TLS } else { 0 };
        out
    }

    pub async fn write(&self, stream: &mut (impl tokio::io::AsyncWrite + Unpin)) -> Result<()> {
        stream.write_all(&self.to_bytes()).await?;
        Ok(())
    }

    pub async fn read(stream: &mut (impl tokio::io::AsyncRead + Unpin)) -> Result<Self> {
        let mut buf = [0u8; 6];
        stream.read_exact(&mut buf).await?;
        if buf[..4] != MAGIC {
            return Err(ClaError::BadMagic);
        }
        Ok(ContactHeader {
            version: buf[4],
            can_tls: buf[5] & FLAG_CAN_TLS != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_over_a_pipe() {
        let header = ContactHeader {
            version: 4,
            can_tls: true,
        };
        let mut cursor = std::io::Cursor::new(header.to_bytes().to_vec());
        let parsed = ContactHeader::read(&mut cursor).await.unwrap();
        assert_eq!(parsed, header);
    }

    #[tokio::test]
    async fn rejects_bad_magic() {
        let mut cursor = std::io::Cursor::new(vec![0u8; 6]);
        assert!(matches!(
            ContactHeader::read(&mut cursor).await,
            Err(ClaError::BadMagic)
        ));
    }
}
