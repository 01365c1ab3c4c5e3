use crate::block::{BlockInfo, BlockType};
use crate::error::{BpError, Result};
use crate::flags::ProcessingFlags;
use crate::framework::BlockFramework;
use crate::primary::{CreationTimestamp, FragmentInfo, PrimaryBlock};
use dtn6_eid::Eid;
use std::path::PathBuf;

/// The bundle's payload, backed by exactly one of an in-memory buffer, a
/// caller-named file, or a temp file owned by the forwarder. Whichever
/// variant is in use, its length is authoritative for the primary block's
/// fragment/original-length bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Buffer(Vec<u8>),
    TempFile(PathBuf),
    File(PathBuf),
}

impl Payload {
    pub fn len(&self) -> Result<u64> {
        match self {
            Payload::Buffer(b) => Ok(b.len() as u64),
            Payload::TempFile(p) | Payload::File(p) => Ok(std::fs::metadata(p)?.len()),
        }
    }
}

/// The source EID, creation timestamp, and (for fragments) offset/original
/// length that together identify a bundle, per §3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleId {
    pub source: Eid,
    pub creation: CreationTimestamp,
    pub fragment: Option<FragmentInfo>,
}

/// The forwarder's in-memory model of a bundle: the primary-block fields
/// flattened in, plus the payload and the extension blocks carried on
/// receipt (`recv_blocks`) or queued for transmission (`xmit_blocks`).
#[derive(Debug, Clone)]
pub struct Bundle {
    pub destination: Eid,
    pub source: Eid,
    pub reply_to: Eid,
    pub custodian: Eid,
    pub creation: CreationTimestamp,
    pub lifetime: u64,
    pub flags: ProcessingFlags,
    pub fragment: Option<FragmentInfo>,
    pub payload: Payload,
    pub recv_blocks: Vec<BlockInfo>,
    pub xmit_blocks: Vec<BlockInfo>,

    /// EID of the node this bundle was last received from, if any;
    /// consumed from an inbound `PreviousNode` block and/or set by the
    /// forwarder before the `PreviousNode` handler's `prepare` runs.
    pub previous_node: Option<Eid>,

    /// `(limit, count)` from an inbound `HopCount` block. The handler's
    /// `prepare` increments `count` and requests deletion when it would
    /// exceed `limit`.
    pub hop_count: Option<(u64, u64)>,

    /// Milliseconds of age carried in (or contributed by) a `BundleAge`
    /// block, used in place of `creation.seconds` when the source has no
    /// synchronized clock.
    pub bundle_age_ms: Option<u64>,
}

impl Bundle {
    pub fn bundle_id(&self) -> BundleId {
        BundleId {
            source: self.source.clone(),
            creation: self.creation,
            fragment: self.fragment,
        }
    }

    /// Whether this bundle has already expired relative to `now_seconds`
    /// (DTN-epoch seconds), i.e. `creation.seconds + lifetime < now_seconds`.
    pub fn expired(&self, now_seconds: u64) -> bool {
        self.creation
            .seconds
            .saturating_add(self.lifetime)
            < now_seconds
    }

    pub fn to_primary(&self) -> crate::primary::PrimaryBlock {
        crate::primary::PrimaryBlock {
            flags: self.flags,
            destination: self.destination.clone(),
            source: self.source.clone(),
            reply_to: self.reply_to.clone(),
            custodian: self.custodian.clone(),
            creation: self.creation,
            lifetime: self.lifetime,
            fragment: self.fragment,
        }
    }

    /// Parses a complete on-wire bundle — primary block followed by
    /// `[extension*, payload]` — as reassembled by a convergence layer from
    /// one or more segments. `framework` drives the same `consume`/
    /// `validate` phases used when the forwarder originates a bundle.
    pub fn decode(buf: &[u8], framework: &BlockFramework) -> Result<Bundle> {
        let (primary, primary_len) = PrimaryBlock::parse(buf)?;
        let (blocks, blocks_len) = framework.consume(&buf[primary_len..])?;
        if primary_len + blocks_len != buf.len() {
            return Err(BpError::Truncated);
        }

        let payload_data = blocks
            .iter()
            .find(|b| b.block_type == BlockType::Payload)
            .map(|b| b.data.clone())
            .ok_or(BpError::MissingOrMisplacedPayload)?;

        let bundle = Bundle {
            destination: primary.destination,
            source: primary.source,
            reply_to: primary.reply_to,
            custodian: primary.custodian,
            creation: primary.creation,
            lifetime: primary.lifetime,
            flags: primary.flags,
            fragment: primary.fragment,
            payload: Payload::Buffer(payload_data),
            recv_blocks: blocks,
            xmit_blocks: Vec::new(),
            previous_node: None,
            hop_count: None,
            bundle_age_ms: None,
        };

        framework
            .validate(&bundle, &bundle.recv_blocks)
            .map_err(BpError::BlockRejected)?;

        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Bundle {
        Bundle {
            destination: "dtn://node2/mail".parse().unwrap(),
            source: "dtn://node1/mail".parse().unwrap(),
            reply_to: Eid::null(),
            custodian: Eid::null(),
            creation: CreationTimestamp {
                seconds: 1000,
                sequence: 0,
            },
            lifetime: 3600,
            flags: ProcessingFlags::default(),
            fragment: None,
            payload: Payload::Buffer(b"hello".to_vec()),
            recv_blocks: Vec::new(),
            xmit_blocks: Vec::new(),
            previous_node: None,
            hop_count: None,
            bundle_age_ms: None,
        }
    }

    #[test]
    fn bundle_id_carries_source_creation_and_fragment() {
        let b = sample();
        let id = b.bundle_id();
        assert_eq!(id.source, b.source);
        assert_eq!(id.creation, b.creation);
        assert_eq!(id.fragment, None);
    }

    #[test]
    fn expiry_is_creation_plus_lifetime() {
        let b = sample();
        assert!(!b.expired(4599));
        assert!(b.expired(4601));
    }

    #[test]
    fn buffer_payload_length() {
        let b = sample();
        assert_eq!(b.payload.len().unwrap(), 5);
    }

    fn wire_bytes_for(payload: &[u8]) -> Vec<u8> {
        let primary = sample().to_primary();
        let mut out = primary.to_bytes();
        let mut payload_block = BlockInfo::new(
            BlockType::Payload,
            crate::block::BlockFlags {
                last_block: true,
                ..Default::default()
            },
        );
        payload_block.data = payload.to_vec();
        out.extend(crate::framework::BlockFramework::serialize_blocks(&[payload_block]));
        out
    }

    #[test]
    fn decode_round_trips_a_reassembled_bundle() {
        let framework = crate::framework::BlockFramework::new();
        let bytes = wire_bytes_for(b"hello");
        let bundle = Bundle::decode(&bytes, &framework).unwrap();
        assert_eq!(bundle.payload, Payload::Buffer(b"hello".to_vec()));
        assert_eq!(bundle.source, sample().source);
        assert_eq!(bundle.recv_blocks.len(), 1);
    }

    #[test]
    fn decode_rejects_trailing_garbage_after_the_payload_block() {
        let framework = crate::framework::BlockFramework::new();
        let mut bytes = wire_bytes_for(b"hello");
        bytes.push(0xff);
        assert!(Bundle::decode(&bytes, &framework).is_err());
    }

    #[test]
    fn decode_rejects_a_bundle_with_no_payload_block() {
        let framework = crate::framework::BlockFramework::new();
        let bytes = sample().to_primary().to_bytes();
        assert!(Bundle::decode(&bytes, &framework).is_err());
    }
}
