use super::push_sdnv;
use crate::block::{BlockFlags, BlockInfo, BlockType};
use crate::bundle::Bundle;
use crate::error::Result;
use crate::framework::{BlockHandler, DeletionReason};

/// Carries the bundle's age in milliseconds since creation, for use by
/// nodes along the path that lack a clock synchronized with the source —
/// `creation.seconds` alone is meaningless to them. One SDNV, no flags
/// beyond the defaults.
pub struct BundleAgeHandler;

impl BlockHandler for BundleAgeHandler {
    fn block_type(&self) -> BlockType {
        BlockType::BundleAge
    }

    fn prepare(&self, bundle: &mut Bundle, xmit_blocks: &mut Vec<BlockInfo>) -> Result<()> {
        let Some(age_ms) = bundle.bundle_age_ms else {
            return Ok(());
        };
        let mut block = BlockInfo::new(BlockType::BundleAge, BlockFlags::default());
        block.data = age_ms.to_be_bytes().to_vec();
        xmit_blocks.push(block);
        Ok(())
    }

    fn generate(&self, _bundle: &Bundle, block: &mut BlockInfo) -> Result<()> {
        let age_ms = u64::from_be_bytes(block.data[..8].try_into().expect("8 bytes"));
        let mut data = Vec::new();
        push_sdnv(&mut data, age_ms);
        block.data = data;
        Ok(())
    }

    fn consume(&self, block: &mut BlockInfo, buf: &[u8]) -> Result<usize> {
        let (age_ms, consumed) = dtn6_sdnv::decode(buf)?;
        block.data = age_ms.to_be_bytes().to_vec();
        block.complete = true;
        Ok(consumed)
    }

    fn validate(&self, _bundle: &Bundle, block: &BlockInfo) -> std::result::Result<(), DeletionReason> {
        if block.data.len() == 8 {
            Ok(())
        } else {
            Err(DeletionReason::BlockUnintelligible)
        }
    }
}

/// Reads the age (milliseconds) back out of a consumed `BundleAge` block.
pub fn age_ms(block: &BlockInfo) -> u64 {
    u64::from_be_bytes(block.data[..8].try_into().expect("8 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Payload;
    use crate::flags::ProcessingFlags;
    use crate::primary::CreationTimestamp;

    fn sample_bundle(age_ms: Option<u64>) -> Bundle {
        Bundle {
            destination: "dtn://node2/mail".parse().unwrap(),
            source: "dtn://node1/mail".parse().unwrap(),
            reply_to: dtn6_eid::Eid::null(),
            custodian: dtn6_eid::Eid::null(),
            creation: CreationTimestamp { seconds: 0, sequence: 0 },
            lifetime: 100,
            flags: ProcessingFlags::default(),
            fragment: None,
            payload: Payload::Buffer(Vec::new()),
            recv_blocks: Vec::new(),
            xmit_blocks: Vec::new(),
            previous_node: None,
            hop_count: None,
            bundle_age_ms: age_ms,
        }
    }

    #[test]
    fn round_trips_age() {
        let handler = BundleAgeHandler;
        let mut bundle = sample_bundle(Some(42_000));
        let mut blocks = Vec::new();
        handler.prepare(&mut bundle, &mut blocks).unwrap();
        handler.generate(&bundle, &mut blocks[0]).unwrap();

        let mut parsed = BlockInfo::new(BlockType::BundleAge, blocks[0].flags);
        let consumed = handler.consume(&mut parsed, &blocks[0].data).unwrap();
        assert_eq!(consumed, blocks[0].data.len());
        assert_eq!(age_ms(&parsed), 42_000);
    }

    #[test]
    fn no_age_means_no_block() {
        let handler = BundleAgeHandler;
        let mut bundle = sample_bundle(None);
        let mut blocks = Vec::new();
        handler.prepare(&mut bundle, &mut blocks).unwrap();
        assert!(blocks.is_empty());
    }
}
