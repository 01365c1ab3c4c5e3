use super::push_sdnv;
use crate::block::{BlockFlags, BlockInfo, BlockType};
use crate::bundle::Bundle;
use crate::error::{BpError, Result};
use crate::framework::{BlockHandler, DeletionReason};

/// Bounds the number of hops a bundle may take: `(limit, count)`. `prepare`
/// increments `count` on every hop and fails closed (refusing to prepare
/// the block, which the forwarder treats as "do not transmit, consider for
/// deletion") once `count` would exceed `limit`.
pub struct HopCountHandler;

impl BlockHandler for HopCountHandler {
    fn block_type(&self) -> BlockType {
        BlockType::HopCount
    }

    fn prepare(&self, bundle: &mut Bundle, xmit_blocks: &mut Vec<BlockInfo>) -> Result<()> {
        let Some((limit, count)) = bundle.hop_count else {
            return Ok(());
        };
        let next_count = count + 1;
        if next_count > limit {
            return Err(BpError::BlockValidation {
                block_type: u64::from(BlockType::HopCount),
                reason: "hop count exceeds limit",
            });
        }
        bundle.hop_count = Some((limit, next_count));

        let mut block = BlockInfo::new(BlockType::HopCount, BlockFlags::default());
        block.data = [limit.to_be_bytes(), next_count.to_be_bytes()].concat();
        xmit_blocks.push(block);
        Ok(())
    }

    fn generate(&self, _bundle: &Bundle, block: &mut BlockInfo) -> Result<()> {
        let limit = u64::from_be_bytes(block.data[0..8].try_into().expect("8 bytes"));
        let count = u64::from_be_bytes(block.data[8..16].try_into().expect("8 bytes"));
        let mut data = Vec::new();
        push_sdnv(&mut data, limit);
        push_sdnv(&mut data, count);
        block.data = data;
        Ok(())
    }

    fn consume(&self, block: &mut BlockInfo, buf: &[u8]) -> Result<usize> {
        let (limit, n) = dtn6_sdnv::decode(buf)?;
        let (count, n2) = dtn6_sdnv::decode(&buf[n..])?;
        block.data = [limit.to_be_bytes(), count.to_be_bytes()].concat();
        block.complete = true;
        Ok(n + n2)
    }

    fn validate(&self, _bundle: &Bundle, block: &BlockInfo) -> std::result::Result<(), DeletionReason> {
        if block.data.len() != 16 {
            return Err(DeletionReason::BlockUnintelligible);
        }
        let (limit, count) = limit_count(block);
        if count > limit {
            Err(DeletionReason::Other("hop count exceeds limit"))
        } else {
            Ok(())
        }
    }
}

/// Reads `(limit, count)` back out of a consumed `HopCount` block.
pub fn limit_count(block: &BlockInfo) -> (u64, u64) {
    (
        u64::from_be_bytes(block.data[0..8].try_into().expect("8 bytes")),
        u64::from_be_bytes(block.data[8..16].try_into().expect("8 bytes")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Payload;
    use crate::flags::ProcessingFlags;
    use crate::primary::CreationTimestamp;

    fn sample_bundle(hop_count: Option<(u64, u64)>) -> Bundle {
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
            hop_count,
            bundle_age_ms: None,
        }
    }

    #[test]
    fn increments_and_round_trips() {
        let handler = HopCountHandler;
        let mut bundle = sample_bundle(Some((5, 2)));
        let mut blocks = Vec::new();
        handler.prepare(&mut bundle, &mut blocks).unwrap();
        assert_eq!(bundle.hop_count, Some((5, 3)));
        handler.generate(&bundle, &mut blocks[0]).unwrap();

        let mut parsed = BlockInfo::new(BlockType::HopCount, blocks[0].flags);
        let consumed = handler.consume(&mut parsed, &blocks[0].data).unwrap();
        assert_eq!(consumed, blocks[0].data.len());
        assert_eq!(limit_count(&parsed), (5, 3));
    }

    #[test]
    fn refuses_to_exceed_limit() {
        let handler = HopCountHandler;
        let mut bundle = sample_bundle(Some((3, 3)));
        let mut blocks = Vec::new();
        assert!(handler.prepare(&mut bundle, &mut blocks).is_err());
        assert!(blocks.is_empty());
    }

    #[test]
    fn validate_rejects_count_over_limit() {
        let handler = HopCountHandler;
        let mut block = BlockInfo::new(BlockType::HopCount, BlockFlags::default());
        block.data = [4u64.to_be_bytes(), 5u64.to_be_bytes()].concat();
        let bundle = sample_bundle(None);
        assert!(handler.validate(&bundle, &block).is_err());
    }
}
