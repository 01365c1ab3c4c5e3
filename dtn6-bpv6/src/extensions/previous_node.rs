use super::{decode_eid, encode_eid};
use crate::block::{BlockFlags, BlockInfo, BlockType};
use crate::bundle::Bundle;
use crate::error::{BpError, Result};
use crate::framework::{BlockHandler, DeletionReason};

/// Carries the EID of the node that most recently forwarded this bundle.
/// The forwarder stamps `bundle.previous_node` with its own node EID before
/// calling [`crate::BlockFramework::prepare`] on an outbound bundle; this
/// handler only knows how to wrap that EID in a block.
///
/// Consume-and-generate only: nothing about a previous-node block depends
/// on any other block, so there is no cross-block validation to perform.
pub struct PreviousNodeHandler;

impl BlockHandler for PreviousNodeHandler {
    fn block_type(&self) -> BlockType {
        BlockType::PreviousNode
    }

    fn prepare(&self, bundle: &mut Bundle, xmit_blocks: &mut Vec<BlockInfo>) -> Result<()> {
        let Some(eid) = bundle.previous_node.clone() else {
            return Ok(());
        };
        let mut block = BlockInfo::new(
            BlockType::PreviousNode,
            BlockFlags {
                discard_if_unprocessed: true,
                ..Default::default()
            },
        );
        block.eid_list.push(eid);
        xmit_blocks.push(block);
        Ok(())
    }

    fn generate(&self, _bundle: &Bundle, block: &mut BlockInfo) -> Result<()> {
        let eid = block.eid_list.first().ok_or(BpError::InvalidEid)?;
        let mut data = Vec::new();
        encode_eid(eid, &mut data);
        block.data = data;
        Ok(())
    }

    fn consume(&self, block: &mut BlockInfo, buf: &[u8]) -> Result<usize> {
        let (eid, consumed) = decode_eid(buf)?;
        block.eid_list = vec![eid];
        block.complete = true;
        Ok(consumed)
    }

    fn validate(&self, _bundle: &Bundle, block: &BlockInfo) -> std::result::Result<(), DeletionReason> {
        if block.eid_list.len() == 1 {
            Ok(())
        } else {
            Err(DeletionReason::BlockUnintelligible)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::ProcessingFlags;
    use crate::primary::CreationTimestamp;
    use crate::bundle::Payload;

    fn sample_bundle() -> Bundle {
        Bundle {
            destination: "dtn://node2/mail".parse().unwrap(),
            source: "dtn://node1/mail".parse().unwrap(),
            reply_to: dtn6_eid::Eid::null(),
            custodian: dtn6_eid::Eid::null(),
            creation: CreationTimestamp { seconds: 1, sequence: 0 },
            lifetime: 100,
            flags: ProcessingFlags::default(),
            fragment: None,
            payload: Payload::Buffer(Vec::new()),
            recv_blocks: Vec::new(),
            xmit_blocks: Vec::new(),
            previous_node: Some("dtn://relay1".parse().unwrap()),
            hop_count: None,
            bundle_age_ms: None,
        }
    }

    #[test]
    fn prepare_generate_consume_round_trip() {
        let handler = PreviousNodeHandler;
        let mut bundle = sample_bundle();
        let mut blocks = Vec::new();
        handler.prepare(&mut bundle, &mut blocks).unwrap();
        assert_eq!(blocks.len(), 1);
        handler.generate(&bundle, &mut blocks[0]).unwrap();

        let mut parsed = BlockInfo::new(BlockType::PreviousNode, blocks[0].flags);
        let consumed = handler.consume(&mut parsed, &blocks[0].data).unwrap();
        assert_eq!(consumed, blocks[0].data.len());
        assert_eq!(parsed.eid_list, vec!["dtn://relay1".parse::<dtn6_eid::Eid>().unwrap()]);
    }

    #[test]
    fn no_previous_node_means_no_block() {
        let handler = PreviousNodeHandler;
        let mut bundle = sample_bundle();
        bundle.previous_node = None;
        let mut blocks = Vec::new();
        handler.prepare(&mut bundle, &mut blocks).unwrap();
        assert!(blocks.is_empty());
    }
}
