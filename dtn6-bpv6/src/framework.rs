use crate::block::{BlockFlags, BlockInfo, BlockType};
use crate::bundle::Bundle;
use crate::error::{BpError, Result};
use std::collections::HashMap;

/// Why a bundle was dropped during block processing; paired with the
/// `delete reason` vocabulary in §7 (`block_unintelligible` and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionReason {
    BlockUnintelligible,
    Other(&'static str),
}

/// Per-block-type handler, called at the four phases the framework drives a
/// block through. Mirrors §4.5 exactly; `prepare`/`generate` run when
/// building an outgoing block list for a link, `consume`/`validate` run
/// while parsing an incoming one.
pub trait BlockHandler: Send + Sync {
    fn block_type(&self) -> BlockType;

    /// Appends this handler's block (if any) to the outgoing block list.
    /// Most handlers unconditionally contribute a block; a handler may
    /// choose not to (e.g. an optional extension with nothing to say).
    /// Takes `bundle` mutably because some handlers (hop count, bundle age)
    /// update bundle-carried state as a side effect of preparing a block.
    fn prepare(&self, bundle: &mut Bundle, xmit_blocks: &mut Vec<BlockInfo>) -> Result<()>;

    /// Produces this block's wire bytes into `block.data`.
    fn generate(&self, bundle: &Bundle, block: &mut BlockInfo) -> Result<()>;

    /// Consumes as much of `buf` as this block's declared length allows,
    /// returning bytes consumed. Sets `block.complete` once fully read.
    fn consume(&self, block: &mut BlockInfo, buf: &[u8]) -> Result<usize>;

    fn validate(&self, bundle: &Bundle, block: &BlockInfo) -> std::result::Result<(), DeletionReason>;
}

/// Drives the registered [`BlockHandler`]s through the four phases and
/// enforces the framework-level invariants: exactly one primary (handled
/// outside this struct, which only ever sees extension + payload blocks),
/// primary first, payload last with `last_block` set; unknown blocks with
/// `discard_if_unprocessed` are dropped on receive, others forwarded
/// verbatim.
#[derive(Default)]
pub struct BlockFramework {
    handlers: HashMap<BlockType, Box<dyn BlockHandler>>,
}

impl BlockFramework {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut fw = Self::new();
        fw.register(Box::new(crate::extensions::PreviousNodeHandler));
        fw.register(Box::new(crate::extensions::BundleAgeHandler));
        fw.register(Box::new(crate::extensions::HopCountHandler));
        fw
    }

    pub fn register(&mut self, handler: Box<dyn BlockHandler>) {
        self.handlers.insert(handler.block_type(), handler);
    }

    /// Builds the outgoing extension-block list (excluding the primary and
    /// payload blocks, which the caller owns) for `bundle`, in a stable
    /// order (ascending block-type code) so wire output is deterministic.
    pub fn prepare(&self, bundle: &mut Bundle) -> Result<Vec<BlockInfo>> {
        let mut handlers: Vec<&Box<dyn BlockHandler>> = self.handlers.values().collect();
        handlers.sort_by_key(|h| u64::from(h.block_type()));

        let mut blocks = Vec::new();
        for handler in handlers {
            handler.prepare(bundle, &mut blocks)?;
        }
        Ok(blocks)
    }

    /// Fills in wire bytes for every block via its handler; blocks without
    /// a registered handler are assumed already fully-formed (forwarded
    /// verbatim) and are left untouched.
    pub fn generate(&self, bundle: &Bundle, blocks: &mut [BlockInfo]) -> Result<()> {
        for block in blocks.iter_mut() {
            if let Some(handler) = self.handlers.get(&block.block_type) {
                handler.generate(bundle, block)?;
            }
        }
        Ok(())
    }

    /// Serializes `[extension*, payload]` into a contiguous byte blob using
    /// the per-block wire framing `{ SDNV type, SDNV flags, SDNV length,
    /// data }`. The caller is responsible for prefixing the primary block.
    pub fn serialize_blocks(blocks: &[BlockInfo]) -> Vec<u8> {
        let mut out = Vec::new();
        for block in blocks {
            push_sdnv(&mut out, u64::from(block.block_type));
            push_sdnv(&mut out, block.flags.as_u64());
            push_sdnv(&mut out, block.data.len() as u64);
            out.extend_from_slice(&block.data);
        }
        out
    }

    /// Parses `[extension*, payload]` out of `buf`. Stops at (and includes)
    /// the first block flagged `last_block`, per the "payload last"
    /// invariant. Unknown blocks with `discard_if_unprocessed` are dropped;
    /// unknown blocks without that flag are kept verbatim for forwarding.
    pub fn consume(&self, buf: &[u8]) -> Result<(Vec<BlockInfo>, usize)> {
        let mut pos = 0;
        let mut blocks = Vec::new();
        loop {
            if pos >= buf.len() {
                return Err(BpError::MissingOrMisplacedPayload);
            }
            let (type_code, n) = dtn6_sdnv::decode(&buf[pos..])?;
            pos += n;
            let (flags_raw, n) = dtn6_sdnv::decode(&buf[pos..])?;
            pos += n;
            let (len, n) = dtn6_sdnv::decode(&buf[pos..])?;
            pos += n;
            let len = len as usize;
            if pos + len > buf.len() {
                return Err(BpError::Truncated);
            }

            let block_type = BlockType::from(type_code);
            let flags = BlockFlags::from_u64(flags_raw);
            let mut block = BlockInfo::new(block_type, flags);

            let raw = &buf[pos..pos + len];
            if let Some(handler) = self.handlers.get(&block_type) {
                let consumed = handler.consume(&mut block, raw)?;
                if consumed != raw.len() {
                    return Err(BpError::Truncated);
                }
            } else if flags.discard_if_unprocessed {
                pos += len;
                if flags.last_block {
                    return Err(BpError::MissingOrMisplacedPayload);
                }
                continue;
            } else {
                block.data = raw.to_vec();
                block.complete = true;
            }

            pos += len;
            let is_last = block.flags.last_block;
            blocks.push(block);
            if is_last {
                break;
            }
        }
        Ok((blocks, pos))
    }

    /// Enforces exactly one payload block, last, with `last_block` set, and
    /// runs each handler's `validate`.
    pub fn validate(&self, bundle: &Bundle, blocks: &[BlockInfo]) -> std::result::Result<(), DeletionReason> {
        let payload_count = blocks
            .iter()
            .filter(|b| b.block_type == BlockType::Payload)
            .count();
        if payload_count != 1 {
            return Err(DeletionReason::BlockUnintelligible);
        }
        match blocks.last() {
            Some(b) if b.block_type == BlockType::Payload && b.flags.last_block => {}
            _ => return Err(DeletionReason::BlockUnintelligible),
        }

        for block in blocks {
            if let Some(handler) = self.handlers.get(&block.block_type) {
                handler.validate(bundle, block)?;
            }
        }
        Ok(())
    }
}

fn push_sdnv(out: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; 10];
    let n = dtn6_sdnv::encode(value, &mut buf).expect("10 bytes always holds a u64 SDNV");
    out.extend_from_slice(&buf[..n]);
}
