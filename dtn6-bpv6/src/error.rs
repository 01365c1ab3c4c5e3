use thiserror::Error;

#[derive(Error, Debug)]
pub enum BpError {
    #[error("SDNV error: {0}")]
    Sdnv(#[from] dtn6_sdnv::Error),

    #[error("unsupported bundle protocol version {0}, expected {expected}", expected = crate::BP_VERSION)]
    UnsupportedVersion(u8),

    #[error("primary block truncated")]
    Truncated,

    #[error("dictionary offset out of range")]
    BadDictionaryOffset,

    #[error("invalid endpoint id in dictionary")]
    InvalidEid,

    #[error("bundle with null source must set do-not-fragment and request neither custody nor a status report")]
    NullSourceInvariant,

    #[error("administrative record must not request custody transfer")]
    AdminCustodyConflict,

    #[error("block list must start with exactly one primary block")]
    MissingPrimary,

    #[error("block list must end with exactly one payload block carrying the last-block flag")]
    MissingOrMisplacedPayload,

    #[error("unknown critical extension block type {0}")]
    UnknownCriticalBlock(u64),

    #[error("block {block_type} failed to validate: {reason}")]
    BlockValidation { block_type: u64, reason: &'static str },

    #[error("payload storage quota exhausted")]
    QuotaExhausted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("block processing rejected the bundle: {0:?}")]
    BlockRejected(crate::framework::DeletionReason),
}

pub type Result<T> = std::result::Result<T, BpError>;
