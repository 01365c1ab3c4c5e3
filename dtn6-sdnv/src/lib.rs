//! Self-Delimiting Numeric Value (SDNV) codec.
//!
//! An SDNV is a big-endian base-128 encoding of a non-negative integer: every
//! byte except the last carries a set high bit ("more data follows"); the
//! last byte has the high bit clear. Encodings are required to be canonical
//! (no leading all-zero continuation bytes beyond what's needed to carry the
//! value), and decoders reject values that would overflow a `u64`.

mod decode;
mod encode;

pub use decode::decode;
pub use encode::{encode, encoded_len};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("buffer too small to hold encoded value")]
    BufferTooSmall,

    #[error("truncated SDNV: continuation bit set on final available byte")]
    Truncated,

    #[error("SDNV value overflows u64")]
    Overflow,

    #[error("empty input")]
    Empty,
}

pub type Result<T> = std::result::Result<T, Error>;
