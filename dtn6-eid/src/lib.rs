//! BPv6 Endpoint IDs: `scheme:ssp` URIs, wildcard patterns over them, and the
//! primary-block dictionary that addresses them by byte offset.

mod dictionary;
mod eid;
mod error;
mod pattern;

#[cfg(test)]
mod tests;

pub use dictionary::Dictionary;
pub use eid::{Eid, IpnAddress, NULL_EID};
pub use error::EidError;
pub use pattern::EidPattern;
