//! The route table: an insertion-ordered set of `(pattern, next-hop)`
//! entries, with recursive alias resolution and cycle detection.
//!
//! Grounded in the shape of `bpa`'s `Rib` (an `RwLock`-guarded table behind a
//! small async wrapper), but the matching semantics here are the simpler
//! insertion-ordered ones of the original C++ `RouteTable` rather than the
//! teacher's priority-ordered RIB: ties are broken by insertion order, not
//! by an `Entry::Ord` priority scheme, per `route-table-test.cc`.

mod table;

#[cfg(test)]
mod tests;

pub use table::{NextHop, RouteEntry, RouteTable};

use dtn6_eid::EidPattern;
use std::fmt;

/// Opaque handle to a link, as named by the connection controller. The
/// route table never interprets this; it only compares it for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub String);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LinkId {
    fn from(s: &str) -> Self {
        LinkId(s.to_string())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RouteError {
    #[error("duplicate route entry for {pattern} -> {next_hop:?}")]
    Duplicate {
        pattern: EidPattern,
        next_hop: NextHop,
    },
}
