use crate::{LinkId, RouteError};
use dtn6_eid::{Eid, EidPattern};
use std::collections::HashSet;
use tokio::sync::RwLock;

/// Where a matching bundle is sent next: either a terminal link, or a
/// rewrite to another endpoint pattern (an alias, resolved recursively).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NextHop {
    Link(LinkId),
    Alias(EidPattern),
}

/// `{ dest_pattern, next_hop }`. Priority and action beyond
/// link-vs-alias are left to routing-policy layers above this table; the
/// table itself only preserves insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub dest_pattern: EidPattern,
    pub next_hop: NextHop,
}

/// Insertion-ordered `(pattern, next-hop)` table.
///
/// Mutation (`add_entry`, `del_entry`, `del_entries`,
/// `del_entries_for_nexthop`) takes the writer lock; `get_matching` takes
/// the reader lock, per the concurrency policy in §5: lookups never block
/// writers for longer than a single traversal of the table.
#[derive(Debug, Default)]
pub struct RouteTable {
    entries: RwLock<Vec<RouteEntry>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn size(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Fails with [`RouteError::Duplicate`] if an entry with the same
    /// `(dest_pattern, next_hop)` pair already exists.
    pub async fn add_entry(&self, entry: RouteEntry) -> Result<(), RouteError> {
        let mut entries = self.entries.write().await;
        if entries
            .iter()
            .any(|e| e.dest_pattern == entry.dest_pattern && e.next_hop == entry.next_hop)
        {
            return Err(RouteError::Duplicate {
                pattern: entry.dest_pattern,
                next_hop: entry.next_hop,
            });
        }
        entries.push(entry);
        Ok(())
    }

    /// Removes the single entry matching `(pattern, link)` exactly, if any.
    /// Returns the number removed (0 or 1).
    pub async fn del_entry(&self, pattern: &EidPattern, link: &LinkId) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| !(&e.dest_pattern == pattern && e.next_hop == NextHop::Link(link.clone())));
        before - entries.len()
    }

    /// Removes every entry whose `dest_pattern` equals `pattern`, regardless
    /// of next-hop. Returns the number removed.
    pub async fn del_entries(&self, pattern: &EidPattern) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| &e.dest_pattern != pattern);
        before - entries.len()
    }

    /// Removes every entry whose next-hop is `link`. Returns the number
    /// removed.
    pub async fn del_entries_for_nexthop(&self, link: &LinkId) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.next_hop != NextHop::Link(link.clone()));
        before - entries.len()
    }

    /// Returns every terminal (link-bearing) entry reachable from `eid`,
    /// resolving alias chains recursively. A cycle yields zero results and a
    /// single logged diagnostic; the table itself is left unchanged (cycles
    /// are detected, not repaired).
    pub async fn get_matching(&self, eid: &Eid) -> Vec<RouteEntry> {
        let entries = self.entries.read().await;
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        if resolve(&entries, eid, &mut visited, &mut out) {
            out
        } else {
            tracing::warn!(%eid, "route table lookup loop detected, discarding matches");
            Vec::new()
        }
    }
}

/// Depth-first expansion of every entry matching `eid`, substituting alias
/// next-hops with a recursive lookup on their target pattern. Returns
/// `false` if a cycle was detected anywhere in the expansion, in which case
/// the caller must discard `out` entirely rather than keep the partial
/// prefix gathered so far.
fn resolve(
    entries: &[RouteEntry],
    eid: &Eid,
    visited: &mut HashSet<EidPattern>,
    out: &mut Vec<RouteEntry>,
) -> bool {
    for entry in entries.iter().filter(|e| e.dest_pattern.matches(eid)) {
        match &entry.next_hop {
            NextHop::Link(_) => out.push(entry.clone()),
            NextHop::Alias(target) => {
                if !visited.insert(entry.dest_pattern.clone()) {
                    return false;
                }
                let Some(target_eid) = target.as_literal_eid() else {
                    // Non-literal alias targets (wildcards) cannot be
                    // re-queried as a concrete endpoint; nothing to expand.
                    continue;
                };
                if !resolve(entries, &target_eid, visited, out) {
                    return false;
                }
            }
        }
    }
    true
}
