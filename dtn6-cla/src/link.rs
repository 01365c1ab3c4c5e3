use dtn6_eid::Eid;
use dtn6_route::LinkId;

/// When a link is expected to be contactable. The connection controller
/// itself is agnostic to this — reconnect backoff timers are link
/// administration (§1, out of scope) — but the type is carried on [`Link`]
/// so the daemon can apply its own policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum LinkType {
    AlwaysOn,
    OnDemand,
    Opportunistic,
    Scheduled,
}

/// A link's lifecycle state, per §3. `Busy` is not a separate state here —
/// see [`Link::is_busy`] — it is an orthogonal backpressure signal layered
/// on top of `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unavailable,
    Available,
    Opening,
    Open,
    Closing,
    Closed,
}

/// Backpressure thresholds from §5: a link is `BUSY` when either the
/// inflight count or the queued-byte sum crosses the high watermark, and
/// only returns to `AVAILABLE` at the corresponding low watermark
/// (hysteresis, so a link does not flap open/closed at the boundary).
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BackpressureLimits {
    pub max_inflight_bundles: usize,
    pub qlimit_bytes_high: u64,
    pub qlimit_bytes_low: u64,
}

impl Default for BackpressureLimits {
    fn default() -> Self {
        BackpressureLimits {
            max_inflight_bundles: 16,
            qlimit_bytes_high: 16 * 1024 * 1024,
            qlimit_bytes_low: 8 * 1024 * 1024,
        }
    }
}

/// A named next hop, as named in route-table entries and the connection
/// controller's command/event vocabulary. `cl_info` is deliberately left to
/// each CL's own config type (`tcpclv3::Config`, `tcpclv4::Config`, ...)
/// rather than modeled as a single polymorphic struct here, since this
/// crate dispatches by the registry in [`crate::registry`] rather than by
/// matching on a `cl_info` enum.
#[derive(Debug, Clone)]
pub struct Link {
    pub id: LinkId,
    pub link_type: LinkType,
    pub state: LinkState,
    pub nexthop: String,
    pub remote_eid: Option<Eid>,
    pub cl_name: String,
    pub limits: BackpressureLimits,
    queued_bytes: u64,
    inflight_count: usize,
}

impl Link {
    pub fn new(id: LinkId, link_type: LinkType, nexthop: String, cl_name: String) -> Self {
        Link {
            id,
            link_type,
            state: LinkState::Unavailable,
            nexthop,
            remote_eid: None,
            cl_name,
            limits: BackpressureLimits::default(),
            queued_bytes: 0,
            inflight_count: 0,
        }
    }

    pub fn queued_bytes(&self) -> u64 {
        self.queued_bytes
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight_count
    }

    pub fn note_queued(&mut self, bytes: u64) {
        self.queued_bytes = self.queued_bytes.saturating_add(bytes);
    }

    pub fn note_dequeued(&mut self, bytes: u64) {
        self.queued_bytes = self.queued_bytes.saturating_sub(bytes);
    }

    pub fn note_inflight_delta(&mut self, delta: i64) {
        self.inflight_count = (self.inflight_count as i64 + delta).max(0) as usize;
    }

    /// Whether the link is currently `BUSY`, per §5's watermarks. This is a
    /// pure function of current counters, not a latched state, so it can be
    /// recomputed on every queue/dequeue without the flap the watermark
    /// hysteresis is meant to avoid living inside a stateful bool: callers
    /// that need hysteresis track the previous busy/available transition
    /// themselves and only re-check against the opposite watermark.
    pub fn is_busy(&self) -> bool {
        self.inflight_count >= self.limits.max_inflight_bundles
            || self.queued_bytes > self.limits.qlimit_bytes_high
    }

    pub fn is_available_again(&self) -> bool {
        self.inflight_count < self.limits.max_inflight_bundles
            && self.queued_bytes <= self.limits.qlimit_bytes_low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> Link {
        Link::new(
            LinkId::from("peer1"),
            LinkType::OnDemand,
            "10.0.0.1:4556".into(),
            "tcpcl".into(),
        )
    }

    #[test]
    fn busy_on_inflight_high_watermark() {
        let mut l = link();
        l.limits.max_inflight_bundles = 2;
        l.note_inflight_delta(2);
        assert!(l.is_busy());
        l.note_inflight_delta(-1);
        assert!(!l.is_busy());
    }

    #[test]
    fn busy_on_queue_byte_high_watermark() {
        let mut l = link();
        l.limits.qlimit_bytes_high = 100;
        l.limits.qlimit_bytes_low = 50;
        l.note_queued(150);
        assert!(l.is_busy());
        l.note_dequeued(120);
        assert!(!l.is_busy());
        assert!(l.is_available_again());
    }
}
