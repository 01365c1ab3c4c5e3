use crate::error::BreakReason;
use dtn6_bpv6::BundleId;
use dtn6_route::LinkId;

/// Channel every CL engine posts its [`ClEvent`]s on, shared with the
/// daemon-facing bundle pipeline.
pub type EventSender = tokio::sync::mpsc::UnboundedSender<ClEvent>;
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<ClEvent>;

/// Events the connection controller posts toward the daemon event bus
/// (external to this crate, per §1's scope cut). The daemon is responsible
/// for acting on them — moving fragments back onto routes, releasing
/// inflight accounting, retrying links — this crate only guarantees the
/// postings themselves follow §4.7's exactly-once rule.
#[derive(Debug, Clone)]
pub enum ClEvent {
    /// The CL's contact-initiation protocol completed (TCPCLv3/v4), or the
    /// first byte arrived (STCP/MTCP).
    ContactUp { link: LinkId },

    /// The contact tore down, for `reason`. Idempotent: posted exactly once
    /// per contact even if multiple triggers race (§5 Cancellation).
    ContactDown { link: LinkId, reason: BreakReason },

    /// A bundle left `inflight` with at least one byte acknowledged, or any
    /// bytes sent on an unreliable link, per §4.7. `sent` and `acked` are
    /// the counts at the moment of posting; the daemon may fragment
    /// reactively against them.
    BundleTransmitted {
        link: LinkId,
        bundle: BundleId,
        sent: u64,
        acked: u64,
    },

    /// A bundle arrived on `link`. `bundle` carries the fully reassembled
    /// and parsed [`dtn6_bpv6::Bundle`] when the transfer completed
    /// normally; it is `None` for a partially-received bundle's prefix,
    /// posted when reactive fragmentation is enabled and the contact tears
    /// down mid-transfer.
    BundleReceived {
        link: LinkId,
        rcvd_len: u64,
        bundle: Option<Box<dtn6_bpv6::Bundle>>,
    },

    /// A route-table alias cycle was detected during `get_matching`; logged
    /// once per detection, per §4.6/§7.
    RouteLoopDetected { eid: String },
}
