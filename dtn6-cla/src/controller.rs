use crate::error::BreakReason;
use crate::events::ClEvent;
use crate::progress::Progress;
use bytes::BytesMut;
use dtn6_bpv6::{Bundle, BlockFramework, BundleId, PayloadStore};
use dtn6_route::LinkId;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// How many times [`reserve_with_retry`] retries a failed reservation
/// before giving up, and the fixed interval between attempts, per §5's
/// "2-second retry timer" backpressure policy.
const RESERVE_RETRY_CEILING: u32 = 3;
const RESERVE_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Reserves `n` bytes of the process-wide payload-storage quota, retrying
/// on [`RESERVE_RETRY_INTERVAL`] up to [`RESERVE_RETRY_CEILING`] times
/// before reporting failure. Shared by every CL engine's receive path,
/// including the two (STCP, MTCP) that have no [`ConnectionController`] of
/// their own to hang this off of.
pub async fn reserve_with_retry(store: &PayloadStore, n: u64) -> bool {
    if n == 0 {
        return true;
    }
    for attempt in 0..RESERVE_RETRY_CEILING {
        if store.try_reserve_payload_space(n) {
            return true;
        }
        if attempt + 1 < RESERVE_RETRY_CEILING {
            tokio::time::sleep(RESERVE_RETRY_INTERVAL).await;
        }
    }
    false
}

/// Parses a reassembled bundle's wire bytes, logging and dropping it on a
/// decode failure rather than propagating the error — a malformed bundle
/// from a peer is reason to discard that bundle, not to tear the contact
/// down. Shared by every CL engine's receive-completion path.
pub fn decode_bundle(framework: &BlockFramework, data: &[u8]) -> Option<Bundle> {
    match Bundle::decode(data, framework) {
        Ok(bundle) => Some(bundle),
        Err(e) => {
            tracing::warn!(error = %e, "dropping bundle that failed to decode");
            None
        }
    }
}

/// Commands the daemon (or a link-administration layer) may send to a
/// contact worker's bounded queue, per §4.7/§5.
#[derive(Debug, Clone)]
pub enum Command {
    /// New bundles are available on the link's `queue`; the worker should
    /// wake up and start sending if it was idle.
    BundlesQueued,
    /// Cancel `bundle` if it has not yet started transmission.
    CancelBundle(BundleId),
    /// Tear the contact down unconditionally.
    BreakContact,
}

pub type CommandSender = tokio::sync::mpsc::Sender<Command>;
pub type CommandReceiver = tokio::sync::mpsc::Receiver<Command>;

/// `{ bundle, total_length, sent_data, ack_data, send_complete,
/// transmit_event_posted }`, per §3.
#[derive(Debug, Clone)]
pub struct InFlightBundle {
    pub bundle: BundleId,
    pub total_length: u64,
    pub sent: Progress,
    pub acked: Progress,
    pub send_complete: bool,
    pub transmit_event_posted: bool,
}

impl InFlightBundle {
    pub fn new(bundle: BundleId, total_length: u64) -> Self {
        InFlightBundle {
            bundle,
            total_length,
            sent: Progress::new(),
            acked: Progress::new(),
            send_complete: false,
            transmit_event_posted: false,
        }
    }

    pub fn fully_acked(&self) -> bool {
        self.acked.is_complete(self.total_length)
    }
}

/// `{ bundle, total_length, rcvd_data, ack_data, acked_length,
/// bundle_complete, bundle_accepted, payload_bytes_reserved }`, per §3.
/// `total_length == 0` means "not yet known" (e.g. a TCPCLv3 transfer
/// before `BUNDLE_END`, or a TCPCLv4 transfer whose `TRANSFER_LENGTH`
/// extension has not yet arrived).
#[derive(Debug, Clone)]
pub struct IncomingBundle {
    pub bundle: Option<BundleId>,
    pub total_length: u64,
    pub rcvd: Progress,
    pub acked: Progress,
    pub bundle_complete: bool,
    pub bundle_accepted: bool,
    pub payload_bytes_reserved: u64,
    /// Segment bytes accumulated so far, in arrival order. Reassembled into
    /// a complete on-wire bundle and run through [`BlockFramework::consume`]
    /// once the transfer's `end` flag arrives.
    pub data: BytesMut,
}

impl IncomingBundle {
    pub fn new() -> Self {
        IncomingBundle {
            bundle: None,
            total_length: 0,
            rcvd: Progress::new(),
            acked: Progress::new(),
            bundle_complete: false,
            bundle_accepted: false,
            payload_bytes_reserved: 0,
            data: BytesMut::new(),
        }
    }
}

impl Default for IncomingBundle {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport-agnostic bookkeeping shared by every stream CL engine:
/// inflight/incoming lists, the contact-up/contact-broken latches, and the
/// teardown logic of §4.7. Each CL engine (TCPCLv3, TCPCLv4, STCP, MTCP)
/// owns one of these and drives it from its own socket-specific run loop;
/// this type never touches a socket.
pub struct ConnectionController {
    pub link: LinkId,
    /// Whether the link is declared reliable (acks are trustworthy and
    /// retransmission by a lower layer is assumed, as for TCP-family CLs).
    pub reliable: bool,
    pub reactive_frag_enabled: bool,
    pub inflight: VecDeque<InFlightBundle>,
    pub incoming: VecDeque<IncomingBundle>,
    payload_store: Arc<PayloadStore>,
    contact_up: bool,
    contact_broken: bool,
}

impl ConnectionController {
    pub fn new(link: LinkId, reliable: bool, reactive_frag_enabled: bool, payload_store: Arc<PayloadStore>) -> Self {
        ConnectionController {
            link,
            reliable,
            reactive_frag_enabled,
            inflight: VecDeque::new(),
            incoming: VecDeque::new(),
            payload_store,
            contact_up: false,
            contact_broken: false,
        }
    }

    /// Reserves `n` bytes of payload-storage quota for bytes about to be
    /// accepted onto `incoming`'s rearmost entry, per §5. Callers track the
    /// amount reserved on [`IncomingBundle::payload_bytes_reserved`] so it
    /// can be released exactly once, whether the bundle completes normally
    /// or the contact breaks first.
    pub async fn reserve_incoming(&self, n: u64) -> bool {
        reserve_with_retry(&self.payload_store, n).await
    }

    /// Releases a previously reserved amount back to the quota. A no-op for
    /// `0`, so callers can pass `IncomingBundle::payload_bytes_reserved`
    /// unconditionally.
    pub fn release(&self, n: u64) {
        if n > 0 {
            self.payload_store.release_payload_space(n);
        }
    }

    pub fn is_contact_up(&self) -> bool {
        self.contact_up
    }

    pub fn is_contact_broken(&self) -> bool {
        self.contact_broken
    }

    /// Latches `contact_up`, idempotently. Returns the event to post, or
    /// `None` if the latch had already fired.
    pub fn on_contact_up(&mut self) -> Option<ClEvent> {
        if self.contact_up {
            return None;
        }
        self.contact_up = true;
        Some(ClEvent::ContactUp {
            link: self.link.clone(),
        })
    }

    /// Succeeds only if `bundle` has not yet started transmission (not
    /// present in `inflight`, or present with zero bytes sent), per §5
    /// Cancellation. Returns `true` if the cancel should proceed (caller
    /// removes it from `inflight`/the link queue); `false` if rejected
    /// because bytes are already on the wire.
    pub fn try_cancel(&mut self, bundle: &BundleId) -> bool {
        match self.inflight.iter().position(|b| &b.bundle == bundle) {
            None => true,
            Some(idx) => {
                if self.inflight[idx].sent.num_contiguous() == 0 {
                    self.inflight.remove(idx);
                    true
                } else {
                    tracing::warn!(?bundle, "cancel rejected: bundle already started on the wire");
                    false
                }
            }
        }
    }

    /// Runs the teardown logic of §4.7/§8 invariant 7. Idempotent: a
    /// second call after `contact_broken` is already latched returns an
    /// empty result and does not re-post `ContactDown`.
    ///
    /// Returns the bundle ids that should be moved back onto the link's
    /// `queue` (untouched, to be retried whole) and the events to post to
    /// the daemon. Every event this call produces is mutually exclusive
    /// per bundle with a bundle appearing in `requeue`.
    pub fn break_contact(&mut self, reason: BreakReason) -> BreakOutcome {
        if self.contact_broken {
            return BreakOutcome::default();
        }
        self.contact_broken = true;

        let mut requeue = Vec::new();
        let mut events = vec![ClEvent::ContactDown {
            link: self.link.clone(),
            reason,
        }];

        for mut b in self.inflight.drain(..) {
            if b.transmit_event_posted {
                continue;
            }
            let sent = b.sent.num_contiguous();
            let acked = b.acked.num_contiguous();

            let return_whole = sent == 0 || (acked == 0 && self.reliable && !self.reactive_frag_enabled);

            if return_whole {
                requeue.push(b.bundle);
            } else {
                b.transmit_event_posted = true;
                events.push(ClEvent::BundleTransmitted {
                    link: self.link.clone(),
                    bundle: b.bundle,
                    sent,
                    acked,
                });
            }
        }

        // Partial reception: only the rearmost (currently in-progress)
        // incoming bundle can have unknown total_length; anything earlier
        // in the list is already complete by construction.
        if self.reactive_frag_enabled {
            if let Some(rear) = self.incoming.back() {
                if rear.total_length == 0 && rear.rcvd.num_contiguous() > 0 {
                    events.push(ClEvent::BundleReceived {
                        link: self.link.clone(),
                        rcvd_len: rear.rcvd.num_contiguous(),
                        bundle: None,
                    });
                }
            }
        }
        for incoming in self.incoming.drain(..) {
            self.payload_store.release_payload_space(incoming.payload_bytes_reserved);
        }

        BreakOutcome { requeue, events }
    }
}

#[derive(Debug, Default)]
pub struct BreakOutcome {
    pub requeue: Vec<BundleId>,
    pub events: Vec<ClEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtn6_bpv6::CreationTimestamp;

    fn bundle_id(seq: u64) -> BundleId {
        BundleId {
            source: "dtn://a".parse().unwrap(),
            creation: CreationTimestamp { seconds: 1, sequence: seq },
            fragment: None,
        }
    }

    fn controller(link: &str, reliable: bool, reactive_frag_enabled: bool) -> ConnectionController {
        ConnectionController::new(
            LinkId::from(link),
            reliable,
            reactive_frag_enabled,
            Arc::new(PayloadStore::new(u64::MAX)),
        )
    }

    #[test]
    fn contact_up_latches_once() {
        let mut c = controller("l1", true, false);
        assert!(c.on_contact_up().is_some());
        assert!(c.on_contact_up().is_none());
    }

    #[test]
    fn no_bytes_sent_requeues_whole_bundle() {
        let mut c = controller("l1", true, false);
        c.inflight.push_back(InFlightBundle::new(bundle_id(1), 1000));
        let outcome = c.break_contact(BreakReason::Broken);
        assert_eq!(outcome.requeue, vec![bundle_id(1)]);
        assert_eq!(outcome.events.len(), 1); // just ContactDown
    }

    #[test]
    fn reliable_link_no_ack_requeues_when_reactive_frag_disabled() {
        let mut c = controller("l1", true, false);
        let mut b = InFlightBundle::new(bundle_id(1), 1000);
        b.sent.advance_to(500).unwrap();
        c.inflight.push_back(b);
        let outcome = c.break_contact(BreakReason::Broken);
        assert_eq!(outcome.requeue, vec![bundle_id(1)]);
    }

    #[test]
    fn partial_ack_emits_bundle_transmitted() {
        let mut c = controller("l1", true, false);
        let mut b = InFlightBundle::new(bundle_id(1), 1000);
        b.sent.advance_to(500).unwrap();
        b.acked.advance_to(400).unwrap();
        c.inflight.push_back(b);
        let outcome = c.break_contact(BreakReason::Broken);
        assert!(outcome.requeue.is_empty());
        assert_eq!(outcome.events.len(), 2);
        assert!(matches!(
            outcome.events[1],
            ClEvent::BundleTransmitted { sent: 500, acked: 400, .. }
        ));
    }

    #[test]
    fn unreliable_link_with_any_bytes_sent_emits_event_even_without_ack() {
        let mut c = controller("l1", false, false);
        let mut b = InFlightBundle::new(bundle_id(1), 1000);
        b.sent.advance_to(300).unwrap();
        c.inflight.push_back(b);
        let outcome = c.break_contact(BreakReason::Broken);
        assert!(outcome.requeue.is_empty());
        assert!(matches!(
            outcome.events[1],
            ClEvent::BundleTransmitted { sent: 300, acked: 0, .. }
        ));
    }

    #[test]
    fn break_contact_is_idempotent() {
        let mut c = controller("l1", true, false);
        c.inflight.push_back(InFlightBundle::new(bundle_id(1), 1000));
        let first = c.break_contact(BreakReason::Broken);
        let second = c.break_contact(BreakReason::IdleTimeout);
        assert_eq!(first.requeue.len(), 1);
        assert!(second.requeue.is_empty());
        assert!(second.events.is_empty());
    }

    #[test]
    fn cancel_rejected_once_bytes_sent() {
        let mut c = controller("l1", true, false);
        let mut b = InFlightBundle::new(bundle_id(1), 1000);
        b.sent.advance_to(1).unwrap();
        c.inflight.push_back(b);
        assert!(!c.try_cancel(&bundle_id(1)));
        assert_eq!(c.inflight.len(), 1);
    }

    #[test]
    fn cancel_succeeds_before_any_bytes_sent() {
        let mut c = controller("l1", true, false);
        c.inflight.push_back(InFlightBundle::new(bundle_id(1), 1000));
        assert!(c.try_cancel(&bundle_id(1)));
        assert!(c.inflight.is_empty());
    }

    #[test]
    fn partial_reception_emits_bundle_received_when_reactive_frag_enabled() {
        let mut c = controller("l1", true, true);
        let mut incoming = IncomingBundle::new();
        incoming.rcvd.advance_to(4096).unwrap();
        c.incoming.push_back(incoming);
        let outcome = c.break_contact(BreakReason::Broken);
        assert!(matches!(
            outcome.events[1],
            ClEvent::BundleReceived { rcvd_len: 4096, .. }
        ));
    }

    #[tokio::test]
    async fn reserve_incoming_delegates_to_payload_store() {
        let store = Arc::new(PayloadStore::new(100));
        let c = ConnectionController::new(LinkId::from("l1"), true, false, store.clone());
        assert!(c.reserve_incoming(60).await);
        assert!(c.reserve_incoming(40).await);
        assert_eq!(store.used(), 100);
    }

    #[test]
    fn break_contact_releases_quota_reserved_by_unfinished_incoming_bundles() {
        let store = Arc::new(PayloadStore::new(100));
        let mut c = ConnectionController::new(LinkId::from("l1"), true, false, store.clone());
        assert!(store.try_reserve_payload_space(80));
        let mut incoming = IncomingBundle::new();
        incoming.payload_bytes_reserved = 80;
        c.incoming.push_back(incoming);
        c.break_contact(BreakReason::Broken);
        assert_eq!(store.used(), 0);
    }
}
