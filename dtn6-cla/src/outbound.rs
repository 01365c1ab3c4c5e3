use bytes::Bytes;
use dtn6_bpv6::BundleId;

/// A bundle queued for transmission on a contact, shared by every stream
/// engine in this crate (TCPCLv3, TCPCLv4, STCP, MTCP). `result` is woken
/// once with `Ok(())` when the transfer is fully acked (or, for the
/// acknowledgement-free CLs, once it has been flushed), or with
/// `Err(data)` if the contact broke first — returning the bytes so the
/// caller can requeue them on another link.
pub struct OutboundRequest {
    pub id: BundleId,
    pub data: Bytes,
    pub result: tokio::sync::oneshot::Sender<std::result::Result<(), Bytes>>,
}

pub type OutboundSender = tokio::sync::mpsc::Sender<OutboundRequest>;
pub type OutboundReceiver = tokio::sync::mpsc::Receiver<OutboundRequest>;
