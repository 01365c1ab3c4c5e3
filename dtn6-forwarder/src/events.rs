//! Drains the shared [`dtn6_cla::EventReceiver`] and logs what the
//! connection controller posts toward "the daemon" per §4.7/§7. The full
//! bundle daemon (global event bus, persistent store, retry-on-route-loop,
//! reactive-fragment reassembly) is out of scope (§1); this is the minimal
//! observer that lets a careful operator see contact and route-loop events
//! on the wire without one.

use dtn6_cla::ClEvent;

/// Drains until every per-link worker's cloned [`dtn6_cla::EventSender`]
/// has been dropped — which happens once that worker's `run()` returns, so
/// this task naturally winds down after the shutdown sequence in
/// [`crate::main`] breaks every contact and waits for its worker to exit.
pub fn spawn(mut events: dtn6_cla::EventReceiver) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(event);
        }
    })
}

fn log_event(event: ClEvent) {
    match event {
        ClEvent::ContactUp { link } => {
            tracing::info!(%link, "contact up");
        }
        ClEvent::ContactDown { link, reason } => {
            tracing::info!(%link, %reason, "contact down");
        }
        ClEvent::BundleTransmitted {
            link,
            bundle,
            sent,
            acked,
        } => {
            tracing::debug!(%link, ?bundle, sent, acked, "bundle transmitted");
        }
        ClEvent::BundleReceived {
            link,
            rcvd_len,
            bundle,
        } => match bundle {
            Some(bundle) => {
                tracing::debug!(%link, rcvd_len, source = %bundle.source, "bundle received");
            }
            None => {
                tracing::debug!(%link, rcvd_len, "partial bundle received");
            }
        },
        ClEvent::RouteLoopDetected { eid } => {
            tracing::warn!(%eid, "route table alias loop detected");
        }
    }
}
