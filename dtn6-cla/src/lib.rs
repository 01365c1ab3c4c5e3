//! Connection controller and TCP-family convergence-layer engines.
//!
//! This crate owns the part of §4 that sits below the route table and
//! above a raw socket: the transport-agnostic inflight/incoming bookkeeping
//! and contact-lifecycle latches of [`controller`], and four concrete wire
//! engines (`tcpclv3`, `tcpclv4`, `stcp`, `mtcp`) that drive a socket
//! through that bookkeeping. [`registry`] is the seam a daemon uses to pick
//! a convergence layer by name without a compiled-in type switch.

pub mod controller;
pub mod error;
pub mod events;
pub mod link;
pub mod mtcp;
pub mod outbound;
pub mod progress;
pub mod registry;
#[cfg(feature = "serde")]
pub(crate) mod serde_support;
pub mod stcp;
pub mod tcpclv3;
pub mod tcpclv4;

pub use controller::{Command, CommandReceiver, CommandSender, ConnectionController};
pub use error::{BreakReason, ClaError, Result};
pub use events::{ClEvent, EventReceiver, EventSender};
pub use link::{BackpressureLimits, Link, LinkState, LinkType};
pub use outbound::{OutboundRequest, OutboundReceiver, OutboundSender};
pub use registry::{Cla, ClaRegistry, Contact};
