use thiserror::Error;

/// Why a contact transitioned to `broken`, per the error-kind vocabulary in
/// §7: every cause other than a clean, peer-initiated shutdown funnels into
/// one of these reasons before the connection controller runs the teardown
/// logic in §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakReason {
    /// Peer sent `SHUTDOWN`/`SESS_TERM`, or we did and the peer agreed.
    Shutdown,
    /// Segment lengths disagreed, an ack exceeded transmitted bytes, a
    /// `BUNDLE_START` arrived before the prior `BUNDLE_END`, or similar.
    ClError,
    /// Repeated `try_reserve_payload_space` failures past the retry
    /// ceiling.
    ResourceExhaustion,
    /// Socket error, `POLLHUP`/`POLLERR` equivalent, or EOF.
    Broken,
    /// No data within `data_timeout` while keepalive enforcement is on.
    IdleTimeout,
}

impl std::fmt::Display for BreakReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BreakReason::Shutdown => "shutdown",
            BreakReason::ClError => "cl_error",
            BreakReason::ResourceExhaustion => "resource_exhaustion",
            BreakReason::Broken => "broken",
            BreakReason::IdleTimeout => "idle_timeout",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum ClaError {
    #[error("SDNV error: {0}")]
    Sdnv(#[from] dtn6_sdnv::Error),

    #[error("protocol error: {0}")]
    Protocol(&'static str),

    #[error("protocol error: {0}")]
    ProtocolOwned(String),

    #[error("payload storage quota exhausted past the retry ceiling")]
    ResourceExhaustion,

    #[error("contact header magic mismatch")]
    BadMagic,

    #[error("unsupported TCPCL version {0}")]
    UnsupportedVersion(u8),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer EID {0} is not a valid endpoint id")]
    BadPeerEid(String),

    #[error("no handler registered for convergence layer {0:?}")]
    UnknownCla(String),

    #[error("duplicate convergence layer registration for {0:?}")]
    DuplicateCla(String),

    #[error("link parameter error: {0}")]
    BadLinkParams(String),

    #[cfg(feature = "tls")]
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[cfg(feature = "tls")]
    #[error("TLS configuration error: {0}")]
    TlsSetup(String),
}

pub type Result<T> = std::result::Result<T, ClaError>;
