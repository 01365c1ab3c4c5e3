use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EidError {
    #[error("missing scheme separator ':'")]
    MissingScheme,

    #[error("empty scheme")]
    EmptyScheme,

    #[error("scheme must be alphabetic")]
    InvalidScheme,

    #[error("invalid ipn URI: {0}")]
    InvalidIpn(&'static str),

    #[error("invalid pattern: {0}")]
    InvalidPattern(&'static str),
}
