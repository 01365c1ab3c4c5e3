use crate::error::EidError;

/// The distinguished null endpoint: `dtn:none`. Compares equal only to
/// itself.
pub const NULL_EID: &str = "dtn:none";

/// An `ipn` scheme URI parsed into its node and service numbers
/// (`ipn:NODE.SERVICE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpnAddress {
    pub node: u64,
    pub service: u64,
}

impl std::str::FromStr for IpnAddress {
    type Err = EidError;

    fn from_str(ssp: &str) -> Result<Self, Self::Err> {
        let (node, service) = ssp
            .split_once('.')
            .ok_or(EidError::InvalidIpn("missing '.' separator"))?;
        let node: u64 = node
            .parse()
            .map_err(|_| EidError::InvalidIpn("node number not a valid integer"))?;
        let service: u64 = service
            .parse()
            .map_err(|_| EidError::InvalidIpn("service number not a valid integer"))?;
        Ok(IpnAddress { node, service })
    }
}

impl std::fmt::Display for IpnAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.node, self.service)
    }
}

/// An Endpoint ID: `scheme:ssp`.
///
/// Unlike BPv7's closed scheme enumeration, BPv6 endpoint IDs are a generic
/// `scheme:ssp` pair; the `ipn` scheme is additionally given a specialized
/// numeric parse (see [`Eid::as_ipn`]) used by the CBHE shortcut, but any
/// non-empty alphabetic scheme is otherwise accepted verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(into = "String"))]
#[cfg_attr(feature = "serde", serde(try_from = "std::borrow::Cow<'_, str>"))]
pub struct Eid {
    scheme: String,
    ssp: String,
}

impl Eid {
    /// Builds an EID from already-split scheme and SSP parts, without
    /// re-parsing. Fails if the result would not be [`Eid::valid`].
    pub fn assign(scheme: &str, ssp: &str) -> Result<Self, EidError> {
        let eid = Eid {
            scheme: scheme.to_string(),
            ssp: ssp.to_string(),
        };
        if !eid.valid() {
            return Err(EidError::InvalidScheme);
        }
        Ok(eid)
    }

    pub fn null() -> Self {
        Eid {
            scheme: "dtn".to_string(),
            ssp: "none".to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.scheme == "dtn" && self.ssp == "none"
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn ssp(&self) -> &str {
        &self.ssp
    }

    /// A non-empty alphabetic scheme and a colon is all `valid()` requires;
    /// the SSP is otherwise unconstrained.
    pub fn valid(&self) -> bool {
        !self.scheme.is_empty() && self.scheme.chars().all(|c| c.is_ascii_alphabetic())
    }

    /// If this EID is in the `ipn` scheme, parses its SSP as `NODE.SERVICE`.
    pub fn as_ipn(&self) -> Option<IpnAddress> {
        if self.scheme != "ipn" {
            return None;
        }
        self.ssp.parse().ok()
    }

    pub fn from_ipn(addr: IpnAddress) -> Self {
        Eid {
            scheme: "ipn".to_string(),
            ssp: addr.to_string(),
        }
    }
}

impl std::str::FromStr for Eid {
    type Err = EidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, ssp) = s.split_once(':').ok_or(EidError::MissingScheme)?;
        if scheme.is_empty() {
            return Err(EidError::EmptyScheme);
        }
        if !scheme.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(EidError::InvalidScheme);
        }
        Ok(Eid {
            scheme: scheme.to_string(),
            ssp: ssp.to_string(),
        })
    }
}

impl std::fmt::Display for Eid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.scheme, self.ssp)
    }
}

impl Default for Eid {
    fn default() -> Self {
        Eid::null()
    }
}

#[cfg(feature = "serde")]
impl From<Eid> for String {
    fn from(eid: Eid) -> Self {
        eid.to_string()
    }
}

#[cfg(feature = "serde")]
impl TryFrom<std::borrow::Cow<'_, str>> for Eid {
    type Error = EidError;

    fn try_from(s: std::borrow::Cow<'_, str>) -> Result<Self, Self::Error> {
        s.parse()
    }
}
