use crate::eid::Eid;
use crate::error::EidError;

/// A wildcard pattern over endpoint IDs, per the grammar in §3: `*:*` matches
/// anything, `scheme:*` matches any SSP within a scheme, and a trailing
/// `/*` on the SSP matches any path extension of the prefix before it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(into = "String"))]
#[cfg_attr(feature = "serde", serde(try_from = "std::borrow::Cow<'_, str>"))]
pub enum EidPattern {
    /// `*:*`
    Any,
    /// `scheme:*`
    AnySsp { scheme: String },
    /// `scheme:ssp/*`
    SspPrefix { scheme: String, prefix: String },
    /// `scheme:ssp`, matched exactly.
    Exact { scheme: String, ssp: String },
}

impl EidPattern {
    /// If this pattern names exactly one endpoint (the `Exact` variant),
    /// returns it as an [`Eid`] so it can be used as a lookup key — e.g. to
    /// follow a route-table alias whose target is a literal address.
    pub fn as_literal_eid(&self) -> Option<Eid> {
        match self {
            EidPattern::Exact { scheme, ssp } => Eid::assign(scheme, ssp).ok(),
            _ => None,
        }
    }

    pub fn matches(&self, eid: &Eid) -> bool {
        match self {
            EidPattern::Any => true,
            EidPattern::AnySsp { scheme } => eid.scheme() == scheme,
            EidPattern::SspPrefix { scheme, prefix } => {
                eid.scheme() == scheme
                    && (eid.ssp() == prefix.as_str()
                        || eid
                            .ssp()
                            .strip_prefix(prefix.as_str())
                            .is_some_and(|rest| rest.starts_with('/')))
            }
            EidPattern::Exact { scheme, ssp } => eid.scheme() == scheme && eid.ssp() == ssp,
        }
    }
}

impl std::str::FromStr for EidPattern {
    type Err = EidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*:*" {
            return Ok(EidPattern::Any);
        }

        let (scheme, ssp) = s.split_once(':').ok_or(EidError::MissingScheme)?;
        if scheme.is_empty() {
            return Err(EidError::EmptyScheme);
        }
        if scheme != "*" && !scheme.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(EidError::InvalidScheme);
        }

        if ssp == "*" {
            if scheme == "*" {
                // "*:*" already handled above; "*:*" is the only legal use
                // of a wildcard scheme.
                return Err(EidError::InvalidPattern("bare '*' scheme only valid as '*:*'"));
            }
            return Ok(EidPattern::AnySsp {
                scheme: scheme.to_string(),
            });
        }

        if scheme == "*" {
            return Err(EidError::InvalidPattern("bare '*' scheme only valid as '*:*'"));
        }

        if let Some(prefix) = ssp.strip_suffix("/*") {
            return Ok(EidPattern::SspPrefix {
                scheme: scheme.to_string(),
                prefix: prefix.to_string(),
            });
        }

        Ok(EidPattern::Exact {
            scheme: scheme.to_string(),
            ssp: ssp.to_string(),
        })
    }
}

#[cfg(feature = "serde")]
impl From<EidPattern> for String {
    fn from(pattern: EidPattern) -> Self {
        pattern.to_string()
    }
}

#[cfg(feature = "serde")]
impl TryFrom<std::borrow::Cow<'_, str>> for EidPattern {
    type Error = EidError;

    fn try_from(s: std::borrow::Cow<'_, str>) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl std::fmt::Display for EidPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EidPattern::Any => write!(f, "*:*"),
            EidPattern::AnySsp { scheme } => write!(f, "{scheme}:*"),
            EidPattern::SspPrefix { scheme, prefix } => write!(f, "{scheme}:{prefix}/*"),
            EidPattern::Exact { scheme, ssp } => write!(f, "{scheme}:{ssp}"),
        }
    }
}
