//! `serde(with = "...")` helpers for the `Duration` fields scattered across
//! the per-CL `Config` structs. Mirrors the plain-seconds representation
//! `tcpclv4::config::SessionConfig` uses upstream for its own keepalive
//! field, just expressed as a `Duration` on this side of the wire instead
//! of a bare `u16`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

pub mod duration_secs {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

pub mod duration_secs_opt {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        d.map(|d| d.as_secs()).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
