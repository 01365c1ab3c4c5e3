mod bundle_age;
mod hop_count;
mod previous_node;

pub use bundle_age::BundleAgeHandler;
pub use hop_count::HopCountHandler;
pub use previous_node::PreviousNodeHandler;

use crate::error::{BpError, Result};
use dtn6_eid::Eid;

/// Encodes a single EID as `{ SDNV scheme-len, scheme bytes, SDNV ssp-len,
/// ssp bytes }`, the self-contained form extension blocks use instead of
/// going through the primary block's shared dictionary.
fn encode_eid(eid: &Eid, out: &mut Vec<u8>) {
    push_sdnv(out, eid.scheme().len() as u64);
    out.extend_from_slice(eid.scheme().as_bytes());
    push_sdnv(out, eid.ssp().len() as u64);
    out.extend_from_slice(eid.ssp().as_bytes());
}

fn decode_eid(buf: &[u8]) -> Result<(Eid, usize)> {
    let mut pos = 0;
    let (scheme_len, n) = dtn6_sdnv::decode(&buf[pos..])?;
    pos += n;
    let scheme_len = scheme_len as usize;
    let scheme = std::str::from_utf8(
        buf.get(pos..pos + scheme_len).ok_or(BpError::Truncated)?,
    )
    .map_err(|_| BpError::InvalidEid)?;
    pos += scheme_len;

    let (ssp_len, n) = dtn6_sdnv::decode(&buf[pos..])?;
    pos += n;
    let ssp_len = ssp_len as usize;
    let ssp = std::str::from_utf8(buf.get(pos..pos + ssp_len).ok_or(BpError::Truncated)?)
        .map_err(|_| BpError::InvalidEid)?;
    pos += ssp_len;

    let eid = Eid::assign(scheme, ssp).map_err(|_| BpError::InvalidEid)?;
    Ok((eid, pos))
}

pub(crate) fn push_sdnv(out: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; 10];
    let n = dtn6_sdnv::encode(value, &mut buf).expect("10 bytes always holds a u64 SDNV");
    out.extend_from_slice(&buf[..n]);
}
