use crate::eid::Eid;

/// The BPv6 primary-block dictionary: a packed sequence of NUL-terminated
/// byte strings, addressed by byte offset.
///
/// Grounded in the source's `Dictionary` (a doubling `malloc`/`realloc`
/// buffer with whole-entry-only matching); here the buffer is a plain
/// growable `Vec<u8>` and doubling is `Vec`'s own amortized growth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    buf: Vec<u8>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn from_bytes(buf: Vec<u8>) -> Self {
        Dictionary { buf }
    }

    /// Returns the offset of `s` as a whole entry, if present.
    pub fn get_offset(&self, s: &str) -> Option<usize> {
        let mut offset = 0;
        while offset < self.buf.len() {
            let entry = self.entry_at(offset)?;
            if entry == s.as_bytes() {
                return Some(offset);
            }
            offset += entry.len() + 1;
        }
        None
    }

    /// Appends `s` if not already present as a whole entry; idempotent.
    /// Returns the offset of the (possibly pre-existing) entry.
    pub fn add_str(&mut self, s: &str) -> usize {
        if let Some(offset) = self.get_offset(s) {
            return offset;
        }
        let offset = self.buf.len();
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        offset
    }

    fn entry_at(&self, offset: usize) -> Option<&[u8]> {
        let rest = self.buf.get(offset..)?;
        let nul = rest.iter().position(|&b| b == 0)?;
        Some(&rest[..nul])
    }

    /// Reconstructs `scheme:ssp` from the two dictionary offsets, failing if
    /// either lies outside the dictionary, refers to a non-terminated
    /// region, or the resulting EID fails [`Eid::valid`].
    pub fn extract_eid(&self, scheme_offset: usize, ssp_offset: usize) -> Option<Eid> {
        if self.buf.is_empty() {
            return None;
        }
        if scheme_offset >= self.buf.len().saturating_sub(1) {
            return None;
        }
        if ssp_offset >= self.buf.len().saturating_sub(1) {
            return None;
        }

        let scheme = self.entry_at(scheme_offset)?;
        let ssp = self.entry_at(ssp_offset)?;

        let scheme = std::str::from_utf8(scheme).ok()?;
        let ssp = std::str::from_utf8(ssp).ok()?;

        Eid::assign(scheme, ssp).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_add() {
        let mut d = Dictionary::new();
        let o1 = d.add_str("dtn");
        let before = d.as_bytes().to_vec();
        let o2 = d.add_str("dtn");
        assert_eq!(o1, o2);
        assert_eq!(d.as_bytes(), before.as_slice());
    }

    #[test]
    fn prefixes_do_not_collide() {
        let mut d = Dictionary::new();
        d.add_str("dtn");
        assert_eq!(d.get_offset("dt"), None);
        assert_eq!(d.get_offset("dtnX"), None);
    }

    #[test]
    fn extract_roundtrip() {
        let mut d = Dictionary::new();
        let scheme = d.add_str("dtn");
        let ssp = d.add_str("//node1/mail");
        let eid = d.extract_eid(scheme, ssp).unwrap();
        assert_eq!(eid.scheme(), "dtn");
        assert_eq!(eid.ssp(), "//node1/mail");
    }

    #[test]
    fn extract_rejects_out_of_range() {
        let mut d = Dictionary::new();
        d.add_str("dtn");
        let bad = d.len() - 1;
        assert_eq!(d.extract_eid(bad, bad), None);
    }
}
