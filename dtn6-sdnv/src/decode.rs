use crate::{Error, Result};

/// Decodes an SDNV from the front of `buf`, returning the value and the
/// number of bytes consumed.
///
/// Non-canonical encodings (extra leading continuation bytes that carry no
/// bits) still decode to the correct integer, per the canonical-form
/// requirement that decoders accept them but always produce the value the
/// canonical encoding would have produced.
pub fn decode(buf: &[u8]) -> Result<(u64, usize)> {
    if buf.is_empty() {
        return Err(Error::Empty);
    }

    let mut value: u64 = 0;
    for (i, &b) in buf.iter().enumerate() {
        let bits = (b & 0x7f) as u64;

        if value > (u64::MAX >> 7) {
            return Err(Error::Overflow);
        }
        value = (value << 7) | bits;

        if b & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }

    Err(Error::Truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_boundaries() {
        for n in [0u64, 127, 128, (1u64 << 32) - 1, 1u64 << 32, u64::MAX] {
            let mut buf = [0u8; 16];
            let len = crate::encode(n, &mut buf).unwrap();
            let (decoded, consumed) = decode(&buf[..len]).unwrap();
            assert_eq!(decoded, n);
            assert_eq!(consumed, len);
        }
    }

    #[test]
    fn truncated() {
        assert_eq!(decode(&[0x81]), Err(Error::Truncated));
    }

    #[test]
    fn non_canonical_still_decodes() {
        // Leading continuation byte carrying zero bits: non-canonical but
        // must still produce the same integer a canonical encoder would.
        let (value, consumed) = decode(&[0x80, 0x00]).unwrap();
        assert_eq!(value, 0);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn overflow() {
        // 10 continuation bytes of 0x7f would need 70 bits.
        let buf = [0xffu8, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00];
        assert_eq!(decode(&buf), Err(Error::Overflow));
    }

    #[test]
    fn empty() {
        assert_eq!(decode(&[]), Err(Error::Empty));
    }
}
