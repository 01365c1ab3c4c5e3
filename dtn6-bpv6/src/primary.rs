use crate::error::{BpError, Result};
use crate::flags::ProcessingFlags;
use dtn6_eid::{Dictionary, Eid, IpnAddress};

/// `(seconds_since_dtn_epoch, sequence_number)`, both 64-bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreationTimestamp {
    pub seconds: u64,
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FragmentInfo {
    pub offset: u64,
    pub orig_length: u64,
}

/// The fixed-shape BPv6 primary block.
///
/// Field order on the wire, per §4.4: version; SDNV flags; SDNV block
/// length; eight SDNV dictionary offsets (dest scheme/ssp, source
/// scheme/ssp, reply-to scheme/ssp, custodian scheme/ssp); SDNV creation
/// seconds; SDNV creation sequence; SDNV lifetime; SDNV dictionary length;
/// dictionary bytes; if fragment, SDNV frag offset and SDNV original
/// length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryBlock {
    pub flags: ProcessingFlags,
    pub destination: Eid,
    pub source: Eid,
    pub reply_to: Eid,
    pub custodian: Eid,
    pub creation: CreationTimestamp,
    pub lifetime: u64,
    pub fragment: Option<FragmentInfo>,
}

impl PrimaryBlock {
    /// Checks, in the order the spec mandates (custodian, then
    /// destination, then source, then reply-to, short-circuiting on the
    /// first non-`ipn` EID), whether every EID qualifies for the
    /// dictionary-free CBHE shortcut.
    fn cbhe_addresses(&self) -> Option<[IpnAddress; 4]> {
        let custodian = self.custodian.as_ipn()?;
        let destination = self.destination.as_ipn()?;
        let source = self.source.as_ipn()?;
        let reply_to = self.reply_to.as_ipn()?;
        Some([destination, source, reply_to, custodian])
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();

        let (offsets, dict_bytes): ([u64; 8], Vec<u8>) =
            if let Some([dest, src, reply, cust]) = self.cbhe_addresses() {
                (
                    [
                        dest.node,
                        dest.service,
                        src.node,
                        src.service,
                        reply.node,
                        reply.service,
                        cust.node,
                        cust.service,
                    ],
                    Vec::new(),
                )
            } else {
                let mut dict = Dictionary::new();
                let dest_scheme = dict.add_str(self.destination.scheme()) as u64;
                let dest_ssp = dict.add_str(self.destination.ssp()) as u64;
                let src_scheme = dict.add_str(self.source.scheme()) as u64;
                let src_ssp = dict.add_str(self.source.ssp()) as u64;
                let reply_scheme = dict.add_str(self.reply_to.scheme()) as u64;
                let reply_ssp = dict.add_str(self.reply_to.ssp()) as u64;
                let cust_scheme = dict.add_str(self.custodian.scheme()) as u64;
                let cust_ssp = dict.add_str(self.custodian.ssp()) as u64;
                (
                    [
                        dest_scheme,
                        dest_ssp,
                        src_scheme,
                        src_ssp,
                        reply_scheme,
                        reply_ssp,
                        cust_scheme,
                        cust_ssp,
                    ],
                    dict.as_bytes().to_vec(),
                )
            };

        for offset in offsets {
            push_sdnv(&mut body, offset);
        }
        push_sdnv(&mut body, self.creation.seconds);
        push_sdnv(&mut body, self.creation.sequence);
        push_sdnv(&mut body, self.lifetime);
        push_sdnv(&mut body, dict_bytes.len() as u64);
        body.extend_from_slice(&dict_bytes);
        if let Some(frag) = &self.fragment {
            push_sdnv(&mut body, frag.offset);
            push_sdnv(&mut body, frag.orig_length);
        }

        let mut out = vec![crate::BP_VERSION];
        push_sdnv(&mut out, self.flags.as_u64());
        push_sdnv(&mut out, body.len() as u64);
        out.extend_from_slice(&body);
        out
    }

    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let mut pos = 0;
        let version = *buf.first().ok_or(BpError::Truncated)?;
        if version != crate::BP_VERSION {
            return Err(BpError::UnsupportedVersion(version));
        }
        pos += 1;

        let (flags_raw, n) = dtn6_sdnv::decode(&buf[pos..])?;
        pos += n;
        let flags = ProcessingFlags::from_u64(flags_raw);

        let (block_length, n) = dtn6_sdnv::decode(&buf[pos..])?;
        pos += n;
        let body_start = pos;
        let body_end = body_start
            .checked_add(block_length as usize)
            .ok_or(BpError::Truncated)?;
        if body_end > buf.len() {
            return Err(BpError::Truncated);
        }

        let mut offsets = [0u64; 8];
        for slot in offsets.iter_mut() {
            let (v, n) = dtn6_sdnv::decode(&buf[pos..])?;
            *slot = v;
            pos += n;
        }

        let (seconds, n) = dtn6_sdnv::decode(&buf[pos..])?;
        pos += n;
        let (sequence, n) = dtn6_sdnv::decode(&buf[pos..])?;
        pos += n;
        let (lifetime, n) = dtn6_sdnv::decode(&buf[pos..])?;
        pos += n;
        let (dict_len, n) = dtn6_sdnv::decode(&buf[pos..])?;
        pos += n;

        let (destination, source, reply_to, custodian) = if dict_len == 0 {
            // CBHE shortcut: offsets directly carry ipn node/service pairs.
            let as_ipn = |node: u64, service: u64| Eid::from_ipn(IpnAddress { node, service });
            (
                as_ipn(offsets[0], offsets[1]),
                as_ipn(offsets[2], offsets[3]),
                as_ipn(offsets[4], offsets[5]),
                as_ipn(offsets[6], offsets[7]),
            )
        } else {
            let dict_len = dict_len as usize;
            if pos + dict_len > buf.len() {
                return Err(BpError::Truncated);
            }
            let dict = Dictionary::from_bytes(buf[pos..pos + dict_len].to_vec());
            pos += dict_len;

            let extract = |scheme_off: u64, ssp_off: u64| {
                dict.extract_eid(scheme_off as usize, ssp_off as usize)
                    .ok_or(BpError::BadDictionaryOffset)
            };
            (
                extract(offsets[0], offsets[1])?,
                extract(offsets[2], offsets[3])?,
                extract(offsets[4], offsets[5])?,
                extract(offsets[6], offsets[7])?,
            )
        };

        let fragment = if flags.is_fragment {
            let (offset, n) = dtn6_sdnv::decode(&buf[pos..])?;
            pos += n;
            let (orig_length, n) = dtn6_sdnv::decode(&buf[pos..])?;
            pos += n;
            Some(FragmentInfo { offset, orig_length })
        } else {
            None
        };

        if pos != body_end {
            return Err(BpError::Truncated);
        }

        let block = PrimaryBlock {
            flags,
            destination,
            source,
            reply_to,
            custodian,
            creation: CreationTimestamp { seconds, sequence },
            lifetime,
            fragment,
        };
        block.validate()?;
        Ok((block, pos))
    }

    /// Rejects bundles violating the null-source invariants of §3, or
    /// admin bundles requesting custody transfer.
    pub fn validate(&self) -> Result<()> {
        if self.source.is_null() {
            let ok = self.flags.do_not_fragment
                && !self.flags.status_report.any()
                && !self.flags.custody_requested;
            if !ok {
                return Err(BpError::NullSourceInvariant);
            }
        }
        if self.flags.is_admin_record && self.flags.custody_requested {
            return Err(BpError::AdminCustodyConflict);
        }
        Ok(())
    }
}

fn push_sdnv(out: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; 10];
    let n = dtn6_sdnv::encode(value, &mut buf).expect("10 bytes always holds a u64 SDNV");
    out.extend_from_slice(&buf[..n]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dtn_bundle() -> PrimaryBlock {
        PrimaryBlock {
            flags: ProcessingFlags {
                custody_requested: true,
                priority: 1,
                ..Default::default()
            },
            destination: "dtn://node2/mail".parse().unwrap(),
            source: "dtn://node1/mail".parse().unwrap(),
            reply_to: Eid::null(),
            custodian: Eid::null(),
            creation: CreationTimestamp {
                seconds: 12345,
                sequence: 0,
            },
            lifetime: 3600,
            fragment: None,
        }
    }

    fn ipn_bundle() -> PrimaryBlock {
        PrimaryBlock {
            flags: ProcessingFlags::default(),
            destination: "ipn:2.1".parse().unwrap(),
            source: "ipn:1.1".parse().unwrap(),
            reply_to: "ipn:1.1".parse().unwrap(),
            custodian: "ipn:1.1".parse().unwrap(),
            creation: CreationTimestamp {
                seconds: 1,
                sequence: 0,
            },
            lifetime: 100,
            fragment: None,
        }
    }

    #[test]
    fn round_trip_dictionary_form() {
        let primary = dtn_bundle();
        let bytes = primary.to_bytes();
        let (parsed, consumed) = PrimaryBlock::parse(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed, primary);
    }

    #[test]
    fn cbhe_used_for_all_ipn_eids() {
        let primary = ipn_bundle();
        let bytes = primary.to_bytes();
        // No dictionary bytes: version(1) + flags(1) + len-sdnv + 8 offset
        // sdnvs + 3 more sdnvs + dict-len-sdnv(0) is much shorter than a
        // dictionary encoding of the same addresses would be.
        let (parsed, _) = PrimaryBlock::parse(&bytes).unwrap();
        assert_eq!(parsed, primary);
    }

    #[test]
    fn cbhe_equivalence_with_dictionary_form() {
        // Same logical bundle, forced through the dictionary path by using
        // a non-ipn reply-to, still parses to equal EIDs where both are
        // expressible.
        let mut primary = ipn_bundle();
        primary.reply_to = "dtn://relay".parse().unwrap();
        let bytes = primary.to_bytes();
        let (parsed, _) = PrimaryBlock::parse(&bytes).unwrap();
        assert_eq!(parsed.destination, primary.destination);
        assert_eq!(parsed.source, primary.source);
        assert_eq!(parsed.custodian, primary.custodian);
    }

    #[test]
    fn reserved_flag_bits_survive_round_trip() {
        let mut primary = dtn_bundle();
        primary.flags = ProcessingFlags::from_u64(primary.flags.as_u64() | (1 << 22));
        let bytes = primary.to_bytes();
        let (parsed, _) = PrimaryBlock::parse(&bytes).unwrap();
        assert_eq!(parsed.flags.as_u64() & (1 << 22), 1 << 22);
    }

    #[test]
    fn null_source_without_do_not_fragment_is_rejected() {
        let mut primary = dtn_bundle();
        primary.source = Eid::null();
        primary.flags.do_not_fragment = false;
        assert!(primary.validate().is_err());
    }

    #[test]
    fn admin_record_requesting_custody_is_rejected() {
        let mut primary = dtn_bundle();
        primary.flags.is_admin_record = true;
        primary.flags.custody_requested = true;
        assert!(primary.validate().is_err());
    }

    #[test]
    fn fragment_fields_round_trip() {
        let mut primary = dtn_bundle();
        primary.flags.is_fragment = true;
        primary.flags.do_not_fragment = false;
        primary.flags.custody_requested = false;
        primary.fragment = Some(FragmentInfo {
            offset: 4096,
            orig_length: 65536,
        });
        let bytes = primary.to_bytes();
        let (parsed, _) = PrimaryBlock::parse(&bytes).unwrap();
        assert_eq!(parsed.fragment, primary.fragment);
    }
}
