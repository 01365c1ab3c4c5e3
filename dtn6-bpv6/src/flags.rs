/// The five status-report-request bits (primary-block flag bits 14-18).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusReportFlags {
    pub on_receive: bool,
    pub custody_accept: bool,
    pub forward: bool,
    pub deliver: bool,
    pub delete: bool,
}

impl StatusReportFlags {
    pub fn any(&self) -> bool {
        self.on_receive || self.custody_accept || self.forward || self.deliver || self.delete
    }
}

const BIT_FRAGMENT: u64 = 1 << 0;
const BIT_ADMIN: u64 = 1 << 1;
const BIT_DO_NOT_FRAGMENT: u64 = 1 << 2;
const BIT_CUSTODY_REQUESTED: u64 = 1 << 3;
const BIT_SINGLETON_DEST: u64 = 1 << 4;
const BIT_APP_ACK: u64 = 1 << 5;
const PRIORITY_SHIFT: u32 = 7;
const PRIORITY_MASK: u64 = 0b11 << PRIORITY_SHIFT;
const BIT_SR_RECEIVE: u64 = 1 << 14;
const BIT_SR_CUSTODY_ACCEPT: u64 = 1 << 15;
const BIT_SR_FORWARD: u64 = 1 << 16;
const BIT_SR_DELIVER: u64 = 1 << 17;
const BIT_SR_DELETE: u64 = 1 << 18;

const KNOWN_BITS: u64 = BIT_FRAGMENT
    | BIT_ADMIN
    | BIT_DO_NOT_FRAGMENT
    | BIT_CUSTODY_REQUESTED
    | BIT_SINGLETON_DEST
    | BIT_APP_ACK
    | PRIORITY_MASK
    | BIT_SR_RECEIVE
    | BIT_SR_CUSTODY_ACCEPT
    | BIT_SR_FORWARD
    | BIT_SR_DELIVER
    | BIT_SR_DELETE;

/// The bundle processing flags word from the primary block.
///
/// Bits the processor does not assign meaning to are preserved verbatim in
/// `reserved` so that `as_u64(from_u64(f)) == f` for every `f`, per the
/// round-trip invariant in §8 — the processor "must round-trip every bit it
/// understands and preserve reserved bits on forward", the same
/// preserve-the-unknown-bits discipline the flags bitset in the teacher's
/// BPv7 block model (`Flags::unrecognised`) follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingFlags {
    pub is_fragment: bool,
    pub is_admin_record: bool,
    pub do_not_fragment: bool,
    pub custody_requested: bool,
    pub singleton_destination: bool,
    pub app_acked: bool,
    pub priority: u8,
    pub status_report: StatusReportFlags,
    reserved: u64,
}

impl ProcessingFlags {
    pub fn from_u64(f: u64) -> Self {
        ProcessingFlags {
            is_fragment: f & BIT_FRAGMENT != 0,
            is_admin_record: f & BIT_ADMIN != 0,
            do_not_fragment: f & BIT_DO_NOT_FRAGMENT != 0,
            custody_requested: f & BIT_CUSTODY_REQUESTED != 0,
            singleton_destination: f & BIT_SINGLETON_DEST != 0,
            app_acked: f & BIT_APP_ACK != 0,
            priority: ((f & PRIORITY_MASK) >> PRIORITY_SHIFT) as u8,
            status_report: StatusReportFlags {
                on_receive: f & BIT_SR_RECEIVE != 0,
                custody_accept: f & BIT_SR_CUSTODY_ACCEPT != 0,
                forward: f & BIT_SR_FORWARD != 0,
                deliver: f & BIT_SR_DELIVER != 0,
                delete: f & BIT_SR_DELETE != 0,
            },
            reserved: f & !KNOWN_BITS,
        }
    }

    pub fn as_u64(&self) -> u64 {
        let mut f = self.reserved;
        if self.is_fragment {
            f |= BIT_FRAGMENT;
        }
        if self.is_admin_record {
            f |= BIT_ADMIN;
        }
        if self.do_not_fragment {
            f |= BIT_DO_NOT_FRAGMENT;
        }
        if self.custody_requested {
            f |= BIT_CUSTODY_REQUESTED;
        }
        if self.singleton_destination {
            f |= BIT_SINGLETON_DEST;
        }
        if self.app_acked {
            f |= BIT_APP_ACK;
        }
        f |= ((self.priority as u64) << PRIORITY_SHIFT) & PRIORITY_MASK;
        if self.status_report.on_receive {
            f |= BIT_SR_RECEIVE;
        }
        if self.status_report.custody_accept {
            f |= BIT_SR_CUSTODY_ACCEPT;
        }
        if self.status_report.forward {
            f |= BIT_SR_FORWARD;
        }
        if self.status_report.deliver {
            f |= BIT_SR_DELIVER;
        }
        if self.status_report.delete {
            f |= BIT_SR_DELETE;
        }
        f
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_bits() {
        let f = ProcessingFlags {
            is_fragment: true,
            custody_requested: true,
            priority: 2,
            status_report: StatusReportFlags {
                deliver: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(ProcessingFlags::from_u64(f.as_u64()), f);
    }

    #[test]
    fn preserves_reserved_bits() {
        let raw = (1u64 << 20) | BIT_ADMIN;
        let parsed = ProcessingFlags::from_u64(raw);
        assert!(parsed.is_admin_record);
        assert_eq!(parsed.as_u64(), raw);
    }
}
