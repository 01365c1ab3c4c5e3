/// Tracks how many leading bytes of a transfer are accounted for.
///
/// §3 describes `sent_data`/`ack_data`/`rcvd_data` as "sparse bitmaps", but
/// every CL engine in §4.8-§4.10 only ever reports *cumulative* byte counts
/// (`ACK_SEGMENT`'s SDNV, `XFER_ACK`'s `acknowledged_length`) and segments
/// are written and acknowledged strictly in order — there is no mechanism
/// in any of TCPCLv3, TCPCLv4, STCP, or MTCP that could produce a hole
/// followed by later-arriving bytes. A monotonic high-water mark is
/// therefore observationally identical to a bitmap for this protocol
/// family, and is what this crate uses; `num_contiguous` and `last` below
/// are named to match the spec's bitmap vocabulary so callers read the
/// same as they would against a real sparse-bitmap implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress(u64);

impl Progress {
    pub fn new() -> Self {
        Progress(0)
    }

    /// Bytes accounted for from the start of the transfer.
    pub fn num_contiguous(&self) -> u64 {
        self.0
    }

    /// Offset one past the last accounted-for byte; `None` if nothing has
    /// been accounted for yet.
    pub fn last(&self) -> Option<u64> {
        (self.0 > 0).then_some(self.0 - 1)
    }

    /// Advances the mark to `upto`, the new cumulative count. Rejects
    /// regression: a correctly-implemented peer or sender never reports a
    /// count lower than what was already acknowledged/sent/received.
    pub fn advance_to(&mut self, upto: u64) -> crate::error::Result<()> {
        if upto < self.0 {
            return Err(crate::error::ClaError::Protocol(
                "cumulative progress count went backwards",
            ));
        }
        self.0 = upto;
        Ok(())
    }

    pub fn is_complete(&self, total_length: u64) -> bool {
        self.0 >= total_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let p = Progress::new();
        assert_eq!(p.num_contiguous(), 0);
        assert_eq!(p.last(), None);
    }

    #[test]
    fn advances_monotonically() {
        let mut p = Progress::new();
        p.advance_to(100).unwrap();
        assert_eq!(p.num_contiguous(), 100);
        assert_eq!(p.last(), Some(99));
        assert!(p.advance_to(50).is_err());
    }

    #[test]
    fn completion() {
        let mut p = Progress::new();
        p.advance_to(10).unwrap();
        assert!(!p.is_complete(20));
        p.advance_to(20).unwrap();
        assert!(p.is_complete(20));
    }
}
