/// A single `Range: bytes=...` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-end`, both inclusive
    Bounded(u64, u64),
    /// `bytes=start-`
    From(u64),
    /// `bytes=-n`, the last `n` bytes
    Suffix(u64),
}

impl ByteRange {
    /// Parses the first range of a `Range` header value. Additional ranges
    /// are ignored. Returns `None` for anything that is not a byte range.
    pub fn parse(value: &str) -> Option<Self> {
        let spec = value.trim().strip_prefix("bytes=")?;
        let first = spec.split(',').next()?.trim();
        let (start, end) = first.split_once('-')?;
        let (start, end) = (start.trim(), end.trim());
        match (start.is_empty(), end.is_empty()) {
            (true, true) => None,
            (true, false) => {
                let n = end.parse().ok()?;
                (n > 0).then_some(ByteRange::Suffix(n))
            }
            (false, true) => Some(ByteRange::From(start.parse().ok()?)),
            (false, false) => {
                let (start, end) = (start.parse().ok()?, end.parse().ok()?);
                (start <= end).then_some(ByteRange::Bounded(start, end))
            }
        }
    }

    /// First byte offset, given the best-known total size
    pub fn start(&self, total: Option<u64>) -> u64 {
        match *self {
            ByteRange::Bounded(start, _) | ByteRange::From(start) => start,
            ByteRange::Suffix(n) => total.map(|total| total.saturating_sub(n)).unwrap_or(0),
        }
    }

    /// Inclusive last byte offset. `available` is how far the data is known
    /// to reach when the total is unknown.
    pub fn end(&self, total: Option<u64>, available: u64) -> u64 {
        let last = total.unwrap_or(available).saturating_sub(1);
        match *self {
            ByteRange::Bounded(_, end) => end.min(last),
            ByteRange::From(_) | ByteRange::Suffix(_) => last,
        }
    }
}
