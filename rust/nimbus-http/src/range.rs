//! `Range` header values.

use std::fmt;

/// An inclusive byte range `first..=last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    first: u64,
    last: u64,
}

impl ByteRange {
    /// The range covering `length` bytes starting at `offset`. Returns `None`
    /// for empty ranges or ranges that overflow.
    pub fn new(offset: u64, length: u64) -> Option<Self> {
        if length == 0 {
            return None;
        }
        let last = offset.checked_add(length - 1)?;
        Some(Self {
            first: offset,
            last,
        })
    }

    /// First byte offset.
    pub fn first(&self) -> u64 {
        self.first
    }

    /// Last byte offset, inclusive.
    pub fn last(&self) -> u64 {
        self.last
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.last - self.first + 1
    }

    /// Always false; empty ranges cannot be constructed.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The `Range` header value for this range alone.
    pub fn header_value(&self) -> String {
        format!("bytes={self}")
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.last)
    }
}

/// A list of ranges requested together in one multi-range GET.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteRanges {
    ranges: Vec<ByteRange>,
}

impl ByteRanges {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `length` bytes at `offset`; empty segments are skipped.
    pub fn push(&mut self, offset: u64, length: u64) -> &mut Self {
        if let Some(range) = ByteRange::new(offset, length) {
            self.ranges.push(range);
        }
        self
    }

    /// The ranges in request order.
    pub fn iter(&self) -> impl Iterator<Item = &ByteRange> {
        self.ranges.iter()
    }

    /// Number of ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether no ranges were added.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total bytes covered by all ranges.
    pub fn total_len(&self) -> u64 {
        self.ranges.iter().map(ByteRange::len).sum()
    }

    /// The `Range` header value, e.g. `bytes=0-9,100-149`. `None` when empty.
    pub fn header_value(&self) -> Option<String> {
        if self.ranges.is_empty() {
            return None;
        }
        let parts: Vec<String> = self.ranges.iter().map(ToString::to_string).collect();
        Some(format!("bytes={}", parts.join(",")))
    }
}

impl FromIterator<(u64, u64)> for ByteRanges {
    fn from_iter<I: IntoIterator<Item = (u64, u64)>>(iter: I) -> Self {
        let mut ranges = ByteRanges::new();
        for (offset, length) in iter {
            ranges.push(offset, length);
        }
        ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_formats_inclusive_ranges() {
        let range = ByteRange::new(100, 50).unwrap();
        assert_eq!(range.header_value(), "bytes=100-149");
        assert_eq!(range.len(), 50);

        assert_eq!(ByteRange::new(0, 1).unwrap().header_value(), "bytes=0-0");
    }

    #[test]
    fn it_rejects_empty_and_overflowing_ranges() {
        assert_eq!(ByteRange::new(10, 0), None);
        assert_eq!(ByteRange::new(u64::MAX, 2), None);
        assert!(ByteRange::new(u64::MAX, 1).is_some());
    }

    #[test]
    fn it_joins_multiple_ranges() {
        let ranges: ByteRanges = [(0, 10), (100, 50), (500, 0)].into_iter().collect();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges.total_len(), 60);
        assert_eq!(ranges.header_value().as_deref(), Some("bytes=0-9,100-149"));
        assert_eq!(ByteRanges::new().header_value(), None);
    }
}
