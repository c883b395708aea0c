use std::fmt;

//===========================================================================//

/// Represents a half-open range of bus addresses, `[start, end)`.  Unlike a
/// linker's view of memory, the range may be empty.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Range {
    start: u64,
    end: u64,
}

impl Range {
    /// The empty range starting at address zero.
    pub const EMPTY: Range = Range { start: 0, end: 0 };

    /// Returns the range that starts at `start` and covers `len` addresses,
    /// or `None` if the end of the range would overflow.
    pub fn with_len(start: u64, len: u64) -> Option<Range> {
        start.checked_add(len).map(|end| Range { start, end })
    }

    /// Returns the range `[start, end)`.
    ///
    /// Panics if `end < start`.
    pub fn with_bounds(start: u64, end: u64) -> Range {
        assert!(start <= end);
        Range { start, end }
    }

    /// Returns the first address in the range.
    pub fn start(self) -> u64 {
        self.start
    }

    /// Returns the address one past the end of the range.
    pub fn end(self) -> u64 {
        self.end
    }

    /// Returns the number of distinct addresses in this range.
    pub fn len(self) -> u64 {
        self.end - self.start
    }

    /// Returns true if this range contains no addresses.
    pub fn is_empty(self) -> bool {
        self.start == self.end
    }

    /// Returns true if this range contains `addr`.
    pub fn contains(self, addr: u64) -> bool {
        (self.start..self.end).contains(&addr)
    }

    /// Returns true if `self` contains all addresses in `other`.
    pub fn is_superset(self, other: Range) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    /// Returns the addresses shared by both ranges, if there are any.
    pub fn intersection(self, other: Range) -> Option<Range> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end { Some(Range { start, end }) } else { None }
    }

    /// Returns true if the two ranges share at least one address.
    pub fn overlaps(self, other: Range) -> bool {
        self.intersection(other).is_some()
    }

    /// Returns the number of addresses in this range at or after `addr`, or
    /// `None` if `addr` is not within the range.
    pub fn remaining_from(self, addr: u64) -> Option<u64> {
        if self.contains(addr) { Some(self.end - addr) } else { None }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:08x}, 0x{:08x})", self.start, self.end)
    }
}

//===========================================================================//

#[cfg(test)]
mod tests {
    use super::Range;

    #[test]
    fn range_contains() {
        let range = Range::with_len(0x2000_0000, 0x2_0000).unwrap();
        assert!(!range.contains(0x1fff_ffff));
        assert!(range.contains(0x2000_0000));
        assert!(range.contains(0x2001_ffff));
        assert!(!range.contains(0x2002_0000));
        assert!(!Range::EMPTY.contains(0));
    }

    #[test]
    fn range_with_len_overflow() {
        assert_eq!(Range::with_len(u64::MAX, 1), None);
        assert_eq!(
            Range::with_len(u64::MAX, 0),
            Some(Range::with_bounds(u64::MAX, u64::MAX))
        );
    }

    #[test]
    fn range_overlaps() {
        let flash = Range::with_len(0x0800_0000, 0x8_0000).unwrap();
        let ram = Range::with_len(0x2000_0000, 0x2_0000).unwrap();
        let ccm = Range::with_len(0x2001_0000, 0x1_0000).unwrap();
        assert!(!flash.overlaps(ram));
        assert!(ram.overlaps(ccm));
        assert_eq!(
            ram.intersection(ccm),
            Some(Range::with_bounds(0x2001_0000, 0x2002_0000))
        );
        assert!(ram.is_superset(ccm));
        assert!(!ccm.is_superset(ram));
    }

    #[test]
    fn range_remaining() {
        let ram = Range::with_len(0x2000_0000, 0x2_0000).unwrap();
        assert_eq!(ram.remaining_from(0x2000_0000), Some(0x2_0000));
        assert_eq!(ram.remaining_from(0x2001_ffff), Some(1));
        assert_eq!(ram.remaining_from(0x2002_0000), None);
        assert_eq!(ram.len(), 0x2_0000);
        assert_eq!(ram.to_string(), "[0x20000000, 0x20020000)");
    }
}

//===========================================================================//
