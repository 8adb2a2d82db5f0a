//! Range planning for segmented object transfers
//!
//! Splits an object of known size into fixed-size segments, each fetched by
//! one range request. Ranges are inclusive on both ends because that is how
//! the object-store range protocol expresses them.

use serde::{Deserialize, Serialize};

/// One contiguous byte range of the source object
///
/// `first..=last` in object offsets; `index` is the segment's position in
/// planner order, which is also its emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    /// Segment index, counted from zero
    pub index: u64,
    /// First byte offset covered by this segment
    pub first: u64,
    /// Last byte offset covered by this segment (inclusive)
    pub last: u64,
}

impl ByteRange {
    /// Number of bytes in this range
    pub fn len(&self) -> u64 {
        self.last - self.first + 1
    }

    /// A range always covers at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Header value for an inclusive HTTP range request
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.first, self.last)
    }
}

/// Produces the ordered sequence of segments covering an object
///
/// Segment `n` covers `[n*Z, min((n+1)*Z, S))` for object size `S` and
/// segment size `Z`. A zero-size object yields no segments.
#[derive(Debug, Clone, Copy)]
pub struct RangePlanner {
    object_size: u64,
    segment_size: u64,
}

impl RangePlanner {
    /// Create a planner for an object of `object_size` bytes split into
    /// `segment_size`-byte segments.
    ///
    /// # Panics
    ///
    /// Panics if `segment_size` is zero; callers validate configuration
    /// before the planner is built.
    pub fn new(object_size: u64, segment_size: u64) -> Self {
        assert!(segment_size > 0, "segment size must be positive");
        Self {
            object_size,
            segment_size,
        }
    }

    /// Total number of segments, `ceil(object_size / segment_size)`
    pub fn segment_count(&self) -> u64 {
        self.object_size.div_ceil(self.segment_size)
    }

    /// The range covered by segment `index`
    ///
    /// Returns `None` past the end of the object.
    pub fn segment(&self, index: u64) -> Option<ByteRange> {
        let first = index.checked_mul(self.segment_size)?;
        if first >= self.object_size {
            return None;
        }
        let last = (first + self.segment_size - 1).min(self.object_size - 1);
        Some(ByteRange { index, first, last })
    }

    /// Lazy iterator over all segments in ascending index order
    pub fn iter(&self) -> impl Iterator<Item = ByteRange> + '_ {
        (0..self.segment_count()).map(|n| {
            self.segment(n)
                .expect("segment index within count is always valid")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_object_has_no_segments() {
        let planner = RangePlanner::new(0, 4);
        assert_eq!(planner.segment_count(), 0);
        assert_eq!(planner.iter().count(), 0);
        assert!(planner.segment(0).is_none());
    }

    #[test]
    fn ten_bytes_in_fours() {
        // 10 bytes with Z = 4 splits as 0-3, 4-7, 8-9
        let planner = RangePlanner::new(10, 4);
        let ranges: Vec<_> = planner.iter().collect();
        assert_eq!(ranges.len(), 3);
        assert_eq!((ranges[0].first, ranges[0].last), (0, 3));
        assert_eq!((ranges[1].first, ranges[1].last), (4, 7));
        assert_eq!((ranges[2].first, ranges[2].last), (8, 9));
        assert_eq!(ranges[2].len(), 2);
    }

    #[test]
    fn single_segment_when_object_fits() {
        let planner = RangePlanner::new(100, 1024);
        assert_eq!(planner.segment_count(), 1);
        let only = planner.segment(0).unwrap();
        assert_eq!((only.first, only.last), (0, 99));
        assert_eq!(only.len(), 100);
    }

    #[test]
    fn exact_multiple_has_no_tail() {
        let planner = RangePlanner::new(12, 4);
        assert_eq!(planner.segment_count(), 3);
        let last = planner.segment(2).unwrap();
        assert_eq!(last.len(), 4);
    }

    #[test]
    fn ranges_are_contiguous_and_cover_the_object() {
        let planner = RangePlanner::new(10_000_000, 3_000_000);
        let ranges: Vec<_> = planner.iter().collect();
        assert_eq!(ranges.first().unwrap().first, 0);
        assert_eq!(ranges.last().unwrap().last, 9_999_999);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].last + 1, pair[1].first);
        }
        let total: u64 = ranges.iter().map(|r| r.len()).sum();
        assert_eq!(total, 10_000_000);
    }

    #[test]
    fn header_value_is_inclusive() {
        let range = ByteRange {
            index: 2,
            first: 8,
            last: 9,
        };
        assert_eq!(range.header_value(), "bytes=8-9");
    }

    #[test]
    fn indices_match_planner_order() {
        let planner = RangePlanner::new(1000, 64);
        for (expected, range) in planner.iter().enumerate() {
            assert_eq!(range.index, expected as u64);
        }
    }
}
