//! Regions of the 64-bit ring identifier space.

use crate::error::{Error, Result};
use crate::types::RingCoordinate;
use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Size of the whole identifier space.
pub const RING_SIZE: u128 = 1 << 64;

/// An inclusive span `[start, end]` of ring coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RingRegion {
    start: RingCoordinate,
    end: RingCoordinate,
}

impl RingRegion {
    /// Create a region; `start` must not exceed `end`.
    pub fn new(start: RingCoordinate, end: RingCoordinate) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidRing(format!(
                "region start {} exceeds end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// The whole identifier space.
    pub fn full() -> Self {
        Self {
            start: 0,
            end: RingCoordinate::MAX,
        }
    }

    /// A region holding a single coordinate.
    pub fn point(coordinate: RingCoordinate) -> Self {
        Self {
            start: coordinate,
            end: coordinate,
        }
    }

    pub fn start(&self) -> RingCoordinate {
        self.start
    }

    pub fn end(&self) -> RingCoordinate {
        self.end
    }

    /// Number of coordinates in the region. Never zero.
    pub fn size(&self) -> u128 {
        (self.end - self.start) as u128 + 1
    }

    pub fn contains(&self, coordinate: RingCoordinate) -> bool {
        self.start <= coordinate && coordinate <= self.end
    }

    pub fn overlaps(&self, other: &RingRegion) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn intersection(&self, other: &RingRegion) -> Option<RingRegion> {
        if !self.overlaps(other) {
            return None;
        }
        Some(RingRegion {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }

    /// Whether `other` lies entirely within this region.
    pub fn encloses(&self, other: &RingRegion) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// The coordinate `offset` positions after the start.
    pub(crate) fn coordinate_at(&self, offset: u128) -> RingCoordinate {
        debug_assert!(offset < self.size());
        (self.start as u128 + offset) as RingCoordinate
    }

    /// Region covering offsets `[from, to)` relative to the start.
    pub(crate) fn sub_region(&self, from: u128, to: u128) -> RingRegion {
        debug_assert!(from < to && to <= self.size());
        RingRegion {
            start: self.coordinate_at(from),
            end: self.coordinate_at(to - 1),
        }
    }
}

impl PartialOrd for RingRegion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Regions order by start position, then by end.
impl Ord for RingRegion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.end.cmp(&other.end))
    }
}

impl std::fmt::Display for RingRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:016x}, {:016x}]", self.start, self.end)
    }
}

/// Map a key onto the ring using xxHash64.
pub fn coordinate_of(key: &[u8]) -> RingCoordinate {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(key);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_region_size() {
        assert_eq!(RingRegion::full().size(), RING_SIZE);
        assert_eq!(RingRegion::point(7).size(), 1);
    }

    #[test]
    fn test_invalid_region() {
        assert!(RingRegion::new(5, 4).is_err());
        assert!(RingRegion::new(4, 4).is_ok());
    }

    #[test]
    fn test_intersection() {
        let a = RingRegion::new(0, 99).unwrap();
        let b = RingRegion::new(50, 149).unwrap();
        let c = RingRegion::new(100, 120).unwrap();

        assert_eq!(a.intersection(&b), Some(RingRegion::new(50, 99).unwrap()));
        assert_eq!(a.intersection(&c), None);
        assert!(b.encloses(&c));
        assert!(!a.encloses(&b));
    }

    #[test]
    fn test_sub_region_offsets() {
        let region = RingRegion::new(100, 199).unwrap();
        assert_eq!(region.sub_region(0, 10), RingRegion::new(100, 109).unwrap());
        assert_eq!(region.sub_region(90, 100), RingRegion::new(190, 199).unwrap());
    }

    #[test]
    fn test_ordering_by_start() {
        let mut regions = vec![
            RingRegion::new(20, 29).unwrap(),
            RingRegion::new(0, 9).unwrap(),
            RingRegion::new(10, 19).unwrap(),
        ];
        regions.sort();
        let starts: Vec<_> = regions.iter().map(|r| r.start()).collect();
        assert_eq!(starts, vec![0, 10, 20]);
    }

    #[test]
    fn test_coordinate_is_stable() {
        assert_eq!(coordinate_of(b"user:123"), coordinate_of(b"user:123"));
        assert_ne!(coordinate_of(b"user:123"), coordinate_of(b"user:124"));
    }

    #[test]
    fn test_coordinate_hashes_raw_bytes() {
        // No length prefix, so the value is the same on every pointer width.
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(b"user:123");
        assert_eq!(coordinate_of(b"user:123"), hasher.finish());
        assert_eq!(coordinate_of(b""), XxHash64::with_seed(0).finish());
    }
}
