//! Frame and sub-frame arithmetic.
//!
//! Motion-blur sampling works in offsets relative to the current frame
//! (`-0.25`, `0.0`, `0.25`, ...). The host only understands an integer
//! frame plus a fractional sub-frame in `[0, 1)`, so offsets are split
//! with floor/frac before being handed to the host.

use std::cmp::Ordering;
use std::fmt;

/// Offsets closer than this are treated as the same motion step.
const SUBFRAME_QUANTUM: f32 = 1.0e-6;

/// A sub-frame time offset relative to the current frame.
///
/// Totally ordered so it can live in `BTreeSet`s. Values are quantized on
/// construction so offsets computed for different segment counts that land
/// on the same time compare equal.
#[derive(Clone, Copy, Debug)]
pub struct Subframe(f32);

impl Subframe {
    pub fn new(offset: f32) -> Self {
        let q = (offset / SUBFRAME_QUANTUM).round() * SUBFRAME_QUANTUM;
        // Normalize -0.0 so it hashes and orders with 0.0
        Self(if q == 0.0 { 0.0 } else { q })
    }

    pub fn offset(self) -> f32 {
        self.0
    }
}

impl PartialEq for Subframe {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Subframe {}

impl PartialOrd for Subframe {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Subframe {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::hash::Hash for Subframe {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Subframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+.4}", self.0)
    }
}

/// An integer frame plus a fractional sub-frame in `[0, 1)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTime {
    pub frame: i32,
    pub subframe: f32,
}

impl FrameTime {
    pub fn new(frame: i32, subframe: f32) -> Self {
        Self { frame, subframe }
    }

    /// Split `original + offset` into frame and sub-frame.
    ///
    /// `from_offset(10, -0.25)` is frame 9, sub-frame 0.75.
    pub fn from_offset(original: i32, offset: Subframe) -> Self {
        let offset = offset.offset();
        let whole = offset.floor();
        Self {
            frame: original + whole as i32,
            subframe: offset - whole,
        }
    }

    /// Absolute time as a float frame number.
    pub fn as_f32(&self) -> f32 {
        self.frame as f32 + self.subframe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_negative_offset_borrows_previous_frame() {
        let t = FrameTime::from_offset(10, Subframe::new(-0.25));
        assert_eq!(t.frame, 9);
        assert!((t.subframe - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_positive_offset_stays_on_frame() {
        let t = FrameTime::from_offset(10, Subframe::new(0.25));
        assert_eq!(t.frame, 10);
        assert!((t.subframe - 0.25).abs() < 1e-6);
        assert!((t.as_f32() - 10.25).abs() < 1e-6);
    }

    #[test]
    fn test_zero_offset() {
        let t = FrameTime::from_offset(3, Subframe::new(-0.0));
        assert_eq!(t, FrameTime::new(3, 0.0));
    }

    #[test]
    fn test_subframe_set_merges_near_equal() {
        let mut set = BTreeSet::new();
        set.insert(Subframe::new(0.25));
        set.insert(Subframe::new(0.250_000_01));
        set.insert(Subframe::new(-0.25));
        set.insert(Subframe::new(0.0));
        set.insert(Subframe::new(-0.0));

        let offsets: Vec<f32> = set.iter().map(|s| s.offset()).collect();
        assert_eq!(offsets.len(), 3);
        assert!(offsets[0] < offsets[1] && offsets[1] < offsets[2]);
    }
}
