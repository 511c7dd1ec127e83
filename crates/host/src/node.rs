//! Resource handles and geometry shared by the host and the core.

use serde::Serialize;

/// A stable 64-bit key for a node owned by the host document.
///
/// The core never owns nodes; it only stores their keys. Whether a key still
/// refers to a live node is always answered by the host.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
pub struct NodeKey(pub u64);

impl NodeKey {
    /// The document root (always present, always attached).
    pub const ROOT: Self = Self(0);

    /// Raw key value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// A layout rectangle as reported by the host, in CSS pixels.
#[derive(Copy, Clone, PartialEq, Debug, Default, Serialize)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    /// Build a rectangle from its origin and size; `right` and `bottom` are derived.
    #[inline]
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
            right: left + width,
            bottom: top + height,
        }
    }

    /// True when both rectangles have the same width and height.
    ///
    /// Resize notifications only fire on size changes, not on moves.
    #[inline]
    pub fn same_size(&self, other: &Self) -> bool {
        self.width.to_bits() == other.width.to_bits()
            && self.height.to_bits() == other.height.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_derives_far_edges() {
        let rect = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert!((rect.right - 40.0).abs() < f64::EPSILON);
        assert!((rect.bottom - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn moves_keep_size() {
        let before = Rect::new(0.0, 0.0, 100.0, 50.0);
        let moved = Rect::new(25.0, 25.0, 100.0, 50.0);
        let grown = Rect::new(0.0, 0.0, 120.0, 50.0);
        assert!(before.same_size(&moved));
        assert!(!before.same_size(&grown));
    }
}
