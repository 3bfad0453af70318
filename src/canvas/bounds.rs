use serde::{Deserialize, Serialize};

use crate::domain::task::Position;

/// Axis-aligned rectangle in logical canvas coordinates. Edges are closed:
/// two boxes that only touch still intersect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Bounds {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn from_origin_size(origin: Position, width: f64, height: f64) -> Self {
        Self {
            left: origin.x,
            top: origin.y,
            right: origin.x + width,
            bottom: origin.y + height,
        }
    }

    /// Normalised rectangle spanning two arbitrary corners.
    pub fn from_corners(a: Position, b: Position) -> Self {
        Self {
            left: a.x.min(b.x),
            top: a.y.min(b.y),
            right: a.x.max(b.x),
            bottom: a.y.max(b.y),
        }
    }

    pub fn around_point(point: Position, radius: f64) -> Self {
        Self {
            left: point.x - radius,
            top: point.y - radius,
            right: point.x + radius,
            bottom: point.y + radius,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn center(&self) -> Position {
        Position::new((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        !(self.right < other.left
            || self.left > other.right
            || self.bottom < other.top
            || self.top > other.bottom)
    }

    pub fn contains_point(&self, point: Position) -> bool {
        point.x >= self.left && point.x <= self.right && point.y >= self.top && point.y <= self.bottom
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    pub fn expand(&self, amount: f64) -> Bounds {
        Bounds {
            left: self.left - amount,
            top: self.top - amount,
            right: self.right + amount,
            bottom: self.bottom + amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touching_boxes_intersect() {
        let a = Bounds::new(0.0, 0.0, 10.0, 10.0);
        let b = Bounds::new(10.0, 10.0, 20.0, 20.0);
        let c = Bounds::new(10.1, 0.0, 20.0, 10.0);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_from_corners_normalises() {
        let b = Bounds::from_corners(Position::new(50.0, -5.0), Position::new(-10.0, 30.0));
        assert_eq!(b, Bounds::new(-10.0, -5.0, 50.0, 30.0));
        assert_eq!(b.width(), 60.0);
        assert_eq!(b.height(), 35.0);
    }

    #[test]
    fn test_union_and_expand() {
        let a = Bounds::new(0.0, 0.0, 10.0, 10.0);
        let b = Bounds::new(-5.0, 5.0, 3.0, 40.0);
        assert_eq!(a.union(&b), Bounds::new(-5.0, 0.0, 10.0, 40.0));
        assert_eq!(a.expand(2.0), Bounds::new(-2.0, -2.0, 12.0, 12.0));
        assert!(a.contains_point(Position::new(10.0, 0.0)));
        assert!(!a.contains_point(Position::new(10.5, 0.0)));
    }
}
