//! Mathematical types shared between client and server.
//!
//! Positions and velocities are world units (and units per second) on a
//! flat 2D plane. These are the canonical representations used on the wire.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 2D vector - position, velocity, direction
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Point {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
}

impl Point {
    /// Creates a new point
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0);

    /// Dot product
    #[must_use]
    #[inline]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Length squared (avoids sqrt)
    #[must_use]
    #[inline]
    pub fn len_squared(self) -> f32 {
        self.dot(self)
    }

    /// Length
    #[must_use]
    #[inline]
    pub fn len(self) -> f32 {
        self.len_squared().sqrt()
    }

    /// Distance to another point
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (self - other).len()
    }

    /// Unit vector in the same direction. The zero vector stays zero.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.len();
        if len == 0.0 {
            Self::ZERO
        } else {
            self * (1.0 / len)
        }
    }

    /// Vector in the same direction with the given length.
    #[must_use]
    pub fn normalize_to(self, length: f32) -> Self {
        self.normalize() * length
    }

    /// Unit vector pointing along `angle` radians.
    #[must_use]
    pub fn from_angle(angle: f32) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    /// Angle of this vector in radians, in `(-PI, PI]`.
    #[must_use]
    pub fn angle(self) -> f32 {
        self.y.atan2(self.x)
    }

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 2] {
        [self.x, self.y]
    }
}

impl std::ops::Add for Point {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f32> for Point {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl std::ops::Neg for Point {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl std::ops::AddAssign for Point {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::SubAssign for Point {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl std::ops::MulAssign<f32> for Point {
    fn mul_assign(&mut self, rhs: f32) {
        self.x *= rhs;
        self.y *= rhs;
    }
}

/// Axis-aligned rectangle used for extents and spatial queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Minimum corner
    pub min: Point,
    /// Maximum corner
    pub max: Point,
}

impl Rect {
    /// Creates the smallest rectangle holding both corners, in any order.
    #[must_use]
    pub fn new(a: Point, b: Point) -> Self {
        Self {
            min: Point::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Rectangle centered on `center` reaching `half_extents` in each direction.
    #[must_use]
    pub fn around(center: Point, half_extents: Point) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Bounding rectangle of a point set. Empty input gives a zero rectangle.
    #[must_use]
    pub fn bounding(points: &[Point]) -> Self {
        let Some(first) = points.first() else {
            return Self::default();
        };
        points.iter().fold(Self::new(*first, *first), |mut rect, p| {
            rect.union_point(*p);
            rect
        })
    }

    /// Grows the rectangle by `amount` on every side.
    #[must_use]
    pub fn expand(self, amount: Point) -> Self {
        Self {
            min: self.min - amount,
            max: self.max + amount,
        }
    }

    /// Grows the rectangle to include `p`.
    pub fn union_point(&mut self, p: Point) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    /// True when `p` lies inside or on the boundary.
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// True when the two rectangles overlap or touch.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Center of the rectangle.
    #[must_use]
    pub fn center(&self) -> Point {
        (self.min + self.max) * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_zero_stays_zero() {
        assert_eq!(Point::ZERO.normalize(), Point::ZERO);
        let n = Point::new(3.0, 4.0).normalize();
        assert!((n.len() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rect_orders_corners() {
        let r = Rect::new(Point::new(5.0, -1.0), Point::new(-2.0, 3.0));
        assert_eq!(r.min, Point::new(-2.0, -1.0));
        assert_eq!(r.max, Point::new(5.0, 3.0));
        assert!(r.contains(Point::ZERO));
    }

    #[test]
    fn test_rect_intersects() {
        let a = Rect::new(Point::ZERO, Point::new(10.0, 10.0));
        let b = Rect::new(Point::new(10.0, 10.0), Point::new(20.0, 20.0));
        let c = Rect::new(Point::new(11.0, 0.0), Point::new(20.0, 5.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_bounding() {
        let r = Rect::bounding(&[Point::new(1.0, 2.0), Point::new(-3.0, 8.0), Point::new(0.0, 0.0)]);
        assert_eq!(r.min, Point::new(-3.0, 0.0));
        assert_eq!(r.max, Point::new(1.0, 8.0));
    }
}
