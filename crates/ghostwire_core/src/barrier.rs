//! Static geometry: barriers block movement, goal zones only mark regions.

use ghostwire_shared::Point;

/// Solid polygon obstacle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Barrier {
    /// Outline in winding order.
    pub points: Vec<Point>,
}

impl Barrier {
    /// Barrier with the given outline.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self { points }
    }
}

/// Non-colliding region that items can sit in.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GoalZone {
    /// Outline in winding order.
    pub points: Vec<Point>,
}

impl GoalZone {
    /// Zone with the given outline.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self { points }
    }
}
