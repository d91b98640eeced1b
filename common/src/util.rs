//! Geometry primitives for the rectangular tile grid.

use std::fmt;
use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// The dimensions of a rectangular grid
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Dims {
    pub width: u16,
    pub height: u16,
}
impl Dims {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub fn area(self) -> u32 {
        u32::from(self.width) * u32::from(self.height)
    }

    pub fn contain(self, loc: Location) -> bool {
        loc.x < self.width && loc.y < self.height
    }

    /// Row-major index of `loc`; caller guarantees containment
    pub fn index(self, loc: Location) -> usize {
        usize::from(loc.y) * usize::from(self.width) + usize::from(loc.x)
    }

    /// All locations in row-major order
    pub fn iter_locs(self) -> impl Iterator<Item = Location> {
        let width = self.width;
        (0..self.height).flat_map(move |y| (0..width).map(move |x| Location { x, y }))
    }
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A location on the grid
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct Location {
    pub x: u16,
    pub y: u16,
}
impl Location {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance: the ranging metric for adjacency, sight, and city spacing
    pub fn distance(self, other: Location) -> u32 {
        let dx = (i32::from(self.x) - i32::from(other.x)).unsigned_abs();
        let dy = (i32::from(self.y) - i32::from(other.y)).unsigned_abs();
        dx.max(dy)
    }

    /// Offset by `inc`, staying in bounds; `wrap` lets x loop around
    pub fn shift(self, inc: Vec2d<i32>, dims: Dims, wrap: Wrap) -> Option<Location> {
        let mut x = i32::from(self.x) + inc.x;
        let y = i32::from(self.y) + inc.y;

        if y < 0 || y >= i32::from(dims.height) {
            return None;
        }

        if wrap.horiz {
            x = x.rem_euclid(i32::from(dims.width));
        } else if x < 0 || x >= i32::from(dims.width) {
            return None;
        }

        Some(Location {
            x: x as u16,
            y: y as u16,
        })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// A two-dimensional vector, useful as a grid offset
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Vec2d<T> {
    pub x: T,
    pub y: T,
}
impl<T> Vec2d<T> {
    pub const fn new(x: T, y: T) -> Self {
        Self { x, y }
    }
}
impl<T: Add<Output = T>> Add for Vec2d<T> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Vec2d::new(self.x + rhs.x, self.y + rhs.y)
    }
}
impl<T: Sub<Output = T>> Sub for Vec2d<T> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Vec2d::new(self.x - rhs.x, self.y - rhs.y)
    }
}
impl<T: Mul<Output = T> + Copy> Mul<T> for Vec2d<T> {
    type Output = Self;
    fn mul(self, rhs: T) -> Self {
        Vec2d::new(self.x * rhs, self.y * rhs)
    }
}

/// Horizontal wrapping policy; vertical wrap is never allowed (the poles are hard edges)
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Wrap {
    pub horiz: bool,
}
impl Wrap {
    pub const NEITHER: Wrap = Wrap { horiz: false };
    pub const HORIZ: Wrap = Wrap { horiz: true };
}

/// The eight compass directions
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    pub const fn values() -> [Direction; 8] {
        [
            Direction::North,
            Direction::NorthEast,
            Direction::East,
            Direction::SouthEast,
            Direction::South,
            Direction::SouthWest,
            Direction::West,
            Direction::NorthWest,
        ]
    }

    /// The four cardinal directions, the only ones rivers flow along
    pub const fn cardinals() -> [Direction; 4] {
        [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
        ]
    }

    /// North is negative y; the grid origin sits at the top-left
    pub fn vec2d(self) -> Vec2d<i32> {
        match self {
            Direction::North => Vec2d::new(0, -1),
            Direction::NorthEast => Vec2d::new(1, -1),
            Direction::East => Vec2d::new(1, 0),
            Direction::SouthEast => Vec2d::new(1, 1),
            Direction::South => Vec2d::new(0, 1),
            Direction::SouthWest => Vec2d::new(-1, 1),
            Direction::West => Vec2d::new(-1, 0),
            Direction::NorthWest => Vec2d::new(-1, -1),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::NorthEast => Direction::SouthWest,
            Direction::East => Direction::West,
            Direction::SouthEast => Direction::NorthWest,
            Direction::South => Direction::North,
            Direction::SouthWest => Direction::NorthEast,
            Direction::West => Direction::East,
            Direction::NorthWest => Direction::SouthEast,
        }
    }

    /// River-mask bit for cardinal directions
    pub fn river_bit(self) -> Option<u8> {
        match self {
            Direction::North => Some(1),
            Direction::East => Some(2),
            Direction::South => Some(4),
            Direction::West => Some(8),
            _ => None,
        }
    }
}
