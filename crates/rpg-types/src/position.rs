//! Grid coordinate types — positions, directions, rectangles.
//!
//! The world is a square grid per dungeon level. `Position` is an immutable
//! value; movement produces a new `Position` via `Direction::offset`.

use serde::{Deserialize, Serialize};

/// A location on the grid: column, row, dungeon level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub level: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32, level: i32) -> Self {
        Self { x, y, level }
    }

    /// The position one step in `dir`, same level. Does not bounds-check.
    pub fn step(self, dir: Direction) -> Self {
        let (dx, dy) = dir.offset();
        Self {
            x: self.x + dx,
            y: self.y + dy,
            level: self.level,
        }
    }

    /// Euclidean distance ignoring level.
    pub fn distance(self, other: Self) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Chebyshev distance — number of 8-way steps between two positions.
    pub fn steps(self, other: Self) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        dx.max(dy)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{},L{})", self.x, self.y, self.level)
    }
}

/// Eight-way movement direction. Wire form is the compass short code
/// ("n", "ne", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    N,
    S,
    E,
    W,
    Ne,
    Nw,
    Se,
    Sw,
}

impl Direction {
    pub const ALL: [Self; 8] = [
        Self::N,
        Self::S,
        Self::E,
        Self::W,
        Self::Ne,
        Self::Nw,
        Self::Se,
        Self::Sw,
    ];

    /// Grid offset (dx, dy). North is −y.
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Self::N => (0, -1),
            Self::S => (0, 1),
            Self::E => (1, 0),
            Self::W => (-1, 0),
            Self::Ne => (1, -1),
            Self::Nw => (-1, -1),
            Self::Se => (1, 1),
            Self::Sw => (-1, 1),
        }
    }
}

/// Inclusive axis-aligned rectangle: `[min_x, max_x] × [min_y, max_y]`.
///
/// Spatial index bounds are inclusive on both ends — a world of width W
/// covers `[0, W-1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Rect {
    pub const fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The rect covering a whole `w × h` world.
    pub const fn world(w: i32, h: i32) -> Self {
        Self::new(0, 0, w - 1, h - 1)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn width(&self) -> i32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y + 1
    }

    /// Smallest rect containing the circle at (`cx`, `cy`) with radius `r`.
    pub fn around(cx: i32, cy: i32, r: i32) -> Self {
        Self::new(cx - r, cy - r, cx + r, cy + r)
    }

    /// Squared distance from a point to the nearest point of this rect.
    /// Zero when the point is inside.
    pub fn distance_sq_to(&self, x: i32, y: i32) -> f64 {
        let dx = if x < self.min_x {
            (self.min_x - x) as f64
        } else if x > self.max_x {
            (x - self.max_x) as f64
        } else {
            0.0
        };
        let dy = if y < self.min_y {
            (self.min_y - y) as f64
        } else if y > self.max_y {
            (y - self.max_y) as f64
        } else {
            0.0
        };
        dx * dx + dy * dy
    }
}
