//! Stay-interval records and block positions.
//!
//! A [`StayInterval`] is the unit of history: one entity, one world, one
//! anchor position, and the span of time the entity was seen near it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned to an interval by the store that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntervalId(pub i64);

impl fmt::Display for IntervalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Integer block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The block containing the given world coordinates.
    ///
    /// Coordinates are floored, so `-0.5` lands in block `-1`.
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: x.floor() as i32,
            y: y.floor() as i32,
            z: z.floor() as i32,
        }
    }

    /// Squared Euclidean distance, computed in 64 bits.
    pub fn distance_squared(&self, other: &Position) -> u128 {
        let axis = |a: i32, b: i32| u128::from((i64::from(a) - i64::from(b)).unsigned_abs()).pow(2);
        axis(self.x, other.x) + axis(self.y, other.y) + axis(self.z, other.z)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A persisted record of time one entity spent near one anchor position.
///
/// `stop` is never earlier than `start`. Records carry no open/closed flag:
/// which interval is open for an entity is decided by the
/// [`SessionTracker`](crate::tracker::SessionTracker) alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayInterval {
    /// Store-assigned identifier.
    pub id: IntervalId,

    /// Tracked entity (player name).
    pub entity: String,

    /// World the entity occupied.
    pub world: String,

    /// Anchor position, recorded when the interval was opened.
    pub position: Position,

    /// Seconds since epoch when the interval was opened.
    pub start: i64,

    /// Seconds since epoch of the latest sample that extended the interval.
    pub stop: i64,
}

impl StayInterval {
    /// Seconds between the first and the latest sample.
    pub fn duration_secs(&self) -> i64 {
        self.stop - self.start
    }
}
