/* Copyright (C) 2022 Antmicro
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     https://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

/* Plain value types describing where things sit on the fabric grid.
 *
 * Coordinates grow towards north (y) and east (x). A horizontal channel at
 * position (x, y) runs along the northern side of tile (x, y), a vertical
 * channel at (x, y) runs along its eastern side. */

use std::fmt;
use std::ops::{Add, AddAssign, Index, IndexMut, Neg, Sub, SubAssign};

use crate::error::{FabricError, Result};

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    X,
    Y,
}

impl Dimension {
    pub const ALL: [Dimension; 2] = [Dimension::X, Dimension::Y];

    pub fn perpendicular(self) -> Self {
        match self {
            Self::X => Self::Y,
            Self::Y => Self::X,
        }
    }

    pub fn is_x(self) -> bool {
        self == Self::X
    }

    pub fn is_y(self) -> bool {
        self == Self::Y
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inc,
    Dec,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Inc, Direction::Dec];

    pub fn opposite(self) -> Self {
        match self {
            Self::Inc => Self::Dec,
            Self::Dec => Self::Inc,
        }
    }

    pub fn is_inc(self) -> bool {
        self == Self::Inc
    }

    pub fn is_dec(self) -> bool {
        self == Self::Dec
    }

    /// Picks `inc` or `dec` depending on the direction.
    pub fn case<T>(self, inc: T, dec: T) -> T {
        match self {
            Self::Inc => inc,
            Self::Dec => dec,
        }
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    North,
    East,
    South,
    West,
}

impl Orientation {
    pub const ALL: [Orientation; 4] =
        [Orientation::North, Orientation::East, Orientation::South, Orientation::West];

    pub fn dimension(self) -> Dimension {
        match self {
            Self::North | Self::South => Dimension::Y,
            Self::East | Self::West => Dimension::X,
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Self::North | Self::East => Direction::Inc,
            Self::South | Self::West => Direction::Dec,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::East => Self::West,
            Self::South => Self::North,
            Self::West => Self::East,
        }
    }

    pub fn compose(dim: Dimension, dir: Direction) -> Self {
        match (dim, dir) {
            (Dimension::X, Direction::Inc) => Self::East,
            (Dimension::X, Direction::Dec) => Self::West,
            (Dimension::Y, Direction::Inc) => Self::North,
            (Dimension::Y, Direction::Dec) => Self::South,
        }
    }

    /// One tile step against the orientation, i.e. towards where a wire
    /// running in this orientation comes from.
    pub fn upstream_step(self) -> Position {
        match self {
            Self::North => Position::new(0, -1),
            Self::East => Position::new(-1, 0),
            Self::South => Position::new(0, 1),
            Self::West => Position::new(1, 0),
        }
    }

    /// First letter of the name, used in node and box names.
    pub fn initial(self) -> char {
        match self {
            Self::North => 'n',
            Self::East => 'e',
            Self::South => 's',
            Self::West => 'w',
        }
    }

    pub fn is_north(self) -> bool {
        self == Self::North
    }

    pub fn is_east(self) -> bool {
        self == Self::East
    }

    pub fn is_south(self) -> bool {
        self == Self::South
    }

    pub fn is_west(self) -> bool {
        self == Self::West
    }

    fn index(self) -> usize {
        match self {
            Self::North => 0,
            Self::East => 1,
            Self::South => 2,
            Self::West => 3,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::North => "north",
            Self::East => "east",
            Self::South => "south",
            Self::West => "west",
        };
        write!(f, "{}", name)
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corner {
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl Corner {
    pub const ALL: [Corner; 4] =
        [Corner::NorthEast, Corner::NorthWest, Corner::SouthEast, Corner::SouthWest];

    pub fn from_directions(x: Direction, y: Direction) -> Self {
        match (x, y) {
            (Direction::Inc, Direction::Inc) => Self::NorthEast,
            (Direction::Dec, Direction::Inc) => Self::NorthWest,
            (Direction::Inc, Direction::Dec) => Self::SouthEast,
            (Direction::Dec, Direction::Dec) => Self::SouthWest,
        }
    }

    /// Builds the corner lying between two perpendicular orientations.
    ///
    /// # Arguments
    /// * `a`, `b` - orientations in different dimensions, in any order
    pub fn compose(a: Orientation, b: Orientation) -> Result<Self> {
        let (x, y) = match (a.dimension(), b.dimension()) {
            (Dimension::X, Dimension::Y) => (a, b),
            (Dimension::Y, Dimension::X) => (b, a),
            _ => return Err(FabricError::config(format!(
                "cannot compose a corner from {} and {}", a, b
            ))),
        };
        Ok(Self::from_directions(x.direction(), y.direction()))
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::NorthEast => Self::SouthWest,
            Self::NorthWest => Self::SouthEast,
            Self::SouthEast => Self::NorthWest,
            Self::SouthWest => Self::NorthEast,
        }
    }

    /// Returns `(x-orientation, y-orientation)`.
    pub fn decompose(self) -> (Orientation, Orientation) {
        (self.component(Dimension::X), self.component(Dimension::Y))
    }

    /// The orientation this corner points to in `dim`.
    pub fn component(self, dim: Dimension) -> Orientation {
        Orientation::compose(dim, self.dotx(dim))
    }

    /// The direction this corner points to in `dim`.
    pub fn dotx(self, dim: Dimension) -> Direction {
        match (self, dim) {
            (Self::NorthEast, _) => Direction::Inc,
            (Self::SouthWest, _) => Direction::Dec,
            (Self::NorthWest, Dimension::X) | (Self::SouthEast, Dimension::Y) => Direction::Dec,
            (Self::NorthWest, Dimension::Y) | (Self::SouthEast, Dimension::X) => Direction::Inc,
        }
    }

    /// Next corner when walking around a grid vertex: NE -> SE -> SW -> NW -> NE.
    pub fn next_around_vertex(self) -> Self {
        match self {
            Self::NorthEast => Self::SouthEast,
            Self::NorthWest => Self::NorthEast,
            Self::SouthEast => Self::SouthWest,
            Self::SouthWest => Self::NorthWest,
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Self::NorthEast => "ne",
            Self::NorthWest => "nw",
            Self::SouthEast => "se",
            Self::SouthWest => "sw",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::NorthEast => 0,
            Self::NorthWest => 1,
            Self::SouthEast => 2,
            Self::SouthWest => 3,
        }
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// A grid position. Descriptions may write it as `[x, y]` or `{x: .., y: ..}`.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "PositionRepr")]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PositionRepr {
    Pair(i32, i32),
    Named { x: i32, y: i32 },
}

impl From<PositionRepr> for Position {
    fn from(repr: PositionRepr) -> Self {
        match repr {
            PositionRepr::Pair(x, y) | PositionRepr::Named { x, y } => Self { x, y },
        }
    }
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const ORIGIN: Position = Position::new(0, 0);

    pub fn within(self, width: u32, height: u32) -> bool {
        0 <= self.x && self.x < width as i32 && 0 <= self.y && self.y < height as i32
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Position {
    fn add_assign(&mut self, rhs: Position) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Position {
    fn sub_assign(&mut self, rhs: Position) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Neg for Position {
    type Output = Position;

    fn neg(self) -> Position {
        Position::new(-self.x, -self.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Index of a block instance inside a tile.
pub type Subtile = u32;

/// One value per orientation.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrientationTuple<T> {
    pub north: T,
    pub east: T,
    pub south: T,
    pub west: T,
}

impl<T: Clone> OrientationTuple<T> {
    pub fn splat(value: T) -> Self {
        Self {
            north: value.clone(),
            east: value.clone(),
            south: value.clone(),
            west: value,
        }
    }
}

impl OrientationTuple<bool> {
    pub fn from_orientations<'a, I>(oris: I) -> Self where
        I: IntoIterator<Item = &'a Orientation>
    {
        let mut tuple = Self::splat(false);
        for ori in oris {
            tuple[*ori] = true;
        }
        tuple
    }

    pub fn all(&self) -> bool {
        self.north && self.east && self.south && self.west
    }

    pub fn any(&self) -> bool {
        self.north || self.east || self.south || self.west
    }
}

impl<T> Index<Orientation> for OrientationTuple<T> {
    type Output = T;

    fn index(&self, ori: Orientation) -> &T {
        match ori.index() {
            0 => &self.north,
            1 => &self.east,
            2 => &self.south,
            _ => &self.west,
        }
    }
}

impl<T> IndexMut<Orientation> for OrientationTuple<T> {
    fn index_mut(&mut self, ori: Orientation) -> &mut T {
        match ori.index() {
            0 => &mut self.north,
            1 => &mut self.east,
            2 => &mut self.south,
            _ => &mut self.west,
        }
    }
}

#[cfg(test)]
mod tests;
