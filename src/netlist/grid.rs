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

use crate::error::{FabricError, Result};
use crate::geometry::*;
use super::InstanceKey;

/// Content of one placement slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Instance(InstanceKey),
    /// Covered by a larger tile/array; the root cell is at `position - offset`
    RootOffset(Position),
}

impl Default for Cell {
    fn default() -> Self {
        Cell::Empty
    }
}

/// Placement grid of an array: one center slot and four corner slots per cell.
#[derive(Clone, Debug)]
pub struct Grid {
    width: u32,
    height: u32,
    tiles: Vec<Cell>,
    sboxes: Vec<[Cell; 4]>,
}

impl Grid {
    pub fn new(width: u32, height: u32) -> Self {
        let cells = (width * height) as usize;
        Self {
            width,
            height,
            tiles: vec![Cell::Empty; cells],
            sboxes: vec![[Cell::Empty; 4]; cells],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, pos: Position) -> Option<usize> {
        if pos.within(self.width, self.height) {
            Some(pos.x as usize * self.height as usize + pos.y as usize)
        } else {
            None
        }
    }

    /// Raw slot content, `None` when out of bounds.
    pub fn cell(&self, pos: Position, corner: Option<Corner>) -> Option<Cell> {
        let idx = self.index(pos)?;
        Some(match corner {
            None => self.tiles[idx],
            Some(corner) => self.sboxes[idx][corner.index()],
        })
    }

    /// Key of the instance occupying a slot, following back-offsets. A
    /// corner slot covered by a tile/array resolves to that tile/array.
    pub fn get_root(&self, pos: Position, corner: Option<Corner>) -> Option<InstanceKey> {
        match self.cell(pos, corner)? {
            Cell::Empty => None,
            Cell::Instance(key) => Some(key),
            Cell::RootOffset(offset) => match self.cell(pos - offset, None)? {
                Cell::Instance(key) => Some(key),
                _ => None,
            },
        }
    }

    /// Writes a slot. Overwriting a non-empty slot is an error.
    pub fn set(&mut self, pos: Position, corner: Option<Corner>, cell: Cell) -> Result<()> {
        let idx = self.index(pos).ok_or_else(|| FabricError::placement(format!(
            "{} is outside of a {}x{} grid", pos, self.width, self.height
        )))?;
        let slot = match corner {
            None => &mut self.tiles[idx],
            Some(corner) => &mut self.sboxes[idx][corner.index()],
        };
        if *slot != Cell::Empty {
            return Err(FabricError::placement(format!(
                "slot {} {} is already occupied",
                pos, corner.map(|c| c.short_name()).unwrap_or("center")
            )));
        }
        *slot = cell;
        Ok(())
    }

    /// Iterates over non-empty slots as `(position, corner, cell)`.
    pub fn occupied(&self) -> impl Iterator<Item = (Position, Option<Corner>, Cell)> + '_ {
        (0 .. self.width as i32)
            .flat_map(move |x| (0 .. self.height as i32).map(move |y| Position::new(x, y)))
            .flat_map(move |pos| {
                std::iter::once(None)
                    .chain(Corner::ALL.iter().copied().map(Some))
                    .filter_map(move |corner| match self.cell(pos, corner) {
                        Some(Cell::Empty) | None => None,
                        Some(cell) => Some((pos, corner, cell)),
                    })
            })
    }
}
