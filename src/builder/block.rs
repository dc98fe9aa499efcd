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

/* Logic and IO block interfaces. Only the ports matter here: where they sit
 * on the block and which side they face decides which connection box
 * serves them. */

use crate::context::Context;
use crate::error::{FabricError, Result};
use crate::geometry::*;
use crate::log::*;
use crate::netlist::*;
use crate::node::{BlockPortRef, GlobalIdx};

fn add_block_port(
    ctx: &mut Context,
    block: ModelId,
    mut port: Port,
    pin: BlockPinInfo
) -> Result<BlockPortRef> {
    let m = ctx.db.module(block);
    if port.width == 0 {
        return Err(FabricError::config(format!("port '{}' of {} has zero width", port.name, m)));
    }
    if m.ports().values().any(|p| p.name == port.name) {
        return Err(FabricError::config(format!(
            "port '{}' is already created in {}", port.name, m
        )));
    }
    let idx = m.ports().len() as u32;
    port.pin = Some(pin);
    dbg_log!(DBG_EXTRA, "Adding port {} to {} at {} facing {:?}",
        port.name, m, pin.position, pin.orientation);
    ctx.db.module_mut(block).add_port(PortKey::Block(idx), port)?;
    Ok(BlockPortRef { block, port: idx })
}

fn global_port(ctx: &Context, global: GlobalIdx, name: Option<&str>) -> Port {
    let g = ctx.global(global);
    let mut port = Port::new(
        name.unwrap_or(&g.name).to_string(),
        g.width,
        PortDirection::Input
    );
    port.global = Some(global);
    port
}

/* Position of a logic-block port facing `ori`. When not given it can only be
 * derived for a side that is one cell long. */
fn resolve_position(block: &Module, ori: Orientation, position: Option<Position>) -> Result<Position> {
    let (w, h) = (block.width as i32, block.height as i32);
    let position = match position {
        Some(position) => position,
        None => match ori {
            Orientation::North if w == 1 => Position::new(0, h - 1),
            Orientation::East if h == 1 => Position::new(w - 1, 0),
            Orientation::South if w == 1 => Position::ORIGIN,
            Orientation::West if h == 1 => Position::ORIGIN,
            _ => return Err(FabricError::config(format!(
                "cannot resolve the position of a port on the {} side of {} ({}x{})",
                ori, block, w, h
            ))),
        },
    };
    if !position.within(block.width, block.height) {
        return Err(FabricError::config(format!("{} is not within {}", position, block)));
    }
    let on_side = match ori {
        Orientation::North => position.y == h - 1,
        Orientation::East => position.x == w - 1,
        Orientation::South => position.y == 0,
        Orientation::West => position.x == 0,
    };
    if !on_side {
        return Err(FabricError::config(format!(
            "{} is not on the {} edge of {}", position, ori, block
        )));
    }
    Ok(position)
}

pub struct LogicBlockBuilder<'a> {
    ctx: &'a mut Context,
    id: ModelId,
}

impl<'a> LogicBlockBuilder<'a> {
    pub(crate) fn new(ctx: &'a mut Context, id: ModelId) -> Self {
        Self { ctx, id }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    fn create_port(
        &mut self,
        port: Port,
        ori: Orientation,
        position: Option<Position>
    ) -> Result<BlockPortRef> {
        let position = resolve_position(self.ctx.db.module(self.id), ori, position)?;
        add_block_port(self.ctx, self.id, port, BlockPinInfo { position, orientation: Some(ori) })
    }

    pub fn create_input(
        &mut self,
        name: &str,
        width: u32,
        ori: Orientation,
        position: Option<Position>
    ) -> Result<BlockPortRef> {
        self.create_port(Port::new(name.into(), width, PortDirection::Input), ori, position)
    }

    pub fn create_output(
        &mut self,
        name: &str,
        width: u32,
        ori: Orientation,
        position: Option<Position>
    ) -> Result<BlockPortRef> {
        self.create_port(Port::new(name.into(), width, PortDirection::Output), ori, position)
    }

    /// Creates an input fed by a global wire. The port is named after the
    /// global unless `name` is given.
    pub fn create_global(
        &mut self,
        global: GlobalIdx,
        ori: Orientation,
        position: Option<Position>,
        name: Option<&str>
    ) -> Result<BlockPortRef> {
        let port = global_port(self.ctx, global, name);
        self.create_port(port, ori, position)
    }
}

/// IO blocks are 1x1 and their ports may face any side of the tile.
pub struct IoBlockBuilder<'a> {
    ctx: &'a mut Context,
    id: ModelId,
}

impl<'a> IoBlockBuilder<'a> {
    pub(crate) fn new(ctx: &'a mut Context, id: ModelId) -> Self {
        Self { ctx, id }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    fn create_port(&mut self, port: Port, ori: Option<Orientation>) -> Result<BlockPortRef> {
        add_block_port(self.ctx, self.id, port, BlockPinInfo { position: Position::ORIGIN, orientation: ori })
    }

    pub fn create_input(&mut self, name: &str, width: u32, ori: Option<Orientation>)
        -> Result<BlockPortRef>
    {
        self.create_port(Port::new(name.into(), width, PortDirection::Input), ori)
    }

    pub fn create_output(&mut self, name: &str, width: u32, ori: Option<Orientation>)
        -> Result<BlockPortRef>
    {
        self.create_port(Port::new(name.into(), width, PortDirection::Output), ori)
    }

    pub fn create_global(&mut self, global: GlobalIdx, ori: Option<Orientation>, name: Option<&str>)
        -> Result<BlockPortRef>
    {
        let port = global_port(self.ctx, global, name);
        self.create_port(port, ori)
    }
}
