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

use std::collections::BTreeMap;

use crate::builder::array::ArrayBuilder;
use crate::builder::block::{IoBlockBuilder, LogicBlockBuilder};
use crate::builder::sbox::SwitchBoxBuilder;
use crate::builder::tile::TileBuilder;
use crate::error::{FabricError, Result};
use crate::geometry::*;
use crate::netlist::*;
use crate::node::*;

/// Optional settings of a new tile.
#[derive(Clone, Debug, Default)]
pub struct TileOptions {
    /// `tile_<block>` when not given
    pub name: Option<String>,
    pub edge: OrientationTuple<bool>,
    pub disallow_segments_passthru: bool,
}

/// Key deduplicating connection boxes: one prototype per tile side slot.
pub type ConnectionBoxKey = (ModelId, Orientation, u32);

/// Key deduplicating switch boxes.
pub type SwitchBoxKey = (Corner, Option<String>);

/// Architecture catalog plus every module built from it.
#[derive(Debug, Default)]
pub struct Context {
    segments: Vec<Segment>,
    globals: Vec<Global>,
    tunnels: Vec<DirectTunnel>,
    pub db: Database,
    sboxes: BTreeMap<SwitchBoxKey, ModelId>,
    cboxes: BTreeMap<ConnectionBoxKey, ModelId>,
    top: Option<ModelId>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /* == architecture catalog ============================================ */

    pub fn create_segment(&mut self, name: &str, width: u32, length: u32) -> Result<SegmentIdx> {
        if self.segments.iter().any(|s| s.name == name) {
            return Err(FabricError::config(format!("segment '{}' is already created", name)));
        }
        if width == 0 || length == 0 {
            return Err(FabricError::config(format!(
                "segment '{}' must have non-zero width and length", name
            )));
        }
        self.segments.push(Segment { name: name.into(), width, length });
        Ok(SegmentIdx(self.segments.len() - 1))
    }

    pub fn segment(&self, idx: SegmentIdx) -> &Segment {
        &self.segments[idx.0]
    }

    /// Segments in catalog order. Track lists of every routing box follow
    /// this order.
    pub fn segments(&self) -> impl Iterator<Item = (SegmentIdx, &Segment)> {
        self.segments.iter().enumerate().map(|(idx, s)| (SegmentIdx(idx), s))
    }

    pub fn find_segment(&self, name: &str) -> Option<SegmentIdx> {
        self.segments.iter().position(|s| s.name == name).map(SegmentIdx)
    }

    /// Total number of track sections in one channel direction.
    pub fn channel_width(&self) -> u32 {
        self.segments.iter().map(|s| s.width * s.length).sum()
    }

    pub fn create_global(&mut self, name: &str, width: u32, is_clock: bool) -> Result<GlobalIdx> {
        if self.globals.iter().any(|g| g.name == name) {
            return Err(FabricError::config(format!("global wire '{}' is already created", name)));
        }
        if width != 1 {
            return Err(FabricError::config(format!(
                "global wire '{}' must be 1-bit wide", name
            )));
        }
        self.globals.push(Global { name: name.into(), width, is_clock });
        Ok(GlobalIdx(self.globals.len() - 1))
    }

    pub fn global(&self, idx: GlobalIdx) -> &Global {
        &self.globals[idx.0]
    }

    pub fn find_global(&self, name: &str) -> Option<GlobalIdx> {
        self.globals.iter().position(|g| g.name == name).map(GlobalIdx)
    }

    /// Registers a direct wire from a logic-block output to a logic-block input.
    ///
    /// # Arguments
    /// * `offset` - position of the source port relative to the sink port
    pub fn create_tunnel(
        &mut self,
        name: &str,
        source: BlockPortRef,
        sink: BlockPortRef,
        offset: Position
    ) -> Result<()> {
        if self.tunnels.iter().any(|t| t.name == name) {
            return Err(FabricError::config(format!("direct tunnel '{}' is already created", name)));
        }
        for (port, direction, what) in [
            (source, PortDirection::Output, "source"),
            (sink, PortDirection::Input, "sink"),
        ] {
            let is_logic = self.db.module(port.block).class.is_logic_block();
            let port_dir = self.block_port(port)?.direction;
            if !is_logic || port_dir != direction {
                return Err(FabricError::config(format!(
                    "{} of tunnel '{}' is not a logic block {:?} port", what, name, direction
                )));
            }
        }
        self.tunnels.push(DirectTunnel { name: name.into(), source, sink, offset });
        Ok(())
    }

    pub fn tunnels(&self) -> &[DirectTunnel] {
        &self.tunnels
    }

    pub fn block_port(&self, port: BlockPortRef) -> Result<&Port> {
        let block = self.db.module(port.block);
        block.port(&PortKey::Block(port.port))
            .ok_or_else(|| FabricError::internal(format!(
                "{} has no port #{}", block, port.port
            )))
    }

    pub fn block_port_name(&self, port: BlockPortRef) -> &str {
        self.block_port(port).map(|p| p.name.as_str()).unwrap_or("<missing>")
    }

    /// Finds a user port of a block by name.
    pub fn find_block_port(&self, block: ModelId, name: &str) -> Option<BlockPortRef> {
        self.db.module(block).ports().iter()
            .find_map(|(key, p)| match key {
                PortKey::Block(idx) if p.name == name => Some(BlockPortRef { block, port: *idx }),
                _ => None,
            })
    }

    /* == module builders ================================================= */

    fn check_unique_name(&self, name: &str) -> Result<()> {
        if self.db.find(name).is_some() {
            return Err(FabricError::config(format!("module '{}' is already created", name)));
        }
        Ok(())
    }

    pub fn build_logic_block(&mut self, name: &str, width: u32, height: u32)
        -> Result<LogicBlockBuilder<'_>>
    {
        self.check_unique_name(name)?;
        if width == 0 || height == 0 {
            return Err(FabricError::config(format!("block '{}' has an empty footprint", name)));
        }
        let id = self.db.add(Module::new(name.into(), ModuleClass::LogicBlock, width, height));
        Ok(LogicBlockBuilder::new(self, id))
    }

    pub fn build_io_block(&mut self, name: &str) -> Result<IoBlockBuilder<'_>> {
        self.check_unique_name(name)?;
        let id = self.db.add(Module::new(name.into(), ModuleClass::IoBlock, 1, 1));
        Ok(IoBlockBuilder::new(self, id))
    }

    /// Creates a tile sized after `block` and instantiates `capacity`
    /// sub-tiles of it (one when not given).
    pub fn build_tile(&mut self, block: ModelId, capacity: Option<u32>, opts: TileOptions)
        -> Result<TileBuilder<'_>>
    {
        let blk = self.db.module(block);
        if !blk.class.is_block() {
            return Err(FabricError::config(format!("{} is not a logic/IO block", blk)));
        }
        let name = opts.name.unwrap_or_else(|| format!("tile_{}", blk.name));
        let (width, height) = (blk.width, blk.height);
        self.check_unique_name(&name)?;
        let tile = Module::new(
            name,
            ModuleClass::Tile { disallow_segments_passthru: opts.disallow_segments_passthru },
            width,
            height
        ).with_edge(opts.edge);
        let id = self.db.add(tile);
        let mut builder = TileBuilder::new(self, id);
        builder.instantiate(block, capacity)?;
        Ok(builder)
    }

    /// Returns the switch-box prototype for `(corner, identifier)`, creating
    /// it on first request.
    pub fn build_switch_box(&mut self, corner: Corner, identifier: Option<&str>)
        -> Result<SwitchBoxBuilder<'_>>
    {
        let key = (corner, identifier.map(String::from));
        let id = match self.sboxes.get(&key) {
            Some(id) => *id,
            None => {
                let name = match identifier {
                    Some(ident) => format!("sbox_{}_{}", corner.short_name(), ident),
                    None => format!("sbox_{}", corner.short_name()),
                };
                self.check_unique_name(&name)?;
                let class = ModuleClass::SwitchBox { corner, identifier: key.1.clone() };
                let id = self.db.add(Module::new(name, class, 1, 1));
                self.sboxes.insert(key, id);
                id
            }
        };
        Ok(SwitchBoxBuilder::new(self, id))
    }

    pub fn switch_box(&self, corner: Corner, identifier: Option<&str>) -> Option<ModelId> {
        self.sboxes.get(&(corner, identifier.map(String::from))).copied()
    }

    pub(crate) fn connection_box(&self, key: &ConnectionBoxKey) -> Option<ModelId> {
        self.cboxes.get(key).copied()
    }

    pub(crate) fn register_connection_box(&mut self, key: ConnectionBoxKey, id: ModelId) {
        self.cboxes.insert(key, id);
    }

    /// Creates an array. A top-level array must sit on all four fabric edges
    /// and there can be only one.
    ///
    /// # Arguments
    /// * `edge` - fabric edges this array lies on; all of them for the top
    ///   array and none otherwise when not given
    pub fn build_array(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        set_as_top: bool,
        edge: Option<OrientationTuple<bool>>
    ) -> Result<ArrayBuilder<'_>> {
        self.check_unique_name(name)?;
        if width == 0 || height == 0 {
            return Err(FabricError::config(format!("array '{}' has an empty footprint", name)));
        }
        let edge = edge.unwrap_or_else(|| OrientationTuple::splat(set_as_top));
        if set_as_top {
            if !edge.all() {
                return Err(FabricError::config("top array must lie on all four edges"));
            }
            if let Some(top) = self.top {
                return Err(FabricError::config(format!(
                    "top array is already set to '{}'", self.db.module(top).name
                )));
            }
        }
        let id = self.db.add(Module::new(name.into(), ModuleClass::Array, width, height).with_edge(edge));
        if set_as_top {
            self.top = Some(id);
        }
        Ok(ArrayBuilder::new(self, id))
    }

    pub fn top(&self) -> Option<ModelId> {
        self.top
    }
}
