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

/* Connection boxes tap the channel running along one side of a tile cell
 * and connect it to the block pins at that cell. */

use std::collections::BTreeMap;

use crate::context::Context;
use crate::crossbar::crossbar;
use crate::error::{FabricError, Result};
use crate::fc::BlockFcValue;
use crate::geometry::*;
use crate::log::*;
use crate::netlist::*;
use crate::node::*;
use super::tile::input_side;
use super::{node_port, tunnel_fc_overrides, Mode};

/// Position of the start of `segment` relative to a connection box on side
/// `cbox_ori` of a tile cell, for the `section`-th tile the segment covers.
pub fn segment_relative_position(
    cbox_ori: Orientation,
    segment: &Segment,
    seg_ori: Orientation,
    section: u32
) -> Result<Position> {
    if section >= segment.length {
        return Err(FabricError::config(format!(
            "section {} does not exist in segment '{}'", section, segment.name
        )));
    }
    let section = section as i32;
    match (cbox_ori, seg_ori) {
        (Orientation::North | Orientation::South, Orientation::East | Orientation::West) => {
            let x = if seg_ori.is_east() { -section } else { section };
            let y = if cbox_ori.is_north() { 0 } else { -1 };
            Ok(Position::new(x, y))
        }
        (Orientation::East | Orientation::West, Orientation::North | Orientation::South) => {
            let x = if cbox_ori.is_east() { 0 } else { -1 };
            let y = if seg_ori.is_north() { -section } else { section };
            Ok(Position::new(x, y))
        }
        _ => Err(FabricError::config(format!(
            "a connection box on the {} side cannot tap a segment running {}", cbox_ori, seg_ori
        ))),
    }
}

pub struct ConnectionBoxBuilder<'a> {
    ctx: &'a mut Context,
    id: ModelId,
    tile: ModelId,
    orientation: Orientation,
    position: Position,
}

impl<'a> ConnectionBoxBuilder<'a> {
    pub(crate) fn new(ctx: &'a mut Context, id: ModelId) -> Result<Self> {
        let (tile, orientation, position) = match ctx.db.module(id).class {
            ModuleClass::ConnectionBox { tile, orientation, position, .. } =>
                (tile, orientation, position),
            _ => return Err(FabricError::internal(format!(
                "{} is not a connection box", ctx.db.module(id)
            ))),
        };
        Ok(Self { ctx, id, tile, orientation, position })
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    /* Segments running along the channel this box taps */
    fn segment_orientations(&self) -> [Orientation; 2] {
        let dim = self.orientation.dimension().perpendicular();
        [Orientation::compose(dim, Direction::Inc), Orientation::compose(dim, Direction::Dec)]
    }

    pub fn get_segment_input(
        &mut self,
        segment: SegmentIdx,
        ori: Orientation,
        section: u32,
        mode: Mode
    ) -> Result<Option<PortKey>> {
        let sgmt = self.ctx.segment(segment);
        let width = sgmt.width;
        let position = segment_relative_position(self.orientation, sgmt, ori, section)?;
        let node = SegmentNode::new(position, segment, ori, SegmentNodeKind::CboxIn);
        node_port(self.ctx, self.id, node.into(), width, PortDirection::Input, mode)
    }

    /// Output driving the first section of a segment starting at this box.
    pub fn get_segment_output(
        &mut self,
        segment: SegmentIdx,
        ori: Orientation,
        mode: Mode
    ) -> Result<Option<PortKey>> {
        let sgmt = self.ctx.segment(segment);
        let width = sgmt.width;
        let position = segment_relative_position(self.orientation, sgmt, ori, 0)?;
        let node = SegmentNode::new(position, segment, ori, SegmentNodeKind::CboxOut);
        node_port(self.ctx, self.id, node.into(), width, PortDirection::Output, mode)
    }

    /// Port standing for `port` of the block instance at `subtile` of the
    /// tile. Block inputs are outputs of the box and vice versa.
    pub fn get_blockpin(&mut self, subtile: Subtile, port: BlockPortRef, mode: Mode)
        -> Result<Option<PortKey>>
    {
        let model = self.ctx.db.instance_model(self.tile, &InstanceKey::Subtile(subtile))?;
        if model != port.block {
            return Err(FabricError::config(format!(
                "'{}' is not a port of sub-tile {} of {}",
                self.ctx.block_port_name(port), subtile, self.ctx.db.module(self.tile)
            )));
        }
        let proto = self.ctx.block_port(port)?;
        let (width, direction) = (proto.width, proto.direction.opposite());
        let pin = proto.pin.ok_or_else(|| FabricError::internal(format!(
            "'{}' has no pin information", proto.name
        )))?;
        if pin.orientation.map_or(false, |ori| ori != self.orientation) {
            return Err(FabricError::config(format!(
                "'{}' faces {:?} but {} is on the {} side",
                proto.name, pin.orientation, self.ctx.db.module(self.id), self.orientation
            )));
        }
        if pin.position != self.position {
            return Err(FabricError::config(format!(
                "'{}' is at {} but {} is at {}",
                proto.name, pin.position, self.ctx.db.module(self.id), self.position
            )));
        }
        let node = BlockPinNode::new(Position::ORIGIN, port, subtile);
        node_port(self.ctx, self.id, node.into(), width, direction, mode)
    }

    /// Connects the block pins at this box's position to the channel using
    /// the crossbar algorithm, one shared usage counter per segment and
    /// direction.
    ///
    /// # Arguments
    /// * `default_fc` - FC of blocks not listed in `overrides`
    /// * `overrides` - FC per block name
    pub fn fill(
        &mut self,
        default_fc: &BlockFcValue,
        overrides: &BTreeMap<String, BlockFcValue>,
        mode: Mode
    ) -> Result<()> {
        dbg_log!(DBG_INFO, "Filling {}", self.ctx.db.module(self.id));
        let overrides = tunnel_fc_overrides(self.ctx, default_fc, overrides);

        /* (subtile, port, name, direction, fc of the block) */
        let mut pins = Vec::new();
        for (key, inst) in self.ctx.db.module(self.tile).instances() {
            let subtile = match key {
                InstanceKey::Subtile(subtile) => *subtile,
                _ => continue,
            };
            let block = self.ctx.db.module(inst.model);
            let fc = overrides.get(&block.name).unwrap_or(default_fc);
            for (pkey, port) in block.ports() {
                let (idx, pin) = match (pkey, port.pin) {
                    (PortKey::Block(idx), Some(pin)) => (*idx, pin),
                    _ => continue,
                };
                if port.global.is_some() || pin.position != self.position
                    || pin.orientation.map_or(false, |ori| ori != self.orientation)
                {
                    continue;
                }
                /* a single box drives an input facing anywhere */
                if pin.orientation.is_none() && port.direction.is_input()
                    && input_side(&self.ctx.db, self.tile, pin.position) != Some(self.orientation)
                {
                    continue;
                }
                let pref = BlockPortRef { block: inst.model, port: idx };
                pins.push((subtile, pref, port.name.clone(), port.direction, port.width, fc.clone()));
            }
        }

        let segments: Vec<(SegmentIdx, Segment)> =
            self.ctx.segments().map(|(idx, s)| (idx, s.clone())).collect();
        let orientations = self.segment_orientations();
        for (sidx, sgmt) in &segments {
            let itracks: Vec<(u32, u32)> = (0 .. sgmt.width)
                .flat_map(|idx| (0 .. sgmt.length).map(move |section| (idx, section)))
                .collect();
            let mut iutil = vec![0; itracks.len()];
            let mut outil = vec![0; sgmt.width as usize];
            for (subtile, port, name, direction, width, fc) in &pins {
                let blockpin = self.get_blockpin(*subtile, *port, mode)?;
                if direction.is_input() {
                    let c = fc.port_fc(name, *direction, sgmt, true)? as usize;
                    for (ti, pi) in crossbar(itracks.len(), *width as usize, c, &mut iutil) {
                        let (idx, section) = itracks[ti];
                        for ori in orientations {
                            let input = self.get_segment_input(*sidx, ori, section, mode)?;
                            if let (Some(input), Some(blockpin)) = (input, blockpin) {
                                self.ctx.db.connect_bit(
                                    self.id,
                                    NetRef::Port(input).bit(idx),
                                    NetRef::Port(blockpin).bit(pi as u32)
                                )?;
                            }
                        }
                    }
                } else {
                    let c = fc.port_fc(name, *direction, sgmt, false)? as usize;
                    for (ti, pi) in crossbar(sgmt.width as usize, *width as usize, c, &mut outil) {
                        for ori in orientations {
                            let output = self.get_segment_output(*sidx, ori, mode)?;
                            if let (Some(output), Some(blockpin)) = (output, blockpin) {
                                self.ctx.db.connect_bit(
                                    self.id,
                                    NetRef::Port(blockpin).bit(pi as u32),
                                    NetRef::Port(output).bit(ti as u32)
                                )?;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
