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

/* Tiles: block instances plus the connection boxes around them.
 *
 * Connection boxes are indexed by the side they sit on and an offset along
 * that side:
 *
 *         0   1   2
 *       +-----------+
 *     1 |   north   | 1
 *     0 | west east | 0
 *       |   south   |
 *       +-----------+
 *         0   1   2
 */

use std::collections::BTreeMap;

use crate::context::Context;
use crate::error::{FabricError, Result};
use crate::fc::BlockFcValue;
use crate::geometry::*;
use crate::log::*;
use crate::netlist::*;
use crate::node::*;
use super::cbox::ConnectionBoxBuilder;
use super::{ensure_port, no_channel, tunnel_fc_overrides, Mode};

/// Cell of a tile served by the connection box at `(ori, offset)`.
pub fn cbox_position(tile: &Module, ori: Orientation, offset: u32) -> Position {
    let offset = offset as i32;
    let x = match ori {
        Orientation::West => 0,
        Orientation::East => tile.width as i32 - 1,
        _ => offset,
    };
    let y = match ori {
        Orientation::South => 0,
        Orientation::North => tile.height as i32 - 1,
        _ => offset,
    };
    Position::new(x, y)
}

/// Channel tapped by a connection box on side `ori` of the cell at `position`.
pub fn cbox_channel(ori: Orientation, position: Position) -> (Position, Dimension) {
    match ori {
        Orientation::North => (position, Dimension::X),
        Orientation::South => (position - Position::new(0, 1), Dimension::X),
        Orientation::West => (position - Position::new(1, 0), Dimension::Y),
        Orientation::East => (position, Dimension::Y),
    }
}

/// Side whose connection box drives a block input facing no particular
/// side: the first one with a channel next to the pin's cell.
pub fn input_side(db: &Database, tile: ModelId, position: Position) -> Option<Orientation> {
    Orientation::ALL.into_iter().find(|ori| {
        let (cpos, dim) = cbox_channel(*ori, position);
        !no_channel(db, tile, cpos, dim)
    })
}

/* Number of connection-box slots on side `ori` */
fn cbox_slots(tile: &Module, ori: Orientation) -> u32 {
    match ori.dimension() {
        Dimension::X => tile.height,
        Dimension::Y => tile.width,
    }
}

/// Exposes `port` of the block at `subtile` as a tile port.
pub(crate) fn expose_blockpin(
    ctx: &mut Context,
    tile: ModelId,
    subtile: Subtile,
    port: BlockPortRef
) -> Result<PortKey> {
    let proto = ctx.block_port(port)?;
    let (width, direction) = (proto.width, proto.direction);
    let position = proto.pin.map(|pin| pin.position).unwrap_or(Position::ORIGIN);
    let node = RoutingNodeId::from(BlockPinNode::new(position, port, subtile));
    let key = ensure_port(ctx, tile, PortKey::Node(node), Port::new(node.name(ctx), width, direction))?;
    let pin = NetRef::Pin(InstanceKey::Subtile(subtile), PortKey::Block(port.port));
    if direction.is_input() {
        ctx.db.connect(tile, NetRef::Port(key), pin)?;
    } else {
        ctx.db.connect(tile, pin, NetRef::Port(key))?;
    }
    Ok(key)
}

pub struct TileBuilder<'a> {
    ctx: &'a mut Context,
    id: ModelId,
}

impl<'a> TileBuilder<'a> {
    pub(crate) fn new(ctx: &'a mut Context, id: ModelId) -> Self {
        Self { ctx, id }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    /// Instantiates `block` `reps` times (once when not given). A tile holds
    /// one block type only.
    pub fn instantiate(&mut self, block: ModelId, reps: Option<u32>) -> Result<()> {
        let tile = self.ctx.db.module(self.id);
        let blk = self.ctx.db.module(block);
        if !blk.class.is_block() {
            return Err(FabricError::config(format!("{} is not a logic/IO block", blk)));
        }
        if blk.width != tile.width || blk.height != tile.height {
            return Err(FabricError::config(format!(
                "the size of {} ({}x{}) does not fit {} ({}x{})",
                blk, blk.width, blk.height, tile, tile.width, tile.height
            )));
        }
        if let Some(inst) = tile.instance(&InstanceKey::Subtile(0)) {
            return Err(FabricError::config(format!(
                "at most one block type per tile, {} is already instantiated in {}",
                self.ctx.db.module(inst.model), tile
            )));
        }
        let names: Vec<(Subtile, String)> = match reps {
            None => vec![(0, "i_blk".into())],
            Some(0) => return Err(FabricError::config(format!("{} cannot hold 0 blocks", tile))),
            Some(reps) => (0 .. reps).map(|i| (i, format!("i_blk_i{}", i))).collect(),
        };
        for (subtile, name) in names {
            self.ctx.db.module_mut(self.id)
                .add_instance(InstanceKey::Subtile(subtile), Instance { name, model: block })?;
        }
        Ok(())
    }

    /// Returns a builder for the connection box at `(ori, offset)`, creating
    /// and instantiating it when needed.
    pub fn build_connection_box(&mut self, ori: Orientation, offset: u32)
        -> Result<ConnectionBoxBuilder<'_>>
    {
        let key = InstanceKey::Cbox(ori, offset);
        let tile = self.ctx.db.module(self.id);
        let model = match tile.instance(&key).map(|inst| inst.model) {
            Some(model) => model,
            None => {
                if offset >= cbox_slots(tile, ori) {
                    return Err(FabricError::config(format!(
                        "no connection box slot {} on the {} side of {}", offset, ori, tile
                    )));
                }
                let position = cbox_position(tile, ori, offset);
                let (cpos, dim) = cbox_channel(ori, position);
                if no_channel(&self.ctx.db, self.id, cpos, dim) {
                    return Err(FabricError::config(format!(
                        "no connection box allowed at ({}, {}) in {}", ori, offset, tile
                    )));
                }
                let name = format!("cbox_{}_{}{}", tile.name, ori.initial(), offset);
                let cbox_key = (self.id, ori, offset);
                let model = match self.ctx.connection_box(&cbox_key) {
                    Some(model) => model,
                    None => {
                        let class = ModuleClass::ConnectionBox { tile: self.id, orientation: ori, offset, position };
                        let model = self.ctx.db.add(Module::new(name, class, 1, 1));
                        self.ctx.register_connection_box(cbox_key, model);
                        model
                    }
                };
                self.ctx.db.module_mut(self.id).add_instance(key, Instance {
                    name: format!("i_cbox_{}{}", ori.initial(), offset),
                    model,
                })?;
                model
            }
        };
        ConnectionBoxBuilder::new(self.ctx, model)
    }

    /* A box is needed if some port at `position` facing `ori` connects to
     * the channel at all */
    fn cbox_needed(
        &self,
        ori: Orientation,
        position: Position,
        default_fc: &BlockFcValue,
        overrides: &BTreeMap<String, BlockFcValue>
    ) -> Result<bool> {
        let tile = self.ctx.db.module(self.id);
        let block = match tile.instance(&InstanceKey::Subtile(0)) {
            Some(inst) => self.ctx.db.module(inst.model),
            None => return Ok(false),
        };
        let fc = overrides.get(&block.name).unwrap_or(default_fc);
        for port in block.ports().values() {
            let pin = match port.pin {
                Some(pin) => pin,
                None => continue,
            };
            if port.global.is_some() || pin.position != position
                || pin.orientation.map_or(false, |o| o != ori)
            {
                continue;
            }
            if pin.orientation.is_none() && port.direction.is_input()
                && input_side(&self.ctx.db, self.id, position) != Some(ori)
            {
                continue;
            }
            for (_, sgmt) in self.ctx.segments() {
                if fc.port_fc(&port.name, port.direction, sgmt, port.direction.is_input())? > 0 {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Creates and fills every connection box this tile needs.
    ///
    /// # Arguments
    /// * `default_fc` - FC of blocks not listed in `overrides`
    /// * `overrides` - FC per block name
    pub fn fill(&mut self, default_fc: &BlockFcValue, overrides: &BTreeMap<String, BlockFcValue>)
        -> Result<()>
    {
        let overrides = tunnel_fc_overrides(self.ctx, default_fc, overrides);
        for ori in Orientation::ALL {
            for offset in 0 .. cbox_slots(self.ctx.db.module(self.id), ori) {
                let tile = self.ctx.db.module(self.id);
                if tile.instance(&InstanceKey::Cbox(ori, offset)).is_some() {
                    continue;
                }
                let position = cbox_position(tile, ori, offset);
                let (cpos, dim) = cbox_channel(ori, position);
                if no_channel(&self.ctx.db, self.id, cpos, dim) {
                    continue;
                }
                if !self.cbox_needed(ori, position, default_fc, &overrides)? {
                    continue;
                }
                self.build_connection_box(ori, offset)?.fill(default_fc, &overrides, Mode::Build)?;
            }
        }
        Ok(())
    }

    /// Connects the connection boxes to the blocks and promotes their
    /// channel nodes to tile ports. Also wires global block ports and the
    /// sinks of direct tunnels.
    pub fn auto_connect(&mut self) -> Result<()> {
        dbg_log!(DBG_INFO, "Auto-connecting {}", self.ctx.db.module(self.id));
        let (width, height) = {
            let tile = self.ctx.db.module(self.id);
            (tile.width, tile.height)
        };
        let instances: Vec<(InstanceKey, ModelId)> = self.ctx.db.module(self.id).instances().iter()
            .map(|(key, inst)| (*key, inst.model))
            .collect();

        /* connection boxes */
        for (key, model) in &instances {
            let (ori, position) = match (key, &self.ctx.db.module(*model).class) {
                (InstanceKey::Cbox(..), ModuleClass::ConnectionBox { orientation, position, .. }) =>
                    (*orientation, *position),
                _ => continue,
            };
            let ports: Vec<(PortKey, Port)> = self.ctx.db.module(*model).ports().iter()
                .map(|(k, p)| (*k, p.clone()))
                .collect();
            for (pkey, port) in ports {
                let pin = NetRef::Pin(*key, pkey);
                let conn = match pkey.as_node() {
                    Some(RoutingNodeId::BlockPin(node)) => {
                        let proto_pos = self.ctx.block_port(node.port)?.pin
                            .map(|p| p.position)
                            .unwrap_or(Position::ORIGIN);
                        let block_pos = position + node.position - proto_pos;
                        if block_pos == Position::ORIGIN {
                            NetRef::Pin(InstanceKey::Subtile(node.subtile), PortKey::Block(node.port.port))
                        } else if block_pos.within(width, height) || !port.direction.is_input() {
                            return Err(FabricError::internal(format!(
                                "invalid block pin node '{}' in {}", port.name, self.ctx.db.module(*model)
                            )));
                        } else {
                            /* source of a direct tunnel in a neighbouring tile */
                            let node = RoutingNodeId::from(node.moved(position));
                            let tport = Port::new(node.name(self.ctx), port.width, port.direction);
                            NetRef::Port(ensure_port(self.ctx, self.id, PortKey::Node(node), tport)?)
                        }
                    }
                    Some(RoutingNodeId::Segment(node)) => {
                        let corner = match node.kind {
                            SegmentNodeKind::CboxIn => Corner::compose(node.orientation, ori)?,
                            SegmentNodeKind::CboxOut => Corner::compose(node.orientation.opposite(), ori)?,
                            _ => return Err(FabricError::internal(format!(
                                "not expecting node '{}' in {}", port.name, self.ctx.db.module(self.id)
                            ))),
                        };
                        let node = RoutingNodeId::from(node.moved(position).with_kind(node.kind.lifted()));
                        let tport = Port::new(node.name(self.ctx), port.width, port.direction)
                            .with_boxpos((position, corner));
                        NetRef::Port(ensure_port(self.ctx, self.id, PortKey::Node(node), tport)?)
                    }
                    None => return Err(FabricError::internal(format!(
                        "invalid routing node '{}' in {}", port.name, self.ctx.db.module(*model)
                    ))),
                };
                if port.direction.is_input() {
                    self.ctx.db.connect(self.id, conn, pin)?;
                } else {
                    self.ctx.db.connect(self.id, pin, conn)?;
                }
            }
        }

        /* blocks: globals and direct tunnels */
        for (key, model) in &instances {
            let subtile = match key {
                InstanceKey::Subtile(subtile) => *subtile,
                _ => continue,
            };
            let globals: Vec<(u32, GlobalIdx)> = self.ctx.db.module(*model).ports().iter()
                .filter_map(|(k, p)| match (k, p.global) {
                    (PortKey::Block(idx), Some(global)) => Some((*idx, global)),
                    _ => None,
                })
                .collect();
            for (idx, global) in globals {
                let g = self.ctx.global(global);
                let mut port = Port::new(g.name.clone(), g.width, PortDirection::Input);
                port.global = Some(global);
                let gkey = ensure_port(self.ctx, self.id, PortKey::Global(global), port)?;
                self.ctx.db.connect(self.id, NetRef::Port(gkey), NetRef::Pin(*key, PortKey::Block(idx)))?;
            }

            let tunnels: Vec<DirectTunnel> = self.ctx.tunnels().iter()
                .filter(|t| t.sink.block == *model)
                .cloned()
                .collect();
            for tunnel in tunnels {
                self.connect_tunnel(subtile, &tunnel)?;
            }
        }
        Ok(())
    }

    /* The sink of a tunnel is driven from a tile port standing for the
     * source pin in the neighbouring tile. When a connection box already
     * drives the sink, the tunnel goes through that box instead. */
    fn connect_tunnel(&mut self, subtile: Subtile, tunnel: &DirectTunnel) -> Result<()> {
        let sink_proto = self.ctx.block_port(tunnel.sink)?;
        let sink_pos = sink_proto.pin.map(|p| p.position).unwrap_or(Position::ORIGIN);
        let width = self.ctx.block_port(tunnel.source)?.width;
        let sink = NetRef::Pin(InstanceKey::Subtile(subtile), PortKey::Block(tunnel.sink.port));
        let target = match self.ctx.db.source_of(self.id, &sink) {
            None => sink,
            Some(NetRef::Pin(cbox @ InstanceKey::Cbox(..), driver)) => {
                let model = self.ctx.db.instance_model(self.id, &cbox)?;
                let node = RoutingNodeId::from(BlockPinNode::new(tunnel.offset, tunnel.source, subtile));
                let skey = PortKey::Node(node);
                if !self.ctx.db.module(model).has_port(&skey) {
                    let port = Port::new(node.name(self.ctx), width, PortDirection::Input);
                    ensure_port(self.ctx, model, skey, port)?;
                    self.ctx.db.connect(model, NetRef::Port(skey), NetRef::Port(driver))?;
                }
                let cpin = NetRef::Pin(cbox, skey);
                if self.ctx.db.source_of(self.id, &cpin).is_some() {
                    return Ok(());
                }
                cpin
            }
            Some(_) => return Ok(()),
        };
        let node = RoutingNodeId::from(BlockPinNode::new(sink_pos + tunnel.offset, tunnel.source, subtile));
        let port = Port::new(node.name(self.ctx), width, PortDirection::Input);
        let key = ensure_port(self.ctx, self.id, PortKey::Node(node), port)?;
        dbg_log!(DBG_EXTRA, "Tunnel {} enters {} through {}",
            tunnel.name, self.ctx.db.module(self.id), node.name(self.ctx));
        self.ctx.db.connect(self.id, NetRef::Port(key), target)
    }
}

#[cfg(test)]
mod tests;
