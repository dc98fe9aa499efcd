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

use crate::context::Context;
use crate::error::Result;
use crate::fc::{BlockFcValue, BlockPortFcValue, FcValue};
use crate::geometry::*;
use crate::log::*;
use crate::netlist::*;
use crate::node::RoutingNodeId;

pub mod array;
pub mod block;
pub mod cbox;
pub mod sbox;
pub mod tile;

/// Whether routing-box ports may be created on demand.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Build,
    /// Only connect ports that already exist. Used to re-apply a pattern to
    /// a box that has already been built.
    Lookup,
}

impl Mode {
    pub fn creates(self) -> bool {
        self == Mode::Build
    }
}

/* Returns the port keyed by `node` in `module`, creating it in build mode. */
pub(crate) fn node_port(
    ctx: &mut Context,
    module: ModelId,
    node: RoutingNodeId,
    width: u32,
    direction: PortDirection,
    mode: Mode
) -> Result<Option<PortKey>> {
    let key = PortKey::Node(node);
    if ctx.db.module(module).has_port(&key) {
        return Ok(Some(key));
    }
    if !mode.creates() {
        return Ok(None);
    }
    let name = node.name(ctx);
    ctx.db.module_mut(module).add_port(key, Port::new(name, width, direction))?;
    Ok(Some(key))
}

/* Returns `key`, adding `port` under it unless the module already has it. */
pub(crate) fn ensure_port(ctx: &mut Context, module: ModelId, key: PortKey, port: Port) -> Result<PortKey> {
    if !ctx.db.module(module).has_port(&key) {
        dbg_log!(DBG_EXTRA, "Creating port {} in {}", port.name, ctx.db.module(module));
        ctx.db.module_mut(module).add_port(key, port)?;
    }
    Ok(key)
}

/* Default FC plus overrides, with every direct-tunnel endpoint forced to
 * FC 0 so the channel is not used for them */
pub(crate) fn tunnel_fc_overrides(
    ctx: &Context,
    default_fc: &BlockFcValue,
    overrides: &BTreeMap<String, BlockFcValue>
) -> BTreeMap<String, BlockFcValue> {
    let mut overrides = overrides.clone();
    for tunnel in ctx.tunnels() {
        for port in [tunnel.source, tunnel.sink] {
            overrides.entry(ctx.db.module(port.block).name.clone())
                .or_insert_with(|| default_fc.defaults_only())
                .overrides
                .insert(ctx.block_port_name(port).into(), BlockPortFcValue::new(FcValue::Count(0)));
        }
    }
    overrides
}

/// Checks whether the channel of dimension `dim` at `position` of `module`
/// (a tile or an array) does not exist.
///
/// Channels are missing along the fabric edges, over tiles that forbid
/// segments running through them, and wherever a placed sub-array says so.
pub fn no_channel(db: &Database, module: ModelId, position: Position, dim: Dimension) -> bool {
    let m = db.module(module);
    let (x, y) = (position.x, position.y);
    let (w, h) = (m.width as i32, m.height as i32);
    let on_edge = match dim {
        Dimension::X =>
            (x <= 0 && m.edge.west) || (x >= w - 1 && m.edge.east)
            || (y >= h - 1 && m.edge.north) || (y < 0 && m.edge.south),
        Dimension::Y =>
            (y <= 0 && m.edge.south) || (y >= h - 1 && m.edge.north)
            || (x >= w - 1 && m.edge.east) || (x < 0 && m.edge.west),
    };
    if on_edge {
        return true;
    }
    match &m.class {
        ModuleClass::Tile { disallow_segments_passthru: true } => match dim {
            Dimension::X => (0 .. w).contains(&x) && (0 .. h - 1).contains(&y),
            Dimension::Y => (0 .. w - 1).contains(&x) && (0 .. h).contains(&y),
        },
        ModuleClass::Array => {
            let root = m.grid.as_ref().and_then(|g| g.get_root(position, None));
            match root.and_then(|key| m.instance(&key).map(|i| (key, i.model))) {
                Some((key, model)) => no_channel(db, model, position - key.position(), dim),
                None => false,
            }
        }
        _ => false,
    }
}
