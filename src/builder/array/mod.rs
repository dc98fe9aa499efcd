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

/* Arrays: a grid of tiles, switch boxes and nested arrays.
 *
 * Placement writes the grid, `fill` decides which switch box sits at every
 * corner and what it drives, `auto_connect` resolves the driver of every
 * routing node. A node whose driver is not visible at this level becomes a
 * port of the array and is resolved by the parent. */

use std::collections::{BTreeMap, BTreeSet};

use crate::context::Context;
use crate::error::{FabricError, Result};
use crate::geometry::*;
use crate::log::*;
use crate::netlist::*;
use crate::node::*;
use super::sbox::{add_cboxout, FillRequest, SwitchBoxBuilder, SwitchBoxPattern};
use super::tile::expose_blockpin;
use super::{ensure_port, no_channel, Mode};

/// An instance seen from an array: the chain of `(parent, key)` pairs
/// leading to it, outermost first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HierInstance {
    pub path: Vec<(ModelId, InstanceKey)>,
}

impl HierInstance {
    pub fn new(parent: ModelId, key: InstanceKey) -> Self {
        Self { path: vec![(parent, key)] }
    }

    /// Puts this instance under `key` of `parent`.
    pub fn above(mut self, parent: ModelId, key: InstanceKey) -> Self {
        self.path.insert(0, (parent, key));
        self
    }

    /// The innermost `(parent, key)` pair.
    pub fn leaf(&self) -> (ModelId, InstanceKey) {
        self.path[self.path.len() - 1]
    }

    pub fn model(&self, db: &Database) -> Result<ModelId> {
        let (parent, key) = self.leaf();
        db.instance_model(parent, &key)
    }

    /// Position of the instance in the outermost array.
    pub fn position(&self) -> Position {
        self.path.iter().fold(Position::ORIGIN, |pos, (_, key)| pos + key.position())
    }

    pub fn name(&self, db: &Database) -> String {
        self.path.iter()
            .map(|(parent, key)| db.module(*parent).instance(key)
                .map(|i| i.name.as_str())
                .unwrap_or("<missing>"))
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// A pin of a hierarchical instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HierPin {
    pub instance: HierInstance,
    pub port: PortKey,
}

impl HierPin {
    pub fn new(instance: HierInstance, port: PortKey) -> Self {
        Self { instance, port }
    }

    pub fn name(&self, db: &Database) -> String {
        let port = self.instance.model(db).ok()
            .and_then(|model| db.module(model).port(&self.port))
            .map(|p| p.name.as_str())
            .unwrap_or("<missing>");
        format!("{}.{}", self.instance.name(db), port)
    }
}

/// Checks the channel a switch box at `corner` of `position` would use for
/// wires in orientation `ori`, as an input or as an output.
pub fn no_channel_for_switchbox(
    db: &Database,
    module: ModelId,
    position: Position,
    corner: Corner,
    ori: Orientation,
    output: bool
) -> bool {
    let mut position = position;
    let x = match ori {
        Orientation::East => output,
        Orientation::West => !output,
        _ => false,
    };
    match corner.dotx(Dimension::X) {
        Direction::Inc if x => position.x += 1,
        Direction::Dec if !x => position.x -= 1,
        _ => (),
    }
    let y = match ori {
        Orientation::North => output,
        Orientation::South => !output,
        _ => false,
    };
    match corner.dotx(Dimension::Y) {
        Direction::Inc if y => position.y += 1,
        Direction::Dec if !y => position.y -= 1,
        _ => (),
    }
    no_channel(db, module, position, ori.dimension())
}

/// The same grid vertex seen from another corner slot. Walks around the
/// vertex when `to` is not given.
pub fn equiv_sbox_position(position: Position, from: Corner, to: Option<Corner>) -> (Position, Corner) {
    let to = to.unwrap_or_else(|| from.next_around_vertex());
    let step = |dim: Dimension| {
        let f = from.dotx(dim);
        to.dotx(dim).case(f.case(0, -1), f.case(1, 0))
    };
    (position + Position::new(step(Dimension::X), step(Dimension::Y)), to)
}

fn grid(db: &Database, array: ModelId) -> Result<&Grid> {
    let m = db.module(array);
    m.grid.as_ref().ok_or_else(|| FabricError::internal(format!("{} has no placement grid", m)))
}

/// Tile (`corner` is `None`) or switch box occupying a slot of `array`,
/// looking through nested arrays.
pub fn hierarchical_root(
    db: &Database,
    array: ModelId,
    position: Position,
    corner: Option<Corner>
) -> Option<HierInstance> {
    let key = db.module(array).grid.as_ref()?.get_root(position, corner)?;
    let model = db.module(array).instance(&key)?.model;
    let class = &db.module(model).class;
    match corner {
        None if class.is_tile() => Some(HierInstance::new(array, key)),
        Some(_) if class.is_switch_box() => Some(HierInstance::new(array, key)),
        _ if class.is_array() =>
            hierarchical_root(db, model, position - key.position(), corner)
                .map(|sub| sub.above(array, key)),
        _ => None,
    }
}

/* Promotes the pin `port` of instance `key` to a port of `array`, or finds
 * the port it was promoted to before. */
fn expose_one(ctx: &mut Context, array: ModelId, key: InstanceKey, port: PortKey) -> Result<PortKey> {
    let model = ctx.db.instance_model(array, &key)?;
    let is_sbox = ctx.db.module(model).class.is_switch_box();
    let pport = ctx.db.module(model).port(&port).cloned().ok_or_else(|| FabricError::internal(format!(
        "{} has no port {:?}", ctx.db.module(model), port
    )))?;
    let offset = key.position();
    let pin = NetRef::Pin(key, port);
    let already_exposed = |ctx: &Context| FabricError::internal(format!(
        "{} already exposed but not correctly connected", ctx.db.net_name(array, &pin)
    ));

    let mut node = match port.as_node() {
        Some(RoutingNodeId::BlockPin(node)) => {
            let node = RoutingNodeId::from(node.moved(offset));
            let aport = Port::new(node.name(ctx), pport.width, pport.direction);
            let akey = ensure_port(ctx, array, PortKey::Node(node), aport)?;
            let (source, sink) = if pport.direction.is_output() {
                (pin, NetRef::Port(akey))
            } else {
                (NetRef::Port(akey), pin)
            };
            match ctx.db.source_of(array, &sink) {
                None => ctx.db.connect(array, source, sink)?,
                Some(current) if current != source => return Err(already_exposed(ctx)),
                Some(_) => (),
            }
            return Ok(akey);
        }
        Some(RoutingNodeId::Segment(node)) => node.moved(offset).with_kind(node.kind.lifted()),
        None => return Err(FabricError::internal(format!(
            "{} is not a routing node", ctx.db.net_name(array, &pin)
        ))),
    };

    /* find a free or matching slot */
    let mut existing = None;
    loop {
        let akey = PortKey::Node(node.into());
        let direction = match ctx.db.module(array).port(&akey) {
            Some(aport) => aport.direction,
            None => break,
        };
        if direction.is_output() && pport.direction.is_output() {
            match ctx.db.source_of(array, &NetRef::Port(akey)) {
                None => {
                    ctx.db.connect(array, pin, NetRef::Port(akey))?;
                    existing = Some(akey);
                    break;
                }
                Some(current) if current == pin => {
                    existing = Some(akey);
                    break;
                }
                Some(_) => (),
            }
        } else if direction.is_input() && pport.direction.is_input() {
            match ctx.db.source_of(array, &pin) {
                None if !node.kind.is_any_cboxout() => {
                    ctx.db.connect(array, NetRef::Port(akey), pin)?;
                    existing = Some(akey);
                    break;
                }
                Some(current) if current == NetRef::Port(akey) => {
                    existing = Some(akey);
                    break;
                }
                _ => (),
            }
        }
        if node.kind.is_cboxout() {
            node = node.with_kind(SegmentNodeKind::ArrayCboxoutAlt);
            continue;
        }
        if node.kind.is_cboxout_alt() {
            return Err(FabricError::internal(format!(
                "all cbox-out bridges are used up in {}", ctx.db.module(array)
            )));
        }
        return Err(already_exposed(ctx));
    }

    let boxpos = if is_sbox {
        match key {
            InstanceKey::Sbox(pos, corner) => (pos, corner),
            _ => return Err(FabricError::internal(format!("switch box instance at {:?}", key))),
        }
    } else {
        let (pos, corner) = pport.boxpos.ok_or_else(|| FabricError::internal(format!(
            "{} does not know its routing box", ctx.db.net_name(array, &pin)
        )))?;
        (pos + offset, corner)
    };

    match existing {
        None => {
            let akey = PortKey::Node(node.into());
            let aport = Port::new(RoutingNodeId::from(node).name(ctx), pport.width, pport.direction)
                .with_boxpos(boxpos);
            ctx.db.module_mut(array).add_port(akey, aport)?;
            if pport.direction.is_input() {
                ctx.db.connect(array, NetRef::Port(akey), pin)?;
            } else {
                ctx.db.connect(array, pin, NetRef::Port(akey))?;
            }
            Ok(akey)
        }
        Some(akey) => {
            /* an input shared by several boxes remembers the most downstream one */
            if node.kind.is_regular_input() {
                if let Some(aport) = ctx.db.module_mut(array).port_mut(&akey) {
                    if let Some(old) = aport.boxpos {
                        aport.boxpos = Some(downstream_box(node.orientation, old, boxpos));
                    }
                }
            }
            Ok(akey)
        }
    }
}

fn downstream_box(ori: Orientation, old: (Position, Corner), new: (Position, Corner)) -> (Position, Corner) {
    let ((op, oc), (np, _)) = (old, new);
    let keep_old = match ori {
        Orientation::North => op.y > np.y || (op.y == np.y && oc.dotx(Dimension::Y).is_inc()),
        Orientation::East => op.x > np.x || (op.x == np.x && oc.dotx(Dimension::X).is_inc()),
        Orientation::South => op.y < np.y || (op.y == np.y && oc.dotx(Dimension::Y).is_dec()),
        Orientation::West => op.x < np.x || (op.x == np.x && oc.dotx(Dimension::X).is_dec()),
    };
    if keep_old { old } else { new }
}

/// Exposes a hierarchical pin up to the outermost array of its path.
///
/// Returns the pin on the outermost instance, or, with `create_port`, the
/// port of the outermost array the pin got promoted to.
pub fn expose_node(ctx: &mut Context, pin: &HierPin, create_port: bool) -> Result<NetRef> {
    let path = &pin.instance.path;
    let mut port = pin.port;
    for level in (1 .. path.len()).rev() {
        let (parent, key) = path[level];
        port = expose_one(ctx, parent, key, port)?;
    }
    let (parent, key) = path[0];
    if create_port {
        Ok(NetRef::Port(expose_one(ctx, parent, key, port)?))
    } else {
        Ok(NetRef::Pin(key, port))
    }
}

/// Where the search for the driver of a segment input starts.
#[derive(Clone, Debug)]
struct DriverSearch {
    /// The segment as the output of a switch box, in array coordinates
    node: SegmentNode,
    position: Position,
    ordering: [Corner; 4],
    start: usize,
}

fn prepare_segment_driver_search(db: &Database, array: ModelId, key: InstanceKey, port: PortKey)
    -> Result<DriverSearch>
{
    let model = db.instance_model(array, &key)?;
    let m = db.module(model);
    let segment = port.as_node().and_then(|n| n.as_segment()).ok_or_else(|| FabricError::internal(format!(
        "{} is not a segment node", db.net_name(array, &NetRef::Pin(key, port))
    )))?;
    let offset = key.position();
    let (mut position, corner) = match key {
        InstanceKey::Sbox(pos, corner) => (pos, corner),
        _ => {
            let (pos, corner) = m.port(&port).and_then(|p| p.boxpos).ok_or_else(|| FabricError::internal(
                format!("{} does not know its routing box", db.net_name(array, &NetRef::Pin(key, port)))
            ))?;
            (pos + offset, corner)
        }
    };
    let node = segment.moved(offset).with_kind(SegmentNodeKind::SwitchboxOut);
    let ori = node.orientation;
    let perp = corner.component(ori.dimension().perpendicular());
    let ordering = [
        Corner::compose(ori.opposite(), perp)?,
        Corner::compose(ori.opposite(), perp.opposite())?,
        Corner::compose(ori, perp)?,
        Corner::compose(ori, perp.opposite())?,
    ];
    if corner.dotx(ori.dimension()) != ori.direction() {
        position += ori.upstream_step();
    }
    let search = |position, start| DriverSearch { node, position, ordering, start };
    if !m.class.is_array() {
        return Ok(search(position, 0));
    }

    /* nodes of a sub-array: start right outside of it */
    let (north, east) = (offset.y + m.height as i32 - 1, offset.x + m.width as i32 - 1);
    let (south, west) = (offset.y, offset.x);
    let (x, y) = (position.x, position.y);
    Ok(match ori.dimension() {
        Dimension::Y => {
            let behind = if ori.is_north() { y < south } else { y > north };
            if behind || x < west || x > east {
                search(position, 0)
            } else if x == west && corner.dotx(Dimension::X).is_dec() {
                search(Position::new(west - 1, y), 1)
            } else if x == east && corner.dotx(Dimension::X).is_inc() {
                search(Position::new(east + 1, y), 1)
            } else if ori.is_north() {
                search(Position::new(x, south - 1), 2)
            } else {
                search(Position::new(x, north + 1), 2)
            }
        }
        Dimension::X => {
            let behind = if ori.is_east() { x < west } else { x > east };
            if behind || y < south || y > north {
                search(position, 0)
            } else if y == south && corner.dotx(Dimension::Y).is_dec() {
                search(Position::new(x, south - 1), 1)
            } else if y == north && corner.dotx(Dimension::Y).is_inc() {
                search(Position::new(x, north + 1), 1)
            } else if ori.is_east() {
                search(Position::new(west - 1, y), 2)
            } else {
                search(Position::new(east + 1, y), 2)
            }
        }
    })
}

/* Walks upstream along the segment, visiting the four corners of every
 * vertex in `ordering`, and collects the switch-box outputs (possibly
 * inside sub-arrays) driving `node`. */
fn find_segment_drivers(
    db: &Database,
    array: ModelId,
    node: SegmentNode,
    position: Position,
    ordering: &[Corner; 4],
    start: usize
) -> Result<Vec<HierPin>> {
    let m = db.module(array);
    let grid = grid(db, array)?;
    let ori = node.orientation;
    let mut drivers = Vec::new();
    let mut visited = BTreeSet::new();
    let (mut position, mut idx) = (position, start);
    let mut corner = ordering[idx];

    while !no_channel_for_switchbox(db, array, position, corner, ori, true) {
        if let Some(key) = grid.get_root(position, Some(corner)) {
            if visited.insert(key) {
                let model = db.instance_model(array, &key)?;
                let class = &db.module(model).class;
                let kpos = key.position();
                if class.is_switch_box() {
                    let port = PortKey::Node(node.moved(-kpos).into());
                    if db.module(model).has_port(&port) {
                        drivers.push(HierPin::new(HierInstance::new(array, key), port));
                    }
                } else if class.is_array() {
                    let port = PortKey::Node(node.with_kind(SegmentNodeKind::ArrayOutput).moved(-kpos).into());
                    if db.module(model).has_port(&port) {
                        drivers.push(HierPin::new(HierInstance::new(array, key), port));
                    } else {
                        for sub in find_segment_drivers(db, model, node.moved(-kpos), position - kpos, ordering, idx)? {
                            drivers.push(HierPin::new(sub.instance.above(array, key), sub.port));
                        }
                    }
                }
            }
        }

        idx = (idx + 1) % 4;
        (position, corner) = equiv_sbox_position(position, corner, Some(ordering[idx]));
        if idx == 0 {
            position += ori.upstream_step();
            /* stop once past the start of the segment */
            let section = match ori {
                Orientation::North => position.y - node.position.y + corner.dotx(Dimension::Y).case(1, 0),
                Orientation::East => position.x - node.position.x + corner.dotx(Dimension::X).case(1, 0),
                Orientation::South => node.position.y - position.y + corner.dotx(Dimension::Y).case(0, 1),
                Orientation::West => node.position.x - position.x + corner.dotx(Dimension::X).case(0, 1),
            };
            if section < 0 {
                break;
            }
            let outside = match ori {
                Orientation::North => position.y < 0,
                Orientation::East => position.x < 0,
                Orientation::South => position.y >= m.height as i32,
                Orientation::West => position.x >= m.width as i32,
            };
            if outside {
                break;
            }
        }
    }
    Ok(drivers)
}

/* Connects a connection-box output (pin `port` of the tile/array at `key`)
 * to a bridge of the switch box driving the same segment, adding a bridge
 * when every existing one is taken. */
fn connect_cboxout(ctx: &mut Context, array: ModelId, key: InstanceKey, port: PortKey, create_port: bool)
    -> Result<()>
{
    let model = ctx.db.instance_model(array, &key)?;
    let pin = NetRef::Pin(key, port);
    let (boxpos, segment) = match (ctx.db.module(model).port(&port), port.as_node()) {
        (Some(p), Some(RoutingNodeId::Segment(node))) => (p.boxpos, node),
        _ => return Err(FabricError::internal(format!(
            "{} is not a cbox-out node", ctx.db.net_name(array, &pin)
        ))),
    };
    let (pos, mut corner) = boxpos.ok_or_else(|| FabricError::internal(format!(
        "{} does not know its routing box", ctx.db.net_name(array, &pin)
    )))?;
    let mut pos = pos + key.position();
    let node = segment.moved(key.position());
    let ori = node.orientation;
    let perp = corner.component(ori.dimension().perpendicular());
    let others = [
        Corner::compose(ori.opposite(), perp.opposite())?,
        Corner::compose(ori, perp)?,
        Corner::compose(ori, perp.opposite())?,
    ];
    let mut others = others.iter();

    loop {
        if let Some(sbox) = hierarchical_root(&ctx.db, array, pos, Some(corner)) {
            let drv = node.moved(-sbox.position()).with_kind(SegmentNodeKind::SwitchboxOut);
            let sbox_model = sbox.model(&ctx.db)?;
            if ctx.db.module(sbox_model).has_port(&PortKey::Node(drv.into())) {
                for kind in [SegmentNodeKind::SwitchboxInFromCbox, SegmentNodeKind::SwitchboxInFromCboxAlt] {
                    let bkey = PortKey::Node(drv.with_kind(kind).into());
                    if !ctx.db.module(sbox_model).has_port(&bkey) {
                        continue;
                    }
                    if let Some(bridge) = usable_bridge(ctx, &sbox, bkey)? {
                        match ctx.db.source_of(array, &bridge) {
                            None => return ctx.db.connect(array, pin, bridge),
                            Some(current) if current == pin => return Ok(()),
                            Some(_) => (),
                        }
                    }
                }
                let bkey = add_cboxout(ctx, sbox_model, drv.with_kind(SegmentNodeKind::SwitchboxInFromCbox))?;
                dbg_log!(DBG_EXTRA, "Added bridge {} to {}",
                    ctx.db.module(sbox_model).port(&bkey).map(|p| p.name.as_str()).unwrap_or(""),
                    ctx.db.module(sbox_model));
                let bridge = expose_node(ctx, &HierPin::new(sbox, bkey), false)?;
                return ctx.db.connect(array, pin, bridge);
            }
        }
        match others.next() {
            Some(next) => {
                (pos, corner) = equiv_sbox_position(pos, corner, Some(*next));
            }
            None => break,
        }
    }
    if create_port {
        expose_node(ctx, &HierPin::new(HierInstance::new(array, key), port), true)?;
    }
    Ok(())
}

/* Follows the bridge `bkey` of a (possibly nested) switch box up to the
 * outermost array. Returns the net it shows up as there, or `None` when
 * something else inside the hierarchy already drives it. */
fn usable_bridge(ctx: &mut Context, sbox: &HierInstance, bkey: PortKey) -> Result<Option<NetRef>> {
    let mut level = sbox.path.len() - 1;
    let mut port = bkey;
    loop {
        let (parent, key) = sbox.path[level];
        let net = NetRef::Pin(key, port);
        if level == 0 {
            return Ok(Some(net));
        }
        match ctx.db.source_of(parent, &net) {
            None => {
                let unused = HierPin::new(HierInstance { path: sbox.path[..= level].to_vec() }, port);
                return expose_node(ctx, &unused, false).map(Some);
            }
            Some(NetRef::Pin(..)) => return Ok(None),
            Some(NetRef::Port(outer)) => {
                port = outer;
                level -= 1;
            }
        }
    }
}

pub struct ArrayBuilder<'a> {
    ctx: &'a mut Context,
    id: ModelId,
}

impl<'a> ArrayBuilder<'a> {
    pub(crate) fn new(ctx: &'a mut Context, id: ModelId) -> Self {
        Self { ctx, id }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    /// Places a switch box at `position`, or a tile/array rooted there.
    pub fn instantiate(&mut self, model: ModelId, position: Position) -> Result<InstanceKey> {
        let array = self.ctx.db.module(self.id);
        let sub = self.ctx.db.module(model);
        let grid = grid(&self.ctx.db, self.id)?;
        let (w, h) = (array.width, array.height);

        if let ModuleClass::SwitchBox { corner, .. } = sub.class {
            if !position.within(w, h) {
                return Err(FabricError::placement(format!("{} is not in {} ({}x{})", position, array, w, h)));
            }
            if grid.get_root(position, Some(corner)).is_some() {
                return Err(FabricError::placement(format!(
                    "switch box slot {} {} of {} is already occupied", position, corner, array
                )));
            }
            let key = InstanceKey::Sbox(position, corner);
            let name = format!("sb_ix{}y{}{}", position.x, position.y, corner.short_name());
            self.ctx.db.module_mut(self.id).add_instance(key, Instance { name, model })?;
            if let Some(grid) = self.ctx.db.module_mut(self.id).grid.as_mut() {
                grid.set(position, Some(corner), Cell::Instance(key))?;
            }
            return Ok(key);
        }
        if !sub.class.is_tile() && !sub.class.is_array() {
            return Err(FabricError::config(format!("cannot instantiate {} in {}", sub, array)));
        }

        /* check everything before touching the grid */
        let is_array = sub.class.is_array();
        let cells: Vec<(Position, OrientationTuple<bool>)> = (0 .. sub.width as i32)
            .flat_map(|x| (0 .. sub.height as i32).map(move |y| (x, y)))
            .map(|(x, y)| (Position::new(x, y), OrientationTuple {
                north: y == sub.height as i32 - 1,
                east: x == sub.width as i32 - 1,
                south: y == 0,
                west: x == 0,
            }))
            .collect();
        /* corners on the tile border belong to the switch boxes around it */
        let covers = |on_edge: &OrientationTuple<bool>, corner: Corner| {
            let (xo, yo) = corner.decompose();
            is_array || !(on_edge[xo] || on_edge[yo])
        };
        for (offset, on_edge) in &cells {
            let pos = position + *offset;
            if !pos.within(w, h) {
                return Err(FabricError::placement(format!("{} is not in {} ({}x{})", pos, array, w, h)));
            }
            if let Some(key) = grid.get_root(pos, None) {
                return Err(FabricError::placement(format!(
                    "{} in {} is occupied by {:?}", pos, array, key
                )));
            }
            for corner in Corner::ALL {
                if !covers(on_edge, corner) {
                    continue;
                }
                if let Some(key) = grid.get_root(pos, Some(corner)) {
                    return Err(FabricError::placement(format!(
                        "switch box slot {} {} of {} is occupied by {:?}", pos, corner, array, key
                    )));
                }
            }
            let array_on_edge = OrientationTuple {
                north: pos.y == h as i32 - 1 && array.edge.north,
                east: pos.x == w as i32 - 1 && array.edge.east,
                south: pos.y == 0 && array.edge.south,
                west: pos.x == 0 && array.edge.west,
            };
            for ori in Orientation::ALL {
                if (on_edge[ori] && sub.edge[ori]) != array_on_edge[ori] {
                    return Err(FabricError::placement(format!(
                        "{} placed at {} does not match the {} edge of {}", sub, position, ori, array
                    )));
                }
            }
        }

        let key = InstanceKey::Tile(position);
        let name = format!("t_ix{}y{}", position.x, position.y);
        dbg_log!(DBG_EXTRA, "Placing {} at {} in {}", sub, position, array);
        self.ctx.db.module_mut(self.id).add_instance(key, Instance { name, model })?;
        let grid = self.ctx.db.module_mut(self.id).grid.as_mut().ok_or_else(|| {
            FabricError::internal("array lost its placement grid")
        })?;
        for (offset, on_edge) in &cells {
            let pos = position + *offset;
            if *offset == Position::ORIGIN {
                grid.set(pos, None, Cell::Instance(key))?;
            } else {
                grid.set(pos, None, Cell::RootOffset(*offset))?;
            }
            for corner in Corner::ALL {
                if covers(on_edge, corner) {
                    grid.set(pos, Some(corner), Cell::RootOffset(*offset))?;
                }
            }
        }
        Ok(key)
    }

    /// Places and fills switch boxes at every free corner slot of
    /// `pattern.fill_corners`. With `Mode::Lookup` only boxes already placed
    /// are filled.
    ///
    /// # Arguments
    /// * `identifier` - prefix distinguishing the switch boxes of this array
    ///   from other boxes with the same environment
    pub fn fill(&mut self, pattern: &SwitchBoxPattern, identifier: Option<&str>, mode: Mode) -> Result<()> {
        self.fill_slots(pattern, identifier, mode, true)
    }

    /// Like `fill`, but switch boxes placed before are left as they are.
    pub fn fill_unplaced(&mut self, pattern: &SwitchBoxPattern, identifier: Option<&str>) -> Result<()> {
        self.fill_slots(pattern, identifier, Mode::Build, false)
    }

    fn fill_slots(
        &mut self,
        pattern: &SwitchBoxPattern,
        identifier: Option<&str>,
        mode: Mode,
        update_placed: bool
    ) -> Result<()> {
        dbg_log!(DBG_INFO, "Filling {} with {:?}", self.ctx.db.module(self.id), pattern.kind);
        let (w, h, edge) = {
            let m = self.ctx.db.module(self.id);
            (m.width as i32, m.height as i32, m.edge)
        };
        let mut processed = BTreeSet::new();
        for x in 0 .. w {
            for y in 0 .. h {
                let position = Position::new(x, y);
                for corner in pattern.fill_corners.iter().copied() {
                    let (xo, yo) = corner.decompose();
                    let on_edge = |ori: Orientation| match ori {
                        Orientation::North => y == h - 1,
                        Orientation::East => x == w - 1,
                        Orientation::South => y == 0,
                        Orientation::West => x == 0,
                    };
                    if (on_edge(xo) && edge[xo]) || (on_edge(yo) && edge[yo]) {
                        continue;
                    }
                    let root = grid(&self.ctx.db, self.id)?.get_root(position, Some(corner));
                    match root {
                        None if !mode.creates() => continue,
                        Some(key) if !update_placed || !self.is_switch_box(&key)? => continue,
                        _ => (),
                    }
                    let outputs = self.sbox_outputs(position, corner, &pattern.fill_corners)?;
                    if outputs.is_empty() {
                        continue;
                    }
                    let excluded: Vec<Orientation> = Orientation::ALL.iter().copied()
                        .filter(|ori| no_channel_for_switchbox(&self.ctx.db, self.id, position, corner, *ori, false))
                        .collect();
                    if excluded.len() == 4 {
                        continue;
                    }

                    let key = match root {
                        Some(key) => key,
                        None => {
                            let ident = sbox_identifier(identifier, &outputs, &excluded);
                            let sbox = self.ctx.build_switch_box(corner, Some(ident.as_str()))?.id();
                            self.instantiate(sbox, position)?
                        }
                    };
                    let model = self.ctx.db.instance_model(self.id, &key)?;
                    if !processed.insert(model) {
                        continue;
                    }
                    let mut builder = SwitchBoxBuilder::new(self.ctx, model);
                    for (output, (drivex, xo)) in &outputs {
                        let req = FillRequest {
                            output: *output,
                            drive_at_crosspoints: *drivex,
                            crosspoints_only: *xo,
                            excluded_inputs: OrientationTuple::from_orientations(&excluded),
                            mode: Mode::Build,
                        };
                        builder.fill(&req, &pattern.kind)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn is_switch_box(&self, key: &InstanceKey) -> Result<bool> {
        let model = self.ctx.db.instance_model(self.id, key)?;
        Ok(self.ctx.db.module(model).class.is_switch_box())
    }

    /* What the switch box at `corner` of `position` has to drive:
     * orientation -> (drive at crosspoints, crosspoints only). Besides its
     * own output it takes over outputs of unfilled corners of the same
     * vertex, and crosspoints of segments whose regular driver is missing. */
    fn sbox_outputs(&self, position: Position, corner: Corner, fill_corners: &BTreeSet<Corner>)
        -> Result<BTreeMap<Orientation, (bool, bool)>>
    {
        let db = &self.ctx.db;
        let m = db.module(self.id);
        let grid = grid(db, self.id)?;
        let nocfs = |pos, corner, ori, output| no_channel_for_switchbox(db, self.id, pos, corner, ori, output);
        let mut outputs: BTreeMap<Orientation, (bool, bool)> = BTreeMap::new();
        let (mut pos, mut cur) = (position, corner);
        loop {
            let primary = match cur {
                Corner::NorthEast => Orientation::South,
                Corner::NorthWest => Orientation::East,
                Corner::SouthEast => Orientation::West,
                Corner::SouthWest => Orientation::North,
            };
            if !nocfs(pos, cur, primary, true) {
                let drivex = outputs.get(&primary).map_or(false, |o| o.0) || nocfs(pos, cur, primary, false);
                outputs.insert(primary, (drivex, false));
            }
            /* the box supposed to drive the opposite way may be missing */
            let secondary = primary.opposite();
            if !nocfs(pos, cur, secondary, true) && nocfs(pos, cur, secondary, false) {
                let other = match secondary {
                    Orientation::North => Corner::SouthWest,
                    Orientation::East => Corner::NorthWest,
                    Orientation::South => Corner::NorthEast,
                    Orientation::West => Corner::SouthEast,
                };
                let (opos, ocorner) = equiv_sbox_position(pos, cur, Some(other));
                let missing = !opos.within(m.width, m.height) || match grid.get_root(opos, Some(ocorner)) {
                    Some(key) => !db.module(db.instance_model(self.id, &key)?).class.is_switch_box(),
                    None => false,
                };
                if missing {
                    let xo = outputs.get(&secondary).map_or(true, |o| o.1);
                    outputs.insert(secondary, (true, xo));
                }
            }
            (pos, cur) = equiv_sbox_position(pos, cur, None);
            if fill_corners.contains(&cur) {
                break;
            }
        }
        Ok(outputs)
    }

    fn global_input(&mut self, global: GlobalIdx) -> Result<PortKey> {
        let g = self.ctx.global(global);
        let mut port = Port::new(g.name.clone(), g.width, PortDirection::Input);
        port.global = Some(global);
        ensure_port(self.ctx, self.id, PortKey::Global(global), port)
    }

    /// Resolves the driver of every routing node of every instance.
    ///
    /// Sub-arrays are processed first, once per model. Nodes without a
    /// driver become ports of this array unless it is the top-level array
    /// (the default when `is_top` is not given).
    pub fn auto_connect(&mut self, is_top: Option<bool>) -> Result<()> {
        let is_top = is_top.unwrap_or(self.ctx.top() == Some(self.id));
        dbg_log!(DBG_INFO, "Auto-connecting {}{}", self.ctx.db.module(self.id), if is_top { " (top)" } else { "" });
        let instances: Vec<(InstanceKey, ModelId)> = self.ctx.db.module(self.id).instances().iter()
            .map(|(key, inst)| (*key, inst.model))
            .collect();

        let mut done = BTreeSet::new();
        for (_, model) in &instances {
            if self.ctx.db.module(*model).class.is_array() && done.insert(*model) {
                ArrayBuilder::new(self.ctx, *model).auto_connect(Some(false))?;
            }
        }

        for (key, model) in &instances {
            let ports: Vec<(PortKey, Port)> = self.ctx.db.module(*model).ports().iter()
                .map(|(k, p)| (*k, p.clone()))
                .collect();
            if let InstanceKey::Tile(_) = key {
                for (pkey, port) in &ports {
                    if let Some(global) = port.global {
                        let gkey = self.global_input(global)?;
                        self.ctx.db.connect(self.id, NetRef::Port(gkey), NetRef::Pin(*key, *pkey))?;
                    }
                }
            }
            for (pkey, port) in &ports {
                match pkey.as_node() {
                    Some(RoutingNodeId::Segment(node)) if node.kind.is_regular_input() => {
                        self.connect_segment_input(*key, *pkey, is_top)?;
                    }
                    Some(RoutingNodeId::Segment(node)) if node.kind.is_any_cboxout() && port.direction.is_output() => {
                        connect_cboxout(self.ctx, self.id, *key, *pkey, !is_top)?;
                    }
                    Some(RoutingNodeId::BlockPin(node)) if port.direction.is_input() => {
                        self.connect_block_pin(*key, *pkey, node, is_top)?;
                    }
                    _ => (),
                }
            }
        }
        Ok(())
    }

    fn connect_segment_input(&mut self, key: InstanceKey, port: PortKey, is_top: bool) -> Result<()> {
        let search = prepare_segment_driver_search(&self.ctx.db, self.id, key, port)?;
        let drivers = find_segment_drivers(
            &self.ctx.db, self.id, search.node, search.position, &search.ordering, search.start
        )?;
        let sink = NetRef::Pin(key, port);
        match drivers.as_slice() {
            [] if is_top => {
                dbg_log!(DBG_EXTRA, "{} is not driven", self.ctx.db.net_name(self.id, &sink));
                Ok(())
            }
            [] => expose_node(self.ctx, &HierPin::new(HierInstance::new(self.id, key), port), true).map(|_| ()),
            [driver] => {
                let source = expose_node(self.ctx, driver, false)?;
                self.ctx.db.connect(self.id, source, sink)
            }
            _ => {
                let names: Vec<String> = drivers.iter().map(|d| d.name(&self.ctx.db)).collect();
                Err(FabricError::internal(format!(
                    "multiple candidate drivers found for {}: {}",
                    self.ctx.db.net_name(self.id, &sink), names.join(", ")
                )))
            }
        }
    }

    fn connect_block_pin(&mut self, key: InstanceKey, port: PortKey, node: BlockPinNode, is_top: bool)
        -> Result<()>
    {
        let proto_pos = self.ctx.block_port(node.port)?.pin.map(|p| p.position).unwrap_or(Position::ORIGIN);
        let kpos = key.position();
        let tile_pos = node.position + kpos - proto_pos;
        match hierarchical_root(&self.ctx.db, self.id, tile_pos, None) {
            Some(tile) => {
                let tile_model = tile.model(&self.ctx.db)?;
                let src = PortKey::Node(node.moved(kpos - tile.position()).into());
                let src = if self.ctx.db.module(tile_model).has_port(&src) {
                    src
                } else {
                    match self.ctx.db.module(tile_model).instance(&InstanceKey::Subtile(node.subtile)) {
                        Some(blk) if blk.model == node.port.block =>
                            expose_blockpin(self.ctx, tile_model, node.subtile, node.port)?,
                        _ => return Ok(()),
                    }
                };
                let source = expose_node(self.ctx, &HierPin::new(tile, src), false)?;
                self.ctx.db.connect(self.id, source, NetRef::Pin(key, port))
            }
            None => {
                let (w, h) = (self.ctx.db.module(self.id).width, self.ctx.db.module(self.id).height);
                if !is_top && !tile_pos.within(w, h) {
                    expose_node(self.ctx, &HierPin::new(HierInstance::new(self.id, key), port), true)?;
                }
                Ok(())
            }
        }
    }
}

/* e.g. `S`, `Ss_ex_w`, `top_NnE` */
fn sbox_identifier(
    prefix: Option<&str>,
    outputs: &BTreeMap<Orientation, (bool, bool)>,
    excluded: &[Orientation]
) -> String {
    let mut parts: Vec<String> = prefix.map(String::from).into_iter().collect();
    let mut oid = String::new();
    for (ori, (drivex, xo)) in outputs {
        let initial = ori.initial();
        if *xo {
            oid.push(initial);
        } else if *drivex {
            oid.push(initial.to_ascii_uppercase());
            oid.push(initial);
        } else {
            oid.push(initial.to_ascii_uppercase());
        }
    }
    parts.push(oid);
    if !excluded.is_empty() {
        parts.push("ex".into());
        parts.push(excluded.iter().map(|o| o.initial()).collect());
    }
    parts.join("_")
}

#[cfg(test)]
mod tests;
