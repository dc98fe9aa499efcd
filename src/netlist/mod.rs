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

/* Generic module/port/instance primitives the fabric builders operate on.
 *
 * Modules live in an arena (`Database`) and refer to each other by
 * `ModelId`. Instance pins are not stored: an instance has a pin for every
 * port its model has, including ports added to the model after the
 * instance was created. */

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{FabricError, Result};
use crate::geometry::*;
use crate::node::{GlobalIdx, RoutingNodeId};

pub mod grid;

pub use grid::{Cell, Grid};

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ModelId(pub usize);

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

impl PortDirection {
    pub fn opposite(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }

    pub fn is_input(self) -> bool {
        self == Self::Input
    }

    pub fn is_output(self) -> bool {
        self == Self::Output
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum PortKey {
    Node(RoutingNodeId),
    Global(GlobalIdx),
    /// User port of a block, by declaration index
    Block(u32),
}

impl PortKey {
    pub fn as_node(&self) -> Option<RoutingNodeId> {
        match self {
            Self::Node(node) => Some(*node),
            _ => None,
        }
    }
}

/// Where a block port sits on its block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockPinInfo {
    pub position: Position,
    /// `None` means the port may face any side (IO blocks)
    pub orientation: Option<Orientation>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Port {
    pub name: String,
    pub width: u32,
    pub direction: PortDirection,
    /// Position and corner of the routing box consuming/producing this node,
    /// relative to the owning tile or array
    pub boxpos: Option<(Position, Corner)>,
    pub pin: Option<BlockPinInfo>,
    pub global: Option<GlobalIdx>,
}

impl Port {
    pub fn new(name: String, width: u32, direction: PortDirection) -> Self {
        Self { name, width, direction, boxpos: None, pin: None, global: None }
    }

    pub fn with_boxpos(mut self, boxpos: (Position, Corner)) -> Self {
        self.boxpos = Some(boxpos);
        self
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstanceKey {
    /// Block instance inside a tile
    Subtile(Subtile),
    /// Connection box inside a tile
    Cbox(Orientation, u32),
    /// Tile or sub-array rooted at a position of an array
    Tile(Position),
    /// Switch box at a corner of an array cell
    Sbox(Position, Corner),
}

impl InstanceKey {
    pub fn position(&self) -> Position {
        match self {
            Self::Tile(pos) | Self::Sbox(pos, _) => *pos,
            Self::Subtile(_) | Self::Cbox(..) => Position::ORIGIN,
        }
    }

    pub fn corner(&self) -> Option<Corner> {
        match self {
            Self::Sbox(_, corner) => Some(*corner),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instance {
    pub name: String,
    pub model: ModelId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModuleClass {
    LogicBlock,
    IoBlock,
    SwitchBox { corner: Corner, identifier: Option<String> },
    ConnectionBox { tile: ModelId, orientation: Orientation, offset: u32, position: Position },
    Tile { disallow_segments_passthru: bool },
    Array,
}

impl ModuleClass {
    pub fn is_block(&self) -> bool {
        matches!(self, Self::LogicBlock | Self::IoBlock)
    }

    pub fn is_logic_block(&self) -> bool {
        matches!(self, Self::LogicBlock)
    }

    pub fn is_switch_box(&self) -> bool {
        matches!(self, Self::SwitchBox { .. })
    }

    pub fn is_connection_box(&self) -> bool {
        matches!(self, Self::ConnectionBox { .. })
    }

    pub fn is_tile(&self) -> bool {
        matches!(self, Self::Tile { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::LogicBlock => "logic_block",
            Self::IoBlock => "io_block",
            Self::SwitchBox { .. } => "switch_box",
            Self::ConnectionBox { .. } => "connection_box",
            Self::Tile { .. } => "tile",
            Self::Array => "array",
        }
    }
}

/// A net inside one module: one of its ports or a pin of one of its instances.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum NetRef {
    Port(PortKey),
    Pin(InstanceKey, PortKey),
}

impl NetRef {
    pub fn bit(self, bit: u32) -> BitRef {
        BitRef { net: self, bit }
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BitRef {
    pub net: NetRef,
    pub bit: u32,
}

#[derive(Clone, Debug)]
pub struct Module {
    pub name: String,
    pub class: ModuleClass,
    pub width: u32,
    pub height: u32,
    pub edge: OrientationTuple<bool>,
    /// Leaf cells (routing boxes, blocks) may merge several sources into one sink
    pub multi_source: bool,
    pub grid: Option<Grid>,
    ports: BTreeMap<PortKey, Port>,
    instances: BTreeMap<InstanceKey, Instance>,
    /* sink -> sources */
    conns: BTreeMap<BitRef, Vec<BitRef>>,
}

impl Module {
    pub fn new(name: String, class: ModuleClass, width: u32, height: u32) -> Self {
        let multi_source = matches!(
            class,
            ModuleClass::LogicBlock
                | ModuleClass::IoBlock
                | ModuleClass::SwitchBox { .. }
                | ModuleClass::ConnectionBox { .. }
        );
        let grid = if class.is_array() { Some(Grid::new(width, height)) } else { None };
        Self {
            name,
            class,
            width,
            height,
            edge: OrientationTuple::splat(false),
            multi_source,
            grid,
            ports: BTreeMap::new(),
            instances: BTreeMap::new(),
            conns: BTreeMap::new(),
        }
    }

    pub fn with_edge(mut self, edge: OrientationTuple<bool>) -> Self {
        self.edge = edge;
        self
    }

    pub fn ports(&self) -> &BTreeMap<PortKey, Port> {
        &self.ports
    }

    pub fn port(&self, key: &PortKey) -> Option<&Port> {
        self.ports.get(key)
    }

    pub fn port_mut(&mut self, key: &PortKey) -> Option<&mut Port> {
        self.ports.get_mut(key)
    }

    pub fn has_port(&self, key: &PortKey) -> bool {
        self.ports.contains_key(key)
    }

    pub fn instances(&self) -> &BTreeMap<InstanceKey, Instance> {
        &self.instances
    }

    pub fn instance(&self, key: &InstanceKey) -> Option<&Instance> {
        self.instances.get(key)
    }

    /// Iterates over `(sink, sources)` pairs.
    pub fn connections(&self) -> impl Iterator<Item = (&BitRef, &Vec<BitRef>)> {
        self.conns.iter()
    }

    pub fn sources(&self, sink: &BitRef) -> &[BitRef] {
        self.conns.get(sink).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn connection_count(&self) -> usize {
        self.conns.values().map(|v| v.len()).sum()
    }

    pub(crate) fn add_port(&mut self, key: PortKey, port: Port) -> Result<()> {
        if self.ports.contains_key(&key) {
            return Err(FabricError::internal(format!(
                "port '{}' already exists in module '{}'", port.name, self.name
            )));
        }
        self.ports.insert(key, port);
        Ok(())
    }

    pub(crate) fn add_instance(&mut self, key: InstanceKey, instance: Instance) -> Result<()> {
        if let Some(existing) = self.instances.get(&key) {
            return Err(FabricError::placement(format!(
                "slot {:?} in module '{}' is already occupied by '{}'",
                key, self.name, existing.name
            )));
        }
        self.instances.insert(key, instance);
        Ok(())
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.class.name(), self.name)
    }
}

/// Arena of every module built in a context.
#[derive(Clone, Debug, Default)]
pub struct Database {
    modules: Vec<Module>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, module: Module) -> ModelId {
        self.modules.push(module);
        ModelId(self.modules.len() - 1)
    }

    pub fn module(&self, id: ModelId) -> &Module {
        &self.modules[id.0]
    }

    pub fn module_mut(&mut self, id: ModelId) -> &mut Module {
        &mut self.modules[id.0]
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelId, &Module)> {
        self.modules.iter().enumerate().map(|(idx, m)| (ModelId(idx), m))
    }

    pub fn find(&self, name: &str) -> Option<ModelId> {
        self.iter().find(|(_, m)| m.name == name).map(|(id, _)| id)
    }

    /// Model of the instance at `key` in `module`.
    pub fn instance_model(&self, module: ModelId, key: &InstanceKey) -> Result<ModelId> {
        let m = self.module(module);
        m.instance(key)
            .map(|i| i.model)
            .ok_or_else(|| FabricError::internal(format!("no instance {:?} in {}", key, m)))
    }

    /// Resolves the port definition behind a net of `module`.
    pub fn net_port(&self, module: ModelId, net: &NetRef) -> Result<&Port> {
        let m = self.module(module);
        match net {
            NetRef::Port(key) => m.port(key),
            NetRef::Pin(inst, key) => {
                let model = self.instance_model(module, inst)?;
                self.module(model).port(key)
            }
        }
        .ok_or_else(|| FabricError::internal(format!(
            "net {:?} does not exist in {}", net, m
        )))
    }

    pub fn net_exists(&self, module: ModelId, net: &NetRef) -> bool {
        self.net_port(module, net).is_ok()
    }

    pub fn net_name(&self, module: ModelId, net: &NetRef) -> String {
        let m = self.module(module);
        let port_name = self.net_port(module, net)
            .map(|p| p.name.clone())
            .unwrap_or_else(|_| "<missing>".into());
        match net {
            NetRef::Port(_) => port_name,
            NetRef::Pin(inst, _) => {
                let inst_name = m.instance(inst).map(|i| i.name.as_str()).unwrap_or("<missing>");
                format!("{}.{}", inst_name, port_name)
            }
        }
    }

    /* Module inputs and instance outputs drive nets inside a module. */
    fn drives(&self, module: ModelId, net: &NetRef) -> Result<bool> {
        let direction = self.net_port(module, net)?.direction;
        Ok(match net {
            NetRef::Port(_) => direction.is_input(),
            NetRef::Pin(..) => direction.is_output(),
        })
    }

    /// Connects every bit of `source` to the matching bit of `sink`.
    pub fn connect(&mut self, module: ModelId, source: NetRef, sink: NetRef) -> Result<()> {
        let swidth = self.net_port(module, &source)?.width;
        let dwidth = self.net_port(module, &sink)?.width;
        if swidth != dwidth {
            return Err(FabricError::internal(format!(
                "width mismatch connecting {} ({}) to {} ({}) in {}",
                self.net_name(module, &source), swidth,
                self.net_name(module, &sink), dwidth,
                self.module(module)
            )));
        }
        for bit in 0 .. swidth {
            self.connect_bit(module, source.bit(bit), sink.bit(bit))?;
        }
        Ok(())
    }

    /// Connects a single bit, enforcing the at-most-one-driver rule outside
    /// of multi-source cells. Reconnecting the same pair is a no-op.
    pub fn connect_bit(&mut self, module: ModelId, source: BitRef, sink: BitRef) -> Result<()> {
        if !self.drives(module, &source.net)? {
            return Err(FabricError::internal(format!(
                "{} cannot drive anything in {}",
                self.net_name(module, &source.net), self.module(module)
            )));
        }
        if self.drives(module, &sink.net)? {
            return Err(FabricError::internal(format!(
                "{} cannot be driven in {}",
                self.net_name(module, &sink.net), self.module(module)
            )));
        }
        if source.bit >= self.net_port(module, &source.net)?.width
            || sink.bit >= self.net_port(module, &sink.net)?.width
        {
            return Err(FabricError::internal(format!(
                "bit index out of range connecting {}[{}] to {}[{}]",
                self.net_name(module, &source.net), source.bit,
                self.net_name(module, &sink.net), sink.bit
            )));
        }

        let m = self.module(module);
        if let Some(existing) = m.conns.get(&sink) {
            if existing.contains(&source) {
                return Ok(());
            }
            if !m.multi_source && !existing.is_empty() {
                return Err(FabricError::internal(format!(
                    "{}[{}] in {} is already driven by {}[{}]",
                    self.net_name(module, &sink.net), sink.bit, m,
                    self.net_name(module, &existing[0].net), existing[0].bit
                )));
            }
        }
        self.module_mut(module).conns.entry(sink).or_default().push(source);
        Ok(())
    }

    /// The net driving bit 0 of `sink`, if any.
    pub fn source_of(&self, module: ModelId, sink: &NetRef) -> Option<NetRef> {
        self.module(module)
            .sources(&sink.bit(0))
            .first()
            .map(|b| b.net)
    }

    pub fn dump(&self, module: ModelId) -> ModuleDump {
        let m = self.module(module);
        ModuleDump {
            name: m.name.clone(),
            class: m.class.name().into(),
            width: m.width,
            height: m.height,
            ports: m.ports.values()
                .map(|p| PortDump { name: p.name.clone(), width: p.width, direction: p.direction })
                .collect(),
            instances: m.instances.values()
                .map(|i| InstanceDump {
                    name: i.name.clone(),
                    model: self.module(i.model).name.clone(),
                })
                .collect(),
            connections: m.conns.iter()
                .map(|(sink, sources)| ConnectionDump {
                    sink: self.bit_name(module, sink),
                    sources: sources.iter().map(|s| self.bit_name(module, s)).collect(),
                })
                .collect(),
        }
    }

    fn bit_name(&self, module: ModelId, bit: &BitRef) -> String {
        format!("{}[{}]", self.net_name(module, &bit.net), bit.bit)
    }
}

/* Serializable views handed to the exporters */

#[derive(Clone, Debug, Serialize)]
pub struct PortDump {
    pub name: String,
    pub width: u32,
    pub direction: PortDirection,
}

#[derive(Clone, Debug, Serialize)]
pub struct InstanceDump {
    pub name: String,
    pub model: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConnectionDump {
    pub sink: String,
    pub sources: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ModuleDump {
    pub name: String,
    pub class: String,
    pub width: u32,
    pub height: u32,
    pub ports: Vec<PortDump>,
    pub instances: Vec<InstanceDump>,
    pub connections: Vec<ConnectionDump>,
}
