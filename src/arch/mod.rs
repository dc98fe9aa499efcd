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

/* Architecture descriptions. A YAML document lists the catalog (segments,
 * globals, blocks, tunnels) followed by tiles and arrays in dependency
 * order; `Architecture::build` replays it against a fresh `Context`. */

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use flate2::read::GzDecoder;
use memmap2::Mmap;

use crate::builder::array::ArrayBuilder;
use crate::builder::sbox::SwitchBoxPattern;
use crate::builder::Mode;
use crate::context::{Context, TileOptions};
use crate::error::{FabricError, Result};
use crate::fc::BlockFcValue;
use crate::geometry::*;
use crate::log::*;
use crate::netlist::*;
use crate::node::BlockPortRef;

pub struct OpenOpts {
    /// Plain YAML instead of gzip
    pub raw: bool,
}

impl Default for OpenOpts {
    fn default() -> Self {
        Self {
            raw: false
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SegmentDesc {
    pub name: String,
    pub width: u32,
    pub length: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GlobalDesc {
    pub name: String,
    #[serde(default = "one")]
    pub width: u32,
    #[serde(default)]
    pub is_clock: bool,
}

fn one() -> u32 {
    1
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Logic,
    Io,
}

/// A block port. Global ports name their global wire instead of a
/// direction and width.
#[derive(Clone, Debug, Deserialize)]
pub struct PortDesc {
    pub name: String,
    #[serde(default)]
    pub direction: Option<PortDirection>,
    #[serde(default = "one")]
    pub width: u32,
    #[serde(default)]
    pub global: Option<String>,
    /// Required for logic blocks, IO ports face every side when missing
    #[serde(default)]
    pub orientation: Option<Orientation>,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BlockDesc {
    pub name: String,
    pub kind: BlockKind,
    #[serde(default = "one")]
    pub width: u32,
    #[serde(default = "one")]
    pub height: u32,
    #[serde(default)]
    pub ports: Vec<PortDesc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PortRefDesc {
    pub block: String,
    pub port: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TunnelDesc {
    pub name: String,
    pub source: PortRefDesc,
    pub sink: PortRefDesc,
    pub offset: Position,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TileDesc {
    #[serde(default)]
    pub name: Option<String>,
    pub block: String,
    #[serde(default)]
    pub capacity: Option<u32>,
    /// Fabric edges the tile sits on
    #[serde(default)]
    pub edge: BTreeSet<Orientation>,
    #[serde(default)]
    pub disallow_segments_passthru: bool,
    #[serde(default)]
    pub fc: BlockFcValue,
    /// FC per block name
    #[serde(default)]
    pub fc_overrides: BTreeMap<String, BlockFcValue>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PlacementDesc {
    pub model: String,
    pub position: Position,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ArrayDesc {
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub top: bool,
    /// Fabric edges of a non-top array
    #[serde(default)]
    pub edge: Option<BTreeSet<Orientation>>,
    #[serde(default)]
    pub pattern: Option<SwitchBoxPattern>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub placements: Vec<PlacementDesc>,
}

/// A complete architecture description.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Architecture {
    #[serde(default)]
    pub segments: Vec<SegmentDesc>,
    #[serde(default)]
    pub globals: Vec<GlobalDesc>,
    #[serde(default)]
    pub blocks: Vec<BlockDesc>,
    #[serde(default)]
    pub tunnels: Vec<TunnelDesc>,
    #[serde(default)]
    pub tiles: Vec<TileDesc>,
    #[serde(default)]
    pub arrays: Vec<ArrayDesc>,
}

/// Loads an architecture description, gzip-compressed unless `opts.raw`.
pub fn open<P>(path: P, opts: OpenOpts) -> Result<Architecture> where
    P: AsRef<Path>
{
    let file = File::open(path)?;
    /* RAW mode maps the file and parses it in place */
    let arch = if opts.raw {
        /* UNSAFE DUE TO A POTENTIAL UB WHEN A FILE IS CHANGED! */
        let mmapped = unsafe { Mmap::map(&file) }?;
        serde_yaml::from_slice(&mmapped[..])?
    } else {
        serde_yaml::from_reader(BufReader::new(GzDecoder::new(file)))?
    };
    Ok(arch)
}

fn edge_of(oris: &BTreeSet<Orientation>) -> OrientationTuple<bool> {
    OrientationTuple::from_orientations(oris)
}

impl Architecture {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Replays the description: creates the catalog, then builds, fills and
    /// connects every tile and array. Arrays that are not placed anywhere
    /// are auto-connected last, which resolves their sub-arrays too.
    pub fn build(&self) -> Result<Context> {
        let mut ctx = Context::new();
        for s in &self.segments {
            ctx.create_segment(&s.name, s.width, s.length)?;
        }
        for g in &self.globals {
            ctx.create_global(&g.name, g.width, g.is_clock)?;
        }
        for b in &self.blocks {
            self.build_block(&mut ctx, b)?;
        }
        for t in &self.tunnels {
            let source = find_port(&ctx, &t.source)?;
            let sink = find_port(&ctx, &t.sink)?;
            ctx.create_tunnel(&t.name, source, sink, t.offset)?;
        }
        for t in &self.tiles {
            let block = find_model(&ctx, &t.block)?;
            let opts = TileOptions {
                name: t.name.clone(),
                edge: edge_of(&t.edge),
                disallow_segments_passthru: t.disallow_segments_passthru,
            };
            let mut tile = ctx.build_tile(block, t.capacity, opts)?;
            tile.fill(&t.fc, &t.fc_overrides)?;
            tile.auto_connect()?;
        }

        let mut placed = BTreeSet::new();
        let mut arrays = Vec::new();
        for a in &self.arrays {
            let models = a.placements.iter()
                .map(|p| find_model(&ctx, &p.model).map(|m| (m, p.position)))
                .collect::<Result<Vec<_>>>()?;
            let edge = a.edge.as_ref().map(edge_of);
            let mut array = ctx.build_array(&a.name, a.width, a.height, a.top, edge)?;
            for (model, position) in models {
                array.instantiate(model, position)?;
                placed.insert(model);
            }
            let pattern = a.pattern.clone().unwrap_or_default();
            array.fill(&pattern, a.identifier.as_deref(), Mode::Build)?;
            arrays.push(array.id());
        }
        for id in arrays.into_iter().filter(|id| !placed.contains(id)) {
            dbg_log!(DBG_INFO, "Connecting array {}", ctx.db.module(id));
            ArrayBuilder::new(&mut ctx, id).auto_connect(None)?;
        }
        Ok(ctx)
    }

    fn build_block(&self, ctx: &mut Context, b: &BlockDesc) -> Result<()> {
        let globals = b.ports.iter()
            .map(|p| match &p.global {
                Some(g) => ctx.find_global(g).map(Some).ok_or_else(|| FabricError::config(format!(
                    "port '{}' of block '{}' uses unknown global '{}'", p.name, b.name, g
                ))),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;

        match b.kind {
            BlockKind::Logic => {
                let mut block = ctx.build_logic_block(&b.name, b.width, b.height)?;
                for (p, global) in b.ports.iter().zip(globals) {
                    let ori = p.orientation.ok_or_else(|| FabricError::config(format!(
                        "port '{}' of logic block '{}' has no orientation", p.name, b.name
                    )))?;
                    match (global, direction(b, p)?) {
                        (Some(g), _) => block.create_global(g, ori, p.position, Some(&p.name))?,
                        (None, PortDirection::Input) => block.create_input(&p.name, p.width, ori, p.position)?,
                        (None, PortDirection::Output) => block.create_output(&p.name, p.width, ori, p.position)?,
                    };
                }
            }
            BlockKind::Io => {
                if b.width != 1 || b.height != 1 {
                    return Err(FabricError::config(format!("IO block '{}' must be 1x1", b.name)));
                }
                let mut block = ctx.build_io_block(&b.name)?;
                for (p, global) in b.ports.iter().zip(globals) {
                    match (global, direction(b, p)?) {
                        (Some(g), _) => block.create_global(g, p.orientation, Some(&p.name))?,
                        (None, PortDirection::Input) => block.create_input(&p.name, p.width, p.orientation)?,
                        (None, PortDirection::Output) => block.create_output(&p.name, p.width, p.orientation)?,
                    };
                }
            }
        }
        Ok(())
    }
}

fn direction(b: &BlockDesc, p: &PortDesc) -> Result<PortDirection> {
    match (p.direction, &p.global) {
        (Some(d), None) => Ok(d),
        (Some(PortDirection::Input) | None, Some(_)) => Ok(PortDirection::Input),
        (_, _) => Err(FabricError::config(format!(
            "port '{}' of block '{}' needs a direction, or a global and no output direction",
            p.name, b.name
        ))),
    }
}

fn find_model(ctx: &Context, name: &str) -> Result<ModelId> {
    ctx.db.find(name).ok_or_else(|| FabricError::config(format!("no module named '{}'", name)))
}

fn find_port(ctx: &Context, desc: &PortRefDesc) -> Result<BlockPortRef> {
    let block = find_model(ctx, &desc.block)?;
    ctx.find_block_port(block, &desc.port).ok_or_else(|| FabricError::config(format!(
        "block '{}' has no port '{}'", desc.block, desc.port
    )))
}
