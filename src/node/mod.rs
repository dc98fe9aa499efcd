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

/* Routing-node identities.
 *
 * Every routing net in the fabric is keyed by one of these. Prototypes
 * (segments, block ports) are referred to by index, so two structurally
 * identical ports of different blocks never compare equal. */

use crate::context::Context;
use crate::geometry::*;
use crate::netlist::ModelId;

/// A wire prototype.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    /// Number of parallel tracks per channel per orientation
    pub width: u32,
    /// Number of tiles spanned
    pub length: u32,
}

/// Index of a segment in the catalog of a [`Context`].
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SegmentIdx(pub usize);

/// A broadcast net (clock, reset...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Global {
    pub name: String,
    pub width: u32,
    pub is_clock: bool,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct GlobalIdx(pub usize);

/// Identity of a user port of a block: the block model and the port index.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockPortRef {
    pub block: ModelId,
    pub port: u32,
}

/// A direct inter-block wire that bypasses the routing channels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectTunnel {
    pub name: String,
    pub source: BlockPortRef,
    pub sink: BlockPortRef,
    /// Position of the source port relative to the sink port
    pub offset: Position,
}

/* Which side of which box a segment node sits on. Nodes keep their
 * position/segment/orientation when promoted through the hierarchy, only
 * the kind changes (see `lifted`). */
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum SegmentNodeKind {
    /// Output of a switch box driving the first (or a crosspoint) section
    SwitchboxOut,
    SwitchboxInRegular,
    /// Bridge through which a connection box drives a switch-box output
    SwitchboxInFromCbox,
    SwitchboxInFromCboxAlt,
    CboxOut,
    CboxIn,
    ArrayInput,
    ArrayOutput,
    ArrayCboxout,
    ArrayCboxoutAlt,
}

impl SegmentNodeKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::SwitchboxOut => "so",
            Self::SwitchboxInRegular | Self::CboxIn | Self::ArrayInput => "bi",
            Self::ArrayOutput => "bo",
            Self::SwitchboxInFromCbox | Self::CboxOut | Self::ArrayCboxout => "cu",
            Self::SwitchboxInFromCboxAlt | Self::ArrayCboxoutAlt => "cv",
        }
    }

    /// Kind of the port representing this node one hierarchy level up.
    /// Alternate cbox-out bridges collapse onto the primary slot; the
    /// exposing array moves them back if that slot is taken.
    pub fn lifted(self) -> Self {
        match self {
            Self::SwitchboxOut | Self::ArrayOutput => Self::ArrayOutput,
            Self::SwitchboxInRegular | Self::CboxIn | Self::ArrayInput => Self::ArrayInput,
            Self::SwitchboxInFromCbox
            | Self::SwitchboxInFromCboxAlt
            | Self::CboxOut
            | Self::ArrayCboxout
            | Self::ArrayCboxoutAlt => Self::ArrayCboxout,
        }
    }

    pub fn is_switchbox_out(self) -> bool {
        self == Self::SwitchboxOut
    }

    pub fn is_regular_input(self) -> bool {
        matches!(self, Self::SwitchboxInRegular | Self::CboxIn | Self::ArrayInput)
    }

    pub fn is_regular_output(self) -> bool {
        self == Self::ArrayOutput
    }

    pub fn is_cboxout(self) -> bool {
        matches!(self, Self::SwitchboxInFromCbox | Self::CboxOut | Self::ArrayCboxout)
    }

    pub fn is_cboxout_alt(self) -> bool {
        matches!(self, Self::SwitchboxInFromCboxAlt | Self::ArrayCboxoutAlt)
    }

    pub fn is_any_cboxout(self) -> bool {
        self.is_cboxout() || self.is_cboxout_alt()
    }
}

/// A routing track: where the segment starts, which prototype, which way
/// it runs, and which box pin represents it.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SegmentNode {
    pub position: Position,
    pub segment: SegmentIdx,
    pub orientation: Orientation,
    pub kind: SegmentNodeKind,
}

impl SegmentNode {
    pub fn new(
        position: Position,
        segment: SegmentIdx,
        orientation: Orientation,
        kind: SegmentNodeKind
    ) -> Self {
        Self { position, segment, orientation, kind }
    }

    pub fn moved(self, offset: Position) -> Self {
        Self { position: self.position + offset, ..self }
    }

    pub fn with_kind(self, kind: SegmentNodeKind) -> Self {
        Self { kind, ..self }
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockPinNode {
    pub position: Position,
    pub port: BlockPortRef,
    pub subtile: Subtile,
}

impl BlockPinNode {
    pub fn new(position: Position, port: BlockPortRef, subtile: Subtile) -> Self {
        Self { position, port, subtile }
    }

    pub fn moved(self, offset: Position) -> Self {
        Self { position: self.position + offset, ..self }
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum RoutingNodeId {
    Segment(SegmentNode),
    BlockPin(BlockPinNode),
}

impl RoutingNodeId {
    pub fn position(&self) -> Position {
        match self {
            Self::Segment(node) => node.position,
            Self::BlockPin(node) => node.position,
        }
    }

    pub fn moved(self, offset: Position) -> Self {
        match self {
            Self::Segment(node) => Self::Segment(node.moved(offset)),
            Self::BlockPin(node) => Self::BlockPin(node.moved(offset)),
        }
    }

    pub fn as_segment(&self) -> Option<SegmentNode> {
        match self {
            Self::Segment(node) => Some(*node),
            Self::BlockPin(_) => None,
        }
    }

    pub fn as_block_pin(&self) -> Option<BlockPinNode> {
        match self {
            Self::Segment(_) => None,
            Self::BlockPin(node) => Some(*node),
        }
    }

    /// Port name of this node. Names are unique among the ports of one
    /// module; nodes of different modules may share a name.
    pub fn name(&self, ctx: &Context) -> String {
        match self {
            Self::Segment(node) => format!(
                "{}_{}_{}",
                node.kind.prefix(),
                coord_tag(node.position) + &node.orientation.initial().to_string(),
                ctx.segment(node.segment).name
            ),
            Self::BlockPin(node) => format!(
                "bp_{}i{}_{}_{}",
                coord_tag(node.position),
                node.subtile,
                ctx.db.module(node.port.block).name,
                ctx.block_port_name(node.port)
            ),
        }
    }
}

impl From<SegmentNode> for RoutingNodeId {
    fn from(node: SegmentNode) -> Self {
        Self::Segment(node)
    }
}

impl From<BlockPinNode> for RoutingNodeId {
    fn from(node: BlockPinNode) -> Self {
        Self::BlockPin(node)
    }
}

/* `x3y0`, `u1v2` for (-1, -2) */
pub fn coord_tag(pos: Position) -> String {
    format!(
        "{}{}{}{}",
        if pos.x >= 0 { 'x' } else { 'u' }, pos.x.abs(),
        if pos.y >= 0 { 'y' } else { 'v' }, pos.y.abs()
    )
}
