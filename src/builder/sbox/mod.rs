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

/* Switch boxes and the patterns filling them.
 *
 * A switch box sits at one corner of a tile. Its inputs are the ends (or
 * interior sections) of segments passing by that corner, its outputs start
 * new segments (or, at crosspoints, drive interior sections of long ones).
 * Every pattern below walks an ordered list of tracks built from the
 * segment catalog, so the result only depends on the catalog order. */

use std::collections::BTreeSet;

use crate::context::Context;
use crate::error::{FabricError, Result};
use crate::geometry::*;
use crate::log::*;
use crate::netlist::*;
use crate::node::*;
use super::{node_port, Mode};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternKind {
    Subset,
    Universal,
    Wilton,
    CycleFree,
    /// Tracks are grouped by `max_span` consecutive sections, connections
    /// never leave a group
    SpanLimited {
        #[serde(default)]
        max_span: Option<u32>,
    },
    TurnLimited {
        #[serde(default)]
        max_turn: Option<u32>,
    },
}

fn all_corners() -> BTreeSet<Corner> {
    Corner::ALL.iter().copied().collect()
}

/// A pattern plus the corners an array fills with it. Corners left out are
/// served by the boxes at the filled corners of the same vertex.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchBoxPattern {
    #[serde(flatten)]
    pub kind: PatternKind,
    #[serde(default = "all_corners")]
    pub fill_corners: BTreeSet<Corner>,
}

impl SwitchBoxPattern {
    pub fn new(kind: PatternKind) -> Self {
        Self { kind, fill_corners: all_corners() }
    }

    pub fn with_fill_corners<I>(mut self, corners: I) -> Self where
        I: IntoIterator<Item = Corner>
    {
        self.fill_corners = corners.into_iter().collect();
        self
    }
}

impl Default for SwitchBoxPattern {
    fn default() -> Self {
        Self::new(PatternKind::Wilton)
    }
}

/// What one `fill` call generates: the outputs in one orientation.
#[derive(Copy, Clone, Debug)]
pub struct FillRequest {
    pub output: Orientation,
    /// Also drive the interior sections of long segments
    pub drive_at_crosspoints: bool,
    /// Only drive interior sections
    pub crosspoints_only: bool,
    /// Input orientations to ignore, e.g. where no channel exists
    pub excluded_inputs: OrientationTuple<bool>,
    pub mode: Mode,
}

impl FillRequest {
    pub fn new(output: Orientation) -> Self {
        Self {
            output,
            drive_at_crosspoints: false,
            crosspoints_only: false,
            excluded_inputs: OrientationTuple::splat(false),
            mode: Mode::Build,
        }
    }

    /* U-turns are never generated */
    fn skips(&self, input: Orientation) -> bool {
        input == self.output.opposite() || self.excluded_inputs[input]
    }

    /* Output sections to drive for a segment of `length` */
    fn output_sections(&self, length: u32) -> std::ops::Range<u32> {
        let first = if self.crosspoints_only { 1 } else { 0 };
        let last = if self.drive_at_crosspoints { length } else { 1 };
        first .. last
    }
}

#[derive(Copy, Clone, Debug)]
struct Track {
    segment: SegmentIdx,
    orientation: Orientation,
    section: u32,
    index: u32,
}

/// Position of the start of `segment` relative to a switch box at `corner`,
/// for the segment reaching the box after `section` tiles.
pub fn segment_relative_position(
    corner: Corner,
    segment: &Segment,
    ori: Orientation,
    section: u32
) -> Result<Position> {
    if section > segment.length {
        return Err(FabricError::config(format!(
            "section {} does not exist in segment '{}'", section, segment.name
        )));
    }
    let section = section as i32;
    let dx = corner.dotx(Dimension::X);
    let dy = corner.dotx(Dimension::Y);
    Ok(match ori {
        Orientation::East => Position::new(-section + dx.case(1, 0), dy.case(0, -1)),
        Orientation::West => Position::new(section + dx.case(0, -1), dy.case(0, -1)),
        Orientation::North => Position::new(dx.case(0, -1), -section + dy.case(1, 0)),
        Orientation::South => Position::new(dx.case(0, -1), section + dy.case(0, -1)),
    })
}

/// Adds a bridge through which a connection box drives the switch-box output
/// `node` stands for. Falls back to the alternate bridge when the primary
/// one exists.
pub(crate) fn add_cboxout(ctx: &mut Context, sbox: ModelId, node: SegmentNode) -> Result<PortKey> {
    let has = |ctx: &Context, node: SegmentNode| {
        ctx.db.module(sbox).has_port(&PortKey::Node(node.into()))
    };
    let mut node = node;
    if node.kind == SegmentNodeKind::SwitchboxInFromCbox && has(ctx, node) {
        node = node.with_kind(SegmentNodeKind::SwitchboxInFromCboxAlt);
    }
    let name = RoutingNodeId::from(node).name(ctx);
    if has(ctx, node) {
        return Err(FabricError::internal(format!(
            "'{}' already added to {}", name, ctx.db.module(sbox)
        )));
    }
    let output = node.with_kind(SegmentNodeKind::SwitchboxOut);
    if !has(ctx, output) {
        return Err(FabricError::internal(format!(
            "{} does not have output '{}'",
            ctx.db.module(sbox), RoutingNodeId::from(output).name(ctx)
        )));
    }
    let key = PortKey::Node(node.into());
    let width = ctx.segment(node.segment).width;
    ctx.db.module_mut(sbox).add_port(key, Port::new(name, width, PortDirection::Input))?;
    ctx.db.connect(sbox, NetRef::Port(key), NetRef::Port(PortKey::Node(output.into())))?;
    Ok(key)
}

pub struct SwitchBoxBuilder<'a> {
    ctx: &'a mut Context,
    id: ModelId,
    corner: Corner,
}

impl<'a> SwitchBoxBuilder<'a> {
    pub(crate) fn new(ctx: &'a mut Context, id: ModelId) -> Self {
        let corner = match ctx.db.module(id).class {
            ModuleClass::SwitchBox { corner, .. } => corner,
            _ => Corner::NorthEast,
        };
        Self { ctx, id, corner }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn corner(&self) -> Corner {
        self.corner
    }

    /// Input port for `segment` running in `ori`, `section` tiles after its
    /// start (the end of the segment when not given).
    pub fn get_segment_input(
        &mut self,
        segment: SegmentIdx,
        ori: Orientation,
        section: Option<u32>,
        mode: Mode
    ) -> Result<Option<PortKey>> {
        let sgmt = self.ctx.segment(segment);
        let (width, section) = (sgmt.width, section.unwrap_or(sgmt.length));
        let position = segment_relative_position(self.corner, sgmt, ori, section)?;
        let node = SegmentNode::new(position, segment, ori, SegmentNodeKind::SwitchboxInRegular);
        node_port(self.ctx, self.id, node.into(), width, PortDirection::Input, mode)
    }

    pub fn get_segment_output(
        &mut self,
        segment: SegmentIdx,
        ori: Orientation,
        section: u32,
        mode: Mode
    ) -> Result<Option<PortKey>> {
        let sgmt = self.ctx.segment(segment);
        let width = sgmt.width;
        let position = segment_relative_position(self.corner, sgmt, ori, section)?;
        let node = SegmentNode::new(position, segment, ori, SegmentNodeKind::SwitchboxOut);
        node_port(self.ctx, self.id, node.into(), width, PortDirection::Output, mode)
    }

    fn segments(&self) -> Vec<(SegmentIdx, Segment)> {
        self.ctx.segments().map(|(idx, s)| (idx, s.clone())).collect()
    }

    fn connect_tracks(&mut self, input: Track, output: Track, mode: Mode) -> Result<()> {
        let i = self.get_segment_input(input.segment, input.orientation, Some(input.section), mode)?;
        let o = self.get_segment_output(output.segment, output.orientation, output.section, mode)?;
        if let (Some(i), Some(o)) = (i, o) {
            self.ctx.db.connect_bit(
                self.id,
                NetRef::Port(i).bit(input.index),
                NetRef::Port(o).bit(output.index)
            )?;
        }
        Ok(())
    }

    /* Segments ending here continue in the same orientation */
    fn connect_straight(&mut self, ori: Orientation, mode: Mode) -> Result<()> {
        for (idx, _) in self.segments() {
            let i = self.get_segment_input(idx, ori, None, mode)?;
            let o = self.get_segment_output(idx, ori, 0, mode)?;
            if let (Some(i), Some(o)) = (i, o) {
                self.ctx.db.connect(self.id, NetRef::Port(i), NetRef::Port(o))?;
            }
        }
        Ok(())
    }

    /// Generates the connections driving the outputs described by `req`.
    pub fn fill(&mut self, req: &FillRequest, pattern: &PatternKind) -> Result<()> {
        dbg_log!(DBG_INFO, "Filling {} towards {} with pattern {:?}",
            self.ctx.db.module(self.id), req.output, pattern);
        match pattern {
            PatternKind::Subset => self.fill_subset(req),
            PatternKind::Universal => self.fill_universal(req),
            PatternKind::Wilton => self.fill_wilton(req),
            PatternKind::CycleFree => self.fill_cycle_free(req),
            PatternKind::SpanLimited { max_span } => {
                let max_span = self.group_size(*max_span, "max_span")?;
                self.fill_span_limited(req, max_span)
            }
            PatternKind::TurnLimited { max_turn } => {
                let max_turn = self.group_size(*max_turn, "max_turn")?;
                self.fill_turn_limited(req, max_turn)
            }
        }
    }

    /* Group size of the span/turn-limited patterns, bounded by the channel width */
    fn group_size(&self, requested: Option<u32>, what: &str) -> Result<usize> {
        let channel_width = self.ctx.channel_width() as usize;
        match requested {
            None => Ok(channel_width),
            Some(0) => Err(FabricError::config(format!("{} must be positive", what))),
            Some(size) if size as usize > channel_width => {
                dbg_log!(DBG_WARN, "Overriding invalid {} ({}) with channel width: {}",
                    what, size, channel_width);
                Ok(channel_width)
            }
            Some(size) => Ok(size as usize),
        }
    }

    fn fill_subset(&mut self, req: &FillRequest) -> Result<()> {
        let oori = req.output;
        for (idx, sgmt) in self.segments() {
            for iori in Orientation::ALL {
                /* subsets only turn */
                if iori == oori || req.skips(iori) {
                    continue;
                }
                for osec in req.output_sections(sgmt.length) {
                    let isec = if iori.direction() == oori.direction() {
                        sgmt.length - osec
                    } else {
                        osec + 1
                    };
                    let i = self.get_segment_input(idx, iori, Some(isec), req.mode)?;
                    let o = self.get_segment_output(idx, oori, osec, req.mode)?;
                    if let (Some(i), Some(o)) = (i, o) {
                        self.ctx.db.connect(self.id, NetRef::Port(i), NetRef::Port(o))?;
                    }
                }
            }
        }
        Ok(())
    }

    fn fill_universal(&mut self, req: &FillRequest) -> Result<()> {
        let oori = req.output;
        let segments = self.segments();
        let track_list = |ori: Orientation| -> Vec<(SegmentIdx, u32, u32)> {
            let mut tracks = Vec::new();
            for (idx, sgmt) in &segments {
                let mut sections: Vec<u32> = (0 .. sgmt.length).collect();
                if ori.direction().is_dec() {
                    sections.reverse();
                }
                for sec in sections {
                    tracks.extend((0 .. sgmt.width).map(|i| (*idx, sec, i)));
                }
            }
            tracks
        };
        let otracks = track_list(oori);
        for iori in Orientation::ALL {
            if req.skips(iori) {
                continue;
            }
            if iori == oori {
                self.connect_straight(iori, req.mode)?;
                continue;
            }
            let itracks = track_list(iori);
            let same_dir = iori.direction() == oori.direction();
            for (i, (isgmt, isec, idx)) in itracks.iter().copied().enumerate() {
                let o = if same_dir { itracks.len() - 1 - i } else { i };
                let (osgmt, osec, odx) = otracks[o];
                if !req.drive_at_crosspoints && osec > 0 {
                    continue;
                }
                if req.drive_at_crosspoints && req.crosspoints_only && osec == 0 {
                    continue;
                }
                self.connect_tracks(
                    Track { segment: isgmt, orientation: iori, section: isec + 1, index: idx },
                    Track { segment: osgmt, orientation: oori, section: osec, index: odx },
                    req.mode
                )?;
            }
        }
        Ok(())
    }

    fn fill_wilton(&mut self, req: &FillRequest) -> Result<()> {
        let oori = req.output;
        let segments = self.segments();
        let rev = |iori: Orientation| iori.direction() == oori.direction();
        let ordered = |v: Vec<u32>, reverse: bool| -> Vec<u32> {
            if reverse { v.into_iter().rev().collect() } else { v }
        };

        if !req.crosspoints_only {
            let tracks: Vec<(usize, u32)> = segments.iter().enumerate()
                .flat_map(|(s, (_, sgmt))| (0 .. sgmt.width).map(move |i| (s, i)))
                .collect();
            let n = tracks.len() as i64;
            let mut o_balanced = 0;
            for iori in Orientation::ALL {
                if req.skips(iori) {
                    continue;
                }
                if iori == oori {
                    self.connect_straight(iori, req.mode)?;
                    continue;
                }
                /* input tracks are walked backwards when running the same way
                 * as the output, the rotation depends on the turn */
                let rotation = match (iori, oori) {
                    (Orientation::East, Orientation::North)
                    | (Orientation::North, Orientation::West)
                    | (Orientation::South, Orientation::West)
                    | (Orientation::South, Orientation::East) => 1,
                    _ => -1,
                };
                let mut itracks = tracks.clone();
                if rev(iori) {
                    itracks.reverse();
                }
                for (i, (is, idx)) in itracks.iter().copied().enumerate() {
                    let (os, odx) = tracks[(i as i64 + rotation).rem_euclid(n) as usize];
                    let isgmt = &segments[is];
                    self.connect_tracks(
                        Track { segment: isgmt.0, orientation: iori, section: isgmt.1.length, index: idx },
                        Track { segment: segments[os].0, orientation: oori, section: 0, index: odx },
                        req.mode
                    )?;
                }
                /* wires passing by: spread them over all outputs */
                let mut isegments: Vec<usize> = (0 .. segments.len()).collect();
                if rev(iori) {
                    isegments.reverse();
                }
                for is in isegments {
                    let (isgmt, sgmt) = &segments[is];
                    for isec in ordered((1 .. sgmt.length).collect(), rev(iori)) {
                        for idx in ordered((0 .. sgmt.width).collect(), rev(iori)) {
                            let (os, odx) = tracks[o_balanced];
                            o_balanced = (o_balanced + 1) % tracks.len();
                            self.connect_tracks(
                                Track { segment: *isgmt, orientation: iori, section: isec, index: idx },
                                Track { segment: segments[os].0, orientation: oori, section: 0, index: odx },
                                req.mode
                            )?;
                        }
                    }
                }
            }
        }

        if req.drive_at_crosspoints && segments.iter().any(|(_, s)| s.length > 1) {
            let tracks: Vec<(SegmentIdx, u32, u32)> = segments.iter()
                .flat_map(|(idx, sgmt)| (1 .. sgmt.length)
                    .flat_map(move |sec| (0 .. sgmt.width).map(move |i| (*idx, sec, i))))
                .collect();
            let mut o = 0;
            for iori in Orientation::ALL {
                if iori == oori || req.skips(iori) {
                    continue;
                }
                let mut isegments: Vec<&(SegmentIdx, Segment)> = segments.iter().collect();
                if rev(iori) {
                    isegments.reverse();
                }
                /* wires ending here first */
                for (isgmt, sgmt) in isegments.iter().copied() {
                    for idx in ordered((0 .. sgmt.width).collect(), rev(iori)) {
                        let (osgmt, osec, odx) = tracks[o];
                        o = (o + 1) % tracks.len();
                        self.connect_tracks(
                            Track { segment: *isgmt, orientation: iori, section: sgmt.length, index: idx },
                            Track { segment: osgmt, orientation: oori, section: osec, index: odx },
                            req.mode
                        )?;
                    }
                }
                for (isgmt, sgmt) in isegments.iter().copied() {
                    for isec in ordered((1 .. sgmt.length).collect(), rev(iori)) {
                        for idx in ordered((0 .. sgmt.width).collect(), rev(iori)) {
                            let (osgmt, osec, odx) = tracks[o];
                            o = (o + 1) % tracks.len();
                            self.connect_tracks(
                                Track { segment: *isgmt, orientation: iori, section: isec, index: idx },
                                Track { segment: osgmt, orientation: oori, section: osec, index: odx },
                                req.mode
                            )?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /* Every track gets a logical class: its index shifted by an offset per
     * orientation. Turns keep the class, except for one turn per rotation
     * sense which bumps it by one and may not wrap around. */
    fn fill_cycle_free(&mut self, req: &FillRequest) -> Result<()> {
        let oori = req.output;
        let segments = self.segments();
        let tracks: Vec<(SegmentIdx, u32, u32)> = segments.iter()
            .flat_map(|(idx, sgmt)| (0 .. sgmt.width).map(move |i| (*idx, sgmt.length, i)))
            .collect();
        let n = tracks.len() as i64;
        let lco = |ori: Orientation| -> i64 {
            match ori {
                Orientation::East => 0,
                Orientation::South => -1,
                Orientation::West => -2,
                Orientation::North => -3,
            }
        };
        for iori in Orientation::ALL {
            if req.skips(iori) {
                continue;
            }
            if iori == oori {
                self.connect_straight(iori, req.mode)?;
                continue;
            }
            let cycle_break = (oori.is_east() && iori.is_north()) || (oori.is_south() && iori.is_west());
            for (iti, (isgmt, ilength, isi)) in tracks.iter().copied().enumerate() {
                let ilc = (iti as i64 + lco(iori)).rem_euclid(n);
                let mut olc = (ilc + cycle_break as i64).rem_euclid(n);
                for isec in 0 .. ilength {
                    let input = match self.get_segment_input(isgmt, iori, Some(isec + 1), req.mode)? {
                        Some(input) => input,
                        None => continue,
                    };
                    if olc < ilc || (olc == ilc && cycle_break) {
                        continue;
                    }
                    let oti = (olc - lco(oori)).rem_euclid(n) as usize;
                    let (osgmt, olength, osi) = tracks[oti];
                    for osec in req.output_sections(olength) {
                        let output = match self.get_segment_output(osgmt, oori, osec, req.mode)? {
                            Some(output) => output,
                            None => continue,
                        };
                        self.ctx.db.connect_bit(
                            self.id,
                            NetRef::Port(input).bit(isi),
                            NetRef::Port(output).bit(osi)
                        )?;
                    }
                    olc = (olc + 1) % n;
                }
            }
        }
        Ok(())
    }

    fn fill_span_limited(&mut self, req: &FillRequest, max_span: usize) -> Result<()> {
        let oori = req.output;
        let segments = self.segments();
        /* one entry per section: (segment, index, section) */
        let tracks: Vec<(usize, u32, u32)> = segments.iter().enumerate()
            .flat_map(|(s, (_, sgmt))| (0 .. sgmt.width)
                .flat_map(move |i| (0 .. sgmt.length).map(move |sec| (s, i, sec))))
            .collect();
        /* last channel slot a track starting at slot `i` occupies */
        let reach = |i: usize| {
            let (s, _, sec) = tracks[i];
            i + (segments[s].1.length - 1 - sec) as usize
        };
        for i in 0 .. tracks.len() {
            if i / max_span != reach(i) / max_span {
                let (s, idx, _) = tracks[i];
                return Err(FabricError::internal(format!(
                    "unable to limit span to {}: track #{} ({}[{}]) reaches beyond the limit",
                    max_span, i, segments[s].1.name, idx
                )));
            }
        }
        for iori in Orientation::ALL {
            if req.skips(iori) {
                continue;
            }
            for i in 0 .. tracks.len().saturating_sub(1) {
                let o = i + 1;
                let (is, idx, isec) = tracks[i];
                let (os, odx, osec) = tracks[o];
                /* don't hop on a long track running past the group */
                if i / max_span != reach(o) / max_span {
                    continue;
                }
                if (osec == 0 && req.crosspoints_only) || (osec > 0 && !req.drive_at_crosspoints) {
                    continue;
                }
                self.connect_tracks(
                    Track { segment: segments[is].0, orientation: iori, section: isec + 1, index: idx },
                    Track { segment: segments[os].0, orientation: oori, section: osec, index: odx },
                    req.mode
                )?;
            }
        }
        Ok(())
    }

    fn fill_turn_limited(&mut self, req: &FillRequest, max_turn: usize) -> Result<()> {
        let oori = req.output;
        let segments = self.segments();
        if let Some((_, sgmt)) = segments.iter().find(|(_, s)| s.length as usize > max_turn) {
            return Err(FabricError::internal(format!(
                "unable to limit turns to {}: segment '{}' spans {} tiles",
                max_turn, sgmt.name, sgmt.length
            )));
        }
        let tracks: Vec<(usize, u32)> = segments.iter().enumerate()
            .flat_map(|(s, (_, sgmt))| (0 .. sgmt.width).map(move |i| (s, i)))
            .collect();
        for iori in Orientation::ALL {
            if req.skips(iori) {
                continue;
            }
            if iori == oori {
                self.connect_straight(iori, req.mode)?;
                continue;
            }
            for i in 0 .. tracks.len().saturating_sub(1) {
                let (is, idx) = tracks[i];
                let (isgmt, ilength) = (segments[is].0, segments[is].1.length);
                for isec in 0 .. ilength {
                    let o = i + isec as usize + 1;
                    if o >= tracks.len() || o / max_turn != i / max_turn {
                        continue;
                    }
                    let (os, odx) = tracks[o];
                    for osec in req.output_sections(segments[os].1.length) {
                        self.connect_tracks(
                            Track { segment: isgmt, orientation: iori, section: isec + 1, index: idx },
                            Track { segment: segments[os].0, orientation: oori, section: osec, index: odx },
                            req.mode
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
