use super::*;

use std::collections::{BTreeMap, BTreeSet};

fn context(segments: &[(&str, u32, u32)]) -> Context {
    let mut ctx = Context::new();
    for (name, width, length) in segments {
        ctx.create_segment(name, *width, *length).unwrap();
    }
    ctx
}

fn fill_all(ctx: &mut Context, corner: Corner, kind: &PatternKind, drivex: bool) -> ModelId {
    let mut sbox = ctx.build_switch_box(corner, None).unwrap();
    for output in Orientation::ALL {
        let mut req = FillRequest::new(output);
        req.drive_at_crosspoints = drivex;
        sbox.fill(&req, kind).unwrap();
    }
    sbox.id()
}

fn node_of(net: NetRef) -> SegmentNode {
    match net {
        NetRef::Port(PortKey::Node(RoutingNodeId::Segment(node))) => node,
        other => panic!("unexpected net {:?}", other),
    }
}

/* (input node, input bit, output node, output bit) */
fn edges(ctx: &Context, id: ModelId) -> Vec<(SegmentNode, u32, SegmentNode, u32)> {
    ctx.db.module(id).connections()
        .flat_map(|(sink, sources)| sources.iter()
            .map(move |src| (node_of(src.net), src.bit, node_of(sink.net), sink.bit)))
        .collect()
}

#[test]
fn test_segment_relative_position() {
    let ctx = context(&[("L4", 1, 4)]);
    let l4 = ctx.segment(SegmentIdx(0));
    let pos = |corner, ori, section| segment_relative_position(corner, l4, ori, section).unwrap();
    /* a wire starting at the north-east corner begins in the next tile */
    assert_eq!(pos(Corner::NorthEast, Orientation::North, 0), Position::new(0, 1));
    assert_eq!(pos(Corner::NorthEast, Orientation::East, 0), Position::new(1, 0));
    /* and one ending there started `length - 1` tiles back */
    assert_eq!(pos(Corner::NorthEast, Orientation::North, 4), Position::new(0, -3));
    assert_eq!(pos(Corner::SouthWest, Orientation::West, 4), Position::new(3, -1));
    assert_eq!(pos(Corner::SouthWest, Orientation::South, 0), Position::new(-1, -1));
    assert!(segment_relative_position(Corner::NorthEast, l4, Orientation::East, 5).is_err());
}

#[test]
fn test_no_u_turns() {
    let kinds = [
        PatternKind::Subset,
        PatternKind::Universal,
        PatternKind::Wilton,
        PatternKind::CycleFree,
        PatternKind::SpanLimited { max_span: None },
        PatternKind::TurnLimited { max_turn: None },
    ];
    for kind in &kinds {
        for corner in Corner::ALL {
            let mut ctx = context(&[("L1", 4, 1), ("L2", 2, 2)]);
            let id = fill_all(&mut ctx, corner, kind, true);
            let edges = edges(&ctx, id);
            assert!(!edges.is_empty(), "{:?} generated nothing", kind);
            for (input, _, output, _) in edges {
                assert_ne!(input.orientation, output.orientation.opposite(), "{:?}", kind);
                assert_eq!(input.kind, SegmentNodeKind::SwitchboxInRegular);
                assert_eq!(output.kind, SegmentNodeKind::SwitchboxOut);
            }
        }
    }
}

#[test]
fn test_subset_only_turns() {
    let mut ctx = context(&[("L1", 2, 1)]);
    let id = {
        let mut sbox = ctx.build_switch_box(Corner::NorthEast, None).unwrap();
        sbox.fill(&FillRequest::new(Orientation::North), &PatternKind::Subset).unwrap();
        let mut req = FillRequest::new(Orientation::South);
        req.excluded_inputs.east = true;
        sbox.fill(&req, &PatternKind::Subset).unwrap();
        sbox.id()
    };
    let mut sources: BTreeMap<(Orientation, u32), Vec<(Orientation, u32)>> = BTreeMap::new();
    for (input, ibit, output, obit) in edges(&ctx, id) {
        assert_eq!(ibit, obit);
        sources.entry((output.orientation, obit)).or_default().push((input.orientation, ibit));
    }
    assert_eq!(sources[&(Orientation::North, 0)].len(), 2);
    assert_eq!(sources[&(Orientation::North, 1)].len(), 2);
    assert_eq!(sources[&(Orientation::South, 0)], vec![(Orientation::West, 0)]);
}

#[test]
fn test_wilton_permutes_tracks() {
    for kind in [PatternKind::Wilton, PatternKind::Universal] {
        let mut ctx = context(&[("L1", 4, 1)]);
        let id = {
            let mut sbox = ctx.build_switch_box(Corner::SouthEast, None).unwrap();
            sbox.fill(&FillRequest::new(Orientation::North), &kind).unwrap();
            sbox.id()
        };
        let mut per_input: BTreeMap<Orientation, BTreeSet<u32>> = BTreeMap::new();
        let mut per_output: BTreeMap<u32, usize> = BTreeMap::new();
        for (input, _, output, obit) in edges(&ctx, id) {
            assert_eq!(output.orientation, Orientation::North);
            per_input.entry(input.orientation).or_default().insert(obit);
            *per_output.entry(obit).or_default() += 1;
        }
        /* straight, from the east and from the west */
        assert_eq!(per_input.len(), 3, "{:?}", kind);
        for outputs in per_input.values() {
            assert_eq!(outputs.len(), 4, "{:?}", kind);
        }
        assert!(per_output.values().all(|cnt| *cnt == 3), "{:?}", kind);
    }
}

#[test]
fn test_crosspoints_only() {
    let mut ctx = context(&[("L3", 1, 3)]);
    let id = {
        let mut sbox = ctx.build_switch_box(Corner::NorthEast, None).unwrap();
        let mut req = FillRequest::new(Orientation::East);
        req.drive_at_crosspoints = true;
        req.crosspoints_only = true;
        sbox.fill(&req, &PatternKind::Wilton).unwrap();
        sbox.id()
    };
    let edges = edges(&ctx, id);
    assert!(!edges.is_empty());
    /* every driven section starts behind the box */
    for (_, _, output, _) in edges {
        assert!(output.position.x <= 0, "{:?}", output);
    }
}

/* Tiles the plane with one switch-box model and checks the resulting wire
 * graph for loops. Wires are identified by absolute start position,
 * orientation and bit. */
#[test]
fn test_cycle_free_has_no_loops() {
    for width in [1, 3, 4] {
        let mut ctx = context(&[("L1", width, 1)]);
        let id = fill_all(&mut ctx, Corner::NorthEast, &PatternKind::CycleFree, false);
        let edges = edges(&ctx, id);
        assert!(!edges.is_empty());

        type Wire = (Position, Orientation, u32);
        let mut graph: BTreeMap<Wire, Vec<Wire>> = BTreeMap::new();
        for x in 0 .. 5 {
            for y in 0 .. 5 {
                let at = Position::new(x, y);
                for (input, ibit, output, obit) in &edges {
                    graph.entry((at + input.position, input.orientation, *ibit))
                        .or_default()
                        .push((at + output.position, output.orientation, *obit));
                }
            }
        }

        /* 0: unvisited, 1: on stack, 2: done */
        fn visit(graph: &BTreeMap<Wire, Vec<Wire>>, wire: Wire, state: &mut BTreeMap<Wire, u8>) -> bool {
            match state.get(&wire) {
                Some(1) => return false,
                Some(2) => return true,
                _ => (),
            }
            state.insert(wire, 1);
            for next in graph.get(&wire).map(|v| v.as_slice()).unwrap_or(&[]) {
                if !visit(graph, *next, state) {
                    return false;
                }
            }
            state.insert(wire, 2);
            true
        }

        let mut state = BTreeMap::new();
        for wire in graph.keys() {
            assert!(visit(&graph, *wire, &mut state), "loop through {:?} (width {})", wire, width);
        }
    }
}

#[test]
fn test_span_limit_unsatisfiable() {
    let mut ctx = context(&[("L2", 1, 2)]);
    let mut sbox = ctx.build_switch_box(Corner::NorthEast, None).unwrap();
    let req = FillRequest::new(Orientation::North);
    match sbox.fill(&req, &PatternKind::SpanLimited { max_span: Some(1) }) {
        Err(FabricError::Internal(_)) => (),
        other => panic!("unexpected result: {:?}", other),
    }
    match sbox.fill(&req, &PatternKind::SpanLimited { max_span: Some(0) }) {
        Err(FabricError::Config(_)) => (),
        other => panic!("unexpected result: {:?}", other),
    }
    /* too large limits fall back to the channel width */
    sbox.fill(&req, &PatternKind::SpanLimited { max_span: Some(100) }).unwrap();
}

#[test]
fn test_turn_limited_groups() {
    let mut ctx = context(&[("L1", 4, 1)]);
    let id = {
        let mut sbox = ctx.build_switch_box(Corner::NorthEast, None).unwrap();
        let mut req = FillRequest::new(Orientation::North);
        req.excluded_inputs.west = true;
        sbox.fill(&req, &PatternKind::TurnLimited { max_turn: Some(2) }).unwrap();
        sbox.id()
    };
    let turns: BTreeSet<(u32, u32)> = edges(&ctx, id).into_iter()
        .filter(|(input, ..)| input.orientation == Orientation::East)
        .map(|(_, ibit, _, obit)| (ibit, obit))
        .collect();
    assert_eq!(turns, [(0, 1), (2, 3)].into_iter().collect());

    let mut ctx = context(&[("L1", 1, 1), ("L4", 1, 4)]);
    let mut sbox = ctx.build_switch_box(Corner::NorthEast, None).unwrap();
    match sbox.fill(&FillRequest::new(Orientation::North), &PatternKind::TurnLimited { max_turn: Some(2) }) {
        Err(FabricError::Internal(_)) => (),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_lookup_mode_creates_nothing() {
    let mut ctx = context(&[("L1", 2, 1)]);
    let mut sbox = ctx.build_switch_box(Corner::NorthWest, None).unwrap();
    let mut req = FillRequest::new(Orientation::West);
    req.mode = Mode::Lookup;
    sbox.fill(&req, &PatternKind::Wilton).unwrap();
    let id = sbox.id();
    assert!(ctx.db.module(id).ports().is_empty());
}

#[test]
fn test_cboxout_bridges() {
    let mut ctx = context(&[("L1", 2, 1)]);
    let l1 = SegmentIdx(0);
    let id = fill_all(&mut ctx, Corner::NorthEast, &PatternKind::Wilton, false);
    let bridge = SegmentNode::new(
        Position::new(0, 1), l1, Orientation::North, SegmentNodeKind::SwitchboxInFromCbox
    );
    let first = add_cboxout(&mut ctx, id, bridge).unwrap();
    let second = add_cboxout(&mut ctx, id, bridge).unwrap();
    assert_eq!(first, PortKey::Node(bridge.into()));
    assert_eq!(
        second,
        PortKey::Node(bridge.with_kind(SegmentNodeKind::SwitchboxInFromCboxAlt).into())
    );
    let output = NetRef::Port(PortKey::Node(bridge.with_kind(SegmentNodeKind::SwitchboxOut).into()));
    let sources = ctx.db.module(id).sources(&output.bit(0));
    assert!(sources.contains(&NetRef::Port(first).bit(0)));
    assert!(sources.contains(&NetRef::Port(second).bit(0)));

    /* both bridges used */
    assert!(matches!(add_cboxout(&mut ctx, id, bridge), Err(FabricError::Internal(_))));
    /* no such output */
    let nowhere = bridge.moved(Position::new(5, 5));
    assert!(matches!(add_cboxout(&mut ctx, id, nowhere), Err(FabricError::Internal(_))));
}

#[test]
fn test_pattern_yaml() {
    let pattern: SwitchBoxPattern = serde_yaml::from_str("kind: span_limited\nmax_span: 4\n").unwrap();
    assert_eq!(pattern.kind, PatternKind::SpanLimited { max_span: Some(4) });
    assert_eq!(pattern.fill_corners.len(), 4);
    let pattern: SwitchBoxPattern =
        serde_yaml::from_str("kind: cycle_free\nfill_corners: [northeast]\n").unwrap();
    assert_eq!(pattern, SwitchBoxPattern::new(PatternKind::CycleFree).with_fill_corners([Corner::NorthEast]));
}
