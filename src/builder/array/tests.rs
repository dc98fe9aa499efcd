use super::*;

use crate::context::TileOptions;
use crate::fc::{BlockFcValue, FcValue};

/* L1 wires, 1x1 block with a west input and an east output */
fn clb_tile(ctx: &mut Context) -> ModelId {
    ctx.create_segment("L1", 2, 1).unwrap();
    let block = {
        let mut builder = ctx.build_logic_block("clb", 1, 1).unwrap();
        builder.create_input("I", 1, Orientation::West, None).unwrap();
        builder.create_output("O", 1, Orientation::East, None).unwrap();
        builder.id()
    };
    let mut tile = ctx.build_tile(block, None, TileOptions::default()).unwrap();
    tile.fill(&BlockFcValue::uniform(FcValue::Count(1)), &BTreeMap::new()).unwrap();
    tile.auto_connect().unwrap();
    tile.id()
}

fn seg(x: i32, y: i32, ori: Orientation, kind: SegmentNodeKind) -> PortKey {
    PortKey::Node(SegmentNode::new(Position::new(x, y), SegmentIdx(0), ori, kind).into())
}

fn filled_array(ctx: &mut Context, name: &str, tiles: &[(ModelId, Position)]) -> ModelId {
    let mut array = ctx.build_array(name, tiles.len() as u32, 1, false, None).unwrap();
    for (model, pos) in tiles {
        array.instantiate(*model, *pos).unwrap();
    }
    array.fill(&SwitchBoxPattern::default(), Some(name), Mode::Build).unwrap();
    array.id()
}

#[test]
fn test_equiv_sbox_position() {
    let start = (Position::ORIGIN, Corner::NorthEast);
    let mut cur = start;
    let mut seen = Vec::new();
    for _ in 0 .. 4 {
        cur = equiv_sbox_position(cur.0, cur.1, None);
        seen.push(cur);
    }
    assert_eq!(seen, vec![
        (Position::new(0, 1), Corner::SouthEast),
        (Position::new(1, 1), Corner::SouthWest),
        (Position::new(1, 0), Corner::NorthWest),
        start,
    ]);
    assert_eq!(
        equiv_sbox_position(Position::ORIGIN, Corner::SouthEast, Some(Corner::SouthWest)),
        (Position::new(1, 0), Corner::SouthWest)
    );
}

#[test]
fn test_sbox_identifier() {
    let mut outputs = BTreeMap::new();
    outputs.insert(Orientation::North, (false, false));
    outputs.insert(Orientation::East, (true, false));
    outputs.insert(Orientation::South, (true, true));
    assert_eq!(sbox_identifier(Some("x"), &outputs, &[Orientation::West]), "x_NEes_ex_w");
    assert_eq!(sbox_identifier(None, &outputs, &[]), "NEes");
}

#[test]
fn test_placement() {
    let mut ctx = Context::new();
    let tile = clb_tile(&mut ctx);
    let logic = ctx.db.find("clb").unwrap();
    let sub = {
        let mut sub = ctx.build_array("sub", 1, 1, false, None).unwrap();
        sub.instantiate(tile, Position::ORIGIN).unwrap();
        sub.id()
    };
    let ne = ctx.build_switch_box(Corner::NorthEast, None).unwrap().id();

    let mut array = ctx.build_array("arr", 3, 1, false, None).unwrap();
    array.instantiate(tile, Position::ORIGIN).unwrap();
    array.instantiate(sub, Position::new(1, 0)).unwrap();
    let placement = |r: Result<InstanceKey>| matches!(r, Err(FabricError::Placement(_)));
    assert!(placement(array.instantiate(tile, Position::ORIGIN)));
    assert!(placement(array.instantiate(tile, Position::new(3, 0))));
    assert!(matches!(array.instantiate(logic, Position::new(2, 0)), Err(FabricError::Config(_))));

    /* tile corners stay free for switch boxes, array corners do not */
    assert_eq!(
        array.instantiate(ne, Position::ORIGIN).unwrap(),
        InstanceKey::Sbox(Position::ORIGIN, Corner::NorthEast)
    );
    assert!(placement(array.instantiate(ne, Position::ORIGIN)));
    assert!(placement(array.instantiate(ne, Position::new(1, 0))));

    let id = array.id();
    let names: Vec<&str> = ctx.db.module(id).instances().values().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["t_ix0y0", "t_ix1y0", "sb_ix0y0ne"]);
}

#[test]
fn test_edge_compatibility() {
    let mut ctx = Context::new();
    let tile = clb_tile(&mut ctx);
    let mut top = ctx.build_array("top", 1, 1, true, None).unwrap();
    assert!(matches!(top.instantiate(tile, Position::ORIGIN), Err(FabricError::Placement(_))));
    assert!(ctx.db.module(ctx.top().unwrap()).instances().is_empty());
}

#[test]
fn test_single_tile() {
    let mut ctx = Context::new();
    let tile = clb_tile(&mut ctx);
    let id = filled_array(&mut ctx, "arr", &[(tile, Position::ORIGIN)]);

    let sboxes: Vec<(InstanceKey, String)> = ctx.db.module(id).instances().iter()
        .filter(|(k, _)| matches!(k, InstanceKey::Sbox(..)))
        .map(|(k, i)| (*k, ctx.db.module(i.model).name.clone()))
        .collect();
    assert_eq!(sboxes.len(), 4);
    assert!(sboxes.iter().any(|(k, name)|
        *k == InstanceKey::Sbox(Position::ORIGIN, Corner::SouthWest) && name.ends_with("arr_N")));

    ArrayBuilder::new(&mut ctx, id).auto_connect(Some(true)).unwrap();
    assert!(ctx.db.module(id).ports().is_empty());

    /* the north-running wire west of the tile comes out of the south-west box */
    let tile_key = InstanceKey::Tile(Position::ORIGIN);
    let north = seg(-1, 0, Orientation::North, SegmentNodeKind::ArrayInput);
    assert_eq!(
        ctx.db.source_of(id, &NetRef::Pin(tile_key, north)),
        Some(NetRef::Pin(
            InstanceKey::Sbox(Position::ORIGIN, Corner::SouthWest),
            seg(-1, 0, Orientation::North, SegmentNodeKind::SwitchboxOut)
        ))
    );
    /* nobody inside drives the south-running one and the top keeps it open */
    let south = seg(-1, 0, Orientation::South, SegmentNodeKind::ArrayInput);
    assert_eq!(ctx.db.source_of(id, &NetRef::Pin(tile_key, south)), None);
}

#[test]
fn test_unresolved_nodes_become_ports() {
    let mut ctx = Context::new();
    let tile = clb_tile(&mut ctx);
    let id = filled_array(&mut ctx, "arr", &[(tile, Position::ORIGIN)]);
    ArrayBuilder::new(&mut ctx, id).auto_connect(None).unwrap();

    let south = seg(-1, 0, Orientation::South, SegmentNodeKind::ArrayInput);
    let port = ctx.db.module(id).port(&south).unwrap();
    assert_eq!(port.direction, PortDirection::Input);
    assert_eq!(port.boxpos, Some((Position::ORIGIN, Corner::SouthWest)));
    assert_eq!(
        ctx.db.source_of(id, &NetRef::Pin(InstanceKey::Tile(Position::ORIGIN), south)),
        Some(NetRef::Port(south))
    );

    /* a second pass finds everything in place */
    let ports = ctx.db.module(id).ports().len();
    let conns = ctx.db.module(id).connection_count();
    ArrayBuilder::new(&mut ctx, id).auto_connect(None).unwrap();
    assert_eq!(ctx.db.module(id).ports().len(), ports);
    assert_eq!(ctx.db.module(id).connection_count(), conns);
}

#[test]
fn test_cboxout_bridges() {
    let mut ctx = Context::new();
    let tile = clb_tile(&mut ctx);
    let id = filled_array(&mut ctx, "arr", &[(tile, Position::ORIGIN), (tile, Position::new(1, 0))]);
    ArrayBuilder::new(&mut ctx, id).auto_connect(Some(true)).unwrap();

    /* the east box of the first tile drives the wire the box south-west of
     * the second tile starts */
    let sbox = InstanceKey::Sbox(Position::new(1, 0), Corner::SouthWest);
    let bridge = seg(-1, 0, Orientation::North, SegmentNodeKind::SwitchboxInFromCbox);
    let cboxout = seg(0, 0, Orientation::North, SegmentNodeKind::ArrayCboxout);
    assert_eq!(
        ctx.db.source_of(id, &NetRef::Pin(sbox, bridge)),
        Some(NetRef::Pin(InstanceKey::Tile(Position::ORIGIN), cboxout))
    );
    let model = ctx.db.instance_model(id, &sbox).unwrap();
    let output = seg(-1, 0, Orientation::North, SegmentNodeKind::SwitchboxOut);
    assert!(ctx.db.module(model).sources(&NetRef::Port(output).bit(0)).contains(&NetRef::Port(bridge).bit(0)));

    /* both north-east boxes share a model, so they share the bridge too */
    let cboxout = seg(0, 0, Orientation::South, SegmentNodeKind::ArrayCboxout);
    let bridge = seg(0, 0, Orientation::South, SegmentNodeKind::SwitchboxInFromCbox);
    for x in 0 .. 2 {
        let sbox = InstanceKey::Sbox(Position::new(x, 0), Corner::NorthEast);
        assert_eq!(
            ctx.db.source_of(id, &NetRef::Pin(sbox, bridge)),
            Some(NetRef::Pin(InstanceKey::Tile(Position::new(x, 0)), cboxout))
        );
    }
}

#[test]
fn test_nested_arrays() {
    let mut ctx = Context::new();
    let tile = clb_tile(&mut ctx);
    let sub = filled_array(&mut ctx, "sub", &[(tile, Position::ORIGIN)]);
    let outer = filled_array(&mut ctx, "outer", &[(tile, Position::ORIGIN), (sub, Position::new(1, 0))]);

    /* no switch boxes are placed over the sub-array */
    assert!(ctx.db.module(outer).instances().keys()
        .all(|k| !matches!(k, InstanceKey::Sbox(pos, _) if pos.x == 1)));
    assert_eq!(
        hierarchical_root(&ctx.db, outer, Position::new(1, 0), Some(Corner::SouthWest)),
        Some(HierInstance::new(sub, InstanceKey::Sbox(Position::ORIGIN, Corner::SouthWest))
            .above(outer, InstanceKey::Tile(Position::new(1, 0))))
    );

    ArrayBuilder::new(&mut ctx, outer).auto_connect(Some(true)).unwrap();

    /* the sub-array could not drive the wire west of its tile */
    let south = seg(-1, 0, Orientation::South, SegmentNodeKind::ArrayInput);
    let port = ctx.db.module(sub).port(&south).unwrap();
    assert_eq!(port.boxpos, Some((Position::ORIGIN, Corner::SouthWest)));
    assert_eq!(
        ctx.db.source_of(sub, &NetRef::Pin(InstanceKey::Tile(Position::ORIGIN), south)),
        Some(NetRef::Port(south))
    );
    /* the outer array can */
    assert_eq!(
        ctx.db.source_of(outer, &NetRef::Pin(InstanceKey::Tile(Position::new(1, 0)), south)),
        Some(NetRef::Pin(
            InstanceKey::Sbox(Position::ORIGIN, Corner::NorthEast),
            seg(0, 0, Orientation::South, SegmentNodeKind::SwitchboxOut)
        ))
    );
}

/* L2 wires (one track), inputs tap both sections */
fn l2_tile(ctx: &mut Context) -> ModelId {
    ctx.create_segment("L2", 1, 2).unwrap();
    let block = {
        let mut builder = ctx.build_logic_block("clb", 1, 1).unwrap();
        builder.create_input("I", 1, Orientation::West, None).unwrap();
        builder.create_output("O", 1, Orientation::East, None).unwrap();
        builder.id()
    };
    let mut tile = ctx.build_tile(block, None, TileOptions::default()).unwrap();
    tile.fill(&BlockFcValue::new(FcValue::Count(2), FcValue::Count(1)), &BTreeMap::new()).unwrap();
    tile.auto_connect().unwrap();
    tile.id()
}

fn column(ctx: &mut Context, tile: ModelId) -> ModelId {
    let mut array = ctx.build_array("col", 1, 2, false, None).unwrap();
    array.instantiate(tile, Position::ORIGIN).unwrap();
    array.instantiate(tile, Position::new(0, 1)).unwrap();
    array.id()
}

fn tile_input(array: ModelId, pos: Position, node: PortKey) -> HierPin {
    HierPin::new(HierInstance::new(array, InstanceKey::Tile(pos)), node)
}

#[test]
fn test_shared_segment_is_exposed_once() {
    let mut ctx = Context::new();
    let tile = l2_tile(&mut ctx);
    let col = column(&mut ctx, tile);

    /* the wire starting west of the lower tile passes the upper one too */
    let lower = tile_input(col, Position::ORIGIN, seg(-1, 0, Orientation::North, SegmentNodeKind::ArrayInput));
    let upper = tile_input(col, Position::new(0, 1), seg(-1, -1, Orientation::North, SegmentNodeKind::ArrayInput));
    let a = expose_node(&mut ctx, &lower, true).unwrap();
    let b = expose_node(&mut ctx, &upper, true).unwrap();
    let key = seg(-1, 0, Orientation::North, SegmentNodeKind::ArrayInput);
    assert_eq!(a, NetRef::Port(key));
    assert_eq!(b, NetRef::Port(key));

    let m = ctx.db.module(col);
    assert_eq!(m.ports().len(), 1);
    assert_eq!(ctx.db.source_of(col, &NetRef::Pin(lower.instance.path[0].1, lower.port)), Some(a));
    assert_eq!(ctx.db.source_of(col, &NetRef::Pin(upper.instance.path[0].1, upper.port)), Some(a));
    /* the upper box is further downstream */
    assert_eq!(m.port(&key).unwrap().boxpos, Some((Position::new(0, 1), Corner::NorthWest)));
}

#[test]
fn test_exposed_node_with_another_source() {
    let mut ctx = Context::new();
    let tile = l2_tile(&mut ctx);
    let col = column(&mut ctx, tile);

    let lower = tile_input(col, Position::ORIGIN, seg(-1, 0, Orientation::North, SegmentNodeKind::ArrayInput));
    expose_node(&mut ctx, &lower, true).unwrap();
    /* the upper tile's view of the same wire is fed from somewhere else */
    let other = tile_input(col, Position::new(0, 1), seg(-1, 0, Orientation::North, SegmentNodeKind::ArrayInput));
    let other = expose_node(&mut ctx, &other, true).unwrap();
    let sink = NetRef::Pin(
        InstanceKey::Tile(Position::new(0, 1)),
        seg(-1, -1, Orientation::North, SegmentNodeKind::ArrayInput)
    );
    ctx.db.connect(col, other, sink).unwrap();

    let upper = tile_input(col, Position::new(0, 1), seg(-1, -1, Orientation::North, SegmentNodeKind::ArrayInput));
    match expose_node(&mut ctx, &upper, true) {
        Err(FabricError::Internal(msg)) => assert!(msg.contains("already exposed")),
        r => panic!("unexpected result: {:?}", r),
    }
}

#[test]
fn test_multiple_drivers() {
    let mut ctx = Context::new();
    let tile = clb_tile(&mut ctx);
    let row = {
        let mut array = ctx.build_array("row", 2, 1, false, None).unwrap();
        array.instantiate(tile, Position::ORIGIN).unwrap();
        array.instantiate(tile, Position::new(1, 0)).unwrap();
        array.id()
    };
    /* two boxes at the same vertex both claim the wire west of the second tile */
    let drivers = [
        (Corner::SouthEast, "a", Position::ORIGIN, seg(0, 0, Orientation::North, SegmentNodeKind::SwitchboxOut)),
        (Corner::SouthWest, "b", Position::new(1, 0), seg(-1, 0, Orientation::North, SegmentNodeKind::SwitchboxOut)),
    ];
    for (corner, ident, pos, port) in drivers {
        let sbox = ctx.build_switch_box(corner, Some(ident)).unwrap().id();
        ctx.db.module_mut(sbox).add_port(port, Port::new("out".into(), 2, PortDirection::Output)).unwrap();
        ArrayBuilder::new(&mut ctx, row).instantiate(sbox, pos).unwrap();
    }

    let input = seg(-1, 0, Orientation::North, SegmentNodeKind::ArrayInput);
    let mut array = ArrayBuilder::new(&mut ctx, row);
    match array.connect_segment_input(InstanceKey::Tile(Position::new(1, 0)), input, true) {
        Err(FabricError::Internal(msg)) => assert!(msg.contains("multiple candidate drivers")),
        r => panic!("unexpected result: {:?}", r),
    }
    assert_eq!(ctx.db.source_of(row, &NetRef::Pin(InstanceKey::Tile(Position::new(1, 0)), input)), None);
}

#[test]
fn test_fill_keeps_placed_boxes() {
    let mut ctx = Context::new();
    let tile = clb_tile(&mut ctx);
    let manual = ctx.build_switch_box(Corner::NorthEast, Some("manual")).unwrap().id();
    let id = {
        let mut array = ctx.build_array("arr", 1, 1, false, None).unwrap();
        array.instantiate(tile, Position::ORIGIN).unwrap();
        array.instantiate(manual, Position::ORIGIN).unwrap();
        array.fill_unplaced(&SwitchBoxPattern::default(), Some("arr")).unwrap();
        array.id()
    };
    let sboxes = ctx.db.module(id).instances().keys().filter(|k| matches!(k, InstanceKey::Sbox(..))).count();
    assert_eq!(sboxes, 4);
    assert!(ctx.db.module(manual).ports().is_empty());

    ArrayBuilder::new(&mut ctx, id).fill(&SwitchBoxPattern::default(), Some("arr"), Mode::Build).unwrap();
    assert!(!ctx.db.module(manual).ports().is_empty());
}
