use super::*;

use crate::builder::cbox;
use crate::context::TileOptions;
use crate::fc::FcValue;

fn clb_context() -> (Context, ModelId) {
    let mut ctx = Context::new();
    ctx.create_segment("L1", 4, 1).unwrap();
    let block = {
        let mut builder = ctx.build_logic_block("clb", 1, 1).unwrap();
        builder.create_input("I", 2, Orientation::West, None).unwrap();
        builder.create_output("O", 1, Orientation::East, None).unwrap();
        builder.id()
    };
    (ctx, block)
}

fn build(ctx: &mut Context, block: ModelId, fc: &BlockFcValue, opts: TileOptions) -> ModelId {
    let mut tile = ctx.build_tile(block, None, opts).unwrap();
    tile.fill(fc, &BTreeMap::new()).unwrap();
    tile.auto_connect().unwrap();
    tile.id()
}

#[test]
fn test_instantiate_checks() {
    let (mut ctx, block) = clb_context();
    let big = ctx.build_logic_block("big", 2, 1).unwrap().id();
    let mut tile = ctx.build_tile(block, Some(3), TileOptions::default()).unwrap();
    assert!(matches!(tile.instantiate(block, None), Err(FabricError::Config(_))));
    assert!(matches!(tile.instantiate(big, None), Err(FabricError::Config(_))));
    let id = tile.id();
    let names: Vec<&str> = ctx.db.module(id).instances().values().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["i_blk_i0", "i_blk_i1", "i_blk_i2"]);
    assert_eq!(ctx.db.module(id).name, "tile_clb");
}

#[test]
fn test_cbox_segment_positions() {
    let seg = Segment { name: "L4".into(), width: 1, length: 4 };
    let pos = |cori, sori, section| cbox::segment_relative_position(cori, &seg, sori, section).unwrap();
    assert_eq!(pos(Orientation::North, Orientation::East, 2), Position::new(-2, 0));
    assert_eq!(pos(Orientation::South, Orientation::West, 1), Position::new(1, -1));
    assert_eq!(pos(Orientation::West, Orientation::North, 3), Position::new(-1, -3));
    assert_eq!(pos(Orientation::East, Orientation::South, 0), Position::new(0, 0));
    /* sections run 0 .. length */
    assert!(cbox::segment_relative_position(Orientation::North, &seg, Orientation::East, 4).is_err());
    /* a north box only sees horizontal wires */
    assert!(cbox::segment_relative_position(Orientation::North, &seg, Orientation::North, 0).is_err());
}

#[test]
fn test_fill_and_auto_connect() {
    let (mut ctx, block) = clb_context();
    let fc = BlockFcValue::new(FcValue::Fraction(0.5), FcValue::Count(1));
    let id = build(&mut ctx, block, &fc, TileOptions::default());
    let l1 = SegmentIdx(0);
    let i_port = ctx.find_block_port(block, "I").unwrap();

    let tile = ctx.db.module(id);
    let keys: Vec<InstanceKey> = tile.instances().keys().copied().collect();
    assert_eq!(keys, vec![
        InstanceKey::Subtile(0),
        InstanceKey::Cbox(Orientation::East, 0),
        InstanceKey::Cbox(Orientation::West, 0),
    ]);

    /* two tracks per bit, taken from both wire directions */
    let west = tile.instance(&InstanceKey::Cbox(Orientation::West, 0)).unwrap().model;
    let pin = NetRef::Port(PortKey::Node(BlockPinNode::new(Position::ORIGIN, i_port, 0).into()));
    for bit in 0 .. 2 {
        assert_eq!(ctx.db.module(west).sources(&pin.bit(bit)).len(), 4);
    }
    assert_eq!(
        ctx.db.source_of(id, &NetRef::Pin(InstanceKey::Subtile(0), PortKey::Block(i_port.port))),
        Some(NetRef::Pin(InstanceKey::Cbox(Orientation::West, 0), PortKey::Node(BlockPinNode::new(Position::ORIGIN, i_port, 0).into())))
    );

    /* channel nodes become tile ports remembering their box */
    let input = SegmentNode::new(Position::new(-1, 0), l1, Orientation::North, SegmentNodeKind::ArrayInput);
    let port = tile.port(&PortKey::Node(input.into())).unwrap();
    assert_eq!(port.direction, PortDirection::Input);
    assert_eq!(port.boxpos, Some((Position::ORIGIN, Corner::NorthWest)));
    assert_eq!(port.name, "bi_u1y0n_L1");

    let output = SegmentNode::new(Position::ORIGIN, l1, Orientation::North, SegmentNodeKind::ArrayCboxout);
    let port = tile.port(&PortKey::Node(output.into())).unwrap();
    assert_eq!(port.direction, PortDirection::Output);
    assert_eq!(port.boxpos, Some((Position::ORIGIN, Corner::SouthEast)));
    let south = SegmentNode { orientation: Orientation::South, ..output };
    assert_eq!(
        tile.port(&PortKey::Node(south.into())).and_then(|p| p.boxpos),
        Some((Position::ORIGIN, Corner::NorthEast))
    );
}

#[test]
fn test_no_cbox_on_edge() {
    let (mut ctx, block) = clb_context();
    let fc = BlockFcValue::uniform(FcValue::Count(1));
    let mut edge = OrientationTuple::splat(false);
    edge.west = true;
    let opts = TileOptions { name: Some("tile_clb_w".into()), edge, ..TileOptions::default() };
    let id = build(&mut ctx, block, &fc, opts);
    let keys: Vec<InstanceKey> = ctx.db.module(id).instances().keys().copied().collect();
    assert_eq!(keys, vec![InstanceKey::Subtile(0), InstanceKey::Cbox(Orientation::East, 0)]);

    let mut tile = TileBuilder::new(&mut ctx, id);
    assert!(matches!(tile.build_connection_box(Orientation::West, 0), Err(FabricError::Config(_))));
    assert!(matches!(tile.build_connection_box(Orientation::North, 1), Err(FabricError::Config(_))));
    /* asking again for an existing box returns it */
    let cbox = tile.build_connection_box(Orientation::East, 0).unwrap().id();
    assert_eq!(ctx.db.module(cbox).name, "cbox_tile_clb_w_e0");
}

/* 1x1 block with a direct tunnel from its east output to its west input */
fn tunnel_context(extra_input: bool) -> (Context, ModelId, BlockPortRef, BlockPortRef) {
    let mut ctx = Context::new();
    ctx.create_segment("L1", 2, 1).unwrap();
    let block = {
        let mut builder = ctx.build_logic_block("clb", 1, 1).unwrap();
        builder.create_input("I", 1, Orientation::West, None).unwrap();
        if extra_input {
            builder.create_input("J", 1, Orientation::West, None).unwrap();
        }
        builder.create_output("O", 1, Orientation::East, None).unwrap();
        builder.id()
    };
    let i_port = ctx.find_block_port(block, "I").unwrap();
    let o_port = ctx.find_block_port(block, "O").unwrap();
    ctx.create_tunnel("carry", o_port, i_port, Position::new(-1, 0)).unwrap();
    (ctx, block, i_port, o_port)
}

#[test]
fn test_tunnel_without_cbox() {
    let (mut ctx, block, i_port, o_port) = tunnel_context(false);
    let id = build(&mut ctx, block, &BlockFcValue::uniform(FcValue::Count(1)), TileOptions::default());

    /* neither tunnel port touches the channel, so no box is needed */
    assert_eq!(ctx.db.module(id).instances().len(), 1);
    let node = BlockPinNode::new(Position::new(-1, 0), o_port, 0);
    let key = PortKey::Node(node.into());
    let port = ctx.db.module(id).port(&key).unwrap();
    assert_eq!(port.name, "bp_u1y0i0_clb_O");
    assert_eq!(port.direction, PortDirection::Input);
    assert_eq!(
        ctx.db.source_of(id, &NetRef::Pin(InstanceKey::Subtile(0), PortKey::Block(i_port.port))),
        Some(NetRef::Port(key))
    );
}

#[test]
fn test_tunnel_through_cbox() {
    let (mut ctx, block, i_port, o_port) = tunnel_context(true);
    let mut tile = ctx.build_tile(block, None, TileOptions::default()).unwrap();
    tile.fill(&BlockFcValue::uniform(FcValue::Count(1)), &BTreeMap::new()).unwrap();
    tile.auto_connect().unwrap();
    let id = tile.id();

    let west_key = InstanceKey::Cbox(Orientation::West, 0);
    let west = ctx.db.instance_model(id, &west_key).unwrap();
    let src = PortKey::Node(BlockPinNode::new(Position::new(-1, 0), o_port, 0).into());
    let i_pin = PortKey::Node(BlockPinNode::new(Position::ORIGIN, i_port, 0).into());
    /* FC 0: the only source of I inside the box is the tunnel */
    assert_eq!(ctx.db.module(west).sources(&NetRef::Port(i_pin).bit(0)), &[NetRef::Port(src).bit(0)]);
    assert_eq!(ctx.db.source_of(id, &NetRef::Pin(west_key, src)), Some(NetRef::Port(src)));

    /* running it again changes nothing */
    let before = ctx.db.module(id).connection_count();
    TileBuilder::new(&mut ctx, id).auto_connect().unwrap();
    assert_eq!(ctx.db.module(id).connection_count(), before);
}

#[test]
fn test_global_ports() {
    let mut ctx = Context::new();
    ctx.create_segment("L1", 2, 1).unwrap();
    let clk = ctx.create_global("clk", 1, true).unwrap();
    let io = {
        let mut builder = ctx.build_io_block("io").unwrap();
        builder.create_input("outpad", 1, None).unwrap();
        builder.create_output("inpad", 1, None).unwrap();
        builder.create_global(clk, None, Some("gclk")).unwrap();
        builder.id()
    };
    let mut tile = ctx.build_tile(io, Some(2), TileOptions::default()).unwrap();
    tile.fill(&BlockFcValue::uniform(FcValue::Count(1)), &BTreeMap::new()).unwrap();
    tile.auto_connect().unwrap();
    let id = tile.id();

    let gport = ctx.db.module(id).port(&PortKey::Global(clk)).unwrap();
    assert_eq!(gport.name, "clk");
    assert_eq!(gport.global, Some(clk));
    let gclk = ctx.find_block_port(io, "gclk").unwrap();
    for subtile in 0 .. 2 {
        let pin = NetRef::Pin(InstanceKey::Subtile(subtile), PortKey::Block(gclk.port));
        assert_eq!(ctx.db.source_of(id, &pin), Some(NetRef::Port(PortKey::Global(clk))));
    }
    /* an IO output facing anywhere reaches every side */
    let cboxes = ctx.db.module(id).instances().keys()
        .filter(|k| matches!(k, InstanceKey::Cbox(..)))
        .count();
    assert_eq!(cboxes, 4);

    /* an IO input is driven from the first side only */
    let outpad = ctx.find_block_port(io, "outpad").unwrap();
    assert_eq!(input_side(&ctx.db, id, Position::ORIGIN), Some(Orientation::North));
    for subtile in 0 .. 2 {
        let node = PortKey::Node(BlockPinNode::new(Position::ORIGIN, outpad, subtile).into());
        let pin = NetRef::Pin(InstanceKey::Subtile(subtile), PortKey::Block(outpad.port));
        assert_eq!(
            ctx.db.source_of(id, &pin),
            Some(NetRef::Pin(InstanceKey::Cbox(Orientation::North, 0), node))
        );
        for ori in [Orientation::East, Orientation::South, Orientation::West] {
            let model = ctx.db.instance_model(id, &InstanceKey::Cbox(ori, 0)).unwrap();
            assert!(!ctx.db.module(model).has_port(&node));
        }
    }
}

#[test]
fn test_io_input_faces_the_fabric() {
    let mut ctx = Context::new();
    ctx.create_segment("L1", 2, 1).unwrap();
    let io = {
        let mut builder = ctx.build_io_block("io").unwrap();
        builder.create_input("outpad", 1, None).unwrap();
        builder.id()
    };
    /* on the west edge only the east channel is left */
    let mut edge = OrientationTuple::splat(false);
    edge.west = true;
    let opts = TileOptions { name: Some("tile_io_w".into()), edge, ..TileOptions::default() };
    let id = build(&mut ctx, io, &BlockFcValue::uniform(FcValue::Count(1)), opts);
    let keys: Vec<InstanceKey> = ctx.db.module(id).instances().keys().copied().collect();
    assert_eq!(keys, vec![InstanceKey::Subtile(0), InstanceKey::Cbox(Orientation::East, 0)]);
}

#[test]
fn test_input_fc_counts_all_sections() {
    let mut ctx = Context::new();
    ctx.create_segment("L2", 1, 2).unwrap();
    let block = {
        let mut builder = ctx.build_logic_block("clb", 1, 1).unwrap();
        builder.create_input("I", 1, Orientation::West, None).unwrap();
        builder.create_output("O", 1, Orientation::East, None).unwrap();
        builder.id()
    };
    let i_port = ctx.find_block_port(block, "I").unwrap();
    /* one track, two sections: two is as high as an input can go */
    let fc = BlockFcValue::new(FcValue::Count(2), FcValue::Count(1));
    let id = build(&mut ctx, block, &fc, TileOptions::default());

    let west = ctx.db.instance_model(id, &InstanceKey::Cbox(Orientation::West, 0)).unwrap();
    let pin = NetRef::Port(PortKey::Node(BlockPinNode::new(Position::ORIGIN, i_port, 0).into()));
    /* both sections, both wire directions */
    assert_eq!(ctx.db.module(west).sources(&pin.bit(0)).len(), 4);
    for section in 0 .. 2 {
        let node = SegmentNode::new(Position::new(-1, -section), SegmentIdx(0), Orientation::North, SegmentNodeKind::ArrayInput);
        assert!(ctx.db.module(id).has_port(&PortKey::Node(node.into())));
    }

    let too_many = BlockFcValue::new(FcValue::Count(3), FcValue::Count(1));
    let opts = TileOptions { name: Some("tile_clb_3".into()), ..TileOptions::default() };
    let mut tile = ctx.build_tile(block, None, opts).unwrap();
    assert!(matches!(tile.fill(&too_many, &BTreeMap::new()), Err(FabricError::Config(_))));
}
