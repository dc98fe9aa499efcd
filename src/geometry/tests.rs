use super::*;

#[test]
fn test_orientation_basics() {
    assert_eq!(Orientation::North.opposite(), Orientation::South);
    assert_eq!(Orientation::West.opposite(), Orientation::East);
    assert_eq!(Orientation::East.dimension(), Dimension::X);
    assert_eq!(Orientation::South.dimension(), Dimension::Y);
    assert_eq!(Orientation::South.direction(), Direction::Dec);
    assert_eq!(Orientation::East.direction(), Direction::Inc);
    for ori in Orientation::ALL {
        assert_eq!(Orientation::compose(ori.dimension(), ori.direction()), ori);
        assert_eq!(ori.upstream_step() + ori.opposite().upstream_step(), Position::ORIGIN);
    }
}

#[test]
fn test_corner_compose_and_decompose() {
    for corner in Corner::ALL {
        let (x, y) = corner.decompose();
        assert_eq!(Corner::compose(x, y).unwrap(), corner);
        assert_eq!(Corner::compose(y, x).unwrap(), corner);
        assert_eq!(corner.opposite().opposite(), corner);
        assert_eq!(corner.dotx(Dimension::X), x.direction());
        assert_eq!(corner.dotx(Dimension::Y), y.direction());
    }
    assert_eq!(
        Corner::compose(Orientation::North, Orientation::West).unwrap(),
        Corner::NorthWest
    );
    assert!(Corner::compose(Orientation::North, Orientation::South).is_err());
}

#[test]
fn test_corner_walk_around_vertex() {
    let mut corner = Corner::NorthEast;
    let mut visited = Vec::new();
    for _ in 0..4 {
        visited.push(corner);
        corner = corner.next_around_vertex();
    }
    assert_eq!(corner, Corner::NorthEast);
    assert_eq!(
        visited,
        vec![Corner::NorthEast, Corner::SouthEast, Corner::SouthWest, Corner::NorthWest]
    );
}

#[test]
fn test_position_arithmetic() {
    let a = Position::new(3, -2);
    let b = Position::new(-1, 5);
    assert_eq!(a + b, Position::new(2, 3));
    assert_eq!(a - b, Position::new(4, -7));
    assert_eq!(-a, Position::new(-3, 2));
    assert!(Position::new(0, 0).within(1, 1));
    assert!(!Position::new(1, 0).within(1, 1));
    assert!(!Position::new(0, -1).within(4, 4));
}

#[test]
fn test_orientation_tuple_indexing() {
    let mut edge = OrientationTuple::splat(false);
    edge[Orientation::West] = true;
    assert!(edge.west && !edge.east);
    assert!(edge.any() && !edge.all());
    let all = OrientationTuple::from_orientations(&Orientation::ALL);
    assert!(all.all());
}

#[test]
fn test_position_from_yaml() {
    let pair: Position = serde_yaml::from_str("[1, -2]").unwrap();
    assert_eq!(pair, Position::new(1, -2));
    let named: Position = serde_yaml::from_str("{x: 3, y: 4}").unwrap();
    assert_eq!(named, Position::new(3, 4));
    let list: Vec<Position> = serde_yaml::from_str("- [0, 0]\n- {x: 1, y: 0}\n").unwrap();
    assert_eq!(list, vec![Position::ORIGIN, Position::new(1, 0)]);
    assert!(serde_yaml::from_str::<Position>("[1]").is_err());
    /* netlists are written with named fields */
    assert_eq!(serde_json::to_string(&Position::new(1, 2)).unwrap(), r#"{"x":1,"y":2}"#);
}
