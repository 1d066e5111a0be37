// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use planar_topo::{
    plan_ring_split, Coord, EngineConfig, Error, Geometry, LineString, Polygon, Shape, TopoDb,
};
use rusqlite::Connection;

fn memory_db() -> TopoDb {
    TopoDb::with_config(Connection::open_in_memory().unwrap(), EngineConfig::default()).unwrap()
}

fn node_count(db: &TopoDb, name: &str) -> i64 {
    db.connection()
        .query_row(&format!("SELECT count(*) FROM {name}_node"), [], |r| r.get(0))
        .unwrap()
}

#[test]
fn create_drop_and_recreate() {
    let db = memory_db();
    db.create_topology("Parcels", 2056, 0.01, false).unwrap();
    assert!(matches!(
        db.create_topology("parcels", 2056, 0.01, false),
        Err(Error::AlreadyExists(_))
    ));

    let first = db.topology("PARCELS").unwrap();
    assert_eq!(first.name(), "parcels");
    assert_eq!(first.srid(), 2056);
    let again = db.topology("parcels").unwrap();
    assert!(first.same_handle(&again));

    db.drop_topology("Parcels").unwrap();
    assert!(db.open_topologies().is_empty());
    assert!(matches!(first.validate(), Err(Error::StaleAccessor(_))));
    assert!(matches!(db.topology("parcels"), Err(Error::NoSuchTopology(_))));

    db.create_topology("parcels", 2056, 0.01, false).unwrap();
    let fresh = db.topology("parcels").unwrap();
    assert!(!fresh.same_handle(&first));
    assert_eq!(fresh.config().unwrap().next_edge_id, 1);
}

#[test]
fn creation_refuses_taken_relation_names() {
    let db = memory_db();
    db.connection()
        .execute_batch("CREATE TABLE roads_node (x INTEGER);")
        .unwrap();
    assert!(matches!(
        db.create_topology("roads", 0, 0.0, false),
        Err(Error::AlreadyExists(_))
    ));
}

#[test]
fn broken_layout_is_not_a_topology() {
    let db = memory_db();
    db.create_topology("roads", 0, 0.0, false).unwrap();
    db.connection().execute_batch("DROP TABLE roads_edge;").unwrap();
    assert!(matches!(db.topology("roads"), Err(Error::NoSuchTopology(_))));
}

#[test]
fn savepoints_nest() {
    let db = memory_db();
    db.create_topology("t", 0, 0.0, false).unwrap();
    let t = db.topology("t").unwrap();

    let mut outer = db.savepoint("outer").unwrap();
    t.add_iso_node(None, &Geometry::point(0, Coord::new(0.0, 0.0))).unwrap();
    let mut inner = db.savepoint("inner").unwrap();
    t.add_iso_node(None, &Geometry::point(0, Coord::new(1.0, 0.0))).unwrap();
    assert!(matches!(outer.release(), Err(Error::Savepoint(_))));
    inner.rollback().unwrap();
    assert_eq!(node_count(&db, "t"), 1);
    outer.release().unwrap();
    assert_eq!(node_count(&db, "t"), 1);

    {
        let _dropped = db.savepoint("dropped").unwrap();
        t.add_iso_node(None, &Geometry::point(0, Coord::new(2.0, 0.0))).unwrap();
    }
    assert_eq!(node_count(&db, "t"), 1);
}

#[test]
fn ring_split_stays_inside() {
    let mut coords: Vec<Coord> = (0..12)
        .map(|i| {
            let a = i as f64 * std::f64::consts::TAU / 12.0;
            Coord::new(10.0 * a.cos(), 10.0 * a.sin())
        })
        .collect();
    coords.push(coords[0]);
    let ring = LineString::new(coords);
    let ring_polygon = Polygon::new(ring.clone(), Vec::new());

    for cap in [0, 1, 3, 8] {
        let plan = plan_ring_split(&ring, 3, cap).unwrap();
        assert!(plan.inner.len() <= cap);
        let outer_points: usize = plan.outer.iter().map(|p| p.len() - 1).sum();
        assert_eq!(outer_points, ring.len() - 1);
        for chord in &plan.inner {
            let mid = Coord::lerp(&chord.coords[0], &chord.coords[1], 0.5);
            assert_eq!(
                planar_topo_geometry::polygon_position(&ring_polygon, &mid),
                planar_topo_geometry::Position::Inside
            );
        }
    }
}

#[test]
fn file_backed_topology_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("topo.sqlite");
    let square = Polygon::new(
        LineString::from_xy(&[(0.0, 0.0), (3.0, 0.0), (3.0, 3.0), (0.0, 3.0), (0.0, 0.0)]),
        Vec::new(),
    );
    {
        let db = TopoDb::open(&path).unwrap();
        db.create_topology("blocks", 0, 0.0, false).unwrap();
        let blocks = db.topology("blocks").unwrap();
        let faces = db
            .in_savepoint("import", || blocks.add_polygon(&Geometry::polygon(0, square.clone())))
            .unwrap();
        assert_eq!(faces, vec![1]);
    }

    let db = TopoDb::open(&path).unwrap();
    let blocks = db.topology("blocks").unwrap();
    match blocks.face_geometry(1).unwrap().shape {
        Shape::Polygon(p) => approx::assert_relative_eq!(p.area(), 9.0),
        other => panic!("unexpected shape {other:?}"),
    }
    assert_eq!(blocks.face_edges(1).unwrap(), vec![1]);
    assert!(blocks.validate().unwrap().is_empty());
}
