// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`TopoStore`] over the SQLite relations of one topology.
//!
//! Every statement text is formatted once per accessor ([`Queries`]) and
//! compiled lazily through the connection's prepared statement cache.

use planar_topo_geometry::{BBox, Coord};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::codec;
use super::schema::{TableNames, TOPOLOGIES};
use super::TopoStore;
use crate::config::TopologyConfig;
use crate::error::Result;
use crate::keys::{EdgeId, FaceId, NodeId};
use crate::primitives::{Edge, Face, Node};

const NODE_COLUMNS: &str = "node_id, containing_face, geom";
const EDGE_COLUMNS: &str =
    "edge_id, start_node, end_node, next_left_edge, next_right_edge, left_face, right_face, geom";

/// Statement texts of one topology.
#[derive(Debug, Clone)]
pub struct Queries {
    pub tables: TableNames,
    get_node: String,
    nodes_in_box: String,
    isolated_nodes: String,
    all_nodes: String,
    insert_node: String,
    update_node: String,
    delete_node: String,
    get_edge: String,
    edges_in_box: String,
    edges_by_node: String,
    edges_by_face: String,
    all_edges: String,
    read_next_edge: String,
    bump_next_edge: String,
    insert_edge: String,
    update_edge: String,
    delete_edge: String,
    get_face: String,
    faces_in_box: String,
    all_faces: String,
    insert_face: String,
    update_face: String,
    delete_face: String,
}

impl Queries {
    pub fn new(name: &str) -> Self {
        let tables = TableNames::new(name);
        let node = &tables.node;
        let edge = &tables.edge;
        let face = &tables.face;
        let rtree = &tables.face_rtree;
        let edge_rtree = &tables.edge_rtree;
        Self {
            get_node: format!(r#"SELECT {NODE_COLUMNS} FROM "{node}" WHERE node_id = ?1"#),
            nodes_in_box: format!(
                r#"SELECT {NODE_COLUMNS} FROM "{node}"
                   WHERE json_extract(geom, '$[0]') BETWEEN ?1 AND ?3
                     AND json_extract(geom, '$[1]') BETWEEN ?2 AND ?4
                   ORDER BY node_id"#
            ),
            isolated_nodes: format!(
                r#"SELECT {NODE_COLUMNS} FROM "{node}" WHERE containing_face = ?1 ORDER BY node_id"#
            ),
            all_nodes: format!(r#"SELECT {NODE_COLUMNS} FROM "{node}" ORDER BY node_id"#),
            insert_node: format!(r#"INSERT INTO "{node}" (containing_face, geom) VALUES (?1, ?2)"#),
            update_node: format!(
                r#"UPDATE "{node}" SET containing_face = ?2, geom = ?3 WHERE node_id = ?1"#
            ),
            delete_node: format!(r#"DELETE FROM "{node}" WHERE node_id = ?1"#),
            get_edge: format!(r#"SELECT {EDGE_COLUMNS} FROM "{edge}" WHERE edge_id = ?1"#),
            edges_in_box: format!(
                r#"SELECT {EDGE_COLUMNS} FROM "{edge}" WHERE edge_id IN
                   (SELECT id_edge FROM "{edge_rtree}"
                    WHERE minx <= ?3 AND maxx >= ?1 AND miny <= ?4 AND maxy >= ?2)
                   ORDER BY edge_id"#
            ),
            edges_by_node: format!(
                r#"SELECT {EDGE_COLUMNS} FROM "{edge}" WHERE start_node = ?1 OR end_node = ?1 ORDER BY edge_id"#
            ),
            edges_by_face: format!(
                r#"SELECT {EDGE_COLUMNS} FROM "{edge}" WHERE left_face = ?1 OR right_face = ?1 ORDER BY edge_id"#
            ),
            all_edges: format!(r#"SELECT {EDGE_COLUMNS} FROM "{edge}" ORDER BY edge_id"#),
            read_next_edge: format!(
                "SELECT next_edge_id FROM {TOPOLOGIES} WHERE Lower(topology_name) = Lower(?1)"
            ),
            bump_next_edge: format!(
                "UPDATE {TOPOLOGIES} SET next_edge_id = next_edge_id + 1 WHERE Lower(topology_name) = Lower(?1)"
            ),
            insert_edge: format!(
                r#"INSERT INTO "{edge}" ({EDGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#
            ),
            update_edge: format!(
                r#"UPDATE "{edge}" SET start_node = ?2, end_node = ?3, next_left_edge = ?4,
                   next_right_edge = ?5, left_face = ?6, right_face = ?7, geom = ?8
                   WHERE edge_id = ?1"#
            ),
            delete_edge: format!(r#"DELETE FROM "{edge}" WHERE edge_id = ?1"#),
            get_face: format!(
                r#"SELECT face_id, min_x, min_y, max_x, max_y FROM "{face}" WHERE face_id = ?1"#
            ),
            faces_in_box: format!(
                r#"SELECT id_face FROM "{rtree}"
                   WHERE minx <= ?3 AND maxx >= ?1 AND miny <= ?4 AND maxy >= ?2
                   ORDER BY id_face"#
            ),
            all_faces: format!(
                r#"SELECT face_id, min_x, min_y, max_x, max_y FROM "{face}" ORDER BY face_id"#
            ),
            insert_face: format!(
                r#"INSERT INTO "{face}" (min_x, min_y, max_x, max_y) VALUES (?1, ?2, ?3, ?4)"#
            ),
            update_face: format!(
                r#"UPDATE "{face}" SET min_x = ?2, min_y = ?3, max_x = ?4, max_y = ?5 WHERE face_id = ?1"#
            ),
            delete_face: format!(r#"DELETE FROM "{face}" WHERE face_id = ?1"#),
            tables,
        }
    }
}

/// Row of the node relation before its payload is decoded.
struct RawNode {
    id: NodeId,
    containing_face: Option<FaceId>,
    geom: String,
}

impl RawNode {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            containing_face: row.get(1)?,
            geom: row.get(2)?,
        })
    }

    fn decode(self) -> Result<Node> {
        Ok(Node {
            id: self.id,
            containing_face: self.containing_face,
            point: codec::decode_point(&self.geom)?,
        })
    }
}

/// Row of the edge relation before its payload is decoded.
struct RawEdge {
    id: EdgeId,
    start_node: NodeId,
    end_node: NodeId,
    next_left: i64,
    next_right: i64,
    left_face: FaceId,
    right_face: FaceId,
    geom: String,
}

impl RawEdge {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            start_node: row.get(1)?,
            end_node: row.get(2)?,
            next_left: row.get(3)?,
            next_right: row.get(4)?,
            left_face: row.get(5)?,
            right_face: row.get(6)?,
            geom: row.get(7)?,
        })
    }

    fn decode(self) -> Result<Edge> {
        Ok(Edge {
            id: self.id,
            start_node: self.start_node,
            end_node: self.end_node,
            next_left: self.next_left,
            next_right: self.next_right,
            left_face: self.left_face,
            right_face: self.right_face,
            geom: codec::decode_line(&self.geom)?,
        })
    }
}

fn face_from_row(row: &Row<'_>) -> rusqlite::Result<Face> {
    let id: FaceId = row.get(0)?;
    let min_x: Option<f64> = row.get(1)?;
    let min_y: Option<f64> = row.get(2)?;
    let max_x: Option<f64> = row.get(3)?;
    let max_y: Option<f64> = row.get(4)?;
    let bbox = match (min_x, min_y, max_x, max_y) {
        (Some(a), Some(b), Some(c), Some(d)) => Some(BBox::new(a, b, c, d)),
        _ => None,
    };
    Ok(Face { id, bbox })
}

fn bbox_params(bbox: Option<&BBox>) -> [Option<f64>; 4] {
    match bbox {
        Some(b) => [Some(b.min_x), Some(b.min_y), Some(b.max_x), Some(b.max_y)],
        None => [None; 4],
    }
}

/// Storage callbacks bound to one connection and one topology.
pub struct SqliteStore<'c> {
    conn: &'c Connection,
    config: &'c TopologyConfig,
    queries: &'c Queries,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection, config: &'c TopologyConfig, queries: &'c Queries) -> Self {
        Self {
            conn,
            config,
            queries,
        }
    }

    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    pub fn queries(&self) -> &'c Queries {
        self.queries
    }

    fn nodes(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Node>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let raw = stmt
            .query_map(params, RawNode::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(RawNode::decode).collect()
    }

    fn edges(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let raw = stmt
            .query_map(params, RawEdge::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(RawEdge::decode).collect()
    }
}

impl TopoStore for SqliteStore<'_> {
    fn config(&self) -> &TopologyConfig {
        self.config
    }

    fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        let mut stmt = self.conn.prepare_cached(&self.queries.get_node)?;
        let raw = stmt.query_row([id], RawNode::from_row).optional()?;
        raw.map(RawNode::decode).transpose()
    }

    fn nodes_in_box(&self, bbox: &BBox) -> Result<Vec<Node>> {
        // SQLite parses the payload on its own; widen the prefilter a little
        // and apply the exact test on the decoded points.
        let slack = 1e-9
            * [bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y]
                .iter()
                .fold(1.0f64, |m, v| m.max(v.abs()));
        let wide = bbox.buffered(slack);
        let nodes = self.nodes(
            &self.queries.nodes_in_box,
            params![wide.min_x, wide.min_y, wide.max_x, wide.max_y],
        )?;
        Ok(nodes
            .into_iter()
            .filter(|n| bbox.contains_coord(&n.point))
            .collect())
    }

    fn isolated_nodes_in_face(&self, face: FaceId) -> Result<Vec<Node>> {
        self.nodes(&self.queries.isolated_nodes, [face])
    }

    fn all_nodes(&self) -> Result<Vec<Node>> {
        self.nodes(&self.queries.all_nodes, [])
    }

    fn insert_node(&self, containing_face: Option<FaceId>, point: &Coord) -> Result<NodeId> {
        let geom = codec::encode_point(point, self.config.has_z)?;
        let mut stmt = self.conn.prepare_cached(&self.queries.insert_node)?;
        stmt.execute(params![containing_face, geom])?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_node(&self, node: &Node) -> Result<()> {
        let geom = codec::encode_point(&node.point, self.config.has_z)?;
        let mut stmt = self.conn.prepare_cached(&self.queries.update_node)?;
        stmt.execute(params![node.id, node.containing_face, geom])?;
        Ok(())
    }

    fn delete_node(&self, id: NodeId) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(&self.queries.delete_node)?;
        stmt.execute([id])?;
        Ok(())
    }

    fn get_edge(&self, id: EdgeId) -> Result<Option<Edge>> {
        let mut stmt = self.conn.prepare_cached(&self.queries.get_edge)?;
        let raw = stmt.query_row([id], RawEdge::from_row).optional()?;
        raw.map(RawEdge::decode).transpose()
    }

    fn edges_in_box(&self, bbox: &BBox) -> Result<Vec<Edge>> {
        // The R*Tree stores rounded-out single precision boxes; the exact
        // test runs on the decoded rows.
        let edges = self.edges(
            &self.queries.edges_in_box,
            params![bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y],
        )?;
        Ok(edges
            .into_iter()
            .filter(|e| e.bbox().is_some_and(|b| b.intersects(bbox)))
            .collect())
    }

    fn edges_by_node(&self, node: NodeId) -> Result<Vec<Edge>> {
        self.edges(&self.queries.edges_by_node, [node])
    }

    fn edges_by_face(&self, face: FaceId) -> Result<Vec<Edge>> {
        self.edges(&self.queries.edges_by_face, [face])
    }

    fn all_edges(&self) -> Result<Vec<Edge>> {
        self.edges(&self.queries.all_edges, [])
    }

    fn next_edge_id(&self) -> Result<EdgeId> {
        let name = &self.config.name;
        let next: i64 = {
            let mut stmt = self.conn.prepare_cached(&self.queries.read_next_edge)?;
            stmt.query_row([name], |row| row.get(0))?
        };
        let mut stmt = self.conn.prepare_cached(&self.queries.bump_next_edge)?;
        stmt.execute([name])?;
        Ok(next)
    }

    fn insert_edge(&self, edge: &Edge) -> Result<()> {
        let geom = codec::encode_line(&edge.geom, self.config.has_z)?;
        let mut stmt = self.conn.prepare_cached(&self.queries.insert_edge)?;
        stmt.execute(params![
            edge.id,
            edge.start_node,
            edge.end_node,
            edge.next_left,
            edge.next_right,
            edge.left_face,
            edge.right_face,
            geom
        ])?;
        Ok(())
    }

    fn update_edge(&self, edge: &Edge) -> Result<()> {
        let geom = codec::encode_line(&edge.geom, self.config.has_z)?;
        let mut stmt = self.conn.prepare_cached(&self.queries.update_edge)?;
        stmt.execute(params![
            edge.id,
            edge.start_node,
            edge.end_node,
            edge.next_left,
            edge.next_right,
            edge.left_face,
            edge.right_face,
            geom
        ])?;
        Ok(())
    }

    fn delete_edge(&self, id: EdgeId) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(&self.queries.delete_edge)?;
        stmt.execute([id])?;
        Ok(())
    }

    fn get_face(&self, id: FaceId) -> Result<Option<Face>> {
        let mut stmt = self.conn.prepare_cached(&self.queries.get_face)?;
        Ok(stmt.query_row([id], face_from_row).optional()?)
    }

    fn faces_in_box(&self, bbox: &BBox) -> Result<Vec<FaceId>> {
        let mut stmt = self.conn.prepare_cached(&self.queries.faces_in_box)?;
        let ids = stmt
            .query_map(params![bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y], |row| {
                row.get(0)
            })?
            .collect::<rusqlite::Result<Vec<FaceId>>>()?;
        Ok(ids)
    }

    fn all_faces(&self) -> Result<Vec<Face>> {
        let mut stmt = self.conn.prepare_cached(&self.queries.all_faces)?;
        let faces = stmt
            .query_map([], face_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(faces)
    }

    fn insert_face(&self, bbox: Option<BBox>) -> Result<FaceId> {
        let [a, b, c, d] = bbox_params(bbox.as_ref());
        let mut stmt = self.conn.prepare_cached(&self.queries.insert_face)?;
        stmt.execute(params![a, b, c, d])?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_face(&self, face: &Face) -> Result<()> {
        let [a, b, c, d] = bbox_params(face.bbox.as_ref());
        let mut stmt = self.conn.prepare_cached(&self.queries.update_face)?;
        stmt.execute(params![face.id, a, b, c, d])?;
        Ok(())
    }

    fn delete_face(&self, id: FaceId) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(&self.queries.delete_face)?;
        stmt.execute([id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema;
    use planar_topo_geometry::LineString;

    fn setup() -> (Connection, TopologyConfig) {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_catalog(&conn).unwrap();
        let config = TopologyConfig {
            name: "t".into(),
            srid: 0,
            tolerance: 0.0,
            has_z: false,
            next_edge_id: 1,
        };
        schema::create_topology(&conn, &config).unwrap();
        (conn, config)
    }

    #[test]
    fn node_round_trip_and_box_search() {
        let (conn, config) = setup();
        let queries = Queries::new("t");
        let store = SqliteStore::new(&conn, &config, &queries);
        let a = store.insert_node(Some(0), &Coord::new(1.0, 1.0)).unwrap();
        let b = store.insert_node(None, &Coord::new(5.0, 5.0)).unwrap();
        let found = store.nodes_in_box(&BBox::new(0.0, 0.0, 2.0, 2.0)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a);
        assert_eq!(store.isolated_nodes_in_face(0).unwrap().len(), 1);
        store.delete_node(b).unwrap();
        assert!(store.get_node(b).unwrap().is_none());
    }

    #[test]
    fn edge_ids_are_reserved_monotonically() {
        let (conn, config) = setup();
        let queries = Queries::new("t");
        let store = SqliteStore::new(&conn, &config, &queries);
        let n1 = store.insert_node(None, &Coord::new(0.0, 0.0)).unwrap();
        let n2 = store.insert_node(None, &Coord::new(1.0, 0.0)).unwrap();
        let id = store.next_edge_id().unwrap();
        assert_eq!(id, 1);
        store
            .insert_edge(&Edge {
                id,
                start_node: n1,
                end_node: n2,
                next_left: -id,
                next_right: id,
                left_face: 0,
                right_face: 0,
                geom: LineString::from_xy(&[(0.0, 0.0), (1.0, 0.0)]),
            })
            .unwrap();
        assert_eq!(store.next_edge_id().unwrap(), 2);
        assert_eq!(store.edges_by_node(n2).unwrap().len(), 1);
        assert_eq!(store.edges_in_box(&BBox::new(0.5, -1.0, 0.6, 1.0)).unwrap().len(), 1);
    }

    #[test]
    fn faces_are_found_through_the_index() {
        let (conn, config) = setup();
        let queries = Queries::new("t");
        let store = SqliteStore::new(&conn, &config, &queries);
        let f = store.insert_face(Some(BBox::new(0.0, 0.0, 10.0, 10.0))).unwrap();
        assert_eq!(store.faces_in_box(&BBox::new(5.0, 5.0, 5.0, 5.0)).unwrap(), vec![f]);
        assert!(store.faces_in_box(&BBox::new(20.0, 20.0, 21.0, 21.0)).unwrap().is_empty());
        // the universal face is never indexed
        assert_eq!(store.all_faces().unwrap().len(), 2);
        assert_eq!(store.get_face(0).unwrap().unwrap().bbox, None);
    }

    #[test]
    fn edge_index_follows_rewrites() {
        let (conn, config) = setup();
        let queries = Queries::new("t");
        let store = SqliteStore::new(&conn, &config, &queries);
        let n1 = store.insert_node(None, &Coord::new(0.0, 0.0)).unwrap();
        let n2 = store.insert_node(None, &Coord::new(2.0, 0.0)).unwrap();
        let mut edge = Edge {
            id: store.next_edge_id().unwrap(),
            start_node: n1,
            end_node: n2,
            next_left: -1,
            next_right: 1,
            left_face: 0,
            right_face: 0,
            geom: LineString::from_xy(&[(0.0, 0.0), (1.0, 5.0), (2.0, 0.0)]),
        };
        store.insert_edge(&edge).unwrap();
        let indexed: i64 = conn
            .query_row(r#"SELECT count(*) FROM "idx_t_edge_rtree" WHERE maxy >= 5.0"#, [], |r| r.get(0))
            .unwrap();
        assert_eq!(indexed, 1);
        assert_eq!(store.edges_in_box(&BBox::new(0.9, 4.0, 1.1, 6.0)).unwrap().len(), 1);

        edge.geom = LineString::from_xy(&[(0.0, 0.0), (2.0, 0.0)]);
        store.update_edge(&edge).unwrap();
        assert!(store.edges_in_box(&BBox::new(0.9, 4.0, 1.1, 6.0)).unwrap().is_empty());
        assert_eq!(store.edges_in_box(&BBox::new(0.9, -0.1, 1.1, 0.1)).unwrap().len(), 1);

        store.delete_edge(edge.id).unwrap();
        assert!(store.edges_in_box(&BBox::new(-1.0, -1.0, 3.0, 6.0)).unwrap().is_empty());
    }
}
