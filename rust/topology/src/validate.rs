// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Whole-topology consistency checks.
//!
//! Each check appends rows to one report; the report is written to
//! `temp."<name>_validate_topogeo"(error, primitive1, primitive2)`, replacing
//! the previous run. Finding problems is a successful run; only a failing
//! query aborts validation.

use planar_topo_geometry::{
    intersection_area, is_simple, line_intersections, point_on_line, BBox, Coord, Polygon,
    SegmentIntersection,
};
use rusqlite::{params, Connection};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::{backend_guard, TopoEngine};
use crate::error::{Error, Result};
use crate::keys::{FaceId, NodeId, UNIVERSAL_FACE};
use crate::primitives::{Edge, Node};
use crate::spatial::SpatialGrid;
use crate::store::{codec, SqliteStore, TopoStore};

/// Relative tolerance on face areas when comparing overlaps.
const AREA_EPSILON: f64 = 1e-9;

/// Kinds of problems the validator reports, in check order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum IssueKind {
    CoincidentNodes,
    EdgeCrossesNode,
    InvalidEdge,
    EdgeCrossesEdge,
    StartNodeMismatch,
    EndNodeMismatch,
    FaceWithoutEdges,
    NoUniversalFace,
    FaceOverlapsFace,
    FaceWithinFace,
}

impl IssueKind {
    /// Text stored in the `error` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::CoincidentNodes => "coincident nodes",
            IssueKind::EdgeCrossesNode => "edge crosses node",
            IssueKind::InvalidEdge => "invalid edge",
            IssueKind::EdgeCrossesEdge => "edge crosses edge",
            IssueKind::StartNodeMismatch => "edge start node geometry mis-match",
            IssueKind::EndNodeMismatch => "edge end node geometry mis-match",
            IssueKind::FaceWithoutEdges => "face without edges",
            IssueKind::NoUniversalFace => "no universal face",
            IssueKind::FaceOverlapsFace => "face overlaps face",
            IssueKind::FaceWithinFace => "face within face",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One report row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub primitive1: Option<i64>,
    pub primitive2: Option<i64>,
}

impl Issue {
    fn pair(kind: IssueKind, a: i64, b: i64) -> Self {
        Self {
            kind,
            primitive1: Some(a),
            primitive2: Some(b),
        }
    }

    fn single(kind: IssueKind, a: i64) -> Self {
        Self {
            kind,
            primitive1: Some(a),
            primitive2: None,
        }
    }
}

/// Runs every check and stores the report.
pub fn validate(engine: &TopoEngine<SqliteStore<'_>>) -> Result<Vec<Issue>> {
    run(engine).map_err(|e| match e {
        Error::ValidationAborted(_) => e,
        other => Error::ValidationAborted(other.to_string()),
    })
}

fn run(engine: &TopoEngine<SqliteStore<'_>>) -> Result<Vec<Issue>> {
    let store = engine.store();
    let conn = store.connection();
    let name = store.config().name.clone();
    let tables = &store.queries().tables;

    conn.execute_batch(&format!(
        r#"DROP TABLE IF EXISTS temp."{t}";
           CREATE TEMP TABLE "{t}" (error TEXT NOT NULL, primitive1 INTEGER, primitive2 INTEGER);"#,
        t = tables.validate
    ))?;

    let nodes = store.all_nodes()?;
    let edges = store.all_edges()?;
    let mut issues = Vec::new();
    coincident_nodes(&nodes, &mut issues);
    edge_crosses_node(&nodes, &edges, &mut issues);
    invalid_edges(&edges, &mut issues);
    edge_crosses_edge(&edges, &mut issues);
    node_mismatches(&nodes, &edges, &mut issues);
    faces_without_edges(conn, &tables.face, &tables.edge, &mut issues)?;
    if store.get_face(UNIVERSAL_FACE)?.is_none() {
        issues.push(Issue {
            kind: IssueKind::NoUniversalFace,
            primitive1: None,
            primitive2: None,
        });
    }
    overlapping_faces(engine, &tables.face_check, &tables.face_check_rtree, &mut issues)?;

    issues.sort();
    issues.dedup();
    {
        let mut stmt = conn.prepare(&format!(
            r#"INSERT INTO temp."{}" (error, primitive1, primitive2) VALUES (?1, ?2, ?3)"#,
            tables.validate
        ))?;
        for issue in &issues {
            stmt.execute(params![issue.kind.as_str(), issue.primitive1, issue.primitive2])?;
        }
    }
    info!(topology = %name, issues = issues.len(), "validated topology");
    Ok(issues)
}

/// Hash key of a point; `-0.0` and `0.0` compare equal.
fn point_key(node: &Node) -> (u64, u64) {
    let norm = |v: f64| if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() };
    (norm(node.point.x), norm(node.point.y))
}

fn coincident_nodes(nodes: &[Node], issues: &mut Vec<Issue>) {
    let mut by_point: FxHashMap<(u64, u64), Vec<NodeId>> = FxHashMap::default();
    for node in nodes {
        by_point.entry(point_key(node)).or_default().push(node.id);
    }
    for ids in by_point.values().filter(|ids| ids.len() > 1) {
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                issues.push(Issue::pair(IssueKind::CoincidentNodes, *a.min(b), *a.max(b)));
            }
        }
    }
}

fn extent(boxes: impl Iterator<Item = BBox>) -> Option<BBox> {
    boxes.reduce(|a, b| a.union(&b))
}

fn edge_crosses_node(nodes: &[Node], edges: &[Edge], issues: &mut Vec<Issue>) {
    let Some(area) = extent(nodes.iter().map(|n| BBox::from_coord(&n.point))) else {
        return;
    };
    let mut grid = SpatialGrid::for_extent(&area, nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        grid.insert(i, &BBox::from_coord(&node.point));
    }
    for edge in edges {
        let Some(bbox) = edge.bbox() else {
            continue;
        };
        for i in grid.query(&bbox) {
            let node = &nodes[i];
            if node.id == edge.start_node || node.id == edge.end_node {
                continue;
            }
            if bbox.contains_coord(&node.point) && point_on_line(&node.point, &edge.geom) {
                issues.push(Issue::pair(IssueKind::EdgeCrossesNode, edge.id, node.id));
            }
        }
    }
}

fn invalid_edges(edges: &[Edge], issues: &mut Vec<Issue>) {
    for edge in edges {
        if edge.geom.len() < 2 || !is_simple(&edge.geom) {
            issues.push(Issue::single(IssueKind::InvalidEdge, edge.id));
        }
    }
}

/// The interiors of two edges meet: a crossing or a shared stretch. A point
/// where either edge ends is a touch and is left to the node checks.
fn edges_cross(a: &Edge, b: &Edge) -> bool {
    let at_end = |e: &Edge, p: &Coord| {
        [e.geom.first(), e.geom.last()]
            .iter()
            .flatten()
            .any(|c| c.same_xy(p))
    };
    line_intersections(&a.geom, &b.geom).into_iter().any(|(_, _, hit)| match hit {
        SegmentIntersection::Overlap(..) => true,
        SegmentIntersection::Point(p) => !at_end(a, &p) && !at_end(b, &p),
    })
}

fn edge_crosses_edge(edges: &[Edge], issues: &mut Vec<Issue>) {
    let boxes: Vec<Option<BBox>> = edges.iter().map(|e| e.bbox()).collect();
    let Some(area) = extent(boxes.iter().flatten().copied()) else {
        return;
    };
    let mut grid = SpatialGrid::for_extent(&area, edges.len());
    for (i, bbox) in boxes.iter().enumerate() {
        if let Some(bbox) = bbox {
            grid.insert(i, bbox);
        }
    }
    for (i, a) in edges.iter().enumerate() {
        let Some(abox) = boxes[i] else {
            continue;
        };
        for j in grid.query(&abox) {
            if j <= i || !boxes[j].is_some_and(|b| b.intersects(&abox)) {
                continue;
            }
            let b = &edges[j];
            if edges_cross(a, b) {
                issues.push(Issue::pair(IssueKind::EdgeCrossesEdge, a.id.min(b.id), a.id.max(b.id)));
            }
        }
    }
}

fn node_mismatches(nodes: &[Node], edges: &[Edge], issues: &mut Vec<Issue>) {
    let points: FxHashMap<NodeId, &Node> = nodes.iter().map(|n| (n.id, n)).collect();
    for edge in edges {
        let matches = |id: NodeId, end: Option<Coord>| {
            match (points.get(&id), end) {
                (Some(node), Some(c)) => node.point.same_xy(&c),
                _ => false,
            }
        };
        if !matches(edge.start_node, edge.geom.first()) {
            issues.push(Issue::pair(IssueKind::StartNodeMismatch, edge.id, edge.start_node));
        }
        if !matches(edge.end_node, edge.geom.last()) {
            issues.push(Issue::pair(IssueKind::EndNodeMismatch, edge.id, edge.end_node));
        }
    }
}

fn faces_without_edges(conn: &Connection, face: &str, edge: &str, issues: &mut Vec<Issue>) -> Result<()> {
    let mut stmt = conn.prepare(&format!(
        r#"SELECT face_id FROM "{face}" WHERE face_id <> 0 AND face_id NOT IN
           (SELECT left_face FROM "{edge}" UNION SELECT right_face FROM "{edge}")
           ORDER BY face_id"#
    ))?;
    let ids = stmt
        .query_map([], |row| row.get::<_, FaceId>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    issues.extend(ids.into_iter().map(|id| Issue::single(IssueKind::FaceWithoutEdges, id)));
    Ok(())
}

/// Scratch relations of the face check, dropped on every exit path.
struct ScratchTables<'c> {
    conn: &'c Connection,
    table: &'c str,
    rtree: &'c str,
}

impl<'c> ScratchTables<'c> {
    fn create(conn: &'c Connection, table: &'c str, rtree: &'c str) -> Result<Self> {
        let scratch = Self { conn, table, rtree };
        scratch.drop_tables();
        conn.execute_batch(&format!(
            r#"CREATE TEMP TABLE "{table}" (face_id INTEGER PRIMARY KEY, geom TEXT NOT NULL);
               CREATE VIRTUAL TABLE temp."{rtree}" USING rtree(id_face, minx, maxx, miny, maxy);"#
        ))?;
        Ok(scratch)
    }

    fn drop_tables(&self) {
        let sql = format!(
            r#"DROP TABLE IF EXISTS temp."{}"; DROP TABLE IF EXISTS temp."{}";"#,
            self.rtree, self.table
        );
        if let Err(e) = self.conn.execute_batch(&sql) {
            warn!(error = %e, "could not drop face check tables");
        }
    }
}

impl Drop for ScratchTables<'_> {
    fn drop(&mut self) {
        self.drop_tables();
    }
}

fn overlapping_faces(
    engine: &TopoEngine<SqliteStore<'_>>,
    table: &str,
    rtree: &str,
    issues: &mut Vec<Issue>,
) -> Result<()> {
    let store = engine.store();
    let conn = store.connection();
    let scratch = ScratchTables::create(conn, table, rtree)?;

    {
        let _guard = backend_guard();
        let mut insert = conn.prepare(&format!(
            r#"INSERT INTO temp."{}" (face_id, geom) VALUES (?1, ?2)"#,
            scratch.table
        ))?;
        let mut index = conn.prepare(&format!(
            r#"INSERT INTO temp."{}" (id_face, minx, maxx, miny, maxy) VALUES (?1, ?2, ?3, ?4, ?5)"#,
            scratch.rtree
        ))?;
        for face in store.all_faces()? {
            if face.id == UNIVERSAL_FACE {
                continue;
            }
            let polygon = match engine.face_geometry(face.id) {
                Ok(polygon) => polygon,
                Err(Error::NoGeometry(id)) => {
                    warn!(face = id, "skipping face without geometry");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let Some(bbox) = polygon.bbox() else {
                continue;
            };
            insert.execute(params![face.id, codec::encode_polygon(&polygon)?])?;
            index.execute(params![face.id, bbox.min_x, bbox.max_x, bbox.min_y, bbox.max_y])?;
        }
    }

    let mut polygons: FxHashMap<FaceId, Polygon> = FxHashMap::default();
    {
        let mut stmt = conn.prepare(&format!(r#"SELECT face_id, geom FROM temp."{}""#, scratch.table))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, FaceId>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (id, text) in rows {
            polygons.insert(id, codec::decode_polygon(&text)?);
        }
    }

    let mut pairs = conn.prepare(&format!(
        r#"SELECT a.id_face, b.id_face FROM temp."{r}" a, temp."{r}" b
           WHERE a.id_face < b.id_face
             AND a.minx <= b.maxx AND a.maxx >= b.minx
             AND a.miny <= b.maxy AND a.maxy >= b.miny
           ORDER BY a.id_face, b.id_face"#,
        r = scratch.rtree
    ))?;
    let candidates = pairs
        .query_map([], |row| Ok((row.get::<_, FaceId>(0)?, row.get::<_, FaceId>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    debug!(candidates = candidates.len(), "face pairs with overlapping boxes");
    for (a, b) in candidates {
        let (Some(pa), Some(pb)) = (polygons.get(&a), polygons.get(&b)) else {
            continue;
        };
        let (area_a, area_b) = (pa.area(), pb.area());
        let eps = AREA_EPSILON * area_a.max(area_b).max(1.0);
        let shared = intersection_area(pa, pb);
        if shared <= eps {
            continue;
        }
        if (shared - area_a).abs() <= eps {
            issues.push(Issue::pair(IssueKind::FaceWithinFace, a, b));
        } else if (shared - area_b).abs() <= eps {
            issues.push(Issue::pair(IssueKind::FaceWithinFace, b, a));
        } else {
            issues.push(Issue::pair(IssueKind::FaceOverlapsFace, a, b));
        }
    }
    Ok(())
}
