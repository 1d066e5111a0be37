// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The topology engine.
//!
//! [`TopoEngine`] implements the graph algorithms of the edit primitives on
//! top of any [`TopoStore`]. It is not reentrant: callers hold the
//! process-wide guard returned by [`backend_guard`] for the duration of a
//! call.

mod edge;
mod face;
mod links;
mod node;
mod split;

use parking_lot::{Mutex, MutexGuard};
use planar_topo_geometry::{
    is_simple, line_intersections, min_tolerance, point_on_line, BBox, Coord, LineString,
    SegmentIntersection,
};
use tracing::trace;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::keys::{EdgeId, FaceId, NodeId};
use crate::primitives::{Edge, Face, Node};
use crate::store::TopoStore;

pub use links::{cyclic_eq, Star};

/// Serializes every call into the engine, process-wide.
static BACKEND_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Acquires the process-wide engine guard.
pub fn backend_guard() -> MutexGuard<'static, ()> {
    BACKEND_LOCK.lock()
}

/// Graph algorithms over a [`TopoStore`].
pub struct TopoEngine<S: TopoStore> {
    store: S,
    settings: EngineConfig,
}

impl<S: TopoStore> TopoEngine<S> {
    pub fn new(store: S, settings: EngineConfig) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    /// Snapping distance around `c`.
    pub fn tolerance_at(&self, c: &Coord) -> f64 {
        let tolerance = self.store.config().tolerance;
        if tolerance > 0.0 {
            tolerance
        } else {
            min_tolerance(c)
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<Node> {
        self.store
            .get_node(id)?
            .ok_or_else(|| Error::NotFound(format!("SQL/MM Spatial exception - non-existent node {id}")))
    }

    pub(crate) fn edge(&self, id: EdgeId) -> Result<Edge> {
        self.store
            .get_edge(id)?
            .ok_or_else(|| Error::NotFound(format!("SQL/MM Spatial exception - non-existent edge {id}")))
    }

    pub(crate) fn face(&self, id: FaceId) -> Result<Face> {
        self.store
            .get_face(id)?
            .ok_or_else(|| Error::NotFound(format!("SQL/MM Spatial exception - non-existent face {id}")))
    }

    /// Existing node within snapping distance of `p`, closest first.
    pub(crate) fn node_near(&self, p: &Coord, exclude: Option<NodeId>) -> Result<Option<Node>> {
        let tolerance = self.tolerance_at(p);
        let mut best: Option<(f64, Node)> = None;
        for node in self.store.nodes_in_box(&BBox::from_coord(p).buffered(tolerance))? {
            if Some(node.id) == exclude {
                continue;
            }
            let d = node.point.distance(p);
            if d <= tolerance && best.as_ref().map_or(true, |(bd, _)| d < *bd) {
                best = Some((d, node));
            }
        }
        Ok(best.map(|(_, n)| n))
    }

    /// Existing edge within snapping distance of `p`, closest first.
    pub(crate) fn edge_near(&self, p: &Coord) -> Result<Option<Edge>> {
        let tolerance = self.tolerance_at(p);
        let mut best: Option<(f64, Edge)> = None;
        for edge in self.store.edges_in_box(&BBox::from_coord(p).buffered(tolerance))? {
            let d = planar_topo_geometry::distance_to_line(p, &edge.geom);
            if d <= tolerance && best.as_ref().map_or(true, |(bd, _)| d < *bd) {
                best = Some((d, edge));
            }
        }
        Ok(best.map(|(_, e)| e))
    }

    /// Rejects points that coincide with a node or touch an edge.
    pub(crate) fn check_free_point(&self, p: &Coord, moving: Option<NodeId>) -> Result<()> {
        if self.node_near(p, moving)?.is_some() {
            return Err(Error::PreconditionFailed(
                "SQL/MM Spatial exception - coincident node".into(),
            ));
        }
        if self.edge_near(p)?.is_some() {
            return Err(Error::PreconditionFailed(
                "SQL/MM Spatial exception - edge crosses node.".into(),
            ));
        }
        Ok(())
    }

    /// Checks that a line may become the geometry of an edge from
    /// `start` to `end`.
    pub(crate) fn check_edge_line(&self, line: &LineString, start: &Node, end: &Node) -> Result<()> {
        if line.len() < 2 {
            return Err(Error::InvalidGeometry("edge geometry needs at least 2 points".into()));
        }
        if !is_simple(line) {
            return Err(Error::PreconditionFailed(
                "SQL/MM Spatial exception - curve not simple".into(),
            ));
        }
        let (Some(first), Some(last)) = (line.first(), line.last()) else {
            return Err(Error::InvalidGeometry("empty edge geometry".into()));
        };
        if !first.same_xy(&start.point) {
            return Err(Error::PreconditionFailed(
                "SQL/MM Spatial exception - start node not geometry start point.".into(),
            ));
        }
        if !last.same_xy(&end.point) {
            return Err(Error::PreconditionFailed(
                "SQL/MM Spatial exception - end node not geometry end point.".into(),
            ));
        }
        Ok(())
    }

    /// Rejects lines that cross a node or an edge.
    ///
    /// The line may only meet other edges at its own end points, and only
    /// where those edges end too. `ignore` skips the edge being replaced.
    pub(crate) fn check_crossings(
        &self,
        line: &LineString,
        start: NodeId,
        end: NodeId,
        ignore: Option<EdgeId>,
    ) -> Result<()> {
        let Some(bbox) = line.bbox() else {
            return Ok(());
        };
        for node in self.store.nodes_in_box(&bbox)? {
            if node.id == start || node.id == end {
                continue;
            }
            if point_on_line(&node.point, line) {
                return Err(Error::PreconditionFailed(format!(
                    "SQL/MM Spatial exception - geometry crosses a node ({})",
                    node.id
                )));
            }
        }
        let (Some(first), Some(last)) = (line.first(), line.last()) else {
            return Ok(());
        };
        for edge in self.store.edges_in_box(&bbox)? {
            if Some(edge.id) == ignore {
                continue;
            }
            let (Some(e0), Some(e1)) = (edge.geom.first(), edge.geom.last()) else {
                continue;
            };
            for (_, _, hit) in line_intersections(line, &edge.geom) {
                match hit {
                    SegmentIntersection::Overlap(..) => {
                        return Err(Error::PreconditionFailed(format!(
                            "SQL/MM Spatial exception - coincident edge {}",
                            edge.id
                        )));
                    }
                    SegmentIntersection::Point(p) => {
                        let line_end = p.same_xy(&first) || p.same_xy(&last);
                        let edge_end = p.same_xy(&e0) || p.same_xy(&e1);
                        if !(line_end && edge_end) {
                            trace!(edge = edge.id, x = p.x, y = p.y, "crossing");
                            return Err(Error::PreconditionFailed(format!(
                                "SQL/MM Spatial exception - geometry crosses edge {}",
                                edge.id
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Recomputes the bounding box of a bounded face from its edges.
    pub(crate) fn refresh_face_bbox(&self, face: FaceId) -> Result<()> {
        if face == crate::keys::UNIVERSAL_FACE {
            return Ok(());
        }
        let bbox = self
            .store
            .edges_by_face(face)?
            .iter()
            .filter_map(|e| e.bbox())
            .reduce(|a, b| a.union(&b));
        if let Some(bbox) = bbox {
            self.store.update_face(&Face {
                id: face,
                bbox: Some(bbox),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory topology fixtures shared by the engine tests.

    use rusqlite::Connection;

    use super::TopoEngine;
    use crate::config::{EngineConfig, TopologyConfig};
    use crate::store::{schema, Queries, SqliteStore};

    pub struct Fixture {
        pub conn: Connection,
        pub config: TopologyConfig,
        pub queries: Queries,
    }

    impl Fixture {
        pub fn new(tolerance: f64) -> Self {
            Self::build(tolerance, false)
        }

        pub fn with_z(tolerance: f64) -> Self {
            Self::build(tolerance, true)
        }

        fn build(tolerance: f64, has_z: bool) -> Self {
            let conn = Connection::open_in_memory().unwrap();
            schema::init_catalog(&conn).unwrap();
            let config = TopologyConfig {
                name: "topo".into(),
                srid: 0,
                tolerance,
                has_z,
                next_edge_id: 1,
            };
            schema::create_topology(&conn, &config).unwrap();
            Self {
                conn,
                config,
                queries: Queries::new("topo"),
            }
        }

        pub fn engine(&self) -> TopoEngine<SqliteStore<'_>> {
            TopoEngine::new(
                SqliteStore::new(&self.conn, &self.config, &self.queries),
                EngineConfig::default(),
            )
        }

        pub fn count(&self, table: &str) -> i64 {
            self.conn
                .query_row(&format!("SELECT count(*) FROM topo_{table}"), [], |r| r.get(0))
                .unwrap()
        }
    }
}
