// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Point lookups and cleanup passes.

use planar_topo_geometry::{distance_to_line, BBox, Coord};
use tracing::debug;

use crate::engine::TopoEngine;
use crate::error::{Error, Result};
use crate::keys::{EdgeId, FaceId, NodeId};
use crate::store::TopoStore;

impl<S: TopoStore> TopoEngine<S> {
    /// Search distance for the point queries; non-positive means the
    /// topology's snapping distance.
    fn query_tolerance(&self, p: &Coord, tolerance: f64) -> f64 {
        if tolerance > 0.0 {
            tolerance
        } else {
            self.tolerance_at(p)
        }
    }

    /// The node within `tolerance` of `p`, if any.
    pub fn node_by_point(&self, p: &Coord, tolerance: f64) -> Result<Option<NodeId>> {
        let tolerance = self.query_tolerance(p, tolerance);
        let hits: Vec<NodeId> = self
            .store()
            .nodes_in_box(&BBox::from_coord(p).buffered(tolerance))?
            .into_iter()
            .filter(|n| n.point.distance(p) <= tolerance)
            .map(|n| n.id)
            .collect();
        match hits.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(*id)),
            _ => Err(Error::PreconditionFailed("Two or more nodes found".into())),
        }
    }

    /// The edge within `tolerance` of `p`, if any.
    pub fn edge_by_point(&self, p: &Coord, tolerance: f64) -> Result<Option<EdgeId>> {
        let tolerance = self.query_tolerance(p, tolerance);
        let hits: Vec<EdgeId> = self
            .store()
            .edges_in_box(&BBox::from_coord(p).buffered(tolerance))?
            .into_iter()
            .filter(|e| distance_to_line(p, &e.geom) <= tolerance)
            .map(|e| e.id)
            .collect();
        match hits.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(*id)),
            _ => Err(Error::PreconditionFailed("Two or more edges found".into())),
        }
    }

    /// The face containing `p`.
    ///
    /// A point on edges is accepted when all of them bound the same face
    /// on both sides; otherwise the answer is ambiguous.
    pub fn face_by_point(&self, p: &Coord) -> Result<FaceId> {
        let tolerance = self.tolerance_at(p);
        let near: Vec<_> = self
            .store()
            .edges_in_box(&BBox::from_coord(p).buffered(tolerance))?
            .into_iter()
            .filter(|e| distance_to_line(p, &e.geom) <= tolerance)
            .collect();
        if near.is_empty() {
            return self.face_containing_point(p);
        }
        let face = near[0].left_face;
        if near.iter().all(|e| e.left_face == face && e.right_face == face) {
            return Ok(face);
        }
        Err(Error::PreconditionFailed(
            "Two or more faces found: point is on an edge between faces".into(),
        ))
    }

    /// Removes edges with a free end until none is left, together with
    /// the nodes they leave isolated. Returns the number of edges removed.
    pub fn remove_dangling_edges(&self) -> Result<usize> {
        let mut removed = 0;
        loop {
            let mut freed: Vec<NodeId> = Vec::new();
            for edge in self.store().all_edges()? {
                // earlier removals in this round may have taken it already
                if self.store().get_edge(edge.id)?.is_none() {
                    continue;
                }
                let start = self.store().edges_by_node(edge.start_node)?.len();
                let end = self.store().edges_by_node(edge.end_node)?.len();
                if edge.is_closed() || (start > 1 && end > 1) {
                    continue;
                }
                if start == 1 && end == 1 {
                    self.rem_iso_edge(edge.id)?;
                } else {
                    self.rem_edge_mod_face(edge.id)?;
                }
                freed.extend([edge.start_node, edge.end_node]);
                removed += 1;
            }
            if freed.is_empty() {
                break;
            }
            for node in freed {
                let isolated = self
                    .store()
                    .get_node(node)?
                    .is_some_and(|n| n.containing_face.is_some());
                if isolated {
                    self.rem_iso_node(node)?;
                }
            }
        }
        debug!(removed, "remove dangling edges");
        Ok(removed)
    }

    /// Heals every node joining exactly two distinct open edges. Returns
    /// the number of nodes removed.
    pub fn remove_dangling_nodes(&self) -> Result<usize> {
        let mut removed = 0;
        for node in self.store().all_nodes()? {
            if self.store().get_node(node.id)?.is_none() {
                continue;
            }
            let edges = self.store().edges_by_node(node.id)?;
            let [a, b] = edges.as_slice() else {
                continue;
            };
            if a.id == b.id || a.is_closed() || b.is_closed() {
                continue;
            }
            self.mod_edge_heal(a.id.min(b.id), a.id.max(b.id))?;
            removed += 1;
        }
        debug!(removed, "remove dangling nodes");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::Fixture;
    use planar_topo_geometry::LineString;

    #[test]
    fn point_queries() {
        let fx = Fixture::new(0.0);
        let engine = fx.engine();
        engine
            .add_line(&LineString::from_xy(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]))
            .unwrap();
        assert_eq!(engine.node_by_point(&Coord::new(0.1, 0.0), 0.5).unwrap(), Some(1));
        assert_eq!(engine.node_by_point(&Coord::new(2.0, 2.0), 0.5).unwrap(), None);
        assert_eq!(engine.edge_by_point(&Coord::new(2.0, 0.1), 0.5).unwrap(), Some(1));
        assert_eq!(engine.face_by_point(&Coord::new(2.0, 2.0)).unwrap(), 1);
        assert_eq!(engine.face_by_point(&Coord::new(9.0, 9.0)).unwrap(), 0);
        assert!(matches!(
            engine.face_by_point(&Coord::new(2.0, 0.0)),
            Err(Error::PreconditionFailed(_))
        ));
    }

    #[test]
    fn several_nodes_are_ambiguous() {
        let fx = Fixture::new(0.0);
        let engine = fx.engine();
        engine.add_iso_node(None, &Coord::new(0.0, 0.0)).unwrap();
        engine.add_iso_node(None, &Coord::new(1.0, 0.0)).unwrap();
        assert!(matches!(
            engine.node_by_point(&Coord::new(0.5, 0.0), 1.0),
            Err(Error::PreconditionFailed(_))
        ));
    }

    #[test]
    fn dangling_cleanup() {
        let fx = Fixture::new(0.0);
        let engine = fx.engine();
        // a square with a two-edge tail hanging off a corner
        engine
            .add_line(&LineString::from_xy(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]))
            .unwrap();
        engine
            .add_line(&LineString::from_xy(&[(4.0, 4.0), (6.0, 6.0)]))
            .unwrap();
        engine
            .add_line(&LineString::from_xy(&[(6.0, 6.0), (8.0, 6.0)]))
            .unwrap();
        // the square is split at the tail's root
        assert_eq!(fx.count("edge"), 4);
        assert_eq!(engine.remove_dangling_edges().unwrap(), 2);
        assert_eq!(fx.count("edge"), 2);
        assert_eq!(fx.count("face"), 2);
        // one of the two square halves absorbs the other
        assert_eq!(engine.remove_dangling_nodes().unwrap(), 1);
        assert_eq!(fx.count("edge"), 1);
        assert_eq!(fx.count("node"), 1);
        approx::assert_relative_eq!(engine.face_geometry(1).unwrap().area(), 16.0);
    }
}
