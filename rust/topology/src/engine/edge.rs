// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Edge primitives: adding, removing and reshaping edges.

use planar_topo_geometry::{
    leaving_azimuth, ring_position, signed_ring_area, Coord, LineString, Position,
};
use rustc_hash::FxHashMap;
use tracing::debug;

use super::links::{append_coords, Ring, Star};
use super::TopoEngine;
use crate::error::{Error, Result};
use crate::keys::{DirectedEdge, EdgeId, FaceId, NodeId, UNIVERSAL_FACE};
use crate::primitives::{Edge, Face, Node};
use crate::store::TopoStore;

/// Point used to decide on which side of a new ring an edge falls.
fn probe_point(edge: &Edge) -> Option<Coord> {
    let mut segments = edge.geom.segments();
    let (a, b) = segments.next()?;
    Some(Coord::lerp(&a, &b, 0.5))
}

impl<S: TopoStore> TopoEngine<S> {
    /// Adds an edge between two isolated nodes of the same face.
    pub fn add_iso_edge(&self, start: NodeId, end: NodeId, line: &LineString) -> Result<EdgeId> {
        if start == end {
            return Err(Error::PreconditionFailed(
                "Closed edges would not be isolated, try AddEdgeNewFaces".into(),
            ));
        }
        let a = self.node(start)?;
        let b = self.node(end)?;
        let (Some(fa), Some(fb)) = (a.containing_face, b.containing_face) else {
            return Err(Error::NotIsolated(
                "SQL/MM Spatial exception - not isolated node".into(),
            ));
        };
        if fa != fb {
            return Err(Error::PreconditionFailed(
                "SQL/MM Spatial exception - nodes in different faces".into(),
            ));
        }
        self.check_edge_line(line, &a, &b)?;
        self.check_crossings(line, start, end, None)?;

        let id = self.store.next_edge_id()?;
        self.store.insert_edge(&Edge {
            id,
            start_node: start,
            end_node: end,
            next_left: -id,
            next_right: id,
            left_face: fa,
            right_face: fa,
            geom: line.clone(),
        })?;
        self.attach_node(a)?;
        self.attach_node(b)?;
        self.refresh_face_bbox(fa)?;
        debug!(edge = id, start, end, face = fa, "add isolated edge");
        Ok(id)
    }

    /// Removes an edge whose end nodes have no other edge.
    pub fn rem_iso_edge(&self, id: EdgeId) -> Result<()> {
        let edge = self.edge(id)?;
        let isolated = !edge.is_closed()
            && edge.left_face == edge.right_face
            && self.store.edges_by_node(edge.start_node)?.len() == 1
            && self.store.edges_by_node(edge.end_node)?.len() == 1;
        if !isolated {
            return Err(Error::NotIsolated(format!(
                "SQL/MM Spatial exception - not isolated edge {id}"
            )));
        }
        self.store.delete_edge(id)?;
        for node in [edge.start_node, edge.end_node] {
            self.detach_node(node, edge.left_face)?;
        }
        self.refresh_face_bbox(edge.left_face)?;
        debug!(edge = id, "remove isolated edge");
        Ok(())
    }

    /// Adds an edge, splitting the face it closes and keeping the old face
    /// on one side.
    pub fn add_edge_mod_face(&self, start: NodeId, end: NodeId, line: &LineString) -> Result<EdgeId> {
        self.add_edge(start, end, line, false)
    }

    /// Adds an edge, replacing the face it closes by two new faces.
    pub fn add_edge_new_faces(&self, start: NodeId, end: NodeId, line: &LineString) -> Result<EdgeId> {
        self.add_edge(start, end, line, true)
    }

    pub(crate) fn add_edge(
        &self,
        start: NodeId,
        end: NodeId,
        line: &LineString,
        new_faces: bool,
    ) -> Result<EdgeId> {
        let a = self.node(start)?;
        let b = if start == end { a.clone() } else { self.node(end)? };
        self.check_edge_line(line, &a, &b)?;
        self.check_crossings(line, start, end, None)?;

        let az_start = leaving_azimuth(line, false)
            .ok_or_else(|| Error::InvalidGeometry("degenerate edge geometry".into()))?;
        let az_end = leaving_azimuth(line, true)
            .ok_or_else(|| Error::InvalidGeometry("degenerate edge geometry".into()))?;
        let face_start = self.face_toward(&a, az_start)?;
        let face_end = self.face_toward(&b, az_end)?;
        if face_start != face_end {
            return Err(Error::PreconditionFailed(format!(
                "Side-location conflict: new edge starts in face {face_start} and ends in face {face_end}"
            )));
        }
        let face = face_start;

        let id = self.store.next_edge_id()?;
        self.store.insert_edge(&Edge {
            id,
            start_node: start,
            end_node: end,
            next_left: -id,
            next_right: id,
            left_face: face,
            right_face: face,
            geom: line.clone(),
        })?;
        self.attach_node(a)?;
        if start != end {
            self.attach_node(b)?;
        }
        self.relink_node(start)?;
        if start != end {
            self.relink_node(end)?;
        }

        let mut cache: FxHashMap<EdgeId, Edge> = FxHashMap::default();
        let left = self.trace_ring_cached(DirectedEdge::forward(id), &mut cache)?;
        if left.contains(DirectedEdge::backward(id)) {
            self.refresh_face_bbox(face)?;
            debug!(edge = id, face, "add edge without face split");
            return Ok(id);
        }
        let right = self.trace_ring_cached(DirectedEdge::backward(id), &mut cache)?;
        let left_ccw = left.signed_area() > 0.0;

        // faces for the (left, right) rings
        let (left_face, right_face) = if new_faces && face != UNIVERSAL_FACE {
            (self.store.insert_face(None)?, self.store.insert_face(None)?)
        } else if left_ccw {
            (self.store.insert_face(None)?, face)
        } else {
            (face, self.store.insert_face(None)?)
        };

        let mut dirty: Vec<EdgeId> = Vec::new();
        for (ring, target) in [(&left, left_face), (&right, right_face)] {
            for d in &ring.edges {
                if let Some(e) = cache.get_mut(&d.edge) {
                    if e.face_left_of(d.forward) != target {
                        e.set_face_left_of(d.forward, target);
                        if !dirty.contains(&e.id) {
                            dirty.push(e.id);
                        }
                    }
                }
            }
        }
        for eid in &dirty {
            if let Some(e) = cache.get(eid) {
                self.store.update_edge(e)?;
            }
        }

        let (probe, inside, outside) = if left_ccw {
            (&left, left_face, right_face)
        } else {
            (&right, right_face, left_face)
        };
        self.reassign_face(face, probe, &left, &right, inside, outside)?;

        for f in [left_face, right_face] {
            self.refresh_face_bbox(f)?;
        }
        if left_face != face && right_face != face {
            self.store.delete_face(face)?;
        }
        debug!(edge = id, face, left_face, right_face, "add edge splitting face");
        Ok(id)
    }

    /// Face the direction `az` points into when leaving `node`.
    fn face_toward(&self, node: &Node, az: f64) -> Result<FaceId> {
        let edges = self.store.edges_by_node(node.id)?;
        if edges.is_empty() {
            return Ok(node.containing_face.unwrap_or(UNIVERSAL_FACE));
        }
        let star = Star::build(node.id, &edges, None)?;
        let Some(spoke) = star.clockwise_of(az) else {
            return Ok(node.containing_face.unwrap_or(UNIVERSAL_FACE));
        };
        edges
            .iter()
            .find(|e| e.id == spoke.edge)
            .map(|e| e.face_left_of(spoke.forward))
            .ok_or_else(|| Error::NotFound(format!("edge {}", spoke.edge)))
    }

    /// Moves the remaining elements of a split face to the side they lie on.
    fn reassign_face(
        &self,
        face: FaceId,
        probe: &Ring,
        left: &Ring,
        right: &Ring,
        inside: FaceId,
        outside: FaceId,
    ) -> Result<()> {
        for mut edge in self.store.edges_by_face(face)? {
            let mut changed = false;
            for forward in [true, false] {
                let d = DirectedEdge {
                    edge: edge.id,
                    forward,
                };
                if edge.face_left_of(forward) != face || left.contains(d) || right.contains(d) {
                    continue;
                }
                let Some(p) = probe_point(&edge) else {
                    continue;
                };
                let target = if ring_position(&probe.coords, &p) == Position::Inside {
                    inside
                } else {
                    outside
                };
                if target != face {
                    edge.set_face_left_of(forward, target);
                    changed = true;
                }
            }
            if changed {
                self.store.update_edge(&edge)?;
            }
        }
        for mut node in self.store.isolated_nodes_in_face(face)? {
            let target = if ring_position(&probe.coords, &node.point) == Position::Inside {
                inside
            } else {
                outside
            };
            if target != face {
                node.containing_face = Some(target);
                self.store.update_node(&node)?;
            }
        }
        Ok(())
    }

    /// Removes an edge, merging the faces on its sides into one of them.
    pub fn rem_edge_mod_face(&self, id: EdgeId) -> Result<FaceId> {
        self.rem_edge(id, false)
    }

    /// Removes an edge, merging the faces on its sides into a new face.
    pub fn rem_edge_new_face(&self, id: EdgeId) -> Result<FaceId> {
        self.rem_edge(id, true)
    }

    pub(crate) fn rem_edge(&self, id: EdgeId, new_face: bool) -> Result<FaceId> {
        let edge = self.edge(id)?;
        let isolated = !edge.is_closed()
            && self.store.edges_by_node(edge.start_node)?.len() == 1
            && self.store.edges_by_node(edge.end_node)?.len() == 1;
        if isolated {
            return Err(Error::PreconditionFailed(format!(
                "edge {id} is isolated, use RemIsoEdge"
            )));
        }
        let (fl, fr) = (edge.left_face, edge.right_face);

        if fl == fr {
            self.store.delete_edge(id)?;
            self.detach_edge_ends(&edge, fl)?;
            self.refresh_face_bbox(fl)?;
            debug!(edge = id, face = fl, "remove dangling edge");
            return Ok(fl);
        }

        let merged_bbox = match (self.face(fl)?.bbox, self.face(fr)?.bbox) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        };
        let target = if fl == UNIVERSAL_FACE || fr == UNIVERSAL_FACE {
            UNIVERSAL_FACE
        } else if new_face {
            self.store.insert_face(merged_bbox)?
        } else {
            self.store.update_face(&Face {
                id: fr,
                bbox: merged_bbox,
            })?;
            fr
        };

        for old in [fl, fr] {
            if old == target {
                continue;
            }
            for mut other in self.store.edges_by_face(old)? {
                if other.id == id {
                    continue;
                }
                if other.left_face == old {
                    other.left_face = target;
                }
                if other.right_face == old {
                    other.right_face = target;
                }
                self.store.update_edge(&other)?;
            }
            for mut node in self.store.isolated_nodes_in_face(old)? {
                node.containing_face = Some(target);
                self.store.update_node(&node)?;
            }
        }
        self.store.delete_edge(id)?;
        self.detach_edge_ends(&edge, target)?;
        for old in [fl, fr] {
            if old != target && old != UNIVERSAL_FACE {
                self.store.delete_face(old)?;
            }
        }
        debug!(edge = id, left = fl, right = fr, face = target, "remove edge merging faces");
        Ok(target)
    }

    /// Replaces the geometry of an edge without changing the topology.
    pub fn change_edge_geom(&self, id: EdgeId, line: &LineString) -> Result<()> {
        let edge = self.edge(id)?;
        let start = self.node(edge.start_node)?;
        let end = self.node(edge.end_node)?;
        self.check_edge_line(line, &start, &end)?;
        self.check_crossings(line, start.id, end.id, Some(id))?;

        // nodes swept over by the motion
        let mut sweep = Vec::with_capacity(edge.geom.len() + line.len());
        append_coords(&mut sweep, &edge.geom, true);
        append_coords(&mut sweep, line, false);
        if let Some(bbox) = edge.geom.bbox().zip(line.bbox()).map(|(a, b)| a.union(&b)) {
            for node in self.store.nodes_in_box(&bbox)? {
                if node.id == start.id || node.id == end.id {
                    continue;
                }
                if ring_position(&sweep, &node.point) == Position::Inside {
                    return Err(Error::PreconditionFailed(format!(
                        "SQL/MM Spatial exception - Edge motion collision at node {}",
                        node.id
                    )));
                }
            }
        }

        for node in if edge.is_closed() { vec![start.id] } else { vec![start.id, end.id] } {
            let edges = self.store.edges_by_node(node)?;
            let before = Star::build(node, &edges, None)?.order();
            let after = Star::build(node, &edges, Some((id, line)))?.order();
            if !super::cyclic_eq(&before, &after) {
                return Err(Error::PreconditionFailed(format!(
                    "Edge {id} changed disposition around node {node}"
                )));
            }
        }
        if edge.is_closed() {
            let old = signed_ring_area(&edge.geom.coords);
            let new = signed_ring_area(&line.coords);
            if old.signum() != new.signum() {
                return Err(Error::PreconditionFailed(format!("Edge {id} twists")));
            }
        }

        self.store.update_edge(&Edge {
            geom: line.clone(),
            ..edge.clone()
        })?;
        self.refresh_face_bbox(edge.left_face)?;
        if edge.right_face != edge.left_face {
            self.refresh_face_bbox(edge.right_face)?;
        }
        debug!(edge = id, "change edge geometry");
        Ok(())
    }

    /// Clears the containing face of a node gaining its first edge.
    fn attach_node(&self, node: Node) -> Result<()> {
        if node.containing_face.is_some() {
            self.store.update_node(&Node {
                containing_face: None,
                ..node
            })?;
        }
        Ok(())
    }

    /// Marks a node isolated in `face` once its last edge is gone.
    fn detach_node(&self, id: NodeId, face: FaceId) -> Result<()> {
        if self.store.edges_by_node(id)?.is_empty() {
            let node = self.node(id)?;
            self.store.update_node(&Node {
                containing_face: Some(face),
                ..node
            })?;
        }
        Ok(())
    }

    fn detach_edge_ends(&self, edge: &Edge, face: FaceId) -> Result<()> {
        self.relink_node(edge.start_node)?;
        self.detach_node(edge.start_node, face)?;
        if edge.end_node != edge.start_node {
            self.relink_node(edge.end_node)?;
            self.detach_node(edge.end_node, face)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Fixture;
    use super::*;
    use approx::assert_relative_eq;

    fn xy(pts: &[(f64, f64)]) -> LineString {
        LineString::from_xy(pts)
    }

    /// A 4x4 square face; returns its corner nodes counter-clockwise.
    fn square(fx: &Fixture) -> [NodeId; 4] {
        let engine = fx.engine();
        let n: Vec<NodeId> = [(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)]
            .iter()
            .map(|&(x, y)| engine.add_iso_node(None, &Coord::new(x, y)).unwrap())
            .collect();
        engine.add_iso_edge(n[0], n[1], &xy(&[(0.0, 0.0), (4.0, 0.0)])).unwrap();
        engine.add_edge_mod_face(n[1], n[2], &xy(&[(4.0, 0.0), (4.0, 4.0)])).unwrap();
        engine.add_edge_mod_face(n[2], n[3], &xy(&[(4.0, 4.0), (0.0, 4.0)])).unwrap();
        engine.add_edge_mod_face(n[3], n[0], &xy(&[(0.0, 4.0), (0.0, 0.0)])).unwrap();
        [n[0], n[1], n[2], n[3]]
    }

    #[test]
    fn closing_a_ring_creates_one_face() {
        let fx = Fixture::new(0.0);
        square(&fx);
        assert_eq!(fx.count("face"), 2);
        let engine = fx.engine();
        let face = engine.face_containing_point(&Coord::new(2.0, 2.0)).unwrap();
        assert_eq!(face, 1);
        let bottom = engine.edge(1).unwrap();
        assert_eq!((bottom.left_face, bottom.right_face), (1, 0));
        let closing = engine.edge(4).unwrap();
        assert_eq!((closing.left_face, closing.right_face), (1, 0));
        assert_relative_eq!(engine.face_geometry(1).unwrap().area(), 16.0);
        let bbox = engine.face(1).unwrap().bbox.unwrap();
        assert_relative_eq!(bbox.max_x, 4.0);
    }

    #[test]
    fn chord_mod_face_keeps_the_old_face() {
        let fx = Fixture::new(0.0);
        let n = square(&fx);
        let engine = fx.engine();
        let iso = engine.add_iso_node(None, &Coord::new(3.0, 1.0)).unwrap();
        let chord = engine
            .add_edge_mod_face(n[0], n[2], &xy(&[(0.0, 0.0), (4.0, 4.0)]))
            .unwrap();
        let e = engine.edge(chord).unwrap();
        // the chord's left ring runs through the top-left corner, counter-clockwise
        assert_eq!(e.right_face, 1);
        assert_eq!(e.left_face, 2);
        assert_eq!(engine.node(iso).unwrap().containing_face, Some(1));
        assert_relative_eq!(engine.face_geometry(1).unwrap().area(), 8.0);
        assert_relative_eq!(engine.face_geometry(2).unwrap().area(), 8.0);
    }

    #[test]
    fn chord_new_faces_replaces_the_old_face() {
        let fx = Fixture::new(0.0);
        let n = square(&fx);
        let engine = fx.engine();
        let chord = engine
            .add_edge_new_faces(n[0], n[2], &xy(&[(0.0, 0.0), (4.0, 4.0)]))
            .unwrap();
        let e = engine.edge(chord).unwrap();
        assert_eq!((e.left_face, e.right_face), (2, 3));
        assert!(engine.store().get_face(1).unwrap().is_none());
        assert_eq!(fx.count("face"), 3);
    }

    #[test]
    fn crossing_edges_are_rejected() {
        let fx = Fixture::new(0.0);
        let n = square(&fx);
        let engine = fx.engine();
        let err = engine
            .add_edge_mod_face(n[0], n[2], &xy(&[(0.0, 0.0), (5.0, 2.0), (4.0, 4.0)]))
            .unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));
        let err = engine
            .add_edge_mod_face(n[0], n[1], &xy(&[(0.0, 0.0), (4.0, 1.0)]))
            .unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));
    }

    #[test]
    fn removing_edges_merges_faces() {
        let fx = Fixture::new(0.0);
        let n = square(&fx);
        let engine = fx.engine();
        let chord = engine
            .add_edge_mod_face(n[0], n[2], &xy(&[(0.0, 0.0), (4.0, 4.0)]))
            .unwrap();
        assert_eq!(engine.rem_edge_mod_face(chord).unwrap(), 1);
        assert_eq!(fx.count("face"), 2);
        assert_relative_eq!(engine.face_geometry(1).unwrap().area(), 16.0);

        // removing a boundary edge merges into the universal face
        assert_eq!(engine.rem_edge_new_face(1).unwrap(), UNIVERSAL_FACE);
        assert_eq!(fx.count("face"), 1);
        assert_eq!(engine.edge(2).unwrap().left_face, UNIVERSAL_FACE);
    }

    #[test]
    fn isolated_edges_round_trip() {
        let fx = Fixture::new(0.0);
        let engine = fx.engine();
        let a = engine.add_iso_node(None, &Coord::new(0.0, 0.0)).unwrap();
        let b = engine.add_iso_node(None, &Coord::new(1.0, 1.0)).unwrap();
        let e = engine.add_iso_edge(a, b, &xy(&[(0.0, 0.0), (1.0, 1.0)])).unwrap();
        assert_eq!(engine.node(a).unwrap().containing_face, None);
        assert!(matches!(engine.rem_edge_mod_face(e), Err(Error::PreconditionFailed(_))));
        engine.rem_iso_edge(e).unwrap();
        assert_eq!(engine.node(b).unwrap().containing_face, Some(UNIVERSAL_FACE));
        assert_eq!(fx.count("edge"), 0);
    }

    #[test]
    fn reshaping_keeps_topology() {
        let fx = Fixture::new(0.0);
        square(&fx);
        let engine = fx.engine();
        engine
            .change_edge_geom(1, &xy(&[(0.0, 0.0), (2.0, -1.0), (4.0, 0.0)]))
            .unwrap();
        assert_relative_eq!(engine.face_geometry(1).unwrap().area(), 18.0);
        assert_relative_eq!(engine.face(1).unwrap().bbox.unwrap().min_y, -1.0);

        // sweeping over a node is a collision
        let lone = engine.add_iso_node(None, &Coord::new(2.0, -2.0)).unwrap();
        let err = engine
            .change_edge_geom(1, &xy(&[(0.0, 0.0), (2.0, -3.0), (4.0, 0.0)]))
            .unwrap_err();
        assert!(err.to_string().contains("motion collision"), "{err}");
        engine.rem_iso_node(lone).unwrap();

        // end points cannot move
        let err = engine
            .change_edge_geom(1, &xy(&[(0.5, 0.0), (4.0, 0.0)]))
            .unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));
    }
}
