// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Face boundaries: reconstruction of face polygons and edge cycles.

use planar_topo_geometry::{
    polygon_position, signed_ring_area, BBox, Coord, LineString, Polygon, Position,
};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::links::{append_coords, Ring};
use super::TopoEngine;
use crate::error::{Error, Result};
use crate::keys::{DirectedEdge, EdgeId, FaceId, NodeId, UNIVERSAL_FACE};
use crate::primitives::Edge;
use crate::store::TopoStore;

/// Directed edges having `face` on their left.
fn directed_edges_of(face: FaceId, edges: &[Edge]) -> Vec<DirectedEdge> {
    let mut out = Vec::new();
    for edge in edges {
        if edge.left_face == face {
            out.push(DirectedEdge::forward(edge.id));
        }
        if edge.right_face == face {
            out.push(DirectedEdge::backward(edge.id));
        }
    }
    out
}

impl<S: TopoStore> TopoEngine<S> {
    /// Link cycles made of the directed edges with `face` on the left.
    pub(crate) fn face_rings(&self, face: FaceId) -> Result<(Vec<Ring>, FxHashMap<EdgeId, Edge>)> {
        let edges = self.store.edges_by_face(face)?;
        let directed = directed_edges_of(face, &edges);
        let mut cache: FxHashMap<EdgeId, Edge> = edges.into_iter().map(|e| (e.id, e)).collect();
        let mut seen: FxHashSet<DirectedEdge> = FxHashSet::default();
        let mut rings = Vec::new();
        for d in directed {
            if seen.contains(&d) {
                continue;
            }
            let ring = self.trace_ring_cached(d, &mut cache)?;
            for e in &ring.edges {
                let left = cache.get(&e.edge).map(|edge| edge.face_left_of(e.forward));
                if left != Some(face) {
                    return Err(Error::PreconditionFailed(format!(
                        "corrupted topology: edge {e} in a ring of face {face} has face {} on its left",
                        left.unwrap_or(-1)
                    )));
                }
                seen.insert(*e);
            }
            rings.push(ring);
        }
        Ok((rings, cache))
    }

    /// Polygon bounded by the edges of `face`.
    pub fn face_geometry(&self, face: FaceId) -> Result<Polygon> {
        if face == UNIVERSAL_FACE {
            return Err(Error::NoGeometry(face));
        }
        self.face(face)?;
        let (rings, cache) = self.face_rings(face).map_err(|e| match e {
            Error::PreconditionFailed(msg) => {
                debug!(face, %msg, "face rings do not close");
                Error::NoGeometry(face)
            }
            other => other,
        })?;

        let mut shells: Vec<LineString> = Vec::new();
        let mut holes: Vec<LineString> = Vec::new();
        for ring in &rings {
            // edges with the face on both sides do not bound it
            let walk: Vec<DirectedEdge> = ring
                .edges
                .iter()
                .copied()
                .filter(|d| cache.get(&d.edge).is_some_and(|e| e.left_face != e.right_face))
                .collect();
            for cycle in simple_cycles(&walk, &cache) {
                let area = signed_ring_area(&cycle);
                if area > 0.0 {
                    shells.push(LineString::new(cycle));
                } else if area < 0.0 {
                    holes.push(LineString::new(cycle));
                }
            }
        }
        if shells.len() != 1 {
            debug!(face, shells = shells.len(), holes = holes.len(), "face has no single shell");
            return Err(Error::NoGeometry(face));
        }
        let exterior = shells.remove(0);
        Ok(Polygon::new(exterior, holes))
    }

    /// Signed edge ids bounding `face`, one ring after the other.
    ///
    /// The counter-clockwise ring comes first, the others follow by their
    /// smallest edge id; every ring starts at its smallest edge id.
    pub fn face_edges(&self, face: FaceId) -> Result<Vec<i64>> {
        if face != UNIVERSAL_FACE {
            self.face(face)?;
        }
        let (rings, _) = self.face_rings(face)?;
        let mut keyed: Vec<(bool, EdgeId, Vec<DirectedEdge>)> = rings
            .into_iter()
            .map(|ring| {
                let shell = ring.signed_area() > 0.0;
                let rotated = rotate_to_min(&ring.edges);
                let key = rotated.first().map_or(EdgeId::MAX, |d| d.edge);
                (!shell, key, rotated)
            })
            .collect();
        keyed.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        Ok(keyed
            .into_iter()
            .flat_map(|(_, _, ring)| ring.into_iter().map(|d| d.signed()))
            .collect())
    }

    /// Bounded face strictly containing `p`, or the universal face.
    pub(crate) fn face_containing_point(&self, p: &Coord) -> Result<FaceId> {
        for face in self.store.faces_in_box(&BBox::from_coord(p))? {
            let polygon = match self.face_geometry(face) {
                Ok(polygon) => polygon,
                Err(Error::NoGeometry(_)) => continue,
                Err(e) => return Err(e),
            };
            if polygon_position(&polygon, p) == Position::Inside {
                return Ok(face);
            }
        }
        Ok(UNIVERSAL_FACE)
    }
}

/// Rotates a ring so that it starts at its smallest edge id, preferring the
/// forward direction when the edge is walked both ways.
fn rotate_to_min(ring: &[DirectedEdge]) -> Vec<DirectedEdge> {
    let Some(start) = ring
        .iter()
        .enumerate()
        .min_by_key(|(_, d)| (d.edge, !d.forward))
        .map(|(i, _)| i)
    else {
        return Vec::new();
    };
    ring[start..].iter().chain(ring[..start].iter()).copied().collect()
}

/// Splits a closed walk into simple cycles at the nodes it revisits.
fn simple_cycles(walk: &[DirectedEdge], cache: &FxHashMap<EdgeId, Edge>) -> Vec<Vec<Coord>> {
    let mut stack: Vec<(DirectedEdge, NodeId)> = Vec::new();
    let mut origin_at: FxHashMap<NodeId, usize> = FxHashMap::default();
    let mut cycles = Vec::new();
    for d in walk {
        let Some(edge) = cache.get(&d.edge) else {
            continue;
        };
        let origin = edge.origin(d.forward);
        let destination = edge.destination(d.forward);
        origin_at.insert(origin, stack.len());
        stack.push((*d, origin));
        if let Some(&at) = origin_at.get(&destination) {
            let run: Vec<(DirectedEdge, NodeId)> = stack.drain(at..).collect();
            for (_, n) in &run {
                origin_at.remove(n);
            }
            let mut coords = Vec::new();
            for (step, _) in &run {
                if let Some(e) = cache.get(&step.edge) {
                    append_coords(&mut coords, &e.geom, step.forward);
                }
            }
            if coords.len() >= 4 {
                cycles.push(coords);
            }
        }
    }
    cycles
}

#[cfg(test)]
mod tests {
    use super::super::testing::Fixture;
    use super::*;
    use approx::assert_relative_eq;

    fn square_with_hole(fx: &Fixture) -> (FaceId, FaceId) {
        let engine = fx.engine();
        let a = engine.add_iso_node(None, &Coord::new(0.0, 0.0)).unwrap();
        let b = engine.add_iso_node(None, &Coord::new(10.0, 0.0)).unwrap();
        engine
            .add_iso_edge(a, b, &LineString::from_xy(&[(0.0, 0.0), (10.0, 0.0)]))
            .unwrap();
        engine
            .add_edge(
                b,
                a,
                &LineString::from_xy(&[(10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]),
                false,
            )
            .unwrap();
        let outer = engine.face_containing_point(&Coord::new(1.0, 1.0)).unwrap();
        let h = engine.add_iso_node(None, &Coord::new(4.0, 4.0)).unwrap();
        engine
            .add_edge(
                h,
                h,
                &LineString::from_xy(&[(4.0, 4.0), (6.0, 4.0), (6.0, 6.0), (4.0, 6.0), (4.0, 4.0)]),
                false,
            )
            .unwrap();
        let inner = engine.face_containing_point(&Coord::new(5.0, 5.0)).unwrap();
        (outer, inner)
    }

    #[test]
    fn polygon_with_hole_is_rebuilt() {
        let fx = Fixture::new(0.0);
        let (outer, inner) = square_with_hole(&fx);
        assert_ne!(outer, inner);
        let engine = fx.engine();
        let polygon = engine.face_geometry(outer).unwrap();
        assert_eq!(polygon.interiors.len(), 1);
        assert_relative_eq!(polygon.area(), 96.0);
        let hole = engine.face_geometry(inner).unwrap();
        assert_relative_eq!(hole.area(), 4.0);
    }

    #[test]
    fn universal_face_has_no_geometry() {
        let fx = Fixture::new(0.0);
        assert!(matches!(fx.engine().face_geometry(0), Err(Error::NoGeometry(0))));
    }

    #[test]
    fn face_edges_start_with_the_shell() {
        let fx = Fixture::new(0.0);
        let (outer, _) = square_with_hole(&fx);
        let edges = fx.engine().face_edges(outer).unwrap();
        // shell 1, 2 then the hole ring walked clockwise
        assert_eq!(edges, vec![1, 2, -3]);
    }

    #[test]
    fn dangling_edges_do_not_bound_the_face() {
        let fx = Fixture::new(0.0);
        let (outer, _) = square_with_hole(&fx);
        let engine = fx.engine();
        let tip = engine.add_iso_node(None, &Coord::new(2.0, 2.0)).unwrap();
        let corner = 1;
        engine
            .add_edge(corner, tip, &LineString::from_xy(&[(0.0, 0.0), (2.0, 2.0)]), false)
            .unwrap();
        let polygon = engine.face_geometry(outer).unwrap();
        assert_relative_eq!(polygon.area(), 96.0);
        assert_eq!(engine.face_edges(outer).unwrap().len(), 5);
    }

    #[test]
    fn rotation_prefers_forward_minimum() {
        let ring = vec![
            DirectedEdge::forward(5),
            DirectedEdge::backward(2),
            DirectedEdge::forward(2),
        ];
        assert_eq!(rotate_to_min(&ring)[0], DirectedEdge::forward(2));
    }
}
