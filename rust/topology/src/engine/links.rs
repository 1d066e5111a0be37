// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Edge links around nodes and the rings they form.
//!
//! The star of a node is its outgoing directed edges sorted
//! counter-clockwise by the azimuth of their first segment. Arriving at a
//! node along the reverse of `star[i]`, the boundary walk continues with
//! `star[i - 1]`: the next outgoing edge clockwise.

use planar_topo_geometry::{leaving_azimuth, signed_ring_area, Coord, LineString};
use rustc_hash::FxHashMap;
use tracing::trace;

use super::TopoEngine;
use crate::error::{Error, Result};
use crate::keys::{DirectedEdge, EdgeId, NodeId};
use crate::primitives::Edge;
use crate::store::TopoStore;

/// Outgoing directed edges of a node in counter-clockwise order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Star {
    pub spokes: Vec<(f64, DirectedEdge)>,
}

impl Star {
    /// Builds the star of `node` from its incident edges.
    ///
    /// `replace` substitutes the geometry of one edge, to evaluate a
    /// geometry change before it is stored.
    pub fn build(node: NodeId, edges: &[Edge], replace: Option<(EdgeId, &LineString)>) -> Result<Self> {
        let mut spokes = Vec::with_capacity(edges.len() + 1);
        for edge in edges {
            let geom = match replace {
                Some((id, geom)) if id == edge.id => geom,
                _ => &edge.geom,
            };
            if edge.start_node == node {
                let az = leaving_azimuth(geom, false).ok_or_else(|| degenerate(edge.id))?;
                spokes.push((az, DirectedEdge::forward(edge.id)));
            }
            if edge.end_node == node {
                let az = leaving_azimuth(geom, true).ok_or_else(|| degenerate(edge.id))?;
                spokes.push((az, DirectedEdge::backward(edge.id)));
            }
        }
        spokes.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        Ok(Self { spokes })
    }

    pub fn len(&self) -> usize {
        self.spokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spokes.is_empty()
    }

    /// Directed edges only, in order.
    pub fn order(&self) -> Vec<DirectedEdge> {
        self.spokes.iter().map(|(_, d)| *d).collect()
    }

    /// The outgoing edge immediately clockwise of azimuth `az`.
    ///
    /// The wedge between it and the next spoke counter-clockwise contains
    /// `az`, so the face on its left is the face `az` points into.
    pub fn clockwise_of(&self, az: f64) -> Option<DirectedEdge> {
        let last = self.spokes.last()?.1;
        Some(
            self.spokes
                .iter()
                .rev()
                .find(|(a, _)| *a < az)
                .map_or(last, |(_, d)| *d),
        )
    }
}

/// `true` when `b` is a rotation of `a`.
pub fn cyclic_eq<T: PartialEq>(a: &[T], b: &[T]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    if a.is_empty() {
        return true;
    }
    (0..b.len()).any(|shift| a.iter().enumerate().all(|(i, x)| *x == b[(i + shift) % b.len()]))
}

fn degenerate(edge: EdgeId) -> Error {
    Error::PreconditionFailed(format!("edge {edge} has no non-degenerate segment"))
}

/// A closed boundary walk: directed edges in link order.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    pub edges: Vec<DirectedEdge>,
    pub coords: Vec<Coord>,
}

impl Ring {
    /// Shoelace area; positive when the walk is counter-clockwise.
    pub fn signed_area(&self) -> f64 {
        signed_ring_area(&self.coords)
    }

    pub fn contains(&self, d: DirectedEdge) -> bool {
        self.edges.contains(&d)
    }
}

/// Appends a directed edge's vertices to a ring being assembled.
pub(crate) fn append_coords(coords: &mut Vec<Coord>, geom: &LineString, forward: bool) {
    let directed: Box<dyn Iterator<Item = &Coord>> = if forward {
        Box::new(geom.coords.iter())
    } else {
        Box::new(geom.coords.iter().rev())
    };
    for c in directed {
        if coords.last().map_or(true, |l| !l.same_xy(c)) {
            coords.push(*c);
        }
    }
}

impl<S: TopoStore> TopoEngine<S> {
    /// Recomputes the links of every edge arriving at `node`.
    pub(crate) fn relink_node(&self, node: NodeId) -> Result<()> {
        let edges = self.store.edges_by_node(node)?;
        if edges.is_empty() {
            return Ok(());
        }
        let star = Star::build(node, &edges, None)?;
        let mut rows: FxHashMap<EdgeId, Edge> = edges.into_iter().map(|e| (e.id, e)).collect();
        let mut dirty: Vec<EdgeId> = Vec::new();
        let n = star.len();
        for i in 0..n {
            let outgoing = star.spokes[i].1;
            let incoming = outgoing.reversed();
            let next = star.spokes[(i + n - 1) % n].1;
            let Some(edge) = rows.get_mut(&incoming.edge) else {
                continue;
            };
            if edge.next_after(incoming.forward) != next {
                edge.set_next_after(incoming.forward, next);
                if !dirty.contains(&edge.id) {
                    dirty.push(edge.id);
                }
            }
        }
        for id in dirty {
            if let Some(edge) = rows.get(&id) {
                trace!(node, edge = id, next_left = edge.next_left, next_right = edge.next_right, "relink");
                self.store.update_edge(edge)?;
            }
        }
        Ok(())
    }

    /// Follows the links from `start` until the walk closes.
    pub(crate) fn trace_ring(&self, start: DirectedEdge) -> Result<Ring> {
        let mut cache: FxHashMap<EdgeId, Edge> = FxHashMap::default();
        self.trace_ring_cached(start, &mut cache)
    }

    pub(crate) fn trace_ring_cached(
        &self,
        start: DirectedEdge,
        cache: &mut FxHashMap<EdgeId, Edge>,
    ) -> Result<Ring> {
        let mut edges = Vec::new();
        let mut coords = Vec::new();
        let mut current = start;
        loop {
            if !cache.contains_key(&current.edge) {
                let edge = self.edge(current.edge)?;
                cache.insert(edge.id, edge);
            }
            let Some(edge) = cache.get(&current.edge) else {
                return Err(Error::NotFound(format!("edge {}", current.edge)));
            };
            if edges.len() > 2 * cache.len() + 2 && edges.contains(&current) {
                return Err(Error::PreconditionFailed(format!(
                    "corrupted topology: ring from edge {start} does not close"
                )));
            }
            edges.push(current);
            append_coords(&mut coords, &edge.geom, current.forward);
            current = edge.next_after(current.forward);
            if current == start {
                break;
            }
        }
        Ok(Ring { edges, coords })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(id: EdgeId, start: NodeId, end: NodeId, pts: &[(f64, f64)]) -> Edge {
        Edge {
            id,
            start_node: start,
            end_node: end,
            next_left: -id,
            next_right: id,
            left_face: 0,
            right_face: 0,
            geom: LineString::from_xy(pts),
        }
    }

    #[test]
    fn star_is_counter_clockwise() {
        // node 1 at the origin with spokes east (1), north (2) and west (3, incoming)
        let edges = vec![
            edge(1, 1, 2, &[(0.0, 0.0), (1.0, 0.0)]),
            edge(2, 1, 3, &[(0.0, 0.0), (0.0, 1.0)]),
            edge(3, 4, 1, &[(-1.0, 0.0), (0.0, 0.0)]),
        ];
        let star = Star::build(1, &edges, None).unwrap();
        assert_eq!(
            star.order(),
            vec![DirectedEdge::forward(1), DirectedEdge::forward(2), DirectedEdge::backward(3)]
        );
        // pointing south-west falls in the wedge after the westward spoke
        assert_eq!(star.clockwise_of(-2.0), Some(DirectedEdge::backward(3)));
        assert_eq!(star.clockwise_of(0.5), Some(DirectedEdge::forward(1)));
    }

    #[test]
    fn closed_edge_has_two_spokes() {
        let ring = edge(5, 1, 1, &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]);
        let star = Star::build(1, &[ring], None).unwrap();
        assert_eq!(star.len(), 2);
    }

    #[test]
    fn rotations_are_cyclically_equal() {
        assert!(cyclic_eq(&[1, 2, 3], &[3, 1, 2]));
        assert!(!cyclic_eq(&[1, 2, 3], &[1, 3, 2]));
        assert!(cyclic_eq::<i32>(&[], &[]));
    }

    #[test]
    fn append_skips_shared_vertices() {
        let mut coords = Vec::new();
        append_coords(&mut coords, &LineString::from_xy(&[(0.0, 0.0), (1.0, 0.0)]), true);
        append_coords(&mut coords, &LineString::from_xy(&[(1.0, 1.0), (1.0, 0.0)]), false);
        assert_eq!(coords.len(), 3);
    }
}
