// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Splitting edges at a new node and healing them back together.

use planar_topo_geometry::{locate_point, split_line_at, Coord, LineString};
use tracing::debug;

use super::TopoEngine;
use crate::error::{Error, Result};
use crate::keys::{EdgeId, NodeId};
use crate::primitives::Edge;
use crate::store::TopoStore;

/// Two edges meeting at a node of degree two, merged into one line.
struct Healing {
    node: NodeId,
    start: NodeId,
    end: NodeId,
    geom: LineString,
}

impl<S: TopoStore> TopoEngine<S> {
    /// Splits an edge at `point`, shortening it and adding the tail as a
    /// new edge. Returns the new node.
    pub fn mod_edge_split(&self, id: EdgeId, point: &Coord) -> Result<NodeId> {
        self.split_edge(id, point, false)
    }

    /// Splits an edge at `point`, replacing it with two new edges.
    /// Returns the new node.
    pub fn new_edges_split(&self, id: EdgeId, point: &Coord) -> Result<NodeId> {
        self.split_edge(id, point, true)
    }

    fn split_edge(&self, id: EdgeId, point: &Coord, replace: bool) -> Result<NodeId> {
        let edge = self.edge(id)?;
        let loc = locate_point(&edge.geom, point)
            .ok_or_else(|| Error::InvalidGeometry(format!("edge {id} has no segment")))?;
        if loc.distance > self.tolerance_at(point) {
            return Err(Error::PreconditionFailed(
                "SQL/MM Spatial exception - point not on edge".into(),
            ));
        }
        if self.node_near(point, None)?.is_some() {
            return Err(Error::PreconditionFailed(
                "SQL/MM Spatial exception - coincident node".into(),
            ));
        }
        let (head, tail) = split_line_at(&edge.geom, &loc, *point)?;
        let node = self.store.insert_node(None, point)?;

        if replace {
            let first = self.store.next_edge_id()?;
            let second = self.store.next_edge_id()?;
            self.store.delete_edge(id)?;
            self.store.insert_edge(&placeholder(first, edge.start_node, node, head, &edge))?;
            self.store.insert_edge(&placeholder(second, node, edge.end_node, tail, &edge))?;
            self.relink_node(edge.start_node)?;
            self.relink_node(node)?;
            if edge.end_node != edge.start_node {
                self.relink_node(edge.end_node)?;
            }
            debug!(edge = id, first, second, node, "split edge into new edges");
        } else {
            let second = self.store.next_edge_id()?;
            self.store.update_edge(&Edge {
                end_node: node,
                next_left: -id,
                geom: head,
                ..edge.clone()
            })?;
            self.store.insert_edge(&placeholder(second, node, edge.end_node, tail, &edge))?;
            self.relink_node(edge.end_node)?;
            self.relink_node(node)?;
            debug!(edge = id, second, node, "split edge");
        }

        if loc.distance > 0.0 {
            self.refresh_face_bbox(edge.left_face)?;
            if edge.right_face != edge.left_face {
                self.refresh_face_bbox(edge.right_face)?;
            }
        }
        Ok(node)
    }

    /// Merges `e2` into `e1` across the node they share. Returns the
    /// removed node.
    pub fn mod_edge_heal(&self, e1: EdgeId, e2: EdgeId) -> Result<NodeId> {
        let (a, b, heal) = self.healing(e1, e2)?;
        self.store.update_edge(&Edge {
            start_node: heal.start,
            end_node: heal.end,
            geom: heal.geom,
            ..a.clone()
        })?;
        self.store.delete_edge(b.id)?;
        self.store.delete_node(heal.node)?;
        let far = if heal.start == a.start_node { heal.end } else { heal.start };
        self.relink_node(far)?;
        debug!(edge = a.id, removed = b.id, node = heal.node, "heal edges");
        Ok(heal.node)
    }

    /// Replaces two edges sharing a node of degree two by a new edge.
    /// Returns the removed node.
    pub fn new_edge_heal(&self, e1: EdgeId, e2: EdgeId) -> Result<NodeId> {
        let (a, b, heal) = self.healing(e1, e2)?;
        let id = self.store.next_edge_id()?;
        self.store.insert_edge(&placeholder(id, heal.start, heal.end, heal.geom, &a))?;
        self.store.delete_edge(a.id)?;
        self.store.delete_edge(b.id)?;
        self.store.delete_node(heal.node)?;
        self.relink_node(heal.start)?;
        if heal.end != heal.start {
            self.relink_node(heal.end)?;
        }
        debug!(edge = id, first = a.id, second = b.id, node = heal.node, "heal edges into new edge");
        Ok(heal.node)
    }

    fn healing(&self, e1: EdgeId, e2: EdgeId) -> Result<(Edge, Edge, Healing)> {
        if e1 == e2 {
            return Err(Error::PreconditionFailed(format!(
                "Cannot heal edge {e1} with itself, try with another"
            )));
        }
        let a = self.edge(e1)?;
        let b = self.edge(e2)?;
        if a.is_closed() || b.is_closed() {
            return Err(Error::PreconditionFailed(format!(
                "Edge {} is closed, cannot heal to edge {}",
                if a.is_closed() { e1 } else { e2 },
                if a.is_closed() { e2 } else { e1 }
            )));
        }

        let mut shared = false;
        let mut common = None;
        for n in [a.end_node, a.start_node] {
            if n != b.start_node && n != b.end_node {
                continue;
            }
            shared = true;
            if self.store.edges_by_node(n)?.len() == 2 {
                common = Some(n);
                break;
            }
        }
        let Some(node) = common else {
            return Err(Error::PreconditionFailed(if shared {
                format!("SQL/MM Spatial exception - other edges connected ({e1}, {e2})")
            } else {
                "SQL/MM Spatial exception - non-connected edges".into()
            }));
        };

        let away = if b.start_node == node {
            b.geom.clone()
        } else {
            b.geom.reversed()
        };
        let far = if b.start_node == node { b.end_node } else { b.start_node };
        let (start, end, coords) = if a.end_node == node {
            let mut coords = a.geom.coords.clone();
            coords.extend_from_slice(&away.coords[1..]);
            (a.start_node, far, coords)
        } else {
            let mut coords = away.reversed().coords;
            coords.extend_from_slice(&a.geom.coords[1..]);
            (far, a.end_node, coords)
        };
        Ok((
            a,
            b,
            Healing {
                node,
                start,
                end,
                geom: LineString::new(coords),
            },
        ))
    }
}

/// A new edge carrying `like`'s faces; links are fixed by relinking.
fn placeholder(id: EdgeId, start: NodeId, end: NodeId, geom: LineString, like: &Edge) -> Edge {
    Edge {
        id,
        start_node: start,
        end_node: end,
        next_left: -id,
        next_right: id,
        left_face: like.left_face,
        right_face: like.right_face,
        geom,
    }
}
