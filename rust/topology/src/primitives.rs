// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rows of the primitive relations.

use planar_topo_geometry::{BBox, Coord, LineString};
use serde::{Deserialize, Serialize};

use crate::keys::{DirectedEdge, EdgeId, FaceId, NodeId};

/// A node row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Set only while the node has no incident edge.
    pub containing_face: Option<FaceId>,
    pub point: Coord,
}

/// An edge row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub start_node: NodeId,
    pub end_node: NodeId,
    /// Signed link followed after traversing this edge forwards.
    pub next_left: i64,
    /// Signed link followed after traversing this edge backwards.
    pub next_right: i64,
    pub left_face: FaceId,
    pub right_face: FaceId,
    pub geom: LineString,
}

impl Edge {
    /// Node a directed traversal of this edge starts from.
    pub fn origin(&self, forward: bool) -> NodeId {
        if forward {
            self.start_node
        } else {
            self.end_node
        }
    }

    /// Node a directed traversal of this edge arrives at.
    pub fn destination(&self, forward: bool) -> NodeId {
        if forward {
            self.end_node
        } else {
            self.start_node
        }
    }

    /// Face on the left of a directed traversal.
    pub fn face_left_of(&self, forward: bool) -> FaceId {
        if forward {
            self.left_face
        } else {
            self.right_face
        }
    }

    /// Link followed after a directed traversal.
    pub fn next_after(&self, forward: bool) -> DirectedEdge {
        DirectedEdge::from_signed(if forward {
            self.next_left
        } else {
            self.next_right
        })
    }

    pub fn set_next_after(&mut self, forward: bool, next: DirectedEdge) {
        if forward {
            self.next_left = next.signed();
        } else {
            self.next_right = next.signed();
        }
    }

    pub fn set_face_left_of(&mut self, forward: bool, face: FaceId) {
        if forward {
            self.left_face = face;
        } else {
            self.right_face = face;
        }
    }

    /// Both ends meet at one node.
    pub fn is_closed(&self) -> bool {
        self.start_node == self.end_node
    }

    pub fn bbox(&self) -> Option<BBox> {
        self.geom.bbox()
    }
}

/// A face row. Only the universal face has no bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub id: FaceId,
    pub bbox: Option<BBox>,
}
