// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Primitive identifiers.
//!
//! Nodes, edges and faces are addressed by the integer primary keys of their
//! rows. Edge links (`next_left_edge` / `next_right_edge`) store *signed*
//! edge ids: the sign encodes the direction the edge is traversed in.

/// Node primary key.
pub type NodeId = i64;

/// Edge primary key.
pub type EdgeId = i64;

/// Face primary key.
pub type FaceId = i64;

/// The reserved face representing the unbounded space outside all others.
pub const UNIVERSAL_FACE: FaceId = 0;

/// An edge together with a traversal direction.
///
/// Traversing an edge forwards (start to end) keeps its `left_face` on the
/// left; traversing it backwards keeps its `right_face` on the left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirectedEdge {
    pub edge: EdgeId,
    pub forward: bool,
}

impl DirectedEdge {
    pub const fn forward(edge: EdgeId) -> Self {
        Self { edge, forward: true }
    }

    pub const fn backward(edge: EdgeId) -> Self {
        Self {
            edge,
            forward: false,
        }
    }

    /// Decodes a signed edge link.
    pub fn from_signed(signed: i64) -> Self {
        Self {
            edge: signed.abs(),
            forward: signed >= 0,
        }
    }

    /// Encodes the edge as a signed link.
    pub fn signed(&self) -> i64 {
        if self.forward {
            self.edge
        } else {
            -self.edge
        }
    }

    /// The same edge in the opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            edge: self.edge,
            forward: !self.forward,
        }
    }
}

impl std::fmt::Display for DirectedEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.signed())
    }
}
