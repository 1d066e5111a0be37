// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Isolated node primitives.

use planar_topo_geometry::Coord;
use tracing::debug;

use super::TopoEngine;
use crate::error::{Error, Result};
use crate::keys::{FaceId, NodeId, UNIVERSAL_FACE};
use crate::primitives::Node;
use crate::store::TopoStore;

impl<S: TopoStore> TopoEngine<S> {
    /// Adds an isolated node, optionally checking the face it lies in.
    pub fn add_iso_node(&self, face: Option<FaceId>, point: &Coord) -> Result<NodeId> {
        if let Some(face) = face {
            if face != UNIVERSAL_FACE {
                self.face(face)?;
            }
        }
        self.check_free_point(point, None)?;
        let containing = self.face_containing_point(point)?;
        if let Some(face) = face {
            if face != containing {
                return Err(Error::PreconditionFailed(
                    "SQL/MM Spatial exception - not within face".into(),
                ));
            }
        }
        let id = self.store.insert_node(Some(containing), point)?;
        debug!(node = id, face = containing, "add isolated node");
        Ok(id)
    }

    /// Moves an isolated node within its face.
    pub fn move_iso_node(&self, node: NodeId, point: &Coord) -> Result<()> {
        let current = self.isolated_node(node)?;
        self.check_free_point(point, Some(node))?;
        let containing = self.face_containing_point(point)?;
        if Some(containing) != current.containing_face {
            return Err(Error::PreconditionFailed(
                "Cannot move isolated node across faces".into(),
            ));
        }
        self.store.update_node(&Node {
            point: *point,
            ..current
        })?;
        debug!(node, "move isolated node");
        Ok(())
    }

    /// Removes an isolated node.
    pub fn rem_iso_node(&self, node: NodeId) -> Result<()> {
        self.isolated_node(node)?;
        self.store.delete_node(node)?;
        debug!(node, "remove isolated node");
        Ok(())
    }

    fn isolated_node(&self, id: NodeId) -> Result<Node> {
        let node = self.node(id)?;
        if node.containing_face.is_none() || !self.store.edges_by_node(id)?.is_empty() {
            return Err(Error::NotIsolated(format!(
                "SQL/MM Spatial exception - not isolated node {id}"
            )));
        }
        Ok(node)
    }
}
