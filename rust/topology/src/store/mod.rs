// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Storage callbacks for the topology engine.
//!
//! [`TopoStore`] is everything the engine needs to read and write the
//! primitive relations. The engine never sees SQL; [`SqliteStore`] is the
//! implementation over the relations owned by a topology.

pub mod codec;
pub mod schema;
pub mod sqlite;

pub use sqlite::{Queries, SqliteStore};

use planar_topo_geometry::{BBox, Coord};

use crate::config::TopologyConfig;
use crate::error::Result;
use crate::keys::{EdgeId, FaceId, NodeId};
use crate::primitives::{Edge, Face, Node};

pub trait TopoStore {
    /// Configuration row of the topology.
    fn config(&self) -> &TopologyConfig;

    fn get_node(&self, id: NodeId) -> Result<Option<Node>>;

    /// Nodes whose point lies within `bbox` (closed).
    fn nodes_in_box(&self, bbox: &BBox) -> Result<Vec<Node>>;

    /// Isolated nodes recorded in `face`.
    fn isolated_nodes_in_face(&self, face: FaceId) -> Result<Vec<Node>>;

    fn all_nodes(&self) -> Result<Vec<Node>>;

    fn insert_node(&self, containing_face: Option<FaceId>, point: &Coord) -> Result<NodeId>;

    fn update_node(&self, node: &Node) -> Result<()>;

    fn delete_node(&self, id: NodeId) -> Result<()>;

    fn get_edge(&self, id: EdgeId) -> Result<Option<Edge>>;

    /// Edges whose bounding box intersects `bbox`.
    fn edges_in_box(&self, bbox: &BBox) -> Result<Vec<Edge>>;

    /// Edges starting or ending at `node`; closed edges are listed once.
    fn edges_by_node(&self, node: NodeId) -> Result<Vec<Edge>>;

    /// Edges with `face` on either side.
    fn edges_by_face(&self, face: FaceId) -> Result<Vec<Edge>>;

    fn all_edges(&self) -> Result<Vec<Edge>>;

    /// Reserves the next edge id.
    fn next_edge_id(&self) -> Result<EdgeId>;

    /// Inserts an edge under a previously reserved id.
    fn insert_edge(&self, edge: &Edge) -> Result<()>;

    fn update_edge(&self, edge: &Edge) -> Result<()>;

    fn delete_edge(&self, id: EdgeId) -> Result<()>;

    fn get_face(&self, id: FaceId) -> Result<Option<Face>>;

    /// Bounded faces whose box intersects `bbox`, by id.
    fn faces_in_box(&self, bbox: &BBox) -> Result<Vec<FaceId>>;

    fn all_faces(&self) -> Result<Vec<Face>>;

    fn insert_face(&self, bbox: Option<BBox>) -> Result<FaceId>;

    fn update_face(&self, face: &Face) -> Result<()>;

    fn delete_face(&self, id: FaceId) -> Result<()>;
}
