// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Planar-Topo
//!
//! Planar topology (nodes, edges and faces with signed edge links) stored
//! in SQLite relations.
//!
//! - [`TopoDb`] opens a database, creates and drops topologies and hands
//!   out cached [`Accessor`]s.
//! - The [`engine`] implements the SQL/MM edit primitives over any
//!   [`store::TopoStore`]; [`store::SqliteStore`] is the SQLite one.
//! - [`import`] inserts arbitrary geometries, cutting long lines and rings
//!   into smaller edges and faces.
//! - [`validate`] reports structural problems without touching the
//!   primitives.
//!
//! ```no_run
//! use planar_topo::{Geometry, LineString, TopoDb};
//!
//! # fn main() -> planar_topo::Result<()> {
//! let db = TopoDb::open_in_memory()?;
//! db.create_topology("roads", 0, 0.0, false)?;
//! let roads = db.topology("roads")?;
//! let line = Geometry::line(0, LineString::from_xy(&[(0.0, 0.0), (10.0, 0.0)]));
//! db.in_savepoint("add_line", || roads.add_line(&line))?;
//! assert!(roads.validate()?.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod accessor;
pub mod config;
pub mod engine;
pub mod error;
pub mod import;
pub mod keys;
pub mod primitives;
mod query;
pub mod reconstruction;
pub mod savepoint;
pub mod seeds;
pub mod spatial;
pub mod store;
pub mod validate;

pub use accessor::{Accessor, TopoDb};
pub use config::{EngineConfig, TopologyConfig};
pub use engine::TopoEngine;
pub use error::{Error, Result};
pub use import::{plan_ring_split, ImportSummary, RingSplit};
pub use keys::{DirectedEdge, EdgeId, FaceId, NodeId, UNIVERSAL_FACE};
pub use primitives::{Edge, Face, Node};
pub use savepoint::Savepoint;
pub use seeds::SeedUpdate;
pub use validate::{Issue, IssueKind};

pub use planar_topo_geometry::{Coord, Geometry, GeometryKind, LineString, Polygon, Shape};
