// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Database handle, accessor registry and the primitive entry points.
//!
//! [`TopoDb`] owns one SQLite connection together with the accessors opened
//! on it. An [`Accessor`] checks geometric arguments against the topology's
//! configuration, runs the engine under the process-wide guard and keeps
//! the message of the last failure.
//!
//! Mutating calls never commit or roll back; wrap them in
//! [`TopoDb::savepoint`] or [`TopoDb::in_savepoint`].

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use planar_topo_geometry::{Coord, Geometry, GeometryKind, LineString, Polygon, Shape};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::config::{EngineConfig, TopologyConfig};
use crate::engine::{backend_guard, TopoEngine};
use crate::error::{Error, Result};
use crate::import::ImportSummary;
use crate::keys::{EdgeId, FaceId, NodeId};
use crate::reconstruction::materialize_face_edges;
use crate::savepoint::{Savepoint, SavepointStack};
use crate::seeds::{self, SeedUpdate};
use crate::store::{schema, Queries, SqliteStore};
use crate::validate::{self, Issue};

/// A database connection hosting topologies.
#[derive(Debug)]
pub struct TopoDb {
    conn: Connection,
    settings: EngineConfig,
    /// Open accessors in insertion order.
    registry: RefCell<Vec<Rc<AccessorState>>>,
    savepoints: SavepointStack,
}

impl TopoDb {
    /// Opens (or creates) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(Connection::open(path)?, EngineConfig::from_env())
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_config(Connection::open_in_memory()?, EngineConfig::from_env())
    }

    /// Wraps an existing connection, creating the `topologies` relation if
    /// it is missing.
    pub fn with_config(conn: Connection, settings: EngineConfig) -> Result<Self> {
        conn.set_prepared_statement_cache_capacity(settings.statement_cache_capacity);
        schema::init_catalog(&conn)?;
        Ok(Self {
            conn,
            settings,
            registry: RefCell::new(Vec::new()),
            savepoints: SavepointStack::default(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    /// Returns the cached accessor for `name`, or validates the topology and
    /// registers a new one.
    pub fn topology(&self, name: &str) -> Result<Accessor<'_>> {
        let name = schema::normalize_name(name)?;
        if let Some(state) = self.cached(&name) {
            return Ok(Accessor { db: self, state });
        }
        let config = schema::load_config(&self.conn, &name)?
            .ok_or_else(|| Error::NoSuchTopology(name.clone()))?;
        schema::check_layout(&self.conn, &name)?;
        let state = Rc::new(AccessorState {
            queries: Queries::new(&name),
            config,
            live: Cell::new(true),
            last_error: RefCell::new(None),
        });
        self.registry.borrow_mut().push(Rc::clone(&state));
        debug!(topology = %name, "accessor registered");
        Ok(Accessor { db: self, state })
    }

    /// Names of the registered accessors, in registration order.
    pub fn open_topologies(&self) -> Vec<String> {
        self.registry
            .borrow()
            .iter()
            .map(|s| s.config.name.clone())
            .collect()
    }

    fn cached(&self, name: &str) -> Option<Rc<AccessorState>> {
        self.registry
            .borrow()
            .iter()
            .find(|s| s.config.name == name)
            .cloned()
    }

    /// Unregisters an accessor and flushes the cached statements. Every
    /// clone of the accessor becomes stale.
    pub fn destroy(&self, accessor: Accessor<'_>) {
        self.unregister(&accessor.state.config.name);
    }

    fn unregister(&self, name: &str) {
        let mut registry = self.registry.borrow_mut();
        if let Some(pos) = registry.iter().position(|s| s.config.name == name) {
            let state = registry.remove(pos);
            state.live.set(false);
            self.conn.flush_prepared_statement_cache();
            debug!(topology = %name, "accessor destroyed");
        }
    }

    /// Creates a topology. `srid` is positive, or 0/-1 for undefined.
    pub fn create_topology(&self, name: &str, srid: i32, tolerance: f64, has_z: bool) -> Result<bool> {
        let name = schema::normalize_name(name)?;
        if srid < -1 {
            return Err(Error::InvalidArgument(format!("invalid SRID {srid}")));
        }
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(Error::InvalidArgument(format!("invalid tolerance {tolerance}")));
        }
        let config = TopologyConfig {
            name,
            srid,
            tolerance,
            has_z,
            next_edge_id: 1,
        };
        schema::create_topology(&self.conn, &config)?;
        Ok(true)
    }

    /// Drops a topology, destroying its cached accessor first.
    pub fn drop_topology(&self, name: &str) -> Result<bool> {
        let name = schema::normalize_name(name)?;
        self.unregister(&name);
        schema::drop_topology(&self.conn, &name)?;
        Ok(true)
    }

    /// Opens a named savepoint on the connection.
    pub fn savepoint(&self, label: &str) -> Result<Savepoint<'_>> {
        Savepoint::open(&self.conn, &self.savepoints, label)
    }

    /// Runs `f` inside a savepoint, released on success and rolled back
    /// on failure.
    pub fn in_savepoint<T>(&self, label: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let mut sp = self.savepoint(label)?;
        match f() {
            Ok(value) => {
                sp.release()?;
                Ok(value)
            }
            Err(e) => {
                sp.rollback()?;
                Err(e)
            }
        }
    }
}

#[derive(Debug)]
struct AccessorState {
    config: TopologyConfig,
    queries: Queries,
    live: Cell<bool>,
    last_error: RefCell<Option<String>>,
}

/// A live handle on one topology.
#[derive(Debug, Clone)]
pub struct Accessor<'db> {
    db: &'db TopoDb,
    state: Rc<AccessorState>,
}

impl<'db> Accessor<'db> {
    pub fn name(&self) -> &str {
        &self.state.config.name
    }

    pub fn srid(&self) -> i32 {
        self.state.config.srid
    }

    pub fn tolerance(&self) -> f64 {
        self.state.config.tolerance
    }

    pub fn has_z(&self) -> bool {
        self.state.config.has_z
    }

    /// Whether two handles share the same registry entry.
    pub fn same_handle(&self, other: &Accessor<'_>) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Current configuration row, including the live `next_edge_id`.
    pub fn config(&self) -> Result<TopologyConfig> {
        self.check_live()?;
        schema::load_config(&self.db.conn, self.name())?
            .ok_or_else(|| Error::NoSuchTopology(self.name().to_string()))
    }

    pub fn reset_last_error(&self) {
        self.state.last_error.borrow_mut().take();
    }

    pub fn set_last_error(&self, message: impl Into<String>) {
        *self.state.last_error.borrow_mut() = Some(message.into());
    }

    /// Message of the last failed call, if any.
    pub fn last_error(&self) -> Option<String> {
        self.state.last_error.borrow().clone()
    }

    fn check_live(&self) -> Result<()> {
        if self.state.live.get() {
            Ok(())
        } else {
            Err(Error::StaleAccessor(self.name().to_string()))
        }
    }

    fn engine(&self) -> TopoEngine<SqliteStore<'_>> {
        TopoEngine::new(
            SqliteStore::new(&self.db.conn, &self.state.config, &self.state.queries),
            self.db.settings.clone(),
        )
    }

    /// Runs `f` on the engine, recording the error message on failure.
    fn call<T>(
        &self,
        op: &'static str,
        locked: bool,
        f: impl FnOnce(&TopoEngine<SqliteStore<'_>>) -> Result<T>,
    ) -> Result<T> {
        self.check_live()?;
        self.reset_last_error();
        debug!(topology = %self.name(), op, "topology call");
        let result = {
            let _guard = locked.then(backend_guard);
            f(&self.engine())
        };
        if let Err(e) = &result {
            debug!(topology = %self.name(), op, error = %e, "topology call failed");
            self.set_last_error(e.to_string());
        }
        result
    }

    /// Checks SRID, dimensionality and finiteness of an argument.
    fn check_geometry(&self, geometry: &Geometry, allowed: &[GeometryKind]) -> Result<()> {
        let config = &self.state.config;
        if !allowed.contains(&geometry.kind()) {
            return Err(Error::InvalidGeometry(format!(
                "unexpected {} geometry",
                geometry.kind().as_str()
            )));
        }
        if geometry.srid != config.srid {
            return Err(Error::InvalidGeometry(format!(
                "SRID {} does not match topology SRID {}",
                geometry.srid, config.srid
            )));
        }
        if geometry.has_z != config.has_z {
            return Err(Error::InvalidGeometry(format!(
                "geometry is {}, topology is {}",
                if geometry.has_z { "3D" } else { "2D" },
                if config.has_z { "3D" } else { "2D" }
            )));
        }
        let finite = |c: &Coord| c.x.is_finite() && c.y.is_finite() && (!geometry.has_z || c.z.is_finite());
        let all_finite = match &geometry.shape {
            Shape::Point(c) => finite(c),
            Shape::LineString(l) => l.coords.iter().all(finite),
            Shape::Polygon(p) => p.rings().all(|r| r.coords.iter().all(finite)),
            Shape::MultiPoint(pts) => pts.iter().all(finite),
            Shape::MultiLineString(lines) => lines.iter().all(|l| l.coords.iter().all(finite)),
            Shape::MultiPolygon(polys) => polys
                .iter()
                .all(|p| p.rings().all(|r| r.coords.iter().all(finite))),
        };
        if !all_finite {
            return Err(Error::InvalidGeometry("non-finite coordinate".into()));
        }
        Ok(())
    }

    fn point_arg(&self, geometry: &Geometry) -> Result<Coord> {
        self.check_geometry(geometry, &[GeometryKind::Point])?;
        match &geometry.shape {
            Shape::Point(c) => Ok(*c),
            _ => Err(Error::InvalidGeometry("expected a point".into())),
        }
    }

    fn line_arg(&self, geometry: &Geometry) -> Result<LineString> {
        self.check_geometry(geometry, &[GeometryKind::LineString])?;
        match &geometry.shape {
            Shape::LineString(l) => Ok(l.clone()),
            _ => Err(Error::InvalidGeometry("expected a linestring".into())),
        }
    }

    fn polygon_arg(&self, geometry: &Geometry) -> Result<Polygon> {
        self.check_geometry(geometry, &[GeometryKind::Polygon])?;
        match &geometry.shape {
            Shape::Polygon(p) => Ok(p.clone()),
            _ => Err(Error::InvalidGeometry("expected a polygon".into())),
        }
    }

    /// Wraps `f` so that argument errors are recorded like engine errors.
    fn with_arg<A, T>(
        &self,
        op: &'static str,
        arg: Result<A>,
        f: impl FnOnce(&TopoEngine<SqliteStore<'_>>, A) -> Result<T>,
    ) -> Result<T> {
        match arg {
            Ok(arg) => self.call(op, true, |engine| f(engine, arg)),
            Err(e) => {
                self.check_live()?;
                self.set_last_error(e.to_string());
                Err(e)
            }
        }
    }

    fn point_geometry(&self, c: Coord) -> Geometry {
        Geometry::new(self.srid(), self.has_z(), Shape::Point(c))
    }

    // -- isolated primitives --

    pub fn add_iso_node(&self, face: Option<FaceId>, point: &Geometry) -> Result<NodeId> {
        self.with_arg("AddIsoNode", self.point_arg(point), |e, p| e.add_iso_node(face, &p))
    }

    pub fn move_iso_node(&self, node: NodeId, point: &Geometry) -> Result<()> {
        self.with_arg("MoveIsoNode", self.point_arg(point), |e, p| e.move_iso_node(node, &p))
    }

    pub fn rem_iso_node(&self, node: NodeId) -> Result<()> {
        self.call("RemIsoNode", true, |e| e.rem_iso_node(node))
    }

    pub fn add_iso_edge(&self, start: NodeId, end: NodeId, line: &Geometry) -> Result<EdgeId> {
        self.with_arg("AddIsoEdge", self.line_arg(line), |e, l| e.add_iso_edge(start, end, &l))
    }

    pub fn rem_iso_edge(&self, edge: EdgeId) -> Result<()> {
        self.call("RemIsoEdge", true, |e| e.rem_iso_edge(edge))
    }

    // -- splitting and healing --

    pub fn mod_edge_split(&self, edge: EdgeId, point: &Geometry) -> Result<NodeId> {
        self.with_arg("ModEdgeSplit", self.point_arg(point), |e, p| e.mod_edge_split(edge, &p))
    }

    pub fn new_edges_split(&self, edge: EdgeId, point: &Geometry) -> Result<NodeId> {
        self.with_arg("NewEdgesSplit", self.point_arg(point), |e, p| e.new_edges_split(edge, &p))
    }

    pub fn mod_edge_heal(&self, e1: EdgeId, e2: EdgeId) -> Result<NodeId> {
        self.call("ModEdgeHeal", true, |e| e.mod_edge_heal(e1, e2))
    }

    pub fn new_edge_heal(&self, e1: EdgeId, e2: EdgeId) -> Result<NodeId> {
        self.call("NewEdgeHeal", true, |e| e.new_edge_heal(e1, e2))
    }

    // -- edges between faces --

    pub fn add_edge_mod_face(&self, start: NodeId, end: NodeId, line: &Geometry) -> Result<EdgeId> {
        self.with_arg("AddEdgeModFace", self.line_arg(line), |e, l| e.add_edge_mod_face(start, end, &l))
    }

    pub fn add_edge_new_faces(&self, start: NodeId, end: NodeId, line: &Geometry) -> Result<EdgeId> {
        self.with_arg("AddEdgeNewFaces", self.line_arg(line), |e, l| {
            e.add_edge_new_faces(start, end, &l)
        })
    }

    pub fn rem_edge_mod_face(&self, edge: EdgeId) -> Result<FaceId> {
        self.call("RemEdgeModFace", true, |e| e.rem_edge_mod_face(edge))
    }

    pub fn rem_edge_new_face(&self, edge: EdgeId) -> Result<FaceId> {
        self.call("RemEdgeNewFace", true, |e| e.rem_edge_new_face(edge))
    }

    pub fn change_edge_geom(&self, edge: EdgeId, line: &Geometry) -> Result<()> {
        self.with_arg("ChangeEdgeGeom", self.line_arg(line), |e, l| e.change_edge_geom(edge, &l))
    }

    // -- import --

    pub fn add_point(&self, point: &Geometry) -> Result<NodeId> {
        self.with_arg("TopoGeo_AddPoint", self.point_arg(point), |e, p| e.add_point(&p))
    }

    pub fn add_line(&self, line: &Geometry) -> Result<Vec<EdgeId>> {
        self.with_arg("TopoGeo_AddLineString", self.line_arg(line), |e, l| e.add_line(&l))
    }

    pub fn add_polygon(&self, polygon: &Geometry) -> Result<Vec<FaceId>> {
        self.with_arg("TopoGeo_AddPolygon", self.polygon_arg(polygon), |e, p| e.add_polygon(&p))
    }

    /// Imports any (multi) point, line or polygon value.
    pub fn import(&self, geometry: &Geometry) -> Result<ImportSummary> {
        let arg = self
            .check_geometry(
                geometry,
                &[
                    GeometryKind::Point,
                    GeometryKind::LineString,
                    GeometryKind::Polygon,
                    GeometryKind::MultiPoint,
                    GeometryKind::MultiLineString,
                    GeometryKind::MultiPolygon,
                ],
            )
            .map(|()| geometry);
        let summary = self.with_arg("FromGeoTable", arg, |e, g| e.import_geometry(g))?;
        info!(
            topology = %self.name(),
            nodes = summary.nodes.len(),
            edges = summary.edges.len(),
            faces = summary.faces.len(),
            "imported geometry"
        );
        Ok(summary)
    }

    // -- validation and reconstruction --

    /// Runs every check and fills `temp."<name>_validate_topogeo"`.
    pub fn validate(&self) -> Result<Vec<Issue>> {
        // the validator takes the guard itself around face reconstruction
        self.call("ValidateTopoGeo", false, |e| validate::validate(e))
    }

    pub fn face_geometry(&self, face: FaceId) -> Result<Geometry> {
        let polygon = self.call("GetFaceGeometry", true, |e| e.face_geometry(face))?;
        Ok(Geometry::new(self.srid(), self.has_z(), Shape::Polygon(polygon)))
    }

    /// Signed boundary edges of a face, also written to
    /// `temp."<name>_face_edges"`.
    pub fn face_edges(&self, face: FaceId) -> Result<Vec<i64>> {
        self.call("GetFaceEdges", true, |e| materialize_face_edges(e, face))
    }

    pub fn edge_seed(&self, edge: EdgeId) -> Result<Geometry> {
        let seed = self.call("GetEdgeSeed", true, |e| e.get_edge_seed(edge))?;
        Ok(self.point_geometry(seed))
    }

    pub fn face_seed(&self, face: FaceId) -> Result<Geometry> {
        let seed = self.call("GetFaceSeed", true, |e| e.get_face_seed(face))?;
        Ok(self.point_geometry(seed))
    }

    pub fn update_seeds(&self, incremental: bool) -> Result<SeedUpdate> {
        self.call("UpdateSeeds", true, |e| seeds::update_seeds(e, incremental))
    }

    // -- point queries and cleanup --

    pub fn node_by_point(&self, point: &Geometry, tolerance: f64) -> Result<Option<NodeId>> {
        self.with_arg("GetNodeByPoint", self.point_arg(point), |e, p| e.node_by_point(&p, tolerance))
    }

    pub fn edge_by_point(&self, point: &Geometry, tolerance: f64) -> Result<Option<EdgeId>> {
        self.with_arg("GetEdgeByPoint", self.point_arg(point), |e, p| e.edge_by_point(&p, tolerance))
    }

    pub fn face_by_point(&self, point: &Geometry) -> Result<FaceId> {
        self.with_arg("GetFaceByPoint", self.point_arg(point), |e, p| e.face_by_point(&p))
    }

    pub fn remove_dangling_edges(&self) -> Result<usize> {
        self.call("RemoveDanglingEdges", true, |e| e.remove_dangling_edges())
    }

    pub fn remove_dangling_nodes(&self) -> Result<usize> {
        self.call("RemoveDanglingNodes", true, |e| e.remove_dangling_nodes())
    }
}
