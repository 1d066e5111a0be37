// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Representative points of edges and faces.
//!
//! Seeds live in `<name>_seeds`, one row per edge or bounded face, with
//! either `edge_id` or `face_id` set. The relation is created on the first
//! update.

use planar_topo_geometry::{distance_to_line, interior_point, polygon_position, Coord, Position};
use rusqlite::params;
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, info};

use crate::engine::TopoEngine;
use crate::error::{Error, Result};
use crate::keys::{EdgeId, FaceId, UNIVERSAL_FACE};
use crate::primitives::Edge;
use crate::store::{codec, SqliteStore, TopoStore};

/// Row counts touched by a seed update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedUpdate {
    pub removed: usize,
    pub inserted: usize,
    pub kept: usize,
}

/// A point on the edge away from its end nodes.
pub fn edge_seed(edge: &Edge) -> Result<Coord> {
    let coords = &edge.geom.coords;
    match coords.len() {
        0 | 1 => Err(Error::InvalidGeometry(format!("edge {} has no segment", edge.id))),
        2 => Ok(Coord::lerp(&coords[0], &coords[1], 0.5)),
        _ => Ok(coords[1]),
    }
}

impl<S: TopoStore> TopoEngine<S> {
    /// Seed of an existing edge.
    pub fn get_edge_seed(&self, id: EdgeId) -> Result<Coord> {
        edge_seed(&self.edge(id)?)
    }

    /// A point strictly inside a bounded face.
    pub fn get_face_seed(&self, id: FaceId) -> Result<Coord> {
        let polygon = self.face_geometry(id)?;
        interior_point(&polygon).ok_or(Error::NoGeometry(id))
    }

    fn edge_seed_valid(&self, id: EdgeId, seed: &Coord) -> Result<bool> {
        Ok(match self.store().get_edge(id)? {
            Some(edge) => distance_to_line(seed, &edge.geom) <= self.tolerance_at(seed),
            None => false,
        })
    }

    fn face_seed_valid(&self, id: FaceId, seed: &Coord) -> Result<bool> {
        match self.face_geometry(id) {
            Ok(polygon) => Ok(polygon_position(&polygon, seed) == Position::Inside),
            Err(Error::NoGeometry(_)) | Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

struct SeedRow {
    seed_id: i64,
    edge_id: Option<EdgeId>,
    face_id: Option<FaceId>,
    geom: String,
}

/// Recomputes the seeds of a topology.
///
/// An incremental update keeps every still-valid seed and only computes
/// the missing ones; otherwise all seeds are rebuilt.
pub fn update_seeds(engine: &TopoEngine<SqliteStore<'_>>, incremental: bool) -> Result<SeedUpdate> {
    let store = engine.store();
    let conn = store.connection();
    let table = &store.queries().tables.seeds;
    conn.execute_batch(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{table}" (
               seed_id INTEGER PRIMARY KEY AUTOINCREMENT,
               edge_id INTEGER,
               face_id INTEGER,
               geom TEXT NOT NULL
           );"#
    ))?;

    let mut stats = SeedUpdate::default();
    if !incremental {
        stats.removed = conn.execute(&format!(r#"DELETE FROM "{table}""#), [])?;
    }

    let rows = {
        let mut stmt = conn.prepare(&format!(
            r#"SELECT seed_id, edge_id, face_id, geom FROM "{table}" ORDER BY seed_id"#
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SeedRow {
                    seed_id: row.get(0)?,
                    edge_id: row.get(1)?,
                    face_id: row.get(2)?,
                    geom: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    let mut seeded_edges: FxHashSet<EdgeId> = FxHashSet::default();
    let mut seeded_faces: FxHashSet<FaceId> = FxHashSet::default();
    let mut delete = conn.prepare(&format!(r#"DELETE FROM "{table}" WHERE seed_id = ?1"#))?;
    for row in rows {
        let seed = codec::decode_point(&row.geom)?;
        let valid = match (row.edge_id, row.face_id) {
            (Some(edge), None) if !seeded_edges.contains(&edge) => {
                engine.edge_seed_valid(edge, &seed)? && seeded_edges.insert(edge)
            }
            (None, Some(face)) if !seeded_faces.contains(&face) => {
                engine.face_seed_valid(face, &seed)? && seeded_faces.insert(face)
            }
            _ => false,
        };
        if valid {
            stats.kept += 1;
        } else {
            delete.execute([row.seed_id])?;
            stats.removed += 1;
        }
    }

    let has_z = store.config().has_z;
    let mut insert = conn.prepare(&format!(
        r#"INSERT INTO "{table}" (edge_id, face_id, geom) VALUES (?1, ?2, ?3)"#
    ))?;
    for edge in store.all_edges()? {
        if seeded_edges.contains(&edge.id) {
            continue;
        }
        let seed = edge_seed(&edge)?;
        insert.execute(params![edge.id, Option::<FaceId>::None, codec::encode_point(&seed, has_z)?])?;
        stats.inserted += 1;
    }
    for face in store.all_faces()? {
        if face.id == UNIVERSAL_FACE || seeded_faces.contains(&face.id) {
            continue;
        }
        match engine.get_face_seed(face.id) {
            Ok(seed) => {
                insert.execute(params![
                    Option::<EdgeId>::None,
                    face.id,
                    codec::encode_point(&seed, has_z)?
                ])?;
                stats.inserted += 1;
            }
            Err(Error::NoGeometry(id)) => debug!(face = id, "no seed for face without geometry"),
            Err(e) => return Err(e),
        }
    }
    info!(
        topology = %store.config().name,
        incremental,
        kept = stats.kept,
        removed = stats.removed,
        inserted = stats.inserted,
        "updated seeds"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::Fixture;
    use planar_topo_geometry::{LineString, Polygon};
    use rusqlite::OptionalExtension;

    fn stored(fx: &Fixture, filter: &str) -> Option<String> {
        fx.conn
            .query_row(
                &format!("SELECT geom FROM topo_seeds WHERE {filter} ORDER BY seed_id LIMIT 1"),
                [],
                |r| r.get(0),
            )
            .optional()
            .unwrap()
    }

    fn square(fx: &Fixture) {
        fx.engine()
            .add_polygon(&Polygon::new(
                LineString::from_xy(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]),
                Vec::new(),
            ))
            .unwrap();
    }

    #[test]
    fn seeds_pick_interior_points() {
        let fx = Fixture::new(0.0);
        square(&fx);
        let engine = fx.engine();
        assert_eq!(engine.get_edge_seed(1).unwrap(), Coord::new(4.0, 0.0));
        let seed = engine.get_face_seed(1).unwrap();
        assert!(seed.x > 0.0 && seed.x < 4.0 && seed.y > 0.0 && seed.y < 4.0);
        assert!(matches!(engine.get_face_seed(0), Err(Error::NoGeometry(0))));
    }

    #[test]
    fn incremental_update_keeps_valid_seeds() {
        let fx = Fixture::new(0.0);
        square(&fx);
        let engine = fx.engine();
        let first = update_seeds(&engine, true).unwrap();
        assert_eq!(first, SeedUpdate { removed: 0, inserted: 2, kept: 0 });
        let second = update_seeds(&engine, true).unwrap();
        assert_eq!(second, SeedUpdate { removed: 0, inserted: 0, kept: 2 });
        assert!(stored(&fx, "face_id = 1").is_some());

        // a new isolated edge only adds its own seed
        let a = engine.add_iso_node(None, &Coord::new(10.0, 0.0)).unwrap();
        let b = engine.add_iso_node(None, &Coord::new(12.0, 0.0)).unwrap();
        let e = engine
            .add_iso_edge(a, b, &LineString::from_xy(&[(10.0, 0.0), (12.0, 0.0)]))
            .unwrap();
        let third = update_seeds(&engine, true).unwrap();
        assert_eq!(third, SeedUpdate { removed: 0, inserted: 1, kept: 2 });
        let text = stored(&fx, &format!("edge_id = {e}")).unwrap();
        assert_eq!(codec::decode_point(&text).unwrap(), Coord::new(11.0, 0.0));

        engine.rem_iso_edge(e).unwrap();
        let full = update_seeds(&engine, false).unwrap();
        assert_eq!(full, SeedUpdate { removed: 3, inserted: 2, kept: 0 });
    }

    #[test]
    fn seeds_carry_z_in_z_topologies() {
        let fx = Fixture::with_z(0.0);
        square(&fx);
        update_seeds(&fx.engine(), false).unwrap();
        let ordinates = |text: String| serde_json::from_str::<Vec<f64>>(&text).unwrap().len();
        assert_eq!(ordinates(stored(&fx, "face_id = 1").unwrap()), 3);
        assert_eq!(ordinates(stored(&fx, "edge_id = 1").unwrap()), 3);
    }
}
