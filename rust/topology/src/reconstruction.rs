// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Materialized face boundaries.

use rusqlite::params;
use tracing::debug;

use crate::engine::TopoEngine;
use crate::error::{Error, Result};
use crate::keys::FaceId;
use crate::store::schema::table_columns;
use crate::store::SqliteStore;

const FACE_EDGES_COLUMNS: [&str; 3] = ["face_id", "sequence", "edge_id"];

/// Writes the signed boundary of `face` into `temp."<name>_face_edges"`,
/// replacing earlier rows for the same face. Returns the sequence.
pub fn materialize_face_edges(engine: &TopoEngine<SqliteStore<'_>>, face: FaceId) -> Result<Vec<i64>> {
    let edges = engine.face_edges(face)?;
    let store = engine.store();
    let conn = store.connection();
    let table = &store.queries().tables.face_edges;

    let columns = table_columns(conn, "temp", table)?;
    if columns.is_empty() {
        conn.execute_batch(&format!(
            r#"CREATE TEMP TABLE "{table}" (
                   face_id INTEGER NOT NULL,
                   sequence INTEGER NOT NULL,
                   edge_id INTEGER NOT NULL,
                   PRIMARY KEY (face_id, sequence)
               );"#
        ))?;
    } else if !columns.iter().map(String::as_str).eq(FACE_EDGES_COLUMNS) {
        return Err(Error::InvalidArgument(format!(
            "temp.{table} exists with unexpected columns ({})",
            columns.join(", ")
        )));
    }

    conn.execute(&format!(r#"DELETE FROM temp."{table}" WHERE face_id = ?1"#), [face])?;
    let mut insert = conn.prepare(&format!(
        r#"INSERT INTO temp."{table}" (face_id, sequence, edge_id) VALUES (?1, ?2, ?3)"#
    ))?;
    for (i, edge) in edges.iter().enumerate() {
        insert.execute(params![face, i as i64 + 1, edge])?;
    }
    debug!(face, edges = edges.len(), "materialized face edges");
    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::Fixture;
    use planar_topo_geometry::{LineString, Polygon};

    fn rows(fx: &Fixture, face: FaceId) -> Vec<(i64, i64)> {
        let mut stmt = fx
            .conn
            .prepare(r#"SELECT sequence, edge_id FROM temp."topo_face_edges" WHERE face_id = ?1 ORDER BY sequence"#)
            .unwrap();
        stmt.query_map([face], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn rows_replace_earlier_output() {
        let fx = Fixture::new(0.0);
        let engine = fx.engine();
        engine
            .add_polygon(&Polygon::new(
                LineString::from_xy(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]),
                Vec::new(),
            ))
            .unwrap();
        assert_eq!(materialize_face_edges(&engine, 1).unwrap(), vec![1]);
        assert_eq!(rows(&fx, 1), vec![(1, 1)]);

        engine.mod_edge_split(1, &planar_topo_geometry::Coord::new(4.0, 2.0)).unwrap();
        materialize_face_edges(&engine, 1).unwrap();
        assert_eq!(rows(&fx, 1), vec![(1, 1), (2, 2)]);
    }

    #[test]
    fn foreign_table_is_rejected() {
        let fx = Fixture::new(0.0);
        fx.conn
            .execute_batch(r#"CREATE TEMP TABLE "topo_face_edges" (a, b)"#)
            .unwrap();
        assert!(matches!(
            materialize_face_edges(&fx.engine(), 0),
            Err(Error::InvalidArgument(_))
        ));
    }
}
