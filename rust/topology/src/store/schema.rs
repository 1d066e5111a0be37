// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Persisted layout of a topology
//!
//! ```text
//! topologies                 <name>_face              idx_<name>_face_rtree
//! ┌──────────────────┐       ┌───────────────┐        ┌───────────────┐
//! │ topology_name PK │       │ face_id   PK  │───────►│ id_face       │
//! │ srid             │       │ min_x, min_y  │ trig.  │ minx, maxx    │
//! │ tolerance        │       │ max_x, max_y  │        │ miny, maxy    │
//! │ has_z            │       └───────────────┘        └───────────────┘
//! │ next_edge_id     │◄─┐        ▲       ▲
//! └──────────────────┘  │        │       │
//!                       │  <name>_node   │  <name>_edge
//!                 trig. │  ┌──────────────────┐  ┌──────────────────────┐
//!                       │  │ node_id PK       │◄─│ start_node, end_node │
//!                       │  │ containing_face  │  │ next_left_edge       │
//!                       │  │ geom             │  │ next_right_edge      │
//!                       │  └──────────────────┘  │ left_face,right_face │
//!                       └────────────────────────│ edge_id PK, geom     │
//!                                                └──────────────────────┘
//!                                                   │ trig.
//!                                                   ▼
//!                                         idx_<name>_edge_rtree
//!                                         (id_edge, minx, maxx, miny, maxy)
//! ```
//!
//! Relation names are part of the on-disk contract. Face is created before
//! Node and Edge because both reference it, and dropped after them.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::config::TopologyConfig;
use crate::error::{Error, Result};

/// Name of the shared configuration relation.
pub const TOPOLOGIES: &str = "topologies";

/// Relation names owned by one topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub face: String,
    pub face_rtree: String,
    pub edge_rtree: String,
    pub node: String,
    pub edge: String,
    pub seeds: String,
    pub next_edge_ins: String,
    pub next_edge_upd: String,
    pub validate: String,
    pub face_edges: String,
    pub face_check: String,
    pub face_check_rtree: String,
}

impl TableNames {
    /// `name` must already be normalised by [`normalize_name`].
    pub fn new(name: &str) -> Self {
        Self {
            face: format!("{name}_face"),
            face_rtree: format!("idx_{name}_face_rtree"),
            edge_rtree: format!("idx_{name}_edge_rtree"),
            node: format!("{name}_node"),
            edge: format!("{name}_edge"),
            seeds: format!("{name}_seeds"),
            next_edge_ins: format!("{name}_next_edge_ins"),
            next_edge_upd: format!("{name}_next_edge_upd"),
            validate: format!("{name}_validate_topogeo"),
            face_edges: format!("{name}_face_edges"),
            face_check: format!("{name}_face_check"),
            face_check_rtree: format!("{name}_face_check_rtree"),
        }
    }

    /// Relations that must not exist before the topology is created.
    fn reserved(&self) -> [&str; 6] {
        [&self.face, &self.face_rtree, &self.node, &self.edge, &self.edge_rtree, &self.seeds]
    }
}

/// Checks the naming rules and lower-cases the name.
pub fn normalize_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument("empty topology name".into()));
    }
    if trimmed.contains(['\'', '"', '`']) {
        return Err(Error::InvalidArgument(format!(
            "topology name {trimmed:?} contains a quote character"
        )));
    }
    Ok(trimmed.to_lowercase())
}

/// Creates the shared configuration relation if missing.
pub fn init_catalog(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {TOPOLOGIES} (
            topology_name TEXT NOT NULL PRIMARY KEY,
            srid INTEGER NOT NULL,
            tolerance DOUBLE NOT NULL,
            has_z INTEGER NOT NULL,
            next_edge_id INTEGER NOT NULL DEFAULT 1
        );"
    ))?;
    Ok(())
}

fn table_exists(conn: &Connection, schema: &str, table: &str) -> Result<bool> {
    let sql = format!(
        "SELECT count(*) FROM {schema}.sqlite_master WHERE type IN ('table', 'view') AND Lower(name) = Lower(?1)"
    );
    let count: i64 = conn.query_row(&sql, [table], |row| row.get(0))?;
    Ok(count > 0)
}

/// Column names of a relation, in declaration order.
pub fn table_columns(conn: &Connection, schema: &str, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA {schema}.table_info(\"{table}\")"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns.into_iter().map(|c| c.to_lowercase()).collect())
}

/// Loads the configuration row, `None` when absent.
pub fn load_config(conn: &Connection, name: &str) -> Result<Option<TopologyConfig>> {
    let sql = format!(
        "SELECT topology_name, srid, tolerance, has_z, next_edge_id FROM {TOPOLOGIES} WHERE Lower(topology_name) = Lower(?1)"
    );
    let row = conn
        .query_row(&sql, [name], |row| {
            Ok(TopologyConfig {
                name: row.get::<_, String>(0)?.to_lowercase(),
                srid: row.get(1)?,
                tolerance: row.get(2)?,
                has_z: row.get::<_, i64>(3)? != 0,
                next_edge_id: row.get(4)?,
            })
        })
        .optional()?;
    Ok(row)
}

/// Verifies that all owned relations exist with the expected columns.
pub fn check_layout(conn: &Connection, name: &str) -> Result<()> {
    let tables = TableNames::new(name);
    let expected: [(&str, &[&str]); 5] = [
        (&tables.face, &["face_id", "min_x", "min_y", "max_x", "max_y"]),
        (&tables.node, &["node_id", "containing_face", "geom"]),
        (
            &tables.edge,
            &[
                "edge_id",
                "start_node",
                "end_node",
                "next_left_edge",
                "next_right_edge",
                "left_face",
                "right_face",
                "geom",
            ],
        ),
        (&tables.face_rtree, &["id_face", "minx", "maxx", "miny", "maxy"]),
        (&tables.edge_rtree, &["id_edge", "minx", "maxx", "miny", "maxy"]),
    ];
    for (table, columns) in expected {
        if !table_exists(conn, "main", table)? {
            return Err(Error::NoSuchTopology(format!("{name}: missing relation {table}")));
        }
        let actual = table_columns(conn, "main", table)?;
        if let Some(missing) = columns.iter().find(|c| !actual.iter().any(|a| a == *c)) {
            return Err(Error::NoSuchTopology(format!(
                "{name}: relation {table} has no column {missing}"
            )));
        }
    }
    Ok(())
}

/// Fails with `AlreadyExists` when any relation the topology would own is
/// already taken, including registered `geometry_columns` entries.
fn check_free(conn: &Connection, name: &str, tables: &TableNames) -> Result<()> {
    if load_config(conn, name)?.is_some() {
        return Err(Error::AlreadyExists(format!("topology {name}")));
    }
    for table in tables.reserved() {
        if table_exists(conn, "main", table)? {
            return Err(Error::AlreadyExists(format!("relation {table}")));
        }
    }
    if table_exists(conn, "main", "geometry_columns")? {
        let columns = table_columns(conn, "main", "geometry_columns")?;
        if columns.iter().any(|c| c == "f_table_name") && columns.iter().any(|c| c == "f_geometry_column") {
            let registered: i64 = conn.query_row(
                "SELECT count(*) FROM geometry_columns
                 WHERE Lower(f_geometry_column) = 'geom' AND Lower(f_table_name) IN (Lower(?1), Lower(?2))",
                [&tables.node, &tables.edge],
                |row| row.get(0),
            )?;
            if registered > 0 {
                return Err(Error::AlreadyExists(format!(
                    "geometry column {}.geom or {}.geom",
                    tables.node, tables.edge
                )));
            }
        }
    }
    Ok(())
}

/// Creates the relations, triggers and the universal face of a topology.
pub fn create_topology(conn: &Connection, config: &TopologyConfig) -> Result<()> {
    let name = &config.name;
    let t = TableNames::new(name);
    check_free(conn, name, &t)?;

    conn.execute_batch(&format!(
        r#"
        CREATE TABLE "{face}" (
            face_id INTEGER PRIMARY KEY,
            min_x DOUBLE,
            min_y DOUBLE,
            max_x DOUBLE,
            max_y DOUBLE
        );
        CREATE VIRTUAL TABLE "{rtree}" USING rtree(id_face, minx, maxx, miny, maxy);
        CREATE TRIGGER "{face}_insert" AFTER INSERT ON "{face}"
        FOR EACH ROW WHEN NEW.min_x IS NOT NULL BEGIN
            INSERT INTO "{rtree}" (id_face, minx, maxx, miny, maxy)
            VALUES (NEW.face_id, NEW.min_x, NEW.max_x, NEW.min_y, NEW.max_y);
        END;
        CREATE TRIGGER "{face}_update" AFTER UPDATE ON "{face}"
        FOR EACH ROW BEGIN
            DELETE FROM "{rtree}" WHERE id_face = OLD.face_id;
            INSERT INTO "{rtree}" (id_face, minx, maxx, miny, maxy)
            SELECT NEW.face_id, NEW.min_x, NEW.max_x, NEW.min_y, NEW.max_y
            WHERE NEW.min_x IS NOT NULL;
        END;
        CREATE TRIGGER "{face}_delete" AFTER DELETE ON "{face}"
        FOR EACH ROW BEGIN
            DELETE FROM "{rtree}" WHERE id_face = OLD.face_id;
        END;

        CREATE TABLE "{node}" (
            node_id INTEGER PRIMARY KEY,
            containing_face INTEGER REFERENCES "{face}" (face_id),
            geom TEXT NOT NULL
        );
        CREATE INDEX "idx_{node}_contface" ON "{node}" (containing_face);

        CREATE TABLE "{edge}" (
            edge_id INTEGER PRIMARY KEY,
            start_node INTEGER NOT NULL REFERENCES "{node}" (node_id),
            end_node INTEGER NOT NULL REFERENCES "{node}" (node_id),
            next_left_edge INTEGER NOT NULL,
            next_right_edge INTEGER NOT NULL,
            left_face INTEGER NOT NULL REFERENCES "{face}" (face_id),
            right_face INTEGER NOT NULL REFERENCES "{face}" (face_id),
            geom TEXT NOT NULL
        );
        CREATE INDEX "idx_{edge}_start_node" ON "{edge}" (start_node);
        CREATE INDEX "idx_{edge}_end_node" ON "{edge}" (end_node);
        CREATE INDEX "idx_{edge}_left_face" ON "{edge}" (left_face);
        CREATE INDEX "idx_{edge}_right_face" ON "{edge}" (right_face);
        CREATE VIRTUAL TABLE "{edge_rtree}" USING rtree(id_edge, minx, maxx, miny, maxy);
        CREATE TRIGGER "{edge}_index_insert" AFTER INSERT ON "{edge}"
        FOR EACH ROW BEGIN
            INSERT INTO "{edge_rtree}" (id_edge, minx, maxx, miny, maxy)
            SELECT NEW.edge_id,
                   min(json_extract(value, '$[0]')), max(json_extract(value, '$[0]')),
                   min(json_extract(value, '$[1]')), max(json_extract(value, '$[1]'))
            FROM json_each(NEW.geom) HAVING count(*) > 0;
        END;
        CREATE TRIGGER "{edge}_index_update" AFTER UPDATE OF edge_id, geom ON "{edge}"
        FOR EACH ROW BEGIN
            DELETE FROM "{edge_rtree}" WHERE id_edge = OLD.edge_id;
            INSERT INTO "{edge_rtree}" (id_edge, minx, maxx, miny, maxy)
            SELECT NEW.edge_id,
                   min(json_extract(value, '$[0]')), max(json_extract(value, '$[0]')),
                   min(json_extract(value, '$[1]')), max(json_extract(value, '$[1]'))
            FROM json_each(NEW.geom) HAVING count(*) > 0;
        END;
        CREATE TRIGGER "{edge}_index_delete" AFTER DELETE ON "{edge}"
        FOR EACH ROW BEGIN
            DELETE FROM "{edge_rtree}" WHERE id_edge = OLD.edge_id;
        END;
        CREATE TRIGGER "{ins}" AFTER INSERT ON "{edge}"
        FOR EACH ROW BEGIN
            UPDATE {TOPOLOGIES} SET next_edge_id = NEW.edge_id + 1
            WHERE Lower(topology_name) = '{name}' AND next_edge_id < NEW.edge_id + 1;
        END;
        CREATE TRIGGER "{upd}" AFTER UPDATE OF edge_id ON "{edge}"
        FOR EACH ROW BEGIN
            UPDATE {TOPOLOGIES} SET next_edge_id = NEW.edge_id + 1
            WHERE Lower(topology_name) = '{name}' AND next_edge_id < NEW.edge_id + 1;
        END;

        INSERT INTO "{face}" (face_id) VALUES (0);
        "#,
        face = t.face,
        rtree = t.face_rtree,
        node = t.node,
        edge = t.edge,
        edge_rtree = t.edge_rtree,
        ins = t.next_edge_ins,
        upd = t.next_edge_upd,
    ))?;

    conn.execute(
        &format!(
            "INSERT INTO {TOPOLOGIES} (topology_name, srid, tolerance, has_z, next_edge_id) VALUES (?1, ?2, ?3, ?4, 1)"
        ),
        rusqlite::params![name, config.srid, config.tolerance, config.has_z as i64],
    )?;
    info!(topology = %name, srid = config.srid, tolerance = config.tolerance, has_z = config.has_z, "created topology");
    Ok(())
}

/// Drops the relations of a topology and its configuration row.
pub fn drop_topology(conn: &Connection, name: &str) -> Result<()> {
    if load_config(conn, name)?.is_none() {
        return Err(Error::NoSuchTopology(name.to_string()));
    }
    let t = TableNames::new(name);
    conn.execute_batch(&format!(
        r#"
        DROP TABLE IF EXISTS "{seeds}";
        DROP TABLE IF EXISTS "{edge}";
        DROP TABLE IF EXISTS "{node}";
        DROP TABLE IF EXISTS "{face}";
        DROP TABLE IF EXISTS "{rtree}";
        DROP TABLE IF EXISTS "{edge_rtree}";
        DROP TABLE IF EXISTS temp."{validate}";
        DROP TABLE IF EXISTS temp."{face_edges}";
        "#,
        seeds = t.seeds,
        edge = t.edge,
        node = t.node,
        face = t.face,
        rtree = t.face_rtree,
        edge_rtree = t.edge_rtree,
        validate = t.validate,
        face_edges = t.face_edges,
    ))?;
    conn.execute(
        &format!("DELETE FROM {TOPOLOGIES} WHERE Lower(topology_name) = Lower(?1)"),
        [name],
    )?;
    info!(topology = %name, "dropped topology");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str) -> TopologyConfig {
        TopologyConfig {
            name: name.to_string(),
            srid: 4326,
            tolerance: 0.0,
            has_z: false,
            next_edge_id: 1,
        }
    }

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_catalog(&conn).unwrap();
        conn
    }

    #[test]
    fn name_rules() {
        assert_eq!(normalize_name(" Roads ").unwrap(), "roads");
        assert!(matches!(normalize_name("a'b"), Err(Error::InvalidArgument(_))));
        assert!(matches!(normalize_name("a\"b"), Err(Error::InvalidArgument(_))));
        assert!(matches!(normalize_name("a`b"), Err(Error::InvalidArgument(_))));
        assert!(normalize_name("  ").is_err());
    }

    #[test]
    fn create_makes_universal_face() {
        let conn = open();
        create_topology(&conn, &config("topo")).unwrap();
        check_layout(&conn, "topo").unwrap();
        let (count, bbox): (i64, Option<f64>) = conn
            .query_row("SELECT count(*), max(min_x) FROM topo_face WHERE face_id = 0", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(bbox, None);
        let indexed: i64 = conn
            .query_row("SELECT count(*) FROM idx_topo_face_rtree", [], |r| r.get(0))
            .unwrap();
        assert_eq!(indexed, 0);
    }

    #[test]
    fn face_index_follows_face_rows() {
        let conn = open();
        create_topology(&conn, &config("topo")).unwrap();
        conn.execute("INSERT INTO topo_face (face_id, min_x, min_y, max_x, max_y) VALUES (5, 0, 0, 1, 1)", [])
            .unwrap();
        conn.execute("UPDATE topo_face SET max_x = 3 WHERE face_id = 5", []).unwrap();
        let maxx: f64 = conn
            .query_row("SELECT maxx FROM idx_topo_face_rtree WHERE id_face = 5", [], |r| r.get(0))
            .unwrap();
        assert_eq!(maxx, 3.0);
        conn.execute("DELETE FROM topo_face WHERE face_id = 5", []).unwrap();
        let indexed: i64 = conn
            .query_row("SELECT count(*) FROM idx_topo_face_rtree", [], |r| r.get(0))
            .unwrap();
        assert_eq!(indexed, 0);
    }

    #[test]
    fn next_edge_id_trigger_advances() {
        let conn = open();
        create_topology(&conn, &config("topo")).unwrap();
        conn.execute("INSERT INTO topo_node (node_id, geom) VALUES (1, '[0,0]'), (2, '[1,0]')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO topo_edge VALUES (41, 1, 2, -41, 41, 0, 0, '[[0,0],[1,0]]')",
            [],
        )
        .unwrap();
        let next = load_config(&conn, "topo").unwrap().unwrap().next_edge_id;
        assert_eq!(next, 42);
    }

    #[test]
    fn create_conflicts_and_drop() {
        let conn = open();
        create_topology(&conn, &config("topo")).unwrap();
        assert!(matches!(create_topology(&conn, &config("topo")), Err(Error::AlreadyExists(_))));

        conn.execute_batch("CREATE TABLE other_node (x INTEGER)").unwrap();
        assert!(matches!(create_topology(&conn, &config("other")), Err(Error::AlreadyExists(_))));

        drop_topology(&conn, "topo").unwrap();
        assert!(matches!(check_layout(&conn, "topo"), Err(Error::NoSuchTopology(_))));
        assert!(matches!(drop_topology(&conn, "topo"), Err(Error::NoSuchTopology(_))));
    }

    #[test]
    fn registered_geometry_column_conflicts() {
        let conn = open();
        conn.execute_batch(
            "CREATE TABLE geometry_columns (f_table_name TEXT, f_geometry_column TEXT);
             INSERT INTO geometry_columns VALUES ('roads_edge', 'geom');",
        )
        .unwrap();
        assert!(matches!(create_topology(&conn, &config("roads")), Err(Error::AlreadyExists(_))));
    }
}
