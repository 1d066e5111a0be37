// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar-Topo CLI - inspect and edit topologies stored in a SQLite file.
//!
//! Coordinates are JSON arrays: `[x,y]` for a point, `[[x,y],...]` for a
//! line and `[[[x,y],...],...]` for a polygon (exterior ring first). Every
//! editing command runs inside its own savepoint and prints its result as
//! JSON on stdout.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use planar_topo::{Accessor, Coord, Geometry, LineString, Polygon, Shape, TopoDb};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "planar-topo", version, about = "Planar topology engine over SQLite")]
struct Cli {
    /// Database file, created if missing
    #[arg(long, env = "TOPO_DB")]
    db: std::path::PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an empty topology
    Create {
        name: String,
        #[arg(long, default_value_t = 0)]
        srid: i32,
        #[arg(long, default_value_t = 0.0)]
        tolerance: f64,
        #[arg(long)]
        has_z: bool,
    },
    /// Drop a topology and its relations
    Drop { name: String },
    /// Insert a point, reusing or splitting existing primitives
    AddPoint { name: String, point: String },
    /// Insert a linestring, noding it against existing primitives
    AddLine { name: String, line: String },
    /// Insert a polygon and print the faces it covers
    AddPolygon { name: String, polygon: String },
    /// Run every structural check
    Validate { name: String },
    /// Print the polygon of a face
    FaceGeometry { name: String, face: i64 },
    /// Print the signed boundary edges of a face
    FaceEdges { name: String, face: i64 },
    /// Recompute edge and face seeds
    UpdateSeeds {
        name: String,
        /// Rebuild every seed instead of only the stale ones
        #[arg(long)]
        full: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db = TopoDb::open(&cli.db).with_context(|| format!("opening {}", cli.db.display()))?;
    info!(db = %cli.db.display(), "opened database");

    let output = match cli.command {
        Command::Create {
            name,
            srid,
            tolerance,
            has_z,
        } => serde_json::json!(db.create_topology(&name, srid, tolerance, has_z)?),
        Command::Drop { name } => serde_json::json!(db.drop_topology(&name)?),
        Command::AddPoint { name, point } => {
            let topo = db.topology(&name)?;
            let geometry = geometry_for(&topo, Shape::Point(parse_point(&point)?));
            let node = edit(&db, &topo, "add_point", || topo.add_point(&geometry))?;
            serde_json::json!(node)
        }
        Command::AddLine { name, line } => {
            let topo = db.topology(&name)?;
            let geometry = geometry_for(&topo, Shape::LineString(parse_line(&line)?));
            let edges = edit(&db, &topo, "add_line", || topo.add_line(&geometry))?;
            serde_json::json!(edges)
        }
        Command::AddPolygon { name, polygon } => {
            let topo = db.topology(&name)?;
            let geometry = geometry_for(&topo, Shape::Polygon(parse_polygon(&polygon)?));
            let faces = edit(&db, &topo, "add_polygon", || topo.add_polygon(&geometry))?;
            serde_json::json!(faces)
        }
        Command::Validate { name } => serde_json::to_value(db.topology(&name)?.validate()?)?,
        Command::FaceGeometry { name, face } => match db.topology(&name)?.face_geometry(face)?.shape {
            Shape::Polygon(p) => serde_json::to_value(rings_of(&p))?,
            other => bail!("unexpected face shape {other:?}"),
        },
        Command::FaceEdges { name, face } => serde_json::json!(db.topology(&name)?.face_edges(face)?),
        Command::UpdateSeeds { name, full } => {
            let topo = db.topology(&name)?;
            let stats = edit(&db, &topo, "update_seeds", || topo.update_seeds(!full))?;
            serde_json::to_value(stats)?
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Runs an edit in a savepoint, surfacing the accessor's error message.
fn edit<T>(
    db: &TopoDb,
    topo: &Accessor<'_>,
    label: &str,
    f: impl FnOnce() -> planar_topo::Result<T>,
) -> Result<T> {
    db.in_savepoint(label, f).map_err(|e| {
        let message = topo.last_error().unwrap_or_else(|| e.to_string());
        anyhow::Error::new(e).context(message)
    })
}

fn geometry_for(topo: &Accessor<'_>, shape: Shape) -> Geometry {
    Geometry::new(topo.srid(), topo.has_z(), shape)
}

fn coord(values: &[f64]) -> Result<Coord> {
    match *values {
        [x, y] => Ok(Coord::new(x, y)),
        [x, y, z] => Ok(Coord::with_z(x, y, z)),
        _ => bail!("a coordinate needs 2 or 3 numbers, got {}", values.len()),
    }
}

fn parse_point(text: &str) -> Result<Coord> {
    let values: Vec<f64> = serde_json::from_str(text).context("point must be [x,y]")?;
    coord(&values)
}

fn parse_line(text: &str) -> Result<LineString> {
    let points: Vec<Vec<f64>> = serde_json::from_str(text).context("line must be [[x,y],...]")?;
    Ok(LineString::new(points.iter().map(|p| coord(p)).collect::<Result<_>>()?))
}

fn parse_polygon(text: &str) -> Result<Polygon> {
    let rings: Vec<Vec<Vec<f64>>> =
        serde_json::from_str(text).context("polygon must be [[[x,y],...],...]")?;
    let mut rings = rings
        .iter()
        .map(|r| Ok(LineString::new(r.iter().map(|p| coord(p)).collect::<Result<_>>()?)))
        .collect::<Result<Vec<_>>>()?;
    if rings.is_empty() {
        bail!("polygon needs an exterior ring");
    }
    let exterior = rings.remove(0);
    Ok(Polygon::new(exterior, rings))
}

fn rings_of(polygon: &Polygon) -> Vec<Vec<[f64; 2]>> {
    polygon
        .rings()
        .map(|r| r.coords.iter().map(|c| [c.x, c.y]).collect())
        .collect()
}
