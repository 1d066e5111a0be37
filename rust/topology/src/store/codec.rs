// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stored geometry payload.
//!
//! Node points are JSON arrays `[x, y]` (or `[x, y, z]` in topologies with
//! Z), edge lines are arrays of those.

use planar_topo_geometry::{Coord, LineString, Polygon};

use crate::error::{Error, Result};

fn ordinates(c: &Coord, has_z: bool) -> Vec<f64> {
    if has_z {
        vec![c.x, c.y, c.z]
    } else {
        vec![c.x, c.y]
    }
}

fn from_ordinates(ords: &[f64]) -> Result<Coord> {
    match *ords {
        [x, y] => Ok(Coord::new(x, y)),
        [x, y, z] => Ok(Coord::with_z(x, y, z)),
        _ => Err(Error::InvalidGeometry(format!(
            "expected 2 or 3 ordinates, got {}",
            ords.len()
        ))),
    }
}

pub fn encode_point(c: &Coord, has_z: bool) -> Result<String> {
    Ok(serde_json::to_string(&ordinates(c, has_z))?)
}

pub fn decode_point(text: &str) -> Result<Coord> {
    let ords: Vec<f64> = serde_json::from_str(text)?;
    from_ordinates(&ords)
}

pub fn encode_line(line: &LineString, has_z: bool) -> Result<String> {
    let coords: Vec<Vec<f64>> = line.coords.iter().map(|c| ordinates(c, has_z)).collect();
    Ok(serde_json::to_string(&coords)?)
}

pub fn decode_line(text: &str) -> Result<LineString> {
    let coords: Vec<Vec<f64>> = serde_json::from_str(text)?;
    let coords = coords
        .iter()
        .map(|c| from_ordinates(c))
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::new(coords))
}

/// Polygons as an array of rings, exterior first.
pub fn encode_polygon(polygon: &Polygon) -> Result<String> {
    let rings: Vec<Vec<Vec<f64>>> = polygon
        .rings()
        .map(|r| r.coords.iter().map(|c| ordinates(c, false)).collect())
        .collect();
    Ok(serde_json::to_string(&rings)?)
}

pub fn decode_polygon(text: &str) -> Result<Polygon> {
    let rings: Vec<Vec<Vec<f64>>> = serde_json::from_str(text)?;
    let mut rings = rings.iter().map(|ring| {
        ring.iter()
            .map(|c| from_ordinates(c))
            .collect::<Result<Vec<_>>>()
            .map(LineString::new)
    });
    let exterior = rings
        .next()
        .ok_or_else(|| Error::InvalidGeometry("polygon without rings".into()))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}
