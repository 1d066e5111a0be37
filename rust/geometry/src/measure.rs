// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar measures: ring areas, projections, distances and azimuths.

use nalgebra::Vector2;

use crate::types::{Coord, LineString};

/// Scale factor used to derive a minimal snapping tolerance from the
/// magnitude of the coordinates involved.
const MIN_TOLERANCE_SCALE: f64 = 3.6e-15;

/// Shoelace signed area of a ring. Positive for counter-clockwise rings.
///
/// The ring may be given closed (first == last) or open; the closing
/// segment is implied either way.
pub fn signed_ring_area(coords: &[Coord]) -> f64 {
    let n = coords.len();
    if n < 3 {
        return 0.0;
    }
    // Translate to the first vertex to keep the products small.
    let origin = coords[0];
    let mut sum = 0.0;
    for i in 0..n {
        let a = coords[i];
        let b = coords[(i + 1) % n];
        sum += (a.x - origin.x) * (b.y - origin.y) - (b.x - origin.x) * (a.y - origin.y);
    }
    sum / 2.0
}

/// Minimal tolerance for snapping around `c` when the topology tolerance
/// is zero.
pub fn min_tolerance(c: &Coord) -> f64 {
    let magnitude = c.x.abs().max(c.y.abs()).max(1.0);
    MIN_TOLERANCE_SCALE * magnitude
}

/// Closest point to `p` on segment `a`-`b`.
///
/// Returns the segment parameter in `[0, 1]`, the projected coordinate
/// (Z interpolated) and the planar distance from `p`.
pub fn project_on_segment(p: &Coord, a: &Coord, b: &Coord) -> (f64, Coord, f64) {
    let ab = Vector2::new(b.x - a.x, b.y - a.y);
    let ap = Vector2::new(p.x - a.x, p.y - a.y);
    let len2 = ab.norm_squared();
    if len2 == 0.0 {
        return (0.0, *a, p.distance(a));
    }
    let t = (ap.dot(&ab) / len2).clamp(0.0, 1.0);
    let projected = if t == 0.0 {
        *a
    } else if t == 1.0 {
        *b
    } else {
        Coord::lerp(a, b, t)
    };
    (t, projected, p.distance(&projected))
}

/// Location of the closest point on a line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineLocation {
    /// Index of the segment (`coords[segment]`..`coords[segment + 1]`).
    pub segment: usize,
    /// Parameter along that segment in `[0, 1]`.
    pub fraction: f64,
    /// The closest point itself.
    pub point: Coord,
    /// Planar distance from the query point.
    pub distance: f64,
}

impl LineLocation {
    /// Sort key along the line.
    pub fn position(&self) -> f64 {
        self.segment as f64 + self.fraction
    }
}

/// Closest location on `line` to `p`; `None` for lines with fewer than
/// 2 points.
pub fn locate_point(line: &LineString, p: &Coord) -> Option<LineLocation> {
    let mut best: Option<LineLocation> = None;
    for (i, (a, b)) in line.segments().enumerate() {
        let (t, point, distance) = project_on_segment(p, &a, &b);
        if best.map_or(true, |l| distance < l.distance) {
            best = Some(LineLocation {
                segment: i,
                fraction: t,
                point,
                distance,
            });
        }
    }
    best
}

/// Planar distance from `p` to the closest point of `line`.
pub fn distance_to_line(p: &Coord, line: &LineString) -> f64 {
    match line.len() {
        0 => f64::INFINITY,
        1 => p.distance(&line.coords[0]),
        _ => locate_point(line, p).map_or(f64::INFINITY, |l| l.distance),
    }
}

/// Direction angle of the vector `from -> to`, in radians in `(-pi, pi]`,
/// counter-clockwise from the positive X axis.
pub fn azimuth(from: &Coord, to: &Coord) -> f64 {
    (to.y - from.y).atan2(to.x - from.x)
}

/// Azimuth of the first non-degenerate segment leaving the start of the
/// line (`from_end == false`) or leaving its end backwards
/// (`from_end == true`).
pub fn leaving_azimuth(line: &LineString, from_end: bool) -> Option<f64> {
    let coords = &line.coords;
    let origin = if from_end { coords.last()? } else { coords.first()? };
    let next = if from_end {
        coords.iter().rev().skip(1).find(|c| !c.same_xy(origin))?
    } else {
        coords.iter().skip(1).find(|c| !c.same_xy(origin))?
    };
    Some(azimuth(origin, next))
}
