// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory geometry values.
//!
//! These are the values the topology engine accepts and returns. Every
//! coordinate carries a Z ordinate; whether it is meaningful is decided by
//! the owning [`Geometry`] (`has_z`) or by the topology the value is stored
//! in. All predicates and measures are planar and ignore Z.

use serde::{Deserialize, Serialize};

/// A planar coordinate with an optional-by-convention Z ordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Coord {
    /// Creates a 2D coordinate (Z = 0).
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Creates a 3D coordinate.
    pub const fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Exact planar equality (Z is ignored).
    #[inline]
    pub fn same_xy(&self, other: &Coord) -> bool {
        self.x == other.x && self.y == other.y
    }

    /// Planar Euclidean distance.
    #[inline]
    pub fn distance(&self, other: &Coord) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Linear interpolation between `a` and `b`, Z included.
    pub fn lerp(a: &Coord, b: &Coord, t: f64) -> Coord {
        Coord {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
            z: a.z + (b.z - a.z) * t,
        }
    }

    pub(crate) fn to_geo(self) -> geo::Coord<f64> {
        geo::Coord { x: self.x, y: self.y }
    }

    pub(crate) fn from_geo(c: geo::Coord<f64>) -> Self {
        Self::new(c.x, c.y)
    }
}

/// An axis-aligned planar bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Degenerate box around a single coordinate.
    pub fn from_coord(c: &Coord) -> Self {
        Self::new(c.x, c.y, c.x, c.y)
    }

    /// Smallest box enclosing all coordinates, or `None` when empty.
    pub fn from_coords<'a>(coords: impl IntoIterator<Item = &'a Coord>) -> Option<Self> {
        let mut iter = coords.into_iter();
        let first = iter.next()?;
        let mut bbox = Self::from_coord(first);
        for c in iter {
            bbox.expand_to(c);
        }
        Some(bbox)
    }

    pub fn expand_to(&mut self, c: &Coord) {
        self.min_x = self.min_x.min(c.x);
        self.min_y = self.min_y.min(c.y);
        self.max_x = self.max_x.max(c.x);
        self.max_y = self.max_y.max(c.y);
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Grows the box by `d` on every side.
    pub fn buffered(&self, d: f64) -> BBox {
        BBox::new(self.min_x - d, self.min_y - d, self.max_x + d, self.max_y + d)
    }

    /// Closed-interval overlap test (touching boxes intersect).
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn contains_coord(&self, c: &Coord) -> bool {
        c.x >= self.min_x && c.x <= self.max_x && c.y >= self.min_y && c.y <= self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// An ordered sequence of coordinates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LineString {
    pub coords: Vec<Coord>,
}

impl LineString {
    pub fn new(coords: Vec<Coord>) -> Self {
        Self { coords }
    }

    /// Builds a 2D line from `(x, y)` pairs.
    pub fn from_xy(points: &[(f64, f64)]) -> Self {
        Self::new(points.iter().map(|&(x, y)| Coord::new(x, y)).collect())
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn first(&self) -> Option<Coord> {
        self.coords.first().copied()
    }

    pub fn last(&self) -> Option<Coord> {
        self.coords.last().copied()
    }

    /// `true` when the line has at least 2 points and its ends coincide.
    pub fn is_closed(&self) -> bool {
        match (self.coords.first(), self.coords.last()) {
            (Some(a), Some(b)) if self.coords.len() > 1 => a.same_xy(b),
            _ => false,
        }
    }

    pub fn bbox(&self) -> Option<BBox> {
        BBox::from_coords(&self.coords)
    }

    /// Planar length.
    pub fn length(&self) -> f64 {
        self.segments().map(|(a, b)| a.distance(&b)).sum()
    }

    pub fn reversed(&self) -> LineString {
        let mut coords = self.coords.clone();
        coords.reverse();
        LineString::new(coords)
    }

    /// Consecutive coordinate pairs.
    pub fn segments(&self) -> impl Iterator<Item = (Coord, Coord)> + '_ {
        self.coords.windows(2).map(|w| (w[0], w[1]))
    }

    /// Copy with consecutive planar duplicates removed.
    pub fn dedup(&self) -> LineString {
        let mut coords: Vec<Coord> = Vec::with_capacity(self.coords.len());
        for c in &self.coords {
            if coords.last().map_or(true, |l| !l.same_xy(c)) {
                coords.push(*c);
            }
        }
        LineString::new(coords)
    }

    /// Planar equality of the vertex sequence, optionally in reverse.
    pub fn same_shape(&self, other: &LineString) -> bool {
        let forward = self.coords.len() == other.coords.len()
            && self.coords.iter().zip(&other.coords).all(|(a, b)| a.same_xy(b));
        forward
            || (self.coords.len() == other.coords.len()
                && self
                    .coords
                    .iter()
                    .zip(other.coords.iter().rev())
                    .all(|(a, b)| a.same_xy(b)))
    }

    pub(crate) fn to_geo(&self) -> geo::LineString<f64> {
        geo::LineString::new(self.coords.iter().map(|c| c.to_geo()).collect())
    }
}

/// A polygon: one exterior ring and zero or more holes. Rings are closed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: LineString,
    pub interiors: Vec<LineString>,
}

impl Polygon {
    pub fn new(exterior: LineString, interiors: Vec<LineString>) -> Self {
        Self {
            exterior,
            interiors,
        }
    }

    /// Exterior followed by holes.
    pub fn rings(&self) -> impl Iterator<Item = &LineString> {
        std::iter::once(&self.exterior).chain(self.interiors.iter())
    }

    /// Planar area (holes subtracted).
    pub fn area(&self) -> f64 {
        let outer = crate::measure::signed_ring_area(&self.exterior.coords).abs();
        let holes: f64 = self
            .interiors
            .iter()
            .map(|h| crate::measure::signed_ring_area(&h.coords).abs())
            .sum();
        outer - holes
    }

    pub fn bbox(&self) -> Option<BBox> {
        self.exterior.bbox()
    }

    pub(crate) fn to_geo(&self) -> geo::Polygon<f64> {
        geo::Polygon::new(
            self.exterior.to_geo(),
            self.interiors.iter().map(|r| r.to_geo()).collect(),
        )
    }
}

/// Geometry kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
}

impl GeometryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "POINT",
            GeometryKind::LineString => "LINESTRING",
            GeometryKind::Polygon => "POLYGON",
            GeometryKind::MultiPoint => "MULTIPOINT",
            GeometryKind::MultiLineString => "MULTILINESTRING",
            GeometryKind::MultiPolygon => "MULTIPOLYGON",
        }
    }
}

impl std::fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The shape part of a geometry value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Point(Coord),
    LineString(LineString),
    Polygon(Polygon),
    MultiPoint(Vec<Coord>),
    MultiLineString(Vec<LineString>),
    MultiPolygon(Vec<Polygon>),
}

/// A geometry value: a shape tagged with its SRID and dimensionality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub srid: i32,
    pub has_z: bool,
    pub shape: Shape,
}

impl Geometry {
    pub fn new(srid: i32, has_z: bool, shape: Shape) -> Self {
        Self { srid, has_z, shape }
    }

    pub fn point(srid: i32, c: Coord) -> Self {
        Self::new(srid, false, Shape::Point(c))
    }

    pub fn line(srid: i32, line: LineString) -> Self {
        Self::new(srid, false, Shape::LineString(line))
    }

    pub fn polygon(srid: i32, polygon: Polygon) -> Self {
        Self::new(srid, false, Shape::Polygon(polygon))
    }

    /// Marks the value as carrying a meaningful Z ordinate.
    pub fn with_z(mut self, has_z: bool) -> Self {
        self.has_z = has_z;
        self
    }

    pub fn kind(&self) -> GeometryKind {
        match &self.shape {
            Shape::Point(_) => GeometryKind::Point,
            Shape::LineString(_) => GeometryKind::LineString,
            Shape::Polygon(_) => GeometryKind::Polygon,
            Shape::MultiPoint(_) => GeometryKind::MultiPoint,
            Shape::MultiLineString(_) => GeometryKind::MultiLineString,
            Shape::MultiPolygon(_) => GeometryKind::MultiPolygon,
        }
    }

    pub fn bbox(&self) -> Option<BBox> {
        match &self.shape {
            Shape::Point(c) => Some(BBox::from_coord(c)),
            Shape::LineString(l) => l.bbox(),
            Shape::Polygon(p) => p.bbox(),
            Shape::MultiPoint(pts) => BBox::from_coords(pts),
            Shape::MultiLineString(lines) => lines
                .iter()
                .filter_map(|l| l.bbox())
                .reduce(|a, b| a.union(&b)),
            Shape::MultiPolygon(polys) => polys
                .iter()
                .filter_map(|p| p.bbox())
                .reduce(|a, b| a.union(&b)),
        }
    }
}
