// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar-Topo Geometry
//!
//! In-memory geometry values and the planar predicates, measures and
//! constructions the topology engine builds on: robust orientation and
//! segment intersection from `geo`, polygon booleans from `i_overlay`,
//! triangulation from `earcutr` and vector maths from `nalgebra`.

pub mod bool2d;
pub mod error;
pub mod measure;
pub mod predicates;
pub mod split;
pub mod surface;
pub mod types;

// Re-export nalgebra types for convenience
pub use nalgebra::Vector2;

pub use bool2d::intersection_area;
pub use error::{Error, Result};
pub use measure::{
    azimuth, distance_to_line, leaving_azimuth, locate_point, min_tolerance,
    project_on_segment, signed_ring_area, LineLocation,
};
pub use predicates::{
    intersect_segments, is_simple, line_intersections, point_on_line,
    point_on_segment, polygon_position, ring_position, side_of, Covers, Position,
    SegmentIntersection, Side,
};
pub use split::{split_line_at, split_line_by_points};
pub use surface::{interior_point, triangulate};
pub use types::{BBox, Coord, Geometry, GeometryKind, LineString, Polygon, Shape};
