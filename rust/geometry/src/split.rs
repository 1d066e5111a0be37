// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cutting and joining linestrings.

use crate::error::{Error, Result};
use crate::measure::LineLocation;
use crate::types::{Coord, LineString};

/// Cuts `line` into near-equal pieces of at most about `max_points` points.
///
/// The piece count is `ceil(n / max_points)`; every piece holds the mean
/// number of vertices and the last one absorbs the remainder. Consecutive
/// pieces share their joining vertex, so concatenating them (dropping each
/// joined duplicate) gives back the original vertex sequence.
pub fn split_line_by_points(line: &LineString, max_points: usize) -> Result<Vec<LineString>> {
    if max_points < 2 {
        return Err(Error::InvalidSplit(format!(
            "point threshold must be at least 2, got {max_points}"
        )));
    }
    let n = line.len();
    if n < 2 {
        return Err(Error::Degenerate("linestring with fewer than 2 points".to_string()));
    }
    if n <= max_points {
        return Ok(vec![line.clone()]);
    }

    let count = n.div_ceil(max_points);
    let mean = n / count;
    let mut pieces = Vec::with_capacity(count);
    for i in 0..count {
        let start = i * mean;
        let end = if i + 1 == count { n - 1 } else { (i + 1) * mean };
        pieces.push(LineString::new(line.coords[start..=end].to_vec()));
    }
    Ok(pieces)
}

/// Cuts `line` in two at `at`, inserting `point` as the shared vertex.
///
/// A location that falls on an existing vertex reuses that vertex position
/// and replaces it with `point`.
pub fn split_line_at(line: &LineString, at: &LineLocation, point: Coord) -> Result<(LineString, LineString)> {
    if line.len() < 2 || at.segment + 1 >= line.len() {
        return Err(Error::InvalidSplit("location outside of the line".to_string()));
    }
    let coords = &line.coords;
    let (head_end, tail_start) = if at.fraction <= 0.0 {
        (at.segment, at.segment + 1)
    } else if at.fraction >= 1.0 {
        (at.segment + 1, at.segment + 2)
    } else {
        (at.segment + 1, at.segment + 1)
    };
    if head_end == 0 || tail_start > coords.len() || (head_end == coords.len() - 1 && at.fraction >= 1.0) {
        return Err(Error::InvalidSplit("split point is a line end point".to_string()));
    }

    let mut head: Vec<Coord> = coords[..head_end].to_vec();
    head.push(point);
    let mut tail = vec![point];
    tail.extend_from_slice(&coords[tail_start..]);
    Ok((LineString::new(head), LineString::new(tail)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::locate_point;

    fn straight(n: usize) -> LineString {
        LineString::new((0..n).map(|i| Coord::new(i as f64, (i % 3) as f64)).collect())
    }

    #[test]
    fn short_line_is_not_split() {
        let line = straight(5);
        let pieces = split_line_by_points(&line, 10).unwrap();
        assert_eq!(pieces, vec![line]);
    }

    #[test]
    fn thousand_points_by_hundred() {
        let line = straight(1000);
        let pieces = split_line_by_points(&line, 100).unwrap();
        assert_eq!(pieces.len(), 10);

        let mut rebuilt = pieces[0].coords.clone();
        for piece in &pieces[1..] {
            assert!(rebuilt.last().unwrap().same_xy(&piece.coords[0]));
            rebuilt.extend_from_slice(&piece.coords[1..]);
        }
        assert_eq!(rebuilt, line.coords);
    }

    #[test]
    fn remainder_goes_to_last_piece() {
        let line = straight(25);
        let pieces = split_line_by_points(&line, 10).unwrap();
        // 3 pieces of mean 8: [0..=8], [8..=16], [16..=24]
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].len(), 9);
        assert_eq!(pieces[2].first(), Some(line.coords[16]));
        assert_eq!(pieces[2].last(), line.last());
    }

    #[test]
    fn threshold_below_two_is_rejected() {
        assert!(matches!(
            split_line_by_points(&straight(5), 1),
            Err(Error::InvalidSplit(_))
        ));
    }

    #[test]
    fn split_inside_a_segment() {
        let line = LineString::from_xy(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let p = Coord::new(4.0, 0.0);
        let at = locate_point(&line, &p).unwrap();
        let (head, tail) = split_line_at(&line, &at, p).unwrap();
        assert_eq!(head, LineString::from_xy(&[(0.0, 0.0), (4.0, 0.0)]));
        assert_eq!(tail, LineString::from_xy(&[(4.0, 0.0), (10.0, 0.0), (10.0, 10.0)]));
    }

    #[test]
    fn split_at_interior_vertex() {
        let line = LineString::from_xy(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let p = Coord::new(10.0, 0.0);
        let at = locate_point(&line, &p).unwrap();
        let (head, tail) = split_line_at(&line, &at, p).unwrap();
        assert_eq!(head, LineString::from_xy(&[(0.0, 0.0), (10.0, 0.0)]));
        assert_eq!(tail, LineString::from_xy(&[(10.0, 0.0), (10.0, 10.0)]));
    }

    #[test]
    fn split_at_end_point_is_rejected() {
        let line = LineString::from_xy(&[(0.0, 0.0), (10.0, 0.0)]);
        let p = Coord::new(0.0, 0.0);
        let at = locate_point(&line, &p).unwrap();
        assert!(split_line_at(&line, &at, p).is_err());
    }
}
