use std::collections::HashMap;
use std::fmt::Write as FmtWrite;

use serde::Serialize;
use tracing::trace;

use crate::geometry::{Anchors, ElementSource, connection_anchors};
use crate::model::Connection;
use crate::{ConnectionStyle, ElementStatus, Point};

/// Unordered endpoint pair, stored sorted so `(a, b)` and `(b, a)` share a key.
pub fn pair_key(source_id: &str, target_id: &str) -> (String, String) {
    if source_id <= target_id {
        (source_id.to_string(), target_id.to_string())
    } else {
        (target_id.to_string(), source_id.to_string())
    }
}

/// Offset of member `index` within a bundle of `count` parallel edges,
/// measured in the bundle's canonical (sorted pair) orientation.
pub fn parallel_offset(index: usize, count: usize, step: f32) -> f32 {
    if count <= 1 {
        return 0.0;
    }
    let half = (count / 2) as f32;
    let mut offset = (index as f32 - half) * step;
    if count % 2 == 0 {
        offset += step / 2.0;
    }
    offset
}

/// Per-connection offsets in each connection's own source-to-target frame.
///
/// Connections running against the canonical orientation get the sign
/// flipped; since their normal is flipped too, the fan-out lands on the
/// same side no matter which end was recorded as the source.
pub fn connection_offsets<'a, I>(connections: I, step: f32) -> HashMap<String, f32>
where
    I: IntoIterator<Item = &'a Connection>,
{
    let connections: Vec<&Connection> = connections.into_iter().collect();

    let mut totals: HashMap<(String, String), usize> = HashMap::new();
    for connection in &connections {
        *totals
            .entry(pair_key(&connection.source_id, &connection.target_id))
            .or_insert(0) += 1;
    }

    let mut seen: HashMap<(String, String), usize> = HashMap::new();
    let mut offsets = HashMap::with_capacity(connections.len());
    for connection in connections {
        let key = pair_key(&connection.source_id, &connection.target_id);
        let count = totals.get(&key).copied().unwrap_or(1);
        let index = seen.entry(key).or_insert(0);
        let mut offset = parallel_offset(*index, count, step);
        *index += 1;

        if connection.source_id > connection.target_id {
            offset = -offset;
        }
        offsets.insert(connection.id.clone(), offset);
    }
    offsets
}

/// Quadratic curve that passes through `start`, the displaced midpoint and `end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgePath {
    pub start: Point,
    pub control: Point,
    pub end: Point,
    pub midpoint: Point,
    pub label: Point,
    pub offset: f32,
}

impl EdgePath {
    pub fn new(start: Point, end: Point, offset: f32, label_push: f32) -> Self {
        let chord_mid = Point::new((start.x + end.x) * 0.5, (start.y + end.y) * 0.5);
        let dx = end.x - start.x;
        let dy = end.y - start.y;
        let distance = (dx * dx + dy * dy).sqrt();

        if distance <= f32::EPSILON {
            return Self {
                start,
                control: chord_mid,
                end,
                midpoint: chord_mid,
                label: chord_mid,
                offset: 0.0,
            };
        }

        let normal_x = -dy / distance;
        let normal_y = dx / distance;

        let midpoint = chord_mid.offset(normal_x * offset, normal_y * offset);
        // B(0.5) = (start + 2 * control + end) / 4, solved for the control point.
        let control = Point::new(
            2.0 * midpoint.x - chord_mid.x,
            2.0 * midpoint.y - chord_mid.y,
        );
        let push = offset * label_push;
        let label = midpoint.offset(normal_x * push, normal_y * push);

        Self {
            start,
            control,
            end,
            midpoint,
            label,
            offset,
        }
    }

    pub fn is_straight(&self) -> bool {
        self.offset == 0.0
    }

    pub fn point_at(&self, t: f32) -> Point {
        let t = t.clamp(0.0, 1.0);
        let u = 1.0 - t;
        Point::new(
            u * u * self.start.x + 2.0 * u * t * self.control.x + t * t * self.end.x,
            u * u * self.start.y + 2.0 * u * t * self.control.y + t * t * self.end.y,
        )
    }

    /// SVG path data; straight edges are emitted as a plain line segment.
    pub fn to_svg_path(&self) -> String {
        let mut d = String::new();
        if self.is_straight() {
            let _ = write!(
                d,
                "M {:.1} {:.1} L {:.1} {:.1}",
                self.start.x, self.start.y, self.end.x, self.end.y
            );
        } else {
            let _ = write!(
                d,
                "M {:.1} {:.1} Q {:.1} {:.1} {:.1} {:.1}",
                self.start.x,
                self.start.y,
                self.control.x,
                self.control.y,
                self.end.x,
                self.end.y
            );
        }
        d
    }

    pub fn flatten(&self, segments: usize) -> Vec<Point> {
        let segments = segments.max(1);
        (0..=segments)
            .map(|step| self.point_at(step as f32 / segments as f32))
            .collect()
    }

    /// Shortest distance from `point` to the curve, approximated by a polyline.
    pub fn distance_to(&self, point: Point, segments: usize) -> f32 {
        self.flatten(segments)
            .windows(2)
            .map(|pair| distance_to_segment(point, pair[0], pair[1]))
            .fold(f32::INFINITY, f32::min)
    }
}

fn distance_to_segment(point: Point, a: Point, b: Point) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx * dx + dy * dy;
    if length_sq <= f32::EPSILON {
        return point.distance_to(a);
    }
    let t = (((point.x - a.x) * dx + (point.y - a.y) * dy) / length_sq).clamp(0.0, 1.0);
    point.distance_to(Point::new(a.x + dx * t, a.y + dy * t))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedConnection {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub label: String,
    pub traffic_load: f32,
    pub style: ConnectionStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ElementStatus>,
    pub anchors: Anchors,
    pub path: EdgePath,
}

/// Anchors and paths for every connection whose endpoints both resolve.
pub fn layout_connections<S>(elements: &S, step: f32, label_push: f32) -> Vec<RoutedConnection>
where
    S: ElementSource + ?Sized,
{
    let resolved: Vec<(&Connection, Anchors)> = elements
        .connections()
        .iter()
        .filter_map(|connection| {
            connection_anchors(elements, &connection.source_id, &connection.target_id)
                .map(|anchors| (connection, anchors))
        })
        .collect();

    let skipped = elements.connections().len() - resolved.len();
    if skipped > 0 {
        trace!(skipped, "connections left out of layout");
    }

    let offsets = connection_offsets(resolved.iter().map(|(connection, _)| *connection), step);

    resolved
        .into_iter()
        .map(|(connection, anchors)| {
            let offset = offsets.get(&connection.id).copied().unwrap_or(0.0);
            RoutedConnection {
                id: connection.id.clone(),
                source_id: connection.source_id.clone(),
                target_id: connection.target_id.clone(),
                label: connection.label.clone(),
                traffic_load: connection.traffic_load,
                style: connection.style.unwrap_or_default(),
                status: connection.status,
                anchors,
                path: EdgePath::new(anchors.start, anchors.end, offset, label_push),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(id: &str, source: &str, target: &str) -> Connection {
        Connection::new(id, source, target)
    }

    #[test]
    fn single_edge_has_no_offset() {
        assert_eq!(parallel_offset(0, 1, 30.0), 0.0);
        let offsets = connection_offsets(&[link("c1", "a", "b")], 30.0);
        assert_eq!(offsets["c1"], 0.0);
    }

    #[test]
    fn offsets_are_symmetric_about_zero() {
        for count in 2..=7 {
            let offsets: Vec<f32> = (0..count)
                .map(|index| parallel_offset(index, count, 30.0))
                .collect();
            let sum: f32 = offsets.iter().sum();
            assert!(sum.abs() < 1e-3, "count {count}: {offsets:?}");
            if count % 2 == 0 {
                assert!(offsets.iter().all(|offset| *offset != 0.0));
            }
        }
        assert_eq!(
            (0..2).map(|i| parallel_offset(i, 2, 30.0)).collect::<Vec<_>>(),
            vec![-15.0, 15.0]
        );
        assert_eq!(
            (0..3).map(|i| parallel_offset(i, 3, 30.0)).collect::<Vec<_>>(),
            vec![-30.0, 0.0, 30.0]
        );
    }

    #[test]
    fn reversed_connections_flip_their_offset() {
        let offsets = connection_offsets(&[link("c1", "a", "b"), link("c2", "b", "a")], 30.0);
        assert_eq!(offsets["c1"], -15.0);
        assert_eq!(offsets["c2"], -15.0);
    }

    #[test]
    fn reversed_pair_bows_to_opposite_sides() {
        let start = Point::new(60.0, 20.0);
        let end = Point::new(360.0, 20.0);
        let forward = EdgePath::new(start, end, -15.0, 0.6);
        let backward = EdgePath::new(end, start, -15.0, 0.6);

        assert!((forward.midpoint.y - 5.0).abs() < 1e-4);
        assert!((backward.midpoint.y - 35.0).abs() < 1e-4);
    }

    #[test]
    fn curve_passes_through_displaced_midpoint() {
        let path = EdgePath::new(Point::new(0.0, 0.0), Point::new(200.0, 0.0), 30.0, 0.6);
        let apex = path.point_at(0.5);
        assert!(apex.distance_to(path.midpoint) < 1e-3);
        assert!((path.midpoint.y - 30.0).abs() < 1e-4);
        assert!((path.label.y - 48.0).abs() < 1e-4);
        assert!(path.to_svg_path().starts_with("M 0.0 0.0 Q"));
    }

    #[test]
    fn coincident_points_degrade_to_straight_path() {
        let point = Point::new(40.0, 40.0);
        let path = EdgePath::new(point, point, 45.0, 0.6);
        assert!(path.is_straight());
        assert_eq!(path.midpoint, point);
        assert!(path.point_at(0.3).x.is_finite());
        assert_eq!(path.to_svg_path(), "M 40.0 40.0 L 40.0 40.0");
    }

    #[test]
    fn distance_measures_against_the_curve() {
        let path = EdgePath::new(Point::new(0.0, 0.0), Point::new(200.0, 0.0), 40.0, 0.6);
        assert!(path.distance_to(Point::new(100.0, 40.0), 32) < 1.0);
        assert!(path.distance_to(Point::new(100.0, -40.0), 32) > 70.0);
    }
}
