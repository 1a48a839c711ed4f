use serde::Serialize;
use tracing::trace;

use crate::model::Connection;
use crate::{NODE_HEIGHT, NODE_WIDTH, Point, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Group,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRect {
    pub id: String,
    pub kind: ElementKind,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ElementRect {
    pub fn node(id: impl Into<String>, position: Point) -> Self {
        Self {
            id: id.into(),
            kind: ElementKind::Node,
            x: position.x,
            y: position.y,
            width: NODE_WIDTH,
            height: NODE_HEIGHT,
        }
    }

    pub fn group(id: impl Into<String>, position: Point, size: Size) -> Self {
        Self {
            id: id.into(),
            kind: ElementKind::Group,
            x: position.x,
            y: position.y,
            width: size.width,
            height: size.height,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn is_area_kind(&self) -> bool {
        self.kind == ElementKind::Group
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }

    /// The square handle in the bottom-right corner that starts a resize.
    pub fn resize_handle_contains(&self, point: Point, handle: f32) -> bool {
        self.is_area_kind()
            && point.x <= self.right()
            && point.y <= self.bottom()
            && point.x >= self.right() - handle
            && point.y >= self.bottom() - handle
    }
}

/// Read access to the live element collections owned by the application.
pub trait ElementSource {
    fn element_rect(&self, id: &str) -> Option<ElementRect>;

    /// Every node and group, groups first, in paint order.
    fn element_rects(&self) -> Vec<ElementRect>;

    fn connections(&self) -> &[Connection];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Anchors {
    pub start: Point,
    pub end: Point,
}

/// Point where an edge heading toward `toward` leaves `rect`.
///
/// Nodes are point-like and always anchor at their center. Groups anchor
/// where the ray from their center toward `toward` crosses the boundary.
pub fn boundary_anchor(rect: &ElementRect, toward: Point) -> Point {
    let center = rect.center();
    if !rect.is_area_kind() {
        return center;
    }

    let dx = toward.x - center.x;
    let dy = toward.y - center.y;
    if dx == 0.0 && dy == 0.0 {
        return center;
    }

    let half_w = rect.width / 2.0;
    let half_h = rect.height / 2.0;
    let scale_x = if dx != 0.0 { (half_w / dx).abs() } else { f32::INFINITY };
    let scale_y = if dy != 0.0 { (half_h / dy).abs() } else { f32::INFINITY };
    let scale = scale_x.min(scale_y);

    Point::new(center.x + dx * scale, center.y + dy * scale)
}

pub fn anchors_between(source: &ElementRect, target: &ElementRect) -> Anchors {
    Anchors {
        start: boundary_anchor(source, target.center()),
        end: boundary_anchor(target, source.center()),
    }
}

/// Resolves both ends of an edge; `None` when either id is gone.
pub fn connection_anchors<S>(elements: &S, source_id: &str, target_id: &str) -> Option<Anchors>
where
    S: ElementSource + ?Sized,
{
    let Some(source) = elements.element_rect(source_id) else {
        trace!(source_id, "skipping connection with dangling source");
        return None;
    };
    let Some(target) = elements.element_rect(target_id) else {
        trace!(target_id, "skipping connection with dangling target");
        return None;
    };
    Some(anchors_between(&source, &target))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        rects: Vec<ElementRect>,
    }

    impl ElementSource for Fixture {
        fn element_rect(&self, id: &str) -> Option<ElementRect> {
            self.rects.iter().find(|rect| rect.id == id).cloned()
        }

        fn element_rects(&self) -> Vec<ElementRect> {
            self.rects.clone()
        }

        fn connections(&self) -> &[Connection] {
            &[]
        }
    }

    fn on_boundary(rect: &ElementRect, point: Point) -> bool {
        let center = rect.center();
        let nx = (point.x - center.x).abs() / (rect.width / 2.0);
        let ny = (point.y - center.y).abs() / (rect.height / 2.0);
        (nx.max(ny) - 1.0).abs() < 1e-4
    }

    #[test]
    fn nodes_anchor_at_their_centers() {
        let fixture = Fixture {
            rects: vec![
                ElementRect::node("a", Point::new(0.0, 0.0)),
                ElementRect::node("b", Point::new(300.0, 0.0)),
            ],
        };

        let anchors = connection_anchors(&fixture, "a", "b").unwrap();
        assert_eq!(anchors.start, Point::new(60.0, 20.0));
        assert_eq!(anchors.end, Point::new(360.0, 20.0));
    }

    #[test]
    fn group_anchors_sit_on_the_boundary() {
        let cases = [
            (Point::new(900.0, 40.0), Point::new(-700.0, 900.0)),
            (Point::new(150.0, 900.0), Point::new(20.0, -400.0)),
            (Point::new(-500.0, -500.0), Point::new(600.0, 100.0)),
        ];

        for (group_b, node_at) in cases {
            let a = ElementRect::group("a", Point::new(0.0, 0.0), Size::new(300.0, 200.0));
            let b = ElementRect::group("b", group_b, Size::new(220.0, 160.0));
            let anchors = anchors_between(&a, &b);
            assert!(on_boundary(&a, anchors.start), "start {:?}", anchors.start);
            assert!(on_boundary(&b, anchors.end), "end {:?}", anchors.end);

            let node = ElementRect::node("n", node_at);
            let mixed = anchors_between(&a, &node);
            assert!(on_boundary(&a, mixed.start));
            assert_eq!(mixed.end, node.center());
        }
    }

    #[test]
    fn anchors_are_symmetric_for_swapped_endpoints() {
        let a = ElementRect::group("a", Point::new(10.0, 10.0), Size::new(300.0, 200.0));
        let b = ElementRect::group("b", Point::new(600.0, 420.0), Size::new(240.0, 180.0));

        let forward = anchors_between(&a, &b);
        let backward = anchors_between(&b, &a);
        assert_eq!(forward.start, backward.end);
        assert_eq!(forward.end, backward.start);
    }

    #[test]
    fn axis_aligned_direction_uses_single_scale() {
        let group = ElementRect::group("g", Point::new(0.0, 0.0), Size::new(200.0, 100.0));
        assert_eq!(boundary_anchor(&group, Point::new(500.0, 50.0)), Point::new(200.0, 50.0));
        assert_eq!(boundary_anchor(&group, Point::new(100.0, -150.0)), Point::new(100.0, 0.0));
    }

    #[test]
    fn coincident_centers_fall_back_to_center() {
        let group = ElementRect::group("g", Point::new(0.0, 0.0), Size::new(200.0, 100.0));
        let anchor = boundary_anchor(&group, group.center());
        assert_eq!(anchor, group.center());
        assert!(anchor.x.is_finite() && anchor.y.is_finite());
    }

    #[test]
    fn dangling_ids_resolve_to_none() {
        let fixture = Fixture {
            rects: vec![ElementRect::node("a", Point::ORIGIN)],
        };
        assert!(connection_anchors(&fixture, "a", "missing").is_none());
        assert!(connection_anchors(&fixture, "missing", "a").is_none());
    }

    #[test]
    fn resize_handle_only_exists_on_groups() {
        let group = ElementRect::group("g", Point::new(0.0, 0.0), Size::new(300.0, 200.0));
        assert!(group.resize_handle_contains(Point::new(290.0, 190.0), 32.0));
        assert!(!group.resize_handle_contains(Point::new(200.0, 190.0), 32.0));

        let node = ElementRect::node("n", Point::ORIGIN);
        assert!(!node.resize_handle_contains(Point::new(115.0, 35.0), 32.0));
    }
}
