use serde::{Deserialize, Serialize};

use crate::geometry::ElementRect;
use crate::{Point, Size};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl ContentBounds {
    pub fn empty_canvas(extent: f32) -> Self {
        Self {
            min_x: -extent,
            max_x: extent,
            min_y: -extent,
            max_y: extent,
        }
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn extent(&self, axis: Axis) -> (f32, f32) {
        match axis {
            Axis::Horizontal => (self.min_x, self.max_x),
            Axis::Vertical => (self.min_y, self.max_y),
        }
    }

    /// Widens the bounds symmetrically so each axis spans at least the viewport.
    pub fn fit_viewport(self, viewport: Size) -> Self {
        let mut fitted = self;
        let width = fitted.width();
        if width < viewport.width {
            let extra = (viewport.width - width) / 2.0;
            fitted.min_x -= extra;
            fitted.max_x += extra;
        }
        let height = fitted.height();
        if height < viewport.height {
            let extra = (viewport.height - height) / 2.0;
            fitted.min_y -= extra;
            fitted.max_y += extra;
        }
        fitted
    }
}

pub fn compute_content_bounds(rects: &[ElementRect], margin: f32, empty_extent: f32) -> ContentBounds {
    if rects.is_empty() {
        return ContentBounds::empty_canvas(empty_extent);
    }

    let mut min_x = f32::MAX;
    let mut max_x = f32::MIN;
    let mut min_y = f32::MAX;
    let mut max_y = f32::MIN;

    for rect in rects {
        min_x = min_x.min(rect.x);
        max_x = max_x.max(rect.right());
        min_y = min_y.min(rect.y);
        max_y = max_y.max(rect.bottom());
    }

    ContentBounds {
        min_x: min_x - margin,
        max_x: max_x + margin,
        min_y: min_y - margin,
        max_y: max_y + margin,
    }
}

fn clamp_axis(value: f32, lower: f32, upper: f32) -> f32 {
    if lower > upper {
        return (lower + upper) / 2.0;
    }
    value.max(lower).min(upper)
}

/// Keeps every part of the content reachable without scrolling it off screen.
pub fn clamp_offset(offset: Point, bounds: ContentBounds, viewport: Size) -> Point {
    let bounds = bounds.fit_viewport(viewport);
    Point {
        x: clamp_axis(offset.x, viewport.width - bounds.max_x, -bounds.min_x),
        y: clamp_axis(offset.y, viewport.height - bounds.max_y, -bounds.min_y),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThumbMetrics {
    pub pos: f32,
    pub size: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScrollbarMetrics {
    pub horizontal: ThumbMetrics,
    pub vertical: ThumbMetrics,
}

impl ScrollbarMetrics {
    pub fn thumb(&self, axis: Axis) -> ThumbMetrics {
        match axis {
            Axis::Horizontal => self.horizontal,
            Axis::Vertical => self.vertical,
        }
    }
}

fn thumb_metrics(offset: f32, bounds_min: f32, bounds_size: f32, viewport_size: f32, min_thumb: f32) -> ThumbMetrics {
    if bounds_size <= 0.0 || viewport_size <= 0.0 {
        return ThumbMetrics {
            pos: 0.0,
            size: viewport_size.max(0.0),
        };
    }
    let size = (viewport_size / bounds_size * viewport_size)
        .max(min_thumb)
        .min(viewport_size);
    let pos = ((-offset - bounds_min) / bounds_size * viewport_size)
        .max(0.0)
        .min(viewport_size - size);
    ThumbMetrics { pos, size }
}

pub fn scrollbar_thumb_metrics(
    offset: Point,
    bounds: ContentBounds,
    viewport: Size,
    min_thumb: f32,
) -> ScrollbarMetrics {
    let bounds = bounds.fit_viewport(viewport);
    ScrollbarMetrics {
        horizontal: thumb_metrics(offset.x, bounds.min_x, bounds.width(), viewport.width, min_thumb),
        vertical: thumb_metrics(offset.y, bounds.min_y, bounds.height(), viewport.height, min_thumb),
    }
}

/// Offset change for a thumb drag; moving the thumb right moves content left.
pub fn thumb_drag_delta(pointer_delta: f32, bounds_size: f32, viewport_size: f32) -> f32 {
    if viewport_size <= 0.0 {
        return 0.0;
    }
    -(pointer_delta / viewport_size) * bounds_size
}

/// Scroll offset over the unbounded canvas: `screen = virtual + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub offset: Point,
    pub size: Size,
}

impl Viewport {
    pub fn new(size: Size) -> Self {
        Self {
            offset: Point::ORIGIN,
            size,
        }
    }

    pub fn to_virtual(&self, screen: Point) -> Point {
        Point::new(screen.x - self.offset.x, screen.y - self.offset.y)
    }

    pub fn to_screen(&self, virtual_point: Point) -> Point {
        Point::new(virtual_point.x + self.offset.x, virtual_point.y + self.offset.y)
    }

    pub fn clamp_to(&mut self, bounds: ContentBounds) -> Point {
        self.offset = clamp_offset(self.offset, bounds, self.size);
        self.offset
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32, bounds: ContentBounds) -> Point {
        self.offset = clamp_offset(self.offset.offset(dx, dy), bounds, self.size);
        self.offset
    }

    pub fn scroll_thumb_by(&mut self, axis: Axis, pointer_delta: f32, bounds: ContentBounds) -> Point {
        let fitted = bounds.fit_viewport(self.size);
        let (dx, dy) = match axis {
            Axis::Horizontal => (thumb_drag_delta(pointer_delta, fitted.width(), self.size.width), 0.0),
            Axis::Vertical => (0.0, thumb_drag_delta(pointer_delta, fitted.height(), self.size.height)),
        };
        self.pan_by(dx, dy, bounds)
    }

    pub fn resize(&mut self, size: Size, bounds: ContentBounds) {
        self.size = size;
        self.clamp_to(bounds);
    }

    pub fn scrollbars(&self, bounds: ContentBounds, min_thumb: f32) -> ScrollbarMetrics {
        scrollbar_thumb_metrics(self.offset, bounds, self.size, min_thumb)
    }
}
