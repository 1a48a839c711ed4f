use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CanvasConfig;
use crate::edges::RoutedConnection;
use crate::geometry::{ElementKind, ElementRect};
use crate::viewport::{Axis, ScrollbarMetrics, Viewport};
use crate::Point;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    #[default]
    Select,
    Connect,
}

/// Single-select: an element and a connection can never be selected together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum Selection {
    #[default]
    None,
    Element(String),
    Connection(String),
}

impl Selection {
    pub fn element_id(&self) -> Option<&str> {
        match self {
            Selection::Element(id) => Some(id),
            _ => None,
        }
    }

    pub fn connection_id(&self) -> Option<&str> {
        match self {
            Selection::Connection(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Selection::None)
    }
}

/// Request to create a connection, produced by the second click in connect mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub source_id: String,
    pub target_id: String,
}

/// Application-owned editor state read by the interaction core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorState {
    pub mode: InteractionMode,
    pub locked: bool,
    pub selection: Selection,
    pub pending_source: Option<String>,
}

impl EditorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InteractionMode) {
        if self.mode != mode {
            debug!(?mode, "interaction mode changed");
        }
        self.mode = mode;
        self.pending_source = None;
    }

    /// A locked canvas is view-only, so a half-made connection is dropped.
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
        if locked {
            self.pending_source = None;
        }
    }

    pub fn element_click(&mut self, id: &str) -> Option<ConnectRequest> {
        match self.mode {
            InteractionMode::Connect if self.locked => {
                debug!(id, "connect click ignored on a locked canvas");
                None
            }
            InteractionMode::Connect => match self.pending_source.take() {
                None => {
                    self.pending_source = Some(id.to_string());
                    None
                }
                Some(source) if source == id => {
                    self.pending_source = Some(source);
                    None
                }
                Some(source) => {
                    self.mode = InteractionMode::Select;
                    Some(ConnectRequest {
                        source_id: source,
                        target_id: id.to_string(),
                    })
                }
            },
            InteractionMode::Select => {
                self.selection = if self.selection.element_id() == Some(id) {
                    Selection::None
                } else {
                    Selection::Element(id.to_string())
                };
                None
            }
        }
    }

    pub fn connection_click(&mut self, id: &str) {
        self.selection = Selection::Connection(id.to_string());
    }

    pub fn background_click(&mut self) {
        if self.mode == InteractionMode::Select {
            self.selection = Selection::None;
        }
    }

    /// Drops every reference to a deleted element or connection.
    pub fn forget(&mut self, id: &str) {
        let selected = match &self.selection {
            Selection::Element(current) | Selection::Connection(current) => current == id,
            Selection::None => false,
        };
        if selected {
            self.selection = Selection::None;
        }
        if self.pending_source.as_deref() == Some(id) {
            self.pending_source = None;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum PointerTarget {
    Background,
    Thumb(Axis),
    ResizeHandle(String),
    Node(String),
    Group(String),
    Connection(String),
}

fn thumb_at(screen: Point, viewport: &Viewport, scrollbars: &ScrollbarMetrics, thickness: f32) -> Option<Axis> {
    let size = viewport.size;
    let horizontal = scrollbars.horizontal;
    if screen.y >= size.height - thickness
        && screen.y <= size.height
        && screen.x >= horizontal.pos
        && screen.x <= horizontal.pos + horizontal.size
    {
        return Some(Axis::Horizontal);
    }
    let vertical = scrollbars.vertical;
    if screen.x >= size.width - thickness
        && screen.x <= size.width
        && screen.y >= vertical.pos
        && screen.y <= vertical.pos + vertical.size
    {
        return Some(Axis::Vertical);
    }
    None
}

/// Top-most target under a screen-space pointer.
///
/// `rects` are in paint order (groups first), so later entries win.
pub fn hit_test(
    screen: Point,
    viewport: &Viewport,
    rects: &[ElementRect],
    connections: &[RoutedConnection],
    scrollbars: &ScrollbarMetrics,
    config: &CanvasConfig,
) -> PointerTarget {
    if let Some(axis) = thumb_at(screen, viewport, scrollbars, config.scrollbar_thickness) {
        return PointerTarget::Thumb(axis);
    }

    let point = viewport.to_virtual(screen);

    if let Some(group) = rects
        .iter()
        .rev()
        .find(|rect| rect.resize_handle_contains(point, config.resize_handle))
    {
        return PointerTarget::ResizeHandle(group.id.clone());
    }

    if let Some(node) = rects
        .iter()
        .rev()
        .find(|rect| rect.kind == ElementKind::Node && rect.contains(point))
    {
        return PointerTarget::Node(node.id.clone());
    }

    let reach = config.hit_stroke_width / 2.0;
    if let Some(connection) = connections
        .iter()
        .rev()
        .find(|connection| connection.path.distance_to(point, config.hit_samples) <= reach)
    {
        return PointerTarget::Connection(connection.id.clone());
    }

    if let Some(group) = rects
        .iter()
        .rev()
        .find(|rect| rect.kind == ElementKind::Group && rect.contains(point))
    {
        return PointerTarget::Group(group.id.clone());
    }

    PointerTarget::Background
}
