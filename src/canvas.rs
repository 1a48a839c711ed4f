use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::CanvasConfig;
use crate::edges::{RoutedConnection, layout_connections};
use crate::geometry::{ElementRect, ElementSource};
use crate::gesture::{CanvasCommand, Gesture, GestureMachine, GroupUpdate};
use crate::selection::{EditorState, PointerTarget, hit_test};
use crate::viewport::{ContentBounds, ScrollbarMetrics, Viewport, compute_content_bounds};
use crate::{Point, Size};

/// Write side of the element collections. The core only proposes changes
/// through these callbacks and never edits the collections itself.
pub trait CanvasHost: ElementSource {
    fn on_node_move(&mut self, id: &str, position: Point);

    fn on_group_update(&mut self, id: &str, update: GroupUpdate);

    fn on_pan(&mut self, _offset: Point) {}

    fn on_connect(&mut self, source_id: &str, target_id: &str);
}

/// Raw input in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PointerEvent {
    Down(Point),
    Move(Point),
    Up,
    Leave,
    Click(Point),
    Escape,
}

/// Everything a renderer needs for one paint, recomputed from current state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub viewport: Viewport,
    pub bounds: ContentBounds,
    pub scrollbars: ScrollbarMetrics,
    pub elements: Vec<ElementRect>,
    pub connections: Vec<RoutedConnection>,
}

/// Pointer-event entry point tying gestures, hit testing and layout together.
#[derive(Debug, Clone)]
pub struct Canvas {
    config: CanvasConfig,
    viewport: Viewport,
    gestures: GestureMachine,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(CanvasConfig::default())
    }
}

impl Canvas {
    pub fn new(config: CanvasConfig) -> Self {
        let viewport = Viewport::new(config.viewport_size());
        Self {
            config,
            viewport,
            gestures: GestureMachine::new(),
        }
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn gesture(&self) -> &Gesture {
        self.gestures.active()
    }

    pub fn content_bounds<S>(&self, elements: &S) -> ContentBounds
    where
        S: ElementSource + ?Sized,
    {
        compute_content_bounds(
            &elements.element_rects(),
            self.config.content_margin,
            self.config.empty_canvas_extent,
        )
    }

    pub fn scrollbars<S>(&self, elements: &S) -> ScrollbarMetrics
    where
        S: ElementSource + ?Sized,
    {
        self.viewport
            .scrollbars(self.content_bounds(elements), self.config.scrollbar_min_thumb)
    }

    pub fn resize<S>(&mut self, size: Size, elements: &S)
    where
        S: ElementSource + ?Sized,
    {
        let bounds = self.content_bounds(elements);
        self.viewport.resize(size, bounds);
    }

    /// Moves the view to `offset`, clamped to the current content.
    pub fn scroll_to<S>(&mut self, offset: Point, elements: &S) -> Point
    where
        S: ElementSource + ?Sized,
    {
        let bounds = self.content_bounds(elements);
        self.viewport.offset = offset;
        self.viewport.clamp_to(bounds)
    }

    pub fn hit<S>(&self, screen: Point, elements: &S) -> PointerTarget
    where
        S: ElementSource + ?Sized,
    {
        let rects = elements.element_rects();
        let connections = layout_connections(
            elements,
            self.config.parallel_edge_step,
            self.config.label_push,
        );
        let scrollbars = self.scrollbars(elements);
        hit_test(
            screen,
            &self.viewport,
            &rects,
            &connections,
            &scrollbars,
            &self.config,
        )
    }

    /// Feeds one event through hit testing, click routing and the gesture
    /// machine. Returns the command that was forwarded to `host`, if any.
    pub fn handle<H>(
        &mut self,
        event: PointerEvent,
        state: &mut EditorState,
        host: &mut H,
    ) -> Option<CanvasCommand>
    where
        H: CanvasHost + ?Sized,
    {
        match event {
            PointerEvent::Down(screen) => {
                let target = self.hit(screen, &*host);
                trace!(?target, "pointer down");
                self.gestures.pointer_down(&target, screen, state);
                None
            }
            PointerEvent::Move(screen) => {
                let command = self.gestures.pointer_move(
                    screen,
                    &mut self.viewport,
                    &*host,
                    state.locked,
                    &self.config,
                )?;
                apply_command(host, &command);
                Some(command)
            }
            PointerEvent::Up | PointerEvent::Leave | PointerEvent::Escape => {
                self.gestures.release();
                None
            }
            PointerEvent::Click(screen) => {
                match self.hit(screen, &*host) {
                    PointerTarget::Node(id) | PointerTarget::Group(id) | PointerTarget::ResizeHandle(id) => {
                        if let Some(request) = state.element_click(&id) {
                            host.on_connect(&request.source_id, &request.target_id);
                        }
                    }
                    PointerTarget::Connection(id) => state.connection_click(&id),
                    PointerTarget::Background => state.background_click(),
                    PointerTarget::Thumb(_) => {}
                }
                None
            }
        }
    }

    pub fn frame<S>(&self, elements: &S) -> Frame
    where
        S: ElementSource + ?Sized,
    {
        let bounds = self.content_bounds(elements);
        Frame {
            viewport: self.viewport,
            bounds,
            scrollbars: self
                .viewport
                .scrollbars(bounds, self.config.scrollbar_min_thumb),
            elements: elements.element_rects(),
            connections: layout_connections(
                elements,
                self.config.parallel_edge_step,
                self.config.label_push,
            ),
        }
    }
}

fn apply_command<H>(host: &mut H, command: &CanvasCommand)
where
    H: CanvasHost + ?Sized,
{
    match command {
        CanvasCommand::MoveNode { id, position } => host.on_node_move(id, *position),
        CanvasCommand::UpdateGroup { id, update } => host.on_group_update(id, update.clone()),
        CanvasCommand::Pan(offset) => host.on_pan(*offset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Topology;
    use crate::selection::{InteractionMode, Selection};

    fn sample_canvas() -> (Canvas, Topology, EditorState) {
        (Canvas::default(), Topology::sample(), EditorState::new())
    }

    #[test]
    fn drag_sequence_moves_the_node_and_releases() {
        let (mut canvas, mut topology, mut state) = sample_canvas();
        // Auth service node occupies (450,200)-(570,240).
        canvas.handle(PointerEvent::Down(Point::new(500.0, 220.0)), &mut state, &mut topology);
        assert_eq!(canvas.gesture(), &Gesture::DraggingNode("2".into()));

        canvas.handle(PointerEvent::Move(Point::new(700.0, 500.0)), &mut state, &mut topology);
        assert_eq!(topology.node("2").unwrap().position, Point::new(640.0, 480.0));

        canvas.handle(PointerEvent::Leave, &mut state, &mut topology);
        assert!(canvas.gesture().is_idle());
        canvas.handle(PointerEvent::Move(Point::new(10.0, 10.0)), &mut state, &mut topology);
        assert_eq!(topology.node("2").unwrap().position, Point::new(640.0, 480.0));
    }

    #[test]
    fn connect_clicks_create_a_connection_and_return_to_select() {
        let (mut canvas, mut topology, mut state) = sample_canvas();
        state.set_mode(InteractionMode::Connect);

        canvas.handle(PointerEvent::Click(Point::new(200.0, 270.0)), &mut state, &mut topology);
        assert_eq!(state.pending_source.as_deref(), Some("1"));
        canvas.handle(PointerEvent::Click(Point::new(800.0, 370.0)), &mut state, &mut topology);

        assert_eq!(state.mode, InteractionMode::Select);
        let created = topology.connections.last().unwrap();
        assert_eq!((created.source_id.as_str(), created.target_id.as_str()), ("1", "3"));
    }

    #[test]
    fn locked_canvas_ignores_connect_clicks() {
        let (mut canvas, mut topology, mut state) = sample_canvas();
        state.set_mode(InteractionMode::Connect);
        state.set_locked(true);

        canvas.handle(PointerEvent::Click(Point::new(200.0, 270.0)), &mut state, &mut topology);
        canvas.handle(PointerEvent::Click(Point::new(800.0, 370.0)), &mut state, &mut topology);

        assert_eq!(topology.connections.len(), 2);
        assert!(state.pending_source.is_none());
    }

    #[test]
    fn clicking_a_connection_selects_it() {
        let (mut canvas, mut topology, mut state) = sample_canvas();
        state.element_click("1");
        let frame = canvas.frame(&topology);
        let c2 = frame.connections.iter().find(|c| c.id == "c2").unwrap();
        let on_curve = c2.path.point_at(0.5);

        canvas.handle(PointerEvent::Click(on_curve), &mut state, &mut topology);
        assert_eq!(state.selection, Selection::Connection("c2".into()));
    }

    #[test]
    fn background_drag_pans_and_notifies_the_host() {
        let (mut canvas, mut topology, mut state) = sample_canvas();
        canvas.handle(PointerEvent::Down(Point::new(1000.0, 700.0)), &mut state, &mut topology);
        assert_eq!(canvas.gesture(), &Gesture::PanningCanvas);

        let command = canvas.handle(PointerEvent::Move(Point::new(1100.0, 750.0)), &mut state, &mut topology);
        assert_eq!(command, Some(CanvasCommand::Pan(Point::new(100.0, 50.0))));
        assert_eq!(canvas.viewport().offset, Point::new(100.0, 50.0));
    }

    #[test]
    fn frame_tracks_deleted_elements() {
        let (canvas, mut topology, mut state) = sample_canvas();
        state.element_click("3");
        topology.delete_node("3").unwrap();
        state.forget("3");

        let frame = canvas.frame(&topology);
        assert_eq!(frame.elements.len(), 3);
        assert_eq!(frame.connections.len(), 1);
        assert!(state.selection.is_none());
    }
}
