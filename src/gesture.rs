use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CanvasConfig;
use crate::geometry::{ElementKind, ElementSource};
use crate::selection::{EditorState, InteractionMode, PointerTarget};
use crate::viewport::{Axis, Viewport, compute_content_bounds};
use crate::{ElementStatus, Point, Size};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum Gesture {
    #[default]
    Idle,
    PanningCanvas,
    DraggingNode(String),
    DraggingGroup(String),
    ResizingGroup(String),
    ScrollingH,
    ScrollingV,
}

impl Gesture {
    pub fn is_idle(&self) -> bool {
        matches!(self, Gesture::Idle)
    }

    /// Gestures that write to the document rather than the view.
    pub fn mutates_model(&self) -> bool {
        matches!(
            self,
            Gesture::DraggingNode(_) | Gesture::DraggingGroup(_) | Gesture::ResizingGroup(_)
        )
    }
}

/// Partial group update; unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ElementStatus>,
}

impl GroupUpdate {
    pub fn position(position: Point) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn size(size: Size) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }
}

/// A change proposed by the active gesture. The caller commits it.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasCommand {
    MoveNode { id: String, position: Point },
    UpdateGroup { id: String, update: GroupUpdate },
    Pan(Point),
}

#[derive(Debug, Clone, Default)]
pub struct GestureMachine {
    active: Gesture,
    last_pointer: Point,
}

impl GestureMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> &Gesture {
        &self.active
    }

    pub fn last_pointer(&self) -> Point {
        self.last_pointer
    }

    /// Starts a gesture for `target`. Returns false when the pointer-down is ignored.
    pub fn pointer_down(&mut self, target: &PointerTarget, screen: Point, state: &EditorState) -> bool {
        if !self.active.is_idle() {
            debug!(active = ?self.active, "pointer-down ignored while a gesture is active");
            return false;
        }

        let editable = !state.locked;
        let next = match target {
            PointerTarget::Background => Gesture::PanningCanvas,
            PointerTarget::Thumb(Axis::Horizontal) => Gesture::ScrollingH,
            PointerTarget::Thumb(Axis::Vertical) => Gesture::ScrollingV,
            PointerTarget::ResizeHandle(id) if editable => Gesture::ResizingGroup(id.clone()),
            PointerTarget::Node(id) if editable && state.mode == InteractionMode::Select => {
                Gesture::DraggingNode(id.clone())
            }
            PointerTarget::Group(id) if editable && state.mode == InteractionMode::Select => {
                Gesture::DraggingGroup(id.clone())
            }
            _ => return false,
        };

        debug!(gesture = ?next, "gesture started");
        self.active = next;
        self.last_pointer = screen;
        true
    }

    /// Interprets a pointer move under the active gesture.
    ///
    /// Pan and scroll gestures update `viewport` in place and report the new
    /// offset; node and group gestures only propose a command. Nothing is
    /// proposed for the model while the canvas is locked.
    pub fn pointer_move<S>(
        &mut self,
        screen: Point,
        viewport: &mut Viewport,
        elements: &S,
        locked: bool,
        config: &CanvasConfig,
    ) -> Option<CanvasCommand>
    where
        S: ElementSource + ?Sized,
    {
        let dx = screen.x - self.last_pointer.x;
        let dy = screen.y - self.last_pointer.y;
        self.last_pointer = screen;

        if locked && self.active.mutates_model() {
            return None;
        }

        match &self.active {
            Gesture::Idle => None,
            Gesture::PanningCanvas => {
                let bounds = current_bounds(elements, config);
                Some(CanvasCommand::Pan(viewport.pan_by(dx, dy, bounds)))
            }
            Gesture::ScrollingH => {
                let bounds = current_bounds(elements, config);
                Some(CanvasCommand::Pan(viewport.scroll_thumb_by(Axis::Horizontal, dx, bounds)))
            }
            Gesture::ScrollingV => {
                let bounds = current_bounds(elements, config);
                Some(CanvasCommand::Pan(viewport.scroll_thumb_by(Axis::Vertical, dy, bounds)))
            }
            Gesture::DraggingNode(id) => {
                let rect = elements.element_rect(id)?;
                let pointer = viewport.to_virtual(screen);
                Some(CanvasCommand::MoveNode {
                    id: id.clone(),
                    position: pointer.offset(-rect.width / 2.0, -rect.height / 2.0),
                })
            }
            Gesture::DraggingGroup(id) => {
                let rect = elements.element_rect(id).filter(|rect| rect.kind == ElementKind::Group)?;
                let pointer = viewport.to_virtual(screen);
                Some(CanvasCommand::UpdateGroup {
                    id: id.clone(),
                    update: GroupUpdate::position(pointer.offset(-rect.width / 2.0, -rect.height / 2.0)),
                })
            }
            Gesture::ResizingGroup(id) => {
                let rect = elements.element_rect(id).filter(|rect| rect.kind == ElementKind::Group)?;
                let pointer = viewport.to_virtual(screen);
                let size = Size::new(
                    (pointer.x - rect.x).max(config.group_min_width),
                    (pointer.y - rect.y).max(config.group_min_height),
                );
                Some(CanvasCommand::UpdateGroup {
                    id: id.clone(),
                    update: GroupUpdate::size(size),
                })
            }
        }
    }

    /// Pointer-up, pointer-leave and escape all end the gesture.
    pub fn release(&mut self) -> Gesture {
        let ended = std::mem::take(&mut self.active);
        if !ended.is_idle() {
            debug!(gesture = ?ended, "gesture ended");
        }
        ended
    }
}

fn current_bounds<S>(elements: &S, config: &CanvasConfig) -> crate::viewport::ContentBounds
where
    S: ElementSource + ?Sized,
{
    compute_content_bounds(
        &elements.element_rects(),
        config.content_margin,
        config.empty_canvas_extent,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ElementRect;
    use crate::model::Connection;

    struct Board {
        rects: Vec<ElementRect>,
    }

    impl ElementSource for Board {
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

    fn board() -> Board {
        Board {
            rects: vec![
                ElementRect::group("g", Point::new(100.0, 100.0), Size::new(400.0, 300.0)),
                ElementRect::node("n", Point::new(0.0, 0.0)),
            ],
        }
    }

    fn viewport() -> Viewport {
        Viewport::new(Size::new(800.0, 600.0))
    }

    #[test]
    fn dragging_a_node_centers_it_under_the_pointer() {
        let board = board();
        let config = CanvasConfig::default();
        let mut viewport = viewport();
        viewport.offset = Point::new(-50.0, -20.0);
        let mut machine = GestureMachine::new();

        assert!(machine.pointer_down(&PointerTarget::Node("n".into()), Point::new(10.0, 10.0), &EditorState::new()));
        let command = machine.pointer_move(Point::new(250.0, 180.0), &mut viewport, &board, false, &config);
        assert_eq!(
            command,
            Some(CanvasCommand::MoveNode {
                id: "n".into(),
                position: Point::new(240.0, 180.0),
            })
        );
    }

    #[test]
    fn dragging_a_group_uses_its_own_half_size() {
        let board = board();
        let config = CanvasConfig::default();
        let mut viewport = viewport();
        let mut machine = GestureMachine::new();

        machine.pointer_down(&PointerTarget::Group("g".into()), Point::new(300.0, 250.0), &EditorState::new());
        let command = machine.pointer_move(Point::new(400.0, 300.0), &mut viewport, &board, false, &config);
        assert_eq!(
            command,
            Some(CanvasCommand::UpdateGroup {
                id: "g".into(),
                update: GroupUpdate::position(Point::new(200.0, 150.0)),
            })
        );
    }

    #[test]
    fn resize_is_clamped_to_the_minimum() {
        let board = board();
        let config = CanvasConfig::default();
        let mut viewport = viewport();
        let mut machine = GestureMachine::new();

        machine.pointer_down(&PointerTarget::ResizeHandle("g".into()), Point::new(495.0, 395.0), &EditorState::new());
        let shrink = machine.pointer_move(Point::new(120.0, 110.0), &mut viewport, &board, false, &config);
        assert_eq!(
            shrink,
            Some(CanvasCommand::UpdateGroup {
                id: "g".into(),
                update: GroupUpdate::size(Size::new(200.0, 150.0)),
            })
        );

        let grow = machine.pointer_move(Point::new(700.0, 520.0), &mut viewport, &board, false, &config);
        assert_eq!(
            grow,
            Some(CanvasCommand::UpdateGroup {
                id: "g".into(),
                update: GroupUpdate::size(Size::new(600.0, 420.0)),
            })
        );
    }

    #[test]
    fn only_one_gesture_at_a_time() {
        let mut machine = GestureMachine::new();
        let state = EditorState::new();
        assert!(machine.pointer_down(&PointerTarget::Background, Point::ORIGIN, &state));
        assert!(!machine.pointer_down(&PointerTarget::Node("n".into()), Point::ORIGIN, &state));
        assert_eq!(machine.active(), &Gesture::PanningCanvas);
        assert_eq!(machine.release(), Gesture::PanningCanvas);
        assert!(machine.active().is_idle());
    }

    #[test]
    fn locked_canvas_still_pans_but_never_drags() {
        let board = board();
        let config = CanvasConfig::default();
        let mut viewport = viewport();
        let mut machine = GestureMachine::new();
        let mut state = EditorState::new();
        state.set_locked(true);

        assert!(!machine.pointer_down(&PointerTarget::Node("n".into()), Point::ORIGIN, &state));
        assert!(!machine.pointer_down(&PointerTarget::ResizeHandle("g".into()), Point::ORIGIN, &state));
        assert!(machine.pointer_down(&PointerTarget::Background, Point::new(300.0, 300.0), &state));

        let command = machine.pointer_move(Point::new(260.0, 290.0), &mut viewport, &board, true, &config);
        assert_eq!(command, Some(CanvasCommand::Pan(Point::new(-40.0, -10.0))));
        assert_eq!(viewport.offset, Point::new(-40.0, -10.0));
    }

    #[test]
    fn lock_during_a_drag_suppresses_mutations() {
        let board = board();
        let config = CanvasConfig::default();
        let mut viewport = viewport();
        let mut machine = GestureMachine::new();

        machine.pointer_down(&PointerTarget::Node("n".into()), Point::ORIGIN, &EditorState::new());
        assert_eq!(machine.pointer_move(Point::new(30.0, 30.0), &mut viewport, &board, true, &config), None);
    }

    #[test]
    fn connect_mode_does_not_start_drags() {
        let mut machine = GestureMachine::new();
        let mut state = EditorState::new();
        state.set_mode(InteractionMode::Connect);
        assert!(!machine.pointer_down(&PointerTarget::Node("n".into()), Point::ORIGIN, &state));
        assert!(!machine.pointer_down(&PointerTarget::Group("g".into()), Point::ORIGIN, &state));
    }

    #[test]
    fn vanished_drag_target_proposes_nothing() {
        let config = CanvasConfig::default();
        let mut viewport = viewport();
        let mut machine = GestureMachine::new();
        let empty = Board { rects: Vec::new() };

        machine.pointer_down(&PointerTarget::Node("n".into()), Point::ORIGIN, &EditorState::new());
        assert_eq!(machine.pointer_move(Point::new(5.0, 5.0), &mut viewport, &empty, false, &config), None);
        assert!(!machine.release().is_idle());
    }
}
