use eframe::egui;

use crate::geometry::{self, Handle};
use crate::model::{Annotation, AnnotationId, AnnotationSet, Tag};

// ── Gesture state ───────────────────────────────────────────────────────────

/// Where the pointer went down, resolved before the gesture machine sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerTarget {
    Empty,
    Shape(AnnotationId),
    Handle(AnnotationId, Handle),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Gesture {
    Idle,
    /// A box being drawn. `size` keeps its sign until the box is committed.
    Drawing {
        anchor: egui::Pos2,
        size: egui::Vec2,
    },
    Selected {
        id: AnnotationId,
    },
    Dragging {
        id: AnnotationId,
        /// Pointer offset from the box's top-left corner at press time.
        grab: egui::Vec2,
        origin: egui::Pos2,
    },
    Resizing {
        id: AnnotationId,
        handle: Handle,
        /// Corner opposite `handle` at press time.
        pinned: egui::Pos2,
        base: egui::Rect,
        current: egui::Rect,
    },
}

/// Thresholds in image pixels.
#[derive(Clone, Copy, Debug)]
pub struct EditorLimits {
    pub min_box_size: f32,
}

impl Default for EditorLimits {
    fn default() -> Self {
        Self { min_box_size: 5.0 }
    }
}

// ── Editor ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Editor {
    annotations: AnnotationSet,
    gesture: Gesture,
    limits: EditorLimits,
}

impl Editor {
    pub fn new(limits: EditorLimits) -> Self {
        Self {
            annotations: AnnotationSet::new(),
            gesture: Gesture::Idle,
            limits,
        }
    }

    pub fn annotations(&self) -> &AnnotationSet {
        &self.annotations
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn selected(&self) -> Option<AnnotationId> {
        match self.gesture {
            Gesture::Selected { id }
            | Gesture::Dragging { id, .. }
            | Gesture::Resizing { id, .. } => Some(id),
            Gesture::Idle | Gesture::Drawing { .. } => None,
        }
    }

    /// Box of the in-progress draw, if any, normalized for rendering.
    pub fn draft(&self) -> Option<egui::Rect> {
        match self.gesture {
            Gesture::Drawing { anchor, size } => Some(geometry::signed_rect(anchor, size)),
            _ => None,
        }
    }

    /// Box to render for `ann`, including any uncommitted drag or resize.
    pub fn display_rect(&self, ann: &Annotation) -> egui::Rect {
        match self.gesture {
            Gesture::Dragging { id, origin, .. } if id == ann.id => {
                egui::Rect::from_min_size(origin, ann.rect().size())
            }
            Gesture::Resizing { id, current, .. } if id == ann.id => current,
            _ => ann.rect(),
        }
    }

    /// Resolves what lies under `pos`. Handles of the selected box win over
    /// any outline, and later boxes win over earlier ones.
    pub fn hit_test(&self, pos: egui::Pos2, handle_half: f32, tolerance: f32) -> PointerTarget {
        if let Some(id) = self.selected() {
            if let Some(ann) = self.annotations.get(id) {
                let rect = self.display_rect(ann);
                if let Some(handle) = geometry::hit_handle(rect, pos, handle_half) {
                    return PointerTarget::Handle(id, handle);
                }
            }
        }
        self.annotations
            .iter()
            .rev()
            .find(|ann| geometry::on_outline(self.display_rect(ann), pos, tolerance))
            .map_or(PointerTarget::Empty, |ann| PointerTarget::Shape(ann.id))
    }

    pub fn pointer_down(&mut self, pos: egui::Pos2, target: PointerTarget) {
        self.gesture = match target {
            PointerTarget::Handle(id, handle) if self.selected() == Some(id) => {
                match self.annotations.get(id) {
                    Some(ann) => {
                        let base = ann.rect();
                        Gesture::Resizing {
                            id,
                            handle,
                            pinned: handle.opposite(base),
                            base,
                            current: base,
                        }
                    }
                    None => Gesture::Idle,
                }
            }
            // A handle can only belong to the selected box, so a stale one is
            // treated like a press on its shape rather than on empty canvas.
            PointerTarget::Handle(id, _) | PointerTarget::Shape(id) => {
                match self.annotations.get(id) {
                    Some(ann) if self.selected() == Some(id) => Gesture::Dragging {
                        id,
                        grab: pos - ann.rect().min,
                        origin: ann.rect().min,
                    },
                    Some(_) => Gesture::Selected { id },
                    None => Gesture::Idle,
                }
            }
            PointerTarget::Empty => Gesture::Drawing {
                anchor: pos,
                size: egui::Vec2::ZERO,
            },
        };
    }

    pub fn pointer_move(&mut self, pos: egui::Pos2) {
        let min = self.limits.min_box_size;
        match &mut self.gesture {
            Gesture::Drawing { anchor, size } => {
                *size = pos - *anchor;
            }
            Gesture::Dragging { grab, origin, .. } => {
                *origin = pos - *grab;
            }
            Gesture::Resizing {
                pinned, current, ..
            } => {
                *current = geometry::resize_box(*current, *pinned, pos, min);
            }
            Gesture::Idle | Gesture::Selected { .. } => {}
        }
    }

    /// Ends the active gesture. Returns the id of a newly drawn box.
    pub fn pointer_up(&mut self) -> Option<AnnotationId> {
        let gesture = std::mem::replace(&mut self.gesture, Gesture::Idle);
        match gesture {
            Gesture::Drawing { anchor, size } => {
                let min = self.limits.min_box_size;
                if size.x.abs().max(size.y.abs()) >= min {
                    let rect = geometry::signed_rect(anchor, size);
                    let id = self.annotations.insert(rect, Tag::Unassigned);
                    log::debug!("drew box {id} at {rect:?}");
                    Some(id)
                } else {
                    log::trace!("discarded undersized draw {size:?}");
                    None
                }
            }
            Gesture::Dragging { id, origin, .. } => {
                if let Some(ann) = self.annotations.get(id) {
                    let rect = egui::Rect::from_min_size(origin, ann.rect().size());
                    self.annotations.set_rect(id, rect);
                }
                self.gesture = Gesture::Selected { id };
                None
            }
            Gesture::Resizing {
                id, base, current, ..
            } => {
                // Fold the applied scale into the size so it starts from 1
                // again on the next resize.
                let scale = geometry::applied_scale(base, current);
                let size = base.size() * scale;
                self.annotations
                    .set_rect(id, egui::Rect::from_min_size(current.min, size));
                self.gesture = Gesture::Selected { id };
                None
            }
            other => {
                self.gesture = other;
                None
            }
        }
    }

    /// Pointer left `bounds` and was last seen at `exit`. Only an in-progress
    /// draw reacts to this; it ends where the pointer crossed the edge.
    pub fn pointer_leave(&mut self, exit: egui::Pos2, bounds: egui::Rect) -> Option<AnnotationId> {
        match self.gesture {
            Gesture::Drawing { .. } => {
                self.pointer_move(bounds.clamp(exit));
                self.pointer_up()
            }
            _ => None,
        }
    }

    pub fn select(&mut self, id: Option<AnnotationId>) {
        if matches!(self.gesture, Gesture::Drawing { .. }) {
            return;
        }
        self.gesture = match id {
            Some(id) if self.annotations.contains(id) => Gesture::Selected { id },
            _ => Gesture::Idle,
        };
    }

    pub fn set_tag(&mut self, id: AnnotationId, tag: Tag) -> bool {
        self.annotations.set_tag(id, tag)
    }

    pub fn delete(&mut self, id: AnnotationId) -> bool {
        let removed = self.annotations.remove(id).is_some();
        if removed && self.selected() == Some(id) {
            self.gesture = Gesture::Idle;
        }
        removed
    }

    /// Appends detector output to the set. Existing boxes are kept.
    pub fn append<I>(&mut self, boxes: I) -> usize
    where
        I: IntoIterator<Item = (egui::Rect, Tag)>,
    {
        let mut added = 0;
        for (rect, tag) in boxes {
            self.annotations.insert(rect, tag);
            added += 1;
        }
        added
    }

    /// Forgets every box and gesture, as when a new image is loaded.
    pub fn reset(&mut self) {
        self.annotations.clear();
        self.gesture = Gesture::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> Editor {
        Editor::new(EditorLimits::default())
    }

    fn draw(ed: &mut Editor, from: (f32, f32), to: (f32, f32)) -> Option<AnnotationId> {
        ed.pointer_down(egui::pos2(from.0, from.1), PointerTarget::Empty);
        ed.pointer_move(egui::pos2(to.0, to.1));
        ed.pointer_up()
    }

    fn rect(x: f32, y: f32, w: f32, h: f32) -> egui::Rect {
        egui::Rect::from_min_size(egui::pos2(x, y), egui::vec2(w, h))
    }

    #[test]
    fn small_draw_is_discarded() {
        let mut ed = editor();
        assert!(draw(&mut ed, (10.0, 10.0), (14.0, 13.0)).is_none());
        assert!(ed.annotations().is_empty());
        assert_eq!(*ed.gesture(), Gesture::Idle);
    }

    #[test]
    fn draw_creates_box() {
        let mut ed = editor();
        let id = draw(&mut ed, (10.0, 10.0), (100.0, 80.0)).unwrap();
        let ann = ed.annotations().get(id).unwrap();
        assert_eq!(ann.rect(), rect(10.0, 10.0, 90.0, 70.0));
        assert_eq!(ann.tag, Tag::Unassigned);
    }

    #[test]
    fn upward_draw_is_normalized() {
        let mut ed = editor();
        let id = draw(&mut ed, (100.0, 80.0), (10.0, 10.0)).unwrap();
        assert_eq!(ed.annotations().get(id).unwrap().rect(), rect(10.0, 10.0, 90.0, 70.0));
    }

    #[test]
    fn one_long_axis_is_enough() {
        let mut ed = editor();
        assert!(draw(&mut ed, (0.0, 0.0), (40.0, 2.0)).is_some());
    }

    #[test]
    fn draft_keeps_sign_while_drawing() {
        let mut ed = editor();
        ed.pointer_down(egui::pos2(50.0, 50.0), PointerTarget::Empty);
        ed.pointer_move(egui::pos2(20.0, 30.0));
        assert_eq!(
            *ed.gesture(),
            Gesture::Drawing {
                anchor: egui::pos2(50.0, 50.0),
                size: egui::vec2(-30.0, -20.0)
            }
        );
        assert!(ed.annotations().is_empty());
        assert_eq!(ed.draft(), Some(rect(20.0, 30.0, 30.0, 20.0)));
    }

    #[test]
    fn leaving_canvas_finishes_draw() {
        let mut ed = editor();
        let bounds = rect(0.0, 0.0, 200.0, 100.0);
        ed.pointer_down(egui::pos2(0.0, 0.0), PointerTarget::Empty);
        ed.pointer_move(egui::pos2(30.0, 30.0));
        let id = ed.pointer_leave(egui::pos2(30.0, 30.0), bounds).unwrap();
        assert_eq!(ed.annotations().get(id).unwrap().rect(), rect(0.0, 0.0, 30.0, 30.0));
    }

    #[test]
    fn draw_ending_outside_stops_at_image_edge() {
        let mut ed = editor();
        let bounds = rect(0.0, 0.0, 200.0, 100.0);
        ed.pointer_down(egui::pos2(150.0, 40.0), PointerTarget::Empty);
        ed.pointer_move(egui::pos2(190.0, 90.0));
        let id = ed.pointer_leave(egui::pos2(260.0, 130.0), bounds).unwrap();
        assert_eq!(ed.annotations().get(id).unwrap().rect(), rect(150.0, 40.0, 50.0, 60.0));
    }

    #[test]
    fn leaving_canvas_ignores_other_gestures() {
        let mut ed = editor();
        let id = draw(&mut ed, (10.0, 10.0), (60.0, 50.0)).unwrap();
        ed.select(Some(id));
        ed.pointer_down(egui::pos2(10.0, 30.0), PointerTarget::Shape(id));
        assert!(ed.pointer_leave(egui::pos2(500.0, 500.0), rect(0.0, 0.0, 200.0, 100.0)).is_none());
        assert!(matches!(ed.gesture(), Gesture::Dragging { .. }));
    }

    #[test]
    fn pointer_up_without_gesture_is_noop() {
        let mut ed = editor();
        draw(&mut ed, (0.0, 0.0), (30.0, 30.0));
        assert!(ed.pointer_up().is_none());
        assert_eq!(ed.annotations().len(), 1);
        assert_eq!(*ed.gesture(), Gesture::Idle);
    }

    #[test]
    fn press_on_empty_clears_selection() {
        let mut ed = editor();
        let id = draw(&mut ed, (0.0, 0.0), (30.0, 30.0)).unwrap();
        ed.select(Some(id));
        ed.pointer_down(egui::pos2(200.0, 200.0), PointerTarget::Empty);
        assert_eq!(ed.selected(), None);
    }

    #[test]
    fn click_on_shape_selects() {
        let mut ed = editor();
        let a = draw(&mut ed, (0.0, 0.0), (30.0, 30.0)).unwrap();
        let b = draw(&mut ed, (50.0, 50.0), (90.0, 90.0)).unwrap();
        ed.pointer_down(egui::pos2(0.0, 10.0), ed.hit_test(egui::pos2(0.0, 10.0), 4.0, 3.0));
        ed.pointer_up();
        assert_eq!(ed.selected(), Some(a));
        ed.pointer_down(egui::pos2(50.0, 70.0), PointerTarget::Shape(b));
        ed.pointer_up();
        assert_eq!(ed.selected(), Some(b));
        assert_eq!(ed.annotations().len(), 2);
    }

    #[test]
    fn handle_press_never_draws() {
        let mut ed = editor();
        let id = draw(&mut ed, (10.0, 10.0), (60.0, 50.0)).unwrap();
        ed.select(Some(id));
        let target = ed.hit_test(egui::pos2(60.0, 50.0), 4.0, 3.0);
        assert_eq!(target, PointerTarget::Handle(id, Handle::BottomRight));
        ed.pointer_down(egui::pos2(60.0, 50.0), target);
        assert!(matches!(ed.gesture(), Gesture::Resizing { .. }));
        ed.pointer_up();
        assert_eq!(ed.annotations().len(), 1);
        assert_eq!(ed.selected(), Some(id));
    }

    #[test]
    fn drag_moves_without_resizing() {
        let mut ed = editor();
        let id = draw(&mut ed, (10.0, 10.0), (60.0, 50.0)).unwrap();
        ed.select(Some(id));
        ed.pointer_down(egui::pos2(10.0, 30.0), PointerTarget::Shape(id));
        ed.pointer_move(egui::pos2(110.0, 130.0));
        // Not committed until release.
        assert_eq!(ed.annotations().get(id).unwrap().x, 10.0);
        ed.pointer_up();
        assert_eq!(ed.annotations().get(id).unwrap().rect(), rect(110.0, 110.0, 50.0, 40.0));
        assert_eq!(ed.selected(), Some(id));
    }

    #[test]
    fn unselected_shape_is_not_dragged() {
        let mut ed = editor();
        let id = draw(&mut ed, (10.0, 10.0), (60.0, 50.0)).unwrap();
        ed.pointer_down(egui::pos2(10.0, 30.0), PointerTarget::Shape(id));
        ed.pointer_move(egui::pos2(110.0, 130.0));
        ed.pointer_up();
        assert_eq!(ed.annotations().get(id).unwrap().rect(), rect(10.0, 10.0, 50.0, 40.0));
        assert_eq!(ed.selected(), Some(id));
    }

    #[test]
    fn resize_commits_scaled_size() {
        let mut ed = editor();
        let id = draw(&mut ed, (10.0, 10.0), (60.0, 50.0)).unwrap();
        ed.select(Some(id));
        ed.pointer_down(egui::pos2(60.0, 50.0), PointerTarget::Handle(id, Handle::BottomRight));
        ed.pointer_move(egui::pos2(110.0, 90.0));
        ed.pointer_up();
        assert_eq!(ed.annotations().get(id).unwrap().rect(), rect(10.0, 10.0, 100.0, 80.0));

        // A second resize starts from the committed box, not from the first one.
        ed.pointer_down(egui::pos2(10.0, 10.0), PointerTarget::Handle(id, Handle::TopLeft));
        ed.pointer_move(egui::pos2(60.0, 50.0));
        ed.pointer_up();
        assert_eq!(ed.annotations().get(id).unwrap().rect(), rect(60.0, 50.0, 50.0, 40.0));
    }

    #[test]
    fn resize_past_opposite_corner_keeps_it_pinned() {
        let mut ed = editor();
        let id = draw(&mut ed, (10.0, 10.0), (60.0, 50.0)).unwrap();
        ed.select(Some(id));
        ed.pointer_down(egui::pos2(60.0, 50.0), PointerTarget::Handle(id, Handle::BottomRight));
        ed.pointer_move(egui::pos2(0.0, 0.0));
        ed.pointer_move(egui::pos2(-20.0, -20.0));
        ed.pointer_up();
        let out = ed.annotations().get(id).unwrap().rect();
        assert_eq!(out.min, egui::pos2(-20.0, -20.0));
        assert!((out.max - egui::pos2(10.0, 10.0)).length() < 1e-4, "{out:?}");
    }

    #[test]
    fn undersized_resize_keeps_prior_box() {
        let mut ed = editor();
        let id = draw(&mut ed, (10.0, 10.0), (60.0, 50.0)).unwrap();
        ed.select(Some(id));
        ed.pointer_down(egui::pos2(60.0, 50.0), PointerTarget::Handle(id, Handle::BottomRight));
        ed.pointer_move(egui::pos2(12.0, 12.0));
        ed.pointer_up();
        assert_eq!(ed.annotations().get(id).unwrap().rect(), rect(10.0, 10.0, 50.0, 40.0));
    }

    #[test]
    fn deleting_selected_clears_selection() {
        let mut ed = editor();
        let a = draw(&mut ed, (0.0, 0.0), (30.0, 30.0)).unwrap();
        ed.select(Some(a));
        assert!(ed.delete(a));
        assert_eq!(ed.selected(), None);
    }

    #[test]
    fn deleting_other_keeps_selection() {
        let mut ed = editor();
        let a = draw(&mut ed, (0.0, 0.0), (30.0, 30.0)).unwrap();
        let b = draw(&mut ed, (50.0, 50.0), (90.0, 90.0)).unwrap();
        ed.select(Some(a));
        assert!(ed.delete(b));
        assert_eq!(ed.selected(), Some(a));
    }

    #[test]
    fn tag_change_only_touches_tag() {
        let mut ed = editor();
        let a = draw(&mut ed, (0.0, 0.0), (30.0, 30.0)).unwrap();
        let before = ed.annotations().get(a).unwrap().rect();
        assert!(ed.set_tag(a, Tag::Dropdown));
        let ann = ed.annotations().get(a).unwrap();
        assert_eq!(ann.tag, Tag::Dropdown);
        assert_eq!(ann.rect(), before);
    }

    #[test]
    fn draft_is_not_in_the_set() {
        let mut ed = editor();
        draw(&mut ed, (0.0, 0.0), (30.0, 30.0));
        ed.pointer_down(egui::pos2(100.0, 100.0), PointerTarget::Empty);
        ed.pointer_move(egui::pos2(200.0, 200.0));
        assert_eq!(ed.annotations().len(), 1);
    }

    #[test]
    fn append_keeps_existing() {
        let mut ed = editor();
        draw(&mut ed, (0.0, 0.0), (30.0, 30.0));
        let added = ed.append([
            (rect(5.0, 5.0, 20.0, 10.0), Tag::Button),
            (rect(40.0, 5.0, 20.0, 10.0), Tag::Input),
        ]);
        assert_eq!(added, 2);
        assert_eq!(ed.annotations().len(), 3);
    }

    #[test]
    fn reset_empties_everything() {
        let mut ed = editor();
        let a = draw(&mut ed, (0.0, 0.0), (30.0, 30.0)).unwrap();
        ed.select(Some(a));
        ed.reset();
        assert!(ed.annotations().is_empty());
        assert_eq!(ed.selected(), None);
    }
}
