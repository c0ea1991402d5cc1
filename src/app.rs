use eframe::egui;
use egui_extras::{Column, TableBuilder};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{self, ApiClient, Prediction, SaveRequest};
use crate::config::AnnotatorConfig;
use crate::editor::{Editor, Gesture, PointerTarget};
use crate::error::ApiError;
use crate::geometry::{Handle, ViewTransform};
use crate::model::{AnnotationId, Tag};
use crate::session::{self, ImageSession, SelectedFile};
use crate::worker::{Worker, WorkerEvent};

pub const APP_TITLE: &str = "UI Element Annotator";

/// Pointer distance from an outline, in screen points, that still counts as
/// a hit on the box.
const OUTLINE_TOLERANCE: f32 = 5.0;
const PANEL_WIDTH: f32 = 320.0;
const DRAFT_COLOR: egui::Color32 = egui::Color32::from_rgb(0, 0, 255);

// ── Notices ─────────────────────────────────────────────────────────────────

struct Notice {
    title: &'static str,
    body: String,
}

/// Request bookkeeping behind the toolbar spinner, the status line and the
/// notice modal.
struct Activity {
    in_flight: usize,
    status: String,
    notices: VecDeque<Notice>,
}

impl Activity {
    fn new(status: impl Into<String>) -> Self {
        Self {
            in_flight: 0,
            status: status.into(),
            notices: VecDeque::new(),
        }
    }

    fn notify(&mut self, title: &'static str, body: impl Into<String>) {
        self.notices.push_back(Notice {
            title,
            body: body.into(),
        });
    }

    /// Records a request handed to the worker. Only a request whose thread
    /// actually started counts as in flight.
    fn dispatched(&mut self, started: Result<(), ApiError>, busy: String, failure: &'static str) {
        match started {
            Ok(()) => {
                self.in_flight += 1;
                self.status = busy;
            }
            Err(err) => {
                log::error!("{failure}: {err}");
                self.status = failure.to_string();
                self.notify(failure, err.user_message());
            }
        }
    }

    fn finished(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}

enum ListAction {
    Select(AnnotationId),
    Retag(AnnotationId, Tag),
    Delete(AnnotationId),
}

// ── App ─────────────────────────────────────────────────────────────────────

pub struct AnnotatorApp {
    config: AnnotatorConfig,
    worker: Worker,
    editor: Editor,
    session: Option<ImageSession>,

    /// Generation handed to the most recent upload request.
    latest_upload: u64,
    activity: Activity,
}

impl AnnotatorApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: AnnotatorConfig,
        startup_image: Option<PathBuf>,
    ) -> Result<Self, ApiError> {
        let client = ApiClient::new(
            &config.server_url,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        log::info!("Using annotation server at {}", config.server_url);

        let mut app = Self {
            editor: Editor::new(config.editor_limits()),
            worker: Worker::new(client, cc.egui_ctx.clone()),
            config,
            session: None,
            latest_upload: 0,
            activity: Activity::new("Open an image to start annotating"),
        };
        if let Some(path) = startup_image {
            app.open_path(&path);
        }
        Ok(app)
    }

    // ── Commands ────────────────────────────────────────────────────────────

    fn open_dialog(&mut self) {
        if let Some(path) = session::pick_image() {
            self.open_path(&path);
        }
    }

    fn open_path(&mut self, path: &Path) {
        match SelectedFile::read(path) {
            Ok(file) => {
                let generation = self.latest_upload + 1;
                let busy = format!("Uploading {}…", file.name);
                let started = self.worker.upload(generation, file);
                if started.is_ok() {
                    self.latest_upload = generation;
                }
                self.activity.dispatched(started, busy, "Upload failed");
            }
            Err(err) => {
                log::error!("{err}");
                self.activity.notify("Upload failed", format!("Failed to upload image\n\n{err}"));
            }
        }
    }

    fn predict(&mut self) {
        let Some(session) = &self.session else {
            self.activity.notify("No image", "Please upload an image first");
            return;
        };
        let started = self.worker.predict(session.generation, session.file.clone());
        let busy = format!("Detecting UI elements in {}…", session.file.name);
        self.activity.dispatched(started, busy, "Detection failed");
    }

    fn save(&mut self) {
        let Some(session) = &self.session else {
            self.activity.notify("No image", "Please upload an image first");
            return;
        };
        let request = SaveRequest::new(
            session.file.save_name(),
            self.editor.annotations(),
            session.natural_size(),
        );
        let started = self.worker.save(request);
        self.activity
            .dispatched(started, "Saving annotations…".to_string(), "Save failed");
    }

    // ── Request results ─────────────────────────────────────────────────────

    fn handle_worker_events(&mut self, ctx: &egui::Context) {
        for event in self.worker.poll() {
            self.activity.finished();
            match event {
                WorkerEvent::Uploaded {
                    generation,
                    file,
                    result,
                } => {
                    if generation != self.latest_upload {
                        log::info!("Ignoring upload of {} superseded by a newer one", file.name);
                        continue;
                    }
                    match result {
                        Ok(uploaded) => {
                            let session = ImageSession::new(
                                ctx,
                                generation,
                                file,
                                &uploaded.image,
                                ctx.screen_rect().size(),
                                &self.config.scale_params(),
                            );
                            self.activity.status = match uploaded.remote_size {
                                Some([w, h]) => format!(
                                    "Uploaded as {} (server copy {}x{})",
                                    uploaded.remote_name, w, h
                                ),
                                None => format!("Uploaded as {}", uploaded.remote_name),
                            };
                            ctx.send_viewport_cmd(egui::ViewportCommand::Title(format!(
                                "{APP_TITLE} — {}",
                                session.file.path.display()
                            )));
                            install_session(&mut self.editor, &mut self.session, session);
                        }
                        Err(err) => {
                            log::error!("Error uploading image: {err}");
                            self.activity.status = "Upload failed".to_string();
                            self.activity.notify("Upload failed", "Failed to upload image");
                        }
                    }
                }
                WorkerEvent::Predicted { generation, result } => {
                    if self.session.as_ref().map(|s| s.generation) != Some(generation) {
                        log::info!("Dropping predictions for an image that is no longer open");
                        continue;
                    }
                    match result {
                        Ok(reply) => {
                            for p in &reply.predictions {
                                log::debug!("Predicted {} '{}' at {:?}", p.kind, p.text, p.coordinates);
                            }
                            let added = self
                                .editor
                                .append(reply.predictions.iter().map(Prediction::to_box));
                            log::info!("Added {added} predicted boxes for {}", reply.filename);
                            self.activity.status = format!("Detected {added} UI elements");
                            self.activity.notify(
                                "Detection finished",
                                format!("UI elements detected successfully! ({added} added)"),
                            );
                        }
                        Err(err) => {
                            log::error!("Error predicting UI elements: {err}");
                            self.activity.status = "Detection failed".to_string();
                            self.activity.notify("Detection failed", api::describe_predict_failure(&err));
                        }
                    }
                }
                WorkerEvent::Saved { result } => match result {
                    Ok(reply) => {
                        self.activity.status = format!("Saved {}", reply.filename);
                        self.activity.notify("Saved", "Annotations saved successfully!");
                    }
                    Err(err) => {
                        log::error!("Error saving annotations: {err}");
                        self.activity.status = "Save failed".to_string();
                        self.activity.notify("Save failed", "Failed to save annotations");
                    }
                },
            }
        }
    }

    // ── Panels ──────────────────────────────────────────────────────────────

    fn toolbar_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Open image…").clicked() {
                self.open_dialog();
            }
            if ui.button("Predict").clicked() {
                self.predict();
            }
            if ui.button("Save Annotations").clicked() {
                self.save();
            }
            ui.separator();
            if self.activity.in_flight > 0 {
                ui.spinner();
            }
            ui.label(&self.activity.status);
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if let Some(session) = &self.session {
                    ui.label(format!("Scale: {:.0}%", session.scale() * 100.0));
                    ui.separator();
                    ui.label(format!("{} annotations", self.editor.annotations().len()));
                }
            });
        });
    }

    fn annotation_list_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Annotations");
        ui.separator();
        if self.editor.annotations().is_empty() {
            ui.weak("Drag on the image to draw a box, or use Predict.");
            return;
        }

        let selected = self.editor.selected();
        let mut actions = Vec::new();
        TableBuilder::new(ui)
            .striped(true)
            .cell_layout(egui::Layout::left_to_right(egui::Align::Center))
            .column(Column::exact(36.0))
            .column(Column::remainder().at_least(110.0))
            .column(Column::auto())
            .column(Column::auto())
            .header(20.0, |mut header| {
                header.col(|ui| {
                    ui.strong("#");
                });
                header.col(|ui| {
                    ui.strong("Tag");
                });
                header.col(|ui| {
                    ui.strong("Size");
                });
                header.col(|_| {});
            })
            .body(|mut body| {
                for (idx, ann) in self.editor.annotations().iter().enumerate() {
                    let is_selected = selected == Some(ann.id);
                    body.row(26.0, |mut row| {
                        row.set_selected(is_selected);
                        row.col(|ui| {
                            if ui.selectable_label(is_selected, format!("{}", idx + 1)).clicked() {
                                actions.push(ListAction::Select(ann.id));
                            }
                        });
                        row.col(|ui| {
                            let mut tag = ann.tag;
                            egui::ComboBox::from_id_salt(("tag", ann.id))
                                .selected_text(
                                    egui::RichText::new(tag.label()).color(tag.color()),
                                )
                                .show_ui(ui, |ui| {
                                    for option in Tag::ALL {
                                        ui.selectable_value(&mut tag, option, option.label());
                                    }
                                });
                            if tag != ann.tag {
                                actions.push(ListAction::Retag(ann.id, tag));
                            }
                        });
                        row.col(|ui| {
                            ui.label(format!("{:.0}×{:.0}", ann.width, ann.height));
                        });
                        row.col(|ui| {
                            if ui.button("Delete").clicked() {
                                actions.push(ListAction::Delete(ann.id));
                            }
                        });
                    });
                }
            });

        for action in actions {
            match action {
                ListAction::Select(id) => self.editor.select(Some(id)),
                ListAction::Retag(id, tag) => {
                    self.editor.set_tag(id, tag);
                    self.editor.select(Some(id));
                }
                ListAction::Delete(id) => {
                    self.editor.delete(id);
                }
            }
        }
    }

    fn canvas_ui(&mut self, ui: &mut egui::Ui) {
        let Some(session) = &self.session else {
            ui.centered_and_justified(|ui| {
                ui.label("Please upload an image to start annotating");
            });
            return;
        };

        let scale = session.scale();
        let (response, painter) = ui.allocate_painter(
            session.natural_size_vec() * scale,
            egui::Sense::click_and_drag(),
        );
        let canvas_rect = response.rect;
        let view = ViewTransform {
            origin: canvas_rect.min,
            scale,
        };

        painter.image(
            session.texture().id(),
            canvas_rect,
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            egui::Color32::WHITE,
        );

        let image_bounds = egui::Rect::from_min_size(egui::Pos2::ZERO, session.natural_size_vec());
        let handle_half = view.screen_len(self.config.handle_size * 0.5);
        let tolerance = view.screen_len(OUTLINE_TOLERANCE);

        // Hover feedback
        if let Some(pos) = response.hover_pos() {
            let icon = match self.editor.gesture() {
                Gesture::Resizing { handle, .. } => Some(handle.cursor()),
                Gesture::Dragging { .. } => Some(egui::CursorIcon::Grabbing),
                Gesture::Drawing { .. } => Some(egui::CursorIcon::Crosshair),
                Gesture::Idle | Gesture::Selected { .. } => {
                    match self.editor.hit_test(view.screen_to_image(pos), handle_half, tolerance) {
                        PointerTarget::Handle(_, handle) => Some(handle.cursor()),
                        PointerTarget::Shape(id) if self.editor.selected() == Some(id) => {
                            Some(egui::CursorIcon::Grab)
                        }
                        PointerTarget::Shape(_) => Some(egui::CursorIcon::PointingHand),
                        PointerTarget::Empty => None,
                    }
                }
            };
            if let Some(icon) = icon {
                ui.ctx().set_cursor_icon(icon);
            }
        }

        // Pointer gestures
        if response.drag_started_by(egui::PointerButton::Primary) {
            let press = ui
                .input(|i| i.pointer.press_origin())
                .or(response.interact_pointer_pos());
            if let Some(pos) = press {
                let img = view.screen_to_image(pos);
                let target = self.editor.hit_test(img, handle_half, tolerance);
                self.editor.pointer_down(img, target);
            }
        }

        if response.dragged_by(egui::PointerButton::Primary) {
            if let Some(pos) = response.interact_pointer_pos() {
                let img = view.screen_to_image(pos);
                if !canvas_rect.contains(pos) && self.editor.draft().is_some() {
                    self.editor.pointer_leave(img, image_bounds);
                } else {
                    self.editor.pointer_move(img);
                }
            }
        }

        if response.drag_stopped_by(egui::PointerButton::Primary) {
            self.editor.pointer_up();
        }

        if response.clicked_by(egui::PointerButton::Primary) {
            if let Some(pos) = response.interact_pointer_pos() {
                let img = view.screen_to_image(pos);
                let target = self.editor.hit_test(img, handle_half, tolerance);
                self.editor.pointer_down(img, target);
                self.editor.pointer_up();
            }
        }

        self.paint_annotations(&painter, &view);
    }

    fn paint_annotations(&self, painter: &egui::Painter, view: &ViewTransform) {
        let selected = self.editor.selected();

        for ann in self.editor.annotations().iter() {
            let rect = view.rect_to_screen(self.editor.display_rect(ann));
            let color = ann.tag.color();
            if selected == Some(ann.id) {
                let corners = [
                    rect.left_top(),
                    rect.right_top(),
                    rect.right_bottom(),
                    rect.left_bottom(),
                    rect.left_top(),
                ];
                painter.extend(egui::Shape::dashed_line(
                    &corners,
                    egui::Stroke::new(3.0, color),
                    5.0,
                    5.0,
                ));
            } else {
                painter.rect_stroke(
                    rect,
                    0.0,
                    egui::Stroke::new(2.0, color),
                    egui::StrokeKind::Middle,
                );
            }
            if ann.tag != Tag::Unassigned {
                painter.text(
                    rect.left_top() - egui::vec2(0.0, 4.0),
                    egui::Align2::LEFT_BOTTOM,
                    ann.tag.as_str(),
                    egui::FontId::proportional(16.0),
                    color,
                );
            }
        }

        if let Some(draft) = self.editor.draft() {
            painter.rect_stroke(
                view.rect_to_screen(draft),
                0.0,
                egui::Stroke::new(2.0, DRAFT_COLOR),
                egui::StrokeKind::Middle,
            );
        }

        // Resize handles
        let selected_rect = selected
            .and_then(|id| self.editor.annotations().get(id))
            .map(|ann| view.rect_to_screen(self.editor.display_rect(ann)));
        if let Some(rect) = selected_rect {
            for handle in Handle::ALL {
                painter.rect(
                    egui::Rect::from_center_size(
                        handle.corner(rect),
                        egui::Vec2::splat(self.config.handle_size),
                    ),
                    0.0,
                    egui::Color32::WHITE,
                    egui::Stroke::new(1.0, egui::Color32::from_rgb(0, 120, 255)),
                    egui::StrokeKind::Middle,
                );
            }
        }
    }

    fn notice_ui(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.activity.notices.front() else {
            return;
        };
        let mut dismiss = false;
        let modal = egui::Modal::new(egui::Id::new("notice")).show(ctx, |ui| {
            ui.set_max_width(420.0);
            ui.heading(notice.title);
            ui.add_space(6.0);
            ui.label(&notice.body);
            ui.add_space(10.0);
            if ui.button("OK").clicked() {
                dismiss = true;
            }
        });
        if dismiss || modal.should_close() {
            self.activity.notices.pop_front();
        }
    }
}

/// Makes `session` the open image. Boxes and selection from the previous
/// image never carry over.
fn install_session(editor: &mut Editor, slot: &mut Option<ImageSession>, session: ImageSession) {
    editor.reset();
    *slot = Some(session);
}

// ── eframe App impl ────────────────────────────────────────────────────────

impl eframe::App for AnnotatorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_worker_events(ctx);

        let params = self.config.scale_params();
        if let Some(session) = &mut self.session {
            session.refit(ctx.screen_rect().size(), &params);
        }

        // Keyboard shortcuts, suspended while a notice is showing
        if self.activity.notices.is_empty() {
            let (delete, escape, save, open) = ctx.input(|i| {
                (
                    i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace),
                    i.key_pressed(egui::Key::Escape),
                    i.modifiers.command && i.key_pressed(egui::Key::S),
                    i.modifiers.command && i.key_pressed(egui::Key::O),
                )
            });
            if delete {
                if let Some(id) = self.editor.selected() {
                    self.editor.delete(id);
                }
            }
            if escape {
                self.editor.select(None);
            }
            if save {
                self.save();
            }
            if open {
                self.open_dialog();
            }
        }

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.toolbar_ui(ui);
        });

        egui::SidePanel::right("annotations")
            .resizable(false)
            .exact_width(PANEL_WIDTH)
            .show(ctx, |ui| {
                self.annotation_list_ui(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::both().drag_to_scroll(false).show(ui, |ui| {
                self.canvas_ui(ui);
            });
        });

        self.notice_ui(ctx);
    }
}
