use eframe::egui;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Tags ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    #[default]
    #[serde(rename = "")]
    Unassigned,
    Button,
    Input,
    Radio,
    Dropdown,
}

impl Tag {
    pub const ALL: [Tag; 5] = [
        Tag::Unassigned,
        Tag::Button,
        Tag::Input,
        Tag::Radio,
        Tag::Dropdown,
    ];

    /// Value used on the wire and drawn next to the box.
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Unassigned => "",
            Tag::Button => "button",
            Tag::Input => "input",
            Tag::Radio => "radio",
            Tag::Dropdown => "dropdown",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tag::Unassigned => "Select tag",
            Tag::Button => "Button",
            Tag::Input => "Input",
            Tag::Radio => "Radio",
            Tag::Dropdown => "Dropdown",
        }
    }

    /// Case-insensitive lookup of a detector label. Returns `None` for labels
    /// outside the fixed set.
    pub fn parse(raw: &str) -> Option<Tag> {
        let lowered = raw.trim().to_lowercase();
        Tag::ALL.into_iter().find(|t| t.as_str() == lowered)
    }

    pub fn color(self) -> egui::Color32 {
        match self {
            Tag::Button => egui::Color32::from_rgb(0xFF, 0x44, 0x44),
            Tag::Input => egui::Color32::from_rgb(0x44, 0xFF, 0x44),
            Tag::Radio => egui::Color32::from_rgb(0x44, 0x44, 0xFF),
            Tag::Dropdown => egui::Color32::from_rgb(0xFF, 0x44, 0xFF),
            Tag::Unassigned => egui::Color32::from_rgb(0xFF, 0xA5, 0x00),
        }
    }
}

// ── Annotations ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationId(u64);

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A labelled box in image-pixel space. Stored boxes always have
/// non-negative width and height.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub id: AnnotationId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub tag: Tag,
}

impl Annotation {
    pub fn rect(&self) -> egui::Rect {
        egui::Rect::from_min_size(
            egui::pos2(self.x, self.y),
            egui::vec2(self.width, self.height),
        )
    }

    fn set_rect(&mut self, rect: egui::Rect) {
        self.x = rect.min.x;
        self.y = rect.min.y;
        self.width = rect.width();
        self.height = rect.height();
    }
}

#[derive(Debug, Default)]
pub struct AnnotationSet {
    items: Vec<Annotation>,
    next_id: u64,
}

impl AnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Annotation> {
        self.items.iter()
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.items.iter().find(|a| a.id == id)
    }

    pub fn contains(&self, id: AnnotationId) -> bool {
        self.get(id).is_some()
    }

    /// Appends a box with a fresh identifier. `rect` may have been built from
    /// a signed drag and is normalized before it is stored.
    pub fn insert(&mut self, rect: egui::Rect, tag: Tag) -> AnnotationId {
        self.next_id += 1;
        let id = AnnotationId(self.next_id);
        let mut ann = Annotation {
            id,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            tag,
        };
        ann.set_rect(crate::geometry::normalized(rect));
        self.items.push(ann);
        id
    }

    pub fn remove(&mut self, id: AnnotationId) -> Option<Annotation> {
        let idx = self.items.iter().position(|a| a.id == id)?;
        Some(self.items.remove(idx))
    }

    pub fn set_tag(&mut self, id: AnnotationId, tag: Tag) -> bool {
        match self.items.iter_mut().find(|a| a.id == id) {
            Some(ann) => {
                ann.tag = tag;
                true
            }
            None => false,
        }
    }

    pub fn set_rect(&mut self, id: AnnotationId, rect: egui::Rect) -> bool {
        match self.items.iter_mut().find(|a| a.id == id) {
            Some(ann) => {
                ann.set_rect(crate::geometry::normalized(rect));
                true
            }
            None => false,
        }
    }

    /// Drops every box. Identifiers keep counting up so ids from a previous
    /// image are never reused.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
