use eframe::egui;
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ApiError;
use crate::geometry::{self, ScaleParams};

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Name used for the saved label set when the picked file had no usable name.
const FALLBACK_NAME: &str = "image.png";

// ── Selected file ───────────────────────────────────────────────────────────

/// The image file the user picked, kept in memory so later predict calls
/// resend exactly what was uploaded.
#[derive(Clone, Debug)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl SelectedFile {
    pub fn read(path: &Path) -> Result<Self, ApiError> {
        let bytes = std::fs::read(path).map_err(|source| ApiError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        Ok(Self {
            path: path.to_path_buf(),
            name,
            bytes: bytes.into(),
        })
    }

    /// Target name for the save call: the picked file's own name, extension
    /// included.
    pub fn save_name(&self) -> String {
        save_filename(&self.name)
    }
}

pub fn save_filename(original: &str) -> String {
    let name = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name.to_string()
    }
}

pub fn pick_image() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter("Images", IMAGE_EXTENSIONS)
        .pick_file()
}

// ── Image session ───────────────────────────────────────────────────────────

pub struct ImageSession {
    /// Bumped for every upload so late replies for an older image can be
    /// recognised and dropped.
    pub generation: u64,
    pub file: SelectedFile,
    size: [u32; 2],
    scale: f32,
    viewport: egui::Vec2,
    texture: egui::TextureHandle,
}

impl ImageSession {
    pub fn new(
        ctx: &egui::Context,
        generation: u64,
        file: SelectedFile,
        image: &RgbaImage,
        viewport: egui::Vec2,
        params: &ScaleParams,
    ) -> Self {
        let size = [image.width(), image.height()];
        let pixels = image.as_flat_samples();
        let color_image = egui::ColorImage::from_rgba_unmultiplied(
            [size[0] as usize, size[1] as usize],
            pixels.as_slice(),
        );
        let texture = ctx.load_texture(
            format!("image-{generation}"),
            color_image,
            egui::TextureOptions::LINEAR,
        );
        let natural = egui::vec2(size[0] as f32, size[1] as f32);
        let scale = geometry::fit_scale(natural, viewport, params);
        log::info!(
            "Loaded {} ({}x{}), display scale {:.3}",
            file.name,
            size[0],
            size[1],
            scale
        );
        Self {
            generation,
            file,
            size,
            scale,
            viewport,
            texture,
        }
    }

    pub fn natural_size(&self) -> [u32; 2] {
        self.size
    }

    pub fn natural_size_vec(&self) -> egui::Vec2 {
        egui::vec2(self.size[0] as f32, self.size[1] as f32)
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn texture(&self) -> &egui::TextureHandle {
        &self.texture
    }

    /// Recomputes the scale when the viewport changed size. Returns true if
    /// the scale was updated.
    pub fn refit(&mut self, viewport: egui::Vec2, params: &ScaleParams) -> bool {
        if viewport == self.viewport {
            return false;
        }
        self.viewport = viewport;
        let scale = geometry::fit_scale(self.natural_size_vec(), viewport, params);
        let changed = scale != self.scale;
        if changed {
            log::debug!("Viewport {viewport:?}, display scale {scale:.3}");
            self.scale = scale;
        }
        changed
    }
}
