use eframe::egui;

/// Lower bound for the display scale so the inverse transform stays finite
/// when the window is smaller than the reserved margins.
pub const MIN_SCALE: f32 = 0.05;

// ── Scale ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleParams {
    /// Horizontal space kept free for the side panel and padding.
    pub reserved_width: f32,
    pub reserved_height: f32,
    pub max_scale: f32,
}

/// Scale that fits an image of `image_size` into `viewport` after the
/// reserved margins are subtracted, capped at `max_scale`.
pub fn fit_scale(image_size: egui::Vec2, viewport: egui::Vec2, params: &ScaleParams) -> f32 {
    if image_size.x <= 0.0 || image_size.y <= 0.0 {
        return MIN_SCALE;
    }
    let available_w = viewport.x - params.reserved_width;
    let available_h = viewport.y - params.reserved_height;
    let scale = (available_w / image_size.x)
        .min(available_h / image_size.y)
        .min(params.max_scale);
    scale.max(MIN_SCALE)
}

// ── View transform ──────────────────────────────────────────────────────────

/// Maps image-pixel space onto the canvas: the image's top-left corner sits
/// at `origin` and every image pixel covers `scale` screen points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub origin: egui::Pos2,
    pub scale: f32,
}

impl ViewTransform {
    pub fn image_to_screen(&self, img_pos: egui::Pos2) -> egui::Pos2 {
        self.origin + img_pos.to_vec2() * self.scale
    }

    pub fn screen_to_image(&self, screen_pos: egui::Pos2) -> egui::Pos2 {
        ((screen_pos - self.origin) / self.scale).to_pos2()
    }

    pub fn rect_to_screen(&self, rect: egui::Rect) -> egui::Rect {
        egui::Rect::from_two_pos(
            self.image_to_screen(rect.min),
            self.image_to_screen(rect.max),
        )
    }

    /// Converts a length in screen points into image pixels.
    pub fn screen_len(&self, len: f32) -> f32 {
        len / self.scale
    }
}

// ── Boxes ───────────────────────────────────────────────────────────────────

/// Builds the box spanned by a signed drag from `anchor`.
pub fn signed_rect(anchor: egui::Pos2, size: egui::Vec2) -> egui::Rect {
    egui::Rect::from_two_pos(anchor, anchor + size)
}

/// Swaps min/max per axis where a drag went up or left.
pub fn normalized(rect: egui::Rect) -> egui::Rect {
    egui::Rect::from_two_pos(rect.min, rect.max)
}

pub fn meets_min_size(rect: egui::Rect, min: f32) -> bool {
    rect.width() >= min && rect.height() >= min
}

/// True when a pointer lies on the outline of `rect`, within `tolerance`
/// on either side of the edge.
pub fn on_outline(rect: egui::Rect, pos: egui::Pos2, tolerance: f32) -> bool {
    let outer = rect.expand(tolerance);
    let inner = rect.shrink(tolerance);
    outer.contains(pos) && !(inner.is_positive() && inner.contains(pos))
}

// ── Resize handles ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Handle {
    pub const ALL: [Handle; 4] = [
        Handle::TopLeft,
        Handle::TopRight,
        Handle::BottomLeft,
        Handle::BottomRight,
    ];

    pub fn corner(self, rect: egui::Rect) -> egui::Pos2 {
        match self {
            Handle::TopLeft => rect.left_top(),
            Handle::TopRight => rect.right_top(),
            Handle::BottomLeft => rect.left_bottom(),
            Handle::BottomRight => rect.right_bottom(),
        }
    }

    /// Corner that stays put while this handle is dragged.
    pub fn opposite(self, rect: egui::Rect) -> egui::Pos2 {
        match self {
            Handle::TopLeft => rect.right_bottom(),
            Handle::TopRight => rect.left_bottom(),
            Handle::BottomLeft => rect.right_top(),
            Handle::BottomRight => rect.left_top(),
        }
    }

    pub fn cursor(self) -> egui::CursorIcon {
        match self {
            Handle::TopLeft | Handle::BottomRight => egui::CursorIcon::ResizeNwSe,
            Handle::TopRight | Handle::BottomLeft => egui::CursorIcon::ResizeNeSw,
        }
    }
}

/// Finds the handle of `rect` under `pos`. `half_size` is half the handle's
/// edge length in the same space as `rect`.
pub fn hit_handle(rect: egui::Rect, pos: egui::Pos2, half_size: f32) -> Option<Handle> {
    Handle::ALL.into_iter().find(|h| {
        egui::Rect::from_center_size(h.corner(rect), egui::Vec2::splat(half_size * 2.0))
            .contains(pos)
    })
}

/// Proposes the box spanned by the `pinned` corner and `pos`. `pinned` must
/// be taken from the box as it was when the resize started, since the handle
/// may cross it. A proposal smaller than `min` in either axis is rejected and
/// `current` is returned unchanged.
pub fn resize_box(current: egui::Rect, pinned: egui::Pos2, pos: egui::Pos2, min: f32) -> egui::Rect {
    let proposed = egui::Rect::from_two_pos(pinned, pos);
    if meets_min_size(proposed, min) {
        proposed
    } else {
        current
    }
}

/// Per-axis scale a resize applied to `base` to reach `current`.
pub fn applied_scale(base: egui::Rect, current: egui::Rect) -> egui::Vec2 {
    let sx = if base.width() > 0.0 { current.width() / base.width() } else { 1.0 };
    let sy = if base.height() > 0.0 { current.height() / base.height() } else { 1.0 };
    egui::vec2(sx, sy)
}
