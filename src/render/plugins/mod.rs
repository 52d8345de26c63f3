pub mod clock;
pub mod info;
pub mod photo;
pub mod sensors;
pub mod text;

use chrono::NaiveDateTime;
use tiny_skia::{Paint, Pixmap, Rect, Transform};

use crate::content::ContentSnapshot;
use crate::render::RenderError;
use crate::render::plugins::text::TextRenderer;

/// Rectangular zone of the frame, in panel pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Area {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Area {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Trait for region renderer plugins
pub trait RegionRenderer {
    /// Draw this region of the frame. Must not depend on anything but the arguments.
    fn render(
        &self,
        snapshot: &ContentSnapshot,
        now: NaiveDateTime,
        text: &TextRenderer,
        target: &mut Pixmap,
        area: Area,
    ) -> Result<(), RenderError>;
}

/// Fill a rectangle with a gray level. Empty or off-canvas rectangles are ignored.
pub fn fill(target: &mut Pixmap, x: i32, y: i32, width: u32, height: u32, shade: u8) {
    let Some(rect) = Rect::from_xywh(x as f32, y as f32, width as f32, height as f32) else {
        return;
    };
    let mut paint = Paint::default();
    paint.set_color_rgba8(shade, shade, shade, 255);
    paint.anti_alias = false;
    target.fill_rect(rect, &paint, Transform::identity(), None);
}

/// Rectangle outline `thickness` pixels wide, drawn inside `area`
pub fn outline(target: &mut Pixmap, area: Area, thickness: u32, shade: u8) {
    let t = thickness.min(area.width / 2).min(area.height / 2);
    fill(target, area.x, area.y, area.width, t, shade);
    fill(target, area.x, area.y + (area.height - t) as i32, area.width, t, shade);
    fill(target, area.x, area.y, t, area.height, shade);
    fill(target, area.x + (area.width - t) as i32, area.y, t, area.height, shade);
}

/// Shorten `s` to `max` characters, ending in "..." when cut
pub fn ellipsize(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
