/// Clock region plugin.
/// Large HH:MM time with the date underneath.
use chrono::NaiveDateTime;
use tiny_skia::Pixmap;

use crate::content::ContentSnapshot;
use crate::render::RenderError;
use crate::render::plugins::text::TextRenderer;
use crate::render::plugins::{Area, RegionRenderer};

const DATE_SIZE: f32 = 24.0;

pub struct ClockRegion;

impl RegionRenderer for ClockRegion {
    fn render(
        &self,
        _snapshot: &ContentSnapshot,
        now: NaiveDateTime,
        text: &TextRenderer,
        target: &mut Pixmap,
        area: Area,
    ) -> Result<(), RenderError> {
        let time_size = (area.height as f32 * 0.55).max(DATE_SIZE);
        let time_str = now.format("%H:%M").to_string();
        let date_str = now.format("%A, %B %d").to_string();

        let time_height = text.line_height(time_size) as i32;
        text.draw_centered(target, &time_str, time_size, area, 8, 0);
        text.draw_centered(target, &date_str, DATE_SIZE, area, 8 + time_height + 4, 0);
        Ok(())
    }
}
