/// Photo information strip: separator, filename, capture date and the update stamp.
use chrono::NaiveDateTime;
use tiny_skia::Pixmap;

use crate::content::{ContentSnapshot, FieldValue};
use crate::render::RenderError;
use crate::render::plugins::text::TextRenderer;
use crate::render::plugins::{Area, RegionRenderer, ellipsize, fill};

const FILENAME_SIZE: f32 = 24.0;
const DETAIL_SIZE: f32 = 18.0;
const MAX_FILENAME_CHARS: usize = 30;

pub struct InfoStrip;

impl RegionRenderer for InfoStrip {
    fn render(
        &self,
        snapshot: &ContentSnapshot,
        now: NaiveDateTime,
        text: &TextRenderer,
        target: &mut Pixmap,
        area: Area,
    ) -> Result<(), RenderError> {
        fill(target, area.x + 10, area.y + 8, area.width.saturating_sub(20), 2, 0);

        let filename = snapshot
            .field("filename")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        text.draw_centered(
            target,
            &ellipsize(&filename, MAX_FILENAME_CHARS),
            FILENAME_SIZE,
            area,
            16,
            0,
        );

        if let Some(FieldValue::Time(created)) = snapshot.field("created") {
            let date = created.format("%B %d, %Y").to_string();
            text.draw_centered(target, &date, DETAIL_SIZE, area, 44, 0);
        }

        let updated = now.format("Updated: %I:%M %p").to_string();
        text.draw_centered(target, &updated, DETAIL_SIZE, area, 70, 0);
        Ok(())
    }
}
