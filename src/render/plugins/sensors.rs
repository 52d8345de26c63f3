/// Sensor table region: one "label ... value" row per configured reading.
use chrono::NaiveDateTime;
use tiny_skia::Pixmap;

use crate::content::ContentSnapshot;
use crate::render::RenderError;
use crate::render::plugins::text::TextRenderer;
use crate::render::plugins::{Area, RegionRenderer, fill};

const ROW_SIZE: f32 = 24.0;
const MAX_ROW_HEIGHT: u32 = 48;
const MARGIN: i32 = 20;

/// Label shown on the panel and the snapshot field holding the formatted value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorRow {
    pub label: String,
    pub field: String,
}

pub struct SensorRegion {
    rows: Vec<SensorRow>,
}

impl SensorRegion {
    pub fn new(rows: Vec<SensorRow>) -> Self {
        Self { rows }
    }
}

impl RegionRenderer for SensorRegion {
    fn render(
        &self,
        snapshot: &ContentSnapshot,
        _now: NaiveDateTime,
        text: &TextRenderer,
        target: &mut Pixmap,
        area: Area,
    ) -> Result<(), RenderError> {
        if self.rows.is_empty() {
            return Ok(());
        }
        fill(target, area.x + 10, area.y, area.width.saturating_sub(20), 2, 0);

        let row_height = (area.height / self.rows.len() as u32).min(MAX_ROW_HEIGHT) as i32;
        let text_offset = (row_height - text.line_height(ROW_SIZE) as i32).max(0) / 2;

        for (i, row) in self.rows.iter().enumerate() {
            let y = area.y + 6 + i as i32 * row_height + text_offset;
            let value = snapshot
                .field(&row.field)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "--".to_string());

            text.draw(target, &row.label, ROW_SIZE, area.x + MARGIN, y, 0);
            let value_x = area.x + area.width as i32 - MARGIN - text.measure(&value, ROW_SIZE) as i32;
            text.draw(target, &value, ROW_SIZE, value_x, y, 0);
        }
        Ok(())
    }
}
