/// Render stage: composes a full panel frame from a snapshot and the wall-clock time.
/// Output depends only on the snapshot and the minute of `now`.
use chrono::NaiveDateTime;
use tiny_skia::{Color, Pixmap};

use crate::content::ContentSnapshot;
use crate::core::detector::truncate_to_minute;
use crate::render::plugins::clock::ClockRegion;
use crate::render::plugins::info::InfoStrip;
use crate::render::plugins::photo::PhotoRegion;
use crate::render::plugins::sensors::{SensorRegion, SensorRow};
use crate::render::plugins::text::TextRenderer;
use crate::render::plugins::{Area, RegionRenderer, outline};
use crate::render::{Bitmap, RenderError};

/// Height of the photo information strip
const INFO_STRIP_HEIGHT: u32 = 100;

#[derive(Debug, Clone)]
pub enum Layout {
    /// Photo on top, filename/date/update stamp underneath
    Photo,
    /// Live clock on top, sensor table underneath
    Sensors(Vec<SensorRow>),
}

pub struct Renderer {
    width: u32,
    height: u32,
    text: TextRenderer,
    regions: Vec<(Area, Box<dyn RegionRenderer + Send + Sync>)>,
    live_clock: bool,
    photo_area: Option<Area>,
}

impl Renderer {
    pub fn new(width: u32, height: u32, layout: Layout, text: TextRenderer) -> Self {
        let mut regions: Vec<(Area, Box<dyn RegionRenderer + Send + Sync>)> = Vec::new();
        let mut photo_area = None;
        let live_clock = matches!(layout, Layout::Sensors(_));

        match layout {
            Layout::Photo => {
                let info_h = INFO_STRIP_HEIGHT.min(height / 4);
                let photo = Area::new(0, 0, width, height - info_h);
                photo_area = Some(photo);
                regions.push((photo, Box::new(PhotoRegion)));
                regions.push((
                    Area::new(0, (height - info_h) as i32, width, info_h),
                    Box::new(InfoStrip),
                ));
            }
            Layout::Sensors(rows) => {
                let clock_h = height * 2 / 5;
                regions.push((Area::new(0, 0, width, clock_h), Box::new(ClockRegion)));
                regions.push((
                    Area::new(0, clock_h as i32, width, height - clock_h),
                    Box::new(SensorRegion::new(rows)),
                ));
            }
        }

        Self {
            width,
            height,
            text,
            regions,
            live_clock,
            photo_area,
        }
    }

    /// True when the frame shows the current minute, so the minute counts as content
    pub fn live_clock(&self) -> bool {
        self.live_clock
    }

    /// Pixel size reserved for the photo, if the layout has one
    pub fn photo_size(&self) -> Option<(u32, u32)> {
        self.photo_area.map(|a| (a.width, a.height))
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn compose(
        &self,
        snapshot: &ContentSnapshot,
        now: NaiveDateTime,
    ) -> Result<Bitmap, RenderError> {
        let now = truncate_to_minute(now);
        let mut canvas = self.canvas()?;
        for (area, region) in &self.regions {
            region.render(snapshot, now, &self.text, &mut canvas, *area)?;
        }
        Ok(Bitmap::from_pixmap(&canvas))
    }

    /// Static status screen: bordered title, message lines and a timestamp
    pub fn compose_message(
        &self,
        title: &str,
        lines: &[&str],
        now: NaiveDateTime,
    ) -> Result<Bitmap, RenderError> {
        let mut canvas = self.canvas()?;
        let full = Area::new(0, 0, self.width, self.height);
        outline(
            &mut canvas,
            Area::new(5, 5, self.width.saturating_sub(10), self.height.saturating_sub(10)),
            3,
            0,
        );

        let mid = self.height as i32 / 2;
        self.text.draw_centered(&mut canvas, title, 36.0, full, mid - 60, 0);
        let mut y = mid - 10;
        for line in lines {
            self.text.draw_centered(&mut canvas, line, 24.0, full, y, 0);
            y += self.text.line_height(24.0) as i32 + 6;
        }
        let stamp = now.format("%I:%M %p on %B %d, %Y").to_string();
        self.text.draw_centered(&mut canvas, &stamp, 18.0, full, y + 14, 0);

        Ok(Bitmap::from_pixmap(&canvas))
    }

    fn canvas(&self) -> Result<Pixmap, RenderError> {
        let mut canvas = Pixmap::new(self.width, self.height).ok_or(RenderError::Canvas {
            width: self.width,
            height: self.height,
        })?;
        canvas.fill(Color::WHITE);
        Ok(canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use image::GrayImage;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 10, 3)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn sensor_renderer() -> Renderer {
        let rows = vec![
            SensorRow {
                label: "Temperature".into(),
                field: "temperature".into(),
            },
            SensorRow {
                label: "Humidity".into(),
                field: "humidity".into(),
            },
        ];
        Renderer::new(640, 400, Layout::Sensors(rows), TextRenderer::builtin())
    }

    fn weather(temp: &str) -> ContentSnapshot {
        ContentSnapshot::new(at(6, 0, 0))
            .with_field("temperature", temp)
            .with_field("humidity", "61%")
    }

    #[test]
    fn test_compose_is_deterministic_within_minute() {
        let renderer = sensor_renderer();
        let snap = weather("12.0°C");
        let a = renderer.compose(&snap, at(9, 41, 0)).unwrap();
        let b = renderer.compose(&snap, at(9, 41, 59)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_compose_shows_clock_minute() {
        let renderer = sensor_renderer();
        let snap = weather("12.0°C");
        let a = renderer.compose(&snap, at(9, 41, 0)).unwrap();
        let b = renderer.compose(&snap, at(9, 42, 0)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_compose_shows_readings() {
        let renderer = sensor_renderer();
        let a = renderer.compose(&weather("12.0°C"), at(9, 41, 0)).unwrap();
        let b = renderer.compose(&weather("19.5°C"), at(9, 41, 0)).unwrap();
        assert_ne!(a, b);
        assert_eq!((a.width(), a.height()), (640, 400));
    }

    #[test]
    fn test_photo_layout_regions() {
        let renderer = Renderer::new(640, 400, Layout::Photo, TextRenderer::builtin());
        assert_eq!(renderer.photo_size(), Some((640, 300)));
        assert!(!renderer.live_clock());
        assert!(sensor_renderer().live_clock());
        assert_eq!(sensor_renderer().photo_size(), None);
    }

    #[test]
    fn test_photo_compose() {
        let renderer = Renderer::new(640, 400, Layout::Photo, TextRenderer::builtin());
        let snap = ContentSnapshot::new(at(6, 0, 0))
            .with_field("photo_id", "p1")
            .with_field("filename", "IMG_2041.jpg")
            .with_field("created", at(5, 12, 9))
            .with_photo(GrayImage::from_pixel(64, 48, image::Luma([0])));
        let frame = renderer.compose(&snap, at(8, 15, 30)).unwrap();
        // center of the photo region is the black photo
        assert_eq!(frame.pixels()[(150 * 640 + 320) as usize], 0);
        assert_eq!(frame, renderer.compose(&snap, at(8, 15, 2)).unwrap());
    }

    #[test]
    fn test_message_screen() {
        let renderer = sensor_renderer();
        let frame = renderer
            .compose_message("Photo Service Error", &["Authentication Failed"], at(1, 2, 3))
            .unwrap();
        assert!(frame.pixels().iter().any(|&v| v == 0));
        // border
        assert_eq!(frame.pixels()[(5 * 640 + 320) as usize], 0);
    }

    #[test]
    fn test_zero_size_canvas_fails() {
        let renderer = Renderer::new(0, 0, Layout::Photo, TextRenderer::builtin());
        assert!(matches!(
            renderer.compose(&weather("1"), at(0, 0, 0)),
            Err(RenderError::Canvas { .. })
        ));
    }
}
