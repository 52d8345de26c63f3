/// Text rasterizer used by every region.
/// Renders with rusttype when a TrueType font is available, otherwise with the built-in
/// embedded-graphics bitmap font scaled to the requested size.
use embedded_graphics::mono_font::iso_8859_1::{FONT_6X10, FONT_10X20};
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use std::convert::Infallible;
use std::path::Path;
use tiny_skia::Pixmap;
use tracing::{info, warn};

use crate::render::plugins::Area;

pub const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

enum Face {
    TrueType(rusttype::Font<'static>),
    Builtin,
}

pub struct TextRenderer {
    face: Face,
}

impl TextRenderer {
    /// Load `path`, or the system DejaVu font when no path is given. Falls back to the
    /// built-in bitmap font when neither can be read.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.unwrap_or(Path::new(DEFAULT_FONT_PATH));
        match std::fs::read(path) {
            Ok(bytes) => match rusttype::Font::try_from_vec(bytes) {
                Some(font) => {
                    info!("Loaded font {}", path.display());
                    return Self {
                        face: Face::TrueType(font),
                    };
                }
                None => warn!("{} is not a usable TrueType font", path.display()),
            },
            Err(e) => warn!("Cannot read font {}: {}", path.display(), e),
        }
        info!("Using built-in bitmap font");
        Self::builtin()
    }

    pub fn builtin() -> Self {
        Self {
            face: Face::Builtin,
        }
    }

    pub fn line_height(&self, size: f32) -> u32 {
        match &self.face {
            Face::TrueType(font) => {
                let v = font.v_metrics(rusttype::Scale::uniform(size));
                (v.ascent - v.descent + v.line_gap).ceil() as u32
            }
            Face::Builtin => {
                let (font, scale) = builtin_font(size);
                font.character_size.height * scale
            }
        }
    }

    /// Width of `text` in pixels
    pub fn measure(&self, text: &str, size: f32) -> u32 {
        match &self.face {
            Face::TrueType(font) => font
                .layout(text, rusttype::Scale::uniform(size), rusttype::point(0.0, 0.0))
                .last()
                .map(|g| (g.position().x + g.unpositioned().h_metrics().advance_width).ceil())
                .unwrap_or(0.0) as u32,
            Face::Builtin => {
                let (font, scale) = builtin_font(size);
                let advance = font.character_size.width + font.character_spacing;
                text.chars().count() as u32 * advance * scale
            }
        }
    }

    /// Draw `text` with its top-left corner at (`x`, `y`)
    pub fn draw(&self, target: &mut Pixmap, text: &str, size: f32, x: i32, y: i32, shade: u8) {
        match &self.face {
            Face::TrueType(font) => draw_truetype(font, target, text, size, x, y, shade),
            Face::Builtin => {
                let (font, scale) = builtin_font(size);
                let mut sink = PixmapSink {
                    target,
                    origin: (x, y),
                    scale,
                    shade,
                };
                let style = MonoTextStyle::new(font, BinaryColor::On);
                let _ = Text::with_baseline(text, Point::zero(), style, Baseline::Top)
                    .draw(&mut sink);
            }
        }
    }

    /// Draw `text` horizontally centered in `area`, `y` pixels below its top
    pub fn draw_centered(
        &self,
        target: &mut Pixmap,
        text: &str,
        size: f32,
        area: Area,
        y: i32,
        shade: u8,
    ) {
        let width = self.measure(text, size) as i32;
        let x = area.x + ((area.width as i32 - width) / 2).max(0);
        self.draw(target, text, size, x, area.y + y, shade);
    }
}

fn builtin_font(size: f32) -> (&'static MonoFont<'static>, u32) {
    let font = if size < 16.0 { &FONT_6X10 } else { &FONT_10X20 };
    let scale = (size / font.character_size.height as f32).round().max(1.0) as u32;
    (font, scale)
}

fn draw_truetype(
    font: &rusttype::Font<'static>,
    target: &mut Pixmap,
    text: &str,
    size: f32,
    x: i32,
    y: i32,
    shade: u8,
) {
    let scale = rusttype::Scale::uniform(size);
    let v_metrics = font.v_metrics(scale);
    let glyphs: Vec<_> = font
        .layout(text, scale, rusttype::point(x as f32, y as f32 + v_metrics.ascent))
        .collect();

    let tw = target.width() as i32;
    let th = target.height() as i32;
    let data = target.data_mut();

    for glyph in &glyphs {
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, v| {
                let px = bb.min.x + gx as i32;
                let py = bb.min.y + gy as i32;
                if px >= 0 && px < tw && py >= 0 && py < th && v > 0.0 {
                    let idx = ((py * tw + px) * 4) as usize;
                    blend(&mut data[idx..idx + 4], shade, v);
                }
            });
        }
    }
}

/// Mix `shade` into an opaque gray pixel with coverage `a`
fn blend(px: &mut [u8], shade: u8, a: f32) {
    let a = a.clamp(0.0, 1.0);
    let out = (px[0] as f32 + (shade as f32 - px[0] as f32) * a).round() as u8;
    px[0] = out;
    px[1] = out;
    px[2] = out;
    px[3] = 255;
}

/// embedded-graphics draw target writing scaled pixels into a tiny-skia canvas
struct PixmapSink<'a> {
    target: &'a mut Pixmap,
    origin: (i32, i32),
    scale: u32,
    shade: u8,
}

impl OriginDimensions for PixmapSink<'_> {
    fn size(&self) -> Size {
        Size::new(
            self.target.width() / self.scale,
            self.target.height() / self.scale,
        )
    }
}

impl DrawTarget for PixmapSink<'_> {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let tw = self.target.width() as i32;
        let th = self.target.height() as i32;
        let scale = self.scale as i32;
        let data = self.target.data_mut();

        for Pixel(point, color) in pixels {
            if !color.is_on() {
                continue;
            }
            for dy in 0..scale {
                for dx in 0..scale {
                    let px = self.origin.0 + point.x * scale + dx;
                    let py = self.origin.1 + point.y * scale + dy;
                    if px >= 0 && px < tw && py >= 0 && py < th {
                        let idx = ((py * tw + px) * 4) as usize;
                        blend(&mut data[idx..idx + 4], self.shade, 1.0);
                    }
                }
            }
        }
        Ok(())
    }
}
