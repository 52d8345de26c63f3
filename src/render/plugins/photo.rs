/// Photo region plugin.
/// Scales the snapshot's photo to fit the region, centered, with a thin frame around it.
use chrono::NaiveDateTime;
use image::GrayImage;
use tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};

use crate::content::ContentSnapshot;
use crate::render::RenderError;
use crate::render::plugins::text::TextRenderer;
use crate::render::plugins::{Area, RegionRenderer, outline};

const BORDER: u32 = 2;

pub struct PhotoRegion;

impl RegionRenderer for PhotoRegion {
    fn render(
        &self,
        snapshot: &ContentSnapshot,
        _now: NaiveDateTime,
        text: &TextRenderer,
        target: &mut Pixmap,
        area: Area,
    ) -> Result<(), RenderError> {
        let Some(photo) = snapshot.photo() else {
            let y = area.height as i32 / 2 - text.line_height(24.0) as i32 / 2;
            text.draw_centered(target, "No photo loaded", 24.0, area, y, 0);
            return Ok(());
        };

        let src = gray_to_pixmap(photo)?;
        let inner_w = area.width.saturating_sub(2 * BORDER).max(1) as f32;
        let inner_h = area.height.saturating_sub(2 * BORDER).max(1) as f32;
        let (src_w, src_h) = (src.width() as f32, src.height() as f32);

        // Fit: scale to the region keeping the aspect ratio
        let scale = (inner_w / src_w).min(inner_h / src_h);
        let drawn_w = (src_w * scale).round() as u32;
        let drawn_h = (src_h * scale).round() as u32;
        let x = area.x + (area.width as i32 - drawn_w as i32) / 2;
        let y = area.y + (area.height as i32 - drawn_h as i32) / 2;

        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        target.draw_pixmap(
            0,
            0,
            src.as_ref(),
            &paint,
            Transform::from_scale(scale, scale).post_translate(x as f32, y as f32),
            None,
        );

        outline(
            target,
            Area::new(
                x - BORDER as i32,
                y - BORDER as i32,
                drawn_w + 2 * BORDER,
                drawn_h + 2 * BORDER,
            ),
            BORDER,
            0,
        );
        Ok(())
    }
}

fn gray_to_pixmap(photo: &GrayImage) -> Result<Pixmap, RenderError> {
    let mut pixmap = Pixmap::new(photo.width(), photo.height()).ok_or(RenderError::Canvas {
        width: photo.width(),
        height: photo.height(),
    })?;
    for (dst, src) in pixmap.data_mut().chunks_exact_mut(4).zip(photo.pixels()) {
        dst.copy_from_slice(&[src[0], src[0], src[0], 255]);
    }
    Ok(pixmap)
}
