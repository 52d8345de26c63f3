/// Panel-ready frame: 8-bit grayscale, converted to the panel's 1-bit format on demand.
use image::imageops::{self, BiLevel};
use image::{GrayImage, ImageFormat, ImageResult};
use std::path::Path;
use tiny_skia::Pixmap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    luma: Vec<u8>,
}

impl Bitmap {
    /// All-white frame
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            luma: vec![255; (width * height) as usize],
        }
    }

    /// Flatten an opaque canvas to luma
    pub fn from_pixmap(pixmap: &Pixmap) -> Self {
        let luma = pixmap
            .data()
            .chunks_exact(4)
            .map(|px| {
                let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
                ((r * 299 + g * 587 + b * 114) / 1000) as u8
            })
            .collect();
        Self {
            width: pixmap.width(),
            height: pixmap.height(),
            luma,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.luma
    }

    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([self.luma[(y * self.width + x) as usize]])
        })
    }

    /// Floyd-Steinberg dither to black/white and pack 8 pixels per byte, MSB first,
    /// rows padded to a whole byte. A set bit is white.
    pub fn pack_1bpp(&self) -> Vec<u8> {
        let mut gray = self.to_gray_image();
        imageops::dither(&mut gray, &BiLevel);

        let row_bytes = self.width.div_ceil(8) as usize;
        let mut packed = vec![0u8; row_bytes * self.height as usize];
        for (x, y, px) in gray.enumerate_pixels() {
            if px[0] > 127 {
                packed[y as usize * row_bytes + (x / 8) as usize] |= 0x80 >> (x % 8);
            }
        }
        packed
    }

    pub fn save_png(&self, path: &Path) -> ImageResult<()> {
        self.to_gray_image().save_with_format(path, ImageFormat::Png)
    }
}
