pub mod bitmap;
pub mod engine;
pub mod plugins;

use thiserror::Error;

pub use bitmap::Bitmap;
pub use engine::{Layout, Renderer};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot allocate a {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },
}
