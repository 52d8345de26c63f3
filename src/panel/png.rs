/// Development panel: every refresh is written to a PNG file.
use std::path::PathBuf;
use tracing::{debug, info};

use crate::panel::{PanelDriver, PanelError, check_size};
use crate::render::Bitmap;

pub struct PngPanel {
    path: PathBuf,
    width: u32,
    height: u32,
    initialized: bool,
}

impl PngPanel {
    pub fn new(path: PathBuf, width: u32, height: u32) -> Self {
        Self {
            path,
            width,
            height,
            initialized: false,
        }
    }
}

impl PanelDriver for PngPanel {
    fn init(&mut self) -> Result<(), PanelError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.initialized = true;
        info!("PNG panel {}x{} -> {}", self.width, self.height, self.path.display());
        Ok(())
    }

    fn display(&mut self, bitmap: &Bitmap) -> Result<(), PanelError> {
        if !self.initialized {
            return Err(PanelError::NotInitialized);
        }
        check_size(bitmap, self.width, self.height)?;
        bitmap.save_png(&self.path)?;
        debug!("Saved frame to {}", self.path.display());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), PanelError> {
        if !self.initialized {
            return Err(PanelError::NotInitialized);
        }
        Bitmap::blank(self.width, self.height).save_png(&self.path)?;
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), PanelError> {
        self.initialized = false;
        info!("PNG panel released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames/frame.png");
        let mut panel = PngPanel::new(path.clone(), 16, 8);

        assert!(matches!(
            panel.display(&Bitmap::blank(16, 8)),
            Err(PanelError::NotInitialized)
        ));
        panel.init().unwrap();
        panel.display(&Bitmap::blank(16, 8)).unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (16, 8));
    }

    #[test]
    fn test_sleep_requires_reinit() {
        let dir = tempfile::tempdir().unwrap();
        let mut panel = PngPanel::new(dir.path().join("f.png"), 4, 4);
        panel.init().unwrap();
        panel.sleep().unwrap();
        assert!(panel.clear().is_err());
    }
}
