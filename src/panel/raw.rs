/// Raw panel output: the dithered 1-bit frame buffer is written to a file or device node.
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::panel::{PanelDriver, PanelError, check_size};
use crate::render::Bitmap;

pub struct RawPanel {
    path: PathBuf,
    width: u32,
    height: u32,
    initialized: bool,
}

impl RawPanel {
    pub fn new(path: PathBuf, width: u32, height: u32) -> Self {
        Self {
            path,
            width,
            height,
            initialized: false,
        }
    }

    fn write(&self, buffer: &[u8]) -> Result<(), PanelError> {
        let mut out = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        out.write_all(buffer)?;
        out.flush()?;
        Ok(())
    }
}

impl PanelDriver for RawPanel {
    fn init(&mut self) -> Result<(), PanelError> {
        // open once so a missing device fails at startup
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        self.initialized = true;
        info!("Raw panel {}x{} -> {}", self.width, self.height, self.path.display());
        Ok(())
    }

    fn display(&mut self, bitmap: &Bitmap) -> Result<(), PanelError> {
        if !self.initialized {
            return Err(PanelError::NotInitialized);
        }
        check_size(bitmap, self.width, self.height)?;
        let buffer = bitmap.pack_1bpp();
        self.write(&buffer)?;
        debug!("Wrote {} byte frame to {}", buffer.len(), self.path.display());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), PanelError> {
        if !self.initialized {
            return Err(PanelError::NotInitialized);
        }
        let row_bytes = self.width.div_ceil(8) as usize;
        self.write(&vec![0xFF; row_bytes * self.height as usize])
    }

    fn sleep(&mut self) -> Result<(), PanelError> {
        self.initialized = false;
        info!("Raw panel released");
        Ok(())
    }
}
