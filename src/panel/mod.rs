/// Panel driver seam. Implementations push frames to the physical (or simulated) e-ink panel.
pub mod png;
pub mod raw;

use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::render::Bitmap;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("panel I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode frame: {0}")]
    Image(#[from] image::ImageError),
    #[error("frame is {got:?}, panel is {expected:?}")]
    SizeMismatch {
        got: (u32, u32),
        expected: (u32, u32),
    },
    #[error("panel not initialized")]
    NotInitialized,
    #[error("panel refreshed too recently, next refresh allowed in {remaining:?}")]
    Throttled { remaining: Duration },
}

pub trait PanelDriver {
    fn init(&mut self) -> Result<(), PanelError>;
    /// Full refresh with `bitmap`
    fn display(&mut self, bitmap: &Bitmap) -> Result<(), PanelError>;
    /// Blank the panel to white
    fn clear(&mut self) -> Result<(), PanelError>;
    /// Put the panel into its low-power safe state
    fn sleep(&mut self) -> Result<(), PanelError>;
}

/// Enforces the panel's minimum interval between two `display` refreshes.
/// `clear` belongs to the init sequence and is not throttled.
pub struct Throttled<P> {
    inner: P,
    min_interval: Duration,
    last_refresh: Option<Instant>,
}

impl<P: PanelDriver> Throttled<P> {
    pub fn new(inner: P, min_interval: Duration) -> Self {
        Self {
            inner,
            min_interval,
            last_refresh: None,
        }
    }
}

impl<P: PanelDriver> PanelDriver for Throttled<P> {
    fn init(&mut self) -> Result<(), PanelError> {
        self.inner.init()
    }

    fn display(&mut self, bitmap: &Bitmap) -> Result<(), PanelError> {
        let now = Instant::now();
        if let Some(last) = self.last_refresh {
            let since = now.saturating_duration_since(last);
            if since < self.min_interval {
                let remaining = self.min_interval - since;
                debug!("Panel refresh refused, {}s left", remaining.as_secs());
                return Err(PanelError::Throttled { remaining });
            }
        }
        self.inner.display(bitmap)?;
        self.last_refresh = Some(now);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), PanelError> {
        self.inner.clear()
    }

    fn sleep(&mut self) -> Result<(), PanelError> {
        self.inner.sleep()
    }
}

/// Reject frames whose size does not match the panel
pub fn check_size(bitmap: &Bitmap, width: u32, height: u32) -> Result<(), PanelError> {
    if (bitmap.width(), bitmap.height()) != (width, height) {
        return Err(PanelError::SizeMismatch {
            got: (bitmap.width(), bitmap.height()),
            expected: (width, height),
        });
    }
    Ok(())
}
