//! Visual sources the scheduler samples from

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use image::{Rgba, RgbaImage};

use crate::error::CaptureError;

/// Live visual feed owned by the platform (camera, screen, video element).
pub trait VisualSource: Send + Sync + 'static {
    /// Current intrinsic size; `(0, 0)` while the source is not ready.
    fn dimensions(&self) -> (u32, u32);

    /// Copy of the frame currently being shown.
    fn snapshot(&self) -> Result<RgbaImage, CaptureError>;
}

/// Source fed by an external producer that publishes its latest image.
///
/// Publishing swaps an `Arc` atomically, so a producer thread never blocks
/// the capture loop and a snapshot always sees one complete image.
#[derive(Default)]
pub struct LiveSource {
    latest: ArcSwapOption<RgbaImage>,
}

impl LiveSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, image: RgbaImage) {
        self.latest.store(Some(Arc::new(image)));
    }

    /// Publish a tightly packed RGBA8 buffer.
    pub fn publish_raw(&self, width: u32, height: u32, pixels: Vec<u8>) -> Result<(), CaptureError> {
        let expected = width as usize * height as usize * 4;
        let actual = pixels.len();
        let image = RgbaImage::from_raw(width, height, pixels)
            .ok_or(CaptureError::BufferSize { expected, actual })?;
        self.publish(image);
        Ok(())
    }

    /// Drop the current image; the source reports zero dimensions again.
    pub fn reset(&self) {
        self.latest.store(None);
    }
}

impl VisualSource for LiveSource {
    fn dimensions(&self) -> (u32, u32) {
        match &*self.latest.load() {
            Some(image) => image.dimensions(),
            None => (0, 0),
        }
    }

    fn snapshot(&self) -> Result<RgbaImage, CaptureError> {
        let image = self.latest.load_full().ok_or(CaptureError::NotReady)?;
        Ok(image.as_ref().clone())
    }
}

/// Synthetic moving gradient, one step per snapshot
pub struct TestPattern {
    width: u32,
    height: u32,
    step: AtomicU32,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            step: AtomicU32::new(0),
        }
    }
}

impl VisualSource for TestPattern {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn snapshot(&self) -> Result<RgbaImage, CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::NotReady);
        }
        let step = self.step.fetch_add(1, Ordering::Relaxed);
        let (w, h) = (self.width, self.height);

        Ok(RgbaImage::from_fn(w, h, |x, y| {
            let r = ((x + step) % w * 255 / w) as u8;
            let g = (y * 255 / h) as u8;
            let b = (step % 256) as u8;
            Rgba([r, g, b, 255])
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_source_not_ready_until_published() {
        let source = LiveSource::new();
        assert_eq!(source.dimensions(), (0, 0));
        assert!(matches!(source.snapshot(), Err(CaptureError::NotReady)));

        source.publish(RgbaImage::new(4, 2));
        assert_eq!(source.dimensions(), (4, 2));
        assert_eq!(source.snapshot().unwrap().dimensions(), (4, 2));

        source.reset();
        assert_eq!(source.dimensions(), (0, 0));
    }

    #[test]
    fn test_snapshot_is_detached_from_later_publishes() {
        let source = LiveSource::new();
        source.publish(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 4])));
        let snapshot = source.snapshot().unwrap();

        source.publish(RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 9])));
        assert_eq!(snapshot.get_pixel(0, 0), &Rgba([1, 2, 3, 4]));
    }

    #[test]
    fn test_publish_raw_checks_length() {
        let source = LiveSource::new();
        let err = source.publish_raw(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::BufferSize {
                expected: 16,
                actual: 15
            }
        ));
        assert!(source.publish_raw(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_pattern_advances() {
        let pattern = TestPattern::new(8, 4);
        let first = pattern.snapshot().unwrap();
        let second = pattern.snapshot().unwrap();
        assert_eq!(first.dimensions(), (8, 4));
        assert_ne!(first.get_pixel(0, 0), second.get_pixel(0, 0));
    }
}
