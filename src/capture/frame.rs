use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Captured frame handed from the scheduler to the submission path.
///
/// Cloning is cheap: the pixel payload is a shared `Bytes` and the metadata
/// sits behind an `Arc`, so the queue, observers and the in-flight
/// submission all see the same immutable buffer.
#[derive(Clone)]
pub struct Frame {
    /// Immutable transfer buffer, never mutated after capture
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Monotonic capture time
    pub timestamp: Instant,

    processed: Arc<AtomicBool>,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub id: u64,
    /// Queue epoch the frame was captured in; bumped by every clear
    pub session: u64,
    pub width: u32,
    pub height: u32,
    pub encoding: TransferEncoding,
    pub roi: Option<Roi>,
}

/// Layout of the bytes in [`Frame::data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferEncoding {
    /// Tightly packed RGBA8, `width * height * 4` bytes
    Raw,
    Png,
    Jpeg,
}

/// Rectangle in source pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Output of the transfer encoder, ready to be queued
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub encoding: TransferEncoding,
}

impl Frame {
    pub(crate) fn new(
        id: u64,
        session: u64,
        image: EncodedImage,
        roi: Option<Roi>,
        timestamp: Instant,
    ) -> Self {
        Self {
            data: image.data,
            meta: Arc::new(FrameMetadata {
                id,
                session,
                width: image.width,
                height: image.height,
                encoding: image.encoding,
                roi,
            }),
            timestamp,
            processed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.meta.id
    }

    pub fn session(&self) -> u64 {
        self.meta.session
    }

    /// True once a terminal submission outcome has been recorded.
    pub fn is_processed(&self) -> bool {
        self.processed.load(Ordering::Acquire)
    }

    /// Flag the terminal outcome. Returns false if it was already recorded.
    pub(crate) fn mark_processed(&self) -> bool {
        !self.processed.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.meta.id)
            .field("session", &self.meta.session)
            .field("size", &format_args!("{}x{}", self.meta.width, self.meta.height))
            .field("encoding", &self.meta.encoding)
            .field("roi", &self.meta.roi)
            .field("bytes", &self.data.len())
            .field("processed", &self.is_processed())
            .finish()
    }
}

impl Roi {
    /// Intersect with a `width x height` source. `None` when nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Roi> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(Roi {
            x: self.x,
            y: self.y,
            width: w,
            height: h,
        })
    }
}
