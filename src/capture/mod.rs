pub mod encoder;
pub mod frame;
pub mod source;

pub use encoder::encode_snapshot;
pub use frame::{EncodedImage, Frame, FrameMetadata, Roi, TransferEncoding};
pub use source::{LiveSource, TestPattern, VisualSource};
