use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, RgbaImage};

use super::frame::{EncodedImage, TransferEncoding};
use crate::error::CaptureError;

/// Turn a pixel snapshot into the buffer handed to the recognition boundary.
pub fn encode_snapshot(
    snapshot: RgbaImage,
    encoding: TransferEncoding,
    jpeg_quality: u8,
) -> Result<EncodedImage, CaptureError> {
    let (width, height) = snapshot.dimensions();

    let data = match encoding {
        // Snapshot is already owned, hand its allocation over as-is
        TransferEncoding::Raw => Bytes::from(snapshot.into_raw()),
        TransferEncoding::Png => {
            let mut buf = Vec::new();
            snapshot.write_with_encoder(PngEncoder::new(&mut buf))?;
            Bytes::from(buf)
        }
        TransferEncoding::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(snapshot).into_rgb8();
            let mut buf = Vec::new();
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, jpeg_quality))?;
            Bytes::from(buf)
        }
    };

    Ok(EncodedImage {
        data,
        width,
        height,
        encoding,
    })
}
