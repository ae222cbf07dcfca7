//! JPEG compression and data URL encoding for frames.
//!
//! Everything here is a pure function of the frame, so the live feed and
//! snapshot requests can encode the same `Arc<Frame>` concurrently.

use super::{Frame, PixelFormat};
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{codecs::jpeg::JpegEncoder, ExtendedColorType, ImageEncoder};
use thiserror::Error;

/// JPEG quality used when none is configured (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Prefix of every encoded frame URL.
pub const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Errors raised while compressing a frame.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("frame buffer of {len} bytes does not match {width}x{height}")]
    MalformedFrame { width: u32, height: u32, len: usize },
    #[error("jpeg encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// Compresses a frame to JPEG at the given quality.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, EncodeError> {
    if !frame.is_valid() {
        return Err(EncodeError::MalformedFrame {
            width: frame.width(),
            height: frame.height(),
            len: frame.pixels().len(),
        });
    }

    let color = match frame.format() {
        PixelFormat::Rgb8 => ExtendedColorType::Rgb8,
        PixelFormat::Gray8 => ExtendedColorType::L8,
    };

    let mut buffer = Vec::with_capacity(frame.pixels().len() / 8);
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).write_image(
        frame.pixels(),
        frame.width(),
        frame.height(),
        color,
    )?;
    Ok(buffer)
}

/// Encodes a frame as a `data:image/jpeg;base64,...` URL at default quality.
pub fn encode_as_data_url(frame: &Frame) -> Result<String, EncodeError> {
    encode_data_url_with_quality(frame, DEFAULT_JPEG_QUALITY)
}

/// Encodes a frame as a JPEG data URL at the given quality.
pub fn encode_data_url_with_quality(frame: &Frame, quality: u8) -> Result<String, EncodeError> {
    let jpeg = encode_jpeg(frame, quality)?;
    let mut url = String::with_capacity(DATA_URL_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
    url.push_str(DATA_URL_PREFIX);
    STANDARD.encode_string(&jpeg, &mut url);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockCamera;

    fn sample_frame() -> Frame {
        Frame::new(MockCamera::pattern(16, 8, 1), 16, 8, 1)
    }

    #[test]
    fn test_jpeg_has_soi_and_eoi_markers() {
        let jpeg = encode_jpeg(&sample_frame(), 90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_data_url_decodes_to_jpeg() {
        let url = encode_as_data_url(&sample_frame()).unwrap();
        let payload = url.strip_prefix(DATA_URL_PREFIX).unwrap();
        let jpeg = STANDARD.decode(payload).unwrap();

        let decoded = image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 8);
    }

    #[test]
    fn test_gray_frame_encodes() {
        let frame = Frame::with_format(vec![128u8; 64], 8, 8, PixelFormat::Gray8, 1);
        assert!(encode_jpeg(&frame, 50).is_ok());
    }

    #[test]
    fn test_malformed_frame_rejected() {
        let frame = Frame::new(vec![0u8; 10], 16, 8, 4);
        match encode_jpeg(&frame, 80) {
            Err(EncodeError::MalformedFrame { len, .. }) => assert_eq!(len, 10),
            other => panic!("expected MalformedFrame, got {:?}", other),
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let frame = sample_frame();
        assert_eq!(
            encode_as_data_url(&frame).unwrap(),
            encode_as_data_url(&frame).unwrap()
        );
    }
}
