//! Image encoding: attachment bytes → exportable bytes / base64 payloads.
//!
//! Everything here is CPU-bound and synchronous; the image pipeline calls it
//! from `spawn_blocking`. Decoding goes through the `image` crate's format
//! guessing, so the sniffed format only decides the *output* codec.

use crate::model::DecodedBitmap;
use crate::pipeline::sniff::ImageFormat;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Encode a decoded image in `format`.
///
/// JPEG goes through an explicit encoder so `jpeg_quality` applies and alpha
/// is dropped (JPEG has none). Other codecs get RGBA8.
pub fn encode_as(
    img: &DynamicImage,
    format: ImageFormat,
    jpeg_quality: u8,
) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let rgb = img.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, jpeg_quality);
            encoder.encode_image(&rgb)?;
        }
        other => {
            let codec = other.codec().unwrap_or(image::ImageFormat::Png);
            DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut Cursor::new(&mut buf), codec)?;
        }
    }
    debug!("Encoded {}x{} image as {} → {} bytes", img.width(), img.height(), format, buf.len());
    Ok(buf)
}

/// Decode arbitrary image bytes.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory(bytes)
}

/// Encode a raw RGBA surface as PNG.
pub fn bitmap_to_png(bitmap: &DecodedBitmap) -> Result<Vec<u8>, String> {
    let img = RgbaImage::from_raw(bitmap.width, bitmap.height, bitmap.rgba.clone()).ok_or_else(|| {
        format!(
            "bitmap buffer of {} bytes does not match {}x{} RGBA",
            bitmap.rgba.len(),
            bitmap.width,
            bitmap.height
        )
    })?;
    encode_as(&DynamicImage::ImageRgba8(img), ImageFormat::Png, 100).map_err(|e| e.to_string())
}

/// Wrap bytes as a base64 image for a multimodal API request.
///
/// Formats most providers reject (TIFF, JPEG 2000, HEIF, OpenEXR, unknown)
/// are converted to PNG first when the bytes can be decoded.
pub fn encode_for_vision(bytes: &[u8]) -> ImageData {
    let format = crate::pipeline::sniff::detect_format(bytes);
    let accepted = matches!(
        format,
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::WebP
    );
    if !accepted {
        if let Ok(png) = decode(bytes).and_then(|img| encode_as(&img, ImageFormat::Png, 100)) {
            return ImageData::new(STANDARD.encode(&png), "image/png").with_detail("low");
        }
    }
    ImageData::new(STANDARD.encode(bytes), format.mime_type()).with_detail("low")
}

/// `data:` URI for embedding in Markdown.
pub fn data_uri(bytes: &[u8], format: ImageFormat) -> String {
    format!("data:{};base64,{}", format.mime_type(), STANDARD.encode(bytes))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::sniff::detect_format;
    use image::Rgba;

    pub(crate) fn sample_png() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([255, 0, 0, 255])));
        encode_as(&img, ImageFormat::Png, 100).expect("png encode")
    }

    #[test]
    fn png_round_trip_keeps_dimensions() {
        let png = sample_png();
        assert_eq!(detect_format(&png), ImageFormat::Png);
        let img = decode(&png).expect("decode");
        assert_eq!((img.width(), img.height()), (4, 3));
    }

    #[test]
    fn jpeg_encoding_drops_alpha() {
        let img = decode(&sample_png()).unwrap();
        let jpg = encode_as(&img, ImageFormat::Jpeg, 80).expect("jpeg encode");
        assert_eq!(detect_format(&jpg), ImageFormat::Jpeg);
    }

    #[test]
    fn bitmap_to_png_checks_buffer_size() {
        let ok = DecodedBitmap {
            width: 2,
            height: 2,
            rgba: vec![0; 16],
        };
        assert_eq!(detect_format(&bitmap_to_png(&ok).unwrap()), ImageFormat::Png);
        let bad = DecodedBitmap {
            width: 2,
            height: 2,
            rgba: vec![0; 3],
        };
        assert!(bitmap_to_png(&bad).is_err());
    }

    #[test]
    fn vision_payload_is_valid_base64() {
        let data = encode_for_vision(&sample_png());
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(!decoded.is_empty());
    }

    #[test]
    fn data_uri_prefix() {
        let uri = data_uri(&[1, 2, 3], ImageFormat::Jpeg);
        assert_eq!(uri, "data:image/jpeg;base64,AQID");
    }
}
