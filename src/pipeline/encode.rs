//! Image encoding: `DynamicImage` → bytes ready for a PDF image XObject.
//!
//! Scanned pages are mostly greyscale or bitonal, so images without colour
//! are reduced to one 8-bit channel (`DeviceGray`) before compression. That
//! alone cuts the stream size by about two thirds compared to RGB.
//!
//! * [`ImageEncoding::Jpeg`] stores a baseline JPEG as-is (`DCTDecode`).
//! * [`ImageEncoding::Flate`] zlib-compresses the raw samples (`FlateDecode`);
//!   lossless, and usually smaller than JPEG for clean black-on-white text.

use crate::config::ImageEncoding;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Write;
use tracing::debug;

/// An encoded page image plus the dictionary values its XObject needs.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// `DeviceRGB` or `DeviceGray`.
    pub color_space: &'static str,
    /// `DCTDecode` or `FlateDecode`.
    pub filter: &'static str,
}

impl EncodedImage {
    pub const BITS_PER_COMPONENT: i64 = 8;
}

/// Encode a rendered page for embedding.
pub fn encode_page(img: &DynamicImage, encoding: ImageEncoding) -> Result<EncodedImage, image::ImageError> {
    let (width, height) = (img.width(), img.height());
    let color = img.color().has_color();
    let color_space = if color { "DeviceRGB" } else { "DeviceGray" };

    let (data, filter) = match encoding {
        ImageEncoding::Jpeg { quality } => {
            let mut buf = Vec::new();
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            if color {
                img.to_rgb8().write_with_encoder(encoder)?;
            } else {
                img.to_luma8().write_with_encoder(encoder)?;
            }
            (buf, "DCTDecode")
        }
        ImageEncoding::Flate => {
            let raw = if color {
                img.to_rgb8().into_raw()
            } else {
                img.to_luma8().into_raw()
            };
            let mut z = ZlibEncoder::new(Vec::new(), Compression::default());
            z.write_all(&raw).map_err(image::ImageError::IoError)?;
            (z.finish().map_err(image::ImageError::IoError)?, "FlateDecode")
        }
    };

    debug!(
        "Encoded {}x{} {} image → {} bytes ({})",
        width,
        height,
        color_space,
        data.len(),
        filter
    );

    Ok(EncodedImage {
        data,
        width,
        height,
        color_space,
        filter,
    })
}
