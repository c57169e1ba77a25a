//! Image encoding for multimodal requests
//!
//! Every image sent to the endpoint is re-encoded as a baseline JPEG,
//! base64-encoded, and wrapped in a `data:` URI. The output order always
//! matches the input order, one part per image.
//!
//! ```rust
//! use image::{DynamicImage, RgbImage};
//! use vlm_structured::encoder::encode;
//!
//! let img = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
//! let part = encode(&img).unwrap();
//! assert!(part.data_uri.starts_with("data:image/jpeg;base64,"));
//! ```

use crate::Result;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};

/// MIME type of every encoded part.
pub const JPEG_MIME: &str = "image/jpeg";

/// JPEG quality used for re-encoding.
pub const JPEG_QUALITY: u8 = 75;

/// A single image ready to be embedded in a user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImagePart {
    pub mime_type: &'static str,
    pub data_uri: String,
}

impl EncodedImagePart {
    /// The base64 payload after the `;base64,` marker.
    pub fn payload(&self) -> &str {
        self.data_uri
            .split_once(";base64,")
            .map(|(_, data)| data)
            .unwrap_or_default()
    }
}

/// Encode one image into a JPEG data URI.
///
/// Images with an alpha channel are composited onto white first, since JPEG
/// has no transparency.
pub fn encode(image: &DynamicImage) -> Result<EncodedImagePart> {
    let rgb = flatten_to_rgb(image);

    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    encoder.encode_image(&rgb)?;

    Ok(EncodedImagePart {
        mime_type: JPEG_MIME,
        data_uri: format!("data:{};base64,{}", JPEG_MIME, STANDARD.encode(&bytes)),
    })
}

/// Encode an ordered collection of images.
///
/// A single image can be passed as `std::iter::once(&img)` or `Some(&img)`;
/// the result is always a list, in input order.
pub fn encode_all<'a, I>(images: I) -> Result<Vec<EncodedImagePart>>
where
    I: IntoIterator<Item = &'a DynamicImage>,
{
    images.into_iter().map(encode).collect()
}

fn flatten_to_rgb(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend =
            |channel: u8| -> u8 { (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8 };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flattened
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        let buf = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
        });
        DynamicImage::ImageRgb8(buf)
    }

    fn decode(part: &EncodedImagePart) -> DynamicImage {
        let bytes = STANDARD.decode(part.payload()).unwrap();
        image::load_from_memory(&bytes).unwrap()
    }

    #[test]
    fn test_encode_produces_jpeg_data_uri() {
        let part = encode(&gradient(16, 16)).unwrap();
        assert_eq!(part.mime_type, "image/jpeg");
        assert!(part.data_uri.starts_with("data:image/jpeg;base64,"));
        assert!(!part.payload().is_empty());
    }

    #[test]
    fn test_round_trip_preserves_dimensions_and_content() {
        let original = gradient(64, 32);
        let decoded = decode(&encode(&original).unwrap());

        assert_eq!(decoded.dimensions(), (64, 32));

        // Lossy: compare a few pixels with a tolerance.
        let decoded = decoded.to_rgb8();
        let original = original.to_rgb8();
        for (x, y) in [(0, 0), (32, 16), (63, 31)] {
            let a = original.get_pixel(x, y);
            let b = decoded.get_pixel(x, y);
            for c in 0..3 {
                let diff = (i16::from(a[c]) - i16::from(b[c])).abs();
                assert!(diff < 24, "pixel ({x},{y}) channel {c} differs by {diff}");
            }
        }
    }

    #[test]
    fn test_transparent_pixels_become_white() {
        let rgba = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0]));
        let decoded = decode(&encode(&DynamicImage::ImageRgba8(rgba)).unwrap()).to_rgb8();
        let px = decoded.get_pixel(4, 4);
        assert!(px[0] > 240 && px[1] > 240 && px[2] > 240);
    }

    #[test]
    fn test_encode_all_preserves_order() {
        let small = gradient(4, 4);
        let wide = gradient(40, 10);
        let tall = gradient(10, 40);

        let parts = encode_all([&small, &wide, &tall]).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(decode(&parts[0]).dimensions(), (4, 4));
        assert_eq!(decode(&parts[1]).dimensions(), (40, 10));
        assert_eq!(decode(&parts[2]).dimensions(), (10, 40));
    }

    #[test]
    fn test_single_image_is_promoted_to_list() {
        let img = gradient(8, 8);
        let parts = encode_all(std::iter::once(&img)).unwrap();
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let img = gradient(20, 20);
        assert_eq!(encode(&img).unwrap(), encode(&img).unwrap());
    }
}
