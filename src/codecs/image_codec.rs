//! Raster image decoding, rotation and PNG encoding on top of the `image` crate.

use image::{DynamicImage, ImageBuffer, ImageError, ImageFormat, Pixel};
use std::io::Cursor;

use super::{CodecError, CodecResult};

/// Scalar metadata derived from a decoded image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl ImageInfo {
    pub fn of(image: &DynamicImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            channels: image.color().channel_count(),
        }
    }
}

/// Result of decoding uploaded bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub info: ImageInfo,
    /// Canonical file extension of the detected format (`png`, `jpg`, ...).
    pub extension: &'static str,
}

/// Encoded image bytes plus the metadata of the encoded buffer.
#[derive(Clone, Debug)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub info: ImageInfo,
    pub extension: &'static str,
}

pub trait ImageCodec: Send + Sync {
    /// Decode `bytes` and report dimensions, channel count and format.
    fn inspect(&self, bytes: &[u8]) -> CodecResult<DecodedImage>;

    /// Decode `bytes`, rotate counter-clockwise by `degrees` and re-encode.
    fn rotate(&self, bytes: &[u8], degrees: i64) -> CodecResult<EncodedImage>;

    /// Encode a pixel buffer in the codec's output format.
    fn encode(&self, image: &DynamicImage) -> CodecResult<EncodedImage>;
}

/// [`ImageCodec`] backed by the `image` crate. Output is always PNG.
#[derive(Clone, Debug, Default)]
pub struct RasterImageCodec;

impl RasterImageCodec {
    pub fn new() -> Self {
        Self
    }

    fn decode(bytes: &[u8]) -> CodecResult<(DynamicImage, ImageFormat)> {
        let format = image::guess_format(bytes).map_err(map_image_error)?;
        let image = image::load_from_memory_with_format(bytes, format).map_err(map_image_error)?;
        Ok((image, format))
    }
}

impl ImageCodec for RasterImageCodec {
    fn inspect(&self, bytes: &[u8]) -> CodecResult<DecodedImage> {
        let (image, format) = Self::decode(bytes)?;
        Ok(DecodedImage {
            info: ImageInfo::of(&image),
            extension: format.extensions_str().first().copied().unwrap_or("bin"),
        })
    }

    fn rotate(&self, bytes: &[u8], degrees: i64) -> CodecResult<EncodedImage> {
        let (image, _) = Self::decode(bytes)?;
        self.encode(&rotate_ccw(&image, degrees))
    }

    fn encode(&self, image: &DynamicImage) -> CodecResult<EncodedImage> {
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| CodecError::Internal(format!("failed to encode PNG: {e}")))?;
        Ok(EncodedImage {
            bytes: buf,
            info: ImageInfo::of(image),
            extension: "png",
        })
    }
}

fn map_image_error(err: ImageError) -> CodecError {
    match err {
        ImageError::Unsupported(_) | ImageError::Decoding(_) => {
            CodecError::Unrecognized(err.to_string())
        }
        other => CodecError::Internal(other.to_string()),
    }
}

/// Rotate counter-clockwise by `degrees`, growing the canvas to fit.
///
/// Quarter turns are exact transposes. Any other angle is resampled
/// (nearest neighbour) into the rotated bounding box; uncovered pixels are
/// zero, i.e. black or fully transparent. The pixel layout and bit depth are
/// kept; a layout the `image` crate adds later falls back to RGBA8.
pub fn rotate_ccw(image: &DynamicImage, degrees: i64) -> DynamicImage {
    let degrees = match degrees.rem_euclid(360) {
        0 => return image.clone(),
        90 => return image.rotate270(),
        180 => return image.rotate180(),
        270 => return image.rotate90(),
        normalized => normalized as f64,
    };

    match image {
        DynamicImage::ImageLuma8(buf) => DynamicImage::ImageLuma8(rotate_expanded(buf, degrees)),
        DynamicImage::ImageLumaA8(buf) => DynamicImage::ImageLumaA8(rotate_expanded(buf, degrees)),
        DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(rotate_expanded(buf, degrees)),
        DynamicImage::ImageRgba8(buf) => DynamicImage::ImageRgba8(rotate_expanded(buf, degrees)),
        DynamicImage::ImageLuma16(buf) => DynamicImage::ImageLuma16(rotate_expanded(buf, degrees)),
        DynamicImage::ImageLumaA16(buf) => {
            DynamicImage::ImageLumaA16(rotate_expanded(buf, degrees))
        }
        DynamicImage::ImageRgb16(buf) => DynamicImage::ImageRgb16(rotate_expanded(buf, degrees)),
        DynamicImage::ImageRgba16(buf) => DynamicImage::ImageRgba16(rotate_expanded(buf, degrees)),
        DynamicImage::ImageRgb32F(buf) => DynamicImage::ImageRgb32F(rotate_expanded(buf, degrees)),
        DynamicImage::ImageRgba32F(buf) => {
            DynamicImage::ImageRgba32F(rotate_expanded(buf, degrees))
        }
        other => DynamicImage::ImageRgba8(rotate_expanded(&other.to_rgba8(), degrees)),
    }
}

fn rotate_expanded<P: Pixel>(
    src: &ImageBuffer<P, Vec<P::Subpixel>>,
    degrees: f64,
) -> ImageBuffer<P, Vec<P::Subpixel>> {
    let (w, h) = src.dimensions();
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (wf, hf) = (w as f64, h as f64);
    let out_w = (wf * cos.abs() + hf * sin.abs()).round().max(1.0) as u32;
    let out_h = (wf * sin.abs() + hf * cos.abs()).round().max(1.0) as u32;

    let (cx, cy) = (wf / 2.0, hf / 2.0);
    let (ox, oy) = (out_w as f64 / 2.0, out_h as f64 / 2.0);

    let mut out = ImageBuffer::new(out_w, out_h);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        // inverse mapping; y grows downwards
        let dx = x as f64 + 0.5 - ox;
        let dy = y as f64 + 0.5 - oy;
        let sx = cos * dx - sin * dy + cx;
        let sy = sin * dx + cos * dy + cy;
        if sx >= 0.0 && sy >= 0.0 && sx < wf && sy < hf {
            *pixel = *src.get_pixel(sx as u32, sy as u32);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        RasterImageCodec::new().encode(image).unwrap().bytes
    }

    #[test]
    fn inspects_rgb_png() {
        let bytes = png_bytes(&DynamicImage::ImageRgb8(RgbImage::new(100, 100)));
        let decoded = RasterImageCodec::new().inspect(&bytes).unwrap();
        assert_eq!(
            decoded.info,
            ImageInfo {
                width: 100,
                height: 100,
                channels: 3
            }
        );
        assert_eq!(decoded.extension, "png");
    }

    #[test]
    fn reports_channels_per_color_type() {
        let codec = RasterImageCodec::new();
        let gray = png_bytes(&DynamicImage::ImageLuma8(GrayImage::new(4, 2)));
        let rgba = png_bytes(&DynamicImage::ImageRgba8(RgbaImage::new(4, 2)));
        assert_eq!(codec.inspect(&gray).unwrap().info.channels, 1);
        assert_eq!(codec.inspect(&rgba).unwrap().info.channels, 4);
    }

    #[test]
    fn rejects_non_image_bytes() {
        let err = RasterImageCodec::new()
            .inspect(b"definitely not an image")
            .unwrap_err();
        assert!(matches!(err, CodecError::Unrecognized(_)), "{err:?}");
    }

    #[test]
    fn quarter_turn_is_counter_clockwise() {
        let mut src = RgbImage::new(4, 2);
        src.put_pixel(3, 0, Rgb([255, 0, 0])); // top-right
        let rotated = rotate_ccw(&DynamicImage::ImageRgb8(src), 90).to_rgb8();

        assert_eq!(rotated.dimensions(), (2, 4));
        assert_eq!(*rotated.get_pixel(0, 0), Rgb([255, 0, 0]));
    }

    #[test]
    fn angles_normalise_modulo_full_turn() {
        let src = DynamicImage::ImageRgb8(RgbImage::new(6, 3));
        assert_eq!(rotate_ccw(&src, -90).dimensions(), (3, 6));
        assert_eq!(rotate_ccw(&src, 450).dimensions(), (3, 6));
        assert_eq!(rotate_ccw(&src, 360).dimensions(), (6, 3));
        assert_eq!(rotate_ccw(&src, 0).dimensions(), (6, 3));
    }

    #[test]
    fn oblique_angle_expands_canvas() {
        let src = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, Rgb([9, 9, 9])));
        let rotated = rotate_ccw(&src, 45);

        assert_eq!(rotated.dimensions(), (141, 141));
        assert_eq!(rotated.color().channel_count(), 3);
        let rgb = rotated.to_rgb8();
        assert_eq!(*rgb.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*rgb.get_pixel(70, 70), Rgb([9, 9, 9]));
    }

    #[test]
    fn oblique_angle_keeps_alpha_channel() {
        let src = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 20, Rgba([1, 2, 3, 255])));
        let rotated = rotate_ccw(&src, 30);
        assert_eq!(rotated.color().channel_count(), 4);
        assert_eq!(*rotated.to_rgba8().get_pixel(0, 0), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn oblique_angle_keeps_sixteen_bit_rgb() {
        let src = DynamicImage::ImageRgb16(ImageBuffer::from_pixel(
            10,
            10,
            Rgb([1000u16, 2000, 3000]),
        ));
        let rotated = rotate_ccw(&src, 45);

        assert_eq!(rotated.color(), image::ColorType::Rgb16);
        assert_eq!(rotated.color().channel_count(), 3);
        assert_eq!(
            *rotated.as_rgb16().unwrap().get_pixel(7, 7),
            Rgb([1000, 2000, 3000])
        );
    }

    #[test]
    fn rotate_reencodes_as_png() {
        let bytes = png_bytes(&DynamicImage::ImageLuma8(GrayImage::from_pixel(
            8,
            2,
            Luma([200]),
        )));
        let encoded = RasterImageCodec::new().rotate(&bytes, 270).unwrap();

        assert_eq!(encoded.extension, "png");
        assert_eq!(
            encoded.info,
            ImageInfo {
                width: 2,
                height: 8,
                channels: 1
            }
        );
        let reread = RasterImageCodec::new().inspect(&encoded.bytes).unwrap();
        assert_eq!(reread.info, encoded.info);
    }
}
