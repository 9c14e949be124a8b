use std::io::Cursor;

use image::{ColorType, ImageDecoder, ImageReader};

use super::{Image, ImageError, PixelFormat};

/// Header-only metadata of an encoded image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// Format `decode` will produce for these bytes.
    pub format: PixelFormat,
}

fn format_of(color: ColorType) -> PixelFormat {
    if color.has_alpha() {
        PixelFormat::Rgba
    } else if !color.has_color() {
        PixelFormat::Greyscale
    } else {
        PixelFormat::Rgb
    }
}

/// Reads dimensions and target format without decoding pixels.
pub fn probe(bytes: &[u8]) -> Result<ImageInfo, ImageError> {
    let decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    let (width, height) = decoder.dimensions();
    Ok(ImageInfo { width, height, format: format_of(decoder.color_type()) })
}

/// Decodes PNG/JPEG bytes.
///
/// Images with an alpha channel become `Rgba`, plain grey images `Greyscale`,
/// everything else `Rgb`.
pub fn decode(bytes: &[u8]) -> Result<Image, ImageError> {
    let img = image::load_from_memory(bytes)?;
    let color = img.color();
    let (width, height) = (img.width(), img.height());

    let format = format_of(color);
    let data = match format {
        PixelFormat::Rgba => img.into_rgba8().into_raw(),
        PixelFormat::Greyscale => img.into_luma8().into_raw(),
        _ => img.into_rgb8().into_raw(),
    };

    Image::from_raw(width, height, format, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Color;

    fn encode_png(img: image::DynamicImage) -> Vec<u8> {
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png)
            .expect("png encode");
        out.into_inner()
    }

    #[test]
    fn decodes_rgba_png() {
        let mut src = image::RgbaImage::new(2, 1);
        src.put_pixel(1, 0, image::Rgba([1, 2, 3, 4]));
        let img = decode(&encode_png(image::DynamicImage::ImageRgba8(src))).expect("decode");
        assert_eq!((img.width, img.height, img.format), (2, 1, PixelFormat::Rgba));
        assert_eq!(img.get_pixel(1, 0), Color::new(1, 2, 3, 4));
    }

    #[test]
    fn decodes_grey_png_as_greyscale() {
        let src = image::GrayImage::from_pixel(1, 1, image::Luma([90]));
        let img = decode(&encode_png(image::DynamicImage::ImageLuma8(src))).expect("decode");
        assert_eq!(img.format, PixelFormat::Greyscale);
        assert_eq!(img.get_pixel(0, 0), Color::rgb(90, 90, 90));
    }

    #[test]
    fn probe_reads_header_only() {
        let src = image::RgbImage::new(7, 3);
        let info = probe(&encode_png(image::DynamicImage::ImageRgb8(src))).expect("probe");
        assert_eq!(info, ImageInfo { width: 7, height: 3, format: PixelFormat::Rgb });
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(probe(b"definitely not an image").is_err());
        assert!(decode(b"definitely not an image").is_err());
    }
}
