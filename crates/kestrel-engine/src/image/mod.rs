//! CPU-side pixel buffers.
//!
//! - `PixelFormat` describes the byte layout of one pixel
//! - `convert` holds the per-pixel conversion path and rectangle operations
//! - `decode` turns PNG/JPEG bytes into an `Image`

mod convert;
mod decode;
mod format;

pub use convert::{
    blit, clear, convert, correct_copy_rects, correct_rect, decode_pixel, encode_pixel, fill_rect,
    quantize, read_pixel, write_pixel, write_rect, write_rect_per_pixel, PixelRect, PixelView, PixelViewMut,
};
pub use decode::{decode, probe, ImageInfo};
pub use format::PixelFormat;

use crate::coords::Color;

/// Image decode / resource read failures.
#[derive(thiserror::Error, Debug)]
pub enum ImageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("buffer of {actual} bytes does not hold {width}x{height} {format} pixels")]
    BufferSize {
        width: u32,
        height: u32,
        format: PixelFormat,
        actual: usize,
    },
}

/// Owned pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Image {
    /// Blank image filled with `color`.
    pub fn filled(width: u32, height: u32, format: PixelFormat, color: Color) -> Self {
        let mut img = Self {
            width,
            height,
            format,
            data: vec![0; format.buffer_size(width, height)],
        };
        if color != Color::CLEAR {
            img.fill_rect(PixelRect::of_size(width, height), color);
        }
        img
    }

    pub fn from_raw(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, ImageError> {
        if data.len() != format.buffer_size(width, height) {
            return Err(ImageError::BufferSize { width, height, format, actual: data.len() });
        }
        Ok(Self { width, height, format, data })
    }

    #[inline]
    pub fn view(&self) -> PixelView<'_> {
        PixelView::new(&self.data, self.width, self.height, self.format)
    }

    #[inline]
    pub fn view_mut(&mut self) -> PixelViewMut<'_> {
        PixelViewMut::new(&mut self.data, self.width, self.height, self.format)
    }

    #[inline]
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    pub fn get_pixel(&self, x: i32, y: i32) -> Color {
        read_pixel(&self.view(), x, y)
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, color: Color) {
        write_pixel(&mut self.view_mut(), x, y, color);
    }

    pub fn fill_rect(&mut self, rect: PixelRect, color: Color) {
        fill_rect(&mut self.view_mut(), rect, color);
    }

    pub fn clear(&mut self) {
        clear(&mut self.view_mut());
    }

    /// Returns this image in `format`, cloning only when the layout differs.
    pub fn converted(self, format: PixelFormat) -> Image {
        if self.format == format {
            return self;
        }
        let data = convert(&self.view(), format);
        Image { width: self.width, height: self.height, format, data }
    }

    /// Bilinear sample at fractional pixel coordinates (pixel centers at +0.5).
    pub fn get_interpolated_pixel(&self, fx: f32, fy: f32) -> Color {
        let x = fx - 0.5;
        let y = fy - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let tx = x - x0;
        let ty = y - y0;
        let (x0, y0) = (x0 as i32, y0 as i32);

        let clamp_x = |x: i32| x.clamp(0, self.width as i32 - 1);
        let clamp_y = |y: i32| y.clamp(0, self.height as i32 - 1);
        if self.width == 0 || self.height == 0 {
            return Color::CLEAR;
        }

        let p = |x: i32, y: i32| self.get_pixel(clamp_x(x), clamp_y(y));
        let top = p(x0, y0).lerp(p(x0 + 1, y0), tx);
        let bottom = p(x0, y0 + 1).lerp(p(x0 + 1, y0 + 1), tx);
        top.lerp(bottom, ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filled_uses_creation_color() {
        let img = Image::filled(2, 2, PixelFormat::Bgra, Color::RED);
        assert_eq!(img.get_pixel(1, 1), Color::RED);
        assert_eq!(&img.data[..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn from_raw_checks_length() {
        assert!(Image::from_raw(2, 2, PixelFormat::Rgb, vec![0; 11]).is_err());
        assert!(Image::from_raw(2, 2, PixelFormat::Rgb, vec![0; 12]).is_ok());
    }

    #[test]
    fn interpolation_midpoint() {
        let mut img = Image::filled(2, 1, PixelFormat::Rgba, Color::BLACK);
        img.set_pixel(1, 0, Color::WHITE);
        assert_eq!(img.get_interpolated_pixel(0.5, 0.5), Color::BLACK);
        assert_eq!(img.get_interpolated_pixel(1.5, 0.5), Color::WHITE);
        assert_eq!(img.get_interpolated_pixel(1.0, 0.5), Color::rgb(128, 128, 128));
    }
}
