use std::fmt;

use serde::{Deserialize, Serialize};

/// Byte layout of one pixel.
///
/// `X` bytes are padding: written as 255, read back as an opaque alpha.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgba,
    Argb,
    Bgra,
    Abgr,
    Rgbx,
    Xrgb,
    Bgrx,
    Xbgr,
    Rgb,
    Bgr,
    Alpha,
    Greyscale,
}

/// Byte offsets of each channel inside one pixel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Channels {
    pub rgb: Option<[usize; 3]>,
    pub alpha: Option<usize>,
    pub pad: Option<usize>,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 12] = [
        PixelFormat::Rgba,
        PixelFormat::Argb,
        PixelFormat::Bgra,
        PixelFormat::Abgr,
        PixelFormat::Rgbx,
        PixelFormat::Xrgb,
        PixelFormat::Bgrx,
        PixelFormat::Xbgr,
        PixelFormat::Rgb,
        PixelFormat::Bgr,
        PixelFormat::Alpha,
        PixelFormat::Greyscale,
    ];

    /// Bytes per pixel.
    #[inline]
    pub const fn bpp(self) -> usize {
        match self {
            PixelFormat::Rgba
            | PixelFormat::Argb
            | PixelFormat::Bgra
            | PixelFormat::Abgr
            | PixelFormat::Rgbx
            | PixelFormat::Xrgb
            | PixelFormat::Bgrx
            | PixelFormat::Xbgr => 4,
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Alpha | PixelFormat::Greyscale => 1,
        }
    }

    #[inline]
    pub const fn has_alpha(self) -> bool {
        matches!(
            self,
            PixelFormat::Rgba
                | PixelFormat::Argb
                | PixelFormat::Bgra
                | PixelFormat::Abgr
                | PixelFormat::Alpha
        )
    }

    #[inline]
    pub const fn has_color(self) -> bool {
        !matches!(self, PixelFormat::Alpha | PixelFormat::Greyscale)
    }

    pub(crate) const fn channels(self) -> Channels {
        const fn c(rgb: [usize; 3], alpha: Option<usize>, pad: Option<usize>) -> Channels {
            Channels { rgb: Some(rgb), alpha, pad }
        }
        match self {
            PixelFormat::Rgba => c([0, 1, 2], Some(3), None),
            PixelFormat::Argb => c([1, 2, 3], Some(0), None),
            PixelFormat::Bgra => c([2, 1, 0], Some(3), None),
            PixelFormat::Abgr => c([3, 2, 1], Some(0), None),
            PixelFormat::Rgbx => c([0, 1, 2], None, Some(3)),
            PixelFormat::Xrgb => c([1, 2, 3], None, Some(0)),
            PixelFormat::Bgrx => c([2, 1, 0], None, Some(3)),
            PixelFormat::Xbgr => c([3, 2, 1], None, Some(0)),
            PixelFormat::Rgb => c([0, 1, 2], None, None),
            PixelFormat::Bgr => c([2, 1, 0], None, None),
            PixelFormat::Alpha => Channels { rgb: None, alpha: Some(0), pad: None },
            PixelFormat::Greyscale => Channels { rgb: None, alpha: None, pad: None },
        }
    }

    /// Byte size of a `width` x `height` buffer in this format.
    #[inline]
    pub const fn buffer_size(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bpp()
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgba => "RGBA",
            PixelFormat::Argb => "ARGB",
            PixelFormat::Bgra => "BGRA",
            PixelFormat::Abgr => "ABGR",
            PixelFormat::Rgbx => "RGBX",
            PixelFormat::Xrgb => "XRGB",
            PixelFormat::Bgrx => "BGRX",
            PixelFormat::Xbgr => "XBGR",
            PixelFormat::Rgb => "RGB",
            PixelFormat::Bgr => "BGR",
            PixelFormat::Alpha => "Alpha",
            PixelFormat::Greyscale => "Greyscale",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_offsets_stay_inside_pixel() {
        for fmt in PixelFormat::ALL {
            let ch = fmt.channels();
            let bpp = fmt.bpp();
            for off in ch.rgb.into_iter().flatten().chain(ch.alpha).chain(ch.pad) {
                assert!(off < bpp, "{fmt}: offset {off} >= {bpp}");
            }
        }
    }

    #[test]
    fn alpha_formats() {
        assert!(PixelFormat::Argb.has_alpha());
        assert!(!PixelFormat::Xrgb.has_alpha());
        assert!(!PixelFormat::Greyscale.has_alpha());
        assert_eq!(PixelFormat::Bgr.buffer_size(4, 2), 24);
    }
}
