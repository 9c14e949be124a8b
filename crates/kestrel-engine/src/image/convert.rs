use crate::coords::Color;

use super::PixelFormat;

/// Integer pixel rectangle. Position may be negative before clipping.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl PixelRect {
    #[inline]
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    #[inline]
    pub const fn of_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.w <= 0 || self.h <= 0
    }
}

/// Borrowed pixel buffer with its dimensions and layout.
#[derive(Debug, Copy, Clone)]
pub struct PixelView<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Mutable counterpart of [`PixelView`].
#[derive(Debug)]
pub struct PixelViewMut<'a> {
    pub data: &'a mut [u8],
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl<'a> PixelView<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32, format: PixelFormat) -> Self {
        Self { data, width, height, format }
    }

    #[inline]
    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        pixel_offset(self.width, self.height, self.format, x, y)
    }
}

impl<'a> PixelViewMut<'a> {
    pub fn new(data: &'a mut [u8], width: u32, height: u32, format: PixelFormat) -> Self {
        Self { data, width, height, format }
    }

    #[inline]
    pub fn as_view(&self) -> PixelView<'_> {
        PixelView::new(self.data, self.width, self.height, self.format)
    }

    #[inline]
    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        pixel_offset(self.width, self.height, self.format, x, y)
    }
}

#[inline]
fn pixel_offset(width: u32, height: u32, format: PixelFormat, x: i32, y: i32) -> Option<usize> {
    if x < 0 || y < 0 || x as u32 >= width || y as u32 >= height {
        return None;
    }
    Some((y as usize * width as usize + x as usize) * format.bpp())
}

// ── single pixel codec ───────────────────────────────────────────────────

/// Decodes one pixel. `px` must hold at least `format.bpp()` bytes.
pub fn decode_pixel(format: PixelFormat, px: &[u8]) -> Color {
    let ch = format.channels();
    match (ch.rgb, format) {
        (Some([r, g, b]), _) => Color::new(px[r], px[g], px[b], ch.alpha.map_or(255, |a| px[a])),
        (None, PixelFormat::Alpha) => Color::new(255, 255, 255, px[0]),
        (None, _) => Color::rgb(px[0], px[0], px[0]),
    }
}

/// Encodes one pixel. `px` must hold at least `format.bpp()` bytes.
pub fn encode_pixel(format: PixelFormat, color: Color, px: &mut [u8]) {
    let ch = format.channels();
    match (ch.rgb, format) {
        (Some([r, g, b]), _) => {
            px[r] = color.r;
            px[g] = color.g;
            px[b] = color.b;
            if let Some(a) = ch.alpha {
                px[a] = color.a;
            }
            if let Some(x) = ch.pad {
                px[x] = 255;
            }
        }
        (None, PixelFormat::Alpha) => px[0] = color.a,
        (None, _) => px[0] = ((color.r as u16 + color.g as u16 + color.b as u16) / 3) as u8,
    }
}

/// The color `format` stores when asked to hold `color`.
pub fn quantize(format: PixelFormat, color: Color) -> Color {
    let mut px = [0u8; 4];
    encode_pixel(format, color, &mut px);
    decode_pixel(format, &px)
}

/// Out-of-bounds (or a short buffer) yields `Color::CLEAR`.
pub fn read_pixel(view: &PixelView<'_>, x: i32, y: i32) -> Color {
    let bpp = view.format.bpp();
    view.offset(x, y)
        .and_then(|o| view.data.get(o..o + bpp))
        .map_or(Color::CLEAR, |px| decode_pixel(view.format, px))
}

/// Out-of-bounds writes are ignored.
pub fn write_pixel(view: &mut PixelViewMut<'_>, x: i32, y: i32, color: Color) {
    let bpp = view.format.bpp();
    let format = view.format;
    if let Some(px) = view.offset(x, y).and_then(|o| view.data.get_mut(o..o + bpp)) {
        encode_pixel(format, color, px);
    }
}

// ── whole-buffer conversion ──────────────────────────────────────────────

/// Converts a whole buffer into `dst_format`.
pub fn convert(src: &PixelView<'_>, dst_format: PixelFormat) -> Vec<u8> {
    let mut out = vec![0u8; dst_format.buffer_size(src.width, src.height)];
    let mut dst = PixelViewMut::new(&mut out, src.width, src.height, dst_format);
    write_rect(src, PixelRect::of_size(src.width, src.height), &mut dst, 0, 0);
    out
}

// ── clipping ─────────────────────────────────────────────────────────────

/// Clips `rect` to `[0, width) x [0, height)`. `None` when nothing remains.
pub fn correct_rect(rect: PixelRect, width: u32, height: u32) -> Option<PixelRect> {
    let x0 = rect.x.max(0);
    let y0 = rect.y.max(0);
    let x1 = rect.x.saturating_add(rect.w).min(width as i32);
    let y1 = rect.y.saturating_add(rect.h).min(height as i32);
    let clipped = PixelRect::new(x0, y0, x1 - x0, y1 - y0);
    (!clipped.is_empty()).then_some(clipped)
}

/// Clips a copy of `src_rect` (inside a `src_w` x `src_h` buffer) to destination
/// position (`dx`, `dy`) inside a `dst_w` x `dst_h` buffer.
///
/// Returns the source rectangle and destination origin that remain valid on both sides.
pub fn correct_copy_rects(
    src_rect: PixelRect,
    src_w: u32,
    src_h: u32,
    dx: i32,
    dy: i32,
    dst_w: u32,
    dst_h: u32,
) -> Option<(PixelRect, i32, i32)> {
    let src = correct_rect(src_rect, src_w, src_h)?;
    // Destination origin of the clipped source. Widened so far-off positions clip
    // to nothing instead of wrapping.
    let ox = i64::from(dx) + i64::from(src.x) - i64::from(src_rect.x);
    let oy = i64::from(dy) + i64::from(src.y) - i64::from(src_rect.y);

    let (x0, x1) = clip_span(ox, src.w, dst_w)?;
    let (y0, y1) = clip_span(oy, src.h, dst_h)?;
    let clipped = PixelRect::new(
        src.x + (x0 - ox) as i32,
        src.y + (y0 - oy) as i32,
        (x1 - x0) as i32,
        (y1 - y0) as i32,
    );
    Some((clipped, x0 as i32, y0 as i32))
}

/// Intersects `[start, start + len)` with `[0, limit)`.
fn clip_span(start: i64, len: i32, limit: u32) -> Option<(i64, i64)> {
    let lo = start.max(0);
    let hi = (start + i64::from(len)).min(i64::from(limit));
    (hi > lo).then_some((lo, hi))
}

// ── rectangle operations ─────────────────────────────────────────────────

/// Copies `src_rect` of `src` into `dst` at (`dx`, `dy`), converting formats as needed.
///
/// Returns false when the clipped region is empty.
pub fn write_rect(
    src: &PixelView<'_>,
    src_rect: PixelRect,
    dst: &mut PixelViewMut<'_>,
    dx: i32,
    dy: i32,
) -> bool {
    let Some((sr, dx, dy)) =
        correct_copy_rects(src_rect, src.width, src.height, dx, dy, dst.width, dst.height)
    else {
        return false;
    };
    if !buffers_cover(src, dst) {
        log::warn!("write_rect: buffer shorter than its declared dimensions");
        return false;
    }

    if src.format == dst.format {
        copy_rows(src, sr, dst, dx, dy);
    } else {
        convert_rows(src, sr, dst, dx, dy);
    }
    true
}

/// Per-pixel reference path of [`write_rect`], without the same-format shortcut.
pub fn write_rect_per_pixel(
    src: &PixelView<'_>,
    src_rect: PixelRect,
    dst: &mut PixelViewMut<'_>,
    dx: i32,
    dy: i32,
) -> bool {
    let Some((sr, dx, dy)) =
        correct_copy_rects(src_rect, src.width, src.height, dx, dy, dst.width, dst.height)
    else {
        return false;
    };
    if !buffers_cover(src, dst) {
        return false;
    }
    convert_rows(src, sr, dst, dx, dy);
    true
}

fn buffers_cover(src: &PixelView<'_>, dst: &PixelViewMut<'_>) -> bool {
    src.data.len() >= src.format.buffer_size(src.width, src.height)
        && dst.data.len() >= dst.format.buffer_size(dst.width, dst.height)
}

fn copy_rows(src: &PixelView<'_>, sr: PixelRect, dst: &mut PixelViewMut<'_>, dx: i32, dy: i32) {
    let bpp = src.format.bpp();
    let row_bytes = sr.w as usize * bpp;
    let pad = src.format.channels().pad;

    for row in 0..sr.h {
        // Both offsets are in range: the rects were clipped above.
        let (Some(s), Some(d)) = (src.offset(sr.x, sr.y + row), dst.offset(dx, dy + row)) else {
            continue;
        };
        let out = &mut dst.data[d..d + row_bytes];
        out.copy_from_slice(&src.data[s..s + row_bytes]);
        if let Some(x) = pad {
            out.chunks_exact_mut(bpp).for_each(|px| px[x] = 255);
        }
    }
}

fn convert_rows(src: &PixelView<'_>, sr: PixelRect, dst: &mut PixelViewMut<'_>, dx: i32, dy: i32) {
    for row in 0..sr.h {
        for col in 0..sr.w {
            let c = read_pixel(src, sr.x + col, sr.y + row);
            write_pixel(dst, dx + col, dy + row, c);
        }
    }
}

/// Fills `rect` (clipped) with `color`.
pub fn fill_rect(dst: &mut PixelViewMut<'_>, rect: PixelRect, color: Color) {
    let Some(r) = correct_rect(rect, dst.width, dst.height) else {
        return;
    };
    let bpp = dst.format.bpp();
    let mut px = [0u8; 4];
    encode_pixel(dst.format, color, &mut px);
    let px = &px[..bpp];

    for row in 0..r.h {
        let Some(start) = dst.offset(r.x, r.y + row) else {
            continue;
        };
        let end = start + r.w as usize * bpp;
        if let Some(line) = dst.data.get_mut(start..end) {
            line.chunks_exact_mut(bpp).for_each(|p| p.copy_from_slice(px));
        }
    }
}

/// Zeroes the whole buffer.
pub fn clear(dst: &mut PixelViewMut<'_>) {
    dst.data.fill(0);
}

/// Alpha-blends `src_rect` of `src` over `dst` at (`dx`, `dy`).
///
/// `alpha` scales the source alpha; 255 uses the source as-is.
pub fn blit(
    src: &PixelView<'_>,
    src_rect: PixelRect,
    dst: &mut PixelViewMut<'_>,
    dx: i32,
    dy: i32,
    alpha: u8,
) -> bool {
    let Some((sr, dx, dy)) =
        correct_copy_rects(src_rect, src.width, src.height, dx, dy, dst.width, dst.height)
    else {
        return false;
    };

    for row in 0..sr.h {
        for col in 0..sr.w {
            let s = read_pixel(src, sr.x + col, sr.y + row);
            let d = read_pixel(&dst.as_view(), dx + col, dy + row);
            write_pixel(dst, dx + col, dy + row, blend_over(s, d, alpha));
        }
    }
    true
}

#[inline]
fn blend_over(src: Color, dst: Color, alpha: u8) -> Color {
    let sa = src.a as u32 * alpha as u32 / 255;
    let ia = 255 - sa;
    let mix = |s: u8, d: u8| ((s as u32 * sa + d as u32 * ia + 127) / 255) as u8;
    Color::new(
        mix(src.r, dst.r),
        mix(src.g, dst.g),
        mix(src.b, dst.b),
        (sa + dst.a as u32 * ia / 255).min(255) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(format: PixelFormat, w: u32, h: u32) -> Vec<u8> {
        (0..format.buffer_size(w, h)).map(|i| (i * 37 + 11) as u8).collect()
    }

    #[test]
    fn round_trip_every_format() {
        let c = Color::new(200, 100, 50, 128);
        for fmt in PixelFormat::ALL {
            let mut buf = vec![0u8; fmt.buffer_size(2, 2)];
            let mut v = PixelViewMut::new(&mut buf, 2, 2, fmt);
            write_pixel(&mut v, 1, 1, c);
            let got = read_pixel(&v.as_view(), 1, 1);
            let expected = match fmt {
                PixelFormat::Alpha => Color::new(255, 255, 255, 128),
                PixelFormat::Greyscale => Color::rgb(116, 116, 116),
                f if f.has_alpha() => c,
                _ => c.with_alpha(255),
            };
            assert_eq!(got, expected, "{fmt}");
        }
    }

    #[test]
    fn padding_byte_written_as_opaque() {
        let mut buf = [0u8; 4];
        encode_pixel(PixelFormat::Xrgb, Color::new(1, 2, 3, 0), &mut buf);
        assert_eq!(buf, [255, 1, 2, 3]);
        assert_eq!(decode_pixel(PixelFormat::Xrgb, &buf), Color::rgb(1, 2, 3));
    }

    #[test]
    fn out_of_bounds_is_defined() {
        let mut buf = vec![7u8; PixelFormat::Rgba.buffer_size(2, 2)];
        let before = buf.clone();
        let mut v = PixelViewMut::new(&mut buf, 2, 2, PixelFormat::Rgba);
        write_pixel(&mut v, 2, 0, Color::RED);
        write_pixel(&mut v, -1, 0, Color::RED);
        assert_eq!(read_pixel(&v.as_view(), 0, 5), Color::CLEAR);
        assert_eq!(buf, before);
    }

    #[test]
    fn same_format_fast_path_matches_per_pixel_path() {
        for fmt in PixelFormat::ALL {
            let src = pattern(fmt, 5, 4);
            let src = PixelView::new(&src, 5, 4, fmt);
            let rect = PixelRect::new(1, 1, 3, 3);

            let mut fast = pattern(fmt, 6, 6);
            let mut slow = fast.clone();
            assert!(write_rect(&src, rect, &mut PixelViewMut::new(&mut fast, 6, 6, fmt), 2, 1));
            assert!(write_rect_per_pixel(
                &src,
                rect,
                &mut PixelViewMut::new(&mut slow, 6, 6, fmt),
                2,
                1
            ));
            assert_eq!(fast, slow, "{fmt}");
        }
    }

    #[test]
    fn convert_rgba_to_bgr_and_back() {
        let rgba = [10, 20, 30, 40, 50, 60, 70, 80];
        let bgr = convert(&PixelView::new(&rgba, 2, 1, PixelFormat::Rgba), PixelFormat::Bgr);
        assert_eq!(bgr, vec![30, 20, 10, 70, 60, 50]);
        let back = convert(&PixelView::new(&bgr, 2, 1, PixelFormat::Bgr), PixelFormat::Rgba);
        assert_eq!(back, vec![10, 20, 30, 255, 50, 60, 70, 255]);
    }

    #[test]
    fn copy_rects_are_clipped_on_both_sides() {
        assert_eq!(
            correct_copy_rects(PixelRect::new(-2, 0, 4, 4), 8, 8, 0, 0, 8, 8),
            Some((PixelRect::new(0, 0, 2, 4), 2, 0))
        );
        assert_eq!(
            correct_copy_rects(PixelRect::new(0, 0, 4, 4), 8, 8, 6, 6, 8, 8),
            Some((PixelRect::new(0, 0, 2, 2), 6, 6))
        );
        assert_eq!(correct_copy_rects(PixelRect::new(0, 0, 4, 4), 8, 8, 9, 0, 8, 8), None);
    }

    #[test]
    fn copy_rects_far_off_the_destination_clip_to_nothing() {
        let src_rect = PixelRect::new(-2, 0, 4, 1);
        assert_eq!(correct_copy_rects(src_rect, 4, 1, i32::MAX - 1, 0, 4, 4), None);
        assert_eq!(correct_copy_rects(src_rect, 4, 1, 0, i32::MIN, 4, 4), None);
        assert_eq!(
            correct_copy_rects(PixelRect::new(i32::MIN, 0, i32::MAX, 1), 4, 1, 0, 0, 4, 4),
            None
        );

        let src = [9u8; 4];
        let mut buf = [0u8; 16];
        let mut dst = PixelViewMut::new(&mut buf, 4, 4, PixelFormat::Greyscale);
        let view = PixelView::new(&src, 4, 1, PixelFormat::Greyscale);
        assert!(!write_rect(&view, src_rect, &mut dst, i32::MAX - 1, 0));
        assert_eq!(buf, [0u8; 16]);
    }

    #[test]
    fn fill_rect_clips() {
        let mut buf = vec![0u8; PixelFormat::Rgb.buffer_size(3, 1)];
        let mut v = PixelViewMut::new(&mut buf, 3, 1, PixelFormat::Rgb);
        fill_rect(&mut v, PixelRect::new(1, -5, 10, 10), Color::BLUE);
        assert_eq!(buf, vec![0, 0, 0, 0, 0, 255, 0, 0, 255]);
    }

    #[test]
    fn blit_blends_with_source_alpha() {
        let src = [255, 0, 0, 128];
        let mut dst = [0, 0, 255, 255];
        let mut v = PixelViewMut::new(&mut dst, 1, 1, PixelFormat::Rgba);
        assert!(blit(&PixelView::new(&src, 1, 1, PixelFormat::Rgba), PixelRect::of_size(1, 1), &mut v, 0, 0, 255));
        assert_eq!(dst, [128, 0, 127, 255]);
    }
}
