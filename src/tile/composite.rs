//! Layer compositing.
//!
//! Layers are drawn in the order they were configured: the first layer that
//! produced a buffer becomes the canvas, every later one is drawn over it
//! with source-over blending scaled by the layer opacity.

use std::sync::Arc;

use crate::buffer::PixelBuffer;

/// One layer's decoded image for a tile.
pub(crate) struct Contribution {
    pub id: Arc<str>,
    pub opacity: f32,
    pub buffer: PixelBuffer,
}

/// Result of compositing one tile.
pub(crate) struct Composite {
    /// The canvas, `None` when nothing contributed
    pub image: Option<PixelBuffer>,

    /// Layers drawn into `image`, bottom first
    pub layer_ids: Vec<Arc<str>>,

    /// Layer buffers that were drawn and are no longer needed
    pub spare: Vec<PixelBuffer>,
}

/// Composite contributions, given bottom layer first.
pub(crate) fn composite(contributions: Vec<Contribution>) -> Composite {
    let mut layers = contributions.into_iter();

    let Some(base) = layers.next() else {
        return Composite {
            image: None,
            layer_ids: Vec::new(),
            spare: Vec::new(),
        };
    };

    let mut canvas = base.buffer;
    apply_opacity(&mut canvas, base.opacity);

    let mut layer_ids = vec![base.id];
    let mut spare = Vec::new();

    for layer in layers {
        draw_over(&mut canvas, &layer.buffer, layer.opacity);
        layer_ids.push(layer.id);
        spare.push(layer.buffer);
    }

    Composite {
        image: Some(canvas),
        layer_ids,
        spare,
    }
}

/// Scale the alpha channel of `buffer` by `opacity`.
///
/// Opaque formats are left untouched.
fn apply_opacity(buffer: &mut PixelBuffer, opacity: f32) {
    if opacity >= 1.0 || !buffer.format().has_alpha() {
        return;
    }
    for y in 0..buffer.height() {
        for x in 0..buffer.width() {
            let [r, g, b, a] = buffer.pixel(x, y);
            let a = (a as f32 * opacity).round() as u8;
            buffer.set_pixel(x, y, [r, g, b, a]);
        }
    }
}

/// Draw `src` over the overlapping top-left region of `dst`.
fn draw_over(dst: &mut PixelBuffer, src: &PixelBuffer, opacity: f32) {
    let width = dst.width().min(src.width());
    let height = dst.height().min(src.height());

    // Opaque source of the same layout: plain row copies
    if opacity >= 1.0 && src.format() == dst.format() && !src.format().has_alpha() {
        let bpp = src.format().bytes_per_pixel();
        let row_len = width as usize * bpp;
        let src_stride = src.width() as usize * bpp;
        let dst_stride = dst.width() as usize * bpp;
        for y in 0..height as usize {
            let from = &src.pixels()[y * src_stride..y * src_stride + row_len];
            dst.pixels_mut()[y * dst_stride..y * dst_stride + row_len].copy_from_slice(from);
        }
        return;
    }

    for y in 0..height {
        for x in 0..width {
            let blended = blend(src.pixel(x, y), dst.pixel(x, y), opacity);
            dst.set_pixel(x, y, blended);
        }
    }
}

/// Source-over blend of one RGBA pixel.
pub(crate) fn blend(src: [u8; 4], dst: [u8; 4], opacity: f32) -> [u8; 4] {
    let src_alpha = src[3] as f32 / 255.0 * opacity;
    let dst_alpha = dst[3] as f32 / 255.0;
    let out_alpha = src_alpha + dst_alpha * (1.0 - src_alpha);

    if out_alpha <= f32::EPSILON {
        return [0, 0, 0, 0];
    }

    let channel = |s: u8, d: u8| -> u8 {
        let value =
            (s as f32 * src_alpha + d as f32 * dst_alpha * (1.0 - src_alpha)) / out_alpha;
        value.round().clamp(0.0, 255.0) as u8
    };

    [
        channel(src[0], dst[0]),
        channel(src[1], dst[1]),
        channel(src[2], dst[2]),
        (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}
