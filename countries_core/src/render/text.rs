//! Glyph rendering with swash, alpha-blended onto an `RgbaImage`.

use image::{Rgba, RgbaImage};
use swash::FontRef;
use swash::scale::{Render, ScaleContext, Source, StrikeWith};
use swash::shape::ShapeContext;
use swash::zeno::{Format, Vector};

pub(crate) struct TextPainter<'a> {
    font: FontRef<'a>,
    shape: ShapeContext,
    scale: ScaleContext,
}

impl<'a> TextPainter<'a> {
    /// `None` if `font_data` is not a usable font.
    pub(crate) fn new(font_data: &'a [u8]) -> Option<Self> {
        Some(Self {
            font: FontRef::from_index(font_data, 0)?,
            shape: ShapeContext::new(),
            scale: ScaleContext::new(),
        })
    }

    pub(crate) fn measure(&mut self, text: &str, size: f32) -> f32 {
        let mut shaper = self.shape.builder(self.font).size(size).build();
        shaper.add_str(text);
        let mut width = 0.0;
        shaper.shape_with(|cluster| {
            for glyph in cluster.glyphs {
                width += glyph.advance;
            }
        });
        width
    }

    /// Draw `text` with its top-left corner at (`x`, `y`).
    pub(crate) fn draw(
        &mut self,
        img: &mut RgbaImage,
        text: &str,
        x: i32,
        y: i32,
        size: f32,
        color: Rgba<u8>,
    ) {
        let mut shaper = self.shape.builder(self.font).size(size).build();
        shaper.add_str(text);
        let mut scaler = self.scale.builder(self.font).size(size).build();

        let mut pen_x = x as f32;
        let baseline = y as f32 + size;

        shaper.shape_with(|cluster| {
            for glyph in cluster.glyphs {
                // Mask sources only; color glyphs would yield RGBA data.
                let rendered = Render::new(&[Source::Bitmap(StrikeWith::BestFit), Source::Outline])
                    .format(Format::Alpha)
                    .offset(Vector::new(glyph.x, glyph.y))
                    .render(&mut scaler, glyph.id);

                if let Some(mask) = rendered {
                    let left = (pen_x + mask.placement.left as f32) as i32;
                    let top = (baseline - mask.placement.top as f32) as i32;
                    blend_mask(
                        img,
                        &mask.data,
                        mask.placement.width,
                        mask.placement.height,
                        left,
                        top,
                        color,
                    );
                }
                pen_x += glyph.advance;
            }
        });
    }
}

fn blend_mask(
    img: &mut RgbaImage,
    alpha: &[u8],
    width: u32,
    height: u32,
    left: i32,
    top: i32,
    color: Rgba<u8>,
) {
    for py in 0..height {
        for px in 0..width {
            let Some(&a) = alpha.get((py * width + px) as usize) else {
                continue;
            };
            if a == 0 {
                continue;
            }
            let dx = left + px as i32;
            let dy = top + py as i32;
            if dx < 0 || dy < 0 || dx as u32 >= img.width() || dy as u32 >= img.height() {
                continue;
            }
            let dest = img.get_pixel_mut(dx as u32, dy as u32);
            let a = f32::from(a) / 255.0;
            for c in 0..3 {
                dest[c] = (f32::from(color[c]) * a + f32::from(dest[c]) * (1.0 - a)) as u8;
            }
            dest[3] = 255;
        }
    }
}
