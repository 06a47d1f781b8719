use crate::foundation::core::{Affine, Canvas, Rect, SurfaceSize, Vec2};
use crate::foundation::error::{StagecastError, StagecastResult};
use crate::render::graphics::GraphicsContext;
use crate::scene::item::Scene;
use std::path::Path;

/// A rendered RGBA8 frame.
#[derive(Clone, Debug)]
pub struct FrameRGBA {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major pixel bytes, `width * height * 4` long.
    pub data: Vec<u8>,
    /// `true` when color channels are premultiplied by alpha.
    pub premultiplied: bool,
}

impl FrameRGBA {
    /// Pixel at `(x, y)`, `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    /// Write the frame as a PNG, creating parent directories.
    pub fn write_png(&self, path: &Path) -> StagecastResult<()> {
        use anyhow::Context as _;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir '{}'", parent.display()))?;
        }
        image::save_buffer_with_format(
            path,
            &self.data,
            self.width,
            self.height,
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("write png '{}'", path.display()))?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Ortho {
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Viewport {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

/// CPU framebuffer implementing [`GraphicsContext`].
///
/// Pixels are premultiplied RGBA8; fills are composited with source-over.
#[derive(Clone, Debug)]
pub struct RasterSurface {
    width: u32,
    height: u32,
    data: Vec<u8>,
    projection: Ortho,
    viewport: Viewport,
    projection_stack: Vec<Ortho>,
    viewport_stack: Vec<Viewport>,
}

impl RasterSurface {
    /// Transparent surface of `width` x `height` pixels.
    pub fn new(width: u32, height: u32) -> StagecastResult<Self> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| StagecastError::validation("raster surface size overflow"))?;
        Ok(Self {
            width,
            height,
            data: vec![0; len],
            projection: Ortho {
                left: 0.0,
                right: f64::from(width),
                top: 0.0,
                bottom: f64::from(height),
            },
            viewport: Viewport {
                x: 0,
                y: 0,
                width,
                height,
            },
            projection_stack: Vec::new(),
            viewport_stack: Vec::new(),
        })
    }

    /// Current projection-to-pixel transform.
    pub fn transform(&self) -> Affine {
        let p = self.projection;
        let v = self.viewport;
        let pw = p.right - p.left;
        let ph = p.bottom - p.top;
        if pw == 0.0 || ph == 0.0 {
            return Affine::scale(0.0);
        }
        Affine::translate(Vec2::new(f64::from(v.x), f64::from(v.y)))
            * Affine::scale_non_uniform(f64::from(v.width) / pw, f64::from(v.height) / ph)
            * Affine::translate(Vec2::new(-p.left, -p.top))
    }

    /// Pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    /// Depth of the viewport and projection stacks.
    pub fn stack_depth(&self) -> (usize, usize) {
        (self.viewport_stack.len(), self.projection_stack.len())
    }

    /// Copy out the framebuffer.
    pub fn to_frame(&self) -> FrameRGBA {
        FrameRGBA {
            width: self.width,
            height: self.height,
            data: self.data.clone(),
            premultiplied: true,
        }
    }

    /// Consume the surface into a frame.
    pub fn into_frame(self) -> FrameRGBA {
        FrameRGBA {
            width: self.width,
            height: self.height,
            data: self.data,
            premultiplied: true,
        }
    }

    fn clip_rect(&self) -> Rect {
        let v = self.viewport;
        let vp = Rect::new(
            f64::from(v.x),
            f64::from(v.y),
            f64::from(v.x) + f64::from(v.width),
            f64::from(v.y) + f64::from(v.height),
        );
        vp.intersect(Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height)))
    }
}

impl GraphicsContext for RasterSurface {
    fn surface_size(&self) -> SurfaceSize {
        SurfaceSize::new(self.width, self.height)
    }

    fn push_viewport(&mut self) {
        self.viewport_stack.push(self.viewport);
    }

    fn pop_viewport(&mut self) {
        if let Some(v) = self.viewport_stack.pop() {
            self.viewport = v;
        }
    }

    fn push_projection(&mut self) {
        self.projection_stack.push(self.projection);
    }

    fn pop_projection(&mut self) {
        if let Some(p) = self.projection_stack.pop() {
            self.projection = p;
        }
    }

    fn ortho(&mut self, left: f64, right: f64, top: f64, bottom: f64) {
        self.projection = Ortho {
            left,
            right,
            top,
            bottom,
        };
    }

    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.viewport = Viewport {
            x,
            y,
            width,
            height,
        };
    }

    fn reset_viewport(&mut self) {
        self.viewport = Viewport {
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        };
    }

    fn clear(&mut self, rgba: [u8; 4]) {
        let px = premul(rgba);
        for d in self.data.chunks_exact_mut(4) {
            d.copy_from_slice(&px);
        }
    }

    fn fill_rect(&mut self, rect: Rect, rgba: [u8; 4]) {
        if rgba[3] == 0 {
            return;
        }
        let r = self
            .transform()
            .transform_rect_bbox(rect)
            .intersect(self.clip_rect());
        if r.width() <= 0.0 || r.height() <= 0.0 {
            return;
        }
        // Pixel centers inside the rectangle are covered.
        let x0 = (r.x0 - 0.5).ceil().max(0.0) as u32;
        let y0 = (r.y0 - 0.5).ceil().max(0.0) as u32;
        let x1 = ((r.x1 - 0.5).ceil().max(0.0) as u32).min(self.width);
        let y1 = ((r.y1 - 0.5).ceil().max(0.0) as u32).min(self.height);

        let src = premul(rgba);
        let stride = self.width as usize * 4;
        for y in y0..y1 {
            let row = y as usize * stride;
            for x in x0..x1 {
                let i = row + x as usize * 4;
                let dst = [
                    self.data[i],
                    self.data[i + 1],
                    self.data[i + 2],
                    self.data[i + 3],
                ];
                self.data[i..i + 4].copy_from_slice(&over(dst, src));
            }
        }
    }
}

/// Render the visible items of `scene` into a `width` x `height` frame, scaling the canvas to fit.
pub fn rasterize_scene(
    scene: &Scene,
    canvas: Canvas,
    width: u32,
    height: u32,
    bg_rgba: [u8; 4],
) -> StagecastResult<FrameRGBA> {
    let mut surface = RasterSurface::new(width, height)?;
    surface.clear(bg_rgba);
    surface.ortho(
        0.0,
        f64::from(canvas.width),
        0.0,
        f64::from(canvas.height),
    );
    surface.draw_canvas(scene, canvas);
    Ok(surface.into_frame())
}

fn premul(rgba: [u8; 4]) -> [u8; 4] {
    let a = u16::from(rgba[3]);
    [
        mul_div255(u16::from(rgba[0]), a) as u8,
        mul_div255(u16::from(rgba[1]), a) as u8,
        mul_div255(u16::from(rgba[2]), a) as u8,
        rgba[3],
    ]
}

fn over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    if src[3] == 255 {
        return src;
    }
    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = (u16::from(src[i]) + mul_div255(u16::from(dst[i]), inv)).min(255) as u8;
    }
    out
}

pub(crate) fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

#[cfg(test)]
#[path = "../../tests/unit/render/raster.rs"]
mod tests;
