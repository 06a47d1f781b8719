use crate::foundation::core::{Canvas, Rect, SurfaceSize};
use crate::geometry::viewport::PreviewViewport;
use crate::scene::item::Scene;
use crate::scene::source::SourceKind;

/// Immediate-mode drawing surface the preview renders into.
///
/// Coordinates passed to drawing calls are in the current projection space. The projection maps
/// `left..right` and `top..bottom` onto the current viewport rectangle of the surface. Both the
/// projection and the viewport can be saved and restored with the push/pop pairs.
pub trait GraphicsContext {
    /// Size of the target surface in pixels.
    fn surface_size(&self) -> SurfaceSize;

    /// Save the current viewport.
    fn push_viewport(&mut self);
    /// Restore the last saved viewport.
    fn pop_viewport(&mut self);
    /// Save the current projection.
    fn push_projection(&mut self);
    /// Restore the last saved projection.
    fn pop_projection(&mut self);

    /// Set an orthographic projection.
    fn ortho(&mut self, left: f64, right: f64, top: f64, bottom: f64);
    /// Restrict drawing to a surface rectangle.
    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32);
    /// Viewport covering the whole surface.
    fn reset_viewport(&mut self);

    /// Fill the whole surface, ignoring projection and viewport.
    fn clear(&mut self, rgba: [u8; 4]);
    /// Fill a projection-space rectangle, clipped to the viewport.
    fn fill_rect(&mut self, rect: Rect, rgba: [u8; 4]);

    /// Draw the composed canvas in canvas coordinates.
    ///
    /// Visible items are drawn bottom to top. Sources carry no pixels here, so each item is drawn
    /// as a flat swatch of its kind.
    fn draw_canvas(&mut self, scene: &Scene, canvas: Canvas) {
        let clip = canvas.rect();
        for item in scene.visible_items() {
            let Some(bounds) = item.bounds() else {
                continue;
            };
            let r = bounds.intersect(clip);
            if r.width() > 0.0 && r.height() > 0.0 {
                self.fill_rect(r, swatch(item.source.kind()));
            }
        }
    }
}

/// Draw hook run after the canvas, in surface pixels relative to the canvas origin.
pub trait PreviewOverlay: Send {
    /// Draw editing decorations for `scene`.
    fn draw(&mut self, gfx: &mut dyn GraphicsContext, scene: &Scene, viewport: &PreviewViewport);
}

/// Outlines the bounds of every visible item.
#[derive(Clone, Debug)]
pub struct SelectionOverlay {
    /// Outline color.
    pub rgba: [u8; 4],
    /// Outline thickness in surface pixels.
    pub thickness: f64,
}

impl Default for SelectionOverlay {
    fn default() -> Self {
        Self {
            rgba: [255, 0, 0, 255],
            thickness: 1.0,
        }
    }
}

impl PreviewOverlay for SelectionOverlay {
    fn draw(&mut self, gfx: &mut dyn GraphicsContext, scene: &Scene, viewport: &PreviewViewport) {
        let s = viewport.placement.scale;
        let t = self.thickness;
        for item in scene.visible_items() {
            let Some(b) = item.bounds() else {
                continue;
            };
            let b = Rect::new(b.x0 * s, b.y0 * s, b.x1 * s, b.y1 * s);
            gfx.fill_rect(Rect::new(b.x0, b.y0, b.x1, b.y0 + t), self.rgba);
            gfx.fill_rect(Rect::new(b.x0, b.y1 - t, b.x1, b.y1), self.rgba);
            gfx.fill_rect(Rect::new(b.x0, b.y0, b.x0 + t, b.y1), self.rgba);
            gfx.fill_rect(Rect::new(b.x1 - t, b.y0, b.x1, b.y1), self.rgba);
        }
    }
}

/// Placeholder color of a source kind.
pub(crate) fn swatch(kind: SourceKind) -> [u8; 4] {
    match kind {
        SourceKind::MonitorCapture => [52, 101, 164, 255],
        SourceKind::MediaSource => [204, 0, 0, 255],
        SourceKind::ImageSource => [78, 154, 6, 255],
        SourceKind::VideoCapture => [196, 160, 0, 255],
        SourceKind::Text => [238, 238, 236, 255],
        SourceKind::AudioInputCapture | SourceKind::AudioOutputCapture => [0, 0, 0, 0],
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/graphics.rs"]
mod tests;
