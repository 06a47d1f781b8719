use crate::foundation::core::{Canvas, SurfaceSize};
use crate::geometry::viewport::{PreviewLayout, PreviewViewport, resize_preview};
use crate::render::graphics::{GraphicsContext, PreviewOverlay};
use crate::scene::graph::SceneGraph;
use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex, PoisonError};

/// Preview placement shared between the control context (resizes) and the render thread.
///
/// The viewport is published as a whole, so a frame never mixes the scale of one resize with the
/// offset of another.
#[derive(Debug)]
pub struct PreviewState {
    canvas: Canvas,
    layout: Mutex<PreviewLayout>,
    viewport: ArcSwap<PreviewViewport>,
}

impl PreviewState {
    /// State for `canvas` with no surface yet.
    pub fn new(canvas: Canvas, layout: PreviewLayout) -> Self {
        let viewport = resize_preview(canvas, SurfaceSize::default(), &layout);
        Self {
            canvas,
            layout: Mutex::new(layout),
            viewport: ArcSwap::from_pointee(viewport),
        }
    }

    /// Canvas being previewed.
    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Current layout.
    pub fn layout(&self) -> PreviewLayout {
        *self.layout.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest published viewport.
    pub fn viewport(&self) -> Arc<PreviewViewport> {
        self.viewport.load_full()
    }

    /// Recompute for a resized surface.
    #[tracing::instrument(skip(self))]
    pub fn resize(&self, surface: SurfaceSize) -> PreviewViewport {
        let layout = self.layout.lock().unwrap_or_else(PoisonError::into_inner);
        self.publish(surface, &layout)
    }

    /// Replace the layout (zoom, scroll, margin) and recompute for the current surface.
    pub fn set_layout(&self, layout: PreviewLayout) -> PreviewViewport {
        let mut guard = self.layout.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = layout;
        let surface = self.viewport.load().surface;
        self.publish(surface, &guard)
    }

    fn publish(&self, surface: SurfaceSize, layout: &PreviewLayout) -> PreviewViewport {
        let vp = resize_preview(self.canvas, surface, layout);
        tracing::debug!(
            x = vp.placement.x,
            y = vp.placement.y,
            scale = vp.placement.scale,
            cx = vp.preview_cx,
            cy = vp.preview_cy,
            "preview resized"
        );
        self.viewport.store(Arc::new(vp));
        vp
    }
}

/// Draws the bound scene into a preview surface.
pub struct PreviewRenderer {
    state: Arc<PreviewState>,
    scene: SceneGraph,
    overlay: Option<Box<dyn PreviewOverlay>>,
    clear_rgba: [u8; 4],
}

impl std::fmt::Debug for PreviewRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewRenderer")
            .field("state", &self.state)
            .field("overlay", &self.overlay.is_some())
            .field("clear_rgba", &self.clear_rgba)
            .finish()
    }
}

impl PreviewRenderer {
    /// Renderer for `scene` placed by `state`.
    pub fn new(state: Arc<PreviewState>, scene: SceneGraph) -> Self {
        Self {
            state,
            scene,
            overlay: None,
            clear_rgba: [0, 0, 0, 255],
        }
    }

    /// Background outside the canvas.
    pub fn with_clear_color(mut self, rgba: [u8; 4]) -> Self {
        self.clear_rgba = rgba;
        self
    }

    /// Editing decorations drawn after the canvas.
    pub fn with_overlay(mut self, overlay: Box<dyn PreviewOverlay>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Shared preview state.
    pub fn state(&self) -> &Arc<PreviewState> {
        &self.state
    }

    /// Draw one frame. Returns `false` when the viewport is empty and nothing but the clear was
    /// drawn.
    pub fn render_frame(&mut self, gfx: &mut dyn GraphicsContext) -> bool {
        gfx.clear(self.clear_rgba);

        let vp = self.state.viewport();
        if vp.is_empty() {
            return false;
        }
        let canvas = self.state.canvas();
        let scene = self.scene.bound_scene();

        let surface = gfx.surface_size();
        let (x, y) = (vp.placement.x, vp.placement.y);
        let right = f64::from(surface.width) - x;
        let bottom = f64::from(surface.height) - y;

        gfx.push_viewport();
        gfx.push_projection();

        gfx.ortho(-x, right, -y, bottom);

        gfx.ortho(0.0, f64::from(canvas.width), 0.0, f64::from(canvas.height));
        gfx.set_viewport(x.round() as i32, y.round() as i32, vp.preview_cx, vp.preview_cy);
        gfx.draw_canvas(&scene, canvas);

        gfx.ortho(-x, right, -y, bottom);
        gfx.reset_viewport();
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.draw(gfx, &scene, &vp);
        }

        gfx.pop_projection();
        gfx.pop_viewport();
        true
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/preview.rs"]
mod tests;
