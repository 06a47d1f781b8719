//! Scale-to-fit transforms between the canvas and a preview surface.
//!
//! Everything here is a pure function of its inputs. Degenerate inputs (an empty canvas, or a
//! surface that is empty once the edge margin is removed) produce a zero placement instead of a
//! NaN or infinite scale.

use crate::foundation::core::{Affine, Canvas, Rect, Size, SurfaceSize, Vec2};

/// Margin, in surface pixels, kept clear on every side of the preview.
pub const PREVIEW_EDGE_SIZE: u32 = 10;

/// Top-left offset and uniform scale of the canvas inside a surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Placement {
    /// Horizontal offset of the canvas origin.
    pub x: f64,
    /// Vertical offset of the canvas origin.
    pub y: f64,
    /// Canvas-to-surface scale factor.
    pub scale: f64,
}

impl Placement {
    /// The placement used for degenerate inputs.
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        scale: 0.0,
    };
}

fn is_degenerate(size: Size) -> bool {
    !(size.width > 0.0 && size.height > 0.0) || !size.width.is_finite() || !size.height.is_finite()
}

/// Largest uniform scale that fits `canvas` inside `surface`, centered.
pub fn scale_to_fit(canvas: Size, surface: Size) -> Placement {
    if is_degenerate(canvas) || is_degenerate(surface) {
        return Placement::ZERO;
    }
    let scale = (surface.width / canvas.width).min(surface.height / canvas.height);
    Placement {
        x: (surface.width - canvas.width * scale) / 2.0,
        y: (surface.height - canvas.height * scale) / 2.0,
        scale,
    }
}

/// Center `canvas` inside `surface` at an explicit scale.
///
/// The result can be negative on either axis when the scaled canvas is larger than the surface.
pub fn center_at_fixed_scale(canvas: Size, surface: Size, scale: f64) -> Placement {
    if is_degenerate(canvas) || is_degenerate(surface) || !scale.is_finite() || scale <= 0.0 {
        return Placement::ZERO;
    }
    Placement {
        x: (surface.width - canvas.width * scale) / 2.0,
        y: (surface.height - canvas.height * scale) / 2.0,
        scale,
    }
}

/// User-controlled preview options.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PreviewLayout {
    /// Use `scaling_amount` instead of fitting to the surface.
    pub fixed_scaling: bool,
    /// Zoom used when `fixed_scaling` is set.
    pub scaling_amount: f64,
    /// Pan offset applied in fixed scaling mode.
    pub scroll: Vec2,
    /// Margin kept clear on every side.
    pub edge: u32,
}

impl Default for PreviewLayout {
    fn default() -> Self {
        Self {
            fixed_scaling: false,
            scaling_amount: 1.0,
            scroll: Vec2::ZERO,
            edge: PREVIEW_EDGE_SIZE,
        }
    }
}

/// Derived preview state, recomputed on every resize.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PreviewViewport {
    /// Canvas placement in full-surface coordinates (margin included).
    pub placement: Placement,
    /// Scaled canvas width in surface pixels.
    pub preview_cx: u32,
    /// Scaled canvas height in surface pixels.
    pub preview_cy: u32,
    /// Surface the placement was computed for.
    pub surface: SurfaceSize,
}

impl PreviewViewport {
    /// Surface-space rectangle covered by the canvas.
    pub fn canvas_rect(&self) -> Rect {
        Rect::new(
            self.placement.x,
            self.placement.y,
            self.placement.x + f64::from(self.preview_cx),
            self.placement.y + f64::from(self.preview_cy),
        )
    }

    /// Affine mapping canvas coordinates to surface coordinates.
    pub fn canvas_to_surface(&self) -> Affine {
        Affine::translate(Vec2::new(self.placement.x, self.placement.y))
            * Affine::scale(self.placement.scale)
    }

    /// `true` when nothing of the canvas can be drawn.
    pub fn is_empty(&self) -> bool {
        self.placement.scale <= 0.0 || self.preview_cx == 0 || self.preview_cy == 0
    }
}

/// Compute the preview viewport for `canvas` shown in `surface`.
pub fn resize_preview(canvas: Canvas, surface: SurfaceSize, layout: &PreviewLayout) -> PreviewViewport {
    let edge = f64::from(layout.edge);
    let usable = Size::new(
        f64::from(surface.width) - edge * 2.0,
        f64::from(surface.height) - edge * 2.0,
    );

    let mut placement = if layout.fixed_scaling {
        let p = center_at_fixed_scale(canvas.size(), usable, layout.scaling_amount);
        if p == Placement::ZERO {
            p
        } else {
            Placement {
                x: p.x + layout.scroll.x,
                y: p.y + layout.scroll.y,
                ..p
            }
        }
    } else {
        scale_to_fit(canvas.size(), usable)
    };

    if placement.scale <= 0.0 {
        return PreviewViewport {
            surface,
            ..PreviewViewport::default()
        };
    }

    placement.x += edge;
    placement.y += edge;

    PreviewViewport {
        placement,
        preview_cx: scaled_extent(placement.scale, canvas.width),
        preview_cy: scaled_extent(placement.scale, canvas.height),
        surface,
    }
}

fn scaled_extent(scale: f64, extent: u32) -> u32 {
    let v = (scale * f64::from(extent)).floor();
    if v <= 0.0 {
        0
    } else if v >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        v as u32
    }
}

#[cfg(test)]
#[path = "../../tests/unit/geometry/viewport.rs"]
mod tests;
