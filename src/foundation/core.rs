use crate::foundation::error::{StagecastError, StagecastResult};

pub use kurbo::{Affine, Point, Rect, Size, Vec2};

/// Base-resolution composition surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Build a canvas, rejecting zero dimensions.
    pub fn new(width: u32, height: u32) -> StagecastResult<Self> {
        if width == 0 || height == 0 {
            return Err(StagecastError::validation(
                "canvas width/height must be non-zero",
            ));
        }
        Ok(Self { width, height })
    }

    /// Canvas size as floating point.
    pub fn size(self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }

    /// Canvas bounds in canvas space.
    pub fn rect(self) -> Rect {
        Rect::from_origin_size(Point::ORIGIN, self.size())
    }
}

/// Pixel size of a display surface (preview window). May be zero while a window is minimized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SurfaceSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl SurfaceSize {
    /// Build a surface size.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Surface size as floating point.
    pub fn size(self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }

    /// `true` when either dimension is zero.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::str::FromStr for Canvas {
    type Err = StagecastError;

    /// Parse `WIDTHxHEIGHT`; zero dimensions are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = parse_dimensions(s)?;
        Self::new(w, h)
    }
}

impl std::str::FromStr for SurfaceSize {
    type Err = StagecastError;

    /// Parse `WIDTHxHEIGHT`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = parse_dimensions(s)?;
        Ok(Self::new(w, h))
    }
}

fn parse_dimensions(s: &str) -> StagecastResult<(u32, u32)> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| StagecastError::validation(format!("expected WIDTHxHEIGHT, got '{s}'")))?;
    let w = w
        .trim()
        .parse::<u32>()
        .map_err(|e| StagecastError::validation(format!("invalid width in '{s}': {e}")))?;
    let h = h
        .trim()
        .parse::<u32>()
        .map_err(|e| StagecastError::validation(format!("invalid height in '{s}': {e}")))?;
    Ok((w, h))
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
