use crate::foundation::core::{Canvas, SurfaceSize};
use crate::foundation::error::{StagecastError, StagecastResult};

/// Encoder-side pixel format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Semi-planar 4:2:0.
    #[default]
    Nv12,
    /// Planar 4:2:0.
    I420,
    /// Packed RGBA.
    Rgba,
}

/// Color matrix for RGB to YUV conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    /// ITU-R BT.601.
    Bt601,
    /// ITU-R BT.709.
    #[default]
    Bt709,
}

/// Quantization range of the encoded signal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorRange {
    /// Limited (16-235) range.
    #[default]
    Partial,
    /// Full (0-255) range.
    Full,
}

/// Graphics module the engine renders with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsBackend {
    /// OpenGL module.
    #[default]
    Opengl,
    /// Direct3D 11 module.
    D3d11,
    /// CPU rasterizer (headless).
    Software,
}

/// Process-wide canvas/encode configuration, set once before rendering starts.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Canvas resolution.
    pub base_width: u32,
    /// Canvas resolution.
    pub base_height: u32,
    /// Encoded resolution.
    pub output_width: u32,
    /// Encoded resolution.
    pub output_height: u32,
    /// Frame rate numerator.
    pub fps_num: u32,
    /// Frame rate denominator.
    pub fps_den: u32,
    /// Encoder input format.
    pub output_format: PixelFormat,
    /// Color matrix.
    pub colorspace: ColorSpace,
    /// Color range.
    pub range: ColorRange,
    /// Graphics module.
    pub graphics: GraphicsBackend,
    /// Graphics adapter index.
    pub adapter: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            base_width: 1920,
            base_height: 1080,
            output_width: 1280,
            output_height: 720,
            fps_num: 30,
            fps_den: 1,
            output_format: PixelFormat::Nv12,
            colorspace: ColorSpace::Bt709,
            range: ColorRange::Partial,
            graphics: GraphicsBackend::Opengl,
            adapter: 0,
        }
    }
}

impl VideoConfig {
    /// Check the configuration is usable by a video engine.
    pub fn validate(&self) -> StagecastResult<()> {
        if self.base_width == 0 || self.base_height == 0 {
            return Err(StagecastError::video_init(
                "base width/height must be non-zero",
            ));
        }
        if self.output_width == 0 || self.output_height == 0 {
            return Err(StagecastError::video_init(
                "output width/height must be non-zero",
            ));
        }
        if matches!(self.output_format, PixelFormat::Nv12 | PixelFormat::I420)
            && (!self.output_width.is_multiple_of(2) || !self.output_height.is_multiple_of(2))
        {
            return Err(StagecastError::video_init(
                "output width/height must be even for 4:2:0 formats",
            ));
        }
        if self.fps_num == 0 || self.fps_den == 0 {
            return Err(StagecastError::video_init("fps must be non-zero"));
        }
        Ok(())
    }

    /// Canvas (base) resolution.
    pub fn canvas(&self) -> StagecastResult<Canvas> {
        Canvas::new(self.base_width, self.base_height)
    }

    /// Encoded resolution.
    pub fn output_size(&self) -> SurfaceSize {
        SurfaceSize::new(self.output_width, self.output_height)
    }

    /// Frame rate as a float.
    pub fn fps(&self) -> f64 {
        f64::from(self.fps_num) / f64::from(self.fps_den.max(1))
    }

    /// Duration of one frame.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(f64::from(self.fps_den) / f64::from(self.fps_num.max(1)))
    }
}

/// Speaker layout of the audio mix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerLayout {
    /// One channel.
    Mono,
    /// Two channels.
    #[default]
    Stereo,
}

impl SpeakerLayout {
    /// Channel count.
    pub fn channels(self) -> u16 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }
}

/// Process-wide audio mix configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Mix sample rate in Hz.
    pub samples_per_sec: u32,
    /// Speaker layout.
    pub speakers: SpeakerLayout,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            samples_per_sec: 48_000,
            speakers: SpeakerLayout::Stereo,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/video/config.rs"]
mod tests;
