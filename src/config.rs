//! Application configuration document.
//!
//! ```json
//! {
//!   "video":   { "base_width": 1920, "base_height": 1080, "output_width": 1280, ... },
//!   "audio":   { "samples_per_sec": 48000, "speakers": "stereo" },
//!   "output":  { "mode": { "kind": "simple" }, "start_delay_sec": 0, "stop_delay_sec": 0 },
//!   "service": { "type": "rtmp_custom", "settings": { "server": "rtmp://...", "key": "..." } },
//!   "preview": { "fixed_scaling": false, "scaling_amount": 1.0, "edge": 10 }
//! }
//! ```
//!
//! Every section and field is optional.

use crate::foundation::core::Vec2;
use crate::foundation::error::{StagecastError, StagecastResult};
use crate::geometry::viewport::{PREVIEW_EDGE_SIZE, PreviewLayout};
use crate::output::controller::OutputControllerOpts;
use crate::output::mode::OutputMode;
use crate::output::service::ServiceConfig;
use crate::video::config::{AudioConfig, VideoConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// Output pipeline and delays.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Simple or advanced encoder selection.
    pub mode: OutputMode,
    /// Seconds between a start request and the backend start.
    pub start_delay_sec: f64,
    /// Seconds between a graceful stop request and the backend stop.
    pub stop_delay_sec: f64,
}

/// Preview placement options.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PreviewSection {
    /// Use `scaling_amount` instead of fitting.
    pub fixed_scaling: bool,
    /// Fixed zoom.
    pub scaling_amount: f64,
    /// Horizontal scroll in fixed mode.
    pub scroll_x: f64,
    /// Vertical scroll in fixed mode.
    pub scroll_y: f64,
    /// Margin in surface pixels.
    pub edge: u32,
}

impl Default for PreviewSection {
    fn default() -> Self {
        Self {
            fixed_scaling: false,
            scaling_amount: 1.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
            edge: PREVIEW_EDGE_SIZE,
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Canvas and encode settings.
    pub video: VideoConfig,
    /// Audio mix settings.
    pub audio: AudioConfig,
    /// Output pipeline.
    pub output: OutputSection,
    /// Streaming destination.
    pub service: ServiceConfig,
    /// Preview placement.
    pub preview: PreviewSection,
}

impl AppConfig {
    /// Parse a configuration from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> StagecastResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| StagecastError::serde(format!("parse config JSON: {e}")))
    }

    /// Parse a configuration from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> StagecastResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            StagecastError::serde(format!("open config JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Check values that serde cannot. The service is checked at setup time instead, so a bad
    /// service surfaces as a setup failure.
    pub fn validate(&self) -> StagecastResult<()> {
        self.video.validate()?;
        if self.audio.samples_per_sec == 0 {
            return Err(StagecastError::validation("audio sample rate must be non-zero"));
        }
        for (name, v) in [
            ("start_delay_sec", self.output.start_delay_sec),
            ("stop_delay_sec", self.output.stop_delay_sec),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(StagecastError::validation(format!(
                    "output.{name} must be a non-negative number"
                )));
            }
        }
        let p = &self.preview;
        if p.fixed_scaling && (!p.scaling_amount.is_finite() || p.scaling_amount <= 0.0) {
            return Err(StagecastError::validation(
                "preview.scaling_amount must be positive when fixed_scaling is set",
            ));
        }
        if !p.scroll_x.is_finite() || !p.scroll_y.is_finite() {
            return Err(StagecastError::validation("preview scroll must be finite"));
        }
        Ok(())
    }

    /// Controller options derived from the `video`, `audio` and `output` sections.
    pub fn controller_opts(&self) -> OutputControllerOpts {
        OutputControllerOpts {
            mode: self.output.mode.clone(),
            video: self.video.clone(),
            audio: self.audio,
            start_delay: secs(self.output.start_delay_sec),
            stop_delay: secs(self.output.stop_delay_sec),
        }
    }

    /// Preview layout derived from the `preview` section.
    pub fn layout(&self) -> PreviewLayout {
        PreviewLayout {
            fixed_scaling: self.preview.fixed_scaling,
            scaling_amount: self.preview.scaling_amount,
            scroll: Vec2::new(self.preview.scroll_x, self.preview.scroll_y),
            edge: self.preview.edge,
        }
    }
}

fn secs(v: f64) -> Duration {
    if v.is_finite() && v > 0.0 {
        Duration::from_secs_f64(v)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
#[path = "../tests/unit/config/config.rs"]
mod tests;
