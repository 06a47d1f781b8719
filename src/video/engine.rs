use crate::foundation::error::{StagecastError, StagecastResult};
use crate::video::config::{AudioConfig, VideoConfig};

/// Video/audio engine collaborator. Resets happen during bring-up only.
pub trait MediaEngine: Send {
    /// Apply a canvas/encode configuration. Failure is fatal for bring-up.
    fn reset_video(&mut self, cfg: &VideoConfig) -> StagecastResult<()>;
    /// Apply an audio mix configuration.
    fn reset_audio(&mut self, cfg: &AudioConfig) -> StagecastResult<()>;
    /// Configuration applied by the last successful [`MediaEngine::reset_video`].
    fn video_config(&self) -> Option<&VideoConfig>;
}

/// Engine without capture or GPU: validates and records the configuration.
#[derive(Debug, Default)]
pub struct HeadlessEngine {
    video: Option<VideoConfig>,
    audio: Option<AudioConfig>,
}

impl HeadlessEngine {
    /// Create an engine with nothing configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Audio configuration applied by the last reset.
    pub fn audio_config(&self) -> Option<&AudioConfig> {
        self.audio.as_ref()
    }
}

impl MediaEngine for HeadlessEngine {
    #[tracing::instrument(skip(self))]
    fn reset_video(&mut self, cfg: &VideoConfig) -> StagecastResult<()> {
        cfg.validate()?;
        self.video = Some(cfg.clone());
        tracing::info!(
            base = %format!("{}x{}", cfg.base_width, cfg.base_height),
            output = %format!("{}x{}", cfg.output_width, cfg.output_height),
            fps = cfg.fps(),
            "video reset"
        );
        Ok(())
    }

    fn reset_audio(&mut self, cfg: &AudioConfig) -> StagecastResult<()> {
        if cfg.samples_per_sec == 0 {
            return Err(StagecastError::validation("audio sample rate must be non-zero"));
        }
        self.audio = Some(*cfg);
        tracing::info!(
            samples_per_sec = cfg.samples_per_sec,
            channels = cfg.speakers.channels(),
            "audio reset"
        );
        Ok(())
    }

    fn video_config(&self) -> Option<&VideoConfig> {
        self.video.as_ref()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/video/engine.rs"]
mod tests;
