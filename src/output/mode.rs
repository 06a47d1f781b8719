//! Output pipelines ("simple" and "advanced") resolved into a concrete encoder pairing.

use crate::foundation::core::SurfaceSize;
use crate::foundation::error::{StagecastError, StagecastResult};
use crate::output::service::ServiceConfig;
use crate::video::config::{AudioConfig, VideoConfig};

const RTMP_VIDEO_ENCODERS: &[&str] = &["x264", "h264", "nvenc_h264", "qsv_h264", "amf_h264"];
const RTMP_AUDIO_ENCODERS: &[&str] = &["aac", "ffmpeg_aac"];

/// Simple output: fixed encoders, bitrates and an x264 preset.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SimpleOutput {
    /// Video bitrate in kbit/s.
    pub video_bitrate_kbps: u32,
    /// Audio bitrate in kbit/s.
    pub audio_bitrate_kbps: u32,
    /// Encoder speed preset.
    pub preset: String,
}

impl Default for SimpleOutput {
    fn default() -> Self {
        Self {
            video_bitrate_kbps: 2500,
            audio_bitrate_kbps: 160,
            preset: "veryfast".to_owned(),
        }
    }
}

/// Advanced output: explicit encoder ids, optional rescale and keyframe interval.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AdvancedOutput {
    /// Video encoder id.
    pub video_encoder: String,
    /// Audio encoder id.
    pub audio_encoder: String,
    /// Video bitrate in kbit/s.
    pub video_bitrate_kbps: u32,
    /// Audio bitrate in kbit/s.
    pub audio_bitrate_kbps: u32,
    /// Encode at this size instead of the configured output size.
    pub rescale: Option<SurfaceSize>,
    /// Keyframe interval in seconds.
    pub keyint_sec: u32,
}

impl Default for AdvancedOutput {
    fn default() -> Self {
        Self {
            video_encoder: "x264".to_owned(),
            audio_encoder: "aac".to_owned(),
            video_bitrate_kbps: 4000,
            audio_bitrate_kbps: 160,
            rescale: None,
            keyint_sec: 2,
        }
    }
}

/// Output pipeline selected at construction. Both variants expose the same lifecycle.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputMode {
    /// See [`SimpleOutput`].
    Simple(SimpleOutput),
    /// See [`AdvancedOutput`].
    Advanced(AdvancedOutput),
}

impl Default for OutputMode {
    fn default() -> Self {
        Self::Simple(SimpleOutput::default())
    }
}

/// Concrete encoder/service pairing handed to an [`crate::OutputBackend`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderPairing {
    /// Video encoder id.
    pub video_encoder: String,
    /// Audio encoder id.
    pub audio_encoder: String,
    /// Video bitrate in kbit/s.
    pub video_bitrate_kbps: u32,
    /// Audio bitrate in kbit/s.
    pub audio_bitrate_kbps: u32,
    /// Encoder speed preset, if the pipeline sets one.
    pub preset: Option<String>,
    /// Encoded frame size.
    pub size: SurfaceSize,
    /// Frame rate numerator.
    pub fps_num: u32,
    /// Frame rate denominator.
    pub fps_den: u32,
    /// Keyframe interval in frames.
    pub keyint_frames: u32,
    /// Audio sample rate.
    pub sample_rate: u32,
    /// Audio channel count.
    pub channels: u16,
    /// Full publish URL (server + key).
    pub publish_url: String,
}

impl OutputMode {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Simple(_) => "simple",
            Self::Advanced(_) => "advanced",
        }
    }

    /// Resolve the encoders for `service` under the given video/audio configuration.
    pub fn resolve(
        &self,
        video: &VideoConfig,
        audio: &AudioConfig,
        service: &ServiceConfig,
    ) -> StagecastResult<EncoderPairing> {
        service.validate()?;
        let publish_url = service
            .publish_url()
            .ok_or_else(|| StagecastError::setup("service has no server"))?;

        let (video_encoder, audio_encoder, vbr, abr, preset, size, keyint_sec) = match self {
            Self::Simple(s) => (
                "x264".to_owned(),
                "aac".to_owned(),
                s.video_bitrate_kbps,
                s.audio_bitrate_kbps,
                Some(s.preset.clone()),
                video.output_size(),
                2,
            ),
            Self::Advanced(a) => (
                a.video_encoder.clone(),
                a.audio_encoder.clone(),
                a.video_bitrate_kbps,
                a.audio_bitrate_kbps,
                None,
                a.rescale.unwrap_or(video.output_size()),
                a.keyint_sec,
            ),
        };

        if !RTMP_VIDEO_ENCODERS.contains(&video_encoder.as_str()) {
            return Err(StagecastError::setup(format!(
                "video encoder '{video_encoder}' is not compatible with RTMP"
            )));
        }
        if !RTMP_AUDIO_ENCODERS.contains(&audio_encoder.as_str()) {
            return Err(StagecastError::setup(format!(
                "audio encoder '{audio_encoder}' is not compatible with RTMP"
            )));
        }
        if vbr == 0 || abr == 0 {
            return Err(StagecastError::setup("bitrates must be non-zero"));
        }
        if size.is_empty() || !size.width.is_multiple_of(2) || !size.height.is_multiple_of(2) {
            return Err(StagecastError::setup(format!(
                "encode size {}x{} must be non-zero and even",
                size.width, size.height
            )));
        }
        if video.fps_num == 0 || video.fps_den == 0 {
            return Err(StagecastError::setup("fps must be non-zero"));
        }

        let keyint_frames = (video.fps() * f64::from(keyint_sec.max(1))).round().max(1.0) as u32;

        Ok(EncoderPairing {
            video_encoder,
            audio_encoder,
            video_bitrate_kbps: vbr,
            audio_bitrate_kbps: abr,
            preset,
            size,
            fps_num: video.fps_num,
            fps_den: video.fps_den,
            keyint_frames,
            sample_rate: audio.samples_per_sec,
            channels: audio.speakers.channels(),
            publish_url,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/output/mode.rs"]
mod tests;
