use crate::foundation::core::{Canvas, Size};
use crate::foundation::error::{StagecastError, StagecastResult};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Capture/playback unit types understood by [`BuiltinSourceFactory`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Full display capture.
    MonitorCapture,
    /// Local media file playback.
    MediaSource,
    /// Still image.
    ImageSource,
    /// Camera / capture card.
    VideoCapture,
    /// Text overlay.
    Text,
    /// Microphone or line-in capture.
    AudioInputCapture,
    /// Desktop audio (loopback) capture.
    AudioOutputCapture,
}

impl SourceKind {
    /// Every known kind, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::MonitorCapture,
        Self::MediaSource,
        Self::ImageSource,
        Self::VideoCapture,
        Self::Text,
        Self::AudioInputCapture,
        Self::AudioOutputCapture,
    ];

    /// Type tag used in settings documents and by [`SourceFactory::create_source`].
    pub fn type_tag(self) -> &'static str {
        match self {
            Self::MonitorCapture => "monitor_capture",
            Self::MediaSource => "media_source",
            Self::ImageSource => "image_source",
            Self::VideoCapture => "video_capture",
            Self::Text => "text",
            Self::AudioInputCapture => "audio_input_capture",
            Self::AudioOutputCapture => "audio_output_capture",
        }
    }

    /// Reverse lookup of [`SourceKind::type_tag`].
    pub fn from_type_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_tag() == tag)
    }

    /// `true` when the source produces frames.
    pub fn has_video(self) -> bool {
        !matches!(self, Self::AudioInputCapture | Self::AudioOutputCapture)
    }

    /// `true` when the source produces audio.
    pub fn has_audio(self) -> bool {
        matches!(
            self,
            Self::MediaSource | Self::AudioInputCapture | Self::AudioOutputCapture
        )
    }
}

/// Key-value configuration blob of a source.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SourceSettings(Map<String, Value>);

impl SourceSettings {
    /// Empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build settings from a JSON value, which must be an object.
    pub fn from_value(v: Value) -> StagecastResult<Self> {
        match v {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(StagecastError::serde(format!(
                "source settings must be a JSON object, got {other}"
            ))),
        }
    }

    /// Builder-style string setter.
    pub fn with_str(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_owned(), Value::String(value.into()));
        self
    }

    /// Builder-style bool setter.
    pub fn with_bool(mut self, key: &str, value: bool) -> Self {
        self.0.insert(key.to_owned(), Value::Bool(value));
        self
    }

    /// Builder-style integer setter.
    pub fn with_u64(mut self, key: &str, value: u64) -> Self {
        self.0.insert(key.to_owned(), Value::from(value));
        self
    }

    /// String value of `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Bool value of `key`, if present and a bool.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Integer value of `key`, if present and a non-negative integer.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Borrow the raw map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    fn require_str(&self, kind: SourceKind, key: &str) -> StagecastResult<&str> {
        match self.0.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
            Some(Value::String(_)) => Err(StagecastError::source_creation(format!(
                "{}: setting '{key}' must not be empty",
                kind.type_tag()
            ))),
            Some(other) => Err(StagecastError::source_creation(format!(
                "{}: setting '{key}' must be a string, got {other}",
                kind.type_tag()
            ))),
            None => Err(StagecastError::source_creation(format!(
                "{}: missing setting '{key}'",
                kind.type_tag()
            ))),
        }
    }
}

/// Process-unique source identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(pub u64);

impl SourceId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// An instantiated capture/playback unit. Shared between scene items through `Arc`.
#[derive(Debug, PartialEq)]
pub struct Source {
    id: SourceId,
    kind: SourceKind,
    name: String,
    settings: SourceSettings,
    size: Option<Size>,
}

impl Source {
    /// Source identifier.
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Source kind.
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Settings the source was created with.
    pub fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    /// Native frame size, `None` for audio-only sources.
    pub fn size(&self) -> Option<Size> {
        self.size
    }
}

/// Collaborator that instantiates sources from a type tag and settings blob.
pub trait SourceFactory: Send + Sync {
    /// Create a source, or fail with [`StagecastError::SourceCreation`].
    fn create_source(
        &self,
        type_tag: &str,
        name: &str,
        settings: SourceSettings,
    ) -> StagecastResult<Arc<Source>>;

    /// Video capture devices that can back a `video_capture` source, in enumeration order.
    fn video_devices(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Factory for the built-in [`SourceKind`]s. Validates settings; does not touch devices or files.
#[derive(Clone, Debug)]
pub struct BuiltinSourceFactory {
    canvas: Canvas,
    video_devices: Option<Vec<String>>,
}

const DEFAULT_CAMERA_SIZE: Size = Size::new(1280.0, 720.0);
const DEFAULT_MEDIA_SIZE: Size = Size::new(1920.0, 1080.0);
const DEFAULT_IMAGE_SIZE: Size = Size::new(512.0, 512.0);
const TEXT_GLYPH_WIDTH: f64 = 20.0;
const TEXT_LINE_HEIGHT: f64 = 40.0;

impl BuiltinSourceFactory {
    /// Create a factory for sources composed onto `canvas`. Any device id is accepted.
    pub fn new(canvas: Canvas) -> Self {
        Self {
            canvas,
            video_devices: None,
        }
    }

    /// Restrict `video_capture` sources to the given device ids.
    pub fn with_video_devices(mut self, devices: impl IntoIterator<Item = String>) -> Self {
        self.video_devices = Some(devices.into_iter().collect());
        self
    }

    fn validate(&self, kind: SourceKind, settings: &SourceSettings) -> StagecastResult<Option<Size>> {
        let explicit = match (settings.get_u64("width"), settings.get_u64("height")) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(Size::new(w as f64, h as f64)),
            (None, None) => None,
            _ => {
                return Err(StagecastError::source_creation(format!(
                    "{}: 'width' and 'height' must both be positive integers",
                    kind.type_tag()
                )));
            }
        };

        let size = match kind {
            SourceKind::MonitorCapture => Some(explicit.unwrap_or(self.canvas.size())),
            SourceKind::MediaSource => {
                settings.require_str(kind, "local_file")?;
                Some(explicit.unwrap_or(DEFAULT_MEDIA_SIZE))
            }
            SourceKind::ImageSource => {
                settings.require_str(kind, "file")?;
                Some(explicit.unwrap_or(DEFAULT_IMAGE_SIZE))
            }
            SourceKind::VideoCapture => {
                let device = settings.require_str(kind, "video_device_id")?;
                if let Some(known) = &self.video_devices
                    && !known.iter().any(|d| d == device)
                {
                    return Err(StagecastError::source_creation(format!(
                        "video_capture: unknown device '{device}'"
                    )));
                }
                Some(explicit.unwrap_or(DEFAULT_CAMERA_SIZE))
            }
            SourceKind::Text => {
                let text = match settings.as_map().get("text") {
                    Some(Value::String(s)) => s.as_str(),
                    _ => {
                        return Err(StagecastError::source_creation(
                            "text: setting 'text' must be a string",
                        ));
                    }
                };
                let longest = text.lines().map(|l| l.chars().count()).max().unwrap_or(0);
                let lines = text.lines().count().max(1);
                Some(explicit.unwrap_or(Size::new(
                    longest.max(1) as f64 * TEXT_GLYPH_WIDTH,
                    lines as f64 * TEXT_LINE_HEIGHT,
                )))
            }
            SourceKind::AudioInputCapture | SourceKind::AudioOutputCapture => {
                settings.require_str(kind, "device_id")?;
                None
            }
        };
        Ok(size)
    }
}

impl SourceFactory for BuiltinSourceFactory {
    fn create_source(
        &self,
        type_tag: &str,
        name: &str,
        settings: SourceSettings,
    ) -> StagecastResult<Arc<Source>> {
        let kind = SourceKind::from_type_tag(type_tag).ok_or_else(|| {
            StagecastError::source_creation(format!("unknown source type '{type_tag}'"))
        })?;
        let size = self.validate(kind, &settings)?;
        let source = Source {
            id: SourceId::next(),
            kind,
            name: name.to_owned(),
            settings,
            size,
        };
        tracing::debug!(id = source.id.0, kind = type_tag, name, "source created");
        Ok(Arc::new(source))
    }

    fn video_devices(&self) -> Vec<String> {
        self.video_devices.clone().unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/source.rs"]
mod tests;
