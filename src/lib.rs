//! Stagecast is the live composition and streaming output core of a production harness.
//!
//! It owns three concurrency-sensitive pieces and wires them together:
//!
//! 1. **Scene graph**: an ordered list of placed sources, mutated in atomic batches by the control
//!    context while a render thread reads immutable snapshots every frame ([`SceneGraph`]).
//! 2. **Preview geometry**: the letterbox transform that fits the canvas into an arbitrary preview
//!    surface, with an optional fixed zoom and scroll ([`resize_preview`]).
//! 3. **Output lifecycle**: the start/stop/delay/error state machine of a streaming push session
//!    ([`OutputController`]), publishing typed [`OutputEvent`]s.
//!
//! The [`Orchestrator`] exposes the user-facing actions (add a source, start or stop the push) on
//! top of these. Media capture, encoding and network transport are collaborators behind narrow
//! traits ([`MediaEngine`], [`SourceFactory`], [`OutputBackend`]).
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod app;
mod config;
mod foundation;
mod geometry;
mod output;
mod render;
mod scene;
mod video;

pub use app::orchestrator::{Orchestrator, PROGRAM_SCENE};
pub use app::status::{LogStatusSink, StatusSink};
pub use config::{AppConfig, OutputSection, PreviewSection};
pub use foundation::core::{Canvas, Point, Rect, Size, SurfaceSize, Vec2};
pub use foundation::error::{StagecastError, StagecastResult};
pub use geometry::viewport::{
    PREVIEW_EDGE_SIZE, Placement, PreviewLayout, PreviewViewport, center_at_fixed_scale,
    resize_preview, scale_to_fit,
};
pub use output::backend::{OutputBackend, OutputSignals};
pub use output::controller::{OutputController, OutputControllerOpts, Transition};
pub use output::events::{OutputEvent, StopCode};
pub use output::ffmpeg::{FfmpegPushBackend, FfmpegPushOpts, is_ffmpeg_on_path};
pub use output::mode::{AdvancedOutput, EncoderPairing, OutputMode, SimpleOutput};
pub use output::service::{DEFAULT_SERVICE_TYPE, ServiceConfig};
pub use output::simulated::{SimulatedBackend, SimulatedScript, SimulatedStats};
pub use output::state::OutputState;
pub use render::graphics::{GraphicsContext, PreviewOverlay, SelectionOverlay};
pub use render::preview::{PreviewRenderer, PreviewState};
pub use render::raster::{FrameRGBA, RasterSurface, rasterize_scene};
pub use render::render_loop::{RenderLoop, RenderLoopStats};
pub use scene::graph::{SceneEdit, SceneGraph};
pub use scene::item::{Crop, ItemId, ItemInit, Scene, SceneItem};
pub use scene::source::{
    BuiltinSourceFactory, Source, SourceFactory, SourceId, SourceKind, SourceSettings,
};
pub use video::config::{
    AudioConfig, ColorRange, ColorSpace, GraphicsBackend, PixelFormat, SpeakerLayout, VideoConfig,
};
pub use video::engine::{HeadlessEngine, MediaEngine};
