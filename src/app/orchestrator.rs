use crate::app::status::{LogStatusSink, StatusSink};
use crate::config::AppConfig;
use crate::foundation::core::{Canvas, SurfaceSize, Vec2};
use crate::foundation::error::{StagecastError, StagecastResult};
use crate::geometry::viewport::PreviewViewport;
use crate::output::backend::OutputBackend;
use crate::output::controller::{OutputController, Transition};
use crate::output::events::OutputEvent;
use crate::output::service::ServiceConfig;
use crate::output::state::OutputState;
use crate::render::preview::{PreviewRenderer, PreviewState};
use crate::scene::graph::SceneGraph;
use crate::scene::item::ItemId;
use crate::scene::source::{BuiltinSourceFactory, SourceFactory, SourceKind, SourceSettings};
use crate::video::engine::{HeadlessEngine, MediaEngine};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Name of the scene bound to the program slot at bring-up.
pub const PROGRAM_SCENE: &str = "test scene";

const CAPTURE_SCALE: f64 = 0.2;

/// Wires the scene graph, preview and output controller behind the user-facing actions.
///
/// Output events are queued on a channel and reach the [`StatusSink`] only when the owner pulls
/// them: each push action relays what is pending, and completions that arrive later (the stream
/// coming up, a disconnect, a delay firing) wait until [`Orchestrator::pump_events`] or
/// [`Orchestrator::wait_for_event`] runs. A UI should call `pump_events` from its frame tick.
///
/// Fields are declared in teardown order (output first, engine last).
pub struct Orchestrator {
    output: OutputController,
    status: Box<dyn StatusSink>,
    events: Receiver<OutputEvent>,
    last_status: Option<String>,
    preview: Arc<PreviewState>,
    scene: SceneGraph,
    factory: Box<dyn SourceFactory>,
    engine: Box<dyn MediaEngine>,
    service: ServiceConfig,
    canvas: Canvas,
    closed: bool,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("canvas", &self.canvas)
            .field("scene", &self.scene)
            .field("output", &self.output)
            .field("last_status", &self.last_status)
            .finish()
    }
}

impl Orchestrator {
    /// Bring up the engine, bind the program scene and create the output.
    ///
    /// `make_backend` receives the program scene graph and canvas, so a backend can render what
    /// the preview shows. A failed video reset is fatal and reported as
    /// [`StagecastError::VideoInit`].
    #[tracing::instrument(skip_all)]
    pub fn new<B>(
        config: AppConfig,
        mut engine: Box<dyn MediaEngine>,
        factory: Box<dyn SourceFactory>,
        make_backend: B,
    ) -> StagecastResult<Self>
    where
        B: FnOnce(&SceneGraph, Canvas) -> StagecastResult<Box<dyn OutputBackend>>,
    {
        engine.reset_video(&config.video).map_err(|e| match e {
            StagecastError::VideoInit(m) => StagecastError::VideoInit(m),
            other => StagecastError::video_init(other.to_string()),
        })?;
        engine.reset_audio(&config.audio)?;
        config.validate()?;
        let canvas = config.video.canvas()?;

        let scene = SceneGraph::new(PROGRAM_SCENE);
        let preview = Arc::new(PreviewState::new(canvas, config.layout()));
        let backend = make_backend(&scene, canvas)?;
        let output = OutputController::new(backend, config.controller_opts())?;
        let events = output.events();

        tracing::info!(
            canvas = %format!("{}x{}", canvas.width, canvas.height),
            service = config.service.kind(),
            "orchestrator ready"
        );
        Ok(Self {
            output,
            status: Box::new(LogStatusSink::new()),
            events,
            last_status: None,
            preview,
            scene,
            factory,
            engine,
            service: config.service,
            canvas,
            closed: false,
        })
    }

    /// [`Orchestrator::new`] with a [`HeadlessEngine`] and a [`BuiltinSourceFactory`].
    pub fn headless(config: AppConfig, backend: Box<dyn OutputBackend>) -> StagecastResult<Self> {
        let canvas = config.video.canvas().map_err(|e| StagecastError::video_init(e.to_string()))?;
        Self::new(
            config,
            Box::new(HeadlessEngine::new()),
            Box::new(BuiltinSourceFactory::new(canvas)),
            move |_, _| Ok(backend),
        )
    }

    /// Replace the status sink (default: [`LogStatusSink`]).
    pub fn with_status_sink(mut self, sink: Box<dyn StatusSink>) -> Self {
        self.status = sink;
        self
    }

    /// Canvas (base) resolution.
    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Program scene graph.
    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    /// Output controller.
    pub fn output(&self) -> &OutputController {
        &self.output
    }

    /// Media engine.
    pub fn engine(&self) -> &dyn MediaEngine {
        self.engine.as_ref()
    }

    /// Shared preview state.
    pub fn preview(&self) -> &Arc<PreviewState> {
        &self.preview
    }

    /// Service bound on each push.
    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    /// Replace the service used by the next push.
    pub fn set_service(&mut self, service: ServiceConfig) {
        self.service = service;
    }

    /// Renderer drawing the program scene into the preview.
    pub fn renderer(&self) -> PreviewRenderer {
        PreviewRenderer::new(Arc::clone(&self.preview), self.scene.clone())
    }

    /// Recompute the preview placement for a resized surface.
    pub fn resize_preview(&self, surface: SurfaceSize) -> PreviewViewport {
        self.preview.resize(surface)
    }

    fn add_source(
        &self,
        kind: SourceKind,
        settings: SourceSettings,
        scale: f64,
    ) -> StagecastResult<ItemId> {
        let name = format!("{} test", kind.type_tag());
        let source = self
            .factory
            .create_source(kind.type_tag(), &name, settings)?;
        let id = self
            .scene
            .add_source(source, Vec2::new(scale, scale), true)?;
        tracing::info!(item = id.0, kind = kind.type_tag(), "source added");
        Ok(id)
    }

    /// Full display capture at 0.2 scale.
    pub fn add_monitor_source(&self) -> StagecastResult<ItemId> {
        self.add_source(SourceKind::MonitorCapture, SourceSettings::new(), CAPTURE_SCALE)
    }

    /// Looping media file at 0.2 scale.
    pub fn add_video_file_source(&self, path: impl AsRef<Path>) -> StagecastResult<ItemId> {
        let settings = SourceSettings::new()
            .with_str("local_file", path.as_ref().to_string_lossy())
            .with_bool("looping", true);
        self.add_source(SourceKind::MediaSource, settings, CAPTURE_SCALE)
    }

    /// Still image at native scale.
    pub fn add_image_source(&self, path: impl AsRef<Path>) -> StagecastResult<ItemId> {
        let settings = SourceSettings::new().with_str("file", path.as_ref().to_string_lossy());
        self.add_source(SourceKind::ImageSource, settings, 1.0)
    }

    /// Camera at 0.2 scale. `None` picks the first enumerated device.
    pub fn add_camera_source(&self, device_id: Option<&str>) -> StagecastResult<ItemId> {
        let device = match device_id {
            Some(d) => d.to_owned(),
            None => self
                .factory
                .video_devices()
                .into_iter()
                .next()
                .ok_or_else(|| StagecastError::source_creation("no video capture device found"))?,
        };
        let settings = SourceSettings::new().with_str("video_device_id", device);
        self.add_source(SourceKind::VideoCapture, settings, CAPTURE_SCALE)
    }

    /// Text overlay at native scale.
    pub fn add_text_source(&self, text: &str) -> StagecastResult<ItemId> {
        let settings = SourceSettings::new().with_str("text", text);
        self.add_source(SourceKind::Text, settings, 1.0)
    }

    /// Microphone/line-in capture.
    pub fn add_audio_input_source(&self, device_id: &str) -> StagecastResult<ItemId> {
        let settings = SourceSettings::new().with_str("device_id", device_id);
        self.add_source(SourceKind::AudioInputCapture, settings, 1.0)
    }

    /// Desktop audio capture.
    pub fn add_audio_output_source(&self, device_id: &str) -> StagecastResult<ItemId> {
        let settings = SourceSettings::new().with_str("device_id", device_id);
        self.add_source(SourceKind::AudioOutputCapture, settings, 1.0)
    }

    /// Bind the service and start streaming. A no-op while a session is already in flight.
    #[tracing::instrument(skip(self))]
    pub fn start_push(&mut self) -> StagecastResult<Transition> {
        if self.output.streaming_active() {
            return Ok(Transition::NoOp);
        }
        let res = if self.output.state() == OutputState::Configuring {
            self.output.start_streaming()
        } else {
            self.output
                .setup_streaming(&self.service)
                .and_then(|_| self.output.start_streaming())
        };
        self.pump_events();
        res
    }

    /// Graceful stop (honors the stop delay).
    pub fn stop_push(&mut self) -> Transition {
        let t = self.output.stop_streaming(false);
        self.pump_events();
        t
    }

    /// Immediate stop.
    pub fn force_stop_push(&mut self) -> Transition {
        let t = self.output.stop_streaming(true);
        self.pump_events();
        t
    }

    fn relay(&mut self, event: &OutputEvent) {
        self.status.on_event(event);
        self.last_status = Some(event.status_text());
    }

    /// Relay every pending event to the status sink. Returns the relayed events.
    ///
    /// Never blocks; call it periodically so asynchronous completions reach the sink.
    pub fn pump_events(&mut self) -> Vec<OutputEvent> {
        let pending: Vec<OutputEvent> = self.events.try_iter().collect();
        for e in &pending {
            self.relay(e);
        }
        pending
    }

    /// Relay events until one matches `pred` or `timeout` passes.
    pub fn wait_for_event(
        &mut self,
        timeout: Duration,
        mut pred: impl FnMut(&OutputEvent) -> bool,
    ) -> Option<OutputEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(left) {
                Ok(e) => {
                    self.relay(&e);
                    if pred(&e) {
                        return Some(e);
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Last status line relayed.
    pub fn last_status(&self) -> Option<&str> {
        self.last_status.as_deref()
    }

    /// Force-stop the output and release the program scene.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.output.stop_streaming(true);
        self.output.shutdown();
        self.pump_events();
        if let Err(e) = self.scene.bind_scene(PROGRAM_SCENE) {
            tracing::warn!(error = %e, "failed to release program scene");
        }
        tracing::info!("orchestrator shut down");
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/app/orchestrator.rs"]
mod tests;
