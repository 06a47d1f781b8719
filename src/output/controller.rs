//! Streaming output lifecycle.
//!
//! All transitions happen under one mutex. Backend completions and delay timers never touch the
//! state directly: they post a [`ControlMsg`] to the controller's dispatcher thread, which applies
//! them one at a time. Events are emitted while the lock is held, so subscribers see them in
//! transition order.

use crate::foundation::error::{StagecastError, StagecastResult};
use crate::output::backend::{ControlMsg, OutputBackend, OutputSignals};
use crate::output::events::{EventSender, OutputEvent, StopCode};
use crate::output::mode::{EncoderPairing, OutputMode};
use crate::output::service::ServiceConfig;
use crate::output::state::OutputState;
use crate::video::config::{AudioConfig, VideoConfig};
use crossbeam_channel::{Receiver, Sender, after, bounded, select, unbounded};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Options of an [`OutputController`].
#[derive(Clone, Debug, Default)]
pub struct OutputControllerOpts {
    /// Output pipeline.
    pub mode: OutputMode,
    /// Canvas/encode configuration the pairing is resolved against.
    pub video: VideoConfig,
    /// Audio configuration the pairing is resolved against.
    pub audio: AudioConfig,
    /// Delay between `start_streaming` and the backend start request.
    pub start_delay: Duration,
    /// Delay between a graceful `stop_streaming` and the backend stop request.
    pub stop_delay: Duration,
}

/// Outcome of a lifecycle request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The request changed the state.
    Applied,
    /// The request was redundant in the current state and was ignored.
    NoOp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DelayKind {
    Start,
    Stop,
}

struct PendingDelay {
    ticket: u64,
    kind: DelayKind,
    // Dropping the sender wakes and cancels the timer thread.
    _cancel: Sender<()>,
}

struct Inner {
    state: OutputState,
    backend: Box<dyn OutputBackend>,
    opts: OutputControllerOpts,
    events: EventSender,
    control_tx: Sender<ControlMsg>,
    session: u64,
    next_ticket: u64,
    delay: Option<PendingDelay>,
    pairing: Option<EncoderPairing>,
    last_error: Option<(i32, String)>,
}

/// State machine governing one streaming output.
pub struct OutputController {
    inner: Arc<Mutex<Inner>>,
    control_tx: Sender<ControlMsg>,
    events_rx: Receiver<OutputEvent>,
    dispatcher: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for OutputController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("OutputController")
            .field("backend", &inner.backend.name())
            .field("mode", &inner.opts.mode.label())
            .field("state", &inner.state)
            .finish()
    }
}

fn whole_seconds(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

impl OutputController {
    /// Create a controller driving `backend`. Spawns the dispatcher thread.
    pub fn new(
        backend: Box<dyn OutputBackend>,
        opts: OutputControllerOpts,
    ) -> StagecastResult<Self> {
        let (control_tx, control_rx) = unbounded();
        let (events_tx, events_rx) = unbounded();
        let inner = Arc::new(Mutex::new(Inner {
            state: OutputState::Idle,
            backend,
            opts,
            events: EventSender::new(events_tx),
            control_tx: control_tx.clone(),
            session: 0,
            next_ticket: 0,
            delay: None,
            pairing: None,
            last_error: None,
        }));

        let dispatcher = {
            let inner = Arc::clone(&inner);
            std::thread::Builder::new()
                .name("stagecast-output".to_owned())
                .spawn(move || dispatch(inner, control_rx))
                .map_err(|e| {
                    StagecastError::Other(
                        anyhow::Error::new(e).context("spawn output dispatcher thread"),
                    )
                })?
        };

        Ok(Self {
            inner,
            control_tx,
            events_rx,
            dispatcher: Some(dispatcher),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receiver of lifecycle events. Clones share one queue.
    pub fn events(&self) -> Receiver<OutputEvent> {
        self.events_rx.clone()
    }

    /// Current state.
    pub fn state(&self) -> OutputState {
        self.lock().state
    }

    /// `true` while a session is in flight (starting, delayed, active or stopping).
    pub fn streaming_active(&self) -> bool {
        self.lock().state.is_streaming()
    }

    /// Code and message of the last failed session.
    pub fn last_error(&self) -> Option<(i32, String)> {
        self.lock().last_error.clone()
    }

    /// Encoder pairing bound by the last successful setup.
    pub fn pairing(&self) -> Option<EncoderPairing> {
        self.lock().pairing.clone()
    }

    /// Bind the output to `service`. Valid only from `Idle`.
    #[tracing::instrument(skip_all, fields(service = service.kind()))]
    pub fn setup_streaming(&self, service: &ServiceConfig) -> StagecastResult<Transition> {
        let mut inner = self.lock();
        if inner.state != OutputState::Idle {
            return Err(StagecastError::invalid_state(format!(
                "setup_streaming requires idle output, state is {}",
                inner.state
            )));
        }
        inner.set_state(OutputState::Configuring);

        let res = inner
            .opts
            .mode
            .resolve(&inner.opts.video, &inner.opts.audio, service)
            .and_then(|pairing| {
                inner.backend.setup(service, &pairing)?;
                Ok(pairing)
            });

        match res {
            Ok(pairing) => {
                tracing::info!(
                    video_encoder = %pairing.video_encoder,
                    audio_encoder = %pairing.audio_encoder,
                    size = %format!("{}x{}", pairing.size.width, pairing.size.height),
                    "output configured"
                );
                inner.pairing = Some(pairing);
                Ok(Transition::Applied)
            }
            Err(e) => {
                let message = match e {
                    StagecastError::Setup(m) => m,
                    other => other.to_string(),
                };
                tracing::warn!(%message, "output setup failed");
                inner.backend.teardown();
                inner.set_state(OutputState::Idle);
                inner.events.emit(OutputEvent::SetupFailed {
                    message: message.clone(),
                });
                Err(StagecastError::Setup(message))
            }
        }
    }

    /// Start the configured output. Duplicate requests while a session is in flight are no-ops.
    #[tracing::instrument(skip_all)]
    pub fn start_streaming(&self) -> StagecastResult<Transition> {
        let mut inner = self.lock();
        match inner.state {
            s if s.is_streaming() => {
                tracing::debug!(state = %s, "start ignored: output already active");
                Ok(Transition::NoOp)
            }
            OutputState::Configuring => {
                let delay = inner.opts.start_delay;
                if delay.is_zero() {
                    inner.begin_start();
                } else {
                    inner.schedule_delay(DelayKind::Start, delay)?;
                    inner.set_state(OutputState::DelayedStart);
                    inner.events.emit(OutputEvent::DelayStarting {
                        seconds: whole_seconds(delay),
                    });
                }
                Ok(Transition::Applied)
            }
            s => Err(StagecastError::invalid_state(format!(
                "start_streaming requires a configured output, state is {s}"
            ))),
        }
    }

    /// Stop the session. `force` skips the stop delay and any graceful flush.
    #[tracing::instrument(skip(self))]
    pub fn stop_streaming(&self, force: bool) -> Transition {
        let mut inner = self.lock();
        match inner.state {
            OutputState::Idle | OutputState::Configuring | OutputState::Error => Transition::NoOp,
            OutputState::Stopping => {
                if force {
                    inner.backend.stop(true);
                    Transition::Applied
                } else {
                    Transition::NoOp
                }
            }
            OutputState::DelayedStart => {
                // Nothing was started yet: cancel the timer and tear down right away.
                inner.delay = None;
                inner.finish(StopCode::Success.code(), "stream start cancelled".to_owned());
                Transition::Applied
            }
            OutputState::DelayedStop => {
                if force {
                    inner.delay = None;
                    inner.begin_stop(true);
                    Transition::Applied
                } else {
                    Transition::NoOp
                }
            }
            OutputState::Starting => {
                inner.begin_stop(force);
                Transition::Applied
            }
            OutputState::Active => {
                let delay = inner.opts.stop_delay;
                if force || delay.is_zero() {
                    inner.begin_stop(force);
                } else {
                    match inner.schedule_delay(DelayKind::Stop, delay) {
                        Ok(()) => {
                            inner.set_state(OutputState::DelayedStop);
                            inner.events.emit(OutputEvent::DelayStopping {
                                seconds: whole_seconds(delay),
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "stop delay unavailable, stopping now");
                            inner.begin_stop(false);
                        }
                    }
                }
                Transition::Applied
            }
        }
    }

    /// Force-stop any session and join the dispatcher. Called on drop.
    pub fn shutdown(&mut self) {
        let Some(dispatcher) = self.dispatcher.take() else {
            return;
        };
        {
            let mut inner = self.lock();
            inner.delay = None;
            if inner.state.is_streaming() {
                inner.backend.stop(true);
                inner.finish(StopCode::Success.code(), "output shut down".to_owned());
            } else if inner.state == OutputState::Configuring {
                inner.backend.teardown();
                inner.pairing = None;
                inner.set_state(OutputState::Idle);
            }
        }
        let _ = self.control_tx.send(ControlMsg::Shutdown);
        if dispatcher.join().is_err() {
            tracing::error!("output dispatcher thread panicked");
        }
    }
}

impl Drop for OutputController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn set_state(&mut self, next: OutputState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "output state");
            self.state = next;
        }
    }

    fn schedule_delay(&mut self, kind: DelayKind, delay: Duration) -> StagecastResult<()> {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let tx = self.control_tx.clone();
        std::thread::Builder::new()
            .name("stagecast-output-delay".to_owned())
            .spawn(move || {
                select! {
                    recv(cancel_rx) -> _ => {}
                    recv(after(delay)) -> _ => {
                        let _ = tx.send(ControlMsg::DelayElapsed { ticket });
                    }
                }
            })
            .map_err(|e| {
                StagecastError::Other(anyhow::Error::new(e).context("spawn output delay thread"))
            })?;
        self.delay = Some(PendingDelay {
            ticket,
            kind,
            _cancel: cancel_tx,
        });
        Ok(())
    }

    fn begin_start(&mut self) {
        self.session += 1;
        self.set_state(OutputState::Starting);
        let signals = OutputSignals::new(self.control_tx.clone(), self.session);
        tracing::info!(session = self.session, backend = self.backend.name(), "starting stream");
        if let Err(e) = self.backend.start(signals) {
            let (code, message) = match e {
                StagecastError::StreamStart { code, message } => (code, message),
                other => (StopCode::Error.code(), other.to_string()),
            };
            self.fail_start(code, message);
        }
    }

    fn fail_start(&mut self, code: i32, message: String) {
        let code = if code == 0 { StopCode::Error.code() } else { code };
        tracing::warn!(code, %message, "stream start failed");
        self.set_state(OutputState::Error);
        self.finish(code, message);
    }

    fn begin_stop(&mut self, force: bool) {
        self.set_state(OutputState::Stopping);
        self.events.emit(OutputEvent::StreamingStopping);
        self.backend.stop(force);
    }

    /// Tear the session down and report it stopped.
    fn finish(&mut self, code: i32, message: String) {
        self.delay = None;
        self.backend.teardown();
        self.pairing = None;
        // Invalidate any signal still in flight for this session.
        self.session += 1;
        if code != 0 {
            self.last_error = Some((code, message.clone()));
        }
        self.set_state(OutputState::Idle);
        tracing::info!(code, %message, "stream stopped");
        self.events
            .emit(OutputEvent::StreamingStopped { code, message });
    }

    fn handle(&mut self, msg: ControlMsg) {
        match msg {
            ControlMsg::Started { session } => {
                if session == self.session && self.state == OutputState::Starting {
                    self.set_state(OutputState::Active);
                    tracing::info!(session, "stream started");
                    self.events.emit(OutputEvent::StreamingStarted);
                } else {
                    tracing::debug!(session, state = %self.state, "stale start signal ignored");
                }
            }
            ControlMsg::StartFailed {
                session,
                code,
                message,
            } => {
                if session != self.session {
                    return;
                }
                match self.state {
                    OutputState::Starting => self.fail_start(code, message),
                    OutputState::Stopping => self.finish(code, message),
                    _ => {}
                }
            }
            ControlMsg::Stopped {
                session,
                code,
                message,
            } => {
                if session != self.session {
                    return;
                }
                match self.state {
                    OutputState::Starting => self.fail_start(code, message),
                    OutputState::Active | OutputState::Stopping | OutputState::DelayedStop => {
                        if code != 0 && self.state != OutputState::Stopping {
                            tracing::warn!(code, %message, "stream disconnected");
                        }
                        self.finish(code, message);
                    }
                    _ => {}
                }
            }
            ControlMsg::DelayElapsed { ticket } => {
                let Some(kind) = self
                    .delay
                    .as_ref()
                    .filter(|d| d.ticket == ticket)
                    .map(|d| d.kind)
                else {
                    return;
                };
                self.delay = None;
                match (kind, self.state) {
                    (DelayKind::Start, OutputState::DelayedStart) => self.begin_start(),
                    (DelayKind::Stop, OutputState::DelayedStop) => self.begin_stop(false),
                    _ => {}
                }
            }
            ControlMsg::Shutdown => {}
        }
    }
}

fn dispatch(inner: Arc<Mutex<Inner>>, rx: Receiver<ControlMsg>) {
    for msg in rx.iter() {
        if matches!(msg, ControlMsg::Shutdown) {
            break;
        }
        let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.handle(msg);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/output/controller.rs"]
mod tests;
