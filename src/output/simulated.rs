use crate::foundation::error::{StagecastError, StagecastResult};
use crate::output::backend::{OutputBackend, OutputSignals};
use crate::output::events::StopCode;
use crate::output::mode::EncoderPairing;
use crate::output::service::ServiceConfig;
use crossbeam_channel::{Receiver, Sender, after, never, select, unbounded};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Scripted behavior of a [`SimulatedBackend`].
#[derive(Clone, Debug)]
pub struct SimulatedScript {
    /// Time between `start` and the started (or failed) signal.
    pub connect_latency: Duration,
    /// Fail the connection with this code and message instead of starting.
    pub fail_connect: Option<(i32, String)>,
    /// Return this error synchronously from `start`.
    pub refuse_start: Option<(i32, String)>,
    /// Reject `setup` with this message.
    pub reject_setup: Option<String>,
    /// Drop the connection this long after it came up.
    pub disconnect_after: Option<Duration>,
    /// Time a graceful stop takes to flush.
    pub stop_latency: Duration,
    /// Code reported for a requested stop.
    pub stop_code: i32,
}

impl Default for SimulatedScript {
    fn default() -> Self {
        Self {
            connect_latency: Duration::from_millis(20),
            fail_connect: None,
            refuse_start: None,
            reject_setup: None,
            disconnect_after: None,
            stop_latency: Duration::from_millis(10),
            stop_code: StopCode::Success.code(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    setups: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
    teardowns: AtomicUsize,
    publish_url: Mutex<Option<String>>,
}

/// Call counters of a [`SimulatedBackend`], readable after the backend moved into a controller.
#[derive(Clone, Debug, Default)]
pub struct SimulatedStats {
    counters: Arc<Counters>,
}

impl SimulatedStats {
    /// Number of `setup` calls.
    pub fn setups(&self) -> usize {
        self.counters.setups.load(Ordering::SeqCst)
    }

    /// Number of `start` calls.
    pub fn starts(&self) -> usize {
        self.counters.starts.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls.
    pub fn stops(&self) -> usize {
        self.counters.stops.load(Ordering::SeqCst)
    }

    /// Number of `teardown` calls.
    pub fn teardowns(&self) -> usize {
        self.counters.teardowns.load(Ordering::SeqCst)
    }

    /// Publish URL bound by the last accepted `setup`.
    pub fn publish_url(&self) -> Option<String> {
        self.counters
            .publish_url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct Session {
    stop_tx: Sender<bool>,
    worker: JoinHandle<()>,
}

/// In-process output backend with scripted connect, stop and failure timing.
///
/// Used for dry runs and lifecycle tests; no network traffic is generated.
pub struct SimulatedBackend {
    script: SimulatedScript,
    stats: SimulatedStats,
    session: Option<Session>,
}

impl std::fmt::Debug for SimulatedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedBackend")
            .field("script", &self.script)
            .field("running", &self.session.is_some())
            .finish()
    }
}

impl SimulatedBackend {
    /// Backend following `script`.
    pub fn new(script: SimulatedScript) -> Self {
        Self {
            script,
            stats: SimulatedStats::default(),
            session: None,
        }
    }

    /// Shared call counters.
    pub fn stats(&self) -> SimulatedStats {
        self.stats.clone()
    }

    fn join_session(&mut self) {
        if let Some(session) = self.session.take() {
            drop(session.stop_tx);
            if session.worker.join().is_err() {
                tracing::error!("simulated session thread panicked");
            }
        }
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(SimulatedScript::default())
    }
}

impl OutputBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    fn setup(&mut self, service: &ServiceConfig, pairing: &EncoderPairing) -> StagecastResult<()> {
        self.stats.counters.setups.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.script.reject_setup {
            return Err(StagecastError::setup(msg.clone()));
        }
        tracing::debug!(service = service.kind(), url = %pairing.publish_url, "simulated setup");
        *self
            .stats
            .counters
            .publish_url
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(pairing.publish_url.clone());
        Ok(())
    }

    fn start(&mut self, signals: OutputSignals) -> StagecastResult<()> {
        self.stats.counters.starts.fetch_add(1, Ordering::SeqCst);
        if let Some((code, msg)) = &self.script.refuse_start {
            return Err(StagecastError::stream_start(*code, msg.clone()));
        }
        self.join_session();

        let (stop_tx, stop_rx) = unbounded();
        let script = self.script.clone();
        let worker = std::thread::Builder::new()
            .name("stagecast-simulated".to_owned())
            .spawn(move || run_session(&script, &signals, &stop_rx))
            .map_err(|e| {
                StagecastError::Other(anyhow::Error::new(e).context("spawn simulated session"))
            })?;
        self.session = Some(Session { stop_tx, worker });
        Ok(())
    }

    fn stop(&mut self, force: bool) {
        self.stats.counters.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(session) = &self.session {
            let _ = session.stop_tx.send(force);
        }
    }

    fn teardown(&mut self) {
        self.stats.counters.teardowns.fetch_add(1, Ordering::SeqCst);
        self.join_session();
    }
}

impl Drop for SimulatedBackend {
    fn drop(&mut self) {
        self.join_session();
    }
}

fn run_session(script: &SimulatedScript, signals: &OutputSignals, stop_rx: &Receiver<bool>) {
    // Connect phase.
    select! {
        recv(stop_rx) -> msg => {
            if msg.is_ok() {
                signals.stopped(StopCode::Success.code(), "connect cancelled");
            }
            return;
        }
        recv(after(script.connect_latency)) -> _ => {}
    }
    if let Some((code, msg)) = &script.fail_connect {
        signals.start_failed(*code, msg.clone());
        return;
    }
    signals.started();

    // Active phase.
    let disconnect = script.disconnect_after.map(after).unwrap_or_else(never);
    let force = select! {
        recv(stop_rx) -> msg => match msg {
            Ok(force) => force,
            Err(_) => return,
        },
        recv(disconnect) -> _ => {
            signals.stopped(
                StopCode::Disconnected.code(),
                StopCode::Disconnected.describe(),
            );
            return;
        }
    };

    // Flush phase; a later forced stop cuts it short.
    if !force {
        let flush = after(script.stop_latency);
        loop {
            select! {
                recv(stop_rx) -> msg => match msg {
                    Ok(true) => break,
                    Ok(false) => continue,
                    Err(_) => return,
                },
                recv(flush) -> _ => break,
            }
        }
    }
    signals.stopped(script.stop_code, "stream stopped");
}

#[cfg(test)]
#[path = "../../tests/unit/output/simulated.rs"]
mod tests;
