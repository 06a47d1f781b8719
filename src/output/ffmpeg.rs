use crate::foundation::core::Canvas;
use crate::foundation::error::{StagecastError, StagecastResult};
use crate::output::backend::{OutputBackend, OutputSignals};
use crate::output::events::StopCode;
use crate::output::mode::EncoderPairing;
use crate::output::service::ServiceConfig;
use crate::render::raster::{mul_div255, rasterize_scene};
use crate::scene::graph::SceneGraph;
use crossbeam_channel::{Receiver, Sender, select, tick, unbounded};
use std::io::{Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Options for [`FfmpegPushBackend`].
#[derive(Clone, Debug)]
pub struct FfmpegPushOpts {
    /// `ffmpeg` executable.
    pub ffmpeg: PathBuf,
    /// Background color used to flatten alpha (RGBA8, straight alpha).
    pub bg_rgba: [u8; 4],
    /// How long `ffmpeg` must stay alive after spawn before the stream counts as started.
    pub connect_grace: Duration,
}

impl Default for FfmpegPushOpts {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            bg_rgba: [0, 0, 0, 255],
            connect_grace: Duration::from_secs(2),
        }
    }
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    ffmpeg_runs(Path::new("ffmpeg"))
}

fn ffmpeg_runs(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

const NOT_REQUESTED: u8 = 0;
const GRACEFUL: u8 = 1;
const FORCED: u8 = 2;

/// Poll interval while waiting for `ffmpeg` to exit.
const REAP_POLL: Duration = Duration::from_millis(10);

/// The `ffmpeg` child, shared so a forced stop can kill it while the feeder is blocked on the
/// pipe. The lock is never held across a blocking call.
type SharedChild = Arc<Mutex<Child>>;

fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Kill the child unless it has already exited.
fn kill_child(child: &Mutex<Child>) {
    let mut child = lock_child(child);
    if matches!(child.try_wait(), Ok(None)) {
        if let Err(e) = child.kill() {
            tracing::debug!(error = %e, "failed to kill ffmpeg");
        }
    }
}

struct Session {
    stop_tx: Sender<bool>,
    child: SharedChild,
    requested: Arc<AtomicU8>,
    worker: JoinHandle<()>,
}

/// Output backend that pushes the bound scene to an RTMP server through the system `ffmpeg`.
///
/// Each session spawns `ffmpeg` reading raw RGBA frames on stdin. A feeder thread rasterizes the
/// scene at the encode size every frame interval. Audio is a silent track at the configured rate.
/// A forced stop kills `ffmpeg` at once, even while a frame write is blocked on a full pipe.
pub struct FfmpegPushBackend {
    opts: FfmpegPushOpts,
    scene: SceneGraph,
    canvas: Canvas,
    pairing: Option<EncoderPairing>,
    session: Option<Session>,
}

impl std::fmt::Debug for FfmpegPushBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegPushBackend")
            .field("opts", &self.opts)
            .field("canvas", &self.canvas)
            .field("pairing", &self.pairing)
            .field("running", &self.session.is_some())
            .finish()
    }
}

impl FfmpegPushBackend {
    /// Backend streaming `scene` composed on `canvas`.
    pub fn new(opts: FfmpegPushOpts, scene: SceneGraph, canvas: Canvas) -> Self {
        Self {
            opts,
            scene,
            canvas,
            pairing: None,
            session: None,
        }
    }

    fn join_session(&mut self) {
        if let Some(session) = self.session.take() {
            // A session still running here is abandoned.
            session.requested.fetch_max(FORCED, Ordering::SeqCst);
            kill_child(&session.child);
            drop(session.stop_tx);
            if session.worker.join().is_err() {
                tracing::error!("ffmpeg feeder thread panicked");
            }
        }
    }
}

impl OutputBackend for FfmpegPushBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn setup(&mut self, service: &ServiceConfig, pairing: &EncoderPairing) -> StagecastResult<()> {
        if !ffmpeg_runs(&self.opts.ffmpeg) {
            return Err(StagecastError::setup(format!(
                "'{}' is required for streaming, but could not be run",
                self.opts.ffmpeg.display()
            )));
        }
        video_codec(&pairing.video_encoder)?;
        tracing::debug!(service = service.kind(), url = %pairing.publish_url, "ffmpeg output bound");
        self.pairing = Some(pairing.clone());
        Ok(())
    }

    fn start(&mut self, signals: OutputSignals) -> StagecastResult<()> {
        let pairing = self.pairing.clone().ok_or_else(|| {
            StagecastError::stream_start(StopCode::Error.code(), "ffmpeg output is not set up")
        })?;
        self.join_session();

        let mut cmd = Command::new(&self.opts.ffmpeg);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .args(ffmpeg_args(&pairing)?);

        let mut child = cmd.spawn().map_err(|e| {
            StagecastError::stream_start(
                StopCode::Error.code(),
                format!("failed to spawn ffmpeg (is it installed and on PATH?): {e}"),
            )
        })?;
        let stdin = child.stdin.take();
        let stderr = child.stderr.take();
        let (Some(stdin), Some(mut stderr)) = (stdin, stderr) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(StagecastError::stream_start(
                StopCode::Error.code(),
                "failed to open ffmpeg pipes (unexpected)",
            ));
        };

        let stderr_tail = Arc::new(Mutex::new(String::new()));
        let stderr_drain = {
            let tail = Arc::clone(&stderr_tail);
            std::thread::spawn(move || {
                let mut bytes = Vec::new();
                let res = stderr.read_to_end(&mut bytes);
                *tail.lock().unwrap_or_else(PoisonError::into_inner) =
                    String::from_utf8_lossy(&bytes).trim().to_owned();
                res.map(|_| ())
            })
        };

        let child = Arc::new(Mutex::new(child));
        let requested = Arc::new(AtomicU8::new(NOT_REQUESTED));
        let (stop_tx, stop_rx) = unbounded();
        let feeder = Feeder {
            child: Arc::clone(&child),
            requested: Arc::clone(&requested),
            stdin: Some(stdin),
            stderr_drain: Some(stderr_drain),
            stderr_tail,
            scene: self.scene.clone(),
            canvas: self.canvas,
            pairing,
            bg_rgba: self.opts.bg_rgba,
            grace: self.opts.connect_grace,
        };
        let worker = match std::thread::Builder::new()
            .name("stagecast-ffmpeg".to_owned())
            .spawn(move || feeder.run(&signals, &stop_rx))
        {
            Ok(worker) => worker,
            Err(e) => {
                kill_child(&child);
                return Err(StagecastError::Other(
                    anyhow::Error::new(e).context("spawn ffmpeg feeder thread"),
                ));
            }
        };
        self.session = Some(Session {
            stop_tx,
            child,
            requested,
            worker,
        });
        Ok(())
    }

    fn stop(&mut self, force: bool) {
        if let Some(session) = &self.session {
            let level = if force { FORCED } else { GRACEFUL };
            session.requested.fetch_max(level, Ordering::SeqCst);
            if force {
                kill_child(&session.child);
            }
            let _ = session.stop_tx.send(force);
        }
    }

    fn teardown(&mut self) {
        self.join_session();
        self.pairing = None;
    }
}

impl Drop for FfmpegPushBackend {
    fn drop(&mut self) {
        self.join_session();
    }
}

struct Feeder {
    child: SharedChild,
    requested: Arc<AtomicU8>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<std::io::Result<()>>>,
    stderr_tail: Arc<Mutex<String>>,
    scene: SceneGraph,
    canvas: Canvas,
    pairing: EncoderPairing,
    bg_rgba: [u8; 4],
    grace: Duration,
}

impl Feeder {
    fn run(mut self, signals: &OutputSignals, stop_rx: &Receiver<bool>) {
        let fps = f64::from(self.pairing.fps_num) / f64::from(self.pairing.fps_den.max(1));
        let interval = Duration::from_secs_f64(1.0 / fps.max(1.0));
        let ticker = tick(interval);
        let spawned = Instant::now();
        let mut started = false;
        let mut frames = 0u64;

        loop {
            select! {
                recv(stop_rx) -> msg => {
                    let requested = msg.is_ok();
                    let code = self.finish(msg.unwrap_or(true), stop_rx);
                    if requested {
                        tracing::info!(frames, "ffmpeg push stopped");
                        signals.stopped(code, stop_message(started));
                    }
                    return;
                }
                recv(ticker) -> _ => {
                    if let Err(e) = self.push_frame() {
                        // A write cut short by a requested stop is that stop, not a failure.
                        match self.requested.load(Ordering::SeqCst) {
                            NOT_REQUESTED => {
                                let detail = self.died(&e, stop_rx);
                                if started {
                                    signals.stopped(StopCode::Disconnected.code(), detail);
                                } else {
                                    signals.start_failed(StopCode::ConnectFailed.code(), detail);
                                }
                            }
                            level => {
                                let code = self.finish(level == FORCED, stop_rx);
                                tracing::info!(frames, error = %e, "ffmpeg push stopped mid-frame");
                                signals.stopped(code, stop_message(started));
                            }
                        }
                        return;
                    }
                    frames += 1;
                    if !started && spawned.elapsed() >= self.grace {
                        started = true;
                        tracing::info!(url = %self.pairing.publish_url, "ffmpeg push running");
                        signals.started();
                    }
                }
            }
        }
    }

    fn push_frame(&mut self) -> StagecastResult<()> {
        if let Ok(Some(status)) = lock_child(&self.child).try_wait() {
            return Err(StagecastError::validation(format!(
                "ffmpeg exited with status {status}"
            )));
        }
        let scene = self.scene.bound_scene();
        let size = self.pairing.size;
        let mut frame = rasterize_scene(&scene, self.canvas, size.width, size.height, self.bg_rgba)?;
        flatten_premul_over_bg(&mut frame.data, self.bg_rgba);

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| StagecastError::validation("ffmpeg stdin already closed"))?;
        stdin.write_all(&frame.data).map_err(|e| {
            StagecastError::validation(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    /// Close the pipe and reap the child. Returns the stop code.
    fn finish(&mut self, force: bool, stop_rx: &Receiver<bool>) -> i32 {
        drop(self.stdin.take());
        if force {
            kill_child(&self.child);
        }
        let (status, killed) = self.reap(force, stop_rx);
        let tail = self.drain_stderr();
        match status {
            Ok(s) if s.success() || killed => StopCode::Success.code(),
            Ok(s) => {
                tracing::warn!(status = %s, stderr = %tail, "ffmpeg exited uncleanly on stop");
                StopCode::Error.code()
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to wait for ffmpeg");
                StopCode::Error.code()
            }
        }
    }

    fn died(&mut self, cause: &StagecastError, stop_rx: &Receiver<bool>) -> String {
        drop(self.stdin.take());
        kill_child(&self.child);
        let (status, _) = self.reap(true, stop_rx);
        let tail = self.drain_stderr();
        tracing::warn!(error = %cause, ?status, stderr = %tail, "ffmpeg push failed");
        if tail.is_empty() {
            cause.to_string()
        } else {
            tail
        }
    }

    /// Wait for the child to exit. A forced stop (or a dropped backend) arriving meanwhile kills
    /// it. Returns the exit status and whether the child was killed.
    fn reap(
        &self,
        mut killed: bool,
        stop_rx: &Receiver<bool>,
    ) -> (std::io::Result<ExitStatus>, bool) {
        loop {
            match lock_child(&self.child).try_wait() {
                Ok(Some(status)) => return (Ok(status), killed),
                Ok(None) => {}
                Err(e) => return (Err(e), killed),
            }
            if !killed && self.requested.load(Ordering::SeqCst) == FORCED {
                killed = true;
            }
            if killed {
                std::thread::sleep(REAP_POLL);
                continue;
            }
            select! {
                recv(stop_rx) -> msg => {
                    if !matches!(msg, Ok(false)) {
                        kill_child(&self.child);
                        killed = true;
                    }
                }
                default(REAP_POLL) => {}
            }
        }
    }

    fn drain_stderr(&mut self) -> String {
        if let Some(handle) = self.stderr_drain.take() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "ffmpeg stderr read failed"),
                Err(_) => tracing::error!("ffmpeg stderr drain thread panicked"),
            }
        }
        self.stderr_tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn stop_message(started: bool) -> &'static str {
    if started {
        "stream stopped"
    } else {
        "connect cancelled"
    }
}

fn video_codec(encoder: &str) -> StagecastResult<&'static str> {
    Ok(match encoder {
        "x264" | "h264" => "libx264",
        "nvenc_h264" => "h264_nvenc",
        "qsv_h264" => "h264_qsv",
        "amf_h264" => "h264_amf",
        other => {
            return Err(StagecastError::setup(format!(
                "no ffmpeg codec for video encoder '{other}'"
            )));
        }
    })
}

/// Command line for one push session.
pub(crate) fn ffmpeg_args(pairing: &EncoderPairing) -> StagecastResult<Vec<String>> {
    let codec = video_codec(&pairing.video_encoder)?;
    let layout = if pairing.channels == 1 { "mono" } else { "stereo" };

    let mut args: Vec<String> = [
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect();
    args.push(format!("{}x{}", pairing.size.width, pairing.size.height));
    // Input framerate goes before `-i` for rawvideo.
    args.push("-r".into());
    args.push(format!("{}/{}", pairing.fps_num, pairing.fps_den));
    args.extend(["-i", "pipe:0", "-f", "lavfi", "-i"].map(str::to_owned));
    args.push(format!(
        "anullsrc=channel_layout={layout}:sample_rate={}",
        pairing.sample_rate
    ));
    args.extend(["-map", "0:v", "-map", "1:a", "-c:v", codec].map(str::to_owned));
    if let Some(preset) = &pairing.preset {
        args.push("-preset".into());
        args.push(preset.clone());
    }
    args.push("-b:v".into());
    args.push(format!("{}k", pairing.video_bitrate_kbps));
    args.push("-g".into());
    args.push(pairing.keyint_frames.to_string());
    args.extend(["-pix_fmt", "yuv420p", "-c:a", "aac", "-b:a"].map(str::to_owned));
    args.push(format!("{}k", pairing.audio_bitrate_kbps));
    args.extend(["-f", "flv"].map(str::to_owned));
    args.push(pairing.publish_url.clone());
    Ok(args)
}

fn flatten_premul_over_bg(data: &mut [u8], bg_rgba: [u8; 4]) {
    let bg = [
        u16::from(bg_rgba[0]),
        u16::from(bg_rgba[1]),
        u16::from(bg_rgba[2]),
    ];
    for px in data.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 255 {
            continue;
        }
        let inv = 255u16 - a;
        for i in 0..3 {
            px[i] = (u16::from(px[i]) + mul_div255(bg[i], inv)).min(255) as u8;
        }
        px[3] = 255;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/output/ffmpeg.rs"]
mod tests;
