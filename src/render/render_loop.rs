use crate::foundation::error::{StagecastError, StagecastResult};
use crate::render::graphics::GraphicsContext;
use crate::render::preview::PreviewRenderer;
use crossbeam_channel::{Sender, bounded, select, tick};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Counters of a [`RenderLoop`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderLoopStats {
    /// Frames rendered.
    pub frames: u64,
    /// Frames where the canvas was drawn (non-empty viewport).
    pub drawn: u64,
    /// Longest single frame.
    pub max_frame_time: Duration,
    /// Frames that took longer than the frame interval.
    pub overruns: u64,
}

/// Renders the preview on a dedicated thread at a fixed interval.
///
/// The render thread only reads published scene and viewport snapshots; it never takes the scene
/// writer lock.
pub struct RenderLoop<G: GraphicsContext + Send + 'static> {
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<(PreviewRenderer, G)>>,
    stats: Arc<Mutex<RenderLoopStats>>,
}

impl<G: GraphicsContext + Send + 'static> std::fmt::Debug for RenderLoop<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderLoop")
            .field("running", &self.worker.is_some())
            .field("stats", &self.stats())
            .finish()
    }
}

impl<G: GraphicsContext + Send + 'static> RenderLoop<G> {
    /// Start rendering into `gfx` every `interval`.
    pub fn spawn(
        mut renderer: PreviewRenderer,
        mut gfx: G,
        interval: Duration,
    ) -> StagecastResult<Self> {
        if interval.is_zero() {
            return Err(StagecastError::validation(
                "render interval must be non-zero",
            ));
        }
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let stats = Arc::new(Mutex::new(RenderLoopStats::default()));
        let shared = Arc::clone(&stats);

        let worker = std::thread::Builder::new()
            .name("stagecast-render".to_owned())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let t0 = Instant::now();
                            let drawn = renderer.render_frame(&mut gfx);
                            let dt = t0.elapsed();

                            let mut s = shared.lock().unwrap_or_else(PoisonError::into_inner);
                            s.frames += 1;
                            s.drawn += u64::from(drawn);
                            s.max_frame_time = s.max_frame_time.max(dt);
                            if dt > interval {
                                s.overruns += 1;
                                tracing::trace!(?dt, "render frame overran its interval");
                            }
                        }
                    }
                }
                (renderer, gfx)
            })
            .map_err(|e| {
                StagecastError::Other(anyhow::Error::new(e).context("spawn render thread"))
            })?;

        tracing::debug!(?interval, "render loop started");
        Ok(Self {
            stop_tx: Some(stop_tx),
            worker: Some(worker),
            stats,
        })
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> RenderLoopStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop the thread and hand back the renderer and surface.
    pub fn stop(mut self) -> StagecastResult<(PreviewRenderer, G)> {
        self.join()?
            .ok_or_else(|| StagecastError::invalid_state("render loop already stopped"))
    }

    fn join(&mut self) -> StagecastResult<Option<(PreviewRenderer, G)>> {
        drop(self.stop_tx.take());
        let Some(worker) = self.worker.take() else {
            return Ok(None);
        };
        let out = worker
            .join()
            .map_err(|_| StagecastError::Other(anyhow::anyhow!("render thread panicked")))?;
        tracing::debug!(stats = ?self.stats(), "render loop stopped");
        Ok(Some(out))
    }
}

impl<G: GraphicsContext + Send + 'static> Drop for RenderLoop<G> {
    fn drop(&mut self) {
        if let Err(e) = self.join() {
            tracing::error!(error = %e, "render loop shutdown failed");
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/render_loop.rs"]
mod tests;
