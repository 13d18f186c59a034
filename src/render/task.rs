//! Render task.
//!
//! Runs on its own thread with a private current-thread runtime. Every
//! timer period it takes the scene lock, renders the invalidated areas into
//! the two draw buffers in turn and submits them to the flush worker.

use super::flush::{self, FlushError, FlushPending, FlushRequest};
use super::lock::AccessLock;
use super::{BufferingMode, RenderStats};
use crate::display::{PanelHandle, PixelBuf};
use crate::gfx::DirtyRegion;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Ping-pong draw buffers
struct DrawBuffers {
    idle: Vec<PixelBuf>,
    in_flight: VecDeque<FlushPending>,
}

impl DrawBuffers {
    fn new(first: PixelBuf, second: PixelBuf) -> Self {
        Self {
            idle: vec![first, second],
            in_flight: VecDeque::with_capacity(2),
        }
    }

    /// Next buffer that is not being flushed, waiting for the oldest flush if needed
    async fn next_free(&mut self) -> Result<PixelBuf, FlushError> {
        if let Some(buffer) = self.idle.pop() {
            return Ok(buffer);
        }
        match self.in_flight.pop_front() {
            Some(pending) => pending.wait().await,
            None => Err(FlushError::WorkerGone),
        }
    }

    /// Wait for every submitted flush to complete
    async fn drain(&mut self) -> Result<(), FlushError> {
        while let Some(pending) = self.in_flight.pop_front() {
            self.idle.push(pending.wait().await?);
        }
        Ok(())
    }
}

/// Timing of the render loop
#[derive(Debug, Clone, Copy)]
pub struct TaskTiming {
    /// Interval between redraw passes
    pub period: Duration,
    /// Longest wait for the scene lock before skipping a pass
    pub max_sleep: Duration,
}

pub struct RenderTask {
    panel: PanelHandle,
    lock: AccessLock,
    buffers: DrawBuffers,
    capacity: usize,
    mode: BufferingMode,
    screen: DirtyRegion,
    timing: TaskTiming,
    stats: Arc<RenderStats>,
}

impl RenderTask {
    pub fn new(
        panel: PanelHandle,
        lock: AccessLock,
        buffers: (PixelBuf, PixelBuf),
        mode: BufferingMode,
        screen: DirtyRegion,
        timing: TaskTiming,
        stats: Arc<RenderStats>,
    ) -> Self {
        let capacity = buffers.0.len().min(buffers.1.len());
        Self {
            panel,
            lock,
            buffers: DrawBuffers::new(buffers.0, buffers.1),
            capacity,
            mode,
            screen,
            timing,
            stats,
        }
    }

    /// Run redraw passes until shutdown is signalled
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            "Render task started ({:?} mode, period {:?})",
            self.mode,
            self.timing.period
        );

        // One request queued while the other buffer renders
        let (flush_tx, flush_rx) = mpsc::channel(1);
        let worker = tokio::spawn(flush::run_worker(self.panel.clone(), flush_rx));

        let mut ticker = tokio::time::interval(self.timing.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh(&flush_tx).await {
                        tracing::error!("Render pipeline stalled: {}", e);
                        break;
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Render task shutting down");
                    break;
                }
            }
        }

        drop(flush_tx);
        let _ = worker.await;
    }

    /// One redraw pass. Returns whether anything was flushed.
    async fn refresh(&mut self, flush_tx: &mpsc::Sender<FlushRequest>) -> Result<bool, FlushError> {
        let Some(mut ui) = self.lock.acquire(self.timing.max_sleep).await else {
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        };

        if !ui.is_dirty() {
            return Ok(false);
        }

        let areas = match self.mode {
            BufferingMode::Partial => ui.take_invalidated(),
            BufferingMode::Full => {
                ui.take_invalidated();
                vec![self.screen]
            }
        };

        for area in areas {
            for strip in area.strips(self.capacity) {
                let mut buffer = self.buffers.next_free().await?;
                ui.render(&strip, &mut buffer);

                let (request, pending) = FlushRequest::new(strip, buffer);
                flush_tx
                    .send(request)
                    .await
                    .map_err(|_| FlushError::WorkerGone)?;
                self.buffers.in_flight.push_back(pending);

                self.stats.flushes.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .pixels
                    .fetch_add(strip.pixel_count() as u64, Ordering::Relaxed);
            }
        }

        // The frame is complete once every strip has landed
        self.buffers.drain().await?;
        drop(ui);

        self.stats.frames.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }
}
