//! Render bridge between the scene and the panel.
//!
//! Attaching allocates the ping-pong draw buffers, creates the scene and its
//! access lock, and starts the render task on a dedicated thread. From then
//! on foreground code mutates the scene through [`AccessLock`] and the render
//! task flushes whatever changed.

pub mod flush;
pub mod lock;
pub mod task;

pub use flush::FlushError;
pub use lock::{AccessLock, UiGuard};

use crate::display::{HwError, MemoryPools, PanelHandle, Placement, color};
use crate::gfx::{DirtyRegion, Scene};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use task::{RenderTask, TaskTiming};
use tokio::sync::{broadcast, oneshot};

/// How the draw buffers are sized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferingMode {
    /// Scan-line strips, many flushes per frame
    #[default]
    Partial,
    /// Two whole-frame buffers, one full-screen flush per frame
    Full,
}

/// Render task settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub mode: BufferingMode,
    /// Scan lines per draw buffer in partial mode
    pub lines_per_buffer: u32,
    /// Where the draw buffers are placed
    pub placement: Placement,
    /// Scheduling priority requested for the render task
    pub task_priority: u8,
    /// Stack size of the render thread in bytes
    pub task_stack_bytes: usize,
    /// Redraw period in milliseconds
    pub timer_period_ms: u64,
    /// Longest wait for the scene lock per redraw, in milliseconds
    pub max_sleep_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            mode: BufferingMode::Partial,
            lines_per_buffer: 50,
            placement: Placement::External,
            task_priority: 4,
            task_stack_bytes: 256 * 1024,
            timer_period_ms: 5,
            max_sleep_ms: 500,
        }
    }
}

/// Counters updated by the render task
#[derive(Debug, Default)]
pub struct RenderStats {
    frames: AtomicU64,
    flushes: AtomicU64,
    pixels: AtomicU64,
    skipped: AtomicU64,
}

/// Point-in-time copy of [`RenderStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub flushes: u64,
    pub pixels: u64,
    pub skipped: u64,
}

impl RenderStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            pixels: self.pixels.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames, {} flushes, {} pixels, {} skipped",
            self.frames, self.flushes, self.pixels, self.skipped
        )
    }
}

struct Running {
    lock: AccessLock,
    capacity: usize,
    shutdown: broadcast::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

/// Graphics attachment for an initialized panel
pub struct RenderBridge {
    config: RenderConfig,
    pools: MemoryPools,
    stats: Arc<RenderStats>,
    running: Option<Running>,
}

impl RenderBridge {
    pub fn new(config: RenderConfig, pools: MemoryPools) -> Self {
        Self {
            config,
            pools,
            stats: Arc::new(RenderStats::default()),
            running: None,
        }
    }

    #[allow(dead_code)]
    pub fn is_attached(&self) -> bool {
        self.running.is_some()
    }

    /// Scene lock for foreground code; `None` until attached
    pub fn lock(&self) -> Option<AccessLock> {
        self.running.as_ref().map(|running| running.lock.clone())
    }

    /// Pixels per draw buffer; `None` until attached
    #[allow(dead_code)]
    pub fn draw_buffer_capacity(&self) -> Option<usize> {
        self.running.as_ref().map(|running| running.capacity)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Shared counters, readable after the bridge moves elsewhere
    pub fn stats_handle(&self) -> Arc<RenderStats> {
        Arc::clone(&self.stats)
    }

    /// Attach the scene to an initialized panel and start rendering.
    ///
    /// Attaching again is a no-op.
    pub fn attach(&mut self, panel: PanelHandle, lines_per_buffer: u32) -> Result<(), HwError> {
        let Some(display) = panel.config().cloned() else {
            tracing::error!("Display not initialized, call init first");
            return Err(HwError::NotReady);
        };

        if self.running.is_some() || panel.is_attached() {
            tracing::warn!("Graphics already attached, skipping");
            return Ok(());
        }

        let lines = match self.config.mode {
            BufferingMode::Partial => lines_per_buffer.clamp(1, display.height as u32),
            BufferingMode::Full => display.height as u32,
        };
        let capacity = display.width as usize * lines as usize;

        // Dropping `first` on failure returns it to the pool
        let first = self.pools.alloc_pixels(self.config.placement, capacity)?;
        let second = self.pools.alloc_pixels(self.config.placement, capacity)?;
        tracing::info!(
            "Allocated draw buffers: {} pixels x 2 ({} lines, {} memory)",
            capacity,
            lines,
            self.config.placement
        );

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| HwError::TaskStart(e.to_string()))?;

        let lock = AccessLock::new(Scene::new(display.width, display.height, color::BLACK));
        let screen = DirtyRegion::new(0, 0, display.width - 1, display.height - 1);
        let timing = TaskTiming {
            period: Duration::from_millis(self.config.timer_period_ms.max(1)),
            max_sleep: Duration::from_millis(self.config.max_sleep_ms),
        };
        let task = RenderTask::new(
            panel.clone(),
            lock.clone(),
            (first, second),
            self.config.mode,
            screen,
            timing,
            Arc::clone(&self.stats),
        );

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (start_tx, start_rx) = oneshot::channel::<()>();

        // The task holds the draw buffers, so it must not touch them until
        // the panel is marked attached
        let thread = std::thread::Builder::new()
            .name("gfx-render".to_string())
            .stack_size(self.config.task_stack_bytes)
            .spawn(move || {
                runtime.block_on(async move {
                    if start_rx.await.is_ok() {
                        task.run(shutdown_rx).await;
                    }
                });
            })
            .map_err(|e| HwError::TaskStart(e.to_string()))?;

        if !panel.mark_attached()? {
            // Lost a race with another bridge; dropping `start_tx` ends the thread
            tracing::warn!("Graphics already attached, skipping");
            return Ok(());
        }
        let _ = start_tx.send(());

        tracing::info!(
            "Graphics attached (priority {}, stack {} bytes, period {:?})",
            self.config.task_priority,
            self.config.task_stack_bytes,
            timing.period
        );

        self.running = Some(Running {
            lock,
            capacity,
            shutdown: shutdown_tx,
            thread: Some(thread),
        });
        Ok(())
    }
}

impl Drop for RenderBridge {
    fn drop(&mut self) {
        if let Some(mut running) = self.running.take() {
            let _ = running.shutdown.send(());
            if let Some(thread) = running.thread.take() {
                let _ = thread.join();
            }
            tracing::debug!("Render task stopped");
        }
    }
}
