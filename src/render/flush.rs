//! Two-phase flush protocol between the render task and the panel.
//!
//! The render task submits a [`FlushRequest`] that owns the draw buffer and
//! keeps the matching [`FlushPending`]. The flush side blits the region and
//! calls [`FlushDone::complete`], which consumes the completion token and
//! hands the buffer back. A token can only be completed once; dropping it
//! uncompleted shows up as [`FlushError::Abandoned`] on the waiting side.

use crate::display::{HwError, PanelHandle, PixelBuf};
use crate::gfx::DirtyRegion;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlushError {
    #[error("Flush of {0} was dropped without completion")]
    Abandoned(DirtyRegion),

    #[error("Flush worker is no longer running")]
    WorkerGone,
}

/// Region plus the draw buffer holding its pixels
#[derive(Debug)]
pub struct FlushRequest {
    area: DirtyRegion,
    buffer: PixelBuf,
    done: FlushDone,
}

/// Completion token, consumed when the flush finishes
#[derive(Debug)]
pub struct FlushDone {
    tx: oneshot::Sender<PixelBuf>,
}

/// Render-side half, resolved once the flush completes
#[derive(Debug)]
pub struct FlushPending {
    area: DirtyRegion,
    rx: oneshot::Receiver<PixelBuf>,
}

impl FlushRequest {
    /// Pair a request with the handle to wait on. `buffer` holds the area's
    /// pixels row-major with the area width as stride; a short buffer fails
    /// the flush.
    pub fn new(area: DirtyRegion, buffer: PixelBuf) -> (Self, FlushPending) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                area,
                buffer,
                done: FlushDone { tx },
            },
            FlushPending { area, rx },
        )
    }

    pub fn area(&self) -> DirtyRegion {
        self.area
    }

    pub fn into_parts(self) -> (DirtyRegion, PixelBuf, FlushDone) {
        (self.area, self.buffer, self.done)
    }
}

impl FlushDone {
    /// Signal completion and return the buffer to the render task
    pub fn complete(self, buffer: PixelBuf) {
        // The render task may already be gone during shutdown
        let _ = self.tx.send(buffer);
    }
}

impl FlushPending {
    pub fn area(&self) -> DirtyRegion {
        self.area
    }

    /// Wait for the flush side to signal completion
    pub async fn wait(self) -> Result<PixelBuf, FlushError> {
        self.rx.await.map_err(|_| FlushError::Abandoned(self.area))
    }
}

/// Blit one region into the frame buffer, then signal completion.
///
/// The region's inclusive corners become the exclusive end coordinates the
/// hardware expects. Completion is signalled whether or not the draw
/// succeeds; a failed draw is logged and returned for accounting.
pub fn flush(panel: &PanelHandle, request: FlushRequest) -> Result<usize, HwError> {
    let (area, buffer, done) = request.into_parts();
    let (x_end, y_end) = area.exclusive_end();
    let pixels = area.pixel_count();

    let result = match buffer.get(..pixels) {
        Some(data) => panel.draw_bitmap(area.x1, area.y1, x_end, y_end, data),
        None => Err(HwError::InvalidRegion {
            x_start: area.x1,
            y_start: area.y1,
            x_end,
            y_end,
        }),
    };
    if let Err(e) = &result {
        tracing::error!("Flush of {} failed: {}", area, e);
    }

    done.complete(buffer);
    result.map(|()| pixels)
}

/// Consume flush requests in order until the channel closes
pub async fn run_worker(panel: PanelHandle, mut requests: mpsc::Receiver<FlushRequest>) {
    tracing::debug!("Flush worker started");
    while let Some(request) = requests.recv().await {
        let _ = flush(&panel, request);
    }
    tracing::debug!("Flush worker stopped");
}
