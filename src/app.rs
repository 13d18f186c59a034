//! Foreground workloads for the panel.
//!
//! The validation cycle drives the frame buffer directly, the demo mutates the
//! scene through the access lock, and the status logger reports render
//! statistics. Each listens for the broadcast shutdown signal.

use crate::display::{HwError, PanelController, color};
use crate::gfx::{ObjectId, Scene};
use crate::render::{AccessLock, RenderStats};
use embedded_graphics::pixelcolor::Rgb565;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// One screen of the validation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fill(&'static str, Rgb565),
    ColorBars,
}

/// Screens and how many time units each is held
pub const CYCLE: [(Step, u32); 6] = [
    (Step::Fill("red", color::RED), 2),
    (Step::Fill("green", color::GREEN), 2),
    (Step::Fill("blue", color::BLUE), 2),
    (Step::ColorBars, 4),
    (Step::Fill("white", color::WHITE), 2),
    (Step::Fill("black", color::BLACK), 2),
];

/// Solid colors and color bars, repeated
pub struct ValidationCycle {
    unit: Duration,
}

impl Default for ValidationCycle {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl ValidationCycle {
    pub fn new(unit: Duration) -> Self {
        Self { unit }
    }

    /// Duration of one full cycle
    pub fn cycle_duration(&self) -> Duration {
        self.unit * CYCLE.iter().map(|(_, units)| units).sum::<u32>()
    }

    /// Run `cycles` cycles, or until shutdown when `None`.
    ///
    /// Returns the number of completed cycles.
    pub async fn run(
        &self,
        panel: &PanelController,
        cycles: Option<u32>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<u32, HwError> {
        tracing::info!("Starting validation cycle");
        let mut completed = 0;

        while cycles.is_none_or(|limit| completed < limit) {
            for (step, units) in CYCLE {
                match step {
                    Step::Fill(name, fill) => {
                        tracing::info!("Fill {}", name);
                        panel.fill(fill)?;
                    }
                    Step::ColorBars => panel.draw_test_pattern()?,
                }

                tokio::select! {
                    _ = tokio::time::sleep(self.unit * units) => {}
                    _ = shutdown.recv() => {
                        tracing::info!("Validation cycle interrupted");
                        return Ok(completed);
                    }
                }
            }

            completed += 1;
            tracing::info!(
                "Cycle {} complete ({:?} elapsed)",
                completed,
                self.cycle_duration() * completed
            );
        }

        Ok(completed)
    }
}

const BLOCK_SIZE: u16 = 60;
const BAR_HEIGHT: u16 = 40;

/// Scene objects owned by the demo
#[derive(Debug)]
pub struct DemoState {
    block: ObjectId,
    x: i32,
    y: i32,
    dx: i32,
    dy: i32,
    tick: u32,
}

impl DemoState {
    /// Lay out a row of color bars and a moving block
    pub fn create(scene: &mut Scene) -> Self {
        let bar_width = (scene.width() / color::BARS.len() as u16).max(1);
        for (i, bar) in color::BARS.iter().enumerate() {
            scene.create_rect(i as i32 * bar_width as i32, 0, bar_width, BAR_HEIGHT, *bar);
        }

        let y = BAR_HEIGHT as i32 + 20;
        let block = scene.create_rect(0, y, BLOCK_SIZE, BLOCK_SIZE, color::RED);
        Self {
            block,
            x: 0,
            y,
            dx: 8,
            dy: 4,
            tick: 0,
        }
    }

    #[allow(dead_code)]
    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    /// Advance the block one step, bouncing off the screen edges
    pub fn step(&mut self, scene: &mut Scene) {
        // Screens smaller than the block pin it to the top-left corner
        let min_y = BAR_HEIGHT as i32;
        let max_x = (scene.width() as i32 - BLOCK_SIZE as i32).max(0);
        let max_y = (scene.height() as i32 - BLOCK_SIZE as i32).max(min_y);

        self.x += self.dx;
        if self.x <= 0 || self.x >= max_x {
            self.x = self.x.clamp(0, max_x);
            self.dx = -self.dx;
        }
        self.y += self.dy;
        if self.y <= min_y || self.y >= max_y {
            self.y = self.y.clamp(min_y, max_y);
            self.dy = -self.dy;
        }

        scene.move_to(self.block, self.x, self.y);

        self.tick += 1;
        if self.tick % 25 == 0 {
            let next = color::BARS[(self.tick / 25) as usize % (color::BARS.len() - 1)];
            scene.set_color(self.block, next);
        }
    }
}

/// Counters returned when the demo stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DemoReport {
    pub updates: u64,
    pub skipped: u64,
}

/// Foreground task animating the scene
pub struct Demo {
    lock: AccessLock,
    period: Duration,
    timeout: Duration,
}

impl Demo {
    pub fn new(lock: AccessLock, period: Duration, timeout: Duration) -> Self {
        Self {
            lock,
            period,
            timeout,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> DemoReport {
        let mut report = DemoReport::default();

        let mut state = match self.lock.acquire(self.timeout).await {
            Some(mut ui) => DemoState::create(&mut ui),
            None => {
                tracing::warn!("Scene busy, demo not started");
                return report;
            }
        };
        tracing::info!("Demo started");

        let mut ticker = tokio::time::interval(self.period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.lock.acquire(self.timeout).await {
                        Some(mut ui) => {
                            state.step(&mut ui);
                            report.updates += 1;
                        }
                        None => {
                            tracing::warn!("Scene lock timed out, skipping update");
                            report.skipped += 1;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Demo shutting down");
                    break;
                }
            }
        }

        report
    }
}

/// Log render statistics every `interval` until shutdown
pub async fn run_status(
    stats: Arc<RenderStats>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut last_frames = 0;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let snapshot = stats.snapshot();
                tracing::info!(
                    "Render status: {} (+{} frames)",
                    snapshot,
                    snapshot.frames - last_frames
                );
                last_frames = snapshot.frames;
            }
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{DisplayConfig, MemoryPools, SimulatedRgbPanel};

    fn ready_panel() -> PanelController {
        let mut panel = PanelController::new(Box::new(SimulatedRgbPanel::new()), MemoryPools::default());
        panel.init(DisplayConfig::default()).unwrap();
        panel
    }

    #[test]
    fn test_cycle_is_fourteen_units() {
        let cycle = ValidationCycle::default();
        assert_eq!(cycle.cycle_duration(), Duration::from_secs(14));
    }

    #[tokio::test]
    async fn test_cycle_ends_on_black() {
        let panel = ready_panel();
        let (_tx, mut rx) = broadcast::channel(1);
        let cycle = ValidationCycle::new(Duration::from_millis(1));

        let completed = cycle.run(&panel, Some(2), &mut rx).await.unwrap();
        assert_eq!(completed, 2);
        assert_eq!(panel.pixel(0, 0), Some(color::BLACK));
        assert_eq!(panel.pixel(799, 479), Some(color::BLACK));
    }

    #[tokio::test]
    async fn test_cycle_stops_on_shutdown() {
        let panel = ready_panel();
        let (tx, mut rx) = broadcast::channel(1);
        tx.send(()).unwrap();

        let cycle = ValidationCycle::new(Duration::from_secs(60));
        let completed = cycle.run(&panel, None, &mut rx).await.unwrap();
        assert_eq!(completed, 0);
        // The first screen was drawn before the wait
        assert_eq!(panel.pixel(400, 240), Some(color::RED));
    }

    #[tokio::test]
    async fn test_cycle_before_init() {
        let panel = PanelController::new(Box::new(SimulatedRgbPanel::new()), MemoryPools::default());
        let (_tx, mut rx) = broadcast::channel(1);
        let cycle = ValidationCycle::new(Duration::from_millis(1));
        assert_eq!(cycle.run(&panel, Some(1), &mut rx).await, Err(HwError::NotReady));
    }

    #[test]
    fn test_demo_block_stays_on_screen() {
        let mut scene = Scene::new(800, 480, color::BLACK);
        let mut state = DemoState::create(&mut scene);
        assert_eq!(scene.object_count(), color::BARS.len() + 1);

        for _ in 0..500 {
            state.step(&mut scene);
            let (x, y) = state.position();
            assert!((0..=800 - BLOCK_SIZE as i32).contains(&x));
            assert!((BAR_HEIGHT as i32..=480 - BLOCK_SIZE as i32).contains(&y));
        }
        assert!(scene.is_dirty());
    }

    #[test]
    fn test_demo_on_screen_smaller_than_block() {
        let mut scene = Scene::new(50, 50, color::BLACK);
        let mut state = DemoState::create(&mut scene);

        for _ in 0..10 {
            state.step(&mut scene);
            assert_eq!(state.position(), (0, BAR_HEIGHT as i32));
        }
    }

    #[tokio::test]
    async fn test_demo_skips_while_lock_held() {
        let lock = AccessLock::new(Scene::new(800, 480, color::BLACK));
        let demo = Demo::new(lock.clone(), Duration::from_millis(5), Duration::from_millis(5));
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(demo.run(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let held = lock.acquire(Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);

        tx.send(()).unwrap();
        let report = handle.await.unwrap();
        assert!(report.updates > 0);
        assert!(report.skipped > 0);
    }
}
