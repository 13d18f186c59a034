//! Panel controller.
//!
//! Owns the timing generator and, through it, the frame buffer. The state
//! only ever moves forward: Uninitialized -> HardwareReady -> GraphicsAttached.

use super::memory::MemoryPools;
use super::rgb_panel::{DisplayConfig, HwError, Pixel, TimingGenerator, color};
use super::snapshot::{self, SnapshotError};
use super::target::BufferTarget;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::{DrawTarget, Drawable, Point, Primitive, Size};
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Panel bring-up state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PanelState {
    Uninitialized,
    HardwareReady,
    GraphicsAttached,
}

impl std::fmt::Display for PanelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PanelState::Uninitialized => write!(f, "uninitialized"),
            PanelState::HardwareReady => write!(f, "hardware-ready"),
            PanelState::GraphicsAttached => write!(f, "graphics-attached"),
        }
    }
}

struct PanelShared {
    hw: Mutex<Box<dyn TimingGenerator>>,
    config: DisplayConfig,
    attached: AtomicBool,
}

impl PanelShared {
    fn hw(&self) -> MutexGuard<'_, Box<dyn TimingGenerator>> {
        self.hw.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Opaque reference to an initialized timing generator.
///
/// A default handle is invalid; every operation on it fails with
/// [`HwError::NotReady`].
#[derive(Clone, Default)]
pub struct PanelHandle(Option<Arc<PanelShared>>);

impl PanelHandle {
    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    /// Configuration the panel was initialized with
    pub fn config(&self) -> Option<&DisplayConfig> {
        self.0.as_ref().map(|shared| &shared.config)
    }

    pub fn is_attached(&self) -> bool {
        self.0
            .as_ref()
            .is_some_and(|shared| shared.attached.load(Ordering::Acquire))
    }

    /// Blocking rectangular blit; end coordinates are exclusive
    pub fn draw_bitmap(
        &self,
        x_start: u16,
        y_start: u16,
        x_end: u16,
        y_end: u16,
        data: &[Pixel],
    ) -> Result<(), HwError> {
        let shared = self.0.as_ref().ok_or(HwError::NotReady)?;
        shared
            .hw()
            .draw_bitmap(x_start, y_start, x_end, y_end, data)
    }

    /// Record the graphics attachment. Returns false if it already happened.
    pub(crate) fn mark_attached(&self) -> Result<bool, HwError> {
        let shared = self.0.as_ref().ok_or(HwError::NotReady)?;
        Ok(!shared.attached.swap(true, Ordering::AcqRel))
    }
}

impl std::fmt::Debug for PanelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(shared) => write!(
                f,
                "PanelHandle({}x{})",
                shared.config.width, shared.config.height
            ),
            None => write!(f, "PanelHandle(invalid)"),
        }
    }
}

/// RGB panel controller
pub struct PanelController {
    pools: MemoryPools,
    generator: Option<Box<dyn TimingGenerator>>,
    shared: Option<Arc<PanelShared>>,
}

impl PanelController {
    /// Create an uninitialized controller around a timing generator
    pub fn new(generator: Box<dyn TimingGenerator>, pools: MemoryPools) -> Self {
        Self {
            pools,
            generator: Some(generator),
            shared: None,
        }
    }

    pub fn state(&self) -> PanelState {
        match &self.shared {
            None => PanelState::Uninitialized,
            Some(shared) if shared.attached.load(Ordering::Acquire) => {
                PanelState::GraphicsAttached
            }
            Some(_) => PanelState::HardwareReady,
        }
    }

    pub fn config(&self) -> Option<&DisplayConfig> {
        self.shared.as_ref().map(|shared| &shared.config)
    }

    /// Initialize the panel hardware
    pub fn init(&mut self, config: DisplayConfig) -> Result<(), HwError> {
        if self.shared.is_some() {
            tracing::debug!("Panel already initialized");
            return Ok(());
        }

        tracing::info!(
            "Initializing RGB LCD panel ({}x{})",
            config.width,
            config.height
        );

        let generator = self.generator.as_mut().ok_or(HwError::NotReady)?;

        let frame_buffer = self
            .pools
            .alloc_pixels(config.placement, config.pixel_count())?;
        let fb_bytes = frame_buffer.bytes();

        generator.configure(&config, frame_buffer)?;

        let bring_up = generator.reset().and_then(|()| generator.start());
        if let Err(e) = bring_up {
            tracing::error!("Failed to start panel: {}", e);
            drop(generator.unbind());
            return Err(e);
        }

        let Some(generator) = self.generator.take() else {
            return Err(HwError::NotReady);
        };

        tracing::info!(
            "RGB LCD panel initialized: frame buffer {} bytes in {} memory, {:.1} Hz",
            fb_bytes,
            config.placement,
            config.refresh_rate_hz()
        );

        self.shared = Some(Arc::new(PanelShared {
            hw: Mutex::new(generator),
            config,
            attached: AtomicBool::new(false),
        }));

        Ok(())
    }

    /// Handle for the render bridge; invalid until initialized
    pub fn handle(&self) -> PanelHandle {
        PanelHandle(self.shared.clone())
    }

    fn with_frame_buffer<R>(&self, f: impl FnOnce(&[Pixel]) -> R) -> Result<R, HwError> {
        let shared = self.shared.as_ref().ok_or(HwError::NotReady)?;
        let hw = shared.hw();
        let fb = hw.frame_buffer().ok_or(HwError::NotReady)?;
        Ok(f(fb))
    }

    fn with_frame_buffer_mut<R>(
        &self,
        f: impl FnOnce(&mut [Pixel], &DisplayConfig) -> R,
    ) -> Result<R, HwError> {
        let Some(shared) = self.shared.as_ref() else {
            tracing::error!("Display not initialized");
            return Err(HwError::NotReady);
        };
        let mut hw = shared.hw();
        let fb = hw.frame_buffer_mut().ok_or(HwError::NotReady)?;
        Ok(f(fb, &shared.config))
    }

    /// Fill the entire frame buffer with one color
    pub fn fill(&self, color: Rgb565) -> Result<(), HwError> {
        self.with_frame_buffer_mut(|fb, config| {
            let Ok(()) = BufferTarget::new(config.screen(), fb).clear(color);
        })?;
        tracing::debug!("Filled display with {:#06X}", color::raw(color));
        Ok(())
    }

    /// Draw 8 vertical color bars
    pub fn draw_test_pattern(&self) -> Result<(), HwError> {
        self.with_frame_buffer_mut(|fb, config| {
            let width = u32::from(config.width);
            let height = u32::from(config.height);
            let bar_width = (width / color::BARS.len() as u32).max(1);
            let last = color::BARS.len() - 1;
            let mut target = BufferTarget::new(config.screen(), fb);

            for (i, &bar) in color::BARS.iter().enumerate() {
                let x = i as u32 * bar_width;
                // The last bar absorbs the remainder of the width
                let w = if i == last {
                    width.saturating_sub(x)
                } else {
                    bar_width
                };
                let Ok(()) = Rectangle::new(Point::new(x as i32, 0), Size::new(w, height))
                    .into_styled(PrimitiveStyle::with_fill(bar))
                    .draw(&mut target);
            }
        })?;

        tracing::info!("Drew test color bars");
        Ok(())
    }

    /// Read back one pixel
    #[allow(dead_code)]
    pub fn pixel(&self, x: u16, y: u16) -> Option<Rgb565> {
        let config = self.config()?;
        if x >= config.width || y >= config.height {
            return None;
        }
        let idx = y as usize * config.width as usize + x as usize;
        self.with_frame_buffer(|fb| fb.get(idx).copied())
            .ok()
            .flatten()
            .map(color::from_raw)
    }

    /// Copy of the whole frame buffer
    #[allow(dead_code)]
    pub fn frame_buffer(&self) -> Result<Vec<Pixel>, HwError> {
        self.with_frame_buffer(|fb| fb.to_vec())
    }

    /// Write the frame buffer out as a PNG
    pub fn snapshot_png<P: AsRef<Path>>(&self, path: P) -> Result<(), SnapshotError> {
        let config = self.config().ok_or(SnapshotError::NotReady)?;
        let (width, height) = (config.width, config.height);
        let pixels = self.frame_buffer().map_err(|_| SnapshotError::NotReady)?;
        snapshot::save_png(&pixels, width, height, path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::memory::{PixelBuf, Placement};
    use crate::display::rgb_panel::{HEIGHT, SimulatedRgbPanel, WIDTH};

    fn controller() -> PanelController {
        PanelController::new(Box::new(SimulatedRgbPanel::new()), MemoryPools::default())
    }

    #[test]
    fn test_init_yields_valid_handle() {
        let mut panel = controller();
        assert_eq!(panel.state(), PanelState::Uninitialized);
        assert!(!panel.handle().is_valid());

        panel.init(DisplayConfig::default()).unwrap();
        assert_eq!(panel.state(), PanelState::HardwareReady);
        assert!(panel.handle().is_valid());
        assert_eq!(
            panel.frame_buffer().unwrap().len(),
            WIDTH as usize * HEIGHT as usize
        );
    }

    #[test]
    fn test_init_is_idempotent() {
        let pools = MemoryPools::default();
        let mut panel = PanelController::new(Box::new(SimulatedRgbPanel::new()), pools.clone());
        panel.init(DisplayConfig::default()).unwrap();
        let used = pools.used(Placement::External);

        panel.fill(color::RED).unwrap();
        panel.init(DisplayConfig::default()).unwrap();

        assert_eq!(pools.used(Placement::External), used);
        assert_eq!(panel.pixel(0, 0), Some(color::RED));
    }

    #[test]
    fn test_init_internal_placement_has_no_room() {
        let pools = MemoryPools::default();
        let mut panel = PanelController::new(Box::new(SimulatedRgbPanel::new()), pools.clone());
        let config = DisplayConfig {
            placement: Placement::Internal,
            ..DisplayConfig::default()
        };

        let err = panel.init(config).unwrap_err();
        assert!(matches!(err, HwError::NoMemory { .. }));
        assert_eq!(panel.state(), PanelState::Uninitialized);
        assert_eq!(pools.used(Placement::Internal), 0);

        // Still usable with a placement that fits
        panel.init(DisplayConfig::default()).unwrap();
        assert_eq!(panel.state(), PanelState::HardwareReady);
    }

    #[test]
    fn test_rejected_timing_releases_frame_buffer() {
        let pools = MemoryPools::default();
        let mut panel = PanelController::new(Box::new(SimulatedRgbPanel::new()), pools.clone());
        let config = DisplayConfig {
            pclk_hz: 0,
            ..DisplayConfig::default()
        };

        let err = panel.init(config).unwrap_err();
        assert!(matches!(err, HwError::PeripheralInit(_)));
        assert_eq!(pools.used(Placement::External), 0);
        assert_eq!(panel.state(), PanelState::Uninitialized);
    }

    /// Simulated panel whose scan-out never starts
    struct StalledPanel(SimulatedRgbPanel);

    impl TimingGenerator for StalledPanel {
        fn configure(&mut self, config: &DisplayConfig, fb: PixelBuf) -> Result<(), HwError> {
            self.0.configure(config, fb)
        }

        fn unbind(&mut self) -> Option<PixelBuf> {
            self.0.unbind()
        }

        fn reset(&mut self) -> Result<(), HwError> {
            self.0.reset()
        }

        fn start(&mut self) -> Result<(), HwError> {
            Err(HwError::PeripheralInit("scan-out did not start".to_string()))
        }

        fn draw_bitmap(
            &mut self,
            x_start: u16,
            y_start: u16,
            x_end: u16,
            y_end: u16,
            data: &[Pixel],
        ) -> Result<(), HwError> {
            self.0.draw_bitmap(x_start, y_start, x_end, y_end, data)
        }

        fn frame_buffer(&self) -> Option<&[Pixel]> {
            self.0.frame_buffer()
        }

        fn frame_buffer_mut(&mut self) -> Option<&mut [Pixel]> {
            self.0.frame_buffer_mut()
        }
    }

    #[test]
    fn test_start_failure_releases_frame_buffer() {
        let pools = MemoryPools::default();
        let mut panel =
            PanelController::new(Box::new(StalledPanel(SimulatedRgbPanel::new())), pools.clone());

        let err = panel.init(DisplayConfig::default()).unwrap_err();
        assert!(matches!(err, HwError::PeripheralInit(_)));
        assert_eq!(pools.used(Placement::External), 0);
        assert_eq!(panel.state(), PanelState::Uninitialized);
        assert!(!panel.handle().is_valid());
        assert_eq!(panel.fill(color::WHITE), Err(HwError::NotReady));

        // The generator is kept, so a retry fails the same way without leaking
        assert!(panel.init(DisplayConfig::default()).is_err());
        assert_eq!(pools.used(Placement::External), 0);
    }

    #[test]
    fn test_fill_sets_every_pixel() {
        let mut panel = controller();
        panel.init(DisplayConfig::default()).unwrap();

        panel.fill(color::RED).unwrap();
        assert!(panel.frame_buffer().unwrap().iter().all(|&p| p == 0xF800));

        panel.fill(color::from_raw(0x1234)).unwrap();
        assert!(panel.frame_buffer().unwrap().iter().all(|&p| p == 0x1234));
    }

    #[test]
    fn test_test_pattern_bands() {
        let mut panel = controller();
        panel.init(DisplayConfig::default()).unwrap();
        panel.draw_test_pattern().unwrap();

        for y in [0, 239, 479] {
            assert_eq!(panel.pixel(250, y), Some(color::CYAN));
            for (band, &expected) in color::BARS.iter().enumerate() {
                let x0 = band as u16 * 100;
                assert_eq!(panel.pixel(x0, y), Some(expected));
                assert_eq!(panel.pixel(x0 + 99, y), Some(expected));
            }
        }
    }

    #[test]
    fn test_last_band_absorbs_remainder() {
        let mut panel = controller();
        let config = DisplayConfig {
            width: 803,
            ..DisplayConfig::default()
        };
        panel.init(config).unwrap();
        panel.draw_test_pattern().unwrap();

        assert_eq!(panel.pixel(699, 0), Some(color::BLUE));
        assert_eq!(panel.pixel(700, 0), Some(color::BLACK));
        assert_eq!(panel.pixel(802, 0), Some(color::BLACK));
    }

    #[test]
    fn test_operations_before_init_fail() {
        let panel = controller();
        assert_eq!(panel.fill(color::WHITE), Err(HwError::NotReady));
        assert_eq!(panel.draw_test_pattern(), Err(HwError::NotReady));
        assert_eq!(panel.pixel(0, 0), None);
        assert_eq!(panel.state(), PanelState::Uninitialized);
        assert_eq!(
            panel.handle().draw_bitmap(0, 0, 1, 1, &[0]),
            Err(HwError::NotReady)
        );
    }
}
