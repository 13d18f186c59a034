//! 800x480 parallel RGB panel timing generator.
//!
//! Pixel format: RGB565 over a 16-bit data bus
//! Timing: 16 MHz pixel clock, HSYNC 48/40/40, VSYNC 3/13/13
//! (pulse width / back porch / front porch)
//!
//! The peripheral is reached through [`TimingGenerator`]. On hosted targets
//! [`SimulatedRgbPanel`] stands in for the LCD controller: it enforces the
//! same configuration limits and owns the scanned-out frame buffer in memory.

use super::memory::{PixelBuf, Placement};
use embedded_graphics::prelude::{Point, Size};
use embedded_graphics::primitives::Rectangle;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Display dimensions
pub const WIDTH: u16 = 800;
pub const HEIGHT: u16 = 480;

/// Highest pixel clock the RGB peripheral can generate
pub const MAX_PCLK_HZ: u32 = 40_000_000;

/// RGB565 pixel
pub type Pixel = u16;

/// RGB565 colors and their bus encoding
pub mod color {
    use super::Pixel;
    use embedded_graphics::pixelcolor::raw::RawU16;
    use embedded_graphics::pixelcolor::{IntoStorage, Rgb565, Rgb888, RgbColor};

    pub const BLACK: Rgb565 = Rgb565::BLACK;
    pub const WHITE: Rgb565 = Rgb565::WHITE;
    pub const RED: Rgb565 = Rgb565::RED;
    pub const GREEN: Rgb565 = Rgb565::GREEN;
    pub const BLUE: Rgb565 = Rgb565::BLUE;
    pub const YELLOW: Rgb565 = Rgb565::YELLOW;
    pub const CYAN: Rgb565 = Rgb565::CYAN;
    pub const MAGENTA: Rgb565 = Rgb565::MAGENTA;

    /// Color bar order, left to right
    pub const BARS: [Rgb565; 8] = [WHITE, YELLOW, CYAN, GREEN, MAGENTA, RED, BLUE, BLACK];

    /// Bus word for a color
    #[inline]
    pub fn raw(color: Rgb565) -> Pixel {
        color.into_storage()
    }

    #[inline]
    pub fn from_raw(pixel: Pixel) -> Rgb565 {
        Rgb565::from(RawU16::new(pixel))
    }

    /// Expand a bus word to 8 bits per channel
    pub fn to_rgb888(pixel: Pixel) -> Rgb888 {
        Rgb888::from(from_raw(pixel))
    }
}

/// Display hardware errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HwError {
    #[error("Timing generator rejected configuration: {0}")]
    PeripheralInit(String),

    #[error("Out of {placement} memory ({requested} bytes requested)")]
    NoMemory { placement: Placement, requested: usize },

    #[error("Display not initialized")]
    NotReady,

    #[error("Failed to start render task: {0}")]
    TaskStart(String),

    #[error("Invalid draw region ({x_start},{y_start})..({x_end},{y_end})")]
    InvalidRegion {
        x_start: u16,
        y_start: u16,
        x_end: u16,
        y_end: u16,
    },
}

/// Bus pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Rgb565,
}

impl PixelFormat {
    pub const fn bits_per_pixel(&self) -> u8 {
        match self {
            PixelFormat::Rgb565 => 16,
        }
    }
}

/// Panel timing and frame buffer placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u16,
    pub height: u16,
    pub pixel_format: PixelFormat,
    pub pclk_hz: u32,
    pub hsync_pulse_width: u16,
    pub hsync_back_porch: u16,
    pub hsync_front_porch: u16,
    pub vsync_pulse_width: u16,
    pub vsync_back_porch: u16,
    pub vsync_front_porch: u16,
    /// Latch data on the falling pixel clock edge
    pub pclk_active_neg: bool,
    /// Keep the pixel clock high while idle
    pub pclk_idle_high: bool,
    /// Where the frame buffer is placed
    pub placement: Placement,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: WIDTH,
            height: HEIGHT,
            pixel_format: PixelFormat::Rgb565,
            pclk_hz: 16_000_000,
            hsync_pulse_width: 48,
            hsync_back_porch: 40,
            hsync_front_porch: 40,
            vsync_pulse_width: 3,
            vsync_back_porch: 13,
            vsync_front_porch: 13,
            pclk_active_neg: false,
            pclk_idle_high: false,
            placement: Placement::External,
        }
    }
}

impl DisplayConfig {
    /// Whole visible area
    pub fn screen(&self) -> Rectangle {
        Rectangle::new(
            Point::zero(),
            Size::new(u32::from(self.width), u32::from(self.height)),
        )
    }

    /// Number of addressable pixels
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Pixel clocks per scan line, including blanking
    pub fn h_total(&self) -> u32 {
        self.width as u32
            + self.hsync_pulse_width as u32
            + self.hsync_back_porch as u32
            + self.hsync_front_porch as u32
    }

    /// Scan lines per frame, including blanking
    pub fn v_total(&self) -> u32 {
        self.height as u32
            + self.vsync_pulse_width as u32
            + self.vsync_back_porch as u32
            + self.vsync_front_porch as u32
    }

    /// Resulting refresh rate in Hz
    pub fn refresh_rate_hz(&self) -> f32 {
        self.pclk_hz as f32 / (self.h_total() * self.v_total()) as f32
    }
}

/// Checks a configuration against the peripheral's limits
pub fn check_timing(config: &DisplayConfig) -> Result<(), String> {
    if config.width == 0 || config.height == 0 {
        return Err(format!(
            "resolution {}x{} is empty",
            config.width, config.height
        ));
    }
    if config.pclk_hz == 0 || config.pclk_hz > MAX_PCLK_HZ {
        return Err(format!(
            "pixel clock {} Hz outside 1..={} Hz",
            config.pclk_hz, MAX_PCLK_HZ
        ));
    }
    if config.hsync_pulse_width == 0 || config.vsync_pulse_width == 0 {
        return Err("sync pulse width must be non-zero".to_string());
    }
    Ok(())
}

/// Timing generator peripheral.
///
/// End coordinates passed to [`draw_bitmap`](TimingGenerator::draw_bitmap)
/// are exclusive.
pub trait TimingGenerator: Send {
    /// Program timing and bind the frame buffer that will be scanned out
    fn configure(&mut self, config: &DisplayConfig, frame_buffer: PixelBuf)
    -> Result<(), HwError>;

    /// Release the bound frame buffer, undoing `configure`
    fn unbind(&mut self) -> Option<PixelBuf>;

    /// Reset the panel controller
    fn reset(&mut self) -> Result<(), HwError>;

    /// Start continuous scan-out
    fn start(&mut self) -> Result<(), HwError>;

    /// Copy a `(x_end - x_start) x (y_end - y_start)` block into the frame buffer
    fn draw_bitmap(
        &mut self,
        x_start: u16,
        y_start: u16,
        x_end: u16,
        y_end: u16,
        data: &[Pixel],
    ) -> Result<(), HwError>;

    fn frame_buffer(&self) -> Option<&[Pixel]>;

    fn frame_buffer_mut(&mut self) -> Option<&mut [Pixel]>;
}

/// In-memory RGB timing generator
#[derive(Debug, Default)]
pub struct SimulatedRgbPanel {
    width: u16,
    height: u16,
    frame_buffer: Option<PixelBuf>,
    scanning: bool,
    draw_calls: u64,
}

impl SimulatedRgbPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether scan-out is running
    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Number of successful `draw_bitmap` calls
    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }
}

impl TimingGenerator for SimulatedRgbPanel {
    fn configure(
        &mut self,
        config: &DisplayConfig,
        frame_buffer: PixelBuf,
    ) -> Result<(), HwError> {
        check_timing(config).map_err(HwError::PeripheralInit)?;

        if frame_buffer.len() != config.pixel_count() {
            return Err(HwError::PeripheralInit(format!(
                "frame buffer holds {} pixels, panel needs {}",
                frame_buffer.len(),
                config.pixel_count()
            )));
        }

        tracing::debug!(
            "RGB timing: pclk={}Hz h={}+{}/{}/{} v={}+{}/{}/{} {}bpp",
            config.pclk_hz,
            config.width,
            config.hsync_pulse_width,
            config.hsync_back_porch,
            config.hsync_front_porch,
            config.height,
            config.vsync_pulse_width,
            config.vsync_back_porch,
            config.vsync_front_porch,
            config.pixel_format.bits_per_pixel()
        );

        self.width = config.width;
        self.height = config.height;
        self.frame_buffer = Some(frame_buffer);
        Ok(())
    }

    fn unbind(&mut self) -> Option<PixelBuf> {
        self.scanning = false;
        self.frame_buffer.take()
    }

    fn reset(&mut self) -> Result<(), HwError> {
        let fb = self.frame_buffer.as_mut().ok_or(HwError::NotReady)?;
        fb.fill(color::raw(color::BLACK));
        self.scanning = false;
        Ok(())
    }

    fn start(&mut self) -> Result<(), HwError> {
        if self.frame_buffer.is_none() {
            return Err(HwError::NotReady);
        }
        self.scanning = true;
        Ok(())
    }

    fn draw_bitmap(
        &mut self,
        x_start: u16,
        y_start: u16,
        x_end: u16,
        y_end: u16,
        data: &[Pixel],
    ) -> Result<(), HwError> {
        let stride = self.width as usize;
        let fb = self.frame_buffer.as_mut().ok_or(HwError::NotReady)?;

        let invalid = HwError::InvalidRegion {
            x_start,
            y_start,
            x_end,
            y_end,
        };
        if x_start >= x_end || y_start >= y_end || x_end > self.width || y_end > self.height {
            return Err(invalid);
        }

        let w = (x_end - x_start) as usize;
        let h = (y_end - y_start) as usize;
        if data.len() < w * h {
            return Err(invalid);
        }

        for (row, src) in data.chunks_exact(w).take(h).enumerate() {
            let start = (y_start as usize + row) * stride + x_start as usize;
            fb[start..start + w].copy_from_slice(src);
        }

        self.draw_calls += 1;
        Ok(())
    }

    fn frame_buffer(&self) -> Option<&[Pixel]> {
        self.frame_buffer.as_deref()
    }

    fn frame_buffer_mut(&mut self) -> Option<&mut [Pixel]> {
        self.frame_buffer.as_deref_mut()
    }
}
