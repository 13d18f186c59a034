//! Display module for RGB panel control.
//!
//! This module owns the 800x480 parallel RGB panel: its timing generator,
//! the frame buffer placed in external memory, and the CH422G expander that
//! switches the backlight.

pub mod expander;
pub mod memory;
pub mod panel;
pub mod rgb_panel;
pub mod snapshot;
pub mod target;

// Re-export main types
pub use memory::{MemoryPools, PixelBuf, Placement};
pub use panel::{PanelController, PanelHandle, PanelState};
pub use target::BufferTarget;
pub use rgb_panel::{
    DisplayConfig, HEIGHT, HwError, Pixel, SimulatedRgbPanel, TimingGenerator, WIDTH, color,
};
