//! Pixel memory regions.
//!
//! The board has a small internal SRAM and a large external PSRAM. Frame and
//! draw buffers are placed in one of them according to configuration, and
//! each region has a fixed byte budget so that placement failures surface as
//! [`HwError::NoMemory`] instead of an abort.

use super::{HwError, Pixel};
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default internal SRAM budget (512 KiB)
pub const DEFAULT_INTERNAL_BYTES: usize = 512 * 1024;

/// Default external PSRAM budget (8 MiB)
pub const DEFAULT_EXTERNAL_BYTES: usize = 8 * 1024 * 1024;

/// Memory region a buffer is placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Internal,
    External,
}

impl std::fmt::Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Placement::Internal => write!(f, "internal"),
            Placement::External => write!(f, "external"),
        }
    }
}

#[derive(Debug)]
struct Region {
    capacity: usize,
    used: AtomicUsize,
}

impl Region {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: AtomicUsize::new(0),
        }
    }

    fn reserve(&self, bytes: usize) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|&total| total <= self.capacity)
            })
            .is_ok()
    }

    fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Shared handle to the internal and external memory regions
#[derive(Debug, Clone)]
pub struct MemoryPools {
    internal: Arc<Region>,
    external: Arc<Region>,
}

impl MemoryPools {
    /// Create pools with the given byte budgets
    pub fn new(internal_bytes: usize, external_bytes: usize) -> Self {
        Self {
            internal: Arc::new(Region::new(internal_bytes)),
            external: Arc::new(Region::new(external_bytes)),
        }
    }

    fn region(&self, placement: Placement) -> &Arc<Region> {
        match placement {
            Placement::Internal => &self.internal,
            Placement::External => &self.external,
        }
    }

    /// Bytes currently leased from a region
    pub fn used(&self, placement: Placement) -> usize {
        self.region(placement).used.load(Ordering::Acquire)
    }

    /// Total budget of a region
    #[allow(dead_code)]
    pub fn capacity(&self, placement: Placement) -> usize {
        self.region(placement).capacity
    }

    /// Allocate a zeroed pixel buffer of `len` pixels in `placement`
    pub fn alloc_pixels(&self, placement: Placement, len: usize) -> Result<PixelBuf, HwError> {
        let bytes = len
            .checked_mul(std::mem::size_of::<Pixel>())
            .ok_or(HwError::NoMemory {
                placement,
                requested: usize::MAX,
            })?;

        let region = self.region(placement);
        if !region.reserve(bytes) {
            tracing::debug!(
                "{} memory exhausted: requested {} bytes, {} of {} in use",
                placement,
                bytes,
                region.used.load(Ordering::Acquire),
                region.capacity
            );
            return Err(HwError::NoMemory {
                placement,
                requested: bytes,
            });
        }

        let mut pixels = Vec::new();
        if pixels.try_reserve_exact(len).is_err() {
            region.release(bytes);
            return Err(HwError::NoMemory {
                placement,
                requested: bytes,
            });
        }
        pixels.resize(len, 0);

        Ok(PixelBuf {
            pixels,
            lease: Lease {
                region: Arc::clone(region),
                bytes,
            },
        })
    }
}

impl Default for MemoryPools {
    fn default() -> Self {
        Self::new(DEFAULT_INTERNAL_BYTES, DEFAULT_EXTERNAL_BYTES)
    }
}

#[derive(Debug)]
struct Lease {
    region: Arc<Region>,
    bytes: usize,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.region.release(self.bytes);
    }
}

/// Pixel storage leased from a [`MemoryPools`] region, returned on drop
#[derive(Debug)]
pub struct PixelBuf {
    pixels: Vec<Pixel>,
    lease: Lease,
}

impl PixelBuf {
    /// Size of the lease in bytes
    pub fn bytes(&self) -> usize {
        self.lease.bytes
    }
}

impl Deref for PixelBuf {
    type Target = [Pixel];

    fn deref(&self) -> &[Pixel] {
        &self.pixels
    }
}

impl DerefMut for PixelBuf {
    fn deref_mut(&mut self) -> &mut [Pixel] {
        &mut self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_release() {
        let pools = MemoryPools::new(1024, 4096);
        let buf = pools.alloc_pixels(Placement::External, 1000).unwrap();
        assert_eq!(buf.len(), 1000);
        assert!(buf.iter().all(|&p| p == 0));
        assert_eq!(pools.used(Placement::External), 2000);
        assert_eq!(pools.used(Placement::Internal), 0);

        drop(buf);
        assert_eq!(pools.used(Placement::External), 0);
    }

    #[test]
    fn test_exhaustion_leaves_usage_unchanged() {
        let pools = MemoryPools::new(1024, 4096);
        let _held = pools.alloc_pixels(Placement::Internal, 400).unwrap();

        let err = pools.alloc_pixels(Placement::Internal, 200).unwrap_err();
        assert!(matches!(
            err,
            HwError::NoMemory {
                placement: Placement::Internal,
                requested: 400
            }
        ));
        assert_eq!(pools.used(Placement::Internal), 800);
    }

    #[test]
    fn test_default_frame_buffer_only_fits_externally() {
        let pools = MemoryPools::default();
        let len = 800 * 480;
        assert!(pools.alloc_pixels(Placement::Internal, len).is_err());
        assert!(pools.alloc_pixels(Placement::External, len).is_ok());
    }
}
