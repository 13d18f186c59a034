//! Access lock for scene state.
//!
//! One mutex serializes every scene mutation, whether it comes from the
//! render task's redraw pass or from foreground code. Holding a [`UiGuard`]
//! is the only way to reach the [`Scene`]; dropping it releases the lock.

use crate::gfx::Scene;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Shared, cloneable lock around the scene
#[derive(Clone)]
pub struct AccessLock {
    scene: Arc<Mutex<Scene>>,
}

impl AccessLock {
    pub fn new(scene: Scene) -> Self {
        Self {
            scene: Arc::new(Mutex::new(scene)),
        }
    }

    /// Wait up to `timeout` for exclusive access.
    ///
    /// Returns `None` on timeout; the caller must then skip its mutation.
    /// A zero timeout never waits.
    pub async fn acquire(&self, timeout: Duration) -> Option<UiGuard<'_>> {
        if timeout.is_zero() {
            return self.try_acquire();
        }

        match tokio::time::timeout(timeout, self.scene.lock()).await {
            Ok(guard) => Some(UiGuard { guard }),
            Err(_) => {
                tracing::debug!("Scene lock not acquired within {:?}", timeout);
                None
            }
        }
    }

    /// Take the lock only if it is free right now
    pub fn try_acquire(&self) -> Option<UiGuard<'_>> {
        self.scene.try_lock().ok().map(|guard| UiGuard { guard })
    }

    /// Blocking variant for code outside an async context
    #[allow(dead_code)]
    pub fn acquire_blocking(&self) -> UiGuard<'_> {
        UiGuard {
            guard: self.scene.blocking_lock(),
        }
    }
}

/// Exclusive access to the scene; released on drop
pub struct UiGuard<'a> {
    guard: MutexGuard<'a, Scene>,
}

impl Deref for UiGuard<'_> {
    type Target = Scene;

    fn deref(&self) -> &Scene {
        &self.guard
    }
}

impl DerefMut for UiGuard<'_> {
    fn deref_mut(&mut self) -> &mut Scene {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::color;
    use std::time::Instant;

    fn lock() -> AccessLock {
        AccessLock::new(Scene::new(800, 480, color::BLACK))
    }

    #[tokio::test]
    async fn test_acquire_free_lock() {
        let lock = lock();
        let mut ui = lock.acquire(Duration::from_millis(10)).await.unwrap();
        ui.create_rect(0, 0, 1, 1, color::RED);
        drop(ui);

        let ui = lock.acquire(Duration::ZERO).await.unwrap();
        assert_eq!(ui.object_count(), 1);
    }

    #[tokio::test]
    async fn test_zero_timeout_does_not_wait() {
        let lock = lock();
        let _held = lock.acquire(Duration::from_millis(10)).await.unwrap();

        let start = Instant::now();
        assert!(lock.acquire(Duration::ZERO).await.is_none());
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_timeout_while_held_elsewhere() {
        let lock = lock();
        let other = lock.clone();

        let (held_tx, held_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let holder = std::thread::spawn(move || {
            let _guard = other.acquire_blocking();
            held_tx.send(()).unwrap();
            let _ = release_rx.blocking_recv();
        });

        held_rx.await.unwrap();
        let start = Instant::now();
        assert!(lock.acquire(Duration::from_millis(50)).await.is_none());
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(50));
        assert!(waited < Duration::from_secs(2));

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert!(lock.acquire(Duration::from_millis(500)).await.is_some());
    }
}
