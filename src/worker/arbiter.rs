//! Exclusive access to the physical display.
//!
//! Only one worker may have a panel handle open at a time. A worker binds the
//! display when it starts; binding cancels whichever other worker holds it
//! and waits until that worker has dropped its handle.

use super::{CurrentImage, RenderedImage, WorkerKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

struct Holder {
    owner: WorkerKind,
    generation: u64,
    cancel: CancellationToken,
    current_image: CurrentImage,
}

/// Grants the display to one worker at a time
pub struct DisplayArbiter {
    bus: Arc<tokio::sync::Mutex<()>>,
    // Last worker granted the display, kept after release so its frame stays readable
    holder: Mutex<Option<Holder>>,
    generation: AtomicU64,
}

/// Proof of exclusive display access, released on drop
pub struct DisplayLease {
    owner: WorkerKind,
    generation: u64,
    _guard: OwnedMutexGuard<()>,
}

#[allow(dead_code)]
impl DisplayLease {
    pub fn owner(&self) -> WorkerKind {
        self.owner
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for DisplayLease {
    fn drop(&mut self) {
        tracing::debug!("{} released the display (lease {})", self.owner, self.generation);
    }
}

impl DisplayArbiter {
    pub fn new() -> Self {
        Self {
            bus: Arc::new(tokio::sync::Mutex::new(())),
            holder: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Wait for exclusive access, preempting any other worker
    ///
    /// `cancel` is the caller's stop signal, it is triggered if another
    /// worker binds the display later on.
    pub async fn bind(
        &self,
        owner: WorkerKind,
        cancel: CancellationToken,
        current_image: CurrentImage,
    ) -> DisplayLease {
        if let Some(holder) = self.holder.lock().as_ref() {
            if holder.owner != owner && !holder.cancel.is_cancelled() {
                tracing::info!("{} takes over the display from {}", owner, holder.owner);
                holder.cancel.cancel();
            }
        }

        let guard = self.bus.clone().lock_owned().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        *self.holder.lock() = Some(Holder {
            owner,
            generation,
            cancel,
            current_image,
        });

        tracing::debug!("{} bound the display (lease {})", owner, generation);
        DisplayLease {
            owner,
            generation,
            _guard: guard,
        }
    }

    /// Worker that most recently bound the display
    #[allow(dead_code)]
    pub fn active_worker(&self) -> Option<WorkerKind> {
        self.holder.lock().as_ref().map(|h| h.owner)
    }

    /// Latest frame rendered by the most recently bound worker
    pub fn current_image(&self) -> Option<RenderedImage> {
        let slot = self.holder.lock().as_ref().map(|h| h.current_image.clone())?;
        let image = slot.lock().clone();
        image
    }
}

impl Default for DisplayArbiter {
    fn default() -> Self {
        Self::new()
    }
}
