//! Per-plate mutual exclusion.
//!
//! Every operation that reads a vehicle's trips and then writes based on what
//! it saw runs inside [`PlateLocks::with_plate`]. Operations on different
//! plates never contend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::model::Plate;

/// Lazily created lock per plate. Entries are dropped again once nobody
/// holds or waits on them.
#[derive(Debug, Default)]
pub struct PlateLocks {
    locks: Mutex<HashMap<Plate, Arc<Mutex<()>>>>,
}

impl PlateLocks {
    /// Create an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, plate: &Plate) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(plate.clone()).or_default())
    }

    /// Drop the map entry for `plate` unless another caller holds or waits on
    /// it. `lock` is the caller's own handle.
    fn release(&self, plate: &Plate, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        // One reference in the map, one in `lock`.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(plate);
        }
    }

    /// Whether no plate has a live lock entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }

    /// Run `f` while holding the lock for `plate`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PlateBusy`] if the lock is not acquired within
    /// `timeout`, otherwise whatever `f` returns.
    pub fn with_plate<T>(
        &self,
        plate: &Plate,
        timeout: Duration,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let lock = self.handle(plate);
        let result = match lock.try_lock_for(timeout) {
            Some(_guard) => {
                trace!(%plate, "Acquired plate lock");
                f()
            }
            None => {
                warn!(%plate, timeout_ms = timeout.as_millis(), "Timed out waiting for plate lock");
                Err(Error::PlateBusy {
                    plate: plate.to_string(),
                })
            }
        };
        self.release(plate, lock);
        result
    }
}
