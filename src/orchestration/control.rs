//! # Processing Control
//!
//! Pause flag and throttle delay shared by every pipeline task. Tasks call
//! [`ProcessingControl::checkpoint`] once per unit of work.
//!
//! ```rust
//! use batch_ops_core::orchestration::ProcessingControl;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let control = ProcessingControl::new(Duration::ZERO);
//! control.checkpoint().await;
//!
//! assert!(control.pause());
//! assert!(control.is_paused());
//! assert!(control.resume());
//! # });
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug)]
pub struct ProcessingControl {
    paused: watch::Sender<bool>,
    throttle_delay_ms: AtomicU64,
}

impl Default for ProcessingControl {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl ProcessingControl {
    pub fn new(throttle_delay: Duration) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused,
            throttle_delay_ms: AtomicU64::new(throttle_delay.as_millis() as u64),
        }
    }

    /// Returns false when already paused
    pub fn pause(&self) -> bool {
        let changed = self.set_paused(true);
        if changed {
            info!("Batch processing paused");
        }
        changed
    }

    /// Returns false when not paused
    pub fn resume(&self) -> bool {
        let changed = self.set_paused(false);
        if changed {
            info!("Batch processing resumed");
        }
        changed
    }

    fn set_paused(&self, value: bool) -> bool {
        self.paused.send_if_modified(|paused| {
            if *paused == value {
                false
            } else {
                *paused = value;
                true
            }
        })
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn set_throttle_delay(&self, delay: Duration) {
        self.throttle_delay_ms
            .store(delay.as_millis() as u64, Ordering::Release);
        info!(throttle_delay_ms = delay.as_millis() as u64, "Batch throttle delay updated");
    }

    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_delay_ms.load(Ordering::Acquire))
    }

    /// Wait while paused, then apply the throttle delay if one is set. A
    /// pause raised during the delay holds the task before it continues.
    pub async fn checkpoint(&self) {
        let mut paused = self.paused.subscribe();
        wait_while_paused(&mut paused).await;

        let delay = self.throttle_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
            wait_while_paused(&mut paused).await;
        }
    }
}

async fn wait_while_paused(paused: &mut watch::Receiver<bool>) {
    let is_paused = *paused.borrow_and_update();
    if is_paused {
        debug!("Waiting for batch processing to resume");
        // The sender outlives every receiver handed out, so this only returns once resumed
        let _ = paused.wait_for(|paused| !*paused).await;
    }
}
