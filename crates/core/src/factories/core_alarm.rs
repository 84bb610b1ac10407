//! A level-triggered alarm that reports through tracing.

use resync_api::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The production [Alarm]: raised while some owned bucket cannot be
/// resynced. Only state changes are logged, so repeated raises while the
/// alarm is already raised are silent.
#[derive(Debug)]
pub struct CoreAlarm {
    name: Arc<str>,
    raised: AtomicBool,
}

impl CoreAlarm {
    /// Construct a new cleared alarm.
    pub fn create(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            raised: AtomicBool::new(false),
        })
    }
}

impl Alarm for CoreAlarm {
    fn raise(&self) {
        if !self.raised.swap(true, Ordering::AcqRel) {
            tracing::error!(alarm = %self.name, "alarm raised");
        }
    }

    fn clear(&self) {
        if self.raised.swap(false, Ordering::AcqRel) {
            tracing::info!(alarm = %self.name, "alarm cleared");
        }
    }

    fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}
