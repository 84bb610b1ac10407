//! Operator alarm types.

use std::sync::Arc;

/// An operator-facing alarm, raised when a resync pass cannot complete.
///
/// Alarms are level-triggered: raising an already raised alarm, or clearing
/// a clear one, has no observable effect.
pub trait Alarm: 'static + Send + Sync + std::fmt::Debug {
    /// Raise the alarm.
    fn raise(&self);

    /// Clear the alarm.
    fn clear(&self);

    /// Is the alarm currently raised?
    fn is_raised(&self) -> bool;
}

/// Trait-object [Alarm].
pub type DynAlarm = Arc<dyn Alarm>;
