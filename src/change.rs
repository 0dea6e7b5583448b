//! Decides whether freshly normalized data warrants a redraw.

use crate::normalize::Normalized;
use crate::widget::ModuleState;

/// False only when the widget already showed devices and the new data is
/// value-equal to what it showed (same records, same order, same away state).
pub fn has_changed(state: &ModuleState, next: &Normalized) -> bool {
    if !state.loaded {
        return true;
    }
    if state.thermostats.is_empty() && state.alarms.is_empty() {
        return true;
    }
    !(state.thermostats == next.thermostats && state.alarms == next.alarms && state.away == next.away)
}
