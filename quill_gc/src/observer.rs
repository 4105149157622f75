//! Collection observer
//!
//! Optional instrumentation hook. Observers see what a pass removed but cannot influence it.

use crate::StackItem;

/// Summary of one settle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SettleStats {
    /// Values removed by this settle
    pub removed: usize,
    /// Values still tracked afterwards
    pub retained: usize,
    /// Total reference count afterwards
    pub total_references: usize,
    /// Whether a collection pass ran at all
    pub collected: bool,
    /// Whether the component decomposition had to be rebuilt (incremental strategy only)
    pub rebuilt_components: bool,
}

/// Receives collection events from a counter.
pub trait GcObserver {
    /// Called once for every collected value, before its release hook runs.
    fn on_collect(&mut self, item: &StackItem) {
        let _ = item;
    }

    /// Called at the end of every settle that ran a pass.
    fn on_settle(&mut self, stats: &SettleStats) {
        let _ = stats;
    }
}
