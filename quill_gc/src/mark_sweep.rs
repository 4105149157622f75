//! Mark-sweep counter
//!
//! The reference strategy. Every settle with pending work traces from all stack-held values
//! and removes whatever the trace did not reach. Cost is linear in tracked values plus edges.

use alloc::{boxed::Box, vec::Vec};

use crate::{
    counter::{ReferenceCounter, Strategy},
    entry::GcColor,
    error::LedgerResult,
    gray_queue::GrayQueue,
    observer::{GcObserver, SettleStats},
    visitor::ItemVisitor,
    Ledger, StackItem,
};

pub struct MarkSweepCounter {
    ledger: Ledger,

    /// Gray queue for the mark phase
    gray_queue: GrayQueue,

    observer: Option<Box<dyn GcObserver>>,
    last_stats: SettleStats,
}

impl MarkSweepCounter {
    pub fn new() -> MarkSweepCounter {
        MarkSweepCounter {
            ledger: Ledger::new(),
            gray_queue: GrayQueue::new(),
            observer: None,
            last_stats: SettleStats::default(),
        }
    }

    /// Mark everything reachable from a stack-held value.
    fn mark(&mut self) {
        let roots: Vec<usize> = self
            .ledger
            .entries()
            .filter(|(_, entry)| entry.is_root())
            .map(|(slot, _)| slot)
            .collect();

        let mut marker = Marker {
            ledger: &mut self.ledger,
            gray_queue: &mut self.gray_queue,
        };
        for slot in roots {
            marker.mark_slot(slot);
        }

        while let Some(slot) = marker.gray_queue.pop() {
            let Some(entry) = marker.ledger.entry_mut(slot) else {
                continue;
            };
            entry.set_color(GcColor::Black);

            if entry.item().has_children() {
                let item = entry.item().clone();
                item.visit_children(&mut marker);
            }
        }
    }

    /// Every tracked slot the mark phase did not reach
    fn unmarked(&self) -> Vec<usize> {
        self.ledger
            .entries()
            .filter(|(_, entry)| !entry.is_marked())
            .map(|(slot, _)| slot)
            .collect()
    }
}

impl Default for MarkSweepCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceCounter for MarkSweepCounter {
    fn strategy(&self) -> Strategy {
        Strategy::MarkSweep
    }

    fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn add_stack_reference(&mut self, item: &StackItem, count: usize) {
        self.ledger.add_stack_reference(item, count);
    }

    fn remove_stack_reference(&mut self, item: &StackItem) -> LedgerResult<()> {
        self.ledger.remove_stack_reference(item)
    }

    fn add_owner_reference(&mut self, item: &StackItem, owner: &StackItem) -> LedgerResult<()> {
        self.ledger.add_owner_reference(item, owner)
    }

    fn remove_owner_reference(
        &mut self,
        item: &StackItem,
        owner: &StackItem,
    ) -> LedgerResult<()> {
        self.ledger.remove_owner_reference(item, owner)
    }

    fn register_initial(&mut self, item: &StackItem) {
        self.ledger.register_initial(item);
    }

    fn settle(&mut self) -> LedgerResult<usize> {
        if !self.ledger.has_pending_work() && !cfg!(feature = "gc_stress_test") {
            self.last_stats = SettleStats {
                retained: self.ledger.tracked_len(),
                total_references: self.ledger.count(),
                ..SettleStats::default()
            };
            return Ok(self.ledger.count());
        }

        self.ledger.begin_pass();
        self.mark();

        let dead = self.unmarked();
        self.ledger.remove_batch(&dead, &mut self.observer)?;

        self.last_stats = SettleStats {
            removed: dead.len(),
            retained: self.ledger.tracked_len(),
            total_references: self.ledger.count(),
            collected: true,
            rebuilt_components: false,
        };
        log::debug!(
            "mark-sweep settle: removed {}, retained {}, references {}",
            self.last_stats.removed,
            self.last_stats.retained,
            self.last_stats.total_references,
        );

        if let Some(observer) = self.observer.as_mut() {
            observer.on_settle(&self.last_stats);
        }

        Ok(self.ledger.count())
    }

    fn last_stats(&self) -> SettleStats {
        self.last_stats
    }

    fn set_observer(&mut self, observer: Option<Box<dyn GcObserver>>) {
        self.observer = observer;
    }
}

// ============================================================================
// Marker - implements ItemVisitor for the mark phase
// ============================================================================

/// Grays every tracked child it is shown.
struct Marker<'a> {
    ledger: &'a mut Ledger,
    gray_queue: &'a mut GrayQueue,
}

impl Marker<'_> {
    #[inline]
    fn mark_slot(&mut self, slot: usize) {
        if let Some(entry) = self.ledger.entry_mut(slot) {
            if entry.color() == GcColor::White {
                entry.set_color(GcColor::Gray);
                self.gray_queue.push(slot);
            }
        }
    }
}

impl ItemVisitor for Marker<'_> {
    fn visit(&mut self, item: &StackItem) {
        if let Some(slot) = self.ledger.slot_of(item) {
            self.mark_slot(slot);
        }
    }
}
