//! Incremental counter
//!
//! Caches the decomposition of the tracked graph into strongly connected components, so a
//! settle after pure stack churn only rescans component liveness instead of re-deriving the
//! graph structure.
//!
//! The decomposition runs over edges from each value to its owners. Tarjan's algorithm emits a
//! component only after every component reachable from it, so walking the cache front to back
//! resolves every owner component before any component it owns. That ordering is what lets a
//! single pass decide liveness exactly:
//!
//! - A component is live if a member is stack-held, or a member has an owner edge from a
//!   component already proven live
//! - Owners in the same component are never black yet when the component is examined, so a
//!   cycle cannot keep itself alive
//!
//! The cache is dropped by any owner edge change and rebuilt on the next settle with pending
//! work. Values that start being tracked while the cache is valid have no owner edges yet, so
//! they are appended as singleton components.

use alloc::{boxed::Box, vec, vec::Vec};

use crate::{
    counter::{ReferenceCounter, Strategy},
    entry::GcColor,
    error::LedgerResult,
    observer::{GcObserver, SettleStats},
    scc::{strongly_connected_components, Component},
    Ledger, StackItem,
};

pub struct IncrementalCounter {
    ledger: Ledger,

    /// Components in resolution order, `None` after an owner edge changed
    components: Option<Vec<Component>>,

    observer: Option<Box<dyn GcObserver>>,
    last_stats: SettleStats,
}

impl IncrementalCounter {
    pub fn new() -> IncrementalCounter {
        IncrementalCounter {
            ledger: Ledger::new(),
            components: None,
            observer: None,
            last_stats: SettleStats::default(),
        }
    }

    /// Whether a decomposition is cached
    pub fn has_cached_components(&self) -> bool {
        self.components.is_some()
    }

    fn push_singleton(&mut self, slot: Option<usize>) {
        if let (Some(components), Some(slot)) = (self.components.as_mut(), slot) {
            components.push(vec![slot]);
        }
    }

    fn is_live(&self, component: &[usize]) -> bool {
        component.iter().any(|&slot| {
            self.ledger.entry(slot).is_some_and(|entry| {
                entry.is_root()
                    || entry.owners.keys().any(|&owner| {
                        self.ledger
                            .entry(owner)
                            .is_some_and(|owner| owner.color() == GcColor::Black)
                    })
            })
        })
    }

    /// Resolve every component in order. Returns the number of values removed.
    fn sweep_components(&mut self, components: Vec<Component>) -> LedgerResult<usize> {
        let mut kept = Vec::with_capacity(components.len());
        let mut removed = 0;

        for component in components {
            if self.is_live(&component) {
                for &slot in &component {
                    if let Some(entry) = self.ledger.entry_mut(slot) {
                        entry.set_color(GcColor::Black);
                    }
                }
                kept.push(component);
            } else {
                self.ledger.remove_batch(&component, &mut self.observer)?;
                removed += component.len();
            }
        }

        self.components = Some(kept);
        Ok(removed)
    }
}

impl Default for IncrementalCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceCounter for IncrementalCounter {
    fn strategy(&self) -> Strategy {
        Strategy::Incremental
    }

    fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn add_stack_reference(&mut self, item: &StackItem, count: usize) {
        let inserted = self.ledger.add_stack_reference(item, count);
        self.push_singleton(inserted);
    }

    fn remove_stack_reference(&mut self, item: &StackItem) -> LedgerResult<()> {
        self.ledger.remove_stack_reference(item)
    }

    fn add_owner_reference(&mut self, item: &StackItem, owner: &StackItem) -> LedgerResult<()> {
        self.ledger.add_owner_reference(item, owner)?;
        self.components = None;
        Ok(())
    }

    fn remove_owner_reference(
        &mut self,
        item: &StackItem,
        owner: &StackItem,
    ) -> LedgerResult<()> {
        self.ledger.remove_owner_reference(item, owner)?;
        self.components = None;
        Ok(())
    }

    fn register_initial(&mut self, item: &StackItem) {
        let inserted = self.ledger.register_initial(item);
        self.push_singleton(inserted);
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

        let rebuilt_components = self.components.is_none();
        let components = match self.components.take() {
            Some(components) => components,
            None => {
                let components = strongly_connected_components(&self.ledger);
                log::trace!(
                    "rebuilt {} components over {} tracked values",
                    components.len(),
                    self.ledger.tracked_len(),
                );
                components
            }
        };

        let removed = self.sweep_components(components)?;

        self.last_stats = SettleStats {
            removed,
            retained: self.ledger.tracked_len(),
            total_references: self.ledger.count(),
            collected: true,
            rebuilt_components,
        };
        log::debug!(
            "incremental settle: removed {}, retained {}, references {}",
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
