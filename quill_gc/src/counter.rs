//! The counting contract and counter construction
//!
//! Both strategies implement `ReferenceCounter` and must be indistinguishable through it: the
//! same operation sequence removes the same values and reports the same count at every settle.
//!
//! Counters hold `Rc` handles and are therefore neither `Send` nor `Sync`. Each VM execution
//! owns its own counter.

use alloc::boxed::Box;

use crate::{
    error::LedgerResult,
    incremental::IncrementalCounter,
    limits::ExecutionLimits,
    mark_sweep::MarkSweepCounter,
    observer::{GcObserver, SettleStats},
    Ledger, StackItem,
};

/// Interface the interpreter drives.
pub trait ReferenceCounter {
    /// Which collection strategy this counter uses
    fn strategy(&self) -> Strategy;

    /// Read-only view of the bookkeeping
    fn ledger(&self) -> &Ledger;

    /// Total reference count
    #[inline]
    fn count(&self) -> usize {
        self.ledger().count()
    }

    /// A value was pushed onto a stack or stored into a slot `count` times.
    fn add_stack_reference(&mut self, item: &StackItem, count: usize);

    /// A value was popped or dropped from a stack or slot.
    fn remove_stack_reference(&mut self, item: &StackItem) -> LedgerResult<()>;

    /// `owner` gained `item` as a child.
    fn add_owner_reference(&mut self, item: &StackItem, owner: &StackItem) -> LedgerResult<()>;

    /// `owner` lost one `item` child.
    fn remove_owner_reference(&mut self, item: &StackItem, owner: &StackItem)
        -> LedgerResult<()>;

    /// A trackable value was created with no links yet.
    fn register_initial(&mut self, item: &StackItem);

    /// Collect everything that became unreachable since the previous settle and return the
    /// total reference count.
    fn settle(&mut self) -> LedgerResult<usize>;

    /// Summary of the most recent settle
    fn last_stats(&self) -> SettleStats;

    /// Install or remove the collection observer.
    fn set_observer(&mut self, observer: Option<Box<dyn GcObserver>>);
}

/// Collection strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Full reachability trace on every settle with pending work
    #[default]
    MarkSweep,
    /// Cached strongly-connected-component decomposition, rebuilt only after edge changes
    Incremental,
}

impl Strategy {
    pub const ALL: [Strategy; 2] = [Strategy::MarkSweep, Strategy::Incremental];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::MarkSweep => "mark-sweep",
            Strategy::Incremental => "incremental",
        }
    }

    pub fn from_name(name: &str) -> Option<Strategy> {
        Strategy::ALL.into_iter().find(|strategy| strategy.name() == name)
    }
}

/// Options used to construct a counter.
#[derive(Clone, Copy, Debug, Default)]
pub struct CounterOptions {
    /// Collection strategy
    pub strategy: Strategy,

    /// Ceilings the interpreter checks after each settle
    pub limits: ExecutionLimits,
}

impl CounterOptions {
    /// Create a counter for one VM execution.
    pub fn build_counter(&self) -> Box<dyn ReferenceCounter> {
        match self.strategy {
            Strategy::MarkSweep => Box::new(MarkSweepCounter::new()),
            Strategy::Incremental => Box::new(IncrementalCounter::new()),
        }
    }
}

pub struct CounterOptionsBuilder(CounterOptions);

impl CounterOptionsBuilder {
    /// Create new options with default values.
    pub fn new() -> Self {
        Self(CounterOptions::default())
    }

    /// Return the options that have been built, consuming the builder.
    pub fn build(self) -> CounterOptions {
        self.0
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.0.strategy = strategy;
        self
    }

    pub fn limits(mut self, limits: ExecutionLimits) -> Self {
        self.0.limits = limits;
        self
    }

    pub fn max_references(mut self, max_references: usize) -> Self {
        self.0.limits.max_references = max_references;
        self
    }

    pub fn max_tracked_items(mut self, max_tracked_items: usize) -> Self {
        self.0.limits.max_tracked_items = max_tracked_items;
        self
    }
}

impl Default for CounterOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_names_round_trip() {
        for strategy in Strategy::ALL {
            assert_eq!(Strategy::from_name(strategy.name()), Some(strategy));
        }
        assert_eq!(Strategy::from_name("reference-counting"), None);
    }

    #[test]
    fn test_builder_selects_strategy() {
        let options = CounterOptionsBuilder::new()
            .strategy(Strategy::Incremental)
            .max_references(16)
            .build();

        assert_eq!(options.limits.max_references, 16);
        assert_eq!(options.build_counter().strategy(), Strategy::Incremental);
        assert_eq!(CounterOptions::default().build_counter().strategy(), Strategy::MarkSweep);
    }
}
