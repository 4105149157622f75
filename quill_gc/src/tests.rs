//! Counter Tests
//!
//! Scenarios that could leak values, free live values or corrupt the reference count. Every
//! scenario runs against both strategies.

use alloc::{boxed::Box, rc::Rc, vec::Vec};
use core::cell::RefCell;

use crate::{
    Buffer, BufferPool, Container, GcObserver, IncrementalCounter, ItemId, LedgerError,
    MarkSweepCounter, ReferenceCounter, SettleStats, StackItem, Strategy,
};

/// Records every collected value
#[derive(Clone, Default)]
struct Recorder {
    collected: Rc<RefCell<Vec<ItemId>>>,
    settles: Rc<RefCell<Vec<SettleStats>>>,
}

impl GcObserver for Recorder {
    fn on_collect(&mut self, item: &StackItem) {
        self.collected.borrow_mut().extend(item.id());
    }

    fn on_settle(&mut self, stats: &SettleStats) {
        self.settles.borrow_mut().push(*stats);
    }
}

impl Recorder {
    fn was_collected(&self, item: &StackItem) -> bool {
        item.id().is_some_and(|id| self.collected.borrow().contains(&id))
    }
}

/// Minimal interpreter surface: pairs every container mutation with its ledger call
struct TestVm {
    counter: Box<dyn ReferenceCounter>,
    recorder: Recorder,
}

impl TestVm {
    fn new(strategy: Strategy) -> TestVm {
        let mut counter: Box<dyn ReferenceCounter> = match strategy {
            Strategy::MarkSweep => Box::new(MarkSweepCounter::new()),
            Strategy::Incremental => Box::new(IncrementalCounter::new()),
        };
        let recorder = Recorder::default();
        counter.set_observer(Some(Box::new(recorder.clone())));
        TestVm { counter, recorder }
    }

    fn new_array(&mut self) -> StackItem {
        let item: StackItem = Container::new_array().into();
        self.counter.register_initial(&item);
        item
    }

    fn push(&mut self, item: &StackItem) {
        self.counter.add_stack_reference(item, 1);
    }

    fn pop(&mut self, item: &StackItem) {
        self.counter.remove_stack_reference(item).unwrap();
    }

    fn append(&mut self, owner: &StackItem, child: &StackItem) {
        assert!(owner.as_container().unwrap().push(child.clone()));
        self.counter.add_owner_reference(child, owner).unwrap();
    }

    fn remove_at(&mut self, owner: &StackItem, index: usize) {
        let child = owner.as_container().unwrap().remove(index).unwrap();
        self.counter.remove_owner_reference(&child, owner).unwrap();
    }

    fn settle(&mut self) -> usize {
        self.counter.settle().unwrap()
    }

    fn tracked(&self) -> usize {
        self.counter.ledger().tracked_len()
    }
}

fn for_each_strategy(test: impl Fn(&mut TestVm)) {
    for strategy in Strategy::ALL {
        test(&mut TestVm::new(strategy));
    }
}

// ============================================================================
// Basic tracking
// ============================================================================

#[test]
fn test_unreferenced_value_collected() {
    for_each_strategy(|vm| {
        let a = vm.new_array();
        assert_eq!(vm.tracked(), 1);

        assert_eq!(vm.settle(), 0);
        assert_eq!(vm.tracked(), 0);
        assert!(vm.recorder.was_collected(&a));
    });
}

#[test]
fn test_stack_held_value_survives() {
    for_each_strategy(|vm| {
        let a = vm.new_array();
        vm.push(&a);

        assert_eq!(vm.settle(), 1);
        assert_eq!(vm.tracked(), 1);

        vm.pop(&a);
        assert_eq!(vm.counter.ledger().pending_len(), 1);
        assert_eq!(vm.settle(), 0);
        assert_eq!(vm.tracked(), 0);
    });
}

#[test]
fn test_scalars_never_tracked() {
    for_each_strategy(|vm| {
        let one = StackItem::Integer(1);
        vm.counter.add_stack_reference(&one, 2);
        assert_eq!(vm.tracked(), 0);

        vm.pop(&one);
        assert_eq!(vm.settle(), 1);
        assert_eq!(vm.counter.last_stats(), SettleStats {
            retained: 0,
            total_references: 1,
            ..SettleStats::default()
        });
    });
}

#[test]
fn test_pop_below_zero_is_rejected() {
    for_each_strategy(|vm| {
        let a = vm.new_array();
        vm.push(&StackItem::Null);

        assert_eq!(
            vm.counter.remove_stack_reference(&a),
            Err(LedgerError::StackReferenceUnderflow(a.id().unwrap()))
        );
        assert_eq!(vm.counter.count(), 1);
    });
}

// ============================================================================
// Reachability through owner edges
// ============================================================================

#[test]
fn test_child_of_stack_held_container_survives() {
    for_each_strategy(|vm| {
        let a = vm.new_array();
        let b = vm.new_array();
        vm.push(&a);
        vm.push(&b);
        vm.append(&b, &a);
        assert_eq!(vm.counter.count(), 3);

        vm.pop(&a);
        assert_eq!(vm.counter.count(), 2);
        assert_eq!(vm.counter.ledger().pending_len(), 1);

        assert_eq!(vm.settle(), 2);
        assert_eq!(vm.tracked(), 2);
        assert!(vm.recorder.collected.borrow().is_empty());
    });
}

#[test]
fn test_detached_chain_collected() {
    for_each_strategy(|vm| {
        // root -> a -> b -> c
        let root = vm.new_array();
        vm.push(&root);
        let a = vm.new_array();
        let b = vm.new_array();
        let c = vm.new_array();
        vm.append(&root, &a);
        vm.append(&a, &b);
        vm.append(&b, &c);
        assert_eq!(vm.settle(), 4);
        assert_eq!(vm.tracked(), 4);

        vm.remove_at(&root, 0);
        assert_eq!(vm.settle(), 1);
        assert_eq!(vm.tracked(), 1);
        for item in [&a, &b, &c] {
            assert!(vm.recorder.was_collected(item));
        }
        assert!(!vm.recorder.was_collected(&root));
    });
}

#[test]
fn test_scalar_children_counted_until_owner_collected() {
    for_each_strategy(|vm| {
        let a = vm.new_array();
        vm.push(&a);
        vm.append(&a, &StackItem::Integer(7));
        vm.append(&a, &StackItem::Boolean(true));
        assert_eq!(vm.settle(), 3);

        vm.pop(&a);
        assert_eq!(vm.settle(), 0);
    });
}

#[test]
fn test_duplicate_children_keep_multiplicity() {
    for_each_strategy(|vm| {
        let owner = vm.new_array();
        let child = vm.new_array();
        vm.push(&owner);
        vm.append(&owner, &child);
        vm.append(&owner, &child);
        assert_eq!(vm.counter.ledger().owner_references(&child, &owner), 2);

        vm.remove_at(&owner, 0);
        assert_eq!(vm.settle(), 2);
        assert_eq!(vm.tracked(), 2);

        vm.remove_at(&owner, 0);
        assert_eq!(vm.settle(), 1);
        assert!(vm.recorder.was_collected(&child));
    });
}

#[test]
fn test_live_child_of_dead_owner_loses_edge() {
    for_each_strategy(|vm| {
        let owner = vm.new_array();
        let child = vm.new_array();
        vm.push(&child);
        vm.append(&owner, &child);
        assert_eq!(vm.counter.ledger().owner_references(&child, &owner), 1);

        assert_eq!(vm.settle(), 1);
        assert!(vm.recorder.was_collected(&owner));
        assert!(vm.counter.ledger().is_tracked(&child));
        assert_eq!(vm.counter.ledger().owner_references(&child, &owner), 0);

        vm.pop(&child);
        assert_eq!(vm.settle(), 0);
    });
}

// ============================================================================
// Cycle tests
// ============================================================================

#[test]
fn test_simple_cycle_collected() {
    for_each_strategy(|vm| {
        let a = vm.new_array();
        vm.push(&a);
        let b = vm.new_array();
        vm.append(&a, &b);
        vm.append(&b, &a);
        assert_eq!(vm.counter.count(), 3);

        vm.pop(&a);
        assert_eq!(vm.counter.count(), 2);

        assert_eq!(vm.settle(), 0);
        assert_eq!(vm.tracked(), 0);
        assert!(vm.recorder.was_collected(&a));
        assert!(vm.recorder.was_collected(&b));
    });
}

#[test]
fn test_self_reference_collected() {
    for_each_strategy(|vm| {
        let a = vm.new_array();
        vm.push(&a);
        vm.append(&a, &a);
        assert_eq!(vm.settle(), 2);

        vm.pop(&a);
        assert_eq!(vm.settle(), 0);
        assert_eq!(vm.tracked(), 0);
    });
}

#[test]
fn test_rooted_cycle_survives() {
    for_each_strategy(|vm| {
        let a = vm.new_array();
        let b = vm.new_array();
        let c = vm.new_array();
        vm.append(&a, &b);
        vm.append(&b, &c);
        vm.append(&c, &a);
        vm.push(&b);

        assert_eq!(vm.settle(), 4);
        assert_eq!(vm.tracked(), 3);
    });
}

#[test]
fn test_cycle_hanging_off_dead_cycle_collected() {
    for_each_strategy(|vm| {
        // root -> (a <-> b) -> (c <-> d)
        let root = vm.new_array();
        vm.push(&root);
        let [a, b, c, d] = [(); 4].map(|_| vm.new_array());
        vm.append(&a, &b);
        vm.append(&b, &a);
        vm.append(&c, &d);
        vm.append(&d, &c);
        vm.append(&b, &c);
        vm.append(&root, &a);
        assert_eq!(vm.settle(), 7);

        vm.remove_at(&root, 0);
        assert_eq!(vm.settle(), 1);
        assert_eq!(vm.tracked(), 1);
    });
}

#[test]
fn test_large_cycle_collected() {
    for_each_strategy(|vm| {
        let n = 100;
        let items: Vec<StackItem> = (0..n).map(|_| vm.new_array()).collect();
        for i in 0..n {
            vm.append(&items[i], &items[(i + 1) % n]);
        }
        vm.push(&items[n / 2]);
        assert_eq!(vm.settle(), n + 1);

        vm.pop(&items[n / 2]);
        assert_eq!(vm.settle(), 0);
        assert_eq!(vm.recorder.collected.borrow().len(), n);
    });
}

#[test]
fn test_deep_nesting_collected() {
    for_each_strategy(|vm| {
        let depth = 50_000;
        let root = vm.new_array();
        vm.push(&root);

        let mut parent = root.clone();
        for _ in 0..depth {
            let child = vm.new_array();
            vm.append(&parent, &child);
            parent = child;
        }
        drop(parent);
        assert_eq!(vm.settle(), depth + 1);

        vm.pop(&root);
        assert_eq!(vm.settle(), 0);
        assert_eq!(vm.tracked(), 0);
    });
}

// ============================================================================
// Settle behavior
// ============================================================================

#[test]
fn test_settle_is_idempotent() {
    for_each_strategy(|vm| {
        let a = vm.new_array();
        let b = vm.new_array();
        vm.push(&a);
        vm.append(&a, &b);
        vm.append(&b, &b);

        let first = vm.settle();
        let removed = vm.recorder.collected.borrow().len();
        assert_eq!(vm.settle(), first);
        assert_eq!(vm.recorder.collected.borrow().len(), removed);
    });
}

#[test]
fn test_settle_without_candidates_does_no_work() {
    for_each_strategy(|vm| {
        let a = vm.new_array();
        vm.push(&a);
        vm.settle();
        let passes = vm.recorder.settles.borrow().len();

        vm.push(&a);
        assert_eq!(vm.settle(), 2);
        assert!(!vm.counter.last_stats().collected);
        assert_eq!(vm.recorder.settles.borrow().len(), passes);
    });
}

#[test]
fn test_settle_stats_reported() {
    for_each_strategy(|vm| {
        let a = vm.new_array();
        let b = vm.new_array();
        vm.push(&b);
        vm.append(&a, &a);
        vm.settle();

        let stats = vm.counter.last_stats();
        assert!(stats.collected);
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.retained, 1);
        assert_eq!(stats.total_references, 1);
        assert_eq!(vm.recorder.settles.borrow().last(), Some(&stats));
    });
}

// ============================================================================
// Release hooks
// ============================================================================

#[test]
fn test_collected_buffer_returns_to_pool() {
    for_each_strategy(|vm| {
        let pool = BufferPool::new();
        let live = Buffer::rent(&pool, 32);
        let dead = Buffer::rent(&pool, 32);
        let live_item: StackItem = live.clone().into();
        let dead_item: StackItem = dead.clone().into();

        vm.counter.register_initial(&live_item);
        vm.counter.register_initial(&dead_item);
        vm.push(&live_item);
        assert_eq!(pool.rented(), 2);

        assert_eq!(vm.settle(), 1);
        assert!(dead.is_released());
        assert!(!live.is_released());
        assert_eq!(pool.rented(), 1);
        assert_eq!(pool.available(), 1);
    });
}

#[test]
fn test_buffer_inside_dead_container_released() {
    for_each_strategy(|vm| {
        let pool = BufferPool::new();
        let buffer = Buffer::rent(&pool, 8);
        let array = vm.new_array();
        vm.push(&array);
        vm.append(&array, &buffer.clone().into());

        vm.pop(&array);
        assert_eq!(vm.settle(), 0);
        assert!(buffer.is_released());
        assert_eq!(pool.rented(), 0);
        // The dead container dropped its children
        assert!(array.as_container().unwrap().is_empty());
    });
}

#[test]
fn test_buffers_cannot_own_children() {
    for_each_strategy(|vm| {
        let buffer: StackItem = Buffer::new(4).into();
        let array = vm.new_array();
        assert_eq!(
            vm.counter.add_owner_reference(&array, &buffer),
            Err(LedgerError::NotAContainer("buffer"))
        );
        assert_eq!(vm.counter.count(), 0);
    });
}

// ============================================================================
// Incremental strategy
// ============================================================================

#[test]
fn test_stack_churn_keeps_components_cached() {
    let mut counter = IncrementalCounter::new();
    let a: StackItem = Container::new_array().into();
    let b: StackItem = Container::new_array().into();
    counter.register_initial(&a);
    counter.register_initial(&b);
    counter.add_stack_reference(&a, 1);
    a.as_container().unwrap().push(b.clone());
    counter.add_owner_reference(&b, &a).unwrap();
    assert!(!counter.has_cached_components());

    counter.settle().unwrap();
    assert!(counter.last_stats().rebuilt_components);
    assert!(counter.has_cached_components());

    let scalar = StackItem::Integer(3);
    for _ in 0..10 {
        counter.add_stack_reference(&b, 1);
        counter.add_stack_reference(&scalar, 1);
        counter.remove_stack_reference(&b).unwrap();
        counter.remove_stack_reference(&scalar).unwrap();
        assert_eq!(counter.settle(), Ok(2));
        assert!(!counter.last_stats().rebuilt_components);
    }

    // A new value tracked while the cache is valid joins it as a singleton
    let c: StackItem = Container::new_map().into();
    counter.register_initial(&c);
    assert!(counter.has_cached_components());
    assert_eq!(counter.settle(), Ok(2));
    assert!(!counter.last_stats().rebuilt_components);
    assert_eq!(counter.ledger().tracked_len(), 2);

    // An edge change drops the cache
    a.as_container().unwrap().remove(0);
    counter.remove_owner_reference(&b, &a).unwrap();
    assert!(!counter.has_cached_components());
    assert_eq!(counter.settle(), Ok(1));
    assert!(counter.last_stats().rebuilt_components);
}
