//! Settle cost of both strategies.
//!
//! Run with: cargo bench -p quill_benches

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use quill_gc::{Container, CounterOptionsBuilder, ReferenceCounter, StackItem, Strategy};

const SIZES: [usize; 3] = [64, 512, 2048];

fn new_counter(strategy: Strategy) -> Box<dyn ReferenceCounter> {
    CounterOptionsBuilder::new()
        .strategy(strategy)
        .build()
        .build_counter()
}

fn new_array(counter: &mut dyn ReferenceCounter) -> StackItem {
    let item = StackItem::from(Container::new_array());
    counter.register_initial(&item);
    item
}

fn append(counter: &mut dyn ReferenceCounter, owner: &StackItem, child: &StackItem) {
    if let Some(container) = owner.as_container() {
        container.push(child.clone());
    }
    counter.add_owner_reference(child, owner).unwrap();
}

/// A balanced binary tree of `size` arrays, returning the root.
fn build_tree(counter: &mut dyn ReferenceCounter, size: usize) -> StackItem {
    let nodes = (0..size).map(|_| new_array(counter)).collect::<Vec<_>>();
    for (index, node) in nodes.iter().enumerate().skip(1) {
        append(counter, &nodes[(index - 1) / 2], node);
    }
    nodes[0].clone()
}

/// A ring of `size` arrays held by one stack reference, returning the held node.
fn build_ring(counter: &mut dyn ReferenceCounter, size: usize) -> StackItem {
    let nodes = (0..size).map(|_| new_array(counter)).collect::<Vec<_>>();
    for (index, node) in nodes.iter().enumerate() {
        append(counter, node, &nodes[(index + 1) % size]);
    }
    counter.add_stack_reference(&nodes[0], 1);
    nodes[0].clone()
}

/// Repeatedly drop and re-push the root of a live tree. No owner edge changes, so the
/// incremental strategy keeps its components.
fn bench_stack_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack_churn");

    for strategy in Strategy::ALL {
        for size in SIZES {
            group.bench_with_input(BenchmarkId::new(strategy.name(), size), &size, |b, &size| {
                let mut counter = new_counter(strategy);
                let root = build_tree(counter.as_mut(), size);
                counter.add_stack_reference(&root, 1);
                counter.settle().unwrap();

                b.iter(|| {
                    counter.add_stack_reference(&root, 1);
                    counter.remove_stack_reference(&root).unwrap();
                    black_box(counter.settle().unwrap())
                });

                counter.remove_stack_reference(&root).unwrap();
                counter.settle().unwrap();
            });
        }
    }

    group.finish();
}

/// Reclaim a detached ring, including the component rebuild after the edge changes.
fn bench_cycle_reclaim(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycle_reclaim");

    for strategy in Strategy::ALL {
        for size in SIZES {
            group.bench_with_input(BenchmarkId::new(strategy.name(), size), &size, |b, &size| {
                b.iter_batched(
                    || {
                        let mut counter = new_counter(strategy);
                        let held = build_ring(counter.as_mut(), size);
                        counter.settle().unwrap();
                        counter.remove_stack_reference(&held).unwrap();
                        counter
                    },
                    |mut counter| black_box(counter.settle().unwrap()),
                    BatchSize::LargeInput,
                );
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_stack_churn, bench_cycle_reclaim);
criterion_main!(benches);
