//! Replays a parsed trace against a counter
//!
//! Each container operation is applied to the value first and then reported to the counter,
//! in the same order an interpreter would. A settle produces a `SettleReport`; values the counter
//! collects are unbound so later lines cannot reach them.

use std::{cell::RefCell, mem, rc::Rc};

use hashbrown::HashMap;
use quill_gc::{
    Buffer, Container, ContainerKind, CounterOptions, GcObserver, ItemId, LedgerError,
    LimitExceeded, ReferenceCounter, StackItem, Strategy,
};
use thiserror::Error;

use crate::{
    options::Options,
    trace::{Op, TraceLine},
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("line {line}: `{name}` is not bound")]
    UnknownName { line: usize, name: String },

    #[error("line {line}: `{name}` is a {kind}, expected {expected}")]
    WrongKind {
        line: usize,
        name: String,
        kind: &'static str,
        expected: &'static str,
    },

    #[error("line {line}: index {index} is out of range for `{name}`")]
    IndexOutOfRange {
        line: usize,
        name: String,
        index: usize,
    },

    #[error("line {line}: `{name}` has no key `{key}`")]
    MissingKey {
        line: usize,
        name: String,
        key: String,
    },

    #[error("line {line}: {source}")]
    Ledger { line: usize, source: LedgerError },

    #[error("line {line}: {source}")]
    Limit { line: usize, source: LimitExceeded },

    #[error("strategies diverge at line {line}: {expected_strategy} reported `{expected}`, {found_strategy} reported `{found}`")]
    Divergence {
        line: usize,
        expected_strategy: &'static str,
        expected: String,
        found_strategy: &'static str,
        found: String,
    },
}

/// Outcome of one settle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettleReport {
    /// Trace line of the settle
    pub line: usize,
    /// Total reference count returned by the settle
    pub count: usize,
    /// Values still tracked afterwards
    pub retained: usize,
    /// Sorted names of the values the settle removed. Values whose name was rebound are
    /// reported under their original name.
    pub removed: Vec<String>,
}

impl SettleReport {
    pub fn summary(&self, print_removed: bool) -> String {
        let mut summary = format!(
            "line {}: count {}, removed {}, retained {}",
            self.line,
            self.count,
            self.removed.len(),
            self.retained,
        );

        if print_removed && !self.removed.is_empty() {
            summary.push_str(&format!(" [{}]", self.removed.join(", ")));
        }

        summary
    }
}

/// Records the identity of every collected value until the runner drains it.
struct CollectedIds(Rc<RefCell<Vec<ItemId>>>);

impl GcObserver for CollectedIds {
    fn on_collect(&mut self, item: &StackItem) {
        if let Some(id) = item.id() {
            self.0.borrow_mut().push(id);
        }
    }
}

pub struct Runner {
    counter_options: CounterOptions,
    counter: Box<dyn ReferenceCounter>,

    /// Values bound to trace names
    items: HashMap<String, StackItem>,
    /// Name each tracked value was created under
    names: HashMap<ItemId, String>,

    collected: Rc<RefCell<Vec<ItemId>>>,
}

impl Runner {
    pub fn new(counter_options: CounterOptions) -> Runner {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let mut counter = counter_options.build_counter();
        counter.set_observer(Some(Box::new(CollectedIds(collected.clone()))));

        Runner {
            counter_options,
            counter,
            items: HashMap::new(),
            names: HashMap::new(),
            collected,
        }
    }

    /// Run every line of a trace, returning one report per settle.
    pub fn run(&mut self, trace: &[TraceLine]) -> Result<Vec<SettleReport>, ReplayError> {
        let mut reports = Vec::new();

        for line in trace {
            if let Some(report) = self.step(line)? {
                reports.push(report);
            }
        }

        Ok(reports)
    }

    fn bind(&mut self, name: &str, item: StackItem) {
        if let Some(id) = item.id() {
            self.names.insert(id, name.to_owned());
        }
        self.items.insert(name.to_owned(), item);
    }

    fn lookup(&self, line: usize, name: &str) -> Result<StackItem, ReplayError> {
        self.items
            .get(name)
            .cloned()
            .ok_or_else(|| ReplayError::UnknownName {
                line,
                name: name.to_owned(),
            })
    }

    fn container(
        &self,
        line: usize,
        name: &str,
        expected: &'static str,
        accepts: impl Fn(ContainerKind) -> bool,
    ) -> Result<(StackItem, Container), ReplayError> {
        let item = self.lookup(line, name)?;
        match item.as_container() {
            Some(container) if accepts(container.kind()) => {
                let container = container.clone();
                Ok((item, container))
            }
            _ => Err(ReplayError::WrongKind {
                line,
                name: name.to_owned(),
                kind: item.kind_name(),
                expected,
            }),
        }
    }

    fn list(&self, line: usize, name: &str) -> Result<(StackItem, Container), ReplayError> {
        self.container(line, name, "an array or struct", |kind| {
            kind != ContainerKind::Map
        })
    }

    fn map(&self, line: usize, name: &str) -> Result<(StackItem, Container), ReplayError> {
        self.container(line, name, "a map", |kind| kind == ContainerKind::Map)
    }

    /// Forget a collected value, returning the name it was created under.
    fn unbind_collected(&mut self, id: ItemId) -> Option<String> {
        let name = self.names.remove(&id)?;
        if self.items.get(&name).and_then(StackItem::id) == Some(id) {
            self.items.remove(&name);
        }
        Some(name)
    }

    fn step(&mut self, trace_line: &TraceLine) -> Result<Option<SettleReport>, ReplayError> {
        let line = trace_line.line;
        let ledger_error = |source| ReplayError::Ledger { line, source };

        match &trace_line.op {
            Op::NewContainer { kind, name } => {
                let container = match kind {
                    ContainerKind::Array => Container::new_array(),
                    ContainerKind::Struct => Container::new_struct(),
                    ContainerKind::Map => Container::new_map(),
                };
                let item = StackItem::from(container);
                self.counter.register_initial(&item);
                self.bind(name, item);
            }
            Op::NewBuffer { name, size } => {
                let item = StackItem::from(Buffer::new(*size));
                self.counter.register_initial(&item);
                self.bind(name, item);
            }
            Op::Int { name, value } => self.bind(name, StackItem::Integer(*value)),
            Op::Bytes { name, text } => {
                self.bind(name, StackItem::ByteString(text.as_bytes().into()))
            }
            Op::Push { name, count } => {
                let item = self.lookup(line, name)?;
                self.counter.add_stack_reference(&item, *count);
            }
            Op::Pop { name } => {
                let item = self.lookup(line, name)?;
                self.counter
                    .remove_stack_reference(&item)
                    .map_err(ledger_error)?;
            }
            Op::Append { owner, child } => {
                let (owner_item, container) = self.list(line, owner)?;
                let child = self.lookup(line, child)?;
                container.push(child.clone());
                self.counter
                    .add_owner_reference(&child, &owner_item)
                    .map_err(ledger_error)?;
            }
            Op::Set {
                owner,
                index,
                child,
            } => {
                let (owner_item, container) = self.list(line, owner)?;
                let child = self.lookup(line, child)?;
                let old = container.set(*index, child.clone()).ok_or_else(|| {
                    ReplayError::IndexOutOfRange {
                        line,
                        name: owner.clone(),
                        index: *index,
                    }
                })?;
                self.counter
                    .add_owner_reference(&child, &owner_item)
                    .map_err(ledger_error)?;
                self.counter
                    .remove_owner_reference(&old, &owner_item)
                    .map_err(ledger_error)?;
            }
            Op::Put { owner, key, child } => {
                let (owner_item, container) = self.map(line, owner)?;
                let child = self.lookup(line, child)?;
                let replaced = container
                    .insert(key.as_bytes().to_vec(), child.clone())
                    .ok()
                    .flatten();
                self.counter
                    .add_owner_reference(&child, &owner_item)
                    .map_err(ledger_error)?;
                if let Some(old) = replaced {
                    self.counter
                        .remove_owner_reference(&old, &owner_item)
                        .map_err(ledger_error)?;
                }
            }
            Op::Remove { owner, index } => {
                let (owner_item, container) = self.list(line, owner)?;
                let old = container
                    .remove(*index)
                    .ok_or_else(|| ReplayError::IndexOutOfRange {
                        line,
                        name: owner.clone(),
                        index: *index,
                    })?;
                self.counter
                    .remove_owner_reference(&old, &owner_item)
                    .map_err(ledger_error)?;
            }
            Op::Delete { owner, key } => {
                let (owner_item, container) = self.map(line, owner)?;
                let old = container.remove_key(key.as_bytes()).ok_or_else(|| {
                    ReplayError::MissingKey {
                        line,
                        name: owner.clone(),
                        key: key.clone(),
                    }
                })?;
                self.counter
                    .remove_owner_reference(&old, &owner_item)
                    .map_err(ledger_error)?;
            }
            Op::Clear { owner } => {
                let (owner_item, container) =
                    self.container(line, owner, "a container", |_| true)?;
                for old in container.clear() {
                    self.counter
                        .remove_owner_reference(&old, &owner_item)
                        .map_err(ledger_error)?;
                }
            }
            Op::Settle => return self.settle(line).map(Some),
        }

        Ok(None)
    }

    fn settle(&mut self, line: usize) -> Result<SettleReport, ReplayError> {
        let count = self
            .counter
            .settle()
            .map_err(|source| ReplayError::Ledger { line, source })?;

        let collected = mem::take(&mut *self.collected.borrow_mut());
        let mut removed = collected
            .into_iter()
            .filter_map(|id| self.unbind_collected(id))
            .collect::<Vec<_>>();
        removed.sort();

        let stats = self.counter.last_stats();
        log::trace!(
            "{} settle at line {line}: {stats:?}",
            self.counter.strategy().name()
        );

        self.counter_options
            .limits
            .check(self.counter.ledger())
            .map_err(|source| ReplayError::Limit { line, source })?;

        Ok(SettleReport {
            line,
            count,
            retained: stats.retained,
            removed,
        })
    }
}

/// Replay a trace with a single strategy.
pub fn run_trace(
    options: &Options,
    strategy: Strategy,
    trace: &[TraceLine],
) -> Result<Vec<SettleReport>, ReplayError> {
    Runner::new(options.counter_options(strategy)).run(trace)
}

/// Replay a trace as configured and write the reports.
pub fn replay(options: &Options, trace: &[TraceLine]) -> Result<(), ReplayError> {
    if !options.compare {
        for report in run_trace(options, options.strategy, trace)? {
            options.emit(&report.summary(options.print_removed));
        }
        return Ok(());
    }

    let [expected_strategy, found_strategy] = Strategy::ALL;
    let expected_reports = run_trace(options, expected_strategy, trace)?;
    let found_reports = run_trace(options, found_strategy, trace)?;

    for (expected, found) in expected_reports.iter().zip(&found_reports) {
        if expected != found {
            return Err(ReplayError::Divergence {
                line: expected.line,
                expected_strategy: expected_strategy.name(),
                expected: expected.summary(true),
                found_strategy: found_strategy.name(),
                found: found.summary(true),
            });
        }
        options.emit(&expected.summary(options.print_removed));
    }

    options.emit(&format!(
        "{} settles, strategies agree",
        expected_reports.len()
    ));

    Ok(())
}
