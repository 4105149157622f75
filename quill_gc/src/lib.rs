//! Quill reference counter
//!
//! Tracks ownership of the VM's heap values (arrays, structs, maps, buffers), which may form
//! reference cycles, and reclaims unreachable values at explicit settle points. Reclamation is
//! deterministic: every conforming implementation removes the same values and reports the same
//! count, because the count feeds resource accounting.
//!
//! Key types:
//! - `StackItem`: The closed value model, scalars plus trackable containers and buffers
//! - `Ledger`: Per-value stack references and owner edges, shared by both strategies
//! - `MarkSweepCounter`: Full reachability trace, the reference strategy
//! - `IncrementalCounter`: Cached strongly-connected-component decomposition
//!
//! Key traits:
//! - `ReferenceCounter`: Implemented by both strategies, driven by the interpreter
//! - `ItemVisitor`: Used by containers to report their children
//! - `GcObserver`: Optional instrumentation hook

#![no_std]
extern crate alloc;

mod counter;
mod entry;
mod error;
mod gray_queue;
mod incremental;
mod ledger;
mod limits;
mod mark_sweep;
mod observer;
pub mod scc;
mod value;
mod visitor;

pub use counter::{CounterOptions, CounterOptionsBuilder, ReferenceCounter, Strategy};
pub use error::{LedgerError, LedgerResult};
pub use incremental::IncrementalCounter;
pub use ledger::Ledger;
pub use limits::{ExecutionLimits, LimitExceeded, DEFAULT_MAX_REFERENCES};
pub use mark_sweep::MarkSweepCounter;
pub use observer::{GcObserver, SettleStats};
pub use value::{Buffer, BufferPool, Container, ContainerKind, ItemId, MapKey, StackItem};
pub use visitor::ItemVisitor;

#[cfg(test)]
mod tests;
