//! Ledger - reference-count bookkeeping shared by both collectors
//!
//! Design:
//! - Tracked values live in a slot arena; slot indices are stable until the value is collected
//!   and freed slots are reused in LIFO order, so slot numbering is a pure function of the
//!   operation sequence
//! - Identity lookup goes through a `hashbrown` map keyed by `ItemId`
//! - Owner edges are stored on the child, keyed by the owner's slot, in an ordered map so that
//!   every traversal visits edges in the same order on every run
//! - The pending-zero set is ordered for the same reason
//!
//! The collectors decide *what* dies. The ledger owns *how* a dead value is removed, so both
//! strategies produce identical counts by construction.

use alloc::{boxed::Box, collections::BTreeMap, collections::BTreeSet, vec::Vec};

use hashbrown::{HashMap, HashSet};

use crate::{
    entry::{GcColor, TrackedEntry},
    error::{LedgerError, LedgerResult},
    observer::GcObserver,
    scc::DirectedGraph,
    ItemId, StackItem,
};

/// Reference-count ledger for one VM execution.
#[derive(Default)]
pub struct Ledger {
    /// Slot arena of tracked values
    slots: Vec<Option<TrackedEntry>>,

    /// Slots freed by collection, reused last-in first-out
    free_slots: Vec<usize>,

    /// Identity -> slot
    index: HashMap<ItemId, usize>,

    /// Slots whose stack references dropped to zero since the last settle
    pending_zero: BTreeSet<usize>,

    /// Stack references plus owner edges, scalars included
    references: usize,

    /// Number of occupied slots
    tracked: usize,
}

impl Ledger {
    pub fn new() -> Ledger {
        Ledger::default()
    }

    /// Total reference count
    #[inline]
    pub fn count(&self) -> usize {
        self.references
    }

    /// Number of tracked values
    #[inline]
    pub fn tracked_len(&self) -> usize {
        self.tracked
    }

    /// Number of collection candidates waiting for the next settle
    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending_zero.len()
    }

    /// Whether the next settle has anything to examine
    #[inline]
    pub fn has_pending_work(&self) -> bool {
        !self.pending_zero.is_empty()
    }

    pub fn is_tracked(&self, item: &StackItem) -> bool {
        self.slot_of(item).is_some()
    }

    /// Stack references held on `item`, zero if untracked
    pub fn stack_references(&self, item: &StackItem) -> usize {
        self.tracked_entry(item).map_or(0, TrackedEntry::stack_refs)
    }

    /// Edges `owner` has to `item`, zero if there are none
    pub fn owner_references(&self, item: &StackItem, owner: &StackItem) -> usize {
        match (self.tracked_entry(item), self.slot_of(owner)) {
            (Some(entry), Some(owner_slot)) => entry.owners.get(&owner_slot).copied().unwrap_or(0),
            _ => 0,
        }
    }

    /// Every tracked value, in slot order
    pub fn tracked_items(&self) -> impl Iterator<Item = &StackItem> + '_ {
        self.entries().map(|(_, entry)| entry.item())
    }

    // ========================================================================
    // Slot access
    // ========================================================================

    #[inline]
    pub(crate) fn slot_of(&self, item: &StackItem) -> Option<usize> {
        item.id().and_then(|id| self.index.get(&id).copied())
    }

    fn tracked_entry(&self, item: &StackItem) -> Option<&TrackedEntry> {
        self.slot_of(item).and_then(|slot| self.entry(slot))
    }

    #[inline]
    pub(crate) fn entry(&self, slot: usize) -> Option<&TrackedEntry> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    #[inline]
    pub(crate) fn entry_mut(&mut self, slot: usize) -> Option<&mut TrackedEntry> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (usize, &TrackedEntry)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| entry.as_ref().map(|entry| (slot, entry)))
    }

    /// Find or create the slot of a trackable value. Returns `None` for scalars, otherwise the
    /// slot and whether it was newly created.
    fn track(&mut self, item: &StackItem) -> Option<(usize, bool)> {
        let id = item.id()?;
        if let Some(&slot) = self.index.get(&id) {
            return Some((slot, false));
        }

        let entry = TrackedEntry::new(item.clone());
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };

        self.index.insert(id, slot);
        self.tracked += 1;
        Some((slot, true))
    }

    // ========================================================================
    // Counting contract
    // ========================================================================

    /// Returns the slot of `item` if this call started tracking it.
    pub(crate) fn add_stack_reference(&mut self, item: &StackItem, count: usize) -> Option<usize> {
        self.references += count;

        let (slot, inserted) = self.track(item)?;
        if let Some(entry) = self.entry_mut(slot) {
            entry.stack_refs += count;
        }
        self.pending_zero.remove(&slot);

        inserted.then_some(slot)
    }

    pub(crate) fn remove_stack_reference(&mut self, item: &StackItem) -> LedgerResult<()> {
        if let Some(id) = item.id() {
            let slot = self.index.get(&id).copied();
            let entry = slot
                .and_then(|slot| self.slots[slot].as_mut())
                .filter(|entry| entry.stack_refs > 0)
                .ok_or(LedgerError::StackReferenceUnderflow(id))?;
            if self.references == 0 {
                return Err(LedgerError::CountUnderflow);
            }

            entry.stack_refs -= 1;
            if entry.stack_refs == 0 {
                self.pending_zero.extend(slot);
            }
        } else if self.references == 0 {
            return Err(LedgerError::CountUnderflow);
        }

        self.references -= 1;
        Ok(())
    }

    pub(crate) fn add_owner_reference(
        &mut self,
        item: &StackItem,
        owner: &StackItem,
    ) -> LedgerResult<()> {
        if !owner.has_children() {
            return Err(LedgerError::NotAContainer(owner.kind_name()));
        }

        // An owner nothing has registered yet becomes visible exactly as `register_initial`
        // would have made it.
        let owner_slot = match self.slot_of(owner) {
            Some(slot) => slot,
            None => self
                .register_initial(owner)
                .ok_or(LedgerError::Inconsistent("owner has no slot"))?,
        };

        self.references += 1;

        if let Some((slot, _)) = self.track(item) {
            if let Some(entry) = self.entry_mut(slot) {
                *entry.owners.entry(owner_slot).or_insert(0) += 1;
            }
        }

        Ok(())
    }

    pub(crate) fn remove_owner_reference(
        &mut self,
        item: &StackItem,
        owner: &StackItem,
    ) -> LedgerResult<()> {
        if !owner.has_children() {
            return Err(LedgerError::NotAContainer(owner.kind_name()));
        }
        if let Some(id) = item.id() {
            let missing = || LedgerError::MissingOwnerEdge {
                item: id,
                owner: owner.id().unwrap_or(id),
            };

            let owner_slot = self.slot_of(owner).ok_or_else(missing)?;
            let slot = self.index.get(&id).copied().ok_or_else(missing)?;
            let entry = self.slots[slot].as_mut().ok_or_else(missing)?;
            let edges = entry.owners.get_mut(&owner_slot).ok_or_else(missing)?;
            if self.references == 0 {
                return Err(LedgerError::CountUnderflow);
            }

            *edges -= 1;
            if *edges == 0 {
                entry.owners.remove(&owner_slot);
            }
            if entry.stack_refs == 0 {
                self.pending_zero.insert(slot);
            }
        } else {
            // Scalar edges are not recorded, but the owner must at least be tracked
            if self.slot_of(owner).is_none() {
                let owner = owner
                    .id()
                    .ok_or(LedgerError::Inconsistent("owner has no identity"))?;
                return Err(LedgerError::UntrackedOwner(owner));
            }
            if self.references == 0 {
                return Err(LedgerError::CountUnderflow);
            }
        }

        self.references -= 1;
        Ok(())
    }

    /// Returns the slot of `item` if this call started tracking it.
    pub(crate) fn register_initial(&mut self, item: &StackItem) -> Option<usize> {
        let (slot, inserted) = self.track(item)?;
        self.pending_zero.insert(slot);
        inserted.then_some(slot)
    }

    // ========================================================================
    // Collection support
    // ========================================================================

    /// Start a pass: the pending-zero set is superseded and every mark is cleared.
    pub(crate) fn begin_pass(&mut self) {
        self.pending_zero.clear();
        for entry in self.slots.iter_mut().flatten() {
            entry.set_color(GcColor::White);
        }
    }

    /// Remove a batch of dead values.
    ///
    /// Each removed container gives back every child edge it contributed to the total. Edges to
    /// tracked children outside the batch are detached from those children. Removed slots are
    /// freed, reported to the observer and released, in batch order.
    ///
    /// The batch is validated before anything is changed, so an inconsistent graph leaves the
    /// ledger untouched.
    pub(crate) fn remove_batch(
        &mut self,
        batch: &[usize],
        observer: &mut Option<Box<dyn GcObserver>>,
    ) -> LedgerResult<()> {
        let members: HashSet<usize> = batch.iter().copied().collect();

        let mut released_edges = 0usize;
        let mut detached: BTreeMap<(usize, usize), usize> = BTreeMap::new();

        for &slot in batch {
            let entry = self
                .entry(slot)
                .ok_or(LedgerError::Inconsistent("collected slot is not tracked"))?;

            released_edges += entry.item().child_count();

            let index = &self.index;
            entry.item().visit_children(&mut |child: &StackItem| {
                let child_slot = child.id().and_then(|id| index.get(&id).copied());
                if let Some(child_slot) = child_slot.filter(|s| !members.contains(s)) {
                    *detached.entry((child_slot, slot)).or_insert(0) += 1;
                }
            });
        }

        for (&(child, owner), &edges) in &detached {
            let recorded = self.entry(child).and_then(|entry| entry.owners.get(&owner));
            if recorded != Some(&edges) {
                return Err(LedgerError::Inconsistent(
                    "owner edges do not match container contents",
                ));
            }
        }

        self.references = self
            .references
            .checked_sub(released_edges)
            .ok_or(LedgerError::CountUnderflow)?;

        for &(child, owner) in detached.keys() {
            if let Some(entry) = self.entry_mut(child) {
                entry.owners.remove(&owner);
            }
        }

        for &slot in batch {
            let Some(entry) = self.slots[slot].take() else {
                continue;
            };

            if let Some(id) = entry.item().id() {
                self.index.remove(&id);
            }
            self.pending_zero.remove(&slot);
            self.free_slots.push(slot);
            self.tracked -= 1;

            if let Some(observer) = observer.as_mut() {
                observer.on_collect(entry.item());
            }
            entry.item().release();
        }

        Ok(())
    }
}

/// Flatten every tracked container before the handles drop, so live cycles are freed and deep
/// chains are not dropped recursively.
impl Drop for Ledger {
    fn drop(&mut self) {
        for entry in self.slots.iter().flatten() {
            entry.item().release();
        }
    }
}

/// Edges run from a value to each of its owners.
impl DirectedGraph for Ledger {
    fn node_bound(&self) -> usize {
        self.slots.len()
    }

    fn contains(&self, node: usize) -> bool {
        self.entry(node).is_some()
    }

    fn successors(&self, node: usize, out: &mut Vec<usize>) {
        if let Some(entry) = self.entry(node) {
            out.extend(entry.owners.keys().copied());
        }
    }
}
