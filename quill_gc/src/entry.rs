//! Per-value bookkeeping
//!
//! Every tracked value owns an entry in the ledger's slot arena holding its counts and the
//! transient liveness color.

use alloc::collections::BTreeMap;

use crate::StackItem;

/// Colors used while deciding liveness
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum GcColor {
    /// Not yet proven live. Still white when a pass finishes means the value is collected.
    #[default]
    White = 0,
    /// Proven live, children not yet scanned
    Gray = 1,
    /// Proven live and fully scanned
    Black = 2,
}

/// Ledger entry for one tracked value.
pub struct TrackedEntry {
    /// Strong handle to the value, used to enumerate children and run the release hook
    item: StackItem,
    /// Direct holds from execution stacks and slots
    pub(crate) stack_refs: usize,
    /// Owning container slot -> number of edges that container has to this value
    pub(crate) owners: BTreeMap<usize, usize>,
    /// Liveness color, recomputed by every pass
    color: GcColor,
}

impl TrackedEntry {
    pub fn new(item: StackItem) -> TrackedEntry {
        TrackedEntry {
            item,
            stack_refs: 0,
            owners: BTreeMap::new(),
            color: GcColor::White,
        }
    }

    #[inline]
    pub fn item(&self) -> &StackItem {
        &self.item
    }

    #[inline]
    pub fn stack_refs(&self) -> usize {
        self.stack_refs
    }

    /// Total owner edges pointing at this value
    pub fn owner_refs(&self) -> usize {
        self.owners.values().sum()
    }

    #[inline]
    pub fn color(&self) -> GcColor {
        self.color
    }

    #[inline]
    pub fn set_color(&mut self, color: GcColor) {
        self.color = color;
    }

    #[inline]
    pub fn is_marked(&self) -> bool {
        self.color != GcColor::White
    }

    /// Whether a stack or slot holds this value directly
    #[inline]
    pub fn is_root(&self) -> bool {
        self.stack_refs > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Container;

    #[test]
    fn test_entry_color() {
        let mut entry = TrackedEntry::new(Container::new_array().into());
        assert_eq!(entry.color(), GcColor::White);
        assert!(!entry.is_marked());

        entry.set_color(GcColor::Gray);
        assert!(entry.is_marked());

        entry.set_color(GcColor::Black);
        assert_eq!(entry.color(), GcColor::Black);
    }

    #[test]
    fn test_owner_refs_sums_multiplicities() {
        let mut entry = TrackedEntry::new(Container::new_array().into());
        entry.owners.insert(3, 2);
        entry.owners.insert(7, 1);
        assert_eq!(entry.owner_refs(), 3);
        assert!(!entry.is_root());
    }
}
