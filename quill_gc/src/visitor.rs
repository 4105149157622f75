//! Child enumeration
//!
//! Containers report their children through `ItemVisitor`, which decouples the collectors from
//! the container representation.
//! - The mark phase implements it with a `Marker` that grays newly discovered children
//! - The sweep phase implements it to detach owner edges and check child multiplicities

use crate::StackItem;

/// Visitor over the child edges of a container.
///
/// A child held in several slots is reported once per slot.
///
/// # Example
/// ```ignore
/// container.visit_children(&mut |child: &StackItem| {
///     if let Some(id) = child.id() {
///         seen.push(id);
///     }
/// });
/// ```
pub trait ItemVisitor {
    /// Visit one child edge.
    fn visit(&mut self, item: &StackItem);
}

impl<F: FnMut(&StackItem)> ItemVisitor for F {
    #[inline]
    fn visit(&mut self, item: &StackItem) {
        self(item)
    }
}
