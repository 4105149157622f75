//! Value model
//!
//! `StackItem` is the closed set of values the VM can hold. Only containers and buffers are
//! trackable; every other variant is value-like and never enters the ledger.
//!
//! Containers and buffers are shared handles. Identity, not structural equality, is what the
//! ledger keys on: two containers with identical contents are distinct graph nodes.

use alloc::{collections::BTreeMap, rc::Rc, vec::Vec};
use core::{
    cell::{Cell, RefCell},
    fmt, mem,
};

use crate::visitor::ItemVisitor;

/// Identity of a trackable value.
///
/// Derived from the address of the shared allocation, which stays stable for as long as any
/// handle (including the one held by the ledger) keeps the value alive.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(usize);

impl ItemId {
    #[inline]
    fn of<T>(rc: &Rc<T>) -> ItemId {
        ItemId(Rc::as_ptr(rc) as *const () as usize)
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({:#x})", self.0)
    }
}

/// Key of a map entry. Keys are immutable byte strings and are never tracked.
pub type MapKey = Vec<u8>;

/// Any value the VM can hold.
#[derive(Clone)]
pub enum StackItem {
    Null,
    Boolean(bool),
    Integer(i128),
    ByteString(Rc<[u8]>),
    Pointer(usize),
    InteropInterface(u64),
    Container(Container),
    Buffer(Buffer),
}

impl StackItem {
    /// Whether the ledger tracks this value.
    #[inline]
    pub fn is_trackable(&self) -> bool {
        matches!(self, StackItem::Container(_) | StackItem::Buffer(_))
    }

    /// Whether this value can own child values.
    #[inline]
    pub fn has_children(&self) -> bool {
        matches!(self, StackItem::Container(_))
    }

    /// Identity of a trackable value, `None` for scalars.
    #[inline]
    pub fn id(&self) -> Option<ItemId> {
        match self {
            StackItem::Container(container) => Some(container.id()),
            StackItem::Buffer(buffer) => Some(buffer.id()),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            StackItem::Container(container) => Some(container),
            _ => None,
        }
    }

    /// Number of child edges this value contributes to the total reference count.
    #[inline]
    pub fn child_count(&self) -> usize {
        match self {
            StackItem::Container(container) => container.len(),
            _ => 0,
        }
    }

    /// Report every child edge to the visitor, once per edge.
    pub fn visit_children(&self, visitor: &mut impl ItemVisitor) {
        if let StackItem::Container(container) = self {
            container.visit_children(visitor);
        }
    }

    /// Release hook run when the ledger collects this value.
    pub(crate) fn release(&self) {
        match self {
            StackItem::Container(container) => container.release(),
            StackItem::Buffer(buffer) => buffer.release(),
            _ => {}
        }
    }

    /// Name of the variant, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            StackItem::Null => "null",
            StackItem::Boolean(_) => "boolean",
            StackItem::Integer(_) => "integer",
            StackItem::ByteString(_) => "byte string",
            StackItem::Pointer(_) => "pointer",
            StackItem::InteropInterface(_) => "interop interface",
            StackItem::Container(container) => container.kind().name(),
            StackItem::Buffer(_) => "buffer",
        }
    }
}

impl fmt::Debug for StackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackItem::Null => f.write_str("Null"),
            StackItem::Boolean(value) => write!(f, "Boolean({value})"),
            StackItem::Integer(value) => write!(f, "Integer({value})"),
            StackItem::ByteString(bytes) => write!(f, "ByteString({} bytes)", bytes.len()),
            StackItem::Pointer(position) => write!(f, "Pointer({position})"),
            StackItem::InteropInterface(handle) => write!(f, "InteropInterface({handle})"),
            StackItem::Container(container) => write!(
                f,
                "{}({:?}, {} children)",
                container.kind().name(),
                container.id(),
                container.len()
            ),
            StackItem::Buffer(buffer) => {
                write!(f, "Buffer({:?}, {} bytes)", buffer.id(), buffer.len())
            }
        }
    }
}

impl From<Container> for StackItem {
    fn from(container: Container) -> StackItem {
        StackItem::Container(container)
    }
}

impl From<Buffer> for StackItem {
    fn from(buffer: Buffer) -> StackItem {
        StackItem::Buffer(buffer)
    }
}

impl From<i128> for StackItem {
    fn from(value: i128) -> StackItem {
        StackItem::Integer(value)
    }
}

impl From<bool> for StackItem {
    fn from(value: bool) -> StackItem {
        StackItem::Boolean(value)
    }
}

// ============================================================================
// Containers
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    Array,
    Struct,
    Map,
}

impl ContainerKind {
    pub fn name(self) -> &'static str {
        match self {
            ContainerKind::Array => "array",
            ContainerKind::Struct => "struct",
            ContainerKind::Map => "map",
        }
    }
}

enum Children {
    List(Vec<StackItem>),
    Map(BTreeMap<MapKey, StackItem>),
}

struct ContainerData {
    kind: ContainerKind,
    children: RefCell<Children>,
}

/// Shared handle to an array, struct or map.
///
/// Mutators only change the container. The interpreter pairs each of them with the matching
/// ledger call (`add_owner_reference` for every child gained, `remove_owner_reference` for every
/// child lost).
#[derive(Clone)]
pub struct Container(Rc<ContainerData>);

impl Container {
    fn new(kind: ContainerKind, children: Children) -> Container {
        Container(Rc::new(ContainerData {
            kind,
            children: RefCell::new(children),
        }))
    }

    pub fn new_array() -> Container {
        Container::new(ContainerKind::Array, Children::List(Vec::new()))
    }

    pub fn new_struct() -> Container {
        Container::new(ContainerKind::Struct, Children::List(Vec::new()))
    }

    pub fn new_map() -> Container {
        Container::new(ContainerKind::Map, Children::Map(BTreeMap::new()))
    }

    #[inline]
    pub fn id(&self) -> ItemId {
        ItemId::of(&self.0)
    }

    #[inline]
    pub fn kind(&self) -> ContainerKind {
        self.0.kind
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Container) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn len(&self) -> usize {
        match &*self.0.children.borrow() {
            Children::List(items) => items.len(),
            Children::Map(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append to an array or struct. Returns `false` for maps.
    pub fn push(&self, item: StackItem) -> bool {
        match &mut *self.0.children.borrow_mut() {
            Children::List(items) => {
                items.push(item);
                true
            }
            Children::Map(_) => false,
        }
    }

    pub fn get(&self, index: usize) -> Option<StackItem> {
        match &*self.0.children.borrow() {
            Children::List(items) => items.get(index).cloned(),
            Children::Map(_) => None,
        }
    }

    /// Overwrite a list slot, returning the previous occupant.
    pub fn set(&self, index: usize, item: StackItem) -> Option<StackItem> {
        match &mut *self.0.children.borrow_mut() {
            Children::List(items) => items.get_mut(index).map(|slot| mem::replace(slot, item)),
            Children::Map(_) => None,
        }
    }

    /// Remove a list slot, returning its occupant.
    pub fn remove(&self, index: usize) -> Option<StackItem> {
        match &mut *self.0.children.borrow_mut() {
            Children::List(items) if index < items.len() => Some(items.remove(index)),
            _ => None,
        }
    }

    pub fn lookup(&self, key: &[u8]) -> Option<StackItem> {
        match &*self.0.children.borrow() {
            Children::Map(entries) => entries.get(key).cloned(),
            Children::List(_) => None,
        }
    }

    /// Insert into a map. Returns `Err(item)` when called on a list, otherwise the replaced value.
    pub fn insert(&self, key: MapKey, item: StackItem) -> Result<Option<StackItem>, StackItem> {
        match &mut *self.0.children.borrow_mut() {
            Children::Map(entries) => Ok(entries.insert(key, item)),
            Children::List(_) => Err(item),
        }
    }

    pub fn remove_key(&self, key: &[u8]) -> Option<StackItem> {
        match &mut *self.0.children.borrow_mut() {
            Children::Map(entries) => entries.remove(key),
            Children::List(_) => None,
        }
    }

    /// Drop every child, returning them so the caller can detach each edge.
    pub fn clear(&self) -> Vec<StackItem> {
        match &mut *self.0.children.borrow_mut() {
            Children::List(items) => mem::take(items),
            Children::Map(entries) => mem::take(entries).into_values().collect(),
        }
    }

    pub fn visit_children(&self, visitor: &mut impl ItemVisitor) {
        match &*self.0.children.borrow() {
            Children::List(items) => items.iter().for_each(|item| visitor.visit(item)),
            Children::Map(entries) => entries.values().for_each(|item| visitor.visit(item)),
        }
    }

    fn release(&self) {
        // Take the children out before dropping them so that no borrow is held while nested
        // handles are destroyed.
        let children = match &mut *self.0.children.borrow_mut() {
            Children::List(items) => Children::List(mem::take(items)),
            Children::Map(entries) => Children::Map(mem::take(entries)),
        };
        drop(children);
    }
}

// ============================================================================
// Buffers
// ============================================================================

/// Pool of byte blocks that buffers rent from and return to when collected.
#[derive(Default)]
pub struct BufferPool {
    free: RefCell<Vec<Vec<u8>>>,
    rented: Cell<usize>,
}

impl BufferPool {
    pub fn new() -> Rc<BufferPool> {
        Rc::new(BufferPool::default())
    }

    /// Number of blocks currently rented out.
    pub fn rented(&self) -> usize {
        self.rented.get()
    }

    /// Number of blocks available for reuse.
    pub fn available(&self) -> usize {
        self.free.borrow().len()
    }

    fn rent(&self, size: usize) -> Vec<u8> {
        self.rented.set(self.rented.get() + 1);
        let mut block = self.free.borrow_mut().pop().unwrap_or_default();
        block.clear();
        block.resize(size, 0);
        block
    }

    fn give_back(&self, block: Vec<u8>) {
        self.rented.set(self.rented.get() - 1);
        self.free.borrow_mut().push(block);
    }
}

struct BufferData {
    bytes: RefCell<Vec<u8>>,
    pool: Option<Rc<BufferPool>>,
    released: Cell<bool>,
}

/// Shared handle to a mutable byte block. Buffers never own outgoing edges.
#[derive(Clone)]
pub struct Buffer(Rc<BufferData>);

impl Buffer {
    /// Allocate a zeroed buffer outside of any pool.
    pub fn new(size: usize) -> Buffer {
        Buffer(Rc::new(BufferData {
            bytes: RefCell::new(alloc::vec![0; size]),
            pool: None,
            released: Cell::new(false),
        }))
    }

    /// Rent a zeroed buffer from `pool`. The block goes back to the pool when the buffer is
    /// collected.
    pub fn rent(pool: &Rc<BufferPool>, size: usize) -> Buffer {
        Buffer(Rc::new(BufferData {
            bytes: RefCell::new(pool.rent(size)),
            pool: Some(pool.clone()),
            released: Cell::new(false),
        }))
    }

    #[inline]
    pub fn id(&self) -> ItemId {
        ItemId::of(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.bytes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_released(&self) -> bool {
        self.0.released.get()
    }

    pub fn with_bytes<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.0.bytes.borrow_mut())
    }

    fn release(&self) {
        if self.0.released.replace(true) {
            return;
        }

        let block = mem::take(&mut *self.0.bytes.borrow_mut());
        if let Some(pool) = &self.0.pool {
            pool.give_back(block);
        }
    }
}
