//! Dense storage for graph nodes.
//!
//! Nodes live in one contiguous arena and refer to each other by [`Id`],
//! a typed `u32` index. Ids are never reused: a killed node keeps its slot
//! (marked dead) so stale ids held by worklists or side tables stay harmless.
//!
//! - **Arena**: append-only node storage
//! - **SecondaryMap**: per-node side tables for passes (blocks, depths, counts)
//! - **BitSet**: compact visited/membership sets keyed by node index

use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

// =============================================================================
// Typed ID
// =============================================================================

/// Typed index into an [`Arena`].
///
/// Trait impls are written by hand so `Id<T>` is `Copy`/`Eq`/`Hash` for any `T`.
pub struct Id<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Copy for Id<T> {}

impl<T> Clone for Id<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Id<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> std::hash::Hash for Id<T> {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> Id<T> {
    #[inline]
    pub const fn new(index: u32) -> Self {
        Id {
            index,
            _marker: PhantomData,
        }
    }

    /// Raw index; also the node's creation order.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.index as usize
    }
}

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index)
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index)
    }
}

// =============================================================================
// Arena
// =============================================================================

/// Append-only storage; ids are assigned in allocation order.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Arena<T> {
    #[inline]
    pub fn new() -> Self {
        Arena { items: Vec::new() }
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Store `item`, returning its id.
    #[inline]
    pub fn alloc(&mut self, item: T) -> Id<T> {
        let index = self.items.len() as u32;
        self.items.push(item);
        Id::new(index)
    }

    #[inline]
    pub fn get(&self, id: Id<T>) -> Option<&T> {
        self.items.get(id.as_usize())
    }

    /// Number of slots ever allocated, dead ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate slots with their ids.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (Id::new(i as u32), item))
    }

    /// Id the next allocation will receive.
    #[inline]
    pub fn next_id(&self) -> Id<T> {
        Id::new(self.items.len() as u32)
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<Id<T>> for Arena<T> {
    type Output = T;

    #[inline]
    fn index(&self, id: Id<T>) -> &Self::Output {
        &self.items[id.as_usize()]
    }
}

impl<T> IndexMut<Id<T>> for Arena<T> {
    #[inline]
    fn index_mut(&mut self, id: Id<T>) -> &mut Self::Output {
        &mut self.items[id.as_usize()]
    }
}

// =============================================================================
// Secondary Map
// =============================================================================

/// Side table keyed by arena id, growing on demand.
///
/// Reads of ids past the end return `V::default()`, so passes can size the
/// map once and still query nodes created later.
#[derive(Debug, Clone)]
pub struct SecondaryMap<K, V> {
    values: Vec<V>,
    default: V,
    _marker: PhantomData<fn() -> K>,
}

impl<K, V: Default + Clone> SecondaryMap<K, V> {
    pub fn new() -> Self {
        SecondaryMap {
            values: Vec::new(),
            default: V::default(),
            _marker: PhantomData,
        }
    }

    /// Pre-size for an arena of `len` slots.
    pub fn with_capacity(len: usize) -> Self {
        SecondaryMap {
            values: vec![V::default(); len],
            default: V::default(),
            _marker: PhantomData,
        }
    }

    pub fn get(&self, id: Id<K>) -> &V {
        self.values.get(id.as_usize()).unwrap_or(&self.default)
    }

    pub fn set(&mut self, id: Id<K>, value: V) {
        let idx = id.as_usize();
        if idx >= self.values.len() {
            self.values.resize(idx + 1, V::default());
        }
        self.values[idx] = value;
    }

    /// Mutable slot, growing the table if needed.
    pub fn entry(&mut self, id: Id<K>) -> &mut V {
        let idx = id.as_usize();
        if idx >= self.values.len() {
            self.values.resize(idx + 1, V::default());
        }
        &mut self.values[idx]
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl<K, V: Default + Clone> Default for SecondaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V: Default + Clone> Index<Id<K>> for SecondaryMap<K, V> {
    type Output = V;

    fn index(&self, id: Id<K>) -> &Self::Output {
        self.get(id)
    }
}

// =============================================================================
// Bit Set
// =============================================================================

/// Growable bit set keyed by node index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitSet {
    bits: Vec<u64>,
}

impl BitSet {
    pub fn new() -> Self {
        BitSet { bits: Vec::new() }
    }

    pub fn with_capacity(n: usize) -> Self {
        BitSet {
            bits: vec![0; n.div_ceil(64)],
        }
    }

    fn ensure_capacity(&mut self, n: usize) {
        let words = n.div_ceil(64);
        if words > self.bits.len() {
            self.bits.resize(words, 0);
        }
    }

    /// Set `index`; returns true if it was previously clear.
    #[inline]
    pub fn insert(&mut self, index: usize) -> bool {
        self.ensure_capacity(index + 1);
        let (word, bit) = (index / 64, index % 64);
        let was_clear = self.bits[word] & (1 << bit) == 0;
        self.bits[word] |= 1 << bit;
        was_clear
    }

    /// Clear `index`; returns true if it was set.
    #[inline]
    pub fn remove(&mut self, index: usize) -> bool {
        let (word, bit) = (index / 64, index % 64);
        match self.bits.get_mut(word) {
            Some(w) if *w & (1 << bit) != 0 => {
                *w &= !(1 << bit);
                true
            }
            _ => false,
        }
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        let (word, bit) = (index / 64, index % 64);
        self.bits
            .get(word)
            .map_or(false, |w| w & (1 << bit) != 0)
    }

    pub fn clear(&mut self) {
        self.bits.iter_mut().for_each(|w| *w = 0);
    }

    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// Set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().enumerate().flat_map(|(word_idx, &word)| {
            (0..64)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| word_idx * 64 + bit)
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Slot(u8);

    #[test]
    fn test_ids_follow_allocation_order() {
        let mut arena: Arena<Slot> = Arena::new();
        let a = arena.alloc(Slot(1));
        let b = arena.alloc(Slot(2));
        assert!(a < b);
        assert_eq!(arena.next_id().index(), 2);
        assert_eq!(arena[b].0, 2);
        assert_eq!(format!("{a:?}"), "#0");
    }

    #[test]
    fn test_secondary_map_defaults() {
        let mut arena: Arena<Slot> = Arena::new();
        let a = arena.alloc(Slot(0));
        let b = arena.alloc(Slot(0));
        let mut depth: SecondaryMap<Slot, u32> = SecondaryMap::new();
        depth.set(b, 7);
        assert_eq!(*depth.get(a), 0);
        assert_eq!(depth[b], 7);
        *depth.entry(a) += 3;
        assert_eq!(depth[a], 3);
    }

    #[test]
    fn test_bit_set_insert_reports_novelty() {
        let mut set = BitSet::new();
        assert!(set.insert(65));
        assert!(!set.insert(65));
        assert!(set.contains(65));
        assert!(!set.contains(64));
        assert!(set.remove(65));
        assert!(!set.remove(65));
        assert!(set.is_empty());
    }

    #[test]
    fn test_bit_set_iter_sorted() {
        let mut set = BitSet::with_capacity(10);
        for i in [100, 3, 64, 0] {
            set.insert(i);
        }
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 3, 64, 100]);
        assert_eq!(set.count(), 4);
    }
}
