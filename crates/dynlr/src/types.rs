//! Utility types.

use crate::grammar::TerminalID;
use bit_set::BitSet;
use std::{collections::VecDeque, hash::Hash};

type BuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;

pub type Map<K, V> = indexmap::IndexMap<K, V, BuildHasher>;
pub type Set<T> = indexmap::IndexSet<T, BuildHasher>;

/// A FIFO work queue that ignores values already waiting in it.
#[derive(Debug)]
pub struct Queue<T> {
    queue: VecDeque<T>,
    pending: Set<T>,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            pending: Set::default(),
        }
    }
}

impl<T> Queue<T>
where
    T: Clone + Eq + Hash,
{
    pub fn push(&mut self, value: T) -> bool {
        let added = self.pending.insert(value.clone());
        if added {
            self.queue.push_back(value);
        }
        added
    }

    pub fn pop(&mut self) -> Option<T> {
        let value = self.queue.pop_front()?;
        self.pending.swap_remove(&value);
        Some(value)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T> FromIterator<T> for Queue<T>
where
    T: Clone + Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut queue = Self::default();
        for value in iter {
            queue.push(value);
        }
        queue
    }
}

/// A set of terminal symbols.
#[derive(Debug, Clone, Default)]
pub struct TerminalSet {
    bits: BitSet,
}

impl PartialEq for TerminalSet {
    fn eq(&self, other: &Self) -> bool {
        self.bits.iter().eq(other.bits.iter())
    }
}

impl Eq for TerminalSet {}

impl Hash for TerminalSet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for raw in self.bits.iter() {
            raw.hash(state);
        }
    }
}

impl TerminalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, terminal: TerminalID) -> bool {
        self.bits.insert(terminal.into_raw().into())
    }

    pub fn contains(&self, terminal: TerminalID) -> bool {
        self.bits.contains(terminal.into_raw().into())
    }

    /// Add every element of `other`, returning whether this set grew.
    pub fn union_with(&mut self, other: &Self) -> bool {
        let before = self.bits.len();
        self.bits.union_with(&other.bits);
        self.bits.len() != before
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.bits.is_subset(&other.bits)
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Iterate over the terminals in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = TerminalID> + '_ {
        self.bits
            .iter()
            .filter_map(|raw| u16::try_from(raw).ok())
            .map(TerminalID::from_raw)
    }
}

impl FromIterator<TerminalID> for TerminalSet {
    fn from_iter<I: IntoIterator<Item = TerminalID>>(iter: I) -> Self {
        let mut set = Self::new();
        for terminal in iter {
            set.insert(terminal);
        }
        set
    }
}

impl Extend<TerminalID> for TerminalSet {
    fn extend<I: IntoIterator<Item = TerminalID>>(&mut self, iter: I) {
        for terminal in iter {
            self.insert(terminal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_skips_pending_duplicates() {
        let mut queue: Queue<u32> = [1, 2, 1, 3].into_iter().collect();
        assert_eq!(queue.pop(), Some(1));
        assert!(queue.push(1));
        assert!(!queue.push(2));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), Some(1));
        assert!(queue.is_empty());
    }

    #[test]
    fn terminal_set_union() {
        let t = TerminalID::from_raw;
        let mut a: TerminalSet = [t(1), t(3)].into_iter().collect();
        let b: TerminalSet = [t(3), t(5)].into_iter().collect();
        assert!(!b.is_subset(&a));
        assert!(a.union_with(&b));
        assert!(!a.union_with(&b));
        assert!(b.is_subset(&a));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![t(1), t(3), t(5)]);
    }
}
