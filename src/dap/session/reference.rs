//! Client visible references to frames, scopes and values.

use crate::engine::{FrameId, ValueId};
use std::collections::HashMap;

/// What a reference points to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    Frame(FrameId),
    Locals(FrameId),
    Statics(FrameId),
    Globals(FrameId),
    Registers(FrameId),
    Value(ValueId),
}

impl Container {
    /// Frame the container belongs to, [`None`] for values.
    pub fn frame(&self) -> Option<FrameId> {
        match self {
            Container::Frame(frame)
            | Container::Locals(frame)
            | Container::Statics(frame)
            | Container::Globals(frame)
            | Container::Registers(frame) => Some(*frame),
            Container::Value(_) => None,
        }
    }
}

type Key = (Option<i64>, String);

/// Reference allocator.
///
/// A reference is identified by its parent reference and a key unique among siblings. Between
/// two [`ReferenceTree::clear`] calls the mapping never changes, after a clear a pair that
/// shows up again gets back the reference it had right before the clear.
pub struct ReferenceTree<V> {
    next: i64,
    nodes: HashMap<i64, V>,
    current: HashMap<Key, i64>,
    previous: HashMap<Key, i64>,
}

impl<V> ReferenceTree<V> {
    pub fn new(base: i64) -> Self {
        Self {
            next: base,
            nodes: HashMap::new(),
            current: HashMap::new(),
            previous: HashMap::new(),
        }
    }

    /// Bind `value` to `(parent, key)` and return its reference.
    pub fn insert(&mut self, parent: Option<i64>, key: impl Into<String>, value: V) -> i64 {
        let key = (parent, key.into());
        let reference = match self
            .current
            .get(&key)
            .or_else(|| self.previous.get(&key))
        {
            Some(reference) => *reference,
            None => {
                let reference = self.next;
                self.next += 1;
                reference
            }
        };
        self.current.insert(key, reference);
        self.nodes.insert(reference, value);
        reference
    }

    pub fn get(&self, reference: i64) -> Option<&V> {
        self.nodes.get(&reference)
    }

    /// Forget every reference, remember the bindings for the next generation.
    pub fn clear(&mut self) {
        self.previous = std::mem::take(&mut self.current);
        self.nodes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reuse_across_clear() {
        let mut tree = ReferenceTree::new(1000);
        let frame = tree.insert(None, "frame:1:0", "frame");
        let locals = tree.insert(Some(frame), "locals", "locals");
        assert_eq!((frame, locals), (1000, 1001));

        tree.clear();
        assert!(tree.get(frame).is_none());

        let locals_again = tree.insert(Some(frame), "locals", "locals #2");
        let frame_again = tree.insert(None, "frame:1:0", "frame #2");
        assert_eq!(locals_again, locals);
        assert_eq!(frame_again, frame);
        assert_eq!(tree.get(locals), Some(&"locals #2"));
    }

    #[test]
    fn test_orphans_never_come_back() {
        let mut tree = ReferenceTree::new(1);
        let a = tree.insert(None, "a", ());
        tree.clear();
        let b = tree.insert(None, "b", ());
        tree.clear();
        tree.clear();
        let a_late = tree.insert(None, "a", ());

        assert_ne!(a, b);
        // `a` skipped a generation, it gets a new reference
        assert_ne!(a_late, a);
        assert_ne!(a_late, b);
    }

    #[test]
    fn test_same_pair_within_generation() {
        let mut tree = ReferenceTree::new(1000);
        let first = tree.insert(Some(7), "x", 1);
        let second = tree.insert(Some(7), "x", 2);
        let other_parent = tree.insert(Some(8), "x", 3);

        assert_eq!(first, second);
        assert_ne!(first, other_parent);
        assert_eq!(tree.get(first), Some(&2));
    }
}
