use std::cmp::Ordering;
use std::mem;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::comparator::Comparator;
use crate::error::Result;
use crate::iterator::StorageIterator;

/// Maximum height of the skip list. LevelDB uses 12.
pub const MAX_HEIGHT: usize = 12;

/// Each level is populated with probability 1/BRANCHING.
const BRANCHING: u32 = 4;

/// Arena index of the head sentinel.
const HEAD: usize = 0;

/// A single node in the skip list.
///
/// Each node has `height` forward links. Level 0 contains all nodes
/// (a regular linked list). Higher levels skip over nodes, enabling
/// O(log n) average-case search.
///
/// ```text
/// Level 3:  HEAD ──────────────────────────────► 50 ──────────► NIL
/// Level 2:  HEAD ──────────► 20 ────────────────► 50 ──────────► NIL
/// Level 1:  HEAD ──► 10 ──► 20 ────► 35 ────────► 50 ──► 60 ──► NIL
/// Level 0:  HEAD ──► 10 ──► 20 ──► 25 ──► 35 ──► 50 ──► 60 ──► 70 ► NIL
/// ```
///
/// Links are indices into the arena. Nodes are only ever appended, so an
/// index handed out stays valid for the life of the list.
struct SkipNode {
    key: Vec<u8>,
    value: Vec<u8>,
    forward: Vec<Option<usize>>,
}

/// A probabilistic sorted data structure.
///
/// Average case: O(log n) insert, O(log n) lookup, O(n) iteration.
/// Worst case: O(n), but astronomically unlikely with random level assignment.
pub struct SkipList {
    cmp: Arc<dyn Comparator>,
    nodes: Vec<SkipNode>,
    height: usize,
    len: usize,
    size_bytes: usize,
    rng: StdRng,
}

impl SkipList {
    /// Create a new empty skip list ordered by `cmp`.
    pub fn new(cmp: Arc<dyn Comparator>) -> Self {
        let head = SkipNode {
            key: Vec::new(),
            value: Vec::new(),
            forward: vec![None; MAX_HEIGHT],
        };
        SkipList {
            cmp,
            nodes: vec![head],
            height: 1,
            len: 0,
            size_bytes: 0,
            rng: StdRng::seed_from_u64(0xdead_beef),
        }
    }

    /// Insert a key-value pair. Existing entries are never modified: if the
    /// key is already present nothing happens and `false` is returned.
    ///
    /// Algorithm:
    ///   1. Find the insertion point at each level (track predecessors)
    ///   2. Generate a random height for the new node
    ///   3. Append the node to the arena
    ///   4. Splice it into the list at each level up to its height
    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) -> bool {
        let mut prev = [HEAD; MAX_HEIGHT];
        let found = self.find_greater_or_equal(&key, Some(&mut prev));
        if let Some(idx) = found {
            if self.cmp.compare(&self.nodes[idx].key, &key) == Ordering::Equal {
                return false;
            }
        }

        let height = self.random_height();
        if height > self.height {
            for p in prev.iter_mut().take(height).skip(self.height) {
                *p = HEAD;
            }
            self.height = height;
        }

        let new_idx = self.nodes.len();
        let mut forward = vec![None; height];
        for (level, link) in forward.iter_mut().enumerate() {
            *link = self.nodes[prev[level]].forward[level];
        }
        self.size_bytes += key.len()
            + value.len()
            + height * mem::size_of::<Option<usize>>()
            + mem::size_of::<SkipNode>();
        self.nodes.push(SkipNode {
            key,
            value,
            forward,
        });
        for (level, &p) in prev.iter().enumerate().take(height) {
            self.nodes[p].forward[level] = Some(new_idx);
        }
        self.len += 1;
        true
    }

    /// Look up a key. Returns the value if an equal key is present.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let idx = self.find_greater_or_equal(key, None)?;
        let node = &self.nodes[idx];
        if self.cmp.compare(&node.key, key) == Ordering::Equal {
            Some(&node.value)
        } else {
            None
        }
    }

    /// Start at head, highest level; move forward while next key < target;
    /// drop down one level; repeat until level 0.
    fn find_greater_or_equal(
        &self,
        key: &[u8],
        mut prev: Option<&mut [usize; MAX_HEIGHT]>,
    ) -> Option<usize> {
        let mut x = HEAD;
        let mut level = self.height - 1;
        loop {
            let next = self.nodes[x].forward[level];
            match next {
                Some(n) if self.cmp.compare(&self.nodes[n].key, key) == Ordering::Less => {
                    x = n;
                }
                _ => {
                    if let Some(p) = prev.as_deref_mut() {
                        p[level] = x;
                    }
                    if level == 0 {
                        return next;
                    }
                    level -= 1;
                }
            }
        }
    }

    /// Arena index of the first node with key >= target.
    pub fn seek_index(&self, key: &[u8]) -> Option<usize> {
        self.find_greater_or_equal(key, None)
    }

    /// Arena index of the first node.
    pub fn first_index(&self) -> Option<usize> {
        self.nodes[HEAD].forward[0]
    }

    /// Arena index of the node after `idx` on level 0.
    pub fn next_index(&self, idx: usize) -> Option<usize> {
        self.nodes[idx].forward[0]
    }

    pub fn entry(&self, idx: usize) -> (&[u8], &[u8]) {
        let node = &self.nodes[idx];
        (&node.key, &node.value)
    }

    /// Number of entries in the skip list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the skip list is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Approximate memory usage in bytes.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Create an iterator over all entries in sorted order.
    pub fn iter(&self) -> SkipListIterator<'_> {
        SkipListIterator {
            list: self,
            current: self.first_index(),
        }
    }

    fn random_height(&mut self) -> usize {
        let mut height = 1;
        while height < MAX_HEIGHT && self.rng.gen_ratio(1, BRANCHING) {
            height += 1;
        }
        height
    }
}

/// Iterator over skip list entries in sorted order.
///
/// Simply follows level 0 forward links: level 0 is a sorted linked list
/// containing every entry.
pub struct SkipListIterator<'a> {
    list: &'a SkipList,
    current: Option<usize>,
}

impl<'a> StorageIterator for SkipListIterator<'a> {
    fn key(&self) -> &[u8] {
        self.current.map_or(&[][..], |i| self.list.entry(i).0)
    }

    fn value(&self) -> &[u8] {
        self.current.map_or(&[][..], |i| self.list.entry(i).1)
    }

    fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    fn next(&mut self) -> Result<()> {
        if let Some(i) = self.current {
            self.current = self.list.next_index(i);
        }
        Ok(())
    }

    fn seek(&mut self, key: &[u8]) -> Result<()> {
        self.current = self.list.seek_index(key);
        Ok(())
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.current = self.list.first_index();
        Ok(())
    }
}
