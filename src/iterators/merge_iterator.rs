use std::cmp::Ordering;
use std::sync::Arc;

use crate::comparator::Comparator;
use crate::error::Result;

use super::{EmptyIterator, StorageIterator};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

/// K-way merge over independently ordered child cursors, yielding one
/// globally ordered view in either direction.
///
/// A small wrapper array beats a heap here: child counts are tiny, and
/// switching direction requires re-seeking every non-current child anyway.
/// On equal keys the child with the smaller index wins, which gives overlay
/// sources a stable precedence.
pub struct MergeIterator {
    comparator: Arc<dyn Comparator>,
    children: Vec<Box<dyn StorageIterator>>,
    /// Index of the child the cursor currently reads through; `None` means
    /// invalid.
    current: Option<usize>,
    direction: Direction,
}

/// Builds a merging cursor. Degenerate child counts skip the wrapper: no
/// children yields an empty cursor and a single child is returned as-is.
pub fn new_merge_iterator(
    comparator: Arc<dyn Comparator>,
    mut children: Vec<Box<dyn StorageIterator>>,
) -> Box<dyn StorageIterator> {
    match children.len() {
        0 => Box::new(EmptyIterator::new()),
        1 => children.pop().unwrap(),
        _ => Box::new(MergeIterator {
            comparator,
            children,
            current: None,
            direction: Direction::Forward,
        }),
    }
}

impl MergeIterator {
    fn find_smallest(&mut self) {
        let mut smallest: Option<usize> = None;
        for i in 0..self.children.len() {
            if !self.children[i].valid() {
                continue;
            }
            match smallest {
                None => smallest = Some(i),
                Some(s) => {
                    if self
                        .comparator
                        .compare(self.children[i].key(), self.children[s].key())
                        == Ordering::Less
                    {
                        smallest = Some(i);
                    }
                }
            }
        }
        self.current = smallest;
    }

    fn find_largest(&mut self) {
        let mut largest: Option<usize> = None;
        for i in (0..self.children.len()).rev() {
            if !self.children[i].valid() {
                continue;
            }
            match largest {
                None => largest = Some(i),
                Some(l) => {
                    if self
                        .comparator
                        .compare(self.children[i].key(), self.children[l].key())
                        == Ordering::Greater
                    {
                        largest = Some(i);
                    }
                }
            }
        }
        self.current = largest;
    }
}

impl StorageIterator for MergeIterator {
    fn valid(&self) -> bool {
        self.current.is_some_and(|i| self.children[i].valid())
    }

    fn seek_to_first(&mut self) {
        for child in &mut self.children {
            child.seek_to_first();
        }
        self.find_smallest();
        self.direction = Direction::Forward;
    }

    fn seek_to_last(&mut self) {
        for child in &mut self.children {
            child.seek_to_last();
        }
        self.find_largest();
        self.direction = Direction::Reverse;
    }

    fn seek(&mut self, target: &[u8]) {
        for child in &mut self.children {
            child.seek(target);
        }
        self.find_smallest();
        self.direction = Direction::Forward;
    }

    fn next(&mut self) {
        let current = self.current.expect("next() on invalid cursor");

        // After a reverse scan the non-current children sit before key();
        // move each to the first entry after it so that `current` is again
        // the global minimum.
        if self.direction != Direction::Forward {
            let key = self.children[current].key().to_vec();
            for i in 0..self.children.len() {
                if i == current {
                    continue;
                }
                let child = &mut self.children[i];
                child.seek(&key);
                if child.valid() && self.comparator.compare(&key, child.key()) == Ordering::Equal {
                    child.next();
                }
            }
            self.direction = Direction::Forward;
        }

        self.children[current].next();
        self.find_smallest();
    }

    fn prev(&mut self) {
        let current = self.current.expect("prev() on invalid cursor");

        // Mirror image of next(): park every non-current child on the last
        // entry strictly before key().
        if self.direction != Direction::Reverse {
            let key = self.children[current].key().to_vec();
            for i in 0..self.children.len() {
                if i == current {
                    continue;
                }
                let child = &mut self.children[i];
                child.seek(&key);
                if child.valid() {
                    // Child sits at the first entry >= key(); step back.
                    child.prev();
                } else {
                    // No entries >= key(): its last entry precedes key().
                    child.seek_to_last();
                }
            }
            self.direction = Direction::Reverse;
        }

        self.children[current].prev();
        self.find_largest();
    }

    fn key(&self) -> &[u8] {
        let current = self.current.expect("key() on invalid cursor");
        self.children[current].key()
    }

    fn value(&self) -> &[u8] {
        let current = self.current.expect("value() on invalid cursor");
        self.children[current].value()
    }

    fn status(&self) -> Result<()> {
        for child in &self.children {
            child.status()?;
        }
        Ok(())
    }
}
