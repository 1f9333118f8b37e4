//! Index map using unsigned integer indices to index
//! into vector of T. Pushing new values returns their
//! index. Removing elements is O(1), does not reallocate
//! and it does not change existing indices. Freed indices
//! are handed out again by later pushes.

use std::ops::{Index, IndexMut};

pub(crate) type Id = u32;

#[derive(Debug)]
pub(crate) struct Slab<T> {
    values: Vec<Option<T>>,
    empty: Vec<Id>,
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slab<T> {
    pub(crate) const fn new() -> Self {
        Self { values: Vec::new(), empty: Vec::new() }
    }

    pub(crate) fn push(&mut self, value: T) -> Id {
        if let Some(id) = self.empty.pop() {
            debug_assert!(self.values[id as usize].is_none());
            self.values[id as usize] = Some(value);
            id
        } else {
            let id = Id::try_from(self.values.len()).expect("slab capacity overflow");
            self.values.push(Some(value));
            id
        }
    }

    pub(crate) fn remove(&mut self, id: Id) -> Option<T> {
        let value = self.values.get_mut(id as usize)?.take();
        if value.is_some() {
            self.empty.push(id);
        }
        value
    }

    pub(crate) fn get(&self, id: Id) -> Option<&T> {
        self.values.get(id as usize)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        self.values.get_mut(id as usize)?.as_mut()
    }

    /// Number of live elements
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.values.len() - self.empty.len()
    }
}

impl<T> Index<Id> for Slab<T> {
    type Output = T;
    #[track_caller]
    fn index(&self, index: Id) -> &Self::Output {
        self.get(index).unwrap_or_else(|| panic!("slab index {index} is not occupied"))
    }
}

impl<T> IndexMut<Id> for Slab<T> {
    #[track_caller]
    fn index_mut(&mut self, index: Id) -> &mut Self::Output {
        self.get_mut(index).unwrap_or_else(|| panic!("slab index {index} is not occupied"))
    }
}

#[cfg(test)]
mod tests {
    use super::Slab;

    #[test]
    fn removed_ids_are_reused() {
        let mut slab = Slab::new();
        let a = slab.push("a");
        let b = slab.push("b");
        assert_eq!(slab.remove(a), Some("a"));
        assert_eq!(slab.remove(a), None);
        assert_eq!(slab.len(), 1);
        let c = slab.push("c");
        assert_eq!(c, a);
        assert_eq!(slab[b], "b");
        assert_eq!(slab[c], "c");
    }
}
