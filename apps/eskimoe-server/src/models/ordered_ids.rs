use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An ordered list of child ids owned by a parent record: rooms in a
/// category, or categories and roles in the server.
///
/// Ids are unique within the list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderedIds(Vec<i32>);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReorderError {
    #[error("order must list {expected} ids, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("id {0} is listed more than once")]
    Duplicate(i32),
    #[error("id {0} is not part of this order")]
    Unknown(i32),
}

impl OrderedIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `id`. Returns false if it was already present.
    pub fn push(&mut self, id: i32) -> bool {
        if self.contains(id) {
            return false;
        }
        self.0.push(id);
        true
    }

    /// Inserts `id` at `index`, or appends when the index is past the end.
    /// Returns false if it was already present.
    pub fn insert(&mut self, index: usize, id: i32) -> bool {
        if self.contains(id) {
            return false;
        }
        let index = index.min(self.0.len());
        self.0.insert(index, id);
        true
    }

    /// Removes `id`. Returns false if it was not present.
    pub fn remove(&mut self, id: i32) -> bool {
        match self.position(id) {
            Some(index) => {
                self.0.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: i32) -> bool {
        self.0.contains(&id)
    }

    pub fn position(&self, id: i32) -> Option<usize> {
        self.0.iter().position(|x| *x == id)
    }

    /// Validates that `proposed` is a permutation of the current ids and
    /// returns it as the new order.
    pub fn reorder(&self, proposed: Vec<i32>) -> Result<OrderedIds, ReorderError> {
        if proposed.len() != self.0.len() {
            return Err(ReorderError::WrongLength {
                expected: self.0.len(),
                actual: proposed.len(),
            });
        }
        let mut seen = Vec::with_capacity(proposed.len());
        for id in &proposed {
            if !self.contains(*id) {
                return Err(ReorderError::Unknown(*id));
            }
            if seen.contains(id) {
                return Err(ReorderError::Duplicate(*id));
            }
            seen.push(*id);
        }
        Ok(Self(proposed))
    }

    /// Sorts `items` by this order; items whose id is absent go last, by id.
    pub fn sort_by_order<T>(&self, items: &mut [T], id_of: impl Fn(&T) -> i32) {
        items.sort_by_key(|item| {
            let id = id_of(item);
            (self.position(id).unwrap_or(usize::MAX), id)
        });
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<i32>> for OrderedIds {
    fn from(ids: Vec<i32>) -> Self {
        let mut order = Self::new();
        for id in ids {
            order.push(id);
        }
        order
    }
}

impl From<OrderedIds> for Vec<i32> {
    fn from(order: OrderedIds) -> Self {
        order.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_remove_keep_ids_unique() {
        let mut order = OrderedIds::new();
        assert!(order.push(3));
        assert!(order.push(1));
        assert!(!order.push(3));
        assert_eq!(order.as_slice(), &[3, 1]);
        assert!(order.remove(3));
        assert!(!order.remove(3));
        assert_eq!(order.as_slice(), &[1]);
    }

    #[test]
    fn insert_clamps_to_the_end() {
        let mut order = OrderedIds::from(vec![1, 2]);
        assert!(order.insert(1, 9));
        assert!(order.insert(40, 7));
        assert!(!order.insert(0, 2));
        assert_eq!(order.as_slice(), &[1, 9, 2, 7]);
    }

    #[test]
    fn from_vec_drops_duplicates() {
        let order = OrderedIds::from(vec![2, 2, 5]);
        assert_eq!(order.as_slice(), &[2, 5]);
    }

    #[test]
    fn reorder_accepts_permutation() {
        let order = OrderedIds::from(vec![1, 2, 3]);
        let next = order.reorder(vec![3, 1, 2]).unwrap();
        assert_eq!(next.as_slice(), &[3, 1, 2]);
    }

    #[test]
    fn reorder_rejects_non_permutations() {
        let order = OrderedIds::from(vec![1, 2, 3]);
        assert_eq!(
            order.reorder(vec![1, 2]),
            Err(ReorderError::WrongLength {
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(order.reorder(vec![1, 2, 4]), Err(ReorderError::Unknown(4)));
        assert_eq!(order.reorder(vec![1, 1, 2]), Err(ReorderError::Duplicate(1)));
    }

    #[test]
    fn sort_by_order_puts_unknown_last() {
        let order = OrderedIds::from(vec![7, 2]);
        let mut items = vec![9, 2, 7, 4];
        order.sort_by_order(&mut items, |x| *x);
        assert_eq!(items, vec![7, 2, 4, 9]);
    }
}
