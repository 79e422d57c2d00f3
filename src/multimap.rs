//! An ordered, multi-valued map used for headers, query parameters and
//! path parameters.
//!
//! Keys are ordered by a caller-supplied comparator (case-sensitive
//! `Ord` for `String` keys in practice); lookup is `O(log N)` via binary
//! search over a sorted backing `Vec`. Values under the same key keep
//! their insertion order. Removing a key removes every value under it.

use std::cmp::Ordering;

/// A multi-valued map ordered by key.
///
/// Built incrementally with `insert`, which keeps the backing vector
/// sorted after every call (`O(N)` per insert); for bulk construction
/// prefer `MultiMapBuilder`, which defers sorting to a single `finish()`
/// call.
#[derive(Clone, Debug, Default)]
pub struct MultiMap<K, V> {
    entries: Vec<(K, V)>,
}

impl<K: Ord + Clone, V> MultiMap<K, V> {
    pub fn new() -> MultiMap<K, V> {
        MultiMap { entries: Vec::new() }
    }

    /// Inserts a value under `key`, preserving insertion order among
    /// values that already exist under the same key.
    pub fn insert(&mut self, key: K, value: V) {
        let insert_at = self.last_index_of(&key).map(|i| i + 1).unwrap_or_else(|| {
            self.entries
                .binary_search_by(|(k, _)| k.cmp(&key))
                .unwrap_or_else(|i| i)
        });
        self.entries.insert(insert_at, (key, value));
    }

    /// The first value associated with `key`, if any.
    pub fn get_first(&self, key: &K) -> Option<&V> {
        self.first_index_of(key).map(|i| &self.entries[i].1)
    }

    /// All values associated with `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &K) -> impl Iterator<Item = &'a V> + 'a {
        let range = self.index_range_of(key);
        range.map(move |i| &self.entries[i].1)
    }

    /// Removes every value associated with `key`. Returns how many were
    /// removed.
    pub fn remove_all(&mut self, key: &K) -> usize {
        let range = self.index_range_of(key);
        let (start, end) = match (range.clone().next(), range.last()) {
            (Some(start), Some(end)) => (start, end + 1),
            _ => return 0,
        };
        self.entries.drain(start..end);
        end - start
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.first_index_of(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(key, value)` pairs, grouped by key, values in
    /// insertion order within a key.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    fn first_index_of(&self, key: &K) -> Option<usize> {
        let mut idx = self.entries.binary_search_by(|(k, _)| k.cmp(key)).ok()?;
        while idx > 0 && self.entries[idx - 1].0 == *key {
            idx -= 1;
        }
        Some(idx)
    }

    fn last_index_of(&self, key: &K) -> Option<usize> {
        let mut idx = self.entries.binary_search_by(|(k, _)| k.cmp(key)).ok()?;
        while idx + 1 < self.entries.len() && self.entries[idx + 1].0 == *key {
            idx += 1;
        }
        Some(idx)
    }

    fn index_range_of(&self, key: &K) -> std::ops::Range<usize> {
        match self.first_index_of(key) {
            Some(start) => {
                let mut end = start;
                while end < self.entries.len() && self.entries[end].0 == *key {
                    end += 1;
                }
                start..end
            }
            None => 0..0,
        }
    }
}

impl<K: Ord + Clone + PartialEq, V> PartialEq for MultiMap<K, V>
where
    V: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

/// Builder form of `MultiMap`: `push` in any order, `finish()` sorts
/// once by key using a stable sort, which preserves insertion order
/// among equal keys.
pub struct MultiMapBuilder<K, V> {
    entries: Vec<(K, V)>,
}

impl<K: Ord, V> MultiMapBuilder<K, V> {
    pub fn new() -> MultiMapBuilder<K, V> {
        MultiMapBuilder { entries: Vec::new() }
    }

    pub fn push(&mut self, key: K, value: V) -> &mut Self {
        self.entries.push((key, value));
        self
    }

    pub fn finish(mut self) -> MultiMap<K, V>
    where
        K: Clone,
    {
        self.entries
            .sort_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        MultiMap { entries: self.entries }
    }
}

impl<K: Ord, V> Default for MultiMapBuilder<K, V> {
    fn default() -> Self {
        MultiMapBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order_within_a_key() {
        let mut map = MultiMap::new();
        map.insert("a".to_string(), 1);
        map.insert("a".to_string(), 2);
        map.insert("a".to_string(), 3);
        let values: Vec<_> = map.get_all(&"a".to_string()).copied().collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn groups_by_key_when_iterating() {
        let mut map = MultiMap::new();
        map.insert("b".to_string(), 1);
        map.insert("a".to_string(), 2);
        map.insert("b".to_string(), 3);
        let pairs: Vec<_> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), 2),
                ("b".to_string(), 1),
                ("b".to_string(), 3),
            ]
        );
    }

    #[test]
    fn remove_all_clears_every_value_under_a_key() {
        let mut map = MultiMap::new();
        map.insert("a".to_string(), 1);
        map.insert("a".to_string(), 2);
        map.insert("b".to_string(), 3);
        assert_eq!(map.remove_all(&"a".to_string()), 2);
        assert!(!map.contains_key(&"a".to_string()));
        assert!(map.contains_key(&"b".to_string()));
    }

    #[test]
    fn builder_defers_sort_and_keeps_stable_order() {
        let mut builder = MultiMapBuilder::new();
        builder.push("b", 1).push("a", 2).push("b", 3).push("a", 4);
        let map = builder.finish();
        assert_eq!(map.get_all(&"a").copied().collect::<Vec<_>>(), vec![2, 4]);
        assert_eq!(map.get_all(&"b").copied().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn get_first_returns_earliest_value() {
        let mut map = MultiMap::new();
        map.insert("a".to_string(), 10);
        map.insert("a".to_string(), 20);
        assert_eq!(map.get_first(&"a".to_string()), Some(&10));
    }
}
