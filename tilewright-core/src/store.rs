//! Append-only keyed stores backed by sorted parallel arrays.
//!
//! OSM extracts emit element identifiers in ascending order per entity
//! type, so the stores accept keys only at the sorted end of the key
//! array and answer lookups by binary search. The ordering contract is
//! enforced at the API boundary; downstream code relies on it.

use thiserror::Error;

/// Errors raised by the keyed stores.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The requested key is not present.
    #[error("key {key} not found")]
    NotFound {
        /// Key that was looked up.
        key: u64,
    },
    /// An insert did not extend the sorted end of the key array.
    #[error("key {key} does not extend the store (boundary key {boundary})")]
    OutOfOrder {
        /// Key that was rejected.
        key: u64,
        /// Key at the violated end of the store.
        boundary: u64,
    },
}

/// Keys must be plain ordered integers that widen losslessly to `u64`
/// for error reporting.
pub trait StoreKey: Copy + Ord + Into<u64> {}

impl<K: Copy + Ord + Into<u64>> StoreKey for K {}

/// Single-value store: one value per key.
#[derive(Debug, Clone)]
pub struct KeyedVec<K, V> {
    keys: Vec<K>,
    values: Vec<V>,
}

impl<K, V> Default for KeyedVec<K, V> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<K: StoreKey, V> KeyedVec<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the value stored under `key`.
    pub fn lookup(&self, key: K) -> Result<&V, StoreError> {
        match self.keys.binary_search(&key) {
            Ok(rank) => Ok(&self.values[rank]),
            Err(_) => Err(StoreError::NotFound { key: key.into() }),
        }
    }

    /// Return 1 if `key` is present, 0 otherwise. Named for parity with
    /// the multiset cardinality convention used across the stores.
    pub fn contains(&self, key: K) -> usize {
        usize::from(self.keys.binary_search(&key).is_ok())
    }

    /// Insert `(key, value)`. `key` must be strictly greater than every
    /// previously inserted key; the store is unchanged on failure.
    pub fn append(&mut self, key: K, value: V) -> Result<(), StoreError> {
        if let Some(&last) = self.keys.last() {
            if key <= last {
                return Err(StoreError::OutOfOrder {
                    key: key.into(),
                    boundary: last.into(),
                });
            }
        }
        self.keys.push(key);
        self.values.push(value);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// List-valued store: an ordered value sequence per key.
///
/// Three parallel arrays: sorted keys, offsets (prefix sums into the
/// flattened values, with a leading zero so rank `r` owns
/// `values[offsets[r]..offsets[r + 1]]`), and the values themselves.
#[derive(Debug, Clone)]
pub struct IndexedVec<K, V> {
    keys: Vec<K>,
    offsets: Vec<usize>,
    values: Vec<V>,
}

impl<K, V> Default for IndexedVec<K, V> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            offsets: vec![0],
            values: Vec::new(),
        }
    }
}

impl<K: StoreKey, V: Clone> IndexedVec<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the value sequence stored under `key`.
    pub fn lookup(&self, key: K) -> Result<&[V], StoreError> {
        match self.keys.binary_search(&key) {
            Ok(rank) => Ok(&self.values[self.offsets[rank]..self.offsets[rank + 1]]),
            Err(_) => Err(StoreError::NotFound { key: key.into() }),
        }
    }

    /// Return 1 if `key` is present, 0 otherwise.
    pub fn contains(&self, key: K) -> usize {
        usize::from(self.keys.binary_search(&key).is_ok())
    }

    /// Insert `(key, values)` at the ascending end. `key` must be
    /// strictly greater than every previously appended key.
    pub fn append(&mut self, key: K, values: &[V]) -> Result<(), StoreError> {
        if let Some(&last) = self.keys.last() {
            if key <= last {
                return Err(StoreError::OutOfOrder {
                    key: key.into(),
                    boundary: last.into(),
                });
            }
        }
        self.keys.push(key);
        self.values.extend_from_slice(values);
        self.offsets.push(self.values.len());
        Ok(())
    }

    /// Insert `(key, values)` at the descending end. `key` must be
    /// strictly smaller than every previously inserted key, which keeps
    /// the key array sorted for lookup.
    pub fn prepend(&mut self, key: K, values: &[V]) -> Result<(), StoreError> {
        if let Some(&first) = self.keys.first() {
            if key >= first {
                return Err(StoreError::OutOfOrder {
                    key: key.into(),
                    boundary: first.into(),
                });
            }
        }
        self.keys.insert(0, key);
        self.values.splice(0..0, values.iter().cloned());
        for offset in &mut self.offsets {
            *offset += values.len();
        }
        self.offsets.insert(0, 0);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.offsets.clear();
        self.offsets.push(0);
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_vec_round_trips_ascending_inserts() {
        let mut store: KeyedVec<u64, &str> = KeyedVec::new();
        store.append(3, "three").unwrap();
        store.append(7, "seven").unwrap();
        store.append(40, "forty").unwrap();

        assert_eq!(store.lookup(3), Ok(&"three"));
        assert_eq!(store.lookup(7), Ok(&"seven"));
        assert_eq!(store.lookup(40), Ok(&"forty"));
        assert_eq!(store.contains(7), 1);
        assert_eq!(store.contains(8), 0);
        assert_eq!(store.lookup(8), Err(StoreError::NotFound { key: 8 }));
    }

    #[test]
    fn keyed_vec_rejects_non_ascending_keys_without_mutating() {
        let mut store: KeyedVec<u64, u8> = KeyedVec::new();
        store.append(5, 1).unwrap();

        assert_eq!(
            store.append(5, 2),
            Err(StoreError::OutOfOrder { key: 5, boundary: 5 })
        );
        assert_eq!(
            store.append(4, 2),
            Err(StoreError::OutOfOrder { key: 4, boundary: 5 })
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(5), Ok(&1));
    }

    #[test]
    fn keyed_vec_clear_resets_the_ordering_boundary() {
        let mut store: KeyedVec<u64, u8> = KeyedVec::new();
        store.append(9, 0).unwrap();
        store.clear();

        assert!(store.is_empty());
        store.append(1, 7).unwrap();
        assert_eq!(store.lookup(1), Ok(&7));
    }

    #[test]
    fn indexed_vec_returns_the_exact_value_slices() {
        let mut store: IndexedVec<u32, u64> = IndexedVec::new();
        store.append(2, &[10, 11]).unwrap();
        store.append(5, &[]).unwrap();
        store.append(9, &[20, 21, 22]).unwrap();

        assert_eq!(store.lookup(2), Ok(&[10, 11][..]));
        assert_eq!(store.lookup(5), Ok(&[][..]));
        assert_eq!(store.lookup(9), Ok(&[20, 21, 22][..]));
        assert_eq!(store.contains(5), 1);
        assert_eq!(store.contains(6), 0);
    }

    #[test]
    fn indexed_vec_rejects_out_of_order_appends() {
        let mut store: IndexedVec<u32, u64> = IndexedVec::new();
        store.append(4, &[1]).unwrap();

        assert_eq!(
            store.append(3, &[2]),
            Err(StoreError::OutOfOrder { key: 3, boundary: 4 })
        );
        assert_eq!(store.lookup(4), Ok(&[1][..]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn indexed_vec_prepend_accepts_descending_keys_only() {
        let mut store: IndexedVec<u32, u32> = IndexedVec::new();
        store.prepend(90, &[1, 2]).unwrap();
        store.prepend(80, &[3]).unwrap();
        store.prepend(70, &[]).unwrap();

        assert_eq!(store.lookup(90), Ok(&[1, 2][..]));
        assert_eq!(store.lookup(80), Ok(&[3][..]));
        assert_eq!(store.lookup(70), Ok(&[][..]));
        assert_eq!(
            store.prepend(85, &[4]),
            Err(StoreError::OutOfOrder {
                key: 85,
                boundary: 70
            })
        );
        assert_eq!(store.len(), 3);
    }
}
