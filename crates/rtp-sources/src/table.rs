//! Keyed source storage, generalized from the teacher's port/session
//! tables to hold one [`crate::record::SourceRecord`] per SSRC.

use std::ops::{Deref, DerefMut};

use ahash::{HashMap, HashMapExt};

/// Pre-sized wrapper around an `ahash` map, following the same rationale
/// as the teacher's session tables: avoid the default empty-capacity
/// allocation churn for a structure that is expected to hold entries
/// almost immediately.
pub struct Table<K, V>(HashMap<K, V>);

const DEFAULT_CAPACITY: usize = 32;

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self(HashMap::with_capacity(DEFAULT_CAPACITY))
    }
}

impl<K, V> AsRef<HashMap<K, V>> for Table<K, V> {
    fn as_ref(&self) -> &HashMap<K, V> {
        &self.0
    }
}

impl<K, V> Deref for Table<K, V> {
    type Target = HashMap<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<K, V> DerefMut for Table<K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
