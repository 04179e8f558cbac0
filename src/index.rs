// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-RAM key descriptor index.
//!
//! Fixed-capacity, unordered. Keys are identified by a 32-bit hash of
//! their bytes; collisions are resolved by the caller comparing the key
//! bytes stored on flash, so the index itself never holds key material.

/// Computes the hash value corresponding to a particular key.
pub(crate) fn hash_key(key: &[u8]) -> u32 {
    const KEY_HASH_KEY: u64 = 0;

    use core::hash::{Hash, Hasher};

    let mut hasher = fnv::FnvHasher::with_key(KEY_HASH_KEY);
    key.hash(&mut hasher);
    let h = hasher.finish();
    h as u32 ^ (h >> 32) as u32
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum KeyState {
    /// The descriptor's entry holds the key's current value.
    Valid,
    /// The descriptor's entry is a tombstone.
    Deleted,
}

/// One key's worth of index state.
#[derive(Copy, Clone, Debug)]
pub(crate) struct KeyDescriptor {
    pub key_hash: u32,
    /// Transaction id of the entry at `address`.
    pub transaction_id: u32,
    /// Partition address of the key's current entry.
    pub address: u32,
    pub state: KeyState,
}

pub(crate) struct KeyIndex<const MAX_ENTRIES: usize> {
    slots: [KeyDescriptor; MAX_ENTRIES],
    len: usize,
}

impl<const MAX_ENTRIES: usize> KeyIndex<MAX_ENTRIES> {
    const EMPTY: KeyDescriptor = KeyDescriptor {
        key_hash: 0,
        transaction_id: 0,
        address: 0,
        state: KeyState::Deleted,
    };

    pub fn new() -> Self {
        Self {
            slots: [Self::EMPTY; MAX_ENTRIES],
            len: 0,
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Number of occupied slots, tombstone descriptors included.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_full(&self) -> bool {
        self.len == MAX_ENTRIES
    }

    /// Number of keys currently present (not deleted).
    pub fn valid_count(&self) -> usize {
        self.iter().filter(|d| d.state == KeyState::Valid).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyDescriptor> {
        self.slots[..self.len].iter()
    }

    pub fn get(&self, slot: usize) -> &KeyDescriptor {
        &self.slots[slot]
    }

    pub fn get_mut(&mut self, slot: usize) -> &mut KeyDescriptor {
        &mut self.slots[slot]
    }

    /// Appends a descriptor, returning its slot, or `None` when full.
    pub fn insert(&mut self, descriptor: KeyDescriptor) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        let slot = self.len;
        self.slots[slot] = descriptor;
        self.len += 1;
        Some(slot)
    }

    /// Removes a slot by swapping the last descriptor into its place.
    /// Slot numbers of other descriptors may change.
    pub fn remove(&mut self, slot: usize) {
        debug_assert!(slot < self.len);
        self.len -= 1;
        self.slots[slot] = self.slots[self.len];
    }

    /// Finds the slot whose descriptor matches `key_hash` and whose
    /// on-flash key bytes satisfy `matches` (supplied by the caller,
    /// since the index cannot read flash itself).
    pub fn find<E>(
        &self,
        key_hash: u32,
        mut matches: impl FnMut(&KeyDescriptor) -> Result<bool, E>,
    ) -> Result<Option<usize>, E> {
        for (slot, d) in self.slots[..self.len].iter().enumerate() {
            if d.key_hash == key_hash && matches(d)? {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    /// Finds the slot pointing at exactly `address`, if any. Used by
    /// garbage collection to decide whether a scanned entry is live.
    pub fn find_by_address(&self, address: u32) -> Option<usize> {
        self.slots[..self.len]
            .iter()
            .position(|d| d.address == address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(hash: u32, address: u32) -> KeyDescriptor {
        KeyDescriptor {
            key_hash: hash,
            transaction_id: 1,
            address,
            state: KeyState::Valid,
        }
    }

    #[test]
    fn insert_until_full() {
        let mut index = KeyIndex::<3>::new();
        assert_eq!(index.insert(descriptor(1, 10)), Some(0));
        assert_eq!(index.insert(descriptor(2, 20)), Some(1));
        assert_eq!(index.insert(descriptor(3, 30)), Some(2));
        assert!(index.is_full());
        assert_eq!(index.insert(descriptor(4, 40)), None);
    }

    #[test]
    fn find_resolves_hash_collisions_via_callback() {
        let mut index = KeyIndex::<4>::new();
        index.insert(descriptor(7, 10));
        index.insert(descriptor(7, 20));

        // The "flash compare" only accepts the entry at address 20.
        let found = index
            .find(7, |d| Ok::<bool, ()>(d.address == 20))
            .expect("callback is infallible here");
        assert_eq!(found, Some(1));

        let missing = index
            .find(7, |d| Ok::<bool, ()>(d.address == 99))
            .expect("callback is infallible here");
        assert_eq!(missing, None);
    }

    #[test]
    fn find_propagates_callback_errors() {
        let mut index = KeyIndex::<4>::new();
        index.insert(descriptor(7, 10));
        let result: Result<Option<usize>, &str> = index.find(7, |_| Err("flash died"));
        assert_eq!(result, Err("flash died"));
    }

    #[test]
    fn remove_swaps_last_into_place() {
        let mut index = KeyIndex::<4>::new();
        index.insert(descriptor(1, 10));
        index.insert(descriptor(2, 20));
        index.insert(descriptor(3, 30));

        index.remove(0);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(0).address, 30);
        assert_eq!(index.get(1).address, 20);
    }

    #[test]
    fn valid_count_ignores_tombstones() {
        let mut index = KeyIndex::<4>::new();
        index.insert(descriptor(1, 10));
        let slot = index.insert(descriptor(2, 20)).unwrap();
        index.get_mut(slot).state = KeyState::Deleted;
        assert_eq!(index.len(), 2);
        assert_eq!(index.valid_count(), 1);
    }

    #[test]
    fn hash_is_stable_and_length_sensitive() {
        assert_eq!(hash_key(b"the_key"), hash_key(b"the_key"));
        assert_ne!(hash_key(b"the_key"), hash_key(b"the_key2"));
        assert_ne!(hash_key(b"a"), hash_key(b"b"));
    }
}
