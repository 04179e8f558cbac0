// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The key-value store engine.
//!
//! A [`Store`] owns a flash [`Partition`] and two fixed-size RAM tables:
//! the key descriptor index (one slot per key, including tombstones) and
//! the sector table (write cursor and reclaimable-byte count per
//! sector). Every mutation appends a new entry; superseded entries stay
//! on flash as reclaimable bytes until garbage collection relocates the
//! survivors of their sector and erases it.
//!
//! Nothing but entries is ever stored: an erased partition is a valid,
//! empty store, and [`Store::init`] rebuilds all RAM state from a linear
//! scan of the entries alone.

use core::cell::RefCell;

use crate::checksum::Checksum;
use crate::entry::{self, HeaderOutcome, ParsedEntry, MAX_KEY_LENGTH, MAX_VALUE_LENGTH};
use crate::flash::{Flash, Partition};
use crate::index::{hash_key, KeyDescriptor, KeyIndex, KeyState};
use crate::sectors::SectorTable;
use crate::Error;

/// Crash-safe key-value store on a flash partition.
///
/// `MAX_ENTRIES` bounds the number of keys (tombstones included) and
/// `MAX_SECTORS` the number of partition sectors; both are compile-time
/// so the store performs no allocation.
///
/// Construction does not touch the flash; call [`Store::init`] before
/// anything else, and again at any point to force a rescan.
pub struct Store<F: Flash, C: Checksum, const MAX_ENTRIES: usize, const MAX_SECTORS: usize> {
    partition: Partition<F>,
    // RefCell so that read paths can stay `&self` while streaming
    // through the digest.
    checksum: RefCell<C>,
    checksum_size: usize,
    magic: u32,
    /// Entry alignment: the smallest 16-byte multiple satisfying the
    /// partition alignment.
    alignment: u32,
    index: KeyIndex<MAX_ENTRIES>,
    sectors: SectorTable<MAX_SECTORS>,
    /// Highest transaction id handed out so far.
    last_transaction_id: u32,
    initialized: bool,
}

impl<F: Flash, C: Checksum, const MAX_ENTRIES: usize, const MAX_SECTORS: usize>
    Store<F, C, MAX_ENTRIES, MAX_SECTORS>
{
    /// Creates a store over `partition` using the given per-deployment
    /// entry magic and checksum.
    ///
    /// Fails with `InvalidArgument` if the geometry cannot work: fewer
    /// than two sectors (the store always keeps one erased in reserve),
    /// more sectors than `MAX_SECTORS`, a sector size that is not a
    /// multiple of the entry alignment, or a sector too small to hold
    /// even a minimal entry.
    pub fn new(partition: Partition<F>, magic: u32, checksum: C) -> Result<Self, Error<F::Error>> {
        let checksum_size = checksum.size();
        let sector_size = partition.sector_size();
        let sector_count = partition.sector_count() as usize;
        let alignment = entry::entry_alignment_for(partition.alignment());

        if checksum_size > crate::checksum::MAX_CHECKSUM_LENGTH
            || magic == u32::MAX
            || sector_count < 2
            || sector_count > MAX_SECTORS
            || alignment as usize > entry::WRITE_CHUNK
            || sector_size % alignment != 0
            || entry::encoded_size(checksum_size, 1, 0, alignment) > sector_size
        {
            return Err(Error::InvalidArgument);
        }

        Ok(Self {
            sectors: SectorTable::new(sector_count, sector_size),
            partition,
            checksum: RefCell::new(checksum),
            checksum_size,
            magic,
            alignment,
            index: KeyIndex::new(),
            last_transaction_id: 0,
            initialized: false,
        })
    }

    /// Rebuilds the index and sector table from flash.
    ///
    /// Corrupt regions are logged, skipped, and left as dead space until
    /// their sector is collected; a fully or partially erased partition
    /// mounts as an empty (or partial) store.
    pub fn init(&mut self) -> Result<(), Error<F::Error>> {
        self.initialized = false;
        self.index.clear();
        self.sectors.clear();
        self.last_transaction_id = 0;

        let sector_size = self.partition.sector_size();
        for sector in 0..self.sectors.count() {
            let start = sector as u32 * sector_size;
            let end = start + sector_size;
            let mut address = start;
            let cursor;
            loop {
                if address >= end {
                    cursor = end;
                    break;
                }
                match entry::parse_header(
                    &self.partition,
                    self.checksum_size,
                    self.magic,
                    self.alignment,
                    address,
                    end,
                )? {
                    HeaderOutcome::Erased => {
                        // Normally the rest of the sector is free space.
                        // After an interrupted erase, though, stale data
                        // may follow; such a sector is unusable until
                        // collected, so poison it and let GC recover it.
                        if self.tail_is_erased(address, end)? {
                            cursor = address;
                        } else {
                            warn!("init: sector {} partially erased", sector);
                            cursor = end;
                            self.sectors.mark_reclaimable(sector, end - address);
                        }
                        break;
                    }
                    HeaderOutcome::Garbage => {
                        address = (address + self.alignment).min(end);
                    }
                    HeaderOutcome::Parsed(parsed) => {
                        let ok = match entry::verify_entry(
                            &self.partition,
                            self.checksum.get_mut(),
                            &parsed,
                            None,
                        ) {
                            Ok(_) => true,
                            Err(Error::DataLoss) => false,
                            Err(e) => return Err(e),
                        };
                        if ok {
                            self.absorb_scanned_entry(&parsed)?;
                            address += parsed.total_size;
                        } else {
                            warn!("init: corrupt entry at address {}", address);
                            address = (address + self.alignment).min(end);
                        }
                    }
                }
            }
            self.sectors.set_written(sector, cursor - start);
        }

        debug!(
            "init: {} keys, {} descriptors, last transaction {}",
            self.index.valid_count(),
            self.index.len(),
            self.last_transaction_id,
        );
        self.initialized = true;
        Ok(())
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error<F::Error>> {
        self.check_ready()?;
        check_key(key)?;
        if value.len() > MAX_VALUE_LENGTH {
            return Err(Error::InvalidArgument);
        }
        let size = entry::encoded_size(self.checksum_size, key.len(), value.len(), self.alignment);
        if size > self.partition.sector_size() {
            // Entries never span sectors, so this can never be written.
            return Err(Error::InvalidArgument);
        }

        let existing = self.find_slot(hash_key(key), key)?;
        if existing.is_none() && self.index.is_full() {
            return Err(Error::ResourceExhausted);
        }
        self.write_record(key, value, false, existing)
    }

    /// Removes `key`. The delete is durable: a tombstone entry records
    /// it until garbage collection has disposed of every older value.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), Error<F::Error>> {
        self.check_ready()?;
        check_key(key)?;

        let slot = match self.find_slot(hash_key(key), key)? {
            Some(slot) if self.index.get(slot).state == KeyState::Valid => slot,
            _ => return Err(Error::NotFound),
        };
        self.write_record(key, &[], true, Some(slot))
    }

    /// Reads the value stored under `key` into `out`, returning the
    /// value's full length.
    ///
    /// If `out` is too small the available prefix is still copied and
    /// the result is `ResourceExhausted`; [`Store::value_size`] reports
    /// the length needed. The stored entry is checksum-verified on every
    /// read (`DataLoss` on mismatch).
    pub fn get(&self, key: &[u8], out: &mut [u8]) -> Result<usize, Error<F::Error>> {
        self.check_ready()?;
        check_key(key)?;

        let slot = match self.find_slot(hash_key(key), key)? {
            Some(slot) if self.index.get(slot).state == KeyState::Valid => slot,
            _ => return Err(Error::NotFound),
        };
        let parsed = self.parse_trusted(self.index.get(slot).address)?;

        let mut checksum = self.checksum.borrow_mut();
        entry::verify_entry(&self.partition, &mut *checksum, &parsed, Some(out))?;
        let len = usize::from(parsed.value_length);
        if out.len() < len {
            return Err(Error::ResourceExhausted);
        }
        Ok(len)
    }

    /// Length in bytes of the value stored under `key`.
    pub fn value_size(&self, key: &[u8]) -> Result<usize, Error<F::Error>> {
        self.check_ready()?;
        check_key(key)?;

        let slot = match self.find_slot(hash_key(key), key)? {
            Some(slot) if self.index.get(slot).state == KeyState::Valid => slot,
            _ => return Err(Error::NotFound),
        };
        let parsed = self.parse_trusted(self.index.get(slot).address)?;
        Ok(usize::from(parsed.value_length))
    }

    /// Number of keys currently present.
    pub fn size(&self) -> usize {
        self.index.valid_count()
    }

    /// Capacity of the key index.
    pub fn max_size(&self) -> usize {
        MAX_ENTRIES
    }

    /// Iterates over the present keys. The iterator borrows the store,
    /// so no writes can interleave with it; it is not restartable.
    pub fn iter(&self) -> Iter<'_, F, C, MAX_ENTRIES, MAX_SECTORS> {
        Iter { store: self, slot: 0 }
    }

    //////////////////////////////////////////////////////////////////////
    // Write path.

    fn write_record(
        &mut self,
        key: &[u8],
        value: &[u8],
        tombstone: bool,
        existing: Option<usize>,
    ) -> Result<(), Error<F::Error>> {
        let size = entry::encoded_size(self.checksum_size, key.len(), value.len(), self.alignment);

        let sector = match self.sectors.allocate(size, false, None) {
            Some(s) => s,
            None => {
                self.collect_garbage(size)?;
                match self.sectors.allocate(size, false, None) {
                    Some(s) => s,
                    None => return Err(Error::ResourceExhausted),
                }
            }
        };

        // Size of the entry this write supersedes, captured after GC (a
        // relocation may have just moved it) and before the write, so
        // the accounting below cannot fail once the new entry exists.
        let superseded = match existing {
            Some(slot) => {
                let address = self.index.get(slot).address;
                match self.parse_trusted(address) {
                    Ok(e) => Some((slot, address, e.total_size)),
                    // An unreadable predecessor has nothing worth
                    // reclaiming; the write must still go through.
                    Err(Error::DataLoss) => Some((slot, address, 0)),
                    Err(e) => return Err(e),
                }
            }
            None => None,
        };

        let transaction_id = self
            .last_transaction_id
            .checked_add(1)
            .ok_or(Error::Internal)?;
        self.last_transaction_id = transaction_id;

        let address = self.sectors.next_write_address(sector);
        let result = entry::write_entry(
            &mut self.partition,
            self.checksum.get_mut(),
            self.magic,
            address,
            self.alignment,
            transaction_id,
            key,
            value,
            tombstone,
        );
        // The region is consumed even on failure: a torn write leaves
        // programmed bytes there, and the next scan skips them by
        // checksum. It is dead space until the sector is collected.
        self.sectors.mark_written(sector, size);
        if let Err(e) = result {
            warn!("write of {} bytes at address {} failed", size, address);
            return Err(e);
        }

        let state = if tombstone { KeyState::Deleted } else { KeyState::Valid };
        match superseded {
            Some((slot, old_address, old_size)) => {
                if old_size > 0 {
                    let old_sector = self.sectors.sector_of(old_address);
                    self.sectors.mark_reclaimable(old_sector, old_size);
                }
                let d = self.index.get_mut(slot);
                d.transaction_id = transaction_id;
                d.address = address;
                d.state = state;
            }
            None => {
                let d = KeyDescriptor {
                    key_hash: hash_key(key),
                    transaction_id,
                    address,
                    state,
                };
                // Capacity was checked before writing.
                if self.index.insert(d).is_none() {
                    return Err(Error::Internal);
                }
            }
        }
        Ok(())
    }

    //////////////////////////////////////////////////////////////////////
    // Garbage collection.

    /// Collects sectors until an allocation of `needed` bytes can
    /// succeed or nothing reclaimable remains.
    fn collect_garbage(&mut self, needed: u32) -> Result<(), Error<F::Error>> {
        for _ in 0..self.sectors.count() {
            let victim = match self.sectors.choose_gc_victim() {
                Some(v) => v,
                None => return Ok(()),
            };
            self.collect_sector(victim)?;
            if self.sectors.allocate(needed, false, None).is_some() {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Relocates every live entry out of `victim`, then erases it.
    ///
    /// An entry is live iff the index still points at its exact address;
    /// superseded copies, no-longer-referenced tombstones, and anything
    /// failing its checksum are left behind to be erased.
    fn collect_sector(&mut self, victim: usize) -> Result<(), Error<F::Error>> {
        let start = self.sectors.sector_start(victim);
        let sector_end = start + self.partition.sector_size();
        let end = start + self.sectors.bytes_written(victim);
        debug!(
            "gc: collecting sector {}, {} reclaimable bytes",
            victim,
            self.sectors.bytes_reclaimable(victim),
        );
        let mut address = start;
        let mut moved = 0u32;

        while address < end {
            match entry::parse_header(
                &self.partition,
                self.checksum_size,
                self.magic,
                self.alignment,
                address,
                sector_end,
            )? {
                HeaderOutcome::Erased => break,
                HeaderOutcome::Garbage => {
                    address = (address + self.alignment).min(end);
                }
                HeaderOutcome::Parsed(parsed) => {
                    if let Some(slot) = self.index.find_by_address(address) {
                        match entry::verify_entry(
                            &self.partition,
                            self.checksum.get_mut(),
                            &parsed,
                            None,
                        ) {
                            Ok(_) => {
                                // A tombstone whose key has no other
                                // record on flash has finished its job:
                                // once this sector is erased the key is
                                // gone for good, so the descriptor can
                                // be retired instead of relocated.
                                if parsed.tombstone
                                    && !self.key_has_other_copies(victim, &parsed)?
                                {
                                    self.index.remove(slot);
                                } else {
                                    self.relocate_entry(victim, slot, &parsed)?;
                                    moved += parsed.total_size;
                                }
                            }
                            Err(Error::DataLoss) => {
                                warn!("gc: dropping corrupt entry at address {}", address);
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    address += parsed.total_size;
                }
            }
        }

        debug!("gc: sector {} done, relocated {} bytes", victim, moved);
        self.partition.erase(start, 1)?;
        self.sectors.reset(victim);
        Ok(())
    }

    /// Copies one live entry byte-for-byte (same transaction id) out of
    /// `victim` and repoints its descriptor.
    fn relocate_entry(
        &mut self,
        victim: usize,
        slot: usize,
        parsed: &ParsedEntry,
    ) -> Result<(), Error<F::Error>> {
        let dest = self
            .sectors
            .allocate(parsed.total_size, true, Some(victim))
            .ok_or(Error::ResourceExhausted)?;
        let dest_address = self.sectors.next_write_address(dest);

        let result = self.copy_entry(parsed.address, dest_address, parsed.total_size);
        self.sectors.mark_written(dest, parsed.total_size);
        result?;

        self.index.get_mut(slot).address = dest_address;
        Ok(())
    }

    /// Scans every sector except `victim` for an entry carrying the same
    /// key as `tombstone`. Conservative: a same-key entry that would
    /// fail its checksum still counts, since keeping a tombstone too
    /// long is harmless and dropping it too early resurrects the key.
    fn key_has_other_copies(
        &self,
        victim: usize,
        tombstone: &ParsedEntry,
    ) -> Result<bool, Error<F::Error>> {
        let mut key_buf = [0u8; MAX_KEY_LENGTH];
        entry::read_key(&self.partition, tombstone, &mut key_buf)?;
        let key = &key_buf[..usize::from(tombstone.key_length)];

        let sector_size = self.partition.sector_size();
        for sector in 0..self.sectors.count() {
            if sector == victim {
                continue;
            }
            let start = self.sectors.sector_start(sector);
            let sector_end = start + sector_size;
            let end = start + self.sectors.bytes_written(sector);
            let mut address = start;
            while address < end {
                match entry::parse_header(
                    &self.partition,
                    self.checksum_size,
                    self.magic,
                    self.alignment,
                    address,
                    sector_end,
                )? {
                    HeaderOutcome::Erased => break,
                    HeaderOutcome::Garbage => {
                        address = (address + self.alignment).min(end);
                    }
                    HeaderOutcome::Parsed(other) => {
                        if usize::from(other.key_length) == key.len() {
                            let mut other_key = [0u8; MAX_KEY_LENGTH];
                            entry::read_key(&self.partition, &other, &mut other_key)?;
                            if &other_key[..key.len()] == key {
                                return Ok(true);
                            }
                        }
                        address += other.total_size;
                    }
                }
            }
        }
        Ok(false)
    }

    fn copy_entry(&mut self, mut src: u32, mut dst: u32, mut remaining: u32) -> Result<(), Error<F::Error>> {
        let mut buf = [0u8; entry::WRITE_CHUNK];
        while remaining > 0 {
            let n = (remaining as usize).min(entry::WRITE_CHUNK);
            let chunk = &mut buf[..n];
            self.partition.read(src, chunk)?;
            self.partition.write(dst, chunk)?;
            src += n as u32;
            dst += n as u32;
            remaining -= n as u32;
        }
        Ok(())
    }

    //////////////////////////////////////////////////////////////////////
    // Init scan helpers.

    /// Folds one checksum-verified scanned entry into the index and the
    /// reclaimable accounting.
    fn absorb_scanned_entry(&mut self, parsed: &ParsedEntry) -> Result<(), Error<F::Error>> {
        let mut key_buf = [0u8; MAX_KEY_LENGTH];
        entry::read_key(&self.partition, parsed, &mut key_buf)?;
        let key = &key_buf[..usize::from(parsed.key_length)];
        let key_hash = hash_key(key);

        if parsed.transaction_id > self.last_transaction_id {
            self.last_transaction_id = parsed.transaction_id;
        }
        let state = if parsed.tombstone { KeyState::Deleted } else { KeyState::Valid };

        let found = {
            let partition = &self.partition;
            let (checksum_size, magic, alignment) = (self.checksum_size, self.magic, self.alignment);
            self.index.find(key_hash, |d| {
                key_matches(partition, checksum_size, magic, alignment, d.address, key)
            })?
        };

        match found {
            None => {
                let d = KeyDescriptor {
                    key_hash,
                    transaction_id: parsed.transaction_id,
                    address: parsed.address,
                    state,
                };
                if self.index.insert(d).is_none() {
                    // More keys on flash than the index can hold. The
                    // data is intact; this build is just too small for
                    // the partition's population.
                    warn!("init: key index full at address {}", parsed.address);
                    return Err(Error::ResourceExhausted);
                }
            }
            Some(slot) => {
                let incumbent = *self.index.get(slot);
                let newer = parsed.transaction_id > incumbent.transaction_id
                    // Identical ids happen when a crash interrupted GC
                    // between relocation and erase; the copy later in
                    // scan order is canonical.
                    || (parsed.transaction_id == incumbent.transaction_id
                        && parsed.address > incumbent.address);
                if newer {
                    let loser_size = match self.parse_trusted(incumbent.address) {
                        Ok(e) => e.total_size,
                        Err(Error::DataLoss) => 0,
                        Err(e) => return Err(e),
                    };
                    if loser_size > 0 {
                        let loser_sector = self.sectors.sector_of(incumbent.address);
                        self.sectors.mark_reclaimable(loser_sector, loser_size);
                    }
                    *self.index.get_mut(slot) = KeyDescriptor {
                        key_hash,
                        transaction_id: parsed.transaction_id,
                        address: parsed.address,
                        state,
                    };
                } else {
                    let sector = self.sectors.sector_of(parsed.address);
                    self.sectors.mark_reclaimable(sector, parsed.total_size);
                }
            }
        }
        Ok(())
    }

    /// Checks that the bytes in `[address, end)` read as erased flash.
    fn tail_is_erased(&self, mut address: u32, end: u32) -> Result<bool, Error<F::Error>> {
        let mut buf = [0u8; entry::WRITE_CHUNK];
        while address < end {
            let n = ((end - address) as usize).min(entry::WRITE_CHUNK);
            let chunk = &mut buf[..n];
            self.partition.read(address, chunk)?;
            if !chunk.iter().all(|&b| b == 0xFF) {
                return Ok(false);
            }
            address += n as u32;
        }
        Ok(true)
    }

    //////////////////////////////////////////////////////////////////////
    // Lookup helpers.

    fn check_ready(&self) -> Result<(), Error<F::Error>> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::InvalidArgument)
        }
    }

    fn find_slot(&self, key_hash: u32, key: &[u8]) -> Result<Option<usize>, Error<F::Error>> {
        let partition = &self.partition;
        let (checksum_size, magic, alignment) = (self.checksum_size, self.magic, self.alignment);
        self.index.find(key_hash, |d| {
            key_matches(partition, checksum_size, magic, alignment, d.address, key)
        })
    }

    /// Parses the header of an entry the index points at. Anything but a
    /// clean parse means the entry rotted under us.
    fn parse_trusted(&self, address: u32) -> Result<ParsedEntry, Error<F::Error>> {
        let sector_size = self.partition.sector_size();
        let sector_end = (address / sector_size + 1) * sector_size;
        match entry::parse_header(
            &self.partition,
            self.checksum_size,
            self.magic,
            self.alignment,
            address,
            sector_end,
        )? {
            HeaderOutcome::Parsed(e) => Ok(e),
            _ => Err(Error::DataLoss),
        }
    }
}

fn check_key<E>(key: &[u8]) -> Result<(), Error<E>> {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}

/// Compares the key bytes of the entry at `address` against `key`.
fn key_matches<F: Flash>(
    partition: &Partition<F>,
    checksum_size: usize,
    magic: u32,
    alignment: u32,
    address: u32,
    key: &[u8],
) -> Result<bool, Error<F::Error>> {
    let sector_size = partition.sector_size();
    let sector_end = (address / sector_size + 1) * sector_size;
    let parsed =
        match entry::parse_header(partition, checksum_size, magic, alignment, address, sector_end)? {
            HeaderOutcome::Parsed(e) => e,
            // An unreadable entry's key is unknowable; it can't match.
            _ => return Ok(false),
        };
    if usize::from(parsed.key_length) != key.len() {
        return Ok(false);
    }
    let mut buf = [0u8; MAX_KEY_LENGTH];
    entry::read_key(partition, &parsed, &mut buf)?;
    Ok(&buf[..key.len()] == key)
}

/// Iterator over the present keys of a [`Store`].
pub struct Iter<'a, F: Flash, C: Checksum, const MAX_ENTRIES: usize, const MAX_SECTORS: usize> {
    store: &'a Store<F, C, MAX_ENTRIES, MAX_SECTORS>,
    slot: usize,
}

impl<'a, F: Flash, C: Checksum, const MAX_ENTRIES: usize, const MAX_SECTORS: usize> Iterator
    for Iter<'a, F, C, MAX_ENTRIES, MAX_SECTORS>
{
    type Item = Result<Item<'a, F, C, MAX_ENTRIES, MAX_SECTORS>, Error<F::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.slot < self.store.index.len() {
            let d = *self.store.index.get(self.slot);
            self.slot += 1;
            if d.state != KeyState::Valid {
                continue;
            }
            return Some(self.read_item(d.address));
        }
        None
    }
}

impl<'a, F: Flash, C: Checksum, const MAX_ENTRIES: usize, const MAX_SECTORS: usize>
    Iter<'a, F, C, MAX_ENTRIES, MAX_SECTORS>
{
    fn read_item(
        &self,
        address: u32,
    ) -> Result<Item<'a, F, C, MAX_ENTRIES, MAX_SECTORS>, Error<F::Error>> {
        let parsed = self.store.parse_trusted(address)?;
        let mut key = [0u8; MAX_KEY_LENGTH];
        entry::read_key(&self.store.partition, &parsed, &mut key)?;
        Ok(Item {
            store: self.store,
            key,
            key_length: parsed.key_length,
            value_length: parsed.value_length,
            address,
        })
    }
}

/// One key-value pair yielded during iteration. The value stays on
/// flash until [`Item::get`] is called.
pub struct Item<'a, F: Flash, C: Checksum, const MAX_ENTRIES: usize, const MAX_SECTORS: usize> {
    store: &'a Store<F, C, MAX_ENTRIES, MAX_SECTORS>,
    key: [u8; MAX_KEY_LENGTH],
    key_length: u8,
    value_length: u16,
    address: u32,
}

impl<F: Flash, C: Checksum, const MAX_ENTRIES: usize, const MAX_SECTORS: usize>
    Item<'_, F, C, MAX_ENTRIES, MAX_SECTORS>
{
    pub fn key(&self) -> &[u8] {
        &self.key[..usize::from(self.key_length)]
    }

    pub fn value_size(&self) -> usize {
        usize::from(self.value_length)
    }

    /// Reads this item's value, with [`Store::get`] semantics.
    pub fn get(&self, out: &mut [u8]) -> Result<usize, Error<F::Error>> {
        let parsed = self.store.parse_trusted(self.address)?;
        let mut checksum = self.store.checksum.borrow_mut();
        entry::verify_entry(&self.store.partition, &mut *checksum, &parsed, Some(out))?;
        drop(checksum);
        let len = usize::from(parsed.value_length);
        if out.len() < len {
            return Err(Error::ResourceExhausted);
        }
        Ok(len)
    }
}
