// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-RAM sector descriptor table.
//!
//! Tracks, per sector, the write cursor (`bytes_written`) and how many
//! of those bytes belong to superseded or deleted entries
//! (`bytes_reclaimable`). Garbage collection uses the latter to choose
//! its victim; allocation uses the former to place new entries.

#[derive(Copy, Clone, Debug, Default)]
struct SectorDescriptor {
    /// Distance from the sector start to the next writable address.
    bytes_written: u32,
    /// Bytes within `bytes_written` that garbage collection may free.
    bytes_reclaimable: u32,
}

pub(crate) struct SectorTable<const MAX_SECTORS: usize> {
    sectors: [SectorDescriptor; MAX_SECTORS],
    count: usize,
    sector_size: u32,
}

impl<const MAX_SECTORS: usize> SectorTable<MAX_SECTORS> {
    /// `count` must have been validated against `MAX_SECTORS` by the
    /// caller.
    pub fn new(count: usize, sector_size: u32) -> Self {
        debug_assert!(count <= MAX_SECTORS);
        Self {
            sectors: [SectorDescriptor::default(); MAX_SECTORS],
            count,
            sector_size,
        }
    }

    pub fn clear(&mut self) {
        self.sectors = [SectorDescriptor::default(); MAX_SECTORS];
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn bytes_written(&self, sector: usize) -> u32 {
        self.sectors[sector].bytes_written
    }

    pub fn bytes_reclaimable(&self, sector: usize) -> u32 {
        self.sectors[sector].bytes_reclaimable
    }

    pub fn free_bytes(&self, sector: usize) -> u32 {
        self.sector_size - self.sectors[sector].bytes_written
    }

    /// Partition address of the first byte of `sector`.
    pub fn sector_start(&self, sector: usize) -> u32 {
        sector as u32 * self.sector_size
    }

    /// Partition address of the next writable byte in `sector`.
    pub fn next_write_address(&self, sector: usize) -> u32 {
        self.sector_start(sector) + self.sectors[sector].bytes_written
    }

    /// Sector containing the partition address.
    pub fn sector_of(&self, address: u32) -> usize {
        (address / self.sector_size) as usize
    }

    /// Number of sectors with nothing written to them.
    pub fn erased_count(&self) -> usize {
        self.sectors[..self.count]
            .iter()
            .filter(|s| s.bytes_written == 0)
            .count()
    }

    /// Finds a sector with at least `size` free bytes, best-fit: the
    /// sector with the least sufficient free space wins, so fresh writes
    /// cluster and large sectors stay available for large values. Ties
    /// go to the lowest index.
    ///
    /// One fully-erased sector is held in reserve so garbage collection
    /// always has a destination; only GC itself passes `reserve_ok` to
    /// claim it. `exclude` removes one sector from consideration (the
    /// GC victim).
    pub fn allocate(&self, size: u32, reserve_ok: bool, exclude: Option<usize>) -> Option<usize> {
        let erased = self.erased_count();
        let mut best: Option<usize> = None;
        for sector in 0..self.count {
            if exclude == Some(sector) {
                continue;
            }
            let free = self.free_bytes(sector);
            if free < size {
                continue;
            }
            if !reserve_ok && self.sectors[sector].bytes_written == 0 && erased <= 1 {
                continue;
            }
            match best {
                Some(b) if self.free_bytes(b) <= free => {}
                _ => best = Some(sector),
            }
        }
        best
    }

    /// Advances the write cursor. `size` must be entry-aligned.
    pub fn mark_written(&mut self, sector: usize, size: u32) {
        let d = &mut self.sectors[sector];
        debug_assert!(d.bytes_written + size <= self.sector_size);
        d.bytes_written += size;
    }

    /// Sets the write cursor outright; used by the init scan.
    pub fn set_written(&mut self, sector: usize, bytes: u32) {
        debug_assert!(bytes <= self.sector_size);
        self.sectors[sector].bytes_written = bytes;
        self.sectors[sector].bytes_reclaimable =
            self.sectors[sector].bytes_reclaimable.min(bytes);
    }

    /// Credits `size` bytes of superseded data to `sector`.
    ///
    /// During the init scan reclaimable bytes may be credited to a
    /// sector before its cursor is known, so the cursor invariant is
    /// only asserted, not enforced.
    pub fn mark_reclaimable(&mut self, sector: usize, size: u32) {
        let d = &mut self.sectors[sector];
        d.bytes_reclaimable += size;
        debug_assert!(d.bytes_reclaimable <= self.sector_size);
    }

    /// Returns the sector the next garbage collection pass should
    /// evacuate: the one with the most reclaimable bytes, ties to the
    /// lowest index. `None` when nothing is reclaimable anywhere.
    pub fn choose_gc_victim(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for sector in 0..self.count {
            let r = self.sectors[sector].bytes_reclaimable;
            if r == 0 {
                continue;
            }
            match best {
                Some(b) if self.sectors[b].bytes_reclaimable >= r => {}
                _ => best = Some(sector),
            }
        }
        best
    }

    /// Resets a sector's accounting after it has been erased.
    pub fn reset(&mut self, sector: usize) {
        self.sectors[sector] = SectorDescriptor::default();
    }
}
