// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! On-flash entry format and codec.
//!
//! An entry is one serialized record of a put or delete:
//!
//! ```text
//! +--------+-------------------+------------------+-----+-------+---------+
//! | magic  | checksum          | fields           | key | value | padding |
//! | 4 B    | 0..=16 B          | 8 B              |     |       | zeros   |
//! +--------+-------------------+------------------+-----+-------+---------+
//! ```
//!
//! all little-endian, padded to the entry alignment. The checksum field
//! width equals the digest size of the checksum the store was built
//! with; the digest covers every byte of the entry *except* the checksum
//! field itself. The `fields` block is [`EntryFields`].
//!
//! Entries never span sectors, so the codec rejects any header whose
//! claimed extent would cross the end of the sector it starts in.

use core::mem::size_of;

use zerocopy::{AsBytes, FromBytes, Unaligned};

use crate::checksum::{Checksum, MAX_CHECKSUM_LENGTH};
use crate::flash::{Flash, Partition};
use crate::Error;

/// Shorthand for a `u16` in little-endian representation.
type U16LE = zerocopy::U16<byteorder::LittleEndian>;
/// Shorthand for a `u32` in little-endian representation.
type U32LE = zerocopy::U32<byteorder::LittleEndian>;

/// Longest supported key.
pub const MAX_KEY_LENGTH: usize = 64;

/// Longest encodable value (the header length field is 16 bits). The
/// practical bound is usually tighter: an entry must fit in one sector.
pub const MAX_VALUE_LENGTH: usize = 65535;

/// Width of the leading magic field.
pub(crate) const MAGIC_LENGTH: usize = 4;

/// Entry alignment is expressed in units of this many bytes.
pub(crate) const ALIGNMENT_UNIT: u32 = 16;

/// Bit in `EntryFields::alignment_units` marking a tombstone. The low
/// seven bits carry the unit count.
pub(crate) const TOMBSTONE_FLAG: u8 = 0x80;

/// Granularity of streaming flash transfers; also the upper bound on the
/// partition alignments the codec can serve.
pub(crate) const WRITE_CHUNK: usize = 128;

/// Largest possible header: magic, maximum checksum, fields.
pub(crate) const MAX_HEADER_LENGTH: usize =
    MAGIC_LENGTH + MAX_CHECKSUM_LENGTH + size_of::<EntryFields>();

const ZEROS: [u8; WRITE_CHUNK] = [0; WRITE_CHUNK];

/// Convenience wrapper for zerocopy prefix casts.
pub(crate) fn cast_prefix<T>(bytes: &[u8]) -> (&T, &[u8])
where
    T: FromBytes + Unaligned,
{
    let (lv, rest) = zerocopy::LayoutVerified::<_, T>::new_unaligned_from_prefix(bytes)
        .expect("type does not fit in buffer");
    (lv.into_ref(), rest)
}

/// Fixed header fields following the magic and the checksum.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub(crate) struct EntryFields {
    /// Entry alignment as `(units + 1) * 16` bytes, with the tombstone
    /// flag in the top bit.
    pub alignment_units: u8,
    /// Length of the key in bytes, 1..=64.
    pub key_length: u8,
    /// Length of the value in bytes. Zero for tombstones.
    pub value_length: U16LE,
    /// Recency of this entry relative to all other entries in the
    /// partition; higher is newer.
    pub transaction_id: U32LE,
}

/// Header length for a deployment using a `checksum_size`-byte digest.
pub(crate) fn header_length(checksum_size: usize) -> usize {
    MAGIC_LENGTH + checksum_size + size_of::<EntryFields>()
}

/// Smallest entry alignment satisfying a partition's write alignment.
pub(crate) fn entry_alignment_for(partition_alignment: u32) -> u32 {
    let units = (partition_alignment + ALIGNMENT_UNIT - 1) / ALIGNMENT_UNIT;
    units.max(1) * ALIGNMENT_UNIT
}

pub(crate) fn round_up(x: u32, alignment: u32) -> u32 {
    (x + alignment - 1) / alignment * alignment
}

/// Total on-flash size of an entry, padding included.
pub(crate) fn encoded_size(
    checksum_size: usize,
    key_length: usize,
    value_length: usize,
    alignment: u32,
) -> u32 {
    let raw = header_length(checksum_size) + key_length + value_length;
    round_up(raw as u32, alignment)
}

/// A decoded entry header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct ParsedEntry {
    /// Partition address of the first header byte.
    pub address: u32,
    pub transaction_id: u32,
    pub key_length: u8,
    pub value_length: u16,
    pub tombstone: bool,
    /// Header length in bytes, including magic and checksum.
    pub header_length: u32,
    /// Total entry size including padding.
    pub total_size: u32,
}

impl ParsedEntry {
    pub fn key_address(&self) -> u32 {
        self.address + self.header_length
    }
}

/// What the codec made of the bytes at a candidate entry address.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum HeaderOutcome {
    /// The magic bytes read as erased flash; the rest of the sector is
    /// free space.
    Erased,
    /// Not an entry: wrong magic or implausible header fields.
    Garbage,
    /// A plausible header. The checksum has not been verified yet.
    Parsed(ParsedEntry),
}

/// Reads and validates the entry header at `address`, which must lie in
/// the sector ending at `sector_end`.
///
/// This checks the magic and the structural sanity of the header fields
/// (key length in range, tombstones carrying no value, the whole entry
/// inside its sector, entry alignment compatible with the store's
/// `alignment` so scan cursors stay aligned) but does not touch the
/// checksum; use [`verify_entry`] for that.
pub(crate) fn parse_header<F: Flash>(
    partition: &Partition<F>,
    checksum_size: usize,
    magic: u32,
    alignment: u32,
    address: u32,
    sector_end: u32,
) -> Result<HeaderOutcome, Error<F::Error>> {
    let header_len = header_length(checksum_size);
    let avail = (sector_end - address) as usize;

    let mut buf = [0u8; MAX_HEADER_LENGTH];
    let window = &mut buf[..header_len.min(avail)];
    partition.read(address, window)?;

    if window.len() < MAGIC_LENGTH {
        return Ok(if window.iter().all(|&b| b == 0xFF) {
            HeaderOutcome::Erased
        } else {
            HeaderOutcome::Garbage
        });
    }

    let (stored_magic, rest) = cast_prefix::<U32LE>(window);
    if stored_magic.get() == u32::from_le_bytes([0xFF; 4]) {
        return Ok(HeaderOutcome::Erased);
    }
    if stored_magic.get() != magic || window.len() < header_len {
        return Ok(HeaderOutcome::Garbage);
    }

    let (fields, _) = cast_prefix::<EntryFields>(&rest[checksum_size..]);

    let tombstone = (fields.alignment_units & TOMBSTONE_FLAG) != 0;
    let units = fields.alignment_units & !TOMBSTONE_FLAG;
    let entry_alignment = (u32::from(units) + 1) * ALIGNMENT_UNIT;
    let key_length = fields.key_length;
    let value_length = fields.value_length.get();

    if entry_alignment % alignment != 0 {
        return Ok(HeaderOutcome::Garbage);
    }
    if key_length == 0 || usize::from(key_length) > MAX_KEY_LENGTH {
        return Ok(HeaderOutcome::Garbage);
    }
    if tombstone && value_length != 0 {
        return Ok(HeaderOutcome::Garbage);
    }

    let raw = header_len as u32 + u32::from(key_length) + u32::from(value_length);
    let total_size = round_up(raw, entry_alignment);
    if total_size > sector_end - address {
        return Ok(HeaderOutcome::Garbage);
    }

    Ok(HeaderOutcome::Parsed(ParsedEntry {
        address,
        transaction_id: fields.transaction_id.get(),
        key_length,
        value_length,
        tombstone,
        header_length: header_len as u32,
        total_size,
    }))
}

/// Reads the key bytes of `entry` into the front of `buf`.
pub(crate) fn read_key<F: Flash>(
    partition: &Partition<F>,
    entry: &ParsedEntry,
    buf: &mut [u8; MAX_KEY_LENGTH],
) -> Result<(), Error<F::Error>> {
    partition.read(entry.key_address(), &mut buf[..usize::from(entry.key_length)])
}

/// Re-reads `entry` from flash and checks its digest, optionally copying
/// the value bytes into `value_out` as they stream past.
///
/// Returns the number of value bytes copied (limited by the size of
/// `value_out`), or `DataLoss` if the stored checksum does not match.
/// When the buffer is too short, the prefix is still copied before the
/// verification result is known.
pub(crate) fn verify_entry<F: Flash, C: Checksum>(
    partition: &Partition<F>,
    checksum: &mut C,
    entry: &ParsedEntry,
    mut value_out: Option<&mut [u8]>,
) -> Result<usize, Error<F::Error>> {
    let n = checksum.size();
    let header_len = entry.header_length as usize;

    let mut head = [0u8; MAX_HEADER_LENGTH];
    let head = &mut head[..header_len];
    partition.read(entry.address, head)?;
    let stored = &head[MAGIC_LENGTH..MAGIC_LENGTH + n];

    checksum.reset();
    checksum.update(&head[..MAGIC_LENGTH]);
    checksum.update(&head[MAGIC_LENGTH + n..]);

    let value_start = entry.header_length + u32::from(entry.key_length);
    let value_end = value_start + u32::from(entry.value_length);

    let mut copied = 0usize;
    let mut offset = entry.header_length;
    let mut buf = [0u8; WRITE_CHUNK];
    while offset < entry.total_size {
        let len = ((entry.total_size - offset) as usize).min(WRITE_CHUNK);
        let chunk = &mut buf[..len];
        partition.read(entry.address + offset, chunk)?;
        checksum.update(chunk);

        if let Some(out) = value_out.as_deref_mut() {
            let lo = offset.max(value_start);
            let hi = (offset + len as u32).min(value_end);
            if lo < hi {
                let dst = (lo - value_start) as usize;
                if dst < out.len() {
                    let take = ((hi - lo) as usize).min(out.len() - dst);
                    let src = (lo - offset) as usize;
                    out[dst..dst + take].copy_from_slice(&chunk[src..src + take]);
                    copied = dst + take;
                }
            }
        }

        offset += len as u32;
    }

    let mut digest = [0u8; MAX_CHECKSUM_LENGTH];
    checksum.finish(&mut digest);
    if digest[..n] != *stored {
        return Err(Error::DataLoss);
    }
    Ok(copied)
}

/// Serializes and programs one entry at `address`.
///
/// The address must be the sector table's write cursor for its sector:
/// entry-aligned and backed by erased flash. On success the number of
/// bytes consumed (equal to [`encoded_size`]) is returned. On failure
/// the target region must be considered poisoned; the caller is
/// responsible for never reusing it before the sector is erased.
pub(crate) fn write_entry<F: Flash, C: Checksum>(
    partition: &mut Partition<F>,
    checksum: &mut C,
    magic: u32,
    address: u32,
    alignment: u32,
    transaction_id: u32,
    key: &[u8],
    value: &[u8],
    tombstone: bool,
) -> Result<u32, Error<F::Error>> {
    let n = checksum.size();
    let header_len = header_length(n);
    let total = encoded_size(n, key.len(), value.len(), alignment);
    let padding = total as usize - header_len - key.len() - value.len();

    let mut units = ((alignment / ALIGNMENT_UNIT) - 1) as u8;
    debug_assert!((units & TOMBSTONE_FLAG) == 0);
    if tombstone {
        units |= TOMBSTONE_FLAG;
    }
    let fields = EntryFields {
        alignment_units: units,
        key_length: key.len() as u8,
        value_length: U16LE::new(value.len() as u16),
        transaction_id: U32LE::new(transaction_id),
    };
    let magic_le = magic.to_le_bytes();

    // Digest covers everything but the checksum field itself.
    checksum.reset();
    checksum.update(&magic_le);
    checksum.update(fields.as_bytes());
    checksum.update(key);
    checksum.update(value);
    checksum.update(&ZEROS[..padding]);
    let mut digest = [0u8; MAX_CHECKSUM_LENGTH];
    checksum.finish(&mut digest);

    let mut w = ChunkWriter {
        partition,
        address,
        buf: [0; WRITE_CHUNK],
        fill: 0,
    };
    w.push(&magic_le)?;
    w.push(&digest[..n])?;
    w.push(fields.as_bytes())?;
    w.push(key)?;
    w.push(value)?;
    w.push(&ZEROS[..padding])?;
    w.finish()?;

    Ok(total)
}

/// Gathers entry pieces into alignment-sized flash writes.
///
/// Pieces are buffered into [`WRITE_CHUNK`]-byte programs; the final
/// flush is shorter but still a multiple of the entry alignment because
/// the entry's total size is.
struct ChunkWriter<'a, F: Flash> {
    partition: &'a mut Partition<F>,
    address: u32,
    buf: [u8; WRITE_CHUNK],
    fill: usize,
}

impl<F: Flash> ChunkWriter<'_, F> {
    fn push(&mut self, mut bytes: &[u8]) -> Result<(), Error<F::Error>> {
        while !bytes.is_empty() {
            let take = (WRITE_CHUNK - self.fill).min(bytes.len());
            self.buf[self.fill..self.fill + take].copy_from_slice(&bytes[..take]);
            self.fill += take;
            bytes = &bytes[take..];
            if self.fill == WRITE_CHUNK {
                self.flush()?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error<F::Error>> {
        if self.fill > 0 {
            self.partition.write(self.address, &self.buf[..self.fill])?;
            self.address += self.fill as u32;
            self.fill = 0;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<(), Error<F::Error>> {
        self.flush()
    }
}
