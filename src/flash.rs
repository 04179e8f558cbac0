// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Flash device contract and partition addressing.
//!
//! The store never talks to a device directly; all I/O goes through a
//! [`Partition`], which maps store addresses into a contiguous sector
//! range of the device and validates range and alignment before the
//! driver sees the request.

use crate::Error;

/// Trait describing a NOR-style flash device for the purposes of the
/// store.
///
/// The device is modeled as `sector_count()` equal sectors of
/// `sector_size()` bytes, addressed by byte offset from the start of the
/// device. The store relies on the usual NOR discipline:
///
/// - erase works on whole sectors only and resets them to all-ones;
/// - writes require a previously-erased (all-`0xFF`) target and must be
///   placed and sized in multiples of `alignment()`;
/// - reads have no alignment requirement.
///
/// A driver should report a write over non-erased bytes as an error
/// rather than silently NANDing the data in; the store treats any driver
/// error as a device-level fault that aborts the current operation.
pub trait Flash {
    /// Error type produced by the driver.
    type Error;

    /// Size of one erase unit in bytes. Constant for the device's
    /// lifetime.
    fn sector_size(&self) -> u32;

    /// Number of sectors in the device.
    fn sector_count(&self) -> u32;

    /// Write alignment in bytes: a power of two in 1..=64.
    fn alignment(&self) -> u32;

    /// Reads `out.len()` bytes starting at byte offset `address`.
    fn read(&self, address: u32, out: &mut [u8]) -> Result<(), Self::Error>;

    /// Programs `data` starting at byte offset `address`. The target
    /// region must have been erased since it was last written.
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// Erases `sectors` whole sectors starting at byte offset `address`,
    /// which must be sector-aligned. The region reads back as all-ones
    /// afterwards.
    fn erase(&mut self, address: u32, sectors: u32) -> Result<(), Self::Error>;
}

impl<F: Flash> Flash for &mut F {
    type Error = F::Error;

    fn sector_size(&self) -> u32 {
        (**self).sector_size()
    }

    fn sector_count(&self) -> u32 {
        (**self).sector_count()
    }

    fn alignment(&self) -> u32 {
        (**self).alignment()
    }

    fn read(&self, address: u32, out: &mut [u8]) -> Result<(), Self::Error> {
        (**self).read(address, out)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Self::Error> {
        (**self).write(address, data)
    }

    fn erase(&mut self, address: u32, sectors: u32) -> Result<(), Self::Error> {
        (**self).erase(address, sectors)
    }
}

/// A contiguous sector range of a flash device, with its own (possibly
/// stricter) write alignment.
///
/// Addresses passed to partition methods are byte offsets from the start
/// of the partition. The partition validates every access and reports
/// `InvalidArgument` for out-of-range or misaligned requests, so driver
/// errors that make it through are genuine device faults.
pub struct Partition<F: Flash> {
    flash: F,
    offset: u32,
    sector_count: u32,
    sector_size: u32,
    alignment: u32,
}

impl<F: Flash> Partition<F> {
    /// Creates a partition covering `sector_count` sectors starting at
    /// `start_sector`, with write alignment `alignment`.
    ///
    /// `alignment` must be a power of two, a multiple of the device
    /// alignment, and must divide the sector size. The range must lie
    /// within the device.
    pub fn new(
        flash: F,
        start_sector: u32,
        sector_count: u32,
        alignment: u32,
    ) -> Result<Self, Error<F::Error>> {
        let device_sectors = flash.sector_count();
        let sector_size = flash.sector_size();

        let end = start_sector
            .checked_add(sector_count)
            .ok_or(Error::InvalidArgument)?;
        if sector_count == 0 || end > device_sectors {
            return Err(Error::InvalidArgument);
        }
        if !alignment.is_power_of_two()
            || alignment % flash.alignment() != 0
            || sector_size % alignment != 0
        {
            return Err(Error::InvalidArgument);
        }

        Ok(Self {
            flash,
            offset: start_sector * sector_size,
            sector_count,
            sector_size,
            alignment,
        })
    }

    /// Size of one sector in bytes.
    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// Number of sectors in the partition.
    pub fn sector_count(&self) -> u32 {
        self.sector_count
    }

    /// Write alignment of the partition.
    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    /// Total partition size in bytes.
    pub fn size_bytes(&self) -> u32 {
        self.sector_count * self.sector_size
    }

    /// Consumes the partition, returning the underlying device.
    pub fn into_inner(self) -> F {
        self.flash
    }

    /// Reads `out.len()` bytes starting at `address`. Reading up to and
    /// including the final byte of the partition is legal.
    pub fn read(&self, address: u32, out: &mut [u8]) -> Result<(), Error<F::Error>> {
        let len = u32::try_from(out.len()).map_err(|_| Error::InvalidArgument)?;
        let end = address.checked_add(len).ok_or(Error::InvalidArgument)?;
        if end > self.size_bytes() {
            return Err(Error::InvalidArgument);
        }
        self.flash.read(self.offset + address, out)?;
        Ok(())
    }

    /// Programs `data` starting at `address`. Both the address and the
    /// length must be multiples of the partition alignment, and the
    /// target region must be erased.
    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Error<F::Error>> {
        let len = u32::try_from(data.len()).map_err(|_| Error::InvalidArgument)?;
        let end = address.checked_add(len).ok_or(Error::InvalidArgument)?;
        if end > self.size_bytes()
            || address % self.alignment != 0
            || len % self.alignment != 0
        {
            return Err(Error::InvalidArgument);
        }
        self.flash.write(self.offset + address, data)?;
        Ok(())
    }

    /// Erases `sectors` whole sectors starting at the sector-aligned
    /// `address`.
    pub fn erase(&mut self, address: u32, sectors: u32) -> Result<(), Error<F::Error>> {
        if address % self.sector_size != 0 {
            return Err(Error::InvalidArgument);
        }
        let len = sectors
            .checked_mul(self.sector_size)
            .ok_or(Error::InvalidArgument)?;
        let end = address.checked_add(len).ok_or(Error::InvalidArgument)?;
        if end > self.size_bytes() {
            return Err(Error::InvalidArgument);
        }
        self.flash.erase(self.offset + address, sectors)?;
        Ok(())
    }

    /// Erases the entire partition.
    pub fn erase_all(&mut self) -> Result<(), Error<F::Error>> {
        self.erase(0, self.sector_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeFlash, FakeFlashError};

    #[test]
    fn partition_shifts_addresses() {
        let mut flash = FakeFlash::new(128, 8, 4);
        let mut p = Partition::new(&mut flash, 2, 4, 4)
            .expect("geometry should be accepted");

        p.write(0, &[0xAB; 4]).expect("write should succeed");
        drop(p);

        // Partition address 0 lands at device sector 2.
        assert_eq!(&flash.mem()[2 * 128..2 * 128 + 4], &[0xAB; 4]);
    }

    #[test]
    fn read_of_final_byte_is_legal() {
        let mut flash = FakeFlash::new(128, 8, 4);
        let p = Partition::new(&mut flash, 0, 8, 4)
            .expect("geometry should be accepted");

        let mut one = [0u8; 1];
        p.read(8 * 128 - 1, &mut one).expect("last byte should be readable");
        assert_eq!(one, [0xFF]);

        assert_eq!(p.read(8 * 128, &mut one), Err(Error::InvalidArgument));
    }

    #[test]
    fn misaligned_write_rejected() {
        let mut flash = FakeFlash::new(128, 8, 4);
        let mut p = Partition::new(&mut flash, 0, 8, 16)
            .expect("geometry should be accepted");

        assert_eq!(p.write(8, &[0; 16]), Err(Error::InvalidArgument));
        assert_eq!(p.write(16, &[0; 8]), Err(Error::InvalidArgument));
        assert_eq!(p.write(16, &[0; 16]), Ok(()));
    }

    #[test]
    fn write_over_data_is_a_device_fault() {
        let mut flash = FakeFlash::new(128, 8, 4);
        let mut p = Partition::new(&mut flash, 0, 8, 4)
            .expect("geometry should be accepted");

        p.write(0, &[0x55; 4]).expect("first write should succeed");
        assert_eq!(
            p.write(0, &[0x66; 4]),
            Err(Error::Flash(FakeFlashError::NotErased)),
        );
    }

    #[test]
    fn erase_requires_sector_boundary() {
        let mut flash = FakeFlash::new(128, 8, 4);
        let mut p = Partition::new(&mut flash, 0, 8, 4)
            .expect("geometry should be accepted");

        assert_eq!(p.erase(64, 1), Err(Error::InvalidArgument));
        assert_eq!(p.erase(7 * 128, 2), Err(Error::InvalidArgument));

        p.write(128, &[0; 4]).expect("write should succeed");
        p.erase(128, 1).expect("erase should succeed");
        let mut b = [0u8; 4];
        p.read(128, &mut b).expect("read should succeed");
        assert_eq!(b, [0xFF; 4]);
    }

    #[test]
    fn bad_geometry_rejected() {
        // Range past the end of the device.
        let mut flash = FakeFlash::new(128, 8, 4);
        assert!(matches!(
            Partition::new(&mut flash, 6, 4, 4),
            Err(Error::InvalidArgument),
        ));
        // Alignment finer than the device's.
        assert!(matches!(
            Partition::new(&mut flash, 0, 8, 2),
            Err(Error::InvalidArgument),
        ));
        // Alignment that does not divide the sector size.
        let mut odd = FakeFlash::new(96, 4, 1);
        assert!(matches!(
            Partition::new(&mut odd, 0, 4, 64),
            Err(Error::InvalidArgument),
        ));
    }
}
