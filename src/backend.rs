use log::warn;

use crate::error::ErrorKind;

/// Byte-addressed access to a wear-leveled flash partition.
///
/// Addresses are relative to the beginning of the partition. The wear-level
/// layer owns the logical-to-physical remapping and the erase granularity;
/// this crate only sequences erase before write.
pub trait WearLevelVolume {
    /// Total usable size of the volume in bytes.
    fn size(&self) -> u32;
    /// Sector size reported by the wear-level layer, in bytes.
    fn sector_size(&self) -> u32;
    fn read(&mut self, addr: u32, dest: &mut [u8]) -> Result<(), ErrorKind>;
    fn erase_range(&mut self, addr: u32, len: u32) -> Result<(), ErrorKind>;
    fn write(&mut self, addr: u32, src: &[u8]) -> Result<(), ErrorKind>;
}

/// Sector-addressed access to an SD/MMC card.
///
/// Geometry comes from the card's CSD register and is trusted as reported.
pub trait SdCard {
    /// Card capacity in sectors.
    fn capacity(&self) -> u32;
    /// Sector size in bytes. Must be non-zero: the dispatcher divides
    /// buffer lengths by this value to derive sector counts, and a card
    /// reporting zero will panic the request.
    fn sector_size(&self) -> u32;
    fn read_sectors(&mut self, start_lba: u32, num_sectors: u32, dest: &mut [u8])
        -> Result<(), ErrorKind>;
    fn write_sectors(&mut self, start_lba: u32, num_sectors: u32, src: &[u8])
        -> Result<(), ErrorKind>;
}

/// The backend-agnostic capability set the command responder dispatches to.
///
/// `read` and `write` receive both the translated byte address and the raw
/// LBA so each implementation can use its native addressing: flash consumes
/// `addr`, SD/MMC consumes `lba` and derives a sector count from the buffer
/// length.
pub trait StorageBackend {
    fn sector_count(&self) -> u32;
    fn sector_size(&self) -> u32;
    fn read(&mut self, addr: u32, lba: u32, dest: &mut [u8]) -> Result<(), ErrorKind>;
    fn write(&mut self, addr: u32, lba: u32, src: &[u8]) -> Result<(), ErrorKind>;
}

/// Wear-leveled flash backend.
pub struct FlashBackend<W: WearLevelVolume> {
    pub(crate) volume: W,
}

impl<W: WearLevelVolume> FlashBackend<W> {
    pub(crate) fn new(volume: W) -> Self {
        FlashBackend { volume }
    }
}

impl<W: WearLevelVolume> StorageBackend for FlashBackend<W> {
    fn sector_count(&self) -> u32 {
        let size = self.volume.sector_size();
        if size == 0 {
            warn!("WL sector size is zero");
            return 0;
        }
        self.volume.size() / size
    }

    fn sector_size(&self) -> u32 {
        self.volume.sector_size()
    }

    fn read(&mut self, addr: u32, _lba: u32, dest: &mut [u8]) -> Result<(), ErrorKind> {
        self.volume.read(addr, dest)
    }

    fn write(&mut self, addr: u32, _lba: u32, src: &[u8]) -> Result<(), ErrorKind> {
        // Erase must complete before the write is attempted; an erase
        // failure leaves the target range untouched.
        self.volume.erase_range(addr, src.len() as u32)?;
        self.volume.write(addr, src)
    }
}

/// SD/MMC card backend. The card manages erasure internally, so writes go
/// straight through in sector units.
pub struct SdMmcBackend<C: SdCard> {
    pub(crate) card: C,
}

impl<C: SdCard> SdMmcBackend<C> {
    pub(crate) fn new(card: C) -> Self {
        SdMmcBackend { card }
    }
}

impl<C: SdCard> StorageBackend for SdMmcBackend<C> {
    fn sector_count(&self) -> u32 {
        self.card.capacity()
    }

    fn sector_size(&self) -> u32 {
        self.card.sector_size()
    }

    fn read(&mut self, _addr: u32, lba: u32, dest: &mut [u8]) -> Result<(), ErrorKind> {
        let num_sectors = dest.len() as u32 / self.card.sector_size();
        self.card.read_sectors(lba, num_sectors, dest)
    }

    fn write(&mut self, _addr: u32, lba: u32, src: &[u8]) -> Result<(), ErrorKind> {
        let num_sectors = src.len() as u32 / self.card.sector_size();
        self.card.write_sectors(lba, num_sectors, src)
    }
}
