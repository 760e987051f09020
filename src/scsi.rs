use log::{error, warn};
use zerocopy::AsBytes;

use crate::error::ErrorKind;
use crate::storage::MscStorage;
use crate::translate;
use crate::StorageBackend;

/// Prevent/Allow Medium Removal (1Eh), accepted as a no-op.
pub const SCSI_CMD_PREVENT_ALLOW_MEDIUM_REMOVAL: u8 = 0x1E;

pub const SCSI_SENSE_ILLEGAL_REQUEST: u8 = 0x05;
/// ASC for 'INVALID COMMAND OPERATION CODE'.
pub const SCSI_ASC_INVALID_COMMAND_OPERATION_CODE: u8 = 0x20;
/// ASC for 'MEDIUM NOT PRESENT'. Exported for callers; this layer never
/// raises it itself, a zero-sized backend simply reports zero capacity.
pub const SCSI_ASC_MEDIUM_NOT_PRESENT: u8 = 0x3A;
pub const SCSI_ASCQ: u8 = 0x00;

const INQUIRY_VENDOR_ID: &str = "MSC";
const INQUIRY_PRODUCT_ID: &str = "Mass Storage";
const INQUIRY_PRODUCT_REV: &str = "0.1";

/// Fixed identification strings returned for INQUIRY, space padded to the
/// field widths the protocol layer copies into the endpoint buffer.
#[derive(AsBytes, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct InquiryResponse {
    pub vendor_id: [u8; 8],
    pub product_id: [u8; 16],
    pub product_rev: [u8; 4],
}

/// Sense condition recorded for the host after a failed command.
#[derive(AsBytes, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SenseData {
    pub key: u8,
    pub asc: u8,
    pub ascq: u8,
}

/// Disk size as reported to READ CAPACITY (10).
///
/// The block size field is 16 bits; backend sector sizes above 0xFFFF
/// silently truncate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub block_count: u32,
    pub block_size: u16,
}

fn copy_padded(dest: &mut [u8], src: &str) {
    let n = core::cmp::min(dest.len(), src.len());
    dest[..n].copy_from_slice(&src.as_bytes()[..n]);
    dest[n..].fill(b' ');
}

impl<B: StorageBackend> MscStorage<B> {
    /// SCSI INQUIRY: static identification, no backend interaction.
    pub fn inquiry(&self) -> InquiryResponse {
        let mut response = InquiryResponse {
            vendor_id: [0u8; 8],
            product_id: [0u8; 16],
            product_rev: [0u8; 4],
        };
        copy_padded(&mut response.vendor_id, INQUIRY_VENDOR_ID);
        copy_padded(&mut response.product_id, INQUIRY_PRODUCT_ID);
        copy_padded(&mut response.product_rev, INQUIRY_PRODUCT_REV);
        response
    }

    /// TEST UNIT READY: always ready. There is no medium-presence
    /// detection at this layer.
    pub fn test_unit_ready(&self) -> bool {
        true
    }

    /// READ CAPACITY (10): backend geometry, verbatim.
    pub fn capacity(&self) -> Capacity {
        Capacity {
            block_count: self.sector_count(),
            block_size: self.sector_size() as u16,
        }
    }

    /// START STOP UNIT: reported as success unconditionally; there are no
    /// load/eject semantics here.
    pub fn start_stop(&self, _power_condition: u8, _start: bool, _load_eject: bool) -> bool {
        true
    }

    /// SCSI READ (10). Returns the number of bytes read into `dest`, or 0
    /// on any failure; the failure is logged, not surfaced to the host.
    pub fn read10(&mut self, lba: u32, offset: u32, dest: &mut [u8]) -> u32 {
        match self.read_sector(lba, offset, dest) {
            Ok(()) => dest.len() as u32,
            Err(kind) => {
                error!("read failed lba({}) offset({}): {:?}", lba, offset, kind);
                0
            }
        }
    }

    /// SCSI WRITE (10). Returns the number of bytes written from `src`, or
    /// 0 on any failure; the failure is logged, not surfaced to the host.
    pub fn write10(&mut self, lba: u32, offset: u32, src: &[u8]) -> u32 {
        match self.write_sector(lba, offset, src) {
            Ok(()) => src.len() as u32,
            Err(kind) => {
                error!("write failed lba({}) offset({}): {:?}", lba, offset, kind);
                0
            }
        }
    }

    // Reads are not alignment checked; a misaligned read reaches the
    // backend unchanged.
    fn read_sector(&mut self, lba: u32, offset: u32, dest: &mut [u8]) -> Result<(), ErrorKind> {
        let sector_size = self.sector_size();
        let addr = translate::byte_address(lba, offset, sector_size)?;
        self.backend.read(addr, lba, dest)
    }

    fn write_sector(&mut self, lba: u32, offset: u32, src: &[u8]) -> Result<(), ErrorKind> {
        let sector_size = self.sector_size();
        let addr = translate::byte_address(lba, offset, sector_size)?;
        let size = u32::try_from(src.len()).map_err(|_| ErrorKind::InvalidSize)?;
        translate::check_write_alignment(addr, size, sector_size)?;
        self.backend.write(addr, lba, src)
    }

    /// Entry point for SCSI commands without a dedicated callback. Returns
    /// the number of bytes processed, or a negative value after recording a
    /// sense condition; the protocol layer stalls the endpoint on negative
    /// returns.
    pub fn scsi_command(&mut self, cmd: &[u8; 16], _buffer: &mut [u8]) -> i32 {
        match self.dispatch_scsi(cmd) {
            Ok(bytes_processed) => bytes_processed,
            Err(_) => {
                self.sense = Some(SenseData {
                    key: SCSI_SENSE_ILLEGAL_REQUEST,
                    asc: SCSI_ASC_INVALID_COMMAND_OPERATION_CODE,
                    ascq: SCSI_ASCQ,
                });
                -1
            }
        }
    }

    fn dispatch_scsi(&mut self, cmd: &[u8; 16]) -> Result<i32, ErrorKind> {
        match cmd[0] {
            SCSI_CMD_PREVENT_ALLOW_MEDIUM_REMOVAL => Ok(0),
            opcode => {
                warn!("unsupported SCSI command {:#04x}", opcode);
                Err(ErrorKind::UnsupportedCommand)
            }
        }
    }

    /// Last sense condition recorded for the host, if any.
    pub fn sense(&self) -> Option<SenseData> {
        self.sense
    }
}
