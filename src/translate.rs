use log::error;

use crate::error::ErrorKind;

/// Translate `(lba, offset)` into an absolute byte address.
///
/// The address space is 32-bit; both the `lba * sector_size` multiply and
/// the `+ offset` add are checked separately and fail with
/// [`ErrorKind::InvalidSize`] on overflow.
pub(crate) fn byte_address(lba: u32, offset: u32, sector_size: u32) -> Result<u32, ErrorKind> {
    let base = match lba.checked_mul(sector_size) {
        Some(base) => base,
        None => {
            error!("overflow lba {} sector_size {}", lba, sector_size);
            return Err(ErrorKind::InvalidSize);
        }
    };
    match base.checked_add(offset) {
        Some(addr) => Ok(addr),
        None => {
            error!("overflow addr {} offset {}", base, offset);
            Err(ErrorKind::InvalidSize)
        }
    }
}

/// Validate a write request against the backend sector geometry.
///
/// Writes must start on a sector boundary and cover whole sectors. Reads are
/// deliberately not routed through this check; a misaligned read reaches the
/// backend unchanged.
pub(crate) fn check_write_alignment(
    addr: u32,
    size: u32,
    sector_size: u32,
) -> Result<(), ErrorKind> {
    if sector_size == 0 {
        error!("write rejected, sector size is zero");
        return Err(ErrorKind::InvalidArgument);
    }
    if addr % sector_size != 0 || size % sector_size != 0 {
        error!(
            "invalid argument addr({}) size({}) sector_size({})",
            addr, size, sector_size
        );
        return Err(ErrorKind::InvalidArgument);
    }
    Ok(())
}
