#![cfg_attr(not(test), no_std)]

//! Storage backing for a USB Mass Storage Class (MSC) device.
//!
//! The crate sits between a USB protocol engine's SCSI callbacks and one of
//! two physical media: a wear-leveled raw-flash partition (byte addressed)
//! or an SD/MMC card (sector addressed). Both are driven through the same
//! four-operation capability set, with LBA to byte-address translation
//! checked for overflow before any backend call.

mod backend;
mod error;
mod scsi;
mod storage;
mod translate;

pub use backend::{FlashBackend, SdCard, SdMmcBackend, StorageBackend, WearLevelVolume};
pub use error::ErrorKind;
pub use scsi::{
    Capacity, InquiryResponse, SenseData, SCSI_ASCQ, SCSI_ASC_INVALID_COMMAND_OPERATION_CODE,
    SCSI_ASC_MEDIUM_NOT_PRESENT, SCSI_CMD_PREVENT_ALLOW_MEDIUM_REMOVAL,
    SCSI_SENSE_ILLEGAL_REQUEST,
};
pub use storage::{Config, EventKind, MountEvent, MscCallback, MscStorage, DEFAULT_MAX_FILES};
