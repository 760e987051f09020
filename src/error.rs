#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A storage handle already exists; deinit it before creating another.
    AlreadyInitialized,
    /// LBA to byte-address arithmetic overflowed the 32-bit address space.
    InvalidSize,
    /// Misaligned write request, or an unrecognized event kind.
    InvalidArgument,
    /// The backend medium failed a read, write, or erase.
    Io,
    /// SCSI opcode outside the handled set.
    UnsupportedCommand,
}
