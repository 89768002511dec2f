//! Storage backend contract
//!
//! Rust view of what SQLite requires from a VFS: a factory ([`Vfs`]) that
//! opens files, and the per-file capability set ([`VfsFile`]). The flag and
//! enum types wrap the engine's raw integer constants.

use std::borrow::Cow;

use rusqlite::ffi;

use crate::errors::Result;

/// Flags SQLite passes to `xOpen`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(i32);

/// Which kind of file SQLite is opening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenKind {
    MainDb,
    MainJournal,
    TempDb,
    TempJournal,
    TransientDb,
    SubJournal,
    SuperJournal,
    Wal,
    Other,
}

impl OpenFlags {
    pub fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> i32 {
        self.0
    }

    fn has(self, flag: i32) -> bool {
        self.0 & flag != 0
    }

    pub fn kind(self) -> OpenKind {
        if self.has(ffi::SQLITE_OPEN_MAIN_DB) {
            OpenKind::MainDb
        } else if self.has(ffi::SQLITE_OPEN_MAIN_JOURNAL) {
            OpenKind::MainJournal
        } else if self.has(ffi::SQLITE_OPEN_TEMP_DB) {
            OpenKind::TempDb
        } else if self.has(ffi::SQLITE_OPEN_TEMP_JOURNAL) {
            OpenKind::TempJournal
        } else if self.has(ffi::SQLITE_OPEN_TRANSIENT_DB) {
            OpenKind::TransientDb
        } else if self.has(ffi::SQLITE_OPEN_SUBJOURNAL) {
            OpenKind::SubJournal
        } else if self.has(ffi::SQLITE_OPEN_SUPER_JOURNAL) {
            OpenKind::SuperJournal
        } else if self.has(ffi::SQLITE_OPEN_WAL) {
            OpenKind::Wal
        } else {
            OpenKind::Other
        }
    }
}

/// Question asked by `xAccess`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessFlag {
    Exists,
    ReadWrite,
    Read,
}

impl AccessFlag {
    pub fn from_raw(flag: i32) -> Self {
        match flag {
            ffi::SQLITE_ACCESS_READWRITE => AccessFlag::ReadWrite,
            ffi::SQLITE_ACCESS_READ => AccessFlag::Read,
            _ => AccessFlag::Exists,
        }
    }
}

/// File lock levels, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockKind {
    None,
    Shared,
    Reserved,
    Pending,
    Exclusive,
}

impl LockKind {
    pub fn from_raw(lock: i32) -> Self {
        match lock {
            ffi::SQLITE_LOCK_SHARED => LockKind::Shared,
            ffi::SQLITE_LOCK_RESERVED => LockKind::Reserved,
            ffi::SQLITE_LOCK_PENDING => LockKind::Pending,
            ffi::SQLITE_LOCK_EXCLUSIVE => LockKind::Exclusive,
            _ => LockKind::None,
        }
    }
}

/// Flags SQLite passes to `xSync`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncFlags(i32);

impl SyncFlags {
    pub fn from_bits(bits: i32) -> Self {
        Self(bits)
    }
}

/// `SQLITE_IOCAP_*` bits returned by `xDeviceCharacteristics`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCharacteristics(i32);

impl DeviceCharacteristics {
    /// The file never changes while it is open
    pub const IMMUTABLE: Self = Self(ffi::SQLITE_IOCAP_IMMUTABLE);

    pub fn bits(self) -> i32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Backend factory registered with the engine
pub trait Vfs: Send + Sync {
    /// Per-session file handle
    type File: VfsFile;

    /// Open `name`; each call yields an independent session
    fn open(&self, name: &str, flags: OpenFlags) -> Result<Self::File>;

    fn delete(&self, name: &str, sync_dir: bool) -> Result<()>;

    /// Whether `name` exists (or is readable/writable, per `flag`)
    fn access(&self, name: &str, flag: AccessFlag) -> Result<bool>;

    /// Canonical form of `name`
    fn full_pathname<'a>(&self, name: &'a str) -> Cow<'a, str>;
}

/// Random-access file contract
///
/// Methods take `&mut self`: the engine drives one file from one caller at
/// a time, and the handle owns all of its state.
pub trait VfsFile: Send {
    /// Fill `buf` from `offset`
    fn read_at(&mut self, buf: &mut [u8], offset: i64) -> Result<()>;

    fn write_at(&mut self, buf: &[u8], offset: i64) -> Result<()>;

    fn truncate(&mut self, size: i64) -> Result<()>;

    fn sync(&mut self, flags: SyncFlags) -> Result<()>;

    fn file_size(&self) -> Result<u64>;

    fn lock(&mut self, lock: LockKind) -> Result<()>;

    fn unlock(&mut self, lock: LockKind) -> Result<()>;

    fn check_reserved_lock(&self) -> Result<bool>;

    /// Sector size in bytes; 0 lets the engine pick its default
    fn sector_size(&self) -> i32;

    fn device_characteristics(&self) -> DeviceCharacteristics;

    fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_kind() {
        let main = OpenFlags::from_bits(
            ffi::SQLITE_OPEN_MAIN_DB | ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_URI,
        );
        assert_eq!(main.kind(), OpenKind::MainDb);

        let wal = OpenFlags::from_bits(ffi::SQLITE_OPEN_WAL | ffi::SQLITE_OPEN_READWRITE);
        assert_eq!(wal.kind(), OpenKind::Wal);

        let temp = OpenFlags::from_bits(
            ffi::SQLITE_OPEN_TEMP_JOURNAL | ffi::SQLITE_OPEN_DELETEONCLOSE,
        );
        assert_eq!(temp.kind(), OpenKind::TempJournal);
    }

    #[test]
    fn test_raw_conversions() {
        assert_eq!(AccessFlag::from_raw(ffi::SQLITE_ACCESS_EXISTS), AccessFlag::Exists);
        assert_eq!(AccessFlag::from_raw(ffi::SQLITE_ACCESS_READ), AccessFlag::Read);
        assert_eq!(LockKind::from_raw(ffi::SQLITE_LOCK_EXCLUSIVE), LockKind::Exclusive);
        assert!(LockKind::Shared < LockKind::Reserved);
    }

    #[test]
    fn test_immutable_characteristic() {
        let caps = DeviceCharacteristics::IMMUTABLE;
        assert!(caps.contains(DeviceCharacteristics::IMMUTABLE));
        assert_eq!(caps.bits(), ffi::SQLITE_IOCAP_IMMUTABLE);
        assert!(!DeviceCharacteristics::default().contains(DeviceCharacteristics::IMMUTABLE));
    }
}
