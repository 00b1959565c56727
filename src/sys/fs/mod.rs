//! Boot filesystem — read-only image loaded by the bootloader as a module
//!
//! LAYOUT (4 KiB blocks):
//!   Block 0          : boot block
//!   Block 1..=N      : inodes (N = inode_count)
//!   Block N+1..      : data blocks
//!
//! BOOT BLOCK:
//!   [0..4]    dir_count
//!   [4..8]    inode_count
//!   [8..12]   data_count
//!   [12..64]  reserved
//!   [64..]    63 dentries × 64 bytes
//!
//! DENTRY (64 bytes):
//!   [0..32]   name (NUL padded, not terminated when 32 long)
//!   [32..36]  type  0 = rtc, 1 = directory, 2 = regular file
//!   [36..40]  inode
//!   [40..64]  reserved
//!
//! INODE (4 KiB):
//!   [0..4]    length in bytes
//!   [4..]     data block numbers

pub mod bootfs;

#[cfg(test)]
pub mod image;

pub use bootfs::BootFs;

use core::fmt;

pub const BLOCK_SIZE:    usize = 4096;
pub const FILENAME_MAX:  usize = 32;
pub const DENTRY_SIZE:   usize = 64;
pub const MAX_DENTRIES:  usize = 63;
pub const BOOT_HEADER:   usize = 64;
/// Block numbers that fit after the length field
pub const INODE_BLOCKS:  usize = BLOCK_SIZE / 4 - 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    Rtc       = 0,
    Directory = 1,
    Regular   = 2,
}

impl FileType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(FileType::Rtc),
            1 => Some(FileType::Directory),
            2 => Some(FileType::Regular),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dentry {
    name:      [u8; FILENAME_MAX],
    pub kind:  FileType,
    pub inode: u32,
}

impl Dentry {
    pub fn new(name: &[u8], kind: FileType, inode: u32) -> Self {
        let mut buf = [0u8; FILENAME_MAX];
        let n = name.len().min(FILENAME_MAX);
        buf[..n].copy_from_slice(&name[..n]);
        Self { name: buf, kind, inode }
    }

    /// Name without the NUL padding
    pub fn name(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(FILENAME_MAX);
        &self.name[..len]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsError {
    /// Image shorter than its own header claims
    Truncated,
    NotFound,
    NameTooLong,
    BadIndex(u32),
    BadInode(u32),
    BadBlock(u32),
    BadType(u32),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FsError::Truncated   => write!(f, "filesystem image is truncated"),
            FsError::NotFound    => write!(f, "no such file"),
            FsError::NameTooLong => write!(f, "file name longer than {} bytes", FILENAME_MAX),
            FsError::BadIndex(i) => write!(f, "directory index {} out of range", i),
            FsError::BadInode(i) => write!(f, "inode {} out of range", i),
            FsError::BadBlock(b) => write!(f, "data block {} out of range", b),
            FsError::BadType(t)  => write!(f, "unknown file type {}", t),
        }
    }
}
