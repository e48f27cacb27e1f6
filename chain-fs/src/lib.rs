//! A FAT-style filesystem for a fixed-size block device: flat root
//! directory, 16-bit allocation chains, one mount session at a time.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod block_dev;
mod fat;
mod fd;
mod fs;
mod layout;

pub const BLOCK_SZ: usize = 4096;
type DataBlock = [u8; BLOCK_SZ];

pub use block_dev::BlockDevice;
pub use fat::FAT_EOC;
pub use fd::OPEN_MAX;
pub use fs::{FileInfo, FileSystem, FsInfo};
pub use layout::{NAME_LENGTH_LIMIT, ROOT_DIR_CAPACITY};

/// Failure modes of filesystem operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsError {
  /// the block device failed a read, write or close
  Io,
  /// signature or geometry of block 0 does not describe this device
  InvalidImage,
  NotMounted,
  Busy,
  InvalidName,
  AlreadyExists,
  NotFound,
  DirectoryFull,
  TooManyOpen,
  NotOpen,
  OutOfRange,
}

impl core::fmt::Display for FsError {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    let msg = match self {
      FsError::Io => "block device error",
      FsError::InvalidImage => "invalid filesystem image",
      FsError::NotMounted => "no filesystem mounted",
      FsError::Busy => "resource busy",
      FsError::InvalidName => "invalid file name",
      FsError::AlreadyExists => "file already exists",
      FsError::NotFound => "file not found",
      FsError::DirectoryFull => "root directory full",
      FsError::TooManyOpen => "too many open files",
      FsError::NotOpen => "file descriptor not open",
      FsError::OutOfRange => "offset out of range",
    };
    f.write_str(msg)
  }
}

pub type FsResult<T> = core::result::Result<T, FsError>;
