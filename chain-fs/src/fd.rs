use crate::{FsError, FsResult};

/// fixed number of simultaneously open descriptors
pub const OPEN_MAX: usize = 32;

/// Cursor state of one open file.
#[derive(Clone, Copy, Debug)]
pub struct FileDescriptor {
  /// root directory slot the descriptor is bound to
  pub entry: usize,
  /// byte offset the next read or write starts at
  pub offset: usize,
}

/// Fixed-capacity descriptor table.
///
/// Handles are slot index + 1, so 0 is never a valid handle and every
/// invalid handle fails the same way.
pub struct FdTable {
  slots: [Option<FileDescriptor>; OPEN_MAX],
}

impl FdTable {
  pub fn new() -> Self {
    Self {
      slots: [None; OPEN_MAX],
    }
  }

  /// bind the lowest free slot to directory slot `entry`, cursor at 0
  pub fn open(&mut self, entry: usize) -> FsResult<usize> {
    let slot = self
      .slots
      .iter()
      .position(|s| s.is_none())
      .ok_or(FsError::TooManyOpen)?;
    self.slots[slot] = Some(FileDescriptor { entry, offset: 0 });
    Ok(slot + 1)
  }

  pub fn close(&mut self, fd: usize) -> FsResult<()> {
    let slot = Self::slot_of(fd)?;
    if self.slots[slot].take().is_none() {
      return Err(FsError::NotOpen);
    }
    Ok(())
  }

  pub fn get(&self, fd: usize) -> FsResult<FileDescriptor> {
    self.slots[Self::slot_of(fd)?].ok_or(FsError::NotOpen)
  }

  pub fn get_mut(&mut self, fd: usize) -> FsResult<&mut FileDescriptor> {
    self.slots[Self::slot_of(fd)?].as_mut().ok_or(FsError::NotOpen)
  }

  /// is any open descriptor bound to directory slot `entry`?
  pub fn any_bound_to(&self, entry: usize) -> bool {
    self.slots.iter().flatten().any(|fd| fd.entry == entry)
  }

  pub fn open_count(&self) -> usize {
    self.slots.iter().flatten().count()
  }

  fn slot_of(fd: usize) -> FsResult<usize> {
    fd.checked_sub(1).filter(|slot| *slot < OPEN_MAX).ok_or(FsError::NotOpen)
  }
}
