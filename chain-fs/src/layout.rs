//! On-disk layout: superblock and root directory.
//!
//! Block 0 holds the superblock, blocks `1..=fat_blocks` the allocation
//! table, the next block the root directory, and everything after that is
//! the data region. All multi-byte fields are little-endian.
use core::fmt::{Debug, Formatter, Result};

use crate::fat::{FAT_ENTRIES_PER_BLOCK, FAT_EOC};
use crate::{DataBlock, FsError, FsResult};

/// 8-byte signature at the start of every image
pub const FS_MAGIC: [u8; 8] = *b"CHAINFS1";

/// longest stored file name, NUL terminator excluded
pub const NAME_LENGTH_LIMIT: usize = 15;

/// number of root directory slots; 128 encoded entries fill one block
pub const ROOT_DIR_CAPACITY: usize = 128;

/// size of an encoded directory entry
pub const DIRENT_SZ: usize = 32;

/// the FAT region starts right after the superblock
pub const FAT_START_BLOCK: usize = 1;

pub fn read_u16(buf: &[u8], offset: usize) -> u16 {
  u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

pub fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
  buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn read_u32(buf: &[u8], offset: usize) -> u32 {
  u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
  buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Decoded superblock (block 0).
pub struct SuperBlock {
  magic: [u8; 8],
  pub total_blocks: u16,
  pub root_dir_block: u16,
  pub data_start_block: u16,
  pub data_blocks: u16,
  pub fat_blocks: u8,
}

impl Debug for SuperBlock {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    f.debug_struct("SuperBlock")
      .field("total_blocks", &self.total_blocks)
      .field("fat_blocks", &self.fat_blocks)
      .field("root_dir_block", &self.root_dir_block)
      .field("data_start_block", &self.data_start_block)
      .field("data_blocks", &self.data_blocks)
      .finish()
  }
}

impl SuperBlock {
  /// Solve the layout for a device of `device_blocks` blocks: the smallest
  /// FAT region whose entries cover the remaining data region. Needs room
  /// for the superblock, one FAT block, the root directory and at least one
  /// data block.
  pub fn new(device_blocks: usize) -> FsResult<Self> {
    let total = match u16::try_from(device_blocks) {
      Ok(t) => t as usize,
      Err(_) => return Err(FsError::InvalidImage),
    };
    let mut fat_blocks = 1usize;
    loop {
      let data_start = FAT_START_BLOCK + fat_blocks + 1;
      if data_start >= total {
        return Err(FsError::InvalidImage);
      }
      let data_blocks = total - data_start;
      if fat_blocks * FAT_ENTRIES_PER_BLOCK >= data_blocks {
        return Ok(Self {
          magic: FS_MAGIC,
          total_blocks: total as u16,
          root_dir_block: (FAT_START_BLOCK + fat_blocks) as u16,
          data_start_block: data_start as u16,
          data_blocks: data_blocks as u16,
          fat_blocks: fat_blocks as u8,
        });
      }
      fat_blocks += 1;
    }
  }

  pub fn decode(block: &DataBlock) -> Self {
    let mut magic = [0u8; 8];
    magic.copy_from_slice(&block[0..8]);
    Self {
      magic,
      total_blocks: read_u16(block, 8),
      root_dir_block: read_u16(block, 10),
      data_start_block: read_u16(block, 12),
      data_blocks: read_u16(block, 14),
      fat_blocks: block[16],
    }
  }

  pub fn encode(&self, block: &mut DataBlock) {
    block.fill(0);
    block[0..8].copy_from_slice(&self.magic);
    write_u16(block, 8, self.total_blocks);
    write_u16(block, 10, self.root_dir_block);
    write_u16(block, 12, self.data_start_block);
    write_u16(block, 14, self.data_blocks);
    block[16] = self.fat_blocks;
  }

  /// A decoded superblock is trusted for block indexing afterwards, so
  /// every region bound gets checked here, not just the signature.
  pub fn validate(&self, device_blocks: usize) -> FsResult<()> {
    let total = self.total_blocks as usize;
    let fat_blocks = self.fat_blocks as usize;
    let root = self.root_dir_block as usize;
    let data_start = self.data_start_block as usize;
    let data_blocks = self.data_blocks as usize;
    let consistent = self.magic == FS_MAGIC
      && total == device_blocks
      && fat_blocks >= 1
      && data_blocks >= 1
      && root == FAT_START_BLOCK + fat_blocks
      && data_start == root + 1
      && data_start + data_blocks == total
      && fat_blocks * FAT_ENTRIES_PER_BLOCK >= data_blocks;
    if consistent {
      Ok(())
    } else {
      Err(FsError::InvalidImage)
    }
  }
}

/// One root directory slot: a slot is free iff the first name byte is NUL.
#[derive(Clone, Copy)]
pub struct DirEntry {
  name: [u8; NAME_LENGTH_LIMIT + 1],
  size: u32,
  first_block: u16,
}

/// a legal name is 1 to 15 bytes with no NUL
pub fn name_is_valid(name: &[u8]) -> bool {
  !name.is_empty() && name.len() <= NAME_LENGTH_LIMIT && !name.contains(&0)
}

impl DirEntry {
  pub fn empty() -> Self {
    Self {
      name: [0; NAME_LENGTH_LIMIT + 1],
      size: 0,
      first_block: FAT_EOC,
    }
  }

  /// fresh zero-length entry; `name` must already satisfy `name_is_valid`
  pub fn new(name: &[u8]) -> Self {
    let mut bytes = [0u8; NAME_LENGTH_LIMIT + 1];
    bytes[..name.len()].copy_from_slice(name);
    Self {
      name: bytes,
      size: 0,
      first_block: FAT_EOC,
    }
  }

  pub fn is_free(&self) -> bool {
    self.name[0] == 0
  }

  /// name up to the first NUL; a corrupt full array yields all 16 bytes
  pub fn name_bytes(&self) -> &[u8] {
    let len = self.name.iter().position(|b| *b == 0).unwrap_or(self.name.len());
    &self.name[..len]
  }

  pub fn size(&self) -> u32 {
    self.size
  }

  pub fn set_size(&mut self, size: u32) {
    self.size = size;
  }

  pub fn first_block(&self) -> u16 {
    self.first_block
  }

  pub fn set_first_block(&mut self, first_block: u16) {
    self.first_block = first_block;
  }

  pub fn decode(buf: &[u8]) -> Self {
    let mut name = [0u8; NAME_LENGTH_LIMIT + 1];
    name.copy_from_slice(&buf[0..NAME_LENGTH_LIMIT + 1]);
    Self {
      name,
      size: read_u32(buf, 16),
      first_block: read_u16(buf, 20),
    }
  }

  pub fn encode(&self, buf: &mut [u8]) {
    buf.fill(0);
    buf[0..NAME_LENGTH_LIMIT + 1].copy_from_slice(&self.name);
    write_u32(buf, 16, self.size);
    write_u16(buf, 20, self.first_block);
  }
}

/// In-memory mirror of the root directory block.
pub struct RootDirectory {
  entries: [DirEntry; ROOT_DIR_CAPACITY],
}

impl RootDirectory {
  pub fn empty() -> Self {
    Self {
      entries: [DirEntry::empty(); ROOT_DIR_CAPACITY],
    }
  }

  pub fn decode(block: &DataBlock) -> Self {
    let mut dir = Self::empty();
    for (i, entry) in dir.entries.iter_mut().enumerate() {
      *entry = DirEntry::decode(&block[i * DIRENT_SZ..(i + 1) * DIRENT_SZ]);
    }
    dir
  }

  pub fn encode(&self, block: &mut DataBlock) {
    for (i, entry) in self.entries.iter().enumerate() {
      entry.encode(&mut block[i * DIRENT_SZ..(i + 1) * DIRENT_SZ]);
    }
  }

  /// slot holding `name`, compared as raw bytes
  pub fn find(&self, name: &[u8]) -> Option<usize> {
    self.entries.iter().position(|e| !e.is_free() && e.name_bytes() == name)
  }

  /// lowest free slot
  pub fn free_slot(&self) -> Option<usize> {
    self.entries.iter().position(|e| e.is_free())
  }

  pub fn free_count(&self) -> usize {
    self.entries.iter().filter(|e| e.is_free()).count()
  }

  /// occupied entries in slot order
  pub fn files(&self) -> impl Iterator<Item = &DirEntry> {
    self.entries.iter().filter(|e| !e.is_free())
  }

  pub fn entry(&self, slot: usize) -> &DirEntry {
    &self.entries[slot]
  }

  pub fn entry_mut(&mut self, slot: usize) -> &mut DirEntry {
    &mut self.entries[slot]
  }
}
