//! File allocation table: one 16-bit entry per data block.
use alloc::vec;
use alloc::vec::Vec;

use log::trace;

use crate::layout::{read_u16, write_u16};
use crate::{DataBlock, BLOCK_SZ};

/// terminal sentinel closing every chain
pub const FAT_EOC: u16 = 0xffff;

pub const FAT_ENTRIES_PER_BLOCK: usize = BLOCK_SZ / 2;

/// In-memory mirror of the allocation table.
///
/// An entry is 0 when its data block is free, `FAT_EOC` at the end of a
/// chain, and the index of the next data block otherwise. Entry 0 is
/// reserved and never handed out.
pub struct Fat {
  entries: Vec<u16>,
}

impl Fat {
  pub fn new(data_blocks: usize) -> Self {
    let mut entries = vec![0u16; data_blocks];
    if let Some(reserved) = entries.first_mut() {
      *reserved = FAT_EOC;
    }
    Self { entries }
  }

  /// overwrite the mirror from FAT block `index` of the image
  pub fn load_block(&mut self, index: usize, block: &DataBlock) {
    let start = index * FAT_ENTRIES_PER_BLOCK;
    let end = self.entries.len().min(start + FAT_ENTRIES_PER_BLOCK);
    for i in start..end {
      self.entries[i] = read_u16(block, (i - start) * 2);
    }
  }

  /// encode FAT block `index` of the image; entries past the table are zero
  pub fn store_block(&self, index: usize, block: &mut DataBlock) {
    block.fill(0);
    let start = index * FAT_ENTRIES_PER_BLOCK;
    let end = self.entries.len().min(start + FAT_ENTRIES_PER_BLOCK);
    for i in start..end {
      write_u16(block, (i - start) * 2, self.entries[i]);
    }
  }

  pub fn get(&self, index: u16) -> u16 {
    self.entries.get(index as usize).copied().unwrap_or(FAT_EOC)
  }

  pub fn set(&mut self, index: u16, value: u16) {
    if let Some(entry) = self.entries.get_mut(index as usize) {
      *entry = value;
    }
  }

  /// claim the lowest free entry, marking it end-of-chain
  pub fn alloc(&mut self) -> Option<u16> {
    let index = self.entries.iter().skip(1).position(|e| *e == 0)? + 1;
    self.entries[index] = FAT_EOC;
    trace!("allocated data block {}", index);
    Some(index as u16)
  }

  /// walk the chain headed by `first`
  pub fn chain(&self, first: u16) -> ChainIter<'_> {
    ChainIter {
      fat: self,
      cur: first,
      remaining: self.entries.len(),
    }
  }

  /// return every block of the chain headed by `first` to the free pool
  pub fn free_chain(&mut self, first: u16) {
    let blocks: Vec<u16> = self.chain(first).collect();
    for index in blocks {
      self.set(index, 0);
      trace!("freed data block {}", index);
    }
  }

  /// free entries, the reserved one excluded
  pub fn free_count(&self) -> usize {
    self.entries.iter().skip(1).filter(|e| **e == 0).count()
  }
}

/// Lazy walk of one chain, yielding data-region-relative block indices.
///
/// Ends on the sentinel. A link that leaves the table or lands on the
/// reserved entry ends the walk too, and it never takes more steps than
/// the table has entries, so a corrupted image cannot loop forever.
#[derive(Clone)]
pub struct ChainIter<'a> {
  fat: &'a Fat,
  cur: u16,
  remaining: usize,
}

impl Iterator for ChainIter<'_> {
  type Item = u16;

  fn next(&mut self) -> Option<u16> {
    if self.cur == FAT_EOC || self.remaining == 0 {
      return None;
    }
    let index = self.cur;
    if index == 0 || index as usize >= self.fat.entries.len() {
      return None;
    }
    self.remaining -= 1;
    self.cur = self.fat.get(index);
    Some(index)
  }
}
