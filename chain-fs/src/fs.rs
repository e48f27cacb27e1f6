//! Mount lifecycle and the operation surface of a mounted session.
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::debug;

use crate::block_dev::BlockDevice;
use crate::fat::{Fat, FAT_EOC};
use crate::fd::FdTable;
use crate::layout::{
  name_is_valid, DirEntry, RootDirectory, SuperBlock, FAT_START_BLOCK, ROOT_DIR_CAPACITY,
};
use crate::{DataBlock, FsError, FsResult, BLOCK_SZ};

/// A mounted filesystem.
///
/// Owns the device plus in-memory mirrors of the FAT and the root
/// directory. Every mutating operation persists the blocks it touched
/// before returning, so a dropped session loses nothing.
pub struct FileSystem {
  device: Arc<dyn BlockDevice>,
  superblock: SuperBlock,
  fat: Fat,
  root_dir: RootDirectory,
  fds: FdTable,
}

/// Snapshot of mount-wide counters, in block units.
#[derive(Clone, Copy, Debug)]
pub struct FsInfo {
  pub total_blocks: usize,
  pub fat_blocks: usize,
  pub root_dir_block: usize,
  pub data_start_block: usize,
  pub data_blocks: usize,
  /// data blocks currently allocatable
  pub free_data_blocks: usize,
  /// data blocks files could ever occupy; the reserved entry is not one
  pub usable_data_blocks: usize,
  pub free_dir_entries: usize,
  pub dir_capacity: usize,
}

/// One row of a directory listing.
#[derive(Clone, Debug)]
pub struct FileInfo {
  pub name: String,
  pub size: u32,
  /// head of the file's chain; `FAT_EOC` when the file has no blocks
  pub first_block: u16,
}

fn read_block(device: &Arc<dyn BlockDevice>, block_id: usize) -> FsResult<DataBlock> {
  let mut buf = [0u8; BLOCK_SZ];
  device.read_block(block_id, &mut buf)?;
  Ok(buf)
}

impl FileSystem {
  /// Write a fresh empty filesystem onto `device` and mount it.
  pub fn format(device: Arc<dyn BlockDevice>) -> FsResult<FileSystem> {
    let superblock = SuperBlock::new(device.block_count())?;
    let fat = Fat::new(superblock.data_blocks as usize);
    let root_dir = RootDirectory::empty();

    let mut block = [0u8; BLOCK_SZ];
    superblock.encode(&mut block);
    device.write_block(0, &block)?;
    for i in 0..superblock.fat_blocks as usize {
      fat.store_block(i, &mut block);
      device.write_block(FAT_START_BLOCK + i, &block)?;
    }
    root_dir.encode(&mut block);
    device.write_block(superblock.root_dir_block as usize, &block)?;

    debug!("formatted image: {:?}", superblock);
    Ok(Self {
      device,
      superblock,
      fat,
      root_dir,
      fds: FdTable::new(),
    })
  }

  /// Mount the filesystem on `device`.
  ///
  /// Reads block 0, checks the signature and that the recorded geometry
  /// matches the device, then loads the FAT and root directory mirrors.
  pub fn mount(device: Arc<dyn BlockDevice>) -> FsResult<FileSystem> {
    let block = read_block(&device, 0)?;
    let superblock = SuperBlock::decode(&block);
    superblock.validate(device.block_count())?;

    let mut fat = Fat::new(superblock.data_blocks as usize);
    for i in 0..superblock.fat_blocks as usize {
      let fat_block = read_block(&device, FAT_START_BLOCK + i)?;
      fat.load_block(i, &fat_block);
    }
    let dir_block = read_block(&device, superblock.root_dir_block as usize)?;
    let root_dir = RootDirectory::decode(&dir_block);

    debug!("mounted image: {:?}", superblock);
    Ok(Self {
      device,
      superblock,
      fat,
      root_dir,
      fds: FdTable::new(),
    })
  }

  /// Release the session and close the device.
  ///
  /// Fails with `Busy` while any descriptor is open, handing the session
  /// back so the caller can close the strays and retry. Nothing is
  /// flushed here; mutating operations already were.
  pub fn unmount(self) -> Result<(), (FileSystem, FsError)> {
    if self.fds.open_count() > 0 {
      return Err((self, FsError::Busy));
    }
    if let Err(e) = self.device.close() {
      return Err((self, e));
    }
    debug!("unmounted image");
    Ok(())
  }

  /// Mount-wide counters.
  pub fn info(&self) -> FsInfo {
    FsInfo {
      total_blocks: self.superblock.total_blocks as usize,
      fat_blocks: self.superblock.fat_blocks as usize,
      root_dir_block: self.superblock.root_dir_block as usize,
      data_start_block: self.superblock.data_start_block as usize,
      data_blocks: self.superblock.data_blocks as usize,
      free_data_blocks: self.fat.free_count(),
      usable_data_blocks: (self.superblock.data_blocks as usize).saturating_sub(1),
      free_dir_entries: self.root_dir.free_count(),
      dir_capacity: ROOT_DIR_CAPACITY,
    }
  }

  /// Create an empty file named `name`.
  pub fn create(&mut self, name: &str) -> FsResult<()> {
    if !name_is_valid(name.as_bytes()) {
      return Err(FsError::InvalidName);
    }
    if self.root_dir.find(name.as_bytes()).is_some() {
      return Err(FsError::AlreadyExists);
    }
    let slot = self.root_dir.free_slot().ok_or(FsError::DirectoryFull)?;
    *self.root_dir.entry_mut(slot) = DirEntry::new(name.as_bytes());
    self.flush_root_dir()
  }

  /// Delete `name`, returning its blocks to the free pool.
  pub fn delete(&mut self, name: &str) -> FsResult<()> {
    let slot = self.root_dir.find(name.as_bytes()).ok_or(FsError::NotFound)?;
    if self.fds.any_bound_to(slot) {
      return Err(FsError::Busy);
    }
    self.fat.free_chain(self.root_dir.entry(slot).first_block());
    *self.root_dir.entry_mut(slot) = DirEntry::empty();
    self.flush_fat()?;
    self.flush_root_dir()
  }

  /// Snapshot of the directory listing, in slot order.
  pub fn ls(&self) -> Vec<FileInfo> {
    self
      .root_dir
      .files()
      .map(|e| FileInfo {
        name: String::from_utf8_lossy(e.name_bytes()).into_owned(),
        size: e.size(),
        first_block: e.first_block(),
      })
      .collect()
  }

  /// Open `name`; the returned handle starts with its cursor at offset 0.
  pub fn open(&mut self, name: &str) -> FsResult<usize> {
    let slot = self.root_dir.find(name.as_bytes()).ok_or(FsError::NotFound)?;
    self.fds.open(slot)
  }

  /// Close an open descriptor.
  pub fn close(&mut self, fd: usize) -> FsResult<()> {
    self.fds.close(fd)
  }

  /// Current size in bytes of the file behind `fd`.
  pub fn stat(&self, fd: usize) -> FsResult<u32> {
    let state = self.fds.get(fd)?;
    Ok(self.root_dir.entry(state.entry).size())
  }

  /// Move the cursor of `fd`. Seeking to the current size is allowed,
  /// past it is not.
  pub fn seek(&mut self, fd: usize, offset: usize) -> FsResult<()> {
    let entry = self.fds.get(fd)?.entry;
    if offset > self.root_dir.entry(entry).size() as usize {
      return Err(FsError::OutOfRange);
    }
    self.fds.get_mut(fd)?.offset = offset;
    Ok(())
  }

  /// Read from the cursor into `buf`, advancing the cursor.
  ///
  /// Returns the byte count; 0 means end of file, never an error.
  pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> FsResult<usize> {
    let state = self.fds.get(fd)?;
    let entry = self.root_dir.entry(state.entry);
    let size = entry.size() as usize;
    let first = entry.first_block();
    if state.offset >= size || buf.is_empty() || first == FAT_EOC {
      return Ok(0);
    }

    let staged = self.stage_chain(first)?;
    let len = buf
      .len()
      .min(size - state.offset)
      .min(staged.len().saturating_sub(state.offset));
    if len == 0 {
      // a truncated chain can leave the cursor beyond the staged bytes
      return Ok(0);
    }
    buf[..len].copy_from_slice(&staged[state.offset..state.offset + len]);
    self.fds.get_mut(fd)?.offset += len;
    Ok(len)
  }

  /// Write `buf` at the cursor, advancing the cursor by the returned
  /// count.
  ///
  /// Overwrites within the current size, then grows the file block by
  /// block. A full data region truncates the write to what fit; the
  /// returned count is short then, not an error.
  pub fn write(&mut self, fd: usize, buf: &[u8]) -> FsResult<usize> {
    let state = self.fds.get(fd)?;
    if buf.is_empty() {
      return Ok(0);
    }
    let entry = self.root_dir.entry(state.entry);
    let size = entry.size() as usize;
    let offset = state.offset;
    let mut first = entry.first_block();

    // stage the whole existing chain
    let mut chain: Vec<u16> = self.fat.chain(first).collect();
    let mut staged: Vec<u8> = Vec::with_capacity((chain.len() + 1) * BLOCK_SZ);
    for &index in &chain {
      let block = read_block(&self.device, self.data_block_id(index))?;
      staged.extend_from_slice(&block);
    }

    // overwrite the part under the current size in one batch
    let in_place = buf
      .len()
      .min(size.saturating_sub(offset))
      .min(staged.len().saturating_sub(offset));
    if in_place > 0 {
      staged[offset..offset + in_place].copy_from_slice(&buf[..in_place]);
    }
    let mut written = in_place;

    // grow: fill the slack of the tail block, allocate when it runs out
    while written < buf.len() {
      let pos = offset + written;
      if pos >= staged.len() {
        let new_index = match self.fat.alloc() {
          Some(index) => index,
          None => {
            debug!("data region exhausted, write truncated at {} bytes", written);
            break;
          }
        };
        match chain.last() {
          Some(&tail) => self.fat.set(tail, new_index),
          None => first = new_index,
        }
        chain.push(new_index);
        staged.resize(chain.len() * BLOCK_SZ, 0);
        continue;
      }
      let n = (staged.len() - pos).min(buf.len() - written);
      staged[pos..pos + n].copy_from_slice(&buf[written..written + n]);
      written += n;
    }

    // persist the chain, then the metadata that names it
    for (i, &index) in chain.iter().enumerate() {
      let start = i * BLOCK_SZ;
      self
        .device
        .write_block(self.data_block_id(index), &staged[start..start + BLOCK_SZ])?;
    }
    let new_size = size.max(offset + written) as u32;
    let entry = self.root_dir.entry_mut(state.entry);
    entry.set_size(new_size);
    entry.set_first_block(first);
    self.flush_root_dir()?;
    self.flush_fat()?;

    self.fds.get_mut(fd)?.offset = offset + written;
    Ok(written)
  }

  /// Stage a file's whole chain into one contiguous buffer.
  fn stage_chain(&self, first: u16) -> FsResult<Vec<u8>> {
    let mut staged = Vec::new();
    for index in self.fat.chain(first) {
      let block = read_block(&self.device, self.data_block_id(index))?;
      staged.extend_from_slice(&block);
    }
    Ok(staged)
  }

  fn data_block_id(&self, data_index: u16) -> usize {
    self.superblock.data_start_block as usize + data_index as usize
  }

  fn flush_root_dir(&self) -> FsResult<()> {
    let mut block = [0u8; BLOCK_SZ];
    self.root_dir.encode(&mut block);
    self
      .device
      .write_block(self.superblock.root_dir_block as usize, &block)
  }

  fn flush_fat(&self) -> FsResult<()> {
    let mut block = [0u8; BLOCK_SZ];
    for i in 0..self.superblock.fat_blocks as usize {
      self.fat.store_block(i, &mut block);
      self.device.write_block(FAT_START_BLOCK + i, &block)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use alloc::sync::Arc;

  use crate::block_dev::BlockDevice;
  use crate::fat::FAT_EOC;
  use crate::{FsError, FsResult, BLOCK_SZ};

  use super::FileSystem;

  struct RamDisk(spin::Mutex<Vec<u8>>);

  impl RamDisk {
    fn new(blocks: usize) -> Arc<Self> {
      Arc::new(Self(spin::Mutex::new(vec![0; blocks * BLOCK_SZ])))
    }
  }

  impl BlockDevice for RamDisk {
    fn block_count(&self) -> usize {
      self.0.lock().len() / BLOCK_SZ
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> FsResult<()> {
      let data = self.0.lock();
      let start = block_id * BLOCK_SZ;
      buf.copy_from_slice(&data[start..start + BLOCK_SZ]);
      Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> FsResult<()> {
      let mut data = self.0.lock();
      let start = block_id * BLOCK_SZ;
      data[start..start + BLOCK_SZ].copy_from_slice(buf);
      Ok(())
    }
  }

  fn unmount(fs: FileSystem) {
    fs.unmount().map_err(|(_, e)| e).unwrap();
  }

  #[test]
  fn format_then_remount_preserves_geometry() {
    let disk = RamDisk::new(64);
    let fs = FileSystem::format(disk.clone()).unwrap();
    let info = fs.info();
    assert_eq!(info.total_blocks, 64);
    assert_eq!(info.fat_blocks, 1);
    assert_eq!(info.root_dir_block, 2);
    assert_eq!(info.data_start_block, 3);
    assert_eq!(info.data_blocks, 61);
    assert_eq!(info.usable_data_blocks, 60);
    assert_eq!(info.free_data_blocks, 60);
    assert_eq!(info.free_dir_entries, 128);
    assert_eq!(info.dir_capacity, 128);
    unmount(fs);

    let fs = FileSystem::mount(disk).unwrap();
    let again = fs.info();
    assert_eq!(again.total_blocks, 64);
    assert_eq!(again.free_data_blocks, 60);
    unmount(fs);
  }

  #[test]
  fn mount_rejects_foreign_or_mismatched_images() {
    let disk = RamDisk::new(16);
    assert!(matches!(
      FileSystem::mount(disk.clone()),
      Err(FsError::InvalidImage)
    ));

    unmount(FileSystem::format(disk.clone()).unwrap());
    let mut block = [0u8; BLOCK_SZ];
    disk.read_block(0, &mut block).unwrap();
    block[0] ^= 0xff; // break the signature
    disk.write_block(0, &block).unwrap();
    assert!(matches!(
      FileSystem::mount(disk.clone()),
      Err(FsError::InvalidImage)
    ));

    block[0] ^= 0xff; // restore it, then shrink the recorded total
    block[8] = block[8].wrapping_sub(1);
    disk.write_block(0, &block).unwrap();
    assert!(matches!(FileSystem::mount(disk), Err(FsError::InvalidImage)));
  }

  #[test]
  fn write_crossing_a_block_boundary_reads_back() {
    let disk = RamDisk::new(64);
    let mut fs = FileSystem::format(disk).unwrap();
    fs.create("blob").unwrap();
    let fd = fs.open("blob").unwrap();

    let payload = vec![0xab_u8; 5000];
    assert_eq!(fs.write(fd, &payload).unwrap(), 5000);
    assert_eq!(fs.stat(fd).unwrap(), 5000);
    assert_eq!(fs.info().free_data_blocks, 58); // two blocks claimed

    fs.seek(fd, 4096).unwrap();
    let mut buf = [0u8; 1000];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 904);
    assert!(buf[..904].iter().all(|b| *b == 0xab));
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 0); // cursor at end

    fs.close(fd).unwrap();
    unmount(fs);
  }

  #[test]
  fn sequential_writes_advance_the_cursor() {
    let disk = RamDisk::new(64);
    let mut fs = FileSystem::format(disk).unwrap();
    fs.create("log").unwrap();
    let fd = fs.open("log").unwrap();
    assert_eq!(fs.write(fd, b"abc").unwrap(), 3);
    assert_eq!(fs.write(fd, b"def").unwrap(), 3);
    assert_eq!(fs.stat(fd).unwrap(), 6);
    fs.seek(fd, 0).unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 6);
    assert_eq!(&buf[..6], b"abcdef");
    fs.close(fd).unwrap();
  }

  #[test]
  fn overwrite_straddling_two_blocks() {
    let disk = RamDisk::new(64);
    let mut fs = FileSystem::format(disk).unwrap();
    fs.create("blob").unwrap();
    let fd = fs.open("blob").unwrap();
    fs.write(fd, &vec![0xaa_u8; 5000]).unwrap();

    fs.seek(fd, 4090).unwrap();
    assert_eq!(fs.write(fd, &[0xbb; 12]).unwrap(), 12);
    assert_eq!(fs.stat(fd).unwrap(), 5000); // no growth
    assert_eq!(fs.info().free_data_blocks, 58);

    fs.seek(fd, 4089).unwrap();
    let mut buf = [0u8; 14];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 14);
    assert_eq!(buf[0], 0xaa);
    assert!(buf[1..13].iter().all(|b| *b == 0xbb));
    assert_eq!(buf[13], 0xaa);
    fs.close(fd).unwrap();
  }

  #[test]
  fn growth_within_tail_slack_claims_no_block() {
    let disk = RamDisk::new(16);
    let mut fs = FileSystem::format(disk).unwrap();
    fs.create("f").unwrap();
    let fd = fs.open("f").unwrap();
    fs.write(fd, &[9u8; 100]).unwrap();
    let free = fs.info().free_data_blocks;
    fs.seek(fd, 50).unwrap();
    assert_eq!(fs.write(fd, &[8u8; 100]).unwrap(), 100);
    assert_eq!(fs.stat(fd).unwrap(), 150);
    assert_eq!(fs.info().free_data_blocks, free);
    fs.close(fd).unwrap();
  }

  #[test]
  fn growth_links_non_adjacent_blocks() {
    let disk = RamDisk::new(64);
    let mut fs = FileSystem::format(disk).unwrap();
    fs.create("a").unwrap();
    fs.create("b").unwrap();
    let fa = fs.open("a").unwrap();
    let fb = fs.open("b").unwrap();
    fs.write(fa, &vec![0xa1_u8; BLOCK_SZ]).unwrap(); // data block 1
    fs.write(fb, &vec![0xb1_u8; BLOCK_SZ]).unwrap(); // data block 2
    fs.write(fa, &vec![0xa2_u8; BLOCK_SZ]).unwrap(); // grows into block 3

    fs.seek(fa, 0).unwrap();
    let mut buf = vec![0u8; 2 * BLOCK_SZ];
    assert_eq!(fs.read(fa, &mut buf).unwrap(), 2 * BLOCK_SZ);
    assert!(buf[..BLOCK_SZ].iter().all(|b| *b == 0xa1));
    assert!(buf[BLOCK_SZ..].iter().all(|b| *b == 0xa2));

    fs.seek(fb, 0).unwrap();
    let mut bbuf = vec![0u8; BLOCK_SZ];
    assert_eq!(fs.read(fb, &mut bbuf).unwrap(), BLOCK_SZ);
    assert!(bbuf.iter().all(|b| *b == 0xb1));
    fs.close(fa).unwrap();
    fs.close(fb).unwrap();
  }

  #[test]
  fn full_data_region_truncates_writes() {
    let disk = RamDisk::new(6); // one FAT block, two usable data blocks
    let mut fs = FileSystem::format(disk).unwrap();
    assert_eq!(fs.info().usable_data_blocks, 2);
    fs.create("big").unwrap();
    let fd = fs.open("big").unwrap();

    let payload = vec![7u8; 3 * BLOCK_SZ];
    assert_eq!(fs.write(fd, &payload).unwrap(), 2 * BLOCK_SZ);
    assert_eq!(fs.stat(fd).unwrap(), (2 * BLOCK_SZ) as u32);
    assert_eq!(fs.info().free_data_blocks, 0);
    assert_eq!(fs.write(fd, &payload).unwrap(), 0); // nothing left

    fs.create("other").unwrap();
    let fd2 = fs.open("other").unwrap();
    assert_eq!(fs.write(fd2, b"x").unwrap(), 0);
    assert_eq!(fs.stat(fd2).unwrap(), 0);

    // freeing the hog makes room again
    fs.close(fd).unwrap();
    fs.delete("big").unwrap();
    assert_eq!(fs.info().free_data_blocks, 2);
    assert_eq!(fs.write(fd2, b"x").unwrap(), 1);
    fs.close(fd2).unwrap();
  }

  #[test]
  fn delete_while_open_is_busy() {
    let disk = RamDisk::new(64);
    let mut fs = FileSystem::format(disk).unwrap();
    fs.create("held").unwrap();
    let fd = fs.open("held").unwrap();
    fs.write(fd, &vec![1u8; 2 * BLOCK_SZ]).unwrap();

    assert_eq!(fs.delete("held").unwrap_err(), FsError::Busy);
    fs.close(fd).unwrap();
    fs.delete("held").unwrap();
    assert_eq!(fs.info().free_data_blocks, 60);
    assert!(fs.ls().is_empty());
    assert_eq!(fs.open("held").unwrap_err(), FsError::NotFound);
    assert_eq!(fs.delete("held").unwrap_err(), FsError::NotFound);
  }

  #[test]
  fn unmount_with_open_descriptor_is_busy() {
    let disk = RamDisk::new(16);
    let mut fs = FileSystem::format(disk).unwrap();
    fs.create("f").unwrap();
    let fd = fs.open("f").unwrap();

    let mut fs = match fs.unmount() {
      Err((fs, e)) => {
        assert_eq!(e, FsError::Busy);
        fs
      }
      Ok(()) => panic!("unmount should have been refused"),
    };
    fs.close(fd).unwrap();
    unmount(fs);
  }

  #[test]
  fn create_validates_names() {
    let disk = RamDisk::new(16);
    let mut fs = FileSystem::format(disk).unwrap();
    assert_eq!(fs.create("").unwrap_err(), FsError::InvalidName);
    assert_eq!(fs.create("exactly_16_chars").unwrap_err(), FsError::InvalidName);
    assert_eq!(fs.create("with\0nul").unwrap_err(), FsError::InvalidName);

    fs.create("fifteen_chars15").unwrap();
    assert_eq!(fs.create("fifteen_chars15").unwrap_err(), FsError::AlreadyExists);
    let list = fs.ls();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].name, "fifteen_chars15");
    assert_eq!(list[0].size, 0);
    assert_eq!(list[0].first_block, FAT_EOC);
  }

  #[test]
  fn directory_fills_and_reuses_lowest_slot() {
    let disk = RamDisk::new(64);
    let mut fs = FileSystem::format(disk).unwrap();
    for i in 0..128 {
      fs.create(&format!("f{}", i)).unwrap();
    }
    assert_eq!(fs.create("straw").unwrap_err(), FsError::DirectoryFull);
    assert_eq!(fs.info().free_dir_entries, 0);

    fs.delete("f3").unwrap();
    fs.create("newcomer").unwrap();
    let names: Vec<String> = fs.ls().into_iter().map(|f| f.name).collect();
    assert_eq!(names.len(), 128);
    assert_eq!(names[3], "newcomer"); // lowest free slot, not an append
  }

  #[test]
  fn descriptor_handles_are_scarce_and_positive() {
    let disk = RamDisk::new(16);
    let mut fs = FileSystem::format(disk).unwrap();
    fs.create("f").unwrap();
    let mut fds = Vec::new();
    for _ in 0..32 {
      fds.push(fs.open("f").unwrap());
    }
    assert_eq!(fds[0], 1);
    assert_eq!(fs.open("f").unwrap_err(), FsError::TooManyOpen);
    assert_eq!(fs.stat(0).unwrap_err(), FsError::NotOpen);
    assert_eq!(fs.stat(33).unwrap_err(), FsError::NotOpen);
    fs.close(fds[4]).unwrap();
    assert_eq!(fs.open("f").unwrap(), fds[4]);
    assert_eq!(fs.close(999).unwrap_err(), FsError::NotOpen);
  }

  #[test]
  fn seek_is_bounded_by_size() {
    let disk = RamDisk::new(16);
    let mut fs = FileSystem::format(disk).unwrap();
    fs.create("f").unwrap();
    let fd = fs.open("f").unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 0); // empty file
    fs.seek(fd, 0).unwrap();
    assert_eq!(fs.seek(fd, 1).unwrap_err(), FsError::OutOfRange);

    fs.write(fd, b"0123456789").unwrap();
    fs.seek(fd, 10).unwrap(); // exactly at the size
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 0);
    assert_eq!(fs.seek(fd, 11).unwrap_err(), FsError::OutOfRange);
    fs.seek(fd, 4).unwrap();
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 6);
    assert_eq!(&buf[..6], b"456789");
  }

  #[test]
  fn mutations_hit_the_device_before_returning() {
    let disk = RamDisk::new(64);
    let mut fs = FileSystem::format(disk.clone()).unwrap();
    fs.create("wal").unwrap();
    let fd = fs.open("wal").unwrap();
    fs.write(fd, b"persisted").unwrap();

    // a second mount of the same device sees everything already
    let mut other = FileSystem::mount(disk).unwrap();
    let list = other.ls();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].name, "wal");
    assert_eq!(list[0].size, 9);
    let ofd = other.open("wal").unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(other.read(ofd, &mut buf).unwrap(), 9);
    assert_eq!(&buf[..9], b"persisted");
    other.close(ofd).unwrap();
    unmount(other);

    fs.close(fd).unwrap();
    unmount(fs);
  }

  #[test]
  fn contents_survive_remount() {
    let disk = RamDisk::new(64);
    let mut fs = FileSystem::format(disk.clone()).unwrap();
    fs.create("a").unwrap();
    fs.create("b").unwrap();
    let fd = fs.open("a").unwrap();
    let payload: Vec<u8> = (0..3 * BLOCK_SZ + 17).map(|i| (i % 251) as u8).collect();
    assert_eq!(fs.write(fd, &payload).unwrap(), payload.len());
    fs.close(fd).unwrap();
    fs.delete("b").unwrap();
    unmount(fs);

    let mut fs = FileSystem::mount(disk).unwrap();
    assert_eq!(fs.info().free_data_blocks, 56); // four blocks in use
    let list = fs.ls();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].size as usize, payload.len());

    let fd = fs.open("a").unwrap();
    let mut back = vec![0u8; payload.len()];
    assert_eq!(fs.read(fd, &mut back).unwrap(), payload.len());
    assert_eq!(back, payload);
    fs.close(fd).unwrap();
    unmount(fs);
  }

  #[test]
  fn freed_blocks_are_reallocated_lowest_first() {
    let disk = RamDisk::new(64);
    let mut fs = FileSystem::format(disk).unwrap();
    fs.create("a").unwrap();
    fs.create("b").unwrap();
    let fa = fs.open("a").unwrap();
    fs.write(fa, &vec![1u8; 2 * BLOCK_SZ]).unwrap(); // data blocks 1, 2
    let fb = fs.open("b").unwrap();
    fs.write(fb, &[2u8; 10]).unwrap(); // data block 3
    fs.close(fa).unwrap();
    fs.delete("a").unwrap();

    fs.create("c").unwrap();
    let fc = fs.open("c").unwrap();
    fs.write(fc, &[3u8; 1]).unwrap();
    let list = fs.ls();
    let c = list.iter().find(|f| f.name == "c").unwrap();
    assert_eq!(c.first_block, 1);
    let b = list.iter().find(|f| f.name == "b").unwrap();
    assert_eq!(b.first_block, 3);
    fs.close(fb).unwrap();
    fs.close(fc).unwrap();
  }
}
