use crate::FsResult;

/// Contract for the block storage a filesystem lives on.
///
/// Blocks are `BLOCK_SZ` bytes, addressed by index from the start of the
/// device. Implementations report failures instead of panicking.
pub trait BlockDevice: Send + Sync {
  /// total number of blocks the device holds
  fn block_count(&self) -> usize;

  /// read block `block_id` into `buf`
  fn read_block(&self, block_id: usize, buf: &mut [u8]) -> FsResult<()>;

  /// write `buf` to block `block_id`
  fn write_block(&self, block_id: usize, buf: &[u8]) -> FsResult<()>;

  /// release the device; called once, by unmount
  fn close(&self) -> FsResult<()> {
    Ok(())
  }
}
