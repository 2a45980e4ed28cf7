//! Fixed-layout payloads for `NtSetSystemInformation`
//!
//! The kernel reads these blocks in place and rejects any call whose length or
//! layout does not match, so each block is encoded field by field at the
//! offsets below instead of relying on a Rust struct layout.
//!
//! | Block                          | Size | Fields (offset: type)                                            |
//! |--------------------------------|------|------------------------------------------------------------------|
//! | `SYSTEM_MEMORY_LIST_COMMAND`   | 4    | 0: i32 command                                                   |
//! | `MEMORY_COMBINE_INFORMATION_EX` (64-bit) | 24 | 0: u64 handle, 8: u64 pages combined, 16: u64 flags     |
//! | `MEMORY_COMBINE_INFORMATION_EX` (32-bit) | 16 | 0: u32 handle, 4: u32 pages combined, 8: u64 flags      |
//! | `SYSTEM_CACHE_INFORMATION` (32-bit) | 36 | 0 current, 4 peak, 8 faults, 12 min ws, 16 max ws, 20..36 unused (u32) |
//! | `SYSTEM_CACHE_INFORMATION` (64-bit) | 72 | 0 current, 8 peak, 16 faults, 24 min ws, 32 max ws, 40..72 unused (i64) |
//!
//! All fields are little-endian.

/// Largest block the engine builds.
pub const CONTROL_BLOCK_CAPACITY: usize = 72;

pub const MEMORY_LIST_COMMAND_SIZE: usize = 4;
pub const COMBINE_INFORMATION_EX_SIZE_64: usize = 24;
pub const COMBINE_INFORMATION_EX_SIZE_32: usize = 16;
pub const SYSTEM_CACHE_INFORMATION_SIZE_32: usize = 36;
pub const SYSTEM_CACHE_INFORMATION_SIZE_64: usize = 72;

/// Offsets of the working-set bounds inside `SYSTEM_CACHE_INFORMATION`.
pub mod cache_offsets {
    pub const MINIMUM_WORKING_SET_32: usize = 12;
    pub const MAXIMUM_WORKING_SET_32: usize = 16;
    pub const MINIMUM_WORKING_SET_64: usize = 24;
    pub const MAXIMUM_WORKING_SET_64: usize = 32;
}

/// Working-set bound meaning "unbounded / flush" in the 32-bit layout.
pub const UNBOUNDED_WORKING_SET_32: u32 = u32::MAX;

/// Working-set bound meaning "unbounded / flush" in the 64-bit layout.
pub const UNBOUNDED_WORKING_SET_64: i64 = -1;

/// `(SIZE_T)-1`: passed as both file cache bounds to flush the cache.
pub const FILE_CACHE_FLUSH_SIZE: usize = usize::MAX;

/// `SYSTEM_INFORMATION_CLASS` values used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SystemInformationClass {
    FileCacheInformation = 0x15,
    MemoryListInformation = 0x50,
    CombinePhysicalMemoryInformation = 0x82,
}

/// `SYSTEM_MEMORY_LIST_COMMAND`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MemoryListCommand {
    CaptureAccessedBits = 0,
    CaptureAndResetAccessedBits = 1,
    EmptyWorkingSets = 2,
    FlushModifiedList = 3,
    PurgeStandbyList = 4,
    PurgeLowPriorityStandbyList = 5,
}

/// A fixed-size, 8-byte aligned payload.
///
/// Only the first `len` bytes are handed to the kernel. The native call
/// borrows the block, so its address cannot move while the call runs.
#[derive(Clone, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct ControlBlock {
    bytes: [u8; CONTROL_BLOCK_CAPACITY],
    len: usize,
}

impl ControlBlock {
    fn zeroed(len: usize) -> Self {
        debug_assert!(len <= CONTROL_BLOCK_CAPACITY);
        Self { bytes: [0; CONTROL_BLOCK_CAPACITY], len }
    }

    fn put_u32(&mut self, offset: usize, value: u32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_i32(&mut self, offset: usize, value: i32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u64(&mut self, offset: usize, value: u64) {
        self.bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    fn put_i64(&mut self, offset: usize, value: i64) {
        self.bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// `SYSTEM_MEMORY_LIST_COMMAND` for `MemoryListInformation`.
    pub fn memory_list_command(command: MemoryListCommand) -> Self {
        let mut block = Self::zeroed(MEMORY_LIST_COMMAND_SIZE);
        block.put_i32(0, command as i32);
        block
    }

    /// `MEMORY_COMBINE_INFORMATION_EX` with a null handle: combine across
    /// the whole system.
    pub fn combine_information_ex(is_64bit: bool) -> Self {
        if is_64bit {
            let mut block = Self::zeroed(COMBINE_INFORMATION_EX_SIZE_64);
            block.put_u64(0, 0);
            block.put_u64(8, 0);
            block.put_u64(16, 0);
            block
        } else {
            let mut block = Self::zeroed(COMBINE_INFORMATION_EX_SIZE_32);
            block.put_u32(0, 0);
            block.put_u32(4, 0);
            block.put_u64(8, 0);
            block
        }
    }

    /// `SYSTEM_CACHE_INFORMATION` with both working-set bounds set to the
    /// unbounded sentinel of the selected layout.
    pub fn system_cache_information(is_64bit: bool) -> Self {
        use cache_offsets::*;

        if is_64bit {
            let mut block = Self::zeroed(SYSTEM_CACHE_INFORMATION_SIZE_64);
            block.put_i64(MINIMUM_WORKING_SET_64, UNBOUNDED_WORKING_SET_64);
            block.put_i64(MAXIMUM_WORKING_SET_64, UNBOUNDED_WORKING_SET_64);
            block
        } else {
            let mut block = Self::zeroed(SYSTEM_CACHE_INFORMATION_SIZE_32);
            block.put_u32(MINIMUM_WORKING_SET_32, UNBOUNDED_WORKING_SET_32);
            block.put_u32(MAXIMUM_WORKING_SET_32, UNBOUNDED_WORKING_SET_32);
            block
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        let raw = self.as_bytes().get(offset..offset + 4)?;
        Some(u32::from_le_bytes(raw.try_into().ok()?))
    }

    pub fn read_i32(&self, offset: usize) -> Option<i32> {
        let raw = self.as_bytes().get(offset..offset + 4)?;
        Some(i32::from_le_bytes(raw.try_into().ok()?))
    }

    pub fn read_i64(&self, offset: usize) -> Option<i64> {
        let raw = self.as_bytes().get(offset..offset + 8)?;
        Some(i64::from_le_bytes(raw.try_into().ok()?))
    }
}

impl std::fmt::Debug for ControlBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlBlock")
            .field("len", &self.len)
            .field("bytes", &self.as_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_list_command_layout() {
        let block = ControlBlock::memory_list_command(MemoryListCommand::PurgeStandbyList);
        assert_eq!(block.len(), 4);
        assert_eq!(block.as_bytes(), &[4, 0, 0, 0]);

        let block = ControlBlock::memory_list_command(MemoryListCommand::FlushModifiedList);
        assert_eq!(block.read_i32(0), Some(3));
    }

    #[test]
    fn test_system_cache_information_64bit_bounds() {
        let block = ControlBlock::system_cache_information(true);
        assert_eq!(block.len(), SYSTEM_CACHE_INFORMATION_SIZE_64);
        assert_eq!(block.read_i64(cache_offsets::MINIMUM_WORKING_SET_64), Some(-1));
        assert_eq!(block.read_i64(cache_offsets::MAXIMUM_WORKING_SET_64), Some(-1));
        assert_eq!(block.read_i64(0), Some(0));
        assert_eq!(block.read_i64(64), Some(0));
    }

    #[test]
    fn test_system_cache_information_32bit_bounds() {
        let block = ControlBlock::system_cache_information(false);
        assert_eq!(block.len(), SYSTEM_CACHE_INFORMATION_SIZE_32);
        assert_eq!(block.read_u32(cache_offsets::MINIMUM_WORKING_SET_32), Some(u32::MAX));
        assert_eq!(block.read_u32(cache_offsets::MAXIMUM_WORKING_SET_32), Some(u32::MAX));
        assert_eq!(block.read_u32(8), Some(0));
        assert_eq!(block.read_u32(20), Some(0));
        // past the 32-bit block
        assert_eq!(block.read_u32(36), None);
    }

    #[test]
    fn test_combine_information_is_zeroed() {
        let wide = ControlBlock::combine_information_ex(true);
        assert_eq!(wide.len(), 24);
        assert!(wide.as_bytes().iter().all(|b| *b == 0));

        let narrow = ControlBlock::combine_information_ex(false);
        assert_eq!(narrow.len(), 16);
        assert!(narrow.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_block_is_eight_byte_aligned() {
        assert_eq!(std::mem::align_of::<ControlBlock>(), 8);
        let block = ControlBlock::system_cache_information(true);
        assert_eq!(block.as_bytes().as_ptr() as usize % 8, 0);
    }
}
