// Missed-block bitmap: one circular bit array per validator, stored in 8-bit chunks.
//
// SAFETY INVARIANTS:
// 1. Bit i lives in chunk i / 8 at offset i % 8, on every node
// 2. A set or clear touches exactly one chunk
// 3. An absent chunk reads as all zeros; all-zero chunks are not stored
// 4. clear_all removes every chunk of the validator, not just the live window

use crate::store::{keys, KvStore, StoreError};
use crate::types::ConsAddress;

/// Number of bits held by one stored chunk.
pub const CHUNK_BITS: u64 = 8;

/// Chunk holding bit `index`.
#[inline]
pub fn chunk_index(index: u64) -> u64 {
    index / CHUNK_BITS
}

/// Bit position of `index` inside its chunk.
#[inline]
pub fn chunk_offset(index: u64) -> u8 {
    (index % CHUNK_BITS) as u8
}

/// Per-validator missed-block bit array.
pub trait MissedBlockBitmap {
    /// `true` if the block at relative `index` was missed.
    fn get_bit(&self, address: &ConsAddress, index: u64) -> Result<bool, StoreError>;

    fn set_bit(&mut self, address: &ConsAddress, index: u64, missed: bool)
        -> Result<(), StoreError>;

    /// Drop the whole bitmap of `address`.
    fn clear_all(&mut self, address: &ConsAddress) -> Result<(), StoreError>;

    /// Indices in `[0, window)` marked as missed, ascending. Scans the window;
    /// meant for queries and audits, never for block processing.
    fn missed_blocks(&self, address: &ConsAddress, window: u64) -> Result<Vec<u64>, StoreError> {
        let mut missed = Vec::new();
        for index in 0..window {
            if self.get_bit(address, index)? {
                missed.push(index);
            }
        }
        Ok(missed)
    }

    /// Population count of the window.
    fn count_missed(&self, address: &ConsAddress, window: u64) -> Result<u64, StoreError> {
        Ok(self.missed_blocks(address, window)?.len() as u64)
    }
}

/// Bitmap persisted one byte per key over a [`KvStore`].
#[derive(Debug, Clone, Default)]
pub struct KvBitmapStore<S> {
    kv: S,
}

impl<S: KvStore> KvBitmapStore<S> {
    pub fn new(kv: S) -> Self {
        KvBitmapStore { kv }
    }

    pub fn inner(&self) -> &S {
        &self.kv
    }

    fn read_chunk(&self, address: &ConsAddress, chunk: u64) -> Result<u8, StoreError> {
        let key = keys::missed_block_bitmap_key(address, chunk);
        match self.kv.get(&key)? {
            None => Ok(0),
            Some(bytes) => match bytes.as_slice() {
                [byte] => Ok(*byte),
                other => Err(StoreError::Backend(format!(
                    "bitmap chunk {} of {} has {} bytes, expected 1",
                    chunk,
                    address,
                    other.len()
                ))),
            },
        }
    }
}

impl<S: KvStore> MissedBlockBitmap for KvBitmapStore<S> {
    fn get_bit(&self, address: &ConsAddress, index: u64) -> Result<bool, StoreError> {
        let chunk = self.read_chunk(address, chunk_index(index))?;
        Ok(chunk & (1 << chunk_offset(index)) != 0)
    }

    fn set_bit(
        &mut self,
        address: &ConsAddress,
        index: u64,
        missed: bool,
    ) -> Result<(), StoreError> {
        let chunk_idx = chunk_index(index);
        let mask = 1u8 << chunk_offset(index);
        let current = self.read_chunk(address, chunk_idx)?;
        let updated = if missed { current | mask } else { current & !mask };

        let key = keys::missed_block_bitmap_key(address, chunk_idx);
        if updated == 0 {
            self.kv.delete(&key)
        } else {
            self.kv.set(&key, vec![updated])
        }
    }

    fn clear_all(&mut self, address: &ConsAddress) -> Result<(), StoreError> {
        let prefix = keys::missed_block_bitmap_prefix(address);
        for key in self.kv.prefix_keys(&prefix)? {
            self.kv.delete(&key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKv;

    fn addr(byte: u8) -> ConsAddress {
        ConsAddress::new([byte; 20])
    }

    #[test]
    fn test_chunk_addressing() {
        assert_eq!((chunk_index(0), chunk_offset(0)), (0, 0));
        assert_eq!((chunk_index(7), chunk_offset(7)), (0, 7));
        assert_eq!((chunk_index(8), chunk_offset(8)), (1, 0));
        assert_eq!((chunk_index(99), chunk_offset(99)), (12, 3));
    }

    #[test]
    fn test_set_and_get_bits() {
        let mut bitmap = KvBitmapStore::new(MemoryKv::new());
        let a = addr(1);

        assert!(!bitmap.get_bit(&a, 9).unwrap());
        bitmap.set_bit(&a, 9, true).unwrap();
        bitmap.set_bit(&a, 10, true).unwrap();
        assert!(bitmap.get_bit(&a, 9).unwrap());
        assert!(bitmap.get_bit(&a, 10).unwrap());
        assert!(!bitmap.get_bit(&a, 8).unwrap());

        bitmap.set_bit(&a, 9, false).unwrap();
        assert!(!bitmap.get_bit(&a, 9).unwrap());
        assert!(bitmap.get_bit(&a, 10).unwrap());
        assert_eq!(bitmap.missed_blocks(&a, 16).unwrap(), vec![10]);
    }

    #[test]
    fn test_zero_chunks_are_removed() {
        let mut bitmap = KvBitmapStore::new(MemoryKv::new());
        let a = addr(1);
        bitmap.set_bit(&a, 3, true).unwrap();
        assert_eq!(bitmap.inner().len(), 1);
        bitmap.set_bit(&a, 3, false).unwrap();
        assert!(bitmap.inner().is_empty());
    }

    #[test]
    fn test_clear_all_only_touches_one_validator() {
        let mut bitmap = KvBitmapStore::new(MemoryKv::new());
        let (a, b) = (addr(1), addr(2));
        for index in [0, 5, 17, 63] {
            bitmap.set_bit(&a, index, true).unwrap();
        }
        bitmap.set_bit(&b, 5, true).unwrap();

        bitmap.clear_all(&a).unwrap();

        assert_eq!(bitmap.count_missed(&a, 64).unwrap(), 0);
        assert!(bitmap.get_bit(&b, 5).unwrap());
    }

    #[test]
    fn test_corrupt_chunk_is_an_error() {
        let a = addr(1);
        let mut kv = MemoryKv::new();
        kv.set(&keys::missed_block_bitmap_key(&a, 0), vec![1, 2])
            .unwrap();
        let bitmap = KvBitmapStore::new(kv);
        assert!(matches!(
            bitmap.get_bit(&a, 0),
            Err(StoreError::Backend(_))
        ));
    }
}
