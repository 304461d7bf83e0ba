// Key-value persistence backing the slashing stores.
//
// SAFETY INVARIANTS:
// 1. Key layout is fixed: every node derives identical keys for identical state
// 2. Iteration order is byte-lexicographic (deterministic)
// 3. Any backend or codec failure surfaces as StoreError, never as a silent default

use crate::types::ConsAddress;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Minimal byte-oriented store interface the slashing module persists through.
pub trait KvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError>;

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;

    /// All keys starting with `prefix`, in ascending byte order.
    fn prefix_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, StoreError>;
}

/// In-memory ordered store.
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.entries.insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn prefix_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
        Ok(self
            .entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

/// Store key layout.
///
/// - `0x01 | len | address`               → signing info
/// - `0x02 | len | address | chunk (BE)`  → one byte of the missed-block bitmap
/// - `0x03 | len | address`               → consensus public key
pub mod keys {
    use super::ConsAddress;

    pub const SIGNING_INFO_PREFIX: u8 = 0x01;
    pub const MISSED_BLOCK_BITMAP_PREFIX: u8 = 0x02;
    pub const ADDR_PUBKEY_RELATION_PREFIX: u8 = 0x03;

    fn prefixed(prefix: u8, address: &ConsAddress) -> Vec<u8> {
        let bytes = address.as_bytes();
        let mut key = Vec::with_capacity(2 + bytes.len() + 8);
        key.push(prefix);
        key.push(bytes.len() as u8);
        key.extend_from_slice(bytes);
        key
    }

    pub fn signing_info_key(address: &ConsAddress) -> Vec<u8> {
        prefixed(SIGNING_INFO_PREFIX, address)
    }

    /// Prefix covering every bitmap chunk of one validator.
    pub fn missed_block_bitmap_prefix(address: &ConsAddress) -> Vec<u8> {
        prefixed(MISSED_BLOCK_BITMAP_PREFIX, address)
    }

    pub fn missed_block_bitmap_key(address: &ConsAddress, chunk: u64) -> Vec<u8> {
        let mut key = missed_block_bitmap_prefix(address);
        key.extend_from_slice(&chunk.to_be_bytes());
        key
    }

    pub fn addr_pubkey_relation_key(address: &ConsAddress) -> Vec<u8> {
        prefixed(ADDR_PUBKEY_RELATION_PREFIX, address)
    }
}
