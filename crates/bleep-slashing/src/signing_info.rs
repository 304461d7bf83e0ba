// Validator signing info: per-validator liveness bookkeeping.

use crate::store::{keys, KvStore, StoreError};
use crate::types::{BlockHeight, ConsAddress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness record of one validator.
///
/// SAFETY: `missed_blocks_counter` always equals the number of set bits in the
/// validator's missed-block bitmap. Only the tracker and the slash decision
/// engine mutate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSigningInfo {
    pub address: ConsAddress,

    /// Height at which window indexing begins (set by the bonding hook)
    pub start_height: BlockHeight,

    /// Missed blocks inside the current window
    pub missed_blocks_counter: i64,

    /// Earliest time the validator may be unjailed
    pub jailed_until: DateTime<Utc>,
}

impl ValidatorSigningInfo {
    /// Fresh record for a validator that just became active at `start_height`.
    pub fn new(address: ConsAddress, start_height: BlockHeight) -> Self {
        ValidatorSigningInfo {
            address,
            start_height,
            missed_blocks_counter: 0,
            jailed_until: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Persistent mapping from consensus address to signing info.
pub trait SigningInfoStore {
    fn signing_info(&self, address: &ConsAddress)
        -> Result<Option<ValidatorSigningInfo>, StoreError>;

    fn set_signing_info(
        &mut self,
        address: &ConsAddress,
        info: &ValidatorSigningInfo,
    ) -> Result<(), StoreError>;
}

/// Signing infos and the address → public key relation over a [`KvStore`].
#[derive(Debug, Clone, Default)]
pub struct KvSigningInfoStore<S> {
    kv: S,
}

impl<S: KvStore> KvSigningInfoStore<S> {
    pub fn new(kv: S) -> Self {
        KvSigningInfoStore { kv }
    }

    pub fn inner(&self) -> &S {
        &self.kv
    }

    /// Every stored signing info, ordered by address.
    pub fn all_signing_infos(&self) -> Result<Vec<ValidatorSigningInfo>, StoreError> {
        let mut infos = Vec::new();
        for key in self.kv.prefix_keys(&[keys::SIGNING_INFO_PREFIX])? {
            if let Some(bytes) = self.kv.get(&key)? {
                infos.push(bincode::deserialize(&bytes)?);
            }
        }
        Ok(infos)
    }

    /// Record the consensus public key of a validator; returns its address.
    pub fn add_pubkey(&mut self, pubkey: &[u8]) -> Result<ConsAddress, StoreError> {
        let address = ConsAddress::from_pubkey(pubkey);
        self.kv
            .set(&keys::addr_pubkey_relation_key(&address), pubkey.to_vec())?;
        Ok(address)
    }

    pub fn pubkey(&self, address: &ConsAddress) -> Result<Vec<u8>, StoreError> {
        self.kv
            .get(&keys::addr_pubkey_relation_key(address))?
            .ok_or_else(|| StoreError::NotFound(format!("pubkey for address {}", address)))
    }

    pub fn delete_pubkey(&mut self, address: &ConsAddress) -> Result<(), StoreError> {
        self.kv.delete(&keys::addr_pubkey_relation_key(address))
    }
}

impl<S: KvStore> SigningInfoStore for KvSigningInfoStore<S> {
    fn signing_info(
        &self,
        address: &ConsAddress,
    ) -> Result<Option<ValidatorSigningInfo>, StoreError> {
        match self.kv.get(&keys::signing_info_key(address))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_signing_info(
        &mut self,
        address: &ConsAddress,
        info: &ValidatorSigningInfo,
    ) -> Result<(), StoreError> {
        let bytes = bincode::serialize(info)?;
        self.kv.set(&keys::signing_info_key(address), bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKv;

    #[test]
    fn test_signing_info_persistence() {
        let mut store = KvSigningInfoStore::new(MemoryKv::new());
        let address = ConsAddress::new([3; 20]);
        assert_eq!(store.signing_info(&address).unwrap(), None);

        let mut info = ValidatorSigningInfo::new(address, 42);
        info.missed_blocks_counter = 7;
        store.set_signing_info(&address, &info).unwrap();

        assert_eq!(store.signing_info(&address).unwrap(), Some(info.clone()));
        assert_eq!(store.all_signing_infos().unwrap(), vec![info]);
    }

    #[test]
    fn test_undecodable_record_is_an_error() {
        let address = ConsAddress::new([3; 20]);
        let mut kv = MemoryKv::new();
        kv.set(&keys::signing_info_key(&address), vec![0xff]).unwrap();
        let store = KvSigningInfoStore::new(kv);
        assert!(matches!(
            store.signing_info(&address),
            Err(StoreError::Codec(_))
        ));
    }

    #[test]
    fn test_pubkey_relation() {
        let mut store = KvSigningInfoStore::new(MemoryKv::new());
        let pubkey = vec![9u8; 32];
        let address = store.add_pubkey(&pubkey).unwrap();
        assert_eq!(address, ConsAddress::from_pubkey(&pubkey));
        assert_eq!(store.pubkey(&address).unwrap(), pubkey);

        store.delete_pubkey(&address).unwrap();
        assert!(matches!(store.pubkey(&address), Err(StoreError::NotFound(_))));
    }
}
