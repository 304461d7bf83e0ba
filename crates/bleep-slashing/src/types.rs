// Core identifiers shared by the liveness tracker and its collaborators.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Block height as reported by the consensus engine.
///
/// Signed on purpose: distribution heights near genesis go negative.
pub type BlockHeight = i64;

/// Length of a consensus address in bytes.
pub const ADDRESS_LEN: usize = 20;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("consensus address must be {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("consensus address is not valid hex: {0}")]
    InvalidHex(String),
}

/// Consensus address of a validator (the key signing-info records are stored under).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsAddress([u8; ADDRESS_LEN]);

impl ConsAddress {
    pub fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        ConsAddress(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        if bytes.len() != ADDRESS_LEN {
            return Err(AddressError::InvalidLength {
                expected: ADDRESS_LEN,
                got: bytes.len(),
            });
        }
        let mut address = [0u8; ADDRESS_LEN];
        address.copy_from_slice(bytes);
        Ok(ConsAddress(address))
    }

    /// Derive the consensus address of a validator public key
    /// (leading 20 bytes of its SHA-256 digest).
    pub fn from_pubkey(pubkey: &[u8]) -> Self {
        let digest = Sha256::digest(pubkey);
        let mut address = [0u8; ADDRESS_LEN];
        address.copy_from_slice(&digest[..ADDRESS_LEN]);
        ConsAddress(address)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for ConsAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        ConsAddress::from_slice(&bytes)
    }
}

impl fmt::Display for ConsAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

impl fmt::Debug for ConsAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsAddress({})", self)
    }
}

impl Serialize for ConsAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ConsAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ConsAddressVisitor;

        impl<'de> de::Visitor<'de> for ConsAddressVisitor {
            type Value = ConsAddress;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("hex encoded 20 byte consensus address")
            }

            fn visit_str<E>(self, value: &str) -> Result<ConsAddress, E>
            where
                E: de::Error,
            {
                ConsAddress::from_str(value).map_err(|e| de::Error::custom(e.to_string()))
            }
        }

        deserializer.deserialize_str(ConsAddressVisitor)
    }
}

/// Header data of the block being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    pub height: BlockHeight,
    pub time: DateTime<Utc>,
}

impl BlockContext {
    pub fn new(height: BlockHeight, time: DateTime<Utc>) -> Self {
        BlockContext { height, time }
    }
}

/// One entry of a block's last commit: did `address` sign, and with which power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteInfo {
    pub address: ConsAddress,
    pub power: i64,
    pub signed: bool,
}
