// Errors raised while processing liveness for a block.
//
// Every variant is fatal: the host must abort the whole block. Conditions the
// chain tolerates (validator gone or already jailed at punishment time) are not
// errors; they surface as `Punishment::Skipped`.

use crate::params::ParamsError;
use crate::store::StoreError;
use crate::types::{BlockHeight, ConsAddress};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlashingError {
    #[error("expected signing info for validator {0} but not found")]
    MissingSigningInfo(ConsAddress),

    #[error(
        "invalid state, validator {address} has start height {start_height}, \
         which is greater than the current height {height}"
    )]
    StartHeightAhead {
        address: ConsAddress,
        start_height: BlockHeight,
        height: BlockHeight,
    },

    #[error("missed block counter of validator {address} is {counter}, outside [0, {window}]")]
    CounterOutOfRange {
        address: ConsAddress,
        counter: i64,
        window: i64,
    },

    #[error("missed block bitmap of validator {address} failed at index {index:?}: {source}")]
    Bitmap {
        address: ConsAddress,
        index: Option<u64>,
        #[source]
        source: StoreError,
    },

    #[error("signing info store failed for validator {address}: {source}")]
    SigningInfo {
        address: ConsAddress,
        #[source]
        source: StoreError,
    },

    #[error("arithmetic overflow computing {operation} for validator {address}")]
    ArithmeticOverflow {
        address: ConsAddress,
        operation: &'static str,
    },

    #[error("jail release time of validator {0} overflows")]
    JailTimeOverflow(ConsAddress),

    #[error("invalid slashing params: {0}")]
    Params(#[from] ParamsError),
}

impl SlashingError {
    pub(crate) fn bitmap(address: &ConsAddress, index: Option<u64>, source: StoreError) -> Self {
        SlashingError::Bitmap {
            address: *address,
            index,
            source,
        }
    }

    pub(crate) fn overflow(address: &ConsAddress, operation: &'static str) -> Self {
        SlashingError::ArithmeticOverflow {
            address: *address,
            operation,
        }
    }

    pub(crate) fn signing_info(address: &ConsAddress, source: StoreError) -> Self {
        SlashingError::SigningInfo {
            address: *address,
            source,
        }
    }
}
