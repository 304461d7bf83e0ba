//! BLEEP LIVENESS & DOWNTIME SLASHING
//!
//! Tracks, per validator, which of the last `signed_blocks_window` blocks were
//! missed, and slashes + jails a validator once its misses cross the threshold.
//!
//! - Liveness is kept in a circular bitmap plus a counter equal to its popcount
//! - Counter and bitmap are updated incrementally, never rescanned
//! - All arithmetic is integer and identical on every node replaying the chain
//! - Punishment runs once per fault and resets the window afterwards

pub mod bitmap;
pub mod error;
pub mod events;
pub mod fraction;
pub mod params;
pub mod punishment;
pub mod settings;
pub mod signing_info;
pub mod staking;
pub mod store;
pub mod tracker;
pub mod types;

pub use bitmap::{chunk_index, chunk_offset, KvBitmapStore, MissedBlockBitmap, CHUNK_BITS};
pub use error::SlashingError;
pub use events::{Event, EventManager, EventSink};
pub use fraction::{Fraction, FractionError};
pub use params::{ParamsError, SlashingParams};
pub use punishment::{Punishment, SkipReason, SlashDecisionEngine};
pub use settings::SettingsError;
pub use signing_info::{KvSigningInfoStore, SigningInfoStore, ValidatorSigningInfo};
pub use staking::{Infraction, SlashRecord, StakingKeeper, StakingLedger, Validator};
pub use store::{KvStore, MemoryKv, StoreError};
pub use tracker::{CommitSummary, LivenessTracker, Outcome};
pub use types::{AddressError, BlockContext, BlockHeight, ConsAddress, VoteInfo};
