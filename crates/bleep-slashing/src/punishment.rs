// PHASE 2: DOWNTIME PUNISHMENT
// Slash, jail and reset a validator whose missed blocks crossed the threshold
//
// SAFETY INVARIANTS:
// 1. Punishment runs at most once per fault: counter and bitmap are reset with it
// 2. The live validator record is re-checked; a jailed or unknown validator is skipped
// 3. Every fallible computation happens before the first side effect
// 4. start_height is left untouched (the bonding hook owns it)
// 5. distribution_height is never clamped, even when negative

use crate::bitmap::MissedBlockBitmap;
use crate::error::SlashingError;
use crate::events::{
    Event, EventSink, ATTRIBUTE_KEY_ADDRESS, ATTRIBUTE_KEY_BURNED_COINS, ATTRIBUTE_KEY_JAILED,
    ATTRIBUTE_KEY_POWER, ATTRIBUTE_KEY_REASON, EVENT_TYPE_SLASH,
};
use crate::params::SlashingParams;
use crate::signing_info::{SigningInfoStore, ValidatorSigningInfo};
use crate::staking::{Infraction, StakingKeeper};
use crate::types::BlockContext;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

/// Why a due punishment was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    ValidatorNotFound,
    AlreadyJailed,
}

/// Result of a punishment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Punishment {
    Applied {
        burned: u128,
        jailed_until: DateTime<Utc>,
    },
    Skipped(SkipReason),
}

impl Punishment {
    pub fn is_applied(&self) -> bool {
        matches!(self, Punishment::Applied { .. })
    }
}

/// Executes the downtime punishment path.
///
/// Holds borrowed collaborators only; it lives for a single call.
pub struct SlashDecisionEngine<'a> {
    params: &'a SlashingParams,
    signing_infos: &'a mut dyn SigningInfoStore,
    bitmap: &'a mut dyn MissedBlockBitmap,
    staking: &'a mut dyn StakingKeeper,
    events: &'a mut dyn EventSink,
}

impl<'a> SlashDecisionEngine<'a> {
    pub fn new(
        params: &'a SlashingParams,
        signing_infos: &'a mut dyn SigningInfoStore,
        bitmap: &'a mut dyn MissedBlockBitmap,
        staking: &'a mut dyn StakingKeeper,
        events: &'a mut dyn EventSink,
    ) -> Self {
        SlashDecisionEngine {
            params,
            signing_infos,
            bitmap,
            staking,
            events,
        }
    }

    /// Slash and jail the validator owning `info` for downtime.
    ///
    /// On `Applied`, `info` has been reset and persisted. On `Skipped`, nothing
    /// was touched.
    pub fn punish_downtime(
        &mut self,
        ctx: &BlockContext,
        info: &mut ValidatorSigningInfo,
        power: i64,
    ) -> Result<Punishment, SlashingError> {
        let address = info.address;
        let jailed_until = self
            .params
            .jailed_until(ctx.time)
            .ok_or(SlashingError::JailTimeOverflow(address))?;

        match self.staking.validator_by_cons_addr(&address) {
            None => {
                info!(
                    "validator {} would have been slashed for downtime, but was not found in store",
                    address
                );
                return Ok(Punishment::Skipped(SkipReason::ValidatorNotFound));
            }
            Some(validator) if validator.is_jailed() => {
                info!(
                    "validator {} would have been slashed for downtime, but was already jailed",
                    address
                );
                return Ok(Punishment::Skipped(SkipReason::AlreadyJailed));
            }
            Some(_) => {}
        }

        let distribution_height = self.params.distribution_height(ctx.height);

        let burned = self.staking.slash(
            &address,
            distribution_height,
            power,
            self.params.slash_fraction_downtime,
            Infraction::Downtime,
        );
        self.staking.jail(&address);

        info.jailed_until = jailed_until;

        // Reset so the validator is not punished again from stale bits on rebonding.
        info.missed_blocks_counter = 0;
        self.bitmap
            .clear_all(&address)
            .map_err(|e| SlashingError::bitmap(&address, None, e))?;

        self.events.emit(
            Event::new(EVENT_TYPE_SLASH)
                .with_attribute(ATTRIBUTE_KEY_ADDRESS, address)
                .with_attribute(ATTRIBUTE_KEY_POWER, power)
                .with_attribute(ATTRIBUTE_KEY_REASON, Infraction::Downtime.reason())
                .with_attribute(ATTRIBUTE_KEY_JAILED, address)
                .with_attribute(ATTRIBUTE_KEY_BURNED_COINS, burned),
        );
        self.events
            .emit(Event::new(EVENT_TYPE_SLASH).with_attribute(ATTRIBUTE_KEY_JAILED, address));

        self.signing_infos
            .set_signing_info(&address, info)
            .map_err(|e| SlashingError::signing_info(&address, e))?;

        info!(
            "slashing and jailing validator {} due to liveness fault at height {}: min height {}, threshold {}, slashed {}, burned {}, jailed until {}",
            address,
            ctx.height,
            self.params.min_punishable_height(info.start_height),
            self.params.min_signed_per_window_int(),
            self.params.slash_fraction_downtime,
            burned,
            jailed_until
        );

        Ok(Punishment::Applied {
            burned,
            jailed_until,
        })
    }
}
