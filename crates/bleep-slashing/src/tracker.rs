// PHASE 2: LIVENESS TRACKING
// Per-block, per-validator signed/missed bookkeeping over a rolling window
//
// SAFETY INVARIANTS:
// 1. missed_blocks_counter == popcount(bitmap) after every call
// 2. The counter is updated incrementally; the window is never rescanned
// 3. Window index = (height - start_height) mod signed_blocks_window
// 4. Jailed validators are ignored entirely (no reads, no writes)
// 5. Punishment only after the window had a chance to fill (height > start + window)
// 6. Any store failure aborts the block; no partial update is reported as success
// 7. Counter, threshold and jail release time are computed before the first write

use crate::bitmap::MissedBlockBitmap;
use crate::error::SlashingError;
use crate::events::{
    Event, EventSink, ATTRIBUTE_KEY_ADDRESS, ATTRIBUTE_KEY_HEIGHT, ATTRIBUTE_KEY_MISSED_BLOCKS,
    EVENT_TYPE_LIVENESS,
};
use crate::params::{ParamsError, SlashingParams};
use crate::punishment::{Punishment, SlashDecisionEngine};
use crate::signing_info::{SigningInfoStore, ValidatorSigningInfo};
use crate::staking::StakingKeeper;
use crate::types::{BlockContext, ConsAddress, VoteInfo};
use log::debug;
use serde::{Deserialize, Serialize};

/// What a single `record_block_result` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Nothing changed (validator jailed, or bit already held this value)
    NoOp,
    /// The window bit flipped and the counter moved with it
    BitUpdated,
    /// The threshold was crossed and the punishment path ran
    PunishmentTriggered(Punishment),
}

/// Per-commit tally returned by [`LivenessTracker::handle_commit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub unchanged: usize,
    pub updated: usize,
    pub punished: usize,
    pub skipped_punishments: usize,
}

/// Liveness tracker over borrowed collaborators.
pub struct LivenessTracker<'a> {
    params: &'a SlashingParams,
    signing_infos: &'a mut dyn SigningInfoStore,
    bitmap: &'a mut dyn MissedBlockBitmap,
    staking: &'a mut dyn StakingKeeper,
    events: &'a mut dyn EventSink,
}

impl<'a> LivenessTracker<'a> {
    pub fn new(
        params: &'a SlashingParams,
        signing_infos: &'a mut dyn SigningInfoStore,
        bitmap: &'a mut dyn MissedBlockBitmap,
        staking: &'a mut dyn StakingKeeper,
        events: &'a mut dyn EventSink,
    ) -> Self {
        LivenessTracker {
            params,
            signing_infos,
            bitmap,
            staking,
            events,
        }
    }

    /// Record whether `address` signed the block described by `ctx`.
    ///
    /// Must be called exactly once per bonded validator per block, in height order.
    pub fn record_block_result(
        &mut self,
        ctx: &BlockContext,
        address: &ConsAddress,
        power: i64,
        signed: bool,
    ) -> Result<Outcome, SlashingError> {
        let height = ctx.height;

        if self.staking.is_validator_jailed(address) {
            return Ok(Outcome::NoOp);
        }

        let mut info = self
            .signing_infos
            .signing_info(address)
            .map_err(|e| SlashingError::signing_info(address, e))?
            .ok_or(SlashingError::MissingSigningInfo(*address))?;

        if info.start_height > height {
            return Err(SlashingError::StartHeightAhead {
                address: *address,
                start_height: info.start_height,
                height,
            });
        }

        let window = self.params.signed_blocks_window;
        if window <= 0 {
            return Err(ParamsError::NonPositiveWindow(window).into());
        }
        let elapsed = height
            .checked_sub(info.start_height)
            .ok_or_else(|| SlashingError::overflow(address, "height - start_height"))?;
        let index = (elapsed % window) as u64;

        let previous = self
            .bitmap
            .get_bit(address, index)
            .map_err(|e| SlashingError::bitmap(address, Some(index), e))?;
        let missed = !signed;

        // Decide everything fallible before the first write.
        let counter = match (previous, missed) {
            (false, true) => Some(self.step_counter(address, info.missed_blocks_counter, 1)?),
            (true, false) => Some(self.step_counter(address, info.missed_blocks_counter, -1)?),
            // bit already reflects this outcome
            _ => None,
        };
        let missed_blocks = counter.unwrap_or(info.missed_blocks_counter);

        let min_height = self.params.min_punishable_height(info.start_height);
        let max_missed = self.params.max_missed_per_window();
        let punish = height > min_height && missed_blocks > max_missed;
        if punish && self.params.jailed_until(ctx.time).is_none() {
            return Err(SlashingError::JailTimeOverflow(*address));
        }

        if let Some(counter) = counter {
            self.bitmap
                .set_bit(address, index, missed)
                .map_err(|e| SlashingError::bitmap(address, Some(index), e))?;
            info.missed_blocks_counter = counter;

            if missed {
                self.events.emit(
                    Event::new(EVENT_TYPE_LIVENESS)
                        .with_attribute(ATTRIBUTE_KEY_ADDRESS, address)
                        .with_attribute(ATTRIBUTE_KEY_MISSED_BLOCKS, counter)
                        .with_attribute(ATTRIBUTE_KEY_HEIGHT, height),
                );
            }
        }
        let modified = counter.is_some();

        if missed {
            debug!(
                "absent validator {} at height {}: missed {}, threshold {}",
                address,
                height,
                info.missed_blocks_counter,
                self.params.min_signed_per_window_int()
            );
        }

        if punish {
            let punishment = SlashDecisionEngine::new(
                self.params,
                &mut *self.signing_infos,
                &mut *self.bitmap,
                &mut *self.staking,
                &mut *self.events,
            )
            .punish_downtime(ctx, &mut info, power)?;

            // An applied punishment persisted the reset record itself.
            if !punishment.is_applied() && modified {
                self.persist(address, &info)?;
            }
            return Ok(Outcome::PunishmentTriggered(punishment));
        }

        if modified {
            self.persist(address, &info)?;
            Ok(Outcome::BitUpdated)
        } else {
            Ok(Outcome::NoOp)
        }
    }

    /// Process every vote of a block's last commit, in order.
    ///
    /// Stops at the first error; the caller must then abort the block.
    pub fn handle_commit(
        &mut self,
        ctx: &BlockContext,
        votes: &[VoteInfo],
    ) -> Result<CommitSummary, SlashingError> {
        let mut summary = CommitSummary::default();
        for vote in votes {
            match self.record_block_result(ctx, &vote.address, vote.power, vote.signed)? {
                Outcome::NoOp => summary.unchanged += 1,
                Outcome::BitUpdated => summary.updated += 1,
                Outcome::PunishmentTriggered(p) if p.is_applied() => summary.punished += 1,
                Outcome::PunishmentTriggered(_) => summary.skipped_punishments += 1,
            }
        }
        Ok(summary)
    }

    /// Move the counter by `delta`, rejecting overflow and any value outside
    /// `[0, window]` (bitmap and counter diverged).
    fn step_counter(
        &self,
        address: &ConsAddress,
        counter: i64,
        delta: i64,
    ) -> Result<i64, SlashingError> {
        let counter = counter
            .checked_add(delta)
            .ok_or_else(|| SlashingError::overflow(address, "missed_blocks_counter"))?;
        let window = self.params.signed_blocks_window;
        if counter < 0 || counter > window {
            return Err(SlashingError::CounterOutOfRange {
                address: *address,
                counter,
                window,
            });
        }
        Ok(counter)
    }

    fn persist(
        &mut self,
        address: &ConsAddress,
        info: &ValidatorSigningInfo,
    ) -> Result<(), SlashingError> {
        self.signing_infos
            .set_signing_info(address, info)
            .map_err(|e| SlashingError::signing_info(address, e))
    }
}
