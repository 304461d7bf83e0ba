/// LIVENESS PROPERTY TESTS
///
/// Randomised signing histories checked against the bitmap:
/// - missed_blocks_counter always equals the bitmap popcount
/// - replaying the same history twice yields identical state

#[cfg(test)]
mod liveness_property_tests {
    use bleep_slashing::staking::POWER_REDUCTION;
    use bleep_slashing::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::time::Duration;

    struct Chain {
        params: SlashingParams,
        infos: KvSigningInfoStore<MemoryKv>,
        bitmap: KvBitmapStore<MemoryKv>,
        staking: StakingLedger,
        events: EventManager,
    }

    impl Chain {
        fn new(params: SlashingParams, validators: &[ConsAddress], start_height: i64) -> Self {
            let mut chain = Chain {
                params,
                infos: KvSigningInfoStore::new(MemoryKv::new()),
                bitmap: KvBitmapStore::new(MemoryKv::new()),
                staking: StakingLedger::new(),
                events: EventManager::new(),
            };
            for address in validators {
                chain.staking.bond(*address, 1_000 * POWER_REDUCTION);
                chain
                    .infos
                    .set_signing_info(address, &ValidatorSigningInfo::new(*address, start_height))
                    .unwrap();
            }
            chain
        }

        fn commit(&mut self, height: i64, votes: &[VoteInfo]) -> CommitSummary {
            let ctx = BlockContext::new(height, Utc.timestamp_opt(1_700_000_000 + height, 0).unwrap());
            LivenessTracker::new(
                &self.params,
                &mut self.infos,
                &mut self.bitmap,
                &mut self.staking,
                &mut self.events,
            )
            .handle_commit(&ctx, votes)
            .unwrap()
        }
    }

    fn params(window: i64, min_signed_percent: u64) -> SlashingParams {
        SlashingParams::new(
            window,
            Fraction::from_ratio(min_signed_percent, 100).unwrap(),
            "0.05".parse().unwrap(),
            Duration::from_secs(600),
            1,
        )
        .unwrap()
    }

    /// Each block: one signed/missed flag per validator.
    fn history() -> impl Strategy<Value = Vec<Vec<bool>>> {
        prop::collection::vec(prop::collection::vec(any::<bool>(), 3), 1..150)
    }

    fn validators() -> Vec<ConsAddress> {
        (1..=3u8).map(|b| ConsAddress::new([b; 20])).collect()
    }

    fn votes(flags: &[bool]) -> Vec<VoteInfo> {
        validators()
            .into_iter()
            .zip(flags)
            .map(|(address, signed)| VoteInfo {
                address,
                power: 10,
                signed: *signed,
            })
            .collect()
    }

    fn replay(chain: &mut Chain, start_height: i64, blocks: &[Vec<bool>]) {
        for (offset, flags) in blocks.iter().enumerate() {
            chain.commit(start_height + offset as i64, &votes(flags));
        }
    }

    proptest! {
        #[test]
        fn counter_matches_bitmap_popcount(
            window in 1i64..32,
            min_signed_percent in 0u64..=100,
            start_height in 0i64..50,
            blocks in history(),
        ) {
            let validators = validators();
            let mut chain = Chain::new(params(window, min_signed_percent), &validators, start_height);

            for (offset, flags) in blocks.iter().enumerate() {
                chain.commit(start_height + offset as i64, &votes(flags));

                for address in &validators {
                    let info = chain.infos.signing_info(address).unwrap().unwrap();
                    let popcount = chain.bitmap.count_missed(address, window as u64).unwrap();
                    prop_assert_eq!(info.missed_blocks_counter as u64, popcount);
                    prop_assert!(info.missed_blocks_counter >= 0);
                    prop_assert!(info.missed_blocks_counter <= window);
                }
            }
        }

        #[test]
        fn punished_validators_restart_with_clean_window(
            window in 1i64..16,
            blocks in history(),
        ) {
            let validators = validators();
            let mut chain = Chain::new(params(window, 50), &validators, 0);
            replay(&mut chain, 0, &blocks);

            for slash in chain.staking.slashes() {
                prop_assert!(chain.staking.is_validator_jailed(&slash.address));
                let info = chain.infos.signing_info(&slash.address).unwrap().unwrap();
                prop_assert_eq!(info.missed_blocks_counter, 0);
                prop_assert!(chain.bitmap.missed_blocks(&slash.address, window as u64).unwrap().is_empty());
            }
            // jailed validators are never punished twice
            let punished: BTreeSet<_> = chain.staking.slashes().iter().map(|s| s.address).collect();
            prop_assert_eq!(punished.len(), chain.staking.slashes().len());
        }

        #[test]
        fn replay_is_deterministic(
            window in 1i64..16,
            min_signed_percent in 0u64..=100,
            blocks in history(),
        ) {
            let validators = validators();
            let mut first = Chain::new(params(window, min_signed_percent), &validators, 0);
            let mut second = Chain::new(params(window, min_signed_percent), &validators, 0);
            replay(&mut first, 0, &blocks);
            replay(&mut second, 0, &blocks);

            prop_assert_eq!(first.infos.all_signing_infos().unwrap(), second.infos.all_signing_infos().unwrap());
            prop_assert_eq!(first.staking.slashes(), second.staking.slashes());
            prop_assert_eq!(first.events.events(), second.events.events());
        }
    }
}
