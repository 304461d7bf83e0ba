// Staking collaborator: jail status, validator lookup, slash and jail execution.

use crate::fraction::Fraction;
use crate::types::{BlockHeight, ConsAddress};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tokens represented by one unit of consensus voting power.
pub const POWER_REDUCTION: u128 = 1_000_000;

/// Kind of fault a slash is applied for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Infraction {
    Unspecified,
    DoubleSign,
    Downtime,
}

impl Infraction {
    /// Value of the `reason` attribute on slash events.
    pub fn reason(&self) -> &'static str {
        match self {
            Infraction::Unspecified => "unspecified",
            Infraction::DoubleSign => "double_sign",
            Infraction::Downtime => "missing_signature",
        }
    }
}

/// Staking view of a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: ConsAddress,
    pub tokens: u128,
    pub jailed: bool,
}

impl Validator {
    pub fn is_jailed(&self) -> bool {
        self.jailed
    }
}

/// Interface to the staking module.
///
/// SAFETY: every method must be deterministic; the liveness tracker calls it
/// in block order on every node.
pub trait StakingKeeper {
    fn is_validator_jailed(&self, address: &ConsAddress) -> bool;

    fn validator_by_cons_addr(&self, address: &ConsAddress) -> Option<Validator>;

    /// Slash `fraction` of the stake backing `power` at `distribution_height`.
    /// Returns the amount of tokens burned.
    fn slash(
        &mut self,
        address: &ConsAddress,
        distribution_height: BlockHeight,
        power: i64,
        fraction: Fraction,
        infraction: Infraction,
    ) -> u128;

    fn jail(&mut self, address: &ConsAddress);
}

/// A slash as executed by [`StakingLedger`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashRecord {
    pub address: ConsAddress,
    pub distribution_height: BlockHeight,
    pub power: i64,
    pub fraction: Fraction,
    pub infraction: Infraction,
    pub burned: u128,
}

/// In-memory staking registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StakingLedger {
    validators: BTreeMap<ConsAddress, Validator>,
    slashes: Vec<SlashRecord>,
}

impl StakingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or top up) a bonded validator.
    pub fn bond(&mut self, address: ConsAddress, tokens: u128) {
        let validator = self.validators.entry(address).or_insert(Validator {
            address,
            tokens: 0,
            jailed: false,
        });
        validator.tokens = validator.tokens.saturating_add(tokens);
    }

    pub fn unjail(&mut self, address: &ConsAddress) -> bool {
        match self.validators.get_mut(address) {
            Some(validator) if validator.jailed => {
                validator.jailed = false;
                true
            }
            _ => false,
        }
    }

    pub fn validator(&self, address: &ConsAddress) -> Option<&Validator> {
        self.validators.get(address)
    }

    pub fn validators(&self) -> impl Iterator<Item = &Validator> {
        self.validators.values()
    }

    pub fn slashes(&self) -> &[SlashRecord] {
        &self.slashes
    }

    pub fn total_burned(&self) -> u128 {
        self.slashes.iter().map(|s| s.burned).sum()
    }
}

impl StakingKeeper for StakingLedger {
    fn is_validator_jailed(&self, address: &ConsAddress) -> bool {
        self.validators
            .get(address)
            .map(Validator::is_jailed)
            .unwrap_or(false)
    }

    fn validator_by_cons_addr(&self, address: &ConsAddress) -> Option<Validator> {
        self.validators.get(address).cloned()
    }

    fn slash(
        &mut self,
        address: &ConsAddress,
        distribution_height: BlockHeight,
        power: i64,
        fraction: Fraction,
        infraction: Infraction,
    ) -> u128 {
        let Some(validator) = self.validators.get_mut(address) else {
            debug!("slash ignored, validator {} is not bonded", address);
            return 0;
        };

        let backing = (power.max(0) as u128).saturating_mul(POWER_REDUCTION);
        let burned = fraction.mul_floor_u128(backing).min(validator.tokens);
        validator.tokens -= burned;

        info!(
            "Slashed validator {} for {}: {} tokens (distribution height {})",
            address,
            infraction.reason(),
            burned,
            distribution_height
        );

        self.slashes.push(SlashRecord {
            address: *address,
            distribution_height,
            power,
            fraction,
            infraction,
            burned,
        });
        burned
    }

    fn jail(&mut self, address: &ConsAddress) {
        if let Some(validator) = self.validators.get_mut(address) {
            validator.jailed = true;
        }
    }
}
