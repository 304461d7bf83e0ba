// Chain-wide downtime slashing parameters.
//
// SAFETY INVARIANTS:
// 1. Parameters are immutable for the duration of a block
// 2. signed_blocks_window > 0 (window arithmetic divides by it)
// 3. Threshold derivation uses integer floor only, identical on every node

use crate::fraction::Fraction;
use crate::types::BlockHeight;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SIGNED_BLOCKS_WINDOW: i64 = 100;
pub const DEFAULT_DOWNTIME_JAIL_DURATION: Duration = Duration::from_secs(60 * 10);
pub const DEFAULT_VALIDATOR_UPDATE_DELAY: i64 = 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParamsError {
    #[error("signed blocks window must be positive: {0}")]
    NonPositiveWindow(i64),
    #[error("validator update delay must not be negative: {0}")]
    NegativeUpdateDelay(i64),
    #[error("downtime jail duration is out of range: {0:?}")]
    JailDurationOutOfRange(Duration),
}

/// Downtime slashing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashingParams {
    /// Number of most recent blocks liveness is judged over
    pub signed_blocks_window: i64,

    /// Minimum share of the window a validator must sign
    pub min_signed_per_window: Fraction,

    /// Share of the validator's stake burned on a downtime fault
    pub slash_fraction_downtime: Fraction,

    /// How long a downtime fault keeps the validator jailed
    #[serde(with = "duration_secs")]
    pub downtime_jail_duration: Duration,

    /// Blocks between a validator set change and the commit signed by it
    pub validator_update_delay: i64,
}

impl Default for SlashingParams {
    fn default() -> Self {
        SlashingParams {
            signed_blocks_window: DEFAULT_SIGNED_BLOCKS_WINDOW,
            min_signed_per_window: Fraction::from_ratio(1, 2).unwrap_or(Fraction::ZERO),
            slash_fraction_downtime: Fraction::from_ratio(1, 100).unwrap_or(Fraction::ZERO),
            downtime_jail_duration: DEFAULT_DOWNTIME_JAIL_DURATION,
            validator_update_delay: DEFAULT_VALIDATOR_UPDATE_DELAY,
        }
    }
}

impl SlashingParams {
    pub fn new(
        signed_blocks_window: i64,
        min_signed_per_window: Fraction,
        slash_fraction_downtime: Fraction,
        downtime_jail_duration: Duration,
        validator_update_delay: i64,
    ) -> Result<Self, ParamsError> {
        let params = SlashingParams {
            signed_blocks_window,
            min_signed_per_window,
            slash_fraction_downtime,
            downtime_jail_duration,
            validator_update_delay,
        };
        params.validate()?;
        Ok(params)
    }

    /// Check every parameter bound. Fraction bounds are enforced by [`Fraction`] itself.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.signed_blocks_window <= 0 {
            return Err(ParamsError::NonPositiveWindow(self.signed_blocks_window));
        }
        if self.validator_update_delay < 0 {
            return Err(ParamsError::NegativeUpdateDelay(self.validator_update_delay));
        }
        self.jail_duration()?;
        Ok(())
    }

    /// `floor(min_signed_per_window * signed_blocks_window)`.
    pub fn min_signed_per_window_int(&self) -> i64 {
        let window = self.signed_blocks_window.max(0) as u64;
        // window fits in i64 and the fraction is <= 1, so the product does too
        self.min_signed_per_window.mul_floor(window) as i64
    }

    /// Largest missed-block count that is still tolerated.
    pub fn max_missed_per_window(&self) -> i64 {
        self.signed_blocks_window - self.min_signed_per_window_int()
    }

    /// First height past which a validator starting at `start_height` can be punished.
    pub fn min_punishable_height(&self, start_height: BlockHeight) -> BlockHeight {
        start_height.saturating_add(self.signed_blocks_window)
    }

    /// Height whose stake distribution is held responsible for a fault seen at `height`.
    ///
    /// Negative near genesis; callers must not clamp it.
    pub fn distribution_height(&self, height: BlockHeight) -> BlockHeight {
        height - self.validator_update_delay - 1
    }

    pub fn jail_duration(&self) -> Result<chrono::Duration, ParamsError> {
        chrono::Duration::from_std(self.downtime_jail_duration)
            .map_err(|_| ParamsError::JailDurationOutOfRange(self.downtime_jail_duration))
    }

    /// Release time of a validator jailed for downtime at block time `time`.
    ///
    /// `None` when the result is not a representable timestamp.
    pub fn jailed_until(&self, time: DateTime<Utc>) -> Option<DateTime<Utc>> {
        time.checked_add_signed(self.jail_duration().ok()?)
    }
}

/// Serialize a `Duration` as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(window: i64, min_signed: &str) -> SlashingParams {
        SlashingParams {
            signed_blocks_window: window,
            min_signed_per_window: min_signed.parse().unwrap(),
            ..SlashingParams::default()
        }
    }

    #[test]
    fn test_default_params_are_valid() {
        let params = SlashingParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.signed_blocks_window, 100);
        assert_eq!(params.min_signed_per_window.to_string(), "0.5");
        assert_eq!(params.slash_fraction_downtime.to_string(), "0.01");
    }

    #[test]
    fn test_max_missed_floor() {
        assert_eq!(params(100, "0.5").max_missed_per_window(), 50);
        assert_eq!(params(4, "0.75").max_missed_per_window(), 1);
        // floor(0.5 * 3) = 1, so two misses are tolerated
        assert_eq!(params(3, "0.5").max_missed_per_window(), 2);
        assert_eq!(params(10, "0").max_missed_per_window(), 10);
        assert_eq!(params(10, "1").max_missed_per_window(), 0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert_eq!(
            params(0, "0.5").validate(),
            Err(ParamsError::NonPositiveWindow(0))
        );
        let mut p = params(10, "0.5");
        p.validator_update_delay = -1;
        assert_eq!(p.validate(), Err(ParamsError::NegativeUpdateDelay(-1)));

        let mut p = params(10, "0.5");
        p.downtime_jail_duration = Duration::from_secs(u64::MAX);
        assert!(matches!(
            p.validate(),
            Err(ParamsError::JailDurationOutOfRange(_))
        ));
    }

    #[test]
    fn test_distribution_height_may_be_negative() {
        let p = SlashingParams::default();
        assert_eq!(p.distribution_height(0), -2);
        assert_eq!(p.distribution_height(10), 8);
    }

    #[test]
    fn test_jailed_until_overflow() {
        let time = chrono::TimeZone::timestamp_opt(&Utc, 1_700_000_000, 0).unwrap();
        let p = SlashingParams::default();
        assert_eq!(
            p.jailed_until(time),
            Some(time + chrono::Duration::seconds(600))
        );

        // accepted by validate() but past the last representable timestamp
        let mut p = SlashingParams::default();
        p.downtime_jail_duration = Duration::from_secs(10_000_000_000_000);
        assert!(p.validate().is_ok());
        assert_eq!(p.jailed_until(time), None);
    }

    #[test]
    fn test_params_serde() {
        let json = serde_json::to_value(SlashingParams::default()).unwrap();
        assert_eq!(json["downtime_jail_duration"], 600);
        assert_eq!(json["min_signed_per_window"], "0.5");
        let back: SlashingParams = serde_json::from_value(json).unwrap();
        assert_eq!(back, SlashingParams::default());
    }
}
