// Layered loading of slashing params: defaults, optional TOML file, environment.

use crate::params::{ParamsError, SlashingParams};
use config::{Config, ConfigError, Environment, File, FileFormat};
use log::info;
use std::path::Path;
use thiserror::Error;

/// Environment prefix, e.g. `BLEEP_SLASHING__SIGNED_BLOCKS_WINDOW=200`.
pub const ENV_PREFIX: &str = "BLEEP_SLASHING";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load slashing settings: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Params(#[from] ParamsError),
}

/// Load and validate params. `path` is required to exist when given.
pub fn load(path: Option<&Path>) -> Result<SlashingParams, SettingsError> {
    let defaults = SlashingParams::default();

    let mut builder = Config::builder()
        .set_default("signed_blocks_window", defaults.signed_blocks_window)?
        .set_default(
            "min_signed_per_window",
            defaults.min_signed_per_window.to_string(),
        )?
        .set_default(
            "slash_fraction_downtime",
            defaults.slash_fraction_downtime.to_string(),
        )?
        .set_default(
            "downtime_jail_duration",
            defaults.downtime_jail_duration.as_secs(),
        )?
        .set_default("validator_update_delay", defaults.validator_update_delay)?;

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }
    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let params: SlashingParams = builder.build()?.try_deserialize()?;
    params.validate()?;

    info!(
        "slashing params: window {}, min signed {}, slash fraction {}, jail {}s, update delay {}",
        params.signed_blocks_window,
        params.min_signed_per_window,
        params.slash_fraction_downtime,
        params.downtime_jail_duration.as_secs(),
        params.validator_update_delay
    );
    Ok(params)
}
