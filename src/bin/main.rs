use anyhow::{bail, Context, Result};
use bleep_slashing::settings;
use bleep_slashing::{
    BlockContext, CommitSummary, ConsAddress, Event, EventManager, KvBitmapStore,
    KvSigningInfoStore, LivenessTracker, MemoryKv, MissedBlockBitmap, SigningInfoStore,
    SlashRecord, SlashingParams, StakingLedger, ValidatorSigningInfo, VoteInfo,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use env_logger::Env;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bleep-liveness")]
#[command(about = "Replay blocks through the BLEEP liveness tracker", long_about = None)]
struct Cli {
    /// Slashing params (TOML). Defaults and BLEEP_SLASHING__* overrides apply without it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Genesis validators and blocks to replay (JSON)
    #[arg(long)]
    blocks: PathBuf,

    /// Compact single-line output
    #[arg(long)]
    compact: bool,
}

/// A validator bonded before the first replayed block.
///
/// Either `address` or `pubkey` must be set. With both, the address must be the
/// one derived from the key.
#[derive(Debug, Deserialize)]
struct GenesisValidator {
    #[serde(default)]
    address: Option<ConsAddress>,
    #[serde(default)]
    pubkey: Option<String>,
    tokens: u128,
    #[serde(default)]
    start_height: i64,
}

#[derive(Debug, Deserialize)]
struct BlockInput {
    height: i64,
    time: DateTime<Utc>,
    #[serde(default)]
    votes: Vec<VoteInfo>,
}

#[derive(Debug, Deserialize)]
struct ReplayInput {
    validators: Vec<GenesisValidator>,
    blocks: Vec<BlockInput>,
}

#[derive(Debug, Serialize)]
struct MissedWindow {
    address: ConsAddress,
    indices: Vec<u64>,
}

#[derive(Debug, Serialize)]
struct ReplaySummary {
    params: SlashingParams,
    blocks: usize,
    last_height: Option<i64>,
    totals: CommitSummary,
    signing_infos: Vec<ValidatorSigningInfo>,
    missed_blocks: Vec<MissedWindow>,
    jailed: Vec<ConsAddress>,
    slashes: Vec<SlashRecord>,
    total_burned: u128,
    events: Vec<Event>,
}

struct Replay {
    params: SlashingParams,
    infos: KvSigningInfoStore<MemoryKv>,
    bitmap: KvBitmapStore<MemoryKv>,
    staking: StakingLedger,
    events: EventManager,
}

impl Replay {
    fn new(params: SlashingParams) -> Self {
        Replay {
            params,
            infos: KvSigningInfoStore::new(MemoryKv::new()),
            bitmap: KvBitmapStore::new(MemoryKv::new()),
            staking: StakingLedger::new(),
            events: EventManager::new(),
        }
    }

    fn bond(&mut self, genesis: &GenesisValidator) -> Result<ConsAddress> {
        let address = match (&genesis.address, &genesis.pubkey) {
            (address, Some(pubkey)) => {
                let bytes = hex::decode(pubkey.trim_start_matches("0x"))
                    .with_context(|| format!("invalid validator pubkey {}", pubkey))?;
                let derived = self
                    .infos
                    .add_pubkey(&bytes)
                    .context("failed to store pubkey relation")?;
                if let Some(address) = address {
                    if *address != derived {
                        bail!("address {} does not match pubkey (expected {})", address, derived);
                    }
                }
                derived
            }
            (Some(address), None) => *address,
            (None, None) => bail!("genesis validator needs an address or a pubkey"),
        };

        if self.staking.validator(&address).is_some() {
            bail!("validator {} listed twice in genesis", address);
        }
        self.staking.bond(address, genesis.tokens);
        self.infos
            .set_signing_info(
                &address,
                &ValidatorSigningInfo::new(address, genesis.start_height),
            )
            .with_context(|| format!("failed to store signing info for {}", address))?;
        Ok(address)
    }

    fn commit(&mut self, block: &BlockInput) -> Result<CommitSummary> {
        let ctx = BlockContext::new(block.height, block.time);
        LivenessTracker::new(
            &self.params,
            &mut self.infos,
            &mut self.bitmap,
            &mut self.staking,
            &mut self.events,
        )
        .handle_commit(&ctx, &block.votes)
        .with_context(|| format!("block {} aborted", block.height))
    }

    fn summary(
        self,
        blocks: usize,
        last_height: Option<i64>,
        totals: CommitSummary,
    ) -> Result<ReplaySummary> {
        let window = self.params.signed_blocks_window as u64;
        let signing_infos = self.infos.all_signing_infos()?;

        let mut missed_blocks = Vec::new();
        for info in &signing_infos {
            let indices = self.bitmap.missed_blocks(&info.address, window)?;
            if !indices.is_empty() {
                missed_blocks.push(MissedWindow {
                    address: info.address,
                    indices,
                });
            }
        }

        Ok(ReplaySummary {
            blocks,
            last_height,
            totals,
            signing_infos,
            missed_blocks,
            jailed: self
                .staking
                .validators()
                .filter(|v| v.is_jailed())
                .map(|v| v.address)
                .collect(),
            slashes: self.staking.slashes().to_vec(),
            total_burned: self.staking.total_burned(),
            events: self.events.events().to_vec(),
            params: self.params,
        })
    }
}

fn replay(params: SlashingParams, input: &ReplayInput) -> Result<ReplaySummary> {
    let mut state = Replay::new(params);

    for genesis in &input.validators {
        let address = state.bond(genesis)?;
        info!(
            "Bonded validator {} with {} tokens at height {}",
            address, genesis.tokens, genesis.start_height
        );
    }

    let mut totals = CommitSummary::default();
    let mut last_height: Option<i64> = None;
    for block in &input.blocks {
        if let Some(last) = last_height {
            if block.height <= last {
                bail!("block heights must increase: {} after {}", block.height, last);
            }
        }

        let summary = state.commit(block)?;
        totals.unchanged += summary.unchanged;
        totals.updated += summary.updated;
        totals.punished += summary.punished;
        totals.skipped_punishments += summary.skipped_punishments;
        last_height = Some(block.height);
    }

    info!(
        "Replayed {} blocks: {} punished, {} skipped punishments",
        input.blocks.len(),
        totals.punished,
        totals.skipped_punishments
    );
    state.summary(input.blocks.len(), last_height, totals)
}

fn run(cli: Cli) -> Result<()> {
    let params = settings::load(cli.config.as_deref()).context("failed to load slashing params")?;

    let raw = std::fs::read_to_string(&cli.blocks)
        .with_context(|| format!("failed to read {}", cli.blocks.display()))?;
    let input: ReplayInput = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", cli.blocks.display()))?;

    let summary = replay(params, &input)?;
    let output = if cli.compact {
        serde_json::to_string(&summary)?
    } else {
        serde_json::to_string_pretty(&summary)?
    };
    println!("{}", output);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("Replay failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}
