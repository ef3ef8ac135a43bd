// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use presale_tracker::channels::HttpStatusQuery;
use presale_tracker::wallet_probe::{
    DetectedWallet, ProviderCapabilities, ProviderKind, StaticProbe,
};
use presale_tracker::contribution::tx_hashes_match;
use presale_tracker::{Contribution, TrackParams, TrackerConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[clap(rename_all = "kebab-case", author, version)]
pub struct Args {
    /// Tracker config file (YAML)
    #[clap(long, env = "PRESALE_TRACKER_CONFIG", global = true)]
    pub config: Option<PathBuf>,
    /// Status service base URLs, comma separated. Overrides the config file.
    #[clap(long, env = "PRESALE_API_URLS", value_delimiter = ',', global = true)]
    pub api_url: Vec<String>,
    #[clap(subcommand)]
    pub command: TrackerCommand,
}

/// Which contribution to look at
#[derive(clap::Args, Debug, Clone, Default)]
#[clap(rename_all = "kebab-case")]
pub struct IdentityArgs {
    /// Funding transaction hash
    #[clap(long)]
    pub tx_hash: Option<String>,
    /// Connected wallet address
    #[clap(long)]
    pub wallet: Option<String>,
    /// Address the payment was sent from, when it differs from the wallet
    #[clap(long)]
    pub sender: Option<String>,
}

impl IdentityArgs {
    pub fn params(&self) -> anyhow::Result<TrackParams> {
        let params = TrackParams {
            wallet_address: self.wallet.clone(),
            tx_hash: self.tx_hash.clone(),
            sender_address: self.sender.clone(),
        }
        .normalized();
        if params.is_empty() {
            return Err(anyhow!("one of --tx-hash, --wallet or --sender is required"));
        }
        Ok(params)
    }
}

#[derive(Subcommand)]
#[clap(rename_all = "kebab-case")]
pub enum TrackerCommand {
    /// Follow a contribution until it reaches a final status
    Watch {
        #[clap(flatten)]
        identity: IdentityArgs,
        #[clap(long)]
        poll_interval_secs: Option<u64>,
        /// Give up when nothing is found within this many seconds
        #[clap(long)]
        give_up_secs: Option<u64>,
        /// Print one JSON object per change
        #[clap(long)]
        json: bool,
        /// Dump tracker metrics on exit
        #[clap(long)]
        print_metrics: bool,
    },
    /// Look a contribution up once
    Status {
        #[clap(flatten)]
        identity: IdentityArgs,
        #[clap(long)]
        json: bool,
    },
    /// List the wallets available in a described environment
    Wallets {
        /// JSON object mapping provider kind to its capability flags
        #[clap(long)]
        providers: Option<PathBuf>,
        #[clap(long)]
        mobile: bool,
    },
}

/// Config file (or defaults) with command line endpoint overrides applied
pub fn load_config(path: Option<&Path>, api_urls: &[String]) -> anyhow::Result<TrackerConfig> {
    let mut config = match path {
        Some(path) => TrackerConfig::from_file(path)?,
        None => TrackerConfig::default(),
    };
    let api_urls: Vec<String> = api_urls
        .iter()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect();
    if !api_urls.is_empty() {
        config.api.base_urls = api_urls;
    }
    Ok(config)
}

pub fn build_query(config: &TrackerConfig) -> anyhow::Result<HttpStatusQuery> {
    HttpStatusQuery::new(
        config.api.base_urls.clone(),
        config.api.request_timeout(),
        config.api.failover_config(),
    )
    .context("No usable status service endpoint, set --api-url or api.base_urls")
}

pub fn render(contribution: &Contribution, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string(contribution)?);
    }
    let mut line = contribution.to_string();
    if let Some(status) = &contribution.status {
        line.push_str(&format!(" | {}", status.describe()));
    }
    Ok(line)
}

/// Final status for the transaction being watched. An entry for another
/// transaction (an address lookup fallback) never ends the watch.
pub fn is_settled(contribution: &Contribution, tracked_tx: Option<&str>) -> bool {
    let ours = match (tracked_tx, contribution.tx_hash()) {
        (Some(tracked), Some(held)) => tx_hashes_match(tracked, held),
        (Some(_), None) => false,
        (None, _) => true,
    };
    ours && contribution
        .status
        .as_ref()
        .is_some_and(|status| status.is_terminal())
}

pub fn render_wallet(wallet: &DetectedWallet) -> String {
    format!(
        "{:<16} {:?}{}",
        wallet.kind.label(),
        wallet.method,
        if wallet.installed { " (installed)" } else { "" }
    )
}

/// Probe built from a JSON description such as
/// `{"ethereum": {"isMetamask": true, "providerCount": 1}}`
pub fn load_probe(path: Option<&Path>, mobile: bool) -> anyhow::Result<StaticProbe> {
    let mut probe = StaticProbe::new().mobile(mobile);
    if let Some(path) = path {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read provider description: {:?}", path))?;
        let providers: HashMap<ProviderKind, ProviderCapabilities> =
            serde_json::from_str(&contents).context("Failed to parse provider description")?;
        for (kind, caps) in providers {
            probe = probe.with_provider(kind, caps);
        }
    }
    Ok(probe)
}
