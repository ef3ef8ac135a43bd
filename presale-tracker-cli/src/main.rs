// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::Context;
use clap::Parser;
use presale_tracker::channels::{lookup_contribution, StatusQuery};
use presale_tracker::contribution::{now_ms, Contribution};
use presale_tracker::timeout::await_contribution;
use presale_tracker::wallet_probe::detect_wallets;
use presale_tracker::{ContributionTracker, TrackerError, TrackerMetrics};
use presale_tracker_cli::{
    build_query, is_settled, load_config, load_probe, render, render_wallet, Args,
    TrackerCommand,
};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref(), &args.api_url)?;

    match args.command {
        TrackerCommand::Watch {
            identity,
            poll_interval_secs,
            give_up_secs,
            json,
            print_metrics,
        } => {
            if let Some(secs) = poll_interval_secs {
                config.poll_interval_secs = secs;
            }
            if let Some(secs) = give_up_secs {
                config.give_up_after_secs = secs;
            }
            config.validate()?;
            let params = identity.params()?;

            let registry = Registry::new();
            let metrics = Arc::new(TrackerMetrics::new(&registry));
            let query = Arc::new(build_query(&config)?);
            let tracker = ContributionTracker::new(config.clone(), query, metrics);
            tracing::info!(
                "Watching {} via {}",
                params,
                config.api.base_urls.join(", ")
            );
            let tracked_tx = params.tx_hash.clone();
            let handle = tracker.start(params);
            let mut watch = handle.subscribe();

            let first = tokio::select! {
                result = await_contribution(&handle, config.give_up_after()) => result,
                _ = tokio::signal::ctrl_c() => Err(TrackerError::Cancelled),
            };
            let mut last = match first {
                Ok(contribution) => contribution,
                Err(TrackerError::Cancelled) => {
                    handle.stop().await;
                    return Ok(());
                }
                Err(e) => {
                    handle.stop().await;
                    return Err(e.into());
                }
            };
            println!("{}", render(&last, json)?);

            while !is_settled(&last, tracked_tx.as_deref()) {
                tokio::select! {
                    changed = watch.changed() => {
                        if !changed {
                            break;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
                if let Some(current) = watch.take_current() {
                    if !current.same_content(&last) {
                        println!("{}", render(&current, json)?);
                        last = current;
                    }
                }
            }
            handle.stop().await;

            if print_metrics {
                let mut buffer = Vec::new();
                TextEncoder::new()
                    .encode(&registry.gather(), &mut buffer)
                    .context("Failed to encode metrics")?;
                eprintln!("{}", String::from_utf8_lossy(&buffer));
            }
        }
        TrackerCommand::Status { identity, json } => {
            let params = identity.params()?;
            let query = build_query(&config)?;
            let metrics = TrackerMetrics::new(&Registry::new());
            let found = lookup_contribution(
                &query as &dyn StatusQuery,
                params.lookup_keys(),
                &metrics,
            )
            .await?;
            match found {
                Some((source, fields)) => {
                    let contribution = Contribution::from_fields(&fields, source.into(), now_ms());
                    println!("{}", render(&contribution, json)?);
                }
                None => println!("No contribution found for {}", params),
            }
        }
        TrackerCommand::Wallets { providers, mobile } => {
            let probe = load_probe(providers.as_deref(), mobile)?;
            let project_id = config.wallets.walletconnect_project_id.as_deref();
            for wallet in detect_wallets(&probe, project_id) {
                println!("{}", render_wallet(&wallet));
            }
        }
    }
    Ok(())
}
