/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use fedibot_core::config::load_config;
use fedibot_core::runtime;
use tokio::sync::watch;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    info!("fedibot starting");
    let cfg = match load_config(std::env::args().skip(1), |k| std::env::var(k).ok()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("invalid config: {e:#}");
            std::process::exit(2);
        }
    };
    debug!(?cfg, "config loaded");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = runtime::run(cfg, shutdown_rx);
    tokio::pin!(run);

    let res = tokio::select! {
        res = &mut run => res,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
            run.await
        }
    };

    if let Err(e) = res {
        error!("fedibot stopped: {e:#}");
        std::process::exit(1);
    }
    info!("fedibot stopped");
    Ok(())
}
