use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use multichain_trader::config::Config;
use multichain_trader::monitoring;
use multichain_trader::notifier::{self, Notifier};
use multichain_trader::risk::ConfigPatch;
use multichain_trader::rpc;
use multichain_trader::scanner::{self, ScannerClient};
use multichain_trader::state::{EphemeralStore, JsonFileStore, StatePersistence};
use multichain_trader::wallet::{KeySource, MnemonicKeySource};
use multichain_trader::{NetworkTable, TradingStateCoordinator};

#[tokio::main]
async fn main() -> Result<()> {
    // Load local .env if present (no-op in prod/systemd envs)
    let _ = dotenvy::dotenv();

    monitoring::init_tracing();

    let cfg = Config::from_env()?;
    info!(?cfg, "boot");

    let timeout = Duration::from_secs(cfg.http_timeout_secs);
    let networks = NetworkTable::with_overrides(&cfg.rpc_overrides)?;
    let clients = rpc::build_clients(&networks, timeout)?;

    let store: Arc<dyn StatePersistence> = match cfg.state_path.as_deref() {
        Some(path) => {
            let store = JsonFileStore::new(path);
            info!(path = %store.path().display(), "state.file_store");
            Arc::new(store)
        }
        None => Arc::new(EphemeralStore),
    };
    let coordinator = Arc::new(TradingStateCoordinator::with_persistence(networks, clients, store)?);

    if let Some(enabled) = cfg.auto_pilot {
        coordinator
            .update_config(ConfigPatch { auto_pilot_enabled: Some(enabled), ..Default::default() })
            .await?;
    }

    match cfg.seed_phrase.as_deref() {
        Some(phrase) => {
            let wallets = MnemonicKeySource::new(phrase, cfg.seed_passphrase.as_str()).derive()?;
            coordinator.install_wallets(wallets)?;
        }
        None => warn!("wallet.seed_missing"),
    }

    if cfg.rpc_probe {
        probe_networks(&coordinator).await;
    }

    let notifier = Notifier::new(cfg.telegram_bot_token.clone(), cfg.telegram_chat_id);
    if let Err(e) = notifier.alert("trader online").await {
        warn!(error = %e, "telegram.alert_failed");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();

    tasks.spawn(notifier::run_inbound(
        notifier.clone(),
        cfg.telegram_poll_timeout_secs,
        shutdown_rx.clone(),
    ));

    match cfg.scanner_base_url.as_deref() {
        Some(base) => {
            let client = ScannerClient::new(base, cfg.scanner_api_key.as_deref(), &cfg.scanner_user_agent, timeout)?;
            tasks.spawn(scanner::run(
                Arc::clone(&coordinator),
                client,
                cfg.scanner_path.clone(),
                Duration::from_secs(cfg.scan_interval_secs),
                shutdown_rx.clone(),
            ));
        }
        None => warn!("scanner.disabled"),
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown");
    let _ = shutdown_tx.send(true);

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "task.failed"),
            Err(e) => warn!(error = %e, "task.panicked"),
        }
    }

    if let Err(e) = notifier.alert("trader offline").await {
        warn!(error = %e, "telegram.alert_failed");
    }
    coordinator.persist().await?;
    Ok(())
}

async fn probe_networks(coordinator: &TradingStateCoordinator) {
    for d in coordinator.networks().iter() {
        let client = match coordinator.client(d.symbol.as_str()) {
            Ok(c) => c,
            Err(e) => {
                warn!(network = %d.symbol, error = %e, "rpc.no_client");
                continue;
            }
        };
        match client.probe().await {
            Ok(height) => info!(network = %d.symbol, rpc = %d.rpc_endpoint, height, "rpc.ok"),
            Err(e) => {
                warn!(network = %d.symbol, rpc = %d.rpc_endpoint, error = %e, "rpc.unreachable");
                continue;
            }
        }
        // Wallets are optional at boot; balances are informational only.
        let Ok(wallet) = coordinator.wallet(d.symbol.as_str()) else {
            continue;
        };
        let address = wallet.address();
        match client.native_balance(&address).await {
            Ok(balance) => info!(network = %d.symbol, %address, balance, "wallet.balance"),
            Err(e) => warn!(network = %d.symbol, %address, error = %e, "wallet.balance_failed"),
        }
    }
}
