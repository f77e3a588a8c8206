//! pricedesk-ctl - operator front end for the pricing engine
//!
//! Every command goes through [`PricingEngine`]; nothing here derives a
//! price on its own. Commands that need the current dataset sync it first
//! from `--inventory <FILE>` or the configured backend.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pricedesk_common::config::{resolve_root_folder, EngineConfig, ROOT_ENV_VAR};
use pricedesk_common::db::SqliteStorage;
use pricedesk_common::sync::{FileInventorySource, HttpInventorySource, InventorySource, SyncOutcome};
use pricedesk_common::{
    EffectivePrice, Market, PriceSource, PricingEngine, RawCostRecord, VariantId,
};

type Engine = PricingEngine<SqliteStorage>;

/// Command-line arguments for pricedesk-ctl
#[derive(Parser, Debug)]
#[command(name = "pricedesk-ctl")]
#[command(about = "Inspect and adjust reconciled product prices")]
#[command(version)]
struct Cli {
    /// Data folder holding the pricing database
    #[arg(long, global = true, env = ROOT_ENV_VAR)]
    root_folder: Option<PathBuf>,

    /// Config file (default: <config dir>/pricedesk/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Read inventory from this JSON file instead of the backend
    #[arg(long, global = true, value_name = "FILE")]
    inventory: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print effective prices
    Prices {
        /// Only this market
        #[arg(long)]
        market: Option<String>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Set or clear manual price overrides
    Override {
        #[command(subcommand)]
        action: OverrideCommand,
    },

    /// Show or edit per-market settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },

    /// Refresh inventory and reconcile
    Sync,

    /// Sync periodically and print every pricing event
    Watch {
        #[arg(long, default_value = "60")]
        interval_secs: u64,
    },
}

#[derive(Subcommand, Debug)]
enum OverrideCommand {
    Set {
        #[command(flatten)]
        identity: Identity,
        price: f64,
    },
    Clear {
        #[command(flatten)]
        identity: Identity,
    },
    ClearAll,
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    Show {
        market: String,
    },
    Set {
        market: String,
        field: String,
        value: String,
    },
    Reset {
        market: String,
    },
}

#[derive(Args, Debug)]
struct Identity {
    #[arg(long)]
    model: String,
    #[arg(long)]
    grade: String,
    #[arg(long)]
    capacity: String,
    #[arg(long)]
    color: String,
    #[arg(long, default_value = Market::DEFAULT_CODE)]
    market: String,
}

impl Identity {
    fn variant_id(&self) -> VariantId {
        VariantId::new(
            &self.model,
            &self.grade,
            &self.capacity,
            &self.color,
            Market::new(&self.market),
        )
    }
}

/// Where this invocation reads inventory from
enum Source {
    File(FileInventorySource),
    Http(HttpInventorySource),
}

impl InventorySource for Source {
    async fn fetch(&self) -> pricedesk_common::Result<Vec<RawCostRecord>> {
        match self {
            Source::File(source) => source.fetch().await,
            Source::Http(source) => source.fetch().await,
        }
    }
}

fn inventory_source(cli: &Cli, config: &EngineConfig) -> Result<Source> {
    if let Some(path) = &cli.inventory {
        return Ok(Source::File(FileInventorySource::new(path)));
    }
    let base_url = config
        .sync
        .base_url
        .as_deref()
        .context("No inventory source: pass --inventory or set [sync] base_url")?;
    Ok(Source::Http(HttpInventorySource::new(
        base_url,
        config.sync.timeout(),
    )?))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<pricedesk_common::Error>() {
            Some(err) => {
                let facing = err.to_user_facing();
                eprintln!("error [{}]: {}", facing.category, facing.message);
                if facing.retryable {
                    eprintln!("(transient, retry may succeed)");
                }
            }
            None => eprintln!("error: {e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = EngineConfig::load(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "pricedesk-ctl v{} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("PRICEDESK_BUILD_ID")
    );

    let root_folder = resolve_root_folder(cli.root_folder.as_deref(), ROOT_ENV_VAR, &config);
    let db_path = config.database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let storage = SqliteStorage::open(&db_path)
        .await
        .context("Failed to open pricing database")?;
    let engine = PricingEngine::open(storage, &config).await;

    match &cli.command {
        Command::Prices { market, json } => {
            sync_once(&engine, &inventory_source(&cli, &config)?).await?;
            let market = market.as_deref().map(Market::new);
            let prices: Vec<EffectivePrice> = engine
                .snapshot()
                .await
                .into_iter()
                .filter(|p| market.as_ref().map_or(true, |m| &p.id.market == m))
                .collect();
            if *json {
                println!("{}", serde_json::to_string_pretty(&prices)?);
            } else {
                print_prices(&prices);
            }
        }
        Command::Override { action } => run_override(&engine, &cli, &config, action).await?,
        Command::Settings { action } => run_settings(&engine, action).await?,
        Command::Sync => {
            let outcome = sync_once(&engine, &inventory_source(&cli, &config)?).await?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Command::Watch { interval_secs } => {
            let source = inventory_source(&cli, &config)?;
            watch(&engine, &source, Duration::from_secs((*interval_secs).max(1))).await?;
        }
    }

    Ok(())
}

async fn sync_once(engine: &Engine, source: &Source) -> Result<SyncOutcome> {
    let outcome = engine.sync_now(source).await?;
    if let SyncOutcome::Applied { flagged, .. } = outcome {
        if flagged > 0 {
            warn!("{} variants have missing or negative cost data", flagged);
        }
    }
    Ok(outcome)
}

async fn run_override(
    engine: &Engine,
    cli: &Cli,
    config: &EngineConfig,
    action: &OverrideCommand,
) -> Result<()> {
    match action {
        OverrideCommand::Set { identity, price } => {
            sync_once(engine, &inventory_source(cli, config)?).await?;
            let effective = engine
                .set_override(&identity.variant_id().key(), *price)
                .await?;
            print_prices(std::slice::from_ref(&effective));
        }
        OverrideCommand::Clear { identity } => {
            let key = identity.variant_id().key();
            match engine.clear_override(&key).await? {
                Some(record) => println!(
                    "Cleared override on {} ({} -> original {})",
                    key, record.override_price, record.original_price
                ),
                None => println!("No override on {}", key),
            }
        }
        OverrideCommand::ClearAll => {
            let cleared = engine.clear_all_overrides().await?;
            println!("Cleared {} overrides", cleared);
        }
    }
    Ok(())
}

async fn run_settings(engine: &Engine, action: &SettingsCommand) -> Result<()> {
    match action {
        SettingsCommand::Show { market } => {
            let market = Market::new(market);
            let settings = engine.market_settings(&market).await;
            println!("[{}]", market);
            for meta in pricedesk_common::MarketSettings::metadata() {
                println!(
                    "{:<22} = {:<12} # {} ({})",
                    meta.key,
                    (meta.getter)(&settings),
                    meta.description,
                    meta.validation_range
                );
            }
        }
        SettingsCommand::Set {
            market,
            field,
            value,
        } => {
            let market = Market::new(market);
            let settings = engine
                .update_market_setting_field(&market, field, value)
                .await?;
            println!(
                "[{}] {} = {}",
                market,
                field,
                settings.field(field).unwrap_or_default()
            );
        }
        SettingsCommand::Reset { market } => {
            let market = Market::new(market);
            let baseline = engine.reset_market_settings(&market).await?;
            let seeded = baseline != pricedesk_common::MarketSettings::default_for(&market);
            println!(
                "[{}] reset to {}",
                market,
                if seeded { "configured seed" } else { "built-in defaults" }
            );
        }
    }
    Ok(())
}

async fn watch(engine: &Engine, source: &Source, interval: Duration) -> Result<()> {
    let (snapshot, mut rx) = engine.subscribe_with_snapshot().await;
    info!("Watching {} variants, syncing every {:?}", snapshot.len(), interval);

    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!("Unprintable event: {}", e),
                },
                Err(RecvError::Lagged(missed)) => {
                    warn!("Event printer lagged, {} events missed", missed)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut ticker = tokio::time::interval(interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = engine.sync_now(source).await {
                    warn!("Sync failed, keeping current prices: {}", e);
                }
            }
            _ = &mut shutdown => {
                info!("Stopping watch");
                break;
            }
        }
    }

    printer.abort();
    Ok(())
}

/// Overridden rows show the price captured when the override was created
fn source_label(price: &EffectivePrice) -> String {
    match (&price.source, &price.override_info) {
        (PriceSource::Override, Some(record)) => {
            format!("override (was {})", record.original_price)
        }
        (PriceSource::Override, None) => "override".to_string(),
        (PriceSource::Computed, _) => "computed".to_string(),
    }
}

fn print_prices(prices: &[EffectivePrice]) {
    println!(
        "{:<44} {:>4} {:>10} {:>8} {:>10} {:>10}  {}",
        "VARIANT", "QTY", "COST", "MARGIN%", "SELL", "CUSTOMER", "SOURCE"
    );
    for price in prices {
        let flags = if price.flags.is_empty() {
            String::new()
        } else {
            format!(" {:?}", price.flags)
        };
        println!(
            "{:<44} {:>4} {:>10.2} {:>8.2} {:>10} {:>10}  {}{}",
            price.variant.as_str(),
            price.quantity,
            price.computed.total_cost,
            price.computed.margin_percent,
            price.sell_price,
            price.customer_price,
            source_label(price),
            flags
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricedesk_common::{MemoryStorage, VariantKey};

    fn record(cost: f64) -> RawCostRecord {
        RawCostRecord {
            model: "iPhone 13".to_string(),
            grade: "B".to_string(),
            capacity: "128GB".to_string(),
            color: "Blue".to_string(),
            market: Some("US".to_string()),
            quantity: Some(1),
            base_cost: Some(cost),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_override_label_shows_captured_original() {
        let engine = PricingEngine::open(MemoryStorage::new(), &EngineConfig::default()).await;
        let ticket = engine.begin_sync();
        engine.apply_sync(ticket, vec![record(500.0)]).await;
        let key = VariantKey::from_raw("iPhone 13-B-128GB-Blue-US");

        let before = engine.effective_price(&key).await.unwrap();
        assert_eq!(source_label(&before), "computed");
        let original = before.sell_price;

        engine.set_override(&key, 999.0).await.unwrap();
        engine
            .update_market_setting_field(&Market::us(), "min_profit_cap", "0")
            .await
            .unwrap();
        engine
            .update_market_setting_field(&Market::us(), "shipping_addon", "40")
            .await
            .unwrap();

        let overridden = engine.effective_price(&key).await.unwrap();
        assert_eq!(source_label(&overridden), format!("override (was {original})"));
    }

    #[test]
    fn test_build_id_has_hash_timestamp_and_profile() {
        let parts: Vec<&str> = env!("PRICEDESK_BUILD_ID").split(' ').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].ends_with('Z'));
    }
}
