//! MeanRev CLI: run the daily cycle and inspect what it left behind.
//!
//! Commands:
//! - `run`: one daily cycle against Alpaca (paper by default)
//! - `status`: the most recent run snapshot and the pending-order store
//! - `trades`: summary of the trade ledger
//! - `init-config`: write a default config file

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use meanrev_core::state::SnapshotStore;
use meanrev_runner::{
    read_trades, run_daily_cycle, AlpacaClient, AlpacaEndpoints, BotConfig, Credentials,
    CsvLedger, RunManifest, TradeSummary,
};

#[derive(Parser)]
#[command(name = "meanrev", about = "MeanRev: daily mean-reversion trading bot")]
struct Cli {
    /// Path to the TOML config file. Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "meanrev.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one daily cycle: reconcile, exits, entries, fill checks.
    Run,
    /// Print the most recent run snapshot and the open orders being tracked.
    Status,
    /// Summarise the trade ledger.
    Trades {
        /// Also print every trade.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Write a config file with every default filled in.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => run_cycle(&cli.config),
        Commands::Status => run_status(&load_config(&cli.config)?),
        Commands::Trades { all } => run_trades(&load_config(&cli.config)?, all),
        Commands::InitConfig { force } => run_init_config(&cli.config, force),
    }
}

fn load_config(path: &Path) -> Result<BotConfig> {
    if !path.exists() {
        return Ok(BotConfig::default());
    }
    BotConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))
}

/// Stderr layer filtered by `RUST_LOG` (default `info`), plus an appending
/// `bot.log` in the state directory. The guard must outlive the run or
/// buffered lines are lost.
fn init_logging(state_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("creating state dir {}", state_dir.display()))?;
    let file_appender = tracing_appender::rolling::never(state_dir, "bot.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(env_filter()),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(env_filter()),
        );
    tracing::subscriber::set_global_default(subscriber).context("installing log subscriber")?;
    Ok(guard)
}

fn run_cycle(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let _guard = init_logging(&config.paths.state_dir)?;
    if !config_path.exists() {
        tracing::warn!(path = %config_path.display(), "config file not found, using defaults");
    }

    let credentials = Credentials::from_env().context("reading Alpaca credentials")?;
    let client = AlpacaClient::new(
        credentials,
        AlpacaEndpoints::for_mode(config.broker.paper),
        config.history_buffer_days,
    )
    .context("building Alpaca client")?;
    let mut ledger = CsvLedger::new(&config.paths.trades_csv, &config.paths.state_dir);

    tracing::info!(
        paper = config.broker.paper,
        tickers = config.universe.len(),
        fingerprint = %config.fingerprint(),
        "starting daily run"
    );
    let outcome = run_daily_cycle(&config, &client, &client, &mut ledger, Utc::now())
        .context("daily run failed")?;

    let manifest = &outcome.manifest;
    println!();
    println!("=== Run {} ===", manifest.run_id);
    println!("mode:      {}", if manifest.paper { "paper" } else { "LIVE" });
    println!("duration:  {:.1}s", manifest.duration_secs());
    println!("{}", manifest.summary);
    for record in &outcome.records {
        println!(
            "trade:     {} {} {} @ {:.2} -> {:.2}, pnl {:.2}",
            record.ticker,
            record.side.as_str(),
            record.quantity,
            record.entry_price,
            record.exit_price,
            record.pnl
        );
    }
    Ok(())
}

fn run_status(config: &BotConfig) -> Result<()> {
    let store = SnapshotStore::new(&config.paths.state_dir);
    let Some(run_id) = store.latest_run().context("listing runs")? else {
        println!("No runs yet in {}", config.paths.state_dir.display());
        return Ok(());
    };

    println!("Latest run: {run_id}");
    if let Some(manifest) = store
        .load_manifest::<RunManifest>(&run_id)
        .context("reading manifest")?
    {
        println!("finished:  {}", manifest.finished_at.to_rfc3339());
        if manifest.config_fingerprint != config.fingerprint() {
            println!("note:      config changed since this run");
        }
        println!("{}", manifest.summary);
    }

    let positions = store.load_run_positions(&run_id).context("reading positions")?;
    println!();
    println!("Positions ({}):", positions.len());
    println!(
        "{:<8} {:<6} {:>6} {:>10} {:<20}",
        "Ticker", "Side", "Qty", "Entry", "Since"
    );
    println!("{}", "-".repeat(54));
    for p in &positions {
        println!(
            "{:<8} {:<6} {:>6} {:>10.2} {:<20}{}",
            p.ticker,
            p.side.as_str(),
            p.quantity,
            p.entry_price,
            p.entry_timestamp.format("%Y-%m-%d %H:%M"),
            if p.recovered { " (recovered)" } else { "" }
        );
    }

    let pending = store.load_pending().context("reading pending orders")?;
    println!();
    println!("Pending orders ({}):", pending.len());
    for o in &pending {
        println!(
            "  {} {} {} {} @ {} ({:?}, {})",
            o.order_id,
            o.ticker,
            o.side.as_str(),
            o.quantity,
            o.limit_price
                .map(|p| format!("{p:.2}"))
                .unwrap_or_else(|| "-".into()),
            o.intent,
            o.status.as_str()
        );
    }
    Ok(())
}

fn run_trades(config: &BotConfig, all: bool) -> Result<()> {
    let path = &config.paths.trades_csv;
    let rows = read_trades(path).with_context(|| format!("reading {}", path.display()))?;
    if rows.is_empty() {
        println!("No trades recorded in {}", path.display());
        return Ok(());
    }

    if all {
        println!(
            "{:<8} {:<6} {:>6} {:>10} {:>10} {:>10}  {}",
            "Ticker", "Side", "Qty", "Entry", "Exit", "P&L", "Reason"
        );
        println!("{}", "-".repeat(72));
        for r in &rows {
            println!(
                "{:<8} {:<6} {:>6} {:>10.2} {:>10.2} {:>10.2}  {}",
                r.ticker, r.side, r.quantity, r.entry_price, r.exit_price, r.pnl, r.exit_reason
            );
        }
        println!();
    }

    let summary = TradeSummary::from_rows(&rows);
    println!("Trades:    {}", summary.count);
    println!("Winners:   {} ({:.1}%)", summary.winners, summary.win_rate() * 100.0);
    println!("Total P&L: {:.2}", summary.total_pnl);
    Ok(())
}

fn run_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (pass --force to overwrite)", path.display());
    }
    let text = BotConfig::default().to_toml()?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
