use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate, Timelike};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cardapio_bot::{
    format::format_message, logging, normalize, scheduler, AppendLog, Channel, ChangeDetector,
    Config, DryRunChannel, FileMenuSource, FileStore, Fingerprint, KeyValueStore, MealType,
    MemoryStore, MenuSource, MessageLedger, Publisher, Scheduler, SqliteStore, StoreKind,
    TickOutcome,
};

/// Posts the cafeteria menu to a Telegram channel, one live message per meal
#[derive(Parser)]
#[command(name = "cardapio-bot", version, long_about = None)]
struct Cli {
    /// Directory holding fingerprints and the message ledger
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Persistence backend
    #[arg(long, global = true, value_enum)]
    store: Option<StoreKind>,

    /// Log messages instead of posting; state is kept in memory only
    #[arg(long, global = true)]
    dry_run: bool,

    /// Read the menu from a local text/JSON file instead of the website
    #[arg(long, global = true)]
    source_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Tick now, then every interval; purge once a day (default)
    Run,

    /// Run a single tick and exit
    Tick,

    /// Delete every tracked message and clear the ledger
    Purge,

    /// Fetch and print the formatted message without sending anything
    Preview {
        /// Meal to preview (defaults to the one active now)
        #[arg(long)]
        meal: Option<MealType>,

        /// Menu date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show the messages currently tracked per meal
    Ledger,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.json_logs);

    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(store) = cli.store {
        config.store = store;
    }

    match cli.command.clone().unwrap_or(Commands::Run) {
        Commands::Run => {
            let mut publisher = build_publisher(&cli, &config)?;
            let mut schedule = Scheduler::new(
                Duration::minutes(config.tick_minutes),
                config.purge_at,
            );
            let now = Local::now().naive_local();
            if now.time() >= config.purge_at {
                schedule.skip_purge_today(now.date());
            }
            tracing::info!(
                version = cardapio_bot::VERSION,
                every_minutes = config.tick_minutes,
                purge_at = %config.purge_at,
                "Starting scheduler"
            );
            scheduler::run_forever(&mut publisher, schedule)
        }
        Commands::Tick => {
            let mut publisher = build_publisher(&cli, &config)?;
            let outcome = publisher.tick(Local::now().naive_local())?;
            print_outcome(&outcome);
            Ok(())
        }
        Commands::Purge => {
            let mut publisher = build_publisher(&cli, &config)?;
            let report = publisher.daily_purge()?;
            println!(
                "🧹 Purged {} message(s): {} deleted, {} failed",
                report.attempted, report.deleted, report.failed
            );
            Ok(())
        }
        Commands::Preview { meal, date } => run_preview(&cli, &config, meal, date),
        Commands::Ledger => {
            let (_, log) = open_stores(&cli, &config)?;
            let ledger = MessageLedger::new(log);
            let view = ledger.load()?;
            println!("📒 {} record(s) in ledger", view.records.len());
            for record in view.current() {
                println!("   {:<7} → message {}", record.meal_type.label(), record.message_id);
            }
            Ok(())
        }
    }
}

fn print_outcome(outcome: &TickOutcome) {
    match outcome {
        TickOutcome::Published { meal, message_id, retired } => {
            println!("✅ {} published as message {}", meal.label(), message_id);
            if let Some(r) = retired {
                let status = if r.deleted { "deleted" } else { "delete failed" };
                println!("   previous message {} {}", r.message_id, status);
            }
        }
        TickOutcome::Unchanged(meal) => println!("✓ {} unchanged", meal.label()),
        TickOutcome::SendFailed(meal) => println!("❌ {} send failed, will retry", meal.label()),
        TickOutcome::SourceUnavailable(meal) => println!("⚠️  {} menu unavailable", meal.label()),
        TickOutcome::NoUsableContent(meal) => println!("⚠️  {} menu has no usable content", meal.label()),
    }
}

fn run_preview(cli: &Cli, config: &Config, meal: Option<MealType>, date: Option<NaiveDate>) -> Result<()> {
    let now = Local::now().naive_local();
    let meal = meal.unwrap_or_else(|| MealType::for_hour(now.hour(), config.cutover_hour));
    let date = date.unwrap_or(now.date());

    let source = build_source(cli, config)?;
    let Some(payload) = source.fetch_today(meal, date)? else {
        println!("⚠️  No {} menu for {}", meal.label(), date);
        return Ok(());
    };

    let snapshot = normalize(&payload, &config.normalize_rules()).with_service_date(date);
    let Some(text) = format_message(meal, date, &snapshot) else {
        println!("⚠️  {} menu has no usable content", meal.label());
        return Ok(());
    };

    let (fingerprints, _) = open_stores(cli, config)?;
    let detector = ChangeDetector::new(fingerprints);

    println!("{}", text);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("fingerprint: {}", Fingerprint::of(&snapshot));
    println!("changed:     {}", detector.has_changed(meal, &snapshot));
    Ok(())
}

// ============================================================================
// WIRING
// ============================================================================

fn build_publisher(cli: &Cli, config: &Config) -> Result<Publisher> {
    let (fingerprints, log) = open_stores(cli, config)?;
    let publisher = Publisher::new(
        build_source(cli, config)?,
        build_channel(cli, config)?,
        ChangeDetector::new(fingerprints),
        MessageLedger::new(log),
    )
    .with_rules(config.normalize_rules())
    .with_cutover_hour(config.cutover_hour);
    Ok(publisher)
}

fn open_stores(cli: &Cli, config: &Config) -> Result<(Box<dyn KeyValueStore>, Box<dyn AppendLog>)> {
    if cli.dry_run {
        let store = MemoryStore::new();
        return Ok((Box::new(store.clone()), Box::new(store)));
    }

    match config.store {
        StoreKind::Sqlite => {
            std::fs::create_dir_all(&config.data_dir)
                .with_context(|| format!("Failed to create data dir {:?}", config.data_dir))?;
            let path = config.data_dir.join("cardapio.db");
            let store = SqliteStore::open(&path)
                .with_context(|| format!("Failed to open database {:?}", path))?;
            Ok((Box::new(store.clone()), Box::new(store)))
        }
        StoreKind::Files => {
            let store = FileStore::open(&config.data_dir)
                .with_context(|| format!("Failed to open data dir {:?}", config.data_dir))?;
            Ok((Box::new(store.clone()), Box::new(store)))
        }
    }
}

fn build_source(cli: &Cli, config: &Config) -> Result<Box<dyn MenuSource>> {
    if let Some(path) = &cli.source_file {
        return Ok(Box::new(FileMenuSource::new(path)));
    }

    #[cfg(feature = "http")]
    {
        Ok(Box::new(cardapio_bot::UfesMenuSource::new(config.menu_url.clone())?))
    }

    #[cfg(not(feature = "http"))]
    {
        let _ = config;
        anyhow::bail!("Built without the `http` feature: pass --source-file");
    }
}

fn build_channel(cli: &Cli, config: &Config) -> Result<Box<dyn Channel>> {
    if cli.dry_run {
        return Ok(Box::new(DryRunChannel));
    }

    let (token, chat_id) = config.telegram_credentials()?;

    #[cfg(feature = "http")]
    {
        Ok(Box::new(cardapio_bot::TelegramChannel::new(token, chat_id)?))
    }

    #[cfg(not(feature = "http"))]
    {
        let _ = (token, chat_id);
        anyhow::bail!("Built without the `http` feature: use --dry-run");
    }
}
