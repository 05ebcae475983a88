use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use offerbook::browser::chrome::BrowserSession;
use offerbook::clock::{Clock, SystemClock};
use offerbook::config::{default_config_path, ResolvedConfig};
use offerbook::models::Bank;
use offerbook::pipeline::{OfferPipeline, RunReport};
use offerbook::portal::portal_for;
use offerbook::sheets::{maintenance, GoogleSheet, MemorySheet, OfferSheet, SheetSync};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "offerbook")]
#[command(about = "Enroll credit-card merchant offers and log them to a spreadsheet")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_HASH"), ")"))]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enroll new offers for one bank and append them to the sheet
    Run {
        bank: Bank,

        /// Scrape and normalize only; no clicks, no sheet writes
        #[arg(long)]
        dry_run: bool,
    },
    /// Open the bank's browser profile so you can sign in
    Login { bank: Bank },
    /// Spreadsheet maintenance
    Sheet {
        #[command(subcommand)]
        command: SheetCommand,
    },
    /// Show the resolved configuration
    Config,
}

#[derive(Subcommand)]
enum SheetCommand {
    /// Delete later rows that repeat an earlier offer
    Dedupe,
    /// Rewrite date cells as "Mon DD, YYYY"
    NormalizeDates,
    /// Delete offers whose expiration date has passed
    DeleteExpired,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,chromiumoxide=warn,chromiumoxide::conn=off,chromiumoxide::handler=off")
    });
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = ResolvedConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;

    match cli.command {
        Command::Run { bank, dry_run } => {
            let report = run(&config, bank, dry_run).await?;
            print_report(&report);
        }
        Command::Login { bank } => login(&config, bank).await?,
        Command::Sheet { command } => {
            let sheet = GoogleSheet::from_config(&config)?;
            let worksheet = config.sheet.worksheet.as_str();
            match command {
                SheetCommand::Dedupe => {
                    let removed = maintenance::dedupe_rows(&sheet, worksheet).await?;
                    println!("Removed {removed} duplicate rows from {worksheet:?}");
                }
                SheetCommand::NormalizeDates => {
                    let changed = maintenance::normalize_dates(&sheet, worksheet).await?;
                    println!("Rewrote {changed} date cells in {worksheet:?}");
                }
                SheetCommand::DeleteExpired => {
                    let today = SystemClock.today();
                    let removed = maintenance::delete_expired(&sheet, worksheet, today).await?;
                    println!("Deleted {removed} expired rows from {worksheet:?}");
                }
            }
        }
        Command::Config => {
            println!("Config file: {}", cli.config.display());
            println!("{}", toml::to_string_pretty(&config).context("Failed to render config")?);
        }
    }

    Ok(())
}

async fn run(config: &ResolvedConfig, bank: Bank, dry_run: bool) -> Result<RunReport> {
    let portal = portal_for(bank, config.portal(bank));
    let sheet: Box<dyn OfferSheet> = if dry_run && config.sheet.spreadsheet_id.is_none() {
        info!("No spreadsheet configured; dry run starts from an empty sheet");
        Box::new(MemorySheet::new())
    } else {
        Box::new(GoogleSheet::from_config(config)?)
    };

    let session = BrowserSession::start(config, bank).await?;
    let clock = SystemClock;
    let result = OfferPipeline::new(
        portal.as_ref(),
        &config.timing,
        SheetSync::new(sheet.as_ref(), &config.sheet),
        &clock,
    )
    .dry_run(dry_run)
    .interactive(!config.browser.headless)
    .run(session.page())
    .await;

    first_error(result, session.finish().await)
}

/// The run's own error wins over a failure to close the browser.
fn first_error<T>(result: Result<T>, closed: Result<()>) -> Result<T> {
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(error = %close_err, "Failed to close browser");
            Err(err)
        }
    }
}

async fn login(config: &ResolvedConfig, bank: Bank) -> Result<()> {
    let portal = portal_for(bank, config.portal(bank));
    let session = BrowserSession::start(config, bank).await?;
    offerbook::browser::OfferPage::goto(session.page(), portal.login_url()).await?;

    println!(
        "Sign in to {} in the browser window (profile {}).",
        bank.display_name(),
        config.profile_path(bank).display()
    );
    println!("Press Enter once the offers page loads to save the session.");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read from stdin")?;

    session.close();
    println!("Session saved.");
    Ok(())
}

fn print_report(report: &RunReport) {
    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!("{} summary{mode}", report.bank.display_name());
    println!("  scopes:           {} ({} skipped)", report.scopes, report.skipped_scopes);
    println!("  cards scraped:    {}", report.scraped);
    println!("  already in sheet: {}", report.duplicates);
    println!("  parse failures:   {}", report.parse_failures);
    println!("  enrolled:         {}", report.enrolled);
    println!("  already enrolled: {}", report.already_enrolled);
    println!("  enroll failures:  {}", report.enroll_failures);
    if report.capped > 0 {
        println!("  over click cap:   {}", report.capped);
    }
    println!("  rows appended:    {}", report.appended);
}
