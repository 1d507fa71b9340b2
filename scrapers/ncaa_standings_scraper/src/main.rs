use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::info;

use ncaa_standings_scraper::checkpoint::CheckpointFile;
use ncaa_standings_scraper::config::ScraperConfig;
use ncaa_standings_scraper::fetch::WebPageFetcher;
use ncaa_standings_scraper::resolver::StdinConsole;
use ncaa_standings_scraper::standings::{run_standings, StandingsOptions};
use ncaa_standings_scraper::store::{validate_sheet, CsvSheetStore};
use ncaa_standings_scraper::types::{Division, Gender};
use ncaa_standings_scraper::writer::RateLimitedWriter;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape conference standings and update the universities sheet
    Standings {
        /// Gender to scrape (men or women)
        #[arg(short, long, default_value = "men")]
        gender: String,
        /// Division to scrape (d1, d2, d3, naia)
        #[arg(short, long, default_value = "d1")]
        division: String,
        /// Override the standings page URL
        #[arg(long)]
        url: Option<String>,
        /// Conference to restart from (clears its completed marker and later ones)
        #[arg(short, long)]
        start_conference: Option<String>,
        /// Confirm conference mappings interactively before processing
        #[arg(short, long)]
        map_conferences: bool,
    },
    /// Flush write groups parked by an earlier rate-limited session
    FlushPending,
    /// Check sheet read/write access with a sentinel round-trip
    Validate,
}

fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = ScraperConfig::from_env();

    match cli.command {
        Commands::Standings {
            gender,
            division,
            url,
            start_conference,
            map_conferences,
        } => {
            let gender: Gender = gender.parse()?;
            let division: Division = division.parse()?;
            let store = CsvSheetStore::new(&config.sheet.path);
            let checkpoint = CheckpointFile::load(&config.state.checkpoint_file)?;
            let mut writer =
                RateLimitedWriter::new(store, checkpoint, config.rate_limits.writes_per_minute);
            let fetcher = WebPageFetcher::new(&config)?;
            let mut console = StdinConsole;
            let options = StandingsOptions {
                gender,
                division,
                url,
                start_conference,
                map_conferences,
            };
            let stats = run_standings(&fetcher, &mut writer, &mut console, &config, &options)?;
            info!(
                "Session finished: {} updated, {} deferred, {} skipped, {} failed",
                stats.updated, stats.deferred, stats.skipped, stats.failed
            );
        }
        Commands::FlushPending => {
            let store = CsvSheetStore::new(&config.sheet.path);
            let checkpoint = CheckpointFile::load(&config.state.checkpoint_file)?;
            let mut writer =
                RateLimitedWriter::new(store, checkpoint, config.rate_limits.writes_per_minute);
            if !writer.has_pending() {
                println!("No pending writes.");
                return Ok(());
            }
            let report = writer.flush_pending()?;
            println!(
                "Flushed {} pending write group(s); {} failed, {} still pending.",
                report.flushed, report.failed, report.remaining
            );
        }
        Commands::Validate => {
            let mut store = CsvSheetStore::new(&config.sheet.path);
            if !validate_sheet(&mut store)? {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
