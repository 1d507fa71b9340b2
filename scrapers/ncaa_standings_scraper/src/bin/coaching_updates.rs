use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use std::path::PathBuf;
use tracing::info;

use ncaa_standings_scraper::checkpoint::CheckpointFile;
use ncaa_standings_scraper::coaching::run_coaching_updates;
use ncaa_standings_scraper::config::ScraperConfig;
use ncaa_standings_scraper::fetch::WebPageFetcher;
use ncaa_standings_scraper::store::CsvSheetStore;
use ncaa_standings_scraper::writer::RateLimitedWriter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Apply coaching-change CSVs to the universities sheet", long_about = None)]
struct Cli {
    /// Folder containing the change CSV exports
    #[arg(short, long)]
    folder: PathBuf,
}

fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = ScraperConfig::from_env();

    let store = CsvSheetStore::new(&config.sheet.path);
    let checkpoint = CheckpointFile::load(&config.state.checkpoint_file)?;
    let mut writer =
        RateLimitedWriter::new(store, checkpoint, config.rate_limits.writes_per_minute);
    let fetcher = WebPageFetcher::new(&config)?;

    let stats = run_coaching_updates(&fetcher, &mut writer, &config, &cli.folder)?;
    info!(
        "Coaching session finished: {} updated, {} deferred, {} skipped, {} failed",
        stats.updated, stats.deferred, stats.skipped, stats.failed
    );
    Ok(())
}
