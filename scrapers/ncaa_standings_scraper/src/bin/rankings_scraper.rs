use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use tracing::info;

use ncaa_standings_scraper::checkpoint::CheckpointFile;
use ncaa_standings_scraper::config::ScraperConfig;
use ncaa_standings_scraper::fetch::WebPageFetcher;
use ncaa_standings_scraper::rankings::{run_rankings, RankingsOptions};
use ncaa_standings_scraper::resolver::StdinConsole;
use ncaa_standings_scraper::store::CsvSheetStore;
use ncaa_standings_scraper::types::{Division, Gender};
use ncaa_standings_scraper::writer::RateLimitedWriter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Scrape national rankings into the universities sheet", long_about = None)]
struct Cli {
    /// Gender to scrape (men or women)
    #[arg(short, long, default_value = "men")]
    gender: String,
    /// Division to scrape (d1, d2, d3, naia, or all)
    #[arg(short, long, default_value = "all")]
    division: String,
}

fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = ScraperConfig::from_env();

    let gender: Gender = cli.gender.parse()?;
    let division = match cli.division.trim().to_lowercase().as_str() {
        "all" => None,
        other => Some(other.parse::<Division>()?),
    };
    println!(
        "Running NCAA/NAIA rankings scraper for: {} divisions: {}",
        gender,
        cli.division.trim().to_lowercase()
    );

    let store = CsvSheetStore::new(&config.sheet.path);
    let checkpoint = CheckpointFile::load(&config.state.checkpoint_file)?;
    let mut writer =
        RateLimitedWriter::new(store, checkpoint, config.rate_limits.writes_per_minute);
    let fetcher = WebPageFetcher::new(&config)?;
    let mut console = StdinConsole;

    let options = RankingsOptions { gender, division };
    let stats = run_rankings(&fetcher, &mut writer, &mut console, &config, &options)?;
    info!(
        "Rankings session finished: {} updated, {} deferred, {} skipped, {} failed",
        stats.updated, stats.deferred, stats.skipped, stats.failed
    );
    Ok(())
}
