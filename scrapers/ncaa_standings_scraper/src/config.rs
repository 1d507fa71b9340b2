use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SheetConfig {
    pub path: String,
    /// 1-based row holding the column headers. Data starts on the next row.
    pub header_row: usize,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            path: "universities.csv".to_string(),
            header_row: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimits {
    pub requests_per_second: u32,
    pub writes_per_minute: usize,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            requests_per_second: 2,
            writes_per_minute: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrapingConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (compatible; NCAAStandings/1.0)".to_string(),
            request_timeout_secs: 30,
            max_retries: 3,
            initial_retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    pub checkpoint_file: String,
    pub conference_map_file: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            checkpoint_file: ".sheet_checkpoint.json".to_string(),
            conference_map_file: ".conference_map.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScraperConfig {
    pub sheet: SheetConfig,
    pub rate_limits: RateLimits,
    pub scraping: ScrapingConfig,
    pub state: StateConfig,
}

impl ScraperConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = env::var("SHEET_PATH") {
            config.sheet.path = path;
        }
        if let Ok(row) = env::var("SHEET_HEADER_ROW").map_or(Ok(None), |r| r.parse::<usize>().map(Some)) {
            if let Some(row) = row {
                config.sheet.header_row = row;
            }
        }
        if let Ok(rps) = env::var("RATE_LIMIT_RPS").map_or(Ok(None), |r| r.parse::<u32>().map(Some)) {
            if let Some(rps) = rps {
                config.rate_limits.requests_per_second = rps;
            }
        }
        if let Ok(limit) = env::var("SHEETS_WRITE_LIMIT").map_or(Ok(None), |l| l.parse::<usize>().map(Some)) {
            if let Some(limit) = limit {
                config.rate_limits.writes_per_minute = limit;
            }
        }
        if let Ok(user_agent) = env::var("SCRAPER_USER_AGENT") {
            config.scraping.user_agent = user_agent;
        }
        if let Ok(timeout) = env::var("SCRAPER_TIMEOUT_SECS").map_or(Ok(None), |t| t.parse::<u64>().map(Some)) {
            if let Some(timeout) = timeout {
                config.scraping.request_timeout_secs = timeout;
            }
        }
        if let Ok(retries) = env::var("SCRAPER_MAX_RETRIES").map_or(Ok(None), |r| r.parse::<u32>().map(Some)) {
            if let Some(retries) = retries {
                config.scraping.max_retries = retries;
            }
        }
        if let Ok(delay) = env::var("SCRAPER_RETRY_DELAY_MS").map_or(Ok(None), |d| d.parse::<u64>().map(Some)) {
            if let Some(delay) = delay {
                config.scraping.initial_retry_delay_ms = delay;
            }
        }
        if let Ok(file) = env::var("CHECKPOINT_FILE") {
            config.state.checkpoint_file = file;
        }
        if let Ok(file) = env::var("CONFERENCE_MAP_FILE") {
            config.state.conference_map_file = file;
        }

        config
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            sheet: SheetConfig::default(),
            rate_limits: RateLimits::default(),
            scraping: ScrapingConfig::default(),
            state: StateConfig::default(),
        }
    }
}
