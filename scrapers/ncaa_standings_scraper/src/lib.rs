//! Scrapes NCAA soccer standings, national rankings, and coaching-change
//! feeds, reconciling scraped school names against the universities sheet.

pub mod checkpoint;
pub mod coaching;
pub mod config;
pub mod error;
pub mod fetch;
pub mod matcher;
pub mod rankings;
pub mod resolver;
pub mod similarity;
pub mod standings;
pub mod store;
pub mod types;
pub mod utils;
pub mod writer;
