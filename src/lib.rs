//! Polite, recipe-driven scraping: rotating user agents, jittered delays,
//! a token-bucket rate limiter and exponential backoff in front of a
//! concurrent crawler that streams records to CSV/JSON.

pub mod config;
pub mod crawl;
pub mod delay;
pub mod error;
pub mod fetch;
pub mod output;
pub mod rate_limit;
pub mod recipe;
pub mod record;
pub mod retry;
pub mod session;
pub mod user_agent;

pub use crawl::{CrawlOptions, CrawlStats, Crawler, OnError};
pub use error::{Result, ScraperError};
pub use fetch::{FetchConfig, Fetcher, Page};
pub use recipe::{CompiledRecipe, PageKind, Recipe};
pub use record::Record;
