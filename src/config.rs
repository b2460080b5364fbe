use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::crawl::{CrawlOptions, OnError};
use crate::delay::DelayRange;
use crate::error::{Result, ScraperError};
use crate::fetch::FetchConfig;
use crate::output::Format;
use crate::rate_limit::{RateLimiter, Throttle};
use crate::recipe::{FieldRule, Recipe};
use crate::retry::RetryPolicy;
use crate::session::FormLogin;
use crate::user_agent::{Rotation, UserAgentPool};

/// CLI arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "polite-scraper")]
#[command(
    about = "Rate-limited, retrying scraper driven by selector recipes",
    long_about = None
)]
pub struct Args {
    /// Start URL(s); defaults to the recipe's start URLs
    pub urls: Vec<String>,

    /// Built-in recipe name (books, books-detail, quotes) or path to a JSON recipe
    #[arg(short, long)]
    pub recipe: Option<String>,

    /// Item selector for an ad-hoc recipe (whole page when omitted)
    #[arg(long, conflicts_with = "recipe")]
    pub item: Option<String>,

    /// Ad-hoc field as name=selector or name=selector@attr (can specify multiple)
    #[arg(short = 'F', long = "field", conflicts_with = "recipe")]
    pub fields: Vec<String>,

    /// Next-page link selector for an ad-hoc recipe
    #[arg(long, conflicts_with = "recipe")]
    pub next: Option<String>,

    /// Follow links to other domains
    #[arg(long)]
    pub allow_offsite: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: Format,

    /// Save output to file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(short, long, default_value = "30")]
    pub timeout: u64,

    /// User agent to rotate through (can provide multiple; built-in list otherwise)
    #[arg(short, long = "user-agent")]
    pub user_agents: Vec<String>,

    /// How user agents are picked
    #[arg(long, value_enum, default_value = "random")]
    pub rotation: Rotation,

    /// Proxy URL (e.g., http://proxy.example.com:8080)
    #[arg(short, long)]
    pub proxy: Option<String>,

    /// Minimum random delay before each request, in milliseconds
    #[arg(long, default_value = "500")]
    pub delay_min: u64,

    /// Maximum random delay before each request, in milliseconds
    #[arg(long, default_value = "1500")]
    pub delay_max: u64,

    /// Requests per second across all workers (0 disables the limiter)
    #[arg(long, default_value = "5")]
    pub rate: u32,

    /// Requests allowed back to back before the rate applies (defaults to the rate)
    #[arg(long)]
    pub burst: Option<u32>,

    /// Pages fetched concurrently
    #[arg(short, long, default_value = "4")]
    pub concurrency: usize,

    /// Attempts per page, first try included
    #[arg(long, default_value = "3")]
    pub retries: u32,

    /// First retry delay in milliseconds, doubled on each failure
    #[arg(long, default_value = "500")]
    pub backoff: u64,

    /// Longest retry delay in seconds
    #[arg(long, default_value = "30")]
    pub max_backoff: u64,

    /// Maximum number of pages to fetch
    #[arg(long, default_value = "50")]
    pub max_pages: usize,

    /// Maximum next-page hops from a start URL
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// What to do when a page cannot be fetched
    #[arg(long, value_enum, default_value = "skip")]
    pub on_error: OnError,

    /// Records buffered between the crawler and the writer
    #[arg(long, default_value = "256")]
    pub buffer: usize,

    /// Login form page to submit before crawling
    #[arg(long, requires = "username")]
    pub login_url: Option<String>,

    /// Login user name
    #[arg(long)]
    pub username: Option<String>,

    /// Login password
    #[arg(long, env = "SCRAPER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Form field receiving the user name
    #[arg(long, default_value = "username")]
    pub username_field: String,

    /// Form field receiving the password
    #[arg(long, default_value = "password")]
    pub password_field: String,

    /// Selector that must be present after a successful login
    #[arg(long)]
    pub login_check: Option<String>,

    /// List built-in recipes and exit
    #[arg(long)]
    pub list_recipes: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }

    pub fn recipe(&self) -> Result<Recipe> {
        let mut recipe = match &self.recipe {
            Some(name) => Recipe::load(name)?,
            None if !self.fields.is_empty() => {
                let fields = self
                    .fields
                    .iter()
                    .map(|f| FieldRule::from_shorthand(f))
                    .collect::<Result<Vec<_>>>()?;
                Recipe::ad_hoc(self.item.clone(), fields, self.next.clone())
            }
            None => {
                return Err(ScraperError::Recipe(
                    "pass --recipe or at least one --field".to_string(),
                ))
            }
        };

        if self.allow_offsite {
            recipe.same_domain = false;
        }
        Ok(recipe)
    }

    /// Command-line URLs win over the recipe's own start URLs.
    pub fn seeds(&self, recipe: &Recipe) -> Result<Vec<Url>> {
        let urls = if self.urls.is_empty() {
            &recipe.start_urls
        } else {
            &self.urls
        };
        if urls.is_empty() {
            return Err(ScraperError::InvalidUrl(format!(
                "no start URL given and recipe '{}' has none",
                recipe.name
            )));
        }

        urls.iter()
            .map(|url| {
                Url::parse(url).map_err(|e| ScraperError::InvalidUrl(format!("{}: {}", url, e)))
            })
            .collect()
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout: Duration::from_secs(self.timeout),
            proxy: self.proxy.clone(),
            retry: RetryPolicy {
                max_attempts: self.retries,
                base_delay: Duration::from_millis(self.backoff),
                max_delay: Duration::from_secs(self.max_backoff),
                ..RetryPolicy::default()
            },
        }
    }

    pub fn user_agents(&self) -> UserAgentPool {
        UserAgentPool::new(self.user_agents.clone(), self.rotation)
    }

    /// Needs a running tokio runtime when the rate limiter is enabled.
    pub fn throttle(&self) -> Throttle {
        let limiter = NonZeroU32::new(self.rate).map(|rate| {
            let burst = self.burst.and_then(NonZeroU32::new).unwrap_or(rate);
            RateLimiter::new(rate, burst)
        });
        Throttle::new(limiter, DelayRange::from_millis(self.delay_min, self.delay_max))
    }

    pub fn crawl_options(&self) -> CrawlOptions {
        CrawlOptions {
            concurrency: self.concurrency,
            max_pages: self.max_pages,
            max_depth: self.max_depth,
            on_error: self.on_error,
        }
    }

    pub fn form_login(&self) -> Result<Option<FormLogin>> {
        let Some(login_url) = &self.login_url else {
            return Ok(None);
        };
        let url = Url::parse(login_url)
            .map_err(|e| ScraperError::InvalidUrl(format!("{}: {}", login_url, e)))?;

        let mut fields = Vec::new();
        if let Some(username) = &self.username {
            fields.push((self.username_field.clone(), username.clone()));
        }
        if let Some(password) = &self.password {
            fields.push((self.password_field.clone(), password.clone()));
        }

        Ok(Some(FormLogin {
            url,
            fields,
            success_selector: self.login_check.clone(),
        }))
    }
}
