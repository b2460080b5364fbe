use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, Response};
use url::Url;

use crate::error::{Result, ScraperError};
use crate::rate_limit::Throttle;
use crate::retry::RetryPolicy;
use crate::user_agent::UserAgentPool;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub proxy: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            proxy: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// A successfully downloaded page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub body: String,
    pub attempts: u32,
}

/// Shared HTTP front door: every request is throttled, gets the next
/// User-Agent from the pool and, for GETs, is retried on transient failures.
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    agents: UserAgentPool,
    retry: RetryPolicy,
    throttle: Throttle,
    timeout: Duration,
    retries: AtomicU64,
}

impl Fetcher {
    pub fn new(config: &FetchConfig, agents: UserAgentPool, throttle: Throttle) -> Result<Self> {
        let mut client_builder = Client::builder()
            .timeout(config.timeout)
            .cookie_store(true);

        if let Some(proxy_url) = &config.proxy {
            log::debug!("Using proxy: {}", proxy_url);
            client_builder = client_builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        Ok(Self {
            client: client_builder.build()?,
            agents,
            retry: config.retry.clone(),
            throttle,
            timeout: config.timeout,
            retries: AtomicU64::new(0),
        })
    }

    /// Number of retried attempts across every request so far.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub async fn get(&self, url: &Url) -> Result<Page> {
        let attempts = self.retry.attempts();
        let mut failed = 0;

        loop {
            match self.get_once(url).await {
                Ok(mut page) => {
                    page.attempts = failed + 1;
                    return Ok(page);
                }
                Err(e) if !e.is_retryable() => {
                    log::debug!("Not retrying {}: {}", url, e);
                    return Err(e);
                }
                Err(e) => {
                    failed += 1;
                    if failed >= attempts {
                        return Err(ScraperError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: failed,
                            source: Box::new(e),
                        });
                    }

                    let pause = self.retry.delay_for(failed, &e);
                    log::warn!(
                        "Attempt {}/{} for {} failed ({}), retrying in {}ms",
                        failed,
                        attempts,
                        url,
                        e,
                        pause.as_millis()
                    );
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }

    /// Submit a form once; POSTs are never retried.
    pub async fn post_form(&self, url: &Url, pairs: &[(String, String)]) -> Result<Page> {
        self.throttle.admit().await;
        log::debug!("Posting form to: {}", url);

        let response = self
            .client
            .post(url.clone())
            .header(USER_AGENT, self.agents.next())
            .form(pairs)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        self.read(url, response).await
    }

    async fn get_once(&self, url: &Url) -> Result<Page> {
        self.throttle.admit().await;
        log::debug!("Fetching: {}", url);

        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, self.agents.next())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        self.read(url, response).await
    }

    async fn read(&self, requested: &Url, response: Response) -> Result<Page> {
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::Status {
                url: requested.to_string(),
                status: status.as_u16(),
                retry_after: retry_after(response.headers()),
            });
        }

        let url = response.url().clone();
        let body = response.text().await.map_err(|e| self.classify(e))?;

        Ok(Page {
            url,
            status: status.as_u16(),
            body,
            attempts: 1,
        })
    }

    fn classify(&self, e: reqwest::Error) -> ScraperError {
        if e.is_timeout() {
            ScraperError::Timeout(self.timeout.as_secs())
        } else {
            ScraperError::HttpError(e)
        }
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
