use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use url::Url;

use crate::error::{Result, ScraperError};
use crate::fetch::Fetcher;
use crate::recipe::{CompiledRecipe, Extracted, PageKind};
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OnError {
    /// Log the failed page and keep crawling
    Skip,
    /// Abort the whole crawl
    Fail,
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub concurrency: usize,
    pub max_pages: usize,
    /// Pagination hops followed from a seed; `None` is unlimited.
    pub max_depth: Option<usize>,
    pub on_error: OnError,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_pages: 50,
            max_depth: None,
            on_error: OnError::Skip,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub records: usize,
    pub retries: u64,
    pub skipped_offsite: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
struct Job {
    url: Url,
    kind: PageKind,
    depth: usize,
}

pub struct Crawler {
    fetcher: Arc<Fetcher>,
    recipe: Arc<CompiledRecipe>,
    options: CrawlOptions,
}

impl Crawler {
    pub fn new(fetcher: Arc<Fetcher>, recipe: Arc<CompiledRecipe>, options: CrawlOptions) -> Self {
        Self {
            fetcher,
            recipe,
            options,
        }
    }

    /// Crawl from `seeds`, sending every record to `records` as soon as the
    /// writer has room. The receiver going away aborts the crawl.
    pub async fn run(&self, seeds: Vec<Url>, records: mpsc::Sender<Record>) -> Result<CrawlStats> {
        let started = Instant::now();
        let retries_before = self.fetcher.retries();
        let mut stats = CrawlStats::default();

        let domains: HashSet<String> = seeds
            .iter()
            .filter_map(|u| u.host_str().map(str::to_string))
            .collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<Job> = VecDeque::new();
        for url in seeds {
            let url = normalize(url);
            if seen.insert(url.to_string()) {
                frontier.push_back(Job {
                    url,
                    kind: self.recipe.seed_kind(),
                    depth: 0,
                });
            }
        }

        log::info!(
            "🕷️  Crawling with recipe '{}': {} seed(s), concurrency {}, max pages {}",
            self.recipe.name,
            frontier.len(),
            self.options.concurrency,
            self.options.max_pages
        );

        let concurrency = self.options.concurrency.max(1);
        let mut scheduled = 0usize;
        let mut in_flight = FuturesUnordered::new();
        // Records wait here while the writer catches up, so pages already in
        // flight keep being polled and their timeouts do not fire.
        let mut pending: VecDeque<Record> = VecDeque::new();

        loop {
            while in_flight.len() < concurrency
                && scheduled < self.options.max_pages
                && pending.len() < records.max_capacity()
            {
                let Some(job) = frontier.pop_front() else {
                    break;
                };
                scheduled += 1;
                in_flight.push(self.visit(job));
            }

            if in_flight.is_empty() && pending.is_empty() {
                break;
            }

            let (job, outcome) = tokio::select! {
                permit = records.reserve(), if !pending.is_empty() => {
                    let permit = permit.map_err(|_| ScraperError::OutputClosed)?;
                    if let Some(record) = pending.pop_front() {
                        permit.send(record);
                        stats.records += 1;
                    }
                    continue;
                }
                Some(done) = in_flight.next(), if !in_flight.is_empty() => done,
            };

            let extracted = match outcome {
                Ok(extracted) => extracted,
                Err(e) => {
                    stats.pages_failed += 1;
                    match self.options.on_error {
                        OnError::Skip => {
                            log::error!("Skipping {}: {}", job.url, e);
                            continue;
                        }
                        OnError::Fail => return Err(e),
                    }
                }
            };

            stats.pages_fetched += 1;
            log::info!(
                "Scraped: {} ({} record(s), depth {})",
                job.url,
                extracted.records.len(),
                job.depth
            );
            pending.extend(extracted.records);

            let next_depth = job.depth + 1;
            // is_none_or needs Rust 1.82
            let follow_pages = self.options.max_depth.map_or(true, |max| next_depth <= max);
            let discovered = extracted
                .next_pages
                .into_iter()
                .filter(|_| follow_pages)
                .map(|url| (url, PageKind::Listing, next_depth))
                .chain(
                    extracted
                        .details
                        .into_iter()
                        .map(|url| (url, PageKind::Detail, job.depth)),
                );

            for (url, kind, depth) in discovered {
                let url = normalize(url);
                if self.recipe.same_domain
                    && !url.host_str().is_some_and(|h| domains.contains(h))
                {
                    log::debug!("Skipping off-site link: {}", url);
                    stats.skipped_offsite += 1;
                    continue;
                }
                if seen.insert(url.to_string()) {
                    frontier.push_back(Job { url, kind, depth });
                }
            }
        }

        if !frontier.is_empty() {
            log::info!(
                "Page limit of {} reached, {} queued page(s) left unvisited",
                self.options.max_pages,
                frontier.len()
            );
        }

        stats.retries = self.fetcher.retries() - retries_before;
        stats.elapsed = started.elapsed();
        Ok(stats)
    }

    async fn visit(&self, job: Job) -> (Job, Result<Extracted>) {
        let outcome = match self.fetcher.get(&job.url).await {
            Ok(page) => Ok(self.recipe.extract(&page.body, &page.url, job.kind)),
            Err(e) => Err(e),
        };
        (job, outcome)
    }
}

fn normalize(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}
