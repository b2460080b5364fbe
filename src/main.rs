use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;

use polite_scraper::config::Args;
use polite_scraper::output::{self, RecordWriter};
use polite_scraper::recipe::BUILTIN;
use polite_scraper::{session, Crawler, Fetcher, Record};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_level()))
        .init();

    if args.list_recipes {
        for name in BUILTIN {
            println!("{}", name);
        }
        return Ok(());
    }

    log::info!("🚀 Polite Scraper v{}", env!("CARGO_PKG_VERSION"));

    let recipe = args.recipe()?;
    let seeds = args.seeds(&recipe)?;
    let compiled = Arc::new(recipe.compile()?);
    log::info!("📋 Recipe '{}' from {} URL(s)", compiled.name, seeds.len());

    let fetcher = Arc::new(Fetcher::new(
        &args.fetch_config(),
        args.user_agents(),
        args.throttle(),
    )?);

    if let Some(form) = args.form_login()? {
        session::login(&fetcher, &form).await?;
    }

    // Records flow from the crawler to a blocking writer thread
    let mut writer = RecordWriter::new(
        output::destination(args.output.as_deref())?,
        args.format,
        compiled.columns().to_vec(),
    )?;
    let (tx, mut rx) = mpsc::channel::<Record>(args.buffer.max(1));
    let consumer = tokio::task::spawn_blocking(move || {
        while let Some(record) = rx.blocking_recv() {
            writer.write(&record)?;
        }
        writer.finish()
    });

    let crawler = Crawler::new(fetcher, compiled, args.crawl_options());
    let crawled = crawler.run(seeds, tx).await;

    let written = consumer.await.context("output writer panicked")??;
    let stats = crawled?;

    if let Some(path) = &args.output {
        log::info!("💾 Output saved to: {}", path.display());
    }
    log::info!(
        "✅ Scraped {} page(s), {} record(s) written in {:.1}s",
        stats.pages_fetched,
        written,
        stats.elapsed.as_secs_f64()
    );
    if stats.pages_failed > 0 || stats.retries > 0 || stats.skipped_offsite > 0 {
        log::warn!(
            "{} page(s) failed, {} retried attempt(s), {} off-site link(s) skipped",
            stats.pages_failed,
            stats.retries,
            stats.skipped_offsite
        );
    }

    Ok(())
}
