//! The `crawl` command.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use dircrawl::config::Config;
use dircrawl::crawler::{CrawlCoordinator, Pacing};
use dircrawl::models::{QuotaSplit, SearchCriteria};
use dircrawl::session::chrome::ChromeSessionFactory;
use dircrawl::session::memory::{MemoryDirectory, MemorySessionFactory};
use dircrawl::session::SessionFactory;
use dircrawl::sink::CsvSink;
use dircrawl::status::CrawlObserver;

use crate::cli::icons::{dim_arrow, error, success, warn};
use crate::cli::progress::CrawlProgress;

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// City to search and to match against practice locations
    #[arg(long)]
    pub city: String,

    /// Text the secondary detail attribute must contain
    #[arg(short, long)]
    pub filter: String,

    /// Total number of records wanted across both directions
    #[arg(short, long, allow_negative_numbers = true)]
    pub quota: i64,

    /// Directory for the output spreadsheet (overrides config)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// How the quota is split between the two directions (overrides config)
    #[arg(long, value_enum)]
    pub split: Option<QuotaSplit>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Connect to a running browser's DevTools endpoint instead of launching one
    #[arg(long)]
    pub browser_url: Option<String>,

    /// Crawl a JSON-described directory in memory instead of the live site
    #[arg(long, value_name = "FILE")]
    pub simulate: Option<PathBuf>,
}

pub async fn cmd_crawl(mut config: Config, args: CrawlArgs) -> anyhow::Result<()> {
    // Validate before any session is opened
    let criteria = match SearchCriteria::new(&args.city, &args.filter, args.quota) {
        Ok(criteria) => criteria,
        Err(e) => {
            eprintln!("{} {}", error(), e);
            return Err(e.into());
        }
    };

    if let Some(split) = args.split {
        config.crawl.quota_split = split;
    }
    if args.headed {
        config.browser.headless = false;
    }
    if let Some(url) = args.browser_url {
        config.browser.remote_url = Some(url);
    }
    let output_dir = args.output_dir.unwrap_or_else(|| config.output_dir());
    let sink = CsvSink::new(output_dir, config.crawl.output_prefix.clone());

    eprintln!(
        "{} Crawling {} for {} records matching {:?}",
        dim_arrow(),
        criteria.city,
        criteria.quota,
        criteria.secondary_filter
    );

    match args.simulate {
        Some(path) => {
            let directory = MemoryDirectory::from_json_file(&path)?;
            let factory = MemorySessionFactory::new(directory, config.site.clone());
            let coordinator = CrawlCoordinator::new(factory, config.site, config.crawl)
                .with_pacing(Pacing::immediate());
            execute(coordinator, criteria, &sink).await
        }
        None => {
            let factory = ChromeSessionFactory::new(config.browser);
            let coordinator = CrawlCoordinator::new(factory, config.site, config.crawl);
            execute(coordinator, criteria, &sink).await
        }
    }
}

async fn execute<F: SessionFactory + 'static>(
    coordinator: CrawlCoordinator<F>,
    criteria: SearchCriteria,
    sink: &CsvSink,
) -> anyhow::Result<()> {
    let progress = Arc::new(CrawlProgress::new(criteria.quota));
    let observer: Arc<dyn CrawlObserver> = progress.clone();
    let coordinator = coordinator.with_observer(observer);

    let (report, written) = coordinator.run_to_sink(criteria, sink).await;
    progress.finish();

    for (direction, err) in report.errors() {
        eprintln!("{} {} crawl stopped early: {}", warn(), direction, err);
    }
    let path = match written {
        Ok(path) => path,
        Err(e) => {
            eprintln!(
                "{} Could not save {} records: {}",
                error(),
                report.records.len(),
                e
            );
            for record in &report.records {
                println!("{}", record);
            }
            return Err(e.into());
        }
    };
    eprintln!(
        "{} Saved {} records to {}",
        success(),
        report.records.len(),
        path.display()
    );
    Ok(())
}
