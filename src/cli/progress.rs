//! Live crawl display: status lines above a single progress bar.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use dircrawl::models::{Direction, ProgressSnapshot};
use dircrawl::status::CrawlObserver;

use super::icons;

/// Renders crawl events on the terminal.
///
/// The bar position is the aggregated pre-dedup count, clamped to the quota;
/// the final position is the deduplicated count.
pub struct CrawlProgress {
    bar: ProgressBar,
    quota: u64,
}

impl CrawlProgress {
    pub fn new(quota: usize) -> Self {
        let bar = ProgressBar::new(quota as u64);
        let bar_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len} ({percent}%)")
            .map(|s| s.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(bar_style);
        bar.set_message("Crawling");
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        Self {
            bar,
            quota: quota as u64,
        }
    }

    pub fn finish(&self) {
        if !self.bar.is_finished() {
            self.bar.finish();
        }
    }
}

fn direction_tag(direction: Option<Direction>) -> String {
    match direction {
        Some(Direction::Forward) => style("fwd").cyan().to_string(),
        Some(Direction::Backward) => style("bwd").magenta().to_string(),
        None => style("all").dim().to_string(),
    }
}

impl CrawlObserver for CrawlProgress {
    fn on_status(&self, direction: Option<Direction>, message: &str) {
        self.bar.println(format!(
            "{} {} {}",
            icons::dim_arrow(),
            direction_tag(direction),
            message
        ));
    }

    fn on_progress(&self, snapshot: ProgressSnapshot) {
        self.bar
            .set_position((snapshot.total() as u64).min(self.quota));
    }

    fn on_finished(&self, unique: usize) {
        self.bar.set_position((unique as u64).min(self.quota));
        self.bar
            .finish_with_message(format!("{} unique records", unique));
    }
}
