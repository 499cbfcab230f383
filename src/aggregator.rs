//! Paginated mailbox traversal that tallies storage per sender

use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::client::MailClient;
use crate::config::{ScanConfig, MAX_PAGE_SIZE};
use crate::error::Result;
use crate::models::{AnalysisResult, MessageSummary};

/// Traversal bounds and pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Upper bound on listing calls; 0 means no bound
    pub max_pages: u32,
    /// Ids per listing call; 0 is raised to 1
    pub page_size: u32,
    /// Detail fetches in flight within one page; 1 is strictly sequential
    pub concurrency: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            max_pages: 0,
            page_size: MAX_PAGE_SIZE,
            concurrency: 1,
        }
    }
}

impl From<&ScanConfig> for AggregateOptions {
    fn from(scan: &ScanConfig) -> Self {
        Self {
            max_pages: scan.max_pages,
            page_size: scan.page_size,
            concurrency: scan.concurrency,
        }
    }
}

/// Running counters reported while the traversal makes progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalProgress {
    pub pages_fetched: usize,
    pub messages_listed: usize,
    pub messages_tallied: usize,
}

/// Accumulated bytes per sender
#[derive(Debug, Default)]
pub struct SenderTally {
    totals: HashMap<String, u64>,
}

impl SenderTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit one message's size to its sender
    pub fn add(&mut self, summary: &MessageSummary) {
        let sender = summary.sender();
        let size = summary.size_bytes();
        match self.totals.get_mut(sender) {
            Some(total) => *total += size,
            None => {
                self.totals.insert(sender.to_string(), size);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn get(&self, sender: &str) -> Option<u64> {
        self.totals.get(sender).copied()
    }

    /// Entries ordered by total bytes, largest first; ties in no particular order
    pub fn into_ranked(self) -> Vec<(String, u64)> {
        let mut ranked: Vec<(String, u64)> = self.totals.into_iter().collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1));
        ranked
    }
}

/// Walk the mailbox and rank senders by total message size
pub async fn aggregate<C>(client: &C, options: &AggregateOptions) -> Result<AnalysisResult>
where
    C: MailClient + ?Sized,
{
    aggregate_with_progress(client, options, |_| {}).await
}

/// Same as [`aggregate`], calling `on_progress` after every detail fetch and every page
///
/// Any failed listing or detail fetch aborts the traversal and its error is
/// returned; no partial result is produced.
pub async fn aggregate_with_progress<C, F>(
    client: &C,
    options: &AggregateOptions,
    mut on_progress: F,
) -> Result<AnalysisResult>
where
    C: MailClient + ?Sized,
    F: FnMut(&TraversalProgress) + Send,
{
    let concurrency = options.concurrency.max(1);
    let page_size = options.page_size.max(1);
    let mut tally = SenderTally::new();
    let mut progress = TraversalProgress::default();
    let mut cursor: Option<String> = None;

    loop {
        info!("Fetching page {}", progress.pages_fetched + 1);
        let page = client.list_messages(cursor.take(), page_size).await?;
        progress.pages_fetched += 1;
        progress.messages_listed += page.ids.len();
        debug!(
            "Page {} listed {} message ids",
            progress.pages_fetched,
            page.ids.len()
        );

        // Fetch order within a page does not matter for the tally
        let mut details = stream::iter(page.ids.iter())
            .map(|id| client.get_message(id))
            .buffer_unordered(concurrency);

        while let Some(summary) = details.try_next().await? {
            tally.add(&summary);
            progress.messages_tallied += 1;
            on_progress(&progress);
        }
        on_progress(&progress);

        cursor = page.next_page_token;
        if cursor.is_none() {
            break;
        }
        if options.max_pages > 0 && progress.pages_fetched >= options.max_pages as usize {
            info!("Stopping after {} pages (page limit reached)", progress.pages_fetched);
            break;
        }
    }

    info!(
        "Traversal complete: {} pages, {} messages, {} senders",
        progress.pages_fetched,
        progress.messages_listed,
        tally.len()
    );

    Ok(AnalysisResult {
        sorted_senders: tally.into_ranked(),
        total_messages: progress.messages_listed,
        pages_fetched: progress.pages_fetched,
    })
}
