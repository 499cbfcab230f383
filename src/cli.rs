//! Command-line interface

use clap::{Args, Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

use crate::aggregator::{aggregate_with_progress, AggregateOptions};
use crate::auth::{self, AuthConfig};
use crate::client::{GmailApiClient, MailClient, RetryingClient};
use crate::config::{Config, MAX_PAGE_SIZE};
use crate::error::Result;
use crate::models::AnalysisResult;
use crate::report::{Report, ReportFormat};

#[derive(Parser, Debug)]
#[command(name = "gmail-top-senders")]
#[command(version)]
#[command(about = "Rank Gmail senders by the storage their messages use", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "gmail-top-senders.toml", global = true)]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json", global = true)]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = "token.json", global = true)]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Defaults to `analyze`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Walk the mailbox and print the senders using the most storage
    Analyze(AnalyzeArgs),

    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Show the state of the cached credential
    Status,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "gmail-top-senders.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Flags of `analyze`; anything left unset falls back to the config file
#[derive(Args, Debug, Clone, Default)]
pub struct AnalyzeArgs {
    /// Maximum pages to list (0 = whole mailbox)
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Number of senders to show
    #[arg(long)]
    pub top: Option<usize>,

    /// Message ids per page
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=MAX_PAGE_SIZE as i64))]
    pub page_size: Option<u32>,

    /// Gmail search query limiting the messages considered (e.g. "larger:5M")
    #[arg(short, long)]
    pub query: Option<String>,

    /// Detail fetches in flight within a page
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Retries for transient API failures (0 aborts on the first failure)
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Fail instead of opening the browser consent flow
    #[arg(long)]
    pub no_browser: bool,

    /// Report format
    #[arg(long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl AnalyzeArgs {
    /// Overlay the flags that were given on top of file configuration
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(max_pages) = self.max_pages {
            config.scan.max_pages = max_pages;
        }
        if let Some(top) = self.top {
            config.report.top = top;
        }
        if let Some(page_size) = self.page_size {
            config.scan.page_size = page_size;
        }
        if let Some(query) = &self.query {
            config.scan.query = Some(query.clone());
        }
        if let Some(concurrency) = self.concurrency {
            config.scan.concurrency = concurrency;
        }
        if let Some(max_retries) = self.max_retries {
            config.fetch.max_retries = max_retries;
        }
        if self.no_browser {
            config.auth.interactive = false;
        }
        if let Some(format) = self.format {
            config.report.format = format;
        }
    }
}

impl Cli {
    pub fn auth_config(&self, interactive: bool) -> AuthConfig {
        AuthConfig::new(&self.credentials, &self.token_cache).with_interactive(interactive)
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    /// Draw spinners on `multi`, which is shared with the log writer
    pub fn new(multi: MultiProgress) -> Self {
        // Use {elapsed} for human-readable format (e.g., "1s", "234ms")
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        self.multi.remove(pb);
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(MultiProgress::new())
    }
}

/// Load the config file and apply command-line overrides
pub async fn resolve_config(cli: &Cli, args: &AnalyzeArgs) -> Result<Config> {
    let mut config = Config::load(&cli.config).await?;
    args.apply_to(&mut config);
    config.validate()?;
    Ok(config)
}

/// Build the mail client stack for a traversal
///
/// The retry decorator is only layered on when retries are enabled, so the
/// default configuration aborts on the first failed call.
pub fn build_client(gmail: GmailApiClient, config: &Config) -> Box<dyn MailClient> {
    if config.fetch.max_retries == 0 {
        return Box::new(gmail);
    }

    Box::new(
        RetryingClient::new(gmail, config.fetch.max_retries).with_backoff(
            Duration::from_millis(config.fetch.initial_backoff_ms),
            Duration::from_secs(config.fetch.max_backoff_secs),
        ),
    )
}

/// Run `analyze`: authenticate, traverse, and emit the report
pub async fn run_analysis(
    cli: &Cli,
    args: &AnalyzeArgs,
    reporter: &ProgressReporter,
) -> Result<AnalysisResult> {
    let config_spinner = reporter.add_spinner("Loading configuration...");
    let config = resolve_config(cli, args)
        .await
        .inspect_err(|_| config_spinner.finish_and_clear())?;
    reporter.finish_spinner(
        &config_spinner,
        &format!("Configuration loaded from {:?}", cli.config),
    );

    let auth_spinner = reporter.add_spinner("Authenticating with Gmail API...");
    let hub = auth::initialize_gmail_hub(&cli.auth_config(config.auth.interactive))
        .await
        .inspect_err(|_| auth_spinner.finish_and_clear())?;
    reporter.finish_spinner(&auth_spinner, "Gmail API authenticated successfully");

    let gmail = GmailApiClient::new(hub).with_query(config.scan.query.clone());
    let client = build_client(gmail, &config);
    let options = AggregateOptions::from(&config.scan);

    let scan_spinner = reporter.add_spinner("Scanning mailbox...");
    let result = aggregate_with_progress(&*client, &options, |progress| {
        scan_spinner.set_message(format!(
            "Scanning mailbox: page {}, {}/{} messages tallied",
            progress.pages_fetched, progress.messages_tallied, progress.messages_listed
        ));
    })
    .await;
    // Clear the spinner before the error or the report reaches the terminal
    scan_spinner.finish_and_clear();
    let result = result?;
    reporter.finish_spinner(
        &scan_spinner,
        &format!(
            "Scanned {} messages across {} pages",
            result.total_messages, result.pages_fetched
        ),
    );

    let report = Report::new(&result, config.report.top);
    match &args.output {
        Some(path) => {
            report.save(path, config.report.format).await?;
            println!("Report written to {:?}", path);
        }
        None => print!("{}", report.render(config.report.format)?),
    }

    Ok(result)
}
