use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use gmail_top_senders::auth::{self, READONLY_SCOPE};
use gmail_top_senders::cli::{self, AnalyzeArgs, Cli, Commands, ProgressReporter};
use gmail_top_senders::config::Config;
use gmail_top_senders::error::GmailError;
use gmail_top_senders::token_store::FileTokenStore;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: MultiProgress,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::other("log buffer poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::other("log buffer poisoned"))?;
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                if self.multi.is_hidden() {
                    eprintln!("{}", msg);
                } else {
                    let _ = self.multi.println(msg);
                }
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: MultiProgress,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(self.multi.clone())
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Multiple dependencies pull in different rustls crypto providers; pick one.
    // aws-lc-rs everywhere except Windows, where ring avoids the NASM/CMake toolchain.
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_top_senders=debug,warn"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_top_senders=info,warn"))
    };

    // Logs print above the spinners through the shared MultiProgress
    let multi = MultiProgress::new();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(MultiProgressMakeWriter {
            multi: multi.clone(),
        })
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    match &cli.command {
        None => analyze(&cli, &AnalyzeArgs::default(), multi).await,
        Some(Commands::Analyze(args)) => analyze(&cli, args, multi).await,

        Some(Commands::Auth { force }) => {
            tracing::info!("Authenticating with Gmail API...");

            if *force {
                FileTokenStore::open(&cli.token_cache).await?.clear().await?;
                tracing::info!("Removed existing token cache");
            }

            let hub = auth::initialize_gmail_hub(&cli.auth_config(true)).await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            // Request with the cached scope so no second consent flow starts
            let (_, profile) = hub
                .users()
                .get_profile("me")
                .add_scope(READONLY_SCOPE)
                .doit()
                .await
                .map_err(GmailError::from)?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );
            if let Some(total) = profile.messages_total {
                println!("Messages in mailbox: {}", total);
            }

            Ok(())
        }

        Some(Commands::Status) => {
            let store = FileTokenStore::open(&cli.token_cache).await?;
            let config = cli.auth_config(true);
            let status = store.status(&config.scope_refs(), Utc::now()).await;

            println!("Token cache: {:?}", store.path());
            println!("Credential: {}", status);
            if let Some(expires_at) = store.credential().await.and_then(|c| c.expires_at) {
                println!(
                    "Access token expires: {}",
                    expires_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            println!(
                "Next run will: {}",
                match status.required_action(true)? {
                    auth::AuthAction::UseCached => "use the cached token",
                    auth::AuthAction::Refresh => "refresh the token silently",
                    auth::AuthAction::Consent => "open the browser consent flow",
                }
            );

            Ok(())
        }

        Some(Commands::InitConfig { output, force }) => {
            tracing::info!("Generating example configuration file");

            if output.exists() && !*force {
                return Err(GmailError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nKey settings to review:");
            println!("  - scan.max_pages: Pages to list (0 = whole mailbox)");
            println!("  - scan.query: Gmail search query narrowing the scan");
            println!("  - fetch.max_retries: Retries for transient API errors");
            println!("  - report.top: Number of senders to show");

            Ok(())
        }
    }
}

async fn analyze(cli: &Cli, args: &AnalyzeArgs, multi: MultiProgress) -> Result<()> {
    tracing::info!("Starting mailbox analysis");
    let reporter = ProgressReporter::new(multi);
    let result = cli::run_analysis(cli, args, &reporter).await?;
    tracing::debug!(
        "Analysis finished: {} senders, {} messages",
        result.distinct_senders(),
        result.total_messages
    );
    Ok(())
}

fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    // Display helpful hints based on error type
    if let Some(gmail_err) = error.downcast_ref::<GmailError>() {
        match gmail_err {
            GmailError::AuthError(_) => {
                eprintln!("\nHint: Make sure your credentials.json file is valid.");
                eprintln!("      You can download it from Google Cloud Console.");
                eprintln!("      Try running: gmail-top-senders auth --force");
            }
            GmailError::RateLimitExceeded { .. } => {
                eprintln!("\nHint: You've hit Gmail API rate limits.");
                eprintln!("      Wait a few seconds and try again.");
                eprintln!("      Consider --max-retries or a lower --concurrency.");
            }
            GmailError::ServerError { .. } | GmailError::NetworkError(_) => {
                eprintln!("\nHint: This may be a temporary API error.");
                eprintln!("      Try again, or pass --max-retries to retry automatically.");
            }
            GmailError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: gmail-top-senders init-config --force");
            }
            _ => {}
        }
    }
}
