//! Gmail Top Senders
//!
//! Walks a Gmail mailbox page by page, adds up the estimated size of every
//! message per sender, and ranks senders by the storage they use.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 installed-app flow with a file token cache
//!   and an explicit credential status (absent, expired, valid)
//! - **Traversal**: paginated listing with optional page limit, optional
//!   within-page concurrency and opt-in retry of transient failures
//! - **Reporting**: text, Markdown and JSON renderings of the ranking
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_top_senders::aggregator::{aggregate, AggregateOptions};
//! use gmail_top_senders::auth::{self, AuthConfig};
//! use gmail_top_senders::client::GmailApiClient;
//! use gmail_top_senders::report::Report;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AuthConfig::new("credentials.json", "token.json");
//!     let hub = auth::initialize_gmail_hub(&config).await?;
//!
//!     let client = GmailApiClient::new(hub);
//!     let options = AggregateOptions {
//!         max_pages: 2,
//!         ..Default::default()
//!     };
//!     let result = aggregate(&client, &options).await?;
//!
//!     print!("{}", Report::new(&result, 10).to_text());
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`aggregator`] - Paginated traversal and per-sender tally
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`cli`] - Command-line interface and analysis orchestration
//! - [`client`] - Mail client trait, Gmail implementation and retry decorator
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures
//! - [`report`] - Report rendering
//! - [`token_store`] - File-backed OAuth token cache

pub mod aggregator;
pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod report;
pub mod token_store;

// Re-export commonly used types for convenience
pub use error::{GmailError, Result};

pub use models::{AnalysisResult, MessageHeader, MessagePage, MessageSummary, UNKNOWN_SENDER};

pub use aggregator::{aggregate, aggregate_with_progress, AggregateOptions, TraversalProgress};

pub use auth::{AuthAction, AuthConfig, CredentialStatus};

pub use client::{GmailApiClient, MailClient, RetryingClient};

pub use config::Config;

pub use report::{Report, ReportFormat};
