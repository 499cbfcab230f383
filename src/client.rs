//! Gmail API client: the two remote operations the traversal needs

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use google_gmail1::api::{ListMessagesResponse, Message};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::{GmailHub, READONLY_SCOPE};
use crate::error::{GmailError, Result};
use crate::models::{MessageHeader, MessagePage, MessageSummary, FROM_HEADER};

/// Remote mailbox operations consumed by the aggregator
///
/// Any implementation is substitutable: the production client talks to
/// Gmail, tests use in-memory fakes and mocks.
#[async_trait]
pub trait MailClient: Send + Sync {
    /// List one page of message ids, starting at `page_token` (`None` for the first page)
    async fn list_messages(&self, page_token: Option<String>, page_size: u32) -> Result<MessagePage>;

    /// Fetch size estimate and headers of a single message
    async fn get_message(&self, id: &str) -> Result<MessageSummary>;
}

/// Production Gmail client backed by the `google-gmail1` hub
pub struct GmailApiClient {
    hub: GmailHub,
    query: Option<String>,
    request_timeout: Duration,
}

impl GmailApiClient {
    /// Create a client listing every message in the mailbox
    pub fn new(hub: GmailHub) -> Self {
        Self {
            hub,
            query: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Restrict listing to messages matching a Gmail search query (e.g. `larger:5M`)
    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Run an API call, converting hangs into a transient network error
    async fn call_with_timeout<T, F>(&self, operation_name: &str, api_call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        match tokio::time::timeout(self.request_timeout, api_call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(
                    "Gmail API {} call timed out after {:?}",
                    operation_name, self.request_timeout
                );
                Err(GmailError::NetworkError(format!(
                    "API call timed out after {:?}",
                    self.request_timeout
                )))
            }
        }
    }
}

/// Convert a `users.messages.list` response into a page of ids
fn page_from_response(response: ListMessagesResponse) -> MessagePage {
    let ids = response
        .messages
        .unwrap_or_default()
        .into_iter()
        .filter_map(|msg_ref| msg_ref.id)
        .collect();

    MessagePage {
        ids,
        next_page_token: response.next_page_token,
    }
}

/// Convert a `users.messages.get` response into a summary
///
/// Missing fields are normalized away rather than rejected: a message
/// without a size estimate or headers still counts, with 0 bytes or an
/// unknown sender.
fn summary_from_message(msg: Message, requested_id: &str) -> MessageSummary {
    let size_estimate = msg.size_estimate.and_then(|size| u64::try_from(size).ok());

    let headers = msg
        .payload
        .and_then(|payload| payload.headers)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|header| match (header.name, header.value) {
            (Some(name), Some(value)) => Some(MessageHeader { name, value }),
            _ => None,
        })
        .collect();

    MessageSummary {
        id: msg.id.unwrap_or_else(|| requested_id.to_string()),
        size_estimate,
        headers,
    }
}

#[async_trait]
impl MailClient for GmailApiClient {
    async fn list_messages(&self, page_token: Option<String>, page_size: u32) -> Result<MessagePage> {
        let mut call = self.hub.users().messages_list("me").max_results(page_size);

        if let Some(query) = self.query.as_deref() {
            call = call.q(query);
        }
        if let Some(token) = page_token.as_deref() {
            call = call.page_token(token);
        }

        let (_, response) = self
            .call_with_timeout("messages.list", call.add_scope(READONLY_SCOPE).doit())
            .await?;

        let page = page_from_response(response);
        debug!(
            "Listed {} message ids (more pages: {})",
            page.ids.len(),
            page.next_page_token.is_some()
        );
        Ok(page)
    }

    async fn get_message(&self, id: &str) -> Result<MessageSummary> {
        let call = self
            .hub
            .users()
            .messages_get("me", id)
            .format("metadata")
            .add_metadata_headers(FROM_HEADER)
            .add_scope(READONLY_SCOPE);

        let (_, msg) = self.call_with_timeout("messages.get", call.doit()).await?;
        Ok(summary_from_message(msg, id))
    }
}

/// Decorator retrying transient failures of the wrapped client
///
/// With `max_retries == 0` every call is attempted exactly once, so the
/// first transient failure aborts the traversal.
pub struct RetryingClient<C> {
    inner: C,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl<C: MailClient> RetryingClient<C> {
    pub fn new(inner: C, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn backoff_policy(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut policy = self.backoff_policy();
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempts <= self.max_retries => {
                    let mut delay = policy.next_backoff().unwrap_or(self.max_backoff);
                    if let GmailError::RateLimitExceeded { retry_after } = &e {
                        delay = delay.max(Duration::from_secs(*retry_after).min(self.max_backoff));
                    }
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<C: MailClient> MailClient for RetryingClient<C> {
    async fn list_messages(&self, page_token: Option<String>, page_size: u32) -> Result<MessagePage> {
        self.with_retry("list_messages", || {
            self.inner.list_messages(page_token.clone(), page_size)
        })
        .await
    }

    async fn get_message(&self, id: &str) -> Result<MessageSummary> {
        self.with_retry("get_message", || self.inner.get_message(id))
            .await
    }
}
