//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use gmail_top_senders::client::MailClient;
use gmail_top_senders::error::{GmailError, Result};
use gmail_top_senders::models::{MessageHeader, MessagePage, MessageSummary};
use mockall::mock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Create a message summary with an optional `From` header and size
pub fn create_test_message(id: &str, from: Option<&str>, size: Option<u64>) -> MessageSummary {
    MessageSummary {
        id: id.to_string(),
        size_estimate: size,
        headers: from
            .map(|value| {
                vec![
                    MessageHeader {
                        name: "Subject".to_string(),
                        value: format!("Subject of {}", id),
                    },
                    MessageHeader {
                        name: "From".to_string(),
                        value: value.to_string(),
                    },
                ]
            })
            .unwrap_or_default(),
    }
}

/// Cursor handed out after page `index` (0-based)
pub fn cursor_after(index: usize) -> String {
    format!("C{}", index + 2)
}

/// In-memory mailbox serving fixed pages
///
/// Page 0 is served for the `None` cursor, page `i` for `cursor_after(i - 1)`.
/// Every call is counted and the requested cursors are recorded.
pub struct FakeMailbox {
    pages: Vec<Vec<String>>,
    messages: HashMap<String, MessageSummary>,
    failing_id: Option<String>,
    pub list_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub requested_cursors: Mutex<Vec<Option<String>>>,
}

impl FakeMailbox {
    /// Pages of messages; each message is listed under its own id
    pub fn new(pages: Vec<Vec<MessageSummary>>) -> Self {
        let mut messages = HashMap::new();
        let pages = pages
            .into_iter()
            .map(|page| {
                page.into_iter()
                    .map(|msg| {
                        let id = msg.id.clone();
                        messages.insert(id.clone(), msg);
                        id
                    })
                    .collect()
            })
            .collect();

        Self {
            pages,
            messages,
            failing_id: None,
            list_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            requested_cursors: Mutex::new(Vec::new()),
        }
    }

    /// Make `get_message` fail for `id`
    pub fn failing_on(mut self, id: &str) -> Self {
        self.failing_id = Some(id.to_string());
        self
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn page_index(&self, page_token: Option<&str>) -> Result<usize> {
        match page_token {
            None => Ok(0),
            Some(token) => (0..self.pages.len())
                .find(|&i| cursor_after(i) == token)
                .map(|i| i + 1)
                .ok_or_else(|| GmailError::BadRequest(format!("Invalid page token {}", token))),
        }
    }
}

#[async_trait]
impl MailClient for FakeMailbox {
    async fn list_messages(&self, page_token: Option<String>, _page_size: u32) -> Result<MessagePage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.requested_cursors
            .lock()
            .unwrap()
            .push(page_token.clone());

        let index = self.page_index(page_token.as_deref())?;
        let ids = self.pages.get(index).cloned().unwrap_or_default();
        let next_page_token = if index + 1 < self.pages.len() {
            Some(cursor_after(index))
        } else {
            None
        };

        Ok(MessagePage {
            ids,
            next_page_token,
        })
    }

    async fn get_message(&self, id: &str) -> Result<MessageSummary> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_id.as_deref() == Some(id) {
            return Err(GmailError::ServerError {
                status: 500,
                message: format!("backend error fetching {}", id),
            });
        }

        self.messages
            .get(id)
            .cloned()
            .ok_or_else(|| GmailError::MessageNotFound(id.to_string()))
    }
}

// Mock mail client for call-count expectations
mock! {
    pub MailClient {}

    #[async_trait]
    impl MailClient for MailClient {
        async fn list_messages(&self, page_token: Option<String>, page_size: u32) -> Result<MessagePage>;
        async fn get_message(&self, id: &str) -> Result<MessageSummary>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_message() {
        let msg = create_test_message("1", Some("a@x.com"), Some(10));
        assert_eq!(msg.sender(), "a@x.com");
        assert_eq!(msg.size_bytes(), 10);

        let bare = create_test_message("2", None, None);
        assert_eq!(bare.sender(), "Unknown");
        assert_eq!(bare.size_bytes(), 0);
    }

    #[tokio::test]
    async fn test_fake_mailbox_pagination() {
        let mailbox = FakeMailbox::new(vec![
            vec![create_test_message("m1", Some("a"), Some(1))],
            vec![create_test_message("m2", Some("b"), Some(2))],
        ]);

        let first = mailbox.list_messages(None, 500).await.unwrap();
        assert_eq!(first.ids, vec!["m1".to_string()]);
        assert_eq!(first.next_page_token.as_deref(), Some("C2"));

        let second = mailbox.list_messages(first.next_page_token, 500).await.unwrap();
        assert_eq!(second.ids, vec!["m2".to_string()]);
        assert!(second.next_page_token.is_none());
        assert_eq!(mailbox.list_count(), 2);
    }
}
