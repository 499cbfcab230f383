use serde::{Deserialize, Serialize};

/// Sender bucket used when a message carries no `From` header
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Header name identifying the sender, matched case-sensitively
pub const FROM_HEADER: &str = "From";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

/// Per-message detail record as returned by the mail provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: String,
    /// Approximate size in bytes as estimated by the server
    pub size_estimate: Option<u64>,
    pub headers: Vec<MessageHeader>,
}

impl MessageSummary {
    /// Size contribution of this message; a missing estimate counts as 0
    pub fn size_bytes(&self) -> u64 {
        self.size_estimate.unwrap_or(0)
    }

    /// Verbatim value of the first `From` header, or [`UNKNOWN_SENDER`]
    pub fn sender(&self) -> &str {
        self.headers
            .iter()
            .find(|h| h.name == FROM_HEADER)
            .map(|h| h.value.as_str())
            .unwrap_or(UNKNOWN_SENDER)
    }
}

/// One page of message identifiers from a listing call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    pub ids: Vec<String>,
    /// Opaque cursor for the next page; `None` when the listing is exhausted
    pub next_page_token: Option<String>,
}

/// Ranked outcome of one mailbox traversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// (sender, total bytes), ordered by total bytes descending.
    /// Senders with equal totals appear in unspecified relative order.
    pub sorted_senders: Vec<(String, u64)>,
    /// Number of message ids listed across all fetched pages
    pub total_messages: usize,
    pub pages_fetched: usize,
}

impl AnalysisResult {
    pub fn distinct_senders(&self) -> usize {
        self.sorted_senders.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.sorted_senders.iter().map(|(_, bytes)| bytes).sum()
    }

    /// The `k` largest senders (fewer if the mailbox has fewer senders)
    pub fn top(&self, k: usize) -> &[(String, u64)] {
        &self.sorted_senders[..k.min(self.sorted_senders.len())]
    }
}
