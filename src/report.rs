//! Rendering of an [`AnalysisResult`] for people and for other tools

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::models::AnalysisResult;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Markdown,
    Json,
}

/// Convert a byte count to mebibytes
pub fn bytes_to_mib(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MIB
}

/// Storage report over the `top` largest senders of a traversal
pub struct Report<'a> {
    result: &'a AnalysisResult,
    top: usize,
}

#[derive(Serialize)]
struct JsonSender<'a> {
    sender: &'a str,
    bytes: u64,
    mebibytes: f64,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    top_senders: Vec<JsonSender<'a>>,
    distinct_senders: usize,
    total_messages: usize,
    total_bytes: u64,
    pages_fetched: usize,
}

impl<'a> Report<'a> {
    pub fn new(result: &'a AnalysisResult, top: usize) -> Self {
        Self { result, top }
    }

    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Text => Ok(self.to_text()),
            ReportFormat::Markdown => Ok(self.to_markdown()),
            ReportFormat::Json => self.to_json(),
        }
    }

    /// Plain console listing
    pub fn to_text(&self) -> String {
        let mut out = String::from("====Top senders by storage usage:\n");
        for (sender, bytes) in self.result.top(self.top) {
            out.push_str(&format!("{}: {:.2} MiB\n", sender, bytes_to_mib(*bytes)));
        }
        out.push_str(&format!(
            "\nTotal number of senders: {}\n",
            self.result.distinct_senders()
        ));
        out.push_str(&format!(
            "Total number of messages: {}\n",
            self.result.total_messages
        ));
        out
    }

    /// Generate Markdown report
    pub fn to_markdown(&self) -> String {
        let mut md = String::from("# Mailbox Storage Report\n\n");

        md.push_str("## Summary\n\n");
        md.push_str(&format!(
            "- **Messages scanned:** {}\n",
            self.result.total_messages
        ));
        md.push_str(&format!(
            "- **Distinct senders:** {}\n",
            self.result.distinct_senders()
        ));
        md.push_str(&format!(
            "- **Total size:** {:.2} MiB\n",
            bytes_to_mib(self.result.total_bytes())
        ));
        md.push_str(&format!(
            "- **Pages fetched:** {}\n\n",
            self.result.pages_fetched
        ));

        md.push_str("## Top Senders\n\n");
        let top = self.result.top(self.top);
        if top.is_empty() {
            md.push_str("_No messages found._\n");
            return md;
        }

        md.push_str("| # | Sender | Size (MiB) |\n");
        md.push_str("|---|--------|------------|\n");
        for (i, (sender, bytes)) in top.iter().enumerate() {
            md.push_str(&format!(
                "| {} | {} | {:.2} |\n",
                i + 1,
                sender.replace('|', "\\|"),
                bytes_to_mib(*bytes)
            ));
        }

        md
    }

    pub fn to_json(&self) -> Result<String> {
        let report = JsonReport {
            top_senders: self
                .result
                .top(self.top)
                .iter()
                .map(|(sender, bytes)| JsonSender {
                    sender,
                    bytes: *bytes,
                    mebibytes: bytes_to_mib(*bytes),
                })
                .collect(),
            distinct_senders: self.result.distinct_senders(),
            total_messages: self.result.total_messages,
            total_bytes: self.result.total_bytes(),
            pages_fetched: self.result.pages_fetched,
        };
        Ok(serde_json::to_string_pretty(&report)?)
    }

    /// Save the rendered report to file
    pub async fn save(&self, path: &Path, format: ReportFormat) -> Result<()> {
        let rendered = self.render(format)?;
        tokio::fs::write(path, rendered).await?;
        tracing::info!("Wrote {:?} report to {:?}", format, path);
        Ok(())
    }
}
