//! Extraction service request/response contracts.

use serde::{Deserialize, Serialize};

/// Lifecycle status reported by the extraction service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed,
    /// Anything else the service reports (e.g. `PARTIAL_SUCCESS`).
    #[serde(untagged)]
    Other(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Other(s) => s.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockType {
    Page,
    Line,
    Word,
    #[serde(untagged)]
    Other(String),
}

/// A structural element of an extraction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub block_type: BlockType,
    #[serde(default)]
    pub text: Option<String>,
}

impl Block {
    pub fn line(text: impl Into<String>) -> Self {
        Self {
            block_type: BlockType::Line,
            text: Some(text.into()),
        }
    }
}

/// One page of a job status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusPage {
    pub status: JobStatus,
    #[serde(default)]
    pub blocks: Vec<Block>,
    /// Present when more result pages remain.
    #[serde(default)]
    pub next_token: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
}

impl JobStatusPage {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status,
            blocks: Vec::new(),
            next_token: None,
            status_message: None,
        }
    }
}

/// Text of every `LINE` block, in document order.
pub fn text_lines(blocks: &[Block]) -> impl Iterator<Item = &str> {
    blocks
        .iter()
        .filter(|b| b.block_type == BlockType::Line)
        .filter_map(|b| b.text.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_page_decoding() {
        let page: JobStatusPage = serde_json::from_str(
            r#"{
                "status": "SUCCEEDED",
                "blocks": [
                    {"block_type": "PAGE"},
                    {"block_type": "LINE", "text": "Invoice 42"},
                    {"block_type": "WORD", "text": "Invoice"},
                    {"block_type": "TABLE"},
                    {"block_type": "LINE", "text": "Total: 10.00"}
                ],
                "next_token": "p2"
            }"#,
        )
        .unwrap();

        assert_eq!(page.status, JobStatus::Succeeded);
        assert_eq!(page.next_token.as_deref(), Some("p2"));
        let lines: Vec<_> = text_lines(&page.blocks).collect();
        assert_eq!(lines, vec!["Invoice 42", "Total: 10.00"]);
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let status: JobStatus = serde_json::from_str(r#""PARTIAL_SUCCESS""#).unwrap();
        assert_eq!(status, JobStatus::Other("PARTIAL_SUCCESS".into()));
        assert_eq!(status.as_str(), "PARTIAL_SUCCESS");
    }
}
