//! User decisions the engines need mid-operation.

use async_trait::async_trait;

use walklog_store::DataStats;

use crate::remote::RemoteDocument;

/// Answer to "there is existing data, what should the new session do?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDecision {
    /// Wipe everything and start clean.
    Discard,
    /// Keep existing tracks and photos.
    Append,
    Cancel,
}

/// Interactive questions asked by the recorder and the sync engine.
///
/// `None` or `false` answers mean the user backed out.
#[async_trait]
pub trait Prompt: Send {
    /// Only asked when `existing.has_data()`.
    async fn start_decision(&mut self, existing: &DataStats) -> StartDecision;

    /// The export name, pre-filled with `default_name`.
    async fn export_name(&mut self, default_name: &str) -> Option<String>;

    /// Pick one of `documents` (newest first) to import.
    async fn choose_document(&mut self, documents: &[RemoteDocument]) -> Option<usize>;

    async fn confirm_clear(&mut self, existing: &DataStats) -> bool;
}

/// Answers every question with fixed values. Useful for scripted runs.
#[derive(Debug, Clone)]
pub struct FixedPrompt {
    pub start: StartDecision,
    pub export_name: Option<String>,
    pub document: Option<String>,
    pub confirm_clear: bool,
}

impl Default for FixedPrompt {
    fn default() -> Self {
        Self {
            start: StartDecision::Append,
            export_name: None,
            document: None,
            confirm_clear: false,
        }
    }
}

#[async_trait]
impl Prompt for FixedPrompt {
    async fn start_decision(&mut self, _existing: &DataStats) -> StartDecision {
        self.start
    }

    async fn export_name(&mut self, default_name: &str) -> Option<String> {
        Some(
            self.export_name
                .clone()
                .unwrap_or_else(|| default_name.to_string()),
        )
    }

    /// Picks the document whose id or name matches `document`, or the newest.
    async fn choose_document(&mut self, documents: &[RemoteDocument]) -> Option<usize> {
        match &self.document {
            Some(wanted) => documents
                .iter()
                .position(|d| d.id == *wanted || d.display_name() == wanted),
            None if documents.is_empty() => None,
            None => Some(0),
        }
    }

    async fn confirm_clear(&mut self, _existing: &DataStats) -> bool {
        self.confirm_clear
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fixed_prompt_document_choice() {
        let docs = vec![
            RemoteDocument::new("b", json!({ "name": "b" })),
            RemoteDocument::new("a", json!({ "name": "a" })),
        ];

        let mut newest = FixedPrompt::default();
        assert_eq!(newest.choose_document(&docs).await, Some(0));
        assert_eq!(newest.choose_document(&[]).await, None);

        let mut named = FixedPrompt {
            document: Some("a".into()),
            ..Default::default()
        };
        assert_eq!(named.choose_document(&docs).await, Some(1));
    }

    #[tokio::test]
    async fn test_fixed_prompt_export_name_default() {
        let mut prompt = FixedPrompt::default();
        assert_eq!(
            prompt.export_name("2025-01-01T10:00").await.as_deref(),
            Some("2025-01-01T10:00")
        );
    }
}
