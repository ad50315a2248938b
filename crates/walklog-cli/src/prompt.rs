//! Terminal answers to the recorder's and sync engine's questions.

use std::io::{self, IsTerminal};

use async_trait::async_trait;
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};
use tracing::warn;

use walklog_core::remote::RemoteDocument;
use walklog_core::{Prompt, StartDecision};
use walklog_store::DataStats;

use crate::style::format_data_size;

/// Answers from command-line flags first, then from the terminal.
///
/// Without a terminal, questions that have no flag answer fall back to the
/// safe choice: starting is cancelled, the default export name is taken,
/// nothing is imported and nothing is cleared.
#[derive(Debug, Clone, Default)]
pub struct CliPrompt {
    pub mode: Option<StartDecision>,
    pub name: Option<String>,
    pub assume_yes: bool,
    pub interactive: bool,
}

impl CliPrompt {
    /// A prompt that only asks when both stdin and stderr are terminals.
    pub fn detect() -> Self {
        Self {
            interactive: io::stdin().is_terminal() && io::stderr().is_terminal(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: Option<StartDecision>) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }
}

fn describe(stats: &DataStats) -> String {
    format!(
        "{} track(s), {} points, {} photo(s), {}",
        stats.track_count,
        stats.total_points,
        stats.photo_count,
        format_data_size(stats.total_bytes())
    )
}

#[async_trait]
impl Prompt for CliPrompt {
    async fn start_decision(&mut self, existing: &DataStats) -> StartDecision {
        if let Some(mode) = self.mode {
            return mode;
        }
        if !self.interactive {
            warn!("Local data exists; pass --mode discard or --mode append");
            return StartDecision::Cancel;
        }

        let items = ["Discard existing data", "Append a new session", "Cancel"];
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Local data found ({})", describe(existing)))
            .items(&items)
            .default(1)
            .interact_opt();
        match selection {
            Ok(Some(0)) => StartDecision::Discard,
            Ok(Some(1)) => StartDecision::Append,
            Ok(_) => StartDecision::Cancel,
            Err(e) => {
                warn!("Prompt failed: {}", e);
                StartDecision::Cancel
            }
        }
    }

    async fn export_name(&mut self, default_name: &str) -> Option<String> {
        if let Some(name) = &self.name {
            return Some(name.clone());
        }
        if !self.interactive {
            return Some(default_name.to_string());
        }

        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt("Session name")
            .default(default_name.to_string())
            .interact_text()
            .map_err(|e| warn!("Prompt failed: {}", e))
            .ok()
    }

    async fn choose_document(&mut self, documents: &[RemoteDocument]) -> Option<usize> {
        if let Some(wanted) = &self.name {
            let found = documents
                .iter()
                .position(|d| d.id == *wanted || d.display_name() == wanted);
            if found.is_none() {
                warn!("No exported session named {}", wanted);
            }
            return found;
        }
        if !self.interactive {
            warn!("Pass --name to choose a session to import");
            return None;
        }

        let items: Vec<String> = documents
            .iter()
            .map(|d| match d.created_at() {
                Some(created) => format!("{} ({})", d.display_name(), created.date()),
                None => d.display_name().to_string(),
            })
            .collect();
        Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Select a session to import")
            .items(&items)
            .default(0)
            .interact_opt()
            .map_err(|e| warn!("Prompt failed: {}", e))
            .ok()
            .flatten()
    }

    async fn confirm_clear(&mut self, existing: &DataStats) -> bool {
        if self.assume_yes {
            return true;
        }
        if !self.interactive {
            warn!("Pass --yes to clear without confirmation");
            return false;
        }

        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Delete {}?", describe(existing)))
            .default(false)
            .interact_opt()
            .ok()
            .flatten()
            .unwrap_or(false)
    }
}
