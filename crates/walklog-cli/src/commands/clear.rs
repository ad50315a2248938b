//! Clear command - delete local tracks and photos.

use anyhow::{Result, bail};
use tracing::info;

use walklog_core::persistence;
use walklog_core::{Error as CoreError, Prompt, RetryConfig};

use crate::commands::{Output, open_store};
use crate::config::Config;
use crate::prompt::CliPrompt;
use crate::style::format_data_size;

pub async fn cmd_clear(yes: bool, config: &Config, out: Output) -> Result<()> {
    let store = open_store(config)?;
    persistence::ensure_available(&store).await?;

    let stats = persistence::data_stats(&store).await?;
    if !stats.has_data() {
        out.info("Nothing to clear");
        return Ok(());
    }

    let mut prompt = CliPrompt::detect().assume_yes(yes);
    if !prompt.confirm_clear(&stats).await {
        out.info("Cancelled, nothing was deleted");
        return Ok(());
    }

    match persistence::wipe_local(&store, &config.default_position(), &RetryConfig::for_wipe())
        .await
    {
        Ok(kept) => {
            info!("Cleared {} bytes of local data", stats.total_bytes());
            out.success(&format!(
                "Deleted {} track(s) and {} photo(s) ({})",
                stats.track_count,
                stats.photo_count,
                format_data_size(stats.total_bytes())
            ));
            out.info(&format!(
                "Map position kept at {:.5}, {:.5}",
                kept.lat, kept.lng
            ));
            Ok(())
        }
        Err(CoreError::Store(e)) if e.is_busy() => {
            bail!(
                "Could not clear local data: the database is in use.\n\
                 Close other walklog instances and try again."
            )
        }
        Err(e) => Err(anyhow::Error::new(e).context("Failed to clear local data")),
    }
}
