pub mod environment;
pub mod migration;
pub mod status;

use anyhow::{Context, Result};
use cms_migrate::StatusStore;

use crate::context::ProjectContext;

/// Open the configured status store.
pub async fn open_store(ctx: &ProjectContext) -> Result<StatusStore> {
    let settings = ctx.status_settings()?;
    settings
        .open(&ctx.project_root)
        .await
        .context("Failed to open the status backend")
}
