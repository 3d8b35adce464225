//! Run the JSON HTTP API.

use super::CommandContext;
use crate::api::{serve, AppState};
use crate::error::Result;

/// Block on the API server until Ctrl-C.
pub fn execute(ctx: &CommandContext, bind: Option<&str>) -> Result<()> {
    let storage = ctx.open()?;
    let config = ctx.settings()?;
    let bind = bind.map_or_else(|| config.server_bind.clone(), ToString::to_string);

    if !ctx.json && !crate::is_silent() {
        eprintln!("citedesk API on http://{bind} (Ctrl-C to stop)");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(serve(AppState::new(storage, config), &bind))
}
