//! HTTP API server command

use anyhow::Result;
use berth_engine::Engine;
use std::sync::Arc;

pub async fn execute(engine: Arc<Engine>, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| engine.settings().web.bind.clone());
    berth_web::start_server(&bind, engine).await?;
    Ok(())
}
