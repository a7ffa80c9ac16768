//! Depth command implementation.

use anyhow::{Context, Result};
use cadence::storage::RedisStore;
use cadence::PendingStore;
use serde::Serialize;

use crate::OutputFormat;

#[derive(Serialize)]
struct DepthOutput {
    channel: String,
    key: String,
    pending: usize,
}

pub async fn run(store: &RedisStore, channel_id: &str, format: OutputFormat) -> Result<()> {
    let pending = store
        .len(channel_id)
        .await
        .context("depth lookup failed")?;

    let output = DepthOutput {
        channel: channel_id.to_string(),
        key: store.list_key(channel_id),
        pending,
    };

    match format {
        OutputFormat::Text => {
            println!("{}: {} pending", output.channel, output.pending);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
