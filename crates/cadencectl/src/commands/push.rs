//! Push command implementation.

use std::fs;

use anyhow::{anyhow, Context, Result};
use cadence::storage::RedisStore;
use cadence::{NotificationPayload, PendingStore};
use serde::Serialize;

use crate::OutputFormat;

#[derive(Serialize)]
struct PushOutput {
    channel: String,
    key: String,
    depth: usize,
}

pub async fn run(
    store: &RedisStore,
    channel_id: &str,
    payload: Option<String>,
    file: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let text = match (payload, file) {
        (Some(p), None) => p,
        (None, Some(f)) => {
            fs::read_to_string(&f).with_context(|| format!("failed to read file: {}", f))?
        }
        (Some(_), Some(_)) => {
            return Err(anyhow!("cannot specify both payload and --file"));
        }
        (None, None) => {
            use std::io::{self, Read};
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read from stdin")?;
            buffer
        }
    };

    let payload = parse_payload(&text)?;

    store
        .enqueue(channel_id, &payload)
        .await
        .context("push failed")?;
    let depth = store
        .len(channel_id)
        .await
        .context("depth lookup failed")?;

    let output = PushOutput {
        channel: channel_id.to_string(),
        key: store.list_key(channel_id),
        depth,
    };

    match format {
        OutputFormat::Text => {
            println!("Queued notification on '{}'", output.channel);
            println!("  Key: {}", output.key);
            println!("  Pending: {}", output.depth);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn parse_payload(text: &str) -> Result<NotificationPayload> {
    NotificationPayload::from_canonical_str(text.trim()).context("payload is not valid JSON")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload_trims_input() {
        let payload = parse_payload("  {\"to\":\"oncall\"}\n").unwrap();
        assert_eq!(payload.as_value()["to"], "oncall");
    }

    #[test]
    fn test_parse_payload_rejects_garbage() {
        assert!(parse_payload("to: oncall").is_err());
    }
}
