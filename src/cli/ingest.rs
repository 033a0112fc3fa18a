//! Ingest command implementation

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

use crate::engine::Core;
use crate::model::{Message, MessageRecord};

/// Bulk-load a JSON lines export of `{id, content, author_id, author_name}`
pub fn run(core: &mut Core, path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut messages = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MessageRecord>(&line) {
            Ok(record) => messages.push(Message::from(record)),
            Err(e) => warn!(line = index + 1, error = %e, "skipping malformed record"),
        }
    }

    let saved = core.ingest_history(&messages)?;
    println!("Saved {} of {} messages", saved, messages.len());

    if let Some(id) = core.most_recent_processed_id()? {
        println!("Most recent message: {}", id);
    }
    Ok(())
}
