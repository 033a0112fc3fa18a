//! Single-message events: create, edit, delete

use anyhow::Result;

use crate::engine::Core;
use crate::model::{Message, User};
use crate::store::WriteOutcome;

pub fn add(core: &mut Core, id: u64, author: User, content: String) -> Result<()> {
    refresh_author(core, &author)?;
    let outcome = core.on_message_created(&Message::new(id, content, author))?;
    report(id, outcome);
    Ok(())
}

pub fn edit(core: &mut Core, id: u64, author: User, content: String) -> Result<()> {
    refresh_author(core, &author)?;
    let outcome = core.on_message_edited(&Message::new(id, content, author))?;
    report(id, outcome);
    Ok(())
}

pub fn delete(core: &mut Core, id: u64) -> Result<()> {
    if core.on_message_deleted(id)? {
        println!("Deleted message {}", id);
    } else {
        println!("Message {} was not stored", id);
    }
    Ok(())
}

/// A given name replaces the stored one; an empty name keeps it.
fn refresh_author(core: &Core, author: &User) -> Result<()> {
    if !author.display_name.is_empty() {
        core.ensure_user(author)?;
    }
    Ok(())
}

fn report(id: u64, outcome: WriteOutcome) {
    match outcome {
        WriteOutcome::Inserted => println!("Saved message {}", id),
        WriteOutcome::Updated => println!("Updated message {}", id),
        WriteOutcome::Deleted => println!("Message {} has no usable content, removed", id),
        WriteOutcome::Skipped => println!("Message {} has no usable content, ignored", id),
    }
}
