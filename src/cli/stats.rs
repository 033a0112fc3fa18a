//! Statistics and source lookups

use anyhow::Result;

use super::select_scope;
use crate::engine::Core;

pub fn run(core: &mut Core, user: Option<u64>) -> Result<()> {
    select_scope(core, user)?;

    println!("{}", "=".repeat(40));
    match user.map(|id| core.store().user(id)).transpose()?.flatten() {
        Some(u) => {
            let name = if u.display_name.is_empty() { "-" } else { u.display_name.as_str() };
            println!("User:          {} ({})", name, u.id);
            println!("Messages:      {}", core.message_count_for(&u)?);
        }
        None => println!("Messages:      {}", core.store().message_count()?),
    }
    println!("Lexicon size:  {}", core.lexicon_size()?);
    println!("All users:     {}", core.lexicon_size_all()?);
    match core.most_recent_processed_id()? {
        Some(id) => println!("Most recent:   {}", id),
        None => println!("Most recent:   -"),
    }
    println!("{}", "=".repeat(40));
    Ok(())
}

/// Print every stored message containing `text`
pub fn context(core: &Core, text: &str) -> Result<()> {
    let messages = core.store().messages_containing(text)?;

    if messages.is_empty() {
        println!("No messages contain \"{}\"", text);
        return Ok(());
    }

    println!("{:<20} {:<16} {}", "ID", "Author", "Content");
    println!("{}", "-".repeat(80));
    for message in messages {
        let content = if message.raw_content.chars().count() > 60 {
            format!("{}...", message.raw_content.chars().take(57).collect::<String>())
        } else {
            message.raw_content.clone()
        };
        println!(
            "{:<20} {:<16} {}",
            message.id, message.author.display_name, content
        );
    }
    Ok(())
}
