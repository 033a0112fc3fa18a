//! Generation and lookup commands

use anyhow::Result;

use super::select_scope;
use crate::engine::Core;

pub fn speak(core: &mut Core, user: Option<u64>, word: Option<String>) -> Result<()> {
    select_scope(core, user)?;
    println!("{}", core.sentence_or_message(word.as_deref())?);
    Ok(())
}

pub fn links(core: &mut Core, user: Option<u64>, word: &str) -> Result<()> {
    select_scope(core, user)?;
    let listing = core.formatted_links(word)?;

    if listing.is_empty() {
        println!("No words follow \"{}\"", word);
    } else {
        print!("{}", listing);
    }
    Ok(())
}

/// Without a word, prints a frequency-weighted random one instead.
pub fn word(core: &mut Core, user: Option<u64>, word: Option<&str>) -> Result<()> {
    select_scope(core, user)?;
    match word {
        Some(word) => println!("\"{}\" used {} times", word, core.frequency_of(word)?),
        None => {
            let word = core.random_word()?;
            if word.is_empty() {
                println!("No words stored yet");
            } else {
                println!("{}", word);
            }
        }
    }
    Ok(())
}
