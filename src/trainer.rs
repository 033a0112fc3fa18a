//! Derives lexicon and link updates from cleaned message text
//!
//! Every write to the source tables goes through here inside the same
//! transaction, so the frequency tables always equal the sum over the
//! messages currently stored. Edits apply the difference between the old and
//! new tokenization; deletes apply the negation of the stored one.

use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::Result;

/// Scope key of the materialized all-users rows
pub const ALL_SCOPE: i64 = -1;

/// Splits cleaned text into words. Case is kept.
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

/// Signed frequency changes produced by one or more messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contribution {
    pub words: BTreeMap<String, i64>,
    /// Keyed by (lowercased start word, end word)
    pub links: BTreeMap<(String, String), i64>,
}

impl Contribution {
    pub fn from_text(text: &str) -> Self {
        let tokens = tokenize(text);
        let mut contribution = Self::default();

        for word in &tokens {
            *contribution.words.entry(word.to_string()).or_insert(0) += 1;
        }

        for pair in tokens.windows(2) {
            let key = (pair[0].to_lowercase(), pair[1].to_string());
            *contribution.links.entry(key).or_insert(0) += 1;
        }

        contribution
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty() && self.links.is_empty()
    }

    pub fn merge(&mut self, other: &Contribution) {
        for (word, n) in &other.words {
            *self.words.entry(word.clone()).or_insert(0) += n;
        }
        for (link, n) in &other.links {
            *self.links.entry(link.clone()).or_insert(0) += n;
        }
        self.words.retain(|_, n| *n != 0);
        self.links.retain(|_, n| *n != 0);
    }

    pub fn negated(&self) -> Self {
        Self {
            words: self.words.iter().map(|(w, n)| (w.clone(), -n)).collect(),
            links: self.links.iter().map(|(l, n)| (l.clone(), -n)).collect(),
        }
    }

    /// Change needed to go from `previous` to `self`
    pub fn difference(&self, previous: &Contribution) -> Self {
        let mut delta = self.clone();
        delta.merge(&previous.negated());
        delta
    }
}

/// Adds `contribution` to the author's rows and to the aggregate rows.
/// Rows that drop to zero are removed.
pub fn apply(conn: &Connection, author: i64, contribution: &Contribution) -> Result<()> {
    if contribution.is_empty() {
        return Ok(());
    }

    let mut upsert_word = conn.prepare_cached(
        "INSERT INTO lexicon (word, scope, frequency) VALUES (?1, ?2, ?3)
         ON CONFLICT(word, scope) DO UPDATE SET frequency = frequency + excluded.frequency",
    )?;
    let mut prune_word = conn.prepare_cached(
        "DELETE FROM lexicon WHERE word = ?1 AND scope = ?2 AND frequency <= 0",
    )?;
    let mut upsert_link = conn.prepare_cached(
        "INSERT INTO links (start_word, end_word, scope, frequency) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(start_word, end_word, scope) DO UPDATE SET frequency = frequency + excluded.frequency",
    )?;
    let mut prune_link = conn.prepare_cached(
        "DELETE FROM links WHERE start_word = ?1 AND end_word = ?2 AND scope = ?3 AND frequency <= 0",
    )?;

    for scope in [author, ALL_SCOPE] {
        for (word, n) in &contribution.words {
            upsert_word.execute(params![word, scope, n])?;
            if *n < 0 {
                prune_word.execute(params![word, scope])?;
            }
        }

        for ((start, end), n) in &contribution.links {
            upsert_link.execute(params![start, end, scope, n])?;
            if *n < 0 {
                prune_link.execute(params![start, end, scope])?;
            }
        }
    }

    debug!(
        author,
        words = contribution.words.len(),
        links = contribution.links.len(),
        "applied training delta"
    );
    Ok(())
}

/// Drops all derived rows and rebuilds them from the stored messages
pub fn rebuild(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM lexicon", [])?;
    conn.execute("DELETE FROM links", [])?;

    let mut per_author: BTreeMap<i64, Contribution> = BTreeMap::new();
    let mut count = 0;
    {
        let mut stmt = conn.prepare(
            "SELECT um.user_id, m.content FROM messages m
             JOIN user_messages um ON um.message_id = m.id",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (author, content) = row?;
            per_author
                .entry(author)
                .or_default()
                .merge(&Contribution::from_text(&content));
            count += 1;
        }
    }

    for (author, contribution) in &per_author {
        apply(conn, *author, contribution)?;
    }

    Ok(count)
}
