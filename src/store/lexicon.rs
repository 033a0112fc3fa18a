//! Scope-aware reads of the lexicon and link tables
//!
//! The aggregate scope reads the materialized all-users rows directly.

use rusqlite::{params, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet};

use super::MarkovStore;
use crate::error::{sql_id, Result};
use crate::model::Scope;
use crate::trainer::ALL_SCOPE;

fn scope_key(scope: Scope) -> Result<i64> {
    match scope {
        Scope::All => Ok(ALL_SCOPE),
        Scope::User(id) => sql_id(id, "user"),
    }
}

impl MarkovStore {
    /// Number of unique words
    pub fn lexicon_size(&self, scope: Scope) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM lexicon WHERE scope = ?",
            params![scope_key(scope)?],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Exact-case frequency; zero when the word is absent
    pub fn word_frequency(&self, scope: Scope, word: &str) -> Result<u64> {
        let frequency: Option<i64> = self
            .conn
            .query_row(
                "SELECT frequency FROM lexicon WHERE word = ?1 AND scope = ?2",
                params![word, scope_key(scope)?],
                |row| row.get(0),
            )
            .optional()?;
        Ok(frequency.unwrap_or(0).max(0) as u64)
    }

    pub fn lexicon(&self, scope: Scope) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT word FROM lexicon WHERE scope = ?")?;
        let words = stmt
            .query_map(params![scope_key(scope)?], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(words)
    }

    /// Every word repeated by its frequency, sorted so draws from a seeded
    /// generator are reproducible.
    pub fn all_words_weighted(&self, scope: Scope) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT word, frequency FROM lexicon WHERE scope = ? ORDER BY word")?;
        let rows = stmt.query_map(params![scope_key(scope)?], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut words = Vec::new();
        for row in rows {
            let (word, frequency) = row?;
            for _ in 0..frequency.max(0) {
                words.push(word.clone());
            }
        }
        Ok(words)
    }

    /// Words observed right after `word` (matched case-insensitively), with
    /// how often each followed it.
    pub fn links(&self, scope: Scope, word: &str) -> Result<BTreeMap<String, u64>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT end_word, frequency FROM links WHERE scope = ?1 AND start_word = ?2",
        )?;
        let rows = stmt.query_map(params![scope_key(scope)?, word.to_lowercase()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut links = BTreeMap::new();
        for row in rows {
            let (end, frequency) = row?;
            if frequency > 0 {
                links.insert(end, frequency as u64);
            }
        }
        Ok(links)
    }
}
