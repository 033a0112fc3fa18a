//! Message source and Markov data storage with SQLite
//!
//! Source writes (save, update, delete, batch) run in one transaction together
//! with the matching training delta, so the derived tables never disagree with
//! the stored messages.

mod lexicon;
mod schema;

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{sql_id, Result};
use crate::model::{Message, User};
use crate::normalize::Normalizer;
use crate::trainer::{self, Contribution};

pub use schema::SCHEMA;

/// What a source write ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
    Deleted,
    /// Nothing trainable and nothing stored to retract
    Skipped,
}

pub struct MarkovStore {
    conn: Connection,
    normalizer: Normalizer,
}

impl MarkovStore {
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn,
            normalizer: Normalizer::default(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ============================================
    // USERS
    // ============================================

    /// Create the user, or refresh the display name of an existing one
    pub fn ensure_user(&self, user: &User) -> Result<()> {
        self.conn.execute(
            "INSERT INTO users (id, display_name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name",
            params![sql_id(user.id, "user")?, user.display_name],
        )?;
        Ok(())
    }

    pub fn user(&self, id: u64) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, display_name FROM users WHERE id = ?",
                params![sql_id(id, "user")?],
                |row| {
                    Ok(User {
                        id: row.get::<_, i64>(0)? as u64,
                        display_name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    // ============================================
    // MESSAGES
    // ============================================

    /// Store a new message. An id that is already stored is treated as an edit.
    pub fn save(&mut self, message: &Message) -> Result<WriteOutcome> {
        let cleaned = self.normalizer.clean(&message.raw_content);
        if cleaned.is_empty() {
            debug!(message_id = message.id, "nothing to save after cleaning");
            return Ok(WriteOutcome::Skipped);
        }

        let tx = self.conn.transaction()?;
        let outcome = upsert(&tx, message, &cleaned)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Apply an edit. Unknown ids are saved as new; an edit that cleans to
    /// nothing retracts the message.
    pub fn update(&mut self, message: &Message) -> Result<WriteOutcome> {
        let cleaned = self.normalizer.clean(&message.raw_content);

        let tx = self.conn.transaction()?;
        let outcome = if cleaned.is_empty() {
            if remove(&tx, message.id)? {
                WriteOutcome::Deleted
            } else {
                WriteOutcome::Skipped
            }
        } else {
            upsert(&tx, message, &cleaned)?
        };
        tx.commit()?;
        Ok(outcome)
    }

    /// Bulk variant of [`update`](Self::update) in a single transaction.
    ///
    /// Items that clean to nothing are skipped. A failing item is rolled back
    /// on its own and does not stop the batch. Returns how many were written.
    pub fn update_batch(&mut self, messages: &[Message]) -> Result<usize> {
        let mut tx = self.conn.transaction()?;
        let mut saved = 0;

        for message in messages {
            let cleaned = self.normalizer.clean(&message.raw_content);
            if cleaned.is_empty() {
                continue;
            }

            let sp = tx.savepoint()?;
            match upsert(&sp, message, &cleaned) {
                Ok(_) => {
                    sp.commit()?;
                    saved += 1;
                }
                Err(e) => {
                    warn!(message_id = message.id, error = %e, "failed to save message");
                }
            }
        }

        tx.commit()?;
        info!("Stored {} of {} messages", saved, messages.len());
        Ok(saved)
    }

    /// Remove a message and its training contribution. Missing ids are fine.
    pub fn delete(&mut self, message_id: u64) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let removed = remove(&tx, message_id)?;
        tx.commit()?;
        Ok(removed)
    }

    pub fn exists(&self, message_id: u64) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM messages WHERE id = ?)",
            params![sql_id(message_id, "message")?],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Highest stored message id, used as the backfill high-water mark
    pub fn most_recent_id(&self) -> Result<Option<u64>> {
        let id: Option<i64> =
            self.conn
                .query_row("SELECT MAX(id) FROM messages", [], |row| row.get(0))?;
        Ok(id.map(|id| id as u64))
    }

    pub fn count_from(&self, user: &User) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM user_messages WHERE user_id = ?",
            params![sql_id(user.id, "user")?],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn message_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Stored messages whose cleaned text contains `needle`, oldest first.
    /// The returned messages carry the cleaned text as their content.
    pub fn messages_containing(&self, needle: &str) -> Result<Vec<Message>> {
        let pattern = format!(
            "%{}%",
            needle
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_")
        );

        let mut stmt = self.conn.prepare(
            r#"SELECT m.id, m.content, u.id, u.display_name
               FROM messages m
               JOIN user_messages um ON um.message_id = m.id
               JOIN users u ON u.id = um.user_id
               WHERE m.content LIKE ?1 ESCAPE '\'
               ORDER BY m.id"#,
        )?;

        let rows = stmt.query_map(params![pattern], |row| {
            Ok(Message {
                id: row.get::<_, i64>(0)? as u64,
                raw_content: row.get(1)?,
                author: User {
                    id: row.get::<_, i64>(2)? as u64,
                    display_name: row.get(3)?,
                },
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // ============================================
    // TRAINING
    // ============================================

    /// Rebuild every lexicon and link row from the stored messages
    pub fn retrain(&mut self) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let count = trainer::rebuild(&tx)?;
        tx.commit()?;
        info!("Retrained from {} messages", count);
        Ok(count)
    }
}

// ============================================
// WRITE HELPERS
// ============================================

struct StoredMessage {
    author: i64,
    content: String,
}

fn stored_message(conn: &Connection, id: i64) -> Result<Option<StoredMessage>> {
    let stored = conn
        .query_row(
            "SELECT um.user_id, m.content FROM messages m
             JOIN user_messages um ON um.message_id = m.id
             WHERE m.id = ?",
            params![id],
            |row| {
                Ok(StoredMessage {
                    author: row.get(0)?,
                    content: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(stored)
}

/// Insert or replace a message whose cleaned text is non-empty
fn upsert(conn: &Connection, message: &Message, cleaned: &str) -> Result<WriteOutcome> {
    let id = sql_id(message.id, "message")?;
    let author = sql_id(message.author.id, "user")?;

    conn.execute(
        "INSERT OR IGNORE INTO users (id, display_name) VALUES (?1, ?2)",
        params![author, message.author.display_name],
    )?;

    let new = Contribution::from_text(cleaned);

    match stored_message(conn, id)? {
        Some(stored) => {
            if stored.author == author && stored.content == cleaned {
                return Ok(WriteOutcome::Updated);
            }

            conn.execute(
                "UPDATE messages SET content = ?1 WHERE id = ?2",
                params![cleaned, id],
            )?;

            let old = Contribution::from_text(&stored.content);
            if stored.author == author {
                trainer::apply(conn, author, &new.difference(&old))?;
            } else {
                conn.execute(
                    "UPDATE user_messages SET user_id = ?1 WHERE message_id = ?2",
                    params![author, id],
                )?;
                trainer::apply(conn, stored.author, &old.negated())?;
                trainer::apply(conn, author, &new)?;
            }

            debug!(message_id = message.id, "updated message");
            Ok(WriteOutcome::Updated)
        }
        None => {
            conn.execute(
                "INSERT INTO messages (id, content) VALUES (?1, ?2)",
                params![id, cleaned],
            )?;
            conn.execute(
                "INSERT INTO user_messages (user_id, message_id) VALUES (?1, ?2)",
                params![author, id],
            )?;
            trainer::apply(conn, author, &new)?;

            debug!(message_id = message.id, "inserted message");
            Ok(WriteOutcome::Inserted)
        }
    }
}

fn remove(conn: &Connection, message_id: u64) -> Result<bool> {
    let id = sql_id(message_id, "message")?;
    let Some(stored) = stored_message(conn, id)? else {
        return Ok(false);
    };

    trainer::apply(
        conn,
        stored.author,
        &Contribution::from_text(&stored.content).negated(),
    )?;
    conn.execute("DELETE FROM user_messages WHERE message_id = ?", params![id])?;
    conn.execute("DELETE FROM messages WHERE id = ?", params![id])?;

    debug!(message_id, "deleted message");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Scope;

    fn author() -> User {
        User::new(1, "ana")
    }

    fn msg(id: u64, text: &str) -> Message {
        Message::new(id, text, author())
    }

    #[test]
    fn test_save_then_exists() {
        let mut store = MarkovStore::open_in_memory().unwrap();
        assert_eq!(store.save(&msg(1, "the cat sat")).unwrap(), WriteOutcome::Inserted);
        assert!(store.exists(1).unwrap());
        assert!(store.delete(1).unwrap());
        assert!(!store.exists(1).unwrap());
    }

    #[test]
    fn test_save_empty_is_noop() {
        let mut store = MarkovStore::open_in_memory().unwrap();
        assert_eq!(store.save(&msg(1, "!speak")).unwrap(), WriteOutcome::Skipped);
        assert!(!store.exists(1).unwrap());
        assert_eq!(store.most_recent_id().unwrap(), None);
    }

    #[test]
    fn test_save_existing_acts_as_update() {
        let mut store = MarkovStore::open_in_memory().unwrap();
        store.save(&msg(1, "the cat sat")).unwrap();
        assert_eq!(store.save(&msg(1, "the dog sat")).unwrap(), WriteOutcome::Updated);
        assert_eq!(store.word_frequency(Scope::All, "cat").unwrap(), 0);
        assert_eq!(store.word_frequency(Scope::All, "dog").unwrap(), 1);
        assert_eq!(store.message_count().unwrap(), 1);
    }

    #[test]
    fn test_update_unknown_acts_as_save() {
        let mut store = MarkovStore::open_in_memory().unwrap();
        assert_eq!(store.update(&msg(5, "hi there")).unwrap(), WriteOutcome::Inserted);
        assert!(store.exists(5).unwrap());
    }

    #[test]
    fn test_update_to_empty_deletes() {
        let mut store = MarkovStore::open_in_memory().unwrap();
        store.save(&msg(1, "the cat sat")).unwrap();
        assert_eq!(
            store.update(&msg(1, "https://example.com")).unwrap(),
            WriteOutcome::Deleted
        );
        assert!(!store.exists(1).unwrap());
        assert_eq!(store.lexicon_size(Scope::All).unwrap(), 0);
        assert!(store.links(Scope::All, "the").unwrap().is_empty());
        assert_eq!(store.count_from(&author()).unwrap(), 0);
    }

    #[test]
    fn test_update_empty_unknown_is_skipped() {
        let mut store = MarkovStore::open_in_memory().unwrap();
        assert_eq!(store.update(&msg(9, "   ")).unwrap(), WriteOutcome::Skipped);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut store = MarkovStore::open_in_memory().unwrap();
        assert!(!store.delete(42).unwrap());
        store.save(&msg(42, "x")).unwrap();
        assert!(store.delete(42).unwrap());
        assert!(!store.delete(42).unwrap());
    }

    #[test]
    fn test_most_recent_and_counts() {
        let mut store = MarkovStore::open_in_memory().unwrap();
        store.save(&msg(3, "a")).unwrap();
        store.save(&msg(10, "b")).unwrap();
        store
            .save(&Message::new(7, "c", User::new(2, "bo")))
            .unwrap();

        assert_eq!(store.most_recent_id().unwrap(), Some(10));
        assert_eq!(store.count_from(&author()).unwrap(), 2);
        assert_eq!(store.count_from(&User::new(2, "bo")).unwrap(), 1);
        assert_eq!(store.count_from(&User::new(99, "nobody")).unwrap(), 0);
    }

    #[test]
    fn test_ensure_user_refreshes_name() {
        let store = MarkovStore::open_in_memory().unwrap();
        store.ensure_user(&User::new(4, "old")).unwrap();
        store.ensure_user(&User::new(4, "new")).unwrap();
        assert_eq!(store.user(4).unwrap(), Some(User::new(4, "new")));
        assert_eq!(store.user(5).unwrap(), None);
    }

    #[test]
    fn test_save_keeps_existing_name() {
        let mut store = MarkovStore::open_in_memory().unwrap();
        store.ensure_user(&User::new(1, "named")).unwrap();
        store.save(&Message::new(1, "hello", User::new(1, ""))).unwrap();
        assert_eq!(store.user(1).unwrap().unwrap().display_name, "named");
    }

    #[test]
    fn test_update_batch() {
        let mut store = MarkovStore::open_in_memory().unwrap();
        let batch = vec![
            msg(1, "one two"),
            msg(2, "!speak"),
            msg(3, "three"),
            Message::new(u64::MAX, "out of range", author()),
        ];
        assert_eq!(store.update_batch(&batch).unwrap(), 2);
        assert!(store.exists(1).unwrap());
        assert!(!store.exists(2).unwrap());
        assert!(store.exists(3).unwrap());
        assert_eq!(store.word_frequency(Scope::All, "two").unwrap(), 1);
    }

    #[test]
    fn test_author_change_moves_contribution() {
        let mut store = MarkovStore::open_in_memory().unwrap();
        store.save(&msg(1, "hello world")).unwrap();
        store
            .update(&Message::new(1, "hello world", User::new(2, "bo")))
            .unwrap();

        assert_eq!(store.word_frequency(Scope::User(1), "hello").unwrap(), 0);
        assert_eq!(store.word_frequency(Scope::User(2), "hello").unwrap(), 1);
        assert_eq!(store.word_frequency(Scope::All, "hello").unwrap(), 1);
    }

    #[test]
    fn test_messages_containing() {
        let mut store = MarkovStore::open_in_memory().unwrap();
        store.save(&msg(1, "100% sure")).unwrap();
        store.save(&msg(2, "100 percent")).unwrap();
        store.save(&msg(3, "snake_case")).unwrap();
        store.save(&msg(4, "snakeXcase")).unwrap();

        let found = store.messages_containing("0%").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 1);
        assert_eq!(found[0].author, author());

        let found = store.messages_containing("e_c").unwrap();
        assert_eq!(found.iter().map(|m| m.id).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_invalid_id_is_rejected() {
        let store = MarkovStore::open_in_memory().unwrap();
        assert!(matches!(
            store.exists(u64::MAX),
            Err(crate::error::MimicError::InvalidArgument(_))
        ));
    }
}
