//! Records exchanged with the chat connector

use serde::{Deserialize, Serialize};

/// Message author. Identity is the id; the display name is refreshed whenever
/// a newer one is observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub display_name: String,
}

impl User {
    pub fn new(id: u64, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// A chat message as delivered by the connector. The cleaned form is derived
/// by the store's normalizer and is the only text that gets persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u64,
    pub raw_content: String,
    pub author: User,
}

impl Message {
    pub fn new(id: u64, raw_content: impl Into<String>, author: User) -> Self {
        Self {
            id,
            raw_content: raw_content.into(),
            author,
        }
    }
}

/// One line of a bulk history export
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRecord {
    pub id: u64,
    pub content: String,
    pub author_id: u64,
    #[serde(default)]
    pub author_name: String,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Message::new(
            record.id,
            record.content,
            User::new(record.author_id, record.author_name),
        )
    }
}

/// Which rows of the lexicon/link tables are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Materialized sum over every author
    #[default]
    All,
    User(u64),
}

impl From<Option<&User>> for Scope {
    fn from(user: Option<&User>) -> Self {
        user.map_or(Scope::All, |u| Scope::User(u.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_from_user() {
        let user = User::new(7, "ana");
        assert_eq!(Scope::from(Some(&user)), Scope::User(7));
        assert_eq!(Scope::from(None), Scope::All);
    }

    #[test]
    fn test_record_parsing() {
        let line = r#"{"id": 10, "content": "hello there", "author_id": 3}"#;
        let record: MessageRecord = serde_json::from_str(line).unwrap();
        let message = Message::from(record);
        assert_eq!(message.id, 10);
        assert_eq!(message.author, User::new(3, ""));
    }
}
