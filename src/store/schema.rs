//! SQLite schema definition
//!
//! Source tables hold cleaned message text and authorship. The lexicon and
//! link tables are derived from them and keyed by scope: an author id, or
//! `-1` for the aggregate over all authors.

pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- ============================================
-- SOURCE
-- ============================================

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,                -- platform user id
    display_name TEXT NOT NULL DEFAULT ''
);

-- Cleaned content only; raw text is never stored
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY,                -- platform message id, monotonic
    content TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_messages (
    user_id INTEGER NOT NULL,
    message_id INTEGER NOT NULL UNIQUE,
    PRIMARY KEY (user_id, message_id),
    FOREIGN KEY(user_id) REFERENCES users(id),
    FOREIGN KEY(message_id) REFERENCES messages(id) ON DELETE CASCADE
);

-- ============================================
-- MARKOV DATA
-- ============================================

-- Word frequencies; case preserved
CREATE TABLE IF NOT EXISTS lexicon (
    word TEXT NOT NULL,
    scope INTEGER NOT NULL,                -- user id, or -1 for all users
    frequency INTEGER NOT NULL,
    PRIMARY KEY (word, scope)
);

-- start_word is lowercased, end_word keeps its case
CREATE TABLE IF NOT EXISTS links (
    start_word TEXT NOT NULL,
    end_word TEXT NOT NULL,
    scope INTEGER NOT NULL,
    frequency INTEGER NOT NULL,
    PRIMARY KEY (start_word, end_word, scope)
);

-- ============================================
-- INDEXES
-- ============================================

CREATE INDEX IF NOT EXISTS idx_user_messages_user ON user_messages(user_id);
CREATE INDEX IF NOT EXISTS idx_lexicon_scope ON lexicon(scope, word);
CREATE INDEX IF NOT EXISTS idx_links_lookup ON links(scope, start_word);
"#;
