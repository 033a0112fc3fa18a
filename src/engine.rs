//! Sentence generation over the active scope
//!
//! `Core` owns the store, the active [`Scope`] and a cache of that scope's
//! lexicon. Changing scope reloads the cache; ingestion through the engine
//! marks it stale so the next draw sees the new words.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::{MimicError, Result};
use crate::model::{Message, Scope, User};
use crate::store::{MarkovStore, WriteOutcome};

/// Result of a generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sentence {
    Generated(String),
    /// The seed word has never been used in the active scope
    UnknownWord(String),
    /// The active scope has no words at all
    EmptyLexicon,
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentence::Generated(text) => f.write_str(text),
            Sentence::UnknownWord(word) => {
                write!(f, "{}", MimicError::UnknownWord(word.clone()))
            }
            Sentence::EmptyLexicon => f.write_str("lexicon is empty"),
        }
    }
}

pub struct Core<R = StdRng> {
    store: MarkovStore,
    settings: GenerationConfig,
    scope: Scope,
    lexicon: BTreeSet<String>,
    all_words: Vec<String>,
    stale: bool,
    rng: R,
}

impl Core<StdRng> {
    pub fn new(store: MarkovStore) -> Result<Self> {
        Self::with_rng(store, StdRng::from_entropy())
    }
}

impl<R: Rng> Core<R> {
    /// Engine over all users, drawing from `rng`
    pub fn with_rng(store: MarkovStore, rng: R) -> Result<Self> {
        let mut core = Self {
            store,
            settings: GenerationConfig::default(),
            scope: Scope::All,
            lexicon: BTreeSet::new(),
            all_words: Vec::new(),
            stale: true,
            rng,
        };
        core.reload()?;
        Ok(core)
    }

    pub fn with_settings(mut self, settings: GenerationConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &MarkovStore {
        &self.store
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    // ============================================
    // SCOPE
    // ============================================

    pub fn set_scope(&mut self, scope: Scope) -> Result<()> {
        self.scope = scope;
        self.reload()
    }

    /// Target one user, or everyone with `None`
    pub fn set_active_user(&mut self, user: Option<&User>) -> Result<()> {
        self.set_scope(Scope::from(user))
    }

    fn reload(&mut self) -> Result<()> {
        self.lexicon = self.store.lexicon(self.scope)?;
        self.all_words = self.store.all_words_weighted(self.scope)?;
        self.stale = false;
        debug!(scope = ?self.scope, words = self.lexicon.len(), "loaded lexicon");
        Ok(())
    }

    fn refresh(&mut self) -> Result<()> {
        if self.stale {
            self.reload()?;
        }
        Ok(())
    }

    // ============================================
    // INGESTION
    // ============================================

    pub fn on_message_created(&mut self, message: &Message) -> Result<WriteOutcome> {
        let outcome = self.store.save(message)?;
        self.stale |= outcome != WriteOutcome::Skipped;
        Ok(outcome)
    }

    pub fn on_message_edited(&mut self, message: &Message) -> Result<WriteOutcome> {
        let outcome = self.store.update(message)?;
        self.stale |= outcome != WriteOutcome::Skipped;
        Ok(outcome)
    }

    pub fn on_message_deleted(&mut self, message_id: u64) -> Result<bool> {
        let removed = self.store.delete(message_id)?;
        self.stale |= removed;
        Ok(removed)
    }

    /// Bulk backfill; returns how many messages were written
    pub fn ingest_history(&mut self, messages: &[Message]) -> Result<usize> {
        let saved = self.store.update_batch(messages)?;
        self.stale |= saved > 0;
        Ok(saved)
    }

    pub fn ensure_user(&self, user: &User) -> Result<()> {
        self.store.ensure_user(user)
    }

    pub fn retrain(&mut self) -> Result<usize> {
        let count = self.store.retrain()?;
        self.stale = true;
        Ok(count)
    }

    // ============================================
    // QUERIES
    // ============================================

    pub fn most_recent_processed_id(&self) -> Result<Option<u64>> {
        self.store.most_recent_id()
    }

    pub fn message_count_for(&self, user: &User) -> Result<u64> {
        self.store.count_from(user)
    }

    pub fn lexicon_size(&self) -> Result<u64> {
        self.store.lexicon_size(self.scope)
    }

    pub fn lexicon_size_all(&self) -> Result<u64> {
        self.store.lexicon_size(Scope::All)
    }

    pub fn lexicon_size_for(&self, user: &User) -> Result<u64> {
        self.store.lexicon_size(Scope::User(user.id))
    }

    pub fn frequency_of(&self, word: &str) -> Result<u64> {
        self.store.word_frequency(self.scope, word)
    }

    pub fn frequency_all(&self, word: &str) -> Result<u64> {
        self.store.word_frequency(Scope::All, word)
    }

    pub fn links_of(&self, word: &str) -> Result<BTreeMap<String, u64>> {
        self.store.links(self.scope, word)
    }

    /// Linked words, each repeated by how often it followed `word`
    pub fn weighted_links(&self, word: &str) -> Result<Vec<String>> {
        let links = self.links_of(word)?;
        Ok(links
            .into_iter()
            .flat_map(|(end, n)| std::iter::repeat(end).take(n as usize))
            .collect())
    }

    /// One `frequency word` line per link, most frequent first
    pub fn formatted_links(&self, word: &str) -> Result<String> {
        let mut links: Vec<_> = self.links_of(word)?.into_iter().collect();
        links.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut out = String::new();
        for (end, frequency) in links {
            out.push_str(&format!("{:<3} {}\n", frequency, end));
        }
        Ok(out)
    }

    // ============================================
    // GENERATION
    // ============================================

    /// Frequency-weighted word from the active scope; empty if there is none
    pub fn random_word(&mut self) -> Result<String> {
        self.refresh()?;
        Ok(self.draw_word())
    }

    fn draw_word(&mut self) -> String {
        self.all_words
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_default()
    }

    pub fn generate_sentence(&mut self, seed: Option<&str>) -> Result<Sentence> {
        self.refresh()?;

        let seed = match seed {
            Some(word) if !self.lexicon.contains(word) => {
                return Ok(Sentence::UnknownWord(word.to_string()));
            }
            Some(word) => word.to_string(),
            None => {
                let word = self.draw_word();
                if word.is_empty() {
                    return Ok(Sentence::EmptyLexicon);
                }
                word
            }
        };

        self.walk(seed).map(Sentence::Generated)
    }

    /// Convenience for chat replies: the sentence, or the rejection text
    pub fn sentence_or_message(&mut self, seed: Option<&str>) -> Result<String> {
        Ok(self.generate_sentence(seed)?.to_string())
    }

    fn walk(&mut self, seed: String) -> Result<String> {
        let scope = self.scope;
        // Length counts a separator after every word.
        let mut length = seed.chars().count() + 1;
        let mut words = vec![seed];
        let mut repeat_count: i64 = 0;
        let mut links = self.store.links(scope, &words[0])?;

        while length < self.settings.max_length {
            if links.is_empty() {
                break;
            }

            let jump = self.settings.topic_jump_odds > 0
                && self.rng.gen_ratio(1, self.settings.topic_jump_odds);
            let next = if jump {
                self.draw_word()
            } else {
                pick_weighted(&links, &mut self.rng)
            };
            if next.is_empty() {
                break;
            }

            let current = &words[words.len() - 1];
            repeat_count = if *current == next { repeat_count + 1 } else { 0 };
            length += next.chars().count() + 1;

            links = self.store.links(scope, &next)?;
            let link_count: u64 = links.values().sum();
            let frequency = self.store.word_frequency(scope, &next)?;
            words.push(next);

            // Well-connected, frequent words keep the sentence going; repeats end it.
            let bound = self.settings.stop_base + link_count as i64 + frequency as i64
                - repeat_count
                + 2;
            if bound <= 0 || self.rng.gen_range(0..bound) <= self.settings.stop_threshold {
                break;
            }
        }

        Ok(words.join(" "))
    }
}

fn pick_weighted<R: Rng>(links: &BTreeMap<String, u64>, rng: &mut R) -> String {
    match WeightedIndex::new(links.values()) {
        Ok(index) => links
            .keys()
            .nth(index.sample(rng))
            .cloned()
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn seeded(seed: u64) -> Core<StdRng> {
        let store = MarkovStore::open_in_memory().unwrap();
        Core::with_rng(store, StdRng::seed_from_u64(seed)).unwrap()
    }

    fn ana() -> User {
        User::new(1, "ana")
    }

    fn feed(core: &mut Core<StdRng>, messages: &[(u64, &User, &str)]) {
        for (id, user, text) in messages {
            core.on_message_created(&Message::new(*id, *text, (*user).clone()))
                .unwrap();
        }
    }

    #[test]
    fn test_unknown_seed() {
        let mut core = seeded(1);
        feed(&mut core, &[(1, &ana(), "the cat sat")]);

        let sentence = core.generate_sentence(Some("unseenword")).unwrap();
        assert_eq!(sentence, Sentence::UnknownWord("unseenword".to_string()));
        assert_eq!(sentence.to_string(), "\"unseenword\" not found in lexicon");
    }

    #[test]
    fn test_empty_lexicon() {
        let mut core = seeded(1);
        assert_eq!(core.random_word().unwrap(), "");
        assert_eq!(core.generate_sentence(None).unwrap(), Sentence::EmptyLexicon);
    }

    #[test]
    fn test_single_word_without_links() {
        let mut core = seeded(3);
        feed(&mut core, &[(1, &ana(), "hello")]);
        assert_eq!(
            core.generate_sentence(Some("hello")).unwrap(),
            Sentence::Generated("hello".to_string())
        );
    }

    #[test]
    fn test_chain_follows_only_link() {
        let mut core = seeded(9).with_settings(GenerationConfig {
            topic_jump_odds: 0,
            ..GenerationConfig::default()
        });
        feed(&mut core, &[(1, &ana(), "alpha beta gamma")]);

        for _ in 0..20 {
            let Sentence::Generated(text) = core.generate_sentence(Some("alpha")).unwrap() else {
                panic!("expected a sentence");
            };
            assert!(
                ["alpha", "alpha beta", "alpha beta gamma"].contains(&text.as_str()),
                "unexpected sentence {:?}",
                text
            );
        }
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let messages: Vec<(u64, User, &str)> = vec![
            (1, ana(), "the cat sat on the mat"),
            (2, ana(), "the dog sat on the cat"),
            (3, User::new(2, "bo"), "a cat is a cat"),
        ];

        let run = |seed| {
            let mut core = seeded(seed);
            for (id, user, text) in &messages {
                core.on_message_created(&Message::new(*id, *text, user.clone()))
                    .unwrap();
            }
            (0..10)
                .map(|_| core.generate_sentence(None).unwrap())
                .collect::<Vec<_>>()
        };

        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_sentence_respects_length_cap() {
        let mut core = seeded(5).with_settings(GenerationConfig {
            max_length: 40,
            topic_jump_odds: 0,
            stop_base: 1000,
            stop_threshold: -1,
        });
        feed(&mut core, &[(1, &ana(), "word word")]);

        let Sentence::Generated(text) = core.generate_sentence(Some("word")).unwrap() else {
            panic!("expected a sentence");
        };
        // The last word may overshoot the cap by itself plus one separator.
        assert!(text.len() <= 40 + "word".len());
        assert!(text.split(' ').all(|w| w == "word"));
    }

    #[test]
    fn test_next_word_follows_link_frequencies() {
        // Long enough for exactly one step after the seed
        let mut core = seeded(11).with_settings(GenerationConfig {
            max_length: 4,
            topic_jump_odds: 0,
            ..GenerationConfig::default()
        });
        // "go" -> "left" three times as often as "go" -> "right"
        feed(
            &mut core,
            &[
                (1, &ana(), "go left"),
                (2, &ana(), "go left"),
                (3, &ana(), "go left"),
                (4, &ana(), "go right"),
            ],
        );

        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..4000 {
            if let Sentence::Generated(text) = core.generate_sentence(Some("go")).unwrap() {
                let next = text.split(' ').nth(1).unwrap_or("").to_string();
                *counts.entry(next).or_insert(0) += 1;
            }
        }

        let left = counts["left"] as f64;
        let right = counts["right"] as f64;
        let ratio = left / (left + right);
        assert!((ratio - 0.75).abs() < 0.05, "ratio was {}", ratio);
    }

    #[test]
    fn test_scope_switch_reloads_lexicon() {
        let mut core = seeded(2);
        let bo = User::new(2, "bo");
        feed(&mut core, &[(1, &ana(), "apples"), (2, &bo, "pears")]);

        core.set_active_user(Some(&ana())).unwrap();
        assert_eq!(core.lexicon_size().unwrap(), 1);
        assert_eq!(
            core.generate_sentence(Some("pears")).unwrap(),
            Sentence::UnknownWord("pears".to_string())
        );
        assert_eq!(core.random_word().unwrap(), "apples");

        core.set_active_user(None).unwrap();
        assert_eq!(core.scope(), Scope::All);
        assert_eq!(core.lexicon_size().unwrap(), 2);
        assert!(matches!(
            core.generate_sentence(Some("pears")).unwrap(),
            Sentence::Generated(_)
        ));
    }

    #[test]
    fn test_ingestion_marks_cache_stale() {
        let mut core = seeded(4);
        assert_eq!(core.random_word().unwrap(), "");

        feed(&mut core, &[(1, &ana(), "fresh")]);
        assert_eq!(core.random_word().unwrap(), "fresh");

        core.on_message_deleted(1).unwrap();
        assert_eq!(core.random_word().unwrap(), "");
    }

    #[test]
    fn test_frequency_queries() {
        let mut core = seeded(6);
        let bo = User::new(2, "bo");
        feed(
            &mut core,
            &[(1, &ana(), "the cat sat"), (2, &ana(), "the cat ran"), (3, &bo, "cat")],
        );

        assert_eq!(core.frequency_of("cat").unwrap(), 3);
        core.set_active_user(Some(&ana())).unwrap();
        assert_eq!(core.frequency_of("cat").unwrap(), 2);
        assert_eq!(core.frequency_all("cat").unwrap(), 3);
        assert_eq!(core.message_count_for(&ana()).unwrap(), 2);
        assert_eq!(core.lexicon_size_for(&bo).unwrap(), 1);
        assert_eq!(core.most_recent_processed_id().unwrap(), Some(3));
        assert_eq!(
            core.weighted_links("THE").unwrap(),
            vec!["cat".to_string(), "cat".to_string()]
        );
    }

    #[test]
    fn test_formatted_links() {
        let mut core = seeded(7);
        let text = "x y ".repeat(12) + "x z";
        feed(&mut core, &[(1, &ana(), text.as_str())]);

        assert_eq!(core.formatted_links("x").unwrap(), "12  y\n1   z\n");
        assert_eq!(core.formatted_links("nothing").unwrap(), "");
    }
}
