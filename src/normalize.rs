//! Message text cleanup applied before anything is stored or trained
//!
//! Removes bot command invocations, bare and `<escaped>` links, and collapses
//! whitespace. A command only covers the first line of a message; later lines
//! are kept. The output is a fixed point: cleaning it again changes nothing.

use regex::Regex;

/// Commands that take trailing parameters (`!quote something`)
pub const DEFAULT_COMMANDS_WITH_ARGS: &[&str] = &[
    "bet",
    "playlist",
    "play playlist",
    "quote",
    "count",
    "markov",
    "context",
    "source",
    "setuser",
];

/// Commands that are only ever the whole message (`!skip`)
pub const DEFAULT_BARE_COMMANDS: &[&str] = &[
    "start",
    "hit",
    "bet",
    "login",
    "check",
    "logincreation",
    "queue",
    "nowplaying",
    "playlists",
    "forceskip",
    "skip",
    "shuffle",
    "stop",
    "speak",
    "gethistory",
    "word",
];

const URL_BODY: &str = r"https?:(?://|\\)+[\w:#@%/;$()~?+,\-.<=\\&]*";

#[derive(Debug, Clone)]
pub struct Normalizer {
    command: Regex,
    escaped_link: Regex,
    link: Regex,
    whitespace: Regex,
}

impl Normalizer {
    pub fn new<S: AsRef<str>>(
        prefix: &str,
        commands_with_args: &[S],
        bare_commands: &[S],
    ) -> Result<Self, regex::Error> {
        let alternation = |names: &[S]| {
            names
                .iter()
                .map(|n| regex::escape(n.as_ref()))
                .collect::<Vec<_>>()
                .join("|")
        };

        // An empty group would match every prefixed word, so leave it out.
        let mut branches = Vec::new();
        if !commands_with_args.is_empty() {
            branches.push(format!(
                r"(?:{})(?:[^\S\r\n]+.*|$)",
                alternation(commands_with_args)
            ));
        }
        if !bare_commands.is_empty() {
            branches.push(format!(r"(?:{})$", alternation(bare_commands)));
        }
        let command = if branches.is_empty() {
            // Never matches: `$` followed by a character.
            Regex::new(r"$.^")?
        } else {
            Regex::new(&format!(
                r"(?imR)\A{}(?:{})",
                regex::escape(prefix),
                branches.join("|")
            ))?
        };

        Ok(Self {
            command,
            escaped_link: Regex::new(&format!(r"(?i)<{}>", URL_BODY))?,
            link: Regex::new(&format!(r"(?i){}", URL_BODY))?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    pub fn clean(&self, raw: &str) -> String {
        let text = self.escaped_link.replace_all(raw, " ");
        let text = self.link.replace_all(&text, "");

        // Newlines must survive until commands are gone so that `.*` stops at
        // the end of the invoking line. Stripping one command can expose
        // another at the new start, so repeat until none is left.
        let mut text = text.trim().to_string();
        while let Some(found) = self.command.find(&text).filter(|m| !m.is_empty()) {
            text = text[found.end()..].trim().to_string();
        }
        self.collapse(&text)
    }

    fn collapse(&self, text: &str) -> String {
        self.whitespace.replace_all(text, " ").trim().to_string()
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        // Panics only if the built-in command lists stop forming valid
        // regexes; `test_default_patterns_compile` guards that.
        Self::new("!", DEFAULT_COMMANDS_WITH_ARGS, DEFAULT_BARE_COMMANDS)
            .unwrap_or_else(|e| panic!("default normalizer patterns are invalid: {}", e))
    }
}
