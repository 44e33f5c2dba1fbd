//! Longest-prefix verb routing.
//!
//! Verb paths are joined with [`VERB_SEPARATOR`] and looked up longest
//! first, so `latest private 42` reaches `latest/private` even when a
//! shorter `latest` is registered too.

use std::collections::HashMap;

use thiserror::Error;

/// Separator between the words of a verb path.
pub const VERB_SEPARATOR: &str = "/";

/// Invalid verb table definitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    /// Path without words.
    #[error("verb path is empty")]
    EmptyPath,

    /// A word that could never be produced by the tokenizer or that breaks lookups.
    #[error("invalid verb word `{0}`: must be non-empty lowercase without whitespace or `/`")]
    InvalidWord(String),

    /// The same path registered twice.
    #[error("verb path `{0}` registered twice")]
    Duplicate(String),
}

/// Immutable table from verb paths to handlers, plus a default handler.
#[derive(Debug, Clone)]
pub struct VerbTable<H> {
    entries: HashMap<String, H>,
    longest: usize,
    default: H,
}

impl<H> VerbTable<H> {
    /// Start building a table whose fallback is `default`.
    pub fn builder(default: H) -> VerbTableBuilder<H> {
        VerbTableBuilder {
            entries: HashMap::new(),
            longest: 0,
            default,
        }
    }

    /// Resolve the handler for `args` and return the unconsumed arguments.
    pub fn resolve<'a, S: AsRef<str>>(&self, args: &'a [S]) -> (&H, &'a [S]) {
        let upper = args.len().min(self.longest);
        for n in (1..=upper).rev() {
            let key = args[..n]
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join(VERB_SEPARATOR);
            if let Some(handler) = self.entries.get(&key) {
                return (handler, &args[n..]);
            }
        }
        (&self.default, args)
    }

    /// The fallback handler.
    pub fn default_handler(&self) -> &H {
        &self.default
    }

    /// Whether `path` is registered.
    pub fn contains(&self, path: &[&str]) -> bool {
        self.entries.contains_key(&path.join(VERB_SEPARATOR))
    }

    /// Number of registered paths (the default handler excluded).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether only the default handler exists.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder validating every registered path.
#[derive(Debug)]
pub struct VerbTableBuilder<H> {
    entries: HashMap<String, H>,
    longest: usize,
    default: H,
}

impl<H> VerbTableBuilder<H> {
    /// Register `handler` under `path`.
    pub fn register(mut self, path: &[&str], handler: H) -> Result<Self, RouterError> {
        if path.is_empty() {
            return Err(RouterError::EmptyPath);
        }
        if let Some(word) = path.iter().find(|w| !is_valid_word(w)) {
            return Err(RouterError::InvalidWord((*word).to_string()));
        }

        let key = path.join(VERB_SEPARATOR);
        if self.entries.contains_key(&key) {
            return Err(RouterError::Duplicate(key));
        }

        self.longest = self.longest.max(path.len());
        self.entries.insert(key, handler);
        Ok(self)
    }

    /// Finish the table.
    pub fn build(self) -> VerbTable<H> {
        VerbTable {
            entries: self.entries,
            longest: self.longest,
            default: self.default,
        }
    }
}

fn is_valid_word(word: &str) -> bool {
    !word.is_empty()
        && !word.contains(VERB_SEPARATOR)
        && !word.chars().any(char::is_whitespace)
        && !word.chars().any(char::is_uppercase)
}
