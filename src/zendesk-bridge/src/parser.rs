//! Command line tokenization.
//!
//! A command line is `<trigger> <verb...> <args...>`. Tokens are kept
//! verbatim together with their byte span in the raw line, so a handler can
//! take "everything after the ticket number" without pattern matching on the
//! raw text.

use thiserror::Error;

/// Why a line is not a command for this integration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Nothing but whitespace.
    #[error("empty command line")]
    Empty,

    /// First token is not our trigger word.
    #[error("expected trigger `{expected}`, found `{found}`")]
    WrongTrigger {
        /// Configured trigger.
        expected: String,
        /// First token of the line.
        found: String,
    },
}

/// A whitespace-delimited token and where it ends in the raw line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    text: String,
    end: usize,
}

impl Token {
    /// Token text, verbatim.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// A tokenized command line whose first token matched the trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    raw: String,
    tokens: Vec<Token>,
}

impl ParsedLine {
    /// All tokens, the trigger included.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Argument tokens following the trigger.
    pub fn args(&self) -> Vec<&str> {
        self.tokens.iter().skip(1).map(Token::as_str).collect()
    }

    /// Raw text after the token at `index`, trimmed at both ends.
    ///
    /// Internal whitespace, line breaks included, is preserved.
    pub fn text_after(&self, index: usize) -> &str {
        match self.tokens.get(index) {
            Some(token) => self.raw[token.end..].trim(),
            None => "",
        }
    }
}

/// Splits raw lines and checks the trigger word.
#[derive(Debug, Clone)]
pub struct CommandParser {
    trigger: String,
}

impl CommandParser {
    /// Create a parser for the given trigger (e.g. `/zendesk`).
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
        }
    }

    /// The trigger word.
    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    /// Tokenize `raw` and verify its first token.
    pub fn parse(&self, raw: &str) -> Result<ParsedLine, ParseError> {
        let tokens = tokenize(raw);

        let first = match tokens.first() {
            Some(token) => token,
            None => return Err(ParseError::Empty),
        };
        if first.text != self.trigger {
            return Err(ParseError::WrongTrigger {
                expected: self.trigger.clone(),
                found: first.text.clone(),
            });
        }

        Ok(ParsedLine {
            raw: raw.to_string(),
            tokens,
        })
    }
}

fn tokenize(raw: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (idx, ch) in raw.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(begin)) => {
                tokens.push(Token {
                    text: raw[begin..idx].to_string(),
                    end: idx,
                });
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(begin) = start {
        tokens.push(Token {
            text: raw[begin..].to_string(),
            end: raw.len(),
        });
    }

    tokens
}
