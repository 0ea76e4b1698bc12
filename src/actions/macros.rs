//! Expandable Strings
//!
//! Action arguments may reference transaction state with `%{COLLECTION.key}`.
//! A [`Macro`] is parsed once, when the rule is loaded, and expanded against a
//! transaction every time the rule fires.
//!
//! ```text
//! "%{tx.prefix}-blocked"
//!   │             │
//!   │             └── Text("-blocked")
//!   └──────────────── Variable { collection: TX, key: "prefix" }
//! ```

use crate::collection::{CollectionName, UnknownCollection};
use crate::waf::Transaction;
use std::fmt;
use thiserror::Error;

/// Errors raised while parsing a macro.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MacroError {
    /// `%{` without a closing `}`
    #[error("unterminated macro reference in '{0}'")]
    Unterminated(String),

    /// `%{}`
    #[error("empty macro reference")]
    EmptyReference,

    /// The referenced collection is not supported
    #[error(transparent)]
    UnknownCollection(#[from] UnknownCollection),

    /// `%{TX}` or `%{TX.}`
    #[error("macro reference '{0}' needs a key, e.g. %{{TX.score}}")]
    MissingKey(String),
}

/// One piece of a parsed macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroToken {
    /// Literal text, copied as-is
    Text(String),
    /// A reference resolved at expansion time
    Variable {
        /// The referenced collection
        collection: CollectionName,
        /// The referenced key, lowercased
        key: String,
    },
}

/// A string that may contain `%{COLLECTION.key}` references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    original: String,
    tokens: Vec<MacroToken>,
}

impl Macro {
    /// Parses `input`.
    pub fn new(input: &str) -> Result<Self, MacroError> {
        let mut tokens = Vec::new();
        let mut rest = input;

        while let Some(start) = rest.find("%{") {
            if start > 0 {
                tokens.push(MacroToken::Text(rest[..start].to_string()));
            }

            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| MacroError::Unterminated(input.to_string()))?;
            tokens.push(parse_reference(&after[..end])?);
            rest = &after[end + 1..];
        }

        if !rest.is_empty() {
            tokens.push(MacroToken::Text(rest.to_string()));
        }

        Ok(Self {
            original: input.to_string(),
            tokens,
        })
    }

    /// Returns the text the macro was parsed from.
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Returns the parsed tokens.
    pub fn tokens(&self) -> &[MacroToken] {
        &self.tokens
    }

    /// Returns true if the macro has no references.
    pub fn is_literal(&self) -> bool {
        self.tokens
            .iter()
            .all(|t| matches!(t, MacroToken::Text(_)))
    }

    /// Resolves every reference against `tx`. Unset values expand to "".
    pub fn expand(&self, tx: &Transaction) -> String {
        if self.is_literal() {
            return self.original.clone();
        }

        let mut out = String::with_capacity(self.original.len());
        for token in &self.tokens {
            match token {
                MacroToken::Text(text) => out.push_str(text),
                MacroToken::Variable { collection, key } => {
                    if let Some(value) = tx.lookup(*collection, key) {
                        out.push_str(&value);
                    }
                }
            }
        }
        out
    }
}

impl fmt::Display for Macro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

fn parse_reference(reference: &str) -> Result<MacroToken, MacroError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(MacroError::EmptyReference);
    }

    let (collection, key) = reference.split_once('.').unwrap_or((reference, ""));
    let collection: CollectionName = collection.parse()?;
    if key.trim().is_empty() {
        return Err(MacroError::MissingKey(reference.to_string()));
    }

    Ok(MacroToken::Variable {
        collection,
        key: key.trim().to_lowercase(),
    })
}
