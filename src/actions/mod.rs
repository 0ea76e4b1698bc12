//! Actions Module
//!
//! Actions are what a rule does once it matches. This crate carries the
//! state-mutation action, `setvar`, plus the small contract every action
//! implements so a rule engine can hold them behind `Box<dyn Action>`.
//!
//! ## Lifecycle
//!
//! ```text
//!  rule load time                    request time
//! ┌──────────────────┐         ┌────────────────────────────┐
//! │ actions::get()   │ ──────> │ Action::evaluate(rule, tx) │  (many times,
//! │ parse + validate │  once   │ expand macros, mutate      │   many txs)
//! └──────────────────┘         └────────────────────────────┘
//! ```
//!
//! Parsing errors reject the rule. Evaluation never fails: problems are
//! logged and the rule keeps going.

pub mod macros;
pub mod setvar;

// Re-export commonly used types
pub use macros::{Macro, MacroError, MacroToken};
pub use setvar::SetVar;

use crate::collection::UnknownCollection;
use crate::waf::Transaction;
use std::fmt;
use thiserror::Error;

/// Errors raised while building an action from its arguments.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The action needs arguments and got none
    #[error("missing arguments")]
    MissingArguments,

    /// The target collection cannot be edited
    #[error(transparent)]
    UnsupportedCollection(#[from] UnknownCollection),

    /// `COLLECTION` given without `.KEY`
    #[error("invalid arguments, expected syntax [!]COLLECTION.KEY[=VALUE]")]
    MissingKey,

    /// A key or value expression failed to parse
    #[error("invalid expression: {0}")]
    Macro(#[from] MacroError),

    /// No action is registered under this name
    #[error("unknown action '{0}'")]
    UnknownAction(String),
}

/// The broad category of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    /// Only describes the rule (id, msg, ...)
    Metadata,
    /// Interrupts the transaction (deny, redirect, ...)
    Disruptive,
    /// Carries data for other actions
    Data,
    /// Changes state without interrupting the transaction
    Nondisruptive,
    /// Changes rule flow (chain, skip, ...)
    Flow,
}

/// What an action may know about the rule that fired it.
pub trait RuleMetadata {
    /// The rule id.
    fn id(&self) -> i64;

    /// The id of the chain parent, 0 for top-level rules.
    fn parent_id(&self) -> i64 {
        0
    }
}

/// Minimal [`RuleMetadata`] for callers without a full rule object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleInfo {
    /// The rule id
    pub id: i64,
    /// The chain parent id
    pub parent_id: i64,
}

impl RuleInfo {
    /// Creates metadata for a top-level rule.
    pub fn new(id: i64) -> Self {
        Self { id, parent_id: 0 }
    }
}

impl RuleMetadata for RuleInfo {
    fn id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> i64 {
        self.parent_id
    }
}

/// A parsed, immutable action.
pub trait Action: Send + Sync + fmt::Debug {
    /// Runs the action against a transaction.
    fn evaluate(&self, rule: &dyn RuleMetadata, tx: &mut Transaction);

    /// Returns the action category.
    fn action_type(&self) -> ActionType;
}

/// Builds the action registered under `name` from its argument string.
///
/// Names are case-insensitive.
pub fn get(name: &str, data: &str) -> Result<Box<dyn Action>, ActionError> {
    match name.to_ascii_lowercase().as_str() {
        "setvar" => Ok(Box::new(SetVar::parse(data)?)),
        _ => Err(ActionError::UnknownAction(name.to_string())),
    }
}
