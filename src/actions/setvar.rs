//! The `setvar` Action
//!
//! Creates, updates, increments or removes a collection variable.
//!
//! ## Syntax
//!
//! ```text
//! [!]COLLECTION.KEY[=VALUE]
//!
//! setvar:TX.score          create TX.score with an empty value
//! setvar:TX.score=10       absolute set
//! setvar:TX.score=+5       add 5
//! setvar:IP.hits=-1        subtract 1
//! setvar:!SESSION.flag     remove SESSION.flag
//! setvar:tx.%{tx.name}=+%{tx.critical_anomaly_score}
//! ```
//!
//! COLLECTION is one of TX, USER, GLOBAL, RESOURCE, SESSION, IP (any case).
//! KEY and VALUE may contain `%{COLLECTION.key}` references, resolved when
//! the rule fires. Keys are case-insensitive.
//!
//! ## Evaluation
//!
//! | Collection  | `!`    | `+N` / `-N`                      | anything else |
//! |-------------|--------|----------------------------------|---------------|
//! | persistent  | remove | atomic `sum(±N)` in the engine   | `set`         |
//! | transient   | remove | read, add, write back            | `set`         |
//!
//! A sign followed by something that is not an integer (`+abc`) is stored
//! literally. On the transient path a non-numeric *current* value aborts the
//! update with an error log. Backend failures are logged and skipped so that
//! persistence problems never block inspection.

use crate::actions::macros::Macro;
use crate::actions::{Action, ActionError, ActionType, RuleMetadata};
use crate::collection::{CollectionHandle, CollectionName, MapCollection, PersistentCollection};
use crate::waf::Transaction;
use tracing::{debug, error};

/// A parsed `setvar` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetVar {
    collection: CollectionName,
    key: Macro,
    value: Option<Macro>,
    is_remove: bool,
}

impl SetVar {
    /// Parses `[!]COLLECTION.KEY[=VALUE]`.
    pub fn parse(data: &str) -> Result<Self, ActionError> {
        if data.is_empty() {
            return Err(ActionError::MissingArguments);
        }

        let (is_remove, data) = match data.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, data),
        };

        let (target, value) = match data.split_once('=') {
            Some((target, value)) => (target, Some(value)),
            None => (data, None),
        };
        let (collection, key) = target.split_once('.').unwrap_or((target, ""));

        let collection: CollectionName = collection.trim().parse()?;
        if key.trim().is_empty() {
            return Err(ActionError::MissingKey);
        }

        Ok(Self {
            collection,
            key: Macro::new(key)?,
            value: value.map(Macro::new).transpose()?,
            is_remove,
        })
    }

    /// Returns the target collection.
    pub fn collection(&self) -> CollectionName {
        self.collection
    }

    /// Returns the key expression.
    pub fn key(&self) -> &Macro {
        &self.key
    }

    /// Returns the value expression, if any.
    pub fn value(&self) -> Option<&Macro> {
        self.value.as_ref()
    }

    /// Returns true for `!COLLECTION.KEY`.
    pub fn is_remove(&self) -> bool {
        self.is_remove
    }

    fn apply_persistent(&self, rule_id: i64, col: &PersistentCollection, key: &str, value: &str) {
        debug!(instance = col.key(), "Handling setvar for a persistent collection");

        let result = if self.is_remove {
            col.remove(key)
        } else {
            match parse_delta(value) {
                Some(delta) => col.sum(key, delta),
                None => col.set_one(key, value),
            }
        };

        if let Err(e) = result {
            error!(
                rule_id = rule_id,
                collection = %self.collection,
                instance = col.key(),
                var_key = key,
                error = %e,
                "setvar: persistent update failed, skipping"
            );
        }
    }

    fn apply_map(&self, rule_id: i64, col: &mut MapCollection, key: &str, value: &str) {
        debug!("Handling setvar for a map collection");

        if self.is_remove {
            col.remove(key);
            return;
        }

        let Some(delta) = parse_delta(value) else {
            col.set_one(key, value);
            return;
        };

        let current = match col.first(key) {
            None | Some("") => 0,
            Some(current) => match current.parse::<i64>() {
                Ok(n) => n,
                Err(e) => {
                    error!(
                        rule_id = rule_id,
                        var_key = key,
                        current = current,
                        error = %e,
                        "setvar: current value is not a number"
                    );
                    return;
                }
            },
        };

        col.set_one(key, current.saturating_add(delta).to_string());
    }
}

impl Action for SetVar {
    fn evaluate(&self, rule: &dyn RuleMetadata, tx: &mut Transaction) {
        let key = self.key.expand(tx).to_lowercase();
        let value = self
            .value
            .as_ref()
            .map(|v| v.expand(tx))
            .unwrap_or_default();
        let rule_id = rule.id();

        debug!(
            tx_id = tx.id(),
            rule_id = rule_id,
            collection = %self.collection,
            var_key = %key,
            var_value = %value,
            "Action setvar evaluated"
        );

        match tx.collection_mut(self.collection) {
            CollectionHandle::Persistent(col) => self.apply_persistent(rule_id, &col, &key, &value),
            CollectionHandle::Map(col) => self.apply_map(rule_id, col, &key, &value),
            CollectionHandle::Unavailable(name) => {
                error!(
                    rule_id = rule_id,
                    collection = %name,
                    "setvar: collection is not editable in this transaction"
                );
            }
        }
    }

    fn action_type(&self) -> ActionType {
        ActionType::Nondisruptive
    }
}

/// Reads `+N` / `-N` as a signed delta.
fn parse_delta(value: &str) -> Option<i64> {
    let negative = match value.as_bytes().first()? {
        b'+' => false,
        b'-' => true,
        _ => return None,
    };
    let magnitude: i64 = value[1..].parse().ok()?;

    if negative {
        magnitude.checked_neg()
    } else {
        Some(magnitude)
    }
}
