//! Turn `(verb, object)` actions into n-gram corpus queries.
//!
//! The crate is pure string processing and never touches the network:
//!
//! 1. [`normalize_action`] rewrites underscore-joined dataset labels into
//!    plain phrases, mapping the `no_interaction` sentinel verb to `"and"`.
//! 2. [`every_combination`] optionally expands observed actions into the full
//!    verb × object grid.
//! 3. [`querify`] builds the exact and fill-wildcard queries for one action;
//!    [`querify_simple`] builds the query for a lone verb or object term.
//!
//! # Example
//! ```rust
//! use hoi_types::Action;
//! use ngram_query::{normalize_action, querify};
//!
//! let action = normalize_action(&Action::new("look_at", "dining_table"));
//! let queries = querify(&action).unwrap();
//! assert_eq!(queries.exact, "look~+at+dining+table~");
//! assert_eq!(queries.fill, "look~+at+*+dining+table~");
//! ```

use std::collections::BTreeSet;

use hoi_types::Action;
use thiserror::Error;

/// Suffix that makes the service match morphological variants of a head word.
pub const WILDCARD_MARKER: char = '~';
/// Query token matching words the corpus may insert between verb and object.
pub const FILL_WILDCARD: &str = "*";
/// Dataset verb meaning "no interaction present".
pub const NO_INTERACTION: &str = "no_interaction";
/// Replacement for [`NO_INTERACTION`] so the query still reads as a phrase.
pub const NO_INTERACTION_REPLACEMENT: &str = "and";

const SEPARATOR: &str = "+";

/// The two queries issued for one action.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueryPair {
    pub exact: String,
    pub fill: String,
}

/// Action ready for querying, paired with the label its result is reported under.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LabeledAction {
    pub query: Action,
    pub label: Action,
}

/// Standalone verb or object term, paired with its original label.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LabeledTerm {
    pub query: String,
    pub label: String,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum QueryError {
    #[error("cannot build a query for {0:?}: verb phrase is empty")]
    EmptyVerb(String),
    #[error("cannot build a query for {0:?}: object phrase is empty")]
    EmptyObject(String),
    #[error("cannot build a query for an empty term")]
    EmptyTerm,
}

/// Normalize a dataset verb label.
pub fn normalize_verb(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == NO_INTERACTION {
        return NO_INTERACTION_REPLACEMENT.to_string();
    }
    despace(trimmed)
}

/// Normalize a dataset object label.
pub fn normalize_object(raw: &str) -> String {
    despace(raw.trim())
}

pub fn normalize_action(action: &Action) -> Action {
    Action::new(normalize_verb(&action.verb), normalize_object(&action.object))
}

fn despace(text: &str) -> String {
    text.replace('_', " ").trim().to_string()
}

/// Pair every action with itself as label, normalizing the query side when
/// `parse_underscore` is set.
pub fn label_actions(actions: Vec<Action>, parse_underscore: bool) -> Vec<LabeledAction> {
    actions
        .into_iter()
        .map(|label| {
            let query = if parse_underscore {
                normalize_action(&label)
            } else {
                label.clone()
            };
            LabeledAction { query, label }
        })
        .collect()
}

/// Distinct verbs of `actions`, sorted by label.
pub fn verb_terms(actions: &[Action], parse_underscore: bool) -> Vec<LabeledTerm> {
    distinct_terms(actions.iter().map(|a| a.verb.as_str()), |raw| {
        if parse_underscore {
            normalize_verb(raw)
        } else {
            raw.to_string()
        }
    })
}

/// Distinct objects of `actions`, sorted by label.
pub fn object_terms(actions: &[Action], parse_underscore: bool) -> Vec<LabeledTerm> {
    distinct_terms(actions.iter().map(|a| a.object.as_str()), |raw| {
        if parse_underscore {
            normalize_object(raw)
        } else {
            raw.to_string()
        }
    })
}

fn distinct_terms<'a>(
    raw: impl Iterator<Item = &'a str>,
    normalize: impl Fn(&str) -> String,
) -> Vec<LabeledTerm> {
    raw.collect::<BTreeSet<_>>()
        .into_iter()
        .map(|label| LabeledTerm {
            query: normalize(label),
            label: label.to_string(),
        })
        .collect()
}

/// Cartesian product of the distinct verbs and distinct objects in `actions`.
///
/// Enumeration order follows the sorted verb and object sets, not input order.
pub fn every_combination(actions: &[Action]) -> Vec<Action> {
    let verbs: BTreeSet<&str> = actions.iter().map(|a| a.verb.as_str()).collect();
    let objects: BTreeSet<&str> = actions.iter().map(|a| a.object.as_str()).collect();
    let mut out = Vec::with_capacity(verbs.len() * objects.len());
    for verb in &verbs {
        for object in &objects {
            out.push(Action::new(*verb, *object));
        }
    }
    out
}

/// Build the exact and fill-wildcard queries for a normalized action.
///
/// Only the verb head (first token) and object head (last token) get the
/// wildcard marker; marking every word makes the service return nothing.
pub fn querify(action: &Action) -> Result<QueryPair, QueryError> {
    let mut verb_tokens = action.verb.split_whitespace();
    let verb_head = verb_tokens
        .next()
        .ok_or_else(|| QueryError::EmptyVerb(action.to_string()))?;
    let mut verb_segment = vec![marked(verb_head)];
    verb_segment.extend(verb_tokens.map(str::to_string));

    let mut object_tokens: Vec<&str> = action.object.split_whitespace().collect();
    let object_head = object_tokens
        .pop()
        .ok_or_else(|| QueryError::EmptyObject(action.to_string()))?;
    let mut object_segment: Vec<String> = object_tokens.into_iter().map(str::to_string).collect();
    object_segment.push(marked(object_head));

    let verb_part = verb_segment.join(SEPARATOR);
    let object_part = object_segment.join(SEPARATOR);
    Ok(QueryPair {
        exact: format!("{verb_part}{SEPARATOR}{object_part}"),
        fill: format!("{verb_part}{SEPARATOR}{FILL_WILDCARD}{SEPARATOR}{object_part}"),
    })
}

/// Wildcard-mark every token of a standalone term.
pub fn querify_simple(term: &str) -> Result<String, QueryError> {
    let tokens: Vec<String> = term.split_whitespace().map(marked).collect();
    if tokens.is_empty() {
        return Err(QueryError::EmptyTerm);
    }
    Ok(tokens.join(SEPARATOR))
}

fn marked(token: &str) -> String {
    format!("{token}{WILDCARD_MARKER}")
}
