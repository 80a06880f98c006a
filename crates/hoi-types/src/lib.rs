//! Shared value types for verb-object interaction frequency tables.
//!
//! An [`Action`] is a `(verb phrase, object phrase)` pair such as
//! `("look at", "dining table")`. Both frequency sources (the ground-truth
//! dataset and the n-gram corpus) key their rows by the canonical
//! [`InteractionKey`] `"verb,object"`, and the reconciled output is a list of
//! [`MergedRow`]s.
//!
//! ```rust
//! use hoi_types::{Action, Rarity, parse_action_line};
//!
//! let action = parse_action_line(" ride , bicycle ", 1).unwrap();
//! assert_eq!(action, Action::new("ride", "bicycle"));
//! assert_eq!(action.key().as_str(), "ride,bicycle");
//! assert_eq!(Rarity::from_code(-1), Some(Rarity::Absent));
//! ```

use std::fmt;

use thiserror::Error;

/// Ordered `(verb phrase, object phrase)` pair.
///
/// The first token of the verb phrase is its head, any further tokens are a
/// trailing preposition. The last token of the object phrase is its head,
/// anything before it is a modifier sequence.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Action {
    pub verb: String,
    pub object: String,
}

impl Action {
    pub fn new(verb: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            object: object.into(),
        }
    }

    pub fn key(&self) -> InteractionKey {
        InteractionKey::new(&self.verb, &self.object)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.verb, self.object)
    }
}

/// Canonical `"verb,object"` join key shared by every frequency table.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct InteractionKey(String);

impl InteractionKey {
    pub fn new(verb: &str, object: &str) -> Self {
        Self(format!("{verb},{object}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InteractionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ground-truth rarity label of an interaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Rarity {
    /// The interaction does not occur in the ground-truth dataset.
    Absent,
    Common,
    Rare,
}

impl Rarity {
    /// Parse the integer code used in the `IsRare` CSV columns.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(Rarity::Absent),
            0 => Some(Rarity::Common),
            1 => Some(Rarity::Rare),
            _ => None,
        }
    }

    /// Emit the integer code used in the `IsRare` CSV columns.
    pub fn code(self) -> i8 {
        match self {
            Rarity::Absent => -1,
            Rarity::Common => 0,
            Rarity::Rare => 1,
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rarity::Absent => "not in ground truth",
            Rarity::Common => "not rare",
            Rarity::Rare => "rare",
        })
    }
}

/// Corpus frequency estimate for one action, reported under its original label.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FrequencyRecord {
    pub label: Action,
    pub frequency: u64,
}

impl FrequencyRecord {
    /// The `verb,object,frequency` line written to interaction tables.
    pub fn to_line(&self) -> String {
        format!("{},{}", self.label, self.frequency)
    }
}

/// Frequency of a single verb or object term.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TermFrequency {
    pub term: String,
    pub frequency: u64,
}

/// One interaction row of the ground-truth dataset.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroundTruthInteraction {
    pub verb: String,
    pub object: String,
    pub frequency: u64,
    pub rarity: Rarity,
}

impl GroundTruthInteraction {
    pub fn key(&self) -> InteractionKey {
        InteractionKey::new(&self.verb, &self.object)
    }
}

/// Interaction, verb and object frequencies reported by one source.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SourceFrequencies {
    pub interaction: u64,
    pub verb: u64,
    pub object: u64,
}

/// Reconciled row joining the corpus and ground-truth sources on one key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MergedRow {
    pub key: InteractionKey,
    pub verb: String,
    pub object: String,
    pub corpus: SourceFrequencies,
    pub ground_truth: SourceFrequencies,
    pub rarity: Rarity,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum InputFormatError {
    #[error("line {line}: expected `verb,object`, got {raw:?}")]
    MissingField { line: usize, raw: String },
    #[error("line {line}: empty verb or object in {raw:?}")]
    EmptyField { line: usize, raw: String },
}

/// Parse one `verb,object` line. Fields past the second are ignored.
///
/// `line` is the 1-based line number used in error messages.
pub fn parse_action_line(raw: &str, line: usize) -> Result<Action, InputFormatError> {
    let mut fields = raw.trim().split(',');
    let (Some(verb), Some(object)) = (fields.next(), fields.next()) else {
        return Err(InputFormatError::MissingField {
            line,
            raw: raw.to_string(),
        });
    };
    let (verb, object) = (verb.trim(), object.trim());
    if verb.is_empty() || object.is_empty() {
        return Err(InputFormatError::EmptyField {
            line,
            raw: raw.to_string(),
        });
    }
    Ok(Action::new(verb, object))
}

/// Parse a plain-text action list, one `verb,object` pair per line.
///
/// Blank lines are skipped. With `skip_header` the first line is dropped
/// unparsed.
pub fn parse_action_list(text: &str, skip_header: bool) -> Result<Vec<Action>, InputFormatError> {
    let mut actions = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        if skip_header && idx == 0 {
            continue;
        }
        if raw.trim().is_empty() {
            continue;
        }
        actions.push(parse_action_line(raw, idx + 1)?);
    }
    Ok(actions)
}
