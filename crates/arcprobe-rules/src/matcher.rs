//! Version range matching
//!
//! A range expression is a comma-separated conjunction of clauses such as
//! `>=2.0.6,<=2.0.7.2`. Every clause must hold for the expression to match. A
//! malformed clause is logged and makes the whole expression fail closed.

use crate::error::ClauseError;
use crate::model::VersionEntry;
use crate::version::{parse_date, Version};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// How a family's versions are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMode {
    /// Version strings, PEP 440 ordering
    #[default]
    Semantic,
    /// Build dates
    Date,
}

impl fmt::Display for CompareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Semantic => write!(f, "semantic"),
            Self::Date => write!(f, "date"),
        }
    }
}

/// A value that can be ordered within its comparison mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparableValue {
    Version(Version),
    Date(NaiveDateTime),
}

impl ComparableValue {
    fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Version(a), Self::Version(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Comparison operator of a clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    LessOrEqual,
    GreaterOrEqual,
    NotEqual,
    Greater,
    Less,
    Equal,
}

impl Operator {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "<=" => Some(Self::LessOrEqual),
            ">=" => Some(Self::GreaterOrEqual),
            "!=" => Some(Self::NotEqual),
            ">" => Some(Self::Greater),
            "<" => Some(Self::Less),
            "=" => Some(Self::Equal),
            _ => None,
        }
    }

    /// Apply the operator to `current.cmp(bound)`
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::LessOrEqual => ordering != Ordering::Greater,
            Self::GreaterOrEqual => ordering != Ordering::Less,
            Self::NotEqual => ordering != Ordering::Equal,
            Self::Greater => ordering == Ordering::Greater,
            Self::Less => ordering == Ordering::Less,
            Self::Equal => ordering == Ordering::Equal,
        }
    }
}

/// A single `<op><value>` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub operator: Operator,
    pub value: String,
}

impl Clause {
    /// Split a trimmed clause into operator and value
    ///
    /// The operator is two characters when the second character is `=`.
    pub fn parse(clause: &str) -> Result<Self, ClauseError> {
        let clause = clause.trim();
        if clause.is_empty() {
            return Err(ClauseError::Empty);
        }

        let mut chars = clause.char_indices().skip(1);
        let split = match chars.next() {
            Some((i, '=')) => i + 1,
            Some((i, _)) => i,
            None => clause.len(),
        };
        let (symbol, value) = clause.split_at(split);
        let value = value.trim();

        if value.is_empty() {
            return Err(ClauseError::MissingValue(clause.to_string()));
        }
        let operator =
            Operator::from_symbol(symbol).ok_or_else(|| ClauseError::UnknownOperator {
                operator: symbol.to_string(),
                clause: clause.to_string(),
            })?;

        Ok(Self {
            operator,
            value: value.to_string(),
        })
    }
}

/// Parse a version or date in the given mode
pub fn parse(value: &str, mode: CompareMode) -> Option<ComparableValue> {
    match mode {
        CompareMode::Semantic => Version::parse(value).map(ComparableValue::Version),
        CompareMode::Date => parse_date(value).map(ComparableValue::Date),
    }
}

fn clause_holds(
    current: &ComparableValue,
    clause: &str,
    mode: CompareMode,
) -> Result<bool, ClauseError> {
    let clause = Clause::parse(clause)?;
    let bound =
        parse(&clause.value, mode).ok_or_else(|| ClauseError::UnparseableValue(clause.value.clone()))?;
    Ok(current
        .compare(&bound)
        .is_some_and(|ordering| clause.operator.holds(ordering)))
}

/// Check a single clause
///
/// False when either side does not parse.
pub fn satisfies(current: &str, clause: &str, mode: CompareMode) -> bool {
    let Some(current) = parse(current, mode) else {
        return false;
    };
    match clause_holds(&current, clause, mode) {
        Ok(holds) => holds,
        Err(e) => {
            tracing::error!("{}", e);
            false
        }
    }
}

/// Check every clause of a comma-separated range expression
pub fn satisfies_all(current: &str, expression: &str, mode: CompareMode) -> bool {
    let Some(current) = parse(current, mode) else {
        tracing::debug!("Could not parse '{}' as a {} value", current, mode);
        return false;
    };

    for clause in expression.split(',') {
        match clause_holds(&current, clause, mode) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                tracing::error!("Invalid range expression '{}': {}", expression, e);
                return false;
            }
        }
    }
    true
}

/// Find the first entry whose range expression is satisfied
pub fn select<'a>(
    current: &str,
    entries: &'a [VersionEntry],
    mode: CompareMode,
) -> Option<(usize, &'a VersionEntry)> {
    entries
        .iter()
        .enumerate()
        .find(|(_, entry)| satisfies_all(current, &entry.version, mode))
}
