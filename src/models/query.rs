//! Boolean search queries built from term groups.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named list of alternative search terms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermGroup {
    /// Label used in logs and configuration
    #[serde(default)]
    pub name: String,

    /// Alternative phrasings; any one of them may match
    pub terms: Vec<String>,
}

impl TermGroup {
    pub fn new(name: impl Into<String>, terms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            terms: terms.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// An immutable boolean search expression
///
/// Two queries are the same query exactly when their rendered strings match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(String);

impl Query {
    /// Conjunction of single quoted terms: `"a" AND "b"`
    pub fn conjunction<S: AsRef<str>>(terms: &[S]) -> Self {
        Self(
            terms
                .iter()
                .map(|t| quote(t.as_ref()))
                .collect::<Vec<_>>()
                .join(" AND "),
        )
    }

    /// Conjunction of OR-groups: `("a" OR "b") AND ("c" OR "d")`
    pub fn of_groups(groups: &[TermGroup]) -> Self {
        Self(
            groups
                .iter()
                .map(|g| {
                    let alternatives = g
                        .terms
                        .iter()
                        .map(|t| quote(t))
                        .collect::<Vec<_>>()
                        .join(" OR ");
                    format!("({})", alternatives)
                })
                .collect::<Vec<_>>()
                .join(" AND "),
        )
    }

    /// Use an already rendered expression verbatim
    pub fn raw(expression: impl Into<String>) -> Self {
        Self(expression.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn quote(term: &str) -> String {
    format!("\"{}\"", term.trim())
}
