//! Expansion of term groups into search queries.

use crate::config::ExpansionMode;
use crate::models::{Query, TermGroup};

/// Turns ordered term groups into the queries sent to a publisher
#[derive(Debug, Clone)]
pub struct QueryExpander {
    groups: Vec<TermGroup>,
}

impl QueryExpander {
    pub fn new(groups: Vec<TermGroup>) -> Self {
        Self { groups }
    }

    /// Every combination of one term per group, each rendered as a
    /// conjunction of quoted terms.
    ///
    /// The first group varies slowest. Nothing is skipped, so the count is
    /// the product of the group sizes; no groups means no queries.
    pub fn expand(&self) -> Vec<Query> {
        if self.groups.is_empty() || self.groups.iter().any(TermGroup::is_empty) {
            return Vec::new();
        }

        let mut queries = Vec::with_capacity(self.len());
        let mut indices = vec![0usize; self.groups.len()];
        loop {
            let terms: Vec<&str> = indices
                .iter()
                .zip(&self.groups)
                .map(|(&i, group)| group.terms[i].as_str())
                .collect();
            queries.push(Query::conjunction(&terms));

            // Odometer step: advance the last group, carrying leftwards
            let mut position = self.groups.len();
            loop {
                if position == 0 {
                    return queries;
                }
                position -= 1;
                indices[position] += 1;
                if indices[position] < self.groups[position].len() {
                    break;
                }
                indices[position] = 0;
            }
        }
    }

    /// A single query OR-ing the terms of each group and AND-ing the groups
    pub fn combined(&self) -> Vec<Query> {
        if self.groups.is_empty() {
            return Vec::new();
        }
        vec![Query::of_groups(&self.groups)]
    }

    pub fn expand_with(&self, mode: ExpansionMode) -> Vec<Query> {
        match mode {
            ExpansionMode::CrossProduct => self.expand(),
            ExpansionMode::Combined => self.combined(),
        }
    }

    /// Number of queries [`expand`](Self::expand) yields
    pub fn len(&self) -> usize {
        if self.groups.is_empty() {
            return 0;
        }
        self.groups.iter().map(TermGroup::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
