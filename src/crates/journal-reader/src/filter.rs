//! Match expressions pushed into the backend.
//!
//! The backend evaluates a sum of products: matches on the same field inside
//! one group are alternatives, matches on different fields all have to hold,
//! and a disjunction starts a new group. The engine keeps its own log of every
//! term it pushed so the expression can be replayed after a reopen.

use crate::backend::Backend;
use crate::error::{check, Result};
use crate::journal::Journal;
use std::fmt;
use tracing::debug;

/// One element of the expression, in the order it was pushed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterTerm {
    Match { field: String, value: String },
    Conjunction,
    Disjunction,
}

impl FilterTerm {
    /// A match term with the field name in canonical upper case.
    pub fn matching(field: &str, value: impl fmt::Display) -> Self {
        FilterTerm::Match {
            field: field.to_ascii_uppercase(),
            value: value.to_string(),
        }
    }
}

impl fmt::Display for FilterTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterTerm::Match { field, value } => write!(f, "{}={}", field, value),
            FilterTerm::Conjunction => f.write_str("AND"),
            FilterTerm::Disjunction => f.write_str("OR"),
        }
    }
}

/// Conjunctive group of matches.
///
/// Fields are ANDed; the values given for one field are alternatives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchGroup {
    fields: Vec<(String, Vec<String>)>,
}

impl MatchGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`.
    pub fn with(self, field: &str, value: impl fmt::Display) -> Self {
        self.with_any(field, [value])
    }

    /// Require `field` to equal one of `values`.
    pub fn with_any<I>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        let values = values.into_iter().map(|v| v.to_string());
        match self.fields.iter_mut().find(|(f, _)| f == field) {
            Some((_, existing)) => existing.extend(values),
            None => self.fields.push((field.to_string(), values.collect())),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(|(_, values)| values.is_empty())
    }

    /// The match terms of this group.
    pub fn terms(&self) -> impl Iterator<Item = FilterTerm> + '_ {
        self.fields
            .iter()
            .flat_map(|(field, values)| values.iter().map(|v| FilterTerm::matching(field, v)))
    }
}

impl<B: Backend> Journal<B> {
    /// Push one term into the backend and record it.
    fn push_term(&mut self, term: FilterTerm) -> Result<()> {
        self.ensure_open()?;
        apply_term(&mut self.backend, &term)?;
        debug!(%term, "added filter term");
        self.filters.push(term);
        Ok(())
    }

    /// Restrict reads to entries where `field` equals `value`.
    pub fn add_match(&mut self, field: &str, value: impl fmt::Display) -> Result<()> {
        self.push_term(FilterTerm::matching(field, value))
    }

    /// AND the terms that follow with the ones before.
    pub fn add_conjunction(&mut self) -> Result<()> {
        self.push_term(FilterTerm::Conjunction)
    }

    /// Start a new OR-group.
    pub fn add_disjunction(&mut self) -> Result<()> {
        self.push_term(FilterTerm::Disjunction)
    }

    /// Drop every match; reads see all entries again.
    pub fn clear_filters(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.backend.flush_matches();
        self.filters.clear();
        Ok(())
    }

    /// Add the matches of one group to the current expression.
    pub fn add_filters(&mut self, group: &MatchGroup) -> Result<()> {
        for term in group.terms() {
            self.push_term(term)?;
        }
        Ok(())
    }

    /// Replace the expression with the disjunction of `groups`.
    pub fn filter<'a, I>(&mut self, groups: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a MatchGroup>,
    {
        self.clear_filters()?;
        for (i, group) in groups.into_iter().enumerate() {
            if i > 0 {
                self.add_disjunction()?;
            }
            self.add_filters(group)?;
        }
        Ok(())
    }

    /// Every term pushed since the last clear, in order.
    pub fn filters(&self) -> &[FilterTerm] {
        &self.filters
    }
}

/// Push a term into a backend without recording it.
pub(crate) fn apply_term<B: Backend>(backend: &mut B, term: &FilterTerm) -> Result<()> {
    let rc = match term {
        FilterTerm::Match { .. } => backend.add_match(term.to_string().as_bytes()),
        FilterTerm::Conjunction => backend.add_conjunction(),
        FilterTerm::Disjunction => backend.add_disjunction(),
    };
    check(rc).map(drop)
}
