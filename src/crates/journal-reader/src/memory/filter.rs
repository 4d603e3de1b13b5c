//! Match expressions of the in-memory store.
//!
//! Matches accumulate exactly like they do in a native journal: equal fields
//! inside one group are alternatives, different fields must all hold, and
//! conjunction/disjunction markers fold the pending group into the expression
//! built so far.

use super::StoredEntry;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum FilterExpr {
    Match(Vec<u8>),
    Conjunction(Vec<FilterExpr>),
    Disjunction(Vec<FilterExpr>),
}

impl FilterExpr {
    pub(crate) fn matches(&self, entry: &StoredEntry) -> bool {
        match self {
            FilterExpr::Match(data) => entry.fields.iter().any(|field| field == data),
            FilterExpr::Conjunction(exprs) => exprs.iter().all(|e| e.matches(entry)),
            FilterExpr::Disjunction(exprs) => exprs.iter().any(|e| e.matches(entry)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    Conjunction,
    Disjunction,
}

#[derive(Debug, Clone)]
pub(crate) struct MatchFilter {
    filter_expr: Option<FilterExpr>,
    current_matches: Vec<Vec<u8>>,
    current_op: LogicalOp,
}

impl Default for MatchFilter {
    fn default() -> Self {
        Self {
            filter_expr: None,
            current_matches: Vec::new(),
            current_op: LogicalOp::Conjunction,
        }
    }
}

fn extract_key(kv_pair: &[u8]) -> &[u8] {
    match kv_pair.iter().position(|&b| b == b'=') {
        Some(pos) => &kv_pair[..pos],
        None => kv_pair,
    }
}

/// Whether `name` may be used as a field name in a match.
///
/// Upper-case letters, digits and underscores, at most 64 bytes, not starting
/// with a digit. A leading underscore marks a trusted field and is allowed.
pub(crate) fn is_valid_field_name(name: &[u8]) -> bool {
    if name.is_empty() || name.len() > 64 || name[0].is_ascii_digit() {
        return false;
    }

    name.iter()
        .all(|&b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
}

impl MatchFilter {
    /// Group pending matches by key; equal keys become a disjunction.
    fn pending_expr(&self) -> Option<FilterExpr> {
        if self.current_matches.is_empty() {
            return None;
        }

        let mut elements = Vec::new();
        for group in self
            .current_matches
            .chunk_by(|a, b| extract_key(a) == extract_key(b))
        {
            if group.len() > 1 {
                let alternatives = group.iter().cloned().map(FilterExpr::Match).collect();
                elements.push(FilterExpr::Disjunction(alternatives));
            } else {
                elements.push(FilterExpr::Match(group[0].clone()));
            }
        }

        if elements.len() == 1 {
            elements.pop()
        } else {
            Some(FilterExpr::Conjunction(elements))
        }
    }

    fn combine(current: FilterExpr, op: LogicalOp, new_expr: FilterExpr) -> FilterExpr {
        match (current, op) {
            (FilterExpr::Disjunction(mut exprs), LogicalOp::Disjunction) => {
                exprs.push(new_expr);
                FilterExpr::Disjunction(exprs)
            }
            (FilterExpr::Conjunction(mut exprs), LogicalOp::Conjunction) => {
                exprs.push(new_expr);
                FilterExpr::Conjunction(exprs)
            }
            (current, LogicalOp::Disjunction) => FilterExpr::Disjunction(vec![current, new_expr]),
            (current, LogicalOp::Conjunction) => FilterExpr::Conjunction(vec![current, new_expr]),
        }
    }

    pub(crate) fn add_match(&mut self, kv_pair: &[u8]) {
        let new_key = extract_key(kv_pair);
        let pos = self
            .current_matches
            .binary_search_by(|item| extract_key(item).cmp(new_key))
            .unwrap_or_else(|e| e);
        self.current_matches.insert(pos, kv_pair.to_vec());
    }

    pub(crate) fn set_operation(&mut self, op: LogicalOp) {
        let Some(new_expr) = self.pending_expr() else {
            self.current_op = op;
            return;
        };
        self.current_matches.clear();

        self.filter_expr = Some(match self.filter_expr.take() {
            None => new_expr,
            Some(current) => Self::combine(current, self.current_op, new_expr),
        });
        self.current_op = op;
    }

    /// The expression described by every match added so far, pending group
    /// included. `None` matches everything.
    pub(crate) fn expression(&self) -> Option<FilterExpr> {
        match (self.filter_expr.clone(), self.pending_expr()) {
            (None, pending) => pending,
            (Some(current), None) => Some(current),
            (Some(current), Some(pending)) => {
                Some(Self::combine(current, self.current_op, pending))
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}
