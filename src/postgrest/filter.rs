//! Filter operators understood by PostgREST

use std::fmt;

/// Operator for filter expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equal to
    Eq,

    /// Less than
    Lt,

    /// Is (`null`, `true`, `false`)
    Is,
}

impl FilterOperator {
    /// Convert the operator to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Lt => "lt",
            FilterOperator::Is => "is",
        }
    }

    /// Render `<op>.<value>` as used in a query string
    pub fn apply<T: fmt::Display>(&self, value: T) -> String {
        format!("{}.{}", self.as_str(), value)
    }
}

/// Sort direction for `order=` clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    /// Sort ascending
    pub ascending: bool,
    /// Put nulls after all other values
    pub nulls_last: bool,
}

impl Order {
    /// Descending with nulls last, matching how the client ranks rows locally.
    pub fn desc() -> Self {
        Self {
            ascending: false,
            nulls_last: true,
        }
    }

    pub(crate) fn render(&self, column: &str) -> String {
        let direction = if self.ascending { "asc" } else { "desc" };
        let nulls = if self.nulls_last { "nullslast" } else { "nullsfirst" };
        format!("{}.{}.{}", column, direction, nulls)
    }
}
