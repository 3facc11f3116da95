//! Query values consumed by repositories and fed into cache keys.

mod canonical;
mod error;
mod expr;
mod types;

pub use canonical::{canonical_expr, canonical_value};
pub use error::{PredicateError, Result};
pub use expr::{compare_values, lookup, BinaryOp, Expr, ValueFn};
pub use types::{
    canonical_predicate, Command, CommandParam, Query, SortDirection, SortField, SortSpec,
};
