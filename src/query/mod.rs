//! Query façade
//!
//! Translates predicates into executable, engine-agnostic query objects.
//!
//! # Execution order (performed by the store)
//!
//! 1. Pick candidate rows (index prefix or full scan)
//! 2. Filter strictly according to conditions
//! 3. Apply ordering (if specified)
//! 4. Apply limit

mod builder;
mod condition;
mod sorter;

pub use builder::{Query, SortDirection, SortSpec};
pub use condition::{matches_all, Condition};
pub use sorter::RowSorter;
