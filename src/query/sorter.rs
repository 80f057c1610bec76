//! Result ordering
//!
//! Sort is stable: rows that compare equal keep their storage order.

use std::cmp::Ordering;

use serde_json::Value;

use super::builder::{SortDirection, SortSpec};
use crate::store::Row;

/// Sorts result rows
pub struct RowSorter;

impl RowSorter {
    /// Sorts rows by the given terms, earlier terms first.
    pub fn sort(rows: &mut [Row], order: &[SortSpec]) {
        if order.is_empty() {
            return;
        }
        rows.sort_by(|a, b| {
            for spec in order {
                let ordering = Self::compare_values(a.get(&spec.column), b.get(&spec.column));
                let ordering = match spec.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    /// Compares two JSON values for sorting.
    ///
    /// Ordering rules:
    /// - missing = null < bool < number < string
    /// - For same types, natural ordering
    pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
        let a = a.unwrap_or(&Value::Null);
        let b = b.unwrap_or(&Value::Null);

        let type_order = |v: &Value| -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Number(_) => 2,
                Value::String(_) => 3,
                Value::Array(_) => 4,
                Value::Object(_) => 5,
            }
        };

        let by_type = type_order(a).cmp(&type_order(b));
        if by_type != Ordering::Equal {
            return by_type;
        }

        match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
                (Some(xi), Some(yi)) => xi.cmp(&yi),
                _ => {
                    let xf = x.as_f64().unwrap_or(0.0);
                    let yf = y.as_f64().unwrap_or(0.0);
                    xf.partial_cmp(&yf).unwrap_or(Ordering::Equal)
                }
            },
            (Value::String(x), Value::String(y)) => x.cmp(y),
            _ => Ordering::Equal,
        }
    }
}
