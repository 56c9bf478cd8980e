//! Index values and query filters

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

/// A value stored in the index table for one record field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexValue {
    String(String),
    Int(i64),
    Bool(bool),
}

impl IndexValue {
    /// Name of the `record_indexes` column holding this kind of value
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::String(_) => "value_string",
            Self::Int(_) => "value_int",
            Self::Bool(_) => "value_bool",
        }
    }

    pub(crate) fn to_sql_value(&self) -> Value {
        match self {
            Self::String(s) => Value::Text(s.clone()),
            Self::Int(i) => Value::Integer(*i),
            Self::Bool(b) => Value::Integer(i64::from(*b)),
        }
    }
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for IndexValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Comparison applied by a [`Filter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Field is absent from the record's index
    IsNull,
    /// Field is present in the record's index
    NotNull,
}

impl FilterOp {
    fn sql_operator(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::IsNull | Self::NotNull => "",
        }
    }
}

/// A single condition on an indexed field
///
/// Multiple filters passed together are combined with AND.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<IndexValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<IndexValue>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        // value is ignored for null checks
        Self::new(field, FilterOp::IsNull, false)
    }

    pub fn not_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOp::NotNull, false)
    }

    /// Render this filter as a SQL condition on the `r` (records) alias,
    /// pushing its bound parameters onto `params`.
    pub(crate) fn to_sql(&self, params: &mut Vec<Value>) -> String {
        params.push(Value::Text(self.field.clone()));
        let lookup = "SELECT 1 FROM record_indexes i \
                      WHERE i.collection = r.collection AND i.id = r.id AND i.field = ?";
        match self.op {
            FilterOp::IsNull => format!("NOT EXISTS ({})", lookup),
            FilterOp::NotNull => format!("EXISTS ({})", lookup),
            op => {
                params.push(self.value.to_sql_value());
                format!(
                    "EXISTS ({} AND i.{} {} ?)",
                    lookup,
                    self.value.column(),
                    op.sql_operator()
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_filter_binds_field_and_value() {
        let mut params = Vec::new();
        let sql = Filter::eq("status", "waiting").to_sql(&mut params);
        assert!(sql.starts_with("EXISTS"));
        assert!(sql.contains("i.value_string = ?"));
        assert_eq!(params.len(), 2);
        assert_eq!(params[1], Value::Text("waiting".to_string()));
    }

    #[test]
    fn test_is_null_filter_binds_only_field() {
        let mut params = Vec::new();
        let sql = Filter::is_null("completed_at").to_sql(&mut params);
        assert!(sql.starts_with("NOT EXISTS"));
        assert_eq!(params, vec![Value::Text("completed_at".to_string())]);
    }

    #[test]
    fn test_int_comparison_uses_int_column() {
        let mut params = Vec::new();
        let sql = Filter::new("run_at", FilterOp::Le, 42i64).to_sql(&mut params);
        assert!(sql.contains("i.value_int <= ?"));
        assert_eq!(params[1], Value::Integer(42));
    }
}
