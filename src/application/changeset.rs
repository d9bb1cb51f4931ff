//! Sparse column updates built from patch structs.

use crate::domain::patch::Patch;

use super::persistence::{Params, Value};

/// Columns explicitly set by a partial update, in declaration order.
///
/// Only `Patch::Set` fields enter the set; an empty change set means the
/// update must not touch the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<(&'static str, Value)>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `column` when the patch carries a value.
    pub fn field<T: Into<Value>>(mut self, column: &'static str, patch: Patch<T>) -> Self {
        if let Patch::Set(value) = patch {
            self.changes.push((column, value.into()));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.changes.iter().map(|(column, _)| *column)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.changes
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    /// `UPDATE <table> SET <changed columns> WHERE id = :id` plus its parameters.
    pub fn update_statement(&self, table: &str, id: i64) -> (String, Params) {
        let assignments = self
            .changes
            .iter()
            .map(|(column, _)| format!("{column} = :{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!("UPDATE {table} SET {assignments} WHERE id = :id");

        let mut params = Params::new();
        for (column, value) in &self.changes {
            params.insert(*column, value.clone());
        }
        params.insert("id", id);

        (query, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_are_skipped() {
        let changes = ChangeSet::new()
            .field("stars", Patch::Set(5_i64))
            .field("demons", Patch::<i64>::Unset)
            .field("username", Patch::<String>::Unset);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes.columns().collect::<Vec<_>>(), ["stars"]);
    }

    #[test]
    fn all_unset_is_empty() {
        let changes = ChangeSet::new()
            .field("stars", Patch::<i64>::Unset)
            .field("glow", Patch::<bool>::Unset);
        assert!(changes.is_empty());
    }

    #[test]
    fn clearing_a_nullable_column_writes_null() {
        let changes = ChangeSet::new().field("twitter_name", Patch::Set(Option::<String>::None));
        assert_eq!(changes.get("twitter_name"), Some(&Value::Null));
    }

    #[test]
    fn update_statement_lists_only_changed_columns() {
        let changes = ChangeSet::new()
            .field("stars", Patch::Set(5_i64))
            .field("glow", Patch::Set(true));

        let (query, params) = changes.update_statement("users", 42);

        assert_eq!(
            query,
            "UPDATE users SET stars = :stars, glow = :glow WHERE id = :id"
        );
        assert_eq!(params.get("stars"), Some(&Value::Int(5)));
        assert_eq!(params.get("glow"), Some(&Value::Bool(true)));
        assert_eq!(params.get("id"), Some(&Value::Int(42)));
    }
}
