// Varseal - Entity mapping registry
//
// Explicit table of entity type -> table descriptor. The executor refuses to
// touch any entity type that has not been registered here.

use std::any::{type_name, TypeId};
use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::Row;

use super::hooks::Lifecycle;
use super::StoreError;

/// Table descriptor for one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableMapping {
    pub table: &'static str,
    pub key_column: &'static str,
    pub auto_increment: bool,
    /// Rows carry a `sig` column and must go through the signing path.
    pub signed: bool,
}

impl TableMapping {
    pub const fn new(table: &'static str, key_column: &'static str) -> Self {
        Self {
            table,
            key_column,
            auto_increment: true,
            signed: false,
        }
    }

    pub const fn signed(mut self) -> Self {
        self.signed = true;
        self
    }
}

/// A row type the executor can write and read.
///
/// `COLUMNS` lists the plain columns written by the executor, key excluded.
/// Columns managed by hooks (sealed values, documents) are not listed.
pub trait Entity: Lifecycle + Sized + 'static {
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);

    /// Values for `COLUMNS`, in the same order.
    fn values(&self) -> Vec<Value>;

    /// Build from a row laid out as `key, COLUMNS...`.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// Entity type -> table registration.
#[derive(Debug, Default)]
pub struct Registry {
    tables: HashMap<TypeId, TableMapping>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E: Entity>(&mut self, mapping: TableMapping) -> &mut Self {
        tracing::debug!(entity = type_name::<E>(), table = mapping.table, "Entity registered");
        self.tables.insert(TypeId::of::<E>(), mapping);
        self
    }

    pub fn mapping<E: Entity>(&self) -> Result<TableMapping, StoreError> {
        self.tables
            .get(&TypeId::of::<E>())
            .copied()
            .ok_or(StoreError::Unregistered(type_name::<E>()))
    }

    pub fn is_registered<E: Entity>(&self) -> bool {
        self.tables.contains_key(&TypeId::of::<E>())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Column list for a select: key first, then the entity columns, then `sig`
/// for signed tables.
pub(crate) fn select_columns<E: Entity>(mapping: &TableMapping) -> String {
    let mut columns = vec![mapping.key_column];
    columns.extend_from_slice(E::COLUMNS);
    if mapping.signed {
        columns.push("sig");
    }
    columns.join(", ")
}

pub(crate) fn insert_sql<E: Entity>(mapping: &TableMapping) -> String {
    let mut columns: Vec<&str> = Vec::new();
    if !mapping.auto_increment {
        columns.push(mapping.key_column);
    }
    columns.extend_from_slice(E::COLUMNS);
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        mapping.table,
        columns.join(", "),
        placeholders.join(", ")
    )
}

pub(crate) fn update_sql<E: Entity>(mapping: &TableMapping) -> String {
    let assignments: Vec<String> = E::COLUMNS
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ?{}", c, i + 1))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        mapping.table,
        assignments.join(", "),
        mapping.key_column,
        E::COLUMNS.len() + 1
    )
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::entities::{self, DbLabel, DbProjectVariable};

    #[test]
    fn test_select_columns_appends_sig_for_signed_tables() {
        assert_eq!(
            select_columns::<DbProjectVariable>(&entities::VARIABLE_TABLE),
            "id, project_id, var_name, var_value, var_type, sig"
        );
        assert_eq!(
            select_columns::<DbLabel>(&entities::LABEL_TABLE),
            "id, project_id, name, color"
        );
    }

    #[test]
    fn test_insert_sql_skips_auto_increment_key() {
        assert_eq!(
            insert_sql::<DbLabel>(&entities::LABEL_TABLE),
            "INSERT INTO project_label (project_id, name, color) VALUES (?1, ?2, ?3)"
        );

        let mut manual = entities::LABEL_TABLE;
        manual.auto_increment = false;
        assert_eq!(
            insert_sql::<DbLabel>(&manual),
            "INSERT INTO project_label (id, project_id, name, color) VALUES (?1, ?2, ?3, ?4)"
        );
    }

    #[test]
    fn test_update_sql_binds_key_last() {
        assert_eq!(
            update_sql::<DbLabel>(&entities::LABEL_TABLE),
            "UPDATE project_label SET project_id = ?1, name = ?2, color = ?3 WHERE id = ?4"
        );
    }

    #[test]
    fn test_registry_lookup() {
        let registry = entities::registry();
        assert_eq!(registry.len(), 5);
        assert!(registry.is_registered::<DbLabel>());
        assert!(registry.mapping::<DbProjectVariable>().unwrap().signed);

        let empty = Registry::new();
        assert!(empty.is_empty());
        assert!(matches!(
            empty.mapping::<DbLabel>(),
            Err(StoreError::Unregistered(_))
        ));
    }
}
