// Varseal - Storage executor
//
// Generic insert/update/select/delete over registered entities. Each
// operation runs the matching lifecycle hooks exactly once, on the same
// connection, and signed tables get their `sig` column recomputed on every
// write and checked on every read.

use rusqlite::{params, params_from_iter, Connection, ToSql};

use crate::crypto::{Canonical, KeyMaterial};

use super::hooks::{HookContext, HookOptions};
use super::mapping::{insert_sql, select_columns, update_sql, Entity, Registry, TableMapping};
use super::StoreError;

pub struct Executor<'a> {
    conn: &'a Connection,
    keys: &'a KeyMaterial,
    registry: &'a Registry,
    options: HookOptions,
}

impl<'a> Executor<'a> {
    pub fn new(
        conn: &'a Connection,
        keys: &'a KeyMaterial,
        registry: &'a Registry,
        options: HookOptions,
    ) -> Self {
        Self {
            conn,
            keys,
            registry,
            options,
        }
    }

    fn ctx(&self) -> HookContext<'a> {
        HookContext {
            conn: self.conn,
            keys: self.keys,
            options: self.options,
        }
    }

    fn unsigned_mapping<E: Entity>(&self) -> Result<TableMapping, StoreError> {
        let mapping = self.registry.mapping::<E>()?;
        if mapping.signed {
            return Err(StoreError::SignatureRequired(mapping.table));
        }
        Ok(mapping)
    }

    // ─── Writes ──────────────────────────────────────────────────────────────

    pub fn insert<E: Entity>(&self, entity: &mut E) -> Result<(), StoreError> {
        let mapping = self.unsigned_mapping::<E>()?;
        self.insert_row(&mapping, entity)
    }

    pub fn insert_signed<E: Entity + Canonical>(&self, entity: &mut E) -> Result<(), StoreError> {
        let mapping = self.registry.mapping::<E>()?;
        self.insert_row(&mapping, entity)?;
        self.sign(&mapping, entity)
    }

    pub fn update<E: Entity>(&self, entity: &mut E) -> Result<(), StoreError> {
        let mapping = self.unsigned_mapping::<E>()?;
        self.update_row(&mapping, entity)
    }

    pub fn update_signed<E: Entity + Canonical>(&self, entity: &mut E) -> Result<(), StoreError> {
        let mapping = self.registry.mapping::<E>()?;
        self.update_row(&mapping, entity)?;
        self.sign(&mapping, entity)
    }

    /// Delete by key. Returns true if a row was removed.
    pub fn delete<E: Entity>(&self, id: i64) -> Result<bool, StoreError> {
        let mapping = self.registry.mapping::<E>()?;
        let affected = self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1",
                mapping.table, mapping.key_column
            ),
            params![id],
        )?;
        Ok(affected > 0)
    }

    fn insert_row<E: Entity>(&self, mapping: &TableMapping, entity: &mut E) -> Result<(), StoreError> {
        let ctx = self.ctx();
        entity.pre_insert(&ctx)?;

        let mut values = Vec::with_capacity(E::COLUMNS.len() + 1);
        if !mapping.auto_increment {
            values.push(rusqlite::types::Value::Integer(entity.id()));
        }
        values.extend(entity.values());
        self.conn
            .execute(&insert_sql::<E>(mapping), params_from_iter(values))?;

        if mapping.auto_increment {
            entity.set_id(self.conn.last_insert_rowid());
        }

        entity.post_insert(&ctx)?;
        tracing::debug!(table = mapping.table, id = entity.id(), "Row inserted");
        Ok(())
    }

    fn update_row<E: Entity>(&self, mapping: &TableMapping, entity: &mut E) -> Result<(), StoreError> {
        let mut values = entity.values();
        values.push(rusqlite::types::Value::Integer(entity.id()));
        let affected = self
            .conn
            .execute(&update_sql::<E>(mapping), params_from_iter(values))?;
        if affected == 0 {
            return Err(StoreError::NotFound(format!(
                "{} row {}",
                mapping.table,
                entity.id()
            )));
        }

        entity.post_update(&self.ctx())?;
        tracing::debug!(table = mapping.table, id = entity.id(), "Row updated");
        Ok(())
    }

    fn sign<E: Entity + Canonical>(&self, mapping: &TableMapping, entity: &E) -> Result<(), StoreError> {
        let forms = entity.canonical_forms()?;
        let token = self.keys.signer.sign(&forms);
        self.conn.execute(
            &format!(
                "UPDATE {} SET sig = ?1 WHERE {} = ?2",
                mapping.table, mapping.key_column
            ),
            params![token, entity.id()],
        )?;
        Ok(())
    }

    // ─── Reads ───────────────────────────────────────────────────────────────

    pub fn get<E: Entity>(&self, id: i64) -> Result<Option<E>, StoreError> {
        let mapping = self.unsigned_mapping::<E>()?;
        let where_clause = format!("{} = ?1", mapping.key_column);
        let mut rows = self.select_rows::<E>(&mapping, &where_clause, params![id])?;
        match rows.pop() {
            Some((mut entity, _)) => {
                entity.post_get(&self.ctx())?;
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    pub fn get_signed<E: Entity + Canonical>(&self, id: i64) -> Result<Option<E>, StoreError> {
        let mapping = self.registry.mapping::<E>()?;
        let where_clause = format!("{} = ?1", mapping.key_column);
        let mut rows = self.select_rows::<E>(&mapping, &where_clause, params![id])?;
        match rows.pop() {
            Some((entity, sig)) => self.verify_and_load(&mapping, entity, sig).map(Some),
            None => Ok(None),
        }
    }

    /// Select every row matching `where_clause`, ordered by key.
    pub fn select<E: Entity>(
        &self,
        where_clause: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<E>, StoreError> {
        let mapping = self.unsigned_mapping::<E>()?;
        let ctx = self.ctx();
        self.select_rows::<E>(&mapping, where_clause, params)?
            .into_iter()
            .map(|(mut entity, _)| {
                entity.post_get(&ctx)?;
                Ok(entity)
            })
            .collect()
    }

    /// Like [`Executor::select`], verifying every row's signature first.
    pub fn select_signed<E: Entity + Canonical>(
        &self,
        where_clause: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<E>, StoreError> {
        let mapping = self.registry.mapping::<E>()?;
        self.select_rows::<E>(&mapping, where_clause, params)?
            .into_iter()
            .map(|(entity, sig)| self.verify_and_load(&mapping, entity, sig))
            .collect()
    }

    /// Every key in the entity's table.
    pub fn ids<E: Entity>(&self) -> Result<Vec<i64>, StoreError> {
        let mapping = self.registry.mapping::<E>()?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {key} FROM {} ORDER BY {key}",
            mapping.table,
            key = mapping.key_column
        ))?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    fn select_rows<E: Entity>(
        &self,
        mapping: &TableMapping,
        where_clause: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<(E, Option<String>)>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {}",
            select_columns::<E>(mapping),
            mapping.table,
            where_clause,
            mapping.key_column
        );
        let sig_index = E::COLUMNS.len() + 1;
        let signed = mapping.signed;

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, |row| {
                let entity = E::from_row(row)?;
                let sig: Option<String> = if signed { row.get(sig_index)? } else { None };
                Ok((entity, sig))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Integrity first: a row whose signature does not verify is never opened.
    fn verify_and_load<E: Entity + Canonical>(
        &self,
        mapping: &TableMapping,
        mut entity: E,
        sig: Option<String>,
    ) -> Result<E, StoreError> {
        let forms = entity.canonical_forms()?;
        let verified = sig
            .as_deref()
            .is_some_and(|token| self.keys.signer.verify(&forms, token));
        if !verified {
            tracing::debug!(table = mapping.table, id = entity.id(), "Signature mismatch");
            return Err(StoreError::Integrity {
                table: mapping.table,
                id: entity.id(),
            });
        }

        entity.post_get(&self.ctx())?;
        Ok(entity)
    }
}
