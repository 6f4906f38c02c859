// Varseal - Row entities and their lifecycle hooks
//
// Each persisted table has a row type here. The hooks implement the secrecy
// rules: secret-class variable values and private keys are sealed with their
// row identity, the legacy VCS document is sealed as a blob, and audit
// snapshots are redacted before they are serialized.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, Connection, Row};

use crate::crypto::{Canonical, Sealer};
use crate::model::{
    redact, AuditEvent, KeyType, Label, Project, ProjectKey, ProjectVariableAudit, Variable,
    VariableType, VcsServer,
};

use super::hooks::{HookContext, Lifecycle};
use super::mapping::{Entity, Registry, TableMapping};
use super::StoreError;

pub const PROJECT_TABLE: TableMapping = TableMapping::new("project", "id");
pub const VARIABLE_TABLE: TableMapping = TableMapping::new("project_variable", "id").signed();
pub const AUDIT_TABLE: TableMapping = TableMapping::new("project_variable_audit", "id");
pub const KEY_TABLE: TableMapping = TableMapping::new("project_key", "id").signed();
pub const LABEL_TABLE: TableMapping = TableMapping::new("project_label", "id");

/// Registry with every project-scoped entity.
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register::<DbProject>(PROJECT_TABLE)
        .register::<DbProjectVariable>(VARIABLE_TABLE)
        .register::<DbProjectVariableAudit>(AUDIT_TABLE)
        .register::<DbProjectKey>(KEY_TABLE)
        .register::<DbLabel>(LABEL_TABLE);
    registry
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, message.into())
}

fn parse_timestamp(index: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(index, format!("invalid timestamp '{}': {}", raw, e)))
}

// ─── Project variable ────────────────────────────────────────────────────────

/// `project_variable` row. Exactly one of the value columns is populated,
/// chosen by `VariableType::needs_secret_storage`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DbProjectVariable {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub clear_value: String,
    /// Plaintext while in memory; only ever persisted sealed.
    pub cipher_value: String,
    pub var_type: VariableType,
}

impl DbProjectVariable {
    pub fn new(variable: &Variable, project_id: i64) -> Self {
        let mut row = Self {
            id: variable.id,
            project_id,
            name: variable.name.clone(),
            var_type: variable.var_type,
            ..Self::default()
        };
        if variable.var_type.needs_secret_storage() {
            row.cipher_value = variable.value.clone();
        } else {
            row.clear_value = variable.value.clone();
        }
        row
    }

    /// The logical variable, read from whichever column the type selects.
    pub fn variable(&self) -> Variable {
        let value = if self.var_type.needs_secret_storage() {
            self.cipher_value.clone()
        } else {
            self.clear_value.clone()
        };
        Variable {
            id: self.id,
            name: self.name.clone(),
            var_type: self.var_type,
            value,
        }
    }

    fn sealing_context(&self) -> Vec<String> {
        vec![self.id.to_string(), self.name.clone()]
    }
}

impl fmt::Debug for DbProjectVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbProjectVariable")
            .field("id", &self.id)
            .field("project_id", &self.project_id)
            .field("name", &self.name)
            .field("clear_value", &self.clear_value)
            .field("cipher_value", &"[REDACTED]")
            .field("var_type", &self.var_type)
            .finish()
    }
}

// Fields are concatenated without separators, so forms are not unique across
// field boundaries (project 1 / id 23 and project 12 / id 3 render alike).
// The layout is kept for compatibility with rows signed by earlier versions.
impl Canonical for DbProjectVariable {
    const TEMPLATES: &'static [&'static str] = &["{ProjectID}{ID}{Name}{Type}"];

    fn canonical_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ProjectID", self.project_id.to_string()),
            ("ID", self.id.to_string()),
            ("Name", self.name.clone()),
            ("Type", self.var_type.as_str().to_string()),
        ]
    }
}

impl Entity for DbProjectVariable {
    const COLUMNS: &'static [&'static str] = &["project_id", "var_name", "var_value", "var_type"];

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn values(&self) -> Vec<Value> {
        let clear = if self.var_type.needs_secret_storage() {
            String::new()
        } else {
            self.clear_value.clone()
        };
        vec![
            Value::Integer(self.project_id),
            Value::Text(self.name.clone()),
            Value::Text(clear),
            Value::Text(self.var_type.as_str().to_string()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw_type: String = row.get(4)?;
        let var_type = raw_type
            .parse::<VariableType>()
            .map_err(|e| conversion_error(4, e))?;
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            name: row.get(2)?,
            clear_value: row.get(3)?,
            cipher_value: String::new(),
            var_type,
        })
    }
}

impl Lifecycle for DbProjectVariable {
    fn post_update(&mut self, ctx: &HookContext<'_>) -> Result<(), StoreError> {
        let sealed = if self.var_type.needs_secret_storage() {
            ctx.keys
                .sealer
                .seal_text(&self.cipher_value, &self.sealing_context())
                .map_err(|source| StoreError::Sealing {
                    table: VARIABLE_TABLE.table,
                    id: self.id,
                    source,
                })?
        } else {
            String::new()
        };

        ctx.conn.execute(
            "UPDATE project_variable SET cipher_value = ?1 WHERE id = ?2",
            params![sealed, self.id],
        )?;
        Ok(())
    }

    fn post_get(&mut self, ctx: &HookContext<'_>) -> Result<(), StoreError> {
        if !self.var_type.needs_secret_storage() {
            return Ok(());
        }

        let sealed: String = ctx.conn.query_row(
            "SELECT cipher_value FROM project_variable WHERE id = ?1",
            [self.id],
            |row| row.get(0),
        )?;
        let opened = ctx
            .keys
            .sealer
            .open_text(&sealed, &self.sealing_context())
            .map_err(|source| StoreError::Sealing {
                table: VARIABLE_TABLE.table,
                id: self.id,
                source,
            })?;
        self.cipher_value = opened.as_str().to_string();
        Ok(())
    }
}

// ─── Project key ─────────────────────────────────────────────────────────────

/// `project_key` row. The private half is sealed with `(ID, Name)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbProjectKey(pub ProjectKey);

impl DbProjectKey {
    fn sealing_context(&self) -> Vec<String> {
        vec![self.0.id.to_string(), self.0.name.clone()]
    }

    fn sealing_error(&self, source: crate::crypto::CryptoError) -> StoreError {
        StoreError::Sealing {
            table: KEY_TABLE.table,
            id: self.0.id,
            source,
        }
    }
}

// Same separator-free layout as `DbProjectVariable`.
impl Canonical for DbProjectKey {
    const TEMPLATES: &'static [&'static str] = &["{ProjectID}{ID}{Name}"];

    fn canonical_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ProjectID", self.0.project_id.to_string()),
            ("ID", self.0.id.to_string()),
            ("Name", self.0.name.clone()),
        ]
    }
}

impl Entity for DbProjectKey {
    const COLUMNS: &'static [&'static str] =
        &["project_id", "name", "type", "public", "key_id", "builtin"];

    fn id(&self) -> i64 {
        self.0.id
    }

    fn set_id(&mut self, id: i64) {
        self.0.id = id;
    }

    fn values(&self) -> Vec<Value> {
        let key = &self.0;
        vec![
            Value::Integer(key.project_id),
            Value::Text(key.name.clone()),
            Value::Text(key.key_type.as_str().to_string()),
            Value::Text(key.public.clone()),
            Value::Text(key.key_id.clone()),
            Value::Integer(i64::from(key.builtin)),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw_type: String = row.get(3)?;
        let key_type = raw_type
            .parse::<KeyType>()
            .map_err(|e| conversion_error(3, e))?;
        Ok(Self(ProjectKey {
            id: row.get(0)?,
            project_id: row.get(1)?,
            name: row.get(2)?,
            key_type,
            public: row.get(4)?,
            private: String::new(),
            key_id: row.get(5)?,
            builtin: row.get(6)?,
        }))
    }
}

impl Lifecycle for DbProjectKey {
    fn post_update(&mut self, ctx: &HookContext<'_>) -> Result<(), StoreError> {
        let sealed = ctx
            .keys
            .sealer
            .seal_text(&self.0.private, &self.sealing_context())
            .map_err(|e| self.sealing_error(e))?;
        ctx.conn.execute(
            "UPDATE project_key SET private = ?1 WHERE id = ?2",
            params![sealed, self.0.id],
        )?;
        Ok(())
    }

    fn post_get(&mut self, ctx: &HookContext<'_>) -> Result<(), StoreError> {
        let sealed: String = ctx.conn.query_row(
            "SELECT private FROM project_key WHERE id = ?1",
            [self.0.id],
            |row| row.get(0),
        )?;
        let opened = ctx
            .keys
            .sealer
            .open_text(&sealed, &self.sealing_context())
            .map_err(|e| self.sealing_error(e))?;
        self.0.private = opened.as_str().to_string();
        Ok(())
    }
}

// ─── Project ─────────────────────────────────────────────────────────────────

/// `project` row. Metadata is JSON; the legacy VCS list is YAML, sealed.
#[derive(Debug, Clone, PartialEq)]
pub struct DbProject(pub Project);

impl Entity for DbProject {
    const COLUMNS: &'static [&'static str] = &["projectkey", "name", "created", "last_modified"];

    fn id(&self) -> i64 {
        self.0.id
    }

    fn set_id(&mut self, id: i64) {
        self.0.id = id;
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.0.key.clone()),
            Value::Text(self.0.name.clone()),
            Value::Text(self.0.created.to_rfc3339()),
            Value::Text(self.0.last_modified.to_rfc3339()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let created: String = row.get(3)?;
        let last_modified: String = row.get(4)?;
        Ok(Self(Project {
            id: row.get(0)?,
            key: row.get(1)?,
            name: row.get(2)?,
            created: parse_timestamp(3, &created)?,
            last_modified: parse_timestamp(4, &last_modified)?,
            metadata: BTreeMap::new(),
            vcs_servers: Vec::new(),
        }))
    }
}

impl Lifecycle for DbProject {
    fn post_update(&mut self, ctx: &HookContext<'_>) -> Result<(), StoreError> {
        let metadata = serde_json::to_string(&self.0.metadata)?;

        if self.0.vcs_servers.is_empty() {
            ctx.conn.execute(
                "UPDATE project SET metadata = ?1 WHERE id = ?2",
                params![metadata, self.0.id],
            )?;
            // An undecodable blob also loads as empty; only `repair_legacy_vcs`
            // or the read-side heal may drop it.
            if stored_vcs_is_readable(ctx, self.0.id)? {
                clear_vcs_servers(ctx.conn, self.0.id)?;
            }
            return Ok(());
        }

        let yaml = serde_yaml::to_string(&self.0.vcs_servers)?;
        let sealed = ctx
            .keys
            .sealer
            .seal(yaml.as_bytes(), &vcs_context(self.0.id))
            .map_err(|source| StoreError::Sealing {
                table: PROJECT_TABLE.table,
                id: self.0.id,
                source,
            })?;
        ctx.conn.execute(
            "UPDATE project SET metadata = ?1, vcs_servers = ?2 WHERE id = ?3",
            params![metadata, sealed, self.0.id],
        )?;
        Ok(())
    }

    fn post_get(&mut self, ctx: &HookContext<'_>) -> Result<(), StoreError> {
        let id = self.0.id;
        let (metadata, vcs_servers): (Option<String>, Option<Vec<u8>>) = ctx.conn.query_row(
            "SELECT metadata, vcs_servers FROM project WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        self.0.metadata = match metadata.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                serde_json::from_str::<Option<BTreeMap<String, String>>>(raw)?.unwrap_or_default()
            }
            _ => BTreeMap::new(),
        };

        self.0.vcs_servers = match vcs_servers {
            Some(blob) if !blob.is_empty() => {
                match decode_vcs_servers(&ctx.keys.sealer, id, &blob) {
                    Ok(servers) => servers,
                    Err(err) => {
                        tracing::warn!(
                            project_id = id,
                            error = %err,
                            heal = ctx.options.heal_legacy_on_read,
                            "Unable to load legacy VCS servers, discarding them"
                        );
                        if ctx.options.heal_legacy_on_read {
                            clear_vcs_servers(ctx.conn, id)?;
                        }
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        };

        Ok(())
    }
}

fn vcs_context(project_id: i64) -> Vec<String> {
    vec![project_id.to_string()]
}

/// True when a non-null VCS blob is stored and still decodes.
fn stored_vcs_is_readable(ctx: &HookContext<'_>, project_id: i64) -> Result<bool, StoreError> {
    let blob: Option<Vec<u8>> = ctx.conn.query_row(
        "SELECT vcs_servers FROM project WHERE id = ?1",
        [project_id],
        |row| row.get(0),
    )?;
    Ok(match blob {
        Some(blob) => decode_vcs_servers(&ctx.keys.sealer, project_id, &blob).is_ok(),
        None => false,
    })
}

/// Open and decode a stored VCS blob. Every failure is a `LegacyDecode`.
pub(crate) fn decode_vcs_servers(
    sealer: &Sealer,
    project_id: i64,
    blob: &[u8],
) -> Result<Vec<VcsServer>, StoreError> {
    let opened = sealer
        .open(blob, &vcs_context(project_id))
        .map_err(|e| StoreError::LegacyDecode(e.to_string()))?;
    if opened.is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_slice(&opened).map_err(|e| StoreError::LegacyDecode(e.to_string()))
}

/// Corrective write for an undecodable VCS blob.
pub(crate) fn clear_vcs_servers(conn: &Connection, project_id: i64) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE project SET vcs_servers = NULL WHERE id = ?1",
        [project_id],
    )?;
    tracing::info!(project_id, "Legacy VCS servers cleared");
    Ok(())
}

// ─── Variable audit ──────────────────────────────────────────────────────────

/// `project_variable_audit` row. Snapshots are JSON, always redacted.
#[derive(Debug, Clone, PartialEq)]
pub struct DbProjectVariableAudit(pub ProjectVariableAudit);

impl Entity for DbProjectVariableAudit {
    const COLUMNS: &'static [&'static str] =
        &["project_id", "variable_id", "type_event", "versionned", "author"];

    fn id(&self) -> i64 {
        self.0.id
    }

    fn set_id(&mut self, id: i64) {
        self.0.id = id;
    }

    fn values(&self) -> Vec<Value> {
        let audit = &self.0;
        vec![
            Value::Integer(audit.project_id),
            Value::Integer(audit.variable_id),
            Value::Text(audit.event.as_str().to_string()),
            Value::Text(audit.versionned.to_rfc3339()),
            Value::Text(audit.author.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let event: String = row.get(3)?;
        let versionned: String = row.get(4)?;
        Ok(Self(ProjectVariableAudit {
            id: row.get(0)?,
            project_id: row.get(1)?,
            variable_id: row.get(2)?,
            event: event.parse::<AuditEvent>().map_err(|e| conversion_error(3, e))?,
            before: None,
            after: Variable::default(),
            versionned: parse_timestamp(4, &versionned)?,
            author: row.get(5)?,
        }))
    }
}

impl DbProjectVariableAudit {
    fn redact_snapshots(&mut self) {
        if let Some(before) = self.0.before.as_mut() {
            redact(before);
        }
        redact(&mut self.0.after);
    }
}

impl Lifecycle for DbProjectVariableAudit {
    fn pre_insert(&mut self, _ctx: &HookContext<'_>) -> Result<(), StoreError> {
        self.redact_snapshots();
        Ok(())
    }

    // Also reached by plain updates, which skip `pre_insert`.
    fn post_update(&mut self, ctx: &HookContext<'_>) -> Result<(), StoreError> {
        self.redact_snapshots();
        let before = self
            .0
            .before
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let after = serde_json::to_string(&self.0.after)?;

        ctx.conn.execute(
            "UPDATE project_variable_audit SET variable_before = ?1, variable_after = ?2
             WHERE id = ?3",
            params![before, after, self.0.id],
        )?;
        Ok(())
    }

    fn post_get(&mut self, ctx: &HookContext<'_>) -> Result<(), StoreError> {
        let (before, after): (Option<String>, Option<String>) = ctx.conn.query_row(
            "SELECT variable_before, variable_after FROM project_variable_audit WHERE id = ?1",
            [self.0.id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        self.0.before = before
            .as_deref()
            .map(serde_json::from_str::<Variable>)
            .transpose()?
            .map(Variable::redacted);

        if let Some(after) = after.as_deref() {
            self.0.after = serde_json::from_str::<Variable>(after)?.redacted();
        }
        Ok(())
    }
}

// ─── Label ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbLabel(pub Label);

impl Entity for DbLabel {
    const COLUMNS: &'static [&'static str] = &["project_id", "name", "color"];

    fn id(&self) -> i64 {
        self.0.id
    }

    fn set_id(&mut self, id: i64) {
        self.0.id = id;
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.0.project_id),
            Value::Text(self.0.name.clone()),
            Value::Text(self.0.color.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self(Label {
            id: row.get(0)?,
            project_id: row.get(1)?,
            name: row.get(2)?,
            color: row.get(3)?,
        }))
    }
}

impl Lifecycle for DbLabel {}

// ─── Tests ───────────────────────────────────────────────────────────────────
