// Varseal - Project Store Repository
//
// Aggregate-level operations over projects, their variables, keys and labels.
// Every variable mutation writes its audit row inside the same transaction,
// and every read of a signed row is integrity-checked before it is opened.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::crypto::KeyMaterial;
use crate::model::{AuditEvent, Label, Project, ProjectKey, ProjectVariableAudit, Variable};

use super::db::Database;
use super::entities::{
    self, clear_vcs_servers, decode_vcs_servers, DbLabel, DbProject, DbProjectKey,
    DbProjectVariable, DbProjectVariableAudit,
};
use super::executor::Executor;
use super::hooks::HookOptions;
use super::mapping::Registry;
use super::StoreError;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over project storage operations.
pub trait ProjectStore {
    /// Insert a project. Its id is assigned in place.
    fn insert_project(&self, project: &mut Project) -> Result<(), StoreError>;

    /// Rewrite a project row and its documents, bumping `last_modified`.
    fn update_project(&self, project: &mut Project) -> Result<(), StoreError>;

    /// Load a project by its unique key.
    fn load_project(&self, key: &str) -> Result<Option<Project>, StoreError>;

    fn load_project_by_id(&self, id: i64) -> Result<Option<Project>, StoreError>;

    /// Clear the legacy VCS document if it can no longer be decoded.
    /// Returns true if a corrective write was issued.
    fn repair_legacy_vcs(&self, project_id: i64) -> Result<bool, StoreError>;

    /// Add a variable to a project and record an `add` audit row.
    fn insert_variable(
        &self,
        project_id: i64,
        variable: &mut Variable,
        author: &str,
    ) -> Result<(), StoreError>;

    /// Replace the variable with the same name and record an `update` audit row.
    fn update_variable(
        &self,
        project_id: i64,
        variable: &mut Variable,
        author: &str,
    ) -> Result<(), StoreError>;

    /// Load one variable with its value opened.
    fn load_variable(&self, project_id: i64, name: &str) -> Result<Option<Variable>, StoreError>;

    /// All variables of a project, values opened.
    fn list_variables(&self, project_id: i64) -> Result<Vec<Variable>, StoreError>;

    /// Delete a variable by name and record a `delete` audit row.
    /// Returns true if it existed.
    fn delete_variable(&self, project_id: i64, name: &str, author: &str)
        -> Result<bool, StoreError>;

    /// Audit history of one variable, oldest first, always redacted.
    fn load_variable_audits(
        &self,
        project_id: i64,
        variable_id: i64,
    ) -> Result<Vec<ProjectVariableAudit>, StoreError>;

    /// Id of the most recently audited variable with this name, including
    /// variables that have since been deleted.
    fn find_audited_variable_id(
        &self,
        project_id: i64,
        name: &str,
    ) -> Result<Option<i64>, StoreError>;

    fn insert_key(&self, key: &mut ProjectKey) -> Result<(), StoreError>;

    fn list_keys(&self, project_id: i64) -> Result<Vec<ProjectKey>, StoreError>;

    fn delete_key(&self, project_id: i64, name: &str) -> Result<bool, StoreError>;

    fn insert_label(&self, label: &mut Label) -> Result<(), StoreError>;

    fn list_labels(&self, project_id: i64) -> Result<Vec<Label>, StoreError>;

    /// Re-read every signed row and report the ones that fail to verify or open.
    fn verify_signatures(&self) -> Result<VerificationReport, StoreError>;
}

/// Outcome of [`ProjectStore::verify_signatures`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub checked: usize,
    pub failures: Vec<RowFailure>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub table: &'static str,
    pub id: i64,
    pub reason: String,
}

// ─── SQLite Implementation ──────────────────────────────────────────────────

pub struct SqliteProjectStore<'a> {
    db: &'a Database,
    keys: &'a KeyMaterial,
    registry: Registry,
    options: HookOptions,
}

impl<'a> SqliteProjectStore<'a> {
    pub fn new(db: &'a Database, keys: &'a KeyMaterial) -> Self {
        Self {
            db,
            keys,
            registry: entities::registry(),
            options: HookOptions::default(),
        }
    }

    pub fn with_options(mut self, options: HookOptions) -> Self {
        self.options = options;
        self
    }

    fn executor<'c>(&'c self, conn: &'c Connection) -> Executor<'c> {
        Executor::new(conn, self.keys, &self.registry, self.options)
    }

    fn find_variable(
        exec: &Executor<'_>,
        project_id: i64,
        name: &str,
    ) -> Result<Option<DbProjectVariable>, StoreError> {
        let mut rows = exec.select_signed::<DbProjectVariable>(
            "project_id = ?1 AND var_name = ?2",
            params![project_id, name],
        )?;
        Ok(rows.pop())
    }

    fn record_audit(
        exec: &Executor<'_>,
        project_id: i64,
        variable_id: i64,
        event: AuditEvent,
        before: Option<Variable>,
        after: Variable,
        author: &str,
    ) -> Result<(), StoreError> {
        let mut audit = DbProjectVariableAudit(ProjectVariableAudit {
            id: 0,
            project_id,
            variable_id,
            event,
            before,
            after,
            versionned: Utc::now(),
            author: author.to_string(),
        });
        exec.insert(&mut audit)
    }

    fn check_rows<E>(
        exec: &Executor<'_>,
        report: &mut VerificationReport,
    ) -> Result<(), StoreError>
    where
        E: super::mapping::Entity + crate::crypto::Canonical,
    {
        for id in exec.ids::<E>()? {
            report.checked += 1;
            match exec.get_signed::<E>(id) {
                Ok(_) => {}
                Err(err) => {
                    let table = match &err {
                        StoreError::Integrity { table, .. } | StoreError::Sealing { table, .. } => {
                            *table
                        }
                        _ => return Err(err),
                    };
                    tracing::warn!(table, id, error = %err, "Row failed verification");
                    report.failures.push(RowFailure {
                        table,
                        id,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl<'a> ProjectStore for SqliteProjectStore<'a> {
    fn insert_project(&self, project: &mut Project) -> Result<(), StoreError> {
        let tx = self.db.conn().unchecked_transaction()?;
        let mut row = DbProject(project.clone());
        self.executor(&tx).insert(&mut row)?;
        tx.commit()?;

        *project = row.0;
        tracing::info!(project_id = project.id, key = %project.key, "Project created");
        Ok(())
    }

    fn update_project(&self, project: &mut Project) -> Result<(), StoreError> {
        project.last_modified = Utc::now();

        let tx = self.db.conn().unchecked_transaction()?;
        let mut row = DbProject(project.clone());
        self.executor(&tx).update(&mut row)?;
        tx.commit()?;

        *project = row.0;
        Ok(())
    }

    fn load_project(&self, key: &str) -> Result<Option<Project>, StoreError> {
        let mut rows = self
            .executor(self.db.conn())
            .select::<DbProject>("projectkey = ?1", params![key])?;
        Ok(rows.pop().map(|row| row.0))
    }

    fn load_project_by_id(&self, id: i64) -> Result<Option<Project>, StoreError> {
        Ok(self
            .executor(self.db.conn())
            .get::<DbProject>(id)?
            .map(|row| row.0))
    }

    fn repair_legacy_vcs(&self, project_id: i64) -> Result<bool, StoreError> {
        let conn = self.db.conn();
        let blob: Option<Vec<u8>> = match conn.query_row(
            "SELECT vcs_servers FROM project WHERE id = ?1",
            [project_id],
            |row| row.get(0),
        ) {
            Ok(blob) => blob,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(StoreError::NotFound(format!("project {}", project_id)))
            }
            Err(e) => return Err(e.into()),
        };

        let Some(blob) = blob.filter(|b| !b.is_empty()) else {
            return Ok(false);
        };

        match decode_vcs_servers(&self.keys.sealer, project_id, &blob) {
            Ok(_) => Ok(false),
            Err(err) => {
                tracing::warn!(project_id, error = %err, "Repairing legacy VCS servers");
                clear_vcs_servers(conn, project_id)?;
                Ok(true)
            }
        }
    }

    fn insert_variable(
        &self,
        project_id: i64,
        variable: &mut Variable,
        author: &str,
    ) -> Result<(), StoreError> {
        let tx = self.db.conn().unchecked_transaction()?;
        let exec = self.executor(&tx);

        let mut row = DbProjectVariable::new(variable, project_id);
        exec.insert_signed(&mut row)?;
        variable.id = row.id;

        Self::record_audit(
            &exec,
            project_id,
            row.id,
            AuditEvent::Add,
            None,
            variable.clone(),
            author,
        )?;
        tx.commit()?;

        tracing::info!(
            project_id,
            variable_id = variable.id,
            name = %variable.name,
            var_type = %variable.var_type,
            "Variable created"
        );
        Ok(())
    }

    fn update_variable(
        &self,
        project_id: i64,
        variable: &mut Variable,
        author: &str,
    ) -> Result<(), StoreError> {
        let tx = self.db.conn().unchecked_transaction()?;
        let exec = self.executor(&tx);

        let existing = Self::find_variable(&exec, project_id, &variable.name)?.ok_or_else(|| {
            StoreError::NotFound(format!("variable '{}' in project {}", variable.name, project_id))
        })?;
        variable.id = existing.id;

        let mut row = DbProjectVariable::new(variable, project_id);
        exec.update_signed(&mut row)?;

        Self::record_audit(
            &exec,
            project_id,
            row.id,
            AuditEvent::Update,
            Some(existing.variable()),
            variable.clone(),
            author,
        )?;
        tx.commit()?;

        tracing::info!(project_id, variable_id = variable.id, name = %variable.name, "Variable updated");
        Ok(())
    }

    fn load_variable(&self, project_id: i64, name: &str) -> Result<Option<Variable>, StoreError> {
        let exec = self.executor(self.db.conn());
        Ok(Self::find_variable(&exec, project_id, name)?.map(|row| row.variable()))
    }

    fn list_variables(&self, project_id: i64) -> Result<Vec<Variable>, StoreError> {
        let rows = self
            .executor(self.db.conn())
            .select_signed::<DbProjectVariable>("project_id = ?1", params![project_id])?;
        let mut variables: Vec<Variable> = rows.iter().map(DbProjectVariable::variable).collect();
        variables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(variables)
    }

    fn delete_variable(
        &self,
        project_id: i64,
        name: &str,
        author: &str,
    ) -> Result<bool, StoreError> {
        let tx = self.db.conn().unchecked_transaction()?;
        let exec = self.executor(&tx);

        let Some(existing) = Self::find_variable(&exec, project_id, name)? else {
            return Ok(false);
        };
        exec.delete::<DbProjectVariable>(existing.id)?;

        Self::record_audit(
            &exec,
            project_id,
            existing.id,
            AuditEvent::Delete,
            Some(existing.variable()),
            Variable::default(),
            author,
        )?;
        tx.commit()?;

        tracing::info!(project_id, variable_id = existing.id, name, "Variable deleted");
        Ok(true)
    }

    fn load_variable_audits(
        &self,
        project_id: i64,
        variable_id: i64,
    ) -> Result<Vec<ProjectVariableAudit>, StoreError> {
        let rows = self.executor(self.db.conn()).select::<DbProjectVariableAudit>(
            "project_id = ?1 AND variable_id = ?2",
            params![project_id, variable_id],
        )?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    fn find_audited_variable_id(
        &self,
        project_id: i64,
        name: &str,
    ) -> Result<Option<i64>, StoreError> {
        let id = self
            .db
            .conn()
            .query_row(
                "SELECT variable_id FROM project_variable_audit
                 WHERE project_id = ?1
                   AND (json_extract(variable_after, '$.name') = ?2
                        OR json_extract(variable_before, '$.name') = ?2)
                 ORDER BY id DESC LIMIT 1",
                params![project_id, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn insert_key(&self, key: &mut ProjectKey) -> Result<(), StoreError> {
        let tx = self.db.conn().unchecked_transaction()?;
        let mut row = DbProjectKey(key.clone());
        self.executor(&tx).insert_signed(&mut row)?;
        tx.commit()?;

        key.id = row.0.id;
        tracing::info!(
            project_id = key.project_id,
            key_id = key.id,
            name = %key.name,
            key_type = %key.key_type,
            "Project key created"
        );
        Ok(())
    }

    fn list_keys(&self, project_id: i64) -> Result<Vec<ProjectKey>, StoreError> {
        let rows = self
            .executor(self.db.conn())
            .select_signed::<DbProjectKey>("project_id = ?1", params![project_id])?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    fn delete_key(&self, project_id: i64, name: &str) -> Result<bool, StoreError> {
        let affected = self.db.conn().execute(
            "DELETE FROM project_key WHERE project_id = ?1 AND name = ?2",
            params![project_id, name],
        )?;
        if affected > 0 {
            tracing::info!(project_id, name, "Project key deleted");
        }
        Ok(affected > 0)
    }

    fn insert_label(&self, label: &mut Label) -> Result<(), StoreError> {
        let mut row = DbLabel(label.clone());
        self.executor(self.db.conn()).insert(&mut row)?;
        label.id = row.0.id;
        Ok(())
    }

    fn list_labels(&self, project_id: i64) -> Result<Vec<Label>, StoreError> {
        let rows = self
            .executor(self.db.conn())
            .select::<DbLabel>("project_id = ?1", params![project_id])?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    fn verify_signatures(&self) -> Result<VerificationReport, StoreError> {
        let exec = self.executor(self.db.conn());
        let mut report = VerificationReport::default();
        Self::check_rows::<DbProjectVariable>(&exec, &mut report)?;
        Self::check_rows::<DbProjectKey>(&exec, &mut report)?;

        tracing::info!(
            checked = report.checked,
            failures = report.failures.len(),
            "Signature verification finished"
        );
        Ok(report)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
