// Varseal - SQLite Database Management
//
// Opens the project database and applies the schema. Secrets are protected
// per field by the store hooks, so the file itself is plain SQLite.

use rusqlite::Connection;

use super::StoreError;

/// Wrapper around the project database connection.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &std::path::Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let db = Self { conn };
        db.run_migrations()?;

        tracing::debug!(path = %path.display(), "Database opened");
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let db = Self { conn };
        db.run_migrations()?;
        Ok(db)
    }

    /// Get a reference to the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run schema migrations to create or update tables.
    fn run_migrations(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS project (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                projectkey      TEXT NOT NULL UNIQUE,
                name            TEXT NOT NULL,
                created         TEXT NOT NULL,
                last_modified   TEXT NOT NULL,
                metadata        TEXT,
                vcs_servers     BLOB
            );

            CREATE TABLE IF NOT EXISTS project_variable (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id      INTEGER NOT NULL,
                var_name        TEXT NOT NULL,
                var_value       TEXT NOT NULL DEFAULT '',
                cipher_value    TEXT NOT NULL DEFAULT '',
                var_type        TEXT NOT NULL,
                sig             TEXT,
                UNIQUE(project_id, var_name),
                FOREIGN KEY(project_id) REFERENCES project(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS project_variable_audit (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id      INTEGER NOT NULL,
                variable_id     INTEGER NOT NULL,
                type_event      TEXT NOT NULL,
                variable_before TEXT,
                variable_after  TEXT,
                versionned      TEXT NOT NULL,
                author          TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS project_key (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id      INTEGER NOT NULL,
                name            TEXT NOT NULL,
                type            TEXT NOT NULL,
                public          TEXT NOT NULL DEFAULT '',
                private         TEXT NOT NULL DEFAULT '',
                key_id          TEXT NOT NULL DEFAULT '',
                builtin         INTEGER NOT NULL DEFAULT 0,
                sig             TEXT,
                UNIQUE(project_id, name),
                FOREIGN KEY(project_id) REFERENCES project(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS project_label (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id      INTEGER NOT NULL,
                name            TEXT NOT NULL,
                color           TEXT NOT NULL DEFAULT '',
                UNIQUE(project_id, name),
                FOREIGN KEY(project_id) REFERENCES project(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_variable_audit_project
                ON project_variable_audit(project_id);
            ",
        )?;

        tracing::debug!("Database migrations completed successfully");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(db: &Database, name: &str) -> bool {
        let count: i64 = db
            .conn()
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn test_open_in_memory_succeeds() {
        let db = Database::open_in_memory();
        assert!(db.is_ok(), "Should be able to open an in-memory database");
    }

    #[test]
    fn test_schema_migration_creates_tables() {
        let db = Database::open_in_memory().unwrap();
        for table in [
            "project",
            "project_variable",
            "project_variable_audit",
            "project_key",
            "project_label",
        ] {
            assert!(table_exists(&db, table), "{} table should exist", table);
        }
    }

    #[test]
    fn test_schema_migration_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        assert!(
            db.run_migrations().is_ok(),
            "Migrations should be idempotent"
        );
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("varseal.db");

        {
            let db = Database::open(&path).unwrap();
            db.conn()
                .execute(
                    "INSERT INTO project (projectkey, name, created, last_modified)
                     VALUES ('KEY', 'name', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
                    [],
                )
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let count: i64 = db
            .conn()
            .query_row("SELECT count(*) FROM project", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_variable_name_unique_per_project() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute(
                "INSERT INTO project (projectkey, name, created, last_modified)
                 VALUES ('KEY', 'name', 'now', 'now')",
                [],
            )
            .unwrap();
        let insert = "INSERT INTO project_variable (project_id, var_name, var_type)
                      VALUES (1, 'A', 'string')";
        db.conn().execute(insert, []).unwrap();
        assert!(db.conn().execute(insert, []).is_err());
    }
}
