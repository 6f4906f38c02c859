// Varseal - End-to-end storage scenarios
//
// Each scenario drives the public store API and then inspects the raw SQLite
// rows, so the at-rest guarantees are checked where they matter.

use pretty_assertions::assert_eq;
use rusqlite::params;

use varseal::model::{AuditEvent, Project, Variable, VariableType, VcsServer, PASSWORD_PLACEHOLDER};
use varseal::store::{HookOptions, StoreError};
use varseal::{Database, KeyMaterial, ProjectStore, SqliteProjectStore};

fn keys() -> KeyMaterial {
    KeyMaterial::from_bytes(&[11u8; 32], &[22u8; 32])
}

fn create_project(store: &SqliteProjectStore<'_>, key: &str) -> Project {
    let mut project = Project::new(key, format!("{} project", key));
    store.insert_project(&mut project).unwrap();
    project
}

fn raw_variable(db: &Database, id: i64) -> (String, String) {
    db.conn()
        .query_row(
            "SELECT var_value, cipher_value FROM project_variable WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap()
}

fn raw_audit_after(db: &Database, variable_id: i64) -> Vec<String> {
    let mut stmt = db
        .conn()
        .prepare("SELECT variable_after FROM project_variable_audit WHERE variable_id = ?1 ORDER BY id")
        .unwrap();
    stmt.query_map([variable_id], |row| row.get(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<String>>>()
        .unwrap()
}

/// Counts every write touching `project.vcs_servers` from now on.
fn watch_vcs_writes(db: &Database) {
    db.conn()
        .execute_batch(
            "CREATE TABLE vcs_writes (project_id INTEGER NOT NULL);
             CREATE TRIGGER log_vcs_write AFTER UPDATE OF vcs_servers ON project
             BEGIN
                 INSERT INTO vcs_writes (project_id) VALUES (NEW.id);
             END;",
        )
        .unwrap();
}

fn vcs_write_count(db: &Database) -> i64 {
    db.conn()
        .query_row("SELECT count(*) FROM vcs_writes", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn secret_variable_is_sealed_signed_and_redacted_in_history() {
    let db = Database::open_in_memory().unwrap();
    let keys = keys();
    let store = SqliteProjectStore::new(&db, &keys);
    let project = create_project(&store, "PRJ");

    let mut token = Variable::new("TOKEN", VariableType::Password, "s3cr3t");
    store.insert_variable(project.id, &mut token, "alice").unwrap();

    let (clear, cipher) = raw_variable(&db, token.id);
    assert_eq!(clear, "");
    assert!(!cipher.is_empty());
    assert!(!cipher.contains("s3cr3t"));

    let history = raw_audit_after(&db, token.id);
    assert_eq!(history.len(), 1);
    assert!(history[0].contains(PASSWORD_PLACEHOLDER));
    assert!(!history[0].contains("s3cr3t"));

    let loaded = store.load_variable(project.id, "TOKEN").unwrap().unwrap();
    assert_eq!(loaded.value, "s3cr3t");
    assert_eq!(loaded.var_type, VariableType::Password);
}

#[test]
fn plain_variable_update_is_audited_with_values() {
    let db = Database::open_in_memory().unwrap();
    let keys = keys();
    let store = SqliteProjectStore::new(&db, &keys);
    let project = create_project(&store, "PRJ");

    let mut branch = Variable::new("BRANCH", VariableType::String, "main");
    store.insert_variable(project.id, &mut branch, "alice").unwrap();

    let mut updated = Variable::new("BRANCH", VariableType::String, "dev");
    store.update_variable(project.id, &mut updated, "bob").unwrap();

    let (clear, cipher) = raw_variable(&db, branch.id);
    assert_eq!(clear, "dev");
    assert_eq!(cipher, "");

    let audits = store.load_variable_audits(project.id, branch.id).unwrap();
    let events: Vec<AuditEvent> = audits.iter().map(|a| a.event).collect();
    assert_eq!(events, vec![AuditEvent::Add, AuditEvent::Update]);

    let update = &audits[1];
    assert_eq!(update.before.as_ref().unwrap().value, "main");
    assert_eq!(update.after.value, "dev");
    assert_eq!(update.author, "bob");
}

#[test]
fn corrupted_vcs_document_is_healed_exactly_once() {
    let db = Database::open_in_memory().unwrap();
    let keys = keys();
    let store = SqliteProjectStore::new(&db, &keys);

    let mut project = Project::new("PRJ", "Project");
    project.metadata.insert("team".to_string(), "core".to_string());
    project.vcs_servers.push(VcsServer {
        name: "stash".to_string(),
        username: "ci".to_string(),
        ..VcsServer::default()
    });
    store.insert_project(&mut project).unwrap();

    // Garbage that neither opens nor parses.
    db.conn()
        .execute(
            "UPDATE project SET vcs_servers = ?1 WHERE id = ?2",
            params![b"not a sealed document".to_vec(), project.id],
        )
        .unwrap();
    watch_vcs_writes(&db);

    let loaded = store.load_project("PRJ").unwrap().unwrap();
    assert!(loaded.vcs_servers.is_empty());
    assert_eq!(loaded.metadata.get("team").map(String::as_str), Some("core"));
    assert_eq!(vcs_write_count(&db), 1);

    let blob: Option<Vec<u8>> = db
        .conn()
        .query_row("SELECT vcs_servers FROM project WHERE id = ?1", [project.id], |r| r.get(0))
        .unwrap();
    assert!(blob.is_none());

    // Already healed: further reads issue no more writes.
    store.load_project("PRJ").unwrap().unwrap();
    assert_eq!(vcs_write_count(&db), 1);
}

#[test]
fn corrupted_vcs_document_is_left_alone_when_healing_is_off() {
    let db = Database::open_in_memory().unwrap();
    let keys = keys();
    let store = SqliteProjectStore::new(&db, &keys).with_options(HookOptions {
        heal_legacy_on_read: false,
    });
    let project = create_project(&store, "PRJ");

    db.conn()
        .execute(
            "UPDATE project SET vcs_servers = X'0102030405' WHERE id = ?1",
            [project.id],
        )
        .unwrap();
    watch_vcs_writes(&db);

    let mut loaded = store.load_project_by_id(project.id).unwrap().unwrap();
    assert!(loaded.vcs_servers.is_empty());
    assert_eq!(vcs_write_count(&db), 0);

    // Saving unrelated changes must not drop the document either.
    loaded.metadata.insert("owner".to_string(), "team-a".to_string());
    store.update_project(&mut loaded).unwrap();
    assert_eq!(vcs_write_count(&db), 0);

    assert!(store.repair_legacy_vcs(project.id).unwrap());
    assert_eq!(vcs_write_count(&db), 1);
}

#[test]
fn tampered_variable_name_is_an_integrity_error() {
    let db = Database::open_in_memory().unwrap();
    let keys = keys();
    let store = SqliteProjectStore::new(&db, &keys);
    let project = create_project(&store, "PRJ");

    let mut branch = Variable::new("BRANCH", VariableType::String, "main");
    store.insert_variable(project.id, &mut branch, "alice").unwrap();

    db.conn()
        .execute(
            "UPDATE project_variable SET var_name = 'RELEASE' WHERE id = ?1",
            [branch.id],
        )
        .unwrap();

    let err = store.list_variables(project.id).unwrap_err();
    assert!(
        matches!(err, StoreError::Integrity { table: "project_variable", id } if id == branch.id),
        "got {:?}",
        err
    );
    assert!(store.load_variable(project.id, "RELEASE").unwrap_err().is_integrity());

    let report = store.verify_signatures().unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].id, branch.id);
}

#[test]
fn variable_moved_to_another_project_is_an_integrity_error() {
    let db = Database::open_in_memory().unwrap();
    let keys = keys();
    let store = SqliteProjectStore::new(&db, &keys);
    let a = create_project(&store, "A");
    let b = create_project(&store, "B");

    let mut token = Variable::new("TOKEN", VariableType::Password, "s3cr3t");
    store.insert_variable(a.id, &mut token, "alice").unwrap();

    db.conn()
        .execute(
            "UPDATE project_variable SET project_id = ?1 WHERE id = ?2",
            params![b.id, token.id],
        )
        .unwrap();

    assert!(store.list_variables(a.id).unwrap().is_empty());
    assert!(store.list_variables(b.id).unwrap_err().is_integrity());
}

#[test]
fn deleted_secret_leaves_only_redacted_history() {
    let db = Database::open_in_memory().unwrap();
    let keys = keys();
    let store = SqliteProjectStore::new(&db, &keys);
    let project = create_project(&store, "PRJ");

    let mut key = Variable::new("DEPLOY_KEY", VariableType::SshKey, "-----BEGIN OPENSSH-----");
    store.insert_variable(project.id, &mut key, "alice").unwrap();
    assert!(store.delete_variable(project.id, "DEPLOY_KEY", "bob").unwrap());

    let mut stmt = db
        .conn()
        .prepare("SELECT coalesce(variable_before, ''), variable_after FROM project_variable_audit")
        .unwrap();
    let rows: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();
    assert_eq!(rows.len(), 2);
    for (before, after) in rows {
        assert!(!before.contains("BEGIN OPENSSH"));
        assert!(!after.contains("BEGIN OPENSSH"));
    }
}
