// Varseal - CLI Command Handlers
//
// Each function handles one CLI subcommand. They coordinate between the
// configuration, the enclave (key material) and the project store.

use crate::config::VarsealConfig;
use crate::crypto::KeyMaterial;
use crate::enclave::MasterKeyProvider;
use crate::error::VarsealError;
use crate::model::{Label, Project, ProjectKey, Variable};
use crate::store::{Database, ProjectStore, SqliteProjectStore};

use super::{Commands, KeyCommand, LabelCommand, ProjectCommand, VarCommand};

/// Execute the parsed CLI command.
pub fn execute(command: Commands) -> Result<(), VarsealError> {
    let config = VarsealConfig::load()?;

    match command {
        Commands::Init => cmd_init(&config),
        Commands::Project { command } => with_store(&config, |store| cmd_project(store, command)),
        Commands::Var { command } => with_store(&config, |store| cmd_var(store, command)),
        Commands::Key { command } => with_store(&config, |store| cmd_key(store, command)),
        Commands::Label { command } => with_store(&config, |store| cmd_label(store, command)),
        Commands::Verify => with_store(&config, |store| cmd_verify(store)),
    }
}

// ─── Init ────────────────────────────────────────────────────────────────────

fn cmd_init(config: &VarsealConfig) -> Result<(), VarsealError> {
    let provider = config.key_provider();

    std::fs::create_dir_all(&config.storage.data_dir)?;

    let master_secret = provider.get_or_create_master_secret()?;
    provider.derive_key_material(&master_secret)?;

    let path = config.db_path();
    Database::open(&path)?;

    println!("✓ Varseal initialized successfully");
    println!("  Database: {}", path.display());
    println!("  Master secret stored in platform keyring");
    println!();
    println!("Next: create a project with `varseal project create <KEY> --name <NAME>`");

    Ok(())
}

// ─── Projects ────────────────────────────────────────────────────────────────

fn cmd_project(store: &impl ProjectStore, command: ProjectCommand) -> Result<(), VarsealError> {
    match command {
        ProjectCommand::Create {
            key,
            name,
            metadata,
        } => {
            let mut project = Project::new(key, name);
            project.metadata.extend(metadata);
            store.insert_project(&mut project)?;

            println!("✓ Project created");
            println!("  ID:   {}", project.id);
            println!("  Key:  {}", project.key);
        }
        ProjectCommand::Show { key } => {
            let project = require_project(store, &key)?;
            println!("Project details:\n");
            println!("  ID:        {}", project.id);
            println!("  Key:       {}", project.key);
            println!("  Name:      {}", project.name);
            println!("  Created:   {}", project.created.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("  Modified:  {}", project.last_modified.format("%Y-%m-%d %H:%M:%S UTC"));
            if !project.metadata.is_empty() {
                println!("  Metadata:");
                for (k, v) in &project.metadata {
                    println!("    {} = {}", k, v);
                }
            }
            if !project.vcs_servers.is_empty() {
                println!("  Legacy VCS servers:");
                for server in &project.vcs_servers {
                    println!("    {} ({})", server.name, server.username);
                }
            }
        }
        ProjectCommand::RepairVcs { key } => {
            let project = require_project(store, &key)?;
            if store.repair_legacy_vcs(project.id)? {
                println!("✓ Undecodable legacy VCS servers cleared for {}", key);
            } else {
                println!("Legacy VCS servers of {} are readable, nothing to repair", key);
            }
        }
    }
    Ok(())
}

// ─── Variables ───────────────────────────────────────────────────────────────

fn cmd_var(store: &impl ProjectStore, command: VarCommand) -> Result<(), VarsealError> {
    match command {
        VarCommand::Set {
            project,
            name,
            value,
            var_type,
            author,
        } => {
            let project = require_project(store, &project)?;
            let mut variable = Variable::new(name, var_type, value);
            let exists = store.load_variable(project.id, &variable.name)?.is_some();
            if exists {
                store.update_variable(project.id, &mut variable, &author)?;
                println!("✓ Variable {} updated", variable.name);
            } else {
                store.insert_variable(project.id, &mut variable, &author)?;
                println!("✓ Variable {} created", variable.name);
            }
        }
        VarCommand::Get {
            project,
            name,
            reveal,
        } => {
            let project = require_project(store, &project)?;
            match store.load_variable(project.id, &name)? {
                Some(variable) => {
                    let shown = if reveal { variable } else { variable.redacted() };
                    println!("  Name:   {}", shown.name);
                    println!("  Type:   {}", shown.var_type);
                    println!("  Value:  {}", shown.value);
                }
                None => println!("Variable not found: {}", name),
            }
        }
        VarCommand::List { project } => {
            let project = require_project(store, &project)?;
            let variables = store.list_variables(project.id)?;
            if variables.is_empty() {
                println!("No variables in project {}.", project.key);
                return Ok(());
            }

            println!("Variables of {} ({}):\n", project.key, variables.len());
            for variable in variables.into_iter().map(Variable::redacted) {
                println!(
                    "  {:24} │ {:10} │ {}",
                    variable.name, variable.var_type, variable.value
                );
            }
        }
        VarCommand::Delete {
            project,
            name,
            author,
        } => {
            let project = require_project(store, &project)?;
            if store.delete_variable(project.id, &name, &author)? {
                println!("✓ Variable {} deleted", name);
            } else {
                println!("Variable not found: {}", name);
            }
        }
        VarCommand::Audit { project, name } => {
            let project = require_project(store, &project)?;
            let variable_id = match store.load_variable(project.id, &name)? {
                Some(variable) => variable.id,
                None => store
                    .find_audited_variable_id(project.id, &name)?
                    .ok_or_else(|| {
                        VarsealError::Other(format!("No history for variable: {}", name))
                    })?,
            };

            let audits = store.load_variable_audits(project.id, variable_id)?;
            println!("Audit log for {}/{}", project.key, name);
            println!("{:-<80}", "");
            for audit in audits {
                println!("{}", audit);
            }
            println!("{:-<80}", "");
        }
    }
    Ok(())
}

// ─── Keys ────────────────────────────────────────────────────────────────────

fn cmd_key(store: &impl ProjectStore, command: KeyCommand) -> Result<(), VarsealError> {
    match command {
        KeyCommand::Add {
            project,
            name,
            key_type,
            public,
            private_file,
            key_id,
        } => {
            let project = require_project(store, &project)?;
            let private = std::fs::read_to_string(&private_file)?;
            let mut key = ProjectKey {
                id: 0,
                project_id: project.id,
                name,
                key_type,
                public,
                private,
                key_id,
                builtin: false,
            };
            store.insert_key(&mut key)?;
            println!("✓ Key {} added to {}", key.name, project.key);
        }
        KeyCommand::List { project } => {
            let project = require_project(store, &project)?;
            let keys = store.list_keys(project.id)?;
            if keys.is_empty() {
                println!("No keys in project {}.", project.key);
                return Ok(());
            }
            for key in &keys {
                println!("  {:24} │ {:4} │ {}", key.name, key.key_type, key.key_id);
            }
        }
        KeyCommand::Delete { project, name } => {
            let project = require_project(store, &project)?;
            if store.delete_key(project.id, &name)? {
                println!("✓ Key {} deleted", name);
            } else {
                println!("Key not found: {}", name);
            }
        }
    }
    Ok(())
}

// ─── Labels ──────────────────────────────────────────────────────────────────

fn cmd_label(store: &impl ProjectStore, command: LabelCommand) -> Result<(), VarsealError> {
    match command {
        LabelCommand::Add {
            project,
            name,
            color,
        } => {
            let project = require_project(store, &project)?;
            let mut label = Label {
                id: 0,
                project_id: project.id,
                name,
                color,
            };
            store.insert_label(&mut label)?;
            println!("✓ Label {} added to {}", label.name, project.key);
        }
        LabelCommand::List { project } => {
            let project = require_project(store, &project)?;
            for label in store.list_labels(project.id)? {
                println!("  {:24} │ {}", label.name, label.color);
            }
        }
    }
    Ok(())
}

// ─── Verify ──────────────────────────────────────────────────────────────────

fn cmd_verify(store: &impl ProjectStore) -> Result<(), VarsealError> {
    let report = store.verify_signatures()?;

    if report.is_clean() {
        println!("✓ {} signed rows verified", report.checked);
        return Ok(());
    }

    for failure in &report.failures {
        tracing::error!(table = failure.table, id = failure.id, "Integrity failure");
        println!("  ✗ {} #{}: {}", failure.table, failure.id, failure.reason);
    }
    Err(VarsealError::Other(format!(
        "{} of {} signed rows failed verification",
        report.failures.len(),
        report.checked
    )))
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Open the database and derive the key material from the platform keyring.
fn open_db(config: &VarsealConfig) -> Result<(Database, KeyMaterial), VarsealError> {
    let provider = config.key_provider();
    let master_secret = provider.load_master_secret()?;
    let keys = provider.derive_key_material(&master_secret)?;

    let path = config.db_path();
    if !path.exists() {
        return Err(VarsealError::Other(format!(
            "Database not found at {}. Run `varseal init` first.",
            path.display()
        )));
    }

    let db = Database::open(&path)?;
    Ok((db, keys))
}

fn with_store<F>(config: &VarsealConfig, f: F) -> Result<(), VarsealError>
where
    F: FnOnce(&SqliteProjectStore<'_>) -> Result<(), VarsealError>,
{
    let (db, keys) = open_db(config)?;
    let store = SqliteProjectStore::new(&db, &keys).with_options(config.hook_options());
    f(&store)
}

fn require_project(store: &impl ProjectStore, key: &str) -> Result<Project, VarsealError> {
    store
        .load_project(key)?
        .ok_or_else(|| VarsealError::Other(format!("Project not found: {}", key)))
}
