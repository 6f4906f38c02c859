// Varseal - CLI Module
//
// Command-line interface using clap derive macros.
// Subcommands: init, project, var, key, label, verify.

mod commands;

use clap::{Parser, Subcommand};

use crate::model::{KeyType, VariableType};

pub use commands::execute;

/// Varseal: sealed, signed and audited project variables.
#[derive(Parser, Debug)]
#[command(name = "varseal")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Varseal: create the master secret and the database.
    Init,

    /// Manage projects.
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },

    /// Manage project variables.
    Var {
        #[command(subcommand)]
        command: VarCommand,
    },

    /// Manage project keys.
    Key {
        #[command(subcommand)]
        command: KeyCommand,
    },

    /// Manage project labels.
    Label {
        #[command(subcommand)]
        command: LabelCommand,
    },

    /// Re-read every signed row and report integrity failures.
    Verify,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Create a project.
    Create {
        /// Unique project key (e.g., "PRJ").
        key: String,

        /// Display name.
        #[arg(long)]
        name: String,

        /// Metadata entries as key=value, repeatable.
        #[arg(long = "meta", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,
    },

    /// Show a project and its metadata.
    Show { key: String },

    /// Clear the legacy VCS document if it can no longer be decoded.
    RepairVcs { key: String },
}

#[derive(Subcommand, Debug)]
pub enum VarCommand {
    /// Create or replace a variable.
    Set {
        project: String,
        name: String,
        value: String,

        /// Variable type (string, text, boolean, number, list, repository,
        /// password, key, ssh-key, pgp-key).
        #[arg(long = "type", default_value = "string")]
        var_type: VariableType,

        /// Recorded as the author of the audit entry.
        #[arg(long, default_value = "varseal-cli")]
        author: String,
    },

    /// Show a variable. Secret values are redacted unless --reveal is given.
    Get {
        project: String,
        name: String,

        #[arg(long)]
        reveal: bool,
    },

    /// List the variables of a project, secrets redacted.
    List { project: String },

    /// Delete a variable.
    Delete {
        project: String,
        name: String,

        #[arg(long, default_value = "varseal-cli")]
        author: String,
    },

    /// Show the audit history of a variable, including deleted ones.
    Audit { project: String, name: String },
}

#[derive(Subcommand, Debug)]
pub enum KeyCommand {
    /// Add a key. The private half is read from a file to keep it out of shell history.
    Add {
        project: String,
        name: String,

        #[arg(long = "type")]
        key_type: KeyType,

        #[arg(long)]
        public: String,

        #[arg(long)]
        private_file: std::path::PathBuf,

        #[arg(long, default_value = "")]
        key_id: String,
    },

    /// List the keys of a project (public halves only).
    List { project: String },

    /// Delete a key.
    Delete { project: String, name: String },
}

#[derive(Subcommand, Debug)]
pub enum LabelCommand {
    Add {
        project: String,
        name: String,

        #[arg(long, default_value = "#000000")]
        color: String,
    },

    List { project: String },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_set() {
        let cli = Cli::try_parse_from([
            "varseal", "var", "set", "PRJ", "TOKEN", "s3cr3t", "--type", "password",
        ])
        .unwrap();
        match cli.command {
            Commands::Var {
                command: VarCommand::Set { var_type, author, .. },
            } => {
                assert_eq!(var_type, VariableType::Password);
                assert_eq!(author, "varseal-cli");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_var_type_is_rejected() {
        assert!(Cli::try_parse_from([
            "varseal", "var", "set", "PRJ", "X", "1", "--type", "secret"
        ])
        .is_err());
    }

    #[test]
    fn test_parse_metadata_pairs() {
        assert_eq!(
            parse_key_value("team = core").unwrap(),
            ("team".to_string(), "core".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
