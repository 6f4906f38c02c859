// Varseal - Project keys

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Ssh,
    Pgp,
}

impl KeyType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::Pgp => "pgp",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ssh" => Ok(Self::Ssh),
            "pgp" => Ok(Self::Pgp),
            other => Err(format!("unknown key type '{}'", other)),
        }
    }
}

/// A project-level credential. `private` is sealed at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct ProjectKey {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub key_type: KeyType,
    pub public: String,
    pub private: String,
    pub key_id: String,
    pub builtin: bool,
}

impl fmt::Debug for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectKey")
            .field("id", &self.id)
            .field("project_id", &self.project_id)
            .field("name", &self.name)
            .field("key_type", &self.key_type)
            .field("public", &self.public)
            .field("private", &"[REDACTED]")
            .field("key_id", &self.key_id)
            .field("builtin", &self.builtin)
            .finish()
    }
}
