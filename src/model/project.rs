// Varseal - Project aggregate

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A project row plus its structured documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: i64,
    pub key: String,
    pub name: String,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    /// Free-form key/value metadata, stored as JSON.
    pub metadata: BTreeMap<String, String>,
    /// Deprecated VCS server settings, stored sealed.
    pub vcs_servers: Vec<VcsServer>,
}

impl Project {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            key: key.into(),
            name: name.into(),
            created: now,
            last_modified: now,
            metadata: BTreeMap::new(),
            vcs_servers: Vec::new(),
        }
    }
}

/// Legacy connection settings for an external version-control server.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsServer {
    pub name: String,
    #[serde(default)]
    pub username: String,
    /// Provider-specific settings, usually including tokens.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl fmt::Debug for VcsServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&String> = self.data.keys().collect();
        f.debug_struct("VcsServer")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("data_keys", &keys)
            .field("data", &"[REDACTED]")
            .finish()
    }
}
