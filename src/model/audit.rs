// Varseal - Variable audit records

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::Variable;

/// Kind of mutation that produced an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    Add,
    Update,
    Delete,
}

impl AuditEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown audit event '{}'", other)),
        }
    }
}

/// Before/after snapshot of a variable mutation.
///
/// Snapshots of secret-class variables only ever hold the placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectVariableAudit {
    pub id: i64,
    pub project_id: i64,
    pub variable_id: i64,
    pub event: AuditEvent,
    pub before: Option<Variable>,
    pub after: Variable,
    pub versionned: DateTime<Utc>,
    pub author: String,
}

impl fmt::Display for ProjectVariableAudit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} by '{}'",
            self.versionned.format("%Y-%m-%d %H:%M:%S"),
            self.event,
            self.author
        )?;
        match &self.before {
            Some(before) => write!(
                f,
                " {}: '{}' -> '{}'",
                before.name, before.value, self.after.value
            ),
            None => write!(f, " {}: '{}'", self.after.name, self.after.value),
        }
    }
}
