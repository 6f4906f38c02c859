// Varseal - Variable value objects and the redaction policy
//
// `VariableType::needs_secret_storage` is the single classification used both
// to pick the sealed column and to redact audit snapshots.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Placeholder written in place of secret values outside the primary row.
pub const PASSWORD_PLACEHOLDER: &str = "**********";

/// Declared type of a project variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableType {
    #[default]
    #[serde(rename = "string")]
    String,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "list")]
    List,
    #[serde(rename = "repository")]
    Repository,
    #[serde(rename = "password")]
    Password,
    #[serde(rename = "key")]
    Key,
    #[serde(rename = "ssh-key")]
    SshKey,
    #[serde(rename = "pgp-key")]
    PgpKey,
}

impl VariableType {
    pub const ALL: [VariableType; 10] = [
        Self::String,
        Self::Text,
        Self::Boolean,
        Self::Number,
        Self::List,
        Self::Repository,
        Self::Password,
        Self::Key,
        Self::SshKey,
        Self::PgpKey,
    ];

    /// Token stored in the `var_type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::List => "list",
            Self::Repository => "repository",
            Self::Password => "password",
            Self::Key => "key",
            Self::SshKey => "ssh-key",
            Self::PgpKey => "pgp-key",
        }
    }

    /// True for secret-class types: sealed at rest, redacted in history.
    pub fn needs_secret_storage(self) -> bool {
        matches!(
            self,
            Self::Password | Self::Key | Self::SshKey | Self::PgpKey
        )
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariableType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown variable type '{}'", s))
    }
}

/// Logical project variable, regardless of where its value is stored.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    #[serde(default)]
    pub value: String,
}

impl Variable {
    pub fn new(name: impl Into<String>, var_type: VariableType, value: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            var_type,
            value: value.into(),
        }
    }

    /// Copy safe to write into non-primary storage.
    pub fn redacted(mut self) -> Self {
        redact(&mut self);
        self
    }
}

/// In-place redaction. Idempotent.
pub fn redact(variable: &mut Variable) {
    if variable.var_type.needs_secret_storage() {
        variable.value = PASSWORD_PLACEHOLDER.to_string();
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value: &str = if self.var_type.needs_secret_storage() {
            "[REDACTED]"
        } else {
            &self.value
        };
        f.debug_struct("Variable")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("var_type", &self.var_type)
            .field("value", &value)
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_classification() {
        let secret: Vec<_> = VariableType::ALL
            .into_iter()
            .filter(|t| t.needs_secret_storage())
            .collect();
        assert_eq!(
            secret,
            vec![
                VariableType::Password,
                VariableType::Key,
                VariableType::SshKey,
                VariableType::PgpKey
            ]
        );
    }

    #[test]
    fn test_type_tokens_round_trip() {
        for t in VariableType::ALL {
            assert_eq!(t.as_str().parse::<VariableType>().unwrap(), t);
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
        assert!("secret".parse::<VariableType>().is_err());
    }

    #[test]
    fn test_redact_secret_uses_placeholder() {
        let v = Variable::new("TOKEN", VariableType::Password, "s3cr3t").redacted();
        assert_eq!(v.value, PASSWORD_PLACEHOLDER);
        assert_eq!(v.name, "TOKEN");
    }

    #[test]
    fn test_redact_plain_is_identity() {
        let v = Variable::new("BRANCH", VariableType::String, "main");
        assert_eq!(v.clone().redacted(), v);
    }

    #[test]
    fn test_redact_is_idempotent() {
        for t in VariableType::ALL {
            let once = Variable::new("X", t, "value").redacted();
            let twice = once.clone().redacted();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_debug_never_shows_secret() {
        let v = Variable::new("TOKEN", VariableType::SshKey, "-----BEGIN KEY-----");
        let out = format!("{:?}", v);
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("BEGIN KEY"));
    }

    #[test]
    fn test_json_shape() {
        let v = Variable::new("TOKEN", VariableType::Password, "x");
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["type"], "password");
        assert_eq!(json["name"], "TOKEN");
    }
}
