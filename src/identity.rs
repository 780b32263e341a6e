// 🪪 Identity - Immutable value identifying a person
// kind + value (+ optional display name). No normalization: emails are compared
// exactly as written, case included.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// IDENTITY KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    /// E-mail address (the only kind Gerrit asks about)
    Email,

    /// GitHub account name
    Github,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::Email => "email",
            IdentityKind::Github => "github",
        }
    }
}

impl FromStr for IdentityKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(IdentityKind::Email),
            "github" => Ok(IdentityKind::Github),
            other => Err(ValidationError::new(
                "kind",
                format!("unrecognized identity kind '{}'", other),
            )),
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// IDENTITY
// ============================================================================

/// Structural equality on (kind, value, name).
///
/// Fields are private so an `Identity` cannot change after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    kind: IdentityKind,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl Identity {
    pub fn new(kind: IdentityKind, value: impl Into<String>, name: Option<String>) -> Self {
        Identity {
            kind,
            value: value.into(),
            name,
        }
    }

    pub fn email(value: impl Into<String>) -> Self {
        Identity::new(IdentityKind::Email, value, None)
    }

    /// Build from an untyped kind string, rejecting kinds we don't know.
    pub fn from_parts(
        kind: &str,
        value: impl Into<String>,
        name: Option<String>,
    ) -> Result<Self, ValidationError> {
        Ok(Identity::new(kind.parse()?, value, name))
    }

    /// Parse the `kind:value` notation, e.g. `email:alice@example.com`.
    pub fn parse(notation: &str) -> Result<Self, ValidationError> {
        let (kind, value) = notation.split_once(':').ok_or_else(|| {
            ValidationError::new("identity", format!("expected kind:value, got '{}'", notation))
        })?;
        if value.is_empty() {
            return Err(ValidationError::new("value", "identity value is empty"));
        }
        Identity::from_parts(kind, value, None)
    }

    pub fn kind(&self) -> IdentityKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Same person regardless of display name (kind + value only).
    pub fn same_principal(&self, other: &Identity) -> bool {
        self.kind == other.kind && self.value == other.value
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut json = serde_json::json!({
            "kind": self.kind.as_str(),
            "value": self.value,
        });
        if let Some(name) = &self.name {
            json["name"] = serde_json::json!(name);
        }
        json
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}
