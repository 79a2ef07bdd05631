//! Action token codec.
//!
//! Every interactive button carries an opaque value of the form
//! `{kind}_{entryId}[_{secondaryId}]`. Tokens are generated when a
//! notification is rendered and consumed exactly once when an operator
//! clicks the button; nothing about them is persisted.

use std::fmt;
use thiserror::Error;

/// Separator between token parts. Entry ids must never contain it.
pub const SEPARATOR: char = '_';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("action token '{0}' needs at least an action kind and an entry id")]
    Malformed(String),
    #[error("unknown action kind '{0}'")]
    UnknownKind(String),
    #[error("action kind '{0}' requires a secondary entry id")]
    MissingSecondaryId(ActionKind),
    #[error("entry id '{0}' contains the token separator")]
    IdContainsSeparator(String),
}

/// Closed set of operations an operator can trigger from a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Approve,
    Refresh,
    MarkComplete,
    Delete,
    RejectDelete,
    Edit,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Approve => "Approve",
            ActionKind::Refresh => "Refresh",
            ActionKind::MarkComplete => "MarkComplete",
            ActionKind::Delete => "Delete",
            ActionKind::RejectDelete => "RejectDelete",
            ActionKind::Edit => "Edit",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "Approve" => Some(ActionKind::Approve),
            "Refresh" => Some(ActionKind::Refresh),
            "MarkComplete" => Some(ActionKind::MarkComplete),
            "Delete" => Some(ActionKind::Delete),
            "RejectDelete" => Some(ActionKind::RejectDelete),
            "Edit" => Some(ActionKind::Edit),
            _ => None,
        }
    }

    /// Delete references two records: the workout to trash and the
    /// delete-request record that asked for it.
    fn requires_secondary(&self) -> bool {
        matches!(self, ActionKind::Delete)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionToken {
    pub kind: ActionKind,
    pub entry_id: String,
    pub secondary_id: Option<String>,
}

impl ActionToken {
    pub fn new(kind: ActionKind, entry_id: impl Into<String>) -> Self {
        Self {
            kind,
            entry_id: entry_id.into(),
            secondary_id: None,
        }
    }

    pub fn with_secondary(
        kind: ActionKind,
        entry_id: impl Into<String>,
        secondary_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            entry_id: entry_id.into(),
            secondary_id: Some(secondary_id.into()),
        }
    }

    /// Serialize to the wire form. Ids containing the separator would
    /// silently corrupt parsing on the way back, so they are rejected here.
    pub fn encode(&self) -> Result<String, TokenError> {
        for id in std::iter::once(&self.entry_id).chain(self.secondary_id.as_ref()) {
            if id.contains(SEPARATOR) {
                return Err(TokenError::IdContainsSeparator(id.clone()));
            }
        }
        if self.kind.requires_secondary() && self.secondary_id.is_none() {
            return Err(TokenError::MissingSecondaryId(self.kind));
        }
        let mut out = format!("{}{}{}", self.kind, SEPARATOR, self.entry_id);
        if let Some(secondary) = &self.secondary_id {
            out.push(SEPARATOR);
            out.push_str(secondary);
        }
        Ok(out)
    }

    pub fn decode(raw: &str) -> Result<Self, TokenError> {
        let parts: Vec<&str> = raw.split(SEPARATOR).collect();
        if parts.len() < 2 || parts[1].is_empty() {
            return Err(TokenError::Malformed(raw.to_string()));
        }
        let kind = ActionKind::parse(parts[0])
            .ok_or_else(|| TokenError::UnknownKind(parts[0].to_string()))?;
        let secondary_id = parts.get(2).filter(|s| !s.is_empty()).map(|s| s.to_string());
        if kind.requires_secondary() && secondary_id.is_none() {
            return Err(TokenError::MissingSecondaryId(kind));
        }
        Ok(Self {
            kind,
            entry_id: parts[1].to_string(),
            secondary_id,
        })
    }
}
