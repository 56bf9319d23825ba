//! Identity of externally tracked entities (tickets, changesets, profiles)

use facet::Facet;

/// What kind of entity a reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Facet)]
#[repr(u8)]
pub enum EntityKind {
    /// Tracker ticket, written `#123`
    Ticket,
    /// Repository changeset, written `[123]`
    Changeset,
    /// Contributor profile, named in Props / Reviewed by
    Profile,
}

impl EntityKind {
    /// Get the string representation of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Ticket => "ticket",
            EntityKind::Changeset => "changeset",
            EntityKind::Profile => "profile",
        }
    }

    /// Check an identifier's syntax before it is looked up anywhere.
    ///
    /// Tickets and changesets are plain numbers; profiles only need to be
    /// non-empty here (the stricter username syntax is a grammar concern).
    pub fn accepts(&self, identifier: &str) -> bool {
        match self {
            EntityKind::Ticket | EntityKind::Changeset => {
                !identifier.is_empty() && identifier.bytes().all(|b| b.is_ascii_digit())
            }
            EntityKind::Profile => !identifier.is_empty(),
        }
    }

    /// How the identifier is written in a commit message
    pub fn label(&self, identifier: &str) -> String {
        match self {
            EntityKind::Ticket => format!("#{identifier}"),
            EntityKind::Changeset => format!("[{identifier}]"),
            EntityKind::Profile => format!("@{identifier}"),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache and in-flight identity of an entity: exact match on both fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Facet)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub identifier: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
        }
    }

    pub fn label(&self) -> String {
        self.kind.label(&self.identifier)
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.identifier)
    }
}

/// Whether a Props / Reviewed by token is a well-formed username.
pub fn is_valid_username(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
