use std::time::Duration;

use crate::{
    error::{Error, codes},
    protocol::ObjectKind,
};

/// How a drop reacts to the object being absent already.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingObject {
    /// Treat "not found" as success.
    Ignore,
    /// Surface the server error.
    Error,
}

/// Per object kind policy for drops of missing objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropPolicy {
    pub schema: MissingObject,
    pub table: MissingObject,
    pub view: MissingObject,
    pub collection: MissingObject,
}

impl Default for DropPolicy {
    fn default() -> Self {
        Self::uniform(MissingObject::Ignore)
    }
}

impl DropPolicy {
    pub fn uniform(missing: MissingObject) -> Self {
        Self {
            schema: missing,
            table: missing,
            view: missing,
            collection: missing,
        }
    }

    pub fn for_kind(&self, kind: ObjectKind) -> MissingObject {
        match kind {
            ObjectKind::Schema => self.schema,
            ObjectKind::Table => self.table,
            ObjectKind::View => self.view,
            ObjectKind::Collection => self.collection,
        }
    }

    /// Whether `error` from dropping an object of `kind` should be swallowed.
    pub fn suppresses(&self, kind: ObjectKind, error: &Error) -> bool {
        if self.for_kind(kind) == MissingObject::Error {
            return false;
        }
        let not_found: &[u32] = match kind {
            ObjectKind::Schema => &[codes::DB_DROP_EXISTS, codes::BAD_DB],
            _ => &[codes::BAD_TABLE, codes::NO_SUCH_TABLE],
        };
        error.code().is_some_and(|code| not_found.contains(&code))
    }
}

/// Session settings supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Longest wait for a frame. Expiry breaks the session.
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub drop_policy: DropPolicy,
}

impl SessionOptions {
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn with_drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }
}
