//! Construction inputs for a cursor.

use std::time::Duration;

use bson::{Bson, Document};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::connection::{CollectionNamespace, CursorReply};

/// The server cursor as returned by the command that created it.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorSpec {
    /// Namespace the cursor iterates
    pub namespace: CollectionNamespace,

    /// Initial cursor id, `0` if the first batch is also the last
    pub cursor_id: i64,

    /// Documents returned with the creating command
    pub first_batch: Vec<Document>,
}

impl CursorSpec {
    /// Build from a `find`/`aggregate` reply.
    ///
    /// The namespace reported by the server wins over `requested`: an
    /// aggregation on a view reports the underlying collection.
    pub fn from_reply(reply: CursorReply, requested: CollectionNamespace) -> Self {
        Self {
            namespace: reply.namespace.unwrap_or(requested),
            cursor_id: reply.cursor_id,
            first_batch: reply.documents,
        }
    }
}

/// Per-cursor behaviour, fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct CursorOptions {
    /// `batchSize` sent with each `getMore`, server default when `None`
    pub batch_size: Option<u32>,

    /// Maximum number of documents to yield
    pub limit: Option<u64>,

    /// Bounds channel acquisition plus exchange for every fetch
    pub timeout: Option<Duration>,

    /// `maxTimeMS` sent with each `getMore`
    pub max_await_time: Option<Duration>,

    /// `comment` attached to each `getMore`; a generated tag when `None`
    pub comment: Option<Bson>,

    /// Cancels in-flight and future fetches
    pub cancel: CancellationToken,
}

impl CursorOptions {
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

/// Generate a comment identifying this process and cursor.
///
/// Format: `mongocursor-<host>-<uuid>`
pub fn operation_comment() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("mongocursor-{}-{}", host, Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_operation_comment_format() {
        let comment = operation_comment();
        assert!(comment.starts_with("mongocursor-"));
        assert_ne!(comment, operation_comment());
    }

    #[test]
    fn test_spec_prefers_server_namespace() {
        let reply = CursorReply {
            cursor_id: 3,
            namespace: Some(CollectionNamespace::new("shop", "system.views_base")),
            documents: vec![doc! { "a": 1 }],
        };
        let spec = CursorSpec::from_reply(reply, CollectionNamespace::new("shop", "view"));
        assert_eq!(spec.namespace.collection, "system.views_base");
        assert_eq!(spec.cursor_id, 3);
    }
}
