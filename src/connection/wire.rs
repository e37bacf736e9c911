//! Request and reply shapes for the two cursor commands.
//!
//! A cursor only ever sends `getMore` and `killCursors`. Both are ordinary
//! database commands, so they are encoded as BSON documents and decoded
//! from the `{ cursor: { id, ns, nextBatch } }` reply shape.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bson::{Bson, Document, doc};

use crate::error::ChannelError;

/// Database and collection a server cursor belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionNamespace {
    pub database: String,
    pub collection: String,
}

impl CollectionNamespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for CollectionNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

impl FromStr for CollectionNamespace {
    type Err = ChannelError;

    /// Parse `db.collection`. Collection names may themselves contain dots.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok(Self::new(db, coll)),
            _ => Err(ChannelError::Protocol(format!("invalid namespace '{s}'"))),
        }
    }
}

/// A `getMore` request for the next batch of a server cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct GetMoreRequest {
    pub cursor_id: i64,
    pub namespace: CollectionNamespace,
    pub batch_size: Option<u32>,
    pub max_await_time: Option<Duration>,
    pub comment: Option<Bson>,
}

impl GetMoreRequest {
    /// Encode as the `getMore` database command.
    pub fn to_command(&self) -> Document {
        let mut command = doc! {
            "getMore": self.cursor_id,
            "collection": self.namespace.collection.as_str(),
        };
        if let Some(size) = self.batch_size {
            command.insert("batchSize", i32::try_from(size).unwrap_or(i32::MAX));
        }
        if let Some(wait) = self.max_await_time {
            command.insert(
                "maxTimeMS",
                i64::try_from(wait.as_millis()).unwrap_or(i64::MAX),
            );
        }
        if let Some(ref comment) = self.comment {
            command.insert("comment", comment.clone());
        }
        command
    }
}

/// A `find` opening a server cursor and returning its first batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FindRequest {
    pub namespace: CollectionNamespace,
    pub filter: Document,
    pub batch_size: Option<u32>,
    pub limit: Option<u64>,
    pub comment: Option<Bson>,
}

impl FindRequest {
    /// Encode as the `find` database command.
    pub fn to_command(&self) -> Document {
        let mut command = doc! {
            "find": self.namespace.collection.as_str(),
            "filter": self.filter.clone(),
        };
        if let Some(size) = self.batch_size {
            command.insert("batchSize", i32::try_from(size).unwrap_or(i32::MAX));
        }
        if let Some(limit) = self.limit.filter(|limit| *limit > 0) {
            command.insert("limit", i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(ref comment) = self.comment {
            command.insert("comment", comment.clone());
        }
        command
    }
}

/// A `killCursors` request releasing server cursors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillCursorsRequest {
    pub namespace: CollectionNamespace,
    pub cursor_ids: Vec<i64>,
}

impl KillCursorsRequest {
    pub fn single(namespace: CollectionNamespace, cursor_id: i64) -> Self {
        Self {
            namespace,
            cursor_ids: vec![cursor_id],
        }
    }

    /// Encode as the `killCursors` database command.
    pub fn to_command(&self) -> Document {
        let ids: Vec<Bson> = self.cursor_ids.iter().map(|id| Bson::Int64(*id)).collect();
        doc! {
            "killCursors": self.namespace.collection.as_str(),
            "cursors": ids,
        }
    }
}

/// Cursor portion of a `find`, `aggregate` or `getMore` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorReply {
    pub cursor_id: i64,
    pub namespace: Option<CollectionNamespace>,
    pub documents: Vec<Document>,
}

/// Reply to a `getMore`: the server's cursor id and the `nextBatch` array.
pub type GetMoreReply = CursorReply;

impl CursorReply {
    /// Decode the reply of a cursor-creating command (`firstBatch`).
    pub fn from_first_batch(reply: &Document) -> Result<Self, ChannelError> {
        Self::parse(reply, "firstBatch")
    }

    /// Decode the reply of a `getMore` (`nextBatch`).
    pub fn from_next_batch(reply: &Document) -> Result<Self, ChannelError> {
        Self::parse(reply, "nextBatch")
    }

    fn parse(reply: &Document, batch_field: &str) -> Result<Self, ChannelError> {
        let cursor = reply
            .get_document("cursor")
            .map_err(|_| ChannelError::Protocol("reply has no 'cursor' document".to_string()))?;

        let cursor_id = match cursor.get("id") {
            Some(Bson::Int64(id)) => *id,
            Some(Bson::Int32(id)) => i64::from(*id),
            Some(other) => {
                return Err(ChannelError::Protocol(format!(
                    "unexpected type for cursor id: {other:?}"
                )));
            }
            None => return Err(ChannelError::Protocol("cursor has no 'id'".to_string())),
        };

        let namespace = match cursor.get_str("ns") {
            Ok(ns) => Some(ns.parse()?),
            Err(_) => None,
        };

        let batch = cursor.get_array(batch_field).map_err(|_| {
            ChannelError::Protocol(format!("cursor has no '{batch_field}' array"))
        })?;

        let documents = batch
            .iter()
            .map(|item| match item {
                Bson::Document(d) => Ok(d.clone()),
                other => Err(ChannelError::Protocol(format!(
                    "batch entry is not a document: {other:?}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            cursor_id,
            namespace,
            documents,
        })
    }
}

/// Reply to a `killCursors` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KillCursorsReply {
    pub cursors_killed: Vec<i64>,
    pub cursors_not_found: Vec<i64>,
}

impl KillCursorsReply {
    pub fn from_document(reply: &Document) -> Self {
        let ids = |field: &str| -> Vec<i64> {
            reply
                .get_array(field)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|b| match b {
                            Bson::Int64(v) => Some(*v),
                            Bson::Int32(v) => Some(i64::from(*v)),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        Self {
            cursors_killed: ids("cursorsKilled"),
            cursors_not_found: ids("cursorsNotFound"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> CollectionNamespace {
        CollectionNamespace::new("shop", "orders")
    }

    #[test]
    fn test_namespace_parse() {
        let parsed: CollectionNamespace = "shop.orders.archive".parse().unwrap();
        assert_eq!(parsed.database, "shop");
        assert_eq!(parsed.collection, "orders.archive");
        assert_eq!(parsed.to_string(), "shop.orders.archive");

        assert!("shop".parse::<CollectionNamespace>().is_err());
        assert!(".orders".parse::<CollectionNamespace>().is_err());
        assert!("shop.".parse::<CollectionNamespace>().is_err());
    }

    #[test]
    fn test_get_more_command() {
        let request = GetMoreRequest {
            cursor_id: 42,
            namespace: ns(),
            batch_size: Some(100),
            max_await_time: Some(Duration::from_millis(250)),
            comment: Some(Bson::String("tag".into())),
        };
        let command = request.to_command();

        // The command name must be the first key.
        assert_eq!(command.keys().next().map(String::as_str), Some("getMore"));
        assert_eq!(command.get_i64("getMore").unwrap(), 42);
        assert_eq!(command.get_str("collection").unwrap(), "orders");
        assert_eq!(command.get_i32("batchSize").unwrap(), 100);
        assert_eq!(command.get_i64("maxTimeMS").unwrap(), 250);
        assert_eq!(command.get_str("comment").unwrap(), "tag");
    }

    #[test]
    fn test_get_more_command_omits_unset_options() {
        let request = GetMoreRequest {
            cursor_id: 7,
            namespace: ns(),
            batch_size: None,
            max_await_time: None,
            comment: None,
        };
        let command = request.to_command();
        assert_eq!(command.len(), 2);
    }

    #[test]
    fn test_find_command() {
        let request = FindRequest {
            namespace: ns(),
            filter: doc! { "status": "open" },
            batch_size: Some(20),
            limit: Some(0),
            comment: None,
        };
        let command = request.to_command();

        assert_eq!(command.keys().next().map(String::as_str), Some("find"));
        assert_eq!(command.get_str("find").unwrap(), "orders");
        assert_eq!(
            command.get_document("filter").unwrap(),
            &doc! { "status": "open" }
        );
        assert_eq!(command.get_i32("batchSize").unwrap(), 20);
        assert!(!command.contains_key("limit"));
    }

    #[test]
    fn test_kill_cursors_command() {
        let command = KillCursorsRequest::single(ns(), 99).to_command();
        assert_eq!(command.get_str("killCursors").unwrap(), "orders");
        assert_eq!(
            command.get_array("cursors").unwrap(),
            &vec![Bson::Int64(99)]
        );
    }

    #[test]
    fn test_parse_next_batch() {
        let reply = doc! {
            "cursor": {
                "id": 0_i64,
                "ns": "shop.orders",
                "nextBatch": [ { "a": 1 }, { "a": 2 } ],
            },
            "ok": 1.0,
        };
        let parsed = CursorReply::from_next_batch(&reply).unwrap();
        assert_eq!(parsed.cursor_id, 0);
        assert_eq!(parsed.namespace, Some(ns()));
        assert_eq!(parsed.documents, vec![doc! { "a": 1 }, doc! { "a": 2 }]);
    }

    #[test]
    fn test_parse_first_batch_with_int32_id() {
        let reply = doc! { "cursor": { "id": 5_i32, "firstBatch": [] } };
        let parsed = CursorReply::from_first_batch(&reply).unwrap();
        assert_eq!(parsed.cursor_id, 5);
        assert!(parsed.namespace.is_none());
        assert!(parsed.documents.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_replies() {
        assert!(CursorReply::from_next_batch(&doc! { "ok": 1 }).is_err());
        assert!(CursorReply::from_next_batch(&doc! { "cursor": { "nextBatch": [] } }).is_err());
        assert!(CursorReply::from_next_batch(&doc! { "cursor": { "id": 1_i64 } }).is_err());
        assert!(
            CursorReply::from_next_batch(&doc! { "cursor": { "id": 1_i64, "nextBatch": [1] } })
                .is_err()
        );
        // firstBatch is not accepted where nextBatch is expected.
        assert!(
            CursorReply::from_next_batch(&doc! { "cursor": { "id": 1_i64, "firstBatch": [] } })
                .is_err()
        );
    }

    #[test]
    fn test_kill_cursors_reply() {
        let reply = doc! {
            "cursorsKilled": [ 1_i64 ],
            "cursorsNotFound": [ 2_i64 ],
            "cursorsAlive": [],
            "ok": 1,
        };
        let parsed = KillCursorsReply::from_document(&reply);
        assert_eq!(parsed.cursors_killed, vec![1]);
        assert_eq!(parsed.cursors_not_found, vec![2]);
    }
}
