//! Channel provider backed by the MongoDB driver
//!
//! `find`, `getMore` and `killCursors` are sent as database commands through
//! `Database::run_command`. A server cursor belongs to the session that
//! created it, so the provider owns one `ClientSession` and every command
//! runs in it. A channel holds that session for its exchange, which makes
//! channels exclusive. A server cursor also only exists on the host that
//! created it, so the provider can be pinned to one server address; the pin
//! is applied as a selection predicate on every command.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::Document;
use mongodb::options::{SelectionCriteria, ServerAddress};
use mongodb::{Client, ClientSession, ServerInfo};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::wire::{
    CursorReply, FindRequest, GetMoreReply, GetMoreRequest, KillCursorsReply, KillCursorsRequest,
};
use super::{Channel, ChannelProvider};
use crate::error::ChannelError;

/// Provider handing out command channels on one client session.
pub struct MongoChannelProvider {
    /// Session every command runs in, `None` once disposed
    session: Arc<Mutex<Option<ClientSession>>>,

    /// Database the cursor's namespace lives in
    database: String,

    /// Server the cursor was opened on
    pinned: Option<ServerAddress>,
}

impl MongoChannelProvider {
    /// Create a new provider with its own session
    ///
    /// # Arguments
    /// * `client` - MongoDB client
    /// * `database` - Database the cursor belongs to
    ///
    /// # Returns
    /// * `Result<Self, ChannelError>` - Provider, or the driver's error
    pub async fn start(
        client: &Client,
        database: impl Into<String>,
    ) -> Result<Self, ChannelError> {
        let session = client.start_session().await?;
        let database = database.into();
        debug!("Started session {} for database '{}'", session.id(), database);

        Ok(Self {
            session: Arc::new(Mutex::new(Some(session))),
            database,
            pinned: None,
        })
    }

    /// Route every command to one server.
    pub fn pinned_to(mut self, address: ServerAddress) -> Self {
        self.pinned = Some(address);
        self
    }

    /// Selection criteria matching the pinned server, if any.
    pub fn selection_criteria(&self) -> Option<SelectionCriteria> {
        self.pinned.clone().map(|address| {
            SelectionCriteria::Predicate(Arc::new(move |server: &ServerInfo| {
                server.address() == &address
            }))
        })
    }

    /// Open a cursor with `find` in the provider's session and on its server.
    ///
    /// The reply's first batch and cursor id seed a `Cursor`.
    pub async fn find(&self, request: &FindRequest) -> Result<CursorReply, ChannelError> {
        let cancel = CancellationToken::new();
        let mut channel = self.acquire(None, &cancel).await?;
        let reply = channel.run(request.to_command()).await?;
        debug!("Opened cursor on {} with find", request.namespace);
        CursorReply::from_first_batch(&reply)
    }
}

#[async_trait]
impl ChannelProvider for MongoChannelProvider {
    type Channel = MongoChannel;

    // Pool checkout happens inside the driver's command execution; acquiring
    // only waits for the session to be free.
    async fn acquire(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Self::Channel, ChannelError> {
        let lock = self.session.clone().lock_owned();
        let session = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ChannelError::AcquireFailed("cancelled".to_string()));
            }
            session = async {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, lock)
                        .await
                        .map_err(|_| ChannelError::Timeout(limit)),
                    None => Ok(lock.await),
                }
            } => session?,
        };

        if session.is_none() {
            return Err(ChannelError::Closed);
        }

        Ok(MongoChannel {
            session,
            database: self.database.clone(),
            criteria: self.selection_criteria(),
        })
    }

    async fn dispose(&self) -> Result<(), ChannelError> {
        // Dropping the session hands it back to the client's pool.
        if let Some(session) = self.session.lock().await.take() {
            debug!("Ended session {} for database '{}'", session.id(), self.database);
        }
        Ok(())
    }
}

/// One command exchange against a database, holding the provider's session.
pub struct MongoChannel {
    session: OwnedMutexGuard<Option<ClientSession>>,
    database: String,
    criteria: Option<SelectionCriteria>,
}

impl MongoChannel {
    /// Logical session id the channel's commands run under.
    pub fn session_id(&self) -> Option<&Document> {
        (*self.session).as_ref().map(|session| session.id())
    }

    async fn run(&mut self, command: Document) -> Result<Document, ChannelError> {
        let criteria = self.criteria.clone();
        let session = (*self.session).as_mut().ok_or(ChannelError::Closed)?;
        let database = session.client().database(&self.database);
        let action = database.run_command(command).session(&mut *session);
        let reply = match criteria {
            Some(criteria) => action.selection_criteria(criteria).await?,
            None => action.await?,
        };
        Ok(reply)
    }
}

#[async_trait]
impl Channel for MongoChannel {
    async fn get_more(&mut self, request: &GetMoreRequest) -> Result<GetMoreReply, ChannelError> {
        let reply = self.run(request.to_command()).await?;
        GetMoreReply::from_next_batch(&reply)
    }

    async fn kill_cursors(
        &mut self,
        request: &KillCursorsRequest,
    ) -> Result<KillCursorsReply, ChannelError> {
        let reply = self.run(request.to_command()).await?;
        Ok(KillCursorsReply::from_document(&reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Neither creating a client nor starting a session contacts a server.
    async fn provider() -> MongoChannelProvider {
        let client = Client::with_uri_str("mongodb://localhost:27017")
            .await
            .unwrap();
        MongoChannelProvider::start(&client, "shop").await.unwrap()
    }

    #[tokio::test]
    async fn test_channels_share_one_session() {
        let provider = provider().await;
        let cancel = CancellationToken::new();

        let first = provider.acquire(None, &cancel).await.unwrap();
        let first_id = first.session_id().cloned().unwrap();
        drop(first);

        let second = provider.acquire(None, &cancel).await.unwrap();
        assert_eq!(second.session_id(), Some(&first_id));
    }

    #[tokio::test]
    async fn test_channel_is_exclusive() {
        let provider = provider().await;
        let cancel = CancellationToken::new();

        let held = provider.acquire(None, &cancel).await.unwrap();
        let err = provider
            .acquire(Some(Duration::from_millis(50)), &cancel)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ChannelError::Timeout(_)));

        drop(held);
        assert!(provider.acquire(Some(Duration::from_millis(50)), &cancel).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_acquire_fails() {
        let provider = provider().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = provider.acquire(None, &cancel).await.err().unwrap();
        assert!(matches!(err, ChannelError::AcquireFailed(_)));
    }

    #[tokio::test]
    async fn test_dispose_ends_session() {
        let provider = provider().await;
        provider.dispose().await.unwrap();
        provider.dispose().await.unwrap();

        let err = provider
            .acquire(None, &CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_pinning_sets_selection_criteria() {
        let provider = provider().await;
        assert!(provider.selection_criteria().is_none());

        let pinned = provider.pinned_to(ServerAddress::Tcp {
            host: "db1".to_string(),
            port: Some(27017),
        });
        assert!(matches!(
            pinned.selection_criteria(),
            Some(SelectionCriteria::Predicate(_))
        ));
    }
}
