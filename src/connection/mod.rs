//! Channel management for cursor exchanges
//!
//! This module provides:
//! - The `ChannelProvider` / `Channel` seam the cursor talks through
//! - Request and reply types for `getMore` and `killCursors`
//! - A provider backed by the MongoDB driver
//!
//! The cursor never talks to the network directly. Each exchange acquires
//! a channel, sends one request, and drops the channel again.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ChannelError;

pub mod mongo;
pub mod wire;

#[cfg(test)]
pub(crate) mod mock;

pub use mongo::MongoChannelProvider;
pub use wire::{
    CollectionNamespace, CursorReply, FindRequest, GetMoreReply, GetMoreRequest, KillCursorsReply,
    KillCursorsRequest,
};

/// Source of exclusive, time-bounded channels to one server.
///
/// A provider is owned by a single cursor and shared with that cursor's
/// background fetch. It is disposed exactly once, when the cursor is.
#[async_trait]
pub trait ChannelProvider: Send + Sync + 'static {
    /// Channel type handed out by this provider
    type Channel: Channel;

    /// Acquire a channel
    ///
    /// # Arguments
    /// * `timeout` - Upper bound on the wait, `None` waits indefinitely
    /// * `cancel` - Aborts the wait when triggered
    ///
    /// # Returns
    /// * `Result<Self::Channel, ChannelError>` - Channel, released on drop
    async fn acquire(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Self::Channel, ChannelError>;

    /// Release every resource held by the provider
    async fn dispose(&self) -> Result<(), ChannelError>;
}

/// A scoped communication path to one server.
#[async_trait]
pub trait Channel: Send {
    /// Send a `getMore` and return the next batch
    async fn get_more(&mut self, request: &GetMoreRequest) -> Result<GetMoreReply, ChannelError>;

    /// Send a `killCursors`
    async fn kill_cursors(
        &mut self,
        request: &KillCursorsRequest,
    ) -> Result<KillCursorsReply, ChannelError>;
}
