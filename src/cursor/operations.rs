//! The two server exchanges a cursor performs.
//!
//! - `fetch_batch`: one `getMore`, bounded by the caller's timeout and
//!   cancellation token
//! - `release_cursor`: one `killCursors`, deliberately unbounded so cleanup
//!   cannot be preempted
//! - `release_or_log`: the same, with failures logged for disposal paths

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::{
    Channel, ChannelProvider, CollectionNamespace, GetMoreRequest, KillCursorsRequest,
};
use crate::error::{ChannelError, CursorError, Result, is_cursor_not_found};

use super::materializer::DocumentMaterializer;

/// A batch returned by `getMore`, already materialized.
#[derive(Debug)]
pub struct FetchedBatch<T> {
    /// Cursor id reported by the server, `0` once exhausted
    pub cursor_id: i64,

    /// Documents in server order
    pub documents: Vec<T>,
}

/// Fetch the next batch of a server cursor.
///
/// The channel is acquired for this one exchange and released when it
/// completes, whatever the outcome. Failures are not retried.
///
/// # Arguments
/// * `provider` - Channel source
/// * `request` - The `getMore` to send
/// * `materializer` - Converts the raw batch
/// * `timeout` - Bounds acquisition plus exchange
/// * `cancel` - Aborts before or during the exchange
///
/// # Returns
/// * `Result<FetchedBatch<T>>` - New cursor id and documents
pub async fn fetch_batch<T, P>(
    provider: &P,
    request: GetMoreRequest,
    materializer: &dyn DocumentMaterializer<T>,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<FetchedBatch<T>>
where
    T: Send + 'static,
    P: ChannelProvider,
{
    if cancel.is_cancelled() {
        return Err(CursorError::Cancelled);
    }

    let exchange = async {
        let mut channel = provider.acquire(timeout, cancel).await?;
        channel.get_more(&request).await
    };

    let bounded = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(result) => result,
                Err(_) => Err(ChannelError::Timeout(limit)),
            },
            None => exchange.await,
        }
    };

    let reply = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(CursorError::Cancelled),
        reply = bounded => reply?,
    };

    debug!(
        "getMore on {} returned {} documents (cursor {} -> {})",
        request.namespace,
        reply.documents.len(),
        request.cursor_id,
        reply.cursor_id
    );

    let documents = materializer.materialize(reply.documents)?;

    Ok(FetchedBatch {
        cursor_id: reply.cursor_id,
        documents,
    })
}

/// Release a server cursor.
///
/// Waits as long as it takes for a channel and ignores cancellation:
/// leaving the cursor open leaks server memory until the server times it out.
pub async fn release_cursor<P>(
    provider: &P,
    namespace: &CollectionNamespace,
    cursor_id: i64,
) -> std::result::Result<(), ChannelError>
where
    P: ChannelProvider,
{
    if cursor_id == 0 {
        return Ok(());
    }

    let never = CancellationToken::new();
    let mut channel = provider.acquire(None, &never).await?;
    let reply = channel
        .kill_cursors(&KillCursorsRequest::single(namespace.clone(), cursor_id))
        .await?;

    if reply.cursors_not_found.contains(&cursor_id) {
        debug!("Cursor {} on {} was already gone", cursor_id, namespace);
    } else {
        debug!("Released cursor {} on {}", cursor_id, namespace);
    }
    Ok(())
}

/// Release a server cursor, logging instead of failing.
///
/// `CursorNotFound` means the server already closed it, which counts as
/// released.
///
/// # Returns
/// * `bool` - True if the server cursor is known to be gone
pub async fn release_or_log<P>(
    provider: &P,
    namespace: &CollectionNamespace,
    cursor_id: i64,
) -> bool
where
    P: ChannelProvider,
{
    match release_cursor(provider, namespace, cursor_id).await {
        Ok(()) => true,
        Err(ChannelError::MongoDb(ref e)) if is_cursor_not_found(e) => {
            debug!("Cursor {} on {} was already gone", cursor_id, namespace);
            true
        }
        Err(e) => {
            warn!("Failed to release cursor {} on {}: {}", cursor_id, namespace, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::{MockProvider, Step, docs};
    use crate::cursor::materializer::BsonMaterializer;

    fn request(cursor_id: i64) -> GetMoreRequest {
        GetMoreRequest {
            cursor_id,
            namespace: CollectionNamespace::new("shop", "orders"),
            batch_size: Some(2),
            max_await_time: None,
            comment: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_batch() {
        let provider = MockProvider::new(vec![Step::batch(7, &[1, 2])]);
        let batch = fetch_batch(
            &provider,
            request(7),
            &BsonMaterializer,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(batch.cursor_id, 7);
        assert_eq!(batch.documents, docs(&[1, 2]));
        assert_eq!(provider.get_mores(), vec![request(7)]);
    }

    #[tokio::test]
    async fn test_fetch_batch_cancelled_before_send() {
        let provider = MockProvider::new(vec![Step::batch(0, &[1])]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fetch_batch(&provider, request(7), &BsonMaterializer, None, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, CursorError::Cancelled));
        assert_eq!(provider.acquisitions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_batch_cancelled_mid_exchange() {
        let provider = MockProvider::new(vec![Step::Stall]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = fetch_batch(&provider, request(7), &BsonMaterializer, None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CursorError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_batch_timeout() {
        let provider = MockProvider::new(vec![Step::Stall]);
        let err = fetch_batch(
            &provider,
            request(7),
            &BsonMaterializer,
            Some(Duration::from_secs(5)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            CursorError::Channel(ChannelError::Timeout(d)) if d == Duration::from_secs(5)
        ));
    }

    #[tokio::test]
    async fn test_fetch_batch_channel_failure() {
        let provider = MockProvider::new(vec![Step::Fail]);
        let err = fetch_batch(
            &provider,
            request(7),
            &BsonMaterializer,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(err.is_channel());
    }

    #[tokio::test]
    async fn test_release_cursor() {
        let provider = MockProvider::default();
        let ns = CollectionNamespace::new("shop", "orders");

        release_cursor(&provider, &ns, 7).await.unwrap();
        release_cursor(&provider, &ns, 0).await.unwrap();

        let kills = provider.kills();
        assert_eq!(kills.len(), 1);
        assert_eq!(kills[0].cursor_ids, vec![7]);
    }
}
