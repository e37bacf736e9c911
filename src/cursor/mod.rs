//! Forward-only cursor over a server-side result set
//!
//! This module provides:
//! - `Cursor`: batch and position bookkeeping, advance semantics, disposal
//! - Background prefetch of the next batch while the current one is read
//! - Pluggable prefetch policies and document materializers
//!
//! A cursor has a single logical consumer. The only concurrency is between
//! that consumer and the one background `getMore` it may have in flight;
//! the two meet exclusively in the prefetch slot.

use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document};
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::connection::{ChannelProvider, CollectionNamespace, GetMoreRequest};
use crate::error::{CursorError, Result};

pub mod materializer;
pub mod operations;
pub mod options;
pub mod policy;
pub mod prefetch;
mod stream;


pub use materializer::{BsonMaterializer, DocumentMaterializer, SerdeMaterializer};
pub use operations::{FetchedBatch, fetch_batch, release_cursor, release_or_log};
pub use options::{CursorOptions, CursorSpec, operation_comment};
pub use policy::{
    AlwaysPrefetch, CursorProgress, NeverPrefetch, PrefetchMode, PrefetchPolicy, RemainingBelow,
};
pub use prefetch::PrefetchCoordinator;

/// Client-side handle on a server cursor.
///
/// States: active (the server or the current batch still has documents),
/// exhausted (`advance` returns `false`), faulted (a fetch failed, only
/// disposal remains) and disposed (terminal).
pub struct Cursor<T, P: ChannelProvider> {
    /// Namespace the cursor iterates
    namespace: CollectionNamespace,

    /// Server cursor id, `0` once the server has nothing more
    cursor_id: i64,

    /// Batch being consumed
    current_batch: Vec<T>,

    /// Position in `current_batch`, `None` before the first item
    batch_index: Option<usize>,

    /// Batches installed so far
    batch_number: u64,

    /// Documents yielded so far
    yielded: u64,

    /// Documents received from the server so far (after limit truncation)
    received: u64,

    provider: Arc<P>,
    materializer: Arc<dyn DocumentMaterializer<T>>,
    policy: Box<dyn PrefetchPolicy>,
    prefetch: PrefetchCoordinator<T>,
    options: CursorOptions,

    /// Comment sent with every `getMore`
    comment: Bson,

    /// Message of the fetch failure that faulted the cursor
    fault: Option<String>,

    disposed: bool,
}

impl<T, P> Cursor<T, P>
where
    T: Send + 'static,
    P: ChannelProvider,
{
    /// Create a cursor from an already-fetched first batch
    ///
    /// Prefetching defaults to `AlwaysPrefetch`; see `with_policy`.
    ///
    /// # Arguments
    /// * `spec` - Namespace, initial cursor id and first batch
    /// * `provider` - Channel source, released when the cursor is disposed
    /// * `materializer` - Converts each raw batch
    /// * `options` - Batch size, limit, timeout and cancellation
    ///
    /// # Returns
    /// * `Result<Self>` - Fails only if the first batch cannot be materialized
    pub fn new<M>(
        spec: CursorSpec,
        provider: Arc<P>,
        materializer: M,
        options: CursorOptions,
    ) -> Result<Self>
    where
        M: DocumentMaterializer<T>,
    {
        let materializer: Arc<dyn DocumentMaterializer<T>> = Arc::new(materializer);
        // A limit of zero means no limit, as on the server.
        let mut options = options;
        options.limit = options.limit.filter(|limit| *limit > 0);
        let comment = options
            .comment
            .clone()
            .unwrap_or_else(|| Bson::String(operation_comment()));

        let mut cursor = Self {
            namespace: spec.namespace,
            cursor_id: spec.cursor_id,
            current_batch: Vec::new(),
            batch_index: None,
            batch_number: 0,
            yielded: 0,
            received: 0,
            provider,
            materializer,
            policy: Box::new(AlwaysPrefetch),
            prefetch: PrefetchCoordinator::new(),
            options,
            comment,
            fault: None,
            disposed: false,
        };

        let first = cursor.materializer.materialize(spec.first_batch)?;
        cursor.install(first);

        debug!(
            "Opened cursor {} on {} with {} documents in the first batch",
            cursor.cursor_id,
            cursor.namespace,
            cursor.current_batch.len()
        );
        Ok(cursor)
    }

    /// Replace the prefetch policy.
    pub fn with_policy(mut self, policy: Box<dyn PrefetchPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Move to the next document
    ///
    /// # Returns
    /// * `Ok(true)` - A document is available through `current()`
    /// * `Ok(false)` - The result set is exhausted
    /// * `Err(e)` - Disposed, cancelled, or the fetch failed
    ///
    /// A failed fetch faults the cursor: the server may already have handed
    /// out the batch, so asking for the next one could skip it. Every later
    /// call returns `Faulted` until the cursor is disposed.
    pub async fn advance(&mut self) -> Result<bool> {
        self.ensure_not_disposed()?;
        self.ensure_not_faulted()?;

        let next = self.batch_index.map_or(0, |i| i + 1);
        if next < self.current_batch.len() {
            self.batch_index = Some(next);
            self.yielded += 1;
            self.maybe_prefetch();
            return Ok(true);
        }

        self.current_batch = Vec::new();
        self.batch_index = None;

        while self.cursor_id != 0 && !self.limit_reached() {
            // Foreground fetches use the slot too, so dropping this future
            // mid-fetch leaves the batch for the next call.
            if self.prefetch.is_idle() {
                let fetch = self.fetch_task();
                self.prefetch.start_now(fetch);
            }
            let fetched = match self.prefetch.await_and_consume().await {
                Ok(Some(batch)) => batch,
                Ok(None) => continue,
                Err(e) => return Err(self.record_fault(e)),
            };

            self.cursor_id = fetched.cursor_id;
            if !fetched.documents.is_empty() {
                self.install(fetched.documents);
                self.batch_index = Some(0);
                self.yielded += 1;
                self.maybe_prefetch();
                return Ok(true);
            }
        }

        debug!(
            "Cursor on {} exhausted after {} documents in {} batches",
            self.namespace, self.yielded, self.batch_number
        );
        Ok(false)
    }

    /// The document at the current position
    ///
    /// # Returns
    /// * `Result<&T>` - Fails with `NoCurrentItem` unless the last `advance`
    ///   returned `true`
    pub fn current(&self) -> Result<&T> {
        self.ensure_not_disposed()?;
        self.batch_index
            .and_then(|i| self.current_batch.get(i))
            .ok_or(CursorError::NoCurrentItem)
    }

    /// Rewinding is not possible: the server offers no way back.
    /// Reissue the original query for a fresh cursor instead.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_not_disposed()?;
        Err(CursorError::UnsupportedOperation(
            "reset: server cursors are forward-only, reissue the query instead".to_string(),
        ))
    }

    /// Release the server cursor and the channel provider
    ///
    /// Idempotent. A failed `killCursors` is logged and does not stop the
    /// provider from being disposed; a failure disposing the provider is
    /// returned after the cursor is marked disposed.
    pub async fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }

        if let Some(batch) = self.prefetch.abandon().await {
            self.cursor_id = batch.cursor_id;
        }

        if self.cursor_id != 0
            && release_or_log(&*self.provider, &self.namespace, self.cursor_id).await
        {
            self.cursor_id = 0;
        }

        let released = self.provider.dispose().await;
        self.disposed = true;
        self.current_batch = Vec::new();
        self.batch_index = None;

        info!(
            "Closed cursor on {} after {} documents",
            self.namespace, self.yielded
        );
        released.map_err(CursorError::from)
    }

    fn install(&mut self, mut documents: Vec<T>) {
        if let Some(limit) = self.options.limit {
            let remaining = limit.saturating_sub(self.received);
            if (documents.len() as u64) > remaining {
                documents.truncate(remaining as usize);
            }
        }
        self.received += documents.len() as u64;
        self.current_batch = documents;
        self.batch_number += 1;
    }

    fn limit_reached(&self) -> bool {
        self.options
            .limit
            .is_some_and(|limit| self.received >= limit)
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.disposed {
            Err(CursorError::Disposed)
        } else {
            Ok(())
        }
    }

    fn ensure_not_faulted(&self) -> Result<()> {
        match &self.fault {
            Some(message) => Err(CursorError::Faulted(message.clone())),
            None => Ok(()),
        }
    }

    fn record_fault(&mut self, error: CursorError) -> CursorError {
        warn!("Cursor {} on {} faulted: {}", self.cursor_id, self.namespace, error);
        self.fault = Some(error.to_string());
        error
    }

    fn progress(&self) -> CursorProgress {
        CursorProgress {
            batch_len: self.current_batch.len(),
            batch_index: self.batch_index.unwrap_or(0),
            batch_number: self.batch_number,
            documents_yielded: self.yielded,
            cursor_id: self.cursor_id,
        }
    }

    /// Batch size to request, never more than the limit still allows.
    fn requested_batch_size(&self) -> Option<u32> {
        match self.options.limit {
            Some(limit) => {
                let remaining =
                    u32::try_from(limit.saturating_sub(self.received)).unwrap_or(u32::MAX);
                Some(
                    self.options
                        .batch_size
                        .map_or(remaining, |size| size.min(remaining)),
                )
            }
            None => self.options.batch_size,
        }
    }

    fn get_more_request(&self) -> GetMoreRequest {
        GetMoreRequest {
            cursor_id: self.cursor_id,
            namespace: self.namespace.clone(),
            batch_size: self.requested_batch_size(),
            max_await_time: self.options.max_await_time,
            comment: Some(self.comment.clone()),
        }
    }

    /// A self-contained `getMore` for the current cursor id.
    fn fetch_task(&self) -> BoxFuture<'static, Result<FetchedBatch<T>>> {
        let request = self.get_more_request();
        let provider = self.provider.clone();
        let materializer = self.materializer.clone();
        let timeout = self.options.timeout;
        let cancel = self.options.cancel.clone();

        Box::pin(async move {
            fetch_batch(&*provider, request, &*materializer, timeout, &cancel).await
        })
    }

    fn maybe_prefetch(&mut self) {
        if self.cursor_id == 0 || self.limit_reached() || !self.prefetch.is_idle() {
            return;
        }

        let progress = self.progress();
        let fetch = self.fetch_task();
        self.prefetch
            .start_if_idle(&progress, self.policy.as_ref(), move || fetch);
    }
}

impl<T, P: ChannelProvider> Cursor<T, P> {
    /// Batch currently being consumed.
    pub fn current_batch(&self) -> &[T] {
        &self.current_batch
    }

    /// Position within the current batch, `None` when there is no current item.
    pub fn current_batch_index(&self) -> Option<usize> {
        self.batch_index
    }

    /// Number of batches installed so far, the first batch included.
    pub fn current_batch_number(&self) -> u64 {
        self.batch_number
    }

    /// Zero-based position of the current document over the whole result set.
    pub fn current_index(&self) -> Option<u64> {
        self.batch_index.map(|_| self.yielded - 1)
    }

    /// Documents yielded over the cursor's lifetime.
    pub fn documents_yielded(&self) -> u64 {
        self.yielded
    }

    pub fn cursor_id(&self) -> i64 {
        self.cursor_id
    }

    pub fn collection_namespace(&self) -> &CollectionNamespace {
        &self.namespace
    }

    /// Whether the server has been contacted for its last batch and the
    /// current batch has been read to the end.
    pub fn is_exhausted(&self) -> bool {
        let server_done = self.cursor_id == 0
            || self.options.limit.is_some_and(|limit| self.received >= limit);
        let batch_done = self
            .batch_index
            .map_or(self.current_batch.is_empty(), |i| i + 1 >= self.current_batch.len());
        server_done && batch_done
    }

    /// Whether a failed fetch left the cursor unusable.
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl<T, P: ChannelProvider> Drop for Cursor<T, P> {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }

        // A finished prefetch knows the newest id, possibly 0.
        let cursor_id = self
            .prefetch
            .abandon_now()
            .map_or(self.cursor_id, |batch| batch.cursor_id);
        let namespace = self.namespace.clone();
        let provider = self.provider.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(
                    "Cursor {} on {} dropped without dispose, releasing in the background",
                    cursor_id, namespace
                );
                runtime.spawn(async move {
                    if cursor_id != 0 {
                        release_or_log(&*provider, &namespace, cursor_id).await;
                    }
                    if let Err(e) = provider.dispose().await {
                        warn!("Failed to dispose channel provider: {}", e);
                    }
                });
            }
            Err(_) => warn!(
                "Cursor {} on {} dropped outside a runtime; server cursor left open",
                cursor_id, namespace
            ),
        }
    }
}

/// Manual Debug implementation since documents and providers need not be Debug
impl<T, P: ChannelProvider> fmt::Debug for Cursor<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("namespace", &self.namespace)
            .field("cursor_id", &self.cursor_id)
            .field("batch_len", &self.current_batch.len())
            .field("batch_index", &self.batch_index)
            .field("batch_number", &self.batch_number)
            .field("yielded", &self.yielded)
            .field("fault", &self.fault)
            .field("disposed", &self.disposed)
            .finish()
    }
}

/// Cursor over raw BSON documents.
pub type DocumentCursor<P> = Cursor<Document, P>;
