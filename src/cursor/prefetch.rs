//! Single-slot coordination between the consumer and its background fetch.
//!
//! The slot holds the join handle of at most one spawned `getMore`. While
//! it is occupied the gate is closed: no other fetch may start, whether the
//! task is still running or has finished and is waiting to be consumed.
//! The fetch outcome, success or failure, travels back through the handle,
//! so a failed background fetch is re-raised to the consumer instead of
//! being lost.

use std::future::Future;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{ChannelError, Result};

use super::operations::FetchedBatch;
use super::policy::{CursorProgress, PrefetchPolicy};

pub struct PrefetchCoordinator<T> {
    slot: Option<JoinHandle<Result<FetchedBatch<T>>>>,
    started: u64,
}

impl<T: Send + 'static> PrefetchCoordinator<T> {
    pub fn new() -> Self {
        Self {
            slot: None,
            started: 0,
        }
    }

    /// Whether no fetch is pending or awaiting consumption.
    pub fn is_idle(&self) -> bool {
        self.slot.is_none()
    }

    /// Number of fetches started so far.
    pub fn started(&self) -> u64 {
        self.started
    }

    /// Start a background fetch if the slot is free and the policy agrees.
    ///
    /// `make_fetch` is only called when the fetch actually starts.
    ///
    /// # Returns
    /// * `bool` - True if a fetch was spawned
    pub fn start_if_idle<F, Fut>(
        &mut self,
        progress: &CursorProgress,
        policy: &dyn PrefetchPolicy,
        make_fetch: F,
    ) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchedBatch<T>>> + Send + 'static,
    {
        if self.slot.is_some() || !policy.should_prefetch(progress) {
            return false;
        }

        self.spawn(make_fetch());
        debug!(
            "Started background fetch #{} at batch {} item {}/{}",
            self.started, progress.batch_number, progress.batch_index, progress.batch_len
        );
        true
    }

    /// Start a fetch the consumer is about to wait on, if none is pending.
    ///
    /// Going through the slot keeps the fetch alive when the waiting future
    /// is dropped, so its batch is consumed later instead of being lost.
    pub fn start_now<Fut>(&mut self, fetch: Fut)
    where
        Fut: Future<Output = Result<FetchedBatch<T>>> + Send + 'static,
    {
        if self.slot.is_none() {
            self.spawn(fetch);
        }
    }

    fn spawn<Fut>(&mut self, fetch: Fut)
    where
        Fut: Future<Output = Result<FetchedBatch<T>>> + Send + 'static,
    {
        self.slot = Some(tokio::spawn(fetch));
        self.started += 1;
    }

    /// Wait for the pending fetch and take its result.
    ///
    /// Cancel-safe: if the returned future is dropped before completion the
    /// handle stays in the slot and the next call resumes waiting on it.
    ///
    /// # Returns
    /// * `Ok(Some(batch))` - The background fetch completed
    /// * `Ok(None)` - No fetch had been started
    /// * `Err(e)` - The background fetch failed
    pub async fn await_and_consume(&mut self) -> Result<Option<FetchedBatch<T>>> {
        let Some(handle) = self.slot.as_mut() else {
            return Ok(None);
        };

        let joined = handle.await;
        self.slot = None;

        match joined {
            Ok(result) => result.map(Some),
            Err(e) => Err(ChannelError::BackgroundTask(e.to_string()).into()),
        }
    }

    /// Clear the slot during disposal.
    ///
    /// A fetch that already finished is harvested so its cursor id is not
    /// lost; one still running is aborted.
    pub async fn abandon(&mut self) -> Option<FetchedBatch<T>> {
        let handle = self.slot.take()?;
        if !handle.is_finished() {
            handle.abort();
        }

        match handle.await {
            Ok(Ok(batch)) => Some(batch),
            Ok(Err(e)) => {
                debug!("Discarding failed background fetch: {}", e);
                None
            }
            Err(_) => None,
        }
    }
}

impl<T: Send + 'static> Default for PrefetchCoordinator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PrefetchCoordinator<T> {
    /// Clear the slot without waiting.
    ///
    /// Like `abandon`, but usable from synchronous code: a finished fetch is
    /// harvested and a running one is aborted.
    pub fn abandon_now(&mut self) -> Option<FetchedBatch<T>> {
        let mut handle = self.slot.take()?;
        if !handle.is_finished() {
            handle.abort();
            return None;
        }

        match (&mut handle).now_or_never() {
            Some(Ok(Ok(batch))) => Some(batch),
            _ => None,
        }
    }
}

impl<T> Drop for PrefetchCoordinator<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.slot.take() {
            handle.abort();
        }
    }
}
