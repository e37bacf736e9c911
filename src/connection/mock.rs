//! Scripted in-memory channel provider for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bson::{Document, doc};
use mongodb::error::{CommandError, ErrorKind};
use tokio_util::sync::CancellationToken;

use super::wire::{GetMoreReply, GetMoreRequest, KillCursorsReply, KillCursorsRequest};
use super::{Channel, ChannelProvider};
use crate::error::ChannelError;

/// What the next `getMore` does.
pub(crate) enum Step {
    Batch { cursor_id: i64, ids: Vec<i32> },
    Fail,
    Delayed(Duration, Box<Step>),
    Stall,
    Panic,
}

impl Step {
    pub(crate) fn batch(cursor_id: i64, ids: &[i32]) -> Self {
        Step::Batch {
            cursor_id,
            ids: ids.to_vec(),
        }
    }

    pub(crate) fn delayed(self, delay: Duration) -> Self {
        Step::Delayed(delay, Box::new(self))
    }
}

/// What `killCursors` answers.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum KillReply {
    #[default]
    Killed,
    ConnectionReset,
    CursorNotFound,
}

/// Server-visible calls in the order they happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    GetMore(i64),
    Kill(Vec<i64>),
    Dispose,
}

pub(crate) fn docs(ids: &[i32]) -> Vec<Document> {
    ids.iter().map(|id| doc! { "_id": *id }).collect()
}

/// A driver command error carrying `code`.
pub(crate) fn command_error(code: i32, code_name: &str) -> mongodb::error::Error {
    let error: CommandError = bson::from_document(doc! {
        "code": code,
        "codeName": code_name,
        "errmsg": format!("{code_name} (scripted)"),
    })
    .expect("command error document");
    ErrorKind::Command(error).into()
}

#[derive(Default)]
struct Recorded {
    steps: VecDeque<Step>,
    get_mores: Vec<GetMoreRequest>,
    kills: Vec<KillCursorsRequest>,
    events: Vec<Event>,
    acquisitions: usize,
    disposals: usize,
}

#[derive(Default)]
struct Inner {
    recorded: Mutex<Recorded>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    kill_reply: KillReply,
    fail_dispose: bool,
}

#[derive(Clone, Default)]
pub(crate) struct MockProvider {
    inner: Arc<Inner>,
}

impl MockProvider {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self::build(steps, KillReply::Killed, false)
    }

    pub(crate) fn build(steps: Vec<Step>, kill_reply: KillReply, fail_dispose: bool) -> Self {
        let inner = Inner {
            recorded: Mutex::new(Recorded {
                steps: steps.into(),
                ..Recorded::default()
            }),
            kill_reply,
            fail_dispose,
            ..Inner::default()
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub(crate) fn get_mores(&self) -> Vec<GetMoreRequest> {
        self.inner.recorded.lock().unwrap().get_mores.clone()
    }

    pub(crate) fn kills(&self) -> Vec<KillCursorsRequest> {
        self.inner.recorded.lock().unwrap().kills.clone()
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.inner.recorded.lock().unwrap().events.clone()
    }

    pub(crate) fn acquisitions(&self) -> usize {
        self.inner.recorded.lock().unwrap().acquisitions
    }

    pub(crate) fn disposals(&self) -> usize {
        self.inner.recorded.lock().unwrap().disposals
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelProvider for MockProvider {
    type Channel = MockChannel;

    async fn acquire(
        &self,
        _timeout: Option<Duration>,
        _cancel: &CancellationToken,
    ) -> Result<Self::Channel, ChannelError> {
        self.inner.recorded.lock().unwrap().acquisitions += 1;
        Ok(MockChannel {
            inner: self.inner.clone(),
        })
    }

    async fn dispose(&self) -> Result<(), ChannelError> {
        {
            let mut recorded = self.inner.recorded.lock().unwrap();
            recorded.disposals += 1;
            recorded.events.push(Event::Dispose);
        }
        if self.inner.fail_dispose {
            return Err(ChannelError::AcquireFailed("dispose failed".to_string()));
        }
        Ok(())
    }
}

pub(crate) struct MockChannel {
    inner: Arc<Inner>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn get_more(&mut self, request: &GetMoreRequest) -> Result<GetMoreReply, ChannelError> {
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.inner.in_flight);

        let step = {
            let mut recorded = self.inner.recorded.lock().unwrap();
            recorded.get_mores.push(request.clone());
            recorded.events.push(Event::GetMore(request.cursor_id));
            recorded.steps.pop_front()
        };

        let mut step = step.ok_or_else(|| ChannelError::Protocol("unexpected getMore".into()))?;
        loop {
            match step {
                Step::Batch { cursor_id, ids } => {
                    return Ok(GetMoreReply {
                        cursor_id,
                        namespace: Some(request.namespace.clone()),
                        documents: docs(&ids),
                    });
                }
                Step::Fail => {
                    return Err(ChannelError::AcquireFailed("connection refused".into()));
                }
                Step::Delayed(delay, next) => {
                    tokio::time::sleep(delay).await;
                    step = *next;
                }
                Step::Stall => std::future::pending::<()>().await,
                Step::Panic => panic!("scripted panic"),
            }
        }
    }

    async fn kill_cursors(
        &mut self,
        request: &KillCursorsRequest,
    ) -> Result<KillCursorsReply, ChannelError> {
        {
            let mut recorded = self.inner.recorded.lock().unwrap();
            recorded.kills.push(request.clone());
            recorded.events.push(Event::Kill(request.cursor_ids.clone()));
        }
        match self.inner.kill_reply {
            KillReply::Killed => Ok(KillCursorsReply {
                cursors_killed: request.cursor_ids.clone(),
                cursors_not_found: Vec::new(),
            }),
            KillReply::ConnectionReset => {
                Err(ChannelError::AcquireFailed("connection reset".into()))
            }
            KillReply::CursorNotFound => Err(command_error(43, "CursorNotFound").into()),
        }
    }
}
