//! Debounced, last-write-wins save queue.
//!
//! Each [`SaveQueue::schedule`] call enqueues a state factory and re-arms a
//! shared debounce timer. When the timer fires the whole pending batch is
//! flushed as one write: only the last factory runs, against the state as it
//! stands at flush time, and every caller in the batch receives what was
//! actually persisted. Requests that arrive while a flush is in progress wait
//! in the channel and form the next batch.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::models::RoadmapState;
use crate::{Error, Result};

/// What a factory is handed when its batch is flushed.
#[derive(Debug, Clone)]
pub struct FlushInput {
    /// In-process snapshot taken before the flush re-read the file
    pub cached: Option<RoadmapState>,
    /// State on disk at flush time
    pub current: RoadmapState,
}

/// Produces the state to persist from the state at flush time, or `None`
/// when there is nothing to write.
pub type StateFactory = Box<dyn FnOnce(FlushInput) -> Option<RoadmapState> + Send>;

/// Outcome of a flushed batch, as seen by one caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Flushed {
    /// The persisted state, or the current one when nothing was written
    pub state: RoadmapState,
    pub written: bool,
    /// True for the caller whose factory produced `state`
    pub applied: bool,
}

/// Whatever performs the batched write.
///
/// Implementations must run `factory` and the write as one step with
/// respect to other writers, so the factory never works from a stale state.
#[async_trait]
pub trait StateWriter: Send + Sync + 'static {
    async fn write_batch(&self, factory: StateFactory) -> Result<Flushed>;
}

struct SaveRequest {
    factory: StateFactory,
    reply: oneshot::Sender<Result<Flushed>>,
}

/// Handle to the background flush task. Dropping it stops the task after
/// the pending batch is flushed.
#[derive(Debug, Clone)]
pub struct SaveQueue {
    tx: mpsc::UnboundedSender<SaveRequest>,
}

impl std::fmt::Debug for SaveRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveRequest").finish_non_exhaustive()
    }
}

impl SaveQueue {
    /// Spawn the flush task on the current tokio runtime.
    pub fn spawn<W: StateWriter>(writer: Arc<W>, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(writer, rx, debounce));
        Self { tx }
    }

    /// Enqueue a save and wait for the batch it lands in to be flushed.
    pub async fn schedule(&self, factory: StateFactory) -> Result<Flushed> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(SaveRequest { factory, reply })
            .map_err(|_| Error::Other("Save queue is closed".to_string()))?;
        done.await
            .map_err(|_| Error::Other("Save queue dropped the request".to_string()))?
    }
}

async fn run<W: StateWriter>(
    writer: Arc<W>,
    mut rx: mpsc::UnboundedReceiver<SaveRequest>,
    debounce: Duration,
) {
    let mut batch: Vec<SaveRequest> = Vec::new();
    let mut last_request = Instant::now();

    loop {
        let timeout = debounce.saturating_sub(last_request.elapsed());

        tokio::select! {
            request = rx.recv() => {
                match request {
                    Some(request) => {
                        batch.push(request);
                        last_request = Instant::now();
                    }
                    None => {
                        if !batch.is_empty() {
                            flush(writer.as_ref(), std::mem::take(&mut batch)).await;
                        }
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(timeout), if !batch.is_empty() => {
                flush(writer.as_ref(), std::mem::take(&mut batch)).await;
            }
        }
    }
}

async fn flush<W: StateWriter>(writer: &W, mut batch: Vec<SaveRequest>) {
    let Some(last) = batch.pop() else {
        return;
    };
    tracing::debug!(coalesced = batch.len() + 1, "flushing debounced save batch");

    let result = writer.write_batch(last.factory).await;

    for request in batch {
        let shared = match &result {
            Ok(flushed) => Ok(Flushed {
                applied: false,
                ..flushed.clone()
            }),
            Err(e) => Err(Error::Other(e.to_string())),
        };
        let _ = request.reply.send(shared);
    }
    if let Err(e) = &result {
        tracing::error!(error = %e, "debounced save failed");
    }
    let _ = last.reply.send(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Milestone;
    use std::sync::Mutex;

    /// Writer that keeps its "disk" in memory.
    #[derive(Default)]
    struct RecordingWriter {
        current: Mutex<RoadmapState>,
        writes: Mutex<Vec<RoadmapState>>,
        fail: bool,
    }

    #[async_trait]
    impl StateWriter for RecordingWriter {
        async fn write_batch(&self, factory: StateFactory) -> Result<Flushed> {
            if self.fail {
                return Err(Error::LockUnavailable);
            }
            let current = self.current.lock().unwrap().clone();
            let input = FlushInput {
                cached: None,
                current: current.clone(),
            };
            match factory(input) {
                Some(next) => {
                    *self.current.lock().unwrap() = next.clone();
                    self.writes.lock().unwrap().push(next.clone());
                    Ok(Flushed {
                        state: next,
                        written: true,
                        applied: true,
                    })
                }
                None => Ok(Flushed {
                    state: current,
                    written: false,
                    applied: true,
                }),
            }
        }
    }

    fn add(id: &'static str) -> StateFactory {
        Box::new(move |input: FlushInput| {
            let mut state = input.current;
            state.milestones.insert(id.to_string(), Milestone::new(id, id));
            Some(state)
        })
    }

    #[tokio::test]
    async fn test_batch_coalesces_to_last_factory() {
        let writer = Arc::new(RecordingWriter::default());
        let queue = SaveQueue::spawn(writer.clone(), Duration::from_millis(50));

        let calls = ["a", "b", "c"].map(|id| {
            let queue = queue.clone();
            tokio::spawn(async move { queue.schedule(add(id)).await })
        });

        let mut applied = 0;
        for call in calls {
            let flushed = call.await.unwrap().unwrap();
            assert!(flushed.written);
            assert_eq!(flushed.state, writer.writes.lock().unwrap()[0]);
            applied += usize::from(flushed.applied);
        }
        assert_eq!(applied, 1);
        let writes = writer.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].milestones.len(), 1);
    }

    #[tokio::test]
    async fn test_factory_sees_state_at_flush_time() {
        let writer = Arc::new(RecordingWriter::default());
        let queue = SaveQueue::spawn(writer.clone(), Duration::from_millis(50));

        let pending = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.schedule(add("late")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Lands while the batch is still waiting out the debounce
        writer
            .current
            .lock()
            .unwrap()
            .milestones
            .insert("direct".to_string(), Milestone::new("direct", "Direct"));

        let flushed = pending.await.unwrap().unwrap();
        assert!(flushed.state.milestones.contains_key("direct"));
        assert!(flushed.state.milestones.contains_key("late"));
    }

    #[tokio::test]
    async fn test_factory_may_decline_to_write() {
        let writer = Arc::new(RecordingWriter::default());
        let queue = SaveQueue::spawn(writer.clone(), Duration::from_millis(10));

        let flushed = queue.schedule(Box::new(|_| None)).await.unwrap();
        assert!(!flushed.written);
        assert!(writer.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_separate_batches_after_debounce() {
        let writer = Arc::new(RecordingWriter::default());
        let queue = SaveQueue::spawn(writer.clone(), Duration::from_millis(10));

        queue.schedule(add("a")).await.unwrap();
        let second = queue.schedule(add("b")).await.unwrap();

        assert_eq!(writer.writes.lock().unwrap().len(), 2);
        assert_eq!(second.state.milestones.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_reaches_every_caller() {
        let writer = Arc::new(RecordingWriter {
            fail: true,
            ..Default::default()
        });
        let queue = SaveQueue::spawn(writer, Duration::from_millis(20));

        let first = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.schedule(add("a")).await })
        };
        let second = queue.schedule(add("b")).await;

        let first = first.await.unwrap();
        for result in [first, second] {
            assert_eq!(
                result.unwrap_err().to_string(),
                "Failed to acquire roadmap state lock"
            );
        }
    }
}
