//! Single-worker FIFO task executor

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use super::errors::{ExecutorError, ExecutorResult};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Job = Box<dyn FnOnce() -> BoxFuture + Send>;

enum Message {
    Job { job: Job, force: bool },
    Ready,
}

/// Serializes tasks onto one tokio worker.
///
/// Cloning is cheap; clones feed the same worker. The worker stops once
/// every handle is dropped.
#[derive(Clone)]
pub struct Executor {
    sender: mpsc::UnboundedSender<Message>,
    ready: Arc<AtomicBool>,
}

impl Executor {
    /// Spawns the worker on the current tokio runtime.
    ///
    /// Until `mark_ready`, only forced tasks run when `ready` is false.
    pub fn new(ready: bool) -> ExecutorResult<Self> {
        let handle = Handle::try_current().map_err(|_| ExecutorError::NoRuntime)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        handle.spawn(run_worker(receiver, ready));

        Ok(Self {
            sender,
            ready: Arc::new(AtomicBool::new(ready)),
        })
    }

    /// Queues a task and returns a future of its output.
    ///
    /// The task is queued when `push` is called, not when the returned
    /// future is first polled. `force` lets it run before the executor is
    /// ready.
    pub fn push<F, Fut, T>(
        &self,
        task: F,
        force: bool,
    ) -> impl Future<Output = ExecutorResult<T>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let output = task().await;
                // the caller may have stopped waiting
                let _ = tx.send(output);
            })
        });

        let sent = self
            .sender
            .send(Message::Job { job, force })
            .map_err(|_| ExecutorError::Closed);

        async move {
            sent?;
            rx.await.map_err(|_| ExecutorError::Closed)
        }
    }

    /// Releases buffered tasks, in submission order
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        let _ = self.sender.send(Message::Ready);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

async fn run_worker(mut receiver: mpsc::UnboundedReceiver<Message>, mut ready: bool) {
    let mut buffered: VecDeque<Job> = VecDeque::new();

    while let Some(message) = receiver.recv().await {
        match message {
            Message::Job { job, force } => {
                if ready || force {
                    job().await;
                } else {
                    buffered.push_back(job);
                }
            }
            Message::Ready => {
                ready = true;
                tracing::trace!(buffered = buffered.len(), "executor ready");
                while let Some(job) = buffered.pop_front() {
                    job().await;
                }
            }
        }
    }
}
