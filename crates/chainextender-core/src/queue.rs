//! Bounded worker pools.
//!
//! A [`TaskQueue`] is the producer side of a stream: a bounded
//! `tokio::sync::mpsc` channel whose receiver is shared by `workers` tasks.
//! Producers either detach ([`TaskQueue::submit`], which only waits for
//! queue capacity) or hand off a batch and wait until every job of it has
//! been processed ([`TaskQueue::submit_all_and_wait`]).
//!
//! Workers retry retryable failures with the pool's [`RetryPolicy`]. A job
//! that still fails is either returned to a waiting producer or, for
//! detached jobs, reported to the [`FaultReporter`] so the supervisor can
//! stop the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::chunk::chunk;
use crate::config::StreamConfig;
use crate::error::{ErrorClass, ExtenderError};
use crate::retry::RetryPolicy;

/// Processes one job of a stream.
#[async_trait]
pub trait Worker<T>: Send + Sync + 'static {
    /// Handle a job. May be called more than once for the same job when a
    /// retryable error is returned, so writes must be idempotent.
    async fn handle(&self, job: &T) -> Result<(), ExtenderError>;
}

/// Channel to the supervisor for failures nobody is waiting on.
#[derive(Clone)]
pub struct FaultReporter {
    tx: mpsc::UnboundedSender<ExtenderError>,
}

impl FaultReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExtenderError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, err: ExtenderError) {
        if let Err(e) = self.tx.send(err) {
            error!(error = %e.0, "fault reported after supervisor stopped");
        }
    }
}

/// Shared settings for the pools of one pipeline.
#[derive(Clone)]
pub struct PoolContext {
    pub retry: RetryPolicy,
    pub strict_resolution: bool,
    pub faults: FaultReporter,
}

type Completion = oneshot::Sender<Result<(), ExtenderError>>;

struct Envelope<T> {
    job: T,
    done: Option<Completion>,
}

/// Producer handle of a worker stream. Cheap to clone.
pub struct TaskQueue<T> {
    name: &'static str,
    chunk_size: usize,
    tx: mpsc::Sender<Envelope<T>>,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            chunk_size: self.chunk_size,
            tx: self.tx.clone(),
        }
    }
}

/// Join handles of a stream's workers.
pub struct WorkerPool {
    name: &'static str,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for every worker to exit. Workers exit once all [`TaskQueue`]
    /// handles of the stream are dropped and the queue is drained.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(stream = self.name, error = %e, "worker task panicked");
            }
        }
        debug!(stream = self.name, "worker pool stopped");
    }
}

impl<T: Send + Sync + 'static> TaskQueue<T> {
    /// Spawn `config.workers` tasks running `worker` over a queue of
    /// `config.queue_capacity` jobs.
    pub fn spawn<W>(
        name: &'static str,
        config: StreamConfig,
        worker: Arc<W>,
        ctx: PoolContext,
    ) -> (Self, WorkerPool)
    where
        W: Worker<T>,
    {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let handles = (0..config.workers.max(1))
            .map(|_| {
                let rx = Arc::clone(&rx);
                let worker = Arc::clone(&worker);
                let ctx = ctx.clone();
                tokio::spawn(run_worker(name, rx, worker, ctx))
            })
            .collect();
        (
            Self {
                name,
                chunk_size: config.chunk_size.max(1),
                tx,
            },
            WorkerPool { name, handles },
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Enqueue a job without waiting for it to run.
    pub async fn submit(&self, job: T) -> Result<(), ExtenderError> {
        self.send(Envelope { job, done: None }).await
    }

    /// Enqueue a job and wait for its worker to finish it.
    pub async fn submit_and_wait(&self, job: T) -> Result<(), ExtenderError> {
        self.submit_all_and_wait(vec![job]).await
    }

    /// Enqueue every job, then wait until each one has been processed.
    /// Returns the first failure.
    pub async fn submit_all_and_wait(&self, jobs: Vec<T>) -> Result<(), ExtenderError> {
        let mut pending = Vec::with_capacity(jobs.len());
        for job in jobs {
            let (done, rx) = oneshot::channel();
            self.send(Envelope {
                job,
                done: Some(done),
            })
            .await?;
            pending.push(rx);
        }
        for outcome in join_all(pending).await {
            match outcome {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ExtenderError::Aborted {
                        reason: format!("{} worker dropped a job", self.name),
                    })
                }
            }
        }
        Ok(())
    }

    async fn send(&self, envelope: Envelope<T>) -> Result<(), ExtenderError> {
        self.tx
            .send(envelope)
            .await
            .map_err(|_| ExtenderError::Aborted {
                reason: format!("{} queue is closed", self.name),
            })
    }
}

impl<I: Send + Sync + 'static> TaskQueue<Vec<I>> {
    /// Chunk `items` by the stream's chunk size and enqueue the chunks
    /// without waiting. Returns the number of chunks.
    pub async fn submit_chunks(&self, items: Vec<I>) -> Result<usize, ExtenderError> {
        let chunks = chunk(items, self.chunk_size);
        let count = chunks.len();
        for c in chunks {
            self.submit(c).await?;
        }
        Ok(count)
    }

    /// Chunk `items` and wait until every chunk has been processed.
    pub async fn submit_chunks_and_wait(&self, items: Vec<I>) -> Result<(), ExtenderError> {
        if items.is_empty() {
            return Ok(());
        }
        self.submit_all_and_wait(chunk(items, self.chunk_size)).await
    }
}

async fn run_worker<T, W>(
    name: &'static str,
    rx: Arc<Mutex<mpsc::Receiver<Envelope<T>>>>,
    worker: Arc<W>,
    ctx: PoolContext,
) where
    T: Send + Sync + 'static,
    W: Worker<T>,
{
    loop {
        // The lock is held only while waiting for the next job.
        let next = rx.lock().await.recv().await;
        let Some(Envelope { job, done }) = next else {
            break;
        };

        let result = ctx.retry.run(name, || worker.handle(&job)).await;
        let result = match result {
            Err(e) if e.class_with(ctx.strict_resolution) == ErrorClass::Skip => {
                warn!(stream = name, error = %e, "job skipped");
                Ok(())
            }
            other => other,
        };

        match (result, done) {
            (result, Some(done)) => {
                // A dropped receiver means the producer gave up waiting.
                let _ = done.send(result);
            }
            (Err(e), None) => {
                error!(stream = name, error = %e, "job failed");
                ctx.faults.report(e);
            }
            (Ok(()), None) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Summer {
        total: AtomicUsize,
        jobs: AtomicUsize,
    }

    #[async_trait]
    impl Worker<Vec<usize>> for Summer {
        async fn handle(&self, job: &Vec<usize>) -> Result<(), ExtenderError> {
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.total.fetch_add(job.iter().sum(), Ordering::SeqCst);
            self.jobs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing {
        calls: AtomicUsize,
        err: fn() -> ExtenderError,
    }

    #[async_trait]
    impl Worker<u32> for Failing {
        async fn handle(&self, _job: &u32) -> Result<(), ExtenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.err)())
        }
    }

    fn ctx() -> (PoolContext, mpsc::UnboundedReceiver<ExtenderError>) {
        let (faults, rx) = FaultReporter::channel();
        let retry = RetryPolicy::new(RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 2.0,
        });
        (
            PoolContext {
                retry,
                strict_resolution: true,
                faults,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn submit_chunks_and_wait_processes_everything() {
        let worker = Arc::new(Summer {
            total: AtomicUsize::new(0),
            jobs: AtomicUsize::new(0),
        });
        let (ctx, _faults) = ctx();
        let (queue, pool) =
            TaskQueue::spawn("sum", StreamConfig::new(3, 2, 10), Arc::clone(&worker), ctx);

        let items: Vec<usize> = (1..=95).collect();
        queue.submit_chunks_and_wait(items).await.unwrap();
        assert_eq!(worker.total.load(Ordering::SeqCst), 95 * 96 / 2);
        assert_eq!(worker.jobs.load(Ordering::SeqCst), 10);

        drop(queue);
        pool.join().await;
    }

    #[tokio::test]
    async fn detached_jobs_drain_on_shutdown() {
        let worker = Arc::new(Summer {
            total: AtomicUsize::new(0),
            jobs: AtomicUsize::new(0),
        });
        let (ctx, _faults) = ctx();
        let (queue, pool) =
            TaskQueue::spawn("sum", StreamConfig::new(2, 1, 5), Arc::clone(&worker), ctx);
        assert_eq!(queue.submit_chunks((0..20).collect()).await.unwrap(), 4);
        drop(queue);
        pool.join().await;
        assert_eq!(worker.total.load(Ordering::SeqCst), (0..20).sum::<usize>());
    }

    #[tokio::test]
    async fn awaited_failure_is_returned_to_the_producer() {
        let worker = Arc::new(Failing {
            calls: AtomicUsize::new(0),
            err: || ExtenderError::Storage("down".into()),
        });
        let (ctx, mut faults) = ctx();
        let (queue, pool) = TaskQueue::spawn("fail", StreamConfig::new(1, 4, 1), Arc::clone(&worker), ctx);
        let err = queue.submit_and_wait(1).await.unwrap_err();
        assert!(matches!(err, ExtenderError::RetriesExhausted { .. }));
        assert_eq!(worker.calls.load(Ordering::SeqCst), 3);
        drop(queue);
        pool.join().await;
        assert!(faults.try_recv().is_err());
    }

    #[tokio::test]
    async fn detached_fatal_failure_reaches_the_supervisor() {
        let worker = Arc::new(Failing {
            calls: AtomicUsize::new(0),
            err: || ExtenderError::CoinSequence {
                expected: 1,
                reported: 2,
            },
        });
        let (ctx, mut faults) = ctx();
        let (queue, pool) = TaskQueue::spawn("fail", StreamConfig::new(1, 4, 1), Arc::clone(&worker), ctx);
        queue.submit(1).await.unwrap();
        let err = faults.recv().await.unwrap();
        assert!(matches!(err, ExtenderError::CoinSequence { .. }));
        // Fatal errors are not retried.
        assert_eq!(worker.calls.load(Ordering::SeqCst), 1);
        drop(queue);
        pool.join().await;
    }

    #[tokio::test]
    async fn skip_errors_are_dropped() {
        let worker = Arc::new(Failing {
            calls: AtomicUsize::new(0),
            err: || ExtenderError::decode("bad payload"),
        });
        let (ctx, mut faults) = ctx();
        let (queue, pool) = TaskQueue::spawn("skip", StreamConfig::new(1, 4, 1), Arc::clone(&worker), ctx);
        queue.submit_and_wait(1).await.unwrap();
        drop(queue);
        pool.join().await;
        assert!(faults.try_recv().is_err());
    }
}
