//! Background ingestion from value streams.
//!
//! An ingestion task pumps values from an external source into a
//! [`RingBuffer`] until the source is exhausted, keeping one value out of
//! every `sample_rate`. Two flavours are provided:
//!
//! - [`RingBuffer::ingest`] drains an async [`Stream`] on a tokio task
//! - [`RingBuffer::ingest_blocking`] drains an iterator on a dedicated thread,
//!   which covers blocking sources such as `std::sync::mpsc::Receiver`
//!
//! Only one ingestion task should feed a buffer at a time. Direct calls to
//! [`RingBuffer::push`] may interleave with the task in any order.

use std::thread;

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::BufferError;
use crate::ring_buffer::RingBuffer;

/// Configuration for an ingestion task.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Keep one value out of every `sample_rate`. `0` and `1` keep everything.
    pub sample_rate: usize,
    /// Token used to stop the task early. A fresh one is created when unset.
    pub cancel: Option<CancellationToken>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            sample_rate: 1,
            cancel: None,
        }
    }
}

impl IngestConfig {
    /// Creates a config keeping one value out of every `sample_rate`.
    pub fn new(sample_rate: usize) -> Self {
        Self {
            sample_rate,
            ..Default::default()
        }
    }

    /// Stops the task when `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Summary of a completed ingestion task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Values pushed into the buffer.
    pub pushed: usize,
    /// Values read from the source and dropped by sampling.
    pub skipped: usize,
    /// True if the task was cancelled before the source was exhausted.
    pub cancelled: bool,
}

/// Handle to an ingestion task running on the tokio runtime.
#[derive(Debug)]
pub struct IngestHandle {
    cancel: CancellationToken,
    task: JoinHandle<IngestReport>,
}

impl IngestHandle {
    /// Requests the task to stop. Values already pushed stay in the buffer.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once the task has ended, by exhaustion or cancellation.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the task to end.
    pub async fn join(self) -> Result<IngestReport, BufferError> {
        self.task.await.map_err(|e| {
            warn!("ingestion task failed: {}", e);
            BufferError::Ingest(e.to_string())
        })
    }
}

/// Handle to an ingestion task running on its own thread.
#[derive(Debug)]
pub struct BlockingIngestHandle {
    cancel: CancellationToken,
    thread: thread::JoinHandle<IngestReport>,
}

impl BlockingIngestHandle {
    /// Requests the task to stop.
    ///
    /// The request is noticed between two values; a source blocked waiting
    /// for its next value keeps the thread alive until it yields or ends.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once the thread has ended.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Blocks until the thread ends.
    pub fn join(self) -> Result<IngestReport, BufferError> {
        self.thread.join().map_err(|payload| {
            let msg = panic_message(payload.as_ref());
            warn!("ingestion thread panicked: {}", msg);
            BufferError::Ingest(msg)
        })
    }
}

enum Step<T> {
    Value(T),
    Exhausted,
    Cancelled,
}

impl<T> RingBuffer<T>
where
    T: Default + Send + 'static,
{
    /// Drains `source` into the buffer on a background tokio task.
    ///
    /// Returns immediately. Must be called from within a tokio runtime.
    /// See [`RingBuffer::ingest_with`].
    pub fn ingest<S>(&self, source: S, sample_rate: usize) -> IngestHandle
    where
        S: Stream<Item = T> + Send + 'static,
    {
        self.ingest_with(source, IngestConfig::new(sample_rate))
    }

    /// Drains `source` into the buffer on a background tokio task.
    ///
    /// The task pushes one value, then reads and drops up to
    /// `sample_rate - 1` further values, and repeats. When the source ends the
    /// finished flag is raised (see [`RingBuffer::is_finished`]). The flag is
    /// lowered before this call returns, so it reads `false` until the new
    /// source is exhausted. Cancellation stops the task without raising it.
    pub fn ingest_with<S>(&self, source: S, config: IngestConfig) -> IngestHandle
    where
        S: Stream<Item = T> + Send + 'static,
    {
        let sample_rate = config.sample_rate.max(1);
        let cancel = config.cancel.unwrap_or_else(CancellationToken::new);

        self.set_finished(false);
        debug!("ingestion started (sample_rate={})", sample_rate);

        let buffer = self.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let mut source = Box::pin(source);
            let mut report = IngestReport::default();

            'drain: loop {
                match next_or_cancel(&mut source, &task_cancel).await {
                    Step::Value(value) => {
                        buffer.push(value);
                        report.pushed += 1;
                        trace!("ingested value #{}", report.pushed);
                    }
                    Step::Exhausted => break,
                    Step::Cancelled => {
                        report.cancelled = true;
                        break;
                    }
                }
                for _ in 1..sample_rate {
                    match next_or_cancel(&mut source, &task_cancel).await {
                        Step::Value(_) => report.skipped += 1,
                        Step::Exhausted => break 'drain,
                        Step::Cancelled => {
                            report.cancelled = true;
                            break 'drain;
                        }
                    }
                }
            }

            buffer.finish(&report);
            report
        });

        IngestHandle { cancel, task }
    }

    /// Drains `source` into the buffer on a dedicated thread.
    ///
    /// Same sampling and finished-flag behavior as [`RingBuffer::ingest`],
    /// for sources that block the calling thread.
    pub fn ingest_blocking<I>(&self, source: I, sample_rate: usize) -> BlockingIngestHandle
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        self.ingest_blocking_with(source, IngestConfig::new(sample_rate))
    }

    /// Drains `source` into the buffer on a dedicated thread.
    pub fn ingest_blocking_with<I>(&self, source: I, config: IngestConfig) -> BlockingIngestHandle
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        let sample_rate = config.sample_rate.max(1);
        let cancel = config.cancel.unwrap_or_else(CancellationToken::new);

        self.set_finished(false);
        debug!("blocking ingestion started (sample_rate={})", sample_rate);

        let buffer = self.clone();
        let task_cancel = cancel.clone();
        let mut source = source.into_iter();
        let thread = thread::spawn(move || {
            let mut report = IngestReport::default();

            'drain: loop {
                if task_cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                let Some(value) = source.next() else { break };
                buffer.push(value);
                report.pushed += 1;
                trace!("ingested value #{}", report.pushed);

                for _ in 1..sample_rate {
                    if task_cancel.is_cancelled() {
                        report.cancelled = true;
                        break 'drain;
                    }
                    if source.next().is_none() {
                        break 'drain;
                    }
                    report.skipped += 1;
                }
            }

            buffer.finish(&report);
            report
        });

        BlockingIngestHandle { cancel, thread }
    }

    fn finish(&self, report: &IngestReport) {
        if report.cancelled {
            debug!(
                "ingestion cancelled (pushed={}, skipped={})",
                report.pushed, report.skipped
            );
            return;
        }
        self.set_finished(true);
        debug!(
            "ingestion finished (pushed={}, skipped={})",
            report.pushed, report.skipped
        );
    }
}

async fn next_or_cancel<S>(source: &mut S, cancel: &CancellationToken) -> Step<S::Item>
where
    S: Stream + Unpin,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Step::Cancelled,
        next = source.next() => match next {
            Some(value) => Step::Value(value),
            None => Step::Exhausted,
        },
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "ingestion thread panicked".to_string()
    }
}
