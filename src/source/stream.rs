use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use crate::constants::stream::PRODUCER_PANICKED_REASON;
use crate::errors::AnalyticsError;

/// Lazy, single-pass sequence fed by a background producer through a bounded queue.
///
/// The producer blocks once `capacity` items are outstanding (queued or held
/// while waiting to be queued), so a slow consumer throttles row fetching.
/// Items arrive in production order. A producer error is delivered as the
/// final `Err` item. Dropping the stream disconnects the queue and joins the
/// producer, which releases whatever cursor or connection it owned.
pub struct RowStream<T> {
    receiver: Option<mpsc::Receiver<Result<T, AnalyticsError>>>,
    handle: Option<thread::JoinHandle<()>>,
    stats: Arc<StreamStats>,
    finished: bool,
}

/// Runtime counters shared between a producer and its consumer.
#[derive(Debug, Default)]
pub struct StreamStats {
    fetched: AtomicUsize,
    delivered: AtomicUsize,
    closed: AtomicBool,
}

impl StreamStats {
    /// Items handed to the queue by the producer (including one blocked in `send`).
    pub fn fetched(&self) -> usize {
        self.fetched.load(Ordering::SeqCst)
    }

    /// Items taken by the consumer.
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    /// True once the producer has returned and released its resources.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Producer-side handle of a `RowStream`.
pub struct RowSink<T> {
    sender: mpsc::SyncSender<Result<T, AnalyticsError>>,
    stats: Arc<StreamStats>,
}

impl<T> RowSink<T> {
    /// Queue one item, blocking while the queue is full.
    ///
    /// Returns `false` once the consumer is gone; the producer should stop.
    pub fn push(&self, item: T) -> bool {
        self.stats.fetched.fetch_add(1, Ordering::SeqCst);
        self.sender.send(Ok(item)).is_ok()
    }
}

impl<T: Send + 'static> RowStream<T> {
    /// Spawn `producer` on its own thread behind a queue of `capacity` items.
    pub fn spawn<F>(capacity: usize, producer: F) -> Self
    where
        F: FnOnce(&RowSink<T>) -> Result<(), AnalyticsError> + Send + 'static,
    {
        // One item is held by the producer while it blocks in `send`.
        let bound = capacity.max(1) - 1;
        let (sender, receiver) = mpsc::sync_channel(bound);
        let stats = Arc::new(StreamStats::default());
        let stats_thread = Arc::clone(&stats);
        let handle = thread::spawn(move || {
            let sink = RowSink {
                sender,
                stats: Arc::clone(&stats_thread),
            };
            if let Err(err) = producer(&sink) {
                // The consumer may already be gone; nothing left to report to.
                let _ = sink.sender.send(Err(err));
            }
            drop(sink);
            stats_thread.closed.store(true, Ordering::SeqCst);
        });
        Self {
            receiver: Some(receiver),
            handle: Some(handle),
            stats,
            finished: false,
        }
    }

    /// Shared counters for this stream.
    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.stats)
    }

    /// Drain the remaining items, stopping at the first error.
    pub fn collect_all(self) -> Result<Vec<T>, AnalyticsError> {
        self.collect()
    }

    fn join_producer(&mut self) -> Result<(), AnalyticsError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| AnalyticsError::StreamAborted(PRODUCER_PANICKED_REASON.into())),
            None => Ok(()),
        }
    }
}

impl<T: Send + 'static> Iterator for RowStream<T> {
    type Item = Result<T, AnalyticsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let receiver = self.receiver.as_ref()?;
        match receiver.recv() {
            Ok(Ok(item)) => {
                self.stats.delivered.fetch_add(1, Ordering::SeqCst);
                Some(Ok(item))
            }
            Ok(Err(err)) => {
                self.finished = true;
                Some(Err(err))
            }
            Err(mpsc::RecvError) => {
                self.finished = true;
                self.join_producer().err().map(Err)
            }
        }
    }
}

impl<T> Drop for RowStream<T> {
    fn drop(&mut self) {
        self.receiver.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
