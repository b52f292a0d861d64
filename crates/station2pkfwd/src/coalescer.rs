// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background write coalescer.
//!
//! Producers append items to a shared accumulator and call [`WriteCoalescer::notify`].
//! A single background task swaps the accumulator for an empty one and hands
//! the batch to an async drain function. Writes that arrive while a drain is
//! in flight are picked up by the next swap, so items are delivered in
//! enqueue order and never interleave across batches.
//!
//! Stopping is two-phase: the stop flag is raised and the task woken, then
//! [`WriteCoalescer::stop`] waits up to the configured timeout for the task to
//! find an empty queue and exit. Past the timeout the task is aborted.

use crate::error::{BridgeError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Container the coalescer swaps out on each wakeup.
pub trait Accumulator: Default + Send + 'static {
    type Item: Send;

    /// Add one item.
    fn put(&mut self, item: Self::Item);

    /// Number of pending items.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send + 'static> Accumulator for Vec<T> {
    type Item = T;

    fn put(&mut self, item: T) {
        self.push(item);
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}

type DrainFn<A> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct Shared<A> {
    queue: Mutex<A>,
    wake: Notify,
    stopping: AtomicBool,
}

/// Single-consumer batching writer.
pub struct WriteCoalescer<A: Accumulator> {
    name: String,
    shared: Arc<Shared<A>>,
    drain: DrainFn<A>,
    stop_timeout: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<A: Accumulator> WriteCoalescer<A> {
    /// Create a stopped coalescer. `drain` receives each swapped-out batch.
    pub fn new<F, Fut>(name: impl Into<String>, stop_timeout: Duration, drain: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                queue: Mutex::new(A::default()),
                wake: Notify::new(),
                stopping: AtomicBool::new(false),
            }),
            drain: Arc::new(move |batch| drain(batch).boxed()),
            stop_timeout,
            task: Mutex::new(None),
        }
    }

    /// Name used in log lines.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the background task. Calling it while running does nothing.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        self.shared.stopping.store(false, Ordering::Release);
        *task = Some(tokio::spawn(run(
            self.name.clone(),
            Arc::clone(&self.shared),
            Arc::clone(&self.drain),
        )));
    }

    /// Append an item without waking the task.
    pub fn push(&self, item: A::Item) {
        self.shared.queue.lock().put(item);
    }

    /// Append an item and wake the task.
    pub fn send(&self, item: A::Item) {
        self.push(item);
        self.notify();
    }

    /// Run `f` against the pending accumulator under its lock.
    pub fn with_queue<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        f(&mut self.shared.queue.lock())
    }

    /// Wake the task so it drains what is pending.
    pub fn notify(&self) {
        self.shared.wake.notify_one();
    }

    /// Items waiting for the next swap.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Abort the task immediately. Pending items stay queued.
    pub fn cancel(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    /// Drain what is pending, then stop.
    ///
    /// Returns [`BridgeError::CoalescerStopTimeout`] if the task had to be
    /// aborted.
    pub async fn stop(&self) -> Result<()> {
        let handle = self.task.lock().take();
        let Some(mut handle) = handle else {
            return Ok(());
        };

        self.shared.stopping.store(true, Ordering::Release);
        self.shared.wake.notify_one();

        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(_) => Ok(()),
            Err(_) => {
                handle.abort();
                warn!(
                    "[{}] Writer did not stop within {:?}, cancelled",
                    self.name, self.stop_timeout
                );
                Err(BridgeError::CoalescerStopTimeout {
                    name: self.name.clone(),
                    timeout: self.stop_timeout,
                })
            }
        }
    }
}

impl<A: Accumulator> Drop for WriteCoalescer<A> {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

async fn run<A: Accumulator>(name: String, shared: Arc<Shared<A>>, drain: DrainFn<A>) {
    debug!("[{}] Writer started", name);
    loop {
        if !shared.stopping.load(Ordering::Acquire) {
            shared.wake.notified().await;
        }

        let batch = std::mem::take(&mut *shared.queue.lock());
        if batch.is_empty() {
            if shared.stopping.load(Ordering::Acquire) {
                break;
            }
            continue;
        }

        let len = batch.len();
        let started = Instant::now();
        if let Err(e) = drain(batch).await {
            error!("[{}] Drain of {} item(s) failed: {}", name, len, e);
        }
        debug!("[{}] Drained {} item(s) in {:?}", name, len, started.elapsed());
    }
    debug!("[{}] Writer stopped", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn collecting(
        stop_timeout: Duration,
    ) -> (WriteCoalescer<Vec<u32>>, Arc<Mutex<Vec<Vec<u32>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let writer = WriteCoalescer::new("test", stop_timeout, move |batch: Vec<u32>| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(batch);
                Ok(())
            }
        });
        (writer, seen)
    }

    #[tokio::test]
    async fn test_preserves_enqueue_order() {
        let (writer, seen) = collecting(Duration::from_secs(1));
        writer.start();

        for i in 1..=5 {
            writer.push(i);
        }
        writer.notify();
        writer.stop().await.unwrap();

        let flat: Vec<u32> = seen.lock().iter().flatten().copied().collect();
        assert_eq!(flat, vec![1, 2, 3, 4, 5]);
        assert!(!writer.is_running());
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (writer, seen) = collecting(Duration::from_secs(1));
        writer.start();
        writer.start();
        assert!(writer.is_running());

        writer.send(7);
        writer.send(8);
        writer.stop().await.unwrap();

        let flat: Vec<u32> = seen.lock().iter().flatten().copied().collect();
        assert_eq!(flat, vec![7, 8]);
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let (writer, _seen) = collecting(Duration::from_millis(10));
        assert!(writer.stop().await.is_ok());
        assert_eq!(writer.name(), "test");
    }

    #[tokio::test]
    async fn test_drain_error_keeps_running() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let writer = WriteCoalescer::new("failing", Duration::from_secs(1), move |_: Vec<u8>| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(BridgeError::Transport("socket gone".into()))
                } else {
                    Ok(())
                }
            }
        });
        writer.start();

        writer.send(1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        writer.send(2);
        writer.stop().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stop_timeout_cancels() {
        let writer = WriteCoalescer::new("stuck", Duration::from_millis(50), |_: Vec<u8>| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        });
        writer.start();
        writer.send(1);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = writer.stop().await.unwrap_err();
        assert!(matches!(err, BridgeError::CoalescerStopTimeout { .. }));
        assert!(!writer.is_running());
    }

    #[tokio::test]
    async fn test_concurrent_producers_lose_nothing() {
        let (writer, seen) = collecting(Duration::from_secs(2));
        let writer = Arc::new(writer);
        writer.start();

        let mut producers = Vec::new();
        for p in 0..4u32 {
            let writer = Arc::clone(&writer);
            producers.push(tokio::spawn(async move {
                for i in 0..250u32 {
                    writer.send(p * 1000 + i);
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        for p in producers {
            p.await.unwrap();
        }
        writer.stop().await.unwrap();

        let batches = seen.lock();
        let total: usize = batches.iter().map(Vec::len).sum();
        assert_eq!(total, 1000);
        // Per-producer order survives batching
        for p in 0..4u32 {
            let mine: Vec<u32> = batches
                .iter()
                .flatten()
                .copied()
                .filter(|v| v / 1000 == p)
                .collect();
            assert!(mine.windows(2).all(|w| w[0] < w[1]));
        }
        assert_eq!(writer.pending(), 0);
    }

    #[tokio::test]
    async fn test_cancel_keeps_pending() {
        let (writer, _seen) = collecting(Duration::from_secs(1));
        writer.push(1);
        writer.with_queue(|q| q.push(2));
        assert_eq!(writer.pending(), 2);
        writer.start();
        writer.cancel();
        assert!(!writer.is_running());
    }
}
