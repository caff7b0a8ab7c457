// Bounded timer pool for bomb fuses and power-up expiry.
//
// One dispatcher task keeps pending deadlines in a min-heap and hands due jobs
// to a fixed number of worker tasks over a bounded channel. Jobs have no caller
// to report to: errors and panics are logged and absorbed here.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::{sleep_until, Instant};

use crate::engine::error::GameResult;
use crate::metrics;

type Job = Box<dyn FnOnce() -> GameResult<()> + Send + 'static>;

struct Scheduled {
    deadline: Instant,
    seq: u64,
    label: &'static str,
    job: Job,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // min-heap via reversed ordering; ties fire in scheduling order
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Fixed-size pool of tokio tasks running delayed one-shot jobs.
pub struct TimerPool {
    intake: mpsc::UnboundedSender<Scheduled>,
    pending: Arc<AtomicUsize>,
    next_seq: AtomicU64,
    worker_count: usize,
}

impl TimerPool {
    /// Spawn the dispatcher and workers on the current tokio runtime.
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (intake_tx, intake_rx) = mpsc::unbounded_channel();
        let (work_tx, work_rx) = mpsc::channel(worker_count * 4);
        let work_rx = Arc::new(AsyncMutex::new(work_rx));
        let pending = Arc::new(AtomicUsize::new(0));

        tokio::spawn(dispatch(intake_rx, work_tx, pending.clone()));
        for worker in 0..worker_count {
            tokio::spawn(work(worker, work_rx.clone(), pending.clone()));
        }

        TimerPool {
            intake: intake_tx,
            pending,
            next_seq: AtomicU64::new(0),
            worker_count,
        }
    }

    /// Run `job` once `delay` has passed. Returns false if the pool has shut down.
    pub fn schedule<F>(&self, label: &'static str, delay: Duration, job: F) -> bool
    where
        F: FnOnce() -> GameResult<()> + Send + 'static,
    {
        let scheduled = Scheduled {
            deadline: Instant::now() + delay,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            label,
            job: Box::new(job),
        };
        let count = self.pending.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::PENDING_TIMERS.set(count as i64);

        if self.intake.send(scheduled).is_err() {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Jobs scheduled but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

async fn dispatch(
    mut intake: mpsc::UnboundedReceiver<Scheduled>,
    work: mpsc::Sender<Scheduled>,
    pending: Arc<AtomicUsize>,
) {
    let mut heap: BinaryHeap<Scheduled> = BinaryHeap::new();
    loop {
        while heap.peek().is_some_and(|s| s.deadline <= Instant::now()) {
            let Some(due) = heap.pop() else {
                break;
            };
            if work.send(due).await.is_err() {
                return;
            }
        }

        let next = heap.peek().map(|s| s.deadline);
        tokio::select! {
            msg = intake.recv() => match msg {
                Some(s) => heap.push(s),
                None => {
                    // pool dropped: outstanding timers are discarded
                    let left = pending.fetch_sub(heap.len(), Ordering::Relaxed) - heap.len();
                    metrics::PENDING_TIMERS.set(left as i64);
                    tracing::debug!(discarded = heap.len(), "timer pool shut down");
                    return;
                }
            },
            _ = sleep_until(next.unwrap_or_else(Instant::now)), if next.is_some() => {}
        }
    }
}

async fn work(
    worker: usize,
    queue: Arc<AsyncMutex<mpsc::Receiver<Scheduled>>>,
    pending: Arc<AtomicUsize>,
) {
    loop {
        let next = { queue.lock().await.recv().await };
        let Some(scheduled) = next else {
            break;
        };
        let label = scheduled.label;

        match std::panic::catch_unwind(AssertUnwindSafe(scheduled.job)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                metrics::TIMER_JOBS_FAILED_TOTAL.with_label_values(&[label]).inc();
                tracing::warn!(worker, timer = label, error = %e, "timer job failed");
            }
            Err(_) => {
                metrics::TIMER_JOBS_FAILED_TOTAL.with_label_values(&[label]).inc();
                tracing::error!(worker, timer = label, "timer job panicked");
            }
        }

        let left = pending.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        metrics::PENDING_TIMERS.set(left as i64);
    }
}
