//! Bounded worker pool for independent async units of work.
//!
//! [`TaskScheduler::run`] starts `limit` workers. Each worker pulls the next
//! unit from the shared input, runs it in its own task, and pushes the
//! outcome into a channel that the caller reads as a [`TaskStream`]. At most
//! `limit` units are ever in flight and outcomes arrive in completion order.
//! A unit that fails or panics is reported as an `Err` outcome; it never
//! takes its siblings down with it.

use std::{
    future::Future,
    num::NonZeroUsize,
    pin::Pin,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use crate::error::{EncrustError, Result};

/// Parallelism used when a caller has no better number.
pub const DEFAULT_PARALLELISM: usize = 10;

/// What the pool does after a unit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Let in-flight units finish, start nothing new.
    #[default]
    Halt,
    /// Keep pulling input.
    Continue,
}

/// Worker pool configuration. Cheap to copy; each [`TaskScheduler::run`]
/// call spawns its own workers.
#[derive(Debug, Clone, Copy)]
pub struct TaskScheduler {
    limit: NonZeroUsize,
    policy: FailurePolicy,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLELISM)
    }
}

impl TaskScheduler {
    /// A limit of zero is treated as one.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: NonZeroUsize::new(limit).unwrap_or(NonZeroUsize::MIN),
            policy: FailurePolicy::default(),
        }
    }

    /// Change what happens after a failed unit.
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Maximum units in flight.
    pub fn limit(&self) -> usize {
        self.limit.get()
    }

    /// Current failure policy.
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run every unit produced by `work` with at most `limit` in flight.
    ///
    /// `work` is consumed lazily: the next unit is only produced when a
    /// worker is free to run it. Must be called inside a tokio runtime.
    pub fn run<I, F, T>(&self, work: I) -> TaskStream<T>
    where
        I: IntoIterator<Item = F>,
        I::IntoIter: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let limit = self.limit.get();
        let input = Arc::new(Mutex::new(work.into_iter()));
        let halted = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(limit);

        for id in 0..limit {
            let worker = Worker {
                id,
                input: Arc::clone(&input),
                halted: Arc::clone(&halted),
                outcomes: tx.clone(),
                policy: self.policy,
            };
            tokio::spawn(worker.run());
        }

        TaskStream {
            inner: ReceiverStream::new(rx),
            halted,
        }
    }
}

struct Worker<It, T> {
    id: usize,
    input: Arc<Mutex<It>>,
    halted: Arc<AtomicBool>,
    outcomes: mpsc::Sender<Result<T>>,
    policy: FailurePolicy,
}

impl<It, F, T> Worker<It, T>
where
    It: Iterator<Item = F> + Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    async fn run(self) {
        loop {
            if self.halted.load(Ordering::Acquire) {
                debug!(worker = self.id, "halted; not pulling more work");
                break;
            }
            let next = {
                let mut input =
                    self.input.lock().unwrap_or_else(PoisonError::into_inner);
                input.next()
            };
            let Some(unit) = next else {
                break;
            };

            let outcome = match tokio::spawn(unit).await {
                Ok(outcome) => outcome,
                Err(join) => Err(EncrustError::TaskPanicked(join.to_string())),
            };

            if let Err(err) = &outcome {
                error!(worker = self.id, "scheduled unit failed: {err}");
                if self.policy == FailurePolicy::Halt {
                    self.halted.store(true, Ordering::Release);
                }
            }

            if self.outcomes.send(outcome).await.is_err() {
                // Receiver dropped; nobody is listening for further results.
                break;
            }
        }
    }
}

/// Outcomes of scheduled units, in completion order.
#[derive(Debug)]
pub struct TaskStream<T> {
    inner: ReceiverStream<Result<T>>,
    halted: Arc<AtomicBool>,
}

impl<T> TaskStream<T> {
    /// Whether a failure stopped the pool from pulling more input.
    pub fn halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Wait for every started unit, then return all values or the first
    /// error.
    pub async fn try_drain(mut self) -> Result<Vec<T>> {
        use futures::StreamExt;

        let mut values = Vec::new();
        let mut first_error = None;
        while let Some(outcome) = self.next().await {
            match outcome {
                Ok(value) => values.push(value),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(values),
        }
    }
}

impl<T> Stream for TaskStream<T> {
    type Item = Result<T>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn empty_input_ends_immediately() {
        let work: Vec<std::future::Ready<Result<u32>>> = Vec::new();
        let out: Vec<_> = TaskScheduler::new(4).run(work).collect().await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn zero_limit_is_clamped_to_one() {
        assert_eq!(TaskScheduler::new(0).limit(), 1);
    }

    #[tokio::test]
    async fn limit_one_preserves_submission_order() {
        let work = (0..20u64).map(|i| async move {
            // Later units finish faster; a single slot must still serialise.
            tokio::time::sleep(Duration::from_millis(20 - i)).await;
            Ok(i)
        });
        let out = TaskScheduler::new(1).run(work).try_drain().await.unwrap();
        assert_eq!(out, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn results_arrive_in_completion_order() {
        let delays = [60u64, 5, 30];
        let work = delays.into_iter().map(|ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(ms)
        });
        let out = TaskScheduler::new(3).run(work).try_drain().await.unwrap();
        assert_eq!(out, vec![5, 30, 60]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let work = (0..50).map({
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            move |i| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(3)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                }
            }
        });
        let out = TaskScheduler::new(4).run(work).try_drain().await.unwrap();
        assert_eq!(out.len(), 50);
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn failure_lets_siblings_finish_and_stops_new_work() {
        let started = Arc::new(AtomicUsize::new(0));
        let work = (0..10u64).map({
            let started = Arc::clone(&started);
            move |i| {
                let started = Arc::clone(&started);
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    if i == 0 {
                        return Err(EncrustError::Metadata("unit 0".into()));
                    }
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok(i)
                }
            }
        });
        let stream = TaskScheduler::new(2).run(work);
        let outcomes: Vec<_> = stream.collect().await;

        // Unit 0 fails at once; unit 1 was already in flight and completes.
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes.iter().filter(|o| o.is_err()).count(), 1);
        assert!(outcomes.iter().any(|o| matches!(o, Ok(1))));
    }

    #[tokio::test]
    async fn continue_policy_runs_everything() {
        let work = (0..6u32).map(|i| async move {
            if i % 2 == 0 {
                Err(EncrustError::Metadata(format!("unit {i}")))
            } else {
                Ok(i)
            }
        });
        let outcomes: Vec<_> = TaskScheduler::new(2)
            .with_policy(FailurePolicy::Continue)
            .run(work)
            .collect()
            .await;
        assert_eq!(outcomes.len(), 6);
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 3);
    }

    #[tokio::test]
    async fn panics_are_captured_as_outcomes() {
        let work = (0..3u32).map(|i| async move {
            if i == 1 {
                panic!("unit {i} exploded");
            }
            Ok(i)
        });
        let err = TaskScheduler::new(1)
            .with_policy(FailurePolicy::Continue)
            .run(work)
            .try_drain()
            .await
            .unwrap_err();
        assert!(matches!(err, EncrustError::TaskPanicked(_)));
    }
}
